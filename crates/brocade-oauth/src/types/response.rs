use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use url::Url;

/// Token endpoint success body. `token_type` is normalized to lowercase by
/// the validator; grant-specific extras stay in `extra`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TokenEndpointResponse {
    pub access_token: SmolStr,
    pub token_type: SmolStr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<SmolStr>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// RFC 9126 §2.2.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ParResponse {
    pub request_uri: SmolStr,
    pub expires_in: u64,
}

/// RFC 8628 §3.2.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DeviceAuthorizationResponse {
    pub device_code: SmolStr,
    pub user_code: SmolStr,
    pub verification_uri: Url,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_uri_complete: Option<Url>,
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BackchannelAuthenticationResponse {
    pub auth_req_id: SmolStr,
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
}

/// RFC 7662 §2.2. `active: false` responses legitimately carry nothing else.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<SmolStr>,
    /// Confirmation claim, e.g. the DPoP key thumbprint under `jkt`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cnf: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// UserInfo response: `sub` plus whatever claims the server released.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserInfoResponse {
    pub sub: SmolStr,
    #[serde(flatten)]
    pub claims: serde_json::Map<String, serde_json::Value>,
}

/// Structured OAuth error body (`error` plus optional description/uri).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TokenErrorBody {
    pub error: SmolStr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<SmolStr>,
}
