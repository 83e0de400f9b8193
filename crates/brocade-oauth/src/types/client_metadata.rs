use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use url::Url;

use crate::jose::jwk::JwkSet;

/// Client metadata submitted to the dynamic client registration endpoint
/// (RFC 7591) and echoed back, possibly amended, in the registration response.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ClientMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uris: Option<Vec<Url>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_method: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grant_types: Option<Vec<SmolStr>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_types: Option<Vec<SmolStr>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_uri: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_uri: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contacts: Option<Vec<SmolStr>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tos_uri: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_uri: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks: Option<JwkSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub software_id: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub software_version: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpop_bound_access_tokens: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token_signed_response_alg: Option<SmolStr>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Registration response: the issued identity plus the accepted metadata.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RegisteredClient {
    pub client_id: SmolStr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id_issued_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret_expires_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_access_token: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_client_uri: Option<Url>,
    #[serde(flatten)]
    pub metadata: ClientMetadata,
}
