use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use url::Url;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    #[serde(rename = "authorization_code")]
    AuthorizationCode,
    #[serde(rename = "client_credentials")]
    ClientCredentials,
    #[serde(rename = "refresh_token")]
    RefreshToken,
    #[serde(rename = "urn:ietf:params:oauth:grant-type:device_code")]
    DeviceCode,
    #[serde(rename = "urn:openid:params:grant-type:ciba")]
    Ciba,
    #[serde(rename = "urn:ietf:params:oauth:grant-type:token-exchange")]
    TokenExchange,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::ClientCredentials => "client_credentials",
            Self::RefreshToken => "refresh_token",
            Self::DeviceCode => "urn:ietf:params:oauth:grant-type:device_code",
            Self::Ciba => "urn:openid:params:grant-type:ciba",
            Self::TokenExchange => "urn:ietf:params:oauth:grant-type:token-exchange",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    Login,
    None,
    Consent,
    SelectAccount,
}

impl Prompt {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::None => "none",
            Self::Consent => "consent",
            Self::SelectAccount => "select_account",
        }
    }
}

/// Parameters for the authorization endpoint URL, shared by the front-channel
/// builder and PAR.
#[derive(Debug, Clone, Default)]
pub struct AuthorizeOptions {
    pub redirect_uri: Option<Url>,
    pub scope: Option<SmolStr>,
    pub state: Option<SmolStr>,
    pub nonce: Option<SmolStr>,
    pub code_challenge: Option<SmolStr>,
    pub prompt: Option<Prompt>,
    pub login_hint: Option<SmolStr>,
    /// RFC 8707 resource indicators.
    pub resource: Vec<SmolStr>,
    /// Additional caller parameters appended verbatim.
    pub extra: Vec<(SmolStr, SmolStr)>,
}

/// Token endpoint parameters for `grant_type=authorization_code`.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationCodeGrant {
    pub code: SmolStr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<SmolStr>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshTokenGrant {
    pub refresh_token: SmolStr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<SmolStr>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ClientCredentialsGrant {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<SmolStr>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resource: Vec<SmolStr>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceAuthorizationRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<SmolStr>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceCodeGrant {
    pub device_code: SmolStr,
}

/// CIBA authentication request. Exactly one hint should be set; the server
/// rejects requests carrying zero or several.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackchannelAuthenticationRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_hint: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_hint_token: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token_hint: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding_message: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_code: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_expiry: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CibaGrant {
    pub auth_req_id: SmolStr,
}

/// RFC 8693 token exchange.
#[derive(Debug, Clone, Serialize)]
pub struct TokenExchangeGrant {
    pub subject_token: SmolStr,
    pub subject_token_type: SmolStr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_token: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_token_type: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_token_type: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<SmolStr>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resource: Vec<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<SmolStr>,
}
