use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use url::Url;

use crate::jose::JwsAlgorithm;

/// Relying-party configuration. The secret, when present, backs the
/// `client_secret_*` authentication methods and `dir`-encrypted responses.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Client {
    pub client_id: SmolStr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_method: Option<SmolStr>,
    /// Expected `alg` of signed ID Tokens; RS256 when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token_signed_response_alg: Option<JwsAlgorithm>,
    /// Expected `alg` of JARM authorization responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_signed_response_alg: Option<JwsAlgorithm>,
    /// Expected `alg` of signed UserInfo responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userinfo_signed_response_alg: Option<JwsAlgorithm>,
    /// Expected `alg` of signed introspection responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub introspection_signed_response_alg: Option<JwsAlgorithm>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<SmolStr>,
}

impl Client {
    pub fn new(client_id: impl Into<SmolStr>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            token_endpoint_auth_method: None,
            id_token_signed_response_alg: None,
            authorization_signed_response_alg: None,
            userinfo_signed_response_alg: None,
            introspection_signed_response_alg: None,
            redirect_uri: None,
            scope: None,
        }
    }

    pub fn with_secret(mut self, secret: impl Into<SmolStr>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn id_token_alg(&self) -> JwsAlgorithm {
        self.id_token_signed_response_alg.unwrap_or(JwsAlgorithm::RS256)
    }
}
