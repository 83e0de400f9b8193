use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use url::Url;

use crate::error::{OAuthError, Result};

/// Authorization server metadata, externally supplied (usually via discovery)
/// and never mutated by the engine.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AuthorizationServer {
    // https://datatracker.ietf.org/doc/html/rfc8414#section-2
    pub issuer: Url,
    pub authorization_endpoint: Option<Url>,
    pub token_endpoint: Option<Url>,
    pub jwks_uri: Option<Url>,
    pub registration_endpoint: Option<Url>,
    pub revocation_endpoint: Option<Url>,
    pub introspection_endpoint: Option<Url>,
    pub userinfo_endpoint: Option<Url>,
    pub scopes_supported: Option<Vec<SmolStr>>,
    pub response_types_supported: Option<Vec<SmolStr>>,
    pub response_modes_supported: Option<Vec<SmolStr>>,
    pub grant_types_supported: Option<Vec<SmolStr>>,
    pub token_endpoint_auth_methods_supported: Option<Vec<SmolStr>>,
    pub token_endpoint_auth_signing_alg_values_supported: Option<Vec<SmolStr>>,
    pub id_token_signing_alg_values_supported: Option<Vec<SmolStr>>,
    pub code_challenge_methods_supported: Option<Vec<SmolStr>>,

    // https://datatracker.ietf.org/doc/html/rfc9126#section-5
    pub pushed_authorization_request_endpoint: Option<Url>,
    pub require_pushed_authorization_requests: Option<bool>,

    // https://datatracker.ietf.org/doc/html/rfc8628#section-4
    pub device_authorization_endpoint: Option<Url>,

    // https://openid.net/specs/openid-client-initiated-backchannel-authentication-core-1_0.html
    pub backchannel_authentication_endpoint: Option<Url>,
    pub backchannel_token_delivery_modes_supported: Option<Vec<SmolStr>>,
    pub backchannel_user_code_parameter_supported: Option<bool>,

    // https://datatracker.ietf.org/doc/html/rfc9207#section-3
    pub authorization_response_iss_parameter_supported: Option<bool>,

    // https://datatracker.ietf.org/doc/html/rfc9449#section-5.1
    pub dpop_signing_alg_values_supported: Option<Vec<SmolStr>>,

    // JARM
    pub authorization_signing_alg_values_supported: Option<Vec<SmolStr>>,

    /// Members the engine does not interpret, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AuthorizationServer {
    pub fn new(issuer: Url) -> Self {
        Self {
            issuer,
            authorization_endpoint: None,
            token_endpoint: None,
            jwks_uri: None,
            registration_endpoint: None,
            revocation_endpoint: None,
            introspection_endpoint: None,
            userinfo_endpoint: None,
            scopes_supported: None,
            response_types_supported: None,
            response_modes_supported: None,
            grant_types_supported: None,
            token_endpoint_auth_methods_supported: None,
            token_endpoint_auth_signing_alg_values_supported: None,
            id_token_signing_alg_values_supported: None,
            code_challenge_methods_supported: None,
            pushed_authorization_request_endpoint: None,
            require_pushed_authorization_requests: None,
            device_authorization_endpoint: None,
            backchannel_authentication_endpoint: None,
            backchannel_token_delivery_modes_supported: None,
            backchannel_user_code_parameter_supported: None,
            authorization_response_iss_parameter_supported: None,
            dpop_signing_alg_values_supported: None,
            authorization_signing_alg_values_supported: None,
            extra: Default::default(),
        }
    }

    pub fn require_endpoint<'a>(
        &'a self,
        endpoint: Option<&'a Url>,
        name: &'static str,
    ) -> Result<&'a Url> {
        endpoint.ok_or_else(|| OAuthError::no_endpoint(name))
    }

    pub fn token_endpoint(&self) -> Result<&Url> {
        self.require_endpoint(self.token_endpoint.as_ref(), "token_endpoint")
    }

    pub fn authorization_endpoint(&self) -> Result<&Url> {
        self.require_endpoint(self.authorization_endpoint.as_ref(), "authorization_endpoint")
    }

    pub fn jwks_uri(&self) -> Result<&Url> {
        self.require_endpoint(self.jwks_uri.as_ref(), "jwks_uri")
    }
}

/// Protected resource metadata, per RFC 9728.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProtectedResource {
    pub resource: Url,
    pub authorization_servers: Option<Vec<Url>>,
    pub jwks_uri: Option<Url>,
    pub scopes_supported: Option<Vec<SmolStr>>,
    pub bearer_methods_supported: Option<Vec<SmolStr>>,
    pub resource_signing_alg_values_supported: Option<Vec<SmolStr>>,
    pub resource_name: Option<SmolStr>,
    pub resource_documentation: Option<SmolStr>,
    pub resource_policy_uri: Option<SmolStr>,
    pub resource_tos_uri: Option<SmolStr>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
