//! Client authentication strategies for token-issuing endpoints.
//!
//! Each variant is a pure function from (server, client, target endpoint) to
//! the auth material of a request: an optional `Authorization` header plus
//! form fields that get flattened into the body. The closed enum keeps the
//! variant set exhaustiveness-checked; there is no open callback contract.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use smol_str::SmolStr;
use url::Url;

use crate::error::{OAuthError, Result};
use crate::jose::jws::Header;
use crate::jose::jwt::{Audience, Claims, RegisteredClaims};
use crate::jose::sign::{PrivateKeyRef, SigningKey, create_signed_jwt};
use crate::jose::JwsAlgorithm;
use crate::types::{AuthorizationServer, Client};
use crate::utils::generate_random_nonce;

// https://datatracker.ietf.org/doc/html/rfc7523#section-2.2
pub const CLIENT_ASSERTION_TYPE_JWT_BEARER: &str =
    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Client assertion lifetime, seconds.
const ASSERTION_TTL: i64 = 60;

/// Pre-signing customization for assertion-producing variants. Runs after the
/// engine populates `iss`/`sub`/`aud`/`iat`/`nbf`/`exp`/`jti`; the hook may
/// add claims or clear engine-set ones explicitly.
pub type AssertionHook = fn(&mut Header, &mut Claims);

#[derive(Debug, Clone)]
pub enum ClientAuthentication {
    /// `client_id` in the body only.
    None,
    /// `Authorization: Basic` header per the OAuth 2.0 appendix: both
    /// entities RFC 3986 percent-encoded before joining with `:`.
    SecretBasic,
    /// `client_id`/`client_secret` in the body, no header.
    SecretPost,
    /// HMAC client assertion keyed by the client secret.
    SecretJwt {
        alg: JwsAlgorithm,
        hook: Option<AssertionHook>,
    },
    /// Asymmetric client assertion over the caller's private key.
    PrivateKeyJwt {
        key: PrivateKeyRef,
        alg: Option<JwsAlgorithm>,
        hook: Option<AssertionHook>,
    },
    /// Channel binding is the transport's job; only `client_id` goes in the
    /// body.
    SelfSignedTlsClientAuth,
}

/// Form fields carrying the auth material, flattened into the endpoint body.
#[derive(Debug, Clone, Serialize, Default)]
pub struct AuthBody {
    pub client_id: SmolStr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_assertion_type: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_assertion: Option<SmolStr>,
}

#[derive(Debug, Clone)]
pub struct AppliedAuth {
    pub authorization: Option<SmolStr>,
    pub body: AuthBody,
}

// RFC 3986 unreserved stays literal, everything else is escaped.
const AUTH_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

impl ClientAuthentication {
    pub fn apply(
        &self,
        server: &AuthorizationServer,
        client: &Client,
        endpoint: &Url,
    ) -> Result<AppliedAuth> {
        let mut applied = AppliedAuth {
            authorization: None,
            body: AuthBody {
                client_id: client.client_id.clone(),
                ..Default::default()
            },
        };
        match self {
            Self::None | Self::SelfSignedTlsClientAuth => {}
            Self::SecretBasic => {
                let secret = require_secret(client)?;
                let user = utf8_percent_encode(&client.client_id, AUTH_ESCAPE);
                let pass = utf8_percent_encode(secret, AUTH_ESCAPE);
                let credentials = STANDARD.encode(format!("{user}:{pass}"));
                applied.authorization = Some(smol_str::format_smolstr!("Basic {credentials}"));
            }
            Self::SecretPost => {
                applied.body.client_secret = Some(require_secret(client)?.into());
            }
            Self::SecretJwt { alg, hook } => {
                if alg.family() != crate::jose::KeyFamily::Oct {
                    return Err(OAuthError::unsupported_algorithm(alg.as_str())
                        .with_context("client_secret_jwt requires an HMAC algorithm"));
                }
                let key = SigningKey::Hmac(require_secret(client)?.as_bytes().to_vec());
                let assertion =
                    build_assertion(&key, *alg, None, server, client, endpoint, *hook)?;
                applied.body.client_assertion_type =
                    Some(CLIENT_ASSERTION_TYPE_JWT_BEARER.into());
                applied.body.client_assertion = Some(assertion);
            }
            Self::PrivateKeyJwt { key, alg, hook } => {
                let alg = alg.unwrap_or_else(|| key.key.default_algorithm());
                let assertion = build_assertion(
                    &key.key,
                    alg,
                    key.kid.clone(),
                    server,
                    client,
                    endpoint,
                    *hook,
                )?;
                applied.body.client_assertion_type =
                    Some(CLIENT_ASSERTION_TYPE_JWT_BEARER.into());
                applied.body.client_assertion = Some(assertion);
            }
        }
        Ok(applied)
    }
}

fn require_secret(client: &Client) -> Result<&str> {
    client
        .client_secret
        .as_deref()
        .ok_or_else(|| OAuthError::config("client_secret is required for this auth method"))
}

fn build_assertion(
    key: &SigningKey,
    alg: JwsAlgorithm,
    kid: Option<SmolStr>,
    server: &AuthorizationServer,
    client: &Client,
    endpoint: &Url,
    hook: Option<AssertionHook>,
) -> Result<SmolStr> {
    let now = Utc::now().timestamp();
    let issuer = server.issuer.as_str();
    // aud is the de-duplicated {issuer, endpoint} set.
    let aud = if issuer == endpoint.as_str() {
        Audience::Single(issuer.into())
    } else {
        Audience::Multiple(vec![issuer.into(), endpoint.as_str().into()])
    };
    let mut header = Header::from(alg);
    header.kid = kid;
    let mut claims: Claims = RegisteredClaims {
        iss: Some(client.client_id.clone()),
        sub: Some(client.client_id.clone()),
        aud: Some(aud),
        iat: Some(now),
        nbf: Some(now),
        exp: Some(now + ASSERTION_TTL),
        jti: Some(generate_random_nonce()),
    }
    .into();
    if let Some(hook) = hook {
        hook(&mut header, &mut claims);
    }
    create_signed_jwt(key, &header, &claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jose::{b64url_decode, split_compact};

    fn server() -> AuthorizationServer {
        let mut server =
            AuthorizationServer::new(Url::parse("https://as.example.com/").unwrap());
        server.token_endpoint = Some(Url::parse("https://as.example.com/token").unwrap());
        server
    }

    fn endpoint() -> Url {
        Url::parse("https://as.example.com/token").unwrap()
    }

    #[test]
    fn secret_basic_escapes_reserved_characters() {
        let client = Client::new("client with:colon").with_secret("p@ss/word");
        let applied = ClientAuthentication::SecretBasic
            .apply(&server(), &client, &endpoint())
            .unwrap();
        let header = applied.authorization.unwrap();
        let encoded = header.strip_prefix("Basic ").unwrap();
        let decoded = String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap();
        assert_eq!(decoded, "client%20with%3Acolon:p%40ss%2Fword");
        assert!(applied.body.client_secret.is_none());
    }

    #[test]
    fn secret_post_puts_secret_in_body() {
        let client = Client::new("c").with_secret("s");
        let applied = ClientAuthentication::SecretPost
            .apply(&server(), &client, &endpoint())
            .unwrap();
        assert!(applied.authorization.is_none());
        assert_eq!(applied.body.client_secret.as_deref(), Some("s"));
    }

    #[test]
    fn missing_secret_is_config_error() {
        let client = Client::new("c");
        let err = ClientAuthentication::SecretBasic
            .apply(&server(), &client, &endpoint())
            .unwrap_err();
        assert!(matches!(err.kind(), crate::error::ErrorKind::Config(_)));
    }

    #[test]
    fn private_key_jwt_assertion_shape() {
        let key = PrivateKeyRef::new(SigningKey::P256(p256::ecdsa::SigningKey::random(
            &mut rand::thread_rng(),
        )))
        .with_kid("key-1");
        let client = Client::new("my-client");
        let applied = ClientAuthentication::PrivateKeyJwt {
            key,
            alg: None,
            hook: None,
        }
        .apply(&server(), &client, &endpoint())
        .unwrap();
        assert_eq!(
            applied.body.client_assertion_type.as_deref(),
            Some(CLIENT_ASSERTION_TYPE_JWT_BEARER)
        );
        let assertion = applied.body.client_assertion.unwrap();
        let segments = split_compact(&assertion, 3).unwrap();
        let header: Header =
            serde_json::from_slice(&b64url_decode(segments[0]).unwrap()).unwrap();
        assert_eq!(header.alg, "ES256");
        assert_eq!(header.kid.as_deref(), Some("key-1"));
        let claims: Claims =
            serde_json::from_slice(&b64url_decode(segments[1]).unwrap()).unwrap();
        assert_eq!(claims.registered.iss.as_deref(), Some("my-client"));
        assert_eq!(claims.registered.sub.as_deref(), Some("my-client"));
        let aud = claims.registered.aud.unwrap();
        assert!(aud.contains("https://as.example.com/"));
        assert!(aud.contains("https://as.example.com/token"));
        assert_eq!(
            claims.registered.exp.unwrap() - claims.registered.iat.unwrap(),
            ASSERTION_TTL
        );
        assert!(claims.registered.jti.is_some());
    }

    #[test]
    fn private_key_jwt_small_rsa_rejected() {
        let key = PrivateKeyRef::new(SigningKey::Rsa(Box::new(
            rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap(),
        )));
        let client = Client::new("c");
        let err = ClientAuthentication::PrivateKeyJwt {
            key,
            alg: None,
            hook: None,
        }
        .apply(&server(), &client, &endpoint())
        .unwrap_err();
        assert_eq!(err.to_string(), "modulusLength must be at least 2048 bits");
    }

    #[test]
    fn secret_jwt_rejects_asymmetric_alg() {
        let client = Client::new("c").with_secret("a-secret-long-enough-for-hmac");
        let err = ClientAuthentication::SecretJwt {
            alg: JwsAlgorithm::RS256,
            hook: None,
        }
        .apply(&server(), &client, &endpoint())
        .unwrap_err();
        assert!(matches!(
            err.kind(),
            crate::error::ErrorKind::UnsupportedAlgorithm(_)
        ));
    }

    #[test]
    fn hook_can_amend_claims() {
        fn add_claim(_header: &mut Header, claims: &mut Claims) {
            claims
                .extra
                .insert("acr".into(), serde_json::Value::String("urn:mace:gold".into()));
        }
        let client = Client::new("c").with_secret("a-secret-long-enough-for-hmac");
        let applied = ClientAuthentication::SecretJwt {
            alg: JwsAlgorithm::HS256,
            hook: Some(add_claim),
        }
        .apply(&server(), &client, &endpoint())
        .unwrap();
        let assertion = applied.body.client_assertion.unwrap();
        let segments = split_compact(&assertion, 3).unwrap();
        let claims: Claims =
            serde_json::from_slice(&b64url_decode(segments[1]).unwrap()).unwrap();
        assert_eq!(
            claims.extra.get("acr").and_then(|v| v.as_str()),
            Some("urn:mace:gold")
        );
    }
}
