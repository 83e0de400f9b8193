//! DPoP proof generation and nonce tracking (RFC 9449).
//!
//! The nonce cache is caller-owned and keyed by origin. The engine never
//! retries: [`observe`] records any fresh nonce and reports whether a single
//! rebuild-and-retry is warranted, and the caller decides.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use dashmap::DashMap;
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use sha2::{Digest, Sha256};
use smol_str::SmolStr;
use url::Url;

use crate::challenge::parse_www_authenticate;
use crate::error::{OAuthError, Result};
use crate::jose::jwk::public_jwk;
use crate::jose::jws::Header;
use crate::jose::jwt::{Claims, ProtocolClaims, RegisteredClaims};
use crate::jose::sign::{SigningKey, create_signed_jwt};
use crate::jose::{JwsAlgorithm, KeyFamily};
use crate::utils::url_origin;

pub const JWT_HEADER_TYP_DPOP: &str = "dpop+jwt";

/// The key a DPoP session is bound to, paired with its proof algorithm.
/// Symmetric keys are refused (proofs embed the public JWK) and RSA keys
/// below 2048 bits are refused with the same error client authentication
/// uses.
#[derive(Debug, Clone)]
pub struct DpopKey {
    pub key: SigningKey,
    pub alg: JwsAlgorithm,
}

impl DpopKey {
    pub fn new(key: SigningKey, alg: Option<JwsAlgorithm>) -> Result<Self> {
        if key.family() == KeyFamily::Oct {
            return Err(OAuthError::unsupported_key()
                .with_context("DPoP requires an asymmetric key"));
        }
        key.check_signing_strength()?;
        let alg = alg.unwrap_or_else(|| key.default_algorithm());
        if !key.supports(alg) {
            return Err(OAuthError::unsupported_key()
                .with_context(smol_str::format_smolstr!("key cannot produce {alg}")));
        }
        Ok(Self { key, alg })
    }

    /// RFC 7638 thumbprint of the public key, the `jkt` binding value.
    pub fn thumbprint(&self) -> Result<SmolStr> {
        public_jwk(&self.key)?.thumbprint()
    }
}

/// Caller-owned map from origin to the last nonce that origin issued.
#[derive(Debug, Default)]
pub struct DpopNonceCache(DashMap<SmolStr, SmolStr>);

impl DpopNonceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &Url) -> Option<SmolStr> {
        self.0.get(url_origin(url).as_str()).map(|v| v.clone())
    }

    pub fn set(&self, url: &Url, nonce: impl Into<SmolStr>) {
        self.0.insert(url_origin(url), nonce.into());
    }
}

pub(crate) fn generate_jti() -> SmolStr {
    let mut rng = SmallRng::from_entropy();
    let mut bytes = [0u8; 12];
    rng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes).into()
}

/// Build the proof JWS for one outgoing request.
///
/// `htu` is the target URL with query and fragment stripped; `htm` is the
/// method verbatim as supplied. `access_token`, when the request carries one,
/// becomes the `ath` hash claim.
pub fn create_proof(
    key: &DpopKey,
    method: &str,
    url: &Url,
    nonce_cache: &DpopNonceCache,
    access_token: Option<&str>,
) -> Result<SmolStr> {
    key.key.check_signing_strength()?;
    let mut htu = url.clone();
    htu.set_query(None);
    htu.set_fragment(None);

    let mut header = Header::from(key.alg);
    header.typ = Some(JWT_HEADER_TYP_DPOP.into());
    header.jwk = Some(public_jwk(&key.key)?);

    let claims = Claims {
        registered: RegisteredClaims {
            jti: Some(generate_jti()),
            iat: Some(Utc::now().timestamp()),
            ..Default::default()
        },
        protocol: ProtocolClaims {
            htm: Some(method.into()),
            htu: Some(htu.as_str().into()),
            ath: access_token
                .map(|token| URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes())).into()),
            nonce: nonce_cache.get(url),
            ..Default::default()
        },
        extra: Default::default(),
    };
    create_signed_jwt(&key.key, &header, &claims)
}

/// Record any nonce the response carried and report whether the caller should
/// rebuild the request with it and retry exactly once.
pub fn observe(response: &http::Response<Vec<u8>>, url: &Url, nonce_cache: &DpopNonceCache) -> bool {
    let previous = nonce_cache.get(url);
    let mut fresh = false;
    if let Some(nonce) = response
        .headers()
        .get("DPoP-Nonce")
        .and_then(|value| value.to_str().ok())
    {
        if previous.as_deref() != Some(nonce) {
            nonce_cache.set(url, nonce);
            fresh = true;
        }
    }
    fresh && wants_fresh_nonce(response)
}

fn wants_fresh_nonce(response: &http::Response<Vec<u8>>) -> bool {
    if response.status() == http::StatusCode::BAD_REQUEST {
        if let Ok(body) = serde_json::from_slice::<serde_json::Value>(response.body()) {
            if body.get("error").and_then(|e| e.as_str()) == Some("use_dpop_nonce") {
                return true;
            }
        }
    }
    let values = response
        .headers()
        .get_all(http::header::WWW_AUTHENTICATE)
        .iter()
        .filter_map(|value| value.to_str().ok());
    parse_www_authenticate(values).is_some_and(|challenges| {
        challenges.iter().any(|challenge| {
            challenge.scheme == "dpop"
                && challenge.parameter("error") == Some("use_dpop_nonce")
        })
    })
}
