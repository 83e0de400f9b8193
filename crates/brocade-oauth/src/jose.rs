//! Compact JWS/JWE codec over caller-owned key handles.

pub mod jwe;
pub mod jwk;
pub mod jws;
pub mod jwt;
pub mod sign;
pub mod verify;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::error::{OAuthError, Result};

pub use self::sign::{SigningKey, create_signed_jwt};
pub use self::verify::{VerificationConstraints, verify_signed_jwt};

/// JWS signature algorithms this build supports. `none` is structurally
/// unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum JwsAlgorithm {
    HS256,
    HS384,
    HS512,
    RS256,
    RS384,
    RS512,
    PS256,
    PS384,
    PS512,
    ES256,
    ES384,
}

/// Key family an algorithm pairs with, used for structural alg/key checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Oct,
    Rsa,
    EcP256,
    EcP384,
}

impl JwsAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HS256 => "HS256",
            Self::HS384 => "HS384",
            Self::HS512 => "HS512",
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::RS512 => "RS512",
            Self::PS256 => "PS256",
            Self::PS384 => "PS384",
            Self::PS512 => "PS512",
            Self::ES256 => "ES256",
            Self::ES384 => "ES384",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "HS256" => Self::HS256,
            "HS384" => Self::HS384,
            "HS512" => Self::HS512,
            "RS256" => Self::RS256,
            "RS384" => Self::RS384,
            "RS512" => Self::RS512,
            "PS256" => Self::PS256,
            "PS384" => Self::PS384,
            "PS512" => Self::PS512,
            "ES256" => Self::ES256,
            "ES384" => Self::ES384,
            _ => return None,
        })
    }

    pub fn family(&self) -> KeyFamily {
        match self {
            Self::HS256 | Self::HS384 | Self::HS512 => KeyFamily::Oct,
            Self::RS256 | Self::RS384 | Self::RS512 | Self::PS256 | Self::PS384 | Self::PS512 => {
                KeyFamily::Rsa
            }
            Self::ES256 => KeyFamily::EcP256,
            Self::ES384 => KeyFamily::EcP384,
        }
    }
}

impl std::fmt::Display for JwsAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Split a compact serialization into its dot-separated segments, checking the
/// part count only. Three parts is a JWS, five a JWE.
pub(crate) fn split_compact(compact: &str, parts: usize) -> Result<Vec<&str>> {
    let segments: Vec<&str> = compact.split('.').collect();
    if segments.len() != parts {
        return Err(OAuthError::jwt_malformed()
            .with_context(smol_str::format_smolstr!("expected {parts} segments")));
    }
    Ok(segments)
}

pub(crate) fn b64url_decode(segment: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment.as_bytes())
        .map_err(|e| OAuthError::jwt_malformed().with_context(smol_str::format_smolstr!("{e}")))
}

pub(crate) fn b64url_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}
