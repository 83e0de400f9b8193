//! JSON Web Keys: the wire shape, RFC 7638 thumbprints, and conversion into
//! usable verification key material.

use rsa::BigUint;
use rsa::traits::PublicKeyParts;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use smol_str::SmolStr;

use super::sign::SigningKey;
use super::{JwsAlgorithm, KeyFamily, b64url_decode, b64url_encode};
use crate::error::{OAuthError, Result};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Jwk {
    pub kty: SmolStr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<SmolStr>,
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub use_: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_ops: Option<Vec<SmolStr>>,
    // EC
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<SmolStr>,
    // RSA
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<SmolStr>,
    // oct
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k: Option<SmolStr>,
    // Private-part marker. Present means this JWK carries secret material.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<SmolStr>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// Verification key material a JWS signature can be checked against, always
/// paired with the one algorithm it may be used for.
#[derive(Clone)]
pub enum VerifyingKey {
    Hmac(Vec<u8>),
    Rsa(Box<rsa::RsaPublicKey>),
    P256(p256::ecdsa::VerifyingKey),
    P384(p384::ecdsa::VerifyingKey),
}

impl std::fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hmac(_) => f.write_str("VerifyingKey::Hmac"),
            Self::Rsa(_) => f.write_str("VerifyingKey::Rsa"),
            Self::P256(_) => f.write_str("VerifyingKey::P256"),
            Self::P384(_) => f.write_str("VerifyingKey::P384"),
        }
    }
}

impl VerifyingKey {
    pub fn family(&self) -> KeyFamily {
        match self {
            Self::Hmac(_) => KeyFamily::Oct,
            Self::Rsa(_) => KeyFamily::Rsa,
            Self::P256(_) => KeyFamily::EcP256,
            Self::P384(_) => KeyFamily::EcP384,
        }
    }
}

impl Jwk {
    /// Whether this key can satisfy a verification with `alg`, per its `kty`,
    /// `crv`, and optional `alg`/`use` members.
    pub fn is_candidate_for(&self, alg: JwsAlgorithm) -> bool {
        if self.alg.as_deref().is_some_and(|a| a != alg.as_str()) {
            return false;
        }
        if self.use_.as_deref().is_some_and(|u| u != "sig") {
            return false;
        }
        match alg.family() {
            KeyFamily::Oct => self.kty == "oct",
            KeyFamily::Rsa => self.kty == "RSA",
            KeyFamily::EcP256 => self.kty == "EC" && self.crv.as_deref() == Some("P-256"),
            KeyFamily::EcP384 => self.kty == "EC" && self.crv.as_deref() == Some("P-384"),
        }
    }

    /// Convert into verification key material for `alg`.
    pub fn to_verifying_key(&self, alg: JwsAlgorithm) -> Result<VerifyingKey> {
        match alg.family() {
            KeyFamily::Oct => {
                let k = self.member("k")?;
                Ok(VerifyingKey::Hmac(b64url_decode(k)?))
            }
            KeyFamily::Rsa => {
                let n = BigUint::from_bytes_be(&b64url_decode(self.member("n")?)?);
                let e = BigUint::from_bytes_be(&b64url_decode(self.member("e")?)?);
                let key = rsa::RsaPublicKey::new(n, e)
                    .map_err(|e| OAuthError::unsupported_key().with_context(smol_str::format_smolstr!("{e}")))?;
                Ok(VerifyingKey::Rsa(Box::new(key)))
            }
            KeyFamily::EcP256 => {
                let x = b64url_decode(self.member("x")?)?;
                let y = b64url_decode(self.member("y")?)?;
                if x.len() != 32 || y.len() != 32 {
                    return Err(OAuthError::unsupported_key().with_context("bad P-256 coordinate length"));
                }
                let point = p256::EncodedPoint::from_affine_coordinates(
                    p256::FieldBytes::from_slice(&x),
                    p256::FieldBytes::from_slice(&y),
                    false,
                );
                let key = p256::ecdsa::VerifyingKey::from_encoded_point(&point)
                    .map_err(|_| OAuthError::unsupported_key().with_context("point not on P-256"))?;
                Ok(VerifyingKey::P256(key))
            }
            KeyFamily::EcP384 => {
                let x = b64url_decode(self.member("x")?)?;
                let y = b64url_decode(self.member("y")?)?;
                if x.len() != 48 || y.len() != 48 {
                    return Err(OAuthError::unsupported_key().with_context("bad P-384 coordinate length"));
                }
                let point = p384::EncodedPoint::from_affine_coordinates(
                    p384::FieldBytes::from_slice(&x),
                    p384::FieldBytes::from_slice(&y),
                    false,
                );
                let key = p384::ecdsa::VerifyingKey::from_encoded_point(&point)
                    .map_err(|_| OAuthError::unsupported_key().with_context("point not on P-384"))?;
                Ok(VerifyingKey::P384(key))
            }
        }
    }

    /// RFC 7638 thumbprint (base64url SHA-256 over the canonical required
    /// members). Private keys refuse with a distinct error; a thumbprint names
    /// public material only.
    pub fn thumbprint(&self) -> Result<SmolStr> {
        if self.d.is_some() {
            return Err(OAuthError::unsupported_key()
                .with_context("private JWK cannot be thumbprinted"));
        }
        let canonical = match self.kty.as_str() {
            "EC" => format!(
                r#"{{"crv":"{}","kty":"EC","x":"{}","y":"{}"}}"#,
                self.member("crv")?,
                self.member("x")?,
                self.member("y")?
            ),
            "RSA" => format!(
                r#"{{"e":"{}","kty":"RSA","n":"{}"}}"#,
                self.member("e")?,
                self.member("n")?
            ),
            "oct" => format!(r#"{{"k":"{}","kty":"oct"}}"#, self.member("k")?),
            other => {
                return Err(OAuthError::unsupported_key()
                    .with_context(smol_str::format_smolstr!("kty {other}")));
            }
        };
        Ok(b64url_encode(&Sha256::digest(canonical.as_bytes())).into())
    }

    fn member(&self, name: &str) -> Result<&str> {
        let value = match name {
            "crv" => &self.crv,
            "x" => &self.x,
            "y" => &self.y,
            "n" => &self.n,
            "e" => &self.e,
            "k" => &self.k,
            _ => &None,
        };
        value.as_deref().ok_or_else(|| {
            OAuthError::config(smol_str::format_smolstr!("JWK is missing \"{name}\""))
        })
    }
}

/// Public JWK of a signing key, as embedded in DPoP proof headers. Symmetric
/// keys have no public form.
pub fn public_jwk(key: &SigningKey) -> Result<Jwk> {
    match key {
        SigningKey::Hmac(_) => Err(OAuthError::unsupported_key()
            .with_context("symmetric keys have no public JWK")),
        SigningKey::Rsa(key) => {
            let public = key.to_public_key();
            Ok(Jwk {
                kty: "RSA".into(),
                n: Some(b64url_encode(&public.n().to_bytes_be()).into()),
                e: Some(b64url_encode(&public.e().to_bytes_be()).into()),
                ..Default::default()
            })
        }
        SigningKey::P256(key) => {
            let point = key.verifying_key().to_encoded_point(false);
            let (x, y) = point
                .x()
                .zip(point.y())
                .ok_or_else(|| OAuthError::unsupported_key().with_context("degenerate EC point"))?;
            Ok(Jwk {
                kty: "EC".into(),
                crv: Some("P-256".into()),
                x: Some(b64url_encode(x.as_slice()).into()),
                y: Some(b64url_encode(y.as_slice()).into()),
                ..Default::default()
            })
        }
        SigningKey::P384(key) => {
            let point = key.verifying_key().to_encoded_point(false);
            let (x, y) = point
                .x()
                .zip(point.y())
                .ok_or_else(|| OAuthError::unsupported_key().with_context("degenerate EC point"))?;
            Ok(Jwk {
                kty: "EC".into(),
                crv: Some("P-384".into()),
                x: Some(b64url_encode(x.as_slice()).into()),
                y: Some(b64url_encode(y.as_slice()).into()),
                ..Default::default()
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // https://datatracker.ietf.org/doc/html/rfc7638#section-3.1
    #[test]
    fn rsa_thumbprint_rfc7638_vector() {
        let jwk = Jwk {
            kty: "RSA".into(),
            n: Some(
                "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw"
                    .into(),
            ),
            e: Some("AQAB".into()),
            alg: Some("RS256".into()),
            kid: Some("2011-04-29".into()),
            ..Default::default()
        };
        assert_eq!(jwk.thumbprint().unwrap(), "NzbLsXh8uDCcd-6MNwXF4W_7noWXFZAfHkxZsRGC9Xs");
    }

    #[test]
    fn ec_thumbprint_vector() {
        let jwk = Jwk {
            kty: "EC".into(),
            crv: Some("P-256".into()),
            x: Some("f83OJ3D2xF1Bg8vub9tLe1gHMzV76e8Tus9uPHvRVEU".into()),
            y: Some("x_FEzRu9m36HLN_tue659LNpXW6pCyStikYjKIWI5a0".into()),
            ..Default::default()
        };
        assert_eq!(jwk.thumbprint().unwrap(), "ZrBaai73Hi8Fg4MElvDGzIne2NsbI75RHubOViHYE5Q");
    }

    #[test]
    fn private_jwk_thumbprint_fails() {
        let jwk = Jwk {
            kty: "EC".into(),
            crv: Some("P-256".into()),
            x: Some("f83OJ3D2xF1Bg8vub9tLe1gHMzV76e8Tus9uPHvRVEU".into()),
            y: Some("x_FEzRu9m36HLN_tue659LNpXW6pCyStikYjKIWI5a0".into()),
            d: Some("jpsQnnGQmL-YBIffH1136cspYG6-0iY7X1fCE9-E9LI".into()),
            ..Default::default()
        };
        let err = jwk.thumbprint().unwrap_err();
        assert!(matches!(err.kind(), crate::error::ErrorKind::UnsupportedKey));
    }

    #[test]
    fn candidate_filter_respects_use_and_alg() {
        let mut jwk = Jwk {
            kty: "RSA".into(),
            n: Some("AQAB".into()),
            e: Some("AQAB".into()),
            ..Default::default()
        };
        assert!(jwk.is_candidate_for(JwsAlgorithm::RS256));
        assert!(jwk.is_candidate_for(JwsAlgorithm::PS256));
        assert!(!jwk.is_candidate_for(JwsAlgorithm::ES256));
        jwk.use_ = Some("enc".into());
        assert!(!jwk.is_candidate_for(JwsAlgorithm::RS256));
        jwk.use_ = Some("sig".into());
        jwk.alg = Some("RS256".into());
        assert!(!jwk.is_candidate_for(JwsAlgorithm::PS256));
    }

    #[test]
    fn ec_public_jwk_roundtrip() {
        let key = SigningKey::P256(p256::ecdsa::SigningKey::random(&mut rand::thread_rng()));
        let jwk = public_jwk(&key).unwrap();
        assert_eq!(jwk.kty, "EC");
        assert_eq!(jwk.crv.as_deref(), Some("P-256"));
        jwk.to_verifying_key(JwsAlgorithm::ES256).unwrap();
    }
}
