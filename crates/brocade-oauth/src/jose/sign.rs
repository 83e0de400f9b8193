//! JWS production over caller-owned private keys.

use hmac::{Hmac, Mac};
use rsa::traits::PublicKeyParts;
use sha2::{Sha256, Sha384, Sha512};
use signature::{RandomizedSigner, SignatureEncoding, Signer};
use smol_str::SmolStr;

use super::{JwsAlgorithm, KeyFamily, b64url_encode};
use super::jws::Header;
use super::jwt::Claims;
use crate::error::{OAuthError, Result};

/// Private key material for JWS production and JWE decryption. The engine
/// borrows it per operation and never persists it.
#[derive(Clone)]
pub enum SigningKey {
    Hmac(Vec<u8>),
    Rsa(Box<rsa::RsaPrivateKey>),
    P256(p256::ecdsa::SigningKey),
    P384(p384::ecdsa::SigningKey),
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hmac(_) => f.write_str("SigningKey::Hmac"),
            Self::Rsa(_) => f.write_str("SigningKey::Rsa"),
            Self::P256(_) => f.write_str("SigningKey::P256"),
            Self::P384(_) => f.write_str("SigningKey::P384"),
        }
    }
}

/// A signing key plus the `kid` it is published under, if any.
#[derive(Debug, Clone)]
pub struct PrivateKeyRef {
    pub key: SigningKey,
    pub kid: Option<SmolStr>,
}

impl PrivateKeyRef {
    pub fn new(key: SigningKey) -> Self {
        Self { key, kid: None }
    }

    pub fn with_kid(mut self, kid: impl Into<SmolStr>) -> Self {
        self.kid = Some(kid.into());
        self
    }
}

impl SigningKey {
    pub fn family(&self) -> KeyFamily {
        match self {
            Self::Hmac(_) => KeyFamily::Oct,
            Self::Rsa(_) => KeyFamily::Rsa,
            Self::P256(_) => KeyFamily::EcP256,
            Self::P384(_) => KeyFamily::EcP384,
        }
    }

    pub fn supports(&self, alg: JwsAlgorithm) -> bool {
        self.family() == alg.family()
    }

    pub fn default_algorithm(&self) -> JwsAlgorithm {
        match self {
            Self::Hmac(_) => JwsAlgorithm::HS256,
            Self::Rsa(_) => JwsAlgorithm::RS256,
            Self::P256(_) => JwsAlgorithm::ES256,
            Self::P384(_) => JwsAlgorithm::ES384,
        }
    }

    /// RSA keys below 2048 bits are refused for every JOSE production in this
    /// engine (DPoP proofs and client assertions report the identical error).
    pub fn check_signing_strength(&self) -> Result<()> {
        if let Self::Rsa(key) = self {
            if key.n().bits() < 2048 {
                return Err(OAuthError::modulus_length());
            }
        }
        Ok(())
    }
}

/// Build a compact JWS for `claims` under `header`, which must already carry
/// the algorithm the key was negotiated for.
pub fn create_signed_jwt(key: &SigningKey, header: &Header, claims: &Claims) -> Result<SmolStr> {
    let Some(alg) = header.algorithm() else {
        return Err(OAuthError::unsupported_algorithm(header.alg.clone()));
    };
    if !key.supports(alg) {
        return Err(OAuthError::unsupported_key()
            .with_context(smol_str::format_smolstr!("key cannot produce {alg}")));
    }
    key.check_signing_strength()?;

    let header_b64 = b64url_encode(serde_json::to_string(header)?.as_bytes());
    let payload_b64 = b64url_encode(serde_json::to_string(claims)?.as_bytes());
    let signing_input = format!("{header_b64}.{payload_b64}");
    let signature = sign_payload(key, alg, signing_input.as_bytes())?;
    Ok(smol_str::format_smolstr!("{signing_input}.{}", b64url_encode(&signature)))
}

pub(crate) fn sign_payload(key: &SigningKey, alg: JwsAlgorithm, data: &[u8]) -> Result<Vec<u8>> {
    match (key, alg) {
        (SigningKey::Hmac(secret), JwsAlgorithm::HS256) => {
            let mut mac = Hmac::<Sha256>::new_from_slice(secret)
                .map_err(|_| OAuthError::unsupported_key().with_context("empty HMAC secret"))?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }
        (SigningKey::Hmac(secret), JwsAlgorithm::HS384) => {
            let mut mac = Hmac::<Sha384>::new_from_slice(secret)
                .map_err(|_| OAuthError::unsupported_key().with_context("empty HMAC secret"))?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }
        (SigningKey::Hmac(secret), JwsAlgorithm::HS512) => {
            let mut mac = Hmac::<Sha512>::new_from_slice(secret)
                .map_err(|_| OAuthError::unsupported_key().with_context("empty HMAC secret"))?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }
        (SigningKey::Rsa(key), JwsAlgorithm::RS256) => {
            let signer = rsa::pkcs1v15::SigningKey::<Sha256>::new(key.as_ref().clone());
            Ok(signer.try_sign(data).map_err(OAuthError::jwt_signing)?.to_vec())
        }
        (SigningKey::Rsa(key), JwsAlgorithm::RS384) => {
            let signer = rsa::pkcs1v15::SigningKey::<Sha384>::new(key.as_ref().clone());
            Ok(signer.try_sign(data).map_err(OAuthError::jwt_signing)?.to_vec())
        }
        (SigningKey::Rsa(key), JwsAlgorithm::RS512) => {
            let signer = rsa::pkcs1v15::SigningKey::<Sha512>::new(key.as_ref().clone());
            Ok(signer.try_sign(data).map_err(OAuthError::jwt_signing)?.to_vec())
        }
        (SigningKey::Rsa(key), JwsAlgorithm::PS256) => {
            let signer = rsa::pss::SigningKey::<Sha256>::new(key.as_ref().clone());
            let sig = signer
                .try_sign_with_rng(&mut rand::thread_rng(), data)
                .map_err(OAuthError::jwt_signing)?;
            Ok(sig.to_vec())
        }
        (SigningKey::Rsa(key), JwsAlgorithm::PS384) => {
            let signer = rsa::pss::SigningKey::<Sha384>::new(key.as_ref().clone());
            let sig = signer
                .try_sign_with_rng(&mut rand::thread_rng(), data)
                .map_err(OAuthError::jwt_signing)?;
            Ok(sig.to_vec())
        }
        (SigningKey::Rsa(key), JwsAlgorithm::PS512) => {
            let signer = rsa::pss::SigningKey::<Sha512>::new(key.as_ref().clone());
            let sig = signer
                .try_sign_with_rng(&mut rand::thread_rng(), data)
                .map_err(OAuthError::jwt_signing)?;
            Ok(sig.to_vec())
        }
        (SigningKey::P256(key), JwsAlgorithm::ES256) => {
            let signature: p256::ecdsa::Signature =
                key.try_sign(data).map_err(OAuthError::jwt_signing)?;
            Ok(signature.to_bytes().to_vec())
        }
        (SigningKey::P384(key), JwsAlgorithm::ES384) => {
            let signature: p384::ecdsa::Signature =
                key.try_sign(data).map_err(OAuthError::jwt_signing)?;
            Ok(signature.to_bytes().to_vec())
        }
        _ => Err(OAuthError::unsupported_key()
            .with_context(smol_str::format_smolstr!("key cannot produce {alg}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hs256_matches_reference() {
        // RFC 7515 A.1 signing input with the A.1 oct key
        let key = SigningKey::Hmac(vec![
            3, 35, 53, 75, 43, 15, 165, 188, 131, 126, 6, 101, 119, 123, 166, 143, 90, 179, 40,
            230, 240, 84, 201, 40, 169, 15, 132, 178, 210, 80, 46, 191, 211, 251, 90, 146, 210, 6,
            71, 239, 150, 138, 180, 195, 119, 98, 61, 34, 61, 46, 33, 114, 5, 46, 79, 8, 192, 205,
            154, 245, 103, 208, 128, 163,
        ]);
        let data = b"eyJ0eXAiOiJKV1QiLA0KICJhbGciOiJIUzI1NiJ9.eyJpc3MiOiJqb2UiLA0KICJleHAiOjEzMDA4MTkzODAsDQogImh0dHA6Ly9leGFtcGxlLmNvbS9pc19yb290Ijp0cnVlfQ";
        let sig = sign_payload(&key, JwsAlgorithm::HS256, data).unwrap();
        assert_eq!(
            b64url_encode(&sig),
            "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"
        );
    }

    #[test]
    fn rejects_mismatched_key_and_alg() {
        let key = SigningKey::Hmac(b"secret".to_vec());
        let err = sign_payload(&key, JwsAlgorithm::ES256, b"data").unwrap_err();
        assert!(matches!(err.kind(), crate::error::ErrorKind::UnsupportedKey));
    }

    #[test]
    fn small_rsa_modulus_rejected() {
        let key = SigningKey::Rsa(Box::new(
            rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap(),
        ));
        let header = Header::from(JwsAlgorithm::RS256);
        let err = create_signed_jwt(&key, &header, &Claims::default()).unwrap_err();
        assert_eq!(err.to_string(), "modulusLength must be at least 2048 bits");
    }

    #[test]
    fn es256_signature_is_64_bytes() {
        let key = SigningKey::P256(p256::ecdsa::SigningKey::random(&mut rand::thread_rng()));
        let sig = sign_payload(&key, JwsAlgorithm::ES256, b"data").unwrap();
        assert_eq!(sig.len(), 64);
    }
}
