//! JWS verification with explicit, caller-supplied constraints.
//!
//! Nothing is inferred from the token: the allowed algorithms, expected
//! issuer/audience/subject, and freshness bounds all arrive as parameters, and
//! the key arrives paired with the one algorithm it may be used for. A header
//! `alg` that differs from the negotiated algorithm is rejected before any
//! signature math runs.

use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha384, Sha512};
use signature::Verifier;

use super::jwk::VerifyingKey;
use super::jws::Header;
use super::jwt::Claims;
use super::{JwsAlgorithm, b64url_decode, split_compact};
use crate::error::{OAuthError, Result};

/// Explicit verification constraints. `expected_sub` defaults to skipping the
/// check; pass [`SubjectCheck::Exact`] to pin it.
#[derive(Debug, Clone, Default)]
pub struct VerificationConstraints<'a> {
    pub allowed_algs: &'a [JwsAlgorithm],
    pub expected_iss: Option<&'a str>,
    /// Membership test; `aud` may be an array.
    pub expected_aud: Option<&'a str>,
    pub expected_sub: SubjectCheck<'a>,
    pub expected_typ: Option<&'a str>,
    /// Reject tokens whose `iat` is further in the past than this many seconds.
    pub max_iat_age: Option<i64>,
    pub required_claims: &'a [&'a str],
    /// Clock injection; `None` means the wall clock.
    pub now: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub enum SubjectCheck<'a> {
    Exact(&'a str),
    #[default]
    Skip,
}

/// Verify a compact JWS against one key negotiated for one algorithm, then
/// enforce the claim constraints. Returns the decoded header and claims.
pub fn verify_signed_jwt(
    compact: &str,
    key: &VerifyingKey,
    alg: JwsAlgorithm,
    constraints: &VerificationConstraints<'_>,
) -> Result<(Header, Claims)> {
    let segments = split_compact(compact, 3)?;
    let header: Header = serde_json::from_slice(&b64url_decode(segments[0])?)
        .map_err(|e| OAuthError::jwt_malformed().with_context(smol_str::format_smolstr!("{e}")))?;

    // Structural algorithm check comes first: the header must name exactly the
    // negotiated algorithm, and that algorithm must be in the allowed set.
    if header.alg != alg.as_str() {
        return Err(OAuthError::jwt_alg_disallowed(header.alg.clone()));
    }
    if !constraints.allowed_algs.is_empty() && !constraints.allowed_algs.contains(&alg) {
        return Err(OAuthError::jwt_alg_disallowed(header.alg.clone()));
    }
    if key.family() != alg.family() {
        return Err(OAuthError::unsupported_key()
            .with_context(smol_str::format_smolstr!("key cannot verify {alg}")));
    }

    let signing_input_len = segments[0].len() + 1 + segments[1].len();
    let signing_input = &compact.as_bytes()[..signing_input_len];
    let signature = b64url_decode(segments[2])?;
    verify_signature(key, alg, signing_input, &signature)?;

    let claims: Claims = serde_json::from_slice(&b64url_decode(segments[1])?)
        .map_err(|e| OAuthError::jwt_malformed().with_context(smol_str::format_smolstr!("{e}")))?;
    check_claims(&header, &claims, constraints)?;
    Ok((header, claims))
}

fn verify_signature(
    key: &VerifyingKey,
    alg: JwsAlgorithm,
    data: &[u8],
    signature: &[u8],
) -> Result<()> {
    match (key, alg) {
        (VerifyingKey::Hmac(secret), JwsAlgorithm::HS256) => {
            let mut mac = Hmac::<Sha256>::new_from_slice(secret)
                .map_err(|_| OAuthError::unsupported_key().with_context("empty HMAC secret"))?;
            mac.update(data);
            mac.verify_slice(signature).map_err(|_| OAuthError::jwt_signature())
        }
        (VerifyingKey::Hmac(secret), JwsAlgorithm::HS384) => {
            let mut mac = Hmac::<Sha384>::new_from_slice(secret)
                .map_err(|_| OAuthError::unsupported_key().with_context("empty HMAC secret"))?;
            mac.update(data);
            mac.verify_slice(signature).map_err(|_| OAuthError::jwt_signature())
        }
        (VerifyingKey::Hmac(secret), JwsAlgorithm::HS512) => {
            let mut mac = Hmac::<Sha512>::new_from_slice(secret)
                .map_err(|_| OAuthError::unsupported_key().with_context("empty HMAC secret"))?;
            mac.update(data);
            mac.verify_slice(signature).map_err(|_| OAuthError::jwt_signature())
        }
        (VerifyingKey::Rsa(key), JwsAlgorithm::RS256) => {
            let verifier = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(key.as_ref().clone());
            let sig = rsa::pkcs1v15::Signature::try_from(signature)
                .map_err(|_| OAuthError::jwt_signature())?;
            verifier.verify(data, &sig).map_err(|_| OAuthError::jwt_signature())
        }
        (VerifyingKey::Rsa(key), JwsAlgorithm::RS384) => {
            let verifier = rsa::pkcs1v15::VerifyingKey::<Sha384>::new(key.as_ref().clone());
            let sig = rsa::pkcs1v15::Signature::try_from(signature)
                .map_err(|_| OAuthError::jwt_signature())?;
            verifier.verify(data, &sig).map_err(|_| OAuthError::jwt_signature())
        }
        (VerifyingKey::Rsa(key), JwsAlgorithm::RS512) => {
            let verifier = rsa::pkcs1v15::VerifyingKey::<Sha512>::new(key.as_ref().clone());
            let sig = rsa::pkcs1v15::Signature::try_from(signature)
                .map_err(|_| OAuthError::jwt_signature())?;
            verifier.verify(data, &sig).map_err(|_| OAuthError::jwt_signature())
        }
        (VerifyingKey::Rsa(key), JwsAlgorithm::PS256) => {
            let verifier = rsa::pss::VerifyingKey::<Sha256>::new(key.as_ref().clone());
            let sig = rsa::pss::Signature::try_from(signature)
                .map_err(|_| OAuthError::jwt_signature())?;
            verifier.verify(data, &sig).map_err(|_| OAuthError::jwt_signature())
        }
        (VerifyingKey::Rsa(key), JwsAlgorithm::PS384) => {
            let verifier = rsa::pss::VerifyingKey::<Sha384>::new(key.as_ref().clone());
            let sig = rsa::pss::Signature::try_from(signature)
                .map_err(|_| OAuthError::jwt_signature())?;
            verifier.verify(data, &sig).map_err(|_| OAuthError::jwt_signature())
        }
        (VerifyingKey::Rsa(key), JwsAlgorithm::PS512) => {
            let verifier = rsa::pss::VerifyingKey::<Sha512>::new(key.as_ref().clone());
            let sig = rsa::pss::Signature::try_from(signature)
                .map_err(|_| OAuthError::jwt_signature())?;
            verifier.verify(data, &sig).map_err(|_| OAuthError::jwt_signature())
        }
        (VerifyingKey::P256(key), JwsAlgorithm::ES256) => {
            let sig = p256::ecdsa::Signature::from_slice(signature)
                .map_err(|_| OAuthError::jwt_signature())?;
            key.verify(data, &sig).map_err(|_| OAuthError::jwt_signature())
        }
        (VerifyingKey::P384(key), JwsAlgorithm::ES384) => {
            let sig = p384::ecdsa::Signature::from_slice(signature)
                .map_err(|_| OAuthError::jwt_signature())?;
            key.verify(data, &sig).map_err(|_| OAuthError::jwt_signature())
        }
        _ => Err(OAuthError::unsupported_key()
            .with_context(smol_str::format_smolstr!("key cannot verify {alg}"))),
    }
}

fn check_claims(
    header: &Header,
    claims: &Claims,
    constraints: &VerificationConstraints<'_>,
) -> Result<()> {
    let now = constraints.now.unwrap_or_else(|| chrono::Utc::now().timestamp());

    if let Some(expected) = constraints.expected_typ {
        match header.typ.as_deref() {
            Some(typ) if typ_matches(typ, expected) => {}
            Some(_) => return Err(OAuthError::claim_mismatch("typ")),
            None => return Err(OAuthError::claim_missing("typ")),
        }
    }
    if let Some(expected) = constraints.expected_iss {
        match claims.registered.iss.as_deref() {
            Some(iss) if iss == expected => {}
            Some(_) => return Err(OAuthError::claim_mismatch("iss")),
            None => return Err(OAuthError::claim_missing("iss")),
        }
    }
    if let Some(expected) = constraints.expected_aud {
        match claims.registered.aud.as_ref() {
            Some(aud) if aud.contains(expected) => {}
            Some(_) => return Err(OAuthError::claim_mismatch("aud")),
            None => return Err(OAuthError::claim_missing("aud")),
        }
    }
    if let SubjectCheck::Exact(expected) = constraints.expected_sub {
        match claims.registered.sub.as_deref() {
            Some(sub) if sub == expected => {}
            Some(_) => return Err(OAuthError::claim_mismatch("sub")),
            None => return Err(OAuthError::claim_missing("sub")),
        }
    }
    if let Some(exp) = claims.registered.exp {
        // No grace period: exp <= now is expired.
        if exp <= now {
            return Err(OAuthError::claim_timing("exp is in the past"));
        }
    }
    if let Some(nbf) = claims.registered.nbf {
        if nbf > now {
            return Err(OAuthError::claim_timing("nbf is in the future"));
        }
    }
    if let Some(max_age) = constraints.max_iat_age {
        match claims.registered.iat {
            Some(iat) if now - iat > max_age => {
                return Err(OAuthError::claim_timing("iat is too far in the past"));
            }
            Some(iat) if iat > now => {
                return Err(OAuthError::claim_timing("iat is in the future"));
            }
            Some(_) => {}
            None => return Err(OAuthError::claim_missing("iat")),
        }
    }
    for required in constraints.required_claims {
        let present = match *required {
            "iss" => claims.registered.iss.is_some(),
            "sub" => claims.registered.sub.is_some(),
            "aud" => claims.registered.aud.is_some(),
            "exp" => claims.registered.exp.is_some(),
            "nbf" => claims.registered.nbf.is_some(),
            "iat" => claims.registered.iat.is_some(),
            "jti" => claims.registered.jti.is_some(),
            "nonce" => claims.protocol.nonce.is_some(),
            "auth_time" => claims.protocol.auth_time.is_some(),
            other => claims.extra.contains_key(other),
        };
        if !present {
            return Err(OAuthError::claim_missing(*required));
        }
    }
    Ok(())
}

// `typ` comparison tolerates the optional "application/" media type prefix.
fn typ_matches(actual: &str, expected: &str) -> bool {
    let actual = actual.strip_prefix("application/").unwrap_or(actual);
    let expected = expected.strip_prefix("application/").unwrap_or(expected);
    actual.eq_ignore_ascii_case(expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jose::jwt::RegisteredClaims;
    use crate::jose::sign::{SigningKey, create_signed_jwt};

    fn hs_key() -> (SigningKey, VerifyingKey) {
        let secret = b"a-shared-secret-of-decent-length".to_vec();
        (SigningKey::Hmac(secret.clone()), VerifyingKey::Hmac(secret))
    }

    fn sample(claims: RegisteredClaims) -> String {
        let (signer, _) = hs_key();
        create_signed_jwt(&signer, &Header::from(JwsAlgorithm::HS256), &claims.into())
            .unwrap()
            .to_string()
    }

    #[test]
    fn roundtrip_with_constraints() {
        let (_, verifier) = hs_key();
        let jwt = sample(RegisteredClaims {
            iss: Some("https://as.example.com".into()),
            aud: Some(crate::jose::jwt::Audience::Single("client".into())),
            exp: Some(2_000_000_000),
            iat: Some(1_000_000_000),
            ..Default::default()
        });
        let constraints = VerificationConstraints {
            allowed_algs: &[JwsAlgorithm::HS256],
            expected_iss: Some("https://as.example.com"),
            expected_aud: Some("client"),
            now: Some(1_000_000_100),
            ..Default::default()
        };
        let (header, claims) = verify_signed_jwt(&jwt, &verifier, JwsAlgorithm::HS256, &constraints).unwrap();
        assert_eq!(header.alg, "HS256");
        assert_eq!(claims.registered.iss.as_deref(), Some("https://as.example.com"));
    }

    #[test]
    fn tampered_signature_rejected() {
        let (_, verifier) = hs_key();
        let mut jwt = sample(RegisteredClaims::default());
        jwt.pop();
        jwt.push('A');
        let err = verify_signed_jwt(
            &jwt,
            &verifier,
            JwsAlgorithm::HS256,
            &VerificationConstraints::default(),
        )
        .unwrap_err();
        assert!(matches!(err.kind(), crate::error::ErrorKind::JwtSignature));
    }

    #[test]
    fn header_alg_must_match_negotiated_alg() {
        let (_, verifier) = hs_key();
        let jwt = sample(RegisteredClaims::default());
        // Token says HS256; verifier was negotiated for HS384.
        let err = verify_signed_jwt(
            &jwt,
            &verifier,
            JwsAlgorithm::HS384,
            &VerificationConstraints::default(),
        )
        .unwrap_err();
        assert!(matches!(err.kind(), crate::error::ErrorKind::JwtAlgDisallowed(_)));
    }

    #[test]
    fn expired_token_rejected_without_grace() {
        let (_, verifier) = hs_key();
        let jwt = sample(RegisteredClaims {
            exp: Some(1_000),
            ..Default::default()
        });
        let err = verify_signed_jwt(
            &jwt,
            &verifier,
            JwsAlgorithm::HS256,
            &VerificationConstraints {
                now: Some(1_000),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err.kind(), crate::error::ErrorKind::ClaimTiming(_)));
    }

    #[test]
    fn stale_iat_rejected() {
        let (_, verifier) = hs_key();
        let jwt = sample(RegisteredClaims {
            iat: Some(1_000),
            ..Default::default()
        });
        let err = verify_signed_jwt(
            &jwt,
            &verifier,
            JwsAlgorithm::HS256,
            &VerificationConstraints {
                max_iat_age: Some(60),
                now: Some(2_000),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err.kind(), crate::error::ErrorKind::ClaimTiming(_)));
    }

    #[test]
    fn malformed_serialization() {
        let (_, verifier) = hs_key();
        let err = verify_signed_jwt(
            "onlyonepart",
            &verifier,
            JwsAlgorithm::HS256,
            &VerificationConstraints::default(),
        )
        .unwrap_err();
        assert!(matches!(err.kind(), crate::error::ErrorKind::JwtMalformed));
    }

    #[test]
    fn es256_cross_family_verify_rejected() {
        let (_, verifier) = hs_key();
        let ec = SigningKey::P256(p256::ecdsa::SigningKey::random(&mut rand::thread_rng()));
        let jwt = create_signed_jwt(
            &ec,
            &Header::from(JwsAlgorithm::ES256),
            &RegisteredClaims::default().into(),
        )
        .unwrap();
        // HMAC verifier handed an ES256 token: structural rejection.
        let err = verify_signed_jwt(
            &jwt,
            &verifier,
            JwsAlgorithm::ES256,
            &VerificationConstraints::default(),
        )
        .unwrap_err();
        assert!(matches!(err.kind(), crate::error::ErrorKind::UnsupportedKey));
    }
}
