//! JWE compact decryption for the response subset this engine accepts:
//! key management `ECDH-ES` (direct agreement over P-256), `RSA-OAEP`,
//! `RSA-OAEP-256`, and `dir`; content encryption `A128GCM` and `A256GCM`.
//!
//! Decryption only. The engine never produces JWEs; encrypted ID Tokens,
//! UserInfo responses, and introspection responses arrive from the server and
//! are unwrapped here before the inner JWS is verified.

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, KeyInit, Nonce};
use p256::elliptic_curve::sec1::FromEncodedPoint;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use super::jws::Header;
use super::sign::SigningKey;
use super::{b64url_decode, split_compact};
use crate::error::{OAuthError, Result};

/// Decrypt a compact JWE with the recipient's private key, returning the
/// protected header and plaintext. The plaintext of a Nested JWT is the inner
/// compact JWS, which callers verify separately.
pub fn decrypt_jwe(compact: &str, key: &SigningKey) -> Result<(Header, Vec<u8>)> {
    let segments = split_compact(compact, 5)?;
    let header: Header = serde_json::from_slice(&b64url_decode(segments[0])?)
        .map_err(|e| OAuthError::jwt_malformed().with_context(smol_str::format_smolstr!("{e}")))?;
    let encrypted_key = b64url_decode(segments[1])?;
    let iv = b64url_decode(segments[2])?;
    let ciphertext = b64url_decode(segments[3])?;
    let tag = b64url_decode(segments[4])?;

    let Some(enc) = header.enc.as_deref() else {
        return Err(OAuthError::jwt_malformed().with_context("JWE header is missing \"enc\""));
    };
    let cek_len = match enc {
        "A128GCM" => 16,
        "A256GCM" => 32,
        other => return Err(OAuthError::unsupported_algorithm(other)),
    };

    let cek = unwrap_cek(&header, key, &encrypted_key, cek_len)?;
    if cek.len() != cek_len {
        return Err(OAuthError::jwe_decryption()
            .with_context("content encryption key has the wrong length"));
    }
    if iv.len() != 12 {
        return Err(OAuthError::jwe_decryption().with_context("GCM IV must be 96 bits"));
    }

    // AAD is the ASCII of the protected header segment, per RFC 7516 §5.1.
    let mut sealed = ciphertext;
    sealed.extend_from_slice(&tag);
    let payload = Payload {
        msg: &sealed,
        aad: segments[0].as_bytes(),
    };
    let nonce = Nonce::from_slice(&iv);
    let plaintext = match enc {
        "A128GCM" => Aes128Gcm::new_from_slice(&cek)
            .map_err(|_| OAuthError::jwe_decryption())?
            .decrypt(nonce, payload),
        _ => Aes256Gcm::new_from_slice(&cek)
            .map_err(|_| OAuthError::jwe_decryption())?
            .decrypt(nonce, payload),
    }
    .map_err(|_| OAuthError::jwe_decryption())?;
    Ok((header, plaintext))
}

fn unwrap_cek(
    header: &Header,
    key: &SigningKey,
    encrypted_key: &[u8],
    cek_len: usize,
) -> Result<Vec<u8>> {
    match (header.alg.as_str(), key) {
        ("dir", SigningKey::Hmac(secret)) => {
            if !encrypted_key.is_empty() {
                return Err(OAuthError::jwt_malformed()
                    .with_context("\"dir\" requires an empty encrypted key"));
            }
            Ok(secret.clone())
        }
        ("RSA-OAEP", SigningKey::Rsa(key)) => key
            .decrypt(rsa::Oaep::new::<Sha1>(), encrypted_key)
            .map_err(|_| OAuthError::jwe_decryption()),
        ("RSA-OAEP-256", SigningKey::Rsa(key)) => key
            .decrypt(rsa::Oaep::new::<Sha256>(), encrypted_key)
            .map_err(|_| OAuthError::jwe_decryption()),
        ("ECDH-ES", SigningKey::P256(key)) => {
            if !encrypted_key.is_empty() {
                return Err(OAuthError::jwt_malformed()
                    .with_context("\"ECDH-ES\" requires an empty encrypted key"));
            }
            let Some(epk) = header.epk.as_ref() else {
                return Err(OAuthError::jwt_malformed()
                    .with_context("JWE header is missing \"epk\""));
            };
            if epk.kty != "EC" || epk.crv.as_deref() != Some("P-256") {
                return Err(OAuthError::unsupported_key().with_context("epk must be EC P-256"));
            }
            let x = b64url_decode(epk.x.as_deref().unwrap_or_default())?;
            let y = b64url_decode(epk.y.as_deref().unwrap_or_default())?;
            if x.len() != 32 || y.len() != 32 {
                return Err(OAuthError::unsupported_key()
                    .with_context("bad P-256 coordinate length"));
            }
            let point = p256::EncodedPoint::from_affine_coordinates(
                p256::FieldBytes::from_slice(&x),
                p256::FieldBytes::from_slice(&y),
                false,
            );
            let public: p256::PublicKey = Option::from(p256::PublicKey::from_encoded_point(&point))
                .ok_or_else(|| OAuthError::unsupported_key().with_context("point not on P-256"))?;
            let shared =
                p256::ecdh::diffie_hellman(key.as_nonzero_scalar(), public.as_affine());
            let apu = header.apu.as_deref().map(b64url_decode).transpose()?;
            let apv = header.apv.as_deref().map(b64url_decode).transpose()?;
            let enc = header.enc.as_deref().unwrap_or_default();
            Ok(concat_kdf(
                shared.raw_secret_bytes().as_slice(),
                enc,
                apu.as_deref().unwrap_or_default(),
                apv.as_deref().unwrap_or_default(),
                cek_len,
            ))
        }
        (alg, _) => Err(OAuthError::unsupported_algorithm(alg)
            .with_context("key cannot unwrap this JWE")),
    }
}

/// NIST SP 800-56A Concat KDF as profiled by RFC 7518 §4.6. Output never
/// exceeds one SHA-256 block for the supported `enc` values, so a single
/// round suffices.
fn concat_kdf(z: &[u8], alg_id: &str, apu: &[u8], apv: &[u8], out_len: usize) -> Vec<u8> {
    debug_assert!(out_len <= 32);
    let mut hasher = Sha256::new();
    hasher.update(1u32.to_be_bytes());
    hasher.update(z);
    hasher.update((alg_id.len() as u32).to_be_bytes());
    hasher.update(alg_id.as_bytes());
    hasher.update((apu.len() as u32).to_be_bytes());
    hasher.update(apu);
    hasher.update((apv.len() as u32).to_be_bytes());
    hasher.update(apv);
    hasher.update(((out_len * 8) as u32).to_be_bytes());
    hasher.finalize()[..out_len].to_vec()
}
