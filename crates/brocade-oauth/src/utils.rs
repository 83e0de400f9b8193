use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::rngs::ThreadRng;
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use smol_str::SmolStr;
use std::cmp::Ordering;

/// Number of raw random bytes behind every generated state/nonce/verifier.
const RANDOM_BYTES: usize = 32;

pub fn generate_random_state() -> SmolStr {
    random_base64url()
}

pub fn generate_random_nonce() -> SmolStr {
    random_base64url()
}

/// PKCE code verifier, 43 base64url characters of 32 random bytes.
pub fn generate_random_code_verifier() -> SmolStr {
    random_base64url()
}

fn random_base64url() -> SmolStr {
    URL_SAFE_NO_PAD
        .encode(get_random_values::<_, RANDOM_BYTES>(&mut ThreadRng::default()))
        .into()
}

pub fn get_random_values<R, const LEN: usize>(rng: &mut R) -> [u8; LEN]
where
    R: RngCore + CryptoRng,
{
    let mut bytes = [0u8; LEN];
    rng.fill_bytes(&mut bytes);
    bytes
}

/// S256 code challenge for a previously generated verifier.
///
/// https://datatracker.ietf.org/doc/html/rfc7636#section-4.2
pub fn calculate_pkce_code_challenge(verifier: &str) -> SmolStr {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes())).into()
}

pub fn generate_pkce() -> (SmolStr, SmolStr) {
    // https://datatracker.ietf.org/doc/html/rfc7636#section-4.1
    let verifier = generate_random_code_verifier();
    (calculate_pkce_code_challenge(&verifier), verifier)
}

// 256K > ES (256 > 384 > 512) > PS (256 > 384 > 512) > RS (256 > 384 > 512) > other (in original order)
pub fn compare_algos(a: &SmolStr, b: &SmolStr) -> Ordering {
    if a.as_str() == "ES256K" {
        return Ordering::Less;
    }
    if b.as_str() == "ES256K" {
        return Ordering::Greater;
    }
    for prefix in ["ES", "PS", "RS"] {
        if let Some(stripped_a) = a.strip_prefix(prefix) {
            if let Some(stripped_b) = b.strip_prefix(prefix) {
                if let (Ok(len_a), Ok(len_b)) =
                    (stripped_a.parse::<u32>(), stripped_b.parse::<u32>())
                {
                    return len_a.cmp(&len_b);
                }
            } else {
                return Ordering::Less;
            }
        } else if b.starts_with(prefix) {
            return Ordering::Greater;
        }
    }
    Ordering::Equal
}

/// Origin (scheme + host + port) of a URL, the key space for DPoP nonces.
pub fn url_origin(url: &url::Url) -> SmolStr {
    match url.port() {
        Some(port) => smol_str::format_smolstr!("{}://{}:{port}", url.scheme(), url.host_str().unwrap_or_default()),
        None => smol_str::format_smolstr!("{}://{}", url.scheme(), url.host_str().unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pkce_rfc7636_vector() {
        assert_eq!(
            calculate_pkce_code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn random_values_decode_to_32_bytes() {
        use base64::Engine;
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        for value in [
            generate_random_state(),
            generate_random_nonce(),
            generate_random_code_verifier(),
        ] {
            let raw = URL_SAFE_NO_PAD.decode(value.as_bytes()).unwrap();
            assert_eq!(raw.len(), 32);
        }
    }

    #[test]
    fn algo_preference_order() {
        let mut algs: Vec<SmolStr> = ["RS256", "PS256", "ES256"]
            .into_iter()
            .map(SmolStr::new)
            .collect();
        algs.sort_by(compare_algos);
        assert_eq!(algs[0], "ES256");
        assert_eq!(algs[2], "RS256");
    }

    #[test]
    fn origin_strips_path_and_keeps_port() {
        let url = url::Url::parse("https://as.example.com:8443/token?x=1").unwrap();
        assert_eq!(url_origin(&url), "https://as.example.com:8443");
        let url = url::Url::parse("https://as.example.com/token").unwrap();
        assert_eq!(url_origin(&url), "https://as.example.com");
    }
}
