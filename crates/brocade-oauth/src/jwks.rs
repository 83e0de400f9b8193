//! JWKS fetching, caching, and key selection.
//!
//! The cache is caller-owned and passed back in on every call; the engine
//! mutates it in place and never locks it. Two policy constants bound
//! staleness: [`DEFAULT_MAX_AGE`] forces a refetch no matter how well the
//! cached set is serving, so a rotated-out key cannot stay trusted forever,
//! and [`DEFAULT_COOLDOWN`] rate-limits refetches triggered by selection
//! misses, so a flood of unknown-`kid` tokens cannot hammer the `jwks_uri`.

use http::Method;
use smol_str::SmolStr;
use url::Url;

use crate::error::{OAuthError, Result};
use crate::http_client::HttpClient;
use crate::jose::JwsAlgorithm;
use crate::jose::jwk::{Jwk, JwkSet, VerifyingKey};

/// Unconditional refetch age, seconds.
pub const DEFAULT_MAX_AGE: i64 = 300;
/// Minimum age before a selection miss may trigger a refetch, seconds.
pub const DEFAULT_COOLDOWN: i64 = 60;

/// Caller-owned key set cache. Starts empty; the selector populates and
/// refreshes it. Internal shape is not a stable API beyond "pass it back in".
#[derive(Debug, Clone, Default)]
pub struct JwksCache {
    keys: JwkSet,
    fetched_at: Option<i64>,
}

impl JwksCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate, e.g. from out-of-band key distribution.
    pub fn with_keys(keys: JwkSet, fetched_at: i64) -> Self {
        Self {
            keys,
            fetched_at: Some(fetched_at),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fetched_at.is_none()
    }
}

/// Per-call overrides for the process-wide policy defaults.
#[derive(Debug, Clone)]
pub struct JwksOptions {
    pub max_age: i64,
    pub cooldown: i64,
    /// Clock injection; `None` means the wall clock.
    pub now: Option<i64>,
}

impl Default for JwksOptions {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_MAX_AGE,
            cooldown: DEFAULT_COOLDOWN,
            now: None,
        }
    }
}

/// Select the verification key for (`kid`, `alg`), fetching or refreshing the
/// cached set as the staleness policy dictates.
///
/// With a `kid` the match must be unique on `kid`; without one, exactly one
/// cached key may be compatible with `alg`. More than one compatible key and
/// no `kid` is a terminal error, not a refetch trigger.
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(kid, %alg)))]
pub async fn select_key<C: HttpClient>(
    client: &C,
    jwks_uri: &Url,
    cache: &mut JwksCache,
    kid: Option<&str>,
    alg: JwsAlgorithm,
    options: &JwksOptions,
) -> Result<VerifyingKey> {
    let now = options.now.unwrap_or_else(|| chrono::Utc::now().timestamp());

    let mut freshly_fetched = false;
    match cache.fetched_at {
        None => {
            cache.keys = fetch_jwks(client, jwks_uri).await?;
            cache.fetched_at = Some(now);
            freshly_fetched = true;
        }
        Some(fetched_at) if now - fetched_at >= options.max_age => {
            #[cfg(feature = "tracing")]
            tracing::debug!(age = now - fetched_at, "cached JWKS hit max age, refetching");
            cache.keys = fetch_jwks(client, jwks_uri).await?;
            cache.fetched_at = Some(now);
            freshly_fetched = true;
        }
        Some(_) => {}
    }

    match pick(&cache.keys, kid, alg) {
        Ok(key) => return key.to_verifying_key(alg),
        Err(Miss::Ambiguous) => return Err(OAuthError::keys_ambiguous()),
        Err(Miss::None) => {}
    }

    // One refetch-and-retry on a miss, but only when the set is old enough.
    let age = now - cache.fetched_at.unwrap_or(now);
    if !freshly_fetched && age >= options.cooldown {
        cache.keys = fetch_jwks(client, jwks_uri).await?;
        cache.fetched_at = Some(now);
        return match pick(&cache.keys, kid, alg) {
            Ok(key) => key.to_verifying_key(alg),
            Err(Miss::Ambiguous) => Err(OAuthError::keys_ambiguous()),
            Err(Miss::None) => Err(OAuthError::keys_none()),
        };
    }
    Err(OAuthError::keys_none())
}

enum Miss {
    None,
    Ambiguous,
}

fn pick<'a>(keys: &'a JwkSet, kid: Option<&str>, alg: JwsAlgorithm) -> core::result::Result<&'a Jwk, Miss> {
    let mut candidates = keys
        .keys
        .iter()
        .filter(|key| key.is_candidate_for(alg))
        .filter(|key| match kid {
            Some(kid) => key.kid.as_deref() == Some(kid),
            None => true,
        });
    match (candidates.next(), candidates.next()) {
        (Some(key), None) => Ok(key),
        (Some(_), Some(_)) => Err(Miss::Ambiguous),
        (None, _) => Err(Miss::None),
    }
}

pub(crate) async fn fetch_jwks<C: HttpClient>(client: &C, jwks_uri: &Url) -> Result<JwkSet> {
    let request = crate::http_client::with_user_agent(
        http::Request::builder()
            .method(Method::GET)
            .uri(jwks_uri.as_str())
            .header(http::header::ACCEPT, "application/json"),
    )
    .body(Vec::new())?;
    let response = client
        .send_http(request)
        .await
        .map_err(|e| OAuthError::transport(Box::new(e)).with_url(SmolStr::new(jwks_uri.as_str())))?;
    if !response.status().is_success() {
        return Err(OAuthError::http_status(response.status())
            .with_url(SmolStr::new(jwks_uri.as_str())));
    }
    let set: JwkSet = serde_json::from_slice(response.body())
        .map_err(|_| OAuthError::json_shape("jwks_uri").with_url(SmolStr::new(jwks_uri.as_str())))?;
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::http_client::tests::MockClient;

    fn rsa_jwk(kid: &str) -> Jwk {
        Jwk {
            kty: "RSA".into(),
            kid: Some(kid.into()),
            n: Some(
                "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw"
                    .into(),
            ),
            e: Some("AQAB".into()),
            ..Default::default()
        }
    }

    fn jwks_body(keys: &[Jwk]) -> Vec<u8> {
        serde_json::to_vec(&JwkSet { keys: keys.to_vec() }).unwrap()
    }

    fn uri() -> Url {
        Url::parse("https://as.example.com/jwks").unwrap()
    }

    #[tokio::test]
    async fn fresh_cache_serves_without_fetching() {
        let client = MockClient::new(vec![]);
        let mut cache = JwksCache::with_keys(
            JwkSet {
                keys: vec![rsa_jwk("a")],
            },
            1_000,
        );
        let options = JwksOptions {
            now: Some(1_000 + 299),
            ..Default::default()
        };
        select_key(&client, &uri(), &mut cache, Some("a"), JwsAlgorithm::RS256, &options)
            .await
            .unwrap();
        assert_eq!(client.requests_sent(), 0);
    }

    #[tokio::test]
    async fn max_age_forces_refetch() {
        // The refetched set no longer contains the key; selection must fail
        // even though the stale cache would have satisfied it.
        let client = MockClient::new(vec![MockClient::json(200, jwks_body(&[]))]);
        let mut cache = JwksCache::with_keys(
            JwkSet {
                keys: vec![rsa_jwk("a")],
            },
            1_000,
        );
        let options = JwksOptions {
            now: Some(1_000 + 300),
            ..Default::default()
        };
        let err = select_key(&client, &uri(), &mut cache, Some("a"), JwsAlgorithm::RS256, &options)
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::KeysNone));
        assert_eq!(client.requests_sent(), 1);
    }

    #[tokio::test]
    async fn miss_inside_cooldown_does_not_refetch() {
        let client = MockClient::new(vec![]);
        let mut cache = JwksCache::with_keys(
            JwkSet {
                keys: vec![rsa_jwk("a")],
            },
            1_000,
        );
        let options = JwksOptions {
            now: Some(1_000 + 59),
            ..Default::default()
        };
        let err = select_key(&client, &uri(), &mut cache, Some("unknown"), JwsAlgorithm::RS256, &options)
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::KeysNone));
        assert_eq!(client.requests_sent(), 0);
    }

    #[tokio::test]
    async fn miss_after_cooldown_refetches_and_recovers() {
        let client = MockClient::new(vec![MockClient::json(
            200,
            jwks_body(&[rsa_jwk("a"), rsa_jwk("rotated-in")]),
        )]);
        let mut cache = JwksCache::with_keys(
            JwkSet {
                keys: vec![rsa_jwk("a")],
            },
            1_000,
        );
        let options = JwksOptions {
            now: Some(1_000 + 60),
            ..Default::default()
        };
        select_key(
            &client,
            &uri(),
            &mut cache,
            Some("rotated-in"),
            JwsAlgorithm::RS256,
            &options,
        )
        .await
        .unwrap();
        assert_eq!(client.requests_sent(), 1);
    }

    #[tokio::test]
    async fn empty_cache_fetches_first() {
        let client = MockClient::new(vec![MockClient::json(200, jwks_body(&[rsa_jwk("a")]))]);
        let mut cache = JwksCache::new();
        let options = JwksOptions {
            now: Some(1_000),
            ..Default::default()
        };
        select_key(&client, &uri(), &mut cache, None, JwsAlgorithm::RS256, &options)
            .await
            .unwrap();
        assert!(!cache.is_empty());
    }

    #[tokio::test]
    async fn fetch_carries_engine_headers() {
        let client = MockClient::new(vec![MockClient::json(200, jwks_body(&[rsa_jwk("a")]))]);
        let mut cache = JwksCache::new();
        let options = JwksOptions {
            now: Some(1_000),
            ..Default::default()
        };
        select_key(&client, &uri(), &mut cache, Some("a"), JwsAlgorithm::RS256, &options)
            .await
            .unwrap();
        let requests = client.take_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method(), &Method::GET);
        assert_eq!(requests[0].uri(), "https://as.example.com/jwks");
        assert_eq!(
            requests[0].headers().get(http::header::ACCEPT).unwrap(),
            "application/json"
        );
        let agent = requests[0].headers().get(http::header::USER_AGENT).unwrap();
        assert!(agent.to_str().unwrap().starts_with("brocade-oauth/"));
    }

    #[tokio::test]
    async fn two_candidates_without_kid_is_ambiguous() {
        let client = MockClient::new(vec![]);
        let mut cache = JwksCache::with_keys(
            JwkSet {
                keys: vec![rsa_jwk("a"), rsa_jwk("b")],
            },
            1_000,
        );
        let options = JwksOptions {
            now: Some(1_000),
            ..Default::default()
        };
        let err = select_key(&client, &uri(), &mut cache, None, JwsAlgorithm::RS256, &options)
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::KeysAmbiguous));
        assert_eq!(
            err.to_string(),
            "multiple applicable keys found, a kid is required"
        );
    }
}
