//! Authorization callback validation: plain query/fragment responses and
//! JARM (JWT-secured) responses.
//!
//! Terminal on first violation: duplicate parameters, implicit-flow
//! artifacts, `iss` mismatch, and state (CSRF) failures each abort before any
//! later check runs. A server-sent `error` parameter comes back as a
//! structured error value, not a parse failure.

use smol_str::SmolStr;
use url::Url;

use crate::error::{OAuthError, Result};
use crate::http_client::HttpClient;
use crate::jose::verify::VerificationConstraints;
use crate::jose::JwsAlgorithm;
use crate::jwks::JwksCache;
use crate::types::{AuthorizationServer, Client};

/// Caller-selected state handling.
#[derive(Debug, Clone, Copy, Default)]
pub enum StateCheck<'a> {
    /// The callback must carry exactly this state.
    Expect(&'a str),
    /// The callback must not carry state at all.
    #[default]
    None,
    /// No check; the caller takes responsibility.
    Skip,
}

/// Validated callback parameters. `state` is consumed during validation and
/// never re-exposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams(Vec<(SmolStr, SmolStr)>);

impl CallbackParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn code(&self) -> Option<&str> {
        self.get("code")
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Parameter pairs from a redirect URL's query (or, for callers that receive
/// fragment responses, the fragment parsed the same way).
pub fn params_from_query(url: &Url) -> Vec<(SmolStr, SmolStr)> {
    url.query_pairs()
        .map(|(key, value)| (SmolStr::new(key), SmolStr::new(value)))
        .collect()
}

/// Validate a plain (non-JARM) authorization response. JARM payloads (a
/// `response` parameter) must go through [`validate_jarm_response`] instead.
pub fn validate_auth_response(
    server: &AuthorizationServer,
    client: &Client,
    params: &[(SmolStr, SmolStr)],
    state: StateCheck<'_>,
) -> Result<CallbackParams> {
    if count(params, "response") > 0 {
        return Err(OAuthError::config(
            "JARM responses must be validated with validate_jarm_response",
        ));
    }
    validate_params(server, client, params, state)
}

/// Validate a JARM authorization response (JWT-secured, RFC 9101 companion):
/// the `response` JWT is verified against the server's JWKS under the
/// client's negotiated algorithm, then its claims are validated like plain
/// callback parameters.
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
pub async fn validate_jarm_response<C: HttpClient>(
    http: &C,
    server: &AuthorizationServer,
    client: &Client,
    cache: &mut JwksCache,
    params: &[(SmolStr, SmolStr)],
    state: StateCheck<'_>,
) -> Result<CallbackParams> {
    if count(params, "response") > 1 {
        return Err(OAuthError::duplicate_parameter("response"));
    }
    let Some((_, compact)) = params.iter().find(|(key, _)| key == "response") else {
        return Err(OAuthError::claim_missing("response"));
    };
    let alg = client
        .authorization_signed_response_alg
        .unwrap_or(JwsAlgorithm::RS256);
    let jwks_uri = server.jwks_uri()?;
    let segments = crate::jose::split_compact(compact, 3)?;
    let header: crate::jose::jws::Header =
        serde_json::from_slice(&crate::jose::b64url_decode(segments[0])?)
            .map_err(|_| OAuthError::jwt_malformed())?;
    let key = crate::jwks::select_key(
        http,
        jwks_uri,
        cache,
        header.kid.as_deref(),
        alg,
        &crate::jwks::JwksOptions::default(),
    )
    .await?;
    let (_, claims) = crate::jose::verify_signed_jwt(
        compact,
        &key,
        alg,
        &VerificationConstraints {
            expected_iss: Some(server.issuer.as_str()),
            expected_aud: Some(&client.client_id),
            ..Default::default()
        },
    )?;

    // JARM claims become the parameter set; iss re-enters so the iss check
    // applies uniformly.
    let mut pairs: Vec<(SmolStr, SmolStr)> = Vec::new();
    if let Some(iss) = &claims.registered.iss {
        pairs.push(("iss".into(), iss.clone()));
    }
    for (key, value) in &claims.extra {
        let value: SmolStr = match value {
            serde_json::Value::String(s) => s.into(),
            other => smol_str::format_smolstr!("{other}"),
        };
        pairs.push((SmolStr::new(key), value));
    }
    validate_params(server, client, &pairs, state)
}

fn validate_params(
    server: &AuthorizationServer,
    _client: &Client,
    params: &[(SmolStr, SmolStr)],
    state: StateCheck<'_>,
) -> Result<CallbackParams> {
    for name in ["code", "state", "iss", "error", "error_description", "error_uri"] {
        if count(params, name) > 1 {
            return Err(OAuthError::duplicate_parameter(name));
        }
    }
    // Tokens on the front channel mean an implicit or hybrid response.
    if params.iter().any(|(key, _)| key == "id_token" || key == "token") {
        return Err(OAuthError::implicit_flow());
    }

    let iss = params.iter().find(|(key, _)| key == "iss").map(|(_, v)| v);
    if server.authorization_response_iss_parameter_supported == Some(true) && iss.is_none() {
        return Err(OAuthError::claim_missing("iss"));
    }
    if let Some(iss) = iss {
        if iss != server.issuer.as_str() {
            return Err(OAuthError::issuer_mismatch().with_context(iss.clone()));
        }
    }

    let actual_state = params.iter().find(|(key, _)| key == "state").map(|(_, v)| v);
    match (state, actual_state) {
        (StateCheck::Expect(expected), Some(actual)) if actual == expected => {}
        (StateCheck::Expect(_), _) => return Err(OAuthError::state_mismatch()),
        (StateCheck::None, Some(_)) => return Err(OAuthError::state_mismatch()),
        (StateCheck::None, None) | (StateCheck::Skip, _) => {}
    }

    if let Some((_, error)) = params.iter().find(|(key, _)| key == "error") {
        let description = params
            .iter()
            .find(|(key, _)| key == "error_description")
            .map(|(_, v)| v.clone());
        return Err(OAuthError::oauth_response(None, error.clone(), description, None));
    }

    Ok(CallbackParams(
        params
            .iter()
            .filter(|(key, _)| key != "state")
            .cloned()
            .collect(),
    ))
}

fn count(params: &[(SmolStr, SmolStr)], name: &str) -> usize {
    params.iter().filter(|(key, _)| key == name).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn server() -> AuthorizationServer {
        AuthorizationServer::new(Url::parse("https://as.example.com/").unwrap())
    }

    fn client() -> Client {
        Client::new("rp")
    }

    fn pairs(query: &str) -> Vec<(SmolStr, SmolStr)> {
        params_from_query(&Url::parse(&format!("https://app.example.com/cb?{query}")).unwrap())
    }

    #[test]
    fn code_and_matching_state() {
        let validated = validate_auth_response(
            &server(),
            &client(),
            &pairs("code=foo&state=foo"),
            StateCheck::Expect("foo"),
        )
        .unwrap();
        // State is consumed; only the code remains.
        assert_eq!(validated.code(), Some("foo"));
        assert_eq!(validated.get("state"), None);
        assert_eq!(validated.len(), 1);
    }

    #[test]
    fn implicit_artifacts_always_rejected() {
        for state in [StateCheck::Expect("foo"), StateCheck::None, StateCheck::Skip] {
            let err = validate_auth_response(
                &server(),
                &client(),
                &pairs("code=foo&id_token=foo"),
                state,
            )
            .unwrap_err();
            assert_eq!(err.to_string(), "implicit and hybrid flows are not supported");
        }
    }

    #[test]
    fn duplicate_state_always_rejected() {
        for state in [StateCheck::Expect("foo"), StateCheck::Skip] {
            let err = validate_auth_response(
                &server(),
                &client(),
                &pairs("state=foo&state=foo"),
                state,
            )
            .unwrap_err();
            assert_eq!(err.to_string(), "\"state\" parameter must be provided only once");
        }
    }

    #[test]
    fn state_modes() {
        // Missing state against an expectation.
        let err = validate_auth_response(
            &server(),
            &client(),
            &pairs("code=foo"),
            StateCheck::Expect("foo"),
        )
        .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::StateMismatch));

        // Unexpected state when none was sent.
        let err = validate_auth_response(
            &server(),
            &client(),
            &pairs("code=foo&state=foo"),
            StateCheck::None,
        )
        .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::StateMismatch));

        // Skip mode lets both through.
        validate_auth_response(&server(), &client(), &pairs("code=foo&state=x"), StateCheck::Skip)
            .unwrap();
    }

    #[test]
    fn error_parameter_becomes_structured_value() {
        let err = validate_auth_response(
            &server(),
            &client(),
            &pairs("error=access_denied&error_description=nope&state=foo"),
            StateCheck::Expect("foo"),
        )
        .unwrap_err();
        match err.kind() {
            ErrorKind::OAuthResponse { status, error, error_description, .. } => {
                assert_eq!(*status, None);
                assert_eq!(error, "access_denied");
                assert_eq!(error_description.as_deref(), Some("nope"));
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn iss_checked_when_present_and_required_when_declared() {
        let err = validate_auth_response(
            &server(),
            &client(),
            &pairs("code=foo&iss=https%3A%2F%2Fevil.example.com%2F"),
            StateCheck::Skip,
        )
        .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::IssuerMismatch));

        let mut declared = server();
        declared.authorization_response_iss_parameter_supported = Some(true);
        let err = validate_auth_response(&declared, &client(), &pairs("code=foo"), StateCheck::Skip)
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ClaimMissing(_)));

        validate_auth_response(
            &declared,
            &client(),
            &pairs("code=foo&iss=https%3A%2F%2Fas.example.com%2F"),
            StateCheck::Skip,
        )
        .unwrap();
    }

    #[test]
    fn jarm_payload_rejected_by_plain_validator() {
        let err = validate_auth_response(
            &server(),
            &client(),
            &pairs("response=eyJ.eyJ.sig"),
            StateCheck::Skip,
        )
        .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Config(_)));
    }

    mod jarm {
        use super::*;
        use crate::http_client::tests::MockClient;
        use crate::jose::jwk::{JwkSet, public_jwk};
        use crate::jose::jwt::{Audience, Claims, RegisteredClaims};
        use crate::jose::sign::{SigningKey, create_signed_jwt};
        use crate::jose::jws::Header;

        #[tokio::test]
        async fn verified_jarm_claims_become_params() {
            let key = SigningKey::P256(p256::ecdsa::SigningKey::random(&mut rand::thread_rng()));
            let mut jwk = public_jwk(&key).unwrap();
            jwk.kid = Some("jarm".into());
            let jwks = JwkSet { keys: vec![jwk] };

            let mut server = server();
            server.jwks_uri = Some(Url::parse("https://as.example.com/jwks").unwrap());
            let mut client_cfg = client();
            client_cfg.authorization_signed_response_alg = Some(JwsAlgorithm::ES256);

            let mut claims = Claims::from(RegisteredClaims {
                iss: Some("https://as.example.com/".into()),
                aud: Some(Audience::Single("rp".into())),
                exp: Some(i64::MAX),
                ..Default::default()
            });
            claims.extra.insert("code".into(), "jarm-code".into());
            claims.extra.insert("state".into(), "st".into());
            let mut header = Header::from(JwsAlgorithm::ES256);
            header.kid = Some("jarm".into());
            let response_jwt = create_signed_jwt(&key, &header, &claims).unwrap();

            let params = vec![("response".into(), SmolStr::new(&response_jwt))];
            let http = MockClient::new(vec![MockClient::json(
                200,
                serde_json::to_vec(&jwks).unwrap(),
            )]);
            let mut cache = JwksCache::new();
            let validated = validate_jarm_response(
                &http,
                &server,
                &client_cfg,
                &mut cache,
                &params,
                StateCheck::Expect("st"),
            )
            .await
            .unwrap();
            assert_eq!(validated.code(), Some("jarm-code"));
            assert_eq!(validated.get("state"), None);
        }
    }
}
