//! Response validators, one per endpoint.
//!
//! Every validator follows the same terminal-on-first-violation sequence:
//! HTTP status conformance, JSON top-level-object check, per-field shape
//! check, then the endpoint's domain cross-checks. Structured OAuth error
//! bodies and unresolved challenges surface as typed errors, never as parse
//! failures.

use http::{Response, StatusCode};
use smol_str::SmolStr;
use url::Url;

use crate::challenge::parse_www_authenticate;
use crate::error::{OAuthError, Result};
use crate::http_client::HttpClient;
use crate::jose::jws::Header;
use crate::jose::jwt::Claims;
use crate::jose::sign::SigningKey;
use crate::jose::verify::VerificationConstraints;
use crate::jose::{JwsAlgorithm, b64url_decode, jwe, split_compact, verify_signed_jwt};
use crate::jwks::{JwksCache, JwksOptions, select_key};
use crate::types::{
    AuthorizationServer, BackchannelAuthenticationResponse, Client, DeviceAuthorizationResponse,
    IntrospectionResponse, ParResponse, ProtectedResource, RegisteredClient,
    TokenEndpointResponse, TokenErrorBody, UserInfoResponse,
};

/// Discovery: 200, JSON object, and the advertised `issuer` must equal the
/// issuer the document was fetched for. The body is returned as parsed, with
/// unknown members preserved.
pub fn process_discovery_response(
    expected_issuer: &Url,
    response: &Response<Vec<u8>>,
) -> Result<AuthorizationServer> {
    expect_status(response, StatusCode::OK)?;
    let metadata: AuthorizationServer = parse_json(response, "authorization server metadata")?;
    if metadata.issuer.as_str() != expected_issuer.as_str() {
        return Err(OAuthError::issuer_mismatch()
            .with_context(SmolStr::new(metadata.issuer.as_str())));
    }
    Ok(metadata)
}

/// Resource discovery: same pattern, `resource` equality instead of `issuer`.
pub fn process_resource_discovery_response(
    expected_resource: &Url,
    response: &Response<Vec<u8>>,
) -> Result<ProtectedResource> {
    expect_status(response, StatusCode::OK)?;
    let metadata: ProtectedResource = parse_json(response, "protected resource metadata")?;
    if metadata.resource.as_str() != expected_resource.as_str() {
        return Err(OAuthError::claim_mismatch("resource")
            .with_context(SmolStr::new(metadata.resource.as_str())));
    }
    Ok(metadata)
}

/// Token endpoint: 200 or a structured error body (`authorization_pending`
/// and friends come out as [`OAuthError::is_polling`] errors). `token_type`
/// is normalized to lowercase. The ID Token, if any, is returned unverified;
/// callers pass the response through [`validate_id_token`].
pub fn process_token_response(response: &Response<Vec<u8>>) -> Result<TokenEndpointResponse> {
    expect_status(response, StatusCode::OK)?;
    let mut token: TokenEndpointResponse = parse_json(response, "token endpoint")?;
    token.token_type = token.token_type.to_lowercase().into();
    if token.token_type != "bearer" && token.token_type != "dpop" {
        return Err(OAuthError::json_shape("token endpoint")
            .with_context("unsupported `token_type` value"));
    }
    Ok(token)
}

/// Options for ID Token validation beyond the structural checks.
#[derive(Debug, Clone, Default)]
pub struct IdTokenExpectations {
    /// The `nonce` sent on the authorization request, if any.
    pub nonce: Option<SmolStr>,
    /// Require `auth_time` to be present (e.g. `max_age` was requested).
    pub require_auth_time: bool,
    /// Reject ID Tokens whose `iat` is older than this many seconds.
    pub max_iat_age: Option<i64>,
    /// Decryption key for JWE-wrapped ID Tokens.
    pub decryption_key: Option<SigningKey>,
    /// Clock injection; `None` means the wall clock.
    pub now: Option<i64>,
}

/// Verify the ID Token of a token response: JWKS-selected key, negotiated
/// algorithm only, `iss`/`aud`/`azp`/`exp`/`nonce` checks. Returns the
/// decoded claims.
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
pub async fn validate_id_token<C: HttpClient>(
    http: &C,
    server: &AuthorizationServer,
    client: &Client,
    cache: &mut JwksCache,
    token: &TokenEndpointResponse,
    expectations: &IdTokenExpectations,
) -> Result<Claims> {
    let Some(id_token) = token.id_token.as_deref() else {
        return Err(OAuthError::claim_missing("id_token"));
    };
    let claims = verify_server_jwt(
        http,
        server,
        cache,
        id_token,
        client.id_token_alg(),
        &VerificationConstraints {
            expected_iss: Some(server.issuer.as_str()),
            expected_aud: Some(&client.client_id),
            max_iat_age: expectations.max_iat_age,
            now: expectations.now,
            ..Default::default()
        },
        expectations.decryption_key.as_ref(),
    )
    .await?;

    if claims.registered.exp.is_none() {
        return Err(OAuthError::claim_missing("exp"));
    }
    if claims.registered.iat.is_none() {
        return Err(OAuthError::claim_missing("iat"));
    }
    if claims.registered.sub.is_none() {
        return Err(OAuthError::claim_missing("sub"));
    }
    // Multi-audience tokens must name this client in azp.
    if claims.registered.aud.as_ref().is_some_and(|aud| aud.len() > 1) {
        match claims.protocol.azp.as_deref() {
            Some(azp) if azp == client.client_id => {}
            Some(_) => return Err(OAuthError::claim_mismatch("azp")),
            None => return Err(OAuthError::claim_missing("azp")),
        }
    }
    match (&expectations.nonce, claims.protocol.nonce.as_deref()) {
        (Some(expected), Some(actual)) if expected == actual => {}
        (Some(_), Some(_)) => return Err(OAuthError::claim_mismatch("nonce")),
        (Some(_), None) => return Err(OAuthError::claim_missing("nonce")),
        (None, _) => {}
    }
    if expectations.require_auth_time && claims.protocol.auth_time.is_none() {
        return Err(OAuthError::claim_missing("auth_time"));
    }
    Ok(claims)
}

/// PAR: 201 Created.
pub fn process_par_response(response: &Response<Vec<u8>>) -> Result<ParResponse> {
    expect_status(response, StatusCode::CREATED)?;
    parse_json(response, "pushed authorization request endpoint")
}

/// Device authorization: 200.
pub fn process_device_authorization_response(
    response: &Response<Vec<u8>>,
) -> Result<DeviceAuthorizationResponse> {
    expect_status(response, StatusCode::OK)?;
    parse_json(response, "device authorization endpoint")
}

/// CIBA backchannel authentication: 200.
pub fn process_backchannel_authentication_response(
    response: &Response<Vec<u8>>,
) -> Result<BackchannelAuthenticationResponse> {
    expect_status(response, StatusCode::OK)?;
    parse_json(response, "backchannel authentication endpoint")
}

/// Introspection with a plain JSON body.
pub fn process_introspection_response(
    response: &Response<Vec<u8>>,
) -> Result<IntrospectionResponse> {
    expect_status(response, StatusCode::OK)?;
    parse_json(response, "introspection endpoint")
}

/// Introspection returned as a signed JWT (`application/token-introspection+jwt`):
/// the signature is validated against the server's JWKS before the
/// `token_introspection` claim is read.
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
pub async fn process_jwt_introspection_response<C: HttpClient>(
    http: &C,
    server: &AuthorizationServer,
    client: &Client,
    cache: &mut JwksCache,
    response: &Response<Vec<u8>>,
) -> Result<IntrospectionResponse> {
    expect_status(response, StatusCode::OK)?;
    let compact = std::str::from_utf8(response.body())
        .map_err(|_| OAuthError::json_shape("introspection endpoint"))?;
    let alg = client
        .introspection_signed_response_alg
        .unwrap_or(JwsAlgorithm::RS256);
    let claims = verify_server_jwt(
        http,
        server,
        cache,
        compact.trim(),
        alg,
        &VerificationConstraints {
            expected_iss: Some(server.issuer.as_str()),
            expected_aud: Some(&client.client_id),
            ..Default::default()
        },
        None,
    )
    .await?;
    let introspection = claims
        .extra
        .get("token_introspection")
        .cloned()
        .ok_or_else(|| OAuthError::claim_missing("token_introspection"))?;
    Ok(serde_json::from_value(introspection)
        .map_err(|_| OAuthError::json_shape("introspection endpoint"))?)
}

/// Revocation: 200, or the 204 some servers return; the body is ignored.
pub fn process_revocation_response(response: &Response<Vec<u8>>) -> Result<()> {
    if response.status() == StatusCode::OK || response.status() == StatusCode::NO_CONTENT {
        return Ok(());
    }
    Err(error_from_response(response))
}

/// Registration: 201 (or the 200 some servers return) with the issued
/// client_id and accepted metadata.
pub fn process_registration_response(response: &Response<Vec<u8>>) -> Result<RegisteredClient> {
    if response.status() != StatusCode::CREATED && response.status() != StatusCode::OK {
        return Err(error_from_response(response));
    }
    parse_json(response, "registration endpoint")
}

/// UserInfo with a plain JSON body. `expected_sub`, when the caller already
/// holds an ID Token, must equal the response `sub`.
pub fn process_userinfo_response(
    response: &Response<Vec<u8>>,
    expected_sub: Option<&str>,
) -> Result<UserInfoResponse> {
    expect_status(response, StatusCode::OK)?;
    let info: UserInfoResponse = parse_json(response, "userinfo endpoint")?;
    check_userinfo_sub(&info, expected_sub)?;
    Ok(info)
}

/// UserInfo returned as a JWT (`application/jwt`), verified against the
/// server's JWKS first.
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
pub async fn process_jwt_userinfo_response<C: HttpClient>(
    http: &C,
    server: &AuthorizationServer,
    client: &Client,
    cache: &mut JwksCache,
    response: &Response<Vec<u8>>,
    expected_sub: Option<&str>,
) -> Result<UserInfoResponse> {
    expect_status(response, StatusCode::OK)?;
    let compact = std::str::from_utf8(response.body())
        .map_err(|_| OAuthError::json_shape("userinfo endpoint"))?;
    let alg = client
        .userinfo_signed_response_alg
        .unwrap_or(JwsAlgorithm::RS256);
    let claims = verify_server_jwt(
        http,
        server,
        cache,
        compact.trim(),
        alg,
        &VerificationConstraints {
            expected_iss: Some(server.issuer.as_str()),
            expected_aud: Some(&client.client_id),
            ..Default::default()
        },
        None,
    )
    .await?;
    let mut claim_map = claims.extra;
    let sub = claims
        .registered
        .sub
        .ok_or_else(|| OAuthError::claim_missing("sub"))?;
    claim_map.remove("sub");
    let info = UserInfoResponse { sub, claims: claim_map };
    check_userinfo_sub(&info, expected_sub)?;
    Ok(info)
}

fn check_userinfo_sub(info: &UserInfoResponse, expected_sub: Option<&str>) -> Result<()> {
    match expected_sub {
        Some(expected) if info.sub != expected => Err(OAuthError::claim_mismatch("sub")),
        _ => Ok(()),
    }
}

/// Unwrap (if encrypted), select the verification key from the server's
/// JWKS, and verify a server-issued JWT under exactly one negotiated
/// algorithm.
async fn verify_server_jwt<C: HttpClient>(
    http: &C,
    server: &AuthorizationServer,
    cache: &mut JwksCache,
    compact: &str,
    alg: JwsAlgorithm,
    constraints: &VerificationConstraints<'_>,
    decryption_key: Option<&SigningKey>,
) -> Result<Claims> {
    let decrypted;
    let compact = if split_compact(compact, 5).is_ok() {
        let key = decryption_key.ok_or_else(|| {
            OAuthError::config("a decryption key is required for encrypted responses")
        })?;
        let (_, plaintext) = jwe::decrypt_jwe(compact, key)?;
        decrypted = String::from_utf8(plaintext).map_err(|_| OAuthError::jwt_malformed())?;
        decrypted.as_str()
    } else {
        compact
    };
    let segments = split_compact(compact, 3)?;
    let header: Header = serde_json::from_slice(&b64url_decode(segments[0])?)
        .map_err(|_| OAuthError::jwt_malformed())?;
    let jwks_uri = server.jwks_uri()?;
    let key = select_key(
        http,
        jwks_uri,
        cache,
        header.kid.as_deref(),
        alg,
        &JwksOptions {
            now: constraints.now,
            ..Default::default()
        },
    )
    .await?;
    let (_, claims) = verify_signed_jwt(compact, &key, alg, constraints)?;
    Ok(claims)
}

fn expect_status(response: &Response<Vec<u8>>, expected: StatusCode) -> Result<()> {
    if response.status() == expected {
        Ok(())
    } else {
        Err(error_from_response(response))
    }
}

/// Turn a non-conforming response into the most structured error available:
/// OAuth error body, then challenges, then the bare status.
pub(crate) fn error_from_response(response: &Response<Vec<u8>>) -> OAuthError {
    if let Ok(body) = serde_json::from_slice::<serde_json::Value>(response.body()) {
        if let Ok(parsed) = serde_json::from_value::<TokenErrorBody>(body.clone()) {
            return OAuthError::oauth_response(
                Some(response.status()),
                parsed.error,
                parsed.error_description,
                Some(body),
            );
        }
    }
    let values = response
        .headers()
        .get_all(http::header::WWW_AUTHENTICATE)
        .iter()
        .filter_map(|value| value.to_str().ok());
    if let Some(challenges) = parse_www_authenticate(values) {
        return OAuthError::challenge(challenges);
    }
    OAuthError::http_status(response.status())
}

fn parse_json<T: serde::de::DeserializeOwned>(
    response: &Response<Vec<u8>>,
    endpoint: &'static str,
) -> Result<T> {
    // Must be a JSON object at top level; arrays and scalars are rejected.
    let value: serde_json::Value = serde_json::from_slice(response.body())
        .map_err(|_| OAuthError::json_shape(endpoint))?;
    if !value.is_object() {
        return Err(OAuthError::json_shape(endpoint));
    }
    serde_json::from_value(value).map_err(|_| OAuthError::json_shape(endpoint))
}
