//! Request builders for every endpoint the engine talks to.
//!
//! Builders compose client authentication and DPoP into plain
//! `http::Request<Vec<u8>>` values; sending them is the caller's transport.
//! Form bodies are serialized with `serde_html_form` from typed parameter
//! structs flattened next to the auth fields.

use http::{Method, Request};
use serde::Serialize;
use url::Url;

use crate::client_auth::{AppliedAuth, AuthBody, ClientAuthentication};
use crate::dpop::{DpopKey, DpopNonceCache, create_proof};
use crate::http_client::with_user_agent;
use crate::error::{OAuthError, Result};
use crate::types::{
    AuthorizationServer, AuthorizeOptions, BackchannelAuthenticationRequest, CibaGrant, Client,
    ClientCredentialsGrant, ClientMetadata, DeviceAuthorizationRequest, DeviceCodeGrant,
    GrantType, AuthorizationCodeGrant, RefreshTokenGrant, TokenExchangeGrant,
};

/// DPoP binding for one request: the bound key plus the caller's nonce cache.
#[derive(Clone, Copy)]
pub struct DpopSession<'a> {
    pub key: &'a DpopKey,
    pub nonces: &'a DpopNonceCache,
}

/// Which well-known document discovery targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryKind {
    /// `{issuer}{path}/.well-known/openid-configuration`
    OpenIdConfiguration,
    /// `{origin}/.well-known/oauth-authorization-server{path}` (RFC 8414
    /// path insertion)
    OAuthAuthorizationServer,
}

/// Token endpoint request, one variant per supported grant.
#[derive(Debug, Clone)]
pub enum TokenGrant {
    AuthorizationCode(AuthorizationCodeGrant),
    RefreshToken(RefreshTokenGrant),
    ClientCredentials(ClientCredentialsGrant),
    DeviceCode(DeviceCodeGrant),
    Ciba(CibaGrant),
    TokenExchange(TokenExchangeGrant),
    /// Extension grant: a caller-supplied `grant_type` URI with its parameters
    /// appended verbatim.
    Extension {
        grant_type: smol_str::SmolStr,
        parameters: Vec<(smol_str::SmolStr, smol_str::SmolStr)>,
    },
}

impl TokenGrant {
    pub fn grant_type(&self) -> &str {
        match self {
            Self::AuthorizationCode(_) => GrantType::AuthorizationCode.as_str(),
            Self::RefreshToken(_) => GrantType::RefreshToken.as_str(),
            Self::ClientCredentials(_) => GrantType::ClientCredentials.as_str(),
            Self::DeviceCode(_) => GrantType::DeviceCode.as_str(),
            Self::Ciba(_) => GrantType::Ciba.as_str(),
            Self::TokenExchange(_) => GrantType::TokenExchange.as_str(),
            Self::Extension { grant_type, .. } => grant_type,
        }
    }
}

#[derive(Serialize)]
struct FormPayload<'a, T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    grant_type: Option<&'a str>,
    #[serde(flatten)]
    auth: &'a AuthBody,
    #[serde(flatten)]
    parameters: T,
}

/// Server metadata document request. No auth and no DPoP; discovery happens
/// before either is negotiated.
pub fn discovery_request(issuer: &Url, kind: DiscoveryKind) -> Result<Request<Vec<u8>>> {
    let url = match kind {
        DiscoveryKind::OpenIdConfiguration => {
            let mut url = issuer.clone();
            let path = url.path().trim_end_matches('/').to_owned();
            url.set_path(&format!("{path}/.well-known/openid-configuration"));
            url
        }
        DiscoveryKind::OAuthAuthorizationServer => {
            let mut url = issuer.clone();
            let path = issuer.path().trim_end_matches('/');
            url.set_path(&format!("/.well-known/oauth-authorization-server{path}"));
            url
        }
    };
    get_json(&url)
}

/// Protected resource metadata request (RFC 9728), same path-insertion rule
/// as RFC 8414.
pub fn resource_discovery_request(resource: &Url) -> Result<Request<Vec<u8>>> {
    let mut url = resource.clone();
    let path = resource.path().trim_end_matches('/');
    url.set_path(&format!("/.well-known/oauth-protected-resource{path}"));
    get_json(&url)
}

/// Front-channel authorization URL with `response_type=code`. PKCE arrives
/// through `options.code_challenge`; the method is always S256.
pub fn authorization_url(
    server: &AuthorizationServer,
    client: &Client,
    options: &AuthorizeOptions,
) -> Result<Url> {
    let mut url = server.authorization_endpoint()?.clone();
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("response_type", "code");
        query.append_pair("client_id", &client.client_id);
        append_authorize_params(&mut query, options);
    }
    Ok(url)
}

fn append_authorize_params<'a>(
    query: &mut url::form_urlencoded::Serializer<'a, url::UrlQuery<'_>>,
    options: &AuthorizeOptions,
) {
    if let Some(redirect_uri) = &options.redirect_uri {
        query.append_pair("redirect_uri", redirect_uri.as_str());
    }
    if let Some(scope) = &options.scope {
        query.append_pair("scope", scope);
    }
    if let Some(state) = &options.state {
        query.append_pair("state", state);
    }
    if let Some(nonce) = &options.nonce {
        query.append_pair("nonce", nonce);
    }
    if let Some(challenge) = &options.code_challenge {
        query.append_pair("code_challenge", challenge);
        query.append_pair("code_challenge_method", "S256");
    }
    if let Some(prompt) = options.prompt {
        query.append_pair("prompt", prompt.as_str());
    }
    if let Some(login_hint) = &options.login_hint {
        query.append_pair("login_hint", login_hint);
    }
    for resource in &options.resource {
        query.append_pair("resource", resource);
    }
    for (key, value) in &options.extra {
        query.append_pair(key, value);
    }
}

/// Pushed authorization request (RFC 9126): the authorization parameters go
/// through the back channel with full client authentication.
pub fn par_request(
    server: &AuthorizationServer,
    client: &Client,
    auth: &ClientAuthentication,
    options: &AuthorizeOptions,
    dpop: Option<DpopSession<'_>>,
) -> Result<Request<Vec<u8>>> {
    let endpoint = server.require_endpoint(
        server.pushed_authorization_request_endpoint.as_ref(),
        "pushed_authorization_request_endpoint",
    )?;
    let applied = auth.apply(server, client, endpoint)?;

    // Reuse the front-channel serializer so PAR and redirect parameters
    // cannot drift apart.
    let mut scratch = Url::parse("http://invalid.invalid/").map_err(OAuthError::http_build)?;
    {
        let mut query = scratch.query_pairs_mut();
        query.append_pair("response_type", "code");
        append_authorize_params(&mut query, options);
    }
    let mut body = serde_html_form::to_string(&applied.body)?;
    if let Some(params) = scratch.query() {
        body.push('&');
        body.push_str(params);
    }
    form_request(endpoint, &applied, dpop, None, body)
}

pub fn token_request(
    server: &AuthorizationServer,
    client: &Client,
    auth: &ClientAuthentication,
    grant: &TokenGrant,
    dpop: Option<DpopSession<'_>>,
) -> Result<Request<Vec<u8>>> {
    let endpoint = server.token_endpoint()?;
    let applied = auth.apply(server, client, endpoint)?;
    let grant_type = Some(grant.grant_type());
    let body = match grant {
        TokenGrant::AuthorizationCode(params) => form_body(grant_type, &applied.body, params)?,
        TokenGrant::RefreshToken(params) => form_body(grant_type, &applied.body, params)?,
        TokenGrant::ClientCredentials(params) => form_body(grant_type, &applied.body, params)?,
        TokenGrant::DeviceCode(params) => form_body(grant_type, &applied.body, params)?,
        TokenGrant::Ciba(params) => form_body(grant_type, &applied.body, params)?,
        TokenGrant::TokenExchange(params) => form_body(grant_type, &applied.body, params)?,
        TokenGrant::Extension { grant_type, parameters } => {
            let mut body = serde_html_form::to_string(&applied.body)?;
            let mut query = url::form_urlencoded::Serializer::new(String::new());
            query.append_pair("grant_type", grant_type);
            for (key, value) in parameters {
                query.append_pair(key, value);
            }
            body.push('&');
            body.push_str(&query.finish());
            body
        }
    };
    form_request(endpoint, &applied, dpop, None, body)
}

#[derive(Serialize)]
struct IntrospectionParams<'a> {
    token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    token_type_hint: Option<&'a str>,
}

pub fn introspection_request(
    server: &AuthorizationServer,
    client: &Client,
    auth: &ClientAuthentication,
    token: &str,
    token_type_hint: Option<&str>,
) -> Result<Request<Vec<u8>>> {
    let endpoint = server.require_endpoint(
        server.introspection_endpoint.as_ref(),
        "introspection_endpoint",
    )?;
    let applied = auth.apply(server, client, endpoint)?;
    let body = form_body(None, &applied.body, IntrospectionParams { token, token_type_hint })?;
    form_request(endpoint, &applied, None, None, body)
}

pub fn revocation_request(
    server: &AuthorizationServer,
    client: &Client,
    auth: &ClientAuthentication,
    token: &str,
    token_type_hint: Option<&str>,
) -> Result<Request<Vec<u8>>> {
    let endpoint =
        server.require_endpoint(server.revocation_endpoint.as_ref(), "revocation_endpoint")?;
    let applied = auth.apply(server, client, endpoint)?;
    let body = form_body(None, &applied.body, IntrospectionParams { token, token_type_hint })?;
    form_request(endpoint, &applied, None, None, body)
}

pub fn device_authorization_request(
    server: &AuthorizationServer,
    client: &Client,
    auth: &ClientAuthentication,
    params: &DeviceAuthorizationRequest,
) -> Result<Request<Vec<u8>>> {
    let endpoint = server.require_endpoint(
        server.device_authorization_endpoint.as_ref(),
        "device_authorization_endpoint",
    )?;
    let applied = auth.apply(server, client, endpoint)?;
    let body = form_body(None, &applied.body, params)?;
    form_request(endpoint, &applied, None, None, body)
}

pub fn backchannel_authentication_request(
    server: &AuthorizationServer,
    client: &Client,
    auth: &ClientAuthentication,
    params: &BackchannelAuthenticationRequest,
) -> Result<Request<Vec<u8>>> {
    let endpoint = server.require_endpoint(
        server.backchannel_authentication_endpoint.as_ref(),
        "backchannel_authentication_endpoint",
    )?;
    let applied = auth.apply(server, client, endpoint)?;
    let body = form_body(None, &applied.body, params)?;
    form_request(endpoint, &applied, None, None, body)
}

/// Dynamic client registration (RFC 7591): a JSON body, optionally under an
/// initial access token.
pub fn registration_request(
    server: &AuthorizationServer,
    metadata: &ClientMetadata,
    initial_access_token: Option<&str>,
) -> Result<Request<Vec<u8>>> {
    let endpoint = server.require_endpoint(
        server.registration_endpoint.as_ref(),
        "registration_endpoint",
    )?;
    let mut builder = with_user_agent(
        Request::builder()
            .method(Method::POST)
            .uri(endpoint.as_str())
            .header(http::header::CONTENT_TYPE, "application/json")
            .header(http::header::ACCEPT, "application/json"),
    );
    if let Some(token) = initial_access_token {
        builder = builder.header(
            http::header::AUTHORIZATION,
            format!("Bearer {token}"),
        );
    }
    Ok(builder.body(serde_json::to_vec(metadata)?)?)
}

/// Token scheme on the UserInfo request; must match how the token was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessTokenScheme {
    Bearer,
    Dpop,
}

pub fn userinfo_request(
    server: &AuthorizationServer,
    access_token: &str,
    scheme: AccessTokenScheme,
    dpop: Option<DpopSession<'_>>,
) -> Result<Request<Vec<u8>>> {
    let endpoint =
        server.require_endpoint(server.userinfo_endpoint.as_ref(), "userinfo_endpoint")?;
    let mut builder = with_user_agent(
        Request::builder()
            .method(Method::GET)
            .uri(endpoint.as_str())
            .header(http::header::ACCEPT, "application/json, application/jwt"),
    );
    match scheme {
        AccessTokenScheme::Bearer => {
            builder = builder.header(http::header::AUTHORIZATION, format!("Bearer {access_token}"));
        }
        AccessTokenScheme::Dpop => {
            let session = dpop.ok_or_else(|| {
                OAuthError::config("a DPoP session is required for DPoP-bound access tokens")
            })?;
            let proof =
                create_proof(session.key, "GET", endpoint, session.nonces, Some(access_token))?;
            builder = builder
                .header(http::header::AUTHORIZATION, format!("DPoP {access_token}"))
                .header("DPoP", proof.as_str());
        }
    }
    Ok(builder.body(Vec::new())?)
}

fn get_json(url: &Url) -> Result<Request<Vec<u8>>> {
    Ok(with_user_agent(
        Request::builder()
            .method(Method::GET)
            .uri(url.as_str())
            .header(http::header::ACCEPT, "application/json"),
    )
    .body(Vec::new())?)
}

fn form_body<T: Serialize>(
    grant_type: Option<&str>,
    auth: &AuthBody,
    parameters: T,
) -> Result<String> {
    Ok(serde_html_form::to_string(FormPayload {
        grant_type,
        auth,
        parameters,
    })?)
}

fn form_request(
    endpoint: &Url,
    applied: &AppliedAuth,
    dpop: Option<DpopSession<'_>>,
    access_token: Option<&str>,
    body: String,
) -> Result<Request<Vec<u8>>> {
    let mut builder = with_user_agent(
        Request::builder()
            .method(Method::POST)
            .uri(endpoint.as_str())
            .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(http::header::ACCEPT, "application/json"),
    );
    if let Some(authorization) = &applied.authorization {
        builder = builder.header(http::header::AUTHORIZATION, authorization.as_str());
    }
    if let Some(session) = dpop {
        let proof = create_proof(session.key, "POST", endpoint, session.nonces, access_token)?;
        builder = builder.header("DPoP", proof.as_str());
    }
    Ok(builder.body(body.into_bytes())?)
}
