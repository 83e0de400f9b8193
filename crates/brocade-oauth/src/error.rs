use http::StatusCode;
use serde_json::Value;
use smol_str::SmolStr;

use crate::challenge::WwwAuthenticateChallenge;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error for all engine operations: request building, signing, and response
/// validation.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("{kind}")]
pub struct OAuthError {
    #[diagnostic_source]
    kind: ErrorKind,
    #[source]
    source: Option<BoxError>,
    #[help]
    help: Option<SmolStr>,
    context: Option<SmolStr>,
    url: Option<SmolStr>,
}

/// Error categories, grouped by the recovery they admit.
///
/// Configuration and unsupported-operation kinds are local and never worth
/// retrying. Protocol kinds mean a response violated an invariant and must be
/// surfaced. `OAuthResponse` carries a structured error body the server chose
/// to return; `Challenge` carries unresolved `WWW-Authenticate` challenges.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ErrorKind {
    /// Missing or malformed caller-supplied configuration
    #[error("invalid configuration: {0}")]
    #[diagnostic(code(brocade_oauth::config))]
    Config(SmolStr),

    /// No endpoint available
    #[error("no {0} endpoint available")]
    #[diagnostic(
        code(brocade_oauth::no_endpoint),
        help("server metadata does not advertise this endpoint")
    )]
    NoEndpoint(SmolStr),

    /// Unsupported client authentication method
    #[error("unsupported client authentication method")]
    #[diagnostic(code(brocade_oauth::unsupported_auth_method))]
    UnsupportedAuthMethod,

    /// JOSE algorithm not supported by this build
    #[error("unsupported JOSE algorithm: {0}")]
    #[diagnostic(code(brocade_oauth::unsupported_algorithm))]
    UnsupportedAlgorithm(SmolStr),

    /// Key incompatible with the requested operation
    #[error("key is not usable for this operation")]
    #[diagnostic(code(brocade_oauth::unsupported_key))]
    UnsupportedKey,

    /// RSA key below the floor required for JOSE signing
    #[error("modulusLength must be at least 2048 bits")]
    #[diagnostic(code(brocade_oauth::modulus_length))]
    ModulusLength,

    /// Compact serialization could not be parsed
    #[error("malformed JWT compact serialization")]
    #[diagnostic(code(brocade_oauth::jwt_malformed))]
    JwtMalformed,

    /// Header `alg` not in the allowed set for this verification
    #[error("JWT \"alg\" header parameter is not allowed: {0}")]
    #[diagnostic(code(brocade_oauth::jwt_alg_disallowed))]
    JwtAlgDisallowed(SmolStr),

    /// Signature did not verify
    #[error("JWT signature verification failed")]
    #[diagnostic(code(brocade_oauth::jwt_signature))]
    JwtSignature,

    /// Signature production failed
    #[error("JWT signing failed")]
    #[diagnostic(code(brocade_oauth::jwt_signing))]
    JwtSigning,

    /// JWE decryption failed
    #[error("JWE decryption failed")]
    #[diagnostic(code(brocade_oauth::jwe_decryption))]
    JweDecryption,

    /// Required claim absent
    #[error("JWT claim missing: {0}")]
    #[diagnostic(code(brocade_oauth::claim_missing))]
    ClaimMissing(SmolStr),

    /// Claim present with an unexpected value
    #[error("unexpected JWT claim value: {0}")]
    #[diagnostic(code(brocade_oauth::claim_mismatch))]
    ClaimMismatch(SmolStr),

    /// exp/nbf/iat constraint violated
    #[error("JWT claim timing check failed: {0}")]
    #[diagnostic(code(brocade_oauth::claim_timing))]
    ClaimTiming(SmolStr),

    /// Multiple JWKS candidates and nothing to disambiguate them
    #[error("multiple applicable keys found, a kid is required")]
    #[diagnostic(code(brocade_oauth::keys_ambiguous))]
    KeysAmbiguous,

    /// No JWKS candidate satisfied the selection constraints
    #[error("no applicable keys found")]
    #[diagnostic(code(brocade_oauth::keys_none))]
    KeysNone,

    /// Discovery issuer mismatch
    #[error("issuer does not match expectedIssuer")]
    #[diagnostic(code(brocade_oauth::issuer_mismatch))]
    IssuerMismatch,

    /// Callback `state` mismatch (CSRF check)
    #[error("unexpected \"state\" response parameter value")]
    #[diagnostic(code(brocade_oauth::state_mismatch))]
    StateMismatch,

    /// A response parameter appeared more than once
    #[error("\"{0}\" parameter must be provided only once")]
    #[diagnostic(code(brocade_oauth::duplicate_parameter))]
    DuplicateParameter(SmolStr),

    /// Response used a flow this engine refuses
    #[error("implicit and hybrid flows are not supported")]
    #[diagnostic(code(brocade_oauth::implicit_flow))]
    ImplicitFlow,

    /// Body was not the JSON shape the endpoint mandates
    #[error("response body is not a conformant {0} response")]
    #[diagnostic(code(brocade_oauth::json_shape))]
    JsonShape(SmolStr),

    /// Unexpected HTTP status with no usable body
    #[error("http status: {0}")]
    #[diagnostic(code(brocade_oauth::http_status))]
    HttpStatus(StatusCode),

    /// Structured OAuth error body returned by the server
    #[error("authorization server error: {error}")]
    #[diagnostic(
        code(brocade_oauth::oauth_response),
        help("branch on well-known codes such as `authorization_pending`, `slow_down`, `use_dpop_nonce`, `invalid_grant`")
    )]
    OAuthResponse {
        /// `None` when the error arrived as callback parameters rather than
        /// an HTTP response.
        status: Option<StatusCode>,
        error: SmolStr,
        error_description: Option<SmolStr>,
        body: Option<Value>,
    },

    /// Unresolved WWW-Authenticate challenges on the response
    #[error("server responded with a challenge: {0:?}")]
    #[diagnostic(code(brocade_oauth::challenge))]
    Challenge(Vec<WwwAuthenticateChallenge>),

    /// HTTP request construction error
    #[error("http build error")]
    #[diagnostic(code(brocade_oauth::http_build))]
    HttpBuild,

    /// Transport error from the injected HTTP client
    #[error("transport error")]
    #[diagnostic(code(brocade_oauth::transport))]
    Transport,

    /// Form serialization error
    #[error("form serialization error")]
    #[diagnostic(code(brocade_oauth::serde_form))]
    SerdeHtmlForm,

    /// JSON error
    #[error("json error")]
    #[diagnostic(code(brocade_oauth::serde_json))]
    SerdeJson,
}

impl OAuthError {
    pub fn new(kind: ErrorKind, source: Option<BoxError>) -> Self {
        Self {
            kind,
            source,
            help: None,
            context: None,
            url: None,
        }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn source_err(&self) -> Option<&BoxError> {
        self.source.as_ref()
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn with_help(mut self, help: impl Into<SmolStr>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<SmolStr>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<SmolStr>) -> Self {
        self.url = Some(url.into());
        self
    }

    // Constructors for the common kinds

    pub fn config(msg: impl Into<SmolStr>) -> Self {
        Self::new(ErrorKind::Config(msg.into()), None)
    }

    pub fn no_endpoint(endpoint: impl Into<SmolStr>) -> Self {
        Self::new(ErrorKind::NoEndpoint(endpoint.into()), None)
    }

    pub fn unsupported_auth_method() -> Self {
        Self::new(ErrorKind::UnsupportedAuthMethod, None)
    }

    pub fn unsupported_algorithm(alg: impl Into<SmolStr>) -> Self {
        Self::new(ErrorKind::UnsupportedAlgorithm(alg.into()), None)
    }

    pub fn unsupported_key() -> Self {
        Self::new(ErrorKind::UnsupportedKey, None)
    }

    pub fn modulus_length() -> Self {
        Self::new(ErrorKind::ModulusLength, None)
    }

    pub fn jwt_malformed() -> Self {
        Self::new(ErrorKind::JwtMalformed, None)
    }

    pub fn jwt_alg_disallowed(alg: impl Into<SmolStr>) -> Self {
        Self::new(ErrorKind::JwtAlgDisallowed(alg.into()), None)
    }

    pub fn jwt_signature() -> Self {
        Self::new(ErrorKind::JwtSignature, None)
    }

    pub fn jwt_signing(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::new(ErrorKind::JwtSigning, Some(Box::new(source)))
    }

    pub fn jwe_decryption() -> Self {
        Self::new(ErrorKind::JweDecryption, None)
    }

    pub fn claim_missing(claim: impl Into<SmolStr>) -> Self {
        Self::new(ErrorKind::ClaimMissing(claim.into()), None)
    }

    pub fn claim_mismatch(claim: impl Into<SmolStr>) -> Self {
        Self::new(ErrorKind::ClaimMismatch(claim.into()), None)
    }

    pub fn claim_timing(detail: impl Into<SmolStr>) -> Self {
        Self::new(ErrorKind::ClaimTiming(detail.into()), None)
    }

    pub fn keys_ambiguous() -> Self {
        Self::new(ErrorKind::KeysAmbiguous, None)
    }

    pub fn keys_none() -> Self {
        Self::new(ErrorKind::KeysNone, None)
    }

    pub fn issuer_mismatch() -> Self {
        Self::new(ErrorKind::IssuerMismatch, None)
    }

    pub fn state_mismatch() -> Self {
        Self::new(ErrorKind::StateMismatch, None)
    }

    pub fn duplicate_parameter(name: impl Into<SmolStr>) -> Self {
        Self::new(ErrorKind::DuplicateParameter(name.into()), None)
    }

    pub fn implicit_flow() -> Self {
        Self::new(ErrorKind::ImplicitFlow, None)
    }

    pub fn json_shape(endpoint: impl Into<SmolStr>) -> Self {
        Self::new(ErrorKind::JsonShape(endpoint.into()), None)
    }

    pub fn http_status(status: StatusCode) -> Self {
        Self::new(ErrorKind::HttpStatus(status), None)
    }

    pub fn oauth_response(
        status: Option<StatusCode>,
        error: impl Into<SmolStr>,
        error_description: Option<SmolStr>,
        body: Option<Value>,
    ) -> Self {
        Self::new(
            ErrorKind::OAuthResponse {
                status,
                error: error.into(),
                error_description,
                body,
            },
            None,
        )
    }

    pub fn challenge(challenges: Vec<WwwAuthenticateChallenge>) -> Self {
        Self::new(ErrorKind::Challenge(challenges), None)
    }

    pub fn http_build(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::new(ErrorKind::HttpBuild, Some(Box::new(source)))
    }

    pub fn transport(source: BoxError) -> Self {
        Self::new(ErrorKind::Transport, Some(source))
    }

    /// The server asked for a device/CIBA poll to continue.
    pub fn is_polling(&self) -> bool {
        matches!(
            &self.kind,
            ErrorKind::OAuthResponse { error, .. }
                if error == "authorization_pending" || error == "slow_down"
        )
    }

    /// The server asked the poller to back off before the next attempt.
    pub fn is_slow_down(&self) -> bool {
        matches!(&self.kind, ErrorKind::OAuthResponse { error, .. } if error == "slow_down")
    }

    /// A single retry with a fresh DPoP nonce is warranted. The caller rebuilds
    /// the request; the engine never retries on its own.
    pub fn is_use_dpop_nonce(&self) -> bool {
        match &self.kind {
            ErrorKind::OAuthResponse { error, .. } => error == "use_dpop_nonce",
            ErrorKind::Challenge(challenges) => challenges.iter().any(|c| {
                c.scheme == "dpop"
                    && c.parameter("error").is_some_and(|e| e == "use_dpop_nonce")
            }),
            _ => false,
        }
    }
}

impl From<http::Error> for OAuthError {
    fn from(e: http::Error) -> Self {
        let msg = smol_str::format_smolstr!("{:?}", e);
        Self::new(ErrorKind::HttpBuild, Some(Box::new(e)))
            .with_context(msg)
            .with_help("verify request URIs and headers are valid")
    }
}

impl From<http::header::InvalidHeaderValue> for OAuthError {
    fn from(e: http::header::InvalidHeaderValue) -> Self {
        Self::new(ErrorKind::HttpBuild, Some(Box::new(e)))
    }
}

impl From<serde_json::Error> for OAuthError {
    fn from(e: serde_json::Error) -> Self {
        let msg = smol_str::format_smolstr!("{:?}", e);
        Self::new(ErrorKind::SerdeJson, Some(Box::new(e)))
            .with_context(msg)
            .with_help("verify response body is valid JSON")
    }
}

impl From<serde_html_form::ser::Error> for OAuthError {
    fn from(e: serde_html_form::ser::Error) -> Self {
        let msg = smol_str::format_smolstr!("{:?}", e);
        Self::new(ErrorKind::SerdeHtmlForm, Some(Box::new(e)))
            .with_context(msg)
            .with_help("check request parameters are serializable")
    }
}

impl From<url::ParseError> for OAuthError {
    fn from(e: url::ParseError) -> Self {
        Self::new(ErrorKind::Config(smol_str::format_smolstr!("{e}")), Some(Box::new(e)))
    }
}

pub type Result<T> = core::result::Result<T, OAuthError>;
