//! Client-side OAuth 2.0 / OpenID Connect / FAPI protocol engine.
//!
//! Builds conformant requests and validates conformant responses for the
//! authorization-code, client-credentials, device, CIBA, and token-exchange
//! grants, plus PAR, dynamic client registration, introspection, revocation,
//! server/resource discovery, and UserInfo. A relying-party library, not a
//! server: transport is injected through [`http_client::HttpClient`], and the
//! engine never retries on its own.

pub mod callback;
pub mod challenge;
pub mod client_auth;
pub mod dpop;
pub mod error;
pub mod http_client;
pub mod jose;
pub mod jwks;
pub mod request;
pub mod response;
pub mod types;
pub mod utils;

/// Sent on engine-originated requests except on wasm, where the platform
/// forbids overriding it.
#[cfg(not(target_arch = "wasm32"))]
pub(crate) const USER_AGENT: &str =
    concat!("brocade-oauth/", env!("CARGO_PKG_VERSION"));
