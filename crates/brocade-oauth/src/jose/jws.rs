use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use super::JwsAlgorithm;
use super::jwk::Jwk;

/// JOSE header for both JWS and JWE compact serializations. `alg` is kept as
/// the raw wire string so disallowed/unknown values survive into error
/// reporting; [`Header::algorithm`] maps it onto the closed set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Header {
    pub alg: SmolStr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enc: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jku: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwk: Option<Jwk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x5u: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x5c: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x5t: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "x5t#S256")]
    pub x5ts256: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typ: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cty: Option<SmolStr>,
    /// Ephemeral public key (JWE ECDH-ES)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epk: Option<Jwk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apu: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apv: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crit: Option<Vec<SmolStr>>,
}

impl Header {
    pub fn algorithm(&self) -> Option<JwsAlgorithm> {
        JwsAlgorithm::from_name(&self.alg)
    }
}

impl From<JwsAlgorithm> for Header {
    fn from(alg: JwsAlgorithm) -> Self {
        Self {
            alg: alg.as_str().into(),
            ..Default::default()
        }
    }
}
