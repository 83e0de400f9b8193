use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct Claims {
    #[serde(flatten)]
    pub registered: RegisteredClaims,
    #[serde(flatten)]
    pub protocol: ProtocolClaims,
    /// Everything else, preserved verbatim for caller inspection and for
    /// assertion customization hooks.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RegisteredClaims {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<SmolStr>,
}

/// OAuth/OIDC/DPoP claims the engine reads or writes by name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProtocolClaims {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub htm: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub htu: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ath: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azp: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<i64>,
}

impl From<RegisteredClaims> for Claims {
    fn from(registered: RegisteredClaims) -> Self {
        Self {
            registered,
            protocol: ProtocolClaims::default(),
            extra: Default::default(),
        }
    }
}

/// `aud` may be a single string or an array; checks are membership tests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(SmolStr),
    Multiple(Vec<SmolStr>),
}

impl Audience {
    pub fn contains(&self, expected: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == expected,
            Audience::Multiple(auds) => auds.iter().any(|aud| aud == expected),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Audience::Single(_) => 1,
            Audience::Multiple(auds) => auds.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aud_membership() {
        let single = Audience::Single("client".into());
        assert!(single.contains("client"));
        assert!(!single.contains("other"));
        let multi = Audience::Multiple(vec!["a".into(), "client".into()]);
        assert!(multi.contains("client"));
        assert_eq!(multi.len(), 2);
    }

    #[test]
    fn claims_roundtrip_preserves_unknown_members() {
        let json = r#"{"iss":"https://as.example.com","exp":1,"x-custom":true}"#;
        let claims: Claims = serde_json::from_str(json).unwrap();
        assert_eq!(claims.registered.iss.as_deref(), Some("https://as.example.com"));
        assert_eq!(claims.extra.get("x-custom"), Some(&serde_json::Value::Bool(true)));
        let out = serde_json::to_value(&claims).unwrap();
        assert_eq!(out.get("x-custom"), Some(&serde_json::Value::Bool(true)));
    }
}
