//! JWT claims structure.
//!
//! Contains the claims extracted from validated JWTs. Registered claims are
//! typed fields; every other claim is kept verbatim and exposed through the
//! [`ClaimValue`] view for the authorization layer. The `sub` field is
//! redacted in Debug output to prevent exposure in logs.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// The `aud` claim, which may be a single string or a list of strings.
///
/// Deserialization is lenient: non-string list entries are dropped, and any
/// other shape becomes an empty list that matches no audience.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl<'de> Deserialize<'de> for Audience {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(aud) => Audience::Single(aud),
            Value::Array(items) => Audience::Multiple(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::String(aud) => Some(aud),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => Audience::Multiple(Vec::new()),
        })
    }
}

impl Audience {
    /// Whether `audience` is one of the token's intended audiences.
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == audience,
            Audience::Multiple(auds) => auds.iter().any(|aud| aud == audience),
        }
    }
}

/// Typed view of a non-registered claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimValue<'a> {
    /// The claim is not present.
    Absent,
    /// A JSON string.
    String(&'a str),
    /// A JSON array whose elements are all strings.
    StringList(Vec<&'a str>),
    /// Any other JSON shape (number, boolean, object, null, mixed array).
    Unsupported,
}

/// JWT Claims structure for validated tokens.
///
/// The `sub` field contains user identifiers which should not be exposed in
/// logs. A custom Debug implementation redacts this field.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id) - redacted in Debug output.
    pub sub: String,

    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Intended audience(s).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issued-at timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Not-before timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// All remaining claims, passed through verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Custom Debug implementation that redacts the `sub` field.
///
/// Extra claims are listed by name only since they can carry e-mail
/// addresses and other personal data.
impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("sub", &"[REDACTED]")
            .field("iss", &self.iss)
            .field("aud", &self.aud)
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .field("nbf", &self.nbf)
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Claims {
    /// Look up a non-registered claim by name.
    pub fn claim(&self, name: &str) -> ClaimValue<'_> {
        match self.extra.get(name) {
            None => ClaimValue::Absent,
            Some(serde_json::Value::String(s)) => ClaimValue::String(s),
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .map(serde_json::Value::as_str)
                .collect::<Option<Vec<&str>>>()
                .map_or(ClaimValue::Unsupported, ClaimValue::StringList),
            Some(_) => ClaimValue::Unsupported,
        }
    }

    /// Group memberships from the `groups` claim.
    ///
    /// A single string is treated as one group; any other shape yields no
    /// groups.
    pub fn groups(&self) -> Vec<&str> {
        match self.claim("groups") {
            ClaimValue::String(group) => vec![group],
            ClaimValue::StringList(groups) => groups,
            ClaimValue::Absent | ClaimValue::Unsupported => Vec::new(),
        }
    }

    /// Whether the caller belongs to `group`.
    pub fn is_member_of(&self, group: &str) -> bool {
        self.groups().contains(&group)
    }
}
