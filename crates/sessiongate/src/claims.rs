//! Access token claims

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Claim holding the session's original issue time (epoch seconds)
pub const ORIG_IAT: &str = "orig_iat";

/// Default claim name for the absolute expiry (epoch seconds)
pub const DEFAULT_EXPIRY_FIELD: &str = "exp";

/// Signed payload of an access token
///
/// A plain claim-name to value map. Claims are signed, never encrypted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessClaims(Map<String, Value>);

impl AccessClaims {
    /// Empty claim set
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim value by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Set a claim, returning the previous value
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    /// Builder-style [`AccessClaims::insert`]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Remove a claim
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    /// Whether a claim is present
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Number of claims
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no claims
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over claims
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Original issue time of the session, if present and numeric
    pub fn orig_iat(&self) -> Option<i64> {
        self.get(ORIG_IAT).and_then(numeric_seconds)
    }

    /// A copy without the expiry and original-issue-time claims
    pub fn without_timing(&self, expiry_field: &str) -> Self {
        let mut claims = self.clone();
        claims.remove(expiry_field);
        claims.remove(ORIG_IAT);
        claims
    }
}

impl From<Map<String, Value>> for AccessClaims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for AccessClaims {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Interpret a JSON number as whole epoch seconds
pub(crate) fn numeric_seconds(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|secs| secs.trunc() as i64))
}
