//! Call identifiers

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a call (`callID` on the wire)
///
/// Locally originated calls get a random UUID; inbound calls keep the id the
/// server assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    /// Generate a fresh id
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CallId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for CallId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl AsRef<str> for CallId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for CallId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique_uuids() {
        let a = CallId::new();
        let b = CallId::new();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn test_server_ids_are_kept_verbatim() {
        let id = CallId::from("3f0c-inbound");
        assert_eq!(id.to_string(), "3f0c-inbound");
        assert_eq!(serde_json::to_value(&id).unwrap(), "3f0c-inbound");
    }
}
