//! Conversation thread identifiers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier scoping all turns of one conversation.
///
/// Keys the checkpoint store by exact match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    /// Wrap a caller-supplied identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ThreadId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ThreadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(ThreadId::generate(), ThreadId::generate());
    }

    #[test]
    fn test_exact_match_keying() {
        assert_eq!(ThreadId::from("abc"), ThreadId::new(String::from("abc")));
        assert_ne!(ThreadId::from("abc"), ThreadId::from("ABC"));
    }
}
