//! Opaque test identifiers stamped on rules and expected back on log events.

use std::fmt;
use uuid::Uuid;

/// A 128-bit identifier generated once per [`crate::FailureGenerator::start_new_test`]
/// and rendered as a lowercase hex string, the way the proxies and the log
/// store expect it on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TestId(Uuid);

impl TestId {
    /// Generate a fresh random test id (a v4 UUID under the hood).
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Render as the lowercase hex string used on the wire (no dashes).
    pub fn as_hex(&self) -> String {
        self.0.simple().to_string()
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_as_32_lowercase_hex_chars() {
        let id = TestId::generate();
        let hex = id.as_hex();
        assert_eq!(hex.len(), 32);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn two_generated_ids_differ() {
        // Not a strict guarantee, but astronomically likely with 128 bits of entropy.
        assert_ne!(TestId::generate(), TestId::generate());
    }
}
