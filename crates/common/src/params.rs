//! Per-run parameter generation
//!
//! Every resource name and secret a run creates is derived from a single
//! [`RunIdentity`], so two runs only collide if their identities do.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;

/// Random bytes per identity (48 bits, rendered as 12 hex characters)
const IDENTITY_BYTES: usize = 6;

/// Opaque, collision-resistant token for one test run
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunIdentity(String);

impl RunIdentity {
    /// Wrap an existing token (e.g. one recovered from a previous run)
    pub fn from_token(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive a name by prefixing the identity, e.g. `testdb<id>`
    pub fn derive(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.0)
    }

    /// Derive a name with both a prefix and a suffix
    pub fn derive_with_suffix(&self, prefix: &str, suffix: &str) -> String {
        format!("{}{}{}", prefix, self.0, suffix)
    }
}

impl fmt::Display for RunIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of run identities
pub trait ParameterGenerator: Send + Sync {
    fn generate(&self) -> RunIdentity;
}

/// Production generator backed by the thread-local CSPRNG
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomGenerator;

impl ParameterGenerator for RandomGenerator {
    fn generate(&self) -> RunIdentity {
        let bytes: [u8; IDENTITY_BYTES] = rand::random();
        RunIdentity(hex::encode(bytes))
    }
}

/// Deterministic generator that hands out a fixed sequence of tokens.
///
/// Falls back to random identities once the sequence is used up.
#[derive(Debug, Default)]
pub struct SequenceGenerator {
    tokens: Mutex<VecDeque<String>>,
}

impl SequenceGenerator {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: Mutex::new(tokens.into_iter().map(Into::into).collect()),
        }
    }
}

impl ParameterGenerator for SequenceGenerator {
    fn generate(&self) -> RunIdentity {
        match self.tokens.lock().pop_front() {
            Some(token) => RunIdentity(token),
            None => RandomGenerator.generate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_identity_shape() {
        let id = RandomGenerator.generate();
        assert_eq!(id.as_str().len(), IDENTITY_BYTES * 2);
        assert!(id
            .as_str()
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_derived_names_are_pure() {
        let id = RunIdentity::from_token("abc123");
        assert_eq!(id.derive("testdb"), "testdbabc123");
        assert_eq!(id.derive("password"), id.derive("password"));
        assert_eq!(id.derive_with_suffix("rds-", "-test"), "rds-abc123-test");
    }

    #[test]
    fn test_no_collisions_over_ten_thousand_runs() {
        let names: HashSet<String> = (0..10_000)
            .map(|_| RandomGenerator.generate().derive("testdb"))
            .collect();
        assert_eq!(names.len(), 10_000);
    }

    #[test]
    fn test_sequence_generator_then_random() {
        let gen = SequenceGenerator::new(["run1", "run2"]);
        assert_eq!(gen.generate().as_str(), "run1");
        assert_eq!(gen.generate().as_str(), "run2");
        assert_eq!(gen.generate().as_str().len(), IDENTITY_BYTES * 2);
    }
}
