//! Non-fatal assertion collection for the validate stage.
//!
//! Every check is evaluated and recorded; the stage fails once at the end
//! with all mismatches, so a single run reports everything that was wrong
//! with the deployed resource.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::error::{Error, Result};

/// One observed property that did not match its expected value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionFailure {
    pub label: String,
    pub expected: String,
    pub actual: String,
}

impl AssertionFailure {
    pub fn new(
        label: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

impl fmt::Display for AssertionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: expected {}, got {}",
            self.label, self.expected, self.actual
        )
    }
}

/// Collector of assertion results
#[derive(Debug, Default)]
pub struct Assertions {
    checked: usize,
    failures: Vec<AssertionFailure>,
}

impl Assertions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that `actual` equals `expected`
    pub fn equal<T>(&mut self, label: &str, expected: T, actual: T) -> bool
    where
        T: PartialEq + fmt::Debug,
    {
        self.checked += 1;
        if expected == actual {
            return true;
        }
        let failure = AssertionFailure::new(
            label,
            format!("{:?}", expected),
            format!("{:?}", actual),
        );
        warn!("Assertion failed: {}", failure);
        self.failures.push(failure);
        false
    }

    /// Check that a string value is not empty (whitespace counts as empty)
    pub fn not_empty(&mut self, label: &str, value: &str) -> bool {
        self.checked += 1;
        if !value.trim().is_empty() {
            return true;
        }
        let failure = AssertionFailure::new(label, "a non-empty value", format!("{:?}", value));
        warn!("Assertion failed: {}", failure);
        self.failures.push(failure);
        false
    }

    /// Check an arbitrary condition, describing the expectation in words
    pub fn is_true(&mut self, label: &str, condition: bool, expectation: &str) -> bool {
        self.checked += 1;
        if condition {
            return true;
        }
        let failure = AssertionFailure::new(label, expectation, "false");
        warn!("Assertion failed: {}", failure);
        self.failures.push(failure);
        false
    }

    pub fn checked(&self) -> usize {
        self.checked
    }

    pub fn failures(&self) -> &[AssertionFailure] {
        &self.failures
    }

    /// Turn the collected results into the stage outcome
    pub fn into_result(self) -> Result<()> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Assertion(self.failures))
        }
    }
}
