//! Error types for infratest

use thiserror::Error;

use crate::assertions::AssertionFailure;

/// Result type alias using the harness Error
pub type Result<T> = std::result::Result<T, Error>;

/// Harness error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No deployment config saved for {key}")]
    ConfigNotFound { key: String },

    #[error("Provisioning failed: {0}")]
    Provision(String),

    #[error("Failed to read output '{name}': {reason}")]
    Output { name: String, reason: String },

    #[error("Status query failed: {0}")]
    Status(String),

    #[error("{} assertion(s) failed: {}", .0.len(), summarize(.0))]
    Assertion(Vec<AssertionFailure>),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Run failed: {primary}; cleanup also failed: {cleanup}")]
    Run {
        primary: Box<Error>,
        cleanup: Box<Error>,
    },
}

impl Error {
    /// Whether this error left infrastructure behind (a failed destroy)
    pub fn is_provision_failure(&self) -> bool {
        match self {
            Error::Provision(_) => true,
            Error::Run { primary, cleanup } => {
                primary.is_provision_failure() || cleanup.is_provision_failure()
            }
            _ => false,
        }
    }

    /// Assertion failures carried by this error, if any
    pub fn assertion_failures(&self) -> &[AssertionFailure] {
        match self {
            Error::Assertion(failures) => failures,
            Error::Run { primary, .. } => primary.assertion_failures(),
            _ => &[],
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}

fn summarize(failures: &[AssertionFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assertion_error_lists_every_failure() {
        let err = Error::Assertion(vec![
            AssertionFailure::new("engine", "postgres", "mysql"),
            AssertionFailure::new("multi_az", "false", "true"),
        ]);
        let msg = err.to_string();
        assert!(msg.starts_with("2 assertion(s) failed"));
        assert!(msg.contains("engine"));
        assert!(msg.contains("multi_az"));
    }

    #[test]
    fn test_run_error_keeps_cleanup_failure_visible() {
        let err = Error::Run {
            primary: Box::new(Error::Assertion(vec![AssertionFailure::new("a", "1", "2")])),
            cleanup: Box::new(Error::Provision("destroy exited with 1".into())),
        };
        assert!(err.is_provision_failure());
        assert_eq!(err.assertion_failures().len(), 1);
        assert!(err.to_string().contains("destroy exited with 1"));
    }
}
