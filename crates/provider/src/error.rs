//! Error types for the provider adapters

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: String,
        stderr: String,
    },

    #[error("Unexpected output from {command}: {reason}")]
    Parse { command: String, reason: String },

    #[error("DB instance not found: {0}")]
    InstanceNotFound(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;
