//! Deployment configuration shared by all stages of a run

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment variable carrying the target region
pub const REGION_ENV: &str = "AWS_DEFAULT_REGION";

/// Parameters describing one provisioning request.
///
/// Maps are ordered so that the persisted form is stable between saves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Directory holding the infrastructure description; also the store key
    pub working_dir: PathBuf,

    /// Input variables passed to the provisioning tool
    #[serde(default)]
    pub vars: BTreeMap<String, Value>,

    /// Environment exported to the provisioning tool
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
}

impl DeploymentConfig {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            vars: BTreeMap::new(),
            env_vars: BTreeMap::new(),
        }
    }

    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(name.into(), value.into());
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// The store key for this config
    pub fn key(&self) -> String {
        self.working_dir.to_string_lossy().into_owned()
    }

    pub fn var(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn var_str(&self, name: &str) -> Option<&str> {
        self.vars.get(name).and_then(Value::as_str)
    }

    pub fn env_var(&self, name: &str) -> Option<&str> {
        self.env_vars.get(name).map(String::as_str)
    }

    pub fn region(&self) -> Option<&str> {
        self.env_var(REGION_ENV)
    }

    /// Copy with values of secret-looking variables replaced, for display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for (name, value) in copy.vars.iter_mut() {
            if is_secret(name) {
                *value = Value::String("********".to_string());
            }
        }
        copy
    }
}

/// Whether a variable name looks like it holds a credential
pub fn is_secret(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    ["password", "secret", "token"]
        .iter()
        .any(|marker| name.contains(marker))
}
