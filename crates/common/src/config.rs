//! Harness configuration
//!
//! Loaded from a TOML file; every section has defaults so an absent file or
//! a partial one is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::orchestrator::RunSettings;
use crate::poll::PollPolicy;
use crate::scenario::RdsSettings;
use crate::store::FileStageStore;

/// Top-level harness configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Directory containing the Terraform module under test
    pub working_dir: PathBuf,

    pub store: StoreConfig,
    pub poll: PollConfig,
    pub terraform: TerraformConfig,
    pub aws: AwsConfig,
    pub rds: RdsSettings,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("../.."),
            store: StoreConfig::default(),
            poll: PollConfig::default(),
            terraform: TerraformConfig::default(),
            aws: AwsConfig::default(),
            rds: RdsSettings::default(),
        }
    }
}

/// Where deployment configs are persisted between stages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Shared root directory; unset stores under `<working_dir>/.test-data`
    pub root: Option<PathBuf>,

    /// Explicit store key; defaults to the working directory
    pub key: Option<String>,

    /// Remove the persisted config after a successful destroy
    pub clear_on_cleanup: bool,
}

/// Readiness wait budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub max_attempts: u32,
    pub interval_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        let policy = PollPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            interval_secs: policy.interval.as_secs(),
        }
    }
}

impl PollConfig {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy::new(self.max_attempts, Duration::from_secs(self.interval_secs))
    }
}

/// Terraform CLI settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerraformConfig {
    pub binary: String,

    /// Pass `-lock=true|false` to state-changing commands
    pub lock: bool,

    /// Extra arguments appended to `apply` and `destroy`
    pub extra_args: Vec<String>,
}

impl Default for TerraformConfig {
    fn default() -> Self {
        Self {
            binary: "terraform".to_string(),
            lock: true,
            extra_args: Vec::new(),
        }
    }
}

/// AWS CLI settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    pub binary: String,
    pub profile: Option<String>,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            binary: "aws".to_string(),
            profile: None,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.working_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("working_dir must not be empty".into()));
        }
        if self.terraform.binary.trim().is_empty() {
            return Err(Error::InvalidConfig("terraform.binary must not be empty".into()));
        }
        if self.aws.binary.trim().is_empty() {
            return Err(Error::InvalidConfig("aws.binary must not be empty".into()));
        }
        if self.rds.target_status.trim().is_empty() {
            return Err(Error::InvalidConfig("rds.target_status must not be empty".into()));
        }
        Ok(())
    }

    /// The stage store this configuration selects
    pub fn stage_store(&self) -> FileStageStore {
        match &self.store.root {
            Some(root) => FileStageStore::with_root(root),
            None => FileStageStore::in_working_dir(),
        }
    }

    /// Run settings for the orchestrator
    pub fn run_settings(&self) -> RunSettings {
        let mut settings = RunSettings::new(&self.working_dir)
            .with_poll(self.poll.policy())
            .with_clear_on_cleanup(self.store.clear_on_cleanup);
        if let Some(key) = &self.store.key {
            settings = settings.with_store_key(key.as_str());
        }
        settings
    }
}
