//! Stage store: persistence of the deployment config between stages
//!
//! Stages can run in separate processes (e.g. a cleanup-only run after a
//! crash), so the config used by setup is written somewhere durable and read
//! back by validate and cleanup. The key is the working-directory identity.

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::deployment::DeploymentConfig;
use crate::error::{Error, Result};

/// Directory created inside the working directory when no store root is set
pub const TEST_DATA_DIR: &str = ".test-data";

/// File name of the persisted config
pub const CONFIG_FILE: &str = "DeploymentConfig.json";

/// Persistence port for deployment configs
pub trait StageStore: Send + Sync {
    /// Persist `config` under `key`, replacing any previous value
    fn save(&self, key: &str, config: &DeploymentConfig) -> Result<()>;

    /// Load the last config saved under `key`
    fn load(&self, key: &str) -> Result<DeploymentConfig>;

    /// Remove anything saved under `key`. Removing a missing key is not an error.
    fn clear(&self, key: &str) -> Result<()>;

    /// Whether a config exists for `key`
    fn contains(&self, key: &str) -> bool {
        self.load(key).is_ok()
    }
}

/// Filesystem-backed store, durable across processes
#[derive(Debug, Clone, Default)]
pub struct FileStageStore {
    root: Option<PathBuf>,
}

impl FileStageStore {
    /// Store data inside each working directory (`<key>/.test-data`)
    pub fn in_working_dir() -> Self {
        Self { root: None }
    }

    /// Store data under a shared root, one directory per hashed key
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    /// Directory that holds the data for `key`
    pub fn data_dir(&self, key: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(Self::hash_key(key)),
            None => Path::new(key).join(TEST_DATA_DIR),
        }
    }

    /// Path of the persisted config for `key`
    pub fn config_path(&self, key: &str) -> PathBuf {
        self.data_dir(key).join(CONFIG_FILE)
    }

    fn hash_key(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let digest = hex::encode(hasher.finalize());
        digest[..16].to_string()
    }
}

impl StageStore for FileStageStore {
    fn save(&self, key: &str, config: &DeploymentConfig) -> Result<()> {
        let dir = self.data_dir(key);
        fs::create_dir_all(&dir)?;

        let json = serde_json::to_vec_pretty(config)?;
        let path = dir.join(CONFIG_FILE);

        // Write atomically via temp file in the same directory
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;

        info!("Saved deployment config for {} to {}", key, path.display());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<DeploymentConfig> {
        let path = self.config_path(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::ConfigNotFound {
                    key: key.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        let config = serde_json::from_slice(&bytes)?;
        debug!("Loaded deployment config for {} from {}", key, path.display());
        Ok(config)
    }

    fn clear(&self, key: &str) -> Result<()> {
        let dir = self.data_dir(key);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                info!("Removed test data at {}", dir.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store for single-process runs and tests
#[derive(Debug, Default)]
pub struct MemoryStageStore {
    configs: Mutex<HashMap<String, DeploymentConfig>>,
}

impl MemoryStageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.configs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.lock().is_empty()
    }
}

impl StageStore for MemoryStageStore {
    fn save(&self, key: &str, config: &DeploymentConfig) -> Result<()> {
        self.configs.lock().insert(key.to_string(), config.clone());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<DeploymentConfig> {
        self.configs
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::ConfigNotFound {
                key: key.to_string(),
            })
    }

    fn clear(&self, key: &str) -> Result<()> {
        self.configs.lock().remove(key);
        Ok(())
    }

    fn contains(&self, key: &str) -> bool {
        self.configs.lock().contains_key(key)
    }
}
