//! infratest core library
//!
//! Staged infrastructure tests: provision, wait until ready, assert, tear down.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Orchestrator                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CleanupGuard ── registered before setup, fires on any exit │
//! │  StageRunner("setup")                                       │
//! │    ├── ParameterGenerator::generate() -> RunIdentity        │
//! │    ├── Scenario::build_config() -> DeploymentConfig         │
//! │    ├── StageStore::save(key, config)                        │
//! │    └── Provisioner::init_and_apply(config)                  │
//! │  StageRunner("validate")                                    │
//! │    ├── StageStore::load(key)   (when setup ran elsewhere)   │
//! │    ├── ReadinessPoller::wait_for(status, target, policy)    │
//! │    └── Scenario::validate() -> Assertions                   │
//! │  StageRunner("cleanup")                                     │
//! │    ├── StageStore::load(key)                                │
//! │    └── Provisioner::destroy(config)                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod assertions;
pub mod config;
pub mod deployment;
pub mod error;
pub mod orchestrator;
pub mod params;
pub mod poll;
pub mod ports;
pub mod scenario;
pub mod stage;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use assertions::{AssertionFailure, Assertions};
pub use config::HarnessConfig;
pub use deployment::{is_secret, DeploymentConfig, REGION_ENV};
pub use error::{Error, Result};
pub use orchestrator::{CleanupGuard, Collaborators, Orchestrator, RunReport, RunSettings, RunState};
pub use params::{ParameterGenerator, RandomGenerator, RunIdentity, SequenceGenerator};
pub use poll::{PollOutcome, PollPolicy, ReadinessPoller, RecordingSleeper, Sleeper, ThreadSleeper};
pub use ports::{InstanceDetails, Provisioner, StatusApi};
pub use scenario::{RdsInstanceScenario, RdsSettings, ReadinessProbe, Scenario, ValidateContext};
pub use stage::{Stage, StageControl, StageDisposition, StageRecord, StageRunner};
pub use store::{FileStageStore, MemoryStageStore, StageStore};

/// infratest version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "infratest.toml";
