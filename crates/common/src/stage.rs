//! Named test stages and the runner that executes or skips them

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// One phase of a test run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Setup,
    Validate,
    Cleanup,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Setup, Stage::Validate, Stage::Cleanup];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Setup => "setup",
            Stage::Validate => "validate",
            Stage::Cleanup => "cleanup",
        }
    }

    /// Environment variable names that skip this stage
    pub fn skip_vars(&self) -> [String; 2] {
        [
            format!("SKIP_{}", self.as_str()),
            format!("SKIP_{}", self.as_str().to_ascii_uppercase()),
        ]
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "setup" => Ok(Stage::Setup),
            "validate" => Ok(Stage::Validate),
            "cleanup" => Ok(Stage::Cleanup),
            other => Err(Error::InvalidConfig(format!("unknown stage: {}", other))),
        }
    }
}

/// Whether a stage body was executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageDisposition {
    Ran,
    Skipped,
}

/// Record of one stage for the current invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub disposition: StageDisposition,
    pub at: DateTime<Utc>,
}

/// External control data deciding which stages are skipped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageControl {
    skipped: BTreeSet<Stage>,
}

impl StageControl {
    /// Run every stage
    pub fn all() -> Self {
        Self::default()
    }

    /// Read `SKIP_<stage>` / `SKIP_<STAGE>` from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let skipped = Stage::ALL
            .into_iter()
            .filter(|stage| {
                stage
                    .skip_vars()
                    .iter()
                    .any(|var| lookup(var).map_or(false, |v| !v.is_empty()))
            })
            .collect();
        Self { skipped }
    }

    /// Run only the given stages
    pub fn only<I>(stages: I) -> Self
    where
        I: IntoIterator<Item = Stage>,
    {
        let keep: BTreeSet<Stage> = stages.into_iter().collect();
        Self {
            skipped: Stage::ALL
                .into_iter()
                .filter(|s| !keep.contains(s))
                .collect(),
        }
    }

    pub fn skip(mut self, stage: Stage) -> Self {
        self.skipped.insert(stage);
        self
    }

    /// Merge another control's skips into this one
    pub fn merge(mut self, other: &StageControl) -> Self {
        self.skipped.extend(other.skipped.iter().copied());
        self
    }

    pub fn is_skipped(&self, stage: Stage) -> bool {
        self.skipped.contains(&stage)
    }
}

/// Executes stage bodies according to a [`StageControl`]
#[derive(Debug, Default)]
pub struct StageRunner {
    control: StageControl,
    records: Mutex<Vec<StageRecord>>,
}

impl StageRunner {
    pub fn new(control: StageControl) -> Self {
        Self {
            control,
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn control(&self) -> &StageControl {
        &self.control
    }

    /// Run `body` unless `stage` is skipped.
    ///
    /// Returns `Ok(None)` for a skipped stage. Errors from `body` are returned
    /// as-is; nothing is retried.
    pub fn run<T, F>(&self, stage: Stage, body: F) -> Result<Option<T>>
    where
        F: FnOnce() -> Result<T>,
    {
        if self.control.is_skipped(stage) {
            warn!("Skipping stage '{}'", stage);
            self.record(stage, StageDisposition::Skipped);
            return Ok(None);
        }

        info!("Running stage '{}'", stage);
        self.record(stage, StageDisposition::Ran);
        body().map(Some)
    }

    fn record(&self, stage: Stage, disposition: StageDisposition) {
        self.records.lock().push(StageRecord {
            stage,
            disposition,
            at: Utc::now(),
        });
    }

    /// Snapshot of the stages seen so far, in execution order
    pub fn records(&self) -> Vec<StageRecord> {
        self.records.lock().clone()
    }

    /// Whether `stage` has run (not skipped) in this invocation
    pub fn ran(&self, stage: Stage) -> bool {
        self.records
            .lock()
            .iter()
            .any(|r| r.stage == stage && r.disposition == StageDisposition::Ran)
    }
}
