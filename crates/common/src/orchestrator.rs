//! Three-stage test lifecycle: setup → validate → cleanup
//!
//! ```text
//! Idle ──setup──▶ Setup ──validate──▶ Validated | ValidateFailed ──cleanup──▶ Cleaned | CleanupFailed
//!   └──────────────────────── cleanup (always, once registered) ──────────────▶
//! ```
//!
//! A skipped stage leaves the state where it was, so `setup` alone ends in
//! `Setup` and `validate` alone ends in `Validated` or `ValidateFailed`.
//!
//! Cleanup is registered in a [`CleanupGuard`] before setup starts, so it
//! runs on every exit path: normal return, stage error, or a panic inside a
//! stage body.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::assertions::{AssertionFailure, Assertions};
use crate::deployment::DeploymentConfig;
use crate::error::{Error, Result};
use crate::params::{ParameterGenerator, RandomGenerator, RunIdentity};
use crate::poll::{PollOutcome, PollPolicy, ReadinessPoller, Sleeper, ThreadSleeper};
use crate::ports::{Provisioner, StatusApi};
use crate::scenario::{ReadinessProbe, Scenario, ValidateContext};
use crate::stage::{Stage, StageControl, StageRecord, StageRunner};
use crate::store::StageStore;

/// Lifecycle state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Setup,
    Validated,
    ValidateFailed,
    Cleaned,
    /// The cleanup stage ran and failed; resources may still exist
    CleanupFailed,
}

/// Runs a closure when dropped unless it was already run via [`finish`].
///
/// [`finish`]: CleanupGuard::finish
pub struct CleanupGuard<F>
where
    F: FnOnce() -> Result<()>,
{
    action: Option<F>,
}

impl<F> CleanupGuard<F>
where
    F: FnOnce() -> Result<()>,
{
    pub fn new(action: F) -> Self {
        Self {
            action: Some(action),
        }
    }

    /// Run the cleanup now and return its result
    pub fn finish(mut self) -> Result<()> {
        match self.action.take() {
            Some(action) => action(),
            None => Ok(()),
        }
    }
}

impl<F> Drop for CleanupGuard<F>
where
    F: FnOnce() -> Result<()>,
{
    fn drop(&mut self) {
        // Only reached on an unwinding exit; the result has nowhere to go
        if let Some(action) = self.action.take() {
            if let Err(e) = action() {
                error!("Cleanup failed while unwinding: {}", e);
            }
        }
    }
}

/// Everything the orchestrator talks to
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub scenario: &'a dyn Scenario,
    pub provisioner: &'a dyn Provisioner,
    pub status: &'a dyn StatusApi,
    pub store: &'a dyn StageStore,
}

/// Per-run settings
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub working_dir: PathBuf,
    /// Store key; defaults to the working directory
    pub store_key: Option<String>,
    pub poll: PollPolicy,
    pub clear_on_cleanup: bool,
}

impl RunSettings {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            store_key: None,
            poll: PollPolicy::default(),
            clear_on_cleanup: false,
        }
    }

    pub fn with_poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_store_key(mut self, key: impl Into<String>) -> Self {
        self.store_key = Some(key.into());
        self
    }

    pub fn with_clear_on_cleanup(mut self, clear: bool) -> Self {
        self.clear_on_cleanup = clear;
        self
    }

    pub fn store_key(&self) -> String {
        self.store_key
            .clone()
            .unwrap_or_else(|| self.working_dir.to_string_lossy().into_owned())
    }
}

/// Summary of one invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub scenario: String,
    pub run_id: Option<RunIdentity>,
    pub store_key: String,
    pub state: RunState,
    pub stages: Vec<StageRecord>,
    pub poll: Option<PollOutcome>,
    pub assertion_failures: Vec<AssertionFailure>,
    pub failure: Option<String>,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Debug)]
struct Progress {
    state: RunState,
    identity: Option<RunIdentity>,
    config: Option<DeploymentConfig>,
    poll: Option<PollOutcome>,
    assertion_failures: Vec<AssertionFailure>,
    failure: Option<String>,
}

/// Composes the stages into one run
pub struct Orchestrator<'a> {
    parts: Collaborators<'a>,
    settings: RunSettings,
    store_key: String,
    generator: &'a dyn ParameterGenerator,
    sleeper: &'a dyn Sleeper,
    runner: StageRunner,
    progress: Mutex<Progress>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(parts: Collaborators<'a>, settings: RunSettings) -> Self {
        let store_key = settings.store_key();
        Self {
            parts,
            settings,
            store_key,
            generator: &RandomGenerator,
            sleeper: &ThreadSleeper,
            runner: StageRunner::new(StageControl::from_env()),
            progress: Mutex::new(Progress {
                state: RunState::Idle,
                identity: None,
                config: None,
                poll: None,
                assertion_failures: Vec::new(),
                failure: None,
            }),
        }
    }

    /// Replace the stage control (defaults to `SKIP_*` environment variables)
    pub fn with_control(mut self, control: StageControl) -> Self {
        self.runner = StageRunner::new(control);
        self
    }

    pub fn with_generator(mut self, generator: &'a dyn ParameterGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_sleeper(mut self, sleeper: &'a dyn Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.settings.working_dir
    }

    pub fn store_key(&self) -> &str {
        &self.store_key
    }

    pub fn state(&self) -> RunState {
        self.progress.lock().state
    }

    /// Run setup and validate with cleanup guaranteed afterwards.
    ///
    /// A cleanup failure fails the run even when everything else passed; when
    /// both a stage and cleanup fail, both errors are returned together.
    pub fn run(&self) -> Result<RunReport> {
        info!(
            "Starting '{}' in {}",
            self.parts.scenario.name(),
            self.settings.working_dir.display()
        );

        let guard = CleanupGuard::new(|| self.cleanup());
        let primary = self.setup().and_then(|()| self.validate());
        let cleanup = guard.finish();

        let result = match (primary, cleanup) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(e), Ok(())) => Err(e),
            (Ok(()), Err(c)) => Err(c),
            (Err(e), Err(c)) => Err(Error::Run {
                primary: Box::new(e),
                cleanup: Box::new(c),
            }),
        };

        match result {
            Ok(()) => {
                info!("'{}' passed", self.parts.scenario.name());
                Ok(self.report())
            }
            Err(e) => {
                error!("'{}' failed: {}", self.parts.scenario.name(), e);
                self.progress.lock().failure = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Generate parameters, persist the config and apply it
    pub fn setup(&self) -> Result<()> {
        self.runner
            .run(Stage::Setup, || {
                self.progress.lock().state = RunState::Setup;

                let identity = self.generator.generate();
                info!("Run identity: {}", identity);

                let config = self
                    .parts
                    .scenario
                    .build_config(&identity, &self.settings.working_dir)?;
                self.parts.store.save(&self.store_key, &config)?;
                {
                    let mut progress = self.progress.lock();
                    progress.identity = Some(identity);
                    progress.config = Some(config.clone());
                }

                self.parts.provisioner.init_and_apply(&config)
            })
            .map(|_| ())
    }

    /// Wait for readiness and check the deployed resource
    pub fn validate(&self) -> Result<()> {
        let result = self.runner.run(Stage::Validate, || {
            let config = self.resolve_config()?;

            let poll = match self.parts.scenario.readiness(&config)? {
                Some(probe) => Some(self.wait_ready(&config, &probe)),
                None => None,
            };
            self.progress.lock().poll = poll;

            let ctx = ValidateContext::new(
                &config,
                poll,
                self.parts.provisioner,
                self.parts.status,
            );
            let mut assertions = Assertions::new();
            self.parts.scenario.validate(&ctx, &mut assertions)?;
            info!("Checked {} assertion(s)", assertions.checked());
            assertions.into_result()
        });

        match result {
            Ok(Some(())) => {
                self.progress.lock().state = RunState::Validated;
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => {
                let mut progress = self.progress.lock();
                progress.state = RunState::ValidateFailed;
                progress.assertion_failures = e.assertion_failures().to_vec();
                Err(e)
            }
        }
    }

    /// Destroy whatever the persisted config describes
    pub fn cleanup(&self) -> Result<()> {
        let result = self.runner.run(Stage::Cleanup, || {
            let config = self.resolve_config()?;
            self.parts.provisioner.destroy(&config)?;
            if self.settings.clear_on_cleanup {
                self.parts.store.clear(&self.store_key)?;
            }
            Ok(())
        });

        match result {
            Ok(Some(())) => {
                self.progress.lock().state = RunState::Cleaned;
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => {
                self.progress.lock().state = RunState::CleanupFailed;
                if e.is_provision_failure() {
                    warn!(
                        "Destroy failed; resources for {} may still be running",
                        self.store_key
                    );
                }
                Err(e)
            }
        }
    }

    /// Snapshot of the run so far
    pub fn report(&self) -> RunReport {
        let progress = self.progress.lock();
        RunReport {
            scenario: self.parts.scenario.name().to_string(),
            run_id: progress.identity.clone(),
            store_key: self.store_key.clone(),
            state: progress.state,
            stages: self.runner.records(),
            poll: progress.poll,
            assertion_failures: progress.assertion_failures.clone(),
            failure: progress.failure.clone(),
        }
    }

    /// The config for this run: the one setup built in this process, or the
    /// one a previous invocation persisted.
    fn resolve_config(&self) -> Result<DeploymentConfig> {
        if let Some(config) = self.progress.lock().config.clone() {
            return Ok(config);
        }
        let config = self.parts.store.load(&self.store_key)?;
        self.progress.lock().config = Some(config.clone());
        Ok(config)
    }

    fn wait_ready(&self, config: &DeploymentConfig, probe: &ReadinessProbe) -> PollOutcome {
        let provisioner = self.parts.provisioner;
        let status = self.parts.status;
        ReadinessPoller::new(self.sleeper).wait_for(
            || {
                let id = provisioner.output(config, &probe.id_output)?;
                status.instance_status(&probe.region, &id)
            },
            &probe.target_status,
            self.settings.poll,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::SequenceGenerator;
    use crate::poll::RecordingSleeper;
    use crate::scenario::RdsInstanceScenario;
    use crate::store::MemoryStageStore;
    use crate::testing::{postgres_instance, Call, FakeProvisioner, ScriptedStatus};
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::time::Duration;

    struct Fixture {
        scenario: RdsInstanceScenario,
        provisioner: FakeProvisioner,
        status: ScriptedStatus,
        store: MemoryStageStore,
        generator: SequenceGenerator,
        sleeper: RecordingSleeper,
    }

    impl Fixture {
        fn new(provisioner: FakeProvisioner, status: ScriptedStatus) -> Self {
            Self {
                scenario: RdsInstanceScenario::default(),
                provisioner,
                status,
                store: MemoryStageStore::new(),
                generator: SequenceGenerator::new(["abc123"]),
                sleeper: RecordingSleeper::new(),
            }
        }

        fn healthy() -> Self {
            Self::new(
                FakeProvisioner::new()
                    .with_output("rds_endpoint", "db1.example:5432")
                    .with_output("rds_instance_id", "db1"),
                ScriptedStatus::new(postgres_instance("db1"))
                    .with_statuses(["creating", "creating", "available"]),
            )
        }

        fn orchestrator(&self, control: StageControl) -> Orchestrator<'_> {
            let parts = Collaborators {
                scenario: &self.scenario,
                provisioner: &self.provisioner,
                status: &self.status,
                store: &self.store,
            };
            let settings = RunSettings::new("modules/rds")
                .with_poll(PollPolicy::new(30, Duration::from_secs(30)));
            Orchestrator::new(parts, settings)
                .with_control(control)
                .with_generator(&self.generator)
                .with_sleeper(&self.sleeper)
        }
    }

    #[test]
    fn test_full_run_passes_and_cleans_up() {
        let fx = Fixture::healthy();
        let report = fx.orchestrator(StageControl::all()).run().unwrap();

        assert!(report.passed());
        assert_eq!(report.state, RunState::Cleaned);
        assert_eq!(report.run_id, Some(RunIdentity::from_token("abc123")));
        assert_eq!(report.poll, Some(PollOutcome::Reached { attempts: 3 }));
        assert_eq!(report.stages.len(), 3);
        assert_eq!(fx.sleeper.count(), 2);
        assert_eq!(fx.provisioner.count(&Call::Destroy), 1);
        assert!(!fx.provisioner.is_deployed());

        let applied = fx.provisioner.applied();
        assert_eq!(applied[0].var_str("db_password"), Some("passwordabc123"));
        assert_eq!(fx.store.load("modules/rds").unwrap(), applied[0]);
    }

    #[test]
    fn test_assertion_failure_still_destroys_once() {
        let mut details = postgres_instance("db1");
        details.multi_az = true;
        let fx = Fixture::new(
            FakeProvisioner::new()
                .with_output("rds_endpoint", "db1.example:5432")
                .with_output("rds_instance_id", "db1"),
            ScriptedStatus::new(details),
        );
        let orch = fx.orchestrator(StageControl::all());

        let err = orch.run().unwrap_err();
        assert_eq!(err.assertion_failures().len(), 1);
        assert_eq!(err.assertion_failures()[0].label, "multi_az");
        assert_eq!(fx.provisioner.count(&Call::Destroy), 1);

        let report = orch.report();
        assert_eq!(report.state, RunState::Cleaned);
        assert!(!report.passed());
        assert_eq!(report.assertion_failures.len(), 1);
    }

    #[test]
    fn test_exhausted_poll_is_an_assertion_failure() {
        let fx = Fixture::new(
            FakeProvisioner::new()
                .with_output("rds_endpoint", "db1.example:5432")
                .with_output("rds_instance_id", "db1"),
            ScriptedStatus::new(postgres_instance("db1")).with_statuses(["creating"; 40]),
        );
        let orch = fx.orchestrator(StageControl::all());

        let err = orch.run().unwrap_err();
        assert_eq!(err.assertion_failures()[0].label, "readiness");
        assert_eq!(orch.report().poll, Some(PollOutcome::Exhausted { attempts: 30 }));
        assert_eq!(fx.status.status_calls(), 30);
        assert_eq!(fx.provisioner.count(&Call::Destroy), 1);
    }

    #[test]
    fn test_apply_failure_still_runs_cleanup() {
        let fx = Fixture::new(
            FakeProvisioner::new().failing_apply("quota exceeded"),
            ScriptedStatus::new(postgres_instance("db1")),
        );

        let err = fx.orchestrator(StageControl::all()).run().unwrap_err();
        assert!(matches!(err, Error::Provision(ref m) if m == "quota exceeded"));
        assert_eq!(fx.provisioner.count(&Call::Destroy), 1);
        assert_eq!(fx.provisioner.count(&Call::Output("rds_endpoint".into())), 0);
    }

    #[test]
    fn test_destroy_failure_fails_an_otherwise_passing_run() {
        let fx = Fixture::new(
            FakeProvisioner::new()
                .with_output("rds_endpoint", "db1.example:5432")
                .with_output("rds_instance_id", "db1")
                .failing_destroy("DependencyViolation"),
            ScriptedStatus::new(postgres_instance("db1")),
        );

        let orch = fx.orchestrator(StageControl::all());
        let err = orch.run().unwrap_err();
        assert!(matches!(err, Error::Provision(_)));
        assert_eq!(orch.report().state, RunState::CleanupFailed);
        assert!(fx.provisioner.is_deployed());
    }

    #[test]
    fn test_single_stage_runs_keep_their_own_state() {
        let fx = Fixture::healthy();

        let report = fx.orchestrator(StageControl::only([Stage::Setup])).run().unwrap();
        assert_eq!(report.state, RunState::Setup);
        assert!(fx.provisioner.is_deployed());

        let report = fx
            .orchestrator(StageControl::only([Stage::Validate]))
            .run()
            .unwrap();
        assert_eq!(report.state, RunState::Validated);
        assert!(fx.provisioner.is_deployed());

        let report = fx
            .orchestrator(StageControl::only([Stage::Cleanup]))
            .run()
            .unwrap();
        assert_eq!(report.state, RunState::Cleaned);
        assert!(!fx.provisioner.is_deployed());
    }

    #[test]
    fn test_skipped_cleanup_does_not_claim_cleaned() {
        let fx = Fixture::healthy();
        let report = fx
            .orchestrator(StageControl::all().skip(Stage::Cleanup))
            .run()
            .unwrap();

        assert_eq!(report.state, RunState::Validated);
        assert_eq!(fx.provisioner.count(&Call::Destroy), 0);
    }

    #[test]
    fn test_both_failures_are_reported_together() {
        let fx = Fixture::new(
            FakeProvisioner::new()
                .failing_apply("bad plan")
                .failing_destroy("still in use"),
            ScriptedStatus::new(postgres_instance("db1")),
        );

        match fx.orchestrator(StageControl::all()).run() {
            Err(Error::Run { primary, cleanup }) => {
                assert!(primary.to_string().contains("bad plan"));
                assert!(cleanup.to_string().contains("still in use"));
            }
            other => panic!("expected combined failure, got {:?}", other.map(|r| r.state)),
        }
    }

    #[test]
    fn test_cleanup_runs_when_a_stage_panics() {
        struct PanickingScenario(RdsInstanceScenario);

        impl Scenario for PanickingScenario {
            fn name(&self) -> &str {
                "panicking"
            }
            fn build_config(&self, id: &RunIdentity, dir: &Path) -> Result<DeploymentConfig> {
                self.0.build_config(id, dir)
            }
            fn readiness(&self, _config: &DeploymentConfig) -> Result<Option<ReadinessProbe>> {
                Ok(None)
            }
            fn validate(&self, _ctx: &ValidateContext<'_>, _a: &mut Assertions) -> Result<()> {
                panic!("assertion macro blew up");
            }
        }

        let scenario = PanickingScenario(RdsInstanceScenario::default());
        let provisioner = FakeProvisioner::new();
        let status = ScriptedStatus::new(postgres_instance("db1"));
        let store = MemoryStageStore::new();
        let parts = Collaborators {
            scenario: &scenario,
            provisioner: &provisioner,
            status: &status,
            store: &store,
        };
        let orch = Orchestrator::new(parts, RunSettings::new("modules/rds"))
            .with_control(StageControl::all());

        let result = catch_unwind(AssertUnwindSafe(|| orch.run()));
        assert!(result.is_err());
        assert_eq!(provisioner.count(&Call::Destroy), 1);
    }

    #[test]
    fn test_validate_only_reuses_persisted_config() {
        let fx = Fixture::healthy();
        fx.orchestrator(StageControl::only([Stage::Setup])).run().unwrap();
        assert!(fx.provisioner.is_deployed());
        assert_eq!(fx.provisioner.count(&Call::Destroy), 0);

        let report = fx
            .orchestrator(StageControl::only([Stage::Validate]))
            .run()
            .unwrap();
        assert_eq!(report.run_id, None);
        assert_eq!(fx.provisioner.count(&Call::Apply), 1);
        assert!(report.poll.map_or(false, |p| p.is_reached()));

        fx.orchestrator(StageControl::only([Stage::Cleanup])).run().unwrap();
        assert_eq!(fx.provisioner.count(&Call::Destroy), 1);
        assert_eq!(fx.provisioner.destroyed()[0], fx.provisioner.applied()[0]);
    }

    #[test]
    fn test_cleanup_only_without_saved_config_is_not_found() {
        let fx = Fixture::healthy();
        let err = fx
            .orchestrator(StageControl::only([Stage::Cleanup]))
            .run()
            .unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound { .. }));
        assert_eq!(fx.provisioner.count(&Call::Destroy), 0);
    }

    #[test]
    fn test_clear_on_cleanup_removes_saved_config() {
        let fx = Fixture::healthy();
        let parts = Collaborators {
            scenario: &fx.scenario,
            provisioner: &fx.provisioner,
            status: &fx.status,
            store: &fx.store,
        };
        let settings = RunSettings::new("modules/rds")
            .with_poll(PollPolicy::new(3, Duration::ZERO))
            .with_clear_on_cleanup(true);
        Orchestrator::new(parts, settings)
            .with_control(StageControl::all())
            .with_sleeper(&fx.sleeper)
            .run()
            .unwrap();

        assert!(fx.store.is_empty());
    }

    #[test]
    fn test_guard_finish_runs_action_once() {
        let calls = std::cell::Cell::new(0);
        let guard = CleanupGuard::new(|| {
            calls.set(calls.get() + 1);
            Ok(())
        });
        guard.finish().unwrap();
        assert_eq!(calls.get(), 1);
    }
}
