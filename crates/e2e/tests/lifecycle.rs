//! Lifecycle tests against in-memory infrastructure and an on-disk store
//!
//! Each "process" is a fresh set of collaborators sharing only the store
//! directory, the way separate `infratest setup` / `validate` / `cleanup`
//! invocations would.

use std::path::Path;
use std::thread;
use std::time::Duration;

use tempfile::TempDir;
use test_case::test_case;

use infratest_common::testing::{postgres_instance, Call, FakeProvisioner, ScriptedStatus};
use infratest_common::{
    Collaborators, Error, FileStageStore, Orchestrator, PollPolicy, RdsInstanceScenario,
    RecordingSleeper, RunSettings, RunState, SequenceGenerator, Stage, StageControl, StageStore,
};

const MODULE: &str = "modules/rds";

fn settings(working_dir: &str) -> RunSettings {
    RunSettings::new(working_dir).with_poll(PollPolicy::new(5, Duration::from_secs(30)))
}

fn deployed_provisioner(id: &str) -> FakeProvisioner {
    FakeProvisioner::new()
        .with_output("rds_endpoint", format!("{}.example:5432", id))
        .with_output("rds_instance_id", id)
}

struct Process {
    scenario: RdsInstanceScenario,
    provisioner: FakeProvisioner,
    status: ScriptedStatus,
    store: FileStageStore,
    generator: SequenceGenerator,
    sleeper: RecordingSleeper,
}

impl Process {
    fn new(root: &Path, provisioner: FakeProvisioner, status: ScriptedStatus) -> Self {
        Self {
            scenario: RdsInstanceScenario::default(),
            provisioner,
            status,
            store: FileStageStore::with_root(root),
            generator: SequenceGenerator::new(["abc123"]),
            sleeper: RecordingSleeper::new(),
        }
    }

    fn orchestrator(&self, working_dir: &str, control: StageControl) -> Orchestrator<'_> {
        let parts = Collaborators {
            scenario: &self.scenario,
            provisioner: &self.provisioner,
            status: &self.status,
            store: &self.store,
        };
        Orchestrator::new(parts, settings(working_dir))
            .with_control(control)
            .with_generator(&self.generator)
            .with_sleeper(&self.sleeper)
    }
}

#[test]
fn full_run_persists_config_and_destroys() {
    infratest_e2e::init_test_logging();
    let tmp = TempDir::new().unwrap();
    let process = Process::new(
        tmp.path(),
        deployed_provisioner("db1"),
        ScriptedStatus::new(postgres_instance("db1")).with_statuses(["creating", "available"]),
    );

    let orchestrator = process.orchestrator(MODULE, StageControl::all());
    let report = orchestrator.run().unwrap();

    assert!(report.passed());
    assert_eq!(report.state, RunState::Cleaned);
    assert_eq!(report.poll.map(|p| p.attempts()), Some(2));
    assert_eq!(process.sleeper.count(), 1);
    assert!(!process.provisioner.is_deployed());

    let saved = process.store.load(MODULE).unwrap();
    assert_eq!(saved.var_str("db_password"), Some("passwordabc123"));
    assert_eq!(process.provisioner.destroyed(), vec![saved]);
}

#[test]
fn stages_resume_across_processes() {
    let tmp = TempDir::new().unwrap();

    let setup = Process::new(
        tmp.path(),
        deployed_provisioner("db1"),
        ScriptedStatus::new(postgres_instance("db1")),
    );
    setup
        .orchestrator(MODULE, StageControl::only([Stage::Setup]))
        .run()
        .unwrap();
    let applied = setup.provisioner.applied();
    assert_eq!(applied.len(), 1);
    assert!(setup.provisioner.is_deployed());

    let validate = Process::new(
        tmp.path(),
        deployed_provisioner("db1").already_deployed(),
        ScriptedStatus::new(postgres_instance("db1")),
    );
    let report = validate
        .orchestrator(MODULE, StageControl::only([Stage::Validate]))
        .run()
        .unwrap();
    assert_eq!(report.state, RunState::Validated);
    assert_eq!(validate.provisioner.count(&Call::Apply), 0);
    assert_eq!(validate.provisioner.count(&Call::Destroy), 0);

    let cleanup = Process::new(
        tmp.path(),
        FakeProvisioner::new().already_deployed(),
        ScriptedStatus::new(postgres_instance("db1")),
    );
    cleanup
        .orchestrator(MODULE, StageControl::only([Stage::Cleanup]))
        .run()
        .unwrap();
    assert_eq!(cleanup.provisioner.destroyed(), applied);
    assert!(!cleanup.provisioner.is_deployed());
}

#[test]
fn validate_without_setup_reports_missing_config() {
    let tmp = TempDir::new().unwrap();
    let process = Process::new(
        tmp.path(),
        deployed_provisioner("db1").already_deployed(),
        ScriptedStatus::new(postgres_instance("db1")),
    );

    let err = process
        .orchestrator(MODULE, StageControl::only([Stage::Validate]))
        .run()
        .unwrap_err();
    assert!(matches!(err, Error::ConfigNotFound { ref key } if key == MODULE));
    assert_eq!(process.status.status_calls(), 0);
}

#[test]
fn failed_validation_still_destroys() {
    let tmp = TempDir::new().unwrap();
    let mut multi_az = postgres_instance("db1");
    multi_az.multi_az = true;
    let process = Process::new(
        tmp.path(),
        deployed_provisioner("db1"),
        ScriptedStatus::new(multi_az),
    );

    let orchestrator = process.orchestrator(MODULE, StageControl::all());
    let err = orchestrator.run().unwrap_err();

    let failures = err.assertion_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].label, "multi_az");
    assert_eq!(process.provisioner.count(&Call::Destroy), 1);
    assert!(!process.provisioner.is_deployed());
    assert_eq!(orchestrator.report().assertion_failures, failures.to_vec());
}

#[test]
fn cleanup_twice_is_harmless() {
    let tmp = TempDir::new().unwrap();
    let process = Process::new(
        tmp.path(),
        deployed_provisioner("db1"),
        ScriptedStatus::new(postgres_instance("db1")),
    );
    process
        .orchestrator(MODULE, StageControl::all())
        .run()
        .unwrap();

    let again = process.orchestrator(MODULE, StageControl::only([Stage::Cleanup]));
    again.run().unwrap();
    assert_eq!(process.provisioner.count(&Call::Destroy), 2);
}

#[test_case(2 ; "two runs")]
#[test_case(8 ; "eight runs")]
fn concurrent_runs_keep_separate_configs(runs: usize) {
    let tmp = TempDir::new().unwrap();

    let handles: Vec<_> = (0..runs)
        .map(|i| {
            let root = tmp.path().to_path_buf();
            thread::spawn(move || {
                let id = format!("db{}", i);
                let mut process = Process::new(
                    &root,
                    deployed_provisioner(&id),
                    ScriptedStatus::new(postgres_instance(&id)),
                );
                process.generator = SequenceGenerator::new([format!("run{:03}", i)]);

                let working_dir = format!("modules/rds-{}", i);
                let report = process
                    .orchestrator(&working_dir, StageControl::all())
                    .run()
                    .unwrap();
                assert!(report.passed());
                process.provisioner.applied()
            })
        })
        .collect();

    let store = FileStageStore::with_root(tmp.path());
    for (i, handle) in handles.into_iter().enumerate() {
        let applied = handle.join().unwrap();
        let saved = store.load(&format!("modules/rds-{}", i)).unwrap();
        assert_eq!(applied, vec![saved.clone()]);
        assert_eq!(
            saved.var_str("db_password").map(String::from),
            Some(format!("passwordrun{:03}", i))
        );
    }
}
