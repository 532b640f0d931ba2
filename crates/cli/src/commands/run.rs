//! Lifecycle commands: full run or a single stage

use anyhow::Result;
use clap::{Args, ValueEnum};
use colored::Colorize;

use infratest_common::{
    AssertionFailure, Collaborators, Error, HarnessConfig, Orchestrator, RdsInstanceScenario,
    RunReport, RunState, Stage, StageControl, StageDisposition, StageRecord,
};
use infratest_provider::{AwsCliRds, TerraformCli};

use crate::output::{
    print_error, print_item, print_list, print_success, print_warning, OutputFormat, TableDisplay,
};

/// Stage names accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StageArg {
    Setup,
    Validate,
    Cleanup,
}

impl From<StageArg> for Stage {
    fn from(arg: StageArg) -> Self {
        match arg {
            StageArg::Setup => Stage::Setup,
            StageArg::Validate => Stage::Validate,
            StageArg::Cleanup => Stage::Cleanup,
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Skip a stage (repeatable); SKIP_<stage> environment variables also apply
    #[arg(long, value_enum)]
    pub skip: Vec<StageArg>,
}

impl RunArgs {
    pub fn control(&self) -> StageControl {
        self.skip
            .iter()
            .fold(StageControl::all(), |control, stage| control.skip((*stage).into()))
    }
}

/// Run the lifecycle with the given stage control.
///
/// Returns whether the run passed; harness problems surface as `Err`.
pub fn execute(config: &HarnessConfig, control: StageControl, format: OutputFormat) -> Result<bool> {
    let scenario = RdsInstanceScenario::new(config.rds.clone());
    let provisioner = TerraformCli::new(config.terraform.clone());
    let status = AwsCliRds::new(config.aws.clone());
    let store = config.stage_store();

    let parts = Collaborators {
        scenario: &scenario,
        provisioner: &provisioner,
        status: &status,
        store: &store,
    };
    let control = StageControl::from_env().merge(&control);
    let orchestrator = Orchestrator::new(parts, config.run_settings()).with_control(control);

    let result = orchestrator.run();
    let report = orchestrator.report();
    print_report(&report, format);

    match result {
        Ok(_) => {
            print_success(&format!("{} passed", report.scenario));
            Ok(true)
        }
        Err(e @ Error::ConfigNotFound { .. }) => {
            Err(anyhow::Error::new(e).context("nothing to resume; run `infratest setup` first"))
        }
        Err(e) => {
            print_error(&e.to_string());
            if report.state == RunState::CleanupFailed {
                print_warning(&format!(
                    "resources for {} may still be running; retry with `infratest cleanup`",
                    config.working_dir.display()
                ));
            }
            Ok(false)
        }
    }
}

/// Run exactly one stage
pub fn execute_stage(config: &HarnessConfig, stage: Stage, format: OutputFormat) -> Result<bool> {
    execute(config, StageControl::only([stage]), format)
}

fn print_report(report: &RunReport, format: OutputFormat) {
    match format {
        OutputFormat::Table | OutputFormat::Plain => {
            print_item(report, format);
            print_list(&report.stages, format);
            if !report.assertion_failures.is_empty() {
                println!("{}", "Assertion failures".red().bold());
                print_list(&report.assertion_failures, format);
            }
        }
        OutputFormat::Json | OutputFormat::Yaml => print_item(report, format),
    }
}

impl TableDisplay for RunReport {
    fn headers() -> Vec<&'static str> {
        vec!["Scenario", "Run ID", "Store Key", "State", "Readiness", "Result"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.scenario.clone(),
            self.run_id
                .as_ref()
                .map_or_else(|| "-".to_string(), |id| id.to_string()),
            self.store_key.clone(),
            format!("{:?}", self.state),
            match self.poll {
                Some(outcome) if outcome.is_reached() => {
                    format!("ready after {}", outcome.attempts())
                }
                Some(outcome) => format!("not ready after {}", outcome.attempts()),
                None => "-".to_string(),
            },
            if self.passed() { "PASS" } else { "FAIL" }.to_string(),
        ]
    }
}

impl TableDisplay for StageRecord {
    fn headers() -> Vec<&'static str> {
        vec!["Stage", "Disposition", "At"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.stage.to_string(),
            match self.disposition {
                StageDisposition::Ran => "ran".to_string(),
                StageDisposition::Skipped => "skipped".to_string(),
            },
            self.at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        ]
    }
}

impl TableDisplay for AssertionFailure {
    fn headers() -> Vec<&'static str> {
        vec!["Check", "Expected", "Actual"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.label.clone(), self.expected.clone(), self.actual.clone()]
    }
}
