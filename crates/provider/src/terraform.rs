//! Terraform CLI provisioner
//!
//! Runs `terraform` in the config's working directory with the config's
//! variables and environment. Terraform itself makes apply and destroy
//! idempotent: an unchanged apply or a destroy of nothing is a no-op.

use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use infratest_common::config::TerraformConfig;
use infratest_common::{is_secret, DeploymentConfig, Error, Provisioner, Result};

use crate::command::{CommandRunner, CommandSpec, SystemRunner};
use crate::error::ProviderError;

/// Provisioner backed by the `terraform` binary
#[derive(Clone)]
pub struct TerraformCli {
    settings: TerraformConfig,
    runner: Arc<dyn CommandRunner>,
}

impl TerraformCli {
    pub fn new(settings: TerraformConfig) -> Self {
        Self::with_runner(settings, Arc::new(SystemRunner))
    }

    pub fn with_runner(settings: TerraformConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { settings, runner }
    }

    fn base(&self, config: &DeploymentConfig, subcommand: &str) -> CommandSpec {
        let mut spec = CommandSpec::new(self.settings.binary.as_str())
            .arg(subcommand)
            .current_dir(config.working_dir());
        for (key, value) in &config.env_vars {
            spec = spec.env(key.as_str(), value.as_str());
        }
        spec.env("TF_IN_AUTOMATION", "1")
    }

    /// Shared arguments of apply and destroy.
    ///
    /// Secret variables travel as `TF_VAR_<name>` so they never appear in a
    /// command line, a log line or an error message.
    fn mutating(&self, config: &DeploymentConfig, subcommand: &str) -> CommandSpec {
        let mut spec = self
            .base(config, subcommand)
            .args(["-auto-approve", "-input=false", "-no-color"])
            .arg(format!("-lock={}", self.settings.lock));
        for (name, value) in &config.vars {
            spec = if is_secret(name) {
                spec.env(format!("TF_VAR_{}", name), var_value(value))
            } else {
                spec.arg("-var").arg(format!("{}={}", name, var_value(value)))
            };
        }
        spec.args(self.settings.extra_args.iter().cloned())
    }

    fn run_provision(&self, spec: CommandSpec) -> Result<()> {
        self.runner
            .run_checked(&spec)
            .map(|_| ())
            .map_err(|e| Error::Provision(e.to_string()))
    }
}

impl Provisioner for TerraformCli {
    fn init(&self, config: &DeploymentConfig) -> Result<()> {
        info!("terraform init in {}", config.working_dir().display());
        let spec = self
            .base(config, "init")
            .args(["-input=false", "-no-color"]);
        self.run_provision(spec)
    }

    fn apply(&self, config: &DeploymentConfig) -> Result<()> {
        info!("terraform apply in {}", config.working_dir().display());
        self.run_provision(self.mutating(config, "apply"))
    }

    fn destroy(&self, config: &DeploymentConfig) -> Result<()> {
        info!("terraform destroy in {}", config.working_dir().display());
        self.run_provision(self.mutating(config, "destroy"))
    }

    fn output(&self, config: &DeploymentConfig, name: &str) -> Result<String> {
        let spec = self
            .base(config, "output")
            .args(["-no-color", "-json", name]);
        let to_error = |e: ProviderError| Error::Output {
            name: name.to_string(),
            reason: e.to_string(),
        };

        let output = self.runner.run_checked(&spec).map_err(to_error)?;
        decode_output(&output.stdout).map_err(|reason| {
            to_error(ProviderError::Parse {
                command: spec.display(),
                reason,
            })
        })
    }
}

/// Render a variable the way `-var name=value` expects it: strings raw,
/// everything else as JSON (which HCL accepts for numbers, bools, lists, maps).
fn var_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Decode `terraform output -json <name>`: strings lose their quotes,
/// other values are returned as compact JSON.
fn decode_output(stdout: &str) -> std::result::Result<String, String> {
    let value: Value = serde_json::from_str(stdout.trim()).map_err(|e| e.to_string())?;
    Ok(match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}
