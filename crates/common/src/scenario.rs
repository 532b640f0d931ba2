//! Scenarios: what a run deploys and what it checks afterwards
//!
//! The orchestrator owns sequencing; a [`Scenario`] supplies the deployment
//! parameters, the readiness probe and the validate body.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::assertions::Assertions;
use crate::deployment::{DeploymentConfig, REGION_ENV};
use crate::error::{Error, Result};
use crate::params::RunIdentity;
use crate::poll::PollOutcome;
use crate::ports::{InstanceDetails, Provisioner, StatusApi};

/// How to observe readiness of the deployed resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessProbe {
    /// Provisioner output holding the resource id
    pub id_output: String,
    /// Region to query
    pub region: String,
    /// Status value meaning "ready"
    pub target_status: String,
}

/// Read access to the deployment during validate
pub struct ValidateContext<'a> {
    pub config: &'a DeploymentConfig,
    /// Result of the readiness wait, if the scenario defined a probe
    pub poll: Option<PollOutcome>,
    provisioner: &'a dyn Provisioner,
    status: &'a dyn StatusApi,
}

impl<'a> ValidateContext<'a> {
    pub fn new(
        config: &'a DeploymentConfig,
        poll: Option<PollOutcome>,
        provisioner: &'a dyn Provisioner,
        status: &'a dyn StatusApi,
    ) -> Self {
        Self {
            config,
            poll,
            provisioner,
            status,
        }
    }

    pub fn output(&self, name: &str) -> Result<String> {
        self.provisioner.output(self.config, name)
    }

    pub fn instance_details(&self, region: &str, id: &str) -> Result<InstanceDetails> {
        self.status.instance_details(region, id)
    }

    /// The region the config targets
    pub fn region(&self) -> Result<&'a str> {
        self.config
            .region()
            .ok_or_else(|| Error::InvalidConfig(format!("{} is not set", REGION_ENV)))
    }
}

/// A deploy-and-check test case
pub trait Scenario: Send + Sync {
    fn name(&self) -> &str;

    /// Build the deployment parameters for a fresh run
    fn build_config(&self, identity: &RunIdentity, working_dir: &Path) -> Result<DeploymentConfig>;

    /// Readiness probe to run before validation, if any
    fn readiness(&self, config: &DeploymentConfig) -> Result<Option<ReadinessProbe>>;

    /// Check the deployed resource. Mismatches go into `assertions`; an `Err`
    /// return aborts the stage.
    fn validate(&self, ctx: &ValidateContext<'_>, assertions: &mut Assertions) -> Result<()>;
}

/// Parameters and expectations for the RDS instance module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RdsSettings {
    pub environment: String,
    pub instance_class: String,
    pub allocated_storage: u32,
    pub region: String,
    pub engine: String,
    pub multi_az: bool,
    pub endpoint_output: String,
    pub instance_id_output: String,
    pub target_status: String,
    pub password_prefix: String,
    pub db_name_prefix: String,
    /// Variable that receives the derived database name; not passed when unset
    pub db_name_var: Option<String>,
}

impl Default for RdsSettings {
    fn default() -> Self {
        Self {
            environment: "test".to_string(),
            instance_class: "db.t3.micro".to_string(),
            allocated_storage: 10,
            region: "us-east-1".to_string(),
            engine: "postgres".to_string(),
            // Non-production environments run single-AZ
            multi_az: false,
            endpoint_output: "rds_endpoint".to_string(),
            instance_id_output: "rds_instance_id".to_string(),
            target_status: "available".to_string(),
            password_prefix: "password".to_string(),
            db_name_prefix: "testdb".to_string(),
            db_name_var: None,
        }
    }
}

/// Deploys the RDS module and checks engine, class, topology and endpoint
#[derive(Debug, Clone, Default)]
pub struct RdsInstanceScenario {
    settings: RdsSettings,
}

impl RdsInstanceScenario {
    pub fn new(settings: RdsSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RdsSettings {
        &self.settings
    }

    pub fn db_name(&self, identity: &RunIdentity) -> String {
        identity.derive(&self.settings.db_name_prefix)
    }

    pub fn password(&self, identity: &RunIdentity) -> String {
        identity.derive(&self.settings.password_prefix)
    }
}

impl Scenario for RdsInstanceScenario {
    fn name(&self) -> &str {
        "rds-instance"
    }

    fn build_config(&self, identity: &RunIdentity, working_dir: &Path) -> Result<DeploymentConfig> {
        let s = &self.settings;
        let mut config = DeploymentConfig::new(working_dir)
            .with_var("environment", s.environment.as_str())
            .with_var("db_instance_class", s.instance_class.as_str())
            .with_var("db_allocated_storage", s.allocated_storage)
            .with_var("db_password", self.password(identity))
            .with_env(REGION_ENV, s.region.as_str());
        if let Some(var) = &s.db_name_var {
            config = config.with_var(var.as_str(), self.db_name(identity));
        }
        Ok(config)
    }

    fn readiness(&self, config: &DeploymentConfig) -> Result<Option<ReadinessProbe>> {
        let region = config
            .region()
            .ok_or_else(|| Error::InvalidConfig(format!("{} is not set", REGION_ENV)))?;
        Ok(Some(ReadinessProbe {
            id_output: self.settings.instance_id_output.clone(),
            region: region.to_string(),
            target_status: self.settings.target_status.clone(),
        }))
    }

    fn validate(&self, ctx: &ValidateContext<'_>, assertions: &mut Assertions) -> Result<()> {
        let s = &self.settings;

        if let Some(outcome) = ctx.poll {
            assertions.is_true(
                "readiness",
                outcome.is_reached(),
                &format!(
                    "status '{}' within {} attempt(s)",
                    s.target_status,
                    outcome.attempts()
                ),
            );
        }

        let endpoint = ctx.output(&s.endpoint_output)?;
        let id = ctx.output(&s.instance_id_output)?;
        let region = ctx.region()?;
        let instance = ctx.instance_details(region, &id)?;

        assertions.equal("engine", s.engine.as_str(), instance.engine.as_str());
        assertions.equal(
            "instance_class",
            s.instance_class.as_str(),
            instance.instance_class.as_str(),
        );
        assertions.equal("multi_az", s.multi_az, instance.multi_az);
        assertions.not_empty(&s.endpoint_output, &endpoint);
        Ok(())
    }
}
