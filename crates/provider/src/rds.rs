//! RDS status via the AWS CLI
//!
//! Wraps `aws rds describe-db-instances` and maps the response onto
//! [`InstanceDetails`].

use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use infratest_common::config::AwsConfig;
use infratest_common::{Error, InstanceDetails, Result, StatusApi};

use crate::command::{CommandRunner, CommandSpec, SystemRunner};
use crate::error::{ProviderError, ProviderResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeDbInstances {
    #[serde(rename = "DBInstances", default)]
    db_instances: Vec<DbInstance>,
}

#[derive(Debug, Deserialize)]
struct DbInstance {
    #[serde(rename = "DBInstanceIdentifier")]
    identifier: String,
    #[serde(rename = "Engine")]
    engine: String,
    #[serde(rename = "DBInstanceClass")]
    instance_class: String,
    #[serde(rename = "MultiAZ", default)]
    multi_az: bool,
    #[serde(rename = "DBInstanceStatus")]
    status: String,
    #[serde(rename = "Endpoint", default)]
    endpoint: Option<Endpoint>,
}

#[derive(Debug, Deserialize)]
struct Endpoint {
    #[serde(rename = "Address")]
    address: String,
    #[serde(rename = "Port")]
    port: Option<u16>,
}

impl From<DbInstance> for InstanceDetails {
    fn from(db: DbInstance) -> Self {
        let endpoint = db.endpoint.map(|e| match e.port {
            Some(port) => format!("{}:{}", e.address, port),
            None => e.address,
        });
        InstanceDetails {
            identifier: db.identifier,
            engine: db.engine,
            instance_class: db.instance_class,
            multi_az: db.multi_az,
            status: db.status,
            endpoint,
        }
    }
}

/// Status API backed by the `aws` binary
#[derive(Clone)]
pub struct AwsCliRds {
    settings: AwsConfig,
    runner: Arc<dyn CommandRunner>,
}

impl AwsCliRds {
    pub fn new(settings: AwsConfig) -> Self {
        Self::with_runner(settings, Arc::new(SystemRunner))
    }

    pub fn with_runner(settings: AwsConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { settings, runner }
    }

    fn describe(&self, region: &str, id: &str) -> ProviderResult<InstanceDetails> {
        let mut spec = CommandSpec::new(self.settings.binary.as_str()).args([
            "rds",
            "describe-db-instances",
            "--region",
            region,
            "--db-instance-identifier",
            id,
            "--output",
            "json",
        ]);
        if let Some(profile) = &self.settings.profile {
            spec = spec.args(["--profile", profile.as_str()]);
        }

        let output = self.runner.run_checked(&spec)?;
        let parsed: DescribeDbInstances =
            serde_json::from_str(&output.stdout).map_err(|e| ProviderError::Parse {
                command: spec.display(),
                reason: e.to_string(),
            })?;

        let instance = parsed
            .db_instances
            .into_iter()
            .find(|db| db.identifier == id)
            .ok_or_else(|| ProviderError::InstanceNotFound(id.to_string()))?;
        debug!("{} in {} is {}", id, region, instance.status);
        Ok(instance.into())
    }
}

impl StatusApi for AwsCliRds {
    fn instance_details(&self, region: &str, id: &str) -> Result<InstanceDetails> {
        self.describe(region, id)
            .map_err(|e| Error::Status(e.to_string()))
    }
}
