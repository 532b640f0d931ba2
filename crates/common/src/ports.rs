//! Ports to the external collaborators: the provisioning tool and the
//! cloud status API. Adapters live in `infratest-provider`; fakes live in
//! [`crate::testing`].

use serde::{Deserialize, Serialize};

use crate::deployment::DeploymentConfig;
use crate::error::Result;

/// Drives the infrastructure tool for one working directory.
///
/// `apply` and `destroy` must be idempotent: re-applying an unchanged config
/// or destroying absent infrastructure is not an error.
pub trait Provisioner: Send + Sync {
    /// Prepare the working directory (plugins, backend)
    fn init(&self, config: &DeploymentConfig) -> Result<()>;

    /// Create or update the infrastructure
    fn apply(&self, config: &DeploymentConfig) -> Result<()>;

    /// Tear the infrastructure down
    fn destroy(&self, config: &DeploymentConfig) -> Result<()>;

    /// Read a named output of the deployed infrastructure
    fn output(&self, config: &DeploymentConfig, name: &str) -> Result<String>;

    /// `init` followed by `apply`
    fn init_and_apply(&self, config: &DeploymentConfig) -> Result<()> {
        self.init(config)?;
        self.apply(config)
    }
}

/// Observed properties of a database instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDetails {
    pub identifier: String,
    pub engine: String,
    pub instance_class: String,
    pub multi_az: bool,
    pub status: String,
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Read-only access to the provider's view of a resource
pub trait StatusApi: Send + Sync {
    fn instance_details(&self, region: &str, id: &str) -> Result<InstanceDetails>;

    fn instance_status(&self, region: &str, id: &str) -> Result<String> {
        self.instance_details(region, id).map(|d| d.status)
    }
}

impl<P: Provisioner + ?Sized> Provisioner for &P {
    fn init(&self, config: &DeploymentConfig) -> Result<()> {
        (**self).init(config)
    }

    fn apply(&self, config: &DeploymentConfig) -> Result<()> {
        (**self).apply(config)
    }

    fn destroy(&self, config: &DeploymentConfig) -> Result<()> {
        (**self).destroy(config)
    }

    fn output(&self, config: &DeploymentConfig, name: &str) -> Result<String> {
        (**self).output(config, name)
    }
}

impl<S: StatusApi + ?Sized> StatusApi for &S {
    fn instance_details(&self, region: &str, id: &str) -> Result<InstanceDetails> {
        (**self).instance_details(region, id)
    }

    fn instance_status(&self, region: &str, id: &str) -> Result<String> {
        (**self).instance_status(region, id)
    }
}
