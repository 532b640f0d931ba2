//! In-memory fakes of the external ports, for tests

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

use crate::deployment::DeploymentConfig;
use crate::error::{Error, Result};
use crate::ports::{InstanceDetails, Provisioner, StatusApi};

/// A call made against [`FakeProvisioner`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Init,
    Apply,
    Destroy,
    Output(String),
}

#[derive(Debug, Default)]
struct FakeState {
    calls: Vec<Call>,
    deployed: bool,
    applied: Vec<DeploymentConfig>,
    destroyed: Vec<DeploymentConfig>,
}

/// Provisioner that tracks a single deployment in memory
#[derive(Debug, Default)]
pub struct FakeProvisioner {
    outputs: HashMap<String, String>,
    fail_apply: Option<String>,
    fail_destroy: Option<String>,
    state: Mutex<FakeState>,
}

impl FakeProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output returned once something is deployed
    pub fn with_output(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.outputs.insert(name.into(), value.into());
        self
    }

    pub fn failing_apply(mut self, reason: impl Into<String>) -> Self {
        self.fail_apply = Some(reason.into());
        self
    }

    pub fn failing_destroy(mut self, reason: impl Into<String>) -> Self {
        self.fail_destroy = Some(reason.into());
        self
    }

    /// Mark infrastructure as already deployed (e.g. by an earlier process)
    pub fn already_deployed(self) -> Self {
        self.state.lock().deployed = true;
        self
    }

    pub fn count(&self, call: &Call) -> usize {
        self.state.lock().calls.iter().filter(|c| *c == call).count()
    }

    pub fn is_deployed(&self) -> bool {
        self.state.lock().deployed
    }

    pub fn applied(&self) -> Vec<DeploymentConfig> {
        self.state.lock().applied.clone()
    }

    pub fn destroyed(&self) -> Vec<DeploymentConfig> {
        self.state.lock().destroyed.clone()
    }
}

impl Provisioner for FakeProvisioner {
    fn init(&self, _config: &DeploymentConfig) -> Result<()> {
        self.state.lock().calls.push(Call::Init);
        Ok(())
    }

    fn apply(&self, config: &DeploymentConfig) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::Apply);
        if let Some(reason) = &self.fail_apply {
            return Err(Error::Provision(reason.clone()));
        }
        state.deployed = true;
        state.applied.push(config.clone());
        Ok(())
    }

    fn destroy(&self, config: &DeploymentConfig) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::Destroy);
        if let Some(reason) = &self.fail_destroy {
            return Err(Error::Provision(reason.clone()));
        }
        // Destroying nothing is a no-op
        state.deployed = false;
        state.destroyed.push(config.clone());
        Ok(())
    }

    fn output(&self, _config: &DeploymentConfig, name: &str) -> Result<String> {
        let mut state = self.state.lock();
        state.calls.push(Call::Output(name.to_string()));
        if !state.deployed {
            return Err(Error::Output {
                name: name.to_string(),
                reason: "nothing is deployed".to_string(),
            });
        }
        self.outputs.get(name).cloned().ok_or_else(|| Error::Output {
            name: name.to_string(),
            reason: "no such output".to_string(),
        })
    }
}

/// Status API that replays a scripted sequence of statuses.
///
/// The last status repeats once the script runs out.
#[derive(Debug)]
pub struct ScriptedStatus {
    details: InstanceDetails,
    statuses: Mutex<VecDeque<Result<String>>>,
    last: Mutex<String>,
    status_calls: Mutex<usize>,
}

impl ScriptedStatus {
    pub fn new(details: InstanceDetails) -> Self {
        let last = details.status.clone();
        Self {
            details,
            statuses: Mutex::new(VecDeque::new()),
            last: Mutex::new(last),
            status_calls: Mutex::new(0),
        }
    }

    /// Statuses returned by successive `instance_status` calls
    pub fn with_statuses<I, S>(self, statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.statuses
            .lock()
            .extend(statuses.into_iter().map(|s| Ok(s.into())));
        self
    }

    /// Queue a failing status sample
    pub fn with_error(self, reason: impl Into<String>) -> Self {
        self.statuses.lock().push_back(Err(Error::Status(reason.into())));
        self
    }

    pub fn status_calls(&self) -> usize {
        *self.status_calls.lock()
    }
}

impl StatusApi for ScriptedStatus {
    fn instance_details(&self, _region: &str, id: &str) -> Result<InstanceDetails> {
        if id != self.details.identifier {
            return Err(Error::Status(format!("DBInstanceNotFound: {}", id)));
        }
        Ok(self.details.clone())
    }

    fn instance_status(&self, _region: &str, _id: &str) -> Result<String> {
        *self.status_calls.lock() += 1;
        match self.statuses.lock().pop_front() {
            Some(Ok(status)) => {
                *self.last.lock() = status.clone();
                Ok(status)
            }
            Some(Err(e)) => Err(e),
            None => Ok(self.last.lock().clone()),
        }
    }
}

/// Details of a healthy single-AZ postgres instance
pub fn postgres_instance(id: &str) -> InstanceDetails {
    InstanceDetails {
        identifier: id.to_string(),
        engine: "postgres".to_string(),
        instance_class: "db.t3.micro".to_string(),
        multi_az: false,
        status: "available".to_string(),
        endpoint: Some(format!("{}.abc123.us-east-1.rds.amazonaws.com:5432", id)),
    }
}
