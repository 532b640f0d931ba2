//! infratest provider adapters
//!
//! Concrete implementations of the core's external ports:
//! - [`TerraformCli`]: the [`Provisioner`](infratest_common::Provisioner) for Terraform modules
//! - [`AwsCliRds`]: the [`StatusApi`](infratest_common::StatusApi) for RDS instances
//!
//! Both shell out through a [`CommandRunner`] so their argument handling can
//! be tested without the real binaries.

pub mod command;
pub mod error;
pub mod rds;
pub mod terraform;

pub use command::{in_path, CommandOutput, CommandRunner, CommandSpec, SystemRunner};
pub use error::{ProviderError, ProviderResult};
pub use rds::AwsCliRds;
pub use terraform::TerraformCli;
