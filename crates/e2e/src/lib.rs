//! infratest end-to-end support
//!
//! Helpers shared by the integration tests in `tests/`: logging setup,
//! tool discovery and the location of the Terraform module under test.
//!
//! ```text
//! tests/lifecycle.rs   fakes + FileStageStore, no cloud access
//! tests/rds_module.rs  real terraform + aws, #[ignore]d
//! ```

use std::path::PathBuf;

pub use infratest_provider::in_path;

/// Environment variable pointing at the RDS Terraform module
pub const MODULE_DIR_ENV: &str = "RDS_MODULE_DIR";

/// Install a test-friendly subscriber; repeated calls are no-ops
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_test_writer()
        .try_init();
}

/// Root of the cargo workspace
pub fn workspace_root() -> PathBuf {
    let manifest = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest
        .ancestors()
        .nth(2)
        .map(PathBuf::from)
        .unwrap_or(manifest)
}

/// The module directory: `$RDS_MODULE_DIR`, else `<workspace>/modules/rds`
pub fn module_dir() -> PathBuf {
    std::env::var_os(MODULE_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| workspace_root().join("modules").join("rds"))
}

/// Tools the real-infrastructure tests need that are missing from `PATH`
pub fn missing_tools(tools: &[&str]) -> Vec<String> {
    tools
        .iter()
        .filter(|tool| !in_path(tool))
        .map(|tool| tool.to_string())
        .collect()
}
