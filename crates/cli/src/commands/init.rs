//! Write a starter configuration file

use anyhow::{bail, Result};
use clap::Args;
use std::path::Path;

use infratest_common::HarnessConfig;

use crate::output::print_success;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

pub fn execute(path: &Path, args: &InitArgs) -> Result<()> {
    if path.exists() && !args.force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    HarnessConfig::default().save(path)?;
    print_success(&format!("Wrote {}", path.display()));
    Ok(())
}
