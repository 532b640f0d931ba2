//! infratest CLI - Main Entry Point
//!
//! Exit codes: 0 when the run passed, 1 when a stage or assertion failed,
//! 2 when the harness itself could not start (bad config, or no saved
//! deployment for `validate`/`cleanup` to resume).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use infratest_cli::commands::{init, run, show};
use infratest_cli::output::{self, print_error};
use infratest_common::{HarnessConfig, Stage, DEFAULT_CONFIG_FILE};

/// infratest - staged infrastructure tests
#[derive(Parser)]
#[command(name = "infratest")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(long, short, default_value = DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Terraform module directory (overrides the config file)
    #[arg(long, global = true, env = "INFRATEST_WORKING_DIR")]
    working_dir: Option<PathBuf>,

    /// Shared stage store directory (overrides the config file)
    #[arg(long, global = true)]
    store_root: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run setup, validate and cleanup
    Run(run::RunArgs),

    /// Provision and persist the deployment config
    Setup,

    /// Validate a deployment provisioned by an earlier setup
    Validate,

    /// Destroy a deployment provisioned by an earlier setup
    Cleanup,

    /// Show the persisted deployment config
    Show,

    /// Write a default configuration file
    Init(init::InitArgs),
}

impl Cli {
    fn harness_config(&self) -> anyhow::Result<HarnessConfig> {
        let mut config = HarnessConfig::load(&self.config)?;
        if let Some(dir) = &self.working_dir {
            config.working_dir = dir.clone();
        }
        if let Some(root) = &self.store_root {
            config.store.root = Some(root.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

fn dispatch(cli: &Cli) -> anyhow::Result<bool> {
    if let Commands::Init(args) = &cli.command {
        init::execute(&cli.config, args)?;
        return Ok(true);
    }

    let config = cli.harness_config()?;
    match &cli.command {
        Commands::Run(args) => run::execute(&config, args.control(), cli.format),
        Commands::Setup => run::execute_stage(&config, Stage::Setup, cli.format),
        Commands::Validate => run::execute_stage(&config, Stage::Validate, cli.format),
        Commands::Cleanup => run::execute_stage(&config, Stage::Cleanup, cli.format),
        Commands::Show => show::execute(&config, cli.format).map(|_| true),
        Commands::Init(_) => Ok(true),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    match dispatch(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            print_error(&format!("{:#}", e));
            ExitCode::from(2)
        }
    }
}
