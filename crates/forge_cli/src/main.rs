//! tierforge CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Configuration error
//! - 3: Insufficient address space or zones
//! - 4: External lookup failure
//! - 5: Resource creation or deletion failure

use std::process::ExitCode;

use clap::Parser;
use forge_core::CoreError;
use forge_iac::IacError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const CONFIGURATION_ERROR: u8 = 2;
    pub const CAPACITY_ERROR: u8 = 3;
    pub const LOOKUP_ERROR: u8 = 4;
    pub const RESOURCE_ERROR: u8 = 5;
}

fn log_directives(verbose: bool, quiet: bool) -> &'static str {
    if verbose {
        "forge=debug,info"
    } else if quiet {
        "warn"
    } else {
        "forge=info,warn"
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_directives(cli.verbose, cli.quiet)));
    // A subscriber may already be installed.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .try_init();

    let result = match cli.command {
        Commands::Subnets(args) => commands::subnets::execute(args).await,
        Commands::Names(args) => commands::names::execute(args).await,
        Commands::Plan(args) => commands::plan::execute(args).await,
        Commands::Up(args) => commands::up::execute(args).await,
        Commands::Down(args) => commands::down::execute(args).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Map the root error to an exit code.
fn categorize_error(e: &anyhow::Error) -> u8 {
    let core = match e.downcast_ref::<IacError>() {
        Some(IacError::Configuration(_)) | Some(IacError::Yaml(_)) => {
            return ExitCodes::CONFIGURATION_ERROR
        }
        Some(IacError::Capacity(_)) => return ExitCodes::CAPACITY_ERROR,
        Some(IacError::ExternalLookup(_)) => return ExitCodes::LOOKUP_ERROR,
        Some(IacError::Core(core)) => Some(core),
        Some(IacError::Io(_)) => return ExitCodes::GENERAL_ERROR,
        None => e.downcast_ref::<CoreError>(),
    };

    match core {
        Some(CoreError::ResourceCreation { .. }) | Some(CoreError::ResourceDeletion { .. }) => {
            ExitCodes::RESOURCE_ERROR
        }
        Some(CoreError::UnboundPlaceholders { .. })
        | Some(CoreError::UnknownPlaceholder { .. })
        | Some(CoreError::PlaceholderAlreadyBound { .. }) => ExitCodes::CONFIGURATION_ERROR,
        _ => ExitCodes::GENERAL_ERROR,
    }
}
