//! CLI command definitions.
//!
//! Each subcommand maps to one stage of a stack's life: inspect the subnet
//! plan, inspect names, plan the graph, apply it, destroy it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use forge_iac::{IacError, StackFile};

pub mod down;
pub mod names;
pub mod plan;
pub mod subnets;
pub mod up;

/// tierforge - multi-tier cloud topology engine
#[derive(Parser)]
#[command(name = "forge")]
#[command(version, about = "tierforge - multi-tier cloud topology engine")]
#[command(long_about = r#"
tierforge composes a multi-tier cloud topology (network, perimeter, data,
compute, edge and eventing tiers) from a stack file and reconciles it in
dependency order.

COMMANDS:
  subnets  → Print the subnet plan for an address block
  names    → Print resolved resource names
  plan     → Compose the stack and print waves and edges
  up       → Apply the stack
  down     → Destroy the stack in reverse order

EXIT CODES:
  0 - Success
  1 - General error
  2 - Configuration error
  3 - Insufficient address space or zones
  4 - External lookup failure
  5 - Resource creation or deletion failure
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the subnet plan for an address block
    Subnets(subnets::SubnetsArgs),

    /// Print resolved resource names
    Names(names::NamesArgs),

    /// Compose the stack and print the plan
    Plan(plan::PlanArgs),

    /// Compose and apply the stack
    Up(up::UpArgs),

    /// Destroy the stack
    Down(down::DownArgs),
}

/// Selects the stack file.
#[derive(Args, Debug, Clone)]
pub struct StackArgs {
    /// Environment name
    #[arg(short, long, default_value = "dev")]
    pub env: String,

    /// Stack file (defaults to Forge.<env>.yaml)
    #[arg(short, long, env = "FORGE_CONFIG")]
    pub config: Option<PathBuf>,
}

impl StackArgs {
    pub fn path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| StackFile::default_path(&self.env))
    }

    pub fn load(&self) -> Result<StackFile> {
        let path = self.path();
        if !path.exists() {
            return Err(IacError::Configuration(format!(
                "stack file not found: {}",
                path.display()
            ))
            .into());
        }
        StackFile::from_file(&path)
            .with_context(|| format!("Failed to load stack file {}", path.display()))
    }
}

/// Where `up` and `down` keep state and run logs.
#[derive(Args, Debug, Clone)]
pub struct StateArgs {
    /// State directory
    #[arg(long, default_value = ".forge")]
    pub state_dir: PathBuf,
}

impl StateArgs {
    pub fn state_file(&self, stack: &str) -> PathBuf {
        self.state_dir.join(format!("{}.state.json", stack))
    }
}
