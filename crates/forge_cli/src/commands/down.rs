//! Down command - Destroy the stack in reverse dependency order.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use forge_core::{LocalRuntime, Reconciler, ResourceOutcome};
use forge_iac::{IacError, TopologyComposer};
use tracing::{info, warn};

use super::{StackArgs, StateArgs};

#[derive(Args)]
pub struct DownArgs {
    #[command(flatten)]
    stack: StackArgs,

    #[command(flatten)]
    state: StateArgs,
}

pub async fn execute(args: DownArgs) -> Result<()> {
    let stack = args.stack.load()?;
    let composed = TopologyComposer::from_stack_file(&stack).compose().await?;

    std::fs::create_dir_all(&args.state.state_dir)?;
    let state_file = args.state.state_file(&composed.stack);
    if !state_file.exists() {
        warn!("No state for {} at {}", composed.stack, state_file.display());
    }
    let runtime = LocalRuntime::open(state_file).map_err(IacError::from)?;
    info!("Destroying {}", composed.stack);

    let reconciler = Reconciler::new(Arc::new(runtime)).with_log_dir(args.state.state_dir.clone());
    let log = reconciler
        .destroy(&composed.stack, &composed.graph)
        .await
        .map_err(IacError::from)?;

    println!(
        "🗑️  {}: {} deleted, {} already absent",
        composed.stack,
        log.with_outcome(ResourceOutcome::Deleted).len(),
        log.with_outcome(ResourceOutcome::Absent).len()
    );
    Ok(())
}
