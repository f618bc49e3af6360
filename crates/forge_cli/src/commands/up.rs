//! Up command - Compose and apply the stack.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use forge_core::{LocalRuntime, Reconciler, ResourceOutcome};
use forge_iac::{IacError, TopologyComposer};
use tracing::info;

use super::{StackArgs, StateArgs};

#[derive(Args)]
pub struct UpArgs {
    #[command(flatten)]
    pub stack: StackArgs,

    #[command(flatten)]
    pub state: StateArgs,
}

pub async fn execute(args: UpArgs) -> Result<()> {
    let stack = args.stack.load()?;
    let composed = TopologyComposer::from_stack_file(&stack).compose().await?;

    std::fs::create_dir_all(&args.state.state_dir)?;
    let runtime = LocalRuntime::open(args.state.state_file(&composed.stack)).map_err(IacError::from)?;
    info!("Applying {} against {}", composed.stack, runtime.path().display());

    let reconciler = Reconciler::new(Arc::new(runtime)).with_log_dir(args.state.state_dir.clone());
    let log = reconciler
        .apply(&composed.stack, &composed.graph)
        .await
        .map_err(IacError::from)?;

    println!(
        "✅ {}: {} created, {} updated, {} unchanged, {} removed",
        composed.stack,
        log.with_outcome(ResourceOutcome::Created).len(),
        log.with_outcome(ResourceOutcome::Updated).len(),
        log.with_outcome(ResourceOutcome::Unchanged).len(),
        log.with_outcome(ResourceOutcome::Deleted).len()
    );
    println!();
    println!("📤 Outputs");
    for (name, value) in &log.outputs {
        println!("   {}: {}", name, value);
    }
    Ok(())
}
