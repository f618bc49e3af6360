//! Plan command - Compose the stack and print what `up` would do.

use anyhow::Result;
use clap::Args;
use forge_iac::TopologyComposer;
use tracing::info;

use super::StackArgs;

#[derive(Args)]
pub struct PlanArgs {
    #[command(flatten)]
    stack: StackArgs,

    /// Print the full report as JSON
    #[arg(long)]
    json: bool,
}

pub async fn execute(args: PlanArgs) -> Result<()> {
    let stack = args.stack.load()?;
    info!("Planning stack: {}", stack.stack_name());

    let composed = TopologyComposer::from_stack_file(&stack).compose().await?;
    let report = composed.report();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("🌐 Subnets");
    for subnet in report.subnets.iter() {
        println!("   {:<8} {:<18} {}", subnet.tier.as_str(), subnet.cidr.to_string(), subnet.zone);
    }

    println!();
    println!("🏗️  {} resources in {} waves", report.resources.len(), report.waves.len());
    for (i, wave) in report.waves.iter().enumerate() {
        println!("   wave {}: {}", i + 1, wave.join(", "));
    }

    println!();
    println!("🔗 Edges");
    for edge in &report.edges {
        println!("   {}", edge);
    }

    println!();
    println!("📤 Outputs: {}", report.outputs.join(", "));
    Ok(())
}
