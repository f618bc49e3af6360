//! Names command - Print resolved resource names.

use anyhow::Result;
use clap::Args;
use forge_iac::ResourceNames;

use super::StackArgs;

#[derive(Args)]
pub struct NamesArgs {
    #[command(flatten)]
    stack: StackArgs,
}

pub async fn execute(args: NamesArgs) -> Result<()> {
    let stack = args.stack.load()?;
    let names = ResourceNames::resolve(&stack.config);

    println!("🏷️  Resource names for {}", stack.stack_name());
    for (logical, name) in names.iter() {
        let marker = if names.is_overridden(logical) { "*" } else { " " };
        println!("   {} {:<36} {}", marker, logical.key(), name);
    }
    println!();
    println!("   * overridden in stack config");
    Ok(())
}
