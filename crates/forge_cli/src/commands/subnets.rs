//! Subnets command - Print the subnet plan for an address block.

use anyhow::Result;
use clap::Args;
use forge_iac::IacError;
use forge_net::{plan_subnets, AddressBlock, ZoneId, DEFAULT_SUBNET_PREFIX};
use tracing::info;

#[derive(Args)]
pub struct SubnetsArgs {
    /// VPC address block, e.g. 10.0.0.0/16
    #[arg(long)]
    cidr: String,

    /// Availability zones, in provider order
    #[arg(long, value_delimiter = ',', required = true)]
    zones: Vec<String>,

    /// Subnet prefix length
    #[arg(long, default_value_t = DEFAULT_SUBNET_PREFIX)]
    prefix: u8,

    /// Print JSON
    #[arg(long)]
    json: bool,
}

pub async fn execute(args: SubnetsArgs) -> Result<()> {
    let block: AddressBlock = args.cidr.parse().map_err(IacError::from)?;
    let zones: Vec<ZoneId> = args.zones.iter().map(|z| ZoneId::new(z.as_str())).collect();
    let plan = plan_subnets(&block, args.prefix, &zones).map_err(IacError::from)?;
    info!("Planned {} subnet pairs in {}", plan.subnet_count(), block);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("🌐 Subnet plan for {} (/{})", block, args.prefix);
    for subnet in plan.iter() {
        println!(
            "   {:<8} {:<3} {:<18} {}",
            subnet.tier.as_str(),
            subnet.index + 1,
            subnet.cidr.to_string(),
            subnet.zone
        );
    }
    Ok(())
}
