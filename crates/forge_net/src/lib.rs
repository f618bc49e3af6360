//! # forge_net
//!
//! Address planning for tierforge.
//!
//! Carves a VPC address block into equally sized sub-blocks and places
//! them into public/private subnet pairs across at most three
//! availability zones.
//!
//! ## Example
//!
//! ```rust
//! use forge_net::{plan_subnets, AddressBlock, ZoneId, DEFAULT_SUBNET_PREFIX};
//!
//! let block: AddressBlock = "10.0.0.0/16".parse().unwrap();
//! let zones: Vec<ZoneId> = ["us-east-1a", "us-east-1b", "us-east-1c", "us-east-1d"]
//!     .into_iter()
//!     .map(ZoneId::from)
//!     .collect();
//!
//! let plan = plan_subnets(&block, DEFAULT_SUBNET_PREFIX, &zones).unwrap();
//! assert_eq!(plan.subnet_count(), 3);
//! assert_eq!(plan.private()[0].cidr.to_string(), "10.0.3.0/24");
//! ```

pub mod allocator;
pub mod block;
pub mod error;
pub mod partition;

pub use allocator::{
    allocate, plan_subnets, subnet_count, PlannedSubnet, SubnetPlan, SubnetTier, ZoneId,
    MAX_SUBNET_ZONES,
};
pub use block::AddressBlock;
pub use error::{NetError, NetResult};
pub use partition::{partition, partition_count, partitions, DEFAULT_SUBNET_PREFIX};
