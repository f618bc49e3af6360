//! Zone-aware subnet allocation.
//!
//! The first `n` partitions become public subnets and the next `n` become
//! private subnets, where `n = min(zones, MAX_SUBNET_ZONES)`. Public and
//! private subnet `i` share zone `i`.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::block::AddressBlock;
use crate::error::{NetError, NetResult};
use crate::partition::partitions;

/// Upper bound on the number of zones a topology spreads across.
pub const MAX_SUBNET_ZONES: usize = 3;

/// An availability zone name as reported by zone discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(String);

impl ZoneId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ZoneId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ZoneId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Routing tier of a subnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubnetTier {
    Public,
    Private,
}

impl SubnetTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubnetTier::Public => "public",
            SubnetTier::Private => "private",
        }
    }
}

impl fmt::Display for SubnetTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One subnet placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedSubnet {
    /// Position within its tier (0-based).
    pub index: usize,
    pub tier: SubnetTier,
    pub cidr: AddressBlock,
    pub zone: ZoneId,
}

/// Public/private subnet placement for one deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetPlan {
    public: Vec<PlannedSubnet>,
    private: Vec<PlannedSubnet>,
}

impl SubnetPlan {
    /// Number of subnets per tier.
    pub fn subnet_count(&self) -> usize {
        self.public.len()
    }

    pub fn public(&self) -> &[PlannedSubnet] {
        &self.public
    }

    pub fn private(&self) -> &[PlannedSubnet] {
        &self.private
    }

    pub fn is_empty(&self) -> bool {
        self.public.is_empty()
    }

    /// All subnets in allocation order: public first, then private.
    pub fn iter(&self) -> impl Iterator<Item = &PlannedSubnet> {
        self.public.iter().chain(self.private.iter())
    }

    /// Zones used by the plan, in placement order.
    pub fn zones(&self) -> Vec<&ZoneId> {
        self.public.iter().map(|s| &s.zone).collect()
    }
}

/// Number of subnets per tier for `zone_count` available zones.
pub fn subnet_count(zone_count: usize) -> usize {
    zone_count.min(MAX_SUBNET_ZONES)
}

/// Place partitions into public/private subnets across `zones`.
pub fn allocate(partitions: &[AddressBlock], zones: &[ZoneId]) -> NetResult<SubnetPlan> {
    let n = subnet_count(zones.len());
    let required = 2 * n;
    if partitions.len() < required {
        return Err(NetError::InsufficientAddressSpace {
            required,
            available: partitions.len(),
        });
    }

    let place = |tier: SubnetTier, offset: usize| -> Vec<PlannedSubnet> {
        zones[..n]
            .iter()
            .enumerate()
            .map(|(i, zone)| PlannedSubnet {
                index: i,
                tier,
                cidr: partitions[offset + i],
                zone: zone.clone(),
            })
            .collect()
    };

    let plan = SubnetPlan {
        public: place(SubnetTier::Public, 0),
        private: place(SubnetTier::Private, n),
    };

    debug!(
        "Allocated {} public and {} private subnets across {} of {} zones",
        plan.public.len(),
        plan.private.len(),
        n,
        zones.len()
    );
    Ok(plan)
}

/// Partition `block` and allocate the resulting sub-blocks across `zones`.
///
/// Only the `2 * n` partitions the plan needs are materialized.
pub fn plan_subnets(
    block: &AddressBlock,
    target_prefix: u8,
    zones: &[ZoneId],
) -> NetResult<SubnetPlan> {
    let needed = 2 * subnet_count(zones.len());
    let parts: Vec<AddressBlock> = partitions(block, target_prefix)?.take(needed).collect();
    let plan = allocate(&parts, zones)?;
    info!(
        "Subnet plan for {}: {} zones, /{} subnets",
        block,
        plan.subnet_count(),
        target_prefix
    );
    Ok(plan)
}
