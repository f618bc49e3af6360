//! Address-space partitioning.
//!
//! Splits a block into the maximal set of disjoint, equally sized
//! sub-blocks in ascending address order. Downstream consumers index the
//! result positionally (subnet `i` is partition `i`), so the ordering is
//! part of the contract.

use tracing::debug;

use crate::block::AddressBlock;
use crate::error::{NetError, NetResult};

/// Prefix length used for every subnet of the topology.
pub const DEFAULT_SUBNET_PREFIX: u8 = 24;

fn check_target(block: &AddressBlock, target_prefix: u8) -> NetResult<()> {
    if target_prefix > 32 {
        return Err(NetError::invalid(
            block.to_string(),
            format!("target prefix /{} exceeds /32", target_prefix),
        ));
    }
    if target_prefix < block.prefix_len() {
        return Err(NetError::invalid(
            block.to_string(),
            format!(
                "target prefix /{} is shorter than the block prefix /{}",
                target_prefix,
                block.prefix_len()
            ),
        ));
    }
    Ok(())
}

/// Lazily iterate the `/target_prefix` sub-blocks of `block`.
pub fn partitions(
    block: &AddressBlock,
    target_prefix: u8,
) -> NetResult<impl Iterator<Item = AddressBlock>> {
    check_target(block, target_prefix)?;
    let subnets = block
        .as_net()
        .subnets(target_prefix)
        .map_err(|e| NetError::invalid(block.to_string(), e.to_string()))?;
    Ok(subnets.map(AddressBlock::from))
}

/// Number of sub-blocks `partition` would produce.
pub fn partition_count(block: &AddressBlock, target_prefix: u8) -> NetResult<u64> {
    check_target(block, target_prefix)?;
    Ok(1u64 << u32::from(target_prefix - block.prefix_len()))
}

/// Split `block` into every `/target_prefix` sub-block, ascending.
pub fn partition(block: &AddressBlock, target_prefix: u8) -> NetResult<Vec<AddressBlock>> {
    let result: Vec<AddressBlock> = partitions(block, target_prefix)?.collect();
    debug!(
        "Partitioned {} into {} blocks of /{}",
        block,
        result.len(),
        target_prefix
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(s: &str) -> AddressBlock {
        s.parse().unwrap()
    }

    #[test]
    fn test_partition_16_into_24() {
        let parts = partition(&block("10.0.0.0/16"), 24).unwrap();
        assert_eq!(parts.len(), 256);
        assert_eq!(parts[0].to_string(), "10.0.0.0/24");
        assert_eq!(parts[1].to_string(), "10.0.1.0/24");
        assert_eq!(parts[255].to_string(), "10.0.255.0/24");
    }

    #[test]
    fn test_partition_same_prefix_is_identity() {
        let parts = partition(&block("172.16.5.0/24"), 24).unwrap();
        assert_eq!(parts, vec![block("172.16.5.0/24")]);
    }

    #[test]
    fn test_partition_rejects_shorter_target() {
        let err = partition(&block("10.0.0.0/24"), 16).unwrap_err();
        assert!(matches!(err, NetError::InvalidBlock { .. }));
        assert!(err.to_string().contains("shorter"));
    }

    #[test]
    fn test_partition_rejects_target_over_32() {
        assert!(partition(&block("10.0.0.0/24"), 33).is_err());
    }

    #[test]
    fn test_partition_count_matches() {
        let b = block("10.0.0.0/20");
        assert_eq!(partition_count(&b, 24).unwrap(), 16);
        assert_eq!(partition(&b, 24).unwrap().len(), 16);
    }

    #[test]
    fn test_partitions_iterator_is_lazy_prefix() {
        let first: Vec<_> = partitions(&block("10.0.0.0/8"), 24)
            .unwrap()
            .take(3)
            .collect();
        assert_eq!(
            first,
            vec![block("10.0.0.0/24"), block("10.0.1.0/24"), block("10.0.2.0/24")]
        );
    }
}
