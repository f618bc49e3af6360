//! IPv4 address blocks.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::error::{NetError, NetResult};

/// A contiguous IPv4 range expressed as network address + prefix length.
///
/// Host bits of the parsed base address are cleared, so `10.0.3.7/16`
/// and `10.0.0.0/16` denote the same block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AddressBlock(Ipv4Net);

impl AddressBlock {
    /// Build a block from a base address and prefix length.
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> NetResult<Self> {
        Ipv4Net::new(addr, prefix_len)
            .map(|net| Self(net.trunc()))
            .map_err(|e| NetError::invalid(format!("{}/{}", addr, prefix_len), e.to_string()))
    }

    pub fn network(&self) -> Ipv4Addr {
        self.0.network()
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        self.0.broadcast()
    }

    pub fn prefix_len(&self) -> u8 {
        self.0.prefix_len()
    }

    /// Number of addresses covered by the block.
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix_len()))
    }

    /// Whether `other` lies entirely inside this block.
    pub fn contains(&self, other: &AddressBlock) -> bool {
        self.0.contains(&other.0)
    }

    /// Whether the two blocks share at least one address.
    pub fn overlaps(&self, other: &AddressBlock) -> bool {
        self.contains(other) || other.contains(self)
    }

    pub fn as_net(&self) -> &Ipv4Net {
        &self.0
    }
}

impl From<Ipv4Net> for AddressBlock {
    fn from(net: Ipv4Net) -> Self {
        Self(net.trunc())
    }
}

impl FromStr for AddressBlock {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if !trimmed.contains('/') {
            return Err(NetError::invalid(trimmed, "missing prefix length"));
        }
        trimmed
            .parse::<Ipv4Net>()
            .map(Self::from)
            .map_err(|e| NetError::invalid(trimmed, e.to_string()))
    }
}

impl TryFrom<String> for AddressBlock {
    type Error = NetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AddressBlock> for String {
    fn from(block: AddressBlock) -> Self {
        block.to_string()
    }
}

impl fmt::Display for AddressBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network(), self.prefix_len())
    }
}
