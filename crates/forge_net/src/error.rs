//! Error types for address planning.

use thiserror::Error;

/// Result type alias for network planning operations.
pub type NetResult<T> = Result<T, NetError>;

/// Errors that can occur while partitioning or allocating address space.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetError {
    #[error("Invalid address block '{block}': {reason}")]
    InvalidBlock { block: String, reason: String },

    #[error("Insufficient address space: {required} partitions required, {available} available")]
    InsufficientAddressSpace { required: usize, available: usize },
}

impl NetError {
    pub(crate) fn invalid(block: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidBlock {
            block: block.into(),
            reason: reason.into(),
        }
    }
}
