//! Error types for topology composition.

use forge_core::CoreError;
use forge_net::NetError;
use thiserror::Error;

/// Result type alias for IaC operations.
pub type IacResult<T> = Result<T, IacError>;

/// Errors that can occur while loading configuration or composing a stack.
#[derive(Error, Debug)]
pub enum IacError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Capacity error: {0}")]
    Capacity(String),

    #[error("Lookup failed: {0}")]
    ExternalLookup(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl IacError {
    pub(crate) fn missing(key: &str) -> Self {
        Self::Configuration(format!("missing required configuration value '{}'", key))
    }

    pub(crate) fn malformed(key: &str, reason: impl std::fmt::Display) -> Self {
        Self::Configuration(format!("configuration value '{}' {}", key, reason))
    }

    /// Whether a resource failed to be created or deleted during a run.
    pub fn is_resource_failure(&self) -> bool {
        matches!(
            self,
            IacError::Core(CoreError::ResourceCreation { .. })
                | IacError::Core(CoreError::ResourceDeletion { .. })
        )
    }
}

impl From<NetError> for IacError {
    fn from(err: NetError) -> Self {
        match err {
            NetError::InvalidBlock { .. } => IacError::Configuration(err.to_string()),
            NetError::InsufficientAddressSpace { .. } => IacError::Capacity(err.to_string()),
        }
    }
}
