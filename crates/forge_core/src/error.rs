//! Error types for the core module.

use thiserror::Error;

use crate::resource::ResourceId;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while declaring or reconciling resources.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Resource declared twice: {0}")]
    DuplicateResource(ResourceId),

    #[error("Resource {consumer} references undeclared resource {producer}")]
    UnknownResource {
        consumer: ResourceId,
        producer: ResourceId,
    },

    #[error("Cyclic dependency detected at {0}")]
    CyclicDependency(ResourceId),

    #[error("Deferred value {reference} already resolved")]
    AlreadyResolved { reference: String },

    #[error("Deferred value {reference} is still pending")]
    UnresolvedDeferred { reference: String },

    #[error("Unbound placeholders in payload '{payload}': {}", .placeholders.join(", "))]
    UnboundPlaceholders {
        payload: String,
        placeholders: Vec<String>,
    },

    #[error("Payload '{payload}' has no placeholder ${{{placeholder}}}")]
    UnknownPlaceholder { payload: String, placeholder: String },

    #[error("Placeholder ${{{placeholder}}} in payload '{payload}' is already bound")]
    PlaceholderAlreadyBound { payload: String, placeholder: String },

    #[error("Runtime did not report attribute '{attribute}' for {resource}")]
    MissingAttribute {
        resource: ResourceId,
        attribute: String,
    },

    #[error("Failed to create {resource}: {message}")]
    ResourceCreation {
        resource: ResourceId,
        message: String,
    },

    #[error("Failed to delete {resource}: {message}")]
    ResourceDeletion {
        resource: ResourceId,
        message: String,
    },

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
