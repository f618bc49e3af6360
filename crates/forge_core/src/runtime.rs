//! Reconciliation runtime trait.

use async_trait::async_trait;

use crate::error::CoreResult;
use crate::resource::{AppliedResource, HeldResource, ResolvedResource, ResourceId};

/// Backend that turns resolved declarations into real resources.
///
/// Implementations must be safe to call concurrently for resources in the
/// same creation wave. One runtime instance holds the resources of one
/// stack.
#[async_trait]
pub trait ReconciliationRuntime: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Create or update a resource and report its attributes.
    ///
    /// The returned attributes must include every name in
    /// `resource.outputs`.
    async fn apply(&self, resource: &ResolvedResource) -> CoreResult<AppliedResource>;

    /// Delete a resource.
    async fn destroy(&self, id: &ResourceId, resource_type: &str) -> CoreResult<()>;

    /// Whether the runtime currently holds the resource.
    async fn exists(&self, id: &ResourceId) -> CoreResult<bool>;

    /// Every resource the runtime holds, with the producers recorded on its
    /// last apply.
    async fn inventory(&self) -> CoreResult<Vec<HeldResource>>;
}
