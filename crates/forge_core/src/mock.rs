//! Mock reconciliation runtime for testing.
//!
//! Records every call and synthesizes attributes, so reconciliation can be
//! exercised without a backend.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{CoreError, CoreResult};
use crate::resource::{AppliedResource, ApplyOutcome, HeldResource, ResolvedResource, ResourceId};
use crate::runtime::ReconciliationRuntime;

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub method: String,
    pub resource: ResourceId,
    pub resource_type: Option<String>,
    pub properties: Option<serde_json::Value>,
}

/// Mock runtime.
///
/// Attributes default to `{id}-{attribute}` unless overridden with
/// [`MockRuntime::with_attribute`].
#[derive(Clone, Default)]
pub struct MockRuntime {
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
    /// Resources the runtime "holds".
    existing: Arc<RwLock<BTreeMap<ResourceId, HeldResource>>>,
    attributes: Arc<RwLock<HashMap<ResourceId, BTreeMap<String, String>>>>,
    failures: Arc<RwLock<HashMap<ResourceId, String>>>,
    /// Attributes to leave out of apply responses.
    withheld: Arc<RwLock<HashSet<(ResourceId, String)>>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any apply or destroy of `id` with `message`.
    pub fn fail_on(self, id: impl Into<ResourceId>, message: impl Into<String>) -> Self {
        self.failures.write().insert(id.into(), message.into());
        self
    }

    /// Report `value` for `attribute` of `id`.
    pub fn with_attribute(
        self,
        id: impl Into<ResourceId>,
        attribute: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.attributes
            .write()
            .entry(id.into())
            .or_default()
            .insert(attribute.into(), value.into());
        self
    }

    /// Never report `attribute` for `id`.
    pub fn withhold_attribute(self, id: impl Into<ResourceId>, attribute: impl Into<String>) -> Self {
        self.withheld.write().insert((id.into(), attribute.into()));
        self
    }

    /// Pretend `id` already exists.
    pub fn with_existing(self, id: impl Into<ResourceId>) -> Self {
        self.with_held(id, "test:index:Thing", &[])
    }

    /// Pretend `id` already exists, applied after `depends_on`.
    pub fn with_held(
        self,
        id: impl Into<ResourceId>,
        resource_type: impl Into<String>,
        depends_on: &[&str],
    ) -> Self {
        let id = id.into();
        self.existing.write().insert(
            id.clone(),
            HeldResource {
                id,
                resource_type: resource_type.into(),
                depends_on: depends_on.iter().map(|d| ResourceId::from(*d)).collect(),
            },
        );
        self
    }

    /// Ids the runtime currently holds.
    pub fn held_ids(&self) -> Vec<ResourceId> {
        self.existing.read().keys().cloned().collect()
    }

    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    pub fn call_count(&self) -> usize {
        self.captured_calls.read().len()
    }

    /// Resource ids passed to `method`, in call order.
    pub fn ids_for(&self, method: &str) -> Vec<ResourceId> {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.method == method)
            .map(|c| c.resource.clone())
            .collect()
    }

    pub fn applied_ids(&self) -> Vec<ResourceId> {
        self.ids_for("apply")
    }

    pub fn destroyed_ids(&self) -> Vec<ResourceId> {
        self.ids_for("destroy")
    }

    pub fn was_applied(&self, id: &str) -> bool {
        self.applied_ids().iter().any(|r| r.as_str() == id)
    }

    /// Properties passed on the most recent apply of `id`.
    pub fn applied_properties(&self, id: &str) -> Option<serde_json::Value> {
        self.captured_calls
            .read()
            .iter()
            .rev()
            .find(|c| c.method == "apply" && c.resource.as_str() == id)
            .and_then(|c| c.properties.clone())
    }

    fn record_call(&self, call: CapturedCall) {
        self.captured_calls.write().push(call);
    }

    fn check_failure(&self, id: &ResourceId) -> CoreResult<()> {
        if let Some(msg) = self.failures.read().get(id) {
            return Err(CoreError::Runtime(msg.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl ReconciliationRuntime for MockRuntime {
    fn name(&self) -> &str {
        "mock"
    }

    async fn apply(&self, resource: &ResolvedResource) -> CoreResult<AppliedResource> {
        self.record_call(CapturedCall {
            method: "apply".to_string(),
            resource: resource.id.clone(),
            resource_type: Some(resource.resource_type.clone()),
            properties: Some(resource.properties.clone()),
        });
        self.check_failure(&resource.id)?;

        let mut attributes = self
            .attributes
            .read()
            .get(&resource.id)
            .cloned()
            .unwrap_or_default();
        let withheld = self.withheld.read();

        for name in &resource.outputs {
            if withheld.contains(&(resource.id.clone(), name.clone())) {
                continue;
            }
            attributes
                .entry(name.clone())
                .or_insert_with(|| format!("{}-{}", resource.id, name));
        }

        let created = self
            .existing
            .write()
            .insert(
                resource.id.clone(),
                HeldResource {
                    id: resource.id.clone(),
                    resource_type: resource.resource_type.clone(),
                    depends_on: resource.depends_on.clone(),
                },
            )
            .is_none();
        Ok(AppliedResource {
            id: resource.id.clone(),
            outcome: if created {
                ApplyOutcome::Created
            } else {
                ApplyOutcome::Unchanged
            },
            attributes,
        })
    }

    async fn destroy(&self, id: &ResourceId, resource_type: &str) -> CoreResult<()> {
        self.record_call(CapturedCall {
            method: "destroy".to_string(),
            resource: id.clone(),
            resource_type: Some(resource_type.to_string()),
            properties: None,
        });
        self.check_failure(id)?;
        self.existing.write().remove(id);
        Ok(())
    }

    async fn exists(&self, id: &ResourceId) -> CoreResult<bool> {
        self.record_call(CapturedCall {
            method: "exists".to_string(),
            resource: id.clone(),
            resource_type: None,
            properties: None,
        });
        Ok(self.existing.read().contains_key(id))
    }

    async fn inventory(&self) -> CoreResult<Vec<HeldResource>> {
        Ok(self.existing.read().values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(id: &str, outputs: &[&str]) -> ResolvedResource {
        ResolvedResource {
            id: ResourceId::new(id),
            resource_type: "test:index:Thing".to_string(),
            properties: serde_json::json!({ "name": id }),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            depends_on: Vec::new(),
            sensitive: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_mock_runtime_default_attributes() {
        let runtime = MockRuntime::new().with_attribute("db", "port", "3306");

        let applied = runtime.apply(&resolved("db", &["address", "port"])).await.unwrap();
        assert_eq!(applied.outcome, ApplyOutcome::Created);
        assert_eq!(applied.attributes["address"], "db-address");
        assert_eq!(applied.attributes["port"], "3306");

        let again = runtime.apply(&resolved("db", &["address"])).await.unwrap();
        assert_eq!(again.outcome, ApplyOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_mock_runtime_captures_calls() {
        let runtime = MockRuntime::new();
        runtime.apply(&resolved("vpc", &[])).await.unwrap();
        runtime.apply(&resolved("subnet", &[])).await.unwrap();
        runtime
            .destroy(&ResourceId::new("subnet"), "test:index:Thing")
            .await
            .unwrap();

        assert_eq!(runtime.call_count(), 3);
        assert_eq!(runtime.applied_ids(), vec![ResourceId::new("vpc"), ResourceId::new("subnet")]);
        assert_eq!(runtime.destroyed_ids(), vec![ResourceId::new("subnet")]);
        assert!(!runtime.exists(&ResourceId::new("subnet")).await.unwrap());
        assert_eq!(runtime.applied_properties("vpc").unwrap()["name"], "vpc");
    }

    #[tokio::test]
    async fn test_mock_runtime_failure_simulation() {
        let runtime = MockRuntime::new().fail_on("db", "quota exceeded");
        let err = runtime.apply(&resolved("db", &[])).await.unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
        assert!(runtime.apply(&resolved("vpc", &[])).await.is_ok());
    }
}
