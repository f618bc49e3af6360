//! File-backed runtime that simulates a cloud account on disk.
//!
//! Every applied resource is stored in a JSON state file together with the
//! attributes the runtime synthesized for it. Re-applying identical
//! properties is a no-op, so repeated runs converge. Sensitive properties
//! are stored as SHA-256 digests.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::resource::{AppliedResource, ApplyOutcome, HeldResource, ResolvedResource, ResourceId};
use crate::runtime::ReconciliationRuntime;

/// A resource held by the local runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResource {
    pub resource_type: String,
    pub properties: serde_json::Value,
    pub attributes: BTreeMap<String, String>,
    /// Producers at the last apply.
    #[serde(default)]
    pub depends_on: Vec<ResourceId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LocalState {
    resources: BTreeMap<ResourceId, StoredResource>,
}

/// Runtime persisting resources to a JSON file.
pub struct LocalRuntime {
    path: PathBuf,
    state: Mutex<LocalState>,
}

impl LocalRuntime {
    /// Open the state file at `path`, starting empty if it does not exist.
    pub fn open(path: impl Into<PathBuf>) -> CoreResult<Self> {
        let path = path.into();
        let state = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            LocalState::default()
        };
        debug!("Opened local state {:?}", path);
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored copy of a resource.
    pub fn get(&self, id: &ResourceId) -> Option<StoredResource> {
        self.state.lock().resources.get(id).cloned()
    }

    pub fn resource_ids(&self) -> Vec<ResourceId> {
        self.state.lock().resources.keys().cloned().collect()
    }

    fn save(&self, state: &LocalState) -> CoreResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(state)?)?;
        Ok(())
    }
}

/// Properties as written to disk: sensitive keys become `sha256:<hex>`.
fn stored_properties(resource: &ResolvedResource) -> serde_json::Value {
    let mut properties = resource.properties.clone();
    if let Some(map) = properties.as_object_mut() {
        for key in &resource.sensitive {
            if let Some(value) = map.get_mut(key) {
                let mut hasher = Sha256::new();
                hasher.update(value.to_string().as_bytes());
                *value = serde_json::Value::String(format!("sha256:{}", hex::encode(hasher.finalize())));
            }
        }
    }
    properties
}

/// `aws:ec2/securityGroup:SecurityGroup` -> `securitygroup`.
fn short_type(resource_type: &str) -> String {
    resource_type
        .rsplit(':')
        .next()
        .unwrap_or(resource_type)
        .to_lowercase()
}

fn synthesize(resource: &ResolvedResource, physical_id: &str, attribute: &str) -> String {
    let short = short_type(&resource.resource_type);
    match attribute {
        "id" => physical_id.to_string(),
        "arn" => format!("arn:local:{}:{}", short, physical_id),
        "name" => resource
            .properties
            .get("name")
            .and_then(|v| v.as_str())
            .map(String::from)
            .unwrap_or_else(|| physical_id.to_string()),
        "address" => format!("{}.{}.local", physical_id, short),
        "endpoint" => {
            let port = resource
                .properties
                .get("port")
                .and_then(|v| v.as_i64())
                .unwrap_or(0);
            format!("{}.{}.local:{}", physical_id, short, port)
        }
        "dnsName" => format!("{}.elb.local", physical_id),
        "zoneId" => format!("Z{}", physical_id.replace('-', "").to_uppercase()),
        "publicIp" => {
            let n = physical_id
                .bytes()
                .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
            format!("203.0.{}.{}", (n >> 8) % 256, n % 254 + 1)
        }
        "privateKey" => STANDARD.encode(Uuid::new_v4().as_bytes()),
        other => format!("{}-{}", physical_id, other),
    }
}

#[async_trait]
impl ReconciliationRuntime for LocalRuntime {
    fn name(&self) -> &str {
        "local"
    }

    async fn apply(&self, resource: &ResolvedResource) -> CoreResult<AppliedResource> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let now = Utc::now();
        let properties = stored_properties(resource);
        let mut dirty = false;

        let outcome = match state.resources.get_mut(&resource.id) {
            Some(stored) if stored.properties == properties => {
                if stored.depends_on != resource.depends_on {
                    stored.depends_on = resource.depends_on.clone();
                    dirty = true;
                }
                ApplyOutcome::Unchanged
            }
            Some(stored) => {
                stored.properties = properties;
                stored.depends_on = resource.depends_on.clone();
                stored.updated_at = now;
                // Attributes derived from properties are recomputed below.
                stored
                    .attributes
                    .retain(|k, _| k == "id" || k == "arn" || k == "privateKey");
                ApplyOutcome::Updated
            }
            None => {
                let physical_id = format!(
                    "{}-{}",
                    short_type(&resource.resource_type),
                    &Uuid::new_v4().simple().to_string()[..8]
                );
                let mut attributes = BTreeMap::new();
                attributes.insert("id".to_string(), physical_id);
                state.resources.insert(
                    resource.id.clone(),
                    StoredResource {
                        resource_type: resource.resource_type.clone(),
                        properties,
                        attributes,
                        depends_on: resource.depends_on.clone(),
                        created_at: now,
                        updated_at: now,
                    },
                );
                ApplyOutcome::Created
            }
        };

        let stored = state
            .resources
            .get_mut(&resource.id)
            .ok_or_else(|| CoreError::Runtime(format!("lost {}", resource.id)))?;
        let physical_id = stored.attributes.get("id").cloned().unwrap_or_default();
        for name in &resource.outputs {
            if !stored.attributes.contains_key(name) {
                let value = synthesize(resource, &physical_id, name);
                stored.attributes.insert(name.clone(), value);
            }
        }
        let attributes = stored.attributes.clone();

        if dirty || outcome != ApplyOutcome::Unchanged || !resource.outputs.is_empty() {
            self.save(state)?;
        }
        info!("{:?} {} ({})", outcome, resource.id, resource.resource_type);

        Ok(AppliedResource {
            id: resource.id.clone(),
            outcome,
            attributes,
        })
    }

    async fn destroy(&self, id: &ResourceId, resource_type: &str) -> CoreResult<()> {
        let mut state = self.state.lock();
        if state.resources.remove(id).is_some() {
            self.save(&state)?;
            info!("Deleted {} ({})", id, resource_type);
        }
        Ok(())
    }

    async fn exists(&self, id: &ResourceId) -> CoreResult<bool> {
        Ok(self.state.lock().resources.contains_key(id))
    }

    async fn inventory(&self) -> CoreResult<Vec<HeldResource>> {
        Ok(self
            .state
            .lock()
            .resources
            .iter()
            .map(|(id, stored)| HeldResource {
                id: id.clone(),
                resource_type: stored.resource_type.clone(),
                depends_on: stored.depends_on.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn db(port: i64) -> ResolvedResource {
        ResolvedResource {
            id: ResourceId::new("db"),
            resource_type: "aws:rds/instance:Instance".to_string(),
            properties: serde_json::json!({ "name": "csye6225", "port": port }),
            outputs: vec!["address".to_string(), "endpoint".to_string()],
            depends_on: vec![ResourceId::new("db-subnets")],
            sensitive: Vec::new(),
        }
    }

    #[test]
    fn test_short_type() {
        assert_eq!(short_type("aws:ec2/securityGroup:SecurityGroup"), "securitygroup");
        assert_eq!(short_type("plain"), "plain");
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let runtime = LocalRuntime::open(temp_dir.path().join("state.json")).unwrap();

        let first = runtime.apply(&db(3306)).await.unwrap();
        assert_eq!(first.outcome, ApplyOutcome::Created);
        assert!(first.attributes["endpoint"].ends_with(":3306"));
        assert!(first.attributes["address"].ends_with(".instance.local"));

        let second = runtime.apply(&db(3306)).await.unwrap();
        assert_eq!(second.outcome, ApplyOutcome::Unchanged);
        assert_eq!(first.attributes, second.attributes);
    }

    #[tokio::test]
    async fn test_changed_properties_update_in_place() {
        let temp_dir = TempDir::new().unwrap();
        let runtime = LocalRuntime::open(temp_dir.path().join("state.json")).unwrap();

        let first = runtime.apply(&db(3306)).await.unwrap();
        let second = runtime.apply(&db(5432)).await.unwrap();
        assert_eq!(second.outcome, ApplyOutcome::Updated);
        assert_eq!(first.attributes["id"], second.attributes["id"]);
        assert!(second.attributes["endpoint"].ends_with(":5432"));
    }

    #[tokio::test]
    async fn test_state_survives_reopen_and_destroy() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("state.json");

        let runtime = LocalRuntime::open(&path).unwrap();
        runtime.apply(&db(3306)).await.unwrap();
        drop(runtime);

        let reopened = LocalRuntime::open(&path).unwrap();
        let id = ResourceId::new("db");
        assert!(reopened.exists(&id).await.unwrap());
        assert_eq!(reopened.apply(&db(3306)).await.unwrap().outcome, ApplyOutcome::Unchanged);

        reopened.destroy(&id, "aws:rds/instance:Instance").await.unwrap();
        assert!(!reopened.exists(&id).await.unwrap());
        assert!(reopened.resource_ids().is_empty());
    }

    #[tokio::test]
    async fn test_inventory_keeps_producers() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state.json");
        let runtime = LocalRuntime::open(&path).unwrap();
        runtime.apply(&db(3306)).await.unwrap();

        let mut moved = db(3306);
        moved.depends_on = vec![ResourceId::new("db-subnets"), ResourceId::new("db-params")];
        assert_eq!(runtime.apply(&moved).await.unwrap().outcome, ApplyOutcome::Unchanged);
        drop(runtime);

        let held = LocalRuntime::open(&path).unwrap().inventory().await.unwrap();
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].resource_type, "aws:rds/instance:Instance");
        assert_eq!(held[0].depends_on, moved.depends_on);
    }

    #[tokio::test]
    async fn test_sensitive_properties_stored_as_digest() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state.json");
        let runtime = LocalRuntime::open(&path).unwrap();

        let mut resource = db(3306);
        resource.properties["password"] = serde_json::json!("s3cr3t-Pa55");
        resource.sensitive = vec!["password".to_string()];
        assert_eq!(runtime.apply(&resource).await.unwrap().outcome, ApplyOutcome::Created);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("s3cr3t-Pa55"));
        let stored = runtime.get(&ResourceId::new("db")).unwrap();
        assert!(stored.properties["password"].as_str().unwrap().starts_with("sha256:"));

        assert_eq!(runtime.apply(&resource).await.unwrap().outcome, ApplyOutcome::Unchanged);
        resource.properties["password"] = serde_json::json!("rotated");
        assert_eq!(runtime.apply(&resource).await.unwrap().outcome, ApplyOutcome::Updated);
    }
}
