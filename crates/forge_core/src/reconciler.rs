//! Reconciler: walks a resource graph against a runtime.
//!
//! Resources are applied wave by wave. Everything in a wave runs
//! concurrently; a wave starts only after every resource in the previous
//! wave has been realized and its requested attributes resolved. The first
//! failure stops the run after the current wave settles. Resources already
//! realized are left standing.
//!
//! Once every wave has converged, resources the runtime still holds but the
//! graph no longer declares are torn down. Destroy works from the runtime
//! inventory rather than the graph, so nothing applied under an earlier
//! configuration is left behind.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::graph::{teardown_waves, DeclaredResource, ResourceGraph};
use crate::resource::{ApplyOutcome, AppliedResource, HeldResource, ResolvedResource, ResourceId};
use crate::runtime::ReconciliationRuntime;

/// Direction of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunDirection {
    Apply,
    Destroy,
}

/// Run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

/// What happened to one resource during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceOutcome {
    Created,
    Updated,
    Unchanged,
    Deleted,
    /// Destroy found nothing to delete.
    Absent,
    Failed,
}

impl From<ApplyOutcome> for ResourceOutcome {
    fn from(outcome: ApplyOutcome) -> Self {
        match outcome {
            ApplyOutcome::Created => Self::Created,
            ApplyOutcome::Updated => Self::Updated,
            ApplyOutcome::Unchanged => Self::Unchanged,
        }
    }
}

/// Run log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub resource: ResourceId,
    pub resource_type: String,
    pub outcome: ResourceOutcome,
    pub message: Option<String>,
    pub at: DateTime<Utc>,
}

/// Persistent record of one apply or destroy run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLog {
    pub run_id: Uuid,
    /// Stack name, `<project>-<environment>`.
    pub stack: String,
    pub direction: RunDirection,
    pub state: RunState,
    pub entries: Vec<RunLogEntry>,
    /// Exported values, present after a completed apply.
    pub outputs: BTreeMap<String, String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    failed_resource: Option<ResourceId>,
}

impl RunLog {
    pub fn new(stack: impl Into<String>, direction: RunDirection) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            stack: stack.into(),
            direction,
            state: RunState::Pending,
            entries: Vec::new(),
            outputs: BTreeMap::new(),
            started_at: None,
            completed_at: None,
            error: None,
            failed_resource: None,
        }
    }

    /// Path of the log for `stack` under `dir`.
    pub fn log_path(dir: &Path, stack: &str) -> PathBuf {
        dir.join("runs").join(format!("{}.json", stack))
    }

    /// Save the log under `dir`.
    pub fn save(&self, dir: &Path) -> CoreResult<PathBuf> {
        let path = Self::log_path(dir, &self.stack);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        debug!("Saved run log to {:?}", path);
        Ok(path)
    }

    /// Load a log from disk.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// The declaration that stopped the run, if it failed.
    pub fn failed_resource(&self) -> Option<&ResourceId> {
        if self.state == RunState::Failed {
            self.failed_resource.as_ref()
        } else {
            None
        }
    }

    /// Entries with the given outcome.
    pub fn with_outcome(&self, outcome: ResourceOutcome) -> Vec<&ResourceId> {
        self.entries
            .iter()
            .filter(|e| e.outcome == outcome)
            .map(|e| &e.resource)
            .collect()
    }

    fn record(
        &mut self,
        resource: &ResourceId,
        resource_type: &str,
        outcome: ResourceOutcome,
        message: Option<String>,
    ) {
        self.entries.push(RunLogEntry {
            resource: resource.clone(),
            resource_type: resource_type.to_string(),
            outcome,
            message,
            at: Utc::now(),
        });
    }

    fn fail(&mut self, resource: ResourceId, message: String) {
        self.state = RunState::Failed;
        self.error = Some(message);
        self.failed_resource = Some(resource);
        self.completed_at = Some(Utc::now());
    }
}

/// Drives a [`ResourceGraph`] to convergence.
pub struct Reconciler {
    runtime: Arc<dyn ReconciliationRuntime>,
    log_dir: Option<PathBuf>,
}

impl Reconciler {
    pub fn new(runtime: Arc<dyn ReconciliationRuntime>) -> Self {
        Self {
            runtime,
            log_dir: None,
        }
    }

    /// Persist run logs under `dir`.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    fn persist(&self, log: &RunLog) -> CoreResult<()> {
        if let Some(dir) = &self.log_dir {
            log.save(dir)?;
        }
        Ok(())
    }

    /// Create or update every resource, producers first.
    ///
    /// On failure the log is persisted in the `Failed` state and
    /// `ResourceCreation` names the failing declaration.
    pub async fn apply(&self, stack: &str, graph: &ResourceGraph) -> CoreResult<RunLog> {
        let mut log = RunLog::new(stack, RunDirection::Apply);
        log.state = RunState::Running;
        log.started_at = Some(Utc::now());

        let waves = graph.creation_waves();
        info!(
            "Applying stack {} ({} resources in {} waves) with {} runtime",
            stack,
            graph.len(),
            waves.len(),
            self.runtime.name()
        );

        for (i, wave) in waves.iter().enumerate() {
            debug!("Wave {}/{}: {:?}", i + 1, waves.len(), wave);
            let declared: Vec<&DeclaredResource> =
                wave.iter().filter_map(|id| graph.get(id)).collect();

            let results =
                join_all(declared.iter().map(|resource| self.apply_one(graph, resource))).await;

            let mut first_failure: Option<(ResourceId, String)> = None;
            for (resource, result) in declared.iter().zip(results) {
                let decl = &resource.declaration;
                match result {
                    Ok(applied) => {
                        log.record(&decl.id, &decl.resource_type, applied.outcome.into(), None)
                    }
                    Err(e) => {
                        error!("Failed to apply {}: {}", decl.id, e);
                        log.record(
                            &decl.id,
                            &decl.resource_type,
                            ResourceOutcome::Failed,
                            Some(e.to_string()),
                        );
                        if first_failure.is_none() {
                            first_failure = Some((decl.id.clone(), e.to_string()));
                        }
                    }
                }
            }

            if let Some((resource, message)) = first_failure {
                log.fail(resource.clone(), message.clone());
                self.persist(&log)?;
                return Err(CoreError::ResourceCreation { resource, message });
            }
            self.persist(&log)?;
        }

        let stale: Vec<HeldResource> = self
            .runtime
            .inventory()
            .await?
            .into_iter()
            .filter(|held| !graph.contains(&held.id))
            .collect();
        if !stale.is_empty() {
            info!("Removing {} resources no longer declared", stale.len());
            if let Some((resource, message)) = self.teardown(&mut log, &stale).await? {
                log.fail(resource.clone(), message.clone());
                self.persist(&log)?;
                return Err(CoreError::ResourceDeletion { resource, message });
            }
            self.persist(&log)?;
        }

        for export in graph.exports() {
            let value = match export.value.resolve()? {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            log.outputs.insert(export.name.clone(), value);
        }

        log.state = RunState::Completed;
        log.completed_at = Some(Utc::now());
        self.persist(&log)?;
        info!("Stack {} converged", stack);
        Ok(log)
    }

    async fn apply_one(
        &self,
        graph: &ResourceGraph,
        resource: &DeclaredResource,
    ) -> CoreResult<AppliedResource> {
        let decl = &resource.declaration;
        let requested = resource.handle.requested_outputs();
        let resolved = ResolvedResource {
            id: decl.id.clone(),
            resource_type: decl.resource_type.clone(),
            properties: decl.resolve_properties()?,
            outputs: requested.iter().map(|(name, _)| name.clone()).collect(),
            depends_on: graph.producers_of(&decl.id),
            sensitive: decl.sensitive_properties(),
        };

        let applied = self.runtime.apply(&resolved).await?;

        for (attribute, deferred) in requested {
            let value = applied
                .attributes
                .get(&attribute)
                .ok_or_else(|| CoreError::MissingAttribute {
                    resource: decl.id.clone(),
                    attribute: attribute.clone(),
                })?;
            match deferred.get() {
                Some(existing) if existing == value => {}
                Some(existing) => {
                    warn!(
                        "{} changed from {} to {}",
                        deferred.reference(),
                        existing,
                        value
                    );
                    return Err(CoreError::AlreadyResolved {
                        reference: deferred.reference(),
                    });
                }
                None => deferred.resolve(value.clone())?,
            }
        }

        debug!("{:?} {}", applied.outcome, decl.id);
        Ok(applied)
    }

    /// Delete every resource the runtime holds, consumers first. Declared
    /// resources the runtime does not hold are recorded as `Absent`.
    pub async fn destroy(&self, stack: &str, graph: &ResourceGraph) -> CoreResult<RunLog> {
        let mut log = RunLog::new(stack, RunDirection::Destroy);
        log.state = RunState::Running;
        log.started_at = Some(Utc::now());

        let held = self.runtime.inventory().await?;
        info!(
            "Destroying stack {} ({} resources held, {} declared)",
            stack,
            held.len(),
            graph.len()
        );

        if let Some((resource, message)) = self.teardown(&mut log, &held).await? {
            log.fail(resource.clone(), message.clone());
            self.persist(&log)?;
            return Err(CoreError::ResourceDeletion { resource, message });
        }

        let held_ids: HashSet<&ResourceId> = held.iter().map(|h| &h.id).collect();
        for wave in graph.destruction_waves() {
            for id in wave.iter().filter(|id| !held_ids.contains(id)) {
                if let Some(resource) = graph.get(id) {
                    log.record(
                        id,
                        &resource.declaration.resource_type,
                        ResourceOutcome::Absent,
                        None,
                    );
                }
            }
        }

        log.state = RunState::Completed;
        log.completed_at = Some(Utc::now());
        self.persist(&log)?;
        info!("Stack {} destroyed", stack);
        Ok(log)
    }

    /// Delete `held` in teardown waves, recording each outcome. Returns the
    /// first failure; later waves are not started.
    async fn teardown(
        &self,
        log: &mut RunLog,
        held: &[HeldResource],
    ) -> CoreResult<Option<(ResourceId, String)>> {
        let types: HashMap<&ResourceId, &str> = held
            .iter()
            .map(|h| (&h.id, h.resource_type.as_str()))
            .collect();

        for wave in teardown_waves(held)? {
            debug!("Teardown wave: {:?}", wave);
            let results = join_all(
                wave.iter()
                    .map(|id| self.runtime.destroy(id, types.get(id).copied().unwrap_or_default())),
            )
            .await;

            let mut first_failure: Option<(ResourceId, String)> = None;
            for (id, result) in wave.iter().zip(results) {
                let resource_type = types.get(id).copied().unwrap_or_default();
                match result {
                    Ok(()) => log.record(id, resource_type, ResourceOutcome::Deleted, None),
                    Err(e) => {
                        error!("Failed to delete {}: {}", id, e);
                        log.record(id, resource_type, ResourceOutcome::Failed, Some(e.to_string()));
                        if first_failure.is_none() {
                            first_failure = Some((id.clone(), e.to_string()));
                        }
                    }
                }
            }
            if first_failure.is_some() {
                return Ok(first_failure);
            }
        }
        Ok(None)
    }
}
