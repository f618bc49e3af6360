//! Exported stack outputs and plan reports.

use forge_core::{DependencyEdge, ResourceGraph};
use forge_net::SubnetPlan;
use serde::Serialize;

/// Database instance endpoint (`host:port`).
pub const DATABASE_ENDPOINT: &str = "Database Endpoint";
/// Load balancer DNS name.
pub const LOAD_BALANCER_DNS: &str = "Load Balancer DNS";
/// Fully qualified application domain.
pub const APPLICATION_DOMAIN: &str = "Application Domain";

#[derive(Debug, Clone, Serialize)]
pub struct ResourceReport {
    pub id: String,
    pub resource_type: String,
    pub properties: serde_json::Value,
    pub depends_on: Vec<String>,
}

/// Everything `plan` shows about a composed stack, without applying it.
#[derive(Debug, Clone, Serialize)]
pub struct StackReport {
    pub stack: String,
    pub subnets: SubnetPlan,
    pub waves: Vec<Vec<String>>,
    pub edges: Vec<DependencyEdge>,
    pub resources: Vec<ResourceReport>,
    pub outputs: Vec<String>,
}

impl StackReport {
    pub fn new(stack: impl Into<String>, plan: &SubnetPlan, graph: &ResourceGraph) -> Self {
        let resources = graph
            .resources()
            .map(|r| ResourceReport {
                id: r.declaration.id.to_string(),
                resource_type: r.declaration.resource_type.clone(),
                properties: r.declaration.describe_properties(),
                depends_on: graph
                    .producers_of(&r.declaration.id)
                    .iter()
                    .map(|p| p.to_string())
                    .collect(),
            })
            .collect();

        Self {
            stack: stack.into(),
            subnets: plan.clone(),
            waves: graph
                .creation_waves()
                .into_iter()
                .map(|wave| wave.into_iter().map(|id| id.to_string()).collect())
                .collect(),
            edges: graph.edges(),
            resources,
            outputs: graph.exports().iter().map(|e| e.name.clone()).collect(),
        }
    }
}
