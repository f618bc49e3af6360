//! Resource dependency graph using `petgraph`.
//!
//! Edges point from producer to consumer. Declaration is single pass: a
//! resource may only reference resources declared before it, so the graph
//! is acyclic by construction.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::deferred::DeferredValue;
use crate::error::{CoreError, CoreResult};
use crate::resource::{HeldResource, ResourceDeclaration, ResourceId, Value};

/// Why a consumer waits on a producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// The consumer references a producer attribute.
    Implicit,
    /// Declared ordering with no direct attribute reference.
    Explicit,
}

/// `consumer` must not be created before `producer` exists, and `producer`
/// must not be destroyed before `consumer` is gone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub producer: ResourceId,
    pub consumer: ResourceId,
    pub kind: EdgeKind,
}

impl fmt::Display for DependencyEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arrow = match self.kind {
            EdgeKind::Implicit => "->",
            EdgeKind::Explicit => "=>",
        };
        write!(f, "{} {} {}", self.producer, arrow, self.consumer)
    }
}

/// Handle on a declared resource, used to reference its attributes.
///
/// Asking twice for the same attribute returns handles sharing one cell.
#[derive(Debug, Clone)]
pub struct ResourceHandle {
    id: ResourceId,
    resource_type: String,
    outputs: Arc<Mutex<BTreeMap<String, DeferredValue>>>,
}

impl ResourceHandle {
    fn new(id: ResourceId, resource_type: String) -> Self {
        Self {
            id,
            resource_type,
            outputs: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Deferred handle on `attribute` of this resource.
    pub fn output(&self, attribute: &str) -> DeferredValue {
        self.outputs
            .lock()
            .entry(attribute.to_string())
            .or_insert_with(|| DeferredValue::new(self.id.clone(), attribute))
            .clone()
    }

    /// Attributes some consumer has asked for.
    pub fn requested_outputs(&self) -> Vec<(String, DeferredValue)> {
        self.outputs
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// A declaration together with its handle.
#[derive(Debug, Clone)]
pub struct DeclaredResource {
    pub declaration: ResourceDeclaration,
    pub handle: ResourceHandle,
}

/// Named value exported after a successful run.
#[derive(Debug, Clone)]
pub struct Export {
    pub name: String,
    pub value: Value,
}

/// Directed acyclic graph of resource declarations.
#[derive(Debug, Default)]
pub struct ResourceGraph {
    graph: DiGraph<ResourceId, EdgeKind>,
    index: HashMap<ResourceId, NodeIndex>,
    resources: Vec<DeclaredResource>,
    exports: Vec<Export>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a resource, inferring implicit edges from its properties.
    ///
    /// Every referenced producer must already be declared and every
    /// embedded payload must have all placeholders bound.
    pub fn declare(&mut self, declaration: ResourceDeclaration) -> CoreResult<ResourceHandle> {
        if self.index.contains_key(&declaration.id) {
            return Err(CoreError::DuplicateResource(declaration.id));
        }

        let mut payloads = Vec::new();
        for value in declaration.properties.values() {
            value.collect_payloads(&mut payloads);
        }
        for payload in payloads {
            payload.validate()?;
        }

        let implicit = declaration.implicit_dependencies();
        for producer in implicit.iter().chain(declaration.depends_on.iter()) {
            if !self.index.contains_key(producer) {
                return Err(CoreError::UnknownResource {
                    consumer: declaration.id.clone(),
                    producer: producer.clone(),
                });
            }
        }

        let node = self.graph.add_node(declaration.id.clone());
        for producer in &declaration.depends_on {
            self.graph
                .add_edge(self.index[producer], node, EdgeKind::Explicit);
        }
        for producer in implicit
            .iter()
            .filter(|p| !declaration.depends_on.contains(*p))
        {
            self.graph
                .add_edge(self.index[producer], node, EdgeKind::Implicit);
        }

        debug!(
            "Declared {} ({}) with {} dependencies",
            declaration.id,
            declaration.resource_type,
            self.graph.neighbors_directed(node, Direction::Incoming).count()
        );

        let handle = ResourceHandle::new(declaration.id.clone(), declaration.resource_type.clone());
        self.index.insert(declaration.id.clone(), node);
        self.resources.push(DeclaredResource {
            declaration,
            handle: handle.clone(),
        });
        Ok(handle)
    }

    /// Export a value under `name` once the run completes.
    pub fn export(&mut self, name: impl Into<String>, value: impl Into<Value>) -> CoreResult<()> {
        let name = name.into();
        let value = value.into();
        let mut deferred = Vec::new();
        value.collect_deferred(&mut deferred);
        if let Some(d) = deferred.iter().find(|d| !self.index.contains_key(d.producer())) {
            return Err(CoreError::UnknownResource {
                consumer: ResourceId::new(format!("export:{}", name)),
                producer: d.producer().clone(),
            });
        }
        self.exports.push(Export { name, value });
        Ok(())
    }

    pub fn exports(&self) -> &[Export] {
        &self.exports
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &ResourceId) -> Option<&DeclaredResource> {
        self.index.get(id).map(|n| &self.resources[n.index()])
    }

    /// Resources in declaration order.
    pub fn resources(&self) -> impl Iterator<Item = &DeclaredResource> {
        self.resources.iter()
    }

    /// Every edge, sorted by consumer declaration order then producer.
    pub fn edges(&self) -> Vec<DependencyEdge> {
        let mut edges: Vec<(usize, usize, DependencyEdge)> = self
            .graph
            .edge_indices()
            .filter_map(|e| {
                let (from, to) = self.graph.edge_endpoints(e)?;
                let kind = *self.graph.edge_weight(e)?;
                Some((
                    to.index(),
                    from.index(),
                    DependencyEdge {
                        producer: self.graph[from].clone(),
                        consumer: self.graph[to].clone(),
                        kind,
                    },
                ))
            })
            .collect();
        edges.sort_by_key(|(to, from, _)| (*to, *from));
        edges.into_iter().map(|(_, _, edge)| edge).collect()
    }

    /// Kind of the edge `producer -> consumer`, if there is one.
    pub fn edge_kind(&self, producer: &ResourceId, consumer: &ResourceId) -> Option<EdgeKind> {
        let from = *self.index.get(producer)?;
        let to = *self.index.get(consumer)?;
        self.graph
            .find_edge(from, to)
            .and_then(|e| self.graph.edge_weight(e).copied())
    }

    pub fn has_edge(&self, producer: &ResourceId, consumer: &ResourceId) -> bool {
        self.edge_kind(producer, consumer).is_some()
    }

    /// Direct producers of `id`.
    pub fn producers_of(&self, id: &ResourceId) -> Vec<ResourceId> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Direct consumers of `id`.
    pub fn consumers_of(&self, id: &ResourceId) -> Vec<ResourceId> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: &ResourceId, direction: Direction) -> Vec<ResourceId> {
        let Some(&node) = self.index.get(id) else {
            return Vec::new();
        };
        let mut nodes: Vec<NodeIndex> = self.graph.neighbors_directed(node, direction).collect();
        nodes.sort();
        nodes.dedup();
        nodes.into_iter().map(|n| self.graph[n].clone()).collect()
    }

    /// A topological creation order (producers first).
    pub fn creation_order(&self) -> CoreResult<Vec<ResourceId>> {
        petgraph::algo::toposort(&self.graph, None)
            .map(|nodes| nodes.into_iter().map(|n| self.graph[n].clone()).collect())
            .map_err(|cycle| CoreError::CyclicDependency(self.graph[cycle.node_id()].clone()))
    }

    /// Creation layers: every resource in wave `k` depends only on resources
    /// in waves `< k`. Resources within a wave keep declaration order.
    pub fn creation_waves(&self) -> Vec<Vec<ResourceId>> {
        // Producers always have a lower index than their consumers.
        let mut depth = vec![0usize; self.resources.len()];
        for node in self.graph.node_indices() {
            depth[node.index()] = self
                .graph
                .neighbors_directed(node, Direction::Incoming)
                .map(|p| depth[p.index()] + 1)
                .max()
                .unwrap_or(0);
        }

        let wave_count = depth.iter().max().map(|d| d + 1).unwrap_or(0);
        let mut waves = vec![Vec::new(); wave_count];
        for (i, d) in depth.iter().enumerate() {
            waves[*d].push(self.resources[i].declaration.id.clone());
        }
        waves
    }

    /// Destruction layers: consumers before producers.
    pub fn destruction_waves(&self) -> Vec<Vec<ResourceId>> {
        let mut waves = self.creation_waves();
        waves.reverse();
        for wave in &mut waves {
            wave.reverse();
        }
        waves
    }
}

/// Destruction layers over what a runtime actually holds.
///
/// Wave `k` holds resources whose longest chain of held consumers has
/// length `k`, so every consumer is gone before its producer. Producers
/// that are not held are ignored. Input order is kept within a wave.
pub fn teardown_waves(held: &[HeldResource]) -> CoreResult<Vec<Vec<ResourceId>>> {
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let mut index = HashMap::new();
    for (i, resource) in held.iter().enumerate() {
        index.insert(&resource.id, graph.add_node(i));
    }
    for resource in held {
        let consumer = index[&resource.id];
        for producer in &resource.depends_on {
            if let Some(&from) = index.get(producer) {
                graph.update_edge(from, consumer, ());
            }
        }
    }

    let order = petgraph::algo::toposort(&graph, None)
        .map_err(|cycle| CoreError::CyclicDependency(held[graph[cycle.node_id()]].id.clone()))?;

    let mut height = vec![0usize; held.len()];
    for node in order.into_iter().rev() {
        height[graph[node]] = graph
            .neighbors_directed(node, Direction::Outgoing)
            .map(|c| height[graph[c]] + 1)
            .max()
            .unwrap_or(0);
    }

    let wave_count = height.iter().max().map(|h| h + 1).unwrap_or(0);
    let mut waves = vec![Vec::new(); wave_count];
    for (i, h) in height.iter().enumerate() {
        waves[*h].push(held[i].id.clone());
    }
    debug!("Teardown of {} held resources in {} waves", held.len(), waves.len());
    Ok(waves)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(id: &str) -> ResourceDeclaration {
        ResourceDeclaration::new("test:index:Thing", id)
    }

    #[test]
    fn test_empty_graph() {
        let graph = ResourceGraph::new();
        assert!(graph.is_empty());
        assert!(graph.creation_waves().is_empty());
        assert!(graph.creation_order().unwrap().is_empty());
    }

    #[test]
    fn test_implicit_edge_from_reference() {
        let mut graph = ResourceGraph::new();
        let vpc = graph.declare(decl("vpc")).unwrap();
        graph
            .declare(decl("subnet").property("vpcId", vpc.output("id")))
            .unwrap();

        assert_eq!(
            graph.edge_kind(&"vpc".into(), &"subnet".into()),
            Some(EdgeKind::Implicit)
        );
        assert!(!graph.has_edge(&"subnet".into(), &"vpc".into()));
    }

    #[test]
    fn test_explicit_edge_wins_over_implicit() {
        let mut graph = ResourceGraph::new();
        let db = graph.declare(decl("db")).unwrap();
        graph
            .declare(
                decl("app")
                    .property("host", db.output("address"))
                    .depends_on(db.id()),
            )
            .unwrap();

        let edges = graph.edges();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].kind, EdgeKind::Explicit);
    }

    #[test]
    fn test_duplicate_declaration_rejected() {
        let mut graph = ResourceGraph::new();
        graph.declare(decl("vpc")).unwrap();
        let err = graph.declare(decl("vpc")).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateResource(_)));
    }

    #[test]
    fn test_undeclared_producer_rejected() {
        let mut graph = ResourceGraph::new();
        let err = graph
            .declare(decl("subnet").depends_on(&"vpc".into()))
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownResource { .. }));
    }

    #[test]
    fn test_same_attribute_shares_cell() {
        let mut graph = ResourceGraph::new();
        let vpc = graph.declare(decl("vpc")).unwrap();
        let a = vpc.output("id");
        let b = graph.get(&"vpc".into()).unwrap().handle.output("id");
        a.resolve("vpc-1").unwrap();
        assert_eq!(b.get(), Some("vpc-1"));
        assert_eq!(vpc.requested_outputs().len(), 1);
    }

    #[test]
    fn test_waves_diamond() {
        let mut graph = ResourceGraph::new();
        let d = graph.declare(decl("d")).unwrap();
        let b = graph.declare(decl("b").depends_on(d.id())).unwrap();
        let c = graph.declare(decl("c").property("x", d.output("id"))).unwrap();
        graph
            .declare(decl("a").depends_on(b.id()).depends_on(c.id()))
            .unwrap();
        graph.declare(decl("lonely")).unwrap();

        let waves = graph.creation_waves();
        let names: Vec<Vec<&str>> = waves
            .iter()
            .map(|w| w.iter().map(|id| id.as_str()).collect())
            .collect();
        assert_eq!(names, vec![vec!["d", "lonely"], vec!["b", "c"], vec!["a"]]);

        let destroy_waves = graph.destruction_waves();
        let destroy: Vec<Vec<&str>> = destroy_waves
            .iter()
            .map(|w| w.iter().map(|id| id.as_str()).collect())
            .collect();
        assert_eq!(destroy, vec![vec!["a"], vec!["c", "b"], vec!["lonely", "d"]]);
    }

    #[test]
    fn test_creation_order_respects_edges() {
        let mut graph = ResourceGraph::new();
        let db = graph.declare(decl("db")).unwrap();
        graph.declare(decl("app").depends_on(db.id())).unwrap();

        let order = graph.creation_order().unwrap();
        let pos = |name: &str| order.iter().position(|n| n.as_str() == name).unwrap();
        assert!(pos("db") < pos("app"));
    }

    #[test]
    fn test_export_requires_declared_producer() {
        let mut graph = ResourceGraph::new();
        let db = graph.declare(decl("db")).unwrap();
        graph.export("Database Endpoint", db.output("endpoint")).unwrap();
        assert_eq!(graph.exports().len(), 1);

        let stray = DeferredValue::new(ResourceId::new("ghost"), "id");
        assert!(graph.export("Ghost", stray).is_err());
    }

    fn held(id: &str, depends_on: &[&str]) -> HeldResource {
        HeldResource {
            id: id.into(),
            resource_type: "test:index:Thing".to_string(),
            depends_on: depends_on.iter().map(|d| ResourceId::from(*d)).collect(),
        }
    }

    #[test]
    fn test_teardown_waves_consumers_first() {
        let held = vec![
            held("vpc", &[]),
            held("subnet", &["vpc"]),
            held("queue", &[]),
            held("app", &["subnet", "queue"]),
            held("alarm", &["queue"]),
        ];

        let waves: Vec<Vec<String>> = teardown_waves(&held)
            .unwrap()
            .iter()
            .map(|w| w.iter().map(|id| id.as_str().to_string()).collect())
            .collect();
        assert_eq!(
            waves,
            vec![
                vec!["app".to_string(), "alarm".to_string()],
                vec!["subnet".to_string(), "queue".to_string()],
                vec!["vpc".to_string()],
            ]
        );
    }

    #[test]
    fn test_teardown_waves_ignore_missing_producers() {
        let held = vec![held("subnet", &["vpc"]), held("route", &["subnet", "gateway"])];
        let waves = teardown_waves(&held).unwrap();
        assert_eq!(waves, vec![vec![ResourceId::from("route")], vec![ResourceId::from("subnet")]]);
        assert!(teardown_waves(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_teardown_waves_reject_cycle() {
        let held = vec![held("a", &["b"]), held("b", &["a"])];
        let err = teardown_waves(&held).unwrap_err();
        assert!(matches!(err, CoreError::CyclicDependency(_)));
    }
}
