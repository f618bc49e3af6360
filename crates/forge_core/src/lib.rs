//! # forge_core
//!
//! Resource graph and reconciliation engine for tierforge.
//!
//! # Architecture
//!
//! - **Deferred values**: one-shot cells holding a producer attribute that is
//!   only known after the producer exists
//! - **Payloads**: templates whose `${NAME}` placeholders bind to deferred
//!   values and are substituted in a single pass
//! - **Graph**: declarations plus producer -> consumer edges, layered into
//!   creation waves
//! - **Reconciler**: applies waves concurrently against a runtime and keeps a
//!   persistent run log
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use forge_core::{LocalRuntime, Reconciler, ResourceDeclaration, ResourceGraph};
//!
//! let mut graph = ResourceGraph::new();
//! let db = graph.declare(ResourceDeclaration::new("aws:rds/instance:Instance", "db"))?;
//! graph.declare(
//!     ResourceDeclaration::new("aws:ec2/instance:Instance", "app")
//!         .property("dbHost", db.output("address")),
//! )?;
//!
//! let runtime = Arc::new(LocalRuntime::open(".forge/state.json")?);
//! let log = Reconciler::new(runtime).apply("webapp-dev", &graph).await?;
//! ```

pub mod deferred;
pub mod error;
pub mod graph;
pub mod local;
pub mod mock;
pub mod payload;
pub mod reconciler;
pub mod resource;
pub mod runtime;

pub use deferred::{DeferredState, DeferredValue};
pub use error::{CoreError, CoreResult};
pub use graph::{
    teardown_waves, DeclaredResource, DependencyEdge, EdgeKind, Export, ResourceGraph,
    ResourceHandle,
};
pub use local::{LocalRuntime, StoredResource};
pub use mock::{CapturedCall, MockRuntime};
pub use payload::{BootstrapPayload, Binding, EmbeddedPayload, PayloadEncoding};
pub use reconciler::{Reconciler, ResourceOutcome, RunDirection, RunLog, RunLogEntry, RunState};
pub use resource::{
    AppliedResource, ApplyOutcome, HeldResource, ResolvedResource, ResourceDeclaration,
    ResourceId, Value, REDACTED,
};
pub use runtime::ReconciliationRuntime;
