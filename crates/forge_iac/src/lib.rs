//! # forge_iac
//!
//! Turns a stack file into a declared resource graph.
//!
//! This crate provides:
//! - Stack files and typed settings read from flat `namespace:key` config
//! - Logical resource names with per-project overrides
//! - Feature toggles for the optional tiers
//! - Cloud lookups (zones, certificates, hosted zones)
//! - The topology composer and the application bootstrap payload

pub mod bootstrap;
pub mod composer;
pub mod config;
pub mod error;
pub mod lookup;
pub mod names;
pub mod outputs;
pub mod provider;

pub use bootstrap::{application_payload, BootstrapInputs};
pub use composer::{ComposedStack, TopologyComposer};
pub use config::{
    ApplicationSettings, ConfigValue, DatabaseSettings, EventingSettings, LoadBalancerSettings,
    ScalingSettings, StackConfig, StackFile, TopologySettings,
};
pub use error::{IacError, IacResult};
pub use lookup::{CloudLookup, LookupData, StaticLookup};
pub use names::{LogicalName, ResourceNames};
pub use outputs::{
    ResourceReport, StackReport, APPLICATION_DOMAIN, DATABASE_ENDPOINT, LOAD_BALANCER_DNS,
};
pub use provider::{CloudProvider, TopologyFeatures};
