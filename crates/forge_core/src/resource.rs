//! Resource declarations and property values.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::deferred::DeferredValue;
use crate::error::CoreResult;
use crate::payload::{BootstrapPayload, EmbeddedPayload, PayloadEncoding};

/// Logical key of a resource. Unique within a graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ResourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A property value in a resource declaration.
#[derive(Debug, Clone)]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Attribute of another resource, known after that resource exists.
    Deferred(DeferredValue),
    /// Text payload whose placeholders may be bound to deferred values.
    Payload(EmbeddedPayload),
    /// Sensitive text. Resolves to the plain value, never shown in plans.
    Secret(String),
}

/// Placeholder shown instead of a secret value.
pub const REDACTED: &str = "<secret>";

impl Value {
    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn payload(payload: BootstrapPayload, encoding: PayloadEncoding) -> Self {
        Value::Payload(EmbeddedPayload { payload, encoding })
    }

    pub fn secret(value: impl Into<String>) -> Self {
        Value::Secret(value.into())
    }

    /// Whether a secret is reachable from this value.
    pub fn contains_secret(&self) -> bool {
        match self {
            Value::Secret(_) => true,
            Value::Payload(embedded) => embedded.payload.has_secret_bindings(),
            Value::List(items) => items.iter().any(Value::contains_secret),
            Value::Map(entries) => entries.values().any(Value::contains_secret),
            _ => false,
        }
    }

    /// Collect every deferred value reachable from this value.
    pub fn collect_deferred<'a>(&'a self, out: &mut Vec<&'a DeferredValue>) {
        match self {
            Value::Deferred(d) => out.push(d),
            Value::List(items) => items.iter().for_each(|v| v.collect_deferred(out)),
            Value::Map(entries) => entries.values().for_each(|v| v.collect_deferred(out)),
            Value::Payload(embedded) => out.extend(embedded.payload.deferred_bindings()),
            Value::String(_)
            | Value::Secret(_)
            | Value::Int(_)
            | Value::Float(_)
            | Value::Bool(_) => {}
        }
    }

    /// Collect every embedded payload reachable from this value.
    pub fn collect_payloads<'a>(&'a self, out: &mut Vec<&'a BootstrapPayload>) {
        match self {
            Value::Payload(embedded) => out.push(&embedded.payload),
            Value::List(items) => items.iter().for_each(|v| v.collect_payloads(out)),
            Value::Map(entries) => entries.values().for_each(|v| v.collect_payloads(out)),
            _ => {}
        }
    }

    /// Produce the concrete JSON value. Every deferred value must be resolved.
    pub fn resolve(&self) -> CoreResult<serde_json::Value> {
        Ok(match self {
            Value::String(s) | Value::Secret(s) => serde_json::Value::String(s.clone()),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::List(items) => serde_json::Value::Array(
                items.iter().map(Value::resolve).collect::<CoreResult<_>>()?,
            ),
            Value::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), v.resolve()?)))
                    .collect::<CoreResult<_>>()?,
            ),
            Value::Deferred(d) => serde_json::Value::String(d.require()?.to_string()),
            Value::Payload(embedded) => serde_json::Value::String(embedded.render()?),
        })
    }

    /// Render for plan output without resolving anything.
    pub fn describe(&self) -> serde_json::Value {
        match self {
            Value::Secret(_) => serde_json::Value::String(REDACTED.to_string()),
            Value::Deferred(d) => match d.get() {
                Some(v) => serde_json::Value::String(v.to_string()),
                None => serde_json::Value::String(format!("<{}>", d.reference())),
            },
            Value::Payload(embedded) => serde_json::Value::String(format!(
                "<payload {} ({} placeholders)>",
                embedded.payload.name(),
                embedded.payload.placeholders().count()
            )),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::describe).collect())
            }
            Value::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.describe()))
                    .collect(),
            ),
            other => other.resolve().unwrap_or(serde_json::Value::Null),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::String(s.clone())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u16> for Value {
    fn from(i: u16) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<DeferredValue> for Value {
    fn from(d: DeferredValue) -> Self {
        Value::Deferred(d)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

/// Desired state of one resource.
#[derive(Debug, Clone)]
pub struct ResourceDeclaration {
    pub id: ResourceId,
    /// Provider type token, e.g. `aws:ec2/vpc:Vpc`.
    pub resource_type: String,
    pub properties: BTreeMap<String, Value>,
    /// Explicit ordering edges not expressed by property references.
    pub depends_on: Vec<ResourceId>,
}

impl ResourceDeclaration {
    pub fn new(resource_type: impl Into<String>, id: impl Into<ResourceId>) -> Self {
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            properties: BTreeMap::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Set the `Name` tag.
    pub fn name_tag(self, name: impl Into<String>) -> Self {
        let name: String = name.into();
        self.property("tags", Value::map([("Name", name)]))
    }

    pub fn depends_on(mut self, producer: &ResourceId) -> Self {
        if !self.depends_on.contains(producer) {
            self.depends_on.push(producer.clone());
        }
        self
    }

    /// Producers referenced through property values, deduplicated, in
    /// first-reference order.
    pub fn implicit_dependencies(&self) -> Vec<ResourceId> {
        let mut deferred = Vec::new();
        for value in self.properties.values() {
            value.collect_deferred(&mut deferred);
        }
        let mut producers: Vec<ResourceId> = Vec::new();
        for d in deferred {
            if !producers.contains(d.producer()) {
                producers.push(d.producer().clone());
            }
        }
        producers
    }

    /// Resolve every property into concrete JSON.
    pub fn resolve_properties(&self) -> CoreResult<serde_json::Value> {
        let mut object = serde_json::Map::new();
        for (key, value) in &self.properties {
            object.insert(key.clone(), value.resolve()?);
        }
        Ok(serde_json::Value::Object(object))
    }

    /// Top-level keys whose values carry a secret.
    pub fn sensitive_properties(&self) -> Vec<String> {
        self.properties
            .iter()
            .filter(|(_, v)| v.contains_secret())
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Properties for display. Secrets render as [`REDACTED`].
    pub fn describe_properties(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.properties
                .iter()
                .map(|(k, v)| (k.clone(), v.describe()))
                .collect(),
        )
    }
}

/// A declaration with every property resolved, as handed to the runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedResource {
    pub id: ResourceId,
    pub resource_type: String,
    pub properties: serde_json::Value,
    /// Attributes consumers are waiting on.
    pub outputs: Vec<String>,
    /// Direct producers, explicit and implicit.
    #[serde(default)]
    pub depends_on: Vec<ResourceId>,
    /// Top-level property keys holding secrets.
    #[serde(default)]
    pub sensitive: Vec<String>,
}

/// A resource a runtime currently holds, with the producers it was last
/// applied against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeldResource {
    pub id: ResourceId,
    pub resource_type: String,
    pub depends_on: Vec<ResourceId>,
}

/// What the runtime did to converge a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Runtime response to an apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedResource {
    pub id: ResourceId,
    pub outcome: ApplyOutcome,
    pub attributes: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_implicit_dependencies_deduplicated() {
        let vpc_id = DeferredValue::new(ResourceId::new("vpc"), "id");
        let sg_id = DeferredValue::new(ResourceId::new("sg"), "id");

        let decl = ResourceDeclaration::new("aws:ec2/subnet:Subnet", "subnet-1")
            .property("vpcId", vpc_id.clone())
            .property("groups", Value::list([sg_id, vpc_id]));

        let deps = decl.implicit_dependencies();
        assert_eq!(deps, vec![ResourceId::new("vpc"), ResourceId::new("sg")]);
    }

    #[test]
    fn test_resolve_requires_deferred() {
        let vpc_id = DeferredValue::new(ResourceId::new("vpc"), "id");
        let decl = ResourceDeclaration::new("aws:ec2/subnet:Subnet", "subnet-1")
            .property("vpcId", vpc_id.clone())
            .property("cidrBlock", "10.0.0.0/24")
            .name_tag("subnet-1");

        assert!(decl.resolve_properties().is_err());

        vpc_id.resolve("vpc-123").unwrap();
        let json = decl.resolve_properties().unwrap();
        assert_eq!(json["vpcId"], "vpc-123");
        assert_eq!(json["cidrBlock"], "10.0.0.0/24");
        assert_eq!(json["tags"]["Name"], "subnet-1");
    }

    #[test]
    fn test_describe_pending_reference() {
        let vpc_id = DeferredValue::new(ResourceId::new("vpc"), "id");
        let value = Value::from(vpc_id);
        assert_eq!(value.describe(), serde_json::json!("<vpc.id>"));
    }

    #[test]
    fn test_secret_resolves_but_never_describes() {
        let decl = ResourceDeclaration::new("aws:rds/instance:Instance", "db")
            .property("username", "admin")
            .property("password", Value::secret("hunter2"));

        assert_eq!(decl.sensitive_properties(), vec!["password".to_string()]);
        assert_eq!(decl.resolve_properties().unwrap()["password"], "hunter2");

        let described = decl.describe_properties();
        assert_eq!(described["password"], REDACTED);
        assert!(!described.to_string().contains("hunter2"));
    }
}
