//! Bootstrap payloads with placeholders bound to deferred values.
//!
//! A payload is a text template containing `${NAME}` tokens. Each token is
//! bound to either a static string or a [`DeferredValue`]. Finalizing the
//! payload substitutes every token in a single pass over the template, so
//! the order in which placeholders were bound never changes the output and
//! substituted text is never re-scanned.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::deferred::DeferredValue;
use crate::error::{CoreError, CoreResult};
use crate::resource::ResourceId;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("placeholder pattern is valid")
    })
}

/// Source of a placeholder's value.
#[derive(Debug, Clone)]
pub enum Binding {
    Static(String),
    Deferred(DeferredValue),
    /// Static value that makes the rendered payload sensitive.
    Secret(String),
}

impl Binding {
    fn value(&self) -> Option<&str> {
        match self {
            Binding::Static(s) | Binding::Secret(s) => Some(s.as_str()),
            Binding::Deferred(d) => d.get(),
        }
    }
}

impl From<DeferredValue> for Binding {
    fn from(d: DeferredValue) -> Self {
        Binding::Deferred(d)
    }
}

impl From<String> for Binding {
    fn from(s: String) -> Self {
        Binding::Static(s)
    }
}

impl From<&str> for Binding {
    fn from(s: &str) -> Self {
        Binding::Static(s.to_string())
    }
}

/// A templated script or document with named placeholders.
#[derive(Debug, Clone)]
pub struct BootstrapPayload {
    name: String,
    template: String,
    placeholders: BTreeSet<String>,
    bindings: BTreeMap<String, Binding>,
}

impl BootstrapPayload {
    /// Create a payload from a template. Placeholders are discovered from
    /// the template text.
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        let template = template.into();
        let placeholders = placeholder_pattern()
            .captures_iter(&template)
            .map(|caps| caps[1].to_string())
            .collect();
        Self {
            name: name.into(),
            template,
            placeholders,
            bindings: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Placeholder names found in the template, sorted.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.placeholders.iter().map(|s| s.as_str())
    }

    /// Bind `placeholder` to `source`, returning the extended payload.
    pub fn bind(mut self, placeholder: &str, source: impl Into<Binding>) -> CoreResult<Self> {
        if !self.placeholders.contains(placeholder) {
            return Err(CoreError::UnknownPlaceholder {
                payload: self.name.clone(),
                placeholder: placeholder.to_string(),
            });
        }
        if self.bindings.contains_key(placeholder) {
            return Err(CoreError::PlaceholderAlreadyBound {
                payload: self.name.clone(),
                placeholder: placeholder.to_string(),
            });
        }
        self.bindings.insert(placeholder.to_string(), source.into());
        Ok(self)
    }

    /// Placeholders that have no binding yet.
    pub fn unbound(&self) -> Vec<&str> {
        self.placeholders
            .iter()
            .filter(|p| !self.bindings.contains_key(p.as_str()))
            .map(|p| p.as_str())
            .collect()
    }

    /// Fail if any placeholder is left without a binding.
    pub fn validate(&self) -> CoreResult<()> {
        let unbound = self.unbound();
        if unbound.is_empty() {
            Ok(())
        } else {
            Err(CoreError::UnboundPlaceholders {
                payload: self.name.clone(),
                placeholders: unbound.into_iter().map(String::from).collect(),
            })
        }
    }

    pub fn deferred_bindings(&self) -> impl Iterator<Item = &DeferredValue> {
        self.bindings.values().filter_map(|b| match b {
            Binding::Deferred(d) => Some(d),
            Binding::Static(_) | Binding::Secret(_) => None,
        })
    }

    /// Whether any placeholder is bound to a secret.
    pub fn has_secret_bindings(&self) -> bool {
        self.bindings.values().any(|b| matches!(b, Binding::Secret(_)))
    }

    /// Producers whose attributes this payload waits on.
    pub fn dependencies(&self) -> Vec<ResourceId> {
        let mut producers: Vec<ResourceId> = Vec::new();
        for d in self.deferred_bindings() {
            if !producers.contains(d.producer()) {
                producers.push(d.producer().clone());
            }
        }
        producers
    }

    /// Whether every placeholder is bound and every binding resolved.
    pub fn is_ready(&self) -> bool {
        self.unbound().is_empty() && self.bindings.values().all(|b| b.value().is_some())
    }

    /// Substitute every placeholder and return the final text.
    pub fn finalize(&self) -> CoreResult<String> {
        self.validate()?;
        if let Some(pending) = self.deferred_bindings().find(|d| !d.is_resolved()) {
            return Err(CoreError::UnresolvedDeferred {
                reference: pending.reference(),
            });
        }

        let rendered = placeholder_pattern()
            .replace_all(&self.template, |caps: &Captures| {
                self.bindings
                    .get(&caps[1])
                    .and_then(Binding::value)
                    .map(String::from)
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned();

        debug!(
            "Finalized payload '{}' ({} placeholders)",
            self.name,
            self.placeholders.len()
        );
        Ok(rendered)
    }
}

/// How an embedded payload is delivered to the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadEncoding {
    Plain,
    Base64,
}

/// A payload placed inside a resource property.
#[derive(Debug, Clone)]
pub struct EmbeddedPayload {
    pub payload: BootstrapPayload,
    pub encoding: PayloadEncoding,
}

impl EmbeddedPayload {
    pub fn render(&self) -> CoreResult<String> {
        let text = self.payload.finalize()?;
        Ok(match self.encoding {
            PayloadEncoding::Plain => text,
            PayloadEncoding::Base64 => STANDARD.encode(text.as_bytes()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "DB_HOST=${DB_HOST}\nDB_PORT=${DB_PORT}\nDB_USER=${DB_USER}\n";

    fn deferred(producer: &str, attr: &str) -> DeferredValue {
        DeferredValue::new(ResourceId::new(producer), attr)
    }

    #[test]
    fn test_placeholders_discovered() {
        let payload = BootstrapPayload::new("env", "A=${ALPHA} B=${BETA_2} C=$GAMMA D=${lower}");
        let names: Vec<&str> = payload.placeholders().collect();
        assert_eq!(names, vec!["ALPHA", "BETA_2"]);
    }

    #[test]
    fn test_exhaustive_substitution() {
        let host = deferred("db", "address");
        let port = deferred("db", "port");
        let user = deferred("config", "user");

        let payload = BootstrapPayload::new("env", TEMPLATE)
            .bind("DB_HOST", host.clone())
            .unwrap()
            .bind("DB_PORT", port.clone())
            .unwrap()
            .bind("DB_USER", user.clone())
            .unwrap();

        assert!(!payload.is_ready());
        assert!(matches!(
            payload.finalize(),
            Err(CoreError::UnresolvedDeferred { .. })
        ));

        host.resolve("10.0.1.5").unwrap();
        port.resolve("3306").unwrap();
        user.resolve("admin").unwrap();

        let text = payload.finalize().unwrap();
        assert_eq!(text, "DB_HOST=10.0.1.5\nDB_PORT=3306\nDB_USER=admin\n");
        assert!(!text.contains("${"));
        assert_eq!(text.matches("10.0.1.5").count(), 1);
        assert_eq!(text.matches("3306").count(), 1);
        assert_eq!(text.matches("admin").count(), 1);
    }

    #[test]
    fn test_binding_order_independent() {
        let template = "host=${DB_HOST} port=${DB_PORT}";
        let host = deferred("db", "address");
        let port = deferred("db", "port");

        let a = BootstrapPayload::new("env", template)
            .bind("DB_HOST", host.clone())
            .unwrap()
            .bind("DB_PORT", port.clone())
            .unwrap();
        let b = BootstrapPayload::new("env", template)
            .bind("DB_PORT", port.clone())
            .unwrap()
            .bind("DB_HOST", host.clone())
            .unwrap();

        host.resolve("db.internal").unwrap();
        port.resolve("5432").unwrap();

        assert_eq!(a.finalize().unwrap().as_bytes(), b.finalize().unwrap().as_bytes());
    }

    #[test]
    fn test_unbound_placeholder_rejected() {
        let payload = BootstrapPayload::new("env", TEMPLATE)
            .bind("DB_HOST", "localhost")
            .unwrap();

        assert_eq!(payload.unbound(), vec!["DB_PORT", "DB_USER"]);
        let err = payload.finalize().unwrap_err();
        match err {
            CoreError::UnboundPlaceholders { placeholders, .. } => {
                assert_eq!(placeholders, vec!["DB_PORT", "DB_USER"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bind_unknown_or_twice() {
        let payload = BootstrapPayload::new("env", TEMPLATE);
        assert!(matches!(
            payload.clone().bind("NOPE", "x"),
            Err(CoreError::UnknownPlaceholder { .. })
        ));

        let once = payload.bind("DB_HOST", "a").unwrap();
        assert!(matches!(
            once.bind("DB_HOST", "b"),
            Err(CoreError::PlaceholderAlreadyBound { .. })
        ));
    }

    #[test]
    fn test_no_partial_or_recursive_substitution() {
        let payload = BootstrapPayload::new("env", "${DB} ${DB_HOST} $DB_HOST")
            .bind("DB", "${DB_HOST}")
            .unwrap()
            .bind("DB_HOST", "h")
            .unwrap();

        assert_eq!(payload.finalize().unwrap(), "${DB_HOST} h $DB_HOST");
    }

    #[test]
    fn test_repeated_token_substituted_everywhere() {
        let payload = BootstrapPayload::new("env", "${USER}:${USER}")
            .bind("USER", "app")
            .unwrap();
        assert_eq!(payload.finalize().unwrap(), "app:app");
    }

    #[test]
    fn test_dependencies_and_base64() {
        let host = deferred("db", "address");
        let payload = BootstrapPayload::new("env", "H=${DB_HOST}")
            .bind("DB_HOST", host.clone())
            .unwrap();
        assert_eq!(payload.dependencies(), vec![ResourceId::new("db")]);

        host.resolve("x").unwrap();
        let embedded = EmbeddedPayload {
            payload,
            encoding: PayloadEncoding::Base64,
        };
        assert_eq!(embedded.render().unwrap(), STANDARD.encode("H=x"));
    }

    #[test]
    fn test_secret_binding_renders_and_flags_payload() {
        let payload = BootstrapPayload::new("env", "DB_PASSWORD=${DB_PASSWORD}\n")
            .bind("DB_PASSWORD", Binding::Secret("hunter2".to_string()))
            .unwrap();
        assert!(payload.has_secret_bindings());
        assert!(payload.dependencies().is_empty());
        assert_eq!(payload.finalize().unwrap(), "DB_PASSWORD=hunter2\n");

        let plain = BootstrapPayload::new("env", "A=${A}").bind("A", "x").unwrap();
        assert!(!plain.has_secret_bindings());
    }
}
