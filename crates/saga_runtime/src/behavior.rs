// Behavior Registry - Named behavior definitions per entity kind
//
// The registry only holds definitions. Attaching a behavior binds its handler
// to one entity instance; from then on the entity owns the binding and the
// registry can change without affecting it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::entity::{Entity, EntityBase};

// ─────────────────────────────────────────────────────────────────────────────
// Behavior Handler
// ─────────────────────────────────────────────────────────────────────────────

/// Error produced by a behavior
#[derive(Debug, Clone, thiserror::Error)]
pub enum BehaviorError {
    #[error("{0}")]
    Failed(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}

impl BehaviorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// A reusable piece of entity logic.
///
/// The entity the behavior is attached to is always passed first.
#[async_trait]
pub trait BehaviorHandler: Send + Sync + 'static {
    async fn invoke(&self, entity: &EntityBase, args: Vec<Value>) -> Result<Value, BehaviorError>;
}

/// Function-based behavior (for simple behaviors)
pub struct FnBehavior<F>
where
    F: Fn(&EntityBase, Vec<Value>) -> Result<Value, BehaviorError> + Send + Sync,
{
    func: F,
}

impl<F> FnBehavior<F>
where
    F: Fn(&EntityBase, Vec<Value>) -> Result<Value, BehaviorError> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> BehaviorHandler for FnBehavior<F>
where
    F: Fn(&EntityBase, Vec<Value>) -> Result<Value, BehaviorError> + Send + Sync + 'static,
{
    async fn invoke(&self, entity: &EntityBase, args: Vec<Value>) -> Result<Value, BehaviorError> {
        (self.func)(entity, args)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Behavior Definition
// ─────────────────────────────────────────────────────────────────────────────

/// A behavior as registered for one entity kind.
///
/// Identity is `(kind, name)`.
#[derive(Clone)]
pub struct BehaviorDefinition {
    pub kind: String,
    pub name: String,
    pub description: Option<String>,
    pub handler: Arc<dyn BehaviorHandler>,
}

impl BehaviorDefinition {
    pub fn new(
        kind: impl Into<String>,
        name: impl Into<String>,
        handler: Arc<dyn BehaviorHandler>,
    ) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            description: None,
            handler,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Debug for BehaviorDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorDefinition")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Behavior Registry
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct RegistryInner {
    /// (kind, name) -> definition
    definitions: HashMap<(String, String), BehaviorDefinition>,
    /// kind -> names in registration order
    by_kind: HashMap<String, Vec<String>>,
}

/// Registry of all behavior definitions
#[derive(Default)]
pub struct BehaviorRegistry {
    inner: RwLock<RegistryInner>,
}

impl BehaviorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition under `kind`, replacing any previous one with the
    /// same name
    pub fn register(&self, kind: &str, mut definition: BehaviorDefinition) {
        definition.kind = kind.to_string();
        let name = definition.name.clone();

        let mut inner = self.inner.write();
        let replaced = inner
            .definitions
            .insert((kind.to_string(), name.clone()), definition)
            .is_some();

        if replaced {
            tracing::warn!(kind, behavior = %name, "Replacing existing behavior definition");
        } else {
            inner.by_kind.entry(kind.to_string()).or_default().push(name.clone());
        }

        tracing::debug!(kind, behavior = %name, "Registered behavior");
    }

    /// Remove a definition. Returns `false` if it was not registered.
    pub fn unregister(&self, kind: &str, name: &str) -> bool {
        let mut inner = self.inner.write();
        if inner
            .definitions
            .remove(&(kind.to_string(), name.to_string()))
            .is_none()
        {
            return false;
        }

        if let Some(names) = inner.by_kind.get_mut(kind) {
            names.retain(|n| n != name);
            if names.is_empty() {
                inner.by_kind.remove(kind);
            }
        }
        true
    }

    /// Get a definition by kind and name
    pub fn get(&self, kind: &str, name: &str) -> Option<BehaviorDefinition> {
        self.inner
            .read()
            .definitions
            .get(&(kind.to_string(), name.to_string()))
            .cloned()
    }

    /// Check if a definition exists
    pub fn has(&self, kind: &str, name: &str) -> bool {
        self.inner
            .read()
            .definitions
            .contains_key(&(kind.to_string(), name.to_string()))
    }

    /// Names registered for a kind, in registration order
    pub fn list_by_kind(&self, kind: &str) -> Vec<String> {
        self.inner
            .read()
            .by_kind
            .get(kind)
            .cloned()
            .unwrap_or_default()
    }

    /// All kinds with at least one behavior, sorted
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<_> = self.inner.read().by_kind.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Total number of definitions
    pub fn len(&self) -> usize {
        self.inner.read().definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().definitions.is_empty()
    }

    /// Bind the `(entity.kind, name)` definition to the entity.
    ///
    /// Returns `false` (with a warning) when no such definition exists.
    pub fn attach(&self, entity: &dyn Entity, name: &str) -> bool {
        let base = entity.base();
        let Some(definition) = self.get(base.kind(), name) else {
            tracing::warn!(
                kind = base.kind(),
                entity = base.id(),
                behavior = name,
                "Behavior not found, cannot attach"
            );
            return false;
        };

        base.attach_behavior(name, definition.handler);
        true
    }

    /// Remove a behavior from the entity
    pub fn detach(&self, entity: &dyn Entity, name: &str) -> bool {
        entity.base().remove_behavior(name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
