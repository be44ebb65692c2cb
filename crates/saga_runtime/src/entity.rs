//! Entities
//!
//! Every game object shares the same core: a `kind` + `id` identity, an open
//! metadata bag, the behaviors attached to this instance, and a view of the
//! event bus namespaced by kind. Concrete entity types embed an [`EntityBase`]
//! and implement [`Entity`] for their own serialization.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::RwLock;
use saga_types::{Event, entity_event_name};
use serde_json::{Map, Value};
use wildmatch::WildMatch;

use crate::behavior::{BehaviorError, BehaviorHandler};
use crate::bus::{EventBus, EventHandler, SubscriptionId, panic_message};

/// Errors raised by entity operations
#[derive(Debug, thiserror::Error)]
pub enum EntityError {
    #[error("Behavior not found: {0}")]
    BehaviorNotFound(String),

    #[error("Behavior '{name}' failed: {source}")]
    BehaviorFailed {
        name: String,
        #[source]
        source: BehaviorError,
    },

    #[error("Invalid entity data: {0}")]
    InvalidData(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Entity Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A concrete entity type
pub trait Entity: Send + Sync {
    /// Shared entity state
    fn base(&self) -> &EntityBase;

    fn kind(&self) -> &str {
        self.base().kind()
    }

    fn id(&self) -> &str {
        self.base().id()
    }

    /// Serialize the entity
    fn to_json(&self) -> Value;

    /// Rebuild an entity from [`Entity::to_json`] output
    fn from_json(value: &Value, bus: Arc<EventBus>) -> Result<Self, EntityError>
    where
        Self: Sized;
}

// ─────────────────────────────────────────────────────────────────────────────
// Entity Base
// ─────────────────────────────────────────────────────────────────────────────

struct BoundBehavior {
    name: String,
    handler: Arc<dyn BehaviorHandler>,
}

/// State shared by every entity
pub struct EntityBase {
    kind: String,
    id: String,
    metadata: RwLock<Map<String, Value>>,
    /// Attached behaviors in attachment order
    behaviors: RwLock<Vec<BoundBehavior>>,
    bus: Arc<EventBus>,
}

impl EntityBase {
    /// Create a base with empty metadata and no behaviors
    pub fn new(kind: impl Into<String>, id: impl Into<String>, bus: Arc<EventBus>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            metadata: RwLock::new(Map::new()),
            behaviors: RwLock::new(Vec::new()),
            bus,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The shared, un-namespaced bus
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    // ── Metadata ────────────────────────────────────────────────────────────

    /// Copy of one metadata value
    pub fn get_metadata(&self, key: &str) -> Option<Value> {
        self.metadata.read().get(key).cloned()
    }

    pub fn set_metadata(&self, key: impl Into<String>, value: Value) {
        self.metadata.write().insert(key.into(), value);
    }

    pub fn remove_metadata(&self, key: &str) -> Option<Value> {
        self.metadata.write().remove(key)
    }

    /// Copy of the whole metadata bag
    pub fn metadata(&self) -> Map<String, Value> {
        self.metadata.read().clone()
    }

    // ── Behaviors ───────────────────────────────────────────────────────────

    /// Attach a behavior under `name`, replacing any existing binding
    pub fn attach_behavior(&self, name: &str, handler: Arc<dyn BehaviorHandler>) {
        let mut behaviors = self.behaviors.write();
        if let Some(existing) = behaviors.iter_mut().find(|b| b.name == name) {
            existing.handler = handler;
        } else {
            behaviors.push(BoundBehavior {
                name: name.to_string(),
                handler,
            });
        }
        tracing::debug!(kind = %self.kind, entity = %self.id, behavior = name, "Attached behavior");
    }

    /// Detach a behavior. Returns `false` if it was not attached.
    pub fn remove_behavior(&self, name: &str) -> bool {
        let mut behaviors = self.behaviors.write();
        let before = behaviors.len();
        behaviors.retain(|b| b.name != name);
        behaviors.len() < before
    }

    pub fn has_behavior(&self, name: &str) -> bool {
        self.behaviors.read().iter().any(|b| b.name == name)
    }

    /// Names of attached behaviors in attachment order
    pub fn behavior_names(&self) -> Vec<String> {
        self.behaviors.read().iter().map(|b| b.name.clone()).collect()
    }

    fn handler_for(&self, name: &str) -> Option<Arc<dyn BehaviorHandler>> {
        self.behaviors
            .read()
            .iter()
            .find(|b| b.name == name)
            .map(|b| Arc::clone(&b.handler))
    }

    /// Run an attached behavior. A panicking behavior is reported as failed.
    pub async fn execute_behavior(
        &self,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, EntityError> {
        let handler = self
            .handler_for(name)
            .ok_or_else(|| EntityError::BehaviorNotFound(name.to_string()))?;

        self.invoke(handler.as_ref(), args)
            .await
            .map_err(|source| EntityError::BehaviorFailed {
                name: name.to_string(),
                source,
            })
    }

    async fn invoke(
        &self,
        handler: &dyn BehaviorHandler,
        args: Vec<Value>,
    ) -> Result<Value, BehaviorError> {
        AssertUnwindSafe(handler.invoke(self, args))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(BehaviorError::new(format!(
                    "panicked: {}",
                    panic_message(panic.as_ref())
                )))
            })
    }

    /// Run every attached behavior whose name matches `pattern`.
    ///
    /// `pattern` is a glob (`*`, `?`); without wildcards it matches literally.
    /// Failing behaviors are logged and left out of the results.
    pub async fn execute_matching_behaviors(
        &self,
        pattern: &str,
        args: Vec<Value>,
    ) -> Vec<(String, Value)> {
        let matcher = WildMatch::new(pattern);
        let matching: Vec<_> = self
            .behaviors
            .read()
            .iter()
            .filter(|b| matcher.matches(&b.name))
            .map(|b| (b.name.clone(), Arc::clone(&b.handler)))
            .collect();

        let mut results = Vec::with_capacity(matching.len());
        for (name, handler) in matching {
            match self.invoke(handler.as_ref(), args.clone()).await {
                Ok(value) => results.push((name, value)),
                Err(e) => {
                    tracing::warn!(
                        kind = %self.kind,
                        entity = %self.id,
                        behavior = %name,
                        error = %e,
                        "Behavior failed"
                    );
                }
            }
        }
        results
    }

    // ── Events ──────────────────────────────────────────────────────────────

    /// Publish `"<kind>:<event>"`
    pub async fn emit(&self, event: &str, data: Value) {
        self.bus
            .emit(Event::entity(&self.kind, &self.id, event, data))
            .await;
    }

    /// Publish `"<kind>:<event>"` and collect handler results
    pub async fn emit_collecting(&self, event: &str, data: Value) -> Vec<Value> {
        self.bus
            .emit_collecting(Event::entity(&self.kind, &self.id, event, data))
            .await
    }

    /// Subscribe to `"<kind>:<event>"`
    pub fn on(
        &self,
        event: &str,
        handler: Arc<dyn EventHandler>,
        priority: i32,
    ) -> SubscriptionId {
        self.bus
            .subscribe(&entity_event_name(&self.kind, event), handler, priority)
    }

    /// Subscribe once to `"<kind>:<event>"`
    pub fn once(
        &self,
        event: &str,
        handler: Arc<dyn EventHandler>,
        priority: i32,
    ) -> SubscriptionId {
        self.bus
            .subscribe_once(&entity_event_name(&self.kind, event), handler, priority)
    }

    /// Unsubscribe from `"<kind>:<event>"`
    pub fn off(&self, event: &str, handler: &Arc<dyn EventHandler>) -> bool {
        self.bus
            .unsubscribe(&entity_event_name(&self.kind, event), handler)
    }

    // ── Serialization helpers ───────────────────────────────────────────────

    /// Common fields for [`Entity::to_json`] implementations
    pub fn to_json_fields(&self) -> Value {
        serde_json::json!({
            "kind": self.kind,
            "id": self.id,
            "metadata": Value::Object(self.metadata()),
            "behaviors": self.behavior_names(),
        })
    }

    /// Parse the common fields written by [`EntityBase::to_json_fields`].
    ///
    /// Behaviors are not restored; attach them again through the registry.
    pub fn from_json_fields(
        kind: &str,
        value: &Value,
        bus: Arc<EventBus>,
    ) -> Result<Self, EntityError> {
        if let Some(found) = value.get("kind").and_then(Value::as_str) {
            if found != kind {
                return Err(EntityError::InvalidData(format!(
                    "expected kind '{kind}', found '{found}'"
                )));
            }
        }

        let id = value
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| EntityError::InvalidData("missing 'id'".to_string()))?;

        let base = Self::new(kind, id, bus);
        if let Some(Value::Object(metadata)) = value.get("metadata") {
            *base.metadata.write() = metadata.clone();
        }
        Ok(base)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
