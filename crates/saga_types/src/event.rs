//! Bus Events
//!
//! Everything published on the event bus is an [`Event`]. Each variant maps to
//! exactly one canonical event name; subscriptions are keyed by that name.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::EffectSnapshot;

/// Canonical event names
pub mod names {
    /// Subscribing to this name receives every event
    pub const WILDCARD: &str = "*";

    pub const PACKAGE_LOADED: &str = "package:loaded";
    pub const PACKAGE_UNLOADING: &str = "package:unloading";

    pub const SYSTEM_INITIALIZED: &str = "system:initialized";
    pub const SYSTEM_START: &str = "system:start";
    pub const SYSTEM_STOP: &str = "system:stop";

    pub const EFFECT_ACTIVATED: &str = "effect:activated";
    pub const EFFECT_DEACTIVATED: &str = "effect:deactivated";
    pub const EFFECT_TICK: &str = "effect:tick";
}

/// Build the namespaced name `"<kind>:<event>"` used by entity events
pub fn entity_event_name(kind: &str, event: &str) -> String {
    format!("{kind}:{event}")
}

// ─────────────────────────────────────────────────────────────────────────────
// Event
// ─────────────────────────────────────────────────────────────────────────────

/// A typed bus event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A package finished loading
    PackageLoaded { name: String, version: String },

    /// A package is about to be removed
    PackageUnloading { name: String },

    /// Startup loaded every configured package
    SystemInitialized { packages: Vec<String> },

    SystemStart { started_at: DateTime<Utc> },

    SystemStop { uptime_ms: u64 },

    EffectActivated { target: String, effect: EffectSnapshot },

    /// `expired` is true when the expiry timer ended the effect
    EffectDeactivated {
        target: String,
        effect: EffectSnapshot,
        expired: bool,
    },

    EffectTick { target: String, effect: EffectSnapshot },

    /// Entity-scoped event, published as `"<kind>:<event>"`
    Entity {
        kind: String,
        id: String,
        event: String,
        data: serde_json::Value,
    },

    /// Free-form event defined by a package
    Custom {
        name: String,
        data: serde_json::Value,
    },
}

impl Event {
    /// Create an entity-scoped event
    pub fn entity(
        kind: impl Into<String>,
        id: impl Into<String>,
        event: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self::Entity {
            kind: kind.into(),
            id: id.into(),
            event: event.into(),
            data,
        }
    }

    /// Create a free-form event
    pub fn custom(name: impl Into<String>, data: serde_json::Value) -> Self {
        Self::Custom {
            name: name.into(),
            data,
        }
    }

    /// The name this event is dispatched under
    pub fn name(&self) -> Cow<'_, str> {
        match self {
            Event::PackageLoaded { .. } => Cow::Borrowed(names::PACKAGE_LOADED),
            Event::PackageUnloading { .. } => Cow::Borrowed(names::PACKAGE_UNLOADING),
            Event::SystemInitialized { .. } => Cow::Borrowed(names::SYSTEM_INITIALIZED),
            Event::SystemStart { .. } => Cow::Borrowed(names::SYSTEM_START),
            Event::SystemStop { .. } => Cow::Borrowed(names::SYSTEM_STOP),
            Event::EffectActivated { .. } => Cow::Borrowed(names::EFFECT_ACTIVATED),
            Event::EffectDeactivated { .. } => Cow::Borrowed(names::EFFECT_DEACTIVATED),
            Event::EffectTick { .. } => Cow::Borrowed(names::EFFECT_TICK),
            Event::Entity { kind, event, .. } => Cow::Owned(entity_event_name(kind, event)),
            Event::Custom { name, .. } => Cow::Borrowed(name.as_str()),
        }
    }

    /// Get a field from the payload of entity and custom events
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        match self {
            Event::Entity { data, .. } | Event::Custom { data, .. } => data.get(key),
            _ => None,
        }
    }

    /// The effect snapshot carried by effect lifecycle events
    pub fn effect(&self) -> Option<&EffectSnapshot> {
        match self {
            Event::EffectActivated { effect, .. }
            | Event::EffectDeactivated { effect, .. }
            | Event::EffectTick { effect, .. } => Some(effect),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
