//! Effect data shared between the engine and event payloads

use serde::{Deserialize, Serialize};

use crate::Attribute;

/// Serialized value used for permanent durations and remaining time
pub const PERMANENT_SENTINEL: i64 = -1;

/// Broad classification of an effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectCategory {
    Buff,
    Debuff,
    #[default]
    Neutral,
}

/// A single attribute modifier as it appears on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifierSnapshot {
    pub attribute: Attribute,
    pub value: f64,
}

/// Serialized form of an effect.
///
/// `duration` and `remaining` are milliseconds, or [`PERMANENT_SENTINEL`] for
/// effects that never expire on their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectSnapshot {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub category: EffectCategory,
    pub duration: i64,
    pub remaining: i64,
    pub elapsed: u64,
    pub modifiers: Vec<ModifierSnapshot>,
}

impl EffectSnapshot {
    /// Whether the snapshot describes a permanent effect
    pub fn is_permanent(&self) -> bool {
        self.duration == PERMANENT_SENTINEL
    }
}
