//! Attributes
//!
//! The closed set of numeric attributes carried by effect targets, and the
//! sheet that stores them. Every write goes through the sheet, which keeps all
//! values inside `[ATTRIBUTE_MIN, ATTRIBUTE_MAX]`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Lowest value any attribute can hold
pub const ATTRIBUTE_MIN: f64 = 0.0;

/// Highest value any attribute can hold
pub const ATTRIBUTE_MAX: f64 = 100.0;

// ─────────────────────────────────────────────────────────────────────────────
// Attribute
// ─────────────────────────────────────────────────────────────────────────────

/// A named numeric attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Attribute {
    Health,
    Mana,
    Stamina,
    Strength,
    Dexterity,
    Intelligence,
    Defense,
}

impl Attribute {
    /// All attributes in declaration order
    pub const ALL: [Attribute; 7] = [
        Attribute::Health,
        Attribute::Mana,
        Attribute::Stamina,
        Attribute::Strength,
        Attribute::Dexterity,
        Attribute::Intelligence,
        Attribute::Defense,
    ];

    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::Health => "health",
            Attribute::Mana => "mana",
            Attribute::Stamina => "stamina",
            Attribute::Strength => "strength",
            Attribute::Dexterity => "dexterity",
            Attribute::Intelligence => "intelligence",
            Attribute::Defense => "defense",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown attribute name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown attribute: {0}")]
pub struct UnknownAttribute(pub String);

impl FromStr for Attribute {
    type Err = UnknownAttribute;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Attribute::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownAttribute(s.to_string()))
    }
}

/// Clamp a value into the attribute range
pub fn clamp_attribute(value: f64) -> f64 {
    if value.is_nan() {
        return ATTRIBUTE_MIN;
    }
    value.clamp(ATTRIBUTE_MIN, ATTRIBUTE_MAX)
}

// ─────────────────────────────────────────────────────────────────────────────
// Attribute Sheet
// ─────────────────────────────────────────────────────────────────────────────

/// Interior-mutable mapping from [`Attribute`] to value.
///
/// Targets are shared between effect timers and event handlers, so the sheet
/// takes `&self` for writes. Unset attributes read as [`ATTRIBUTE_MIN`].
#[derive(Default)]
pub struct AttributeSheet {
    values: RwLock<BTreeMap<Attribute, f64>>,
}

impl AttributeSheet {
    /// Create an empty sheet
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style initial value
    pub fn with(self, attribute: Attribute, value: f64) -> Self {
        self.set(attribute, value);
        self
    }

    /// Current value of an attribute
    pub fn get(&self, attribute: Attribute) -> f64 {
        self.values
            .read()
            .get(&attribute)
            .copied()
            .unwrap_or(ATTRIBUTE_MIN)
    }

    /// Whether the attribute has ever been written
    pub fn contains(&self, attribute: Attribute) -> bool {
        self.values.read().contains_key(&attribute)
    }

    /// Set an attribute, returning the stored (clamped) value
    pub fn set(&self, attribute: Attribute, value: f64) -> f64 {
        let clamped = clamp_attribute(value);
        self.values.write().insert(attribute, clamped);
        clamped
    }

    /// Add a signed delta and return the change that actually landed.
    ///
    /// The read-modify-write happens under one lock, so concurrent adjusters
    /// never lose each other's updates.
    pub fn adjust(&self, attribute: Attribute, delta: f64) -> f64 {
        let mut values = self.values.write();
        let current = values.get(&attribute).copied().unwrap_or(ATTRIBUTE_MIN);
        let next = clamp_attribute(current + delta);
        values.insert(attribute, next);
        next - current
    }

    /// Copy of every set attribute
    pub fn snapshot(&self) -> BTreeMap<Attribute, f64> {
        self.values.read().clone()
    }
}

impl Clone for AttributeSheet {
    fn clone(&self) -> Self {
        Self {
            values: RwLock::new(self.snapshot()),
        }
    }
}

impl fmt::Debug for AttributeSheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.snapshot()).finish()
    }
}

impl Serialize for AttributeSheet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.snapshot().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AttributeSheet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<Attribute, f64>::deserialize(deserializer)?;
        let sheet = AttributeSheet::new();
        for (attribute, value) in raw {
            sheet.set(attribute, value);
        }
        Ok(sheet)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_clamps_into_range() {
        let sheet = AttributeSheet::new();
        assert_eq!(sheet.set(Attribute::Health, 150.0), 100.0);
        assert_eq!(sheet.set(Attribute::Mana, -20.0), 0.0);
        assert_eq!(sheet.get(Attribute::Health), 100.0);
        assert_eq!(sheet.get(Attribute::Mana), 0.0);
    }

    #[test]
    fn test_adjust_reports_landed_change() {
        let sheet = AttributeSheet::new().with(Attribute::Health, 95.0);

        assert_eq!(sheet.adjust(Attribute::Health, 10.0), 5.0);
        assert_eq!(sheet.get(Attribute::Health), 100.0);

        assert_eq!(sheet.adjust(Attribute::Health, -2.0), -2.0);
        assert_eq!(sheet.get(Attribute::Health), 98.0);
    }

    #[test]
    fn test_unset_attribute_reads_as_min() {
        let sheet = AttributeSheet::new();
        assert!(!sheet.contains(Attribute::Strength));
        assert_eq!(sheet.get(Attribute::Strength), ATTRIBUTE_MIN);
    }

    #[test]
    fn test_parse_attribute_names() {
        assert_eq!("health".parse::<Attribute>().unwrap(), Attribute::Health);
        assert_eq!("Mana".parse::<Attribute>().unwrap(), Attribute::Mana);
        assert!("luck".parse::<Attribute>().is_err());
    }

    #[test]
    fn test_deserialize_clamps() {
        let sheet: AttributeSheet =
            serde_json::from_value(serde_json::json!({"health": 250, "mana": 40})).unwrap();
        assert_eq!(sheet.get(Attribute::Health), 100.0);
        assert_eq!(sheet.get(Attribute::Mana), 40.0);
    }
}
