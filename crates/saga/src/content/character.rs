// Character - The built-in player/NPC entity
//
// A character is both an entity (behaviors, namespaced events) and an effect
// target (its attribute sheet is what poison and regeneration act on).

use std::sync::Arc;

use saga_runtime::{Entity, EntityBase, EntityError, EffectTarget, EventBus};
use saga_types::{Attribute, AttributeSheet};
use serde_json::Value;

use crate::package::EntityFactory;

pub const CHARACTER_KIND: &str = "character";

pub struct Character {
    base: EntityBase,
    name: String,
    attributes: AttributeSheet,
}

impl Character {
    /// Create a character with full health, stamina and mana
    pub fn new(id: impl Into<String>, name: impl Into<String>, bus: Arc<EventBus>) -> Self {
        Self {
            base: EntityBase::new(CHARACTER_KIND, id, bus),
            name: name.into(),
            attributes: AttributeSheet::new()
                .with(Attribute::Health, 100.0)
                .with(Attribute::Mana, 100.0)
                .with(Attribute::Stamina, 100.0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn health(&self) -> f64 {
        self.attributes.get(Attribute::Health)
    }

    pub fn is_alive(&self) -> bool {
        self.health() > 0.0
    }
}

impl Entity for Character {
    fn base(&self) -> &EntityBase {
        &self.base
    }

    fn to_json(&self) -> Value {
        let mut value = self.base.to_json_fields();
        value["name"] = Value::String(self.name.clone());
        value["attributes"] = serde_json::to_value(&self.attributes).unwrap_or(Value::Null);
        value
    }

    fn from_json(value: &Value, bus: Arc<EventBus>) -> Result<Self, EntityError> {
        let base = EntityBase::from_json_fields(CHARACTER_KIND, value, bus)?;
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(base.id())
            .to_string();

        let attributes = match value.get("attributes") {
            Some(raw) => serde_json::from_value(raw.clone())
                .map_err(|e| EntityError::InvalidData(format!("attributes: {e}")))?,
            None => AttributeSheet::new(),
        };

        Ok(Self {
            base,
            name,
            attributes,
        })
    }
}

impl EffectTarget for Character {
    fn target_id(&self) -> &str {
        self.base.id()
    }

    fn attributes(&self) -> &AttributeSheet {
        &self.attributes
    }
}

/// Entity kind handler for `character`
pub struct CharacterFactory;

impl EntityFactory for CharacterFactory {
    fn create(&self, id: &str, bus: Arc<EventBus>) -> Arc<dyn Entity> {
        Arc::new(Character::new(id, id, bus))
    }

    fn restore(&self, value: &Value, bus: Arc<EventBus>) -> Result<Arc<dyn Entity>, EntityError> {
        Ok(Arc::new(Character::from_json(value, bus)?))
    }
}
