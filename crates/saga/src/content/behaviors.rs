// Built-in behaviors

use std::sync::Arc;

use async_trait::async_trait;
use saga_runtime::{BehaviorError, BehaviorHandler, EntityBase, FnBehavior};
use serde_json::{Value, json};

/// `greet [who]`: returns a greeting from the entity
pub fn greet() -> Arc<dyn BehaviorHandler> {
    Arc::new(FnBehavior::new(|entity: &EntityBase, args: Vec<Value>| {
        let who = args.first().and_then(Value::as_str).unwrap_or("traveler");
        let title = entity
            .get_metadata("title")
            .and_then(|v| v.as_str().map(str::to_string));

        let greeting = match title {
            Some(title) => format!("{title} {} greets {who}", entity.id()),
            None => format!("{} greets {who}", entity.id()),
        };
        Ok(Value::String(greeting))
    }))
}

/// `emote <text>`: publishes `<kind>:emote` on the bus
pub struct Emote;

#[async_trait]
impl BehaviorHandler for Emote {
    async fn invoke(&self, entity: &EntityBase, args: Vec<Value>) -> Result<Value, BehaviorError> {
        let text = args
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| BehaviorError::InvalidArguments("emote requires text".to_string()))?;

        entity.emit("emote", json!({ "id": entity.id(), "text": text })).await;
        Ok(Value::Null)
    }
}

/// `remember <key> <value>`: stores a metadata entry on the entity
pub fn remember() -> Arc<dyn BehaviorHandler> {
    Arc::new(FnBehavior::new(|entity: &EntityBase, args: Vec<Value>| {
        let mut args = args.into_iter();
        let key = match args.next() {
            Some(Value::String(key)) => key,
            _ => return Err(BehaviorError::InvalidArguments("remember requires a key".to_string())),
        };
        let value = args.next().unwrap_or(Value::Null);

        let previous = entity.get_metadata(&key).unwrap_or(Value::Null);
        entity.set_metadata(key, value);
        Ok(previous)
    }))
}
