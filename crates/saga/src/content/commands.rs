// Built-in commands

use async_trait::async_trait;
use saga_types::Event;
use serde_json::{Value, json};

use crate::package::{CommandContext, CommandError, CommandHandler};

/// Event published by `announce`
pub const ANNOUNCEMENT_EVENT: &str = "world:announcement";

/// `announce {"message": ...}`: broadcasts a message and reports who replied
pub struct Announce;

#[async_trait]
impl CommandHandler for Announce {
    async fn execute(&self, ctx: &CommandContext, args: Value) -> Result<Value, CommandError> {
        let message = args
            .get("message")
            .and_then(Value::as_str)
            .ok_or_else(|| CommandError::InvalidArguments("'message' is required".to_string()))?;

        let replies = ctx
            .bus
            .emit_collecting(Event::custom(ANNOUNCEMENT_EVENT, json!({ "message": message })))
            .await;

        Ok(json!({ "delivered": true, "replies": replies }))
    }
}

/// `behaviors {"kind": ...}`: lists registered behavior names for a kind
pub fn list_behaviors(ctx: &CommandContext, args: Value) -> Result<Value, CommandError> {
    let kind = args
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| CommandError::InvalidArguments("'kind' is required".to_string()))?;

    Ok(json!(ctx.behaviors.list_by_kind(kind)))
}
