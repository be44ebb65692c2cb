// Module Catalog - Compiled-in implementations that package files refer to
//
// Package descriptors on disk name an implementation by key (for example
// "core.greet"). The catalog maps those keys to the Rust implementations
// registered at bootstrap. A key that is not in the catalog makes that one
// module file fail to load.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use saga_runtime::{BehaviorHandler, BehaviorRegistry, Entity, EntityError, EventBus};
use serde_json::Value;

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Error returned by a command
#[derive(Debug, Clone, thiserror::Error)]
pub enum CommandError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Failed(String),
}

/// What a command can reach while executing
#[derive(Clone)]
pub struct CommandContext {
    pub bus: Arc<EventBus>,
    pub behaviors: Arc<BehaviorRegistry>,
}

/// A named command exposed by a package
#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    async fn execute(&self, ctx: &CommandContext, args: Value) -> Result<Value, CommandError>;
}

/// Function-based command (for simple commands)
pub struct FnCommand<F>
where
    F: Fn(&CommandContext, Value) -> Result<Value, CommandError> + Send + Sync,
{
    func: F,
}

impl<F> FnCommand<F>
where
    F: Fn(&CommandContext, Value) -> Result<Value, CommandError> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> CommandHandler for FnCommand<F>
where
    F: Fn(&CommandContext, Value) -> Result<Value, CommandError> + Send + Sync + 'static,
{
    async fn execute(&self, ctx: &CommandContext, args: Value) -> Result<Value, CommandError> {
        (self.func)(ctx, args)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entity Kinds and Event Modules
// ─────────────────────────────────────────────────────────────────────────────

/// Builds entities of one kind
pub trait EntityFactory: Send + Sync + 'static {
    /// Create a fresh entity
    fn create(&self, id: &str, bus: Arc<EventBus>) -> Arc<dyn Entity>;

    /// Rebuild an entity from its serialized form
    fn restore(&self, value: &Value, bus: Arc<EventBus>) -> Result<Arc<dyn Entity>, EntityError>;
}

/// Error returned by an event module's `init`
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct ModuleError(pub String);

/// A module that wires handlers onto the bus when its package loads
#[async_trait]
pub trait EventModule: Send + Sync + 'static {
    async fn init(&self, bus: &Arc<EventBus>) -> Result<(), ModuleError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Catalog
// ─────────────────────────────────────────────────────────────────────────────

/// Keyed store of every compiled-in module implementation
#[derive(Default)]
pub struct ModuleCatalog {
    commands: DashMap<String, Arc<dyn CommandHandler>>,
    behaviors: DashMap<String, Arc<dyn BehaviorHandler>>,
    entities: DashMap<String, Arc<dyn EntityFactory>>,
    event_modules: DashMap<String, Arc<dyn EventModule>>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_command(&self, key: impl Into<String>, handler: Arc<dyn CommandHandler>) {
        self.commands.insert(key.into(), handler);
    }

    /// Register a command with a sync function
    pub fn register_command_fn<F>(&self, key: impl Into<String>, func: F)
    where
        F: Fn(&CommandContext, Value) -> Result<Value, CommandError> + Send + Sync + 'static,
    {
        self.register_command(key, Arc::new(FnCommand::new(func)));
    }

    pub fn register_behavior(&self, key: impl Into<String>, handler: Arc<dyn BehaviorHandler>) {
        self.behaviors.insert(key.into(), handler);
    }

    pub fn register_entity(&self, key: impl Into<String>, factory: Arc<dyn EntityFactory>) {
        self.entities.insert(key.into(), factory);
    }

    pub fn register_event_module(&self, key: impl Into<String>, module: Arc<dyn EventModule>) {
        self.event_modules.insert(key.into(), module);
    }

    pub fn command(&self, key: &str) -> Option<Arc<dyn CommandHandler>> {
        self.commands.get(key).map(|e| Arc::clone(e.value()))
    }

    pub fn behavior(&self, key: &str) -> Option<Arc<dyn BehaviorHandler>> {
        self.behaviors.get(key).map(|e| Arc::clone(e.value()))
    }

    pub fn entity(&self, key: &str) -> Option<Arc<dyn EntityFactory>> {
        self.entities.get(key).map(|e| Arc::clone(e.value()))
    }

    pub fn event_module(&self, key: &str) -> Option<Arc<dyn EventModule>> {
        self.event_modules.get(key).map(|e| Arc::clone(e.value()))
    }

    /// Total number of registered implementations
    pub fn len(&self) -> usize {
        self.commands.len() + self.behaviors.len() + self.entities.len() + self.event_modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use saga_runtime::{EntityBase, FnBehavior};

    #[test]
    fn test_command_roundtrip_through_catalog() {
        let catalog = ModuleCatalog::new();
        catalog.register_command_fn("test.echo", |_ctx, args| Ok(args));

        let ctx = CommandContext {
            bus: EventBus::new_shared(),
            behaviors: Arc::new(BehaviorRegistry::new()),
        };
        let command = catalog.command("test.echo").unwrap();
        let result = tokio_test::block_on(command.execute(&ctx, Value::from(7))).unwrap();

        assert_eq!(result, Value::from(7));
        assert!(catalog.command("test.missing").is_none());
    }

    #[test]
    fn test_keys_are_per_module_type() {
        let catalog = ModuleCatalog::new();
        catalog.register_behavior(
            "test.noop",
            Arc::new(FnBehavior::new(|_: &EntityBase, _: Vec<Value>| Ok(Value::Null))),
        );

        assert!(catalog.behavior("test.noop").is_some());
        assert!(catalog.command("test.noop").is_none());
        assert_eq!(catalog.len(), 1);
    }
}
