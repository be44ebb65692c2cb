//! Built-in Content
//!
//! Compiled-in implementations that package descriptors can refer to. Every
//! implementation is registered under a `core.*` key by [`register_builtins`],
//! which the binary calls once at bootstrap.

mod behaviors;
mod character;
mod commands;
mod events;

pub use behaviors::*;
pub use character::*;
pub use commands::*;
pub use events::*;

use std::sync::Arc;

use crate::package::ModuleCatalog;

/// Register every built-in implementation
pub fn register_builtins(catalog: &ModuleCatalog) {
    catalog.register_command("core.announce", Arc::new(Announce));
    catalog.register_command_fn("core.behaviors", list_behaviors);

    catalog.register_behavior("core.greet", greet());
    catalog.register_behavior("core.emote", Arc::new(Emote));
    catalog.register_behavior("core.remember", remember());

    catalog.register_entity("core.character", Arc::new(CharacterFactory));

    catalog.register_event_module("core.effect_log", Arc::new(EffectLog));
    catalog.register_event_module("core.session_log", Arc::new(SessionLog));

    tracing::debug!(implementations = catalog.len(), "Registered built-in content");
}

/// A catalog with every built-in registered
pub fn builtin_catalog() -> Arc<ModuleCatalog> {
    let catalog = ModuleCatalog::new();
    register_builtins(&catalog);
    Arc::new(catalog)
}
