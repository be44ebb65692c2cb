//! Saga Runtime - Event bus, behaviors, entities and timed effects
//!
//! This crate contains the in-process core every package builds on:
//!
//! - [`EventBus`]: priority-ordered publish/subscribe with per-handler fault isolation
//! - [`BehaviorRegistry`]: named behavior definitions keyed by entity kind
//! - [`Entity`] / [`EntityBase`]: identity, metadata, attached behaviors and a
//!   kind-namespaced view of the bus
//! - [`Effect`] / [`EffectList`]: buffs and debuffs that tick, stack and expire

pub use saga_types;

mod behavior;
mod bus;
mod entity;

pub mod effect;

pub use behavior::*;
pub use bus::*;
pub use effect::{
    AddOutcome, Effect, EffectDuration, EffectError, EffectHooks, EffectList, EffectSpec,
    EffectStatus, EffectTarget, ModifierApplication, RejectReason, DEFAULT_TICK_INTERVAL,
};
pub use entity::*;
