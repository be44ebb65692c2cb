//! Saga Types - Shared vocabulary for the saga runtime
//!
//! Pure data structures used across the workspace:
//!
//! - [`Attribute`] / [`AttributeSheet`]: the closed set of numeric attributes an
//!   effect can modify, stored with the system-wide `[0, 100]` clamp
//! - [`Event`]: the typed union of everything published on the event bus
//! - [`EffectSnapshot`]: the serialized form of an effect

mod attribute;
mod effect;
mod event;

pub use attribute::*;
pub use effect::*;
pub use event::*;
