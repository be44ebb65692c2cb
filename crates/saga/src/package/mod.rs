//! Package System
//!
//! Packages are directories with a `manifest.json` and per-module JSON
//! descriptors. Descriptors name compiled-in implementations held by the
//! [`ModuleCatalog`]; the [`ModuleRegistry`] loads packages and registers their
//! commands, behaviors, entity kinds and event modules.

mod catalog;
mod manifest;
mod registry;

pub use catalog::*;
pub use manifest::*;
pub use registry::*;
