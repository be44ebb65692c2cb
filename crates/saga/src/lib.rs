//! Saga - Package-driven game runtime
//!
//! This crate provides the application layer on top of `saga_runtime`:
//! - Package loading from disk via [`package::ModuleRegistry`]
//! - Startup and shutdown sequencing via [`orchestrator::Orchestrator`]
//! - Layered configuration via [`config::SystemConfig`]
//! - Compiled-in commands, behaviors, entities and event modules in [`content`]

// Re-export core crates
pub use saga_runtime;
pub use saga_types;

// Configuration
pub mod config;

// Built-in content
pub mod content;

// Startup/shutdown sequencing
pub mod orchestrator;

// Package system
pub mod package;

pub use config::SystemConfig;
pub use orchestrator::{Orchestrator, OrchestratorError, SystemStatus};
