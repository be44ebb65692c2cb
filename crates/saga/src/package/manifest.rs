//! Package Descriptor Types
//!
//! Defines the structure of package files on disk:
//!
//! ```text
//! <package>/
//!   manifest.json
//!   commands/*.json
//!   behaviors/<entity-kind>/*.json
//!   entities/*.json
//!   events/*.json
//! ```

use serde::{Deserialize, Serialize};

/// Manifest file name at the package root
pub const MANIFEST_FILE: &str = "manifest.json";

pub const COMMANDS_DIR: &str = "commands";
pub const BEHAVIORS_DIR: &str = "behaviors";
pub const ENTITIES_DIR: &str = "entities";
pub const EVENTS_DIR: &str = "events";

/// Package manifest (manifest.json)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageManifest {
    /// Unique package key
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    /// Packages expected to be loaded first (advisory)
    #[serde(default)]
    pub dependencies: Vec<String>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// Command module (commands/*.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Catalog key of the implementation
    pub handler: String,
}

/// Behavior module (behaviors/<kind>/*.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub handler: String,
}

/// Entity kind module (entities/*.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: Option<String>,
    pub handler: String,
}

/// Event handler module (events/*.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventModuleDescriptor {
    #[serde(default)]
    pub name: Option<String>,
    /// Catalog key of the module whose `init` runs at load time
    pub init: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_defaults() {
        let manifest: PackageManifest = serde_json::from_str(r#"{"name": "core"}"#).unwrap();
        assert_eq!(manifest.name, "core");
        assert_eq!(manifest.version, "1.0.0");
        assert!(manifest.dependencies.is_empty());
        assert!(manifest.author.is_none());
    }

    #[test]
    fn test_entity_descriptor_uses_type_key() {
        let descriptor: EntityDescriptor =
            serde_json::from_str(r#"{"type": "character", "handler": "core.character"}"#).unwrap();
        assert_eq!(descriptor.kind, "character");
    }

    #[test]
    fn test_descriptor_requires_handler() {
        let result = serde_json::from_str::<BehaviorDescriptor>(r#"{"name": "greet"}"#);
        assert!(result.is_err());
    }
}
