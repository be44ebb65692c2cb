//! System Configuration
//!
//! Layered with figment: built-in defaults, then an optional TOML file, then
//! `SAGA_`-prefixed environment variables (`SAGA_LOG_FILTER=saga=debug`).

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "saga.toml";

pub const ENV_PREFIX: &str = "SAGA_";

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] figment::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Package directories to load, in order
    pub packages: Vec<PathBuf>,
    /// Directories whose subdirectories are each a package
    pub package_dirs: Vec<PathBuf>,
    /// tracing `EnvFilter` directive used when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            packages: Vec::new(),
            package_dirs: Vec::new(),
            log_filter: "saga=info".to_string(),
        }
    }
}

impl SystemConfig {
    /// Load configuration.
    ///
    /// An explicit `path` must exist; without one, `saga.toml` is used if
    /// present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) if !path.exists() => return Err(ConfigError::NotFound(path.to_path_buf())),
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let config: Self = Self::figment(&file).extract()?;
        Ok(config)
    }

    /// The provider stack behind [`SystemConfig::load`]
    pub fn figment(file: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    /// Fold `other` into this config.
    ///
    /// Package lists are appended without duplicates; scalar settings are
    /// taken from `other` when it changes them from the default.
    pub fn merge(&mut self, other: SystemConfig) {
        for package in other.packages {
            if !self.packages.contains(&package) {
                self.packages.push(package);
            }
        }
        for dir in other.package_dirs {
            if !self.package_dirs.contains(&dir) {
                self.package_dirs.push(dir);
            }
        }
        if other.log_filter != SystemConfig::default().log_filter {
            self.log_filter = other.log_filter;
        }
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_explicit_file_is_error() {
        let err = SystemConfig::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_file_overrides_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("saga.toml");
        std::fs::write(
            &path,
            r#"
packages = ["packages/core"]
log_filter = "saga=debug"
"#,
        )
        .unwrap();

        let config: SystemConfig = SystemConfig::figment(&path).extract().unwrap();

        assert_eq!(config.packages, vec![PathBuf::from("packages/core")]);
        assert!(config.package_dirs.is_empty());
        assert_eq!(config.log_filter, "saga=debug");
    }

    #[test]
    fn test_absent_default_file_yields_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config: SystemConfig = Figment::from(Serialized::defaults(SystemConfig::default()))
            .merge(Toml::file(tmp.path().join("missing.toml")))
            .extract()
            .unwrap();
        assert_eq!(config, SystemConfig::default());
    }

    #[test]
    fn test_merge_appends_without_duplicates() {
        let mut base = SystemConfig {
            packages: vec!["a".into()],
            ..Default::default()
        };
        base.merge(SystemConfig {
            packages: vec!["a".into(), "b".into()],
            package_dirs: vec!["mods".into()],
            log_filter: "saga=trace".into(),
        });

        assert_eq!(base.packages, vec![PathBuf::from("a"), PathBuf::from("b")]);
        assert_eq!(base.package_dirs, vec![PathBuf::from("mods")]);
        assert_eq!(base.log_filter, "saga=trace");

        base.merge(SystemConfig::default());
        assert_eq!(base.log_filter, "saga=trace");
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = SystemConfig {
            package_dirs: vec!["packages".into()],
            ..Default::default()
        };
        let text = config.to_toml().unwrap();
        let parsed: SystemConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
