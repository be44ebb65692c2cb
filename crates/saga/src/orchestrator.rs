//! Orchestrator
//!
//! Owns the shared bus and registries and sequences startup and shutdown:
//!
//! ```text
//! initialize(config) ─▶ load packages ─▶ system:initialized
//! start()            ─▶ system:start
//! stop()             ─▶ system:stop
//! shutdown()         ─▶ stop + unload packages in reverse load order
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use saga_runtime::{BehaviorRegistry, EventBus};
use saga_types::Event;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::SystemConfig;
use crate::content;
use crate::package::{LoadedPackage, ModuleCatalog, ModuleRegistry, PackageError};

/// Errors raised by the orchestrator
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("System is already initialized")]
    AlreadyInitialized,

    #[error(transparent)]
    Package(#[from] PackageError),
}

/// Point-in-time view of the system
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub initialized: bool,
    pub running: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub uptime_ms: u64,
    pub packages: Vec<String>,
}

struct Started {
    at: Instant,
    wall: DateTime<Utc>,
}

#[derive(Default)]
struct RunState {
    initialized: bool,
    started: Option<Started>,
}

pub struct Orchestrator {
    config: RwLock<SystemConfig>,
    bus: Arc<EventBus>,
    behaviors: Arc<BehaviorRegistry>,
    modules: Arc<ModuleRegistry>,
    state: Mutex<RunState>,
}

impl Orchestrator {
    /// Create an orchestrator whose packages resolve against `catalog`
    pub fn new(catalog: Arc<ModuleCatalog>) -> Self {
        let bus = EventBus::new_shared();
        let behaviors = Arc::new(BehaviorRegistry::new());
        let modules = Arc::new(ModuleRegistry::new(
            catalog,
            Arc::clone(&behaviors),
            Arc::clone(&bus),
        ));

        Self {
            config: RwLock::new(SystemConfig::default()),
            bus,
            behaviors,
            modules,
            state: Mutex::new(RunState::default()),
        }
    }

    /// Create an orchestrator with the built-in content catalog
    pub fn with_builtins() -> Self {
        Self::new(content::builtin_catalog())
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn behaviors(&self) -> &Arc<BehaviorRegistry> {
        &self.behaviors
    }

    pub fn modules(&self) -> &Arc<ModuleRegistry> {
        &self.modules
    }

    /// Current (merged) configuration
    pub fn config(&self) -> SystemConfig {
        self.config.read().clone()
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// Merge `config` and load every configured package.
    ///
    /// A package that fails to load is logged and skipped. Returns the loaded
    /// package names in load order.
    pub async fn initialize(&self, config: SystemConfig) -> Result<Vec<String>, OrchestratorError> {
        {
            let mut state = self.state.lock();
            if state.initialized {
                return Err(OrchestratorError::AlreadyInitialized);
            }
            state.initialized = true;
        }

        let config = {
            let mut current = self.config.write();
            current.merge(config);
            current.clone()
        };

        for path in Self::package_paths(&config).await {
            match self.modules.load(&path).await {
                Ok(package) => debug!(package = %package.name(), "Package ready"),
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to load package"),
            }
        }

        let packages = self.modules.load_order();
        info!(packages = packages.len(), "System initialized");

        self.bus
            .emit(Event::SystemInitialized {
                packages: packages.clone(),
            })
            .await;

        Ok(packages)
    }

    /// Explicit packages first, then everything discovered in package dirs
    async fn package_paths(config: &SystemConfig) -> Vec<PathBuf> {
        let mut paths = config.packages.clone();

        for dir in &config.package_dirs {
            match ModuleRegistry::discover(dir).await {
                Ok(found) => {
                    debug!(dir = %dir.display(), packages = found.len(), "Discovered packages");
                    for path in found {
                        if !paths.contains(&path) {
                            paths.push(path);
                        }
                    }
                }
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Failed to scan package directory")
                }
            }
        }

        paths
    }

    /// Load one more package after initialization
    pub async fn load_package(
        &self,
        path: impl Into<PathBuf>,
    ) -> Result<Arc<LoadedPackage>, OrchestratorError> {
        Ok(self.modules.load(path.into()).await?)
    }

    /// Mark the system running. Returns `false` if it already was.
    pub async fn start(&self) -> bool {
        let started_at = {
            let mut state = self.state.lock();
            if state.started.is_some() {
                warn!("System already started");
                return false;
            }
            if !state.initialized {
                warn!("Starting before initialize");
            }

            let wall = Utc::now();
            state.started = Some(Started {
                at: Instant::now(),
                wall,
            });
            wall
        };

        info!(%started_at, "System started");
        self.bus.emit(Event::SystemStart { started_at }).await;
        true
    }

    /// Mark the system stopped. Returns `false` if it was not running.
    pub async fn stop(&self) -> bool {
        let uptime = {
            let mut state = self.state.lock();
            let Some(started) = state.started.take() else {
                warn!("System is not running");
                return false;
            };
            started.at.elapsed()
        };

        let uptime_ms = duration_ms(uptime);
        info!(uptime_ms, "System stopped");
        self.bus.emit(Event::SystemStop { uptime_ms }).await;
        true
    }

    /// Stop if running, then unload every package in reverse load order
    pub async fn shutdown(&self) {
        if self.is_running() {
            self.stop().await;
        }

        for name in self.modules.load_order().iter().rev() {
            self.modules.unload(name).await;
        }
        info!("Shutdown complete");
    }

    // ── Status ──────────────────────────────────────────────────────────────

    pub fn is_running(&self) -> bool {
        self.state.lock().started.is_some()
    }

    /// Time since `start()`, or zero when stopped
    pub fn get_uptime(&self) -> Duration {
        self.state
            .lock()
            .started
            .as_ref()
            .map(|s| s.at.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    pub fn status(&self) -> SystemStatus {
        let (initialized, started_at, uptime) = {
            let state = self.state.lock();
            (
                state.initialized,
                state.started.as_ref().map(|s| s.wall),
                state.started.as_ref().map(|s| s.at.elapsed()),
            )
        };

        SystemStatus {
            initialized,
            running: started_at.is_some(),
            started_at,
            uptime_ms: duration_ms(uptime.unwrap_or(Duration::ZERO)),
            packages: self.modules.load_order(),
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::CHARACTER_KIND;
    use saga_runtime::handler_fn;
    use serde_json::json;
    use std::path::Path;

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    fn write_core_package(root: &Path, name: &str) -> PathBuf {
        let dir = root.join(name);
        write(&dir.join("manifest.json"), &json!({"name": name}).to_string());
        write(
            &dir.join("behaviors/character/greet.json"),
            r#"{"name": "greet", "handler": "core.greet"}"#,
        );
        write(
            &dir.join("entities/character.json"),
            r#"{"type": "character", "handler": "core.character"}"#,
        );
        write(&dir.join("events/sessions.json"), r#"{"init": "core.session_log"}"#);
        dir
    }

    fn recorder(orchestrator: &Orchestrator) -> Arc<Mutex<Vec<Event>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        orchestrator.bus().subscribe(
            "*",
            handler_fn(move |event| {
                seen_clone.lock().push(event.clone());
                Ok(None)
            }),
            0,
        );
        seen
    }

    #[tokio::test]
    async fn test_initialize_skips_failed_packages() {
        let tmp = tempfile::tempdir().unwrap();
        let good = write_core_package(tmp.path(), "core");

        let orchestrator = Orchestrator::with_builtins();
        let seen = recorder(&orchestrator);

        let config = SystemConfig {
            packages: vec![tmp.path().join("missing"), good],
            ..Default::default()
        };
        let loaded = orchestrator.initialize(config).await.unwrap();

        assert_eq!(loaded, vec!["core"]);
        assert!(orchestrator.behaviors().has(CHARACTER_KIND, "greet"));
        assert!(orchestrator.modules().get_entity_handler(CHARACTER_KIND).is_some());

        let events = seen.lock();
        assert_eq!(
            events.last().map(|e| e.name().into_owned()).as_deref(),
            Some("system:initialized")
        );
        assert!(matches!(
            events.last(),
            Some(Event::SystemInitialized { packages }) if packages == &vec!["core".to_string()]
        ));
    }

    #[tokio::test]
    async fn test_initialize_discovers_package_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        write_core_package(tmp.path(), "alpha");
        write_core_package(tmp.path(), "beta");

        let orchestrator = Orchestrator::with_builtins();
        let config = SystemConfig {
            package_dirs: vec![tmp.path().to_path_buf(), tmp.path().join("nowhere")],
            ..Default::default()
        };

        let loaded = orchestrator.initialize(config).await.unwrap();
        assert_eq!(loaded, vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn test_initialize_twice_is_rejected() {
        let orchestrator = Orchestrator::with_builtins();
        orchestrator.initialize(SystemConfig::default()).await.unwrap();

        let err = orchestrator.initialize(SystemConfig::default()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::AlreadyInitialized));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stop_are_idempotent() {
        let orchestrator = Orchestrator::with_builtins();
        orchestrator.initialize(SystemConfig::default()).await.unwrap();
        let seen = recorder(&orchestrator);

        assert_eq!(orchestrator.get_uptime(), Duration::ZERO);
        assert!(orchestrator.start().await);
        assert!(!orchestrator.start().await);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(orchestrator.get_uptime(), Duration::from_millis(1500));

        assert!(orchestrator.stop().await);
        assert!(!orchestrator.stop().await);
        assert_eq!(orchestrator.get_uptime(), Duration::ZERO);

        let events = seen.lock();
        let names: Vec<_> = events.iter().map(|e| e.name().into_owned()).collect();
        assert_eq!(names, vec!["system:start", "system:stop"]);
        assert!(matches!(events[1], Event::SystemStop { uptime_ms: 1500 }));
    }

    #[tokio::test]
    async fn test_status_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let core = write_core_package(tmp.path(), "core");

        let orchestrator = Orchestrator::with_builtins();
        let before = orchestrator.status();
        assert!(!before.initialized && !before.running);

        orchestrator
            .initialize(SystemConfig {
                packages: vec![core],
                ..Default::default()
            })
            .await
            .unwrap();
        orchestrator.start().await;

        let status = orchestrator.status();
        assert!(status.initialized);
        assert!(status.running);
        assert!(status.started_at.is_some());
        assert_eq!(status.packages, vec!["core"]);
    }

    #[tokio::test]
    async fn test_shutdown_unloads_in_reverse_order() {
        let tmp = tempfile::tempdir().unwrap();
        let first = write_core_package(tmp.path(), "first");
        let second = write_core_package(tmp.path(), "second");

        let orchestrator = Orchestrator::with_builtins();
        orchestrator
            .initialize(SystemConfig {
                packages: vec![first, second],
                ..Default::default()
            })
            .await
            .unwrap();
        orchestrator.start().await;
        let seen = recorder(&orchestrator);

        orchestrator.shutdown().await;

        let events = seen.lock();
        let names: Vec<_> = events
            .iter()
            .map(|e| match e {
                Event::PackageUnloading { name } => name.clone(),
                other => other.name().into_owned(),
            })
            .collect();
        assert_eq!(names, vec!["system:stop", "second", "first"]);
        assert!(orchestrator.modules().load_order().is_empty());
        assert!(!orchestrator.is_running());
    }

    #[tokio::test]
    async fn test_shipped_core_package_loads() {
        let core = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../packages/core");
        let orchestrator = Orchestrator::with_builtins();

        let loaded = orchestrator
            .initialize(SystemConfig {
                packages: vec![core],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(loaded, vec!["core"]);

        let package = orchestrator.modules().get_package("core").unwrap();
        assert_eq!(package.commands.len(), 2);
        assert_eq!(package.event_modules.len(), 2);
        assert_eq!(
            orchestrator.behaviors().list_by_kind(CHARACTER_KIND),
            vec!["emote", "greet", "remember"]
        );

        let behaviors = orchestrator.modules().get_command("behaviors").unwrap();
        let result = behaviors
            .execute(
                &orchestrator.modules().command_context(),
                json!({"kind": "character"}),
            )
            .await
            .unwrap();
        assert_eq!(result, json!(["emote", "greet", "remember"]));
    }

    #[tokio::test]
    async fn test_load_package_after_initialize() {
        let tmp = tempfile::tempdir().unwrap();
        let extra = write_core_package(tmp.path(), "extra");

        let orchestrator = Orchestrator::with_builtins();
        orchestrator.initialize(SystemConfig::default()).await.unwrap();

        let package = orchestrator.load_package(&extra).await.unwrap();
        assert_eq!(package.name(), "extra");

        let err = orchestrator.load_package(tmp.path().join("nope")).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Package(PackageError::PackageNotFound(_))));
    }
}
