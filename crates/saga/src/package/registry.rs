//! Module Registry
//!
//! Loads packages from disk and registers their contents into the shared
//! registries. A package is loaded in four passes (commands, behaviors, entity
//! kinds, event modules); each module file inside a pass is independent, so a
//! malformed file is logged and skipped without affecting its neighbours.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use saga_runtime::{BehaviorDefinition, BehaviorRegistry, EventBus};
use saga_types::Event;
use serde::de::DeserializeOwned;
use tokio::fs;
use tracing::{debug, info, warn};

use super::catalog::{CommandContext, CommandHandler, EntityFactory, ModuleCatalog};
use super::manifest::*;

/// Errors raised while loading packages
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("Package path does not exist: {0}")]
    PackageNotFound(PathBuf),

    #[error("Package manifest not found: {0}")]
    ManifestMissing(PathBuf),

    #[error("Invalid manifest {path}: {source}")]
    InvalidManifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to read file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Invalid module {path}: {source}")]
    InvalidModule {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unknown {module} implementation '{key}'")]
    UnknownImplementation { module: &'static str, key: String },

    #[error("Event module '{key}' failed to initialize: {message}")]
    InitFailed { key: String, message: String },
}

// ─────────────────────────────────────────────────────────────────────────────
// Loaded Package
// ─────────────────────────────────────────────────────────────────────────────

/// A command registered by a package
#[derive(Clone)]
pub struct Command {
    pub name: String,
    pub description: Option<String>,
    pub package: String,
    pub handler: Arc<dyn CommandHandler>,
}

impl Command {
    pub async fn execute(
        &self,
        ctx: &CommandContext,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, super::catalog::CommandError> {
        self.handler.execute(ctx, args).await
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("package", &self.package)
            .finish_non_exhaustive()
    }
}

/// A package and everything it registered
pub struct LoadedPackage {
    pub manifest: PackageManifest,
    pub path: PathBuf,
    pub commands: HashMap<String, Command>,
    /// (kind, name) pairs registered into the behavior registry
    pub behaviors: Vec<(String, String)>,
    pub entities: HashMap<String, Arc<dyn EntityFactory>>,
    /// Catalog keys of the event modules that were initialized
    pub event_modules: Vec<String>,
}

impl LoadedPackage {
    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn version(&self) -> &str {
        &self.manifest.version
    }
}

impl std::fmt::Debug for LoadedPackage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedPackage")
            .field("name", &self.manifest.name)
            .field("version", &self.manifest.version)
            .field("path", &self.path)
            .field("commands", &self.commands.len())
            .field("behaviors", &self.behaviors)
            .field("entities", &self.entities.len())
            .field("event_modules", &self.event_modules)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Module Registry
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct RegistryState {
    packages: HashMap<String, Arc<LoadedPackage>>,
    load_order: Vec<String>,
    /// Which package currently owns each (kind, name) behavior
    behavior_owners: HashMap<(String, String), String>,
}

/// Loads packages and tracks what each one registered
pub struct ModuleRegistry {
    catalog: Arc<ModuleCatalog>,
    behaviors: Arc<BehaviorRegistry>,
    bus: Arc<EventBus>,
    state: RwLock<RegistryState>,
}

impl ModuleRegistry {
    pub fn new(
        catalog: Arc<ModuleCatalog>,
        behaviors: Arc<BehaviorRegistry>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            catalog,
            behaviors,
            bus,
            state: RwLock::new(RegistryState::default()),
        }
    }

    pub fn catalog(&self) -> &Arc<ModuleCatalog> {
        &self.catalog
    }

    pub fn behaviors(&self) -> &Arc<BehaviorRegistry> {
        &self.behaviors
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Context handed to commands
    pub fn command_context(&self) -> CommandContext {
        CommandContext {
            bus: Arc::clone(&self.bus),
            behaviors: Arc::clone(&self.behaviors),
        }
    }

    // ── Loading ─────────────────────────────────────────────────────────────

    /// Load the package at `path`.
    ///
    /// Loading a package whose name is already loaded returns the existing
    /// instance.
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<Arc<LoadedPackage>, PackageError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(PackageError::PackageNotFound(path.to_path_buf()));
        }

        let manifest_path = path.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Err(PackageError::ManifestMissing(manifest_path));
        }

        let content = fs::read_to_string(&manifest_path).await?;
        let manifest: PackageManifest =
            serde_json::from_str(&content).map_err(|source| PackageError::InvalidManifest {
                path: manifest_path.clone(),
                source,
            })?;

        if let Some(existing) = self.get_package(&manifest.name) {
            warn!(package = %manifest.name, "Package already loaded");
            return Ok(existing);
        }

        info!(
            package = %manifest.name,
            version = %manifest.version,
            path = %path.display(),
            "Loading package"
        );

        for dependency in &manifest.dependencies {
            if !self.is_loaded(dependency) {
                warn!(
                    package = %manifest.name,
                    dependency = %dependency,
                    "Dependency not loaded yet"
                );
            }
        }

        let commands = self.load_commands(&manifest.name, path).await?;
        let behaviors = self.load_behaviors(&manifest.name, path).await?;
        let entities = self.load_entities(path).await?;
        let event_modules = self.load_event_modules(path).await?;

        info!(
            package = %manifest.name,
            commands = commands.len(),
            behaviors = behaviors.len(),
            entities = entities.len(),
            event_modules = event_modules.len(),
            "Loaded package"
        );

        let package = Arc::new(LoadedPackage {
            manifest,
            path: path.to_path_buf(),
            commands,
            behaviors,
            entities,
            event_modules,
        });

        {
            let mut state = self.state.write();
            let name = package.name().to_string();
            if let Some(existing) = state.packages.get(&name) {
                warn!(package = %name, "Package was loaded concurrently");
                return Ok(Arc::clone(existing));
            }
            for (kind, behavior) in &package.behaviors {
                state
                    .behavior_owners
                    .insert((kind.clone(), behavior.clone()), name.clone());
            }
            state.packages.insert(name.clone(), Arc::clone(&package));
            state.load_order.push(name);
        }

        self.bus
            .emit(Event::PackageLoaded {
                name: package.name().to_string(),
                version: package.version().to_string(),
            })
            .await;

        Ok(package)
    }

    /// Remove a package. Returns `false` if it was not loaded.
    ///
    /// Behaviors the package still owns are unregistered; handlers its event
    /// modules subscribed stay on the bus.
    pub async fn unload(&self, name: &str) -> bool {
        if !self.is_loaded(name) {
            return false;
        }

        self.bus
            .emit(Event::PackageUnloading {
                name: name.to_string(),
            })
            .await;

        let owned: Vec<(String, String)> = {
            let mut state = self.state.write();
            let Some(package) = state.packages.remove(name) else {
                return false;
            };
            state.load_order.retain(|n| n != name);

            let owned: Vec<_> = package
                .behaviors
                .iter()
                .filter(|key| state.behavior_owners.get(*key).is_some_and(|owner| owner == name))
                .cloned()
                .collect();
            for key in &owned {
                state.behavior_owners.remove(key);
            }
            owned
        };

        for (kind, behavior) in &owned {
            self.behaviors.unregister(kind, behavior);
        }

        info!(package = %name, behaviors = owned.len(), "Unloaded package");
        true
    }

    /// Subdirectories of `dir` that contain a manifest, sorted by path
    pub async fn discover(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, PackageError> {
        let dir = dir.as_ref();
        if !dir.exists() {
            return Err(PackageError::PackageNotFound(dir.to_path_buf()));
        }

        let mut found = Vec::new();
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_dir() && path.join(MANIFEST_FILE).exists() {
                found.push(path);
            }
        }
        found.sort();
        Ok(found)
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    pub fn get_package(&self, name: &str) -> Option<Arc<LoadedPackage>> {
        self.state.read().packages.get(name).cloned()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.state.read().packages.contains_key(name)
    }

    /// Loaded packages in load order
    pub fn list_packages(&self) -> Vec<Arc<LoadedPackage>> {
        let state = self.state.read();
        state
            .load_order
            .iter()
            .filter_map(|name| state.packages.get(name).cloned())
            .collect()
    }

    /// Package names in load order
    pub fn load_order(&self) -> Vec<String> {
        self.state.read().load_order.clone()
    }

    /// Every command across packages; later packages shadow earlier ones
    pub fn get_all_commands(&self) -> HashMap<String, Command> {
        let mut commands = HashMap::new();
        for package in self.list_packages() {
            for (name, command) in &package.commands {
                commands.insert(name.clone(), command.clone());
            }
        }
        commands
    }

    /// Look up one command, honouring shadowing
    pub fn get_command(&self, name: &str) -> Option<Command> {
        self.list_packages()
            .iter()
            .rev()
            .find_map(|package| package.commands.get(name).cloned())
    }

    /// Factory for an entity kind, honouring shadowing
    pub fn get_entity_handler(&self, kind: &str) -> Option<Arc<dyn EntityFactory>> {
        self.list_packages()
            .iter()
            .rev()
            .find_map(|package| package.entities.get(kind).cloned())
    }

    // ── Load passes ─────────────────────────────────────────────────────────

    async fn load_commands(
        &self,
        package: &str,
        root: &Path,
    ) -> Result<HashMap<String, Command>, PackageError> {
        let mut commands = HashMap::new();

        for path in module_files(&root.join(COMMANDS_DIR)).await? {
            match self.load_command(package, &path).await {
                Ok(command) => {
                    debug!(package, command = %command.name, "Registered command");
                    commands.insert(command.name.clone(), command);
                }
                Err(e) => {
                    warn!(package, path = %path.display(), error = %e, "Failed to load command");
                }
            }
        }

        Ok(commands)
    }

    async fn load_command(&self, package: &str, path: &Path) -> Result<Command, PackageError> {
        let descriptor: CommandDescriptor = read_module(path).await?;
        let handler = self.catalog.command(&descriptor.handler).ok_or_else(|| {
            PackageError::UnknownImplementation {
                module: "command",
                key: descriptor.handler.clone(),
            }
        })?;

        Ok(Command {
            name: descriptor.name,
            description: descriptor.description,
            package: package.to_string(),
            handler,
        })
    }

    async fn load_behaviors(
        &self,
        package: &str,
        root: &Path,
    ) -> Result<Vec<(String, String)>, PackageError> {
        let behaviors_dir = root.join(BEHAVIORS_DIR);
        let mut registered = Vec::new();

        if !behaviors_dir.exists() {
            debug!(package, "No behaviors directory found");
            return Ok(registered);
        }

        let mut kinds = Vec::new();
        let mut entries = fs::read_dir(&behaviors_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_dir() {
                if let Some(kind) = path.file_name().and_then(|n| n.to_str()) {
                    kinds.push((kind.to_string(), path.clone()));
                }
            }
        }
        kinds.sort();

        for (kind, dir) in kinds {
            for path in module_files(&dir).await? {
                match self.load_behavior(&kind, &path).await {
                    Ok(definition) => {
                        let name = definition.name.clone();
                        self.behaviors.register(&kind, definition);
                        registered.push((kind.clone(), name));
                    }
                    Err(e) => {
                        warn!(
                            package,
                            kind = %kind,
                            path = %path.display(),
                            error = %e,
                            "Failed to load behavior"
                        );
                    }
                }
            }
        }

        Ok(registered)
    }

    async fn load_behavior(
        &self,
        kind: &str,
        path: &Path,
    ) -> Result<BehaviorDefinition, PackageError> {
        let descriptor: BehaviorDescriptor = read_module(path).await?;
        let handler = self.catalog.behavior(&descriptor.handler).ok_or_else(|| {
            PackageError::UnknownImplementation {
                module: "behavior",
                key: descriptor.handler.clone(),
            }
        })?;

        let mut definition = BehaviorDefinition::new(kind, descriptor.name, handler);
        if let Some(description) = descriptor.description {
            definition = definition.with_description(description);
        }
        Ok(definition)
    }

    async fn load_entities(
        &self,
        root: &Path,
    ) -> Result<HashMap<String, Arc<dyn EntityFactory>>, PackageError> {
        let mut entities = HashMap::new();

        for path in module_files(&root.join(ENTITIES_DIR)).await? {
            let loaded = async {
                let descriptor: EntityDescriptor = read_module(&path).await?;
                let factory = self.catalog.entity(&descriptor.handler).ok_or_else(|| {
                    PackageError::UnknownImplementation {
                        module: "entity",
                        key: descriptor.handler.clone(),
                    }
                })?;
                Ok::<_, PackageError>((descriptor.kind, factory))
            }
            .await;

            match loaded {
                Ok((kind, factory)) => {
                    debug!(kind = %kind, "Registered entity kind");
                    entities.insert(kind, factory);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to load entity kind");
                }
            }
        }

        Ok(entities)
    }

    async fn load_event_modules(&self, root: &Path) -> Result<Vec<String>, PackageError> {
        let mut initialized = Vec::new();

        for path in module_files(&root.join(EVENTS_DIR)).await? {
            match self.init_event_module(&path).await {
                Ok(key) => {
                    debug!(module = %key, "Initialized event module");
                    initialized.push(key);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to load event module");
                }
            }
        }

        Ok(initialized)
    }

    async fn init_event_module(&self, path: &Path) -> Result<String, PackageError> {
        let descriptor: EventModuleDescriptor = read_module(path).await?;
        let module = self.catalog.event_module(&descriptor.init).ok_or_else(|| {
            PackageError::UnknownImplementation {
                module: "event module",
                key: descriptor.init.clone(),
            }
        })?;

        module
            .init(&self.bus)
            .await
            .map_err(|e| PackageError::InitFailed {
                key: descriptor.init.clone(),
                message: e.to_string(),
            })?;

        Ok(descriptor.init)
    }
}

/// `*.json` files directly inside `dir`, sorted; empty if `dir` is absent
async fn module_files(dir: &Path) -> Result<Vec<PathBuf>, PackageError> {
    let mut files = Vec::new();
    if !dir.exists() {
        return Ok(files);
    }

    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

async fn read_module<T: DeserializeOwned>(path: &Path) -> Result<T, PackageError> {
    let content = fs::read_to_string(path).await?;
    serde_json::from_str(&content).map_err(|source| PackageError::InvalidModule {
        path: path.to_path_buf(),
        source,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::catalog::{EventModule, ModuleError};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use saga_runtime::{EntityBase, FnBehavior, handler_fn};
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingModule {
        inits: AtomicUsize,
    }

    #[async_trait]
    impl EventModule for CountingModule {
        async fn init(&self, _bus: &Arc<EventBus>) -> Result<(), ModuleError> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingModule;

    #[async_trait]
    impl EventModule for FailingModule {
        async fn init(&self, _bus: &Arc<EventBus>) -> Result<(), ModuleError> {
            Err(ModuleError("no database".to_string()))
        }
    }

    fn catalog() -> (Arc<ModuleCatalog>, Arc<CountingModule>) {
        let catalog = ModuleCatalog::new();
        catalog.register_command_fn("test.echo", |_ctx, args| Ok(args));
        catalog.register_command_fn("test.version", |_ctx, _args| Ok(json!("v2")));
        catalog.register_behavior(
            "test.greet",
            Arc::new(FnBehavior::new(|entity: &EntityBase, _args: Vec<Value>| {
                Ok(Value::String(format!("hello from {}", entity.id())))
            })),
        );
        let module = Arc::new(CountingModule {
            inits: AtomicUsize::new(0),
        });
        catalog.register_event_module("test.counter", module.clone());
        catalog.register_event_module("test.failing", Arc::new(FailingModule));
        (Arc::new(catalog), module)
    }

    fn registry(catalog: Arc<ModuleCatalog>) -> ModuleRegistry {
        ModuleRegistry::new(
            catalog,
            Arc::new(BehaviorRegistry::new()),
            EventBus::new_shared(),
        )
    }

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    fn write_package(root: &Path, name: &str, deps: &[&str]) -> PathBuf {
        let dir = root.join(name);
        write(
            &dir.join(MANIFEST_FILE),
            &json!({"name": name, "version": "0.2.0", "dependencies": deps}).to_string(),
        );
        dir
    }

    #[tokio::test]
    async fn test_missing_path_and_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let (catalog, _) = catalog();
        let registry = registry(catalog);

        let err = registry.load(tmp.path().join("nope")).await.unwrap_err();
        assert!(matches!(err, PackageError::PackageNotFound(_)));

        std::fs::create_dir_all(tmp.path().join("empty")).unwrap();
        let err = registry.load(tmp.path().join("empty")).await.unwrap_err();
        assert!(matches!(err, PackageError::ManifestMissing(_)));
        assert!(registry.load_order().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_behavior_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let (catalog, _) = catalog();
        let registry = registry(catalog);

        let dir = write_package(tmp.path(), "core", &[]);
        write(&dir.join("behaviors/character/broken.json"), "{ not json");
        write(
            &dir.join("behaviors/character/greet.json"),
            r#"{"name": "greet", "handler": "test.greet"}"#,
        );

        let package = registry.load(&dir).await.unwrap();

        assert_eq!(package.behaviors, vec![("character".to_string(), "greet".to_string())]);
        assert!(registry.behaviors().has("character", "greet"));
        assert!(!registry.behaviors().has("character", "broken"));
        assert_eq!(registry.behaviors().list_by_kind("character"), vec!["greet"]);
    }

    #[tokio::test]
    async fn test_full_package_registration() {
        let tmp = tempfile::tempdir().unwrap();
        let (catalog, module) = catalog();
        let registry = registry(catalog);

        let loaded = Arc::new(Mutex::new(Vec::new()));
        let loaded_clone = Arc::clone(&loaded);
        registry.bus().subscribe(
            "package:loaded",
            handler_fn(move |event| {
                if let Event::PackageLoaded { name, version } = event {
                    loaded_clone.lock().push(format!("{name}@{version}"));
                }
                Ok(None)
            }),
            0,
        );

        let dir = write_package(tmp.path(), "core", &[]);
        write(&dir.join("commands/echo.json"), r#"{"name": "echo", "handler": "test.echo"}"#);
        write(&dir.join("commands/ghost.json"), r#"{"name": "ghost", "handler": "test.nothing"}"#);
        write(&dir.join("commands/readme.txt"), "not a module");
        write(&dir.join("events/counter.json"), r#"{"init": "test.counter"}"#);
        write(&dir.join("events/failing.json"), r#"{"init": "test.failing"}"#);

        let package = registry.load(&dir).await.unwrap();

        assert_eq!(package.name(), "core");
        assert_eq!(package.commands.len(), 1);
        assert_eq!(package.event_modules, vec!["test.counter"]);
        assert_eq!(module.inits.load(Ordering::SeqCst), 1);
        assert_eq!(*loaded.lock(), vec!["core@0.2.0"]);

        let echo = registry.get_command("echo").unwrap();
        let result = echo
            .execute(&registry.command_context(), json!({"x": 1}))
            .await
            .unwrap();
        assert_eq!(result, json!({"x": 1}));
    }

    #[tokio::test]
    async fn test_load_is_idempotent_by_name() {
        let tmp = tempfile::tempdir().unwrap();
        let (catalog, module) = catalog();
        let registry = registry(catalog);

        let dir = write_package(tmp.path(), "core", &[]);
        write(&dir.join("events/counter.json"), r#"{"init": "test.counter"}"#);

        let first = registry.load(&dir).await.unwrap();
        let second = registry.load(&dir).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.load_order(), vec!["core"]);
        assert_eq!(module.inits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_dependency_is_advisory() {
        let tmp = tempfile::tempdir().unwrap();
        let (catalog, _) = catalog();
        let registry = registry(catalog);

        let dir = write_package(tmp.path(), "quests", &["core"]);
        registry.load(&dir).await.unwrap();

        assert!(registry.is_loaded("quests"));
        assert!(!registry.is_loaded("core"));
    }

    #[tokio::test]
    async fn test_later_commands_shadow_earlier() {
        let tmp = tempfile::tempdir().unwrap();
        let (catalog, _) = catalog();
        let registry = registry(catalog);

        let core = write_package(tmp.path(), "core", &[]);
        write(
            &core.join("commands/version.json"),
            r#"{"name": "version", "handler": "test.echo"}"#,
        );
        let patch = write_package(tmp.path(), "patch", &["core"]);
        write(
            &patch.join("commands/version.json"),
            r#"{"name": "version", "handler": "test.version"}"#,
        );

        registry.load(&core).await.unwrap();
        registry.load(&patch).await.unwrap();

        let all = registry.get_all_commands();
        assert_eq!(all.len(), 1);
        assert_eq!(all["version"].package, "patch");
        assert_eq!(registry.get_command("version").unwrap().package, "patch");
        assert_eq!(registry.load_order(), vec!["core", "patch"]);

        assert!(registry.unload("patch").await);
        assert_eq!(registry.get_command("version").unwrap().package, "core");
    }

    #[tokio::test]
    async fn test_unload_announces_and_removes_owned_behaviors() {
        let tmp = tempfile::tempdir().unwrap();
        let (catalog, _) = catalog();
        let registry = registry(catalog);

        let unloading = Arc::new(AtomicUsize::new(0));
        let unloading_clone = Arc::clone(&unloading);
        registry.bus().subscribe(
            "package:unloading",
            handler_fn(move |_| {
                unloading_clone.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }),
            0,
        );

        let core = write_package(tmp.path(), "core", &[]);
        write(
            &core.join("behaviors/character/greet.json"),
            r#"{"name": "greet", "handler": "test.greet"}"#,
        );
        write(
            &core.join("behaviors/character/wave.json"),
            r#"{"name": "wave", "handler": "test.greet"}"#,
        );
        let patch = write_package(tmp.path(), "patch", &[]);
        write(
            &patch.join("behaviors/character/wave.json"),
            r#"{"name": "wave", "handler": "test.greet"}"#,
        );

        registry.load(&core).await.unwrap();
        registry.load(&patch).await.unwrap();

        assert!(registry.unload("core").await);
        assert!(!registry.unload("core").await);

        assert_eq!(unloading.load(Ordering::SeqCst), 1);
        assert!(!registry.behaviors().has("character", "greet"));
        // "wave" was re-registered by patch, which still owns it
        assert!(registry.behaviors().has("character", "wave"));
        assert_eq!(registry.load_order(), vec!["patch"]);
    }

    #[tokio::test]
    async fn test_discover_finds_packages() {
        let tmp = tempfile::tempdir().unwrap();
        write_package(tmp.path(), "b", &[]);
        write_package(tmp.path(), "a", &[]);
        std::fs::create_dir_all(tmp.path().join("not-a-package")).unwrap();

        let found = ModuleRegistry::discover(tmp.path()).await.unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
