//! The viewer: host context handed to every plug-in.
//!
//! A [`Viewer`] owns the plug-in registry, the signal repository and the
//! configuration elements. It instantiates the configured viewer plug-ins
//! at init time and drives them once per frame.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error, info};

use crate::config::{AppConfig, Configuration};
use crate::error::{Result, VrkitError};
use crate::lock;
use crate::mode::ModeHarnessPlugin;
use crate::plugins::{
    register_modules, Creator, Info, ModuleScanner, PluginCategory, PluginKind, Registry,
    TypedRegistryEntry,
};
use crate::signal::Repository;

/// A viewer plug-in: application behaviour driven at fixed lifecycle points.
pub trait Plugin: Send {
    fn info(&self) -> &Info;

    fn description(&self) -> String {
        self.info().name().to_string()
    }

    fn init(&mut self, viewer: &Viewer) -> Result<()>;

    /// Called once per frame.
    fn update(&mut self, viewer: &Viewer);

    fn exit(&mut self, _viewer: &Viewer) {}
}

/// Shared handle to a viewer plug-in.
pub type PluginPtr = Arc<Mutex<dyn Plugin>>;

/// Plug-in category of viewer plug-ins.
pub struct ViewerPluginCategory;

impl PluginCategory for ViewerPluginCategory {
    type Handle = PluginPtr;
    const KIND: PluginKind = PluginKind::Plugin;
    const CREATOR_FUNC_NAME: &'static str = "getCreator";
    const VERSION_FUNC_NAME: &'static str = "getPluginInterfaceVersion";
    const API_MAJOR: u32 = 2;
    const API_MINOR: u32 = 1;
}

/// Host context of a running application.
pub struct Viewer {
    config: AppConfig,
    configuration: Configuration,
    registry: Mutex<Registry>,
    signals: Arc<Repository>,
    plugins: Mutex<Vec<PluginPtr>>,
    frames: AtomicU64,
}

impl Viewer {
    pub fn new(config: AppConfig) -> Self {
        let configuration = config.configuration();
        Self {
            config,
            configuration,
            registry: Mutex::new(Registry::new()),
            signals: Arc::new(Repository::new()),
            plugins: Mutex::new(Vec::new()),
            frames: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Locks the plug-in registry. Do not hold the guard across calls into
    /// plug-ins.
    pub fn registry(&self) -> MutexGuard<'_, Registry> {
        lock(&self.registry)
    }

    pub fn signal_repository(&self) -> &Arc<Repository> {
        &self.signals
    }

    /// Registers the viewer plug-ins built into the host.
    pub fn register_builtin_plugins(&self) -> Result<()> {
        let info = ModeHarnessPlugin::plugin_info()?;
        let harness_info = info.clone();
        let creator = Creator::<ViewerPluginCategory>::new(move || -> PluginPtr {
            Arc::new(Mutex::new(ModeHarnessPlugin::new(harness_info.clone())))
        });
        self.registry()
            .add_entry(Arc::new(TypedRegistryEntry::from_creator(info, creator)));
        Ok(())
    }

    /// Registers the built-in and discovered viewer plug-in types, then
    /// instantiates and initialises every configured plug-in. A configured
    /// plug-in that cannot be loaded is logged and skipped.
    pub fn init(&self) -> Result<()> {
        self.register_builtin_plugins()?;

        let search_path = self.config.search_path();
        debug!(dirs = search_path.len(), "Scanning for viewer plug-ins");
        let modules = ModuleScanner::new().scan(&search_path);
        register_modules::<ViewerPluginCategory>(&mut self.registry(), &modules);

        for type_id in &self.config.plugins {
            if let Err(e) = self.add_plugin(type_id) {
                error!(plugin = %type_id, error = %e, "Failed to load viewer plug-in");
            }
        }

        info!(plugins = self.plugins().len(), "Viewer initialised");
        Ok(())
    }

    /// Instantiates the plug-in type `type_id`, initialises it and adds it
    /// to the frame loop.
    pub fn add_plugin(&self, type_id: &str) -> Result<PluginPtr> {
        let instance = self.registry().make_instance(type_id)?.instance;
        let plugin = instance.downcast::<ViewerPluginCategory>().ok_or_else(|| {
            VrkitError::PluginInterface(format!(
                "Plug-in type '{}' is a {}, not a viewer plug-in",
                type_id,
                instance.kind()
            ))
        })?;

        lock(&plugin).init(self)?;
        info!(plugin = %instance.info().full_name(), "Initialised viewer plug-in");
        lock(&self.plugins).push(Arc::clone(&plugin));
        Ok(plugin)
    }

    /// The active viewer plug-ins, in initialisation order.
    pub fn plugins(&self) -> Vec<PluginPtr> {
        lock(&self.plugins).clone()
    }

    /// Runs one frame: updates every plug-in in order.
    pub fn update(&self) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        for plugin in self.plugins() {
            lock(&plugin).update(self);
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Shuts every plug-in down, in reverse initialisation order.
    pub fn exit(&self) {
        let plugins: Vec<PluginPtr> = lock(&self.plugins).drain(..).collect();
        for plugin in plugins.iter().rev() {
            lock(plugin).exit(self);
        }
        info!("Viewer shut down");
    }
}

impl fmt::Debug for Viewer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Viewer")
            .field("plugins", &lock(&self.plugins).len())
            .field("frames", &self.frame_count())
            .finish()
    }
}
