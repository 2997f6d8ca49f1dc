//! The mode harness: keeps exactly one mode component active.
//!
//! [`ModeHarnessPlugin`] is a viewer plug-in. At init time it instantiates
//! the configured mode components through the plug-in registry and connects
//! each configured signal to a switch request for one component. Switch
//! requests may come from any thread; they land in a single-slot
//! [`SwitchMailbox`] and are applied at the start of the next frame.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::expand_env_vars;
use crate::error::{Result, VrkitError};
use crate::lock;
use crate::plugins::loader::{default_search_path, find_modules};
use crate::plugins::{register_modules, Info};
use crate::signal::Connection;
use crate::viewer::{Plugin, Viewer};

use super::component::{ComponentPtr, ModeComponentCategory};

/// Configuration element type read by the harness.
pub const ELEMENT_TYPE: &str = "vrkit_mode_harness_plugin";

/// Oldest configuration element version the harness understands.
pub const REQUIRED_CONFIG_VERSION: u32 = 2;

/// Search path subdirectory holding mode component modules.
pub const COMPONENT_SUBDIR: &str = "mode";

/// One mode component to instantiate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    /// Name the component is known by in signal bindings.
    pub name: String,
    /// Type identifier of the plug-in implementing it.
    pub plugin: String,
}

/// Binding of a signal to the component it activates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalConfig {
    pub name: String,
    pub active_component: String,
}

/// The harness configuration element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    pub version: u32,

    /// Extra directories to search for component modules; `$VAR` references
    /// are expanded.
    #[serde(default)]
    pub component_path: Vec<String>,

    #[serde(default)]
    pub default_component: Option<String>,

    #[serde(default)]
    pub components: Vec<ComponentConfig>,

    #[serde(default)]
    pub signals: Vec<SignalConfig>,
}

/// Single-slot hand-off of the next component to activate.
#[derive(Debug, Default)]
pub struct SwitchMailbox {
    next: Mutex<Option<ComponentPtr>>,
}

impl SwitchMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a switch to `component`, replacing any pending request.
    pub fn post(&self, component: ComponentPtr) {
        *lock(&self.next) = Some(component);
    }

    /// Takes the pending request, leaving the mailbox empty.
    pub fn take(&self) -> Option<ComponentPtr> {
        lock(&self.next).take()
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.next).is_some()
    }
}

/// Viewer plug-in that switches between mode components on signals.
pub struct ModeHarnessPlugin {
    info: Info,
    component_info: Vec<ComponentConfig>,
    signal_defs: Vec<SignalConfig>,
    default_component_name: Option<String>,
    components: BTreeMap<String, ComponentPtr>,
    cur_component: Option<ComponentPtr>,
    next_component: Arc<SwitchMailbox>,
    connections: Vec<Connection>,
}

impl ModeHarnessPlugin {
    pub const NAMESPACE: &'static str = "com.infiscape";
    pub const SHORT_NAME: &'static str = "ModeHarnessPlugin";

    /// Identity of the built-in harness plug-in type.
    pub fn plugin_info() -> Result<Info> {
        Info::simple(Self::NAMESPACE, Self::SHORT_NAME, vec![0, 51, 0])
    }

    pub fn new(info: Info) -> Self {
        Self {
            info,
            component_info: Vec::new(),
            signal_defs: Vec::new(),
            default_component_name: None,
            components: BTreeMap::new(),
            cur_component: None,
            next_component: Arc::new(SwitchMailbox::new()),
            connections: Vec::new(),
        }
    }

    /// Applies a configuration element: records the components and signal
    /// bindings, then registers every mode component module found on the
    /// component search path.
    ///
    /// # Errors
    /// `VrkitError::Config` if the element is older than
    /// [`REQUIRED_CONFIG_VERSION`].
    pub fn configure(&mut self, viewer: &Viewer, config: &HarnessConfig) -> Result<()> {
        if config.version < REQUIRED_CONFIG_VERSION {
            return Err(VrkitError::Config(format!(
                "Configuration of {} failed. Required config element version is {}, but the element is version {}",
                Self::SHORT_NAME,
                REQUIRED_CONFIG_VERSION,
                config.version
            )));
        }

        let mut component_path = default_search_path(&[COMPONENT_SUBDIR], viewer.config().search_debug);
        component_path.extend(
            config
                .component_path
                .iter()
                .map(|dir| PathBuf::from(expand_env_vars(dir))),
        );

        self.default_component_name = config
            .default_component
            .clone()
            .filter(|name| !name.is_empty());
        self.component_info.extend(config.components.iter().cloned());
        self.signal_defs.extend(config.signals.iter().cloned());

        let modules = find_modules(&component_path);
        let added = register_modules::<ModeComponentCategory>(&mut viewer.registry(), &modules);
        info!(
            modules = modules.len(),
            registered = added,
            "Registered mode component modules"
        );

        Ok(())
    }

    /// Instantiates `plugin_type` as the component named `name` and
    /// initialises it.
    pub fn make_component(&self, viewer: &Viewer, plugin_type: &str, name: &str) -> Result<ComponentPtr> {
        info!(component = %name, plugin = %plugin_type, "Instantiating mode component");

        let instance = viewer.registry().make_named_instance(plugin_type, name)?.instance;
        let component = instance.downcast::<ModeComponentCategory>().ok_or_else(|| {
            VrkitError::PluginInterface(format!(
                "Plug-in type '{}' is a {}, not a mode component",
                plugin_type,
                instance.kind()
            ))
        })?;

        lock(&component).init(viewer)?;
        Ok(component)
    }

    /// Requests a switch to `component` at the next frame. Safe to call
    /// from any thread.
    pub fn prep_component_switch(&self, component: ComponentPtr) {
        self.next_component.post(component);
    }

    /// The mailbox switch requests are posted to.
    pub fn switch_mailbox(&self) -> Arc<SwitchMailbox> {
        Arc::clone(&self.next_component)
    }

    pub fn current_component(&self) -> Option<ComponentPtr> {
        self.cur_component.clone()
    }

    pub fn component(&self, name: &str) -> Option<ComponentPtr> {
        self.components.get(name).cloned()
    }

    pub fn component_names(&self) -> Vec<&str> {
        self.components.keys().map(String::as_str).collect()
    }

    fn instantiate_components(&mut self, viewer: &Viewer) {
        let component_info = self.component_info.clone();
        for ComponentConfig { name, plugin } in &component_info {
            // A name already known reuses its instance.
            if self.components.contains_key(name) {
                continue;
            }

            match self.make_component(viewer, plugin, name) {
                Ok(component) => {
                    self.components.insert(name.clone(), component);
                }
                Err(e) => {
                    error!(component = %name, error = %e, "Failed to load mode component");
                }
            }
        }
    }

    fn connect_signals(&mut self, viewer: &Viewer) -> Result<()> {
        let repository = viewer.signal_repository();
        let mut registered_signals: Vec<&str> = Vec::new();

        for SignalConfig {
            name: sig_name,
            active_component: comp_name,
        } in &self.signal_defs
        {
            if registered_signals.contains(&sig_name.as_str()) {
                error!(signal = %sig_name, "Component already registered for signal");
                continue;
            }

            let Some(component) = self.components.get(comp_name) else {
                error!(
                    signal = %sig_name,
                    component = %comp_name,
                    "No component to connect to signal"
                );
                continue;
            };

            info!(
                component = %lock(component).description(),
                signal = %sig_name,
                "Connecting mode component to signal"
            );

            let signal = repository.get_or_add_signal::<()>(sig_name)?;
            let mailbox = Arc::clone(&self.next_component);
            let target = Arc::clone(component);
            self.connections
                .push(signal.connect(move |_: &()| mailbox.post(Arc::clone(&target))));

            registered_signals.push(sig_name);
        }

        Ok(())
    }

    fn post_default_component(&self) {
        let default_component = match &self.default_component_name {
            Some(name) => match self.components.get(name) {
                Some(component) => Some(Arc::clone(component)),
                None => {
                    error!(
                        component = %name,
                        "Unknown or invalid component used for default component"
                    );
                    None
                }
            },
            None => None,
        };

        // Activation waits for the first frame so that initialisation of
        // every plug-in has completed.
        match default_component {
            Some(component) => self.next_component.post(component),
            None => warn!("There is no default mode component"),
        }
    }
}

impl Plugin for ModeHarnessPlugin {
    fn info(&self) -> &Info {
        &self.info
    }

    fn description(&self) -> String {
        "Mode Harness".to_string()
    }

    fn init(&mut self, viewer: &Viewer) -> Result<()> {
        if let Some(config) = viewer.configuration().element::<HarnessConfig>(ELEMENT_TYPE)? {
            self.configure(viewer, &config)?;
        }

        self.instantiate_components(viewer);
        self.connect_signals(viewer)?;
        self.post_default_component();
        Ok(())
    }

    fn update(&mut self, viewer: &Viewer) {
        if let Some(next) = self.next_component.take() {
            // Switching to the current component deactivates and
            // reactivates it.
            let released = match &self.cur_component {
                Some(cur) => {
                    let mut cur = lock(cur);
                    info!(component = %cur.description(), "Deactivating mode component");
                    let deactivated = cur.deactivate(viewer);
                    if !deactivated {
                        error!(
                            component = %cur.description(),
                            "Mode component failed to deactivate, dropping switch request"
                        );
                    }
                    deactivated
                }
                None => true,
            };

            // A component that cannot be deactivated stays current, so at
            // most one component is ever active.
            if released {
                let activated = {
                    let mut component = lock(&next);
                    info!(component = %component.description(), "Activating mode component");
                    component.activate(viewer)
                };

                // A component that fails to activate leaves no component active.
                self.cur_component = if activated { Some(next) } else { None };
            }
        }

        if let Some(cur) = &self.cur_component {
            let mut cur = lock(cur);
            if let Err(e) = cur.update(viewer) {
                warn!(component = %cur.description(), error = %e, "Mode component update failed");
            }
        }
    }

    fn exit(&mut self, viewer: &Viewer) {
        for connection in &mut self.connections {
            connection.disconnect();
        }
        self.connections.clear();

        if let Some(cur) = self.cur_component.take() {
            let mut cur = lock(&cur);
            if cur.is_active() {
                cur.deactivate(viewer);
            }
        }
        self.next_component.take();

        for (name, component) in &self.components {
            if let Err(e) = lock(component).exit(viewer) {
                warn!(component = %name, error = %e, "Mode component exit failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::mode::component::testing::Scripted;
    use crate::mode::component::ModeComponent;
    use crate::plugins::{Creator, TypedRegistryEntry};
    use serde_json::json;

    type Log = Arc<Mutex<Vec<String>>>;

    fn register_component(viewer: &Viewer, log: &Log, short_name: &str, fail_activate: bool) {
        register_scripted(viewer, log, short_name, move |scripted| {
            scripted.fail_activate = fail_activate;
        });
    }

    fn register_scripted<F>(viewer: &Viewer, log: &Log, short_name: &str, setup: F)
    where
        F: Fn(&mut Scripted) + Send + Sync + 'static,
    {
        let info = Info::simple("test", short_name, vec![1, 0]).unwrap();
        let log = Arc::clone(log);
        let name = short_name.to_string();
        let creator = Creator::<ModeComponentCategory>::new(move || {
            let mut scripted = Scripted::new(&name, &log);
            setup(&mut scripted);
            ModeComponent::shared(scripted)
        });
        viewer
            .registry()
            .add_entry(Arc::new(TypedRegistryEntry::from_creator(info, creator)));
    }

    fn harness_viewer(element: serde_json::Value) -> Viewer {
        let mut config = AppConfig {
            search_debug: false,
            ..AppConfig::default()
        };
        config.elements.insert(ELEMENT_TYPE.to_string(), element);
        Viewer::new(config)
    }

    fn nav_grab_viewer(log: &Log, grab_fails: bool) -> Viewer {
        let viewer = harness_viewer(json!({
            "version": 2,
            "components": [
                { "name": "Nav", "plugin": "test.Nav" },
                { "name": "Grab", "plugin": "test.Grab" }
            ],
            "signals": [
                { "name": "sigA", "active_component": "Nav" },
                { "name": "sigB", "active_component": "Grab" }
            ]
        }));
        register_component(&viewer, log, "Nav", false);
        register_component(&viewer, log, "Grab", grab_fails);
        viewer
    }

    fn new_harness() -> ModeHarnessPlugin {
        ModeHarnessPlugin::new(ModeHarnessPlugin::plugin_info().unwrap())
    }

    fn is_active(component: &ComponentPtr) -> bool {
        component.lock().unwrap().is_active()
    }

    fn emit(viewer: &Viewer, signal: &str) {
        viewer
            .signal_repository()
            .get_signal::<()>(signal)
            .unwrap()
            .emit(&());
    }

    // ---- configuration ----

    #[test]
    fn test_config_element_deserialises() {
        let config: HarnessConfig = serde_json::from_value(json!({
            "version": 2,
            "component_path": ["$HOME/modes"],
            "default_component": "Nav",
            "components": [{ "name": "Nav", "plugin": "test.Nav" }],
            "signals": [{ "name": "sigA", "active_component": "Nav" }]
        }))
        .unwrap();

        assert_eq!(config.default_component.as_deref(), Some("Nav"));
        assert_eq!(config.components[0].plugin, "test.Nav");
        assert_eq!(config.signals[0].active_component, "Nav");
    }

    #[test]
    fn test_old_config_version_rejected() {
        let viewer = harness_viewer(json!({ "version": 1 }));
        let mut harness = new_harness();
        let err = harness.init(&viewer).unwrap_err();
        assert!(matches!(err, VrkitError::Config(_)));
        assert!(err.to_string().contains("Required config element version is 2"));
    }

    #[test]
    fn test_init_without_config_element() {
        let viewer = Viewer::new(AppConfig::default());
        let mut harness = new_harness();
        harness.init(&viewer).unwrap();
        assert!(harness.component_names().is_empty());
        assert!(!harness.switch_mailbox().is_pending());
    }

    #[test]
    fn test_init_instantiates_and_inits_components() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let viewer = nav_grab_viewer(&log, false);
        let mut harness = new_harness();
        harness.init(&viewer).unwrap();

        assert_eq!(harness.component_names(), vec!["Grab", "Nav"]);
        assert_eq!(*log.lock().unwrap(), vec!["Nav:init", "Grab:init"]);
        assert!(viewer.registry().get_instance_by_name("Nav").is_ok());
        assert!(viewer.signal_repository().has_signal("sigA"));
        assert!(harness.current_component().is_none());
    }

    #[test]
    fn test_unknown_component_plugin_is_skipped() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let viewer = harness_viewer(json!({
            "version": 2,
            "components": [
                { "name": "Nav", "plugin": "test.Nav" },
                { "name": "Fly", "plugin": "test.Missing" }
            ],
            "signals": [
                { "name": "sigF", "active_component": "Fly" }
            ]
        }));
        register_component(&viewer, &log, "Nav", false);

        let mut harness = new_harness();
        harness.init(&viewer).unwrap();
        assert_eq!(harness.component_names(), vec!["Nav"]);
        assert!(!viewer.signal_repository().has_signal("sigF"));
    }

    // ---- switching ----

    #[test]
    fn test_signals_switch_active_component() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let viewer = nav_grab_viewer(&log, false);
        let mut harness = new_harness();
        harness.init(&viewer).unwrap();

        let nav = harness.component("Nav").unwrap();
        let grab = harness.component("Grab").unwrap();

        emit(&viewer, "sigA");
        harness.update(&viewer);
        assert!(Arc::ptr_eq(&harness.current_component().unwrap(), &nav));
        assert!(is_active(&nav));

        emit(&viewer, "sigB");
        harness.update(&viewer);
        assert!(Arc::ptr_eq(&harness.current_component().unwrap(), &grab));
        assert!(!is_active(&nav));
        assert!(is_active(&grab));
    }

    #[test]
    fn test_update_without_switch_updates_current() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let viewer = nav_grab_viewer(&log, false);
        let mut harness = new_harness();
        harness.init(&viewer).unwrap();

        emit(&viewer, "sigA");
        harness.update(&viewer);
        harness.update(&viewer);

        let log = log.lock().unwrap();
        assert_eq!(
            &log[2..],
            ["Nav:activate", "Nav:update", "Nav:update"]
        );
    }

    #[test]
    fn test_switch_to_current_component_reactivates() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let viewer = nav_grab_viewer(&log, false);
        let mut harness = new_harness();
        harness.init(&viewer).unwrap();

        emit(&viewer, "sigA");
        harness.update(&viewer);
        emit(&viewer, "sigA");
        harness.update(&viewer);

        let log = log.lock().unwrap();
        assert_eq!(
            &log[2..],
            [
                "Nav:activate",
                "Nav:update",
                "Nav:deactivate",
                "Nav:activate",
                "Nav:update"
            ]
        );
    }

    #[test]
    fn test_failed_activation_leaves_no_current_component() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let viewer = nav_grab_viewer(&log, true);
        let mut harness = new_harness();
        harness.init(&viewer).unwrap();

        let nav = harness.component("Nav").unwrap();
        let grab = harness.component("Grab").unwrap();

        emit(&viewer, "sigA");
        harness.update(&viewer);
        emit(&viewer, "sigB");
        harness.update(&viewer);

        assert!(harness.current_component().is_none());
        assert!(!is_active(&grab));
        assert!(!is_active(&nav));
    }

    #[test]
    fn test_failed_deactivation_keeps_current_component() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let viewer = harness_viewer(json!({
            "version": 2,
            "components": [
                { "name": "Nav", "plugin": "test.Nav" },
                { "name": "Grab", "plugin": "test.Grab" }
            ],
            "signals": [
                { "name": "sigA", "active_component": "Nav" },
                { "name": "sigB", "active_component": "Grab" }
            ]
        }));
        register_scripted(&viewer, &log, "Nav", |scripted| scripted.fail_deactivate = true);
        register_component(&viewer, &log, "Grab", false);

        let mut harness = new_harness();
        harness.init(&viewer).unwrap();
        let nav = harness.component("Nav").unwrap();
        let grab = harness.component("Grab").unwrap();

        emit(&viewer, "sigA");
        harness.update(&viewer);
        emit(&viewer, "sigB");
        harness.update(&viewer);

        assert!(is_active(&nav));
        assert!(!is_active(&grab));
        assert!(Arc::ptr_eq(&harness.current_component().unwrap(), &nav));
        assert!(!harness.switch_mailbox().is_pending());

        // Nav keeps being driven after the dropped request.
        let log = log.lock().unwrap();
        assert_eq!(log.last().map(String::as_str), Some("Nav:update"));
        assert!(!log.iter().any(|entry| entry == "Grab:activate"));
    }

    #[test]
    fn test_last_request_before_update_wins() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let viewer = nav_grab_viewer(&log, false);
        let mut harness = new_harness();
        harness.init(&viewer).unwrap();

        emit(&viewer, "sigA");
        emit(&viewer, "sigB");
        harness.update(&viewer);

        let grab = harness.component("Grab").unwrap();
        assert!(Arc::ptr_eq(&harness.current_component().unwrap(), &grab));
        assert!(!is_active(&harness.component("Nav").unwrap()));
    }

    #[test]
    fn test_switch_request_from_other_thread() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let viewer = nav_grab_viewer(&log, false);
        let mut harness = new_harness();
        harness.init(&viewer).unwrap();

        let signal = viewer.signal_repository().get_signal::<()>("sigB").unwrap();
        std::thread::spawn(move || signal.emit(&())).join().unwrap();

        harness.update(&viewer);
        assert!(is_active(&harness.component("Grab").unwrap()));
    }

    // ---- defaults and bindings ----

    #[test]
    fn test_default_component_activates_on_first_update() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let viewer = harness_viewer(json!({
            "version": 2,
            "default_component": "Nav",
            "components": [{ "name": "Nav", "plugin": "test.Nav" }]
        }));
        register_component(&viewer, &log, "Nav", false);

        let mut harness = new_harness();
        harness.init(&viewer).unwrap();

        let nav = harness.component("Nav").unwrap();
        assert!(!is_active(&nav));
        harness.update(&viewer);
        assert!(is_active(&nav));
    }

    #[test]
    fn test_unknown_default_component_is_ignored() {
        let viewer = harness_viewer(json!({ "version": 2, "default_component": "Ghost" }));
        let mut harness = new_harness();
        harness.init(&viewer).unwrap();
        assert!(!harness.switch_mailbox().is_pending());
    }

    #[test]
    fn test_signal_binds_only_first_component() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let viewer = harness_viewer(json!({
            "version": 2,
            "components": [
                { "name": "Nav", "plugin": "test.Nav" },
                { "name": "Grab", "plugin": "test.Grab" }
            ],
            "signals": [
                { "name": "sigA", "active_component": "Nav" },
                { "name": "sigA", "active_component": "Grab" },
                { "name": "sigB", "active_component": "Nav" }
            ]
        }));
        register_component(&viewer, &log, "Nav", false);
        register_component(&viewer, &log, "Grab", false);

        let mut harness = new_harness();
        harness.init(&viewer).unwrap();

        let sig_a = viewer.signal_repository().get_signal::<()>("sigA").unwrap();
        assert_eq!(sig_a.num_slots(), 1);

        emit(&viewer, "sigA");
        harness.update(&viewer);
        assert!(is_active(&harness.component("Nav").unwrap()));

        // One component may answer several signals.
        emit(&viewer, "sigB");
        harness.update(&viewer);
        assert!(is_active(&harness.component("Nav").unwrap()));
    }

    // ---- exit ----

    #[test]
    fn test_exit_disconnects_and_exits_components() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let viewer = nav_grab_viewer(&log, false);
        let mut harness = new_harness();
        harness.init(&viewer).unwrap();

        emit(&viewer, "sigA");
        harness.update(&viewer);
        harness.exit(&viewer);

        assert!(harness.current_component().is_none());
        assert!(!is_active(&harness.component("Nav").unwrap()));
        let sig_a = viewer.signal_repository().get_signal::<()>("sigA").unwrap();
        assert_eq!(sig_a.num_slots(), 0);

        let log = log.lock().unwrap();
        assert!(log.contains(&"Nav:deactivate".to_string()));
        assert!(log.contains(&"Nav:exit".to_string()));
        assert!(log.contains(&"Grab:exit".to_string()));
    }

    #[test]
    fn test_mailbox_take_empties() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let mailbox = SwitchMailbox::new();
        mailbox.post(ModeComponent::shared(Scripted::new("Nav", &log)));
        assert!(mailbox.is_pending());
        assert!(mailbox.take().is_some());
        assert!(mailbox.take().is_none());
    }
}
