//! Mode components: mutually exclusive behaviour modes.
//!
//! A plug-in implements the [`Component`] hooks. The host wraps the
//! behaviour in a [`ModeComponent`], which owns the active flag and runs the
//! hooks as part of its `activate`/`deactivate`/`exit` transitions. A hook
//! that fails turns into a `false` result at the transition boundary, so a
//! misbehaving component cannot take the frame loop down with it.

use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::{error, info, warn};

use crate::error::Result;
use crate::plugins::{Info, PluginCategory, PluginKind};
use crate::viewer::Viewer;

/// Behaviour hooks of a mode component.
pub trait Component: Send {
    fn info(&self) -> &Info;

    /// Human-readable description used in log output.
    fn description(&self) -> String {
        self.info().name().to_string()
    }

    /// Prepares the component for use. Called once, before any activation.
    fn init(&mut self, _viewer: &Viewer) -> Result<()> {
        Ok(())
    }

    fn do_activate(&mut self, viewer: &Viewer) -> Result<()>;

    fn do_deactivate(&mut self, viewer: &Viewer) -> Result<()>;

    /// Per-frame work while the component is active.
    fn update(&mut self, viewer: &Viewer) -> Result<()>;

    fn do_exit(&mut self, _viewer: &Viewer) -> Result<()> {
        Ok(())
    }
}

/// A mode component instance: behaviour plus activation state.
pub struct ModeComponent {
    behaviour: Box<dyn Component>,
    active: bool,
}

/// Shared handle to a mode component.
pub type ComponentPtr = Arc<Mutex<ModeComponent>>;

impl ModeComponent {
    pub fn new<B: Component + 'static>(behaviour: B) -> Self {
        Self {
            behaviour: Box::new(behaviour),
            active: false,
        }
    }

    /// Wraps `behaviour` in a new shared, inactive component.
    pub fn shared<B: Component + 'static>(behaviour: B) -> ComponentPtr {
        Arc::new(Mutex::new(Self::new(behaviour)))
    }

    pub fn info(&self) -> &Info {
        self.behaviour.info()
    }

    pub fn description(&self) -> String {
        self.behaviour.description()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn behaviour(&self) -> &dyn Component {
        self.behaviour.as_ref()
    }

    pub fn init(&mut self, viewer: &Viewer) -> Result<()> {
        self.behaviour.init(viewer)
    }

    /// Activates the component. Returns whether it is active afterwards.
    pub fn activate(&mut self, viewer: &Viewer) -> bool {
        match self.behaviour.do_activate(viewer) {
            Ok(()) => {
                self.active = true;
                info!(component = %self.description(), "Activated mode component");
            }
            Err(e) => {
                error!(
                    component = %self.description(),
                    error = %e,
                    "Failed to activate mode component"
                );
            }
        }
        self.active
    }

    /// Deactivates the component. Returns whether it is inactive afterwards.
    pub fn deactivate(&mut self, viewer: &Viewer) -> bool {
        if !self.active {
            warn!(component = %self.description(), "Cannot deactivate an inactive component");
            return true;
        }

        match self.behaviour.do_deactivate(viewer) {
            Ok(()) => {
                self.active = false;
                info!(component = %self.description(), "Deactivated mode component");
            }
            Err(e) => {
                error!(
                    component = %self.description(),
                    error = %e,
                    "Failed to deactivate mode component"
                );
            }
        }
        !self.active
    }

    pub fn update(&mut self, viewer: &Viewer) -> Result<()> {
        self.behaviour.update(viewer)
    }

    /// Shuts the component down, deactivating it first if needed.
    pub fn exit(&mut self, viewer: &Viewer) -> Result<()> {
        if self.active && !self.deactivate(viewer) {
            warn!(
                component = %self.description(),
                "Component deactivation failed before exiting"
            );
        }
        self.behaviour.do_exit(viewer)
    }
}

impl fmt::Debug for ModeComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModeComponent")
            .field("type", &self.info().full_name())
            .field("active", &self.active)
            .finish()
    }
}

/// Plug-in category of mode components.
pub struct ModeComponentCategory;

impl PluginCategory for ModeComponentCategory {
    type Handle = ComponentPtr;
    const KIND: PluginKind = PluginKind::ModeComponent;
    const CREATOR_FUNC_NAME: &'static str = "getCreator";
    const VERSION_FUNC_NAME: &'static str = "getComponentInterfaceVersion";
    const API_MAJOR: u32 = 2;
    const API_MINOR: u32 = 1;
}


#[cfg(test)]
mod tests {
    use super::testing::Scripted;
    use super::*;
    use crate::config::AppConfig;

    fn setup(name: &str) -> (Viewer, Arc<Mutex<Vec<String>>>, Scripted) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let scripted = Scripted::new(name, &log);
        (Viewer::new(AppConfig::default()), log, scripted)
    }

    // ---- activation ----

    #[test]
    fn test_starts_inactive() {
        let (_viewer, _log, scripted) = setup("Nav");
        let component = ModeComponent::new(scripted);
        assert!(!component.is_active());
        assert_eq!(component.description(), "test.Nav");
    }

    #[test]
    fn test_activate_and_deactivate() {
        let (viewer, log, scripted) = setup("Nav");
        let mut component = ModeComponent::new(scripted);

        assert!(component.activate(&viewer));
        assert!(component.is_active());
        assert!(component.deactivate(&viewer));
        assert!(!component.is_active());
        assert_eq!(*log.lock().unwrap(), vec!["Nav:activate", "Nav:deactivate"]);
    }

    #[test]
    fn test_failed_activation_stays_inactive() {
        let (viewer, _log, mut scripted) = setup("Nav");
        scripted.fail_activate = true;
        let mut component = ModeComponent::new(scripted);

        assert!(!component.activate(&viewer));
        assert!(!component.is_active());
    }

    #[test]
    fn test_failed_deactivation_stays_active() {
        let (viewer, _log, mut scripted) = setup("Nav");
        scripted.fail_deactivate = true;
        let mut component = ModeComponent::new(scripted);

        component.activate(&viewer);
        assert!(!component.deactivate(&viewer));
        assert!(component.is_active());
    }

    #[test]
    fn test_deactivate_inactive_skips_hook() {
        let (viewer, log, scripted) = setup("Nav");
        let mut component = ModeComponent::new(scripted);
        assert!(component.deactivate(&viewer));
        assert!(log.lock().unwrap().is_empty());
    }

    // ---- exit ----

    #[test]
    fn test_exit_deactivates_active_component() {
        let (viewer, log, scripted) = setup("Grab");
        let mut component = ModeComponent::new(scripted);

        component.activate(&viewer);
        component.exit(&viewer).unwrap();

        assert!(!component.is_active());
        assert_eq!(
            *log.lock().unwrap(),
            vec!["Grab:activate", "Grab:deactivate", "Grab:exit"]
        );
    }

    #[test]
    fn test_exit_inactive_component_only_exits() {
        let (viewer, log, scripted) = setup("Grab");
        let mut component = ModeComponent::new(scripted);
        component.exit(&viewer).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["Grab:exit"]);
    }

    #[test]
    fn test_exit_after_failed_deactivation_still_exits() {
        let (viewer, log, mut scripted) = setup("Grab");
        scripted.fail_deactivate = true;
        let mut component = ModeComponent::new(scripted);

        component.activate(&viewer);
        component.exit(&viewer).unwrap();
        assert_eq!(log.lock().unwrap().last().map(String::as_str), Some("Grab:exit"));
    }
}
