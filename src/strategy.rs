//! Strategy plug-in categories used by object grabbing.
//!
//! Grabbing is split into three pluggable decisions: how intersected objects
//! are found, when a grab starts and ends, and how grabbed objects move.
//! Each is its own plug-in category with its own creator entry point, so a
//! module built for one cannot be registered as another. All three share the
//! [`Strategy`] lifecycle.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::error::{Result, VrkitError};
use crate::lock;
use crate::plugins::{
    find_modules, validate_module, Info, PluginCategory, PluginKind, Registry, RegistryEntry,
    TypedInitRegistryEntry, TypedRegistryEntry,
};

/// Lifecycle shared by every strategy.
pub trait Strategy: Send {
    fn info(&self) -> &Info;

    fn description(&self) -> String {
        self.info().name().to_string()
    }

    /// Prepares a freshly created strategy. Run by the registry entry
    /// before the strategy is handed out.
    fn init(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Shared handle to a strategy.
pub type StrategyPtr = Arc<Mutex<dyn Strategy>>;

macro_rules! strategy_category {
    ($(#[$meta:meta])* $name:ident, $kind:ident, $creator:literal) => {
        $(#[$meta])*
        pub struct $name;

        impl PluginCategory for $name {
            type Handle = StrategyPtr;
            const KIND: PluginKind = PluginKind::$kind;
            const CREATOR_FUNC_NAME: &'static str = $creator;
            const VERSION_FUNC_NAME: &'static str = "getPluginInterfaceVersion";
            const API_MAJOR: u32 = 2;
            const API_MINOR: u32 = 1;
        }
    };
}

strategy_category!(
    /// Moves grabbed objects.
    MoveStrategyCategory,
    MoveStrategy,
    "getMoveStrategyCreator"
);
strategy_category!(
    /// Finds the object under the pointer.
    IntersectionStrategyCategory,
    IntersectionStrategy,
    "getIntersectionStrategyCreator"
);
strategy_category!(
    /// Decides when grabbing starts and ends.
    GrabStrategyCategory,
    GrabStrategy,
    "getGrabStrategyCreator"
);

/// Wraps `entry` so that every strategy it creates is initialised first.
pub fn strategy_entry<C>(entry: TypedRegistryEntry<C>) -> TypedInitRegistryEntry<C>
where
    C: PluginCategory<Handle = StrategyPtr>,
{
    TypedInitRegistryEntry::new(entry, |strategy: &StrategyPtr| lock(strategy).init())
}

/// Registers every strategy module of category `C` found in `search_path`.
/// Unusable modules are logged and skipped. Returns the number added.
pub fn register_strategies<C>(registry: &mut Registry, search_path: &[PathBuf]) -> usize
where
    C: PluginCategory<Handle = StrategyPtr>,
{
    let mut added = 0;
    for module in find_modules(search_path) {
        match TypedRegistryEntry::<C>::from_module(Arc::clone(&module), validate_module::<C>) {
            Ok(entry) => {
                let entry: Arc<dyn RegistryEntry> = Arc::new(strategy_entry(entry));
                if registry.add_entry(entry) {
                    added += 1;
                }
            }
            Err(e) => {
                warn!(module = %module.name(), kind = %C::KIND, error = %e, "Skipping strategy module");
            }
        }
    }
    added
}

/// Instantiates the strategy `type_id` of category `C`.
pub fn make_strategy<C>(registry: &mut Registry, type_id: &str) -> Result<StrategyPtr>
where
    C: PluginCategory<Handle = StrategyPtr>,
{
    let instance = registry.make_instance(type_id)?.instance;
    instance.downcast::<C>().ok_or_else(|| {
        VrkitError::PluginInterface(format!(
            "Plug-in type '{}' is a {}, not a {}",
            type_id,
            instance.kind(),
            C::KIND
        ))
    })
}
