//! Registry entries: one per known plug-in type.
//!
//! An entry knows the [`Info`] of its type and how to create instances,
//! either through the creator entry point of a loaded [`Module`] or through
//! a creator linked into the host.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Result, VrkitError};

use super::creator::{Creator, CreatorFn, PluginCategory, PluginInstance};
use super::info::Info;
use super::module::{Module, ABI_VERSION, INFO_FUNC_NAME};
use super::registry::Registry;

/// The registry's handle for creating instances of one plug-in type.
pub trait RegistryEntry: Send + Sync {
    fn info(&self) -> &Info;

    /// The module the creator came from, if it was loaded dynamically.
    fn module(&self) -> Option<Arc<Module>>;

    /// Constructs a new instance of the plug-in type.
    fn create(&self) -> Result<PluginInstance>;
}

enum CreatorSource<C: PluginCategory> {
    /// Creator accessor resolved from a module. The module is held by the
    /// entry, so the function stays mapped.
    Dynamic(CreatorFn),
    Static(Creator<C>),
}

/// A registry entry for plug-ins of category `C`.
pub struct TypedRegistryEntry<C: PluginCategory> {
    info: Arc<Info>,
    module: Option<Arc<Module>>,
    source: CreatorSource<C>,
}

impl<C: PluginCategory> TypedRegistryEntry<C> {
    /// Builds an entry from a loaded module.
    ///
    /// `validator` runs first; then the module's identity is read and its
    /// `C::CREATOR_FUNC_NAME` entry point is looked up and checked to
    /// return a creator of category `C`.
    ///
    /// # Errors
    /// `VrkitError::PluginInterface` if validation fails or an entry point
    /// is missing or returns the wrong kind of creator.
    pub fn from_module<V>(module: Arc<Module>, validator: V) -> Result<Self>
    where
        V: FnOnce(&Module) -> Result<bool>,
    {
        if !validator(&module)? {
            return Err(VrkitError::PluginInterface(format!(
                "Plug-in '{}' failed validation as a {}",
                module.name(),
                C::KIND
            )));
        }

        let info = module.plugin_info()?;

        // SAFETY: the creator accessor is part of the plug-in ABI and has
        // the `CreatorFn` signature.
        let creator_fn: CreatorFn = unsafe { module.get_function(C::CREATOR_FUNC_NAME)? };

        // Resolve once now so a creator of the wrong category is rejected at
        // registration rather than at first use.
        resolve_creator::<C>(creator_fn, module.name())?;

        debug!(plugin = %info.full_name(), module = %module.name(), "Built registry entry");

        Ok(Self {
            info: Arc::new(info),
            module: Some(module),
            source: CreatorSource::Dynamic(creator_fn),
        })
    }

    /// Builds an entry from a creator linked into the host.
    pub fn from_creator(info: Info, creator: Creator<C>) -> Self {
        Self {
            info: Arc::new(info),
            module: None,
            source: CreatorSource::Static(creator),
        }
    }

    /// Creates a new typed handle without wrapping it.
    pub fn create_handle(&self) -> Result<C::Handle> {
        match &self.source {
            CreatorSource::Static(creator) => Ok(creator.create()),
            CreatorSource::Dynamic(creator_fn) => {
                let name = self.module.as_ref().map(|m| m.name()).unwrap_or("<unknown>");
                Ok(resolve_creator::<C>(*creator_fn, name)?.create())
            }
        }
    }

    fn info_arc(&self) -> Arc<Info> {
        Arc::clone(&self.info)
    }
}

impl<C: PluginCategory> RegistryEntry for TypedRegistryEntry<C> {
    fn info(&self) -> &Info {
        &self.info
    }

    fn module(&self) -> Option<Arc<Module>> {
        self.module.clone()
    }

    fn create(&self) -> Result<PluginInstance> {
        let handle = self.create_handle()?;
        Ok(PluginInstance::new::<C>(self.info_arc(), handle))
    }
}

impl<C: PluginCategory> fmt::Debug for TypedRegistryEntry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedRegistryEntry")
            .field("type", &self.info.full_name())
            .field("kind", &C::KIND)
            .field("module", &self.module.as_ref().map(|m| m.name().to_string()))
            .finish()
    }
}

type InitFn<C> = Box<dyn Fn(&<C as PluginCategory>::Handle) -> Result<()> + Send + Sync>;

/// A typed entry that runs an initialisation step on every object it
/// creates before handing it out.
pub struct TypedInitRegistryEntry<C: PluginCategory> {
    inner: TypedRegistryEntry<C>,
    init: InitFn<C>,
}

impl<C: PluginCategory> TypedInitRegistryEntry<C> {
    pub fn new<F>(inner: TypedRegistryEntry<C>, init: F) -> Self
    where
        F: Fn(&C::Handle) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            inner,
            init: Box::new(init),
        }
    }
}

impl<C: PluginCategory> RegistryEntry for TypedInitRegistryEntry<C> {
    fn info(&self) -> &Info {
        self.inner.info()
    }

    fn module(&self) -> Option<Arc<Module>> {
        self.inner.module()
    }

    fn create(&self) -> Result<PluginInstance> {
        let handle = self.inner.create_handle()?;
        (self.init)(&handle)?;
        Ok(PluginInstance::new::<C>(self.inner.info_arc(), handle))
    }
}

fn resolve_creator<'a, C: PluginCategory>(
    creator_fn: CreatorFn,
    module_name: &str,
) -> Result<&'a Creator<C>> {
    // SAFETY: the accessor returns a pointer to static data in the module,
    // which the calling entry keeps loaded.
    let base = unsafe { creator_fn().as_ref() }.ok_or_else(|| {
        VrkitError::PluginInterface(format!(
            "Plug-in '{}' returned no creator from {}",
            module_name,
            C::CREATOR_FUNC_NAME
        ))
    })?;
    base.downcast::<C>()
}

/// Checks that `module` is a plug-in of category `C` compatible with this
/// host: it must export `getPluginInfo`, carry the host's [`ABI_VERSION`]
/// tag, export the category's interface version function and report the
/// host's major interface version.
///
/// # Errors
/// `VrkitError::PluginInterface` describing the first failed check.
pub fn validate_module<C: PluginCategory>(module: &Module) -> Result<bool> {
    if !module.has_symbol(INFO_FUNC_NAME) {
        return Err(VrkitError::PluginInterface(format!(
            "Plug-in '{}' has no entry point function named {}",
            module.name(),
            INFO_FUNC_NAME
        )));
    }

    let abi = module.abi_version()?;
    if abi != ABI_VERSION {
        return Err(VrkitError::PluginInterface(format!(
            "Plug-in '{}' was built for {} but the host is {}",
            module.name(),
            abi,
            ABI_VERSION
        )));
    }

    let (major, minor) = module.interface_version(C::VERSION_FUNC_NAME)?;

    if major != C::API_MAJOR {
        return Err(VrkitError::PluginInterface(format!(
            "Interface version mismatch: run-time does not match compile-time plug-in setting ({}.{} != {}.{})",
            C::API_MAJOR,
            C::API_MINOR,
            major,
            minor
        )));
    }

    Ok(true)
}

/// Builds a validated entry of category `C` for every module and adds it
/// to `registry`. Modules that are not usable as `C` are logged and
/// skipped. Returns the number of entries added.
pub fn register_modules<C: PluginCategory>(registry: &mut Registry, modules: &[Arc<Module>]) -> usize {
    let mut added = 0;

    for module in modules {
        match TypedRegistryEntry::<C>::from_module(Arc::clone(module), validate_module::<C>) {
            Ok(entry) => {
                if registry.add_entry(Arc::new(entry)) {
                    added += 1;
                }
            }
            Err(e) => {
                warn!(
                    module = %module.name(),
                    kind = %C::KIND,
                    error = %e,
                    "Skipping plug-in module"
                );
            }
        }
    }

    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::creator::PluginKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Widget;
    impl PluginCategory for Widget {
        type Handle = Arc<Mutex<Vec<String>>>;
        const KIND: PluginKind = PluginKind::Plugin;
        const CREATOR_FUNC_NAME: &'static str = "getCreator";
        const VERSION_FUNC_NAME: &'static str = "getPluginInterfaceVersion";
        const API_MAJOR: u32 = 1;
        const API_MINOR: u32 = 0;
    }

    fn widget_entry() -> TypedRegistryEntry<Widget> {
        let info = Info::simple("test", "Widget", vec![1, 0]).unwrap();
        TypedRegistryEntry::from_creator(info, Creator::new(|| Arc::new(Mutex::new(Vec::new()))))
    }

    // ---- static entries ----

    #[test]
    fn test_static_entry_creates_instances() {
        let entry = widget_entry();
        assert_eq!(entry.info().full_name(), "test.Widget:1.0");
        assert!(entry.module().is_none());

        let a = entry.create().unwrap();
        let b = entry.create().unwrap();
        assert!(!a.ptr_eq(&b));
        assert_eq!(a.info().full_name(), "test.Widget:1.0");
        assert!(a.downcast::<Widget>().is_some());
    }

    // ---- init entries ----

    #[test]
    fn test_init_entry_runs_init_on_each_create() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let entry = TypedInitRegistryEntry::new(widget_entry(), move |handle: &Arc<Mutex<Vec<String>>>| {
            counter.fetch_add(1, Ordering::SeqCst);
            handle.lock().unwrap().push("initialised".to_string());
            Ok(())
        });

        let instance = entry.create().unwrap();
        entry.create().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let handle = instance.downcast::<Widget>().unwrap();
        assert_eq!(handle.lock().unwrap().as_slice(), ["initialised"]);
    }

    #[test]
    fn test_init_entry_propagates_init_error() {
        let entry = TypedInitRegistryEntry::new(widget_entry(), |_: &Arc<Mutex<Vec<String>>>| {
            Err(VrkitError::Config("no viewer".to_string()))
        });
        assert!(matches!(entry.create(), Err(VrkitError::Config(_))));
    }

    // ---- dynamic entries ----

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    fn system_library() -> Arc<Module> {
        Arc::new(Module::load("libc.so.6").unwrap())
    }

    #[test]
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    fn test_validate_module_requires_info_entry_point() {
        let err = validate_module::<Widget>(&system_library()).unwrap_err();
        assert!(matches!(err, VrkitError::PluginInterface(_)));
        assert!(err
            .to_string()
            .contains("has no entry point function named getPluginInfo"));
    }

    #[test]
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    fn test_from_module_rejected_by_validator() {
        let err = TypedRegistryEntry::<Widget>::from_module(system_library(), |_| Ok(false))
            .unwrap_err();
        assert!(matches!(err, VrkitError::PluginInterface(_)));
        assert!(err.to_string().contains("failed validation as a plug-in"));
    }

    #[test]
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    fn test_from_module_propagates_validator_error() {
        let result = TypedRegistryEntry::<Widget>::from_module(system_library(), validate_module::<Widget>);
        assert!(matches!(result, Err(VrkitError::PluginInterface(_))));
    }

    #[test]
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    fn test_register_modules_skips_non_plugins() {
        let mut registry = Registry::new();
        assert_eq!(register_modules::<Widget>(&mut registry, &[system_library()]), 0);
        assert!(registry.entries().is_empty());
    }

    #[test]
    fn test_register_modules_with_nothing_found() {
        let mut registry = Registry::new();
        assert_eq!(register_modules::<Widget>(&mut registry, &[]), 0);
        assert!(registry.entries().is_empty());
    }
}
