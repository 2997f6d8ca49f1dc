//! Name-based plug-in factory.
//!
//! A [`PluginFactory`] maps *platform-agnostic* plug-in names (module file
//! names with the extension and debug suffix stripped, e.g. `GrabPlugin`)
//! to module files on a search path. Modules are only opened when a creator
//! is first requested. Creators linked into the host can be registered
//! under a name as well.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Result, VrkitError};

use super::creator::{Creator, PluginCategory};
use super::entry::{validate_module, TypedRegistryEntry};
use super::info::Info;
use super::loader::{BuildVariant, ModuleScanner};
use super::module::Module;
use super::registry::Registry;

/// Factory for plug-ins of category `C`, keyed by platform-agnostic name.
pub struct PluginFactory<C: PluginCategory> {
    scanner: ModuleScanner,
    libraries: BTreeMap<String, PathBuf>,
    loaded: HashMap<String, Arc<Module>>,
    creators: HashMap<String, Arc<TypedRegistryEntry<C>>>,
}

impl<C: PluginCategory> PluginFactory<C> {
    pub fn new() -> Self {
        Self {
            scanner: ModuleScanner::new(),
            libraries: BTreeMap::new(),
            loaded: HashMap::new(),
            creators: HashMap::new(),
        }
    }

    /// Selects which build variant of module files is accepted.
    pub fn with_variant(mut self, variant: BuildVariant) -> Self {
        self.scanner = self.scanner.variant(variant);
        self
    }

    /// Overrides the module file extension (without the leading dot).
    pub fn with_extension(mut self, extension: &str) -> Self {
        self.scanner = self.scanner.extension(extension);
        self
    }

    /// Maps every module file in `search_path` to its platform-agnostic
    /// name. When two files map to the same name, the first one found wins.
    pub fn add_scan_path(&mut self, search_path: &[PathBuf]) {
        for path in self.scanner.candidates(search_path) {
            let Some(name) = self.scanner.platform_agnostic_name(&path) else {
                warn!(path = %path.display(), "Plug-in file name does not follow the naming convention");
                continue;
            };

            if let Some(existing) = self.libraries.get(&name) {
                warn!(
                    plugin = %name,
                    path = %path.display(),
                    existing = %existing.display(),
                    "Plug-in name already mapped, ignoring"
                );
                continue;
            }

            debug!(plugin = %name, path = %path.display(), "Found plug-in module");
            self.libraries.insert(name, path);
        }
    }

    /// All names with a module file or a registered creator, sorted.
    pub fn plugin_names(&self) -> Vec<&str> {
        let names: BTreeSet<&str> = self
            .libraries
            .keys()
            .chain(self.creators.keys())
            .map(String::as_str)
            .collect();
        names.into_iter().collect()
    }

    /// Returns the module mapped to `name`, loading it on first use.
    ///
    /// # Errors
    /// `VrkitError::NoSuchPlugin` if no module is mapped to `name`;
    /// `VrkitError::PluginLoad` if the module cannot be opened.
    pub fn plugin_library(&mut self, name: &str) -> Result<Arc<Module>> {
        if let Some(module) = self.loaded.get(name) {
            return Ok(Arc::clone(module));
        }

        let path = self
            .libraries
            .get(name)
            .ok_or_else(|| VrkitError::NoSuchPlugin(format!("No plug-in named '{}'", name)))?;

        let module = Arc::new(Module::load(path)?);
        self.loaded.insert(name.to_string(), Arc::clone(&module));
        Ok(module)
    }

    /// Registers a creator linked into the host under `name`. Returns false
    /// and keeps the existing creator if `name` is already taken.
    pub fn register_creator(&mut self, name: &str, info: Info, creator: Creator<C>) -> bool {
        if self.creators.contains_key(name) {
            warn!(plugin = %name, "Creator already registered, ignoring");
            return false;
        }
        self.creators.insert(
            name.to_string(),
            Arc::new(TypedRegistryEntry::from_creator(info, creator)),
        );
        true
    }

    /// Returns the creator for `name`: a registered one, or the creator
    /// exported by the module mapped to `name` after validating it.
    pub fn plugin_creator(&mut self, name: &str) -> Result<Arc<TypedRegistryEntry<C>>> {
        if let Some(entry) = self.creators.get(name) {
            return Ok(Arc::clone(entry));
        }

        let module = self.plugin_library(name)?;
        let entry = Arc::new(TypedRegistryEntry::<C>::from_module(
            module,
            validate_module::<C>,
        )?);
        self.creators.insert(name.to_string(), Arc::clone(&entry));
        Ok(entry)
    }

    /// Adds the creator for every known name to `registry`. Names whose
    /// module is unusable are logged and skipped. Returns the number added.
    pub fn register_all(&mut self, registry: &mut Registry) -> usize {
        let names: Vec<String> = self.plugin_names().into_iter().map(String::from).collect();
        let mut added = 0;

        for name in names {
            match self.plugin_creator(&name) {
                Ok(entry) => {
                    if registry.add_entry(entry) {
                        added += 1;
                    }
                }
                Err(e) => {
                    warn!(plugin = %name, error = %e, "Skipping plug-in");
                }
            }
        }

        added
    }
}

impl<C: PluginCategory> Default for PluginFactory<C> {
    fn default() -> Self {
        Self::new()
    }
}
