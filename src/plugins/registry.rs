//! Plug-in registry for vrkit
//!
//! The [`Registry`] is the central catalog of plug-in types. It maps full
//! names to [`RegistryEntry`] objects, resolves dependency graphs and keeps
//! track of everything it has instantiated:
//!
//! - *entries*: every known plug-in type, keyed by full name
//! - *instantiated*: instances created through the registry, keyed by the
//!   full name of their type (several may share a key)
//! - *named instances*: instances created under a caller-supplied name
//!
//! A type identifier given to a lookup may be a full name or a bare name
//! (optionally with a partial version, as in `ns.A:1`). A bare name selects
//! the newest registered version, compared numerically.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{Result, VrkitError};
use crate::signal::Signal;

use super::creator::PluginInstance;
use super::entry::RegistryEntry;
use super::info::Info;
use super::module::Module;

/// Result of a creation request: the requested instance and the
/// dependencies that were created for it, in creation order.
#[derive(Debug, Clone)]
pub struct Instantiation {
    pub instance: PluginInstance,
    pub dependencies: Vec<PluginInstance>,
}

/// Central catalog of plug-in types and instances.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use vrkit::plugins::{Creator, Info, PluginCategory, PluginKind, Registry, TypedRegistryEntry};
///
/// struct Greeter;
/// impl PluginCategory for Greeter {
///     type Handle = Arc<String>;
///     const KIND: PluginKind = PluginKind::Plugin;
///     const CREATOR_FUNC_NAME: &'static str = "getCreator";
///     const VERSION_FUNC_NAME: &'static str = "getPluginInterfaceVersion";
///     const API_MAJOR: u32 = 1;
///     const API_MINOR: u32 = 0;
/// }
///
/// let mut registry = Registry::new();
/// let info = Info::simple("com.example", "Greeter", vec![1, 0]).unwrap();
/// let creator = Creator::<Greeter>::new(|| Arc::new("hello".to_string()));
/// registry.add_entry(Arc::new(TypedRegistryEntry::from_creator(info, creator)));
///
/// let result = registry.make_instance("com.example.Greeter").unwrap();
/// assert_eq!(result.instance.info().full_name(), "com.example.Greeter:1.0");
/// assert!(registry.get_instance_by_type("com.example.Greeter").is_ok());
/// ```
pub struct Registry {
    entries: BTreeMap<String, Arc<dyn RegistryEntry>>,
    instantiated: BTreeMap<String, Vec<PluginInstance>>,
    named_instances: HashMap<String, PluginInstance>,
    plugin_instantiated: Signal<PluginInstance>,
    module_registered: Signal<(Info, Option<Arc<Module>>)>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            instantiated: BTreeMap::new(),
            named_instances: HashMap::new(),
            plugin_instantiated: Signal::new(),
            module_registered: Signal::new(),
        }
    }

    /// Emitted for every object the registry creates.
    pub fn plugin_instantiated(&self) -> &Signal<PluginInstance> {
        &self.plugin_instantiated
    }

    /// Emitted for every entry added, with the module it came from.
    pub fn module_registered(&self) -> &Signal<(Info, Option<Arc<Module>>)> {
        &self.module_registered
    }

    /// Registers `entry` under its full name.
    ///
    /// Returns `false` without changing anything if an entry with the same
    /// full name is already registered.
    pub fn add_entry(&mut self, entry: Arc<dyn RegistryEntry>) -> bool {
        let full_name = entry.info().full_name().to_string();

        if self.entries.contains_key(&full_name) {
            debug!(plugin = %full_name, "Plug-in type already registered, ignoring");
            return false;
        }

        info!(plugin = %full_name, "Registered plug-in type");
        let notification = (entry.info().clone(), entry.module());
        self.entries.insert(full_name, entry);
        self.module_registered.emit(&notification);
        true
    }

    /// Returns true if `type_id` resolves to a registered entry.
    pub fn has_entry(&self, type_id: &str) -> bool {
        self.find_entry(type_id).is_some()
    }

    /// Identities of all registered entries, ordered by full name.
    pub fn entries(&self) -> Vec<&Info> {
        self.entries.values().map(|e| e.info()).collect()
    }

    /// Full names of all instantiated types.
    pub fn instantiated_names(&self) -> Vec<&str> {
        self.instantiated.keys().map(String::as_str).collect()
    }

    /// Every instance recorded under the exact full name `full_name`.
    pub fn instances_of(&self, full_name: &str) -> &[PluginInstance] {
        self.instantiated
            .get(full_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Resolves `type_id` to an entry: an exact full-name match, otherwise
    /// the newest matching version.
    pub fn find_entry(&self, type_id: &str) -> Option<Arc<dyn RegistryEntry>> {
        if let Some(entry) = self.entries.get(type_id) {
            return Some(Arc::clone(entry));
        }
        self.find_newest_version_entry(type_id)
    }

    /// The newest registered entry whose name and version prefix match
    /// `type_id`.
    pub fn find_newest_version_entry(&self, type_id: &str) -> Option<Arc<dyn RegistryEntry>> {
        let query = TypeQuery::parse(type_id);
        self.entries
            .values()
            .filter(|e| query.matches(e.info()))
            .max_by(|a, b| a.info().cmp_newest(b.info()))
            .map(Arc::clone)
    }

    /// The newest instantiated type matching `type_id`; returns the first
    /// instance recorded for it.
    pub fn find_newest_version_instance(&self, type_id: &str) -> Option<PluginInstance> {
        let query = TypeQuery::parse(type_id);
        self.instantiated
            .values()
            .filter_map(|instances| instances.first())
            .filter(|i| query.matches(i.info()))
            .max_by(|a, b| a.info().cmp_newest(b.info()))
            .cloned()
    }

    fn find_instance(&self, type_id: &str) -> Option<PluginInstance> {
        if let Some(instance) = self.instantiated.get(type_id).and_then(|v| v.first()) {
            return Some(instance.clone());
        }
        self.find_newest_version_instance(type_id)
    }

    /// Returns an instance of the type identified by `type_id`.
    ///
    /// # Errors
    /// `VrkitError::NotInstantiated` if no matching instance exists.
    pub fn get_instance_by_type(&self, type_id: &str) -> Result<PluginInstance> {
        self.find_instance(type_id)
            .ok_or_else(|| VrkitError::NotInstantiated(type_id.to_string()))
    }

    /// Returns the instance of exactly the type described by `info`.
    pub fn get_instance_by_info(&self, info: &Info) -> Result<PluginInstance> {
        self.instantiated
            .get(info.full_name())
            .and_then(|v| v.first())
            .cloned()
            .ok_or_else(|| VrkitError::NotInstantiated(info.full_name().to_string()))
    }

    /// Returns the instance created under `name` by
    /// [`make_named_instance`](Self::make_named_instance).
    pub fn get_instance_by_name(&self, name: &str) -> Result<PluginInstance> {
        self.named_instances
            .get(name)
            .cloned()
            .ok_or_else(|| VrkitError::NotInstantiated(format!("instance named '{}'", name)))
    }

    /// Instantiates the type identified by `type_id` after instantiating
    /// everything it depends on.
    ///
    /// If the resolved type is already instantiated, the existing instance
    /// is returned and nothing is created. Dependencies created before a
    /// failure stay registered.
    ///
    /// # Errors
    /// - `VrkitError::NoSuchPlugin` if `type_id` resolves to no entry
    /// - `VrkitError::MissingDependency` / `DependencyFailed` if the
    ///   dependency closure cannot be satisfied
    /// - `VrkitError::CircularDependency` if the dependency graph has a cycle
    pub fn make_instance(&mut self, type_id: &str) -> Result<Instantiation> {
        let entry = self.entry_for(type_id)?;

        if let Some(existing) = self.instantiated.get(entry.info().full_name()).and_then(|v| v.first()) {
            debug!(plugin = %entry.info().full_name(), "Returning existing instance");
            return Ok(Instantiation {
                instance: existing.clone(),
                dependencies: Vec::new(),
            });
        }

        let mut dependencies = Vec::new();
        self.satisfy_deps(&entry, &mut Vec::new(), &mut dependencies)?;

        let instance = entry.create()?;
        self.record_instance(&instance);

        Ok(Instantiation {
            instance,
            dependencies,
        })
    }

    /// Creates a new instance of the type identified by `type_id` and
    /// records it under `instance_name`, so that several instances of one
    /// type can coexist. Dependencies are resolved as in
    /// [`make_instance`](Self::make_instance).
    pub fn make_named_instance(&mut self, type_id: &str, instance_name: &str) -> Result<Instantiation> {
        let entry = self.entry_for(type_id)?;

        let mut dependencies = Vec::new();
        self.satisfy_deps(&entry, &mut Vec::new(), &mut dependencies)?;

        let instance = entry.create()?;
        self.record_instance(&instance);

        if let Some(previous) = self
            .named_instances
            .insert(instance_name.to_string(), instance.clone())
        {
            warn!(
                instance = %instance_name,
                previous = %previous.info().full_name(),
                "Replaced named plug-in instance"
            );
        }

        Ok(Instantiation {
            instance,
            dependencies,
        })
    }

    fn entry_for(&self, type_id: &str) -> Result<Arc<dyn RegistryEntry>> {
        self.find_entry(type_id).ok_or_else(|| {
            VrkitError::NoSuchPlugin(format!("No registry entry for {}", type_id))
        })
    }

    fn record_instance(&mut self, instance: &PluginInstance) {
        let full_name = instance.info().full_name().to_string();
        info!(plugin = %full_name, "Instantiated plug-in");
        self.instantiated
            .entry(full_name)
            .or_default()
            .push(instance.clone());
        self.plugin_instantiated.emit(instance);
    }

    /// Instantiates every not-yet-instantiated dependency of `entry`,
    /// depth first. `in_progress` holds the full names of the entries whose
    /// dependencies are currently being satisfied.
    fn satisfy_deps(
        &mut self,
        entry: &Arc<dyn RegistryEntry>,
        in_progress: &mut Vec<String>,
        created: &mut Vec<PluginInstance>,
    ) -> Result<()> {
        let requester = entry.info().full_name().to_string();
        in_progress.push(requester.clone());

        let mut pending: Vec<Arc<dyn RegistryEntry>> = Vec::new();
        for dep in entry.info().dependencies() {
            if self.find_instance(dep).is_some() {
                continue;
            }

            let dep_entry = self.find_entry(dep).ok_or_else(|| VrkitError::MissingDependency {
                requester: requester.clone(),
                dependency: dep.clone(),
            })?;
            let dep_name = dep_entry.info().full_name();

            if let Some(start) = in_progress.iter().position(|n| n == dep_name) {
                let mut cycle: Vec<&str> = in_progress[start..].iter().map(String::as_str).collect();
                cycle.push(dep_name);
                return Err(VrkitError::CircularDependency(cycle.join(" -> ")));
            }

            if !pending.iter().any(|p| p.info().full_name() == dep_name) {
                pending.push(dep_entry);
            }
        }

        for dep_entry in order_by_dependency(pending) {
            let dep_name = dep_entry.info().full_name().to_string();

            // An earlier sibling may have pulled this one in already.
            if self.instantiated.contains_key(&dep_name) {
                continue;
            }

            self.satisfy_deps(&dep_entry, in_progress, created)
                .map_err(|e| chain_failure(e, &dep_name, &requester))?;

            let instance = dep_entry
                .create()
                .map_err(|e| chain_failure(e, &dep_name, &requester))?;
            self.record_instance(&instance);
            created.push(instance);
        }

        in_progress.pop();
        Ok(())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("entries", &self.entries.keys().collect::<Vec<_>>())
            .field("instantiated", &self.instantiated.keys().collect::<Vec<_>>())
            .field("named_instances", &self.named_instances.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn chain_failure(err: VrkitError, dependency: &str, requester: &str) -> VrkitError {
    match err {
        VrkitError::CircularDependency(_) => err,
        other => VrkitError::DependencyFailed {
            dependency: dependency.to_string(),
            requester: requester.to_string(),
            source: Box::new(other),
        },
    }
}

/// Orders sibling dependencies so that an entry comes after every entry it
/// depends on. Independent entries keep their declaration order.
fn order_by_dependency(mut pending: Vec<Arc<dyn RegistryEntry>>) -> Vec<Arc<dyn RegistryEntry>> {
    let mut ordered = Vec::with_capacity(pending.len());

    while !pending.is_empty() {
        let next = pending
            .iter()
            .position(|candidate| {
                !pending
                    .iter()
                    .any(|other| candidate.info().depends_on(other.info()) && !Arc::ptr_eq(candidate, other))
            })
            // Mutual dependencies surface as a cycle during recursion.
            .unwrap_or(0);
        ordered.push(pending.remove(next));
    }

    ordered
}

/// A parsed type identifier: a name plus an optional version prefix.
struct TypeQuery<'a> {
    name: &'a str,
    version: Option<Vec<u32>>,
}

impl<'a> TypeQuery<'a> {
    fn parse(type_id: &'a str) -> Self {
        let name = Info::base_name(type_id);
        let version = type_id
            .get(name.len() + Info::SEPARATOR.len()..)
            .filter(|rest| !rest.is_empty())
            .and_then(|rest| {
                rest.split('.')
                    .map(|c| c.parse::<u32>().ok())
                    .collect::<Option<Vec<u32>>>()
            });
        Self { name, version }
    }

    fn matches(&self, info: &Info) -> bool {
        if info.name() != self.name {
            return false;
        }
        match &self.version {
            Some(prefix) => info.version().starts_with(prefix),
            None => true,
        }
    }
}
