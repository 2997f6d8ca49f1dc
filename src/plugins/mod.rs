//! Plug-in system for vrkit
//!
//! Plug-ins are dynamically loaded modules (or creators linked into the
//! host) that each provide one versioned plug-in type. This module finds and
//! loads modules, validates their entry points, and keeps the registry that
//! creates plug-in instances in dependency order.
//!
//! # Architecture
//!
//! - **info**: Versioned plug-in identity and dependency list (`Info`)
//! - **module**: A loaded dynamic library and its entry points (`Module`)
//! - **loader**: Module discovery and search path construction
//! - **creator**: Plug-in categories, typed creators and type-erased instances
//! - **entry**: Registry entries wrapping static or module-provided creators
//! - **registry**: The central catalog with dependency resolution
//! - **factory**: Lazy, name-based access to modules on a search path
//!
//! # Entry points
//!
//! Every plug-in module exports four `extern "C"` functions:
//!
//! | Function | Returns |
//! |---|---|
//! | `getPluginInfo` | `*const Info` |
//! | `getVrkitAbiVersion` | NUL-terminated [`ABI_VERSION`] tag of the build |
//! | category version function, e.g. `getPluginInterfaceVersion` | major and minor API version |
//! | category creator function, e.g. `getCreator` | `*const CreatorBase` |
//!
//! [`export_plugin!`](crate::export_plugin) generates all four.
//!
//! # Usage
//!
//! ```rust,no_run
//! use vrkit::mode::ModeComponentCategory;
//! use vrkit::plugins::{default_search_path, find_modules, register_modules, Registry};
//!
//! let modules = find_modules(&default_search_path(&["mode"], true));
//!
//! let mut registry = Registry::new();
//! register_modules::<ModeComponentCategory>(&mut registry, &modules);
//!
//! let result = registry.make_instance("com.example.Navigate").unwrap();
//! println!(
//!     "Created {} after {} dependencies",
//!     result.instance.info(),
//!     result.dependencies.len()
//! );
//! ```

pub mod creator;
pub mod entry;
pub mod factory;
pub mod info;
pub mod loader;
pub mod module;
pub mod registry;

pub use creator::{Creator, CreatorBase, CreatorFn, PluginCategory, PluginInstance, PluginKind};
pub use entry::{
    register_modules, validate_module, RegistryEntry, TypedInitRegistryEntry, TypedRegistryEntry,
};
pub use factory::PluginFactory;
pub use info::Info;
pub use loader::{
    build_search_path, default_search_path, find_modules, plugin_base_dir, BuildVariant,
    ModuleScanner,
};
pub use module::{library_extension, Module, ABI_VERSION};
pub use registry::{Instantiation, Registry};
