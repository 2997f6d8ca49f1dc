//! Plug-in module discovery and search path construction.
//!
//! This module handles scanning a search path for dynamic libraries,
//! filtering them by build variant, loading them, and building the default
//! search path from the working directory and `VRKIT_PLUGINS_DIR`.
//!
//! Discovery is resilient: an unreadable directory or a file that fails to
//! load is logged and skipped, never fatal to the scan.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use super::module::{library_extension, Module};

/// Environment variable naming the base plug-in installation directory.
pub const PLUGINS_DIR_ENV: &str = "VRKIT_PLUGINS_DIR";

/// File name suffix (in front of the extension) of debug-runtime builds.
pub const DEBUG_SUFFIX: &str = "_d";

/// Name of the debug variant subdirectory of a search path root.
pub const DEBUG_SUBDIR: &str = "debug";

/// Which build variant of plug-in files a scan accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildVariant {
    /// Only files named `<name>_d.<ext>`.
    Debug,
    /// Every file except `<name>_d.<ext>`.
    Release,
    /// Every file with the library extension.
    Any,
}

impl BuildVariant {
    /// The variant matching how this host was built.
    ///
    /// Only Windows separates debug-runtime modules by name; everywhere else
    /// any module is accepted.
    pub fn host() -> Self {
        if cfg!(target_os = "windows") {
            if cfg!(debug_assertions) {
                Self::Debug
            } else {
                Self::Release
            }
        } else {
            Self::Any
        }
    }

    fn accepts(self, stem: &str) -> bool {
        let is_debug = stem.ends_with(DEBUG_SUFFIX);
        match self {
            Self::Debug => is_debug,
            Self::Release => !is_debug,
            Self::Any => true,
        }
    }
}

impl Default for BuildVariant {
    fn default() -> Self {
        Self::host()
    }
}

/// Scans directories for plug-in modules.
///
/// # Example
///
/// ```no_run
/// use std::path::PathBuf;
/// use vrkit::plugins::{BuildVariant, ModuleScanner};
///
/// let modules = ModuleScanner::new()
///     .variant(BuildVariant::Any)
///     .scan(&[PathBuf::from("plugins/mode")]);
/// for module in &modules {
///     println!("Loaded {}", module.name());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ModuleScanner {
    extension: String,
    variant: BuildVariant,
}

impl ModuleScanner {
    /// A scanner for the platform's library extension and the host variant.
    pub fn new() -> Self {
        Self {
            extension: library_extension().to_string(),
            variant: BuildVariant::host(),
        }
    }

    /// Overrides the accepted build variant.
    pub fn variant(mut self, variant: BuildVariant) -> Self {
        self.variant = variant;
        self
    }

    /// Overrides the library file extension (without the leading dot).
    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn build_variant(&self) -> BuildVariant {
        self.variant
    }

    /// Lists the candidate module files in `search_path` without loading
    /// them. Files within one directory are returned in name order.
    pub fn candidates(&self, search_path: &[PathBuf]) -> Vec<PathBuf> {
        let mut found = Vec::new();

        for dir in search_path {
            if !dir.is_dir() {
                info!(dir = %dir.display(), "Plug-in directory does not exist, skipping");
                continue;
            }

            let entries = match fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(
                        dir = %dir.display(),
                        error = %e,
                        "Failed to scan plug-in path, skipping"
                    );
                    continue;
                }
            };

            let mut files: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.is_file() && self.matches(path))
                .collect();
            files.sort();
            found.extend(files);
        }

        found
    }

    /// Loads every candidate module in `search_path`. Modules that fail to
    /// load are logged and skipped.
    pub fn scan(&self, search_path: &[PathBuf]) -> Vec<Arc<Module>> {
        let mut modules = Vec::new();

        for path in self.candidates(search_path) {
            match Module::load(&path) {
                Ok(module) => {
                    info!(module = %module.name(), "Found plug-in module");
                    modules.push(Arc::new(module));
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to load plug-in module, skipping"
                    );
                }
            }
        }

        modules
    }

    /// Derives the platform-agnostic plug-in name of a module file: the file
    /// name without the extension and, for debug scans, without the
    /// `_d` suffix. Returns `None` for files this scanner does not accept.
    pub fn platform_agnostic_name(&self, path: &Path) -> Option<String> {
        if !self.matches(path) {
            return None;
        }

        let stem = path.file_stem()?.to_str()?;
        let name = match self.variant {
            BuildVariant::Debug => stem.strip_suffix(DEBUG_SUFFIX)?,
            BuildVariant::Release | BuildVariant::Any => stem,
        };

        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }

    fn matches(&self, path: &Path) -> bool {
        let ext_ok = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false);

        ext_ok
            && path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(|stem| self.variant.accepts(stem))
                .unwrap_or(false)
    }
}

impl Default for ModuleScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Finds and loads all plug-in modules in `search_path` using the host's
/// library extension and build variant.
pub fn find_modules(search_path: &[PathBuf]) -> Vec<Arc<Module>> {
    ModuleScanner::new().scan(search_path)
}

/// The root directory for installed plug-ins, taken from
/// `VRKIT_PLUGINS_DIR`. Returns `None` when the variable is unset or empty.
pub fn plugin_base_dir() -> Option<PathBuf> {
    env::var_os(PLUGINS_DIR_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Builds a search path from `roots`, keeping only roots that exist.
///
/// When `search_debug` is set and a root has a `debug` subdirectory, that
/// subdirectory is included too: ahead of its parent in debug builds of the
/// host, behind it otherwise.
pub fn build_search_path(roots: &[PathBuf], search_debug: bool) -> Vec<PathBuf> {
    let mut search_path = Vec::new();

    for root in roots {
        if !root.exists() {
            continue;
        }

        let debug_dir = root.join(DEBUG_SUBDIR);
        let include_debug = search_debug && debug_dir.is_dir();

        if cfg!(debug_assertions) {
            if include_debug {
                search_path.push(debug_dir);
            }
            search_path.push(root.clone());
        } else {
            search_path.push(root.clone());
            if include_debug {
                search_path.push(debug_dir);
            }
        }
    }

    search_path
}

/// The default search path for the given subdirectories: `./plugins/<sub>`
/// for each subdirectory, then `$VRKIT_PLUGINS_DIR/<sub>` for each
/// subdirectory. An empty `subdirs` means the base directories themselves.
pub fn default_search_path(subdirs: &[&str], search_debug: bool) -> Vec<PathBuf> {
    let mut bases = vec![PathBuf::from("plugins")];
    if let Some(base) = plugin_base_dir() {
        bases.push(base);
    }
    search_path_from(&bases, subdirs, search_debug)
}

/// Composes `bases` × `subdirs` into roots (existing directories only) and
/// hands them to [`build_search_path`].
pub fn search_path_from(bases: &[PathBuf], subdirs: &[&str], search_debug: bool) -> Vec<PathBuf> {
    let subdirs: &[&str] = if subdirs.is_empty() { &[""] } else { subdirs };
    let mut roots = Vec::new();

    for base in bases {
        for sub in subdirs {
            let dir = if sub.is_empty() {
                base.clone()
            } else {
                base.join(sub)
            };
            if dir.is_dir() {
                roots.push(dir);
            }
        }
    }

    build_search_path(&roots, search_debug)
}
