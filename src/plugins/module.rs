//! Loaded plug-in modules.
//!
//! A [`Module`] wraps a dynamically loaded code unit (shared library, DLL)
//! that contains a vrkit plug-in. It keeps the library mapped for as long as
//! any registry entry or creator obtained from it is alive, and exposes typed
//! access to the module's C entry points.
//!
//! Every plug-in module exports `getPluginInfo`, `getVrkitAbiVersion`, a
//! category-specific interface version function (see
//! [`PluginCategory::VERSION_FUNC_NAME`](super::creator::PluginCategory::VERSION_FUNC_NAME))
//! and a category-specific creator accessor. The [`export_plugin!`](crate::export_plugin)
//! macro generates all four.

use std::ffi::CStr;
use std::fmt;
use std::os::raw::c_char;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};
use tracing::debug;

use crate::error::{Result, VrkitError};

use super::info::Info;

/// Name of the entry point that returns the module's static [`Info`].
pub const INFO_FUNC_NAME: &str = "getPluginInfo";

/// Name of the entry point that returns the module's [`ABI_VERSION`].
pub const ABI_FUNC_NAME: &str = "getVrkitAbiVersion";

/// Tag identifying the binary interface between host and plug-in modules:
/// the vrkit release and the compiler both sides were built with. A module
/// is only usable if its tag equals the host's.
pub const ABI_VERSION: &str = concat!(
    "vrkit ",
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("VRKIT_RUSTC_VERSION"),
    ")"
);

#[doc(hidden)]
pub const ABI_VERSION_NUL: &str = concat!(
    "vrkit ",
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("VRKIT_RUSTC_VERSION"),
    ")\0"
);

/// Signature of the `getVrkitAbiVersion` entry point.
pub type AbiFn = unsafe extern "C" fn() -> *const c_char;

/// Signature of the `getPluginInfo` entry point.
pub type InfoFn = unsafe extern "C" fn() -> *const Info;

/// Signature of the interface version entry points.
pub type VersionFn = unsafe extern "C" fn(major: *mut u32, minor: *mut u32);

/// A loaded dynamic code unit containing a plug-in.
pub struct Module {
    name: String,
    path: PathBuf,
    library: Library,
}

impl Module {
    /// Opens the dynamic library at `path`.
    ///
    /// # Errors
    /// `VrkitError::PluginLoad` if the file cannot be opened as a library.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // SAFETY: loading runs the library's initialisers. Plug-in modules
        // are trusted code placed on the search path by the application.
        let library = unsafe { Library::new(path) }.map_err(|e| {
            VrkitError::PluginLoad(format!("Failed to load {}: {}", path.display(), e))
        })?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        debug!(module = %name, "Loaded plug-in module");

        Ok(Self {
            name,
            path: path.to_path_buf(),
            library,
        })
    }

    /// The file name of the module.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Determines whether the module exports the named symbol.
    pub fn has_symbol(&self, name: &str) -> bool {
        // SAFETY: the symbol is only looked up, never dereferenced.
        unsafe { self.library.get::<*const ()>(name.as_bytes()).is_ok() }
    }

    /// Looks up the named function symbol.
    ///
    /// # Safety
    /// `T` must be the function pointer type the module actually exports
    /// under `name`; a mismatch is undefined behaviour. The returned value
    /// must not be used after this module is dropped.
    ///
    /// # Errors
    /// `VrkitError::PluginInterface` if the symbol does not exist.
    pub unsafe fn get_function<T: Copy>(&self, name: &str) -> Result<T> {
        let symbol: Symbol<T> = self.library.get(name.as_bytes()).map_err(|e| {
            VrkitError::PluginInterface(format!(
                "Plug-in '{}' has no entry point function named {}: {}",
                self.name, name, e
            ))
        })?;
        Ok(*symbol)
    }

    /// Returns a copy of the identity the module publishes through
    /// `getPluginInfo`.
    pub fn plugin_info(&self) -> Result<Info> {
        // SAFETY: `getPluginInfo` is part of the plug-in ABI and has the
        // `InfoFn` signature.
        let info_func: InfoFn = unsafe { self.get_function(INFO_FUNC_NAME)? };
        let info = unsafe { info_func() };

        if info.is_null() {
            return Err(VrkitError::PluginInterface(format!(
                "Plug-in '{}' returned no plug-in information",
                self.name
            )));
        }

        // SAFETY: the pointer refers to static data inside the still-loaded
        // library; it is cloned before the borrow ends.
        Ok(unsafe { (*info).clone() })
    }

    /// Returns the ABI tag the module was built with.
    ///
    /// # Errors
    /// `VrkitError::PluginInterface` if the module does not export
    /// `getVrkitAbiVersion` or it returns nothing.
    pub fn abi_version(&self) -> Result<String> {
        // SAFETY: `getVrkitAbiVersion` is part of the plug-in ABI and has the
        // `AbiFn` signature.
        let abi_func: AbiFn = unsafe { self.get_function(ABI_FUNC_NAME)? };
        let tag = unsafe { abi_func() };

        if tag.is_null() {
            return Err(VrkitError::PluginInterface(format!(
                "Plug-in '{}' returned no ABI version",
                self.name
            )));
        }

        // SAFETY: the tag is a NUL-terminated static string in the
        // still-loaded library.
        Ok(unsafe { CStr::from_ptr(tag) }.to_string_lossy().into_owned())
    }

    /// Calls the named interface version function and returns
    /// `(major, minor)`.
    pub fn interface_version(&self, func_name: &str) -> Result<(u32, u32)> {
        // SAFETY: version functions are part of the plug-in ABI and have the
        // `VersionFn` signature.
        let version_func: VersionFn = unsafe { self.get_function(func_name)? };
        let mut major = 0u32;
        let mut minor = 0u32;
        unsafe { version_func(&mut major, &mut minor) };
        Ok((major, minor))
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

/// The platform's file extension for dynamically loadable code.
pub fn library_extension() -> &'static str {
    if cfg!(target_os = "windows") {
        "dll"
    } else if cfg!(target_os = "macos") {
        "dylib"
    } else {
        "so"
    }
}
