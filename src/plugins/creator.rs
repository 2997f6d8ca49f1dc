//! Plug-in categories, typed creators and type-erased instances.
//!
//! Each category of plug-in (viewer plug-ins, mode components and the three
//! strategy kinds) implements [`PluginCategory`], which names the shared
//! handle type its instances are returned as and the ABI entry points its
//! modules export.
//!
//! A module hands the host a [`CreatorBase`]: an opaque creator tagged with
//! its [`PluginKind`]. The host recovers the typed [`Creator`] with
//! [`CreatorBase::downcast`], which fails if the module exported a creator
//! for a different category.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, VrkitError};

use super::info::Info;

/// The fixed set of plug-in categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginKind {
    Plugin,
    ModeComponent,
    MoveStrategy,
    IntersectionStrategy,
    GrabStrategy,
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Plugin => "plug-in",
            Self::ModeComponent => "mode component",
            Self::MoveStrategy => "move strategy",
            Self::IntersectionStrategy => "intersection strategy",
            Self::GrabStrategy => "grab strategy",
        };
        f.write_str(name)
    }
}

/// Signature of the category-specific creator accessor a module exports.
#[allow(improper_ctypes_definitions)]
pub type CreatorFn = unsafe extern "C" fn() -> *const CreatorBase;

/// A category of plug-in.
///
/// The category is a marker type; instances of the category are handed
/// around as `Handle` values (typically an `Arc` around a lockable object).
pub trait PluginCategory: 'static {
    /// Shared handle to one instance of this category.
    type Handle: Clone + Send + Sync + 'static;

    const KIND: PluginKind;

    /// Name of the entry point returning the module's [`CreatorBase`].
    const CREATOR_FUNC_NAME: &'static str;

    /// Name of the entry point reporting the module's interface version.
    const VERSION_FUNC_NAME: &'static str;

    /// Interface major version the host was built against. Modules with a
    /// different major version are rejected.
    const API_MAJOR: u32;

    const API_MINOR: u32;
}

/// A typed factory for instances of category `C`.
pub struct Creator<C: PluginCategory> {
    func: Box<dyn Fn() -> C::Handle + Send + Sync>,
}

impl<C: PluginCategory> Creator<C> {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn() -> C::Handle + Send + Sync + 'static,
    {
        Self {
            func: Box::new(func),
        }
    }

    /// Constructs a new instance.
    pub fn create(&self) -> C::Handle {
        (self.func)()
    }
}

impl<C: PluginCategory> fmt::Debug for Creator<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Creator").field("kind", &C::KIND).finish()
    }
}

/// Opaque, category-tagged creator exported by a plug-in module.
///
/// A module links its own copy of vrkit, so `TypeId`s differ between host
/// and module. The creator is identified by its kind and the name of its
/// handle type instead; layout compatibility is established by the ABI
/// check in [`validate_module`](super::entry::validate_module).
pub struct CreatorBase {
    kind: PluginKind,
    handle_type: &'static str,
    creator: Box<dyn Any + Send + Sync>,
}

impl CreatorBase {
    pub fn new<C: PluginCategory>(creator: Creator<C>) -> Self {
        Self {
            kind: C::KIND,
            handle_type: std::any::type_name::<C::Handle>(),
            creator: Box::new(creator),
        }
    }

    pub fn kind(&self) -> PluginKind {
        self.kind
    }

    /// Recovers the typed creator.
    ///
    /// # Errors
    /// `VrkitError::PluginInterface` if this creator belongs to another
    /// category.
    pub fn downcast<C: PluginCategory>(&self) -> Result<&Creator<C>> {
        if self.kind != C::KIND {
            return Err(VrkitError::PluginInterface(format!(
                "Expected a {} creator but the module exports a {} creator",
                C::KIND,
                self.kind
            )));
        }

        let expected = std::any::type_name::<C::Handle>();
        if self.handle_type != expected {
            return Err(VrkitError::PluginInterface(format!(
                "Creator tagged as {} has an incompatible handle type ({} != {})",
                C::KIND,
                self.handle_type,
                expected
            )));
        }

        let creator = &*self.creator as *const (dyn Any + Send + Sync) as *const Creator<C>;
        // SAFETY: the box was built from a `Creator<C>` of the same kind and
        // handle type, by a vrkit build with the same ABI tag.
        Ok(unsafe { &*creator })
    }
}

impl fmt::Debug for CreatorBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreatorBase")
            .field("kind", &self.kind)
            .finish()
    }
}

/// A created plug-in object, shared between the registry and its users.
///
/// Cloning a `PluginInstance` clones the reference, not the object.
#[derive(Clone)]
pub struct PluginInstance {
    info: Arc<Info>,
    kind: PluginKind,
    handle: Arc<dyn Any + Send + Sync>,
}

impl PluginInstance {
    pub fn new<C: PluginCategory>(info: Arc<Info>, handle: C::Handle) -> Self {
        Self {
            info,
            kind: C::KIND,
            handle: Arc::new(handle),
        }
    }

    /// Identity of the plug-in type this object was created from.
    pub fn info(&self) -> &Info {
        &self.info
    }

    pub fn kind(&self) -> PluginKind {
        self.kind
    }

    /// Returns the typed handle if this instance belongs to category `C`.
    pub fn downcast<C: PluginCategory>(&self) -> Option<C::Handle> {
        if self.kind != C::KIND {
            return None;
        }
        self.handle.downcast_ref::<C::Handle>().cloned()
    }

    /// Returns true if both values refer to the same created object.
    pub fn ptr_eq(&self, other: &PluginInstance) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.handle) as *const (),
            Arc::as_ptr(&other.handle) as *const (),
        )
    }
}

impl fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginInstance")
            .field("type", &self.info.full_name())
            .field("kind", &self.kind)
            .finish()
    }
}

/// Generates the entry points of a plug-in module built as a `cdylib`.
///
/// The module exports `getPluginInfo`, `getVrkitAbiVersion`, the named
/// interface version function (reporting the category's
/// `API_MAJOR`/`API_MINOR`) and the named creator accessor. The function
/// names must match the category's `VERSION_FUNC_NAME` and
/// `CREATOR_FUNC_NAME`.
///
/// `Info` and `CreatorBase` cross the boundary as Rust types, so the host
/// rejects modules whose ABI tag differs from its own.
///
/// ```ignore
/// vrkit::export_plugin! {
///     category: vrkit::mode::ModeComponentCategory,
///     version_fn: getComponentInterfaceVersion,
///     creator_fn: getCreator,
///     info: vrkit::plugins::Info::simple("com.example", "Spin", vec![1, 0]).unwrap(),
///     creator: || spin_component(),
/// }
/// ```
#[macro_export]
macro_rules! export_plugin {
    (
        category: $category:ty,
        version_fn: $version_fn:ident,
        creator_fn: $creator_fn:ident,
        info: $info:expr,
        creator: $creator:expr $(,)?
    ) => {
        static __VRKIT_PLUGIN_INFO: $crate::__private::Lazy<$crate::plugins::Info> =
            $crate::__private::Lazy::new(|| $info);

        static __VRKIT_PLUGIN_CREATOR: $crate::__private::Lazy<$crate::plugins::CreatorBase> =
            $crate::__private::Lazy::new(|| {
                $crate::plugins::CreatorBase::new::<$category>($crate::plugins::Creator::new(
                    $creator,
                ))
            });

        #[no_mangle]
        #[allow(non_snake_case, improper_ctypes_definitions)]
        pub extern "C" fn getPluginInfo() -> *const $crate::plugins::Info {
            &*__VRKIT_PLUGIN_INFO
        }

        #[no_mangle]
        #[allow(non_snake_case)]
        pub extern "C" fn getVrkitAbiVersion() -> *const ::std::os::raw::c_char {
            $crate::plugins::module::ABI_VERSION_NUL.as_ptr() as *const ::std::os::raw::c_char
        }

        #[no_mangle]
        #[allow(non_snake_case)]
        pub unsafe extern "C" fn $version_fn(major: *mut u32, minor: *mut u32) {
            use $crate::plugins::PluginCategory as _;
            if !major.is_null() {
                *major = <$category>::API_MAJOR;
            }
            if !minor.is_null() {
                *minor = <$category>::API_MINOR;
            }
        }

        #[no_mangle]
        #[allow(non_snake_case, improper_ctypes_definitions)]
        pub extern "C" fn $creator_fn() -> *const $crate::plugins::CreatorBase {
            &*__VRKIT_PLUGIN_CREATOR
        }
    };
}
