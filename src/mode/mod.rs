//! Mode components and the mode harness
//!
//! A *mode* is a mutually exclusive behaviour of the application, such as
//! navigating or grabbing objects. Each mode is a plug-in of the
//! [`ModeComponentCategory`]; the [`ModeHarnessPlugin`] instantiates the
//! configured components and keeps exactly one of them active, switching
//! when a bound signal fires.
//!
//! # Lifecycle of a component
//!
//! ```text
//! init ──► Inactive ──activate──► Active ──deactivate──► Inactive
//!                                   │
//!                                 exit (deactivates first)
//! ```

pub mod component;
pub mod harness;

pub use component::{Component, ComponentPtr, ModeComponent, ModeComponentCategory};
pub use harness::{
    ComponentConfig, HarnessConfig, ModeHarnessPlugin, SignalConfig, SwitchMailbox, ELEMENT_TYPE,
};
