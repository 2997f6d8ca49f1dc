//! Error types for vrkit
//!
//! This module defines all error types used throughout the vrkit plug-in
//! framework. Uses `thiserror` for ergonomic error handling with automatic
//! `Display` and `Error` trait implementations.
//!
//! The variants follow the framework's error taxonomy:
//! - lookup errors (`NoSuchPlugin`, `MissingDependency`, `DependencyFailed`,
//!   `CircularDependency`, `NotInstantiated`)
//! - load errors (`PluginLoad`), recovered locally while scanning
//! - interface errors (`PluginInterface`), for modules that loaded but are
//!   unusable
//! - activation errors (`Activation`), converted to a boolean result at the
//!   mode component boundary

use thiserror::Error;

/// The primary error type for vrkit operations.
#[derive(Error, Debug)]
pub enum VrkitError {
    /// Configuration-related errors (malformed identifiers, bad config elements, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// No registry entry or factory module exists for the given type identifier.
    #[error("No such plug-in: {0}")]
    NoSuchPlugin(String),

    /// A dependency named by a plug-in has no registry entry.
    #[error("Missing dependency {dependency} of {requester}")]
    MissingDependency {
        /// Full name of the plug-in that declared the dependency.
        requester: String,
        /// The dependency identifier as written by the requester.
        dependency: String,
    },

    /// A dependency was found but could not itself be satisfied.
    #[error("Failed to satisfy dependencies of {dependency}, a dependency of {requester}: {source}")]
    DependencyFailed {
        dependency: String,
        requester: String,
        #[source]
        source: Box<VrkitError>,
    },

    /// The dependency graph contains a cycle. The payload is the rendered path.
    #[error("Circular plug-in dependency detected: {0}")]
    CircularDependency(String),

    /// No instance matching the given type or instance name exists.
    #[error("Not instantiated: {0}")]
    NotInstantiated(String),

    /// A dynamic module failed to open.
    #[error("Plug-in load error: {0}")]
    PluginLoad(String),

    /// A module loaded but lacks an entry point, fails validation or exports
    /// a creator of the wrong category.
    #[error("Plug-in interface error: {0}")]
    PluginInterface(String),

    /// A mode component refused to activate or deactivate.
    #[error("Activation error: {0}")]
    Activation(String),

    /// Signal repository errors (duplicate or unknown identifiers, type mismatch)
    #[error("Signal error: {0}")]
    Signal(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized `Result` type for vrkit operations.
pub type Result<T> = std::result::Result<T, VrkitError>;
