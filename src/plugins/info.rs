//! Versioned plug-in identity.
//!
//! An [`Info`] names one plug-in type: an optional namespace, a short name,
//! a version made of unsigned components (most significant first) and an
//! optional qualifier. It also lists the identifiers of the plug-in types
//! that must be instantiated before this one.
//!
//! Two derived strings are used as registry keys:
//!
//! - the *name*: `namespace.short_name` (or just `short_name`)
//! - the *full name*: `name:1.2.3` with an optional `-qualifier` suffix
//!
//! ```rust
//! use vrkit::plugins::Info;
//!
//! let info = Info::new("com.infiscape", "Grab", vec![0, 5, 1], "", vec![]).unwrap();
//! assert_eq!(info.name(), "com.infiscape.Grab");
//! assert_eq!(info.full_name(), "com.infiscape.Grab:0.5.1");
//! ```

use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;

use crate::error::{Result, VrkitError};

/// Immutable identity and dependency list of a plug-in type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Info {
    namespace: String,
    short_name: String,
    version: Vec<u32>,
    qualifier: String,
    dependencies: Vec<String>,
    name: String,
    full_name: String,
}

impl Info {
    /// Separates the name of a plug-in type from its version in a full name.
    pub const SEPARATOR: &'static str = ":";

    /// Creates a new plug-in identity.
    ///
    /// # Errors
    /// `VrkitError::Config` if any identifier contains whitespace or the
    /// separator character, if the short name is empty, or if `version`
    /// has no components.
    pub fn new(
        namespace: impl Into<String>,
        short_name: impl Into<String>,
        version: Vec<u32>,
        qualifier: impl Into<String>,
        dependencies: Vec<String>,
    ) -> Result<Self> {
        let namespace = namespace.into();
        let short_name = short_name.into();
        let qualifier = qualifier.into();

        if short_name.is_empty() {
            return Err(VrkitError::Config(
                "Plug-in short name must not be empty".to_string(),
            ));
        }
        if version.is_empty() {
            return Err(VrkitError::Config(format!(
                "Plug-in '{}' must have at least one version component",
                short_name
            )));
        }

        validate_identifier("namespace", &namespace)?;
        validate_identifier("short name", &short_name)?;
        validate_identifier("qualifier", &qualifier)?;
        for dep in &dependencies {
            if dep.is_empty() || dep.chars().any(char::is_whitespace) {
                return Err(VrkitError::Config(format!(
                    "Invalid dependency identifier '{}' of plug-in '{}'",
                    dep, short_name
                )));
            }
        }

        let name = Self::build_namespace_name(&namespace, &short_name);
        let full_name = Self::build_full_name(&namespace, &short_name, &version, &qualifier);

        Ok(Self {
            namespace,
            short_name,
            version,
            qualifier,
            dependencies,
            name,
            full_name,
        })
    }

    /// Shorthand for an unqualified plug-in type with no dependencies.
    pub fn simple(
        namespace: impl Into<String>,
        short_name: impl Into<String>,
        version: Vec<u32>,
    ) -> Result<Self> {
        Self::new(namespace, short_name, version, "", Vec::new())
    }

    /// Builds `namespace.short_name`, or just `short_name` without a namespace.
    pub fn build_namespace_name(namespace: &str, short_name: &str) -> String {
        if namespace.is_empty() {
            short_name.to_string()
        } else {
            format!("{}.{}", namespace, short_name)
        }
    }

    /// Builds the full name without constructing an `Info`.
    ///
    /// The result is `name:v1.v2...` followed by `-qualifier` when a
    /// qualifier is given.
    pub fn build_full_name(
        namespace: &str,
        short_name: &str,
        version: &[u32],
        qualifier: &str,
    ) -> String {
        let mut full_name = Self::build_namespace_name(namespace, short_name);
        full_name.push_str(Self::SEPARATOR);
        full_name.push_str(&join_version(version));

        if !qualifier.is_empty() {
            full_name.push('-');
            full_name.push_str(qualifier);
        }

        full_name
    }

    /// Returns the part of a type identifier in front of the version separator.
    pub fn base_name(type_id: &str) -> &str {
        match type_id.find(Self::SEPARATOR) {
            Some(pos) => &type_id[..pos],
            None => type_id,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    /// The namespace-qualified name without version information.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The unique identifier of this type, version and qualifier.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn version(&self) -> &[u32] {
        &self.version
    }

    /// The version joined with `.` characters.
    pub fn version_string(&self) -> String {
        join_version(&self.version)
    }

    pub fn qualifier(&self) -> &str {
        &self.qualifier
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Returns true if one of this type's dependency identifiers names
    /// `other`, either by full name or by name.
    pub fn depends_on(&self, other: &Info) -> bool {
        self.dependencies
            .iter()
            .any(|d| d == other.full_name() || d == other.name())
    }

    /// Orders two identities so that the newer version compares greater.
    ///
    /// Versions are compared numerically component by component, so
    /// `0.10.0` is newer than `0.2.0` regardless of padding. On equal
    /// versions an unqualified identity wins over a qualified one, and the
    /// full name keeps the order total.
    pub fn cmp_newest(&self, other: &Info) -> Ordering {
        self.version
            .cmp(&other.version)
            .then_with(|| self.qualifier.is_empty().cmp(&other.qualifier.is_empty()))
            .then_with(|| self.full_name.cmp(&other.full_name))
    }
}

impl fmt::Display for Info {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name)
    }
}

fn join_version(version: &[u32]) -> String {
    version
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

fn validate_identifier(what: &str, value: &str) -> Result<()> {
    if value.chars().any(char::is_whitespace) || value.contains(Info::SEPARATOR) {
        return Err(VrkitError::Config(format!(
            "Invalid plug-in {} '{}': must not contain whitespace or '{}'",
            what,
            value,
            Info::SEPARATOR
        )));
    }
    Ok(())
}
