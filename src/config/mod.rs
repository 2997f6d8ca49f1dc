//! Configuration for vrkit
//!
//! The application configuration is a JSON file (by default
//! `~/.vrkit/config.json`) naming where plug-ins live, which viewer
//! plug-ins to instantiate, and the configuration elements handed to
//! plug-ins. Elements are stored already parsed, keyed by element type, and
//! deserialised into a plug-in's own config struct on request.
//!
//! ```json
//! {
//!   "plugin_path": ["${HOME}/vrkit/plugins"],
//!   "plugins": ["com.infiscape.ModeHarnessPlugin"],
//!   "elements": {
//!     "vrkit_mode_harness_plugin": {
//!       "version": 2,
//!       "default_component": "Nav",
//!       "components": [{ "name": "Nav", "plugin": "com.example.Navigate" }],
//!       "signals": [{ "name": "NavMode", "active_component": "Nav" }]
//!     }
//!   }
//! }
//! ```

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, VrkitError};
use crate::plugins::loader::{default_search_path, search_path_from};

// ============================================================================
// AppConfig
// ============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Extra plug-in root directories, searched ahead of the defaults.
    /// `$VAR` and `${VAR}` references are expanded.
    pub plugin_path: Vec<String>,

    /// Subdirectories of each root to search. Empty means the roots
    /// themselves.
    pub plugin_subdirs: Vec<String>,

    /// Whether `debug` variant subdirectories are searched too.
    pub search_debug: bool,

    /// Type identifiers of the viewer plug-ins to instantiate, in order.
    pub plugins: Vec<String>,

    /// Configuration elements keyed by element type.
    pub elements: HashMap<String, Value>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            plugin_path: Vec::new(),
            plugin_subdirs: Vec::new(),
            search_debug: true,
            plugins: Vec::new(),
            elements: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// The per-user configuration directory, `~/.vrkit`.
    pub fn dir() -> PathBuf {
        dirs::home_dir().unwrap_or_default().join(".vrkit")
    }

    /// The default configuration file, `~/.vrkit/config.json`.
    pub fn default_path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Reads a configuration file.
    ///
    /// # Errors
    /// `VrkitError::Io` if the file cannot be read, `VrkitError::Json` if it
    /// is not a valid configuration.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Reads the default configuration file, falling back to the defaults
    /// when it does not exist.
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// The plug-in search path: the configured roots, then `./plugins` and
    /// `$VRKIT_PLUGINS_DIR`, each combined with the configured subdirectories.
    pub fn search_path(&self) -> Vec<PathBuf> {
        let subdirs: Vec<&str> = self.plugin_subdirs.iter().map(String::as_str).collect();
        let roots: Vec<PathBuf> = self
            .plugin_path
            .iter()
            .map(|p| PathBuf::from(expand_env_vars(p)))
            .collect();

        let mut path = search_path_from(&roots, &subdirs, self.search_debug);
        for dir in default_search_path(&subdirs, self.search_debug) {
            if !path.contains(&dir) {
                path.push(dir);
            }
        }
        path
    }

    /// The configuration elements as a [`Configuration`] store.
    pub fn configuration(&self) -> Configuration {
        Configuration::new(self.elements.clone())
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Already-parsed configuration elements, keyed by element type.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    elements: HashMap<String, Value>,
}

impl Configuration {
    pub fn new(elements: HashMap<String, Value>) -> Self {
        Self { elements }
    }

    pub fn insert(&mut self, element_type: impl Into<String>, value: Value) {
        self.elements.insert(element_type.into(), value);
    }

    pub fn has_element(&self, element_type: &str) -> bool {
        self.elements.contains_key(element_type)
    }

    /// Deserialises the element of type `element_type`.
    ///
    /// Returns `Ok(None)` if there is no such element.
    ///
    /// # Errors
    /// `VrkitError::Config` if the element does not have the shape of `T`.
    pub fn element<T: DeserializeOwned>(&self, element_type: &str) -> Result<Option<T>> {
        match self.elements.get(element_type) {
            None => Ok(None),
            Some(value) => T::deserialize(value).map(Some).map_err(|e| {
                VrkitError::Config(format!(
                    "Invalid configuration element '{}': {}",
                    element_type, e
                ))
            }),
        }
    }
}

// ============================================================================
// Environment variable expansion
// ============================================================================

static ENV_VAR_RE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))").ok()
});

/// Replaces `$VAR` and `${VAR}` references with the values of environment
/// variables. Unset variables expand to the empty string.
pub fn expand_env_vars(input: &str) -> String {
    let Some(re) = ENV_VAR_RE.as_ref() else {
        return input.to_string();
    };

    re.replace_all(input, |caps: &Captures| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .and_then(|name| env::var(name.as_str()).ok())
            .unwrap_or_default()
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        version: u32,
        #[serde(default)]
        names: Vec<String>,
    }

    // ---- AppConfig ----

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert!(config.search_debug);
        assert!(config.plugins.is_empty());
        assert!(config.elements.is_empty());
    }

    #[test]
    fn test_load_partial_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, r#"{ "plugins": ["com.infiscape.ModeHarnessPlugin"] }"#).unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.plugins, vec!["com.infiscape.ModeHarnessPlugin"]);
        assert!(config.search_debug);
        assert!(config.plugin_path.is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        let result = AppConfig::load(Path::new("/nonexistent/vrkit/config.json"));
        assert!(matches!(result, Err(VrkitError::Io(_))));
    }

    #[test]
    fn test_load_invalid_json() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(VrkitError::Json(_))));
    }

    #[test]
    fn test_search_path_starts_with_configured_roots() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("mode")).unwrap();

        let config = AppConfig {
            plugin_path: vec![tmp.path().display().to_string()],
            plugin_subdirs: vec!["mode".to_string()],
            search_debug: false,
            ..AppConfig::default()
        };

        let path = config.search_path();
        assert_eq!(path.first(), Some(&tmp.path().join("mode")));
    }

    #[test]
    fn test_dir_ends_with_vrkit() {
        assert!(AppConfig::dir().ends_with(".vrkit"));
    }

    // ---- Configuration ----

    #[test]
    fn test_element_deserialises() {
        let mut configuration = Configuration::default();
        configuration.insert("sample", json!({ "version": 2, "names": ["a"] }));

        let sample: Sample = configuration.element("sample").unwrap().unwrap();
        assert_eq!(
            sample,
            Sample {
                version: 2,
                names: vec!["a".to_string()]
            }
        );
        assert!(configuration.has_element("sample"));
    }

    #[test]
    fn test_element_missing_is_none() {
        let configuration = Configuration::default();
        let sample: Option<Sample> = configuration.element("sample").unwrap();
        assert!(sample.is_none());
    }

    #[test]
    fn test_element_wrong_shape() {
        let mut configuration = Configuration::default();
        configuration.insert("sample", json!({ "version": "two" }));
        let err = configuration.element::<Sample>("sample").unwrap_err();
        assert!(err.to_string().contains("Invalid configuration element 'sample'"));
    }

    // ---- env expansion ----

    #[test]
    fn test_expand_env_vars() {
        env::set_var("VRKIT_TEST_EXPAND_ROOT", "/opt/vr");
        assert_eq!(
            expand_env_vars("${VRKIT_TEST_EXPAND_ROOT}/plugins"),
            "/opt/vr/plugins"
        );
        assert_eq!(
            expand_env_vars("$VRKIT_TEST_EXPAND_ROOT/mode"),
            "/opt/vr/mode"
        );
    }

    #[test]
    fn test_expand_unset_var_is_empty() {
        env::remove_var("VRKIT_TEST_EXPAND_UNSET");
        assert_eq!(expand_env_vars("a${VRKIT_TEST_EXPAND_UNSET}b"), "ab");
    }

    #[test]
    fn test_expand_without_vars_is_unchanged() {
        assert_eq!(expand_env_vars("plugins/mode"), "plugins/mode");
    }
}
