//! Framework Configuration
//!
//! Loads the host-facing knobs of the framework from
//! `~/.config/caliburn/caliburn.toml`.
//!
//! # Configuration Priority
//!
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [ui]
//! thread_name = "caliburn-ui"
//! design_time = false
//!
//! [events]
//! default_thread_option = "ui"
//!
//! [background]
//! worker_threads = 4
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Setting |
//! |---|---|
//! | `CALIBURN_UI_THREAD_NAME` | `ui.thread_name` |
//! | `CALIBURN_DESIGN_TIME` | `ui.design_time` |
//! | `CALIBURN_DEFAULT_THREAD_OPTION` | `events.default_thread_option` |
//! | `CALIBURN_BACKGROUND_WORKERS` | `background.worker_threads` |

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::ThreadOption;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Where the effective configuration came from
///
/// Reports the highest-priority layer that changed anything.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Command-line argument
    Cli,
    /// Environment variable
    Env,
    /// TOML configuration file
    File,
    /// Built-in defaults
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[ui]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UiToml {
    /// Name given to the UI thread
    pub thread_name: Option<String>,

    /// Run as if inside a design tool
    pub design_time: Option<bool>,
}

/// `[events]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsToml {
    /// Thread option hosts use when they do not pick one
    pub default_thread_option: Option<ThreadOption>,
}

/// `[background]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundToml {
    /// Worker threads of the background pool
    pub worker_threads: Option<usize>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaliburnToml {
    /// UI section
    pub ui: UiToml,

    /// Event aggregation section
    pub events: EventsToml,

    /// Background pool section
    pub background: BackgroundToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Effective framework configuration
#[derive(Clone, Debug)]
pub struct FrameworkConfig {
    /// Name given to the UI thread
    pub ui_thread_name: String,

    /// Run as if inside a design tool
    pub design_time: bool,

    /// Thread option hosts use when they do not pick one
    pub default_thread_option: ThreadOption,

    /// Worker threads of the background pool
    pub background_workers: usize,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    source: ConfigSource,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            ui_thread_name: "caliburn-ui".to_string(),
            design_time: false,
            default_thread_option: ThreadOption::PublisherThread,
            background_workers: 2,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl FrameworkConfig {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Check values that parse but make no sense
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for an empty thread name or
    /// a pool without workers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ui_thread_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "ui.thread_name must not be empty".to_string(),
            ));
        }
        if self.background_workers == 0 {
            return Err(ConfigError::ValidationError(
                "background.worker_threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/caliburn/caliburn.toml` or the platform
/// equivalent.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("caliburn").join("caliburn.toml"))
}

/// Load configuration from the default path and the process environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be read or parsed,
/// or if the result does not validate. A missing file is not an error.
pub fn load_config() -> Result<FrameworkConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path and the process environment
///
/// # Errors
///
/// See [`load_config`].
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<FrameworkConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration, reading environment variables through `env`
///
/// # Errors
///
/// See [`load_config`].
pub fn load_config_with_env<E>(path: Option<PathBuf>, env: E) -> Result<FrameworkConfig, ConfigError>
where
    E: Fn(&str) -> Option<String>,
{
    let mut config = FrameworkConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: CaliburnToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(path = %config_path.display(), "Loaded configuration from file");
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, &env)?;
    config.validate()?;
    Ok(config)
}

fn apply_toml_config(config: &mut FrameworkConfig, toml: &CaliburnToml) {
    if let Some(ref name) = toml.ui.thread_name {
        config.ui_thread_name = name.clone();
    }
    if let Some(design_time) = toml.ui.design_time {
        config.design_time = design_time;
    }
    if let Some(option) = toml.events.default_thread_option {
        config.default_thread_option = option;
    }
    if let Some(workers) = toml.background.worker_threads {
        config.background_workers = workers;
    }
}

fn apply_env_config<E>(config: &mut FrameworkConfig, env: &E) -> Result<(), ConfigError>
where
    E: Fn(&str) -> Option<String>,
{
    if let Some(name) = env("CALIBURN_UI_THREAD_NAME") {
        config.ui_thread_name = name;
        config.source = ConfigSource::Env;
    }
    if let Some(design_time) = env("CALIBURN_DESIGN_TIME") {
        config.design_time = design_time != "0" && design_time.to_lowercase() != "false";
        config.source = ConfigSource::Env;
    }
    if let Some(option) = env("CALIBURN_DEFAULT_THREAD_OPTION") {
        config.default_thread_option = ThreadOption::parse(&option).ok_or_else(|| {
            ConfigError::ValidationError(format!(
                "CALIBURN_DEFAULT_THREAD_OPTION: unknown thread option '{option}'"
            ))
        })?;
        config.source = ConfigSource::Env;
    }
    if let Some(workers) = env("CALIBURN_BACKGROUND_WORKERS") {
        config.background_workers = workers.trim().parse().map_err(|_| {
            ConfigError::ValidationError(format!(
                "CALIBURN_BACKGROUND_WORKERS: '{workers}' is not a number"
            ))
        })?;
        config.source = ConfigSource::Env;
    }
    Ok(())
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// UI thread name override
    pub ui_thread_name: Option<String>,

    /// Design-time flag override
    pub design_time: Option<bool>,

    /// Default thread option override
    pub default_thread_option: Option<ThreadOption>,

    /// Background worker count override
    pub background_workers: Option<usize>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set UI thread name override
    #[must_use]
    pub fn with_ui_thread_name(mut self, name: String) -> Self {
        self.ui_thread_name = Some(name);
        self
    }

    /// Set design-time override
    #[must_use]
    pub fn with_design_time(mut self, design_time: bool) -> Self {
        self.design_time = Some(design_time);
        self
    }

    /// Set default thread option override
    #[must_use]
    pub fn with_default_thread_option(mut self, option: ThreadOption) -> Self {
        self.default_thread_option = Some(option);
        self
    }

    /// Set background worker count override
    #[must_use]
    pub fn with_background_workers(mut self, workers: usize) -> Self {
        self.background_workers = Some(workers);
        self
    }

    /// Apply overrides to a configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if the result does not
    /// validate.
    pub fn apply(&self, config: &mut FrameworkConfig) -> Result<(), ConfigError> {
        if self.ui_thread_name.is_some()
            || self.design_time.is_some()
            || self.default_thread_option.is_some()
            || self.background_workers.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref name) = self.ui_thread_name {
            config.ui_thread_name = name.clone();
        }
        if let Some(design_time) = self.design_time {
            config.design_time = design_time;
        }
        if let Some(option) = self.default_thread_option {
            config.default_thread_option = option;
        }
        if let Some(workers) = self.background_workers {
            config.background_workers = workers;
        }

        config.validate()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    fn no_env() -> impl Fn(&str) -> Option<String> {
        env_from(&[])
    }

    fn toml_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = FrameworkConfig::default();

        assert_eq!(config.ui_thread_name, "caliburn-ui");
        assert!(!config.design_time);
        assert_eq!(config.default_thread_option, ThreadOption::PublisherThread);
        assert_eq!(config.background_workers, 2);
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_path() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("caliburn/caliburn.toml"));
        }
    }

    #[test]
    fn test_parse_valid_toml() {
        let file = toml_file(
            r#"
[ui]
thread_name = "main-ui"
design_time = true

[events]
default_thread_option = "background"

[background]
worker_threads = 6
"#,
        );

        let config = load_config_with_env(Some(file.path().to_path_buf()), no_env()).unwrap();

        assert_eq!(config.ui_thread_name, "main-ui");
        assert!(config.design_time);
        assert_eq!(config.default_thread_option, ThreadOption::BackgroundThread);
        assert_eq!(config.background_workers, 6);
        assert_eq!(config.source(), ConfigSource::File);
        assert_eq!(config.config_file_path.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_parse_partial_toml() {
        let file = toml_file("[background]\nworker_threads = 1\n");
        let config = load_config_with_env(Some(file.path().to_path_buf()), no_env()).unwrap();

        assert_eq!(config.background_workers, 1);
        assert_eq!(config.ui_thread_name, "caliburn-ui");
    }

    #[test]
    fn test_missing_file_graceful() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let config = load_config_with_env(Some(path), no_env()).unwrap();
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.config_file_path.is_none());
    }

    #[test]
    fn test_malformed_toml_error() {
        let file = toml_file("[ui\nthread_name = ");
        let result = load_config_with_env(Some(file.path().to_path_buf()), no_env());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let file = toml_file("[background]\nworker_threads = 0\n");
        let result = load_config_with_env(Some(file.path().to_path_buf()), no_env());
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_env_overrides_file() {
        let file = toml_file("[ui]\nthread_name = \"from-file\"\ndesign_time = true\n");
        let env = env_from(&[
            ("CALIBURN_UI_THREAD_NAME", "from-env"),
            ("CALIBURN_DESIGN_TIME", "false"),
            ("CALIBURN_DEFAULT_THREAD_OPTION", "ui"),
        ]);

        let config = load_config_with_env(Some(file.path().to_path_buf()), env).unwrap();

        assert_eq!(config.ui_thread_name, "from-env");
        assert!(!config.design_time);
        assert_eq!(config.default_thread_option, ThreadOption::UiThread);
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_invalid_env_values_rejected() {
        let result = load_config_with_env(
            None,
            env_from(&[("CALIBURN_DEFAULT_THREAD_OPTION", "sideways")]),
        );
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));

        let result =
            load_config_with_env(None, env_from(&[("CALIBURN_BACKGROUND_WORKERS", "many")]));
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_cli_overrides_env() {
        let mut config = load_config_with_env(
            None,
            env_from(&[("CALIBURN_BACKGROUND_WORKERS", "3")]),
        )
        .unwrap();
        assert_eq!(config.background_workers, 3);

        ConfigOverrides::new()
            .with_background_workers(8)
            .with_design_time(true)
            .apply(&mut config)
            .unwrap();

        assert_eq!(config.background_workers, 8);
        assert!(config.design_time);
        assert_eq!(config.source(), ConfigSource::Cli);
    }

    #[test]
    fn test_empty_overrides_keep_source() {
        let mut config = FrameworkConfig::default();
        ConfigOverrides::new().apply(&mut config).unwrap();
        assert_eq!(config.source(), ConfigSource::Default);
    }
}
