//! Application configuration for hutchns.
//!
//! User config lives at `~/.hutchns/hutchns.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{NamespaceError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "hutchns.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".hutchns";

// ---------------------------------------------------------------------------
// Config structs (matching hutchns.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Namespaces built by `hutchns load`.
    #[serde(default)]
    pub namespaces: NamespacesConfig,
}

/// `[logging]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Root directory for debug log files. No log file when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir_logs: Option<String>,

    /// Console level: "error", "warn", "info", "debug" or "trace".
    #[serde(default = "default_console_level")]
    pub console_level: String,

    /// Console format: "text" or "json".
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir_logs: None,
            console_level: default_console_level(),
            format: default_format(),
        }
    }
}

fn default_console_level() -> String {
    "info".into()
}
fn default_format() -> String {
    "text".into()
}

/// `[namespaces]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamespacesConfig {
    /// `[[namespaces.class]]` entries.
    #[serde(default)]
    pub class: Vec<ClassNamespaceConfig>,

    /// `[[namespaces.metadata]]` entries.
    #[serde(default)]
    pub metadata: Vec<MetadataNamespaceConfig>,
}

/// A type-filtered namespace to build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassNamespaceConfig {
    /// Name the namespace is published under.
    pub name: String,
    /// Short type name, dotted type path, or `function`.
    #[serde(rename = "type")]
    pub type_name: String,
}

/// A metadata tree namespace to build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataNamespaceConfig {
    /// Name the namespace is published under.
    pub name: String,
    /// Metadata fields, root to leaf.
    pub fields: Vec<String>,
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.hutchns/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| NamespaceError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.hutchns/hutchns.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| NamespaceError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| NamespaceError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    init_config_in(&config_dir()?)
}

/// Write a default config file into `dir`, creating it if needed.
pub fn init_config_in(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| NamespaceError::io(dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| NamespaceError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| NamespaceError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
