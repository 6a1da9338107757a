use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CtsError;

/// Top-level runner configuration, loaded from cts.toml.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CtsConfig {
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub filter: FilterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Physical device index to test
    #[serde(default)]
    pub device_index: usize,
    /// Enable VK_LAYER_KHRONOS_validation when present
    #[serde(default)]
    pub validation: bool,
    /// Worker count for the multi-threaded stress tests (None = CPU count)
    pub threads: Option<usize>,
    /// Stop after the first failing case
    #[serde(default)]
    pub fail_fast: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    /// Write the report here instead of stdout
    pub path: Option<String>,
}

/// Report format selection.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    #[serde(rename = "pretty")]
    Pretty,
    #[serde(rename = "json")]
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Glob patterns of case paths to run (empty = everything)
    #[serde(default)]
    pub include: Vec<String>,
    /// Glob patterns of case paths to skip
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            validation: false,
            threads: None,
            fail_fast: false,
        }
    }
}

impl CtsConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, CtsError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::parse(&content)?;
        debug!("loaded configuration from {}", path);
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, CtsError> {
        toml::from_str(content).map_err(|e| CtsError::Config(e.to_string()))
    }

    /// Load configuration from file if it exists, otherwise return defaults.
    pub fn load_or_default(path: &str) -> Self {
        Self::load(path).unwrap_or_default()
    }
}

/// Returns the default config file path based on platform conventions.
/// Search order:
/// 1. System-wide config: `%PROGRAMDATA%\cts\cts.toml` (Windows) or `/etc/cts/cts.toml` (Linux/macOS)
/// 2. Local fallback: `./cts.toml`
pub fn default_config_path() -> String {
    #[cfg(windows)]
    {
        let programdata = std::env::var("PROGRAMDATA")
            .unwrap_or_else(|_| r"C:\ProgramData".to_string());
        let system_path = format!(r"{}\cts\cts.toml", programdata);
        if std::path::Path::new(&system_path).exists() {
            return system_path;
        }
    }
    #[cfg(not(windows))]
    {
        let system_path = "/etc/cts/cts.toml";
        if std::path::Path::new(system_path).exists() {
            return system_path.to_string();
        }
    }
    "cts.toml".to_string()
}
