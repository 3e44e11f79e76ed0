//! Engine options and option file loading

use crate::error::{Result, ScriptError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Option file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML
    Yaml,
    /// TOML
    Toml,
    /// JSON
    Json,
}

impl ConfigFormat {
    /// Detect the format from a file extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Ok(Self::Yaml),
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            _ => Err(ScriptError::config(format!(
                "Unsupported options file format: {}",
                path.display()
            ))),
        }
    }
}

/// Runtime limits and port defaults for an engine
///
/// A limit of zero means unlimited, except where noted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Maximum operations per evaluation
    pub max_operations: u64,
    /// Maximum function call nesting; must be non-zero
    pub max_call_levels: usize,
    /// Maximum expression nesting at global level
    pub max_expr_depth: usize,
    /// Maximum expression nesting inside functions
    pub max_function_expr_depth: usize,
    /// Maximum string length in bytes
    pub max_string_size: usize,
    /// Maximum array length
    pub max_array_size: usize,
    /// Maximum number of object properties
    pub max_map_size: usize,
    /// Timeout of the default network port; must be non-zero
    #[serde(with = "humantime_serde")]
    pub network_timeout: Duration,
    /// Base directory of the default storage port
    pub storage_base_path: Option<PathBuf>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_operations: 0,
            max_call_levels: 64,
            max_expr_depth: 64,
            max_function_expr_depth: 32,
            max_string_size: 0,
            max_array_size: 0,
            max_map_size: 0,
            network_timeout: Duration::from_secs(30),
            storage_base_path: None,
        }
    }
}

impl EngineOptions {
    /// Load options from a YAML, TOML or JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ScriptError::config(format!("Failed to read options file: {e}")))?;
        let options = Self::parse(&content, ConfigFormat::from_path(path)?)?;
        options.validate()?;
        Ok(options)
    }

    /// Parse options from a string
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        let options = match format {
            ConfigFormat::Yaml => serde_yaml::from_str(content)
                .map_err(|e| ScriptError::config(format!("Failed to parse YAML: {e}")))?,
            ConfigFormat::Toml => toml::from_str(content)
                .map_err(|e| ScriptError::config(format!("Failed to parse TOML: {e}")))?,
            ConfigFormat::Json => serde_json::from_str(content)
                .map_err(|e| ScriptError::config(format!("Failed to parse JSON: {e}")))?,
        };
        Ok(options)
    }

    /// Check option values the runtime cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.max_call_levels == 0 {
            return Err(ScriptError::config("max_call_levels must be greater than 0"));
        }
        if self.network_timeout.is_zero() {
            return Err(ScriptError::config("network_timeout must be greater than 0"));
        }
        Ok(())
    }

    /// Set the operation limit
    pub fn with_max_operations(mut self, max_operations: u64) -> Self {
        self.max_operations = max_operations;
        self
    }

    /// Set the default storage base directory
    pub fn with_storage_base_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.storage_base_path = Some(path.into());
        self
    }

    pub(crate) fn apply(&self, runtime: &mut rhai::Engine) {
        runtime.set_max_operations(self.max_operations);
        runtime.set_max_call_levels(self.max_call_levels);
        runtime.set_max_expr_depths(self.max_expr_depth, self.max_function_expr_depth);
        runtime.set_max_string_size(self.max_string_size);
        runtime.set_max_array_size(self.max_array_size);
        runtime.set_max_map_size(self.max_map_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection() {
        assert_eq!(ConfigFormat::from_path("a.yml").unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path("a.toml").unwrap(), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path("a.json").unwrap(), ConfigFormat::Json);
        assert!(ConfigFormat::from_path("a.ini").is_err());
    }

    #[test]
    fn test_parse_yaml() {
        let options = EngineOptions::parse(
            "max_operations: 5000\nnetwork_timeout: 5s\nstorage_base_path: /var/lib/rules\n",
            ConfigFormat::Yaml,
        )
        .unwrap();
        assert_eq!(options.max_operations, 5000);
        assert_eq!(options.network_timeout, Duration::from_secs(5));
        assert_eq!(options.storage_base_path, Some(PathBuf::from("/var/lib/rules")));
        assert_eq!(options.max_call_levels, 64);
    }

    #[test]
    fn test_parse_toml_and_json() {
        let toml = EngineOptions::parse("max_string_size = 1024\n", ConfigFormat::Toml).unwrap();
        assert_eq!(toml.max_string_size, 1024);

        let json = EngineOptions::parse(r#"{"network_timeout": "250ms"}"#, ConfigFormat::Json).unwrap();
        assert_eq!(json.network_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_parse_error() {
        let err = EngineOptions::parse("max_operations: [", ConfigFormat::Yaml).unwrap_err();
        assert!(matches!(err, ScriptError::Config { .. }));
    }

    #[test]
    fn test_validate() {
        assert!(EngineOptions::default().validate().is_ok());
        let options = EngineOptions {
            max_call_levels: 0,
            ..EngineOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        fs::write(&path, "max_operations = 100\nnetwork_timeout = \"2s\"\n").unwrap();

        let options = EngineOptions::load(&path).unwrap();
        assert_eq!(options.max_operations, 100);
        assert_eq!(options.network_timeout, Duration::from_secs(2));
    }
}
