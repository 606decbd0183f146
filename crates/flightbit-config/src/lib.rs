// flightbit-config - Configuration for plugin instances and the replay binary
//
// Two layers:
// 1. PluginConfig: the flat, case-insensitive keys each output instance is
//    configured with (what the host agent hands over).
// 2. RuntimeConfig: the TOML file read by the standalone binary. It carries
//    logging settings plus one flat table per output instance. Environment
//    variables (FLIGHTBIT_*) override file values.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

mod plugin;
mod sources;
mod validation;

pub use plugin::{
    parse_time_fields, ConfigError, ConfigLookup, PluginConfig, KEY_DESCRIPTOR_PATH,
    KEY_FLIGHT_SERVER_URL, KEY_ID, KEY_RECORD_BATCH_THRESHOLD, KEY_SCHEMA_FILE,
    KEY_TIME_FIELDS, KEY_WRITE_TIMEOUT,
};
pub use sources::{apply_env_overrides, EnvSource, ENV_PREFIX};

/// Configuration of the standalone binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Number of input records handed to each flush call.
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,

    /// One flat key/value table per output instance.
    #[serde(default)]
    pub outputs: Vec<toml::Table>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => bail!("Unsupported log format: {}. Supported: text, json", s),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_frame_size() -> usize {
    256
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            frame_size: default_frame_size(),
            outputs: Vec::new(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a TOML file, then apply environment overrides
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        sources::load_from_file_path(path)
    }

    /// Parse configuration from TOML text (no environment overrides)
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    /// Output sections flattened to string key/value maps.
    ///
    /// Scalar TOML values are rendered as strings, so `Record_Batch_Threshold = 2`
    /// and `Record_Batch_Threshold = "2"` are equivalent.
    pub fn output_lookups(&self) -> Result<Vec<BTreeMap<String, String>>> {
        self.outputs
            .iter()
            .enumerate()
            .map(|(position, table)| {
                table
                    .iter()
                    .map(|(key, value)| {
                        let rendered = match value {
                            toml::Value::String(s) => s.clone(),
                            toml::Value::Integer(i) => i.to_string(),
                            toml::Value::Float(f) => f.to_string(),
                            toml::Value::Boolean(b) => b.to_string(),
                            toml::Value::Datetime(d) => d.to_string(),
                            toml::Value::Array(_) | toml::Value::Table(_) => bail!(
                                "outputs[{}].{} must be a scalar value",
                                position,
                                key
                            ),
                        };
                        Ok((key.clone(), rendered))
                    })
                    .collect::<Result<BTreeMap<_, _>>>()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.frame_size, 256);
        assert!(config.outputs.is_empty());
    }

    #[test]
    fn test_output_lookups_render_scalars() {
        let config = RuntimeConfig::from_toml(
            r#"
            log_format = "json"

            [[outputs]]
            Id = "a"
            Arrow_Flight_Server_Url = "localhost:8082"
            Schema_File = "schema.json"
            Record_Batch_Threshold = 2

            [[outputs]]
            Id = "b"
            Record_Batch_Threshold = "100"
            "#,
        )
        .unwrap();

        assert_eq!(config.log_format, LogFormat::Json);
        let lookups = config.output_lookups().unwrap();
        assert_eq!(lookups.len(), 2);
        assert_eq!(lookups[0]["Record_Batch_Threshold"], "2");
        assert_eq!(lookups[1]["Record_Batch_Threshold"], "100");
        assert_eq!(lookups[1].get("Schema_File"), None);
    }

    #[test]
    fn test_output_lookups_reject_nested_values() {
        let config = RuntimeConfig::from_toml(
            r#"
            [[outputs]]
            Id = ["a", "b"]
            "#,
        )
        .unwrap();
        let err = config.output_lookups().unwrap_err();
        assert!(err.to_string().contains("outputs[0].Id"));
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
