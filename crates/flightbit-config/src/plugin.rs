// Per-instance plugin configuration
//
// The host hands every output instance a flat set of string keys. Keys are
// matched case-insensitively, the way the host itself treats them.

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub const KEY_ID: &str = "Id";
pub const KEY_TIME_FIELDS: &str = "Time_Fields";
pub const KEY_FLIGHT_SERVER_URL: &str = "Arrow_Flight_Server_Url";
pub const KEY_SCHEMA_FILE: &str = "Schema_File";
pub const KEY_RECORD_BATCH_THRESHOLD: &str = "Record_Batch_Threshold";
pub const KEY_WRITE_TIMEOUT: &str = "Write_Timeout";
pub const KEY_DESCRIPTOR_PATH: &str = "Flight_Descriptor_Path";

const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("mandatory parameter {key} not configured")]
    Missing { key: &'static str },

    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Source of flat configuration keys.
pub trait ConfigLookup {
    /// Case-insensitive lookup of `key`.
    fn get(&self, key: &str) -> Option<String>;
}

impl ConfigLookup for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        self.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.clone())
    }
}

impl ConfigLookup for BTreeMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        self.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.clone())
    }
}

/// Validated configuration of one output instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginConfig {
    pub id: String,
    /// Field name → strftime format
    pub time_fields: HashMap<String, String>,
    pub flight_server_url: String,
    pub schema_file: PathBuf,
    pub record_batch_threshold: NonZeroUsize,
    pub write_timeout: Duration,
    pub descriptor_path: Option<Vec<String>>,
}

impl PluginConfig {
    pub fn from_lookup<L: ConfigLookup + ?Sized>(lookup: &L) -> Result<Self, ConfigError> {
        let id = required(lookup, KEY_ID)?;
        let flight_server_url = required(lookup, KEY_FLIGHT_SERVER_URL)?;
        let schema_file = PathBuf::from(required(lookup, KEY_SCHEMA_FILE)?);

        let threshold_raw = required(lookup, KEY_RECORD_BATCH_THRESHOLD)?;
        let record_batch_threshold = threshold_raw
            .parse::<usize>()
            .ok()
            .and_then(NonZeroUsize::new)
            .ok_or_else(|| ConfigError::Invalid {
                key: KEY_RECORD_BATCH_THRESHOLD,
                value: threshold_raw.clone(),
                reason: "expected a positive integer".to_string(),
            })?;

        let write_timeout = match optional(lookup, KEY_WRITE_TIMEOUT) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::Invalid {
                        key: KEY_WRITE_TIMEOUT,
                        value: raw,
                        reason: "expected a positive number of seconds".to_string(),
                    })
                }
            },
            None => Duration::from_secs(DEFAULT_WRITE_TIMEOUT_SECS),
        };

        let time_fields = match optional(lookup, KEY_TIME_FIELDS) {
            Some(raw) => {
                info!(instance = %id, "{} configured", KEY_TIME_FIELDS);
                parse_time_fields(&raw)
            }
            None => HashMap::new(),
        };

        let descriptor_path = optional(lookup, KEY_DESCRIPTOR_PATH).map(|raw| {
            raw.split('/')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        });
        if matches!(&descriptor_path, Some(path) if path.is_empty()) {
            return Err(ConfigError::Invalid {
                key: KEY_DESCRIPTOR_PATH,
                value: optional(lookup, KEY_DESCRIPTOR_PATH).unwrap_or_default(),
                reason: "path has no segments".to_string(),
            });
        }

        Ok(Self {
            id,
            time_fields,
            flight_server_url,
            schema_file,
            record_batch_threshold,
            write_timeout,
            descriptor_path,
        })
    }
}

/// Parse `field=format` pairs separated by commas.
///
/// Malformed pairs are skipped with a warning. Only the first `=` splits a
/// pair, so formats may contain `=` themselves.
pub fn parse_time_fields(raw: &str) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    for pair in raw.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        match pair.split_once('=') {
            Some((field, format)) if !field.trim().is_empty() && !format.trim().is_empty() => {
                let (field, format) = (field.trim(), format.trim());
                info!(field, format, "time field configured");
                fields.insert(field.to_string(), format.to_string());
            }
            _ => warn!(entry = pair, "ignoring malformed {} entry", KEY_TIME_FIELDS),
        }
    }
    fields
}

fn required<L: ConfigLookup + ?Sized>(lookup: &L, key: &'static str) -> Result<String, ConfigError> {
    optional(lookup, key).ok_or(ConfigError::Missing { key })
}

fn optional<L: ConfigLookup + ?Sized>(lookup: &L, key: &str) -> Option<String> {
    lookup
        .get(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
