// Configuration source loading
//
// Priority order:
// 1. Environment variables (FLIGHTBIT_* prefix)
// 2. Config file given on the command line
// 3. Built-in defaults

use crate::{LogFormat, RuntimeConfig};
use anyhow::{Context, Result};
use std::env;
use std::path::Path;

pub const ENV_PREFIX: &str = "FLIGHTBIT_";

/// Abstraction over environment-variable lookups so tests can supply their
/// own source of overrides.
pub trait EnvSource {
    /// Look up `key` with the FLIGHTBIT_ prefix applied.
    fn get(&self, key: &str) -> Option<String>;
}

struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }
}

/// Load configuration from a specific file path (for the CLI --config flag).
/// Returns error if the file doesn't exist or can't be parsed.
pub fn load_from_file_path(path: impl AsRef<Path>) -> Result<RuntimeConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let mut config: RuntimeConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    apply_env_overrides(&mut config, &StdEnvSource)?;

    config.validate()?;
    Ok(config)
}

/// Apply environment-variable overrides (highest priority) to the runtime config.
pub fn apply_env_overrides<E: EnvSource>(config: &mut RuntimeConfig, env: &E) -> Result<()> {
    if let Some(level) = env.get("LOG_LEVEL").filter(|v| !v.is_empty()) {
        config.log_level = level;
    }
    if let Some(format) = env.get("LOG_FORMAT").filter(|v| !v.is_empty()) {
        config.log_format = format
            .parse::<LogFormat>()
            .context("Invalid FLIGHTBIT_LOG_FORMAT value")?;
    }
    if let Some(frame_size) = env.get("FRAME_SIZE").filter(|v| !v.is_empty()) {
        config.frame_size = frame_size
            .parse::<usize>()
            .with_context(|| format!("Invalid FLIGHTBIT_FRAME_SIZE value: {}", frame_size))?;
    }
    Ok(())
}
