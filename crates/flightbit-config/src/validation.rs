// Configuration validation
//
// Checks the runtime settings. Output sections are validated one by one when
// their instances are created, so a single bad section is reported with its Id.

use crate::RuntimeConfig;
use anyhow::{bail, Result};
use tracing::warn;

pub fn validate_config(config: &RuntimeConfig) -> Result<()> {
    if config.frame_size == 0 {
        bail!("frame_size must be greater than 0");
    }

    if config.frame_size > 1_000_000 {
        warn!(
            frame_size = config.frame_size,
            "frame_size is very large; may cause memory issues"
        );
    }

    if config.log_level.trim().is_empty() {
        bail!("log_level must not be empty");
    }

    if config.outputs.is_empty() {
        bail!("at least one [[outputs]] section is required");
    }

    Ok(())
}
