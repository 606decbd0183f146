// flightbit - Stream schema-less log records to Arrow Flight
//
// The root crate owns the boundary the host agent talks to:
// - registry: Id → instance map, one flush call per decoded frame
// - instance: schema + builder + router + flush controller + upload session
// - replay:   NDJSON input for the standalone binary
//
// Processing logic lives in flightbit-core, configuration parsing in
// flightbit-config and the Flight transport in flightbit-flight.

pub mod init;
pub mod instance;
pub mod registry;
pub mod replay;

pub use init::init_tracing;
pub use instance::{FrameSummary, InstanceError, PluginInstance};
pub use registry::{Registry, RegistryError};
pub use replay::{decode_line, FrameReader, ReplayError};

pub use flightbit_config::{ConfigError, ConfigLookup, PluginConfig, RuntimeConfig};
pub use flightbit_core::{DecodedValue, MemoryConnector, Record};
pub use flightbit_flight::FlightConnector;

/// Result of one flush call, in the host's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    /// Frame accepted.
    Ok,
    /// Transient failure; the host may hand the frame over again.
    Retry,
    /// Permanent failure for this frame.
    Error,
}

impl FlushStatus {
    /// Numeric code used by Fluent Bit's output API (FLB_ERROR, FLB_OK,
    /// FLB_RETRY).
    pub fn code(self) -> i32 {
        match self {
            FlushStatus::Error => 0,
            FlushStatus::Ok => 1,
            FlushStatus::Retry => 2,
        }
    }
}

impl std::fmt::Display for FlushStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FlushStatus::Ok => "ok",
            FlushStatus::Retry => "retry",
            FlushStatus::Error => "error",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_status_codes() {
        assert_eq!(FlushStatus::Error.code(), 0);
        assert_eq!(FlushStatus::Ok.code(), 1);
        assert_eq!(FlushStatus::Retry.code(), 2);
        assert_eq!(FlushStatus::Retry.to_string(), "retry");
    }
}
