//! Arrow Flight upload sessions.
//!
//! Every output instance owns one long-lived `DoPut` call. The schema message
//! (carrying the flight descriptor) is the first frame on the stream, every
//! materialized batch follows in write order. The sink API is synchronous: it
//! enters a small tokio runtime owned by [`FlightConnector`], so the host's
//! flush call blocks until the batch is queued on the session.

use arrow::datatypes::SchemaRef;
use arrow_flight::flight_descriptor::DescriptorType;
use arrow_flight::FlightDescriptor;
use flightbit_core::{SinkConnector, SinkError, SinkTarget};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tonic::transport::Endpoint;
use tracing::info;

mod session;

pub use session::FlightSink;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens Flight `DoPut` sessions; owns the runtime every session runs on.
pub struct FlightConnector {
    runtime: Arc<Runtime>,
    connect_timeout: Duration,
}

impl FlightConnector {
    pub fn new() -> Result<Self, SinkError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("flightbit-io")
            .enable_all()
            .build()
            .map_err(|e| SinkError::Transport(format!("failed to start I/O runtime: {e}")))?;

        Ok(Self {
            runtime: Arc::new(runtime),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl SinkConnector for FlightConnector {
    type Sink = FlightSink;

    fn connect(&self, target: &SinkTarget, schema: SchemaRef) -> Result<FlightSink, SinkError> {
        let url = normalize_endpoint(&target.endpoint);
        let endpoint = Endpoint::from_shared(url)
            .map_err(|e| SinkError::connect(&target.endpoint, error_chain(&e)))?
            .connect_timeout(self.connect_timeout);

        let channel = self
            .runtime
            .block_on(endpoint.connect())
            .map_err(|e| SinkError::connect(&target.endpoint, error_chain(&e)))?;

        info!(endpoint = %target.endpoint, "connected to Flight endpoint");

        Ok(FlightSink::start(
            Arc::clone(&self.runtime),
            channel,
            target,
            schema,
        ))
    }
}

/// Accept bare `host:port` addresses as plaintext HTTP/2 endpoints.
pub fn normalize_endpoint(endpoint: &str) -> String {
    let endpoint = endpoint.trim();
    if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}

/// Descriptor sent with the schema message.
pub fn descriptor_for(path: Option<&[String]>) -> FlightDescriptor {
    match path {
        Some(path) => FlightDescriptor::new_path(path.to_vec()),
        None => FlightDescriptor {
            r#type: DescriptorType::Unknown as i32,
            ..Default::default()
        },
    }
}

/// Render an error with its source chain; tonic's top-level messages are terse.
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
