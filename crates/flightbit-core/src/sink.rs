// Batch sink seam
//
// A sink is one ordered, single-producer upload session bound to a schema.
// `SinkConnector` opens sessions; the Arrow Flight implementation lives in
// flightbit-flight, the in-memory one below serves dry runs and tests.

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to open upload session to '{endpoint}': {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("upload session failed: {0}")]
    Transport(String),

    #[error("batch write did not complete within {0:?}")]
    Timeout(Duration),

    #[error("upload session is closed")]
    Closed,
}

impl SinkError {
    pub fn connect(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        Self::Connect {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether retrying the same work on a fresh session may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SinkError::Closed)
    }
}

/// Where and how an instance uploads its batches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkTarget {
    pub endpoint: String,
    pub write_timeout: Duration,
    /// Path sent in the session descriptor; `None` sends an untyped descriptor.
    pub descriptor_path: Option<Vec<String>>,
}

pub trait BatchSink: Send {
    /// Send one batch; batches are delivered in call order.
    fn write(&mut self, batch: RecordBatch) -> Result<(), SinkError>;

    /// End the session and release the connection.
    fn close(&mut self) -> Result<(), SinkError>;
}

pub trait SinkConnector: Send + Sync {
    type Sink: BatchSink;

    /// Open a session for `schema`; the schema descriptor is sent exactly once
    /// before any batch.
    fn connect(&self, target: &SinkTarget, schema: SchemaRef) -> Result<Self::Sink, SinkError>;
}

/// Everything one in-memory session received.
#[derive(Debug, Clone)]
pub struct SessionLog {
    pub endpoint: String,
    pub schema: SchemaRef,
    pub batches: Vec<RecordBatch>,
    pub closed: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    sessions: Vec<SessionLog>,
    fail_writes: usize,
    refuse_connections: bool,
}

/// Connector that keeps every session in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` writes fail with a transport error.
    pub fn fail_next_writes(&self, count: usize) {
        self.state.lock().fail_writes = count;
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.state.lock().refuse_connections = refuse;
    }

    /// Snapshot of all sessions opened so far, in open order.
    pub fn sessions(&self) -> Vec<SessionLog> {
        self.state.lock().sessions.clone()
    }

    /// All batches written to sessions for `endpoint`, in write order.
    pub fn batches_for(&self, endpoint: &str) -> Vec<RecordBatch> {
        self.state
            .lock()
            .sessions
            .iter()
            .filter(|session| session.endpoint == endpoint)
            .flat_map(|session| session.batches.iter().cloned())
            .collect()
    }
}

impl SinkConnector for MemoryConnector {
    type Sink = MemorySink;

    fn connect(&self, target: &SinkTarget, schema: SchemaRef) -> Result<MemorySink, SinkError> {
        let mut state = self.state.lock();
        if state.refuse_connections {
            return Err(SinkError::connect(&target.endpoint, "connection refused"));
        }
        state.sessions.push(SessionLog {
            endpoint: target.endpoint.clone(),
            schema,
            batches: Vec::new(),
            closed: false,
        });
        Ok(MemorySink {
            state: Arc::clone(&self.state),
            session: state.sessions.len() - 1,
        })
    }
}

pub struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
    session: usize,
}

impl BatchSink for MemorySink {
    fn write(&mut self, batch: RecordBatch) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        if state.fail_writes > 0 {
            state.fail_writes -= 1;
            return Err(SinkError::Transport("injected write failure".to_string()));
        }
        let session = &mut state.sessions[self.session];
        if session.closed {
            return Err(SinkError::Closed);
        }
        debug!(
            endpoint = %session.endpoint,
            rows = batch.num_rows(),
            "batch stored in memory"
        );
        session.batches.push(batch);
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.state.lock().sessions[self.session].closed = true;
        Ok(())
    }
}
