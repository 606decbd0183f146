// One DoPut upload session
//
// Batches travel through a bounded channel into a FlightDataEncoder that is
// the request body of the DoPut call. The call itself runs as a task on the
// connector's runtime and drains the server's PutResult acknowledgements.
// A full channel blocks `write`, which is how a slow endpoint pushes back on
// the host.

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use arrow_flight::encode::FlightDataEncoderBuilder;
use arrow_flight::error::FlightError;
use arrow_flight::FlightClient;
use flightbit_core::{BatchSink, SinkError, SinkTarget};
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tonic::transport::Channel;
use tracing::{debug, info};

use crate::{descriptor_for, error_chain};

/// Batches that may wait on the session before `write` blocks.
const SESSION_BUFFER: usize = 1;

type BatchSender = mpsc::Sender<Result<RecordBatch, FlightError>>;

pub struct FlightSink {
    runtime: Arc<Runtime>,
    endpoint: String,
    sender: Option<BatchSender>,
    session: Option<JoinHandle<Result<u64, FlightError>>>,
    write_timeout: Duration,
    batches_sent: u64,
}

impl FlightSink {
    pub(crate) fn start(
        runtime: Arc<Runtime>,
        channel: Channel,
        target: &SinkTarget,
        schema: SchemaRef,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(SESSION_BUFFER);

        // The schema is queued up front, so it is the first frame on the wire
        // even before any batch exists.
        let flight_data = FlightDataEncoderBuilder::new()
            .with_schema(schema)
            .with_flight_descriptor(Some(descriptor_for(target.descriptor_path.as_deref())))
            .build(receiver);

        let mut client = FlightClient::new(channel);
        let endpoint = target.endpoint.clone();
        let session = runtime.spawn(async move {
            let mut results = client.do_put(flight_data).await?;
            let mut acknowledged = 0u64;
            while let Some(result) = results.next().await {
                result?;
                acknowledged += 1;
            }
            debug!(endpoint = %endpoint, acknowledged, "server finished upload session");
            Ok::<u64, FlightError>(acknowledged)
        });

        Self {
            runtime,
            endpoint: target.endpoint.clone(),
            sender: Some(sender),
            session: Some(session),
            write_timeout: target.write_timeout,
            batches_sent: 0,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn batches_sent(&self) -> u64 {
        self.batches_sent
    }

    /// Tear the session down and report why it ended.
    fn session_failure(&mut self) -> SinkError {
        self.sender = None;
        let Some(task) = self.session.take() else {
            return SinkError::Closed;
        };

        let timeout = self.write_timeout;
        match self
            .runtime
            .block_on(async move { tokio::time::timeout(timeout, task).await })
        {
            Ok(Ok(Ok(_))) => SinkError::Transport("server ended the upload session".to_string()),
            Ok(Ok(Err(err))) => SinkError::Transport(error_chain(&err)),
            Ok(Err(join)) => SinkError::Transport(format!("upload task failed: {join}")),
            Err(_) => SinkError::Transport("upload stream stopped accepting batches".to_string()),
        }
    }
}

impl BatchSink for FlightSink {
    fn write(&mut self, batch: RecordBatch) -> Result<(), SinkError> {
        if self
            .session
            .as_ref()
            .is_some_and(|task| task.is_finished())
        {
            return Err(self.session_failure());
        }

        let Some(sender) = self.sender.as_mut() else {
            return Err(SinkError::Closed);
        };

        let rows = batch.num_rows();
        let timeout = self.write_timeout;
        let sent = self
            .runtime
            .block_on(tokio::time::timeout(timeout, sender.send(Ok(batch))));

        match sent {
            Ok(Ok(())) => {
                self.batches_sent += 1;
                debug!(endpoint = %self.endpoint, rows, "batch queued on upload session");
                Ok(())
            }
            // Receiver gone: the DoPut call has ended.
            Ok(Err(_)) => Err(self.session_failure()),
            Err(_) => Err(SinkError::Timeout(timeout)),
        }
    }

    fn close(&mut self) -> Result<(), SinkError> {
        // Dropping the sender ends the request stream.
        drop(self.sender.take());
        let Some(task) = self.session.take() else {
            return Ok(());
        };

        let timeout = self.write_timeout;
        match self
            .runtime
            .block_on(async move { tokio::time::timeout(timeout, task).await })
        {
            Ok(Ok(Ok(acknowledged))) => {
                info!(
                    endpoint = %self.endpoint,
                    batches = self.batches_sent,
                    acknowledged,
                    "upload session closed"
                );
                Ok(())
            }
            Ok(Ok(Err(err))) => Err(SinkError::Transport(error_chain(&err))),
            Ok(Err(join)) => Err(SinkError::Transport(format!("upload task failed: {join}"))),
            Err(_) => Err(SinkError::Timeout(timeout)),
        }
    }
}
