// One configured output pipeline
//
// Ties a schema, its batch builder, the field router, the flush controller and
// an upload session together. All methods take `&mut self`; the registry
// serializes access per instance.

use arrow::datatypes::SchemaRef;
use flightbit_config::PluginConfig;
use flightbit_core::{
    load_schema, BatchBuilder, BatchSink, BuilderError, FieldRouter, FieldType, FlushController,
    Record, SchemaError, SinkConnector, SinkError, SinkTarget,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum InstanceError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Builder(#[from] BuilderError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Counters for one processed frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameSummary {
    /// Records that produced a row.
    pub records: usize,
    /// Records without a single usable field.
    pub skipped_records: usize,
    /// Individual fields dropped because of conversion errors.
    pub failed_fields: usize,
    pub batches: usize,
}

pub struct PluginInstance<S: BatchSink> {
    id: String,
    target: SinkTarget,
    builder: BatchBuilder,
    router: FieldRouter,
    flush: FlushController,
    sink: Option<S>,
}

impl<S: BatchSink> PluginInstance<S> {
    /// Load the schema and open the upload session.
    ///
    /// Any failure here is fatal for the instance; nothing is retried.
    pub fn create<C>(config: PluginConfig, connector: &C) -> Result<Self, InstanceError>
    where
        C: SinkConnector<Sink = S>,
    {
        let schema = load_schema(&config.schema_file)?;
        check_time_fields(&config, &schema);

        let builder = BatchBuilder::try_new(schema.clone())?;
        let target = SinkTarget {
            endpoint: config.flight_server_url.clone(),
            write_timeout: config.write_timeout,
            descriptor_path: config.descriptor_path.clone(),
        };
        let sink = connector.connect(&target, schema)?;

        info!(
            instance = %config.id,
            endpoint = %target.endpoint,
            threshold = config.record_batch_threshold.get(),
            "instance created"
        );

        Ok(Self {
            id: config.id,
            target,
            builder,
            router: FieldRouter::new(config.time_fields),
            flush: FlushController::new(config.record_batch_threshold),
            sink: Some(sink),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn schema(&self) -> &SchemaRef {
        self.builder.schema()
    }

    /// Records appended since the last flush.
    pub fn pending(&self) -> usize {
        self.flush.pending()
    }

    /// Route every record of one frame, flushing whenever the threshold is
    /// exceeded.
    ///
    /// Stops at the first failed flush and returns its error; records already
    /// routed stay counted in `pending`.
    pub fn process<C, I>(&mut self, connector: &C, records: I) -> Result<FrameSummary, InstanceError>
    where
        C: SinkConnector<Sink = S>,
        I: IntoIterator<Item = Record>,
    {
        let mut summary = FrameSummary::default();

        for record in records {
            let outcome = self.router.route_record(&mut self.builder, &record);
            summary.failed_fields += outcome.failed;
            if !outcome.committed {
                debug!(instance = %self.id, dropped = outcome.dropped, "record has no schema fields");
                summary.skipped_records += 1;
                continue;
            }
            summary.records += 1;

            if self.flush.record_committed() {
                self.flush_batch(connector)?;
                summary.batches += 1;
            }
        }

        Ok(summary)
    }

    /// Send whatever is pending, even below the threshold.
    pub fn drain<C>(&mut self, connector: &C) -> Result<usize, InstanceError>
    where
        C: SinkConnector<Sink = S>,
    {
        if self.builder.rows() == 0 {
            return Ok(0);
        }
        self.flush_batch(connector)
    }

    /// Drain pending rows and end the upload session.
    pub fn close<C>(&mut self, connector: &C) -> Result<(), InstanceError>
    where
        C: SinkConnector<Sink = S>,
    {
        let drained = self.drain(connector);
        if let Some(mut sink) = self.sink.take() {
            sink.close()?;
        }
        drained.map(|_| ())
    }

    fn flush_batch<C>(&mut self, connector: &C) -> Result<usize, InstanceError>
    where
        C: SinkConnector<Sink = S>,
    {
        let batch = self.builder.materialize()?;
        self.flush.reset();
        let rows = batch.num_rows();

        if self.sink.is_none() {
            info!(instance = %self.id, endpoint = %self.target.endpoint, "reopening upload session");
            let schema = self.builder.schema().clone();
            match connector.connect(&self.target, schema) {
                Ok(sink) => self.sink = Some(sink),
                Err(err) => {
                    error!(instance = %self.id, rows, error = %err, "dropping batch: cannot reopen session");
                    return Err(err.into());
                }
            }
        }
        let Some(sink) = self.sink.as_mut() else {
            return Err(SinkError::Closed.into());
        };

        match sink.write(batch) {
            Ok(()) => {
                debug!(instance = %self.id, rows, "batch written");
                Ok(rows)
            }
            Err(err) => {
                error!(instance = %self.id, rows, error = %err, "dropping batch: write failed");
                // The session is unusable; the next flush opens a new one.
                self.sink = None;
                Err(err.into())
            }
        }
    }
}

fn check_time_fields(config: &PluginConfig, schema: &SchemaRef) {
    for field in config.time_fields.keys() {
        match schema.field_with_name(field).ok().map(|f| FieldType::from_data_type(f.data_type())) {
            None => warn!(instance = %config.id, field = %field, "time field is not part of the schema"),
            Some(Some(FieldType::Timestamp | FieldType::Int64)) => {}
            Some(field_type) => warn!(
                instance = %config.id,
                field = %field,
                field_type = ?field_type,
                "time field should be declared as timestamp or int64"
            ),
        }
    }
}
