// flightbit-core - Record-to-batch processing
//
// This crate contains the PURE processing logic for turning schema-less
// key/value records into Arrow record batches. No networking, no async.
//
// - schema:  JSON schema file → Arrow schema
// - value:   closed union of values decoded by the host agent
// - builder: per-field Arrow builders, materialized into RecordBatches
// - router:  decoded (name, value) → typed append, incl. time parsing
// - flush:   threshold-based flush decisions
// - sink:    the seam between batch production and transport

pub mod builder;
pub mod flush;
pub mod router;
pub mod schema;
pub mod sink;
pub mod timefmt;
pub mod value;

// Re-export commonly used types
pub use builder::{BatchBuilder, BuilderError, ColumnValue};
pub use flush::FlushController;
pub use router::{FieldRouter, RecordOutcome, RouteError, Routed};
pub use schema::{load_schema, parse_schema, FieldType, SchemaError};
pub use sink::{BatchSink, MemoryConnector, MemorySink, SinkConnector, SinkError, SinkTarget};
pub use value::{DecodedValue, Record};
