//! End-to-end pipeline tests for flightbit
//!
//! Drives the registry the way the host agent does (configuration keys in,
//! frames of decoded records, flush statuses out) against the in-memory
//! connector, then inspects the batches each session received.

use arrow::array::{Array, Int64Array, StringArray, TimestampSecondArray};
use arrow::record_batch::RecordBatch;
use chrono::{NaiveDate, TimeDelta};
use flightbit::{
    decode_line, ConfigError, DecodedValue, FlushStatus, MemoryConnector, Record, Registry,
    RegistryError,
};
use std::collections::HashMap;
use std::io::Write;

const SCHEMA: &str = r#"{
    "fields": [
        {"name": "id", "type": "int64"},
        {"name": "name", "type": "string"},
        {"name": "seen_at", "type": "timestamp"}
    ]
}"#;

fn schema_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(SCHEMA.as_bytes()).unwrap();
    file
}

fn output(id: &str, schema: &tempfile::NamedTempFile, threshold: &str) -> HashMap<String, String> {
    HashMap::from([
        ("Id".to_string(), id.to_string()),
        ("Arrow_Flight_Server_Url".to_string(), format!("mem:{id}")),
        ("Schema_File".to_string(), schema.path().display().to_string()),
        ("Record_Batch_Threshold".to_string(), threshold.to_string()),
        (
            "Time_Fields".to_string(),
            "seen_at=%Y-%m-%dT%H:%M:%S".to_string(),
        ),
    ])
}

fn record(id: i64, seen_at: &str) -> Record {
    Record::new(vec![
        ("id".into(), DecodedValue::Int(id)),
        ("name".into(), DecodedValue::Str(format!("host-{id}"))),
        ("seen_at".into(), DecodedValue::Str(seen_at.to_string())),
    ])
}

fn ids(batch: &RecordBatch) -> Vec<Option<i64>> {
    batch
        .column_by_name("id")
        .unwrap()
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap()
        .iter()
        .collect()
}

fn seen_at(batch: &RecordBatch) -> Vec<Option<i64>> {
    batch
        .column_by_name("seen_at")
        .unwrap()
        .as_any()
        .downcast_ref::<TimestampSecondArray>()
        .unwrap()
        .iter()
        .collect()
}

#[test]
fn threshold_two_flushes_after_third_record() {
    let schema = schema_file();
    let registry = Registry::new(MemoryConnector::new());
    registry.register(&output("logs", &schema, "2")).unwrap();

    let base = NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let frame: Vec<Record> = (0..3)
        .map(|i| {
            let at = base + TimeDelta::seconds(i);
            record(i + 1, &at.format("%Y-%m-%dT%H:%M:%S").to_string())
        })
        .collect();

    assert_eq!(registry.flush("logs", frame), FlushStatus::Ok);
    assert_eq!(registry.pending("logs"), Some(0));

    let batches = registry.connector().batches_for("mem:logs");
    assert_eq!(batches.len(), 1);
    assert_eq!(ids(&batches[0]), vec![Some(1), Some(2), Some(3)]);
    assert_eq!(
        seen_at(&batches[0]),
        vec![Some(1704067200), Some(1704067201), Some(1704067202)]
    );
}

#[test]
fn threshold_is_not_reached_at_equal_count() {
    let schema = schema_file();
    let registry = Registry::new(MemoryConnector::new());
    registry.register(&output("logs", &schema, "2")).unwrap();

    let frame = vec![
        record(1, "2024-01-01T00:00:00"),
        record(2, "2024-01-01T00:00:01"),
    ];
    assert_eq!(registry.flush("logs", frame), FlushStatus::Ok);
    assert_eq!(registry.pending("logs"), Some(2));
    assert!(registry.connector().batches_for("mem:logs").is_empty());
}

#[test]
fn unknown_fields_never_reach_a_batch() {
    let schema = schema_file();
    let registry = Registry::new(MemoryConnector::new());
    registry.register(&output("logs", &schema, "1")).unwrap();

    let mut with_extra = record(1, "2024-01-01T00:00:00");
    with_extra
        .fields
        .push(("extra".into(), DecodedValue::Str("surprise".into())));
    let frame = vec![with_extra, record(2, "2024-01-01T00:00:01")];

    assert_eq!(registry.flush("logs", frame), FlushStatus::Ok);
    let batches = registry.connector().batches_for("mem:logs");
    assert_eq!(batches.len(), 1);
    let batch = &batches[0];
    assert!(batch.column_by_name("extra").is_none());
    assert_eq!(batch.num_columns(), 3);
    for column in batch.columns() {
        assert_eq!(column.len(), 2);
    }
}

#[test]
fn bad_values_become_nulls_without_skewing_columns() {
    let schema = schema_file();
    let registry = Registry::new(MemoryConnector::new());
    registry.register(&output("logs", &schema, "2")).unwrap();

    let frame = vec![
        // Unparseable time: the field is skipped, the row survives.
        record(1, "yesterday"),
        // Float into an int64 column.
        Record::new(vec![
            ("id".into(), DecodedValue::Float(2.5)),
            ("name".into(), DecodedValue::Str("host-2".into())),
        ]),
        Record::new(vec![
            ("id".into(), DecodedValue::Int(3)),
            ("name".into(), DecodedValue::Null),
        ]),
    ];
    assert_eq!(registry.flush("logs", frame), FlushStatus::Ok);

    let batches = registry.connector().batches_for("mem:logs");
    let batch = &batches[0];
    assert_eq!(batch.num_rows(), 3);
    assert_eq!(ids(batch), vec![Some(1), None, Some(3)]);
    assert_eq!(seen_at(batch), vec![None, None, None]);

    let names = batch
        .column_by_name("name")
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    assert_eq!(names.value(0), "host-1");
    assert!(names.is_null(2));
}

#[test]
fn transport_failure_is_retry_and_next_flush_reconnects() {
    let schema = schema_file();
    let connector = MemoryConnector::new();
    let registry = Registry::new(connector.clone());
    registry.register(&output("logs", &schema, "1")).unwrap();

    connector.fail_next_writes(1);
    let frame = vec![
        record(1, "2024-01-01T00:00:00"),
        record(2, "2024-01-01T00:00:01"),
        record(3, "2024-01-01T00:00:02"),
    ];
    assert_eq!(registry.flush("logs", frame), FlushStatus::Retry);

    let frame = vec![
        record(4, "2024-01-01T00:00:03"),
        record(5, "2024-01-01T00:00:04"),
    ];
    assert_eq!(registry.flush("logs", frame), FlushStatus::Ok);

    let sessions = connector.sessions();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[1].schema.fields().len(), 3);
    assert_eq!(ids(&sessions[1].batches[0]), vec![Some(4), Some(5)]);
}

#[test]
fn refused_reconnect_stays_retryable() {
    let schema = schema_file();
    let connector = MemoryConnector::new();
    let registry = Registry::new(connector.clone());
    registry.register(&output("logs", &schema, "1")).unwrap();

    connector.fail_next_writes(1);
    connector.refuse_connections(true);
    let frame = || vec![record(1, "2024-01-01T00:00:00"), record(2, "2024-01-01T00:00:01")];
    assert_eq!(registry.flush("logs", frame()), FlushStatus::Retry);
    assert_eq!(registry.flush("logs", frame()), FlushStatus::Retry);

    connector.refuse_connections(false);
    assert_eq!(registry.flush("logs", frame()), FlushStatus::Ok);
    assert_eq!(connector.batches_for("mem:logs").len(), 1);
}

#[test]
fn shutdown_sends_remaining_rows_and_closes_sessions() {
    let schema = schema_file();
    let registry = Registry::new(MemoryConnector::new());
    registry.register(&output("a", &schema, "100")).unwrap();
    registry.register(&output("b", &schema, "100")).unwrap();

    registry.flush("a", vec![record(1, "2024-01-01T00:00:00")]);
    registry.shutdown().unwrap();

    let sessions = registry.connector().sessions();
    assert_eq!(sessions.len(), 2);
    assert!(sessions.iter().all(|s| s.closed));
    assert_eq!(registry.connector().batches_for("mem:a").len(), 1);
    assert!(registry.connector().batches_for("mem:b").is_empty());
    assert_eq!(registry.flush("a", vec![]), FlushStatus::Error);
}

#[test]
fn configuration_errors_do_not_register() {
    let schema = schema_file();
    let registry = Registry::new(MemoryConnector::new());

    let mut zero = output("zero", &schema, "0");
    assert!(matches!(
        registry.register(&zero),
        Err(RegistryError::Config(ConfigError::Invalid { .. }))
    ));

    zero.remove("Record_Batch_Threshold");
    assert!(matches!(
        registry.register(&zero),
        Err(RegistryError::Config(ConfigError::Missing { .. }))
    ));

    let mut missing_schema = output("nofile", &schema, "1");
    missing_schema.insert("Schema_File".into(), "/does/not/exist.json".into());
    assert!(matches!(
        registry.register(&missing_schema),
        Err(RegistryError::Instance { .. })
    ));

    registry.connector().refuse_connections(true);
    assert!(matches!(
        registry.register(&output("offline", &schema, "1")),
        Err(RegistryError::Instance { .. })
    ));

    assert!(registry.ids().is_empty());
}

#[test]
fn replayed_lines_flow_through_the_registry() {
    let schema = schema_file();
    let registry = Registry::new(MemoryConnector::new());
    registry.register(&output("logs", &schema, "1")).unwrap();

    let lines = [
        r#"[1704067200, {"id": 10, "name": "a", "seen_at": "2024-01-01T00:00:00"}]"#,
        r#"{"id": 11, "name": "b", "seen_at": "2024-01-01T00:00:05"}"#,
    ];
    let frame: Vec<Record> = lines
        .iter()
        .enumerate()
        .filter_map(|(i, line)| decode_line(line, i + 1).unwrap())
        .collect();

    assert_eq!(registry.flush("logs", frame), FlushStatus::Ok);
    let batches = registry.connector().batches_for("mem:logs");
    assert_eq!(ids(&batches[0]), vec![Some(10), Some(11)]);
    assert_eq!(seen_at(&batches[0]), vec![Some(1704067200), Some(1704067205)]);
}
