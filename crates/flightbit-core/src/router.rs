// Field value router
//
// Maps one decoded (name, value) pair onto at most one typed append. The value
// kind decides the conversion; the declared column type decides whether the
// conversion is acceptable. Conversions are lossless except float32 columns,
// which take floats narrowed from f64.
//
// Conversion failures never abort a record: `route_record` logs them, skips the
// field and lets `end_record` pad the gap with a null.

use std::collections::HashMap;
use thiserror::Error;
use tracing::{trace, warn};

use crate::builder::{BatchBuilder, BuilderError, ColumnValue};
use crate::schema::FieldType;
use crate::timefmt::{parse_epoch_seconds, TimeParseError};
use crate::value::{DecodedValue, Record};

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("field '{field}': {source}")]
    TimeParse {
        field: String,
        #[source]
        source: TimeParseError,
    },

    #[error("field '{field}' is declared as {expected}; cannot store a {found} value")]
    Incompatible {
        field: String,
        expected: FieldType,
        found: &'static str,
    },

    #[error("field '{field}': value {value} is out of range for {expected}")]
    OutOfRange {
        field: String,
        expected: FieldType,
        value: String,
    },

    #[error(transparent)]
    Builder(#[from] BuilderError),
}

/// What `route` did with a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// The schema has no such field.
    Dropped,
    Appended,
    Null,
}

/// Per-record routing summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordOutcome {
    pub appended: usize,
    pub dropped: usize,
    pub failed: usize,
    /// Whether the record produced a row.
    pub committed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FieldRouter {
    time_fields: HashMap<String, String>,
}

impl FieldRouter {
    /// `time_fields` maps field names to the strftime format of their values.
    pub fn new(time_fields: HashMap<String, String>) -> Self {
        Self { time_fields }
    }

    pub fn time_format(&self, field: &str) -> Option<&str> {
        self.time_fields.get(field).map(String::as_str)
    }

    /// Route every field of `record` and close the row.
    pub fn route_record(&self, builder: &mut BatchBuilder, record: &Record) -> RecordOutcome {
        let mut outcome = RecordOutcome::default();

        for (name, value) in &record.fields {
            match self.route(builder, name, value) {
                Ok(Routed::Dropped) => {
                    trace!(field = %name, "field not in schema, dropped");
                    outcome.dropped += 1;
                }
                Ok(Routed::Appended | Routed::Null) => outcome.appended += 1,
                Err(err) => {
                    warn!(field = %name, error = %err, "skipping field");
                    outcome.failed += 1;
                }
            }
        }

        outcome.committed = builder.end_record();
        outcome
    }

    /// Route a single value into `builder`.
    pub fn route(
        &self,
        builder: &mut BatchBuilder,
        name: &str,
        value: &DecodedValue,
    ) -> Result<Routed, RouteError> {
        let Some(field_type) = builder.field_type(name) else {
            return Ok(Routed::Dropped);
        };

        let converted = match value {
            DecodedValue::Null => {
                builder.append_null(name)?;
                return Ok(Routed::Null);
            }
            DecodedValue::Bytes(bytes) => {
                self.convert_text(name, field_type, &String::from_utf8_lossy(bytes))?
            }
            DecodedValue::Str(text) => self.convert_text(name, field_type, text)?,
            DecodedValue::Float(f) => convert_float(name, field_type, *f)?,
            DecodedValue::Int(i) => convert_int(name, field_type, *i)?,
            DecodedValue::UInt(u) => convert_uint(name, field_type, *u)?,
            other @ (DecodedValue::Bool(_) | DecodedValue::Array(_) | DecodedValue::Map(_)) => {
                convert_plain_text(name, field_type, other.to_string(), other.kind())?
            }
        };

        builder.append(name, converted)?;
        Ok(Routed::Appended)
    }

    fn convert_text(
        &self,
        name: &str,
        field_type: FieldType,
        text: &str,
    ) -> Result<ColumnValue, RouteError> {
        let Some(format) = self.time_format(name) else {
            return convert_plain_text(name, field_type, text.to_string(), "string");
        };

        let seconds = parse_epoch_seconds(text, format).map_err(|source| RouteError::TimeParse {
            field: name.to_string(),
            source,
        })?;

        match field_type {
            FieldType::Timestamp => Ok(ColumnValue::Timestamp(seconds)),
            FieldType::Int64 => Ok(ColumnValue::Int64(seconds)),
            expected => Err(RouteError::Incompatible {
                field: name.to_string(),
                expected,
                found: "time",
            }),
        }
    }
}

fn convert_plain_text(
    name: &str,
    field_type: FieldType,
    text: String,
    kind: &'static str,
) -> Result<ColumnValue, RouteError> {
    match field_type {
        FieldType::String => Ok(ColumnValue::Utf8(text)),
        expected => Err(RouteError::Incompatible {
            field: name.to_string(),
            expected,
            found: kind,
        }),
    }
}

fn convert_float(name: &str, field_type: FieldType, value: f64) -> Result<ColumnValue, RouteError> {
    match field_type {
        FieldType::Float64 => Ok(ColumnValue::Float64(value)),
        FieldType::Float32 => Ok(ColumnValue::Float32(value as f32)),
        expected => Err(RouteError::Incompatible {
            field: name.to_string(),
            expected,
            found: "float",
        }),
    }
}

fn convert_int(name: &str, field_type: FieldType, value: i64) -> Result<ColumnValue, RouteError> {
    let out_of_range = || RouteError::OutOfRange {
        field: name.to_string(),
        expected: field_type,
        value: value.to_string(),
    };

    match field_type {
        FieldType::Int64 => Ok(ColumnValue::Int64(value)),
        FieldType::Int32 => i32::try_from(value)
            .map(ColumnValue::Int32)
            .map_err(|_| out_of_range()),
        FieldType::Uint64 => u64::try_from(value)
            .map(ColumnValue::UInt64)
            .map_err(|_| out_of_range()),
        FieldType::Float64 => Ok(ColumnValue::Float64(value as f64)),
        FieldType::Float32 => Ok(ColumnValue::Float32(value as f32)),
        // Integers headed for a timestamp column are already epoch seconds.
        FieldType::Timestamp => Ok(ColumnValue::Timestamp(value)),
        FieldType::String => Err(RouteError::Incompatible {
            field: name.to_string(),
            expected: field_type,
            found: "int",
        }),
    }
}

fn convert_uint(name: &str, field_type: FieldType, value: u64) -> Result<ColumnValue, RouteError> {
    let out_of_range = || RouteError::OutOfRange {
        field: name.to_string(),
        expected: field_type,
        value: value.to_string(),
    };

    match field_type {
        FieldType::Uint64 => Ok(ColumnValue::UInt64(value)),
        FieldType::Int64 => i64::try_from(value)
            .map(ColumnValue::Int64)
            .map_err(|_| out_of_range()),
        FieldType::Int32 => i32::try_from(value)
            .map(ColumnValue::Int32)
            .map_err(|_| out_of_range()),
        FieldType::Timestamp => i64::try_from(value)
            .map(ColumnValue::Timestamp)
            .map_err(|_| out_of_range()),
        FieldType::Float64 => Ok(ColumnValue::Float64(value as f64)),
        FieldType::Float32 => Ok(ColumnValue::Float32(value as f32)),
        FieldType::String => Err(RouteError::Incompatible {
            field: name.to_string(),
            expected: field_type,
            found: "uint",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::parse_schema;
    use arrow::array::{
        Array, Float32Array, Int32Array, Int64Array, StringArray, TimestampSecondArray,
    };

    fn builder() -> BatchBuilder {
        let schema = parse_schema(
            r#"{"fields": [
                {"name": "id", "type": "int64"},
                {"name": "name", "type": "string"},
                {"name": "seen_at", "type": "timestamp"},
                {"name": "small", "type": "int32"},
                {"name": "ratio", "type": "float32"}
            ]}"#,
        )
        .unwrap();
        BatchBuilder::try_new(schema).unwrap()
    }

    fn router() -> FieldRouter {
        FieldRouter::new(HashMap::from([(
            "seen_at".to_string(),
            "%Y-%m-%dT%H:%M:%S".to_string(),
        )]))
    }

    fn str_value(s: &str) -> DecodedValue {
        DecodedValue::Bytes(s.as_bytes().to_vec())
    }

    #[test]
    fn test_unknown_field_never_touches_builder() {
        let mut builder = builder();
        let router = router();
        let routed = router
            .route(&mut builder, "extra", &str_value("x"))
            .unwrap();
        assert_eq!(routed, Routed::Dropped);
        assert!(!builder.end_record());
        assert_eq!(builder.rows(), 0);
    }

    #[test]
    fn test_time_field_becomes_epoch_seconds() {
        let mut builder = builder();
        let router = router();
        let record = Record::new(vec![
            ("seen_at".into(), str_value("2024-01-01T00:00:01")),
            ("id".into(), DecodedValue::Int(1)),
        ]);
        let outcome = router.route_record(&mut builder, &record);
        assert!(outcome.committed);
        assert_eq!(outcome.appended, 2);

        let batch = builder.materialize().unwrap();
        let seen = batch
            .column(2)
            .as_any()
            .downcast_ref::<TimestampSecondArray>()
            .unwrap();
        assert_eq!(seen.value(0), 1_704_067_201);
    }

    #[test]
    fn test_bad_time_skips_only_that_field() {
        let mut builder = builder();
        let router = router();
        let record = Record::new(vec![
            ("id".into(), DecodedValue::Int(9)),
            ("seen_at".into(), str_value("not a time")),
            ("name".into(), str_value("kept")),
        ]);
        let outcome = router.route_record(&mut builder, &record);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.appended, 2);
        assert!(outcome.committed);

        let batch = builder.materialize().unwrap();
        assert_eq!(batch.num_rows(), 1);
        assert!(batch.column(2).is_null(0));
        let names = batch
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(names.value(0), "kept");
    }

    #[test]
    fn test_null_is_appended_explicitly() {
        let mut builder = builder();
        let routed = router()
            .route(&mut builder, "name", &DecodedValue::Null)
            .unwrap();
        assert_eq!(routed, Routed::Null);
        assert!(builder.end_record());
        let batch = builder.materialize().unwrap();
        assert!(batch.column(1).is_null(0));
    }

    #[test]
    fn test_other_kinds_are_stringified() {
        let mut builder = builder();
        let router = router();
        router
            .route(&mut builder, "name", &DecodedValue::Bool(true))
            .unwrap();
        builder.end_record();
        router
            .route(
                &mut builder,
                "name",
                &DecodedValue::Array(vec![DecodedValue::Int(1), DecodedValue::Int(2)]),
            )
            .unwrap();
        builder.end_record();

        let batch = builder.materialize().unwrap();
        let names = batch
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(names.value(0), "true");
        assert_eq!(names.value(1), "[1,2]");
    }

    #[test]
    fn test_integer_conversions_follow_schema() {
        let mut builder = builder();
        let router = router();
        router
            .route(&mut builder, "small", &DecodedValue::Int(12))
            .unwrap();
        router
            .route(&mut builder, "ratio", &DecodedValue::Float(0.25))
            .unwrap();
        router
            .route(&mut builder, "id", &DecodedValue::UInt(5))
            .unwrap();
        builder.end_record();

        let batch = builder.materialize().unwrap();
        let small = batch
            .column(3)
            .as_any()
            .downcast_ref::<Int32Array>()
            .unwrap();
        assert_eq!(small.value(0), 12);
        let ratio = batch
            .column(4)
            .as_any()
            .downcast_ref::<Float32Array>()
            .unwrap();
        assert_eq!(ratio.value(0), 0.25);
        let ids = batch
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(ids.value(0), 5);
    }

    #[test]
    fn test_out_of_range_and_incompatible_values_are_errors() {
        let mut builder = builder();
        let router = router();
        let err = router
            .route(&mut builder, "small", &DecodedValue::Int(i64::MAX))
            .unwrap_err();
        assert!(matches!(err, RouteError::OutOfRange { .. }));

        let err = router
            .route(&mut builder, "id", &DecodedValue::Float(1.5))
            .unwrap_err();
        assert!(matches!(
            err,
            RouteError::Incompatible {
                expected: FieldType::Int64,
                found: "float",
                ..
            }
        ));

        let err = router
            .route(&mut builder, "id", &str_value("12"))
            .unwrap_err();
        assert!(matches!(err, RouteError::Incompatible { found: "string", .. }));

        // Nothing reached the builder
        assert!(!builder.end_record());
    }

    #[test]
    fn test_record_with_only_unknown_fields_commits_nothing() {
        let mut builder = builder();
        let record = Record::new(vec![("extra".into(), str_value("x"))]);
        let outcome = router().route_record(&mut builder, &record);
        assert_eq!(outcome.dropped, 1);
        assert!(!outcome.committed);
        assert_eq!(builder.rows(), 0);
    }
}
