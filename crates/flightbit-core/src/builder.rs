// Columnar batch builder
//
// Owns one Arrow builder per schema field. Values are appended field by field;
// `end_record` closes a row by null-padding every column the record did not
// touch, so all columns always agree on the number of committed rows.

use arrow::array::{
    ArrayBuilder, ArrayRef, Float32Builder, Float64Builder, Int32Builder, Int64Builder,
    StringBuilder, TimestampSecondBuilder, UInt64Builder,
};
use arrow::datatypes::SchemaRef;
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::schema::FieldType;

/// A value already converted to a column's native type.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Utf8(String),
    Int32(i32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    /// Unix epoch seconds
    Timestamp(i64),
}

impl ColumnValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            ColumnValue::Utf8(_) => FieldType::String,
            ColumnValue::Int32(_) => FieldType::Int32,
            ColumnValue::Int64(_) => FieldType::Int64,
            ColumnValue::UInt64(_) => FieldType::Uint64,
            ColumnValue::Float32(_) => FieldType::Float32,
            ColumnValue::Float64(_) => FieldType::Float64,
            ColumnValue::Timestamp(_) => FieldType::Timestamp,
        }
    }
}

#[derive(Debug, Error)]
pub enum BuilderError {
    #[error("schema field '{field}' has unsupported Arrow type {data_type}")]
    UnsupportedType { field: String, data_type: String },

    #[error("field '{field}' is declared as {expected} but received a {found} value")]
    TypeMismatch {
        field: String,
        expected: FieldType,
        found: FieldType,
    },

    #[error("field '{field}' already has a value in the current record")]
    DuplicateValue { field: String },

    #[error("failed to assemble record batch: {0}")]
    Arrow(#[from] ArrowError),
}

enum ColumnBuilder {
    Utf8(StringBuilder),
    Int32(Int32Builder),
    Int64(Int64Builder),
    UInt64(UInt64Builder),
    Float32(Float32Builder),
    Float64(Float64Builder),
    Timestamp(TimestampSecondBuilder),
}

impl ColumnBuilder {
    fn new(field_type: FieldType) -> Self {
        match field_type {
            FieldType::String => ColumnBuilder::Utf8(StringBuilder::new()),
            FieldType::Int32 => ColumnBuilder::Int32(Int32Builder::new()),
            FieldType::Int64 => ColumnBuilder::Int64(Int64Builder::new()),
            FieldType::Uint64 => ColumnBuilder::UInt64(UInt64Builder::new()),
            FieldType::Float32 => ColumnBuilder::Float32(Float32Builder::new()),
            FieldType::Float64 => ColumnBuilder::Float64(Float64Builder::new()),
            FieldType::Timestamp => ColumnBuilder::Timestamp(TimestampSecondBuilder::new()),
        }
    }

    fn len(&self) -> usize {
        match self {
            ColumnBuilder::Utf8(b) => b.len(),
            ColumnBuilder::Int32(b) => b.len(),
            ColumnBuilder::Int64(b) => b.len(),
            ColumnBuilder::UInt64(b) => b.len(),
            ColumnBuilder::Float32(b) => b.len(),
            ColumnBuilder::Float64(b) => b.len(),
            ColumnBuilder::Timestamp(b) => b.len(),
        }
    }

    /// Append a value of the matching variant; returns the value back on mismatch.
    fn append(&mut self, value: ColumnValue) -> Result<(), ColumnValue> {
        match (self, value) {
            (ColumnBuilder::Utf8(b), ColumnValue::Utf8(v)) => b.append_value(v),
            (ColumnBuilder::Int32(b), ColumnValue::Int32(v)) => b.append_value(v),
            (ColumnBuilder::Int64(b), ColumnValue::Int64(v)) => b.append_value(v),
            (ColumnBuilder::UInt64(b), ColumnValue::UInt64(v)) => b.append_value(v),
            (ColumnBuilder::Float32(b), ColumnValue::Float32(v)) => b.append_value(v),
            (ColumnBuilder::Float64(b), ColumnValue::Float64(v)) => b.append_value(v),
            (ColumnBuilder::Timestamp(b), ColumnValue::Timestamp(v)) => b.append_value(v),
            (_, other) => return Err(other),
        }
        Ok(())
    }

    fn append_null(&mut self) {
        match self {
            ColumnBuilder::Utf8(b) => b.append_null(),
            ColumnBuilder::Int32(b) => b.append_null(),
            ColumnBuilder::Int64(b) => b.append_null(),
            ColumnBuilder::UInt64(b) => b.append_null(),
            ColumnBuilder::Float32(b) => b.append_null(),
            ColumnBuilder::Float64(b) => b.append_null(),
            ColumnBuilder::Timestamp(b) => b.append_null(),
        }
    }

    /// Freeze the accumulated values; the builder is left empty.
    fn finish(&mut self) -> ArrayRef {
        match self {
            ColumnBuilder::Utf8(b) => Arc::new(b.finish()),
            ColumnBuilder::Int32(b) => Arc::new(b.finish()),
            ColumnBuilder::Int64(b) => Arc::new(b.finish()),
            ColumnBuilder::UInt64(b) => Arc::new(b.finish()),
            ColumnBuilder::Float32(b) => Arc::new(b.finish()),
            ColumnBuilder::Float64(b) => Arc::new(b.finish()),
            ColumnBuilder::Timestamp(b) => Arc::new(b.finish()),
        }
    }
}

struct Column {
    field_type: FieldType,
    builder: ColumnBuilder,
}

/// Accumulates records for one schema and materializes them as RecordBatches.
pub struct BatchBuilder {
    schema: SchemaRef,
    columns: Vec<Column>,
    index: HashMap<String, usize>,
    rows: usize,
}

impl BatchBuilder {
    pub fn try_new(schema: SchemaRef) -> Result<Self, BuilderError> {
        let mut columns = Vec::with_capacity(schema.fields().len());
        let mut index = HashMap::with_capacity(schema.fields().len());

        for (position, field) in schema.fields().iter().enumerate() {
            let field_type = FieldType::from_data_type(field.data_type()).ok_or_else(|| {
                BuilderError::UnsupportedType {
                    field: field.name().clone(),
                    data_type: field.data_type().to_string(),
                }
            })?;
            columns.push(Column {
                field_type,
                builder: ColumnBuilder::new(field_type),
            });
            index.insert(field.name().clone(), position);
        }

        Ok(Self {
            schema,
            columns,
            index,
            rows: 0,
        })
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Declared type of `field`, or `None` when the schema does not contain it.
    pub fn field_type(&self, field: &str) -> Option<FieldType> {
        self.index.get(field).map(|&i| self.columns[i].field_type)
    }

    /// Number of committed rows waiting for the next `materialize`.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Append `value` to `field` in the open record.
    ///
    /// Returns `Ok(false)` without touching anything when the schema has no
    /// such field.
    pub fn append(&mut self, field: &str, value: ColumnValue) -> Result<bool, BuilderError> {
        let Some(column) = self.open_column(field)? else {
            return Ok(false);
        };
        let expected = column.field_type;
        column
            .builder
            .append(value)
            .map_err(|rejected| BuilderError::TypeMismatch {
                field: field.to_string(),
                expected,
                found: rejected.field_type(),
            })?;
        Ok(true)
    }

    /// Append an explicit null to `field` in the open record.
    pub fn append_null(&mut self, field: &str) -> Result<bool, BuilderError> {
        let Some(column) = self.open_column(field)? else {
            return Ok(false);
        };
        column.builder.append_null();
        Ok(true)
    }

    fn open_column(&mut self, field: &str) -> Result<Option<&mut Column>, BuilderError> {
        let Some(&position) = self.index.get(field) else {
            return Ok(None);
        };
        let column = &mut self.columns[position];
        if column.builder.len() > self.rows {
            return Err(BuilderError::DuplicateValue {
                field: field.to_string(),
            });
        }
        Ok(Some(column))
    }

    /// Close the open record, null-padding untouched columns.
    ///
    /// Returns `false` and commits nothing if no column received a value.
    pub fn end_record(&mut self) -> bool {
        let rows = self.rows;
        if !self.columns.iter().any(|c| c.builder.len() > rows) {
            return false;
        }
        for column in &mut self.columns {
            if column.builder.len() == rows {
                column.builder.append_null();
            }
        }
        self.rows += 1;
        true
    }

    /// Freeze all columns into one RecordBatch and reset for the next cycle.
    ///
    /// A record that is still open is committed first.
    pub fn materialize(&mut self) -> Result<RecordBatch, BuilderError> {
        self.end_record();
        let arrays: Vec<ArrayRef> = self
            .columns
            .iter_mut()
            .map(|column| column.builder.finish())
            .collect();
        self.rows = 0;
        Ok(RecordBatch::try_new(Arc::clone(&self.schema), arrays)?)
    }
}
