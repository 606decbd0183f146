// Schema file loading
//
// A schema file is a small JSON document listing the output columns in order:
//
//   { "fields": [ { "name": "id", "type": "int64" }, ... ] }
//
// Every column is nullable: absent and null values are stored as nulls so
// that all columns of a batch keep the same length.

use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Primitive column types supported by the batch builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[serde(alias = "utf8")]
    String,
    Int32,
    Int64,
    Uint64,
    Float32,
    #[serde(alias = "double")]
    Float64,
    Timestamp,
}

impl FieldType {
    /// Arrow data type used for columns of this type.
    ///
    /// Timestamps are stored as Unix epoch seconds without a timezone.
    pub fn data_type(&self) -> DataType {
        match self {
            FieldType::String => DataType::Utf8,
            FieldType::Int32 => DataType::Int32,
            FieldType::Int64 => DataType::Int64,
            FieldType::Uint64 => DataType::UInt64,
            FieldType::Float32 => DataType::Float32,
            FieldType::Float64 => DataType::Float64,
            FieldType::Timestamp => DataType::Timestamp(TimeUnit::Second, None),
        }
    }

    /// Inverse of [`FieldType::data_type`]; `None` for anything we cannot build.
    pub fn from_data_type(data_type: &DataType) -> Option<Self> {
        match data_type {
            DataType::Utf8 => Some(FieldType::String),
            DataType::Int32 => Some(FieldType::Int32),
            DataType::Int64 => Some(FieldType::Int64),
            DataType::UInt64 => Some(FieldType::Uint64),
            DataType::Float32 => Some(FieldType::Float32),
            DataType::Float64 => Some(FieldType::Float64),
            DataType::Timestamp(TimeUnit::Second, None) => Some(FieldType::Timestamp),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Int32 => "int32",
            FieldType::Int64 => "int64",
            FieldType::Uint64 => "uint64",
            FieldType::Float32 => "float32",
            FieldType::Float64 => "float64",
            FieldType::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read schema file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed schema description: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("schema must declare at least one field")]
    Empty,

    #[error("schema field name must not be empty (position {position})")]
    EmptyName { position: usize },

    #[error("duplicate schema field '{name}'")]
    DuplicateField { name: String },
}

#[derive(Debug, Deserialize)]
struct SchemaFile {
    fields: Vec<FieldSpec>,
}

#[derive(Debug, Deserialize)]
struct FieldSpec {
    name: String,
    #[serde(rename = "type")]
    field_type: FieldType,
}

/// Load and validate a schema description from disk.
pub fn load_schema(path: impl AsRef<Path>) -> Result<SchemaRef, SchemaError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| SchemaError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_schema(&content)
}

/// Parse a schema description from its JSON text.
pub fn parse_schema(json: &str) -> Result<SchemaRef, SchemaError> {
    let file: SchemaFile = serde_json::from_str(json)?;
    if file.fields.is_empty() {
        return Err(SchemaError::Empty);
    }

    let mut seen = HashSet::with_capacity(file.fields.len());
    let mut fields = Vec::with_capacity(file.fields.len());
    for (position, entry) in file.fields.into_iter().enumerate() {
        if entry.name.is_empty() {
            return Err(SchemaError::EmptyName { position });
        }
        if !seen.insert(entry.name.clone()) {
            return Err(SchemaError::DuplicateField { name: entry.name });
        }
        fields.push(Field::new(entry.name, entry.field_type.data_type(), true));
    }

    Ok(Arc::new(Schema::new(fields)))
}
