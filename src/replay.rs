// Replay input decoding
//
// Newline-delimited JSON, one record per line, in the shapes a Fluent Bit
// agent emits when it dumps records as JSON:
//   {"k": "v"}
//   [1704067200.5, {"k": "v"}]
//   [[1704067200, {"meta": 1}], {"k": "v"}]
// Timestamps may also be {"sec": s, "nsec": n} objects.

use flightbit_core::{DecodedValue, Record};
use serde_json::Value as JsonValue;
use std::io::BufRead;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("line {line}: invalid JSON: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("line {line}: {reason}")]
    Shape { line: usize, reason: &'static str },

    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
}

/// Decode one input line. Returns `Ok(None)` for blank lines.
pub fn decode_line(line: &str, line_number: usize) -> Result<Option<Record>, ReplayError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let value: JsonValue = serde_json::from_str(line).map_err(|source| ReplayError::Json {
        line: line_number,
        source,
    })?;

    let shape = |reason| ReplayError::Shape {
        line: line_number,
        reason,
    };

    match value {
        JsonValue::Object(body) => Ok(Some(record_from_body(body, None))),
        JsonValue::Array(mut items) => {
            if items.len() != 2 {
                return Err(shape("expected [timestamp, record]"));
            }
            let body = match items.pop() {
                Some(JsonValue::Object(body)) => body,
                _ => return Err(shape("record body must be an object")),
            };
            let header = items.pop().unwrap_or(JsonValue::Null);
            // Newer agents wrap the timestamp together with metadata.
            let time = match header {
                JsonValue::Array(mut header) if !header.is_empty() => header.swap_remove(0),
                other => other,
            };
            let timestamp =
                decode_timestamp(&time).ok_or_else(|| shape("unsupported timestamp"))?;
            Ok(Some(record_from_body(body, Some(timestamp))))
        }
        _ => Err(shape("expected an object or an array")),
    }
}

fn record_from_body(
    body: serde_json::Map<String, JsonValue>,
    timestamp: Option<f64>,
) -> Record {
    let record: Record = body
        .into_iter()
        .map(|(key, value)| (key, DecodedValue::from(value)))
        .collect();
    match timestamp {
        Some(ts) => record.with_timestamp(ts),
        None => record,
    }
}

fn decode_timestamp(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::Object(parts) => {
            let sec = parts.get("sec")?.as_i64()?;
            let nsec = parts.get("nsec").and_then(JsonValue::as_i64).unwrap_or(0);
            Some(sec as f64 + nsec as f64 / 1e9)
        }
        _ => None,
    }
}

/// Groups input lines into frames of at most `frame_size` records.
///
/// Undecodable lines are logged and skipped; read errors end the iteration.
pub struct FrameReader<R> {
    input: R,
    frame_size: usize,
    line_number: usize,
    skipped: usize,
    done: bool,
}

impl<R: BufRead> FrameReader<R> {
    pub fn new(input: R, frame_size: usize) -> Self {
        Self {
            input,
            frame_size: frame_size.max(1),
            line_number: 0,
            skipped: 0,
            done: false,
        }
    }

    /// Lines skipped so far because they could not be decoded.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn lines_read(&self) -> usize {
        self.line_number
    }
}

impl<R: BufRead> Iterator for FrameReader<R> {
    type Item = Result<Vec<Record>, ReplayError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut frame = Vec::with_capacity(self.frame_size);
        let mut line = String::new();
        while frame.len() < self.frame_size {
            line.clear();
            match self.input.read_line(&mut line) {
                Ok(0) => {
                    self.done = true;
                    break;
                }
                Ok(_) => {}
                Err(err) => {
                    self.done = true;
                    return Some(Err(err.into()));
                }
            }
            self.line_number += 1;

            match decode_line(&line, self.line_number) {
                Ok(Some(record)) => frame.push(record),
                Ok(None) => {}
                Err(err) => {
                    warn!(error = %err, "skipping input line");
                    self.skipped += 1;
                }
            }
        }

        if frame.is_empty() {
            None
        } else {
            Some(Ok(frame))
        }
    }
}
