//! Record extraction
//!
//! Parses raw input bytes into an ordered sequence of record trees. No
//! schema awareness; a malformed batch is rejected atomically with a
//! positional parse error.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::config::ExtractConfig;
use crate::error::{IngestError, Result};

/// Declared format of an input batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordFormat {
    /// A single JSON document; a top-level array yields one record per
    /// element
    Json,
    /// Line-delimited JSON, one record per non-blank line
    NdJson,
    /// Delimited text with a header row; each row becomes an object
    Csv,
}

impl RecordFormat {
    /// Guess the format from a file extension
    pub fn for_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "json" => Some(RecordFormat::Json),
            "ndjson" | "jsonl" => Some(RecordFormat::NdJson),
            "csv" => Some(RecordFormat::Csv),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RecordFormat::Json => "json",
            RecordFormat::NdJson => "ndjson",
            RecordFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for RecordFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for RecordFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        RecordFormat::for_extension(s).ok_or_else(|| format!("unknown record format '{}'", s))
    }
}

/// Parse raw bytes into an ordered sequence of record trees.
///
/// The whole batch is rejected on the first malformed record; partially
/// extracted records are never returned.
pub fn extract(bytes: &[u8], format: RecordFormat, config: &ExtractConfig) -> Result<Vec<Value>> {
    let records = match format {
        RecordFormat::Json => extract_json(bytes)?,
        RecordFormat::NdJson => extract_ndjson(bytes)?,
        RecordFormat::Csv => extract_csv(bytes, config.csv_typed_cells)?,
    };

    if config.max_batch_records > 0 && records.len() > config.max_batch_records {
        return Err(IngestError::Parse {
            format: format.name().to_string(),
            position: format!("record {}", config.max_batch_records + 1),
            detail: format!(
                "batch holds {} records, limit is {}",
                records.len(),
                config.max_batch_records
            ),
        });
    }

    Ok(records)
}

fn extract_json(bytes: &[u8]) -> Result<Vec<Value>> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| IngestError::Parse {
        format: "json".to_string(),
        position: format!("line {}, column {}", e.line(), e.column()),
        detail: e.to_string(),
    })?;

    Ok(match value {
        Value::Array(items) => items,
        other => vec![other],
    })
}

fn extract_ndjson(bytes: &[u8]) -> Result<Vec<Value>> {
    let text = std::str::from_utf8(bytes).map_err(|e| IngestError::Parse {
        format: "ndjson".to_string(),
        position: format!("byte {}", e.valid_up_to()),
        detail: "input is not valid UTF-8".to_string(),
    })?;

    let mut records = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line).map_err(|e| IngestError::Parse {
            format: "ndjson".to_string(),
            position: format!("line {}, column {}", line_no + 1, e.column()),
            detail: e.to_string(),
        })?;
        records.push(value);
    }
    Ok(records)
}

fn extract_csv(bytes: &[u8], typed_cells: bool) -> Result<Vec<Value>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| csv_parse_error(&e))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| csv_parse_error(&e))?;
        let mut object = serde_json::Map::with_capacity(headers.len());
        for (header, cell) in headers.iter().zip(row.iter()) {
            object.insert(header.clone(), cell_value(cell, typed_cells));
        }
        records.push(Value::Object(object));
    }
    Ok(records)
}

/// Parse a CSV cell into a JSON scalar when unambiguous; strings
/// otherwise. Empty cells are null under typed parsing.
fn cell_value(cell: &str, typed: bool) -> Value {
    if !typed {
        return Value::String(cell.to_string());
    }
    if cell.is_empty() {
        return Value::Null;
    }
    match serde_json::from_str::<Value>(cell) {
        Ok(v @ (Value::Number(_) | Value::Bool(_) | Value::Null)) => v,
        _ => Value::String(cell.to_string()),
    }
}

fn csv_parse_error(e: &csv::Error) -> IngestError {
    let position = e
        .position()
        .map(|p| format!("line {}, byte {}", p.line(), p.byte()))
        .unwrap_or_else(|| "unknown".to_string());
    IngestError::Parse {
        format: "csv".to_string(),
        position,
        detail: e.to_string(),
    }
}
