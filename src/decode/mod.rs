//! Record decoding for segment sample files.
//!
//! A sample file opens with a little-endian `u32` length prefix followed by
//! that many bytes of JSON describing the record schema. Record bodies are
//! separate binary payloads holding one value per schema field, decoded on
//! demand into a reusable [`RecordRow`].

mod row;

pub use row::*;


use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::DecodeError;
use crate::Result;

/// Upper bound on the schema header size. Anything larger is framing
/// corruption, not a real schema.
const MAX_SCHEMA_HEADER_BYTES: u32 = 1 << 20;

/// Declared type of one schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Bool,
    Long,
    Double,
    Text,
    Bytes,
}

/// One named, typed column of the record schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
}

/// Ordered field list a sample file declares for its records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSchema {
    pub fields: Vec<FieldSpec>,
}

/// One decoded value. `Null` is legal for any declared kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Long(i64),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl FieldValue {
    fn matches(&self, kind: FieldKind) -> bool {
        matches!(
            (self, kind),
            (FieldValue::Null, _)
                | (FieldValue::Bool(_), FieldKind::Bool)
                | (FieldValue::Long(_), FieldKind::Long)
                | (FieldValue::Double(_), FieldKind::Double)
                | (FieldValue::Text(_), FieldKind::Text)
                | (FieldValue::Bytes(_), FieldKind::Bytes)
        )
    }
}

/// Decodes record bodies against the schema loaded from a sample file.
///
/// Construction fixes both the schema and the projection; `decode` itself is
/// immutable and can be shared across calls.
#[derive(Debug)]
pub struct RecordDecoder {
    schema: RecordSchema,
    // Indices into the schema's field order, in projection order.
    projection: Vec<usize>,
}

impl RecordDecoder {
    /// Loads the schema header from `sample_path` and fixes the projection to
    /// `fields_to_read`. An empty projection means every schema field.
    ///
    /// # Errors
    /// - [`DecodeError::SchemaLoad`] / [`DecodeError::MalformedHeader`] on
    ///   framing problems
    /// - [`DecodeError::UnknownField`] if a projected field is not declared
    pub fn open(sample_path: &Path, fields_to_read: &[String]) -> Result<Self> {
        let schema = read_schema_header(sample_path)?;

        let by_name: HashMap<&str, usize> = schema
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.as_str(), i))
            .collect();

        let projection = if fields_to_read.is_empty() {
            (0..schema.fields.len()).collect()
        } else {
            let mut indices = Vec::with_capacity(fields_to_read.len());
            for name in fields_to_read {
                let index = by_name
                    .get(name.as_str())
                    .copied()
                    .ok_or_else(|| DecodeError::UnknownField(name.clone()))?;
                indices.push(index);
            }
            indices
        };

        Ok(Self { schema, projection })
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    /// Decodes one record occupying `payload[offset..offset + length]` into
    /// `row`, clearing whatever the row held before. Returns the same row for
    /// chaining.
    ///
    /// Any error leaves the row cleared; a decoder error is unrecoverable for
    /// that record, never for the decoder.
    pub fn decode<'a>(
        &self,
        payload: &[u8],
        offset: usize,
        length: usize,
        row: &'a mut RecordRow,
    ) -> Result<&'a mut RecordRow> {
        row.clear();

        let end = offset
            .checked_add(length)
            .filter(|end| *end <= payload.len())
            .ok_or(DecodeError::OutOfBounds {
                offset,
                length,
                payload_len: payload.len(),
            })?;

        let values: Vec<FieldValue> =
            bincode::deserialize(&payload[offset..end]).map_err(DecodeError::Record)?;
        if values.len() != self.schema.fields.len() {
            return Err(DecodeError::FieldCountMismatch {
                expected: self.schema.fields.len(),
                actual: values.len(),
            }
            .into());
        }

        for &index in &self.projection {
            let spec = &self.schema.fields[index];
            let value = &values[index];
            if !value.matches(spec.kind) {
                row.clear();
                return Err(DecodeError::TypeMismatch {
                    field: spec.name.clone(),
                }
                .into());
            }
            row.put(&spec.name, value.clone());
        }
        Ok(row)
    }
}

/// Serializes a record body the way [`RecordDecoder::decode`] expects it.
/// Fixture helper for writing sample payloads.
pub fn encode_record(values: &[FieldValue]) -> Result<Vec<u8>> {
    Ok(bincode::serialize(values).map_err(DecodeError::Record)?)
}

/// Writes `schema` as a framed header to `path`, the inverse of
/// [`RecordDecoder::open`]'s header read.
pub fn write_schema_header(path: &Path, schema: &RecordSchema) -> Result<()> {
    let body = serde_json::to_vec(schema).map_err(DecodeError::SchemaJson)?;
    let mut framed = Vec::with_capacity(4 + body.len());
    framed.extend_from_slice(&(body.len() as u32).to_le_bytes());
    framed.extend_from_slice(&body);
    std::fs::write(path, framed).map_err(|e| schema_load(path, e))?;
    Ok(())
}

fn read_schema_header(path: &Path) -> Result<RecordSchema> {
    let mut file = std::fs::File::open(path).map_err(|e| schema_load(path, e))?;

    let mut prefix = [0u8; 4];
    file.read_exact(&mut prefix).map_err(|e| schema_load(path, e))?;
    let declared = u32::from_le_bytes(prefix);
    if declared == 0 || declared > MAX_SCHEMA_HEADER_BYTES {
        return Err(DecodeError::MalformedHeader(format!(
            "declared header length {declared} out of range"
        ))
        .into());
    }

    let mut body = vec![0u8; declared as usize];
    file.read_exact(&mut body).map_err(|_| {
        DecodeError::MalformedHeader(format!(
            "header truncated before {declared} declared bytes"
        ))
    })?;
    Ok(serde_json::from_slice(&body).map_err(DecodeError::SchemaJson)?)
}

fn schema_load(path: &Path, source: std::io::Error) -> DecodeError {
    DecodeError::SchemaLoad {
        path: PathBuf::from(path),
        source,
    }
}
