//! Row streaming and decoding.
//!
//! Wraps the source's streaming cursor, decodes each raw text row against the
//! [`Schema`] and stops after the configured row limit. Nothing is buffered:
//! every row is pulled from the source only when the consumer asks for it.

use futures::stream::{BoxStream, StreamExt};
use serde_json::Value;
use tracing::warn;

use crate::connectors::{RawRow, Row, SourceConnector};
use crate::error::Result;
use crate::schema::{FieldType, Schema};
use crate::temporal;

/// Decodes a single text cell into a JSON value of its schema type.
///
/// Values that do not parse as their declared type are kept as strings so the
/// destination rejects that one row instead of the whole run.
#[must_use]
pub fn decode_cell(field_type: FieldType, raw: Option<&str>) -> Value {
    if field_type == FieldType::Timestamp {
        return Value::from(temporal::to_epoch_seconds(raw));
    }

    let Some(text) = raw else {
        return Value::Null;
    };

    match field_type {
        FieldType::Integer => text
            .parse::<i64>()
            .map(Value::from)
            .or_else(|_| text.parse::<u64>().map(Value::from))
            .unwrap_or_else(|_| Value::String(text.to_string())),
        FieldType::Float => text
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map_or_else(|| Value::String(text.to_string()), Value::Number),
        FieldType::String | FieldType::Timestamp => Value::String(text.to_string()),
    }
}

/// Decodes a raw row positionally against the schema.
///
/// A row with the wrong arity is decoded as far as possible; the destination
/// reports it as a row-level error.
#[must_use]
pub fn decode_row(schema: &Schema, raw: RawRow) -> Row {
    if raw.len() != schema.len() {
        warn!(
            "Row has {} cells but schema has {} fields",
            raw.len(),
            schema.len()
        );
    }

    let values = raw
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            let field_type = schema
                .fields()
                .get(i)
                .map_or(FieldType::String, |f| f.field_type);
            decode_cell(field_type, cell.as_deref())
        })
        .collect();

    Row::new(values)
}

/// Streams decoded rows from the source, stopping after `limit` rows (0 = no limit).
pub fn stream_rows<'a>(
    source: &'a dyn SourceConnector,
    schema: &'a Schema,
    limit: u64,
) -> BoxStream<'a, Result<Row>> {
    let rows = source
        .stream_select_all()
        .map(move |raw| raw.map(|raw| decode_row(schema, raw)));

    if limit == 0 {
        rows.boxed()
    } else {
        rows.take(usize::try_from(limit).unwrap_or(usize::MAX))
            .boxed()
    }
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
