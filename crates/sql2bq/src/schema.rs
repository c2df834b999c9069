//! Destination schema inference.
//!
//! A [`TypeMap`] translates MySQL column type tokens into BigQuery primitive
//! types. [`SchemaBuilder`] applies it to the introspected source columns and
//! produces the ordered [`Schema`] used for table creation and row decoding.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

use crate::connectors::SourceConnector;
use crate::error::{Error, Result};

/// BigQuery primitive type of a destination field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    /// 64-bit signed integer.
    Integer,
    /// 64-bit float.
    Float,
    /// UTF-8 string. Also the fallback for unknown source types.
    String,
    /// Point in time, loaded as seconds since the Unix epoch.
    Timestamp,
}

impl FieldType {
    /// BigQuery type name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Float => "FLOAT",
            Self::String => "STRING",
            Self::Timestamp => "TIMESTAMP",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// BigQuery field mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldMode {
    /// Column accepts NULL.
    Nullable,
    /// Column is NOT NULL in the source.
    Required,
}

impl FieldMode {
    /// BigQuery mode name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Nullable => "NULLABLE",
            Self::Required => "REQUIRED",
        }
    }
}

/// A column as described by the source table definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceColumn {
    /// Column name.
    pub name: String,
    /// Raw type token, e.g. `varchar(255)` or `int(10) unsigned`.
    pub raw_type: String,
    /// Whether the column accepts NULL.
    pub nullable: bool,
}

impl SourceColumn {
    /// Creates a new column description.
    pub fn new(name: impl Into<String>, raw_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            raw_type: raw_type.into(),
            nullable,
        }
    }
}

/// A field of the destination table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationField {
    /// Field name (same as the source column).
    pub name: String,
    /// BigQuery type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Nullability.
    pub mode: FieldMode,
}

/// Ordered destination schema. Field order matches source column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<DestinationField>,
}

impl Schema {
    /// Creates a schema from already-ordered fields.
    #[must_use]
    pub fn new(fields: Vec<DestinationField>) -> Self {
        Self { fields }
    }

    /// Fields in source column order.
    #[must_use]
    pub fn fields(&self) -> &[DestinationField] {
        &self.fields
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the schema has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field types in order.
    pub fn field_types(&self) -> impl Iterator<Item = FieldType> + '_ {
        self.fields.iter().map(|f| f.field_type)
    }
}

/// Immutable lookup from base type tokens to BigQuery types.
#[derive(Debug, Clone)]
pub struct TypeMap {
    entries: HashMap<&'static str, FieldType>,
}

const MYSQL_TYPES: &[(&str, FieldType)] = &[
    ("int", FieldType::Integer),
    ("integer", FieldType::Integer),
    ("tinyint", FieldType::Integer),
    ("smallint", FieldType::Integer),
    ("mediumint", FieldType::Integer),
    ("bigint", FieldType::Integer),
    ("double", FieldType::Float),
    ("decimal", FieldType::Float),
    ("numeric", FieldType::Float),
    ("float", FieldType::Float),
    ("real", FieldType::Float),
    ("varchar", FieldType::String),
    ("char", FieldType::String),
    ("text", FieldType::String),
    ("tinytext", FieldType::String),
    ("mediumtext", FieldType::String),
    ("longtext", FieldType::String),
    ("datetime", FieldType::Timestamp),
    ("timestamp", FieldType::Timestamp),
];

impl Default for TypeMap {
    fn default() -> Self {
        Self::mysql()
    }
}

impl TypeMap {
    /// The MySQL to BigQuery mapping.
    #[must_use]
    pub fn mysql() -> Self {
        Self {
            entries: MYSQL_TYPES.iter().copied().collect(),
        }
    }

    /// Looks up a raw type token. Returns `None` for unknown base types.
    #[must_use]
    pub fn lookup(&self, raw_type: &str) -> Option<FieldType> {
        self.entries.get(base_type_token(raw_type).as_str()).copied()
    }

    /// Maps a raw type token, falling back to STRING for unknown types.
    #[must_use]
    pub fn map(&self, raw_type: &str) -> FieldType {
        self.lookup(raw_type).unwrap_or_else(|| {
            warn!("Unknown type detected, using STRING: {}", raw_type);
            FieldType::String
        })
    }
}

/// Reduces a raw type token to its base type.
///
/// Truncates at the first parenthesis, keeps the first word and lowercases:
/// `VARCHAR(255)` becomes `varchar`, `int(10) unsigned` becomes `int`.
#[must_use]
pub fn base_type_token(raw_type: &str) -> String {
    let truncated = raw_type.split('(').next().unwrap_or_default();
    truncated
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Builds a destination [`Schema`] from source column definitions.
#[derive(Debug, Clone, Copy)]
pub struct SchemaBuilder<'a> {
    type_map: &'a TypeMap,
}

impl<'a> SchemaBuilder<'a> {
    /// Creates a builder over the given mapping.
    #[must_use]
    pub fn new(type_map: &'a TypeMap) -> Self {
        Self { type_map }
    }

    /// Converts columns into destination fields, preserving order.
    #[must_use]
    pub fn build(&self, columns: &[SourceColumn]) -> Schema {
        let fields = columns
            .iter()
            .map(|col| {
                let field = DestinationField {
                    name: col.name.clone(),
                    field_type: self.type_map.map(&col.raw_type),
                    mode: if col.nullable {
                        FieldMode::Nullable
                    } else {
                        FieldMode::Required
                    },
                };
                debug!(
                    "Column {} ({}) -> {} {:?}",
                    col.name, col.raw_type, field.field_type, field.mode
                );
                field
            })
            .collect();

        Schema::new(fields)
    }

    /// Describes the source table and builds its schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be introspected or the table has
    /// no columns. Both are fatal to the run.
    pub async fn describe(&self, source: &dyn SourceConnector) -> Result<Schema> {
        let columns = source.describe().await?;
        if columns.is_empty() {
            return Err(Error::Extraction(
                "source table has no columns".to_string(),
            ));
        }
        Ok(self.build(&columns))
    }
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
