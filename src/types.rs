//! Public data model for the fieldwise crate.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Primitive kind of an extracted field.
///
/// Only two kinds exist; anything a caller supplies outside `"int"` falls back
/// to [`FieldKind::Text`] rather than being rejected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FieldKind {
    /// Integer-or-null attribute.
    #[serde(rename = "int")]
    Integer,
    /// String-or-null attribute.
    #[serde(rename = "str")]
    Text,
}

impl FieldKind {
    /// Parse a user-supplied kind string.
    ///
    /// `"int"` yields [`FieldKind::Integer`]; every other value (including
    /// unknown kinds such as `"float"`) yields [`FieldKind::Text`].
    pub fn parse(kind: &str) -> Self {
        match kind {
            "int" => FieldKind::Integer,
            _ => FieldKind::Text,
        }
    }

    /// JSON-Schema type name for this kind.
    pub(crate) fn json_type(&self) -> &'static str {
        match self {
            FieldKind::Integer => "integer",
            FieldKind::Text => "string",
        }
    }
}

/// One user-defined field to extract from each row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldSpec {
    /// Attribute name, used as the output column name.
    pub name: String,
    /// Primitive kind of the attribute.
    pub kind: FieldKind,
    /// Free-text description, passed to the model as extraction guidance.
    pub description: String,
}

impl FieldSpec {
    /// Create a field spec from already-typed parts.
    pub fn new(
        name: impl Into<String>,
        kind: FieldKind,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
        }
    }

    /// Create a field spec from raw user input, applying the kind fallback.
    pub fn parse(name: impl Into<String>, kind: &str, description: impl Into<String>) -> Self {
        Self::new(name, FieldKind::parse(kind), description)
    }
}

/// One row's extracted values, keyed by field name.
///
/// Values are null, integer, or string; fields the model omitted are null.
pub type ExtractedRecord = Map<String, Value>;

/// Token consumption of a single completion, for cost tracking.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    /// Number of prompt tokens consumed.
    pub prompt_tokens: u64,
    /// Number of completion tokens consumed.
    pub completion_tokens: u64,
}

/// Result of one structured completion call.
#[derive(Debug, Clone)]
pub struct StructuredCompletion {
    /// The record parsed from the model's forced function call.
    pub record: ExtractedRecord,
    /// Token usage reported by the API (zeros when absent).
    pub usage: TokenUsage,
}

/// Summary of a completed extraction run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunSummary {
    /// Number of non-empty input rows processed.
    pub total_lines: u64,
    /// Estimated USD cost of the run; 0.0 when the model is not in the table.
    pub total_cost: f64,
    /// The first processed record, with the raw input text added under
    /// `"original_text"`. Empty when no rows were processed.
    pub example: ExtractedRecord,
    /// Per-column count of rows that yielded a non-null, non-empty value.
    /// Every schema column is present; `total_extractions[c] <= total_lines`.
    pub total_extractions: HashMap<String, u64>,
}
