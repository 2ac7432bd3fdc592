//! Dynamic structured-output contract built from user-described fields.

use crate::error::{Error, Result};
use crate::types::{ExtractedRecord, FieldKind, FieldSpec};
use serde_json::{json, Map, Value};

/// Upper bound on user-defined fields per run.
pub const MAX_FIELDS: usize = 20;

/// Name of the function the model is forced to call.
const FUNCTION_NAME: &str = "extract_record";

/// The shape every structured completion of a run must conform to.
///
/// Built once per run from an ordered list of [`FieldSpec`] plus a free-text
/// summary of what the extraction target represents. Each spec becomes an
/// optional attribute (null allowed) carrying its description as guidance to
/// the model.
#[derive(Debug, Clone)]
pub struct ExtractionSchema {
    description: String,
    fields: Vec<FieldSpec>,
}

impl ExtractionSchema {
    /// Build a schema from a summary description and field specs.
    ///
    /// Validates the specs before any model call is made: the list must hold
    /// between 1 and [`MAX_FIELDS`] entries and every name and description
    /// must be non-empty. Duplicate names collapse silently: the last spec
    /// wins, the first occurrence fixes the column position.
    pub fn new(description: impl Into<String>, specs: Vec<FieldSpec>) -> Result<Self> {
        if specs.is_empty() {
            return Err(Error::Validation("at least one field is required".into()));
        }
        if specs.len() > MAX_FIELDS {
            return Err(Error::Validation(format!(
                "at most {} fields are supported, got {}",
                MAX_FIELDS,
                specs.len()
            )));
        }

        let mut fields: Vec<FieldSpec> = Vec::with_capacity(specs.len());
        for spec in specs {
            if spec.name.is_empty() || spec.description.is_empty() {
                return Err(Error::Validation(
                    "the name, type and description of a field need to be filled".into(),
                ));
            }
            match fields.iter_mut().find(|f| f.name == spec.name) {
                Some(existing) => *existing = spec,
                None => fields.push(spec),
            }
        }

        Ok(Self {
            description: description.into(),
            fields,
        })
    }

    /// Name of the function declaration sent to the model.
    pub fn name(&self) -> &str {
        FUNCTION_NAME
    }

    /// The summary description of the extraction target.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The schema's fields in declaration order.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Attribute names in declaration order; the output column order.
    pub fn columns(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// The JSON-Schema object sent as the function's `parameters`.
    ///
    /// Every attribute is declared nullable so the model may report a field
    /// as absent, but all attributes are required so it must mention each.
    pub fn parameters(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            properties.insert(
                field.name.clone(),
                json!({
                    "type": [field.kind.json_type(), "null"],
                    "description": field.description,
                }),
            );
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": self.columns(),
        })
    }

    /// Validate and coerce the model's function-call arguments into a record.
    ///
    /// Fields the model omitted are null. Integer attributes accept integers,
    /// null, and integer-shaped strings; text attributes accept strings, null,
    /// and numbers. Anything else fails the call as a malformed response.
    pub fn parse_record(&self, arguments: &Value) -> Result<ExtractedRecord> {
        let object = arguments.as_object().ok_or_else(|| {
            Error::MalformedResponse(format!("expected a JSON object, got {}", arguments))
        })?;

        let mut record = ExtractedRecord::new();
        for field in &self.fields {
            let value = object.get(&field.name).unwrap_or(&Value::Null);
            record.insert(field.name.clone(), coerce(field, value)?);
        }
        Ok(record)
    }
}

fn coerce(field: &FieldSpec, value: &Value) -> Result<Value> {
    match (field.kind, value) {
        (_, Value::Null) => Ok(Value::Null),
        (FieldKind::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(value.clone()),
        (FieldKind::Integer, Value::String(s)) => match s.trim().parse::<i64>() {
            Ok(n) => Ok(json!(n)),
            Err(_) => Err(Error::MalformedResponse(format!(
                "field `{}` expected an integer, got {:?}",
                field.name, s
            ))),
        },
        (FieldKind::Text, Value::String(_)) => Ok(value.clone()),
        (FieldKind::Text, Value::Number(n)) => Ok(Value::String(n.to_string())),
        _ => Err(Error::MalformedResponse(format!(
            "field `{}` expected {}, got {}",
            field.name,
            field.kind.json_type(),
            value
        ))),
    }
}
