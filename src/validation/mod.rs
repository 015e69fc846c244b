use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A named document schema: per-field specs plus object-level policy.
///
/// Schemas are plain serde types so they can be loaded from JSON files
/// or built in code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub fields: HashMap<String, FieldSpec>,
    /// Allow fields that are not declared in `fields`.
    #[serde(default)]
    pub additional_properties: bool,
    /// Strict schemas report issues as errors, lenient ones as warnings.
    #[serde(default)]
    pub strict: bool,
}

/// Specification of a single document field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "enum", default)]
    pub enum_values: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    List,
    Object,
}

impl FieldType {
    fn describe(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::List => "list",
            FieldType::Object => "object",
        }
    }
}

/// Result of validating a document
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Validate a JSON document against a schema.
///
/// Strict schemas turn every issue into an error; lenient schemas
/// downgrade them to warnings.
pub fn validate_document(schema: &Schema, data: &Value) -> ValidationResult {
    let mut result = ValidationResult::default();

    let map = match data.as_object() {
        Some(m) => m,
        None => {
            result.errors.push("Document must be a JSON object".into());
            return result;
        }
    };

    for (field_name, spec) in &schema.fields {
        let value = map.get(field_name);

        if spec.required && value.map_or(true, Value::is_null) {
            add_issue(
                &mut result,
                schema.strict,
                format!("Required field '{field_name}' is missing"),
            );
            continue;
        }

        if let Some(val) = value {
            if !val.is_null() {
                check_field(field_name, spec, val, schema.strict, &mut result);
            }
        }
    }

    if !schema.additional_properties {
        for key in map.keys() {
            if !schema.fields.contains_key(key) {
                add_issue(
                    &mut result,
                    schema.strict,
                    format!("Unexpected field '{key}' (additional_properties is false)"),
                );
            }
        }
    }

    result
}

fn check_field(
    field_name: &str,
    spec: &FieldSpec,
    value: &Value,
    strict: bool,
    result: &mut ValidationResult,
) {
    let type_matches = match spec.field_type {
        FieldType::String => value.is_string(),
        FieldType::Number => value.is_number(),
        FieldType::Boolean => value.is_boolean(),
        FieldType::List => value.is_array(),
        FieldType::Object => value.is_object(),
    };
    if !type_matches {
        add_issue(
            result,
            strict,
            format!(
                "Field '{field_name}' is not a {}",
                spec.field_type.describe()
            ),
        );
        return;
    }

    if let (Some(allowed), Some(actual)) = (&spec.enum_values, value.as_str()) {
        if !allowed.iter().any(|candidate| candidate == actual) {
            add_issue(
                result,
                strict,
                format!("Field '{field_name}' value '{actual}' is not an allowed value"),
            );
        }
    }
}

fn add_issue(result: &mut ValidationResult, strict: bool, message: String) {
    if strict {
        result.errors.push(message);
    } else {
        result.warnings.push(message);
    }
}
