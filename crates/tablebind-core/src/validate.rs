//! Validation of local field values against a [`RecordSchema`].
//!
//! Values are checked in their JSON form, keyed by local field name. This
//! covers both typed records (after `serde_json::to_value`) and dynamic
//! `Map<String, Value>` records declared in configuration.
//!
//! | Declared type | Accepted JSON |
//! |---------------|---------------|
//! | text | string (one of `choices` if the field has them) |
//! | integer | integral number |
//! | float | number |
//! | boolean | bool |
//! | datetime | RFC 3339 string |
//! | date | `YYYY-MM-DD` string |
//! | enumeration | one of its members (or of `choices`) |
//! | list_of_text | array of strings (each one of `choices` if given) |
//!
//! `null` is accepted for every field except required ones on write.

use chrono::{DateTime, NaiveDate};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::field::{DeclaredType, FieldDescriptor};
use crate::schema::RecordSchema;

/// Fill absent (or null) fields that declare a default.
pub fn apply_defaults(schema: &RecordSchema, data: &mut Map<String, Value>) {
    for field in schema.fields() {
        let Some(default) = &field.default_value else {
            continue;
        };
        match data.get(&field.name) {
            None | Some(Value::Null) => {
                data.insert(field.name.clone(), default.clone());
            }
            Some(_) => {}
        }
    }
}

/// Validate a record about to be written.
///
/// # Errors
///
/// [`Error::Validation`] naming the first offending field: an undeclared
/// key, a missing required value, or a value of the wrong type.
pub fn validate_for_write(schema: &RecordSchema, data: &Map<String, Value>) -> Result<()> {
    if let Some(key) = data.keys().find(|k| schema.field(k).is_none()) {
        return Err(Error::validation(key.as_str(), "field is not declared in the schema"));
    }
    for field in schema.fields() {
        let value = data.get(&field.name).unwrap_or(&Value::Null);
        if value.is_null() {
            if field.required && !field.read_only {
                return Err(Error::validation(&field.name, "a value is required"));
            }
            continue;
        }
        check_value(field, value)?;
    }
    Ok(())
}

/// Type-check values read from the remote side. Missing values are not errors.
pub fn validate_for_read(schema: &RecordSchema, data: &Map<String, Value>) -> Result<()> {
    for field in schema.fields() {
        match data.get(&field.name) {
            None | Some(Value::Null) => {}
            Some(value) => check_value(field, value)?,
        }
    }
    Ok(())
}

/// Check one non-null value against its field declaration.
pub fn check_value(field: &FieldDescriptor, value: &Value) -> Result<()> {
    let fail = |message: String| Err(Error::validation(&field.name, message));
    let kind = field.declared_type.name();

    match &field.declared_type {
        DeclaredType::Text => match value.as_str() {
            Some(s) => check_choice(field, s, field.choices.as_deref()),
            None => fail(format!("expected {kind}, got {}", describe(value))),
        },
        DeclaredType::Integer => {
            let integral = value.is_i64()
                || value.is_u64()
                || value.as_f64().is_some_and(|f| f.fract() == 0.0);
            if integral {
                Ok(())
            } else {
                fail(format!("expected {kind}, got {}", describe(value)))
            }
        }
        DeclaredType::Float => {
            if value.is_number() {
                Ok(())
            } else {
                fail(format!("expected {kind}, got {}", describe(value)))
            }
        }
        DeclaredType::Boolean => {
            if value.is_boolean() {
                Ok(())
            } else {
                fail(format!("expected {kind}, got {}", describe(value)))
            }
        }
        DeclaredType::DateTime => match value.as_str() {
            Some(s) if DateTime::parse_from_rfc3339(s).is_ok() => Ok(()),
            Some(s) => fail(format!("'{s}' is not an RFC 3339 timestamp")),
            None => fail(format!("expected {kind}, got {}", describe(value))),
        },
        DeclaredType::Date => match value.as_str() {
            Some(s) if NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() => Ok(()),
            Some(s) => fail(format!("'{s}' is not a YYYY-MM-DD date")),
            None => fail(format!("expected {kind}, got {}", describe(value))),
        },
        DeclaredType::Enumeration(members) => match value.as_str() {
            Some(s) => {
                let choices = field.choices.as_deref().unwrap_or(members.as_slice());
                check_choice(field, s, Some(choices))
            }
            None => fail(format!("expected {kind}, got {}", describe(value))),
        },
        DeclaredType::ListOfText => {
            let Some(items) = value.as_array() else {
                return fail(format!("expected {kind}, got {}", describe(value)));
            };
            for item in items {
                match item.as_str() {
                    Some(s) => check_choice(field, s, field.choices.as_deref())?,
                    None => {
                        return fail(format!("list items must be strings, got {}", describe(item)))
                    }
                }
            }
            Ok(())
        }
    }
}

fn check_choice(field: &FieldDescriptor, value: &str, choices: Option<&[String]>) -> Result<()> {
    match choices {
        Some(choices) if !choices.iter().any(|c| c == value) => Err(Error::validation(
            &field.name,
            format!("'{}' is not one of: {}", value, choices.join(", ")),
        )),
        _ => Ok(()),
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
