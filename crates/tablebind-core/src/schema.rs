//! Record schemas.
//!
//! A [`RecordSchema`] is the ordered, immutable list of fields a record type
//! declares, plus the remote table name. Construction checks every static
//! property of the declaration (unique names, resolvable types and choices)
//! so that later operations never fail for schema reasons.

use serde::Serialize;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::field::{FieldDescriptor, ResolvedField};
use crate::resolve;

/// Local names reserved for the remote-assigned record metadata.
pub const RESERVED_FIELD_NAMES: [&str; 2] = ["id", "created_time"];

/// An ordered, validated list of field declarations bound to a table name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordSchema {
    table_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    fields: Vec<FieldDescriptor>,
}

impl RecordSchema {
    /// Build a schema, checking every field declaration.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] for an empty table name.
    /// - [`Error::ReservedFieldName`] for `id` / `created_time`.
    /// - [`Error::DuplicateFieldName`] if two fields share a local name or
    ///   a resolved remote name.
    /// - Any resolution error from [`resolve::resolve`].
    pub fn new(table_name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Result<Self> {
        let table_name = table_name.into();
        if table_name.trim().is_empty() {
            return Err(Error::Config("table name must not be empty".into()));
        }

        check_fields(&fields)?;

        Ok(Self {
            table_name,
            description: None,
            fields,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Look up a field by its local name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a field by its remote column name.
    pub fn field_by_column(&self, column: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.column_name() == column)
    }

    /// Resolve every field, in declaration order.
    pub fn resolved_fields(&self) -> Result<Vec<ResolvedField>> {
        self.fields.iter().map(resolve::resolve).collect()
    }

    /// Same schema bound to another table name.
    pub fn with_table_name(&self, table_name: impl Into<String>) -> Result<Self> {
        let table_name = table_name.into();
        if table_name.trim().is_empty() {
            return Err(Error::Config("table name must not be empty".into()));
        }
        Ok(Self {
            table_name,
            ..self.clone()
        })
    }
}

fn check_fields(fields: &[FieldDescriptor]) -> Result<()> {
    let mut local: HashMap<&str, &str> = HashMap::new();
    let mut remote: HashMap<&str, &str> = HashMap::new();

    for field in fields {
        if RESERVED_FIELD_NAMES.contains(&field.name.as_str()) {
            return Err(Error::ReservedFieldName(field.name.clone()));
        }
        if let Some(first) = local.insert(&field.name, &field.name) {
            return Err(Error::DuplicateFieldName {
                first: first.to_string(),
                second: field.name.clone(),
                name: field.name.clone(),
            });
        }
        if let Some(first) = remote.insert(field.column_name(), &field.name) {
            return Err(Error::DuplicateFieldName {
                first: first.to_string(),
                second: field.name.clone(),
                name: field.column_name().to_string(),
            });
        }
        resolve::resolve(field)?;
    }
    Ok(())
}
