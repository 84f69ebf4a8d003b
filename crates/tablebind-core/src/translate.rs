//! Schema translation: [`RecordSchema`] → create-table payload.
//!
//! Field order in the payload equals declaration order. The implicit record
//! id and creation timestamp are never part of the payload; the remote side
//! manages them.
//!
//! The remote API cannot create auto-number columns. A field that resolves
//! to `autoNumber` is emitted as a plain `number` column instead and a
//! [`TranslationWarning`] is returned (and logged). The column must then be
//! converted by hand in the remote UI. This is the only substitution the
//! translator performs.

use serde::Serialize;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::field::{FieldDescriptor, FieldOptions, FieldType, ResolvedField};
use crate::resolve::resolve;
use crate::schema::RecordSchema;

/// Body of a create-table request: `{ "name", "description"?, "fields" }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDefinition {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub fields: Vec<ResolvedField>,
}

/// A non-fatal note produced during translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranslationWarning {
    /// An `autoNumber` column was created as `number`.
    AutoNumberSubstituted { field: String },
}

impl std::fmt::Display for TranslationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AutoNumberSubstituted { field } => write!(
                f,
                "field '{}' is autoNumber, which the API cannot create; created as number, convert it manually",
                field
            ),
        }
    }
}

/// Output of [`translate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Translation {
    pub table: TableDefinition,
    pub warnings: Vec<TranslationWarning>,
}

/// Translate a schema into a create-table payload.
///
/// Deterministic: translating the same schema twice yields equal output.
///
/// # Errors
///
/// Resolution errors, or [`Error::DuplicateFieldName`] if two resolved
/// columns share a name.
pub fn translate(schema: &RecordSchema) -> Result<Translation> {
    let mut fields = Vec::with_capacity(schema.fields().len());
    let mut warnings = Vec::new();
    let mut seen: HashMap<String, String> = HashMap::new();

    for descriptor in schema.fields() {
        let (resolved, warning) = creatable_field(descriptor)?;

        if let Some(first) = seen.insert(resolved.remote_name.clone(), descriptor.name.clone()) {
            return Err(Error::DuplicateFieldName {
                first,
                second: descriptor.name.clone(),
                name: resolved.remote_name,
            });
        }
        if let Some(w) = warning {
            tracing::warn!(table = schema.table_name(), "{}", w);
            warnings.push(w);
        }
        fields.push(resolved);
    }

    Ok(Translation {
        table: TableDefinition {
            name: schema.table_name().to_string(),
            description: schema.description().map(str::to_string),
            fields,
        },
        warnings,
    })
}

/// Resolve one descriptor into a field the create API accepts.
///
/// Shared by [`translate`] and the synchronizer so that fields created on an
/// existing table get the same substitution as fields of a new table.
pub(crate) fn creatable_field(
    descriptor: &FieldDescriptor,
) -> Result<(ResolvedField, Option<TranslationWarning>)> {
    let resolved = resolve(descriptor)?;
    if resolved.remote_type != FieldType::AutoNumber {
        return Ok((resolved, None));
    }

    // Auto numbers are integral.
    let precision = descriptor.precision.unwrap_or(0);
    let substituted = ResolvedField {
        remote_type: FieldType::Number,
        options: FieldOptions {
            precision: Some(precision),
            ..Default::default()
        },
        ..resolved
    };
    let warning = TranslationWarning::AutoNumberSubstituted {
        field: substituted.remote_name.clone(),
    };
    Ok((substituted, Some(warning)))
}
