//! Field model: local field declarations and remote column types.
//!
//! A [`FieldDescriptor`] describes one field of a record schema as the
//! application declares it. The [`resolve`](crate::resolve) module turns it
//! into a [`ResolvedField`]: the concrete remote column name, [`FieldType`]
//! and [`FieldOptions`] sent to the remote metadata API.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Remote column types, serialized with their Airtable wire names.
///
/// Unknown wire values are kept as [`FieldType::Other`] so that reading a
/// table never fails because the remote side grew a new column type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    SingleLineText,
    LongText,
    Number,
    Currency,
    Percent,
    Date,
    DateTime,
    Checkbox,
    Select,
    MultiSelect,
    Email,
    Url,
    Phone,
    Attachment,
    Formula,
    Rollup,
    Count,
    Lookup,
    CreatedTime,
    ModifiedTime,
    CreatedBy,
    ModifiedBy,
    AutoNumber,
    Other(String),
}

impl FieldType {
    /// Airtable wire name of this type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::SingleLineText => "singleLineText",
            Self::LongText => "multilineText",
            Self::Number => "number",
            Self::Currency => "currency",
            Self::Percent => "percent",
            Self::Date => "date",
            Self::DateTime => "dateTime",
            Self::Checkbox => "checkbox",
            Self::Select => "singleSelect",
            Self::MultiSelect => "multipleSelects",
            Self::Email => "email",
            Self::Url => "url",
            Self::Phone => "phoneNumber",
            Self::Attachment => "multipleAttachments",
            Self::Formula => "formula",
            Self::Rollup => "rollup",
            Self::Count => "count",
            Self::Lookup => "lookup",
            Self::CreatedTime => "createdTime",
            Self::ModifiedTime => "lastModifiedTime",
            Self::CreatedBy => "createdBy",
            Self::ModifiedBy => "lastModifiedBy",
            Self::AutoNumber => "autoNumber",
            Self::Other(name) => name,
        }
    }

    /// Parse a wire name. Never fails; unknown names become [`FieldType::Other`].
    pub fn from_wire(name: &str) -> Self {
        match name {
            "singleLineText" => Self::SingleLineText,
            "multilineText" => Self::LongText,
            "number" => Self::Number,
            "currency" => Self::Currency,
            "percent" => Self::Percent,
            "date" => Self::Date,
            "dateTime" => Self::DateTime,
            "checkbox" => Self::Checkbox,
            "singleSelect" => Self::Select,
            "multipleSelects" => Self::MultiSelect,
            "email" => Self::Email,
            "url" => Self::Url,
            "phoneNumber" => Self::Phone,
            "multipleAttachments" => Self::Attachment,
            "formula" => Self::Formula,
            "rollup" => Self::Rollup,
            "count" => Self::Count,
            "lookup" => Self::Lookup,
            "createdTime" => Self::CreatedTime,
            "lastModifiedTime" => Self::ModifiedTime,
            "createdBy" => Self::CreatedBy,
            "lastModifiedBy" => Self::ModifiedBy,
            "autoNumber" => Self::AutoNumber,
            other => Self::Other(other.to_string()),
        }
    }

    /// Single- or multi-selection types, which carry a choice list.
    pub fn is_selection(&self) -> bool {
        matches!(self, Self::Select | Self::MultiSelect)
    }
}

impl From<String> for FieldType {
    fn from(value: String) -> Self {
        Self::from_wire(&value)
    }
}

impl From<FieldType> for String {
    fn from(value: FieldType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The type a field is declared with on the local side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "choices")]
pub enum DeclaredType {
    Text,
    Integer,
    Float,
    Boolean,
    DateTime,
    Date,
    /// A closed set of string members, in declaration order.
    Enumeration(Vec<String>),
    ListOfText,
}

impl DeclaredType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::DateTime => "datetime",
            Self::Date => "date",
            Self::Enumeration(_) => "enum",
            Self::ListOfText => "list_of_text",
        }
    }
}

/// One field of a record schema.
///
/// Built with [`FieldDescriptor::new`] and the `with_*` methods:
///
/// ```rust
/// use tablebind_core::field::{DeclaredType, FieldDescriptor, FieldType};
///
/// let price = FieldDescriptor::new("unit_price", DeclaredType::Float)
///     .with_remote_name("Unit Price")
///     .with_symbol("€");
/// assert_eq!(price.column_name(), "Unit Price");
///
/// let status = FieldDescriptor::new("status", DeclaredType::Text)
///     .with_remote_type(FieldType::Select)
///     .with_choices(["open", "closed"]);
/// assert!(status.choices.is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDescriptor {
    /// Local identifier, unique within a schema.
    pub name: String,
    pub declared_type: DeclaredType,
    /// Explicit remote type; wins over all inference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_type: Option<FieldType>,
    /// Column name on the remote side; defaults to `name`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_name: Option<String>,
    /// Accepted on read, never sent on create/update.
    pub read_only: bool,
    /// Null or absent values are rejected on write.
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    /// Choices for an explicit selection type or a list-of-text field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, declared_type: DeclaredType) -> Self {
        Self {
            name: name.into(),
            declared_type,
            remote_type: None,
            remote_name: None,
            read_only: false,
            required: false,
            default_value: None,
            choices: None,
            precision: None,
            symbol: None,
            description: None,
        }
    }

    pub fn with_remote_type(mut self, remote_type: FieldType) -> Self {
        self.remote_type = Some(remote_type);
        self
    }

    pub fn with_remote_name(mut self, remote_name: impl Into<String>) -> Self {
        self.remote_name = Some(remote_name.into());
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn with_choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = Some(choices.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_precision(mut self, precision: u8) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The column name used on the remote side. No casing transformation.
    pub fn column_name(&self) -> &str {
        self.remote_name.as_deref().unwrap_or(&self.name)
    }
}

/// A selection choice as the remote API expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub name: String,
}

/// `{ "name": "iso" }`-style format selector used by date options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedFormat {
    pub name: String,
}

impl NamedFormat {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

/// Type-dependent column options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<Choice>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_format: Option<NamedFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_format: Option<NamedFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl FieldOptions {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Choice names, in order.
    pub fn choice_names(&self) -> Vec<&str> {
        self.choices
            .iter()
            .flatten()
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// Concrete remote column derived from one [`FieldDescriptor`].
///
/// Serializes to the field shape of the Airtable metadata API:
/// `{ "name", "type", "description"?, "options"? }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedField {
    #[serde(rename = "name")]
    pub remote_name: String,
    #[serde(rename = "type")]
    pub remote_type: FieldType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "FieldOptions::is_empty")]
    pub options: FieldOptions,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_names_roundtrip_known_types() {
        for t in [
            FieldType::SingleLineText,
            FieldType::LongText,
            FieldType::Phone,
            FieldType::MultiSelect,
            FieldType::ModifiedBy,
            FieldType::AutoNumber,
        ] {
            assert_eq!(FieldType::from_wire(t.as_str()), t);
        }
    }

    #[test]
    fn test_unknown_wire_type_is_preserved() {
        let t: FieldType = serde_json::from_value(json!("aiText")).unwrap();
        assert_eq!(t, FieldType::Other("aiText".into()));
        assert_eq!(serde_json::to_value(&t).unwrap(), json!("aiText"));
    }

    #[test]
    fn test_column_name_defaults_to_name() {
        let f = FieldDescriptor::new("first_name", DeclaredType::Text);
        assert_eq!(f.column_name(), "first_name");
        let f = f.with_remote_name("First Name");
        assert_eq!(f.column_name(), "First Name");
    }

    #[test]
    fn test_resolved_field_payload_shape() {
        let field = ResolvedField {
            remote_name: "Price".into(),
            remote_type: FieldType::Currency,
            description: None,
            options: FieldOptions {
                precision: Some(2),
                symbol: Some("$".into()),
                ..Default::default()
            },
        };
        assert_eq!(
            serde_json::to_value(&field).unwrap(),
            json!({"name": "Price", "type": "currency", "options": {"precision": 2, "symbol": "$"}})
        );
    }

    #[test]
    fn test_empty_options_are_omitted() {
        let field = ResolvedField {
            remote_name: "Name".into(),
            remote_type: FieldType::SingleLineText,
            description: Some("Full name".into()),
            options: FieldOptions::default(),
        };
        assert_eq!(
            serde_json::to_value(&field).unwrap(),
            json!({"name": "Name", "type": "singleLineText", "description": "Full name"})
        );
    }
}
