//! Mapping between local records and remote wire records.
//!
//! Locally a record's fields are keyed by field name; on the wire they are
//! keyed by remote column name. Writing strips read-only fields. Reading
//! ignores columns the schema does not declare and fills cells the remote
//! side omits because they are empty.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::field::DeclaredType;
use crate::schema::RecordSchema;
use crate::service::RemoteRecord;
use crate::validate;

/// Record type for schemas declared at runtime (e.g. in configuration).
pub type DynamicRecord = Map<String, Value>;

/// A local record plus the metadata the remote side assigns on creation.
///
/// `id` and `created_time` are `None` until the record has been persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<M> {
    pub id: Option<String>,
    pub created_time: Option<DateTime<Utc>>,
    pub fields: M,
}

impl<M> Record<M> {
    /// An unsaved record.
    pub fn new(fields: M) -> Self {
        Self {
            id: None,
            created_time: None,
            fields,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}

/// How null values are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Nulls are omitted.
    Create,
    /// Nulls are sent so the remote side clears the cell.
    Update,
}

/// Serialize a local record into a field map keyed by local name.
///
/// # Errors
///
/// [`Error::Validation`] if the value does not serialize to a JSON object.
pub fn to_local_map<M: Serialize>(data: &M) -> Result<Map<String, Value>> {
    match serde_json::to_value(data) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(Error::validation(
            "<record>",
            format!("a record must serialize to an object, got {other}"),
        )),
        Err(e) => Err(Error::validation("<record>", e.to_string())),
    }
}

/// Build the remote field payload for a validated local map.
pub fn to_remote_fields(
    schema: &RecordSchema,
    data: &Map<String, Value>,
    mode: WriteMode,
) -> Map<String, Value> {
    let mut out = Map::new();
    for field in schema.fields().iter().filter(|f| !f.read_only) {
        match data.get(&field.name) {
            None => {}
            Some(Value::Null) if mode == WriteMode::Create => {}
            Some(value) => {
                out.insert(field.column_name().to_string(), value.clone());
            }
        }
    }
    out
}

/// Build a local map (keyed by field name) from remote cells.
pub fn from_remote_fields(schema: &RecordSchema, cells: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for field in schema.fields() {
        let value = match cells.get(field.column_name()) {
            Some(value) => value.clone(),
            None => match &field.declared_type {
                // Unchecked boxes and empty lists are omitted remotely.
                DeclaredType::Boolean => Value::Bool(false),
                DeclaredType::ListOfText => Value::Array(Vec::new()),
                _ => field.default_value.clone().unwrap_or(Value::Null),
            },
        };
        out.insert(field.name.clone(), value);
    }
    out
}

/// Decode a remote record into a local one.
///
/// # Errors
///
/// [`Error::Decode`] carrying the record id if a value does not match the
/// schema or the local type.
pub fn decode_record<M: DeserializeOwned>(
    schema: &RecordSchema,
    remote: RemoteRecord,
) -> Result<Record<M>> {
    let local = from_remote_fields(schema, &remote.fields);
    let decode_error = |message: String| Error::Decode {
        id: Some(remote.id.clone()),
        message,
    };

    validate::validate_for_read(schema, &local).map_err(|e| decode_error(e.to_string()))?;
    let fields = serde_json::from_value(Value::Object(local))
        .map_err(|e| decode_error(e.to_string()))?;

    Ok(Record {
        id: Some(remote.id),
        created_time: Some(remote.created_time),
        fields,
    })
}

/// Decode a raw listed record, first into the wire shape, then locally.
pub fn decode_raw<M: DeserializeOwned>(schema: &RecordSchema, raw: Value) -> Result<Record<M>> {
    let id = raw.get("id").and_then(Value::as_str).map(str::to_string);
    let remote: RemoteRecord = serde_json::from_value(raw).map_err(|e| Error::Decode {
        id,
        message: e.to_string(),
    })?;
    decode_record(schema, remote)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldDescriptor;
    use serde_json::json;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Contact {
        name: String,
        email: Option<String>,
        subscribed: bool,
        tags: Vec<String>,
    }

    fn schema() -> RecordSchema {
        RecordSchema::new(
            "Contacts",
            vec![
                FieldDescriptor::new("name", DeclaredType::Text).with_remote_name("Name"),
                FieldDescriptor::new("email", DeclaredType::Text),
                FieldDescriptor::new("subscribed", DeclaredType::Boolean),
                FieldDescriptor::new("tags", DeclaredType::ListOfText),
                FieldDescriptor::new("score", DeclaredType::Float).read_only(),
            ],
        )
        .unwrap()
    }

    fn map(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn test_create_payload_renames_and_strips() {
        let data = map(json!({"name": "Ann", "email": null, "score": 3.0, "subscribed": true}));
        let out = to_remote_fields(&schema(), &data, WriteMode::Create);
        assert_eq!(Value::Object(out), json!({"Name": "Ann", "subscribed": true}));
    }

    #[test]
    fn test_update_payload_keeps_nulls() {
        let data = map(json!({"name": "Ann", "email": null}));
        let out = to_remote_fields(&schema(), &data, WriteMode::Update);
        assert_eq!(Value::Object(out), json!({"Name": "Ann", "email": null}));
    }

    #[test]
    fn test_read_fills_omitted_cells_and_ignores_extra_columns() {
        let cells = map(json!({"Name": "Ann", "Lookup": ["x"], "score": 2.5}));
        let local = from_remote_fields(&schema(), &cells);
        assert_eq!(
            Value::Object(local),
            json!({"name": "Ann", "email": null, "subscribed": false, "tags": [], "score": 2.5})
        );
    }

    #[test]
    fn test_decode_record() {
        let remote: RemoteRecord = serde_json::from_value(json!({
            "id": "rec1",
            "createdTime": "2024-03-01T10:00:00.000Z",
            "fields": {"Name": "Ann", "email": "ann@example.com", "tags": ["vip"]}
        }))
        .unwrap();
        let rec: Record<Contact> = decode_record(&schema(), remote).unwrap();
        assert_eq!(rec.id.as_deref(), Some("rec1"));
        assert!(rec.created_time.is_some());
        assert_eq!(
            rec.fields,
            Contact {
                name: "Ann".into(),
                email: Some("ann@example.com".into()),
                subscribed: false,
                tags: vec!["vip".into()],
            }
        );
    }

    #[test]
    fn test_decode_error_carries_record_id() {
        let raw = json!({
            "id": "rec9",
            "createdTime": "2024-03-01T10:00:00.000Z",
            "fields": {"Name": 42}
        });
        let err = decode_raw::<Contact>(&schema(), raw).unwrap_err();
        assert!(matches!(err, Error::Decode { id: Some(ref id), .. } if id == "rec9"));
    }

    #[test]
    fn test_decode_raw_rejects_bad_wire_shape() {
        let err = decode_raw::<DynamicRecord>(&schema(), json!({"id": "rec2"})).unwrap_err();
        assert!(matches!(err, Error::Decode { id: Some(_), .. }));
    }

    #[test]
    fn test_non_object_record_rejected() {
        assert!(to_local_map(&42).is_err());
    }
}
