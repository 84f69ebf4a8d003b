//! In-memory [`TableService`] implementation for tests.
//!
//! Tables and records live in `Vec`s behind `std::sync::RwLock`. Records are
//! stored as raw JSON so tests can seed malformed entries. The service
//! behaves like the hosted API where it matters to callers:
//!
//! - unknown column names in writes or filters are rejected (422);
//! - `autoNumber` columns cannot be created (422);
//! - more than [`MAX_BATCH_SIZE`] records per create call are rejected (422);
//! - empty cells (null, `""`, `[]`, unchecked checkboxes) are not stored.
//!
//! Every call is appended to a log ([`InMemoryTableService::calls`]) and
//! failures can be injected per field, per record batch, or globally.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::field::{FieldType, ResolvedField};
use crate::formula;
use crate::translate::TableDefinition;

use super::{
    ListQuery, RemoteField, RemoteRecord, RemoteTableSchema, SortDirection, TableService,
    MAX_BATCH_SIZE,
};

/// One call received by an [`InMemoryTableService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    ListTables,
    CreateTable { name: String },
    CreateField { table_id: String, name: String },
    UpdateField { table_id: String, field_id: String },
    CreateRecords { table: String, count: usize },
    GetRecord { table: String, id: String },
    ListRecords {
        table: String,
        filter: Option<String>,
        max_records: Option<usize>,
    },
    UpdateRecord { table: String, id: String },
    DeleteRecord { table: String, id: String },
}

impl ServiceCall {
    /// True for calls that remove data.
    pub fn is_destructive(&self) -> bool {
        matches!(self, Self::DeleteRecord { .. })
    }
}

struct StoredTable {
    schema: RemoteTableSchema,
    records: Vec<Value>,
}

#[derive(Default)]
struct Faults {
    unreachable: bool,
    fields: HashMap<String, Error>,
    /// Remaining successful record batches, then the error to return.
    batches: Option<(usize, Error)>,
}

/// In-memory remote service for tests.
pub struct InMemoryTableService {
    tables: RwLock<Vec<StoredTable>>,
    calls: Mutex<Vec<ServiceCall>>,
    faults: Mutex<Faults>,
}

impl InMemoryTableService {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            faults: Mutex::new(Faults::default()),
        }
    }

    /// Seed a table directly (not logged). Returns its schema.
    pub fn add_table(&self, name: &str, fields: &[(&str, FieldType)]) -> RemoteTableSchema {
        let fields: Vec<RemoteField> = fields
            .iter()
            .map(|(name, remote_type)| RemoteField {
                field_id: new_id("fld"),
                remote_name: name.to_string(),
                remote_type: remote_type.clone(),
                options: None,
                description: None,
            })
            .collect();
        let schema = RemoteTableSchema {
            table_id: new_id("tbl"),
            name: name.to_string(),
            primary_field_id: fields.first().map(|f| f.field_id.clone()),
            description: None,
            fields,
        };
        self.tables.write().unwrap().push(StoredTable {
            schema: schema.clone(),
            records: Vec::new(),
        });
        schema
    }

    /// Seed a raw record, bypassing every check (not logged).
    pub fn insert_raw_record(&self, table: &str, record: Value) -> Result<()> {
        let mut tables = self.tables.write().unwrap();
        let idx = table_index(&tables, table)?;
        tables[idx].records.push(record);
        Ok(())
    }

    /// Raw stored records of a table.
    pub fn records(&self, table: &str) -> Vec<Value> {
        let tables = self.tables.read().unwrap();
        table_index(&tables, table)
            .map(|idx| tables[idx].records.clone())
            .unwrap_or_default()
    }

    /// Current schema of a table, without logging a call.
    pub fn table(&self, table: &str) -> Option<RemoteTableSchema> {
        let tables = self.tables.read().unwrap();
        table_index(&tables, table)
            .ok()
            .map(|idx| tables[idx].schema.clone())
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Make every subsequent call fail with a transport error.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.faults.lock().unwrap().unreachable = unreachable;
    }

    /// Fail creation or update of the named field with `error`.
    pub fn fail_field(&self, name: &str, error: Error) {
        self.faults
            .lock()
            .unwrap()
            .fields
            .insert(name.to_string(), error);
    }

    /// Let `successes` record-create calls succeed, then fail every later one.
    pub fn fail_record_batches_after(&self, successes: usize, error: Error) {
        self.faults.lock().unwrap().batches = Some((successes, error));
    }

    fn log(&self, call: ServiceCall) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        if self.faults.lock().unwrap().unreachable {
            return Err(Error::Transport("connection refused".into()));
        }
        Ok(())
    }

    fn field_fault(&self, name: &str) -> Option<Error> {
        self.faults.lock().unwrap().fields.get(name).cloned()
    }

    fn batch_fault(&self) -> Option<Error> {
        let mut faults = self.faults.lock().unwrap();
        match faults.batches.as_mut() {
            Some((0, error)) => Some(error.clone()),
            Some((remaining, _)) => {
                *remaining -= 1;
                None
            }
            None => None,
        }
    }
}

impl Default for InMemoryTableService {
    fn default() -> Self {
        Self::new()
    }
}

fn new_id(prefix: &str) -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("{}{}", prefix, &hex[..14])
}

fn unprocessable(kind: &str, message: impl Into<String>) -> Error {
    Error::Api {
        status: 422,
        kind: Some(kind.to_string()),
        message: message.into(),
    }
}

fn table_index(tables: &[StoredTable], table: &str) -> Result<usize> {
    tables
        .iter()
        .position(|t| t.schema.name == table || t.schema.table_id == table)
        .ok_or_else(|| Error::TableNotFound(table.to_string()))
}

fn to_remote_field(field: &ResolvedField) -> Result<RemoteField> {
    if field.remote_type == FieldType::AutoNumber {
        return Err(unprocessable(
            "INVALID_FIELD_TYPE",
            format!("Field '{}': autoNumber fields cannot be created", field.remote_name),
        ));
    }
    let options = if field.options.is_empty() {
        None
    } else {
        serde_json::to_value(&field.options).ok()
    };
    Ok(RemoteField {
        field_id: new_id("fld"),
        remote_name: field.remote_name.clone(),
        remote_type: field.remote_type.clone(),
        options,
        description: field.description.clone(),
    })
}

/// Empty cells are dropped, as the hosted API does.
fn stored_cell(value: Value) -> Option<Value> {
    match &value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::Array(a) if a.is_empty() => None,
        _ => Some(value),
    }
}

fn check_columns(schema: &RemoteTableSchema, fields: &Map<String, Value>) -> Result<()> {
    for column in fields.keys() {
        if schema.field(column).is_none() {
            return Err(unprocessable(
                "UNKNOWN_FIELD_NAME",
                format!("Unknown field name: \"{column}\""),
            ));
        }
    }
    Ok(())
}

fn decode(raw: &Value) -> Result<RemoteRecord> {
    serde_json::from_value(raw.clone()).map_err(|e| Error::Decode {
        id: raw.get("id").and_then(Value::as_str).map(str::to_string),
        message: e.to_string(),
    })
}

fn cells(raw: &Value) -> Option<&Map<String, Value>> {
    raw.get("fields").and_then(Value::as_object)
}

/// Equality as the remote formula language evaluates it: blank cells equal
/// `BLANK()`, `FALSE()` and `''`.
fn cell_matches(cell: Option<&Value>, expected: &Value) -> bool {
    match (cell, expected) {
        (None, Value::Null | Value::Bool(false)) => true,
        (None, Value::String(s)) => s.is_empty(),
        (None, _) => false,
        (Some(_), Value::Null) => false,
        (Some(Value::Number(a)), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Some(a), b) => a == b,
    }
}

fn compare_cells(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

#[async_trait]
impl TableService for InMemoryTableService {
    async fn list_tables(&self) -> Result<Vec<RemoteTableSchema>> {
        self.log(ServiceCall::ListTables)?;
        let tables = self.tables.read().unwrap();
        Ok(tables.iter().map(|t| t.schema.clone()).collect())
    }

    async fn create_table(&self, definition: &TableDefinition) -> Result<RemoteTableSchema> {
        self.log(ServiceCall::CreateTable {
            name: definition.name.clone(),
        })?;
        if definition.fields.is_empty() {
            return Err(unprocessable(
                "INVALID_REQUEST_UNKNOWN",
                "A table must have at least one field",
            ));
        }

        let mut tables = self.tables.write().unwrap();
        if tables.iter().any(|t| t.schema.name == definition.name) {
            return Err(unprocessable(
                "DUPLICATE_TABLE_NAME",
                format!("Table '{}' already exists", definition.name),
            ));
        }
        for field in &definition.fields {
            if let Some(error) = self.field_fault(&field.remote_name) {
                return Err(error);
            }
        }
        let fields = definition
            .fields
            .iter()
            .map(to_remote_field)
            .collect::<Result<Vec<_>>>()?;
        let schema = RemoteTableSchema {
            table_id: new_id("tbl"),
            name: definition.name.clone(),
            primary_field_id: fields.first().map(|f| f.field_id.clone()),
            description: definition.description.clone(),
            fields,
        };
        tables.push(StoredTable {
            schema: schema.clone(),
            records: Vec::new(),
        });
        Ok(schema)
    }

    async fn create_field(&self, table_id: &str, field: &ResolvedField) -> Result<RemoteField> {
        self.log(ServiceCall::CreateField {
            table_id: table_id.to_string(),
            name: field.remote_name.clone(),
        })?;
        if let Some(error) = self.field_fault(&field.remote_name) {
            return Err(error);
        }

        let mut tables = self.tables.write().unwrap();
        let idx = table_index(&tables, table_id)?;
        let schema = &mut tables[idx].schema;
        if schema.field(&field.remote_name).is_some() {
            return Err(unprocessable(
                "DUPLICATE_OR_EMPTY_FIELD_NAME",
                format!("Field '{}' already exists", field.remote_name),
            ));
        }
        let created = to_remote_field(field)?;
        schema.fields.push(created.clone());
        Ok(created)
    }

    async fn update_field(
        &self,
        table_id: &str,
        field_id: &str,
        field: &ResolvedField,
    ) -> Result<RemoteField> {
        self.log(ServiceCall::UpdateField {
            table_id: table_id.to_string(),
            field_id: field_id.to_string(),
        })?;
        if let Some(error) = self.field_fault(&field.remote_name) {
            return Err(error);
        }

        let mut tables = self.tables.write().unwrap();
        let idx = table_index(&tables, table_id)?;
        let existing = tables[idx]
            .schema
            .fields
            .iter_mut()
            .find(|f| f.field_id == field_id)
            .ok_or_else(|| Error::Api {
                status: 404,
                kind: Some("NOT_FOUND".into()),
                message: format!("Field '{field_id}' not found"),
            })?;
        let replacement = to_remote_field(field)?;
        existing.remote_type = replacement.remote_type;
        existing.options = replacement.options;
        Ok(existing.clone())
    }

    async fn create_records(
        &self,
        table: &str,
        records: Vec<Map<String, Value>>,
    ) -> Result<Vec<RemoteRecord>> {
        self.log(ServiceCall::CreateRecords {
            table: table.to_string(),
            count: records.len(),
        })?;
        if let Some(error) = self.batch_fault() {
            return Err(error);
        }
        if records.len() > MAX_BATCH_SIZE {
            return Err(unprocessable(
                "INVALID_RECORDS",
                format!("At most {MAX_BATCH_SIZE} records can be created per request"),
            ));
        }

        let mut tables = self.tables.write().unwrap();
        let idx = table_index(&tables, table)?;
        for fields in &records {
            check_columns(&tables[idx].schema, fields)?;
        }

        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut created = Vec::with_capacity(records.len());
        for fields in records {
            let stored: Map<String, Value> = fields
                .into_iter()
                .filter_map(|(k, v)| stored_cell(v).map(|v| (k, v)))
                .collect();
            let raw = json!({ "id": new_id("rec"), "createdTime": now, "fields": stored });
            created.push(decode(&raw)?);
            tables[idx].records.push(raw);
        }
        Ok(created)
    }

    async fn get_record(&self, table: &str, id: &str) -> Result<RemoteRecord> {
        self.log(ServiceCall::GetRecord {
            table: table.to_string(),
            id: id.to_string(),
        })?;
        let tables = self.tables.read().unwrap();
        let idx = table_index(&tables, table)?;
        let raw = tables[idx]
            .records
            .iter()
            .find(|r| r.get("id").and_then(Value::as_str) == Some(id))
            .ok_or_else(|| Error::RecordNotFound {
                table: table.to_string(),
                id: id.to_string(),
            })?;
        decode(raw)
    }

    async fn list_records(&self, table: &str, query: &ListQuery) -> Result<Vec<Value>> {
        self.log(ServiceCall::ListRecords {
            table: table.to_string(),
            filter: query.filter_by_formula.clone(),
            max_records: query.max_records,
        })?;
        let tables = self.tables.read().unwrap();
        let idx = table_index(&tables, table)?;
        let stored = &tables[idx];

        let clauses = match &query.filter_by_formula {
            Some(f) => formula::parse_conjunction(f).ok_or_else(|| {
                unprocessable("INVALID_FILTER_BY_FORMULA", format!("Invalid formula: {f}"))
            })?,
            None => Vec::new(),
        };
        for (column, _) in &clauses {
            if stored.schema.field(column).is_none() {
                return Err(unprocessable(
                    "INVALID_FILTER_BY_FORMULA",
                    format!("Unknown field names: {}", column.to_lowercase()),
                ));
            }
        }

        let mut out: Vec<Value> = stored
            .records
            .iter()
            .filter(|raw| {
                clauses.iter().all(|(column, expected)| {
                    cell_matches(cells(raw).and_then(|c| c.get(column)), expected)
                })
            })
            .cloned()
            .collect();

        for spec in query.sort.iter().rev() {
            out.sort_by(|a, b| {
                let ord = compare_cells(
                    cells(a).and_then(|c| c.get(&spec.field)),
                    cells(b).and_then(|c| c.get(&spec.field)),
                );
                match spec.direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            });
        }
        if let Some(max) = query.max_records {
            out.truncate(max);
        }
        if !query.fields.is_empty() {
            for raw in &mut out {
                if let Some(cells) = raw.get_mut("fields").and_then(Value::as_object_mut) {
                    cells.retain(|k, _| query.fields.contains(k));
                }
            }
        }
        Ok(out)
    }

    async fn update_record(
        &self,
        table: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<RemoteRecord> {
        self.log(ServiceCall::UpdateRecord {
            table: table.to_string(),
            id: id.to_string(),
        })?;
        let mut tables = self.tables.write().unwrap();
        let idx = table_index(&tables, table)?;
        check_columns(&tables[idx].schema, &fields)?;

        let raw = tables[idx]
            .records
            .iter_mut()
            .find(|r| r.get("id").and_then(Value::as_str) == Some(id))
            .ok_or_else(|| Error::RecordNotFound {
                table: table.to_string(),
                id: id.to_string(),
            })?;
        if let Some(obj) = raw.as_object_mut() {
            let cells = obj
                .entry("fields")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Some(cells) = cells.as_object_mut() {
                for (column, value) in fields {
                    match stored_cell(value) {
                        Some(v) => {
                            cells.insert(column, v);
                        }
                        None => {
                            cells.remove(&column);
                        }
                    }
                }
            }
        }
        decode(raw)
    }

    async fn delete_record(&self, table: &str, id: &str) -> Result<String> {
        self.log(ServiceCall::DeleteRecord {
            table: table.to_string(),
            id: id.to_string(),
        })?;
        let mut tables = self.tables.write().unwrap();
        let idx = table_index(&tables, table)?;
        let records = &mut tables[idx].records;
        let pos = records
            .iter()
            .position(|r| r.get("id").and_then(Value::as_str) == Some(id))
            .ok_or_else(|| Error::RecordNotFound {
                table: table.to_string(),
                id: id.to_string(),
            })?;
        records.remove(pos);
        Ok(id.to_string())
    }
}
