//! Remote table service abstraction.
//!
//! The [`TableService`] trait is the only I/O boundary of the core: every
//! CRUD, translation-apply and synchronization operation goes through it.
//! The app crate implements it over HTTP; [`memory::InMemoryTableService`]
//! implements it in-process for tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::field::{FieldType, ResolvedField};
use crate::translate::TableDefinition;

/// Maximum number of records per create request.
pub const MAX_BATCH_SIZE: usize = 10;

/// A record as the remote side represents it: `{ id, createdTime, fields }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub id: String,
    #[serde(rename = "createdTime")]
    pub created_time: DateTime<Utc>,
    /// Keyed by remote column name. Empty cells are omitted by the remote side.
    #[serde(default)]
    pub fields: Map<String, Value>,
}

/// One column of a live remote table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteField {
    #[serde(rename = "id")]
    pub field_id: String,
    #[serde(rename = "name")]
    pub remote_name: String,
    #[serde(rename = "type")]
    pub remote_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A live remote table as reported by the metadata API.
///
/// Field order is the remote display order; identity is the field name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteTableSchema {
    #[serde(rename = "id")]
    pub table_id: String,
    pub name: String,
    #[serde(rename = "primaryFieldId", default, skip_serializing_if = "Option::is_none")]
    pub primary_field_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<RemoteField>,
}

impl RemoteTableSchema {
    /// Find a column by exact (case-sensitive) name.
    pub fn field(&self, remote_name: &str) -> Option<&RemoteField> {
        self.fields.iter().find(|f| f.remote_name == remote_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One sort key of a list query, by remote column name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

/// Parameters passed through to the remote list endpoint.
///
/// Field names in `sort` and `fields` are remote column names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    pub filter_by_formula: Option<String>,
    pub sort: Vec<SortSpec>,
    pub max_records: Option<usize>,
    pub page_size: Option<usize>,
    pub fields: Vec<String>,
    pub view: Option<String>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, formula: impl Into<String>) -> Self {
        self.filter_by_formula = Some(formula.into());
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push(SortSpec {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn max_records(mut self, max: usize) -> Self {
        self.max_records = Some(max);
        self
    }

    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn view(mut self, view: impl Into<String>) -> Self {
        self.view = Some(view.into());
        self
    }

    /// Encode as URL query pairs in the remote list-endpoint convention
    /// (`sort[0][field]`, `fields[]`, ...). Pagination offsets are added by
    /// the caller.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(formula) = &self.filter_by_formula {
            pairs.push(("filterByFormula".to_string(), formula.clone()));
        }
        for (i, spec) in self.sort.iter().enumerate() {
            pairs.push((format!("sort[{i}][field]"), spec.field.clone()));
            let direction = match spec.direction {
                SortDirection::Asc => "asc",
                SortDirection::Desc => "desc",
            };
            pairs.push((format!("sort[{i}][direction]"), direction.to_string()));
        }
        if let Some(max) = self.max_records {
            pairs.push(("maxRecords".to_string(), max.to_string()));
        }
        if let Some(size) = self.page_size {
            pairs.push(("pageSize".to_string(), size.to_string()));
        }
        for field in &self.fields {
            pairs.push(("fields[]".to_string(), field.clone()));
        }
        if let Some(view) = &self.view {
            pairs.push(("view".to_string(), view.clone()));
        }
        pairs
    }
}

/// Abstract remote tabular-database service.
///
/// `table` arguments of record operations accept a table name or id.
/// Metadata operations that modify a table take its id.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`list_tables`](TableService::list_tables) | All tables of the base with their fields |
/// | [`get_table`](TableService::get_table) | One table by name or id |
/// | [`create_table`](TableService::create_table) | Create a table from a translated definition |
/// | [`create_field`](TableService::create_field) | Add a column to a table |
/// | [`update_field`](TableService::update_field) | Change a column's type/options |
/// | [`create_records`](TableService::create_records) | Create up to [`MAX_BATCH_SIZE`] records |
/// | [`get_record`](TableService::get_record) | Fetch one record |
/// | [`list_records`](TableService::list_records) | List records, all pages |
/// | [`update_record`](TableService::update_record) | Patch one record |
/// | [`delete_record`](TableService::delete_record) | Delete one record |
///
/// No operation deletes a table or a field.
#[async_trait]
pub trait TableService: Send + Sync {
    async fn list_tables(&self) -> Result<Vec<RemoteTableSchema>>;

    /// Fetch one table by name or id.
    ///
    /// # Errors
    ///
    /// [`Error::TableNotFound`] if the base has no such table.
    async fn get_table(&self, table: &str) -> Result<RemoteTableSchema> {
        self.list_tables()
            .await?
            .into_iter()
            .find(|t| t.name == table || t.table_id == table)
            .ok_or_else(|| Error::TableNotFound(table.to_string()))
    }

    async fn create_table(&self, definition: &TableDefinition) -> Result<RemoteTableSchema>;

    async fn create_field(&self, table_id: &str, field: &ResolvedField) -> Result<RemoteField>;

    async fn update_field(
        &self,
        table_id: &str,
        field_id: &str,
        field: &ResolvedField,
    ) -> Result<RemoteField>;

    /// Create records from remote-keyed field maps, returning them in input order.
    async fn create_records(
        &self,
        table: &str,
        records: Vec<Map<String, Value>>,
    ) -> Result<Vec<RemoteRecord>>;

    /// # Errors
    ///
    /// [`Error::RecordNotFound`] when the remote side reports absence.
    async fn get_record(&self, table: &str, id: &str) -> Result<RemoteRecord>;

    /// List records, following pagination until exhausted or `max_records` is reached.
    ///
    /// Records are returned undecoded so that one malformed entry does not
    /// fail the whole listing.
    async fn list_records(&self, table: &str, query: &ListQuery) -> Result<Vec<Value>>;

    /// Patch a record. `null` values clear the cell.
    async fn update_record(
        &self,
        table: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<RemoteRecord>;

    /// Delete a record, returning the deleted id.
    async fn delete_record(&self, table: &str, id: &str) -> Result<String>;
}
