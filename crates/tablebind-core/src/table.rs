//! CRUD façade over one remote table.
//!
//! A [`Table<M>`] binds a [`RecordSchema`] to a [`TableService`] and a local
//! record type `M`. `M` is any serde type whose JSON form is an object keyed
//! by field name; typed records implement [`Model`] to supply their schema,
//! runtime-declared ones use [`DynamicRecord`](crate::record::DynamicRecord)
//! with [`Table::with_schema`].
//!
//! ```rust,no_run
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//! use tablebind_core::field::{DeclaredType, FieldDescriptor};
//! use tablebind_core::schema::RecordSchema;
//! use tablebind_core::service::memory::InMemoryTableService;
//! use tablebind_core::table::{Model, Table};
//!
//! #[derive(Serialize, Deserialize)]
//! struct User {
//!     name: String,
//!     email: Option<String>,
//! }
//!
//! impl Model for User {
//!     fn schema() -> tablebind_core::Result<RecordSchema> {
//!         RecordSchema::new(
//!             "Users",
//!             vec![
//!                 FieldDescriptor::new("name", DeclaredType::Text).required(),
//!                 FieldDescriptor::new("email", DeclaredType::Text),
//!             ],
//!         )
//!     }
//! }
//!
//! # async fn run() -> tablebind_core::Result<()> {
//! let users = Table::<User>::new(Arc::new(InMemoryTableService::new()))?;
//! let alice = users
//!     .create(User { name: "Alice".into(), email: None })
//!     .await?;
//! assert!(alice.is_persisted());
//! # Ok(())
//! # }
//! ```
//!
//! Errors follow one rule: validation happens before any remote call, and
//! remote failures are returned as-is. Listing never fails because of one
//! bad record; see [`Listing`].

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::formula;
use crate::record::{self, Record, WriteMode};
use crate::schema::RecordSchema;
use crate::service::{ListQuery, TableService, MAX_BATCH_SIZE};
use crate::validate;

/// A serde record type with a statically declared schema.
pub trait Model: Serialize + DeserializeOwned {
    fn schema() -> Result<RecordSchema>;
}

/// A listed record that could not be decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedRecord {
    pub id: Option<String>,
    pub error: Error,
}

/// Result of a list call: decoded records plus the ones that failed to decode.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing<M> {
    pub records: Vec<Record<M>>,
    pub malformed: Vec<MalformedRecord>,
}

impl<M> Listing<M> {
    pub fn is_clean(&self) -> bool {
        self.malformed.is_empty()
    }

    /// Records only, or the first decode error if any record was malformed.
    pub fn strict(self) -> Result<Vec<Record<M>>> {
        match self.malformed.into_iter().next() {
            Some(bad) => Err(bad.error),
            None => Ok(self.records),
        }
    }
}

/// Why a bulk create stopped, and which inputs were not created.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    pub error: Error,
    /// Input indices, ascending.
    pub not_created: Vec<usize>,
}

/// Outcome of [`Table::bulk_create`].
#[derive(Debug, Clone, PartialEq)]
pub struct BulkCreate<M> {
    /// Created records, in input order.
    pub created: Vec<Record<M>>,
    pub failure: Option<BatchFailure>,
}

impl<M> BulkCreate<M> {
    /// Created records, or [`Error::PartialBatch`] if any batch failed.
    pub fn into_result(self) -> Result<Vec<Record<M>>> {
        match self.failure {
            None => Ok(self.created),
            Some(failure) => Err(Error::PartialBatch {
                created: self.created.len(),
                not_created: failure.not_created,
                source: Box::new(failure.error),
            }),
        }
    }
}

/// CRUD operations for records of type `M` in one remote table.
pub struct Table<M> {
    service: Arc<dyn TableService>,
    schema: RecordSchema,
    _record: PhantomData<fn() -> M>,
}

impl<M: Model> Table<M> {
    /// Bind `M`'s declared schema to a service.
    pub fn new(service: Arc<dyn TableService>) -> Result<Self> {
        Ok(Self::with_schema(service, M::schema()?))
    }
}

impl<M> Table<M>
where
    M: Serialize + DeserializeOwned,
{
    pub fn with_schema(service: Arc<dyn TableService>, schema: RecordSchema) -> Self {
        Self {
            service,
            schema,
            _record: PhantomData,
        }
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    fn name(&self) -> &str {
        self.schema.table_name()
    }

    /// Apply defaults and validate; returns the normalized local record and
    /// the remote payload.
    fn prepare(&self, data: &M, mode: WriteMode) -> Result<(M, Map<String, Value>)> {
        let mut local = record::to_local_map(data)?;
        validate::apply_defaults(&self.schema, &mut local);
        validate::validate_for_write(&self.schema, &local)?;
        let payload = record::to_remote_fields(&self.schema, &local, mode);
        let normalized = serde_json::from_value(Value::Object(local))
            .map_err(|e| Error::validation("<record>", e.to_string()))?;
        Ok((normalized, payload))
    }

    /// Validate and create one record.
    ///
    /// The returned record carries the remote-assigned id and creation time.
    pub async fn create(&self, data: M) -> Result<Record<M>> {
        let (fields, payload) = self.prepare(&data, WriteMode::Create)?;
        let mut returned = self.service.create_records(self.name(), vec![payload]).await?;
        if returned.len() != 1 {
            return Err(Error::Decode {
                id: None,
                message: format!("create returned {} records, expected 1", returned.len()),
            });
        }
        let created = returned.remove(0);
        tracing::debug!(table = self.name(), id = %created.id, "created record");
        Ok(Record {
            id: Some(created.id),
            created_time: Some(created.created_time),
            fields,
        })
    }

    /// Fetch one record by id.
    ///
    /// # Errors
    ///
    /// [`Error::RecordNotFound`] when the remote side reports no such record.
    pub async fn get(&self, id: &str) -> Result<Record<M>> {
        let remote = self.service.get_record(self.name(), id).await?;
        record::decode_record(&self.schema, remote)
    }

    /// List records matching `query`.
    ///
    /// Each record is decoded independently; failures are collected in
    /// [`Listing::malformed`] and logged, the rest are returned.
    pub async fn all(&self, query: &ListQuery) -> Result<Listing<M>> {
        let raw = self.service.list_records(self.name(), query).await?;
        let mut listing = Listing {
            records: Vec::with_capacity(raw.len()),
            malformed: Vec::new(),
        };
        for value in raw {
            let id = value.get("id").and_then(Value::as_str).map(str::to_string);
            match record::decode_raw(&self.schema, value) {
                Ok(rec) => listing.records.push(rec),
                Err(error) => {
                    tracing::warn!(table = self.name(), id = ?id, %error, "skipping malformed record");
                    listing.malformed.push(MalformedRecord { id, error });
                }
            }
        }
        Ok(listing)
    }

    /// Records whose fields equal every given value.
    ///
    /// Field names are local; the filter uses their remote column names.
    pub async fn find_by(&self, criteria: &[(&str, Value)]) -> Result<Listing<M>> {
        let query = match self.equality_filter(criteria)? {
            Some(formula) => ListQuery::new().filter(formula),
            None => ListQuery::new(),
        };
        self.all(&query).await
    }

    /// First record matching `criteria`, or `None`.
    ///
    /// Asks the remote side for a single record.
    pub async fn first(&self, criteria: &[(&str, Value)]) -> Result<Option<Record<M>>> {
        let mut query = ListQuery::new().max_records(1);
        if let Some(formula) = self.equality_filter(criteria)? {
            query = query.filter(formula);
        }
        Ok(self.all(&query).await?.records.into_iter().next())
    }

    /// Build the filter formula for `criteria`.
    pub fn equality_filter(&self, criteria: &[(&str, Value)]) -> Result<Option<String>> {
        let pairs = criteria
            .iter()
            .map(|(name, value)| {
                let field = self
                    .schema
                    .field(name)
                    .ok_or_else(|| Error::validation(*name, "field is not declared in the schema"))?;
                Ok((field.column_name().to_string(), value.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        formula::conjunction(&pairs)
    }

    /// Validate and create many records, in batches of [`MAX_BATCH_SIZE`].
    ///
    /// Every item is validated before the first remote call. A failing
    /// batch stops the operation; the result lists what was created and
    /// which input indices were not.
    ///
    /// # Errors
    ///
    /// Only validation errors. Remote failures are reported in
    /// [`BulkCreate::failure`].
    pub async fn bulk_create(&self, items: Vec<M>) -> Result<BulkCreate<M>> {
        let mut prepared = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let p = self.prepare(item, WriteMode::Create).map_err(|e| match e {
                Error::Validation { field, message } => Error::Validation {
                    field,
                    message: format!("item {i}: {message}"),
                },
                other => other,
            })?;
            prepared.push(p);
        }

        let total = prepared.len();
        let mut result = BulkCreate {
            created: Vec::with_capacity(total),
            failure: None,
        };
        let mut pending = prepared.into_iter();
        let mut start = 0;
        while start < total {
            let (locals, payloads): (Vec<M>, Vec<Map<String, Value>>) =
                pending.by_ref().take(MAX_BATCH_SIZE).unzip();
            let count = locals.len();

            match self.service.create_records(self.name(), payloads).await {
                Ok(created) => {
                    let returned = created.len();
                    for (fields, remote) in locals.into_iter().zip(created) {
                        result.created.push(Record {
                            id: Some(remote.id),
                            created_time: Some(remote.created_time),
                            fields,
                        });
                    }
                    if returned != count {
                        let confirmed = start + returned.min(count);
                        tracing::warn!(
                            table = self.name(),
                            sent = count,
                            returned,
                            "bulk create stopped on a short batch"
                        );
                        result.failure = Some(BatchFailure {
                            error: Error::Decode {
                                id: None,
                                message: format!(
                                    "batch of {count} records returned {returned} created records"
                                ),
                            },
                            not_created: (confirmed..total).collect(),
                        });
                        break;
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        table = self.name(),
                        created = start,
                        remaining = total - start,
                        %error,
                        "bulk create stopped"
                    );
                    result.failure = Some(BatchFailure {
                        error,
                        not_created: (start..total).collect(),
                    });
                    break;
                }
            }
            start += count;
        }
        Ok(result)
    }

    /// Write back a persisted record and return the refreshed remote state.
    ///
    /// # Errors
    ///
    /// [`Error::Precondition`] if the record has no id.
    pub async fn save(&self, record: &Record<M>) -> Result<Record<M>> {
        let id = record
            .id
            .as_deref()
            .ok_or_else(|| Error::Precondition("cannot save a record that has no id".into()))?;
        let (_, payload) = self.prepare(&record.fields, WriteMode::Update)?;
        let remote = self.service.update_record(self.name(), id, payload).await?;
        record::decode_record(&self.schema, remote)
    }

    /// Delete a persisted record. Returns the deleted id.
    ///
    /// # Errors
    ///
    /// [`Error::Precondition`] if the record has no id;
    /// [`Error::RecordNotFound`] if it was already deleted.
    pub async fn delete(&self, record: &Record<M>) -> Result<String> {
        let id = record
            .id
            .as_deref()
            .ok_or_else(|| Error::Precondition("cannot delete a record that has no id".into()))?;
        self.delete_by_id(id).await
    }

    pub async fn delete_by_id(&self, id: &str) -> Result<String> {
        self.service.delete_record(self.name(), id).await
    }
}
