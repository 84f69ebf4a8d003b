//! Airtable Web API client.
//!
//! [`AirtableClient`] implements [`TableService`] over the Airtable REST API
//! and adds the base-level metadata operations the core does not model.
//!
//! | Endpoint | Used by |
//! |----------|---------|
//! | `GET/POST {api}/{base}/{table}` | list (paginated by `offset`), batch create |
//! | `GET/PATCH/DELETE {api}/{base}/{table}/{id}` | get, update, delete |
//! | `GET/POST {api}/meta/bases/{base}/tables` | list tables, create table |
//! | `POST/PATCH {api}/meta/bases/{base}/tables/{id}/fields[/{id}]` | create, update field |
//! | `GET/POST {api}/meta/bases` | list bases, create base |
//!
//! # Retries
//!
//! Rate limiting (429) is retried for every method. Server errors and
//! transport failures are retried only for `GET` and `DELETE`, since a
//! `POST` that failed in flight may still have been applied. Backoff
//! doubles from the base delay (1s) up to 32× and the number of retries
//! comes from `airtable.max_retries`.

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

use tablebind_core::field::ResolvedField;
use tablebind_core::schema::RecordSchema;
use tablebind_core::service::{
    ListQuery, RemoteField, RemoteRecord, RemoteTableSchema, TableService,
};
use tablebind_core::translate::{translate, TableDefinition, TranslationWarning};
use tablebind_core::{Error, Result};

use crate::config::AirtableConfig;

/// A base visible to the access token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "permissionLevel", default)]
    pub permission_level: Option<String>,
}

/// Result of [`AirtableClient::create_base`].
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedBase {
    pub base_id: String,
    pub tables: Vec<RemoteTableSchema>,
    pub warnings: Vec<TranslationWarning>,
}

#[derive(Deserialize)]
struct TablesPage {
    tables: Vec<RemoteTableSchema>,
}

#[derive(Deserialize)]
struct RecordsPage {
    records: Vec<Value>,
    #[serde(default)]
    offset: Option<String>,
}

#[derive(Deserialize)]
struct CreatedRecords {
    records: Vec<RemoteRecord>,
}

#[derive(Deserialize)]
struct BasesPage {
    bases: Vec<BaseInfo>,
    #[serde(default)]
    offset: Option<String>,
}

#[derive(Deserialize)]
struct BaseCreated {
    id: String,
    #[serde(default)]
    tables: Vec<RemoteTableSchema>,
}

#[derive(Deserialize)]
struct Deleted {
    id: String,
}

#[derive(Debug, Clone)]
pub struct AirtableClient {
    http: reqwest::Client,
    api_url: Url,
    base_id: String,
    access_token: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl AirtableClient {
    /// Build a client from configuration.
    ///
    /// Fails when the token or base id is missing, before any request.
    pub fn new(config: &AirtableConfig) -> anyhow::Result<Self> {
        let credentials = config.credentials()?;
        let api_url = Url::parse(&config.api_url)
            .map_err(|e| anyhow::anyhow!("Invalid airtable.api_url '{}': {}", config.api_url, e))?;
        if api_url.cannot_be_a_base() {
            anyhow::bail!("Invalid airtable.api_url '{}'", config.api_url);
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_url,
            base_id: credentials.base_id,
            access_token: credentials.access_token,
            max_retries: config.max_retries,
            retry_delay: Duration::from_secs(1),
        })
    }

    /// Same client, another base.
    pub fn for_base(&self, base_id: impl Into<String>) -> Self {
        Self {
            base_id: base_id.into(),
            ..self.clone()
        }
    }

    /// Base delay of the exponential backoff.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn base_id(&self) -> &str {
        &self.base_id
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.api_url.clone();
        // `new` rejected cannot-be-a-base URLs.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn table_url(&self, table: &str) -> Url {
        self.url(&[&self.base_id, table])
    }

    fn record_url(&self, table: &str, id: &str) -> Url {
        self.url(&[&self.base_id, table, id])
    }

    fn meta_tables_url(&self, extra: &[&str]) -> Url {
        let mut segments = vec!["meta", "bases", self.base_id.as_str(), "tables"];
        segments.extend_from_slice(extra);
        self.url(&segments)
    }

    /// Send one request, retrying per the module-level policy, and return
    /// the parsed JSON body of the first successful response.
    async fn send(
        &self,
        method: Method,
        url: Url,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let idempotent = method == Method::GET || method == Method::DELETE;
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = self.retry_delay * (1u32 << (attempt - 1).min(5));
                warn!(
                    %method,
                    path = url.path(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_err.as_ref().map(Error::to_string).unwrap_or_default(),
                    "retrying Airtable request"
                );
                tokio::time::sleep(delay).await;
            }

            debug!(%method, path = url.path(), "Airtable request");
            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .bearer_auth(&self.access_token);
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        // A body cut off mid-read is a transport failure, not bad JSON.
                        let bytes = match response.bytes().await {
                            Ok(bytes) => bytes,
                            Err(e) => {
                                let err = Error::Transport(format!("reading response body: {}", e));
                                if idempotent {
                                    last_err = Some(err);
                                    continue;
                                }
                                return Err(err);
                            }
                        };
                        return serde_json::from_slice::<Value>(&bytes).map_err(|e| Error::Decode {
                            id: None,
                            message: format!("invalid response body: {}", e),
                        });
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = api_error(status, &body_text);
                    if status == StatusCode::TOO_MANY_REQUESTS
                        || (idempotent && status.is_server_error())
                    {
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    let err = Error::Transport(e.to_string());
                    if idempotent {
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Transport("request failed after retries".into())))
    }

    // ─── Bases ──────────────────────────────────────────────────────

    /// All bases the token can see, following pagination.
    pub async fn list_bases(&self) -> Result<Vec<BaseInfo>> {
        let url = self.url(&["meta", "bases"]);
        let mut bases = Vec::new();
        let mut offset: Option<String> = None;
        loop {
            let query: Vec<(String, String)> = offset
                .iter()
                .map(|o| ("offset".to_string(), o.clone()))
                .collect();
            let page: BasesPage = decode(self.send(Method::GET, url.clone(), &query, None).await?)?;
            bases.extend(page.bases);
            match page.offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        Ok(bases)
    }

    /// Every table of `base_id`, with fields.
    pub async fn get_base_schema(&self, base_id: &str) -> Result<Vec<RemoteTableSchema>> {
        self.for_base(base_id).list_tables().await
    }

    /// Create a base in `workspace_id` holding the translated `tables`.
    ///
    /// All schemas are translated before the request is sent.
    pub async fn create_base(
        &self,
        name: &str,
        workspace_id: &str,
        tables: &[RecordSchema],
    ) -> Result<CreatedBase> {
        if tables.is_empty() {
            return Err(Error::validation("tables", "a base needs at least one table"));
        }

        let mut definitions = Vec::with_capacity(tables.len());
        let mut warnings = Vec::new();
        for schema in tables {
            let translation = translate(schema)?;
            definitions.push(translation.table);
            warnings.extend(translation.warnings);
        }

        let body = json!({
            "name": name,
            "workspaceId": workspace_id,
            "tables": definitions,
        });
        let created: BaseCreated = decode(
            self.send(Method::POST, self.url(&["meta", "bases"]), &[], Some(&body))
                .await?,
        )?;
        debug!(base = %created.id, name, "created base");
        Ok(CreatedBase {
            base_id: created.id,
            tables: created.tables,
            warnings,
        })
    }
}

#[async_trait]
impl TableService for AirtableClient {
    async fn list_tables(&self) -> Result<Vec<RemoteTableSchema>> {
        let page: TablesPage =
            decode(self.send(Method::GET, self.meta_tables_url(&[]), &[], None).await?)?;
        Ok(page.tables)
    }

    async fn create_table(&self, definition: &TableDefinition) -> Result<RemoteTableSchema> {
        let body = to_body(definition)?;
        decode(
            self.send(Method::POST, self.meta_tables_url(&[]), &[], Some(&body))
                .await?,
        )
    }

    async fn create_field(&self, table_id: &str, field: &ResolvedField) -> Result<RemoteField> {
        let body = to_body(field)?;
        let url = self.meta_tables_url(&[table_id, "fields"]);
        decode(self.send(Method::POST, url, &[], Some(&body)).await?)
    }

    async fn update_field(
        &self,
        table_id: &str,
        field_id: &str,
        field: &ResolvedField,
    ) -> Result<RemoteField> {
        let body = to_body(field)?;
        let url = self.meta_tables_url(&[table_id, "fields", field_id]);
        decode(self.send(Method::PATCH, url, &[], Some(&body)).await?)
    }

    async fn create_records(
        &self,
        table: &str,
        records: Vec<Map<String, Value>>,
    ) -> Result<Vec<RemoteRecord>> {
        let body = json!({
            "records": records
                .into_iter()
                .map(|fields| json!({ "fields": fields }))
                .collect::<Vec<_>>(),
        });
        let created: CreatedRecords = decode(
            self.send(Method::POST, self.table_url(table), &[], Some(&body))
                .await
                .map_err(|e| not_found(e, table, None))?,
        )?;
        Ok(created.records)
    }

    async fn get_record(&self, table: &str, id: &str) -> Result<RemoteRecord> {
        let value = self
            .send(Method::GET, self.record_url(table, id), &[], None)
            .await
            .map_err(|e| not_found(e, table, Some(id)))?;
        decode(value)
    }

    async fn list_records(&self, table: &str, query: &ListQuery) -> Result<Vec<Value>> {
        let url = self.table_url(table);
        let mut records = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let mut pairs = query.to_query_pairs();
            if let Some(offset) = &offset {
                pairs.push(("offset".to_string(), offset.clone()));
            }
            let page: RecordsPage = decode(
                self.send(Method::GET, url.clone(), &pairs, None)
                    .await
                    .map_err(|e| not_found(e, table, None))?,
            )?;
            records.extend(page.records);

            if let Some(max) = query.max_records {
                if records.len() >= max {
                    records.truncate(max);
                    break;
                }
            }
            match page.offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        debug!(table, count = records.len(), "listed records");
        Ok(records)
    }

    async fn update_record(
        &self,
        table: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<RemoteRecord> {
        let body = json!({ "fields": fields });
        let value = self
            .send(Method::PATCH, self.record_url(table, id), &[], Some(&body))
            .await
            .map_err(|e| not_found(e, table, Some(id)))?;
        decode(value)
    }

    async fn delete_record(&self, table: &str, id: &str) -> Result<String> {
        let value = self
            .send(Method::DELETE, self.record_url(table, id), &[], None)
            .await
            .map_err(|e| not_found(e, table, Some(id)))?;
        let deleted: Deleted = decode(value)?;
        Ok(deleted.id)
    }
}

fn to_body<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::Decode {
        id: None,
        message: format!("cannot encode request body: {}", e),
    })
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    let id = value.get("id").and_then(Value::as_str).map(str::to_string);
    serde_json::from_value(value).map_err(|e| Error::Decode {
        id,
        message: e.to_string(),
    })
}

/// Parse an error response.
///
/// Airtable uses both `{"error": {"type": ..., "message": ...}}` and
/// `{"error": "NOT_FOUND"}`.
fn api_error(status: StatusCode, body: &str) -> Error {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let (kind, message) = match parsed.as_ref().and_then(|v| v.get("error")) {
        Some(Value::String(kind)) => (Some(kind.clone()), kind.clone()),
        Some(Value::Object(error)) => {
            let kind = error.get("type").and_then(Value::as_str).map(str::to_string);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| kind.clone())
                .unwrap_or_default();
            (kind, message)
        }
        _ if body.trim().is_empty() => (
            None,
            status.canonical_reason().unwrap_or("unknown error").to_string(),
        ),
        _ => (None, body.trim().to_string()),
    };
    Error::Api {
        status: status.as_u16(),
        kind,
        message,
    }
}

/// Turn a 404 into the matching not-found error.
fn not_found(err: Error, table: &str, id: Option<&str>) -> Error {
    match err {
        Error::Api {
            status: 404,
            ref kind,
            ..
        } => match id {
            Some(id) if kind.as_deref() != Some("TABLE_NOT_FOUND") => Error::RecordNotFound {
                table: table.to_string(),
                id: id.to_string(),
            },
            _ => Error::TableNotFound(table.to_string()),
        },
        other => other,
    }
}
