//! Record commands under `tbind records`.
//!
//! Records of a declared table are handled as dynamic records: JSON
//! objects keyed by local field name, validated against the table's
//! declared schema before anything is sent.

use anyhow::{bail, Context, Result};
use chrono::SecondsFormat;
use serde_json::{json, Value};
use std::sync::Arc;

use tablebind_core::record::{DynamicRecord, Record};
use tablebind_core::service::{ListQuery, SortDirection};
use tablebind_core::table::{Listing, Table};

use crate::client::AirtableClient;
use crate::config::Config;

/// Options of `tbind records list`.
#[derive(Debug, Clone, Default)]
pub struct ListArgs {
    pub filter: Option<String>,
    pub max: Option<usize>,
    pub view: Option<String>,
    /// Local field name; prefix with `-` for descending.
    pub sort: Vec<String>,
}

fn open_table(config: &Config, table: &str) -> Result<Table<DynamicRecord>> {
    let schema = config.schema(table)?;
    let client = AirtableClient::new(&config.airtable)?;
    Ok(Table::with_schema(Arc::new(client), schema))
}

pub async fn run_list(config: &Config, table: &str, args: ListArgs) -> Result<()> {
    let records = open_table(config, table)?;

    let mut query = ListQuery::new();
    if let Some(filter) = args.filter {
        query = query.filter(filter);
    }
    if let Some(max) = args.max {
        query = query.max_records(max);
    }
    if let Some(view) = args.view {
        query = query.view(view);
    }
    for key in &args.sort {
        let (name, direction) = match key.strip_prefix('-') {
            Some(name) => (name, SortDirection::Desc),
            None => (key.as_str(), SortDirection::Asc),
        };
        let Some(field) = records.schema().field(name) else {
            bail!("cannot sort by '{}': no such field in table '{}'", name, table);
        };
        query = query.sort_by(field.column_name(), direction);
    }

    let listing = records.all(&query).await?;
    print_listing(&listing)
}

pub async fn run_get(config: &Config, table: &str, id: &str) -> Result<()> {
    let records = open_table(config, table)?;
    let record = records.get(id).await?;
    println!("{}", serde_json::to_string_pretty(&record_json(&record))?);
    Ok(())
}

/// Equality search: every `field=value` pair must match.
pub async fn run_find(config: &Config, table: &str, criteria: Vec<(String, String)>) -> Result<()> {
    if criteria.is_empty() {
        bail!("records find needs at least one --where field=value");
    }
    let records = open_table(config, table)?;
    let criteria: Vec<(&str, Value)> = criteria
        .iter()
        .map(|(k, v)| (k.as_str(), parse_value(v)))
        .collect();
    let listing = records.find_by(&criteria).await?;
    print_listing(&listing)
}

/// Create one record from a JSON object, or many from a JSON array.
pub async fn run_create(config: &Config, table: &str, input: &str) -> Result<()> {
    let records = open_table(config, table)?;
    let value: Value = serde_json::from_str(input).context("record must be valid JSON")?;

    match value {
        Value::Object(fields) => {
            let created = records.create(fields).await?;
            println!("{}", serde_json::to_string_pretty(&record_json(&created))?);
        }
        Value::Array(items) => {
            let items = items
                .into_iter()
                .enumerate()
                .map(|(i, item)| match item {
                    Value::Object(fields) => Ok(fields),
                    other => bail!("item {}: expected a JSON object, got {}", i, other),
                })
                .collect::<Result<Vec<DynamicRecord>>>()?;
            let total = items.len();
            let result = records.bulk_create(items).await?;
            for record in &result.created {
                println!("created {}", record.id.as_deref().unwrap_or("?"));
            }
            println!("{} of {} record(s) created", result.created.len(), total);
            result.into_result()?;
        }
        other => bail!("expected a JSON object or array, got {}", other),
    }
    Ok(())
}

pub async fn run_delete(config: &Config, table: &str, id: &str) -> Result<()> {
    let records = open_table(config, table)?;
    let deleted = records.delete_by_id(id).await?;
    println!("deleted {}", deleted);
    Ok(())
}

fn print_listing(listing: &Listing<DynamicRecord>) -> Result<()> {
    let rows: Vec<Value> = listing.records.iter().map(record_json).collect();
    println!("{}", serde_json::to_string_pretty(&rows)?);
    for bad in &listing.malformed {
        eprintln!(
            "warning: skipped record {}: {}",
            bad.id.as_deref().unwrap_or("(no id)"),
            bad.error
        );
    }
    Ok(())
}

fn record_json(record: &Record<DynamicRecord>) -> Value {
    json!({
        "id": record.id,
        "createdTime": record
            .created_time
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
        "fields": record.fields,
    })
}

/// Interpret a command-line value: JSON literals (`true`, `42`, `"x"`)
/// are taken as JSON, anything else as a plain string.
pub fn parse_value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(v @ (Value::Bool(_) | Value::Number(_) | Value::String(_) | Value::Null)) => v,
        _ => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value("42"), json!(42));
        assert_eq!(parse_value("\"42\""), json!("42"));
        assert_eq!(parse_value("admin"), json!("admin"));
        assert_eq!(parse_value("[1,2]"), json!("[1,2]"));
    }

    #[test]
    fn test_record_json_shape() {
        let mut fields = DynamicRecord::new();
        fields.insert("name".into(), json!("Ann"));
        let record = Record {
            id: Some("rec1".into()),
            created_time: None,
            fields,
        };
        assert_eq!(
            record_json(&record),
            json!({"id": "rec1", "createdTime": null, "fields": {"name": "Ann"}})
        );
    }
}
