//! Base commands under `tbind bases`.

use anyhow::{bail, Result};

use crate::client::AirtableClient;
use crate::config::Config;

pub async fn run_list(config: &Config) -> Result<()> {
    let client = AirtableClient::new(&config.airtable)?;
    let bases = client.list_bases().await?;
    if bases.is_empty() {
        println!("No bases visible to this token.");
        return Ok(());
    }
    println!("{:<20} {:<12} NAME", "ID", "PERMISSION");
    for base in bases {
        println!(
            "{:<20} {:<12} {}",
            base.id,
            base.permission_level.as_deref().unwrap_or("-"),
            base.name
        );
    }
    Ok(())
}

/// Print every table and field of a base (the configured one by default).
pub async fn run_schema(config: &Config, base_id: Option<&str>) -> Result<()> {
    let client = AirtableClient::new(&config.airtable)?;
    let base_id = base_id.unwrap_or(client.base_id()).to_string();
    let tables = client.get_base_schema(&base_id).await?;

    println!("Base: {}", base_id);
    for table in tables {
        println!();
        println!("{} ({})", table.name, table.table_id);
        for field in &table.fields {
            let primary = if table.primary_field_id.as_deref() == Some(field.field_id.as_str()) {
                "  [primary]"
            } else {
                ""
            };
            println!(
                "  {:<28} {:<20}{}",
                field.remote_name,
                field.remote_type.as_str(),
                primary
            );
        }
    }
    Ok(())
}

/// Create a base holding the given declared tables.
pub async fn run_create(
    config: &Config,
    name: &str,
    tables: &[String],
    workspace_id: Option<&str>,
) -> Result<()> {
    let Some(workspace_id) = workspace_id.or(config.airtable.workspace_id.as_deref()) else {
        bail!("no workspace: pass --workspace or set airtable.workspace_id");
    };
    if tables.is_empty() {
        bail!("bases create needs at least one --table");
    }
    let schemas = tables
        .iter()
        .map(|t| config.schema(t))
        .collect::<Result<Vec<_>>>()?;

    let client = AirtableClient::new(&config.airtable)?;
    let created = client.create_base(name, workspace_id, &schemas).await?;
    println!("Created base '{}'", name);
    println!("  id:      {}", created.base_id);
    for table in &created.tables {
        println!("  table:   {} ({})", table.name, table.table_id);
    }
    for warning in &created.warnings {
        println!("warning: {}", warning);
    }
    Ok(())
}
