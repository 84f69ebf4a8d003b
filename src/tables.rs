//! Schema commands: `tables`, `translate`, `plan`, `sync` and `create-table`.
//!
//! `tables` and `translate` work offline from the configuration alone; the
//! others talk to Airtable through [`AirtableClient`].

use anyhow::Result;
use std::fmt::Write as _;

use tablebind_core::service::TableService;
use tablebind_core::sync::{self, ApplyResult, FieldAction, SyncOptions, SyncPlan, SyncReport};
use tablebind_core::translate::{translate, TranslationWarning};

use crate::client::AirtableClient;
use crate::config::Config;

/// List the tables declared in configuration.
pub fn run_tables(config: &Config) -> Result<()> {
    if config.tables.is_empty() {
        println!("No tables declared.");
        return Ok(());
    }

    println!("{:<20} {:<24} {:>6}  DESCRIPTION", "TABLE", "REMOTE NAME", "FIELDS");
    println!("{}", "-".repeat(72));
    for name in config.table_names() {
        let schema = config.schema(name)?;
        println!(
            "{:<20} {:<24} {:>6}  {}",
            name,
            schema.table_name(),
            schema.fields().len(),
            schema.description().unwrap_or("")
        );
    }
    Ok(())
}

/// Print the create-table payload of a declared table.
pub fn run_translate(config: &Config, table: &str) -> Result<()> {
    let schema = config.schema(table)?;
    let translation = translate(&schema)?;
    println!("{}", serde_json::to_string_pretty(&translation.table)?);
    print_warnings(&translation.warnings);
    Ok(())
}

/// Compare a declared table with the live one and print the plan.
pub async fn run_plan(config: &Config, table: &str) -> Result<()> {
    let schema = config.schema(table)?;
    let client = AirtableClient::new(&config.airtable)?;
    let remote = client.get_table(schema.table_name()).await?;
    let plan = sync::plan(&schema, &remote)?;
    print!("{}", format_plan(&plan));
    Ok(())
}

pub async fn run_sync(config: &Config, table: &str, options: SyncOptions) -> Result<()> {
    let schema = config.schema(table)?;
    let client = AirtableClient::new(&config.airtable)?;

    match sync::sync_table(&client, &schema, &options).await? {
        SyncReport::TableCreated(created) => {
            println!(
                "Created table '{}' ({}) with {} fields.",
                created.table.name,
                created.table.table_id,
                created.table.fields.len()
            );
            print_warnings(&created.warnings);
        }
        SyncReport::Synced { plan, applied } => {
            print!("{}", format_plan(&plan));
            if !options.apply.create_missing_fields && !plan.fields_to_create.is_empty() {
                println!("(use --create-missing to create missing fields)");
            }
            if !options.apply.update_field_types && !plan.fields_type_mismatched.is_empty() {
                println!("(use --update-types to change mismatched field types)");
            }
            print!("{}", format_applied(&applied));
            if !applied.is_complete() {
                anyhow::bail!(
                    "{} of {} field change(s) failed",
                    applied.failed().count(),
                    applied.outcomes.len()
                );
            }
        }
    }
    Ok(())
}

pub async fn run_create_table(config: &Config, table: &str) -> Result<()> {
    let schema = config.schema(table)?;
    let client = AirtableClient::new(&config.airtable)?;
    let created = sync::create_table(&client, &schema).await?;
    println!("Created table '{}'", created.table.name);
    println!("  id:      {}", created.table.table_id);
    println!("  fields:  {}", created.table.fields.len());
    print_warnings(&created.warnings);
    Ok(())
}

fn print_warnings(warnings: &[TranslationWarning]) {
    for warning in warnings {
        println!("warning: {}", warning);
    }
}

/// Human-readable rendering of a plan.
pub fn format_plan(plan: &SyncPlan) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Table: {} ({})", plan.table_name, plan.table_id);

    if plan.is_converged()
        && plan.fields_only_on_remote.is_empty()
        && plan.fields_needing_manual_conversion.is_empty()
    {
        let _ = writeln!(out, "  up to date");
    }
    for field in &plan.fields_to_create {
        let _ = writeln!(
            out,
            "  + {:<24} {}",
            field.remote_name,
            field.remote_type.as_str()
        );
    }
    for mismatch in &plan.fields_type_mismatched {
        let _ = writeln!(
            out,
            "  ~ {:<24} {} -> {}",
            mismatch.remote_name,
            mismatch.remote_type.as_str(),
            mismatch.local_type.as_str()
        );
    }
    for name in &plan.fields_only_on_remote {
        let _ = writeln!(out, "  ? {:<24} only on remote (left untouched)", name);
    }
    for name in &plan.fields_needing_manual_conversion {
        let _ = writeln!(
            out,
            "  ! {:<24} stored as number; convert to autoNumber in Airtable",
            name
        );
    }
    for warning in &plan.warnings {
        let _ = writeln!(out, "warning: {}", warning);
    }
    out
}

fn format_applied(applied: &ApplyResult) -> String {
    let mut out = String::new();
    for outcome in &applied.outcomes {
        let verb = match outcome.action {
            FieldAction::Create => "created",
            FieldAction::UpdateType => "updated",
        };
        match &outcome.result {
            Ok(field) => {
                let _ = writeln!(
                    out,
                    "  {} {} ({})",
                    verb, outcome.remote_name, field.field_id
                );
            }
            Err(e) => {
                let _ = writeln!(out, "  FAILED {}: {}", outcome.remote_name, e);
            }
        }
    }
    out
}
