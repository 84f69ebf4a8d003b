//! # tablebind CLI (`tbind`)
//!
//! Manage Airtable tables declared in a TOML configuration file: translate
//! them into create-table payloads, reconcile them with the live base, and
//! read or write their records.
//!
//! ## Usage
//!
//! ```bash
//! tbind --config ./config/tbind.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tbind tables` | List declared tables |
//! | `tbind translate <table>` | Print the create-table payload (offline) |
//! | `tbind plan <table>` | Show what differs from the live table |
//! | `tbind sync <table>` | Plan and apply selected changes |
//! | `tbind create-table <table>` | Create a declared table remotely |
//! | `tbind records ...` | List, get, find, create, delete records |
//! | `tbind bases ...` | List bases, show a base schema, create a base |
//! | `tbind completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! export AIRTABLE_ACCESS_TOKEN=pat...
//!
//! # What would change?
//! tbind plan Users
//!
//! # Add missing columns, leave mismatched types alone
//! tbind sync Users --create-missing
//!
//! # Equality search
//! tbind records find Users --where role=admin --where is_active=true
//! ```
//!
//! Set `RUST_LOG=debug` to log every request.

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

use tablebind::{bases, config, records, tables};
use tablebind_core::sync::{ApplyOptions, SyncOptions};

/// tablebind: typed Airtable tables from a TOML declaration.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/tbind.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "tbind",
    about = "tablebind: declare Airtable tables in TOML, translate, sync, and edit their records",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/tbind.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the tables declared in configuration.
    Tables,

    /// Print the create-table payload of a declared table.
    ///
    /// Runs offline. Warnings (e.g. autoNumber substitution) follow the
    /// payload.
    Translate {
        /// Declared table name.
        table: String,
    },

    /// Compare a declared table with the live one.
    Plan {
        table: String,
    },

    /// Plan, then apply the selected kinds of change.
    ///
    /// Without flags nothing is changed and the plan is printed. Fields
    /// that exist only remotely are never deleted.
    Sync {
        table: String,
        /// Create fields that are declared but missing remotely.
        #[arg(long)]
        create_missing: bool,
        /// Change the type of mismatched fields. May lose cell data.
        #[arg(long)]
        update_types: bool,
        /// Create the whole table if it does not exist.
        #[arg(long)]
        create_table: bool,
    },

    /// Create a declared table in the configured base.
    CreateTable {
        table: String,
    },

    /// Record operations on a declared table.
    Records {
        #[command(subcommand)]
        action: RecordsAction,
    },

    /// Base operations.
    Bases {
        #[command(subcommand)]
        action: BasesAction,
    },

    /// Print shell completion script.
    Completions {
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum RecordsAction {
    /// List records.
    List {
        table: String,
        /// Airtable formula, passed through as filterByFormula.
        #[arg(long)]
        filter: Option<String>,
        /// Maximum number of records.
        #[arg(long)]
        max: Option<usize>,
        /// Remote view name or id.
        #[arg(long)]
        view: Option<String>,
        /// Sort by field; prefix with '-' for descending. Repeatable.
        #[arg(long, allow_hyphen_values = true)]
        sort: Vec<String>,
    },
    /// Fetch one record by id.
    Get { table: String, id: String },
    /// Records whose fields equal all the given values.
    Find {
        table: String,
        /// FIELD=VALUE; values that parse as JSON literals are typed.
        #[arg(long = "where", value_parser = parse_key_val, required = true)]
        criteria: Vec<(String, String)>,
    },
    /// Create a record from a JSON object, or several from a JSON array.
    Create { table: String, json: String },
    /// Delete one record by id.
    Delete { table: String, id: String },
}

#[derive(Subcommand)]
enum BasesAction {
    /// List bases visible to the token.
    List,
    /// Show all tables and fields of a base.
    Schema {
        /// Defaults to the configured base.
        base_id: Option<String>,
    },
    /// Create a base from declared tables.
    Create {
        name: String,
        /// Declared table to include. Repeatable.
        #[arg(long = "table", required = true)]
        tables: Vec<String>,
        /// Defaults to airtable.workspace_id.
        #[arg(long)]
        workspace: Option<String>,
    },
}

/// Parse a `KEY=VALUE` string into a tuple.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "tbind", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Tables => tables::run_tables(&cfg)?,
        Commands::Translate { table } => tables::run_translate(&cfg, &table)?,
        Commands::Plan { table } => tables::run_plan(&cfg, &table).await?,
        Commands::Sync {
            table,
            create_missing,
            update_types,
            create_table,
        } => {
            let options = SyncOptions {
                apply: ApplyOptions {
                    create_missing_fields: create_missing,
                    update_field_types: update_types,
                },
                create_table_if_missing: create_table,
            };
            tables::run_sync(&cfg, &table, options).await?;
        }
        Commands::CreateTable { table } => tables::run_create_table(&cfg, &table).await?,
        Commands::Records { action } => match action {
            RecordsAction::List {
                table,
                filter,
                max,
                view,
                sort,
            } => {
                let args = records::ListArgs {
                    filter,
                    max,
                    view,
                    sort,
                };
                records::run_list(&cfg, &table, args).await?;
            }
            RecordsAction::Get { table, id } => records::run_get(&cfg, &table, &id).await?,
            RecordsAction::Find { table, criteria } => {
                records::run_find(&cfg, &table, criteria).await?
            }
            RecordsAction::Create { table, json } => {
                records::run_create(&cfg, &table, &json).await?
            }
            RecordsAction::Delete { table, id } => records::run_delete(&cfg, &table, &id).await?,
        },
        Commands::Bases { action } => match action {
            BasesAction::List => bases::run_list(&cfg).await?,
            BasesAction::Schema { base_id } => bases::run_schema(&cfg, base_id.as_deref()).await?,
            BasesAction::Create {
                name,
                tables,
                workspace,
            } => bases::run_create(&cfg, &name, &tables, workspace.as_deref()).await?,
        },
        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}
