//! Configuration parsing and validation.
//!
//! tbind is configured with a TOML file holding the Airtable connection
//! settings and the table schemas it manages:
//!
//! ```toml
//! [airtable]
//! base_id = "appXXXXXXXXXXXXXX"
//! timeout_secs = 30
//! max_retries = 3
//!
//! [tables.Users]
//! description = "Application users"
//! fields = [
//!   { name = "name", type = "text", required = true },
//!   { name = "email", type = "text" },
//!   { name = "role", type = "enum", choices = ["admin", "member"] },
//!   { name = "is_active", type = "boolean", default = true },
//! ]
//! ```
//!
//! The access token is best supplied through `AIRTABLE_ACCESS_TOKEN`, which
//! overrides the file. `AIRTABLE_BASE_ID` is used when the file sets no
//! base id.
//!
//! Everything that can be checked without the network is checked in
//! [`load_config`], including every table declaration. Missing credentials
//! are reported by [`AirtableConfig::credentials`], which commands call
//! before their first request.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use tablebind_core::field::{DeclaredType, FieldDescriptor, FieldType};
use tablebind_core::schema::RecordSchema;

pub const ENV_ACCESS_TOKEN: &str = "AIRTABLE_ACCESS_TOKEN";
pub const ENV_BASE_ID: &str = "AIRTABLE_BASE_ID";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub airtable: AirtableConfig,
    /// Declared tables, keyed by the name used on the command line.
    #[serde(default)]
    pub tables: BTreeMap<String, TableConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AirtableConfig {
    #[serde(default)]
    pub base_id: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Workspace new bases are created in.
    #[serde(default)]
    pub workspace_id: Option<String>,
}

impl Default for AirtableConfig {
    fn default() -> Self {
        Self {
            base_id: None,
            access_token: None,
            api_url: default_api_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            workspace_id: None,
        }
    }
}

fn default_api_url() -> String {
    "https://api.airtable.com/v0".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}

/// Resolved credentials for one base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: String,
    pub base_id: String,
}

impl AirtableConfig {
    /// Token and base id, or an error naming what is missing.
    pub fn credentials(&self) -> Result<Credentials> {
        let access_token = match &self.access_token {
            Some(t) => t.clone(),
            None => bail!(
                "Airtable access token not set: use {} or airtable.access_token",
                ENV_ACCESS_TOKEN
            ),
        };
        let base_id = match &self.base_id {
            Some(b) => b.clone(),
            None => bail!(
                "Airtable base id not set: use {} or airtable.base_id",
                ENV_BASE_ID
            ),
        };
        Ok(Credentials {
            access_token,
            base_id,
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    /// Remote table name; defaults to the key under `[tables]`.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub fields: Vec<FieldConfig>,
}

/// One field declaration.
///
/// `type` is one of `text`, `integer`, `float`, `boolean`, `datetime`,
/// `date`, `enum` (with `choices`) or `list` (list of text).
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct FieldConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub declared_type: String,
    /// Airtable wire type, e.g. `singleSelect`. Overrides inference.
    #[serde(default)]
    pub remote_type: Option<String>,
    #[serde(default)]
    pub remote_name: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub choices: Option<Vec<String>>,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub precision: Option<u8>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl FieldConfig {
    pub fn to_descriptor(&self) -> Result<FieldDescriptor> {
        let mut choices = self.choices.clone();
        let declared_type = match self.declared_type.as_str() {
            "text" | "string" => DeclaredType::Text,
            "integer" | "int" => DeclaredType::Integer,
            "float" | "number" => DeclaredType::Float,
            "boolean" | "bool" => DeclaredType::Boolean,
            "datetime" => DeclaredType::DateTime,
            "date" => DeclaredType::Date,
            "enum" => DeclaredType::Enumeration(choices.take().unwrap_or_default()),
            "list" | "list_of_text" => DeclaredType::ListOfText,
            other => bail!(
                "field '{}': unknown type '{}'. Must be text, integer, float, boolean, datetime, date, enum, or list.",
                self.name,
                other
            ),
        };

        let mut descriptor = FieldDescriptor::new(self.name.clone(), declared_type);
        if let Some(wire) = &self.remote_type {
            let remote_type = FieldType::from_wire(wire);
            if let FieldType::Other(name) = &remote_type {
                bail!("field '{}': unknown remote_type '{}'", self.name, name);
            }
            descriptor = descriptor.with_remote_type(remote_type);
        }
        if let Some(remote_name) = &self.remote_name {
            descriptor = descriptor.with_remote_name(remote_name.clone());
        }
        if self.required {
            descriptor = descriptor.required();
        }
        if self.read_only {
            descriptor = descriptor.read_only();
        }
        if let Some(choices) = choices {
            descriptor = descriptor.with_choices(choices);
        }
        if let Some(default) = &self.default {
            descriptor = descriptor.with_default(default.clone());
        }
        if let Some(precision) = self.precision {
            descriptor = descriptor.with_precision(precision);
        }
        if let Some(symbol) = &self.symbol {
            descriptor = descriptor.with_symbol(symbol.clone());
        }
        if let Some(description) = &self.description {
            descriptor = descriptor.with_description(description.clone());
        }
        Ok(descriptor)
    }
}

impl Config {
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    /// Build the record schema of a declared table.
    pub fn schema(&self, table: &str) -> Result<RecordSchema> {
        let Some(declared) = self.tables.get(table) else {
            bail!(
                "Unknown table: '{}'. Declared tables: {}",
                table,
                if self.tables.is_empty() {
                    "(none)".to_string()
                } else {
                    self.table_names().join(", ")
                }
            );
        };

        let fields = declared
            .fields
            .iter()
            .map(FieldConfig::to_descriptor)
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("in table '{}'", table))?;
        let remote_name = declared.name.clone().unwrap_or_else(|| table.to_string());
        let mut schema = RecordSchema::new(remote_name, fields)
            .with_context(|| format!("in table '{}'", table))?;
        if let Some(description) = &declared.description {
            schema = schema.with_description(description.clone());
        }
        Ok(schema)
    }
}

/// Load configuration from `path`, applying `AIRTABLE_*` environment variables.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content, |key| std::env::var(key).ok())
}

/// Parse and validate configuration text.
///
/// `env` looks up environment variables; tests pass a closure over a map.
pub fn parse_config(content: &str, env: impl Fn(&str) -> Option<String>) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if let Some(token) = env(ENV_ACCESS_TOKEN).filter(|t| !t.is_empty()) {
        config.airtable.access_token = Some(token);
    }
    if config.airtable.base_id.is_none() {
        config.airtable.base_id = env(ENV_BASE_ID).filter(|b| !b.is_empty());
    }

    // Validate airtable
    let airtable = &config.airtable;
    if let Some(token) = &airtable.access_token {
        if !token.starts_with("pat") {
            bail!("airtable.access_token must be a personal access token (starting with 'pat')");
        }
    }
    if let Some(base_id) = &airtable.base_id {
        if !base_id.starts_with("app") {
            bail!("airtable.base_id must start with 'app', got '{}'", base_id);
        }
    }
    if let Some(workspace_id) = &airtable.workspace_id {
        if !workspace_id.starts_with("wsp") {
            bail!(
                "airtable.workspace_id must start with 'wsp', got '{}'",
                workspace_id
            );
        }
    }
    if airtable.timeout_secs == 0 {
        bail!("airtable.timeout_secs must be > 0");
    }
    if airtable.max_retries > 10 {
        bail!("airtable.max_retries must be <= 10");
    }
    if !(airtable.api_url.starts_with("https://") || airtable.api_url.starts_with("http://")) {
        bail!("airtable.api_url must be an http(s) URL");
    }

    // Validate tables
    for name in config.tables.keys() {
        config.schema(name)?;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const MINIMAL: &str = r#"
[airtable]
base_id = "appTEST"
"#;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = parse_config(MINIMAL, no_env).unwrap();
        assert_eq!(cfg.airtable.api_url, "https://api.airtable.com/v0");
        assert_eq!(cfg.airtable.timeout_secs, 30);
        assert_eq!(cfg.airtable.max_retries, 3);
        assert!(cfg.tables.is_empty());
    }

    #[test]
    fn test_env_token_overrides_file() {
        let content = r#"
[airtable]
base_id = "appTEST"
access_token = "patFILE"
"#;
        let cfg = parse_config(content, env_of(&[(ENV_ACCESS_TOKEN, "patENV")])).unwrap();
        assert_eq!(cfg.airtable.access_token.as_deref(), Some("patENV"));
    }

    #[test]
    fn test_file_base_id_wins_over_env() {
        let cfg = parse_config(MINIMAL, env_of(&[(ENV_BASE_ID, "appENV")])).unwrap();
        assert_eq!(cfg.airtable.base_id.as_deref(), Some("appTEST"));

        let cfg = parse_config("", env_of(&[(ENV_BASE_ID, "appENV")])).unwrap();
        assert_eq!(cfg.airtable.base_id.as_deref(), Some("appENV"));
    }

    #[test]
    fn test_malformed_credentials_fail_at_load() {
        let err = parse_config(MINIMAL, env_of(&[(ENV_ACCESS_TOKEN, "key123")])).unwrap_err();
        assert!(err.to_string().contains("pat"));

        let err = parse_config("[airtable]\nbase_id = \"tblXYZ\"\n", no_env).unwrap_err();
        assert!(err.to_string().contains("app"));
    }

    #[test]
    fn test_missing_credentials_reported_on_use() {
        let cfg = parse_config("", no_env).unwrap();
        let err = cfg.airtable.credentials().unwrap_err();
        assert!(err.to_string().contains(ENV_ACCESS_TOKEN));

        let cfg = parse_config(MINIMAL, env_of(&[(ENV_ACCESS_TOKEN, "patX")])).unwrap();
        assert_eq!(
            cfg.airtable.credentials().unwrap(),
            Credentials {
                access_token: "patX".into(),
                base_id: "appTEST".into()
            }
        );
    }

    #[test]
    fn test_limits() {
        let err = parse_config("[airtable]\nmax_retries = 11\n", no_env).unwrap_err();
        assert!(err.to_string().contains("max_retries"));
        let err = parse_config("[airtable]\ntimeout_secs = 0\n", no_env).unwrap_err();
        assert!(err.to_string().contains("timeout_secs"));
    }

    #[test]
    fn test_table_schema_from_config() {
        let content = r#"
[tables.Users]
description = "Application users"
fields = [
  { name = "name", type = "text", required = true, remote_name = "Name" },
  { name = "role", type = "enum", choices = ["admin", "member"] },
  { name = "status", type = "text", remote_type = "singleSelect", choices = ["open", "closed"] },
  { name = "is_active", type = "boolean", default = true },
]
"#;
        let cfg = parse_config(content, no_env).unwrap();
        let schema = cfg.schema("Users").unwrap();
        assert_eq!(schema.table_name(), "Users");
        assert_eq!(schema.description(), Some("Application users"));
        assert_eq!(schema.fields().len(), 4);
        assert_eq!(schema.field("name").unwrap().column_name(), "Name");
        assert_eq!(
            schema.field("role").unwrap().declared_type,
            DeclaredType::Enumeration(vec!["admin".into(), "member".into()])
        );
        assert_eq!(
            schema.field("status").unwrap().remote_type,
            Some(FieldType::Select)
        );
        assert_eq!(
            schema.field("is_active").unwrap().default_value,
            Some(serde_json::json!(true))
        );
    }

    #[test]
    fn test_invalid_table_fails_at_load() {
        let content = r#"
[tables.Tasks]
fields = [{ name = "status", type = "text", remote_type = "singleSelect" }]
"#;
        let err = parse_config(content, no_env).unwrap_err();
        assert!(format!("{:#}", err).contains("Tasks"));
    }

    #[test]
    fn test_unknown_types_rejected() {
        let content = r#"
[tables.T]
fields = [{ name = "x", type = "blob" }]
"#;
        assert!(parse_config(content, no_env).is_err());

        let content = r#"
[tables.T]
fields = [{ name = "x", type = "text", remote_type = "hologram" }]
"#;
        assert!(parse_config(content, no_env).is_err());
    }

    #[test]
    fn test_unknown_table() {
        let cfg = parse_config(MINIMAL, no_env).unwrap();
        let err = cfg.schema("Nope").unwrap_err();
        assert!(err.to_string().contains("Unknown table"));
    }
}
