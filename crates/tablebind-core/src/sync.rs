//! Schema synchronization: reconcile a [`RecordSchema`] with a live table.
//!
//! [`plan`] is pure: it compares the local schema with a freshly fetched
//! [`RemoteTableSchema`] and describes the delta. [`apply`] carries out the
//! parts of a plan the caller opts into. Nothing in this module ever
//! deletes a table, a field, or a record; fields that exist only remotely
//! are reported and left alone.
//!
//! | Delta | Reported in | Applied when |
//! |-------|-------------|--------------|
//! | local field missing remotely | [`SyncPlan::fields_to_create`] | `create_missing_fields` |
//! | same name, different type | [`SyncPlan::fields_type_mismatched`] | `update_field_types` |
//! | remote field not declared locally | [`SyncPlan::fields_only_on_remote`] | never |
//! | already holds the creatable substitute | [`SyncPlan::fields_needing_manual_conversion`] | never |

use serde::Serialize;

use crate::error::{Error, Result};
use crate::field::{FieldType, ResolvedField};
use crate::resolve::resolve;
use crate::schema::RecordSchema;
use crate::service::{RemoteField, RemoteTableSchema, TableService};
use crate::translate::{creatable_field, translate, TranslationWarning};

/// A column whose remote type differs from the locally resolved one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeMismatch {
    pub remote_name: String,
    pub field_id: String,
    /// Resolved local type, before any creation substitution.
    pub local_type: FieldType,
    pub remote_type: FieldType,
    /// What an update would send.
    pub target: ResolvedField,
}

/// The non-applied delta between a local schema and a remote table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncPlan {
    pub table_id: String,
    pub table_name: String,
    /// In local declaration order.
    pub fields_to_create: Vec<ResolvedField>,
    pub fields_type_mismatched: Vec<TypeMismatch>,
    /// In remote order.
    pub fields_only_on_remote: Vec<String>,
    /// Columns that hold the type a create would substitute (a declared
    /// `autoNumber` stored as `number`). Only the Airtable UI can convert
    /// them, so they never count against convergence.
    pub fields_needing_manual_conversion: Vec<String>,
    /// Substitutions made while preparing `fields_to_create`.
    pub warnings: Vec<TranslationWarning>,
}

impl SyncPlan {
    /// True when there is nothing to create or update.
    pub fn is_converged(&self) -> bool {
        self.fields_to_create.is_empty() && self.fields_type_mismatched.is_empty()
    }
}

/// Compare `local` with `remote`.
///
/// Identity is the exact remote column name. Types are compared using the
/// resolved local type, so a local number field that exists remotely as
/// `autoNumber` is a mismatch. A declared `autoNumber` already stored as
/// `number` is not: updating it would send the type it already has.
pub fn plan(local: &RecordSchema, remote: &RemoteTableSchema) -> Result<SyncPlan> {
    let mut sync_plan = SyncPlan {
        table_id: remote.table_id.clone(),
        table_name: remote.name.clone(),
        fields_to_create: Vec::new(),
        fields_type_mismatched: Vec::new(),
        fields_only_on_remote: Vec::new(),
        fields_needing_manual_conversion: Vec::new(),
        warnings: Vec::new(),
    };

    for descriptor in local.fields() {
        let resolved = resolve(descriptor)?;
        match remote.field(&resolved.remote_name) {
            None => {
                let (field, warning) = creatable_field(descriptor)?;
                sync_plan.warnings.extend(warning);
                sync_plan.fields_to_create.push(field);
            }
            Some(existing) if existing.remote_type != resolved.remote_type => {
                let (target, _) = creatable_field(descriptor)?;
                if target.remote_type == existing.remote_type {
                    sync_plan
                        .fields_needing_manual_conversion
                        .push(resolved.remote_name);
                    continue;
                }
                sync_plan.fields_type_mismatched.push(TypeMismatch {
                    remote_name: resolved.remote_name,
                    field_id: existing.field_id.clone(),
                    local_type: resolved.remote_type,
                    remote_type: existing.remote_type.clone(),
                    target,
                });
            }
            Some(_) => {}
        }
    }

    sync_plan.fields_only_on_remote = remote
        .fields
        .iter()
        .filter(|f| local.field_by_column(&f.remote_name).is_none())
        .map(|f| f.remote_name.clone())
        .collect();

    tracing::debug!(
        table = %sync_plan.table_name,
        to_create = sync_plan.fields_to_create.len(),
        mismatched = sync_plan.fields_type_mismatched.len(),
        only_remote = sync_plan.fields_only_on_remote.len(),
        manual = sync_plan.fields_needing_manual_conversion.len(),
        "computed sync plan"
    );
    Ok(sync_plan)
}

/// Which parts of a plan [`apply`] carries out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    pub create_missing_fields: bool,
    /// Change the type of mismatched columns.
    ///
    /// **This can destroy data.** The remote side converts or truncates
    /// existing cell values to the new type, and may refuse the change
    /// outright. Leave it off unless the column's data is disposable.
    pub update_field_types: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldAction {
    Create,
    UpdateType,
}

/// Result of one attempted field change.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldOutcome {
    pub remote_name: String,
    pub action: FieldAction,
    pub result: Result<RemoteField>,
}

/// Per-field results of [`apply`], in the order attempted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyResult {
    pub outcomes: Vec<FieldOutcome>,
}

impl ApplyResult {
    pub fn succeeded(&self) -> impl Iterator<Item = &FieldOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = &FieldOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    /// True when every attempted change succeeded.
    pub fn is_complete(&self) -> bool {
        self.failed().next().is_none()
    }
}

/// Carry out the selected parts of `plan`, one remote call per field.
///
/// A failing field is recorded and the next one is attempted.
///
/// # Errors
///
/// Only when the first remote call fails with a transport error, meaning
/// the service is unreachable and nothing was applied. Every other failure
/// is reported in the returned [`ApplyResult`].
pub async fn apply(
    service: &dyn TableService,
    plan: &SyncPlan,
    options: &ApplyOptions,
) -> Result<ApplyResult> {
    let mut result = ApplyResult::default();

    if options.create_missing_fields {
        for field in &plan.fields_to_create {
            let outcome = service.create_field(&plan.table_id, field).await;
            record_outcome(
                &mut result,
                plan,
                &field.remote_name,
                FieldAction::Create,
                outcome,
            )?;
        }
    }

    if options.update_field_types {
        for mismatch in &plan.fields_type_mismatched {
            tracing::warn!(
                table = %plan.table_name,
                field = %mismatch.remote_name,
                from = %mismatch.remote_type,
                to = %mismatch.target.remote_type,
                "changing field type; existing values may be converted or lost"
            );
            let outcome = service
                .update_field(&plan.table_id, &mismatch.field_id, &mismatch.target)
                .await;
            record_outcome(
                &mut result,
                plan,
                &mismatch.remote_name,
                FieldAction::UpdateType,
                outcome,
            )?;
        }
    }

    Ok(result)
}

fn record_outcome(
    result: &mut ApplyResult,
    plan: &SyncPlan,
    remote_name: &str,
    action: FieldAction,
    outcome: Result<RemoteField>,
) -> Result<()> {
    if let Err(error) = &outcome {
        if result.outcomes.is_empty() && error.is_transport() {
            return Err(error.clone());
        }
        tracing::warn!(
            table = %plan.table_name,
            field = remote_name,
            ?action,
            %error,
            "field change failed"
        );
    }
    result.outcomes.push(FieldOutcome {
        remote_name: remote_name.to_string(),
        action,
        result: outcome,
    });
    Ok(())
}

/// A table created from a schema, with any translation warnings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedTable {
    pub table: RemoteTableSchema,
    pub warnings: Vec<TranslationWarning>,
}

/// Translate `schema` and create the table remotely.
pub async fn create_table(service: &dyn TableService, schema: &RecordSchema) -> Result<CreatedTable> {
    let translation = translate(schema)?;
    let table = service.create_table(&translation.table).await?;
    tracing::debug!(table = %table.name, id = %table.table_id, "created table");
    Ok(CreatedTable {
        table,
        warnings: translation.warnings,
    })
}

/// Options for [`sync_table`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    pub apply: ApplyOptions,
    /// Create the whole table when the remote side has none by that name.
    pub create_table_if_missing: bool,
}

/// Outcome of [`sync_table`].
#[derive(Debug, Clone, PartialEq)]
pub enum SyncReport {
    Synced { plan: SyncPlan, applied: ApplyResult },
    TableCreated(CreatedTable),
}

/// Fetch the live table, plan, and apply.
///
/// # Errors
///
/// [`Error::TableNotFound`] if the table is absent and
/// `create_table_if_missing` is off; otherwise as [`plan`] and [`apply`].
pub async fn sync_table(
    service: &dyn TableService,
    schema: &RecordSchema,
    options: &SyncOptions,
) -> Result<SyncReport> {
    match service.get_table(schema.table_name()).await {
        Ok(remote) => {
            let sync_plan = plan(schema, &remote)?;
            let applied = apply(service, &sync_plan, &options.apply).await?;
            Ok(SyncReport::Synced {
                plan: sync_plan,
                applied,
            })
        }
        Err(Error::TableNotFound(_)) if options.create_table_if_missing => {
            Ok(SyncReport::TableCreated(create_table(service, schema).await?))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{DeclaredType, FieldDescriptor};
    use crate::service::memory::InMemoryTableService;

    fn remote(fields: &[(&str, FieldType)]) -> RemoteTableSchema {
        RemoteTableSchema {
            table_id: "tbl1".into(),
            name: "Users".into(),
            primary_field_id: None,
            description: None,
            fields: fields
                .iter()
                .enumerate()
                .map(|(i, (name, t))| RemoteField {
                    field_id: format!("fld{i}"),
                    remote_name: name.to_string(),
                    remote_type: t.clone(),
                    options: None,
                    description: None,
                })
                .collect(),
        }
    }

    fn users() -> RecordSchema {
        RecordSchema::new(
            "Users",
            vec![
                FieldDescriptor::new("name", DeclaredType::Text),
                FieldDescriptor::new("email", DeclaredType::Text),
                FieldDescriptor::new("age", DeclaredType::Integer),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_plan_matching_table_is_converged() {
        let r = remote(&[
            ("name", FieldType::SingleLineText),
            ("email", FieldType::Email),
            ("age", FieldType::Number),
        ]);
        let p = plan(&users(), &r).unwrap();
        assert!(p.is_converged());
        assert!(p.fields_only_on_remote.is_empty());
    }

    #[test]
    fn test_plan_reports_all_three_kinds() {
        let r = remote(&[
            ("Notes", FieldType::LongText),
            ("name", FieldType::SingleLineText),
            ("email", FieldType::SingleLineText),
        ]);
        let p = plan(&users(), &r).unwrap();
        let names: Vec<&str> = p.fields_to_create.iter().map(|f| f.remote_name.as_str()).collect();
        assert_eq!(names, vec!["age"]);
        assert_eq!(p.fields_type_mismatched.len(), 1);
        assert_eq!(p.fields_type_mismatched[0].remote_name, "email");
        assert_eq!(p.fields_type_mismatched[0].local_type, FieldType::Email);
        assert_eq!(p.fields_only_on_remote, vec!["Notes".to_string()]);
    }

    #[test]
    fn test_name_match_is_case_sensitive() {
        let r = remote(&[
            ("Name", FieldType::SingleLineText),
            ("email", FieldType::Email),
            ("age", FieldType::Number),
        ]);
        let p = plan(&users(), &r).unwrap();
        assert_eq!(p.fields_to_create[0].remote_name, "name");
        assert_eq!(p.fields_only_on_remote, vec!["Name".to_string()]);
    }

    #[tokio::test]
    async fn test_apply_continues_after_field_failure() {
        let svc = InMemoryTableService::new();
        svc.add_table("Users", &[("name", FieldType::SingleLineText)]);
        svc.fail_field(
            "email",
            Error::Api {
                status: 403,
                kind: Some("INVALID_PERMISSIONS".into()),
                message: "forbidden".into(),
            },
        );

        let remote = svc.table("Users").unwrap();
        let p = plan(&users(), &remote).unwrap();
        let opts = ApplyOptions {
            create_missing_fields: true,
            update_field_types: false,
        };
        let result = apply(&svc, &p, &opts).await.unwrap();
        assert_eq!(result.outcomes.len(), 2);
        assert!(result.outcomes[0].result.is_err());
        assert!(result.outcomes[1].result.is_ok());
        assert!(!result.is_complete());
        assert!(svc.table("Users").unwrap().field("age").is_some());
    }

    #[tokio::test]
    async fn test_apply_unreachable_is_hard_failure() {
        let svc = InMemoryTableService::new();
        let remote = svc.add_table("Users", &[("name", FieldType::SingleLineText)]);
        let p = plan(&users(), &remote).unwrap();
        svc.set_unreachable(true);
        let opts = ApplyOptions {
            create_missing_fields: true,
            update_field_types: false,
        };
        assert!(apply(&svc, &p, &opts).await.unwrap_err().is_transport());
    }

    #[tokio::test]
    async fn test_apply_with_no_flags_makes_no_calls() {
        let svc = InMemoryTableService::new();
        let remote = svc.add_table("Users", &[("name", FieldType::Number)]);
        let p = plan(&users(), &remote).unwrap();
        let result = apply(&svc, &p, &ApplyOptions::default()).await.unwrap();
        assert!(result.outcomes.is_empty());
        assert!(svc.calls().is_empty());
    }

    #[tokio::test]
    async fn test_sync_missing_table() {
        let svc = InMemoryTableService::new();
        let err = sync_table(&svc, &users(), &SyncOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TableNotFound(_)));

        let opts = SyncOptions {
            create_table_if_missing: true,
            ..Default::default()
        };
        match sync_table(&svc, &users(), &opts).await.unwrap() {
            SyncReport::TableCreated(created) => {
                assert_eq!(created.table.fields.len(), 3);
                assert!(created.warnings.is_empty());
            }
            other => panic!("expected table creation, got {other:?}"),
        }
    }
}
