//! # tablebind core
//!
//! Schema and record mapping for a hosted tabular database (Airtable):
//! field-type resolution, schema translation, non-destructive schema
//! synchronization, and a typed CRUD façade.
//!
//! This crate contains no tokio, HTTP client, or filesystem I/O. All remote
//! access goes through the [`service::TableService`] trait; the `tablebind`
//! crate implements it over HTTP and [`service::memory`] implements it
//! in-process for tests.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`field`] | Field declarations, remote types and options |
//! | [`resolve`] | Declared field → remote column type and options |
//! | [`schema`] | Validated, ordered record schemas |
//! | [`translate`] | Schema → create-table payload |
//! | [`sync`] | Plan and apply schema deltas against a live table |
//! | [`record`] / [`validate`] | Local ↔ wire record mapping and validation |
//! | [`formula`] | Equality filter formulas |
//! | [`table`] | CRUD façade |

pub mod error;
pub mod field;
pub mod formula;
pub mod record;
pub mod resolve;
pub mod schema;
pub mod service;
pub mod sync;
pub mod table;
pub mod translate;
pub mod validate;

pub use error::{Error, Result};
