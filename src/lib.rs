//! # tablebind
//!
//! Typed record schemas for Airtable: declare a table once, then translate
//! it into a create-table payload, reconcile it with the live base without
//! ever deleting anything, and read and write its records through serde
//! types.
//!
//! The mapping logic lives in [`tablebind_core`] and never touches the
//! network. This crate adds the pieces that do:
//!
//! ```text
//! ┌──────────────┐   ┌────────────────┐   ┌────────────────┐
//! │ tbind.toml   │──▶│ tablebind-core │──▶│ AirtableClient │──▶ Airtable
//! │ (config)     │   │ translate/sync │   │ (reqwest)      │
//! └──────────────┘   │ Table<M>       │   └────────────────┘
//!                    └────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and table declarations |
//! | [`client`] | Airtable REST client implementing `TableService` |
//! | [`tables`] | `tables`, `translate`, `plan`, `sync`, `create-table` commands |
//! | [`records`] | `records` commands |
//! | [`bases`] | `bases` commands |

pub mod bases;
pub mod client;
pub mod config;
pub mod records;
pub mod tables;

pub use client::AirtableClient;
pub use config::{load_config, Config};
