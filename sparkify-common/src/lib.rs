//! # Sparkify Common Library
//!
//! Shared code for the Sparkify warehouse loader:
//! - Error taxonomy shared by every pipeline stage
//! - Configuration resolution (CLI → ENV → TOML → defaults)
//! - Warehouse bootstrap and the table catalogue
//! - Timestamp helpers for the time dimension

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use config::{EtlConfig, UnresolvedPolicy};
pub use db::table_schemas::{FieldRule, Table};
pub use error::{Error, Result};
