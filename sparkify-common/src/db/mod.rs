//! Warehouse bootstrap and table catalogue

pub mod init;
pub mod table_schemas;

pub use init::*;
pub use table_schemas::*;
