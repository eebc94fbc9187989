//! Services used by the pipeline

pub mod dimension_resolver;
pub mod file_scanner;

pub use dimension_resolver::DimensionResolver;
pub use file_scanner::{JsonFileScanner, ScanError};
