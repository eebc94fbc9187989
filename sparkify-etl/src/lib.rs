//! # Sparkify ETL
//!
//! Staged bulk-load and conflict-aware merge of music-streaming data into
//! the Sparkify warehouse:
//!
//! - [`extractors`]: raw catalog and session-log records → canonical rows
//! - [`services`]: file discovery and songplay key resolution
//! - [`db`]: per-run staging arena
//! - [`merge`]: per-table merge rules, table locks, cleanup pass
//! - [`workflow`]: phase barrier, batch orchestrator, run report

pub mod db;
pub mod extractors;
pub mod merge;
pub mod models;
pub mod services;
pub mod workflow;

pub use db::StagingArena;
pub use merge::{dedupe_table, MergeEngine, MergeOutcome, TableLocks};
pub use workflow::{
    DimensionsReady, Phase, PhaseBarrier, Pipeline, PipelineConfig, PipelineEvent, RunReport,
};
