//! Batch orchestration
//!
//! - [`barrier`]: dimension-before-fact sequencing
//! - [`pipeline`]: per-file extract → resolve → stage → merge driver
//! - [`report`]: run statistics

pub mod barrier;
pub mod pipeline;
pub mod report;

pub use barrier::{DimensionsReady, PhaseBarrier};
pub use pipeline::{Pipeline, PipelineConfig, PipelineEvent};
pub use report::{Phase, PhaseReport, RunReport, SkippedFile, TableTotals};
