//! Run statistics
//!
//! Aggregated over one pipeline run and printed by the CLI, either as a
//! summary or as JSON.

use crate::merge::MergeOutcome;
use serde::{Deserialize, Serialize};
use sparkify_common::Table;
use std::collections::BTreeMap;
use std::fmt;

/// Source phase of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Catalog,
    Activity,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Catalog => f.write_str("catalog"),
            Phase::Activity => f.write_str("activity"),
        }
    }
}

/// File counts for one phase
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub files_found: usize,
    pub files_processed: usize,
    pub files_skipped: usize,
}

/// A file that was skipped, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub phase: Phase,
    pub path: String,
    pub reason: String,
}

/// Merge counts summed over every cycle of one table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableTotals {
    pub merges: u64,
    pub staged: u64,
    pub inserted: u64,
    pub affected: u64,
    pub rejected: u64,
}

/// Outcome of one pipeline run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub arena_id: String,
    pub catalog: PhaseReport,
    pub activity: PhaseReport,
    pub skipped: Vec<SkippedFile>,
    pub tables: BTreeMap<Table, TableTotals>,
    /// Songplays staged with null song and artist keys
    pub unresolved_songplays: u64,
    /// Unresolved songplays not inserted under the reject policy
    pub rejected_songplays: u64,
    pub elapsed_ms: u64,
}

impl RunReport {
    pub fn new(arena_id: impl Into<String>) -> Self {
        Self {
            arena_id: arena_id.into(),
            ..Default::default()
        }
    }

    pub fn record_merge(&mut self, outcome: &MergeOutcome) {
        let totals = self.tables.entry(outcome.table).or_default();
        totals.merges += 1;
        totals.staged += outcome.staged;
        totals.inserted += outcome.inserted;
        totals.affected += outcome.affected;
        totals.rejected += outcome.rejected;

        if outcome.table == Table::Songplays {
            self.rejected_songplays += outcome.rejected;
        }
    }

    pub fn record_skip(&mut self, phase: Phase, path: impl Into<String>, reason: impl Into<String>) {
        self.phase_mut(phase).files_skipped += 1;
        self.skipped.push(SkippedFile {
            phase,
            path: path.into(),
            reason: reason.into(),
        });
    }

    pub fn phase_mut(&mut self, phase: Phase) -> &mut PhaseReport {
        match phase {
            Phase::Catalog => &mut self.catalog,
            Phase::Activity => &mut self.activity,
        }
    }

    /// Rows inserted into `table` during the run
    pub fn inserted(&self, table: Table) -> u64 {
        self.tables.get(&table).map_or(0, |t| t.inserted)
    }

    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!(
                "catalog: {}/{} files processed, {} skipped",
                self.catalog.files_processed, self.catalog.files_found, self.catalog.files_skipped
            ),
            format!(
                "activity: {}/{} files processed, {} skipped",
                self.activity.files_processed, self.activity.files_found, self.activity.files_skipped
            ),
        ];
        for (table, totals) in &self.tables {
            lines.push(format!(
                "{}: {} staged, {} inserted, {} rejected",
                table, totals.staged, totals.inserted, totals.rejected
            ));
        }
        lines.push(format!(
            "songplays unresolved: {}, rejected: {}",
            self.unresolved_songplays, self.rejected_songplays
        ));
        for skip in &self.skipped {
            lines.push(format!("skipped {} file {}: {}", skip.phase, skip.path, skip.reason));
        }
        lines.push(format!("elapsed: {} ms", self.elapsed_ms));
        lines.join("\n")
    }
}
