//! Dimension-before-fact phase barrier
//!
//! Fact rows reference dimension keys, so the songplay merge and the key
//! lookups feeding it need every dimension table merged first. The barrier
//! records merged dimensions and hands out a [`DimensionsReady`] token only
//! once all of them are done; fact-side operations require that token.

use crate::merge::MergeOutcome;
use sparkify_common::{Error, Result, Table};
use std::collections::BTreeSet;

/// Proof that every dimension table has been merged in this cycle
///
/// Only [`PhaseBarrier::seal`] can construct one.
#[derive(Debug)]
pub struct DimensionsReady {
    _sealed: (),
}

/// Tracks which dimension tables have been merged
#[derive(Debug, Clone, Default)]
pub struct PhaseBarrier {
    merged: BTreeSet<Table>,
}

impl PhaseBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed dimension merge
    pub fn mark(&mut self, table: Table) -> Result<()> {
        if !table.is_dimension() {
            return Err(Error::PhaseOrder(format!("{} is not a dimension table", table)));
        }
        self.merged.insert(table);
        Ok(())
    }

    pub fn record(&mut self, outcome: &MergeOutcome) -> Result<()> {
        self.mark(outcome.table)
    }

    pub fn is_merged(&self, table: Table) -> bool {
        self.merged.contains(&table)
    }

    /// Dimension tables not yet merged, in merge order
    pub fn pending(&self) -> Vec<Table> {
        Table::DIMENSIONS
            .iter()
            .copied()
            .filter(|t| !self.merged.contains(t))
            .collect()
    }

    /// Open the fact phase
    pub fn seal(&self) -> Result<DimensionsReady> {
        let pending = self.pending();
        if !pending.is_empty() {
            let names: Vec<&str> = pending.iter().map(|t| t.name()).collect();
            return Err(Error::PhaseOrder(format!(
                "fact phase requires merged dimensions; pending: {}",
                names.join(", ")
            )));
        }
        Ok(DimensionsReady { _sealed: () })
    }
}
