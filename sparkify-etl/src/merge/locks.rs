//! Write critical sections
//!
//! Merges and cleanup passes are the only writers of the permanent tables.
//! Each holds its table's lock for the duration of its statement set.
//!
//! SQLite holds one write lock for the whole database until a transaction
//! ends, so callers that group several merges into one transaction (the
//! pipeline's per-file cycle) also hold the write-cycle lock from `BEGIN` to
//! `COMMIT`. Pipelines sharing a `TableLocks` then run their write cycles one
//! after another. Acquire order is write cycle first, then table.

use sparkify_common::Table;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// One async mutex per warehouse table; clones share the same locks
#[derive(Debug, Clone, Default)]
pub struct TableLocks {
    cycle: Arc<Mutex<()>>,
    locks: Arc<[Mutex<()>; Table::ALL.len()]>,
}

impl TableLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of the database write lock
    pub async fn write_cycle(&self) -> MutexGuard<'_, ()> {
        self.cycle.lock().await
    }

    /// Wait for exclusive write access to `table`
    pub async fn lock(&self, table: Table) -> MutexGuard<'_, ()> {
        self.locks[table as usize].lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_table_is_exclusive() {
        let locks = TableLocks::new();
        let shared = locks.clone();

        let guard = locks.lock(Table::Songs).await;
        let blocked = tokio::time::timeout(Duration::from_millis(50), shared.lock(Table::Songs)).await;
        assert!(blocked.is_err());
        drop(guard);

        let acquired = tokio::time::timeout(Duration::from_millis(50), shared.lock(Table::Songs)).await;
        assert!(acquired.is_ok());
    }

    #[tokio::test]
    async fn test_different_tables_do_not_block() {
        let locks = TableLocks::new();
        let _songs = locks.lock(Table::Songs).await;
        let other = tokio::time::timeout(Duration::from_millis(50), locks.lock(Table::Artists)).await;
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn test_write_cycle_is_shared_by_clones() {
        let locks = TableLocks::new();
        let shared = locks.clone();

        let cycle = locks.write_cycle().await;
        let blocked = tokio::time::timeout(Duration::from_millis(50), shared.write_cycle()).await;
        assert!(blocked.is_err());

        // Table locks stay available to the cycle holder
        let table = tokio::time::timeout(Duration::from_millis(50), shared.lock(Table::Users)).await;
        assert!(table.is_ok());
        drop(table);
        drop(cycle);

        let acquired = tokio::time::timeout(Duration::from_millis(50), shared.write_cycle()).await;
        assert!(acquired.is_ok());
    }
}
