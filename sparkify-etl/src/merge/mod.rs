//! Merge engine
//!
//! Moves staged rows into the permanent tables, one atomic statement set per
//! table:
//!
//! | table     | dedup within batch     | on conflict with existing row   |
//! |-----------|------------------------|---------------------------------|
//! | songs     | fill-forward, in order | fill-forward per field          |
//! | artists   | fill-forward, in order | fill-forward per field          |
//! | users     | distinct on key        | key rewritten, rest untouched   |
//! | time      | distinct on key        | ignored                         |
//! | songplays | identical rows once    | n/a (append)                    |
//!
//! Users with a null `user_id` or `level` are dropped before insert.
//! Songplays lacking a song or artist key are dropped under
//! [`UnresolvedPolicy::Reject`].

pub mod cleanup;
pub mod fill_forward;
pub mod locks;

pub use cleanup::dedupe_table;
pub use fill_forward::{collapse_by_key, fill_forward, FillForward, KeyedRow};
pub use locks::TableLocks;

use crate::db::StagingArena;
use crate::workflow::barrier::DimensionsReady;
use serde::Serialize;
use sparkify_common::{Error, Result, Table, UnresolvedPolicy};
use sqlx::{Connection, SqliteConnection};
use tracing::{info, warn};

/// Row counts for one table merge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    pub table: Table,
    /// Rows in the staging relation
    pub staged: u64,
    /// Staged rows that passed the table's filters
    pub eligible: u64,
    /// New rows in the permanent table
    pub inserted: u64,
    /// Rows inserted or updated by the merge statement
    pub affected: u64,
    /// Staged rows dropped by the table's filters
    pub rejected: u64,
}

/// Applies staged rows to the permanent tables
#[derive(Debug, Clone)]
pub struct MergeEngine {
    policy: UnresolvedPolicy,
    locks: TableLocks,
}

impl MergeEngine {
    pub fn new(policy: UnresolvedPolicy, locks: TableLocks) -> Self {
        Self { policy, locks }
    }

    pub fn policy(&self) -> UnresolvedPolicy {
        self.policy
    }

    /// Merge a staged dimension table
    pub async fn merge_dimension(
        &self,
        conn: &mut SqliteConnection,
        arena: &StagingArena,
        table: Table,
    ) -> Result<MergeOutcome> {
        if !table.is_dimension() {
            return Err(Error::PhaseOrder(format!(
                "{} is a fact table; use merge_facts",
                table
            )));
        }
        self.run_merge(conn, arena, table).await
    }

    /// Merge staged songplays; requires every dimension to be merged
    pub async fn merge_facts(
        &self,
        conn: &mut SqliteConnection,
        arena: &StagingArena,
        _ready: &DimensionsReady,
    ) -> Result<MergeOutcome> {
        let outcome = self.run_merge(conn, arena, Table::Songplays).await?;

        if outcome.rejected > 0 {
            let err = Error::UnresolvedReference {
                table: Table::Songplays.name().to_string(),
                count: outcome.rejected,
            };
            warn!("{}", err);
        }

        Ok(outcome)
    }

    /// Predicate a staged row must satisfy to be merged
    pub fn eligibility_filter(&self, table: Table) -> &'static str {
        match (table, self.policy) {
            (Table::Users, _) => "user_id IS NOT NULL AND level IS NOT NULL",
            (Table::Songplays, UnresolvedPolicy::Reject) => {
                "song_id IS NOT NULL AND artist_id IS NOT NULL"
            }
            _ => "TRUE",
        }
    }

    /// SQL moving `relation` into `table`
    pub fn merge_statement(&self, table: Table, relation: &str) -> String {
        let columns = table.column_names().join(", ");
        let filter = self.eligibility_filter(table);
        let key = table.natural_key().join(", ");

        match table {
            Table::Songs | Table::Artists => {
                let assignments: Vec<String> = table
                    .columns()
                    .iter()
                    .filter_map(|c| fill_forward::fill_forward_assignment(c.rule, table.name(), c.name))
                    .collect();
                // WHERE is required before ON CONFLICT in INSERT ... SELECT
                format!(
                    "INSERT INTO main.{t} AS {t} ({cols}) SELECT {cols} FROM {rel} WHERE {filter} ORDER BY rowid \
                     ON CONFLICT({key}) DO UPDATE SET {set}",
                    t = table.name(),
                    cols = columns,
                    rel = relation,
                    filter = filter,
                    key = key,
                    set = assignments.join(", ")
                )
            }
            Table::Users => format!(
                "INSERT INTO main.users ({cols}) SELECT {cols} FROM {rel} \
                 WHERE rowid IN (SELECT MIN(rowid) FROM {rel} WHERE {filter} GROUP BY {key}) ORDER BY rowid \
                 ON CONFLICT({key}) DO UPDATE SET level = excluded.level",
                cols = columns,
                rel = relation,
                filter = filter,
                key = key
            ),
            Table::Time => format!(
                "INSERT INTO main.time ({cols}) SELECT {cols} FROM {rel} \
                 WHERE rowid IN (SELECT MIN(rowid) FROM {rel} GROUP BY {key}) ORDER BY rowid \
                 ON CONFLICT({key}) DO NOTHING",
                cols = columns,
                rel = relation,
                key = key
            ),
            Table::Songplays => format!(
                "INSERT INTO main.songplays ({cols}) SELECT {cols} FROM {rel} WHERE {filter} \
                 GROUP BY {cols} ORDER BY MIN(rowid)",
                cols = columns,
                rel = relation,
                filter = filter
            ),
        }
    }

    async fn run_merge(
        &self,
        conn: &mut SqliteConnection,
        arena: &StagingArena,
        table: Table,
    ) -> Result<MergeOutcome> {
        let relation = arena.relation(table);
        let statement = self.merge_statement(table, &relation);

        let _guard = self.locks.lock(table).await;
        let mut tx = conn.begin().await.map_err(Error::from_storage)?;

        let staged = count(&mut tx, &format!("SELECT COUNT(*) FROM {}", relation)).await?;
        let eligible = count(
            &mut tx,
            &format!(
                "SELECT COUNT(*) FROM {} WHERE {}",
                relation,
                self.eligibility_filter(table)
            ),
        )
        .await?;
        let before = count(&mut tx, &format!("SELECT COUNT(*) FROM main.{}", table.name())).await?;

        let result = match sqlx::query(&statement).execute(&mut *tx).await {
            Ok(result) => result,
            Err(e) => {
                let err = Error::from_merge(table.name(), e);
                warn!("Merge into {} rolled back: {}", table, err);
                // SQLite may already have rolled back the whole transaction
                if let Err(e) = tx.rollback().await {
                    warn!("Rollback of {} merge failed: {}", table, e);
                }
                return Err(err);
            }
        };

        let after = count(&mut tx, &format!("SELECT COUNT(*) FROM main.{}", table.name())).await?;
        tx.commit().await.map_err(Error::from_storage)?;

        let outcome = MergeOutcome {
            table,
            staged,
            eligible,
            inserted: after.saturating_sub(before),
            affected: result.rows_affected(),
            rejected: staged.saturating_sub(eligible),
        };

        info!(
            "Merged {}: {} staged, {} inserted, {} affected, {} rejected",
            table, outcome.staged, outcome.inserted, outcome.affected, outcome.rejected
        );
        Ok(outcome)
    }
}

pub(crate) async fn count(conn: &mut SqliteConnection, sql: &str) -> Result<u64> {
    let n: i64 = sqlx::query_scalar(sql)
        .fetch_one(&mut *conn)
        .await
        .map_err(Error::from_storage)?;
    Ok(n as u64)
}
