//! Cleanup pass
//!
//! Maintenance operation that collapses full-row duplicates left behind by
//! repeated or partial runs. Holds the write-cycle lock and the table's lock
//! for its whole transaction; do not run it while a load is writing through
//! a different `TableLocks`.

use super::locks::TableLocks;
use super::count;
use sparkify_common::{Error, Result, Table};
use sqlx::{Connection, SqliteConnection};
use tracing::info;

/// Remove duplicate rows from `table`, keeping the oldest of each group
///
/// Rows are compared on every staged column (the songplay surrogate id is
/// ignored). Returns the number of rows removed.
pub async fn dedupe_table(
    conn: &mut SqliteConnection,
    table: Table,
    locks: &TableLocks,
) -> Result<u64> {
    let id = table.surrogate_key().unwrap_or("rowid");
    let statement = format!(
        "DELETE FROM main.{t} WHERE {id} NOT IN (SELECT MIN({id}) FROM main.{t} GROUP BY {cols})",
        t = table.name(),
        id = id,
        cols = table.column_names().join(", ")
    );

    let _cycle = locks.write_cycle().await;
    let _guard = locks.lock(table).await;
    let mut tx = conn.begin().await.map_err(Error::from_storage)?;

    let before = count(&mut tx, &format!("SELECT COUNT(*) FROM main.{}", table.name())).await?;
    let removed = sqlx::query(&statement)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::from_merge(table.name(), e))?
        .rows_affected();

    tx.commit().await.map_err(Error::from_storage)?;

    info!("Cleanup of {}: {} of {} row(s) removed", table, removed, before);
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparkify_common::db::init_database;

    async fn seed_songplays(conn: &mut SqliteConnection) {
        sqlx::query("INSERT INTO time (start_time) VALUES ('2018-11-05 17:46:40.000')")
            .execute(&mut *conn)
            .await
            .unwrap();
        sqlx::query("INSERT INTO users (user_id, level) VALUES (8, 'free')")
            .execute(&mut *conn)
            .await
            .unwrap();
        for session in [1, 1, 1, 2] {
            sqlx::query(
                "INSERT INTO songplays (start_time, user_id, level, session_id, location) \
                 VALUES ('2018-11-05 17:46:40.000', 8, 'free', ?, NULL)",
            )
            .bind(session)
            .execute(&mut *conn)
            .await
            .unwrap();
        }
    }

    #[tokio::test]
    async fn test_dedupe_songplays_keeps_lowest_id() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        seed_songplays(&mut conn).await;

        let removed = dedupe_table(&mut conn, Table::Songplays, &TableLocks::new())
            .await
            .unwrap();
        assert_eq!(removed, 2);

        let ids: Vec<i64> = sqlx::query_scalar("SELECT songplay_id FROM songplays ORDER BY songplay_id")
            .fetch_all(&mut *conn)
            .await
            .unwrap();
        assert_eq!(ids, vec![1, 4]);

        // Second pass finds nothing to remove
        let removed = dedupe_table(&mut conn, Table::Songplays, &TableLocks::new())
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn test_dedupe_keyed_dimension_is_noop() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        seed_songplays(&mut conn).await;

        let removed = dedupe_table(&mut conn, Table::Users, &TableLocks::new())
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }
}
