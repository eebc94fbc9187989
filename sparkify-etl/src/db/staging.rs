//! Staging arena
//!
//! Ephemeral, constraint-free holding relations for one ingestion cycle.
//! Each relation is a connection-private TEMP table named
//! `stg_<arena id>_<table>` with the target table's staged columns and no
//! keys, so concurrent runs never see each other's rows.

use crate::models::StageRow;
use sparkify_common::{Error, Result, Table};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::debug;
use uuid::Uuid;

/// Highest number of bound parameters SQLite accepts in one statement
const SQLITE_MAX_VARIABLES: usize = 32766;

/// Staging namespace for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingArena {
    id: String,
}

impl StagingArena {
    /// Arena with a fresh random id
    pub fn new() -> Self {
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(12);
        Self { id }
    }

    /// Arena with a caller-chosen id (letters, digits and `_` only)
    pub fn with_id(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::InvalidInput(format!("Invalid staging arena id: '{}'", id)));
        }
        Ok(Self { id })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Qualified name of the staging relation for `table`
    pub fn relation(&self, table: Table) -> String {
        format!("temp.stg_{}_{}", self.id, table.name())
    }

    /// Drop and recreate the staging relation empty
    pub async fn reset(&self, conn: &mut SqliteConnection, table: Table) -> Result<()> {
        let relation = self.relation(table);

        sqlx::query(&format!("DROP TABLE IF EXISTS {}", relation))
            .execute(&mut *conn)
            .await
            .map_err(Error::from_storage)?;

        // Copies column names and declared types only; no keys, no constraints
        let create = format!(
            "CREATE TEMP TABLE {} AS SELECT {} FROM main.{} WHERE 0",
            relation,
            table.column_names().join(", "),
            table.name()
        );
        sqlx::query(&create)
            .execute(&mut *conn)
            .await
            .map_err(Error::from_storage)?;

        debug!("Staging relation {} reset", relation);
        Ok(())
    }

    /// Bulk-append rows to an existing staging relation
    ///
    /// Rows are written with multi-row `INSERT ... VALUES` statements of at
    /// most `batch_rows` rows each. Returns the number of rows written.
    pub async fn append<R: StageRow>(
        &self,
        conn: &mut SqliteConnection,
        rows: &[R],
        batch_rows: usize,
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let relation = self.relation(R::TABLE);
        let columns = R::TABLE.column_names();
        let chunk_size = batch_rows
            .max(1)
            .min(SQLITE_MAX_VARIABLES / columns.len());
        let insert = format!("INSERT INTO {} ({}) ", relation, columns.join(", "));

        let mut written = 0u64;
        for chunk in rows.chunks(chunk_size) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(&insert);
            builder.push_values(chunk, |mut b, row| row.push_binds(&mut b));

            let result = builder
                .build()
                .execute(&mut *conn)
                .await
                .map_err(Error::from_storage)?;
            written += result.rows_affected();
        }

        debug!("Staged {} row(s) into {}", written, relation);
        Ok(written)
    }

    /// Reset the table's staging relation and fill it with `rows`
    ///
    /// Zero rows still leaves an empty relation behind.
    pub async fn stage<R: StageRow>(
        &self,
        conn: &mut SqliteConnection,
        rows: &[R],
        batch_rows: usize,
    ) -> Result<u64> {
        self.reset(conn, R::TABLE).await?;
        self.append(conn, rows, batch_rows).await
    }

    /// Number of rows currently staged for `table`
    pub async fn staged_count(&self, conn: &mut SqliteConnection, table: Table) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.relation(table)))
            .fetch_one(&mut *conn)
            .await
            .map_err(Error::from_storage)?;
        Ok(count as u64)
    }

    /// Drop one staging relation
    pub async fn discard(&self, conn: &mut SqliteConnection, table: Table) -> Result<()> {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", self.relation(table)))
            .execute(&mut *conn)
            .await
            .map_err(Error::from_storage)?;
        Ok(())
    }

    /// Drop every staging relation this arena may have created
    pub async fn discard_all(&self, conn: &mut SqliteConnection) -> Result<()> {
        for table in Table::ALL {
            self.discard(conn, table).await?;
        }
        debug!("Staging arena {} discarded", self.id);
        Ok(())
    }
}

impl Default for StagingArena {
    fn default() -> Self {
        Self::new()
    }
}
