//! Warehouse initialization
//!
//! Opens the storage collaborator from a connection string and creates the
//! five warehouse tables when they are missing. Safe to call on every start.

use crate::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Version recorded in `schema_version` by this build
pub const SCHEMA_VERSION: i64 = 1;

/// Connect to the warehouse and make sure the schema exists
pub async fn init_database(database_url: &str) -> Result<SqlitePool> {
    let pool = connect(database_url).await?;
    create_schema(&pool).await?;
    Ok(pool)
}

/// Open a connection pool without touching the schema
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| Error::Config(format!("Invalid database URL '{}': {}", database_url, e)))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    // Every connection to an in-memory database is a separate database
    let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .map_err(Error::from_storage)?;

    info!("Connected to warehouse: {}", database_url);
    Ok(pool)
}

/// Create warehouse tables and lookup indexes (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_songs_table(pool).await?;
    create_artists_table(pool).await?;
    create_users_table(pool).await?;
    create_time_table(pool).await?;
    create_songplays_table(pool).await?;
    create_lookup_indexes(pool).await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    info!("Warehouse schema ready (version {})", SCHEMA_VERSION);
    Ok(())
}

/// Highest schema version recorded in the warehouse
pub async fn schema_version(pool: &SqlitePool) -> Result<Option<i64>> {
    let version = sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await?;
    Ok(version)
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_songs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS songs (
            song_id TEXT PRIMARY KEY NOT NULL,
            title TEXT,
            artist_id TEXT NOT NULL,
            year INTEGER,
            duration REAL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_artists_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artists (
            artist_id TEXT PRIMARY KEY NOT NULL,
            name TEXT,
            location TEXT,
            latitude REAL,
            longitude REAL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    // A user appears once per subscription level they have held
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            user_id INTEGER NOT NULL,
            first_name TEXT,
            last_name TEXT,
            gender TEXT,
            level TEXT NOT NULL,
            PRIMARY KEY (user_id, level)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_time_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS time (
            start_time TEXT PRIMARY KEY NOT NULL,
            hour INTEGER,
            day INTEGER,
            week INTEGER,
            month INTEGER,
            year INTEGER,
            weekday INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_songplays_table(pool: &SqlitePool) -> Result<()> {
    // song_id / artist_id stay nullable: NULL records "no catalog match"
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS songplays (
            songplay_id INTEGER PRIMARY KEY AUTOINCREMENT,
            start_time TEXT NOT NULL REFERENCES time(start_time),
            user_id INTEGER NOT NULL,
            level TEXT NOT NULL,
            song_id TEXT REFERENCES songs(song_id),
            artist_id TEXT REFERENCES artists(artist_id),
            session_id INTEGER NOT NULL,
            location TEXT,
            user_agent TEXT,
            FOREIGN KEY (user_id, level) REFERENCES users(user_id, level)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_lookup_indexes(pool: &SqlitePool) -> Result<()> {
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_songs_title_duration ON songs(title, duration)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_artists_name ON artists(name)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_songplays_start_time ON songplays(start_time)")
        .execute(pool)
        .await?;

    Ok(())
}
