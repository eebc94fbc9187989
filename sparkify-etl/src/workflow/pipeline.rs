//! Pipeline orchestrator
//!
//! Drives one load run over the two raw sources.
//!
//! # Phases
//! - **Catalog**: every catalog file is extracted, duplicates are collapsed
//!   with the fill-forward rule, then `artists` and `songs` are staged and
//!   merged, each merge committed on its own. A failed merge ends the run.
//! - **Activity**: one transaction per log file. The file's `time` and
//!   `users` rows are merged, the phase barrier is sealed, songplays are
//!   resolved against the catalog, staged and merged. Any failure rolls the
//!   whole file back and the run moves on to the next file, unless storage
//!   is unreachable.
//!
//! All staging and merging happens on one pooled connection because the
//! staging relations are connection-private TEMP tables.
//!
//! Every write cycle (the catalog merges, each activity file) runs under the
//! shared write-cycle lock, so pipelines built with the same `TableLocks`
//! can load into one warehouse concurrently.

use super::barrier::PhaseBarrier;
use super::report::{Phase, RunReport};
use crate::db::StagingArena;
use crate::extractors::{extract_activity, extract_catalog};
use crate::merge::{collapse_by_key, dedupe_table, MergeEngine, MergeOutcome, TableLocks};
use crate::services::{DimensionResolver, JsonFileScanner};
use serde::Serialize;
use sparkify_common::{EtlConfig, Error, Result, Table, UnresolvedPolicy};
use sqlx::{Connection, SqliteConnection, SqlitePool};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// What to do with songplays that match no catalog entry
    pub unresolved_policy: UnresolvedPolicy,
    /// Rows per bulk-append statement
    pub staging_batch_rows: usize,
    /// Fixed staging arena id; random when `None`
    pub arena_id: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            unresolved_policy: UnresolvedPolicy::default(),
            staging_batch_rows: 100,
            arena_id: None,
        }
    }
}

impl From<&EtlConfig> for PipelineConfig {
    fn from(config: &EtlConfig) -> Self {
        Self {
            unresolved_policy: config.unresolved_policy,
            staging_batch_rows: config.staging_batch_rows,
            arena_id: None,
        }
    }
}

/// Progress events emitted during a run
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    PhaseStarted {
        phase: Phase,
        files: usize,
    },
    FileStarted {
        phase: Phase,
        path: String,
        /// 1-based position within the phase
        index: usize,
        total: usize,
    },
    FileCompleted {
        phase: Phase,
        path: String,
    },
    FileSkipped {
        phase: Phase,
        path: String,
        reason: String,
    },
    TableMerged {
        outcome: MergeOutcome,
    },
    PhaseCompleted {
        phase: Phase,
        processed: usize,
        skipped: usize,
    },
}

/// Merges committed for one activity file
struct ActivityFileOutcome {
    merges: Vec<MergeOutcome>,
    unresolved: u64,
}

/// Batch orchestrator for the warehouse load
pub struct Pipeline {
    pool: SqlitePool,
    config: PipelineConfig,
    locks: TableLocks,
    scanner: JsonFileScanner,
    event_tx: Option<mpsc::Sender<PipelineEvent>>,
}

impl Pipeline {
    pub fn new(pool: SqlitePool, config: PipelineConfig) -> Self {
        Self {
            pool,
            config,
            locks: TableLocks::new(),
            scanner: JsonFileScanner::new(),
            event_tx: None,
        }
    }

    /// Share table locks with other pipelines or cleanup passes
    pub fn with_locks(mut self, locks: TableLocks) -> Self {
        self.locks = locks;
        self
    }

    /// Attach an event channel for progress reporting
    pub fn with_events(mut self, event_tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn locks(&self) -> &TableLocks {
        &self.locks
    }

    fn engine(&self) -> MergeEngine {
        MergeEngine::new(self.config.unresolved_policy, self.locks.clone())
    }

    fn arena(&self) -> Result<StagingArena> {
        match &self.config.arena_id {
            Some(id) => StagingArena::with_id(id.clone()),
            None => Ok(StagingArena::new()),
        }
    }

    /// Run the catalog phase, then the activity phase
    pub async fn run(&self, catalog_root: &Path, activity_root: &Path) -> Result<RunReport> {
        let started = Instant::now();
        let arena = self.arena()?;
        let mut report = RunReport::new(arena.id());
        let mut conn = self.pool.acquire().await.map_err(Error::from_storage)?;

        info!("Load run started (staging arena {})", arena.id());

        let result = async {
            let barrier = self
                .load_catalog(&mut conn, &arena, catalog_root, &mut report)
                .await?;
            self.load_activity(&mut conn, &arena, &barrier, activity_root, &mut report)
                .await
        }
        .await;

        // Staging never outlives the run, whatever the outcome
        if let Err(e) = arena.discard_all(&mut conn).await {
            warn!("Failed to discard staging arena {}: {}", arena.id(), e);
        }
        result?;

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            "Load run complete: {} catalog and {} activity files processed, {} skipped",
            report.catalog.files_processed,
            report.activity.files_processed,
            report.skipped.len()
        );
        Ok(report)
    }

    /// Extract every catalog file and merge artists and songs
    ///
    /// Returns the barrier with both catalog dimensions marked merged.
    pub async fn load_catalog(
        &self,
        conn: &mut SqliteConnection,
        arena: &StagingArena,
        root: &Path,
        report: &mut RunReport,
    ) -> Result<PhaseBarrier> {
        let files = self.discover(Phase::Catalog, root, report).await?;
        let total = files.len();

        let mut songs = Vec::new();
        let mut artists = Vec::new();

        for (i, path) in files.iter().enumerate() {
            let source = path.display().to_string();
            self.emit(PipelineEvent::FileStarted {
                phase: Phase::Catalog,
                path: source.clone(),
                index: i + 1,
                total,
            })
            .await;

            let extracted = match tokio::fs::read_to_string(path).await {
                Ok(content) => extract_catalog(&source, &content),
                Err(e) => Err(Error::Io(e)),
            };

            match extracted {
                Ok(rows) => {
                    songs.extend(rows.songs);
                    artists.extend(rows.artists);
                    report.catalog.files_processed += 1;
                    self.emit(PipelineEvent::FileCompleted {
                        phase: Phase::Catalog,
                        path: source,
                    })
                    .await;
                }
                Err(e) => self.skip(Phase::Catalog, source, e, report).await,
            }

            info!("{}/{} files processed.", i + 1, total);
        }

        let songs = collapse_by_key(songs);
        let artists = collapse_by_key(artists);
        debug!("Catalog collapsed to {} songs, {} artists", songs.len(), artists.len());

        let engine = self.engine();
        let batch_rows = self.config.staging_batch_rows;
        let mut barrier = PhaseBarrier::new();
        let cycle = self.locks.write_cycle().await;

        arena.stage(conn, &artists, batch_rows).await?;
        let outcome = engine.merge_dimension(conn, arena, Table::Artists).await?;
        self.record(&mut barrier, outcome, report).await?;

        arena.stage(conn, &songs, batch_rows).await?;
        let outcome = engine.merge_dimension(conn, arena, Table::Songs).await?;
        self.record(&mut barrier, outcome, report).await?;
        drop(cycle);

        self.complete_phase(Phase::Catalog, report).await;
        Ok(barrier)
    }

    /// Load every activity file, one transaction per file
    pub async fn load_activity(
        &self,
        conn: &mut SqliteConnection,
        arena: &StagingArena,
        catalog: &PhaseBarrier,
        root: &Path,
        report: &mut RunReport,
    ) -> Result<()> {
        let files = self.discover(Phase::Activity, root, report).await?;
        let total = files.len();
        let mut resolver = DimensionResolver::new();

        for (i, path) in files.iter().enumerate() {
            let source = path.display().to_string();
            self.emit(PipelineEvent::FileStarted {
                phase: Phase::Activity,
                path: source.clone(),
                index: i + 1,
                total,
            })
            .await;

            match self
                .load_activity_file(conn, arena, catalog, &mut resolver, path)
                .await
            {
                Ok(outcome) => {
                    for merge in &outcome.merges {
                        report.record_merge(merge);
                        self.emit(PipelineEvent::TableMerged {
                            outcome: merge.clone(),
                        })
                        .await;
                    }
                    report.unresolved_songplays += outcome.unresolved;
                    report.activity.files_processed += 1;
                    self.emit(PipelineEvent::FileCompleted {
                        phase: Phase::Activity,
                        path: source,
                    })
                    .await;
                }
                Err(e) if e.is_fatal_for_run() => return Err(e),
                Err(e) => self.skip(Phase::Activity, source, e, report).await,
            }

            info!("{}/{} files processed.", i + 1, total);
        }

        debug!("Resolver issued {} catalog lookups", resolver.queries());
        self.complete_phase(Phase::Activity, report).await;
        Ok(())
    }

    async fn load_activity_file(
        &self,
        conn: &mut SqliteConnection,
        arena: &StagingArena,
        catalog: &PhaseBarrier,
        resolver: &mut DimensionResolver,
        path: &Path,
    ) -> Result<ActivityFileOutcome> {
        let source = path.display().to_string();
        let content = tokio::fs::read_to_string(path).await?;
        let rows = extract_activity(&source, &content)?;
        debug!(
            "{}: {} of {} events are song plays",
            source, rows.events_kept, rows.events_total
        );

        let engine = self.engine();
        let batch_rows = self.config.staging_batch_rows;
        let mut barrier = catalog.clone();
        let mut merges = Vec::with_capacity(3);

        let _cycle = self.locks.write_cycle().await;
        // Dropping the transaction on any error rolls the whole file back
        let mut tx = conn.begin().await.map_err(Error::from_storage)?;

        arena.stage(&mut tx, &rows.time, batch_rows).await?;
        arena.stage(&mut tx, &rows.users, batch_rows).await?;
        for table in [Table::Time, Table::Users] {
            let outcome = engine.merge_dimension(&mut tx, arena, table).await?;
            barrier.record(&outcome)?;
            merges.push(outcome);
        }

        let ready = barrier.seal()?;
        let songplays = resolver.resolve_all(&mut tx, rows.songplays, &ready).await?;
        let unresolved = songplays.iter().filter(|row| !row.is_resolved()).count() as u64;

        arena.stage(&mut tx, &songplays, batch_rows).await?;
        merges.push(engine.merge_facts(&mut tx, arena, &ready).await?);

        tx.commit().await.map_err(Error::from_storage)?;

        Ok(ActivityFileOutcome { merges, unresolved })
    }

    /// Remove full-row duplicates from one table
    pub async fn dedupe(&self, table: Table) -> Result<u64> {
        let mut conn = self.pool.acquire().await.map_err(Error::from_storage)?;
        dedupe_table(&mut conn, table, &self.locks).await
    }

    async fn discover(&self, phase: Phase, root: &Path, report: &mut RunReport) -> Result<Vec<PathBuf>> {
        let files = self.scanner.scan(root)?;
        info!("{} files found in {}", files.len(), root.display());

        report.phase_mut(phase).files_found = files.len();
        self.emit(PipelineEvent::PhaseStarted {
            phase,
            files: files.len(),
        })
        .await;
        Ok(files)
    }

    async fn record(
        &self,
        barrier: &mut PhaseBarrier,
        outcome: MergeOutcome,
        report: &mut RunReport,
    ) -> Result<()> {
        barrier.record(&outcome)?;
        report.record_merge(&outcome);
        self.emit(PipelineEvent::TableMerged { outcome }).await;
        Ok(())
    }

    async fn skip(&self, phase: Phase, path: String, err: Error, report: &mut RunReport) {
        warn!("Skipping {} file {}: {}", phase, path, err);
        report.record_skip(phase, path.clone(), err.to_string());
        self.emit(PipelineEvent::FileSkipped {
            phase,
            path,
            reason: err.to_string(),
        })
        .await;
    }

    async fn complete_phase(&self, phase: Phase, report: &mut RunReport) {
        let stats = report.phase_mut(phase).clone();
        info!(
            "{} phase complete: {}/{} files processed, {} skipped",
            phase, stats.files_processed, stats.files_found, stats.files_skipped
        );
        self.emit(PipelineEvent::PhaseCompleted {
            phase,
            processed: stats.files_processed,
            skipped: stats.files_skipped,
        })
        .await;
    }

    async fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }
}
