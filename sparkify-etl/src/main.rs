//! sparkify-etl - Warehouse loader
//!
//! Loads the song catalog and the session logs into the Sparkify warehouse.
//! Configuration priority: command line > environment > TOML file > defaults.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use sparkify_common::config::ConfigOverrides;
use sparkify_common::db::init_database;
use sparkify_common::{EtlConfig, Table, UnresolvedPolicy};
use sparkify_etl::{Pipeline, PipelineConfig};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Command-line arguments for sparkify-etl
#[derive(Parser, Debug)]
#[command(name = "sparkify-etl")]
#[command(about = "Load song catalog and session logs into the Sparkify warehouse")]
#[command(version)]
struct Cli {
    /// TOML config file
    #[arg(long, global = true, env = "SPARKIFY_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Warehouse connection string, e.g. sqlite://sparkify.db
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full load: catalog, then activity logs
    Load(LoadArgs),
    /// Remove full-row duplicates from one table
    Dedupe {
        /// songs, artists, users, time or songplays
        #[arg(long)]
        table: Table,
    },
    /// Create the warehouse schema and exit
    Init,
}

#[derive(Args, Debug)]
struct LoadArgs {
    /// Song catalog directory
    #[arg(long)]
    catalog_dir: Option<PathBuf>,

    /// Session log directory
    #[arg(long)]
    activity_dir: Option<PathBuf>,

    /// Songplays without a catalog match: admit or reject
    #[arg(long)]
    policy: Option<UnresolvedPolicy>,

    /// Rows per bulk-append statement
    #[arg(long)]
    staging_batch_rows: Option<usize>,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides {
            config_path: self.config.clone(),
            database_url: self.database_url.clone(),
            log_level: self.log_level.clone(),
            ..Default::default()
        };

        if let Command::Load(args) = &self.command {
            overrides.catalog_dir = args.catalog_dir.clone();
            overrides.activity_dir = args.activity_dir.clone();
            overrides.unresolved_policy = args.policy;
            overrides.staging_batch_rows = args.staging_batch_rows;
        }

        overrides
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = EtlConfig::resolve(&cli.overrides()).context("Failed to resolve configuration")?;

    // Initialize tracing; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sparkify_etl={0},sparkify_common={0}", config.log_level)));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting sparkify-etl v{}", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", config.database_url);

    let pool = init_database(&config.database_url)
        .await
        .context("Failed to open warehouse")?;

    match &cli.command {
        Command::Init => {
            info!("Warehouse schema initialized");
        }
        Command::Dedupe { table } => {
            let pipeline = Pipeline::new(pool.clone(), PipelineConfig::from(&config));
            let removed = pipeline.dedupe(*table).await?;
            println!("{}: {} duplicate row(s) removed", table, removed);
        }
        Command::Load(args) => {
            info!("Catalog: {}", config.catalog_dir.display());
            info!("Activity: {}", config.activity_dir.display());
            info!("Unresolved songplays: {}", config.unresolved_policy);

            let pipeline = Pipeline::new(pool.clone(), PipelineConfig::from(&config));
            let report = pipeline
                .run(&config.catalog_dir, &config.activity_dir)
                .await
                .context("Load run failed")?;

            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.summary());
            }
        }
    }

    pool.close().await;
    Ok(())
}
