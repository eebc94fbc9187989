//! Configuration loading and resolution
//!
//! Every setting is resolved with the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

pub const ENV_DATABASE_URL: &str = "SPARKIFY_DATABASE_URL";
pub const ENV_CATALOG_DIR: &str = "SPARKIFY_CATALOG_DIR";
pub const ENV_ACTIVITY_DIR: &str = "SPARKIFY_ACTIVITY_DIR";
pub const ENV_UNRESOLVED_POLICY: &str = "SPARKIFY_UNRESOLVED_POLICY";
pub const ENV_STAGING_BATCH_ROWS: &str = "SPARKIFY_STAGING_BATCH_ROWS";
pub const ENV_LOG_LEVEL: &str = "SPARKIFY_LOG_LEVEL";
pub const ENV_CONFIG: &str = "SPARKIFY_CONFIG";

/// How fact rows without a catalog match are treated by the songplays merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedPolicy {
    /// Insert the row with null song_id / artist_id
    #[default]
    Admit,
    /// Drop the row and report it as an unresolved reference
    #[serde(alias = "strict")]
    Reject,
}

impl FromStr for UnresolvedPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admit" => Ok(UnresolvedPolicy::Admit),
            "reject" | "strict" => Ok(UnresolvedPolicy::Reject),
            other => Err(Error::Config(format!(
                "Unknown unresolved policy '{}' (expected admit or reject)",
                other
            ))),
        }
    }
}

impl fmt::Display for UnresolvedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnresolvedPolicy::Admit => write!(f, "admit"),
            UnresolvedPolicy::Reject => write!(f, "reject"),
        }
    }
}

/// Logging section of the TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
}

/// On-disk TOML configuration; every key is optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    pub database_url: Option<String>,
    pub catalog_dir: Option<PathBuf>,
    pub activity_dir: Option<PathBuf>,
    pub unresolved_policy: Option<UnresolvedPolicy>,
    pub staging_batch_rows: Option<usize>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TomlConfig {
    /// Parse a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
    }
}

/// Values supplied on the command line (or through clap's env fallback)
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub database_url: Option<String>,
    pub catalog_dir: Option<PathBuf>,
    pub activity_dir: Option<PathBuf>,
    pub unresolved_policy: Option<UnresolvedPolicy>,
    pub staging_batch_rows: Option<usize>,
    pub log_level: Option<String>,
}

/// Compiled defaults, the last resolution tier
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub database_url: String,
    pub catalog_dir: PathBuf,
    pub activity_dir: PathBuf,
    pub staging_batch_rows: usize,
    pub log_level: String,
}

impl Default for CompiledDefaults {
    fn default() -> Self {
        Self {
            database_url: "sqlite://sparkify.db".to_string(),
            catalog_dir: PathBuf::from("data/song_data"),
            activity_dir: PathBuf::from("data/log_data"),
            staging_batch_rows: 100,
            log_level: "info".to_string(),
        }
    }
}

/// Fully resolved loader configuration
#[derive(Debug, Clone, Serialize)]
pub struct EtlConfig {
    pub database_url: String,
    pub catalog_dir: PathBuf,
    pub activity_dir: PathBuf,
    pub unresolved_policy: UnresolvedPolicy,
    pub staging_batch_rows: usize,
    pub log_level: String,
}

impl Default for EtlConfig {
    fn default() -> Self {
        let defaults = CompiledDefaults::default();
        Self {
            database_url: defaults.database_url,
            catalog_dir: defaults.catalog_dir,
            activity_dir: defaults.activity_dir,
            unresolved_policy: UnresolvedPolicy::default(),
            staging_batch_rows: defaults.staging_batch_rows,
            log_level: defaults.log_level,
        }
    }
}

impl EtlConfig {
    /// Resolve configuration from CLI overrides, environment, TOML file and defaults
    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self> {
        let toml_config = match locate_config_file(overrides.config_path.as_deref())? {
            Some(path) => {
                debug!("Loading config file: {}", path.display());
                TomlConfig::load(&path)?
            }
            None => {
                debug!("No config file found, using environment and defaults");
                TomlConfig::default()
            }
        };

        Self::resolve_with(overrides, &toml_config)
    }

    /// Resolve against an already-loaded TOML config
    pub fn resolve_with(overrides: &ConfigOverrides, toml_config: &TomlConfig) -> Result<Self> {
        let defaults = CompiledDefaults::default();

        let database_url = pick(
            overrides.database_url.clone(),
            env_value(ENV_DATABASE_URL),
            toml_config.database_url.clone(),
        )
        .unwrap_or(defaults.database_url);

        let catalog_dir = pick(
            overrides.catalog_dir.clone(),
            env_value(ENV_CATALOG_DIR).map(PathBuf::from),
            toml_config.catalog_dir.clone(),
        )
        .unwrap_or(defaults.catalog_dir);

        let activity_dir = pick(
            overrides.activity_dir.clone(),
            env_value(ENV_ACTIVITY_DIR).map(PathBuf::from),
            toml_config.activity_dir.clone(),
        )
        .unwrap_or(defaults.activity_dir);

        let env_policy = env_value(ENV_UNRESOLVED_POLICY)
            .map(|v| v.parse::<UnresolvedPolicy>())
            .transpose()?;
        let unresolved_policy = pick(
            overrides.unresolved_policy,
            env_policy,
            toml_config.unresolved_policy,
        )
        .unwrap_or_default();

        let env_rows = env_value(ENV_STAGING_BATCH_ROWS)
            .map(|v| {
                v.trim().parse::<usize>().map_err(|e| {
                    Error::Config(format!("{} must be a positive integer: {}", ENV_STAGING_BATCH_ROWS, e))
                })
            })
            .transpose()?;
        let staging_batch_rows = pick(
            overrides.staging_batch_rows,
            env_rows,
            toml_config.staging_batch_rows,
        )
        .unwrap_or(defaults.staging_batch_rows);

        if staging_batch_rows == 0 {
            return Err(Error::Config(
                "staging_batch_rows must be greater than zero".to_string(),
            ));
        }

        let log_level = pick(
            overrides.log_level.clone(),
            env_value(ENV_LOG_LEVEL),
            toml_config.logging.level.clone(),
        )
        .unwrap_or(defaults.log_level);

        Ok(Self {
            database_url,
            catalog_dir,
            activity_dir,
            unresolved_policy,
            staging_batch_rows,
            log_level,
        })
    }
}

/// First present value in priority order
fn pick<T>(cli: Option<T>, env: Option<T>, file: Option<T>) -> Option<T> {
    cli.or(env).or(file)
}

/// Non-empty environment variable value
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Find the config file to load, if any
///
/// An explicitly named file (CLI or `SPARKIFY_CONFIG`) must exist. The
/// platform default location is optional.
fn locate_config_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    let explicit = explicit
        .map(Path::to_path_buf)
        .or_else(|| env_value(ENV_CONFIG).map(PathBuf::from));

    if let Some(path) = explicit {
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    match default_config_path() {
        Some(path) if path.exists() => Ok(Some(path)),
        Some(_) => Ok(None),
        None => {
            warn!("Could not determine config directory for this platform");
            Ok(None)
        }
    }
}

/// Platform default config file: `<config_dir>/sparkify/etl.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sparkify").join("etl.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parsing() {
        assert_eq!("admit".parse::<UnresolvedPolicy>().unwrap(), UnresolvedPolicy::Admit);
        assert_eq!("Reject".parse::<UnresolvedPolicy>().unwrap(), UnresolvedPolicy::Reject);
        assert_eq!("strict".parse::<UnresolvedPolicy>().unwrap(), UnresolvedPolicy::Reject);
        assert!("maybe".parse::<UnresolvedPolicy>().is_err());
    }

    #[test]
    fn test_policy_toml_alias() {
        let cfg: TomlConfig = toml::from_str("unresolved_policy = \"strict\"").unwrap();
        assert_eq!(cfg.unresolved_policy, Some(UnresolvedPolicy::Reject));
    }

    #[test]
    fn test_pick_priority() {
        assert_eq!(pick(Some(1), Some(2), Some(3)), Some(1));
        assert_eq!(pick(None, Some(2), Some(3)), Some(2));
        assert_eq!(pick(None, None, Some(3)), Some(3));
        assert_eq!(pick::<i32>(None, None, None), None);
    }
}
