//! Loader configuration, read from the environment and then overridden by
//! command-line flags.

use std::path::PathBuf;

pub const DEFAULT_DATA_DIR: &str = "./data/lca";
pub const DEFAULT_DIMENSION_BATCH_SIZE: usize = 1000;
pub const DEFAULT_FACT_BATCH_SIZE: usize = 5000;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Required for a database run; unused by dry runs.
    pub db_url: Option<String>,
    pub data_dir: PathBuf,
    pub dimension_batch_size: usize,
    pub fact_batch_size: usize,
    pub max_connections: u32,
    pub refresh_views: bool,
    /// Reload years that already have applications.
    pub force: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            db_url: None,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            dimension_batch_size: DEFAULT_DIMENSION_BATCH_SIZE,
            fact_batch_size: DEFAULT_FACT_BATCH_SIZE,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            refresh_views: false,
            force: false,
        }
    }
}

impl LoaderConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unparseable numbers fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            db_url: lookup("DB_URL").filter(|v| !v.is_empty()),
            data_dir: lookup("LCA_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            dimension_batch_size: lookup("DIMENSION_BATCH_SIZE")
                .and_then(|v| v.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(defaults.dimension_batch_size),
            fact_batch_size: lookup("FACT_BATCH_SIZE")
                .and_then(|v| v.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(defaults.fact_batch_size),
            max_connections: lookup("DB_MAX_CONNECTIONS")
                .and_then(|v| v.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(defaults.max_connections),
            refresh_views: false,
            force: false,
        }
    }
}
