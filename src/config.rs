use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::semantic::DEFAULT_MODEL;
use crate::storage::{self, StorageManager};

const CONFIG_FILE: &str = "config.yaml";

/// Default model download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;
const DEFAULT_LISTEN: &str = "127.0.0.1:8501";

/// Candidates fetched per query. Larger than what is shown so "load more"
/// can page without re-querying.
const DEFAULT_TOP_K: usize = 50;
const DEFAULT_INITIAL_RESULTS: usize = 5;
const DEFAULT_PAGE_SIZE: usize = 5;
/// Least recently used sessions are dropped beyond this
const DEFAULT_MAX_SESSIONS: usize = 256;

/// places.sqlite files below this size are skipped while scanning profiles
const DEFAULT_MIN_DB_SIZE: u64 = 100 * 1024;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotMethod {
    /// SQLite online backup, consistent while the browser writes
    #[default]
    Backup,
    /// Plain file copy of the database and its WAL
    Copy,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Results shown right after a query
    #[serde(default = "default_initial_results")]
    pub initial_results: usize,

    /// How many more results each "load more" reveals
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Sessions kept in memory by the web server
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            initial_results: DEFAULT_INITIAL_RESULTS,
            page_size: DEFAULT_PAGE_SIZE,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_initial_results() -> usize {
    DEFAULT_INITIAL_RESULTS
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_max_sessions() -> usize {
    DEFAULT_MAX_SESSIONS
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VisualizationConfig {
    #[serde(default = "default_sample_size")]
    pub default_sample_size: usize,
    #[serde(default = "max_sample_size")]
    pub max_sample_size: usize,
    #[serde(default = "default_neighbors")]
    pub default_neighbors: usize,
    #[serde(default = "max_neighbors")]
    pub max_neighbors: usize,
    #[serde(default = "word_cloud_words")]
    pub word_cloud_words: usize,
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            default_sample_size: default_sample_size(),
            max_sample_size: max_sample_size(),
            default_neighbors: default_neighbors(),
            max_neighbors: max_neighbors(),
            word_cloud_words: word_cloud_words(),
        }
    }
}

fn default_sample_size() -> usize {
    100
}

fn max_sample_size() -> usize {
    1000
}

fn default_neighbors() -> usize {
    5
}

fn max_neighbors() -> usize {
    20
}

fn word_cloud_words() -> usize {
    100
}

/// Where to look for the browser profile and how to copy its database.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Overrides the platform specific Firefox directory
    #[serde(default)]
    pub browser_dir: Option<PathBuf>,

    /// Use this profile directory and skip detection entirely
    #[serde(default)]
    pub profile_path: Option<PathBuf>,

    #[serde(default = "default_min_db_size")]
    pub min_db_size: u64,

    #[serde(default)]
    pub snapshot_method: SnapshotMethod,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            browser_dir: None,
            profile_path: None,
            min_db_size: DEFAULT_MIN_DB_SIZE,
            snapshot_method: SnapshotMethod::default(),
        }
    }
}

fn default_min_db_size() -> u64 {
    DEFAULT_MIN_DB_SIZE
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Model name for embeddings (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_model")]
    pub model: String,

    /// Timeout for model download in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    /// Compare the cached index against the live bookmarks on startup
    #[serde(default = "default_refresh_on_start")]
    pub refresh_on_start: bool,

    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub visualization: VisualizationConfig,

    #[serde(default)]
    pub profile: ProfileConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: default_model(),
            download_timeout_secs: default_download_timeout_secs(),
            refresh_on_start: default_refresh_on_start(),
            listen: default_listen(),
            search: SearchConfig::default(),
            visualization: VisualizationConfig::default(),
            profile: ProfileConfig::default(),
            base_path: PathBuf::new(),
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

fn default_refresh_on_start() -> bool {
    true
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        let search = &self.search;
        if search.initial_results == 0 {
            bail!("search.initial_results must be greater than 0");
        }
        if search.top_k < search.initial_results {
            bail!(
                "search.top_k ({}) must be at least search.initial_results ({})",
                search.top_k,
                search.initial_results
            );
        }
        if search.page_size == 0 {
            bail!("search.page_size must be greater than 0");
        }
        if search.max_sessions == 0 {
            bail!("search.max_sessions must be greater than 0");
        }

        let vis = &self.visualization;
        if vis.max_sample_size == 0 || vis.max_neighbors == 0 || vis.word_cloud_words == 0 {
            bail!("visualization limits must be greater than 0");
        }
        if vis.default_sample_size > vis.max_sample_size {
            bail!(
                "visualization.default_sample_size ({}) exceeds max_sample_size ({})",
                vis.default_sample_size,
                vis.max_sample_size
            );
        }
        if vis.default_neighbors > vis.max_neighbors {
            bail!(
                "visualization.default_neighbors ({}) exceeds max_neighbors ({})",
                vis.default_neighbors,
                vis.max_neighbors
            );
        }

        if self.download_timeout_secs == 0 {
            bail!("download_timeout_secs must be greater than 0");
        }

        Ok(())
    }

    pub fn load_with(base_path: &Path) -> anyhow::Result<Self> {
        let store = storage::BackendLocal::new(base_path)?;

        // create new if does not exist
        if !store.exists(CONFIG_FILE) {
            store.write(CONFIG_FILE, serde_yml::to_string(&Self::default())?.as_bytes())?;
        }

        let config_str =
            String::from_utf8(store.read(CONFIG_FILE)?).context("config file is not valid utf8")?;
        let mut config: Self = serde_yml::from_str(&config_str).context("config is malformed")?;

        config.base_path = base_path.to_path_buf();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let store = storage::BackendLocal::new(&self.base_path)?;

        let config_str = serde_yml::to_string(&self)?;
        store.write(CONFIG_FILE, config_str.as_bytes())?;
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Directory holding index.bin and meta.json
    pub fn data_dir(&self) -> PathBuf {
        self.base_path.join("data")
    }

    /// Directory where fastembed caches downloaded models
    pub fn models_dir(&self) -> PathBuf {
        self.base_path.join("models")
    }
}
