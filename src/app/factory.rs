use crate::{
    app::context::AppContext,
    bookmarks::BrowserSource,
    config::Config,
    profile::ProfileLocator,
    semantic::{CatalogStore, LazyEmbeddingModel, SemanticSearchService},
};
use anyhow::{Context, Result};
use homedir::my_home;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Application factory for creating and configuring application components
pub struct AppFactory;

impl AppFactory {
    /// Resolve the base directory, load its config and wire the services.
    pub fn create_context() -> Result<AppContext> {
        let paths = Self::get_paths()?;
        let config = Self::create_config(&paths)?;
        Ok(Self::create_context_with(config))
    }

    /// Wire the services for an already loaded config.
    pub fn create_context_with(config: Config) -> AppContext {
        let locator = ProfileLocator::new(config.profile.clone());

        let embedder = Arc::new(LazyEmbeddingModel::new(
            &config.model,
            config.models_dir(),
            Some(Duration::from_secs(config.download_timeout_secs)),
        ));
        let source = Arc::new(BrowserSource::new(locator.clone()));

        let service = SemanticSearchService::new(
            CatalogStore::new(config.data_dir()),
            embedder,
            source,
            config.refresh_on_start,
        );

        AppContext::new(config, service, locator)
    }

    /// Get application paths with validation
    pub fn get_paths() -> Result<AppPaths> {
        let base_path = Self::get_base_path()?;

        // Ensure base directory exists
        std::fs::create_dir_all(&base_path)
            .context("Failed to create application base directory")?;

        Ok(AppPaths { base_path })
    }

    /// Create configuration with validation
    pub fn create_config(paths: &AppPaths) -> Result<Config> {
        Config::load_with(&paths.base_path)
            .with_context(|| format!("Failed to load config from {}", paths.base_path.display()))
    }

    /// Get the base path for the application
    fn get_base_path() -> Result<PathBuf> {
        if let Ok(base_path) = std::env::var("BMSEARCH_BASE_PATH") {
            return Ok(PathBuf::from(base_path));
        }

        let home = my_home()
            .map_err(|err| anyhow::anyhow!("Could not determine home directory: {err:?}"))?
            .context("Home directory path is empty")?;
        Ok(home.join(".local").join("share").join("bmsearch"))
    }
}

/// Application paths structure
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub base_path: PathBuf,
}
