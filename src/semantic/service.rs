//! Semantic search service for bookmark similarity search.
//!
//! Owns the explicit catalog cache:
//! - Loads the persisted catalog or builds it on first use
//! - Serves nearest-neighbour queries from the cached catalog
//! - Invalidation deletes the data directory and empties the cache

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::bookmarks::{fingerprint, BookmarkSource, SourceError};
use crate::semantic::catalog::{BuildError, Catalog, SearchHit};
use crate::semantic::embeddings::{EmbeddingError, Embedder};
use crate::semantic::index::IndexError;
use crate::semantic::preprocess::preprocess_title;
use crate::semantic::storage::{CatalogStore, VectorStorageError};

/// Errors that can occur during semantic search operations.
#[derive(Debug, thiserror::Error)]
pub enum SemanticSearchError {
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Storage error: {0}")]
    Storage(#[from] VectorStorageError),

    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    #[error("{0}")]
    Source(#[from] SourceError),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub loaded: bool,
    /// A load or build is running right now
    pub building: bool,
    pub bookmarks: usize,
    pub model: String,
    pub built_at: Option<DateTime<Utc>>,
}

/// Service for performing semantic search on bookmarks.
///
/// The catalog is built or loaded on first use and kept until
/// `invalidate` is called.
pub struct SemanticSearchService {
    store: CatalogStore,
    embedder: Arc<dyn Embedder>,
    source: Arc<dyn BookmarkSource>,
    refresh_on_start: bool,
    /// Lazily-initialized catalog. Uses Mutex<Option<_>> instead of OnceLock
    /// because it must be clearable and get_or_try_init is unstable.
    /// Held for the whole of a build.
    state: Mutex<Option<Arc<Catalog>>>,
    /// Copy of `state` for readers that must not wait on a build.
    published: RwLock<Option<Arc<Catalog>>>,
    building: AtomicBool,
}

impl SemanticSearchService {
    /// # Arguments
    /// * `store` - Persisted catalog location
    /// * `embedder` - Model used for both titles and queries
    /// * `source` - Where bookmarks come from on a cold build
    /// * `refresh_on_start` - Compare a warm catalog with the live bookmarks
    pub fn new(
        store: CatalogStore,
        embedder: Arc<dyn Embedder>,
        source: Arc<dyn BookmarkSource>,
        refresh_on_start: bool,
    ) -> Self {
        Self {
            store,
            embedder,
            source,
            refresh_on_start,
            state: Mutex::new(None),
            published: RwLock::new(None),
            building: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    /// Return the cached catalog, loading or building it if needed.
    pub fn ensure_loaded(&self) -> Result<Arc<Catalog>, SemanticSearchError> {
        let mut guard = self.lock_state()?;

        if let Some(catalog) = guard.as_ref() {
            return Ok(catalog.clone());
        }

        self.building.store(true, Ordering::SeqCst);
        let result = self.do_init();
        self.building.store(false, Ordering::SeqCst);

        let catalog = Arc::new(result?);
        self.publish(&mut guard, Some(catalog.clone()));
        Ok(catalog)
    }

    /// Search for the `k` titles nearest to `query`.
    ///
    /// A blank query returns no results.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, SemanticSearchError> {
        let query = preprocess_title(query);
        if query.is_empty() {
            return Ok(vec![]);
        }

        let catalog = self.ensure_loaded()?;
        if catalog.is_empty() {
            return Ok(vec![]);
        }

        let query_embedding = self.embedder.embed(&query)?;
        Ok(catalog.nearest(&query_embedding, k)?)
    }

    /// Drop the persisted catalog and the cached one. The next access
    /// performs a full cold build.
    pub fn invalidate(&self) -> Result<(), SemanticSearchError> {
        let mut guard = self.lock_state()?;
        self.publish(&mut guard, None);
        self.store.delete()?;
        log::info!("search index at {} removed", self.store.dir().display());
        Ok(())
    }

    /// Invalidate, then build from scratch.
    pub fn rebuild(&self) -> Result<Arc<Catalog>, SemanticSearchError> {
        self.invalidate()?;
        self.ensure_loaded()
    }

    /// Never waits for a running build.
    pub fn is_initialized(&self) -> bool {
        self.current().is_some()
    }

    /// Never waits for a running build.
    pub fn status(&self) -> ServiceStatus {
        let catalog = self.current();

        ServiceStatus {
            loaded: catalog.is_some(),
            building: self.building.load(Ordering::SeqCst),
            bookmarks: catalog.as_ref().map(|c| c.len()).unwrap_or(0),
            model: self.embedder.name().to_string(),
            built_at: catalog.map(|c| c.built_at),
        }
    }

    fn current(&self) -> Option<Arc<Catalog>> {
        self.published
            .read()
            .ok()
            .and_then(|catalog| catalog.clone())
    }

    fn publish(
        &self,
        guard: &mut MutexGuard<'_, Option<Arc<Catalog>>>,
        catalog: Option<Arc<Catalog>>,
    ) {
        if let Ok(mut published) = self.published.write() {
            *published = catalog.clone();
        }
        **guard = catalog;
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, Option<Arc<Catalog>>>, SemanticSearchError> {
        self.state
            .lock()
            .map_err(|e| SemanticSearchError::Internal(format!("Lock poisoned: {}", e)))
    }

    /// Perform actual initialization.
    fn do_init(&self) -> Result<Catalog, SemanticSearchError> {
        let model_id = self.embedder.model_id_hash();

        let warm = if self.store.exists() {
            match self.store.load(&model_id) {
                Ok(catalog) => {
                    log::info!(
                        "Loaded {} bookmarks from {}",
                        catalog.len(),
                        self.store.dir().display()
                    );
                    Some(catalog)
                }
                Err(err) if err.is_unusable_cache() => {
                    log::warn!("Stored index unusable ({err}), rebuilding");
                    None
                }
                Err(err) => {
                    log::error!("Failed to load stored index: {}", err);
                    return Err(err.into());
                }
            }
        } else {
            log::info!("No existing index, building from browser bookmarks");
            None
        };

        let Some(catalog) = warm else {
            let bookmarks = self.source.load()?;
            return self.build(&bookmarks, None);
        };

        if !self.refresh_on_start {
            return Ok(catalog);
        }

        match self.source.load() {
            Ok(bookmarks) => {
                if catalog.fingerprint.as_deref() == Some(fingerprint(&bookmarks).as_str()) {
                    log::debug!("stored index matches current bookmarks");
                    Ok(catalog)
                } else {
                    log::info!("bookmarks changed since {}, updating index", catalog.built_at);
                    self.build(&bookmarks, Some(&catalog))
                }
            }
            Err(err) => {
                log::warn!("could not read bookmarks to check the stored index: {err}");
                Ok(catalog)
            }
        }
    }

    fn build(
        &self,
        bookmarks: &[crate::bookmarks::Bookmark],
        previous: Option<&Catalog>,
    ) -> Result<Catalog, SemanticSearchError> {
        let (catalog, stats) = Catalog::build(bookmarks, self.embedder.as_ref(), previous)?;
        log::info!(
            "indexed {} bookmarks ({} embedded, {} reused)",
            stats.total,
            stats.embedded,
            stats.reused
        );

        self.store
            .save(&catalog, self.embedder.name(), &self.embedder.model_id_hash())?;
        Ok(catalog)
    }
}
