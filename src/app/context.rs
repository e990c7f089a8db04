use crate::{
    app::errors::AppError,
    config::Config,
    profile::{ProfileLocator, PLACES_DB},
    semantic::{SemanticSearchService, ServiceStatus},
    session::{SessionStore, SessionView},
    visualize::{self, SimilarityGraph, WordCount},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;

/// Which titles a visualization covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Candidates of the session's current query
    #[default]
    Results,
    All,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppStatus {
    #[serde(flatten)]
    pub service: ServiceStatus,
    /// Message of the last failed initialization
    pub error: Option<String>,
    pub sessions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocatedProfile {
    pub profile: PathBuf,
    pub database: PathBuf,
    pub size: u64,
}

/// Application context that owns the search service and client sessions.
/// Every user action is one method returning the updated view.
pub struct AppContext {
    config: Config,
    service: SemanticSearchService,
    sessions: SessionStore,
    locator: ProfileLocator,
    init_error: Mutex<Option<String>>,
}

impl AppContext {
    pub fn new(config: Config, service: SemanticSearchService, locator: ProfileLocator) -> Self {
        Self {
            sessions: SessionStore::new(config.search.clone()),
            config,
            service,
            locator,
            init_error: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn service(&self) -> &SemanticSearchService {
        &self.service
    }

    /// Load or build the index, remembering the failure for status reports.
    pub fn initialize(&self) -> Result<AppStatus, AppError> {
        let result = self.service.ensure_loaded().map_err(AppError::from);
        self.record(result.as_ref().err());
        result?;
        Ok(self.status())
    }

    pub fn status(&self) -> AppStatus {
        AppStatus {
            service: self.service.status(),
            error: self.init_error.lock().ok().and_then(|e| e.clone()),
            sessions: self.sessions.len(),
        }
    }

    pub fn create_session(&self) -> SessionView {
        self.sessions.create()
    }

    /// Run a query for the session and show its first page.
    pub fn search(
        &self,
        session: &str,
        query: &str,
        page_size: Option<usize>,
    ) -> Result<SessionView, AppError> {
        if page_size == Some(0) {
            return Err(AppError::BadRequest("page_size must be greater than 0".to_string()));
        }

        // fail fast before embedding anything
        self.sessions
            .with_session(session, |_| ())
            .ok_or(AppError::SessionNotFound)?;

        let result = self
            .service
            .search(query, self.config.search.top_k)
            .map_err(AppError::from);
        self.record(result.as_ref().err());
        let hits = result?;

        self.sessions
            .with_session(session, |s| {
                if let Some(page_size) = page_size {
                    s.page_size = page_size;
                }
                s.apply_results(query, hits);
                s.view()
            })
            .ok_or(AppError::SessionNotFound)
    }

    pub fn load_more(&self, session: &str) -> Result<SessionView, AppError> {
        self.sessions
            .with_session(session, |s| {
                s.load_more();
                s.view()
            })
            .ok_or(AppError::SessionNotFound)
    }

    pub fn session_view(&self, session: &str) -> Result<SessionView, AppError> {
        self.sessions
            .with_session(session, |s| s.view())
            .ok_or(AppError::SessionNotFound)
    }

    /// Similarity graph over the session's candidates or the whole catalog.
    pub fn visualize(
        &self,
        session: Option<&str>,
        scope: Scope,
        sample_size: Option<usize>,
        neighbors: Option<usize>,
        seed: Option<u64>,
    ) -> Result<SimilarityGraph, AppError> {
        let vis = &self.config.visualization;
        let sample_size = sample_size
            .unwrap_or(vis.default_sample_size)
            .clamp(1, vis.max_sample_size);
        let neighbors = neighbors
            .unwrap_or(vis.default_neighbors)
            .clamp(1, vis.max_neighbors);

        let catalog = self.service.ensure_loaded()?;
        let positions = self.scope_positions(session, scope, catalog.len())?;

        visualize::similarity_graph(&catalog, &positions, sample_size, neighbors, seed)
            .map_err(|err| AppError::Search(err.into()))
    }

    pub fn word_cloud(
        &self,
        session: Option<&str>,
        scope: Scope,
        max_words: Option<usize>,
    ) -> Result<Vec<WordCount>, AppError> {
        let max_words = max_words
            .unwrap_or(self.config.visualization.word_cloud_words)
            .clamp(1, self.config.visualization.word_cloud_words);

        let catalog = self.service.ensure_loaded()?;
        let positions = self.scope_positions(session, scope, catalog.len())?;

        Ok(visualize::word_cloud(
            positions
                .iter()
                .filter_map(|&p| catalog.titles.get(p))
                .map(String::as_str),
            max_words,
        ))
    }

    /// Throw away the stored index, rebuild it and reset every session.
    pub fn rebuild(&self) -> Result<AppStatus, AppError> {
        self.sessions.reset_all();
        let result = self.service.rebuild().map_err(AppError::from);
        self.record(result.as_ref().err());
        result?;
        Ok(self.status())
    }

    /// Delete the stored index without rebuilding it.
    pub fn invalidate(&self) -> Result<(), AppError> {
        self.sessions.reset_all();
        self.service.invalidate()?;
        Ok(())
    }

    pub fn locate(&self) -> Result<LocatedProfile, AppError> {
        let profile = self.locator.locate()?;
        let database = profile.join(PLACES_DB);
        let size = std::fs::metadata(&database).map(|m| m.len()).unwrap_or(0);
        Ok(LocatedProfile {
            profile,
            database,
            size,
        })
    }

    fn scope_positions(
        &self,
        session: Option<&str>,
        scope: Scope,
        len: usize,
    ) -> Result<Vec<usize>, AppError> {
        match scope {
            Scope::All => Ok((0..len).collect()),
            Scope::Results => {
                let session = session.ok_or_else(|| {
                    AppError::BadRequest(
                        "a session is required for result visualizations".to_string(),
                    )
                })?;
                self.sessions
                    .with_session(session, |s| s.hits.iter().map(|h| h.position).collect())
                    .ok_or(AppError::SessionNotFound)
            }
        }
    }

    fn record(&self, err: Option<&AppError>) {
        if let Ok(mut slot) = self.init_error.lock() {
            match err {
                None => *slot = None,
                Some(err) if err.is_initialization() => *slot = Some(err.to_string()),
                Some(_) => {}
            }
        }
    }
}
