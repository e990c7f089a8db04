//! Per-client search state: current query, fetched candidates and how many
//! of them are shown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;

use crate::config::SearchConfig;
use crate::semantic::SearchHit;

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub query: Option<String>,
    pub hits: Vec<SearchHit>,
    pub shown: usize,
    pub page_size: usize,
    initial_results: usize,
    /// Store tick of the last access, for eviction
    last_used: u64,
}

/// What a client renders after each action.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session: String,
    pub query: Option<String>,
    pub hits: Vec<SearchHit>,
    pub shown: usize,
    pub total_candidates: usize,
    pub has_more: bool,
}

impl Session {
    pub fn new(id: String, config: &SearchConfig) -> Self {
        Self {
            id,
            query: None,
            hits: vec![],
            shown: 0,
            page_size: config.page_size,
            initial_results: config.initial_results,
            last_used: 0,
        }
    }

    /// Replace the results with a fresh query's candidates.
    pub fn apply_results(&mut self, query: &str, hits: Vec<SearchHit>) {
        self.shown = self.initial_results.min(hits.len());
        self.query = Some(query.to_string());
        self.hits = hits;
    }

    /// Reveal one more page, never past the fetched candidates.
    pub fn load_more(&mut self) {
        self.shown = (self.shown + self.page_size).min(self.hits.len());
    }

    /// Back to the defaults of a new session.
    pub fn reset(&mut self, config: &SearchConfig) {
        let last_used = self.last_used;
        *self = Session::new(std::mem::take(&mut self.id), config);
        self.last_used = last_used;
    }

    /// Results currently visible.
    pub fn visible(&self) -> &[SearchHit] {
        &self.hits[..self.shown]
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            session: self.id.clone(),
            query: self.query.clone(),
            hits: self.visible().to_vec(),
            shown: self.shown,
            total_candidates: self.hits.len(),
            has_more: self.shown < self.hits.len(),
        }
    }
}

/// Sessions keyed by ULID, at most `max_sessions` of them. Creating one
/// more drops the session that was used least recently.
pub struct SessionStore {
    config: SearchConfig,
    sessions: Mutex<HashMap<String, Session>>,
    clock: AtomicU64,
}

impl SessionStore {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(HashMap::new()),
            clock: AtomicU64::new(0),
        }
    }

    pub fn create(&self) -> SessionView {
        let id = rusty_ulid::generate_ulid_string();
        let mut session = Session::new(id.clone(), &self.config);
        session.last_used = self.tick();
        let view = session.view();

        let mut sessions = self.lock();
        while sessions.len() >= self.config.max_sessions.max(1) {
            let Some(idle) = sessions
                .values()
                .min_by_key(|s| s.last_used)
                .map(|s| s.id.clone())
            else {
                break;
            };
            log::debug!("dropping idle session {idle}");
            sessions.remove(&idle);
        }
        sessions.insert(id, session);
        view
    }

    /// Run `f` on the session, `None` if it does not exist.
    pub fn with_session<R>(&self, id: &str, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let tick = self.tick();
        self.lock().get_mut(id).map(|session| {
            session.last_used = tick;
            f(session)
        })
    }

    /// Reset every session to defaults, keeping their ids.
    pub fn reset_all(&self) {
        for session in self.lock().values_mut() {
            session.reset(&self.config);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Session>> {
        // a poisoned map only means a handler panicked mid-update
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
