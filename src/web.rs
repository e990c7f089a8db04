use crate::{
    app::{
        context::{AppStatus, Scope},
        AppContext, AppError,
    },
    session::SessionView,
    visualize::{SimilarityGraph, WordCount},
};
use axum::{
    extract::State,
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::signal;

const INDEX_HTML: &str = include_str!("../assets/index.html");

#[derive(Clone)]
struct SharedState {
    app: Arc<AppContext>,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {err}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                log::error!("failed to install signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::warn!("shutting down");
}

/// All routes with their state attached.
pub fn router(app: Arc<AppContext>) -> Router {
    let shared_state = Arc::new(SharedState { app });

    Router::new()
        .route("/", get(index))
        .route("/api/status", get(status))
        .route("/api/session", post(create_session))
        .route("/api/search", post(search))
        .route("/api/load_more", post(load_more))
        .route("/api/visualize", post(visualize))
        .route("/api/word_cloud", post(word_cloud))
        .route("/api/rebuild", post(rebuild))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state)
}

async fn start_app(app: Arc<AppContext>, addr: String) -> anyhow::Result<()> {
    // warm the index in the background so the first query is fast
    let warm = app.clone();
    tokio::task::spawn_blocking(move || {
        if let Err(err) = warm.initialize() {
            log::error!("failed to initialize search index: {err}");
        }
    });

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("listening on {addr}");
    axum::serve(listener, router(app))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn start_daemon(app: AppContext, addr: String) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async { start_app(Arc::new(app), addr).await })
}

#[derive(Debug)]
struct HttpError(AppError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            AppError::SessionNotFound => axum::http::StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => axum::http::StatusCode::BAD_REQUEST,
            err if err.is_initialization() => {
                log::error!("{self:?}");
                axum::http::StatusCode::SERVICE_UNAVAILABLE
            }
            _ => {
                log::error!("{self:?}");
                axum::http::StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            json!({"error": self.0.to_string()}).to_string(),
        )
            .into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn status(State(state): State<Arc<SharedState>>) -> Json<AppStatus> {
    Json(state.app.status())
}

async fn create_session(State(state): State<Arc<SharedState>>) -> Json<serde_json::Value> {
    let view = state.app.create_session();
    Json(json!({ "session": view.session }))
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub session: String,
    pub query: String,
    pub page_size: Option<usize>,
}

async fn search(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<SearchRequest>,
) -> Result<Json<SessionView>, HttpError> {
    log::debug!("payload: {payload:?}");
    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        app.search(&payload.session, &payload.query, payload.page_size)
            .map(Json)
            .map_err(Into::into)
    })
}

#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    pub session: String,
}

async fn load_more(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<SessionRequest>,
) -> Result<Json<SessionView>, HttpError> {
    Ok(Json(state.app.load_more(&payload.session)?))
}

#[derive(Debug, Deserialize)]
pub struct VisualizeRequest {
    pub session: Option<String>,
    #[serde(default)]
    pub scope: Scope,
    pub sample_size: Option<usize>,
    pub neighbors: Option<usize>,
    /// Fixed sampling for reproducible layouts
    pub seed: Option<u64>,
}

async fn visualize(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<VisualizeRequest>,
) -> Result<Json<SimilarityGraph>, HttpError> {
    log::debug!("payload: {payload:?}");
    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        app.visualize(
            payload.session.as_deref(),
            payload.scope,
            payload.sample_size,
            payload.neighbors,
            payload.seed,
        )
        .map(Json)
        .map_err(Into::into)
    })
}

#[derive(Debug, Deserialize)]
pub struct WordCloudRequest {
    pub session: Option<String>,
    #[serde(default)]
    pub scope: Scope,
    pub max_words: Option<usize>,
}

async fn word_cloud(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<WordCloudRequest>,
) -> Result<Json<Vec<WordCount>>, HttpError> {
    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        app.word_cloud(payload.session.as_deref(), payload.scope, payload.max_words)
            .map(Json)
            .map_err(Into::into)
    })
}

async fn rebuild(State(state): State<Arc<SharedState>>) -> Result<Json<AppStatus>, HttpError> {
    let app = state.app.clone();

    tokio::task::block_in_place(move || app.rebuild().map(Json).map_err(Into::into))
}
