//! Embedding model wrapper for fastembed.
//!
//! Provides a high-level interface for generating embeddings:
//! - `Embedder` trait used by the index builder and query path
//! - Lazy model loading with configurable cache directory
//! - Batch embedding generation

use fastembed::{InitOptions, TextEmbedding};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default download timeout for model files (5 minutes)
const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),
}

/// Turns text into fixed-length vectors. `embed_batch` output is positional:
/// `result[i]` belongs to `texts[i]`.
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_batch(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding returned".to_string()))
    }

    /// SHA256 of the model name, stored in the index header.
    fn model_id_hash(&self) -> [u8; 32] {
        model_id_hash(self.name())
    }
}

pub fn model_id_hash(name: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.finalize().into()
}

/// Wrapper around fastembed's TextEmbedding model.
/// Uses a Mutex because fastembed's embed() requires &mut self.
pub struct EmbeddingModel {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

impl EmbeddingModel {
    /// Create a new embedding model with the given name.
    ///
    /// The model will be downloaded on first use if not cached.
    ///
    /// # Arguments
    /// * `model_name` - Name of the model (e.g., "all-MiniLM-L6-v2")
    /// * `models_dir` - Directory to cache downloaded models
    pub fn new(model_name: &str, models_dir: PathBuf) -> Result<Self, EmbeddingError> {
        let model_enum = Self::parse_model_name(model_name)?;

        std::fs::create_dir_all(&models_dir).map_err(|e| {
            EmbeddingError::InitFailed(format!("Failed to create models directory: {}", e))
        })?;

        let options = InitOptions::new(model_enum)
            .with_cache_dir(models_dir)
            .with_show_download_progress(true);

        let mut model = TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        // Get model dimensions by embedding a test string
        let dimensions = Self::probe_dimensions(&mut model)?;

        Ok(Self {
            model: Mutex::new(model),
            model_name: model_name.to_string(),
            dimensions,
        })
    }

    /// Get the embedding dimensions for this model
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Parse model name string to fastembed enum.
    fn parse_model_name(
        name: &str,
    ) -> Result<fastembed::EmbeddingModel, EmbeddingError> {
        match name.to_lowercase().as_str() {
            "all-minilm-l6-v2" | "allminiml6v2" => {
                Ok(fastembed::EmbeddingModel::AllMiniLML6V2)
            }
            "all-minilm-l6-v2-q" | "allminiml6v2q" => {
                Ok(fastembed::EmbeddingModel::AllMiniLML6V2Q)
            }
            "bge-small-en-v1.5" | "bgesmallenv15" => {
                Ok(fastembed::EmbeddingModel::BGESmallENV15)
            }
            "bge-small-en-v1.5-q" | "bgesmallenv15q" => {
                Ok(fastembed::EmbeddingModel::BGESmallENV15Q)
            }
            "bge-base-en-v1.5" | "bgebaseenv15" => {
                Ok(fastembed::EmbeddingModel::BGEBaseENV15)
            }
            "bge-base-en-v1.5-q" | "bgebaseenv15q" => {
                Ok(fastembed::EmbeddingModel::BGEBaseENV15Q)
            }
            "bge-large-en-v1.5" | "bgelargeenv15" => {
                Ok(fastembed::EmbeddingModel::BGELargeENV15)
            }
            "bge-large-en-v1.5-q" | "bgelargeenv15q" => {
                Ok(fastembed::EmbeddingModel::BGELargeENV15Q)
            }
            _ => Err(EmbeddingError::InvalidModel(format!(
                "Unknown model: {}. Supported models: all-MiniLM-L6-v2, bge-small-en-v1.5, \
                 bge-base-en-v1.5, bge-large-en-v1.5 (add -q suffix for quantized)",
                name
            ))),
        }
    }

    /// Probe the model to determine embedding dimensions.
    fn probe_dimensions(model: &mut TextEmbedding) -> Result<usize, EmbeddingError> {
        let test_embeddings = model
            .embed(vec!["test"], None)
            .map_err(|e| EmbeddingError::InitFailed(format!("Failed to probe dimensions: {}", e)))?;

        test_embeddings
            .first()
            .map(|v| v.len())
            .ok_or_else(|| EmbeddingError::InitFailed("Model returned no embedding".to_string()))
    }
}

impl Embedder for EmbeddingModel {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut model = self.model.lock().map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))
    }
}

type Loader = fn(&str, PathBuf) -> Result<EmbeddingModel, EmbeddingError>;
type PendingLoad = Receiver<Result<EmbeddingModel, EmbeddingError>>;

enum LoadState {
    Idle,
    /// A loader thread outlived its caller's timeout
    Loading(PendingLoad),
    Ready(Arc<EmbeddingModel>),
}

/// Defers model download and initialization until the first embed call.
///
/// Serving a warm index only needs the model once a query arrives. At most
/// one load runs at a time; a call after a timeout waits on the same load.
pub struct LazyEmbeddingModel {
    model_name: String,
    models_dir: PathBuf,
    download_timeout: Duration,
    loader: Loader,
    state: Mutex<LoadState>,
}

impl LazyEmbeddingModel {
    pub fn new(model_name: &str, models_dir: PathBuf, download_timeout: Option<Duration>) -> Self {
        Self {
            model_name: model_name.to_string(),
            models_dir,
            download_timeout: download_timeout.unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT),
            loader: EmbeddingModel::new,
            state: Mutex::new(LoadState::Idle),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.state
            .lock()
            .map(|state| matches!(*state, LoadState::Ready(_)))
            .unwrap_or(false)
    }

    fn get(&self) -> Result<Arc<EmbeddingModel>, EmbeddingError> {
        let mut state = self.state.lock().map_err(|e| {
            EmbeddingError::InitFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        let pending = match std::mem::replace(&mut *state, LoadState::Idle) {
            LoadState::Ready(model) => {
                *state = LoadState::Ready(model.clone());
                return Ok(model);
            }
            LoadState::Loading(pending) => {
                log::info!("still waiting for embedding model '{}'", self.model_name);
                pending
            }
            LoadState::Idle => self.spawn_load(),
        };

        match pending.recv_timeout(self.download_timeout) {
            Ok(result) => {
                let model = Arc::new(result?);
                log::info!("embedding model ready, {} dimensions", model.dimensions());
                *state = LoadState::Ready(model.clone());
                Ok(model)
            }
            Err(RecvTimeoutError::Timeout) => {
                *state = LoadState::Loading(pending);
                Err(EmbeddingError::InitFailed(format!(
                    "model '{}' was not ready after {}s",
                    self.model_name,
                    self.download_timeout.as_secs()
                )))
            }
            Err(RecvTimeoutError::Disconnected) => Err(EmbeddingError::InitFailed(format!(
                "loading model '{}' stopped unexpectedly",
                self.model_name
            ))),
        }
    }

    fn spawn_load(&self) -> PendingLoad {
        log::info!(
            "loading embedding model '{}' (download timeout {}s)",
            self.model_name,
            self.download_timeout.as_secs()
        );
        let (tx, rx) = mpsc::channel();
        let (name, dir, loader) = (self.model_name.clone(), self.models_dir.clone(), self.loader);
        std::thread::spawn(move || {
            // the receiver is dropped if nobody waits anymore
            let _ = tx.send(loader(&name, dir));
        });
        rx
    }
}

impl Embedder for LazyEmbeddingModel {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        self.get()?.embed_batch(texts)
    }
}
