//! Semantic search over bookmark titles.
//!
//! Titles are embedded locally with fastembed-rs and searched with an
//! exhaustive L2 index.
//!
//! # Architecture
//!
//! - `embeddings`: Wraps fastembed for embedding generation
//! - `index`: Flat vector index with squared-L2 search
//! - `catalog`: Index plus the titles/urls it was built from
//! - `storage`: index.bin / meta.json persistence
//! - `preprocess`: Text preprocessing for embedding input
//! - `service`: Cached catalog with load, build, search and invalidate

pub mod catalog;
pub mod embeddings;
pub mod index;
pub mod preprocess;
pub mod service;
pub mod storage;

pub use catalog::{Catalog, SearchHit};
pub use embeddings::{Embedder, EmbeddingModel, LazyEmbeddingModel};
pub use service::{SemanticSearchError, SemanticSearchService, ServiceStatus};
pub use storage::CatalogStore;

/// Default embedding model name
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";
