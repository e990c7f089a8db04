//! The searchable bookmark set: titles, urls and their embeddings.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::bookmarks::{fingerprint, Bookmark};
use crate::semantic::embeddings::{EmbeddingError, Embedder};
use crate::semantic::index::{FlatIndex, IndexError, Neighbor};
use crate::semantic::preprocess::{content_hash, preprocess_title};

/// Index plus the bookmark columns it was built from.
/// Row `i` of `index` was embedded from `titles[i]`.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub index: FlatIndex,
    pub ids: Vec<i64>,
    pub titles: Vec<String>,
    pub urls: Vec<String>,
    /// Fingerprint of the bookmark list this catalog was built from
    pub fingerprint: Option<String>,
    pub built_at: DateTime<Utc>,
}

/// One query result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub position: usize,
    pub id: i64,
    pub title: String,
    pub url: String,
    pub distance: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub total: usize,
    pub embedded: usize,
    pub reused: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("embedder returned {got} vectors for {expected} titles")]
    BatchSize { expected: usize, got: usize },
}

impl Catalog {
    pub fn empty() -> Self {
        Self {
            index: FlatIndex::new(0),
            ids: vec![],
            titles: vec![],
            urls: vec![],
            fingerprint: Some(fingerprint(&[])),
            built_at: Utc::now(),
        }
    }

    /// Embed `bookmarks` and index them in order.
    ///
    /// Titles whose content hash already has a vector in `previous` reuse
    /// it; everything else is embedded in a single batch.
    pub fn build(
        bookmarks: &[Bookmark],
        embedder: &dyn Embedder,
        previous: Option<&Catalog>,
    ) -> Result<(Self, BuildStats), BuildError> {
        let hashes: Vec<u64> = bookmarks.iter().map(|b| content_hash(&b.title)).collect();

        let reusable: HashMap<u64, &[f32]> = previous
            .map(|catalog| catalog.index.iter().collect())
            .unwrap_or_default();

        // each distinct missing text is embedded once
        let mut batch_slot: HashMap<u64, usize> = HashMap::new();
        let mut texts: Vec<String> = Vec::new();
        for (bmark, hash) in bookmarks.iter().zip(&hashes) {
            if reusable.contains_key(hash) || batch_slot.contains_key(hash) {
                continue;
            }
            batch_slot.insert(*hash, texts.len());
            texts.push(preprocess_title(&bmark.title));
        }

        let fresh = if texts.is_empty() {
            vec![]
        } else {
            embedder.embed_batch(&texts)?
        };
        if fresh.len() != texts.len() {
            return Err(BuildError::BatchSize {
                expected: texts.len(),
                got: fresh.len(),
            });
        }

        let dimensions = fresh
            .first()
            .map(Vec::len)
            .or_else(|| reusable.values().next().map(|v| v.len()))
            .unwrap_or(0);

        let mut index = FlatIndex::with_capacity(dimensions, bookmarks.len());
        let mut reused = 0;
        for hash in &hashes {
            match reusable.get(hash) {
                Some(vector) => {
                    reused += 1;
                    index.add(*hash, vector)?;
                }
                None => index.add(*hash, &fresh[batch_slot[hash]])?,
            }
        }

        let stats = BuildStats {
            total: bookmarks.len(),
            embedded: texts.len(),
            reused,
        };

        let catalog = Self {
            index,
            ids: bookmarks.iter().map(|b| b.id).collect(),
            titles: bookmarks.iter().map(|b| b.title.clone()).collect(),
            urls: bookmarks.iter().map(|b| b.url.clone()).collect(),
            fingerprint: Some(fingerprint(bookmarks)),
            built_at: Utc::now(),
        };

        Ok((catalog, stats))
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }

    pub fn hit(&self, neighbor: Neighbor) -> SearchHit {
        SearchHit {
            position: neighbor.position,
            id: self.ids[neighbor.position],
            title: self.titles[neighbor.position].clone(),
            url: self.urls[neighbor.position].clone(),
            distance: neighbor.distance,
        }
    }

    /// Nearest `k` titles to an already embedded query.
    pub fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        Ok(self
            .index
            .search(query, k)?
            .into_iter()
            .map(|neighbor| self.hit(neighbor))
            .collect())
    }
}
