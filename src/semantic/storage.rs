//! On-disk persistence of the search catalog.
//!
//! The data directory holds two files; both must be present for a warm start.
//!
//! `index.bin`, header (47 bytes):
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA256 hash of model name)
//! - dimensions: u16 (little-endian)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Entries (repeated, in title order):
//! - content_hash: u64 (little-endian)
//! - embedding: [f32; dimensions] (little-endian)
//!
//! `meta.json`: model name, source fingerprint, build time, ids, titles, urls.

use std::io::{Read, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::semantic::catalog::Catalog;
use crate::semantic::index::FlatIndex;
use crate::storage::{BackendLocal, StorageManager};

pub const INDEX_FILE: &str = "index.bin";
pub const META_FILE: &str = "meta.json";

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: version(1) + model_id(32) + dimensions(2) + entry_count(8) + checksum(4)
const HEADER_SIZE: usize = 47;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum VectorStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Model mismatch: file uses different model")]
    ModelMismatch,

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Length mismatch: {vectors} vectors, {titles} titles, {urls} urls, {ids} ids")]
    LengthMismatch {
        vectors: usize,
        titles: usize,
        urls: usize,
        ids: usize,
    },

    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}

impl VectorStorageError {
    /// Whether the files exist but cannot be used. Such a cache is rebuilt.
    pub fn is_unusable_cache(&self) -> bool {
        !matches!(self, VectorStorageError::Io(_))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CatalogMeta {
    version: u8,
    model: String,
    fingerprint: Option<String>,
    built_at: DateTime<Utc>,
    ids: Vec<i64>,
    titles: Vec<String>,
    urls: Vec<String>,
}

/// Reads and writes the catalog files under one data directory.
pub struct CatalogStore {
    store: BackendLocal,
}

impl CatalogStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            store: BackendLocal::unchecked(data_dir),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.store.base_dir
    }

    /// True when every file of a persisted catalog is present.
    pub fn exists(&self) -> bool {
        self.store.exists(INDEX_FILE) && self.store.exists(META_FILE)
    }

    /// Load the catalog, checking it was built with `expected_model_id` and
    /// that all parts agree in length.
    pub fn load(&self, expected_model_id: &[u8; 32]) -> Result<Catalog, VectorStorageError> {
        let meta: CatalogMeta = serde_json::from_slice(&self.store.read(META_FILE)?)?;
        if meta.version > FORMAT_VERSION {
            return Err(VectorStorageError::VersionMismatch(meta.version, FORMAT_VERSION));
        }

        let bytes = self.store.read(INDEX_FILE)?;
        let index = read_index(&mut bytes.as_slice(), expected_model_id)?;

        if index.len() != meta.titles.len()
            || index.len() != meta.urls.len()
            || index.len() != meta.ids.len()
        {
            return Err(VectorStorageError::LengthMismatch {
                vectors: index.len(),
                titles: meta.titles.len(),
                urls: meta.urls.len(),
                ids: meta.ids.len(),
            });
        }

        Ok(Catalog {
            index,
            ids: meta.ids,
            titles: meta.titles,
            urls: meta.urls,
            fingerprint: meta.fingerprint,
            built_at: meta.built_at,
        })
    }

    /// Persist the catalog. Each file is replaced atomically; the index is
    /// written first so a crash never leaves metadata for a missing index.
    pub fn save(
        &self,
        catalog: &Catalog,
        model_name: &str,
        model_id: &[u8; 32],
    ) -> Result<(), VectorStorageError> {
        let mut buf = Vec::with_capacity(
            HEADER_SIZE + catalog.index.len() * (8 + 4 * catalog.index.dimensions()),
        );
        write_index(&mut buf, &catalog.index, model_id)?;
        self.store.write(INDEX_FILE, &buf)?;

        let meta = CatalogMeta {
            version: FORMAT_VERSION,
            model: model_name.to_string(),
            fingerprint: catalog.fingerprint.clone(),
            built_at: catalog.built_at,
            ids: catalog.ids.clone(),
            titles: catalog.titles.clone(),
            urls: catalog.urls.clone(),
        };
        self.store.write(META_FILE, &serde_json::to_vec(&meta)?)?;

        Ok(())
    }

    /// Delete the whole data directory.
    pub fn delete(&self) -> Result<(), VectorStorageError> {
        self.store.remove_all()?;
        Ok(())
    }
}

fn write_index(
    writer: &mut impl Write,
    index: &FlatIndex,
    model_id: &[u8; 32],
) -> Result<(), VectorStorageError> {
    let dimensions = u16::try_from(index.dimensions()).map_err(|_| {
        VectorStorageError::InvalidFormat(format!(
            "{} dimensions do not fit the header",
            index.dimensions()
        ))
    })?;

    let mut header_bytes = [0u8; HEADER_SIZE];
    header_bytes[0] = FORMAT_VERSION;
    header_bytes[1..33].copy_from_slice(model_id);
    header_bytes[33..35].copy_from_slice(&dimensions.to_le_bytes());
    header_bytes[35..43].copy_from_slice(&(index.len() as u64).to_le_bytes());

    // Compute and store checksum
    let checksum = crc32fast::hash(&header_bytes[0..43]);
    header_bytes[43..47].copy_from_slice(&checksum.to_le_bytes());

    writer.write_all(&header_bytes)?;

    for (content_hash, embedding) in index.iter() {
        writer.write_all(&content_hash.to_le_bytes())?;
        for &value in embedding {
            writer.write_all(&value.to_le_bytes())?;
        }
    }

    Ok(())
}

fn read_index(
    reader: &mut impl Read,
    expected_model_id: &[u8; 32],
) -> Result<FlatIndex, VectorStorageError> {
    let mut header_bytes = [0u8; HEADER_SIZE];
    reader
        .read_exact(&mut header_bytes)
        .map_err(|_| VectorStorageError::InvalidFormat("truncated header".to_string()))?;

    let version = header_bytes[0];

    // Version check first
    if version > FORMAT_VERSION {
        return Err(VectorStorageError::VersionMismatch(version, FORMAT_VERSION));
    }

    // Verify checksum (computed over header without checksum field)
    let mut checksum_bytes = [0u8; 4];
    checksum_bytes.copy_from_slice(&header_bytes[43..47]);
    if u32::from_le_bytes(checksum_bytes) != crc32fast::hash(&header_bytes[0..43]) {
        return Err(VectorStorageError::ChecksumMismatch);
    }

    if header_bytes[1..33] != expected_model_id[..] {
        return Err(VectorStorageError::ModelMismatch);
    }

    let dimensions = u16::from_le_bytes([header_bytes[33], header_bytes[34]]) as usize;
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&header_bytes[35..43]);
    let entry_count = u64::from_le_bytes(count_bytes) as usize;

    if entry_count > 0 && dimensions == 0 {
        return Err(VectorStorageError::InvalidFormat(
            "entries without dimensions".to_string(),
        ));
    }

    let mut index = FlatIndex::with_capacity(dimensions, entry_count);
    let mut embedding = vec![0f32; dimensions];

    for _ in 0..entry_count {
        let mut hash_bytes = [0u8; 8];
        reader
            .read_exact(&mut hash_bytes)
            .map_err(|_| VectorStorageError::InvalidFormat("truncated entry".to_string()))?;

        for value in embedding.iter_mut() {
            let mut float_bytes = [0u8; 4];
            reader
                .read_exact(&mut float_bytes)
                .map_err(|_| VectorStorageError::InvalidFormat("truncated entry".to_string()))?;
            *value = f32::from_le_bytes(float_bytes);
        }

        index
            .add(u64::from_le_bytes(hash_bytes), &embedding)
            .map_err(|e| VectorStorageError::InvalidFormat(e.to_string()))?;
    }

    Ok(index)
}
