use std::path::Path;

use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::profile::{LocateError, ProfileLocator};

const BOOKMARKS_QUERY: &str = "
    SELECT moz_bookmarks.id, moz_bookmarks.title, moz_places.url
    FROM moz_bookmarks
    JOIN moz_places ON moz_bookmarks.fk = moz_places.id
    WHERE moz_bookmarks.title IS NOT NULL
    ORDER BY moz_bookmarks.id
";

/// A bookmark as stored by the browser. Never written back.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: i64,
    pub title: String,
    pub url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("failed to open bookmark database: {0}")]
    Open(rusqlite::Error),

    #[error("failed to read bookmarks: {0}")]
    SchemaQuery(rusqlite::Error),
}

/// Read every titled bookmark from a places.sqlite snapshot.
pub fn extract_bookmarks(path: &Path) -> Result<Vec<Bookmark>, ExtractError> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(ExtractError::Open)?;

    let mut stmt = conn
        .prepare(BOOKMARKS_QUERY)
        .map_err(ExtractError::SchemaQuery)?;

    let rows = stmt
        .query_map([], |row| {
            Ok(Bookmark {
                id: row.get(0)?,
                title: row.get(1)?,
                url: row.get(2)?,
            })
        })
        .map_err(ExtractError::SchemaQuery)?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(ExtractError::SchemaQuery)
}

/// SHA-256 over ids, titles and urls in order. Changes whenever the
/// bookmark set does.
pub fn fingerprint(bookmarks: &[Bookmark]) -> String {
    let mut hasher = Sha256::new();
    for bmark in bookmarks {
        hasher.update(bmark.id.to_le_bytes());
        hasher.update(bmark.title.as_bytes());
        hasher.update([0u8]);
        hasher.update(bmark.url.as_bytes());
        hasher.update([0u8]);
    }
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error(transparent)]
    Locate(#[from] LocateError),

    #[error(transparent)]
    Extract(#[from] ExtractError),
}

/// Anything that can hand over the current bookmark list.
pub trait BookmarkSource: Send + Sync {
    fn load(&self) -> Result<Vec<Bookmark>, SourceError>;
}

/// Bookmarks of the local Firefox profile, read through a snapshot.
pub struct BrowserSource {
    locator: ProfileLocator,
}

impl BrowserSource {
    pub fn new(locator: ProfileLocator) -> Self {
        Self { locator }
    }
}

impl BookmarkSource for BrowserSource {
    fn load(&self) -> Result<Vec<Bookmark>, SourceError> {
        let snapshot = self.locator.snapshot()?;
        let bookmarks = extract_bookmarks(snapshot.path())?;
        log::info!("read {} bookmarks from browser profile", bookmarks.len());
        Ok(bookmarks)
    }
}
