//! Locating the Firefox profile that holds the user's bookmarks.
//!
//! - `platform`: per-OS Firefox directory
//! - `manifest`: `profiles.ini` default profile lookup
//! - `snapshot`: safe copies of a database the browser may hold open

mod manifest;
mod platform;
mod snapshot;

use std::path::{Path, PathBuf};

use rusqlite::OptionalExtension;

use crate::config::{ProfileConfig, SnapshotMethod};

pub use manifest::read_manifest;
pub use platform::browser_base_dir;
pub use snapshot::{snapshot, Snapshot};

/// Bookmark database file name inside a profile
pub const PLACES_DB: &str = "places.sqlite";

#[derive(Debug, thiserror::Error)]
pub enum LocateError {
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Firefox profiles directory not found under {0}")]
    ProfilesDirNotFound(PathBuf),

    #[error("no valid Firefox profile with bookmarks found")]
    ProfileNotFound,

    #[error("bookmark database not found at {0}")]
    DatabaseMissing(PathBuf),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Finds the active profile and snapshots its bookmark database.
#[derive(Clone, Debug)]
pub struct ProfileLocator {
    config: ProfileConfig,
}

impl ProfileLocator {
    pub fn new(config: ProfileConfig) -> Self {
        Self { config }
    }

    pub fn base_dir(&self) -> Result<PathBuf, LocateError> {
        match &self.config.browser_dir {
            Some(dir) => Ok(dir.clone()),
            None => browser_base_dir(),
        }
    }

    /// Profile directory to read bookmarks from.
    ///
    /// Order: configured profile, manifest default, largest valid database.
    pub fn locate(&self) -> Result<PathBuf, LocateError> {
        if let Some(profile) = &self.config.profile_path {
            return Ok(profile.clone());
        }

        let base = self.base_dir()?;

        if let Some(profile) = read_manifest(&base) {
            if profile.join(PLACES_DB).is_file() {
                log::info!("using default profile from manifest: {}", profile.display());
                return Ok(profile);
            }
            log::warn!(
                "manifest default profile {} has no {PLACES_DB}, scanning profiles",
                profile.display()
            );
        }

        scan_profiles(&base, self.config.min_db_size)
    }

    /// Locate the profile and take a snapshot of its database.
    pub fn snapshot(&self) -> Result<Snapshot, LocateError> {
        let profile = self.locate()?;
        snapshot(&profile, self.config.snapshot_method)
    }
}

/// Pick the profile with the largest `places.sqlite` that has a
/// `moz_bookmarks` table and is at least `min_db_size` bytes.
pub fn scan_profiles(base: &Path, min_db_size: u64) -> Result<PathBuf, LocateError> {
    // Windows and macOS keep profiles in Profiles/, Linux directly in base
    let roots: Vec<PathBuf> = [base.join("Profiles"), base.to_path_buf()]
        .into_iter()
        .filter(|root| root.is_dir())
        .collect();

    if roots.is_empty() {
        return Err(LocateError::ProfilesDirNotFound(base.to_path_buf()));
    }

    let mut best: Option<(PathBuf, u64)> = None;

    for root in roots {
        for entry in std::fs::read_dir(&root)?.filter_map(|entry| entry.ok()) {
            let profile = entry.path();
            let places = profile.join(PLACES_DB);

            let size = match std::fs::metadata(&places) {
                Ok(meta) if meta.is_file() => meta.len(),
                _ => continue,
            };

            if size < min_db_size {
                log::debug!("skipping {}: {size} bytes", places.display());
                continue;
            }

            if !has_bookmarks_table(&profile) {
                log::debug!("skipping {}: no moz_bookmarks table", places.display());
                continue;
            }

            if best.as_ref().map_or(true, |(_, best_size)| size > *best_size) {
                best = Some((profile, size));
            }
        }
    }

    best.map(|(profile, _)| profile)
        .ok_or(LocateError::ProfileNotFound)
}

/// A locked database is checked through a plain copy.
fn has_bookmarks_table(profile: &Path) -> bool {
    let places = profile.join(PLACES_DB);
    match schema_has_bookmarks(&places) {
        Ok(found) => found,
        Err(err) if snapshot::is_busy(&err) => {
            log::debug!("{} is locked, checking a copy", places.display());
            match snapshot(profile, SnapshotMethod::Copy) {
                Ok(copy) => schema_has_bookmarks(copy.path()).unwrap_or(false),
                Err(err) => {
                    log::warn!("could not copy locked {}: {err}", places.display());
                    false
                }
            }
        }
        Err(err) => {
            log::debug!("cannot read {}: {err}", places.display());
            false
        }
    }
}

fn schema_has_bookmarks(places: &Path) -> rusqlite::Result<bool> {
    let conn = snapshot::open_read_only(places)?;
    let name: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type='table' AND name='moz_bookmarks'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(name.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    /// Creates `<root>/<name>/places.sqlite` padded with `rows` blobs.
    fn make_profile(root: &Path, name: &str, with_bookmarks: bool, rows: usize) -> PathBuf {
        let profile = root.join(name);
        std::fs::create_dir_all(&profile).unwrap();
        let conn = Connection::open(profile.join(PLACES_DB)).unwrap();
        if with_bookmarks {
            conn.execute_batch(
                "CREATE TABLE moz_bookmarks (id INTEGER PRIMARY KEY, fk INTEGER, title TEXT);",
            )
            .unwrap();
        }
        conn.execute_batch("CREATE TABLE padding (data BLOB);").unwrap();
        for _ in 0..rows {
            conn.execute("INSERT INTO padding (data) VALUES (zeroblob(4096))", [])
                .unwrap();
        }
        profile
    }

    #[test]
    fn test_scan_picks_largest_valid_profile() {
        let base = tempfile::tempdir().unwrap();
        let profiles = base.path().join("Profiles");

        make_profile(&profiles, "small.default", true, 40);
        let large = make_profile(&profiles, "large.default", true, 80);
        // biggest file but not a bookmarks database
        make_profile(&profiles, "other.default", false, 160);

        let found = scan_profiles(base.path(), 100 * 1024).unwrap();
        assert_eq!(found, large);
    }

    #[test]
    fn test_scan_skips_small_databases() {
        let base = tempfile::tempdir().unwrap();
        make_profile(base.path(), "tiny.default", true, 1);

        let result = scan_profiles(base.path(), 100 * 1024);
        assert!(matches!(result, Err(LocateError::ProfileNotFound)));
    }

    #[test]
    fn test_scan_linux_layout() {
        let base = tempfile::tempdir().unwrap();
        let profile = make_profile(base.path(), "abcd.default-release", true, 40);

        assert_eq!(scan_profiles(base.path(), 100 * 1024).unwrap(), profile);
    }

    #[test]
    fn test_scan_ignores_corrupt_database() {
        let base = tempfile::tempdir().unwrap();
        let profile = base.path().join("Profiles").join("junk");
        std::fs::create_dir_all(&profile).unwrap();
        std::fs::write(profile.join(PLACES_DB), vec![7u8; 200 * 1024]).unwrap();

        let result = scan_profiles(base.path(), 100 * 1024);
        assert!(matches!(result, Err(LocateError::ProfileNotFound)));
    }

    #[test]
    fn test_scan_accepts_locked_database() {
        let base = tempfile::tempdir().unwrap();
        let profile = make_profile(base.path(), "busy.default-release", true, 40);

        let browser = Connection::open(profile.join(PLACES_DB)).unwrap();
        let mode: String = browser
            .query_row("PRAGMA locking_mode=EXCLUSIVE", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "exclusive");
        browser
            .execute("INSERT INTO padding (data) VALUES (zeroblob(16))", [])
            .unwrap();

        assert_eq!(scan_profiles(base.path(), 100 * 1024).unwrap(), profile);
        drop(browser);
    }

    #[test]
    fn test_missing_profiles_dir() {
        let base = tempfile::tempdir().unwrap();
        let result = scan_profiles(&base.path().join("nope"), 0);
        assert!(matches!(result, Err(LocateError::ProfilesDirNotFound(_))));
    }

    #[test]
    fn test_locate_prefers_manifest_default() {
        let base = tempfile::tempdir().unwrap();
        let profiles = base.path().join("Profiles");
        let chosen = make_profile(&profiles, "chosen", true, 1);
        make_profile(&profiles, "bigger", true, 80);
        std::fs::write(
            base.path().join("profiles.ini"),
            "[Profile0]\nName=chosen\nIsRelative=1\nPath=Profiles/chosen\nDefault=1\n",
        )
        .unwrap();

        let locator = ProfileLocator::new(ProfileConfig {
            browser_dir: Some(base.path().to_path_buf()),
            ..Default::default()
        });
        assert_eq!(locator.locate().unwrap(), chosen);
    }

    #[test]
    fn test_locate_falls_back_to_scan() {
        let base = tempfile::tempdir().unwrap();
        let profiles = base.path().join("Profiles");
        let bigger = make_profile(&profiles, "bigger", true, 40);
        std::fs::write(
            base.path().join("profiles.ini"),
            "[Profile0]\nName=gone\nIsRelative=1\nPath=Profiles/gone\nDefault=1\n",
        )
        .unwrap();

        let locator = ProfileLocator::new(ProfileConfig {
            browser_dir: Some(base.path().to_path_buf()),
            ..Default::default()
        });
        assert_eq!(locator.locate().unwrap(), bigger);
    }

    #[test]
    fn test_configured_profile_wins() {
        let locator = ProfileLocator::new(ProfileConfig {
            profile_path: Some(PathBuf::from("/somewhere/profile")),
            ..Default::default()
        });
        assert_eq!(locator.locate().unwrap(), PathBuf::from("/somewhere/profile"));
    }
}
