//! Read-consistent copies of a live places.sqlite.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, DatabaseName, ErrorCode, OpenFlags};
use tempfile::TempDir;

use super::{LocateError, PLACES_DB};
use crate::config::SnapshotMethod;

/// How long a reader waits for the browser to release its lock
const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

/// A copy of the bookmark database inside its own temporary directory.
/// The directory is removed when the snapshot is dropped.
#[derive(Debug)]
pub struct Snapshot {
    _dir: TempDir,
    path: PathBuf,
}

impl Snapshot {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Copy `<profile>/places.sqlite` into a fresh temporary directory.
pub fn snapshot(profile: &Path, method: SnapshotMethod) -> Result<Snapshot, LocateError> {
    let source = profile.join(PLACES_DB);
    if !source.is_file() {
        return Err(LocateError::DatabaseMissing(source));
    }

    let dir = tempfile::Builder::new().prefix("bmsearch-").tempdir()?;
    let target = dir.path().join(PLACES_DB);

    match method {
        SnapshotMethod::Backup => match backup_copy(&source, &target) {
            Err(LocateError::Sqlite(err)) if is_busy(&err) => {
                log::warn!("{} is locked ({err}), copying the file instead", source.display());
                // backup leaves an empty target behind
                if target.exists() {
                    std::fs::remove_file(&target)?;
                }
                plain_copy(&source, &target)?
            }
            result => result?,
        },
        SnapshotMethod::Copy => plain_copy(&source, &target)?,
    }

    log::debug!("snapshot of {} taken at {}", source.display(), target.display());

    Ok(Snapshot { _dir: dir, path: target })
}

/// Read-only connection that gives up quickly on a locked database.
pub(super) fn open_read_only(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

/// The browser holds a lock that keeps readers out.
pub(super) fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn backup_copy(source: &Path, target: &Path) -> Result<(), LocateError> {
    let src = open_read_only(source)?;
    src.backup(DatabaseName::Main, target, None)?;
    Ok(())
}

fn plain_copy(source: &Path, target: &Path) -> Result<(), LocateError> {
    std::fs::copy(source, target)?;

    // uncheckpointed pages live in the WAL; sqlite replays it on open
    let wal = wal_path(source);
    if wal.is_file() {
        std::fs::copy(&wal, wal_path(target))?;
    }
    Ok(())
}

fn wal_path(db: &Path) -> PathBuf {
    let mut name = db.as_os_str().to_os_string();
    name.push("-wal");
    PathBuf::from(name)
}
