use std::io::Write;
use std::path::{Path, PathBuf};

pub trait StorageManager: Send + Sync {
    fn write(&self, ident: &str, data: &[u8]) -> std::io::Result<()>;
    fn read(&self, ident: &str) -> std::io::Result<Vec<u8>>;
    fn exists(&self, ident: &str) -> bool;
    fn delete(&self, ident: &str) -> std::io::Result<()>;
}

/// Files kept under a single local directory.
#[derive(Clone, Debug)]
pub struct BackendLocal {
    pub base_dir: PathBuf,
}

impl BackendLocal {
    pub fn new(storage_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;
        Ok(BackendLocal { base_dir: path })
    }

    /// Handle to a directory that may not exist yet.
    pub fn unchecked(storage_dir: impl AsRef<Path>) -> Self {
        BackendLocal {
            base_dir: storage_dir.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self, ident: &str) -> PathBuf {
        self.base_dir.join(ident)
    }

    /// Remove the directory and everything in it. Missing directory is fine.
    pub fn remove_all(&self) -> std::io::Result<()> {
        match std::fs::remove_dir_all(&self.base_dir) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

impl StorageManager for BackendLocal {
    fn exists(&self, ident: &str) -> bool {
        std::fs::metadata(self.path(ident)).is_ok()
    }

    fn read(&self, ident: &str) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.path(ident))
    }

    fn write(&self, ident: &str, data: &[u8]) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base_dir)?;

        // write next to the target so the rename stays on one filesystem
        let mut temp = tempfile::NamedTempFile::new_in(&self.base_dir)?;
        temp.write_all(data)?;
        temp.as_file().sync_all()?;
        temp.persist(self.path(ident)).map_err(|err| err.error)?;
        Ok(())
    }

    fn delete(&self, ident: &str) -> std::io::Result<()> {
        std::fs::remove_file(self.path(ident))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackendLocal::new(dir.path().join("nested")).unwrap();

        assert!(!store.exists("a.json"));
        store.write("a.json", b"{}").unwrap();
        assert!(store.exists("a.json"));
        assert_eq!(store.read("a.json").unwrap(), b"{}");

        store.write("a.json", b"[]").unwrap();
        assert_eq!(store.read("a.json").unwrap(), b"[]");

        store.delete("a.json").unwrap();
        assert!(!store.exists("a.json"));
    }

    #[test]
    fn test_remove_all() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackendLocal::new(dir.path().join("data")).unwrap();
        store.write("x", b"1").unwrap();

        store.remove_all().unwrap();
        assert!(!dir.path().join("data").exists());

        // second removal is a no-op
        store.remove_all().unwrap();
    }
}
