//! Whole-file snapshot persistence.

use crate::error::StoreResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// A JSON snapshot kept in a single file.
///
/// Every [`save`](Self::save) replaces the whole file. Readers never observe
/// a partially written snapshot.
///
/// # Durability
///
/// - The snapshot is written to a sibling temporary file
/// - The temporary file is synced with `File::sync_all()`
/// - It is then renamed over the target, which is atomic on the same volume
///
/// # Example
///
/// ```no_run
/// use ledger_store::SnapshotFile;
/// use std::path::Path;
///
/// let file = SnapshotFile::open_with_create_dirs(Path::new("data/ledger.json")).unwrap();
/// file.save(&vec![1, 2, 3]).unwrap();
/// let back: Option<Vec<i32>> = file.load().unwrap();
/// assert_eq!(back, Some(vec![1, 2, 3]));
/// ```
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    /// Binds a snapshot file at the given path. The file need not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the path exists but is not a regular file.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if path.exists() && !path.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a file", path.display()),
            )
            .into());
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Binds a snapshot file, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created.
    pub fn open_with_create_dirs(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Self::open(path)
    }

    /// Returns the path to the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the snapshot, or `None` if nothing was saved yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not decode.
    pub fn load<T: DeserializeOwned>(&self) -> StoreResult<Option<T>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Atomically replaces the snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding, writing, syncing or renaming fails. The
    /// previous snapshot is left intact on failure.
    pub fn save<T: Serialize>(&self, value: &T) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        let temp = self.temp_path();
        let result = Self::write_synced(&temp, &bytes).and_then(|()| fs::rename(&temp, &self.path));
        if result.is_err() {
            let _ = fs::remove_file(&temp);
        }
        Ok(result?)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("snapshot"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut file: File = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.write_all(bytes)?;
        file.sync_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{Cell, Cells};
    use crate::memory::MemoryStore;
    use crate::{RecordStore, Table};
    use tempfile::tempdir;

    #[test]
    fn missing_file_loads_none() {
        let dir = tempdir().unwrap();
        let file = SnapshotFile::open(&dir.path().join("absent.json")).unwrap();
        let loaded: Option<MemoryStore> = file.load().unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let file = SnapshotFile::open(&dir.path().join("ledger.json")).unwrap();

        let mut store = MemoryStore::new();
        let mut cells = Cells::new();
        cells.insert("caption".into(), Cell::from("Food"));
        store.insert(Table::Categories, 1, &cells).unwrap();

        file.save(&store).unwrap();
        let loaded: MemoryStore = file.load().unwrap().unwrap();
        assert_eq!(loaded, store);
        assert!(!file.temp_path().exists());
    }

    #[test]
    fn save_replaces_previous_snapshot() {
        let dir = tempdir().unwrap();
        let file = SnapshotFile::open(&dir.path().join("ledger.json")).unwrap();
        file.save(&1_u64).unwrap();
        file.save(&2_u64).unwrap();
        assert_eq!(file.load::<u64>().unwrap(), Some(2));
    }

    #[test]
    fn creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("ledger.json");
        let file = SnapshotFile::open_with_create_dirs(&path).unwrap();
        file.save(&"x").unwrap();
        assert!(path.exists());
        assert_eq!(file.path(), path.as_path());
    }

    #[test]
    fn directory_is_rejected() {
        let dir = tempdir().unwrap();
        assert!(SnapshotFile::open(dir.path()).is_err());
    }

    #[test]
    fn corrupt_snapshot_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        fs::write(&path, b"{not json").unwrap();
        let file = SnapshotFile::open(&path).unwrap();
        assert!(file.load::<MemoryStore>().is_err());
    }
}
