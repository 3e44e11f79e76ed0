//! Storage port: named byte blobs

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::trace;

/// Storage port failure
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No blob exists under the given name
    #[error("File not found: {0}")]
    NotFound(String),

    /// Underlying I/O failure
    #[error("Storage I/O error on '{path}': {source}")]
    Io {
        /// Path the operation was addressing
        path: String,
        /// Originating error
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    /// Classify an I/O error, keeping not-found distinct
    pub fn from_io(path: impl Into<String>, err: io::Error) -> Self {
        let path = path.into();
        if err.kind() == io::ErrorKind::NotFound {
            Self::NotFound(path)
        } else {
            Self::Io { path, source: err }
        }
    }

    /// Whether the blob was missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result of [`FileSystem::stat`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatResult {
    /// Whether anything exists at the path
    pub exists: bool,
    /// Whether the path is a directory
    pub is_directory: bool,
    /// Whether the path is a regular file
    pub is_file: bool,
    /// Last modification time in milliseconds since the Unix epoch
    pub last_modified: i64,
}

/// Storage capability consumed by the engine
///
/// Paths are opaque names; implementations decide how they map to storage.
pub trait FileSystem: Send + Sync + fmt::Debug {
    /// Read the whole blob stored under `path`
    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Create or replace the blob stored under `path`
    fn write(&self, path: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Describe `path`; a missing path is `exists: false`, not an error
    fn stat(&self, path: &str) -> Result<StatResult, StorageError>;

    /// Delete the blob stored under `path`
    fn remove(&self, path: &str) -> Result<(), StorageError>;

    /// Rename a blob
    fn move_file(&self, from: &str, to: &str) -> Result<(), StorageError>;

    /// Resolve a name to the location it is stored at
    fn resolve(&self, path: &str) -> String;
}

/// Default [`FileSystem`] backed by the local disk
///
/// Relative paths are resolved against a base directory.
#[derive(Debug, Clone)]
pub struct DefaultFileSystem {
    base_path: PathBuf,
}

impl DefaultFileSystem {
    /// Create a file system rooted at the current directory
    pub fn new() -> Self {
        Self {
            base_path: PathBuf::from("."),
        }
    }

    /// Create a file system rooted at `base_path`
    pub fn with_base_path<P: Into<PathBuf>>(base_path: P) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Directory relative paths are resolved against
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn full_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }
}

impl Default for DefaultFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for DefaultFileSystem {
    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        trace!(path, "Reading file");
        fs::read(self.full_path(path)).map_err(|e| StorageError::from_io(path, e))
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        trace!(path, bytes = data.len(), "Writing file");
        fs::write(self.full_path(path), data).map_err(|e| StorageError::from_io(path, e))
    }

    fn stat(&self, path: &str) -> Result<StatResult, StorageError> {
        let metadata = match fs::metadata(self.full_path(path)) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(StatResult::default()),
            Err(e) => return Err(StorageError::from_io(path, e)),
        };

        let last_modified = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|elapsed| elapsed.as_millis() as i64)
            .unwrap_or(0);

        Ok(StatResult {
            exists: true,
            is_directory: metadata.is_dir(),
            is_file: metadata.is_file(),
            last_modified,
        })
    }

    fn remove(&self, path: &str) -> Result<(), StorageError> {
        trace!(path, "Removing file");
        fs::remove_file(self.full_path(path)).map_err(|e| StorageError::from_io(path, e))
    }

    fn move_file(&self, from: &str, to: &str) -> Result<(), StorageError> {
        trace!(from, to, "Moving file");
        fs::rename(self.full_path(from), self.full_path(to))
            .map_err(|e| StorageError::from_io(from, e))
    }

    fn resolve(&self, path: &str) -> String {
        self.full_path(path).to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_remove() {
        let dir = tempfile::tempdir().unwrap();
        let fs = DefaultFileSystem::with_base_path(dir.path());

        fs.write("patterns.ini", b"[Subscription]").unwrap();
        assert_eq!(fs.read("patterns.ini").unwrap(), b"[Subscription]");

        let stat = fs.stat("patterns.ini").unwrap();
        assert!(stat.exists);
        assert!(stat.is_file);
        assert!(!stat.is_directory);
        assert!(stat.last_modified > 0);

        fs.remove("patterns.ini").unwrap();
        assert!(!fs.stat("patterns.ini").unwrap().exists);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let fs = DefaultFileSystem::with_base_path(dir.path());

        let err = fs.read("missing").unwrap_err();
        assert!(err.is_not_found());
        assert!(fs.remove("missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_io_error_is_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let fs = DefaultFileSystem::with_base_path(dir.path());

        // Reading a directory is an I/O failure, not a missing blob
        let err = fs.read(".").unwrap_err();
        assert!(!err.is_not_found());
        assert!(matches!(err, StorageError::Io { .. }));
    }

    #[test]
    fn test_move_and_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let fs = DefaultFileSystem::with_base_path(dir.path());

        fs.write("a.txt", b"data").unwrap();
        fs.move_file("a.txt", "b.txt").unwrap();
        assert!(!fs.stat("a.txt").unwrap().exists);
        assert_eq!(fs.read("b.txt").unwrap(), b"data");

        let resolved = fs.resolve("b.txt");
        assert!(resolved.ends_with("b.txt"));
        assert!(resolved.starts_with(&*dir.path().to_string_lossy()));
        assert_eq!(fs.resolve("/etc/hosts"), "/etc/hosts");
    }

    #[test]
    fn test_stat_directory() {
        let dir = tempfile::tempdir().unwrap();
        let fs = DefaultFileSystem::with_base_path(dir.path());
        let stat = fs.stat(".").unwrap();
        assert!(stat.exists);
        assert!(stat.is_directory);
    }
}
