use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} exists but is not a directory", .path.display())]
    NotADirectory { path: PathBuf },
    #[error("invalid output file name {name:?}")]
    InvalidFilename { name: String },
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// True when `name` is a single path component that stays inside its directory.
pub fn is_plain_filename(name: &str) -> bool {
    if name.trim().is_empty() || name.contains('/') || name.contains('\\') || name.contains('\0')
    {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Create `path` (and parents) unless a directory is already there.
///
/// An existing directory, including a mount point or a symlink to a directory,
/// is accepted as-is.
pub fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(StorageError::NotADirectory {
            path: path.to_path_buf(),
        }),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(path).map_err(|source| StorageError::CreateDir {
                path: path.to_path_buf(),
                source,
            })?;
            debug!(path = %path.display(), "Created directory");
            Ok(())
        }
        Err(source) => Err(StorageError::CreateDir {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Whole-file storage rooted at the resolved output directory.
#[derive(Debug, Clone)]
pub struct OutputStore {
    root: PathBuf,
}

impl OutputStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        ensure_directory(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, filename: &str) -> Result<PathBuf, StorageError> {
        if !is_plain_filename(filename) {
            return Err(StorageError::InvalidFilename {
                name: filename.to_string(),
            });
        }
        Ok(self.root.join(filename))
    }

    pub fn exists(&self, filename: &str) -> bool {
        self.path_for(filename)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }

    /// Replace `filename` with `content`, returning the number of bytes written.
    ///
    /// Content lands in a sibling temp file first and is renamed over the
    /// target, so a failed write leaves any previous file untouched.
    pub fn write(&self, filename: &str, content: &str) -> Result<usize, StorageError> {
        let path = self.path_for(filename)?;
        let temp_path = build_temp_path(&path);

        if let Err(source) = fs::write(&temp_path, content) {
            let _ = fs::remove_file(&temp_path);
            return Err(StorageError::Write { path, source });
        }
        if let Err(source) = fs::rename(&temp_path, &path) {
            let _ = fs::remove_file(&temp_path);
            return Err(StorageError::Write { path, source });
        }

        debug!(path = %path.display(), bytes = content.len(), "Wrote output file");
        Ok(content.len())
    }

    pub fn read(&self, filename: &str) -> Result<String, StorageError> {
        let path = self.path_for(filename)?;
        fs::read_to_string(&path).map_err(|source| StorageError::Read { path, source })
    }
}

fn build_temp_path(path: &Path) -> PathBuf {
    let mut temp_path = path.to_path_buf();
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if !ext.is_empty() => {
            temp_path.set_extension(format!("{ext}.tmp"));
        }
        _ => {
            temp_path.set_extension("tmp");
        }
    }
    temp_path
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_is_idempotent_for_existing_directory() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path().join("output");

        OutputStore::open(&dir).expect("first open creates");
        OutputStore::open(&dir).expect("second open reuses");
        OutputStore::open(temp.path()).expect("pre-existing directory is fine");
        assert!(dir.is_dir());
    }

    #[test]
    fn open_creates_nested_directories() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path().join("a").join("b").join("c");
        let store = OutputStore::open(&dir).expect("open");
        assert_eq!(store.root(), dir.as_path());
        assert!(dir.is_dir());
    }

    #[test]
    fn open_rejects_regular_file() {
        let temp = tempdir().expect("tempdir");
        let file = temp.path().join("not-a-dir");
        fs::write(&file, "x").expect("write fixture");

        let err = OutputStore::open(&file).expect_err("file is not a directory");
        assert!(matches!(err, StorageError::NotADirectory { .. }));
    }

    #[test]
    fn write_then_read_is_byte_identical() {
        let temp = tempdir().expect("tempdir");
        let store = OutputStore::open(temp.path()).expect("open");
        let content = "Date, Day, Opponent\r\n\"Sep 6\", Sat, Akron · Lincoln\nno trailing newline";

        let written = store.write("Football.csv", content).expect("write");
        assert_eq!(written, content.len());
        assert_eq!(store.read("Football.csv").expect("read"), content);
        assert_eq!(
            fs::read(temp.path().join("Football.csv")).expect("raw read"),
            content.as_bytes()
        );
    }

    #[test]
    fn write_replaces_whole_file_and_leaves_no_temp() {
        let temp = tempdir().expect("tempdir");
        let store = OutputStore::open(temp.path()).expect("open");

        store.write("Baseball.csv", "a much longer first version\n").expect("first");
        store.write("Baseball.csv", "short\n").expect("second");

        assert_eq!(store.read("Baseball.csv").expect("read"), "short\n");
        assert!(!temp.path().join("Baseball.csv.tmp").exists());
    }

    #[test]
    fn rejects_names_that_escape_the_directory() {
        let temp = tempdir().expect("tempdir");
        let store = OutputStore::open(temp.path()).expect("open");

        for name in ["../evil.csv", "sub/dir.csv", "..", ".", "", "  ", "a\\b.csv"] {
            let err = store.write(name, "x").expect_err(name);
            assert!(matches!(err, StorageError::InvalidFilename { .. }), "{name}");
        }
        assert!(is_plain_filename("Men's Basketball.csv"));
    }

    #[test]
    fn read_missing_file_is_storage_error() {
        let temp = tempdir().expect("tempdir");
        let store = OutputStore::open(temp.path()).expect("open");
        assert!(!store.exists("Softball.csv"));
        let err = store.read("Softball.csv").expect_err("missing");
        assert!(matches!(err, StorageError::Read { .. }));
    }
}
