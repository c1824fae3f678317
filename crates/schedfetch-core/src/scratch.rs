use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Local;
use tracing::{info, warn};

use crate::output::{StorageError, ensure_directory};

/// Directory for raw model replies kept for inspection.
#[derive(Debug, Clone)]
pub struct ScratchArea {
    root: PathBuf,
}

impl ScratchArea {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        ensure_directory(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Save `text` as `response_<slug>_<timestamp>.txt` and return its path.
    pub fn archive_response(&self, label: &str, text: &str) -> Result<PathBuf, StorageError> {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = self
            .root
            .join(format!("response_{}_{stamp}.txt", slugify(label)));
        fs::write(&path, text).map_err(|source| StorageError::Write {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), "Saved raw response");
        Ok(path)
    }

    /// Remove entries last modified more than `max_age` ago.
    pub fn sweep(&self, max_age: Duration) -> Vec<String> {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        self.sweep_older_than(cutoff)
    }

    /// Remove entries modified before `cutoff`, returning their names.
    /// Failures are logged and skipped.
    pub fn sweep_older_than(&self, cutoff: SystemTime) -> Vec<String> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = %self.root.display(), error = %err, "Cannot list scratch directory");
                return Vec::new();
            }
        };

        let mut removed = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Cannot stat scratch entry");
                    continue;
                }
            };
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            if modified >= cutoff {
                continue;
            }

            let result = if metadata.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match result {
                Ok(()) => {
                    info!(name = %name, directory = metadata.is_dir(), "Removed old scratch entry");
                    removed.push(name);
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Failed to remove scratch entry");
                }
            }
        }
        removed.sort();
        removed
    }
}

fn slugify(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    for ch in label.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('_') && !slug.is_empty() {
            slug.push('_');
        }
    }
    let slug = slug.trim_end_matches('_');
    if slug.is_empty() {
        "response".to_string()
    } else {
        slug.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    #[test]
    fn slug_is_lowercase_and_separator_free() {
        assert_eq!(slugify("Men's Basketball"), "men_s_basketball");
        assert_eq!(slugify("  Football  "), "football");
        assert_eq!(slugify("../"), "response");
    }

    #[test]
    fn archive_writes_named_file() {
        let temp = tempdir().expect("tempdir");
        let scratch = ScratchArea::open(temp.path().join("tmp")).expect("open");

        let path = scratch
            .archive_response("Women's Basketball", "raw reply")
            .expect("archive");

        let name = path.file_name().and_then(|n| n.to_str()).expect("name");
        assert!(name.starts_with("response_women_s_basketball_"), "{name}");
        assert!(name.ends_with(".txt"));
        assert_eq!(fs::read_to_string(&path).expect("read"), "raw reply");
    }

    #[test]
    fn sweep_removes_only_old_files() {
        let temp = tempdir().expect("tempdir");
        let scratch = ScratchArea::open(temp.path()).expect("open");
        let old = temp.path().join("response_old.txt");
        let fresh = temp.path().join("response_fresh.txt");
        fs::write(&old, "old").expect("write old");
        fs::write(&fresh, "fresh").expect("write fresh");
        File::options()
            .write(true)
            .open(&old)
            .expect("open old")
            .set_modified(SystemTime::now() - 2 * DAY)
            .expect("backdate");

        let removed = scratch.sweep(DAY);

        assert_eq!(removed, ["response_old.txt"]);
        assert!(!old.exists());
        assert!(fresh.exists());
    }

    #[test]
    fn sweep_removes_old_directories() {
        let temp = tempdir().expect("tempdir");
        let scratch = ScratchArea::open(temp.path()).expect("open");
        let nested = temp.path().join("extract_20250101_000000");
        fs::create_dir_all(nested.join("inner")).expect("mkdir");
        fs::write(nested.join("inner").join("a.csv"), "x").expect("write");

        let removed = scratch.sweep_older_than(SystemTime::now() + DAY);

        assert_eq!(removed, ["extract_20250101_000000"]);
        assert!(!nested.exists());
    }

    #[test]
    fn sweep_of_missing_directory_is_empty() {
        let temp = tempdir().expect("tempdir");
        let scratch = ScratchArea::open(temp.path().join("tmp")).expect("open");
        fs::remove_dir(scratch.root()).expect("remove");
        assert!(scratch.sweep(DAY).is_empty());
    }
}
