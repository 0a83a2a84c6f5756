use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::StorageError;

/// Durable sink for rendered reports, keyed by file name.
#[async_trait::async_trait]
pub trait ReportStore: Send + Sync {
    async fn write_text(&self, key: &str, content: &str) -> Result<(), StorageError>;
}

/// Writes each report as a file under one directory.
///
/// Content goes to a temp file in the same directory and is persisted under
/// its final name, so a report under that name is always complete.
#[derive(Debug, Clone)]
pub struct FsReportStore {
    dir: PathBuf,
}

impl FsReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

fn write_atomic(dir: &Path, final_path: &Path, content: &[u8]) -> io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(final_path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait::async_trait]
impl ReportStore for FsReportStore {
    async fn write_text(&self, key: &str, content: &str) -> Result<(), StorageError> {
        let dir = self.dir.clone();
        let final_path = self.path_for(key);
        let body = content.as_bytes().to_vec();
        let len = body.len();

        // Blocking file I/O stays off the scheduler's thread.
        let written = tokio::task::spawn_blocking(move || {
            write_atomic(&dir, &final_path, &body).map(|_| final_path)
        })
        .await
        .unwrap_or_else(|join| Err(io::Error::other(join)));

        match written {
            Ok(path) => {
                debug!(path = %path.display(), bytes = len, "report written");
                Ok(())
            }
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn writes_file_under_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsReportStore::new(dir.path().join("reports"));
        store.write_text("vuln_scan_a_1.txt", "hello\n").await.unwrap();
        let body = fs::read_to_string(store.path_for("vuln_scan_a_1.txt")).unwrap();
        assert_eq!(body, "hello\n");
        let names: Vec<_> = fs::read_dir(store.dir())
            .unwrap()
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["vuln_scan_a_1.txt"]);
    }

    #[tokio::test]
    async fn rewrite_replaces_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsReportStore::new(dir.path());
        store.write_text("k.txt", "a much longer first body\n").await.unwrap();
        store.write_text("k.txt", "short\n").await.unwrap();
        assert_eq!(fs::read_to_string(store.path_for("k.txt")).unwrap(), "short\n");
    }

    #[tokio::test]
    async fn unwritable_dir_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        // A regular file where the directory should be.
        let store = FsReportStore::new(&blocker);
        let err = store.write_text("k.txt", "body").await.unwrap_err();
        assert!(matches!(err, StorageError::Io { ref key, .. } if key == "k.txt"));
    }
}
