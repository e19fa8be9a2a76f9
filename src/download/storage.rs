// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::DownloadError;

/// Suffix of files that are still being written
const PARTIAL_SUFFIX: &str = ".partial";

/// Durable storage for downloaded audio
///
/// Files live in a single downloads directory below the storage root. Paths
/// handed out are relative to the root so the root can move between runs.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
    downloads_dir: String,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            downloads_dir: "downloads".to_string(),
        }
    }

    pub fn with_downloads_dir(mut self, name: impl Into<String>) -> Self {
        self.downloads_dir = name.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of the downloads directory
    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join(&self.downloads_dir)
    }

    /// Turn a root-relative path into an absolute one
    pub fn resolve(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }

    /// Start an atomic write of `filename` into the downloads directory
    ///
    /// Nothing is visible at the final path until [`PendingFile::persist`]
    /// succeeds.
    pub async fn begin(&self, filename: &str) -> Result<PendingFile, DownloadError> {
        let dir = self.downloads_dir();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| DownloadError::FailedToSave {
                path: dir.clone(),
                source: e,
            })?;

        // Concurrent writers of the same name each get their own partial file
        let final_path = dir.join(filename);
        let partial_path = dir.join(format!(
            "{}.{:016x}{}",
            filename,
            rand::random::<u64>(),
            PARTIAL_SUFFIX
        ));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&partial_path)
            .await
            .map_err(|e| DownloadError::FailedToSave {
                path: partial_path.clone(),
                source: e,
            })?;

        Ok(PendingFile {
            file: Some(file),
            partial_path,
            final_path,
            relative: Path::new(&self.downloads_dir).join(filename),
        })
    }

    /// Atomically write `data` as `filename`, replacing any previous file
    ///
    /// Returns the path relative to the storage root.
    pub async fn commit(&self, filename: &str, data: &[u8]) -> Result<PathBuf, DownloadError> {
        let mut pending = self.begin(filename).await?;
        pending.write_all(data).await?;
        pending.persist().await
    }

    /// Delete a previously committed file; a file that is already gone is fine
    pub async fn remove(&self, relative: &Path) -> Result<(), DownloadError> {
        let path = self.resolve(relative);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "download to remove was already gone");
                Ok(())
            }
            Err(e) => Err(DownloadError::RemoveFailed { path, source: e }),
        }
    }

    /// Remove `.partial` files left behind by an interrupted process
    pub fn cleanup_partials(&self) -> Result<usize, DownloadError> {
        let dir = self.downloads_dir();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(DownloadError::FailedToSave {
                    path: dir,
                    source: e,
                });
            }
        };

        let mut cleaned = 0;
        for entry in entries {
            let entry = entry.map_err(|e| DownloadError::FailedToSave {
                path: dir.clone(),
                source: e,
            })?;

            let path = entry.path();
            let is_partial = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(PARTIAL_SUFFIX));

            if is_partial {
                match std::fs::remove_file(&path) {
                    Ok(()) => cleaned += 1,
                    Err(e) => warn!(path = %path.display(), error = %e, "failed to remove partial file"),
                }
            }
        }

        Ok(cleaned)
    }
}

/// A file being written next to its final location
///
/// Dropping it without calling [`persist`](Self::persist) deletes the
/// partial file.
#[derive(Debug)]
pub struct PendingFile {
    file: Option<File>,
    partial_path: PathBuf,
    final_path: PathBuf,
    relative: PathBuf,
}

impl PendingFile {
    #[cfg(test)]
    fn partial_path(&self) -> &Path {
        &self.partial_path
    }

    #[cfg(test)]
    fn final_path(&self) -> &Path {
        &self.final_path
    }

    pub async fn write_all(&mut self, data: &[u8]) -> Result<(), DownloadError> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        file.write_all(data)
            .await
            .map_err(|e| DownloadError::FailedToSave {
                path: self.partial_path.clone(),
                source: e,
            })
    }

    /// Flush, sync and rename the partial file into place
    pub async fn persist(mut self) -> Result<PathBuf, DownloadError> {
        if let Some(mut file) = self.file.take() {
            file.flush().await.map_err(|e| self.save_error(e))?;
            file.sync_all().await.map_err(|e| self.save_error(e))?;
        }

        // Overwrite semantics: a stale file at the final path is removed first
        match fs::remove_file(&self.final_path).await {
            Ok(()) => debug!(path = %self.final_path.display(), "replaced existing download"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(DownloadError::FailedToSave {
                    path: self.final_path.clone(),
                    source: e,
                });
            }
        }

        fs::rename(&self.partial_path, &self.final_path)
            .await
            .map_err(|e| DownloadError::FailedToSave {
                path: self.final_path.clone(),
                source: e,
            })?;

        // Renamed away; nothing left for Drop to clean up
        self.partial_path.clear();
        Ok(std::mem::take(&mut self.relative))
    }

    fn save_error(&self, source: std::io::Error) -> DownloadError {
        DownloadError::FailedToSave {
            path: self.partial_path.clone(),
            source,
        }
    }
}

impl Drop for PendingFile {
    fn drop(&mut self) {
        if self.partial_path.as_os_str().is_empty() {
            return;
        }
        drop(self.file.take());
        if let Err(e) = std::fs::remove_file(&self.partial_path)
            && e.kind() != ErrorKind::NotFound
        {
            warn!(path = %self.partial_path.display(), error = %e, "failed to remove partial file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn commit_creates_directory_and_writes_file() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path());

        let relative = storage.commit("episode.mp3", b"audio bytes").await.unwrap();

        assert_eq!(relative, PathBuf::from("downloads/episode.mp3"));
        let content = std::fs::read(storage.resolve(&relative)).unwrap();
        assert_eq!(content, b"audio bytes");
        assert_eq!(partial_files(&storage), 0);
    }

    fn partial_files(storage: &Storage) -> usize {
        std::fs::read_dir(storage.downloads_dir())
            .unwrap()
            .filter(|entry| {
                entry
                    .as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .ends_with(PARTIAL_SUFFIX)
            })
            .count()
    }

    #[tokio::test]
    async fn concurrent_writers_of_one_name_use_separate_partials() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path());

        let mut first = storage.begin("episode.mp3").await.unwrap();
        let mut second = storage.begin("episode.mp3").await.unwrap();
        assert_ne!(first.partial_path(), second.partial_path());
        assert_eq!(first.final_path(), second.final_path());

        first.write_all(b"first writer").await.unwrap();
        second.write_all(b"second").await.unwrap();
        assert_eq!(partial_files(&storage), 2);

        let relative = first.persist().await.unwrap();
        assert_eq!(
            std::fs::read(storage.resolve(&relative)).unwrap(),
            b"first writer"
        );
        drop(second);
        assert_eq!(partial_files(&storage), 0);
    }

    #[tokio::test]
    async fn commit_overwrites_existing_file() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path());

        storage
            .commit("episode.mp3", b"a much longer first version")
            .await
            .unwrap();
        let relative = storage.commit("episode.mp3", b"second").await.unwrap();

        let content = std::fs::read(storage.resolve(&relative)).unwrap();
        assert_eq!(content, b"second");
    }

    #[tokio::test]
    async fn interrupted_write_never_reaches_final_path() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path());

        let mut pending = storage.begin("episode.mp3").await.unwrap();
        pending.write_all(b"half of the aud").await.unwrap();
        let final_path = pending.final_path().to_path_buf();
        let partial_path = pending.partial_path().to_path_buf();

        // Simulate a crash: no persist, no destructor
        std::mem::forget(pending);

        assert!(!final_path.exists());
        assert!(partial_path.exists());

        assert_eq!(storage.cleanup_partials().unwrap(), 1);
        assert!(!partial_path.exists());
    }

    #[tokio::test]
    async fn dropped_pending_file_removes_partial() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path());

        let mut pending = storage.begin("episode.mp3").await.unwrap();
        pending.write_all(b"partial").await.unwrap();
        let partial_path = pending.partial_path().to_path_buf();
        drop(pending);

        assert!(!partial_path.exists());
        assert!(!storage.downloads_dir().join("episode.mp3").exists());
    }

    #[tokio::test]
    async fn interrupted_rewrite_keeps_previous_file_intact() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path());
        let relative = storage.commit("episode.mp3", b"complete").await.unwrap();

        let mut pending = storage.begin("episode.mp3").await.unwrap();
        pending.write_all(b"trunc").await.unwrap();
        std::mem::forget(pending);

        let content = std::fs::read(storage.resolve(&relative)).unwrap();
        assert_eq!(content, b"complete");
    }

    #[tokio::test]
    async fn remove_tolerates_missing_file() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path());

        storage
            .remove(Path::new("downloads/never-written.mp3"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn remove_reports_failure() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path());
        // A non-empty directory cannot be removed with remove_file
        std::fs::create_dir_all(dir.path().join("downloads/stuck.mp3/inner")).unwrap();

        let result = storage.remove(Path::new("downloads/stuck.mp3")).await;

        assert!(matches!(result, Err(DownloadError::RemoveFailed { .. })));
    }

    #[test]
    fn cleanup_without_directory_is_noop() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path()).with_downloads_dir("episodes");

        assert_eq!(storage.cleanup_partials().unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_directory_creation_is_failed_to_save() {
        let dir = tempdir().unwrap();
        // A file where the downloads directory should be
        std::fs::write(dir.path().join("downloads"), b"not a dir").unwrap();
        let storage = Storage::new(dir.path());

        let result = storage.commit("episode.mp3", b"audio").await;

        assert!(matches!(result, Err(DownloadError::FailedToSave { .. })));
    }
}
