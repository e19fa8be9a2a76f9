// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use url::Url;

use super::filename::{generate_disambiguated_filename, generate_filename};
use super::record::{DownloadRecord, DownloadState, ProgressTracker};
use super::storage::Storage;
use crate::error::DownloadError;
use crate::http::HttpClient;
use crate::item::PlayableItem;
use crate::progress::{ProgressEvent, SharedProgressReporter};

/// Upper bound for pre-allocating the body buffer from Content-Length
const MAX_PREALLOCATION: u64 = 256 * 1024 * 1024;

type Registry = Mutex<HashMap<Url, Arc<DownloadRecord>>>;

/// What a call to [`DownloadManager::schedule_download`] ended up doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The item already had a local file; nothing was touched
    AlreadyPresent,
    /// The item has no audio attachment; nothing to download
    NoAudioUrl,
    /// Another call was already fetching this URL; we waited for it
    Joined { path: PathBuf },
    /// The file was transferred and committed
    Downloaded {
        /// Path relative to the storage root
        path: PathBuf,
        bytes: u64,
        /// "sha256:<hex>" of the committed bytes
        content_hash: String,
    },
}

enum Registration<'a> {
    Owner(RegistrationGuard<'a>),
    Joined(Arc<DownloadRecord>),
}

/// Fetches episode audio into durable storage
///
/// At most one transfer per remote URL runs at any time; the registry of
/// in-flight records is the only point of mutual exclusion between transfers.
/// Filenames are claimed per item GUID, so two items deriving the same name
/// never write to the same file.
pub struct DownloadManager<C: HttpClient> {
    client: C,
    storage: Storage,
    registry: Registry,
    /// Filename -> GUID of the item that claimed it
    filenames: Mutex<HashMap<String, String>>,
    reporter: SharedProgressReporter,
}

impl<C: HttpClient> DownloadManager<C> {
    pub fn new(client: C, storage: Storage, reporter: SharedProgressReporter) -> Self {
        Self {
            client,
            storage,
            registry: Mutex::new(HashMap::new()),
            filenames: Mutex::new(HashMap::new()),
            reporter,
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// True while a transfer for the item's audio URL is registered
    pub fn is_downloading(&self, item: &PlayableItem) -> bool {
        item.audio_url()
            .is_some_and(|url| lock(&self.registry).contains_key(url))
    }

    /// The live record for the item's audio URL, if one is in flight
    pub fn record(&self, item: &PlayableItem) -> Option<Arc<DownloadRecord>> {
        let url = item.audio_url()?;
        lock(&self.registry).get(url).cloned()
    }

    /// Number of transfers currently in flight
    pub fn active_count(&self) -> usize {
        lock(&self.registry).len()
    }

    /// Remove partial files left behind by a previous, interrupted process
    pub fn cleanup_partials(&self) -> Result<usize, DownloadError> {
        let count = self.storage.cleanup_partials()?;
        if count > 0 {
            info!(count, "cleaned up partial downloads");
            self.reporter
                .report(ProgressEvent::PartialFilesCleanedUp { count });
        }
        Ok(count)
    }

    /// Make sure the item's audio is available locally
    ///
    /// Without `force`, an item that already has a local file is left alone
    /// without any I/O. With `force`, the existing file is deleted first and,
    /// if the same URL is currently in flight, that transfer is cancelled and
    /// restarted.
    pub async fn schedule_download(
        &self,
        item: &Arc<PlayableItem>,
        force: bool,
    ) -> Result<DownloadOutcome, DownloadError> {
        if let Some(existing) = item.local_path() {
            if !force {
                debug!(guid = item.guid(), "already downloaded, skipping");
                return Ok(DownloadOutcome::AlreadyPresent);
            }
            self.storage.remove(&existing).await?;
            item.clear_local_path();
            item.set_progress(0);
        }

        let Some(url) = item.audio_url().cloned() else {
            debug!(guid = item.guid(), "no audio attachment to download");
            return Ok(DownloadOutcome::NoAudioUrl);
        };

        let guard = match self.register(&url, item, force).await {
            Registration::Owner(guard) => guard,
            Registration::Joined(record) => return join(item, &record).await,
        };

        let result = self.transfer(item, &url, guard.record()).await;
        match &result {
            Ok(DownloadOutcome::Downloaded { path, .. }) => {
                guard.release(DownloadState::Finished { path: path.clone() })
            }
            Ok(_) => guard.release(DownloadState::Failed("no transfer".to_string())),
            Err(e) => {
                warn!(url = %url, error = %e, "download failed");
                self.reporter.report(ProgressEvent::DownloadFailed {
                    guid: item.guid().to_string(),
                    episode_title: item.title().to_string(),
                    error: e.to_string(),
                });
                guard.release(DownloadState::Failed(e.to_string()));
            }
        }

        result
    }

    /// Atomically claim the URL, or find the transfer that already owns it
    async fn register(
        &self,
        url: &Url,
        item: &Arc<PlayableItem>,
        force: bool,
    ) -> Registration<'_> {
        loop {
            let superseded = {
                let mut registry = lock(&self.registry);
                match registry.get(url) {
                    None => {
                        let record = Arc::new(DownloadRecord::new(url.clone(), item.clone()));
                        registry.insert(url.clone(), record.clone());
                        return Registration::Owner(RegistrationGuard {
                            registry: &self.registry,
                            record,
                            released: false,
                        });
                    }
                    Some(existing) if force => {
                        info!(url = %url, "forced download restarts in-flight transfer");
                        existing.cancel();
                        existing.clone()
                    }
                    Some(existing) => return Registration::Joined(existing.clone()),
                }
            };

            // The slot is released before the terminal state is published,
            // so the next pass finds the URL free (or claimed by a newcomer).
            superseded.wait_finished().await;
            item.set_progress(0);
        }
    }

    /// Stream the body into memory, then commit it to storage
    async fn transfer(
        &self,
        item: &PlayableItem,
        url: &Url,
        record: &DownloadRecord,
    ) -> Result<DownloadOutcome, DownloadError> {
        record.set_state(DownloadState::InProgress);

        let response = self
            .client
            .get_stream(url.as_str())
            .await
            .map_err(|e| DownloadError::HttpFailed {
                url: url.to_string(),
                source: e,
            })?;

        if response.status >= 400 {
            return Err(DownloadError::HttpStatus {
                url: url.to_string(),
                status: response.status,
            });
        }

        info!(url = %url, content_length = ?response.content_length, "download starting");
        self.reporter.report(ProgressEvent::DownloadStarting {
            guid: item.guid().to_string(),
            episode_title: item.title().to_string(),
            url: url.to_string(),
            content_length: response.content_length,
        });

        record.set_expected(response.content_length);
        let capacity = response
            .content_length
            .unwrap_or(0)
            .min(MAX_PREALLOCATION) as usize;
        let mut buffer = Vec::with_capacity(capacity);
        let mut tracker = ProgressTracker::new(response.content_length);
        let mut stream = response.body;

        loop {
            let chunk = tokio::select! {
                biased;
                _ = record.cancelled() => {
                    return Err(DownloadError::Cancelled { url: url.to_string() });
                }
                next = stream.next() => match next {
                    Some(chunk) => chunk.map_err(|e| DownloadError::StreamFailed {
                        url: url.to_string(),
                        source: e,
                    })?,
                    None => break,
                },
            };

            buffer.extend_from_slice(&chunk);
            let published = tracker.advance(chunk.len());
            record.set_written(tracker.written());

            if let Some(percent) = published {
                self.publish_progress(item, percent, tracker.written(), response.content_length);
            }
        }

        if let Some(percent) = tracker.complete() {
            self.publish_progress(item, percent, tracker.written(), response.content_length);
        }

        self.reporter.report(ProgressEvent::Finalizing {
            guid: item.guid().to_string(),
            episode_title: item.title().to_string(),
        });

        let filename = self.claim_filename(item);
        let path = self.storage.commit(&filename, &buffer).await?;
        let content_hash = format!("sha256:{:x}", Sha256::digest(&buffer));
        let bytes = buffer.len() as u64;

        item.set_local_path(path.clone());

        info!(url = %url, path = %path.display(), bytes, "download committed");
        self.reporter.report(ProgressEvent::DownloadCompleted {
            guid: item.guid().to_string(),
            episode_title: item.title().to_string(),
            path: path.clone(),
            bytes_downloaded: bytes,
            hash: content_hash.clone(),
        });

        Ok(DownloadOutcome::Downloaded {
            path,
            bytes,
            content_hash,
        })
    }

    /// The item's filename, or a GUID-suffixed one when another item owns it
    ///
    /// Claims last for the manager's lifetime, so re-downloads of the same
    /// item keep replacing their own file.
    fn claim_filename(&self, item: &PlayableItem) -> String {
        let mut filenames = self
            .filenames
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let filename = std::iter::once(generate_filename(item))
            .chain((1..).map(|attempt| generate_disambiguated_filename(item, attempt)))
            .find(|name| {
                filenames
                    .get(name)
                    .is_none_or(|owner| owner == item.guid())
            })
            .unwrap_or_else(|| generate_filename(item));

        if filenames.get(&filename).is_none() {
            debug!(guid = item.guid(), filename = %filename, "claimed filename");
            filenames.insert(filename.clone(), item.guid().to_string());
        }
        filename
    }

    fn publish_progress(&self, item: &PlayableItem, percent: u8, written: u64, total: Option<u64>) {
        item.set_progress(percent);
        debug!(guid = item.guid(), percent, "download progress");
        self.reporter.report(ProgressEvent::DownloadProgress {
            guid: item.guid().to_string(),
            episode_title: item.title().to_string(),
            percent,
            bytes_downloaded: written,
            total_bytes: total,
        });
    }
}

/// Wait for somebody else's transfer of the same URL
async fn join(
    item: &Arc<PlayableItem>,
    record: &DownloadRecord,
) -> Result<DownloadOutcome, DownloadError> {
    debug!(url = %record.url(), guid = item.guid(), "joining in-flight download");

    match record.wait_finished().await {
        DownloadState::Finished { path } => {
            if !Arc::ptr_eq(item, record.item()) {
                item.set_local_path(path.clone());
                item.set_progress(100);
            }
            Ok(DownloadOutcome::Joined { path })
        }
        DownloadState::Failed(reason) => Err(DownloadError::InFlightFailed {
            url: record.url().to_string(),
            reason,
        }),
        DownloadState::NotStarted | DownloadState::InProgress => {
            Err(DownloadError::InFlightFailed {
                url: record.url().to_string(),
                reason: "transfer ended without a result".to_string(),
            })
        }
    }
}

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<Url, Arc<DownloadRecord>>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Holds a URL's registry slot; the slot is freed on every exit path
struct RegistrationGuard<'a> {
    registry: &'a Registry,
    record: Arc<DownloadRecord>,
    released: bool,
}

impl RegistrationGuard<'_> {
    fn record(&self) -> &DownloadRecord {
        &self.record
    }

    fn release(mut self, state: DownloadState) {
        self.release_with(state);
    }

    fn release_with(&mut self, state: DownloadState) {
        if self.released {
            return;
        }
        self.released = true;

        {
            let mut registry = lock(self.registry);
            if registry
                .get(self.record.url())
                .is_some_and(|current| Arc::ptr_eq(current, &self.record))
            {
                registry.remove(self.record.url());
            }
        }

        self.record.set_state(state);
    }
}

impl Drop for RegistrationGuard<'_> {
    fn drop(&mut self) {
        // Reached when the scheduling future is dropped mid-transfer
        self.release_with(DownloadState::Failed("download aborted".to_string()));
    }
}
