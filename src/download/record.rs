use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use url::Url;

use crate::item::PlayableItem;

/// Lifecycle of a single transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadState {
    NotStarted,
    InProgress,
    /// Committed; the path is relative to the storage root
    Finished { path: PathBuf },
    Failed(String),
}

impl DownloadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished { .. } | Self::Failed(_))
    }
}

const UNKNOWN_LENGTH: u64 = u64::MAX;

/// Bookkeeping for one in-flight download, keyed by remote URL
///
/// Records only live in the download manager's registry and are never
/// persisted.
#[derive(Debug)]
pub struct DownloadRecord {
    url: Url,
    item: Arc<PlayableItem>,
    state: watch::Sender<DownloadState>,
    cancel: watch::Sender<bool>,
    written: AtomicU64,
    expected: AtomicU64,
}

impl DownloadRecord {
    pub(crate) fn new(url: Url, item: Arc<PlayableItem>) -> Self {
        Self {
            url,
            item,
            state: watch::Sender::new(DownloadState::NotStarted),
            cancel: watch::Sender::new(false),
            written: AtomicU64::new(0),
            expected: AtomicU64::new(UNKNOWN_LENGTH),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn item(&self) -> &Arc<PlayableItem> {
        &self.item
    }

    pub fn state(&self) -> DownloadState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DownloadState> {
        self.state.subscribe()
    }

    pub fn bytes_written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub fn bytes_expected(&self) -> Option<u64> {
        match self.expected.load(Ordering::Relaxed) {
            UNKNOWN_LENGTH => None,
            n => Some(n),
        }
    }

    pub(crate) fn set_state(&self, state: DownloadState) {
        self.state.send_replace(state);
    }

    pub(crate) fn set_expected(&self, expected: Option<u64>) {
        self.expected
            .store(expected.unwrap_or(UNKNOWN_LENGTH), Ordering::Relaxed);
    }

    pub(crate) fn set_written(&self, written: u64) {
        self.written.store(written, Ordering::Relaxed);
    }

    /// Ask the running transfer to stop at its next chunk boundary
    pub(crate) fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub(crate) async fn cancelled(&self) {
        let mut rx = self.cancel.subscribe();
        // The sender lives as long as the record, so this cannot fail while
        // we hold `self`.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Wait until the record has reached a terminal state
    pub async fn wait_finished(&self) -> DownloadState {
        let mut rx = self.state.subscribe();
        match rx.wait_for(DownloadState::is_terminal).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }
}

/// Turns byte counts into de-duplicated, non-decreasing percentages
#[derive(Debug, Clone)]
pub(crate) struct ProgressTracker {
    expected: Option<u64>,
    written: u64,
    last_percent: u8,
}

impl ProgressTracker {
    pub(crate) fn new(expected: Option<u64>) -> Self {
        Self {
            expected: expected.filter(|&n| n > 0),
            written: 0,
            last_percent: 0,
        }
    }

    pub(crate) fn written(&self) -> u64 {
        self.written
    }

    /// Account for `len` new bytes; returns the new percentage when it grew
    pub(crate) fn advance(&mut self, len: usize) -> Option<u8> {
        self.written += len as u64;
        let expected = self.expected?;

        let percent = (u128::from(self.written) * 100 / u128::from(expected)).min(100) as u8;
        if percent > self.last_percent {
            self.last_percent = percent;
            Some(percent)
        } else {
            None
        }
    }

    /// Close the stream; returns 100 unless it was already published
    pub(crate) fn complete(&mut self) -> Option<u8> {
        if self.last_percent < 100 {
            self.last_percent = 100;
            Some(100)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_reports_each_increase_once() {
        let mut tracker = ProgressTracker::new(Some(1000));
        let published: Vec<u8> = (0..10).filter_map(|_| tracker.advance(100)).collect();

        assert_eq!(published, vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
        assert_eq!(tracker.complete(), None);
    }

    #[test]
    fn tracker_skips_equal_percentages() {
        let mut tracker = ProgressTracker::new(Some(1000));

        assert_eq!(tracker.advance(3), None);
        assert_eq!(tracker.advance(4), None);
        assert_eq!(tracker.advance(5), Some(1));
        assert_eq!(tracker.advance(1), None);
    }

    #[test]
    fn tracker_never_exceeds_one_hundred() {
        let mut tracker = ProgressTracker::new(Some(10));

        assert_eq!(tracker.advance(25), Some(100));
        assert_eq!(tracker.advance(25), None);
    }

    #[test]
    fn tracker_without_length_only_completes() {
        let mut tracker = ProgressTracker::new(None);

        assert_eq!(tracker.advance(512), None);
        assert_eq!(tracker.written(), 512);
        assert_eq!(tracker.complete(), Some(100));
    }

    #[test]
    fn zero_length_is_treated_as_unknown() {
        let mut tracker = ProgressTracker::new(Some(0));
        assert_eq!(tracker.advance(10), None);
        assert_eq!(tracker.complete(), Some(100));
    }

    #[tokio::test]
    async fn wait_finished_returns_terminal_state() {
        let item = Arc::new(PlayableItem::new("guid", "Episode"));
        let record = Arc::new(DownloadRecord::new(
            Url::parse("https://example.com/ep.mp3").unwrap(),
            item,
        ));

        let waiter = {
            let record = record.clone();
            tokio::spawn(async move { record.wait_finished().await })
        };

        record.set_state(DownloadState::InProgress);
        record.set_state(DownloadState::Failed("boom".to_string()));

        assert_eq!(
            waiter.await.unwrap(),
            DownloadState::Failed("boom".to_string())
        );
    }
}
