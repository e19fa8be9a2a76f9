use std::path::PathBuf;
use std::sync::Arc;

/// Events emitted while acquiring episodes, for progress reporting
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A transfer is starting
    DownloadStarting {
        guid: String,
        episode_title: String,
        url: String,
        /// Expected content length in bytes, if known
        content_length: Option<u64>,
    },

    /// Download progress update, emitted only when the percentage increases
    DownloadProgress {
        guid: String,
        episode_title: String,
        percent: u8,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },

    /// The buffered body is being written to its final location
    Finalizing { guid: String, episode_title: String },

    /// A download completed and was committed to storage
    DownloadCompleted {
        guid: String,
        episode_title: String,
        /// Path relative to the storage root
        path: PathBuf,
        bytes_downloaded: u64,
        hash: String,
    },

    /// A download failed
    DownloadFailed {
        guid: String,
        episode_title: String,
        error: String,
    },

    /// Partial files from an interrupted run were cleaned up
    PartialFilesCleanedUp { count: usize },
}

/// Trait for reporting progress events during downloads.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {
        // Intentionally empty
    }
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}
