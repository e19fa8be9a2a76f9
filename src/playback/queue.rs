use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use url::Url;

use crate::item::PlayableItem;

/// Capacity of the queue event channel; slow observers lag, they never block
const EVENT_CAPACITY: usize = 64;

/// Where a queue entry's audio comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Downloaded file (absolute path)
    Local(PathBuf),
    /// Streamed from the remote URL
    Stream(Url),
}

/// A loaded, playable unit in the queue
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub item: Arc<PlayableItem>,
    pub source: AudioSource,
    pub duration: Option<Duration>,
    /// Where playback continues when this entry becomes current again
    pub resume_at: Duration,
}

impl QueueEntry {
    pub fn new(item: Arc<PlayableItem>, source: AudioSource) -> Self {
        let duration = item.duration_hint();
        Self {
            item,
            source,
            duration,
            resume_at: Duration::ZERO,
        }
    }

    pub fn guid(&self) -> &str {
        self.item.guid()
    }
}

/// Mutation notifications; `len` is the queue length after the change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    Inserted { guid: String, index: usize, len: usize },
    Removed { guid: String, index: usize, len: usize },
}

/// Ordered play queue; the entry at index 0 is the current one
///
/// Only insertion and removal are supported. Ordering is decided upstream
/// (see [`crate::shuffle`]) before items are enqueued.
#[derive(Debug)]
pub struct PlayQueue {
    entries: Vec<QueueEntry>,
    events: broadcast::Sender<QueueEvent>,
}

impl PlayQueue {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            entries: Vec::new(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// A sender handle, so observers can subscribe without access to the queue
    pub fn event_sender(&self) -> broadcast::Sender<QueueEvent> {
        self.events.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn current(&self) -> Option<&QueueEntry> {
        self.entries.first()
    }

    pub fn current_mut(&mut self) -> Option<&mut QueueEntry> {
        self.entries.first_mut()
    }

    pub fn guids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.guid().to_string()).collect()
    }

    /// Insert at `index`, clamped to the end of the queue
    pub fn insert(&mut self, index: usize, entry: QueueEntry) {
        let index = index.min(self.entries.len());
        let guid = entry.guid().to_string();
        self.entries.insert(index, entry);
        let _ = self.events.send(QueueEvent::Inserted {
            guid,
            index,
            len: self.entries.len(),
        });
    }

    pub fn append(&mut self, entry: QueueEntry) {
        self.insert(self.entries.len(), entry);
    }

    pub fn remove(&mut self, index: usize) -> Option<QueueEntry> {
        if index >= self.entries.len() {
            return None;
        }
        let entry = self.entries.remove(index);
        let _ = self.events.send(QueueEvent::Removed {
            guid: entry.guid().to_string(),
            index,
            len: self.entries.len(),
        });
        Some(entry)
    }

    /// Make `entry` current while keeping the previous current right after it
    ///
    /// The new entry is inserted behind the current one before the current one
    /// is taken out, so the queue never passes through an empty state.
    pub fn swap_in(&mut self, entry: QueueEntry) {
        if self.entries.is_empty() {
            self.insert(0, entry);
            return;
        }

        self.insert(1, entry);
        if let Some(previous) = self.remove(0) {
            self.insert(1, previous);
        }
    }
}

impl Default for PlayQueue {
    fn default() -> Self {
        Self::new()
    }
}
