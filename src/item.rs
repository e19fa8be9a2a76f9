use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use tokio::sync::watch;
use url::Url;

use crate::error::ConfigError;

/// Kind of a media attachment on an episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Image,
    Unknown,
}

/// A media attachment (audio enclosure, cover image, ...)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MediaContent {
    pub kind: MediaKind,
    pub url: Url,
    #[serde(default)]
    pub mime_type: Option<String>,
}

impl MediaContent {
    pub fn audio(url: Url) -> Self {
        Self {
            kind: MediaKind::Audio,
            url,
            mime_type: None,
        }
    }
}

/// An episode as seen by the download and playback core
///
/// The episode store owns these; the core only reads the audio URL and local
/// path and writes the local path and the progress percentage. Both mutable
/// fields use interior mutability so items can be shared as
/// `Arc<PlayableItem>` between the UI, the downloads and the play queue.
#[derive(Debug)]
pub struct PlayableItem {
    guid: String,
    title: String,
    pub_date: Option<DateTime<FixedOffset>>,
    media: Vec<MediaContent>,
    duration_hint: Option<Duration>,
    local_path: RwLock<Option<PathBuf>>,
    progress: watch::Sender<u8>,
}

impl PlayableItem {
    pub fn new(guid: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            guid: guid.into(),
            title: title.into(),
            pub_date: None,
            media: Vec::new(),
            duration_hint: None,
            local_path: RwLock::new(None),
            progress: watch::Sender::new(0),
        }
    }

    pub fn with_media(mut self, content: MediaContent) -> Self {
        self.media.push(content);
        self
    }

    pub fn with_audio_url(self, url: Url) -> Self {
        self.with_media(MediaContent::audio(url))
    }

    pub fn with_pub_date(mut self, pub_date: DateTime<FixedOffset>) -> Self {
        self.pub_date = Some(pub_date);
        self
    }

    pub fn with_duration_hint(mut self, duration: Duration) -> Self {
        self.duration_hint = Some(duration);
        self
    }

    /// Attach an existing download (relative to the storage root)
    pub fn with_local_path(self, path: impl Into<PathBuf>) -> Self {
        self.set_local_path(path.into());
        self
    }

    pub fn guid(&self) -> &str {
        &self.guid
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn pub_date(&self) -> Option<DateTime<FixedOffset>> {
        self.pub_date
    }

    pub fn media(&self) -> &[MediaContent] {
        &self.media
    }

    pub fn duration_hint(&self) -> Option<Duration> {
        self.duration_hint
    }

    /// The first audio attachment, which is what gets downloaded and played
    pub fn audio(&self) -> Option<&MediaContent> {
        self.media.iter().find(|m| m.kind == MediaKind::Audio)
    }

    pub fn audio_url(&self) -> Option<&Url> {
        self.audio().map(|m| &m.url)
    }

    /// Path of the downloaded file, relative to the storage root
    pub fn local_path(&self) -> Option<PathBuf> {
        self.local_path
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_downloaded(&self) -> bool {
        self.local_path().is_some()
    }

    pub(crate) fn set_local_path(&self, path: PathBuf) {
        *self
            .local_path
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(path);
    }

    pub(crate) fn clear_local_path(&self) {
        *self
            .local_path
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Current download progress in percent (0-100)
    pub fn progress(&self) -> u8 {
        *self.progress.borrow()
    }

    /// Observe progress changes; receivers only see the latest value
    pub fn subscribe_progress(&self) -> watch::Receiver<u8> {
        self.progress.subscribe()
    }

    pub(crate) fn set_progress(&self, percent: u8) {
        self.progress.send_replace(percent.min(100));
    }
}

/// JSON description of an item, as handed over by an episode store
#[derive(Debug, Clone, Deserialize)]
pub struct ItemSpec {
    pub guid: String,
    pub title: String,
    #[serde(default)]
    pub audio_url: Option<Url>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub media: Vec<MediaContent>,
    #[serde(default)]
    pub pub_date: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub duration_secs: Option<u64>,
    #[serde(default)]
    pub local_path: Option<PathBuf>,
}

impl From<ItemSpec> for PlayableItem {
    fn from(spec: ItemSpec) -> Self {
        let mut item = PlayableItem::new(spec.guid, spec.title);

        if let Some(url) = spec.audio_url {
            item = item.with_media(MediaContent {
                kind: MediaKind::Audio,
                url,
                mime_type: spec.mime_type,
            });
        }
        for content in spec.media {
            item = item.with_media(content);
        }
        if let Some(pub_date) = spec.pub_date {
            item = item.with_pub_date(pub_date);
        }
        if let Some(secs) = spec.duration_secs {
            item = item.with_duration_hint(Duration::from_secs(secs));
        }
        if let Some(path) = spec.local_path {
            item = item.with_local_path(path);
        }

        item
    }
}

/// Read a JSON array of item descriptions
pub fn load_items(path: &Path) -> Result<Vec<Arc<PlayableItem>>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ItemsReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    let specs: Vec<ItemSpec> =
        serde_json::from_str(&content).map_err(|e| ConfigError::ItemsParseFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    Ok(specs
        .into_iter()
        .map(|spec| Arc::new(PlayableItem::from(spec)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn audio_url_skips_non_audio_media() {
        let item = PlayableItem::new("guid-1", "Episode 1")
            .with_media(MediaContent {
                kind: MediaKind::Image,
                url: Url::parse("https://example.com/cover.jpg").unwrap(),
                mime_type: None,
            })
            .with_audio_url(Url::parse("https://example.com/ep1.mp3").unwrap());

        assert_eq!(
            item.audio_url().map(Url::as_str),
            Some("https://example.com/ep1.mp3")
        );
    }

    #[test]
    fn item_without_audio_has_no_url() {
        let item = PlayableItem::new("guid-1", "Episode 1");
        assert!(item.audio_url().is_none());
    }

    #[test]
    fn progress_is_capped_and_observable() {
        let item = PlayableItem::new("guid-1", "Episode 1");
        let rx = item.subscribe_progress();

        item.set_progress(150);

        assert_eq!(item.progress(), 100);
        assert_eq!(*rx.borrow(), 100);
    }

    #[test]
    fn local_path_can_be_set_and_cleared() {
        let item = PlayableItem::new("guid-1", "Episode 1").with_local_path("downloads/ep.mp3");
        assert_eq!(item.local_path(), Some(PathBuf::from("downloads/ep.mp3")));

        item.clear_local_path();
        assert!(!item.is_downloaded());
    }

    #[test]
    fn load_items_reads_json_array() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("items.json");
        std::fs::write(
            &path,
            r#"[
                {
                    "guid": "ep1",
                    "title": "Episode 1",
                    "audio_url": "https://example.com/ep1.mp3",
                    "pub_date": "2024-01-15T12:00:00+00:00",
                    "duration_secs": 1800
                },
                {
                    "guid": "ep2",
                    "title": "Episode 2",
                    "local_path": "downloads/ep2.mp3"
                }
            ]"#,
        )
        .unwrap();

        let items = load_items(&path).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].guid(), "ep1");
        assert_eq!(items[0].duration_hint(), Some(Duration::from_secs(1800)));
        assert!(items[0].pub_date().is_some());
        assert!(items[1].audio_url().is_none());
        assert!(items[1].is_downloaded());
    }

    #[test]
    fn load_items_reports_bad_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("items.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            load_items(&path),
            Err(ConfigError::ItemsParseFailed { .. })
        ));
    }
}
