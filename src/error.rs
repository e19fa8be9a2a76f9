use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while acquiring an episode's audio file
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP request failed for {url}: {source}")]
    HttpFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Stream error while downloading {url}: {source}")]
    StreamFailed {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove existing download {path}: {source}")]
    RemoveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to save download to {path}: {source}")]
    FailedToSave {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Download of {url} was cancelled by a forced restart")]
    Cancelled { url: String },

    #[error("In-flight download of {url} failed: {reason}")]
    InFlightFailed { url: String, reason: String },
}

impl DownloadError {
    /// Whether the failure happened on the network side rather than on disk
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::HttpFailed { .. }
                | Self::HttpStatus { .. }
                | Self::StreamFailed { .. }
                | Self::Cancelled { .. }
                | Self::InFlightFailed { .. }
        )
    }
}

/// Errors raised by the shared audio output resource
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioOutputError {
    #[error("Audio output is held by another player")]
    Busy,
}

/// Errors that can occur during playback control
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Episode {guid} has neither a local file nor a remote audio URL")]
    NoAudioSource { guid: String },

    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    #[error("Audio output error: {0}")]
    Output(#[from] AudioOutputError),
}

/// Errors that can occur when loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to read item list {path}: {source}")]
    ItemsReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse item list {path}: {source}")]
    ItemsParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
