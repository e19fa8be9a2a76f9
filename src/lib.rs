pub mod config;
pub mod download;
pub mod error;
pub mod http;
pub mod item;
pub mod playback;
pub mod progress;
pub mod shuffle;

// Re-export main types for convenience
pub use config::{Config, PlaybackOptions, ShuffleConfig, StorageConfig, TransportConfig};
pub use download::{
    DownloadManager, DownloadOutcome, DownloadRecord, DownloadState, Storage,
    generate_disambiguated_filename, generate_filename, generate_filename_stem,
    get_audio_extension,
};
pub use error::{AudioOutputError, ConfigError, DownloadError, PlaybackError};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use item::{ItemSpec, MediaContent, MediaKind, PlayableItem, load_items};
pub use playback::{
    AudioDevice, AudioOutput, AudioSession, AudioSource, PlaybackManager, PlaybackState,
    QueueEntry, QueueEvent,
};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use shuffle::{MillerShuffle, ShuffleStrategy, Shuffler, UniformShuffle};
