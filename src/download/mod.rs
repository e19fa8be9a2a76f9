mod filename;
mod manager;
mod record;
mod storage;

pub use filename::{
    generate_disambiguated_filename, generate_filename, generate_filename_stem, get_audio_extension,
};
pub use manager::{DownloadManager, DownloadOutcome};
pub use record::{DownloadRecord, DownloadState};
pub use storage::{PendingFile, Storage};
