mod manager;
mod output;
mod queue;
mod state;

pub use manager::PlaybackManager;
pub use output::{AudioDevice, AudioOutput, AudioSession};
pub use queue::{AudioSource, PlayQueue, QueueEntry, QueueEvent};
pub use state::PlaybackState;
