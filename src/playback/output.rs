use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::error::AudioOutputError;

/// The audio output a playback manager drives
///
/// Implementations must be exclusive: while one handle is active, activating
/// another handle on the same device fails.
pub trait AudioOutput: Send + Sync {
    fn activate(&self) -> Result<(), AudioOutputError>;

    /// Release the output. With `notify_others`, other audio consumers on the
    /// device are told they may resume.
    fn deactivate(&self, notify_others: bool);

    fn is_active(&self) -> bool;
}

/// An exclusive audio device (the host's shared audio session)
#[derive(Debug, Default)]
pub struct AudioDevice {
    /// Session id of the current owner, 0 when free
    owner: AtomicU64,
    next_session: AtomicU64,
    resume_notifications: AtomicU64,
}

impl AudioDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The process-wide device
    pub fn system() -> Arc<Self> {
        static SYSTEM: OnceLock<Arc<AudioDevice>> = OnceLock::new();
        SYSTEM.get_or_init(AudioDevice::new).clone()
    }

    pub fn is_claimed(&self) -> bool {
        self.owner.load(Ordering::Acquire) != 0
    }

    /// How many times other consumers were told they may resume
    pub fn resume_notifications(&self) -> u64 {
        self.resume_notifications.load(Ordering::Relaxed)
    }

    /// Hand out a handle; the handle does not claim the device until activated
    pub fn session(self: &Arc<Self>) -> AudioSession {
        let id = self.next_session.fetch_add(1, Ordering::Relaxed) + 1;
        AudioSession {
            device: self.clone(),
            id,
        }
    }
}

/// A handle on an [`AudioDevice`], owned by exactly one playback manager
#[derive(Debug)]
pub struct AudioSession {
    device: Arc<AudioDevice>,
    id: u64,
}

impl AudioSession {
    pub fn device(&self) -> &Arc<AudioDevice> {
        &self.device
    }
}

impl AudioOutput for AudioSession {
    fn activate(&self) -> Result<(), AudioOutputError> {
        match self
            .device
            .owner
            .compare_exchange(0, self.id, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                debug!(session = self.id, "audio output activated");
                Ok(())
            }
            Err(owner) if owner == self.id => Ok(()),
            Err(_) => Err(AudioOutputError::Busy),
        }
    }

    fn deactivate(&self, notify_others: bool) {
        let released = self
            .device
            .owner
            .compare_exchange(self.id, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if released && notify_others {
            self.device
                .resume_notifications
                .fetch_add(1, Ordering::Relaxed);
            debug!(session = self.id, "audio output released, others may resume");
        }
    }

    fn is_active(&self) -> bool {
        self.device.owner.load(Ordering::Acquire) == self.id
    }
}

impl Drop for AudioSession {
    fn drop(&mut self) {
        self.deactivate(false);
    }
}
