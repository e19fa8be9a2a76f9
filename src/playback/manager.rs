// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, broadcast, watch};
use tracing::{debug, info};

use super::output::AudioOutput;
use super::queue::{AudioSource, PlayQueue, QueueEntry, QueueEvent};
use super::state::PlaybackState;
use crate::config::PlaybackOptions;
use crate::download::DownloadManager;
use crate::error::PlaybackError;
use crate::http::HttpClient;
use crate::item::PlayableItem;

/// Position within the current entry; only advances while playing
#[derive(Debug, Default)]
struct PlaybackClock {
    offset: Duration,
    started: Option<Instant>,
}

impl PlaybackClock {
    fn at(position: Duration) -> Self {
        Self {
            offset: position,
            started: None,
        }
    }

    fn position(&self) -> Duration {
        match self.started {
            Some(started) => self.offset + started.elapsed(),
            None => self.offset,
        }
    }

    fn start(&mut self) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
    }

    fn stop(&mut self) {
        self.offset = self.position();
        self.started = None;
    }

    fn set(&mut self, position: Duration) {
        self.offset = position;
        if self.started.is_some() {
            self.started = Some(Instant::now());
        }
    }
}

struct Player {
    queue: PlayQueue,
    state: PlaybackState,
    clock: PlaybackClock,
}

/// Drives the play queue and the play/pause state machine
///
/// The manager owns its audio output handle; nothing else activates it.
/// Queue and state live behind one async mutex, so every transition is
/// observed whole.
pub struct PlaybackManager<C: HttpClient> {
    downloads: Arc<DownloadManager<C>>,
    output: Box<dyn AudioOutput>,
    options: PlaybackOptions,
    player: Mutex<Player>,
    state_tx: watch::Sender<PlaybackState>,
    queue_events: broadcast::Sender<QueueEvent>,
}

impl<C: HttpClient> PlaybackManager<C> {
    pub fn new(
        downloads: Arc<DownloadManager<C>>,
        output: Box<dyn AudioOutput>,
        options: PlaybackOptions,
    ) -> Self {
        let queue = PlayQueue::new();
        let queue_events = queue.event_sender();

        Self {
            downloads,
            output,
            options,
            player: Mutex::new(Player {
                queue,
                state: PlaybackState::Stopped,
                clock: PlaybackClock::default(),
            }),
            state_tx: watch::Sender::new(PlaybackState::Stopped),
            queue_events,
        }
    }

    pub fn downloads(&self) -> &Arc<DownloadManager<C>> {
        &self.downloads
    }

    pub fn state(&self) -> PlaybackState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PlaybackState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe_queue(&self) -> broadcast::Receiver<QueueEvent> {
        self.queue_events.subscribe()
    }

    /// Playback position within the current item
    pub async fn position(&self) -> Duration {
        self.player.lock().await.clock.position()
    }

    pub async fn current(&self) -> Option<Arc<PlayableItem>> {
        let player = self.player.lock().await;
        player.queue.current().map(|entry| entry.item.clone())
    }

    pub async fn current_source(&self) -> Option<AudioSource> {
        let player = self.player.lock().await;
        player.queue.current().map(|entry| entry.source.clone())
    }

    pub async fn queue_guids(&self) -> Vec<String> {
        self.player.lock().await.queue.guids()
    }

    /// Play `item` now
    ///
    /// A local file is preferred; otherwise the remote URL is streamed (or
    /// downloaded first when streaming is disabled). The item replaces the
    /// current entry, and the previous current entry stays right behind it.
    pub async fn play_item(&self, item: &Arc<PlayableItem>) -> Result<(), PlaybackError> {
        let source = self.resolve_source(item).await?;
        let mut player = self.player.lock().await;
        self.output.activate()?;

        let already_current = player
            .queue
            .current()
            .is_some_and(|entry| entry.guid() == item.guid());

        if !already_current {
            player.clock.stop();
            let position = player.clock.position();
            if let Some(previous) = player.queue.current_mut() {
                previous.resume_at = position;
            }

            info!(guid = item.guid(), source = ?source, "switching to episode");
            player.queue.swap_in(QueueEntry::new(item.clone(), source));
            player.clock = PlaybackClock::default();
        }

        self.resume(&mut player);
        Ok(())
    }

    /// Resume (or start) playback of the current entry
    pub async fn play(&self) -> Result<(), PlaybackError> {
        let mut player = self.player.lock().await;
        self.start(&mut player)
    }

    pub async fn pause(&self) {
        let mut player = self.player.lock().await;
        self.halt(&mut player);
    }

    pub async fn toggle(&self) -> Result<(), PlaybackError> {
        let mut player = self.player.lock().await;
        match player.state {
            PlaybackState::Playing => {
                self.halt(&mut player);
                Ok(())
            }
            PlaybackState::Paused => self.start(&mut player),
            PlaybackState::Stopped => Ok(()),
        }
    }

    /// Move the position by `offset_secs` (negative seeks backward)
    ///
    /// Targets before zero are clamped to zero. Targets at or past the
    /// current item's duration are dropped and leave the position unchanged.
    /// Without a current item this does nothing.
    pub async fn seek_by(&self, offset_secs: f64) {
        let mut player = self.player.lock().await;
        let Some(duration) = player.queue.current().map(|entry| entry.duration) else {
            debug!("seek without a current item ignored");
            return;
        };

        let Ok(delta) = Duration::try_from_secs_f64(offset_secs.abs()) else {
            debug!(offset_secs, "seek offset out of range ignored");
            return;
        };
        let position = player.clock.position();
        let target = if offset_secs.is_sign_negative() {
            position.saturating_sub(delta)
        } else {
            position.saturating_add(delta)
        };

        if let Some(duration) = duration
            && target >= duration
        {
            debug!(?target, ?duration, "seek past end ignored");
            return;
        }

        player.clock.set(target);
    }

    pub async fn skip_forward(&self) {
        self.seek_by(self.options.skip_interval_secs).await;
    }

    pub async fn skip_backward(&self) {
        self.seek_by(-self.options.skip_interval_secs).await;
    }

    /// Drop the current entry and continue with the next one
    ///
    /// The next entry resumes where it was left. When the queue runs empty
    /// while playing, playback pauses.
    pub async fn advance(&self) -> Option<Arc<PlayableItem>> {
        let mut player = self.player.lock().await;
        let finished = player.queue.remove(0)?;
        debug!(guid = finished.guid(), "advancing past episode");

        let running = player.clock.started.is_some();
        let resume_at = player
            .queue
            .current()
            .map(|entry| entry.resume_at)
            .unwrap_or_default();
        player.clock = PlaybackClock::at(resume_at);
        if running {
            player.clock.start();
        }

        if player.queue.is_empty() {
            self.halt(&mut player);
        }

        player.queue.current().map(|entry| entry.item.clone())
    }

    /// Append an item, downloading it first if it has no local file
    ///
    /// The playback state is left as it is.
    pub async fn enqueue(&self, item: &Arc<PlayableItem>) -> Result<(), PlaybackError> {
        if item.local_path().is_none() {
            self.downloads.schedule_download(item, false).await?;
        }

        let Some(path) = item.local_path() else {
            return Err(PlaybackError::NoAudioSource {
                guid: item.guid().to_string(),
            });
        };

        let source = AudioSource::Local(self.downloads.storage().resolve(&path));
        let mut player = self.player.lock().await;
        player.queue.append(QueueEntry::new(item.clone(), source));
        debug!(guid = item.guid(), len = player.queue.len(), "enqueued episode");
        Ok(())
    }

    /// Enqueue items in order, stopping at the first failure
    ///
    /// Items enqueued before the failure stay in the queue.
    pub async fn enqueue_all(&self, items: &[Arc<PlayableItem>]) -> Result<(), PlaybackError> {
        for item in items {
            self.enqueue(item).await?;
        }
        Ok(())
    }

    async fn resolve_source(&self, item: &Arc<PlayableItem>) -> Result<AudioSource, PlaybackError> {
        let no_source = || PlaybackError::NoAudioSource {
            guid: item.guid().to_string(),
        };

        if let Some(path) = item.local_path() {
            return Ok(AudioSource::Local(self.downloads.storage().resolve(&path)));
        }

        let url = item.audio_url().ok_or_else(no_source)?;
        if self.options.stream_remote {
            return Ok(AudioSource::Stream(url.clone()));
        }

        self.downloads.schedule_download(item, false).await?;
        item.local_path()
            .map(|path| AudioSource::Local(self.downloads.storage().resolve(&path)))
            .ok_or_else(no_source)
    }

    fn start(&self, player: &mut Player) -> Result<(), PlaybackError> {
        self.output.activate()?;
        self.resume(player);
        Ok(())
    }

    /// Playing; the output must already be active
    fn resume(&self, player: &mut Player) {
        player.clock.start();
        self.transition(player, PlaybackState::Playing);
    }

    /// Playing -> Paused; every other state is left alone
    fn halt(&self, player: &mut Player) {
        if player.state != PlaybackState::Playing {
            return;
        }
        player.clock.stop();
        self.output.deactivate(true);
        self.transition(player, PlaybackState::Paused);
    }

    fn transition(&self, player: &mut Player, state: PlaybackState) {
        if player.state != state {
            debug!(from = %player.state, to = %state, "playback state changed");
        }
        player.state = state;
        self.state_tx.send_replace(state);
    }
}
