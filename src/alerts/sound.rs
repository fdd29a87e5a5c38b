//! Looping alert sounds, one channel per armed alert stage.
//!
//! Channels live in a fixed array indexed by stage. `stop_all` signals every
//! channel first and then waits a bounded time for each one to exit.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{FALLBACK_TONE, SoundSettings};
use crate::error::EngineError;
use crate::session::{CancelSignal, MAX_ALERT_STAGE};
use crate::system::AudioPlaybackInterface;

pub const STAGE_COUNT: usize = MAX_ALERT_STAGE as usize + 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoundResource {
    /// Built-in fallback tone
    Tone,
    File(PathBuf),
}

impl SoundResource {
    pub fn from_setting(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value == FALLBACK_TONE {
            SoundResource::Tone
        } else {
            SoundResource::File(PathBuf::from(value))
        }
    }
}

/// Sound per alert stage, fixed for the length of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertSoundTable {
    stages: [SoundResource; STAGE_COUNT],
}

impl AlertSoundTable {
    pub fn from_settings(settings: &SoundSettings) -> Self {
        Self {
            stages: std::array::from_fn(|stage| {
                settings
                    .stage(stage as u8)
                    .map(SoundResource::from_setting)
                    .unwrap_or(SoundResource::Tone)
            }),
        }
    }

    /// Sound for `stage`; stages past the last reuse its sound
    pub fn resource(&self, stage: u8) -> &SoundResource {
        &self.stages[usize::from(stage.min(MAX_ALERT_STAGE))]
    }
}

impl Default for AlertSoundTable {
    fn default() -> Self {
        Self {
            stages: std::array::from_fn(|_| SoundResource::Tone),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelTimings {
    /// How long `stop_all` waits for each channel to acknowledge
    pub join_timeout: Duration,
    /// Pause after a tone or a failed play
    pub retry_pause: Duration,
    /// Pause between successful plays of a file
    pub replay_gap: Duration,
}

impl Default for ChannelTimings {
    fn default() -> Self {
        Self {
            join_timeout: Duration::from_millis(200),
            retry_pause: Duration::from_secs(1),
            replay_gap: Duration::from_millis(100),
        }
    }
}

struct SoundChannel {
    stop: CancelSignal,
    // Disconnects when the channel thread exits
    finished: Receiver<()>,
    handle: JoinHandle<()>,
}

pub struct SoundChannelManager<A: AudioPlaybackInterface> {
    playback: Arc<A>,
    table: AlertSoundTable,
    timings: ChannelTimings,
    channels: Mutex<[Option<SoundChannel>; STAGE_COUNT]>,
}

impl<A: AudioPlaybackInterface> SoundChannelManager<A> {
    pub fn new(playback: Arc<A>, table: AlertSoundTable) -> Self {
        Self::with_timings(playback, table, ChannelTimings::default())
    }

    pub fn with_timings(playback: Arc<A>, table: AlertSoundTable, timings: ChannelTimings) -> Self {
        Self {
            playback,
            table,
            timings,
            channels: Mutex::new(std::array::from_fn(|_| None)),
        }
    }

    /// Start a channel for every stage in `stages` that is not already playing.
    ///
    /// Returns how many channels were started.
    pub fn ensure_active<I>(&self, stages: I) -> usize
    where
        I: IntoIterator<Item = u8>,
    {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let mut started = 0;

        for stage in stages {
            if stage > MAX_ALERT_STAGE {
                warn!("Ignoring request for unknown alert stage {}", stage);
                continue;
            }
            let slot = &mut channels[usize::from(stage)];

            // A channel whose thread already died is replaced
            if let Some(channel) = slot.as_ref() {
                if !matches!(channel.finished.try_recv(), Err(mpsc::TryRecvError::Disconnected)) {
                    continue;
                }
                debug!("Sound channel for stage {} exited on its own, restarting", stage);
                *slot = None;
            }

            match self.spawn_channel(stage) {
                Ok(channel) => {
                    *slot = Some(channel);
                    started += 1;
                    info!("Started sound channel for alert stage {}", stage);
                }
                Err(e) => warn!("Could not start sound channel for stage {}: {}", stage, e),
            }
        }

        started
    }

    /// Stop every channel and wait for each to acknowledge.
    ///
    /// Returns how many channels were stopped.
    pub fn stop_all(&self) -> usize {
        let taken: Vec<(usize, SoundChannel)> = {
            let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
            channels
                .iter_mut()
                .enumerate()
                .filter_map(|(stage, slot)| slot.take().map(|channel| (stage, channel)))
                .collect()
        };

        if taken.is_empty() {
            return 0;
        }

        debug!("Stopping {} sound channels", taken.len());
        for (_, channel) in &taken {
            channel.stop.cancel();
        }

        let count = taken.len();
        for (stage, channel) in taken {
            match channel.finished.recv_timeout(self.timings.join_timeout) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    if channel.handle.join().is_err() {
                        warn!("Sound channel for stage {} panicked", stage);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    // Its stop flag is set; the thread exits after the current play
                    warn!(
                        "Sound channel for stage {} did not stop within {:?}",
                        stage, self.timings.join_timeout
                    );
                }
            }
        }

        info!("All sound channels stopped");
        count
    }

    /// Stages with a channel currently armed
    pub fn active_stages(&self) -> Vec<u8> {
        let channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(stage, _)| stage as u8)
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.active_stages().len()
    }

    pub fn is_silent(&self) -> bool {
        self.active_count() == 0
    }

    fn spawn_channel(&self, stage: u8) -> std::io::Result<SoundChannel> {
        let stop = CancelSignal::new();
        let (done_tx, finished) = mpsc::channel();
        let worker = ChannelLoop {
            stage,
            playback: Arc::clone(&self.playback),
            resource: self.table.resource(stage).clone(),
            stop: stop.clone(),
            timings: self.timings,
        };

        let handle = thread::Builder::new()
            .name(format!("alert-stage-{stage}"))
            .spawn(move || worker.run(done_tx))?;

        Ok(SoundChannel {
            stop,
            finished,
            handle,
        })
    }
}

impl<A: AudioPlaybackInterface> Drop for SoundChannelManager<A> {
    fn drop(&mut self) {
        self.stop_all();
    }
}

struct ChannelLoop<A: AudioPlaybackInterface> {
    stage: u8,
    playback: Arc<A>,
    resource: SoundResource,
    stop: CancelSignal,
    timings: ChannelTimings,
}

impl<A: AudioPlaybackInterface> ChannelLoop<A> {
    fn run(self, _done: Sender<()>) {
        let mut failures = 0usize;

        while !self.stop.is_cancelled() {
            let pause = match &self.resource {
                SoundResource::File(path) => match self.playback.play_blocking(path, &self.stop) {
                    Ok(()) => self.timings.replay_gap,
                    Err(e) => {
                        failures += 1;
                        let error = EngineError::Playback {
                            resource: path.display().to_string(),
                            reason: e.to_string(),
                        };
                        if failures == 1 {
                            warn!("{}. Falling back to tone for stage {}", error, self.stage);
                        } else {
                            debug!("{} (failure {})", error, failures);
                        }
                        self.ring_tone();
                        self.timings.retry_pause
                    }
                },
                SoundResource::Tone => {
                    self.ring_tone();
                    self.timings.retry_pause
                }
            };

            if self.stop.wait_timeout(pause) {
                break;
            }
        }

        debug!("Sound channel for stage {} exiting", self.stage);
    }

    fn ring_tone(&self) {
        if let Err(e) = self.playback.play_tone(&self.stop) {
            debug!("Fallback tone failed for stage {}: {}", self.stage, e);
        }
    }
}
