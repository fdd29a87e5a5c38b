//! Focus polling and alert-stage escalation for the running phase.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::session::{CancelSignal, MAX_ALERT_STAGE, StatusBoard};
use crate::system::{AudioPlaybackInterface, WindowSystemInterface};

use super::sound::SoundChannelManager;

/// Case-insensitive substring match of the enforced title against the
/// active window title
pub fn title_matches(active_title: &str, target_title: &str) -> bool {
    active_title
        .to_lowercase()
        .contains(&target_title.to_lowercase())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusObservation {
    /// Target has focus; `cleared_alert` if an alert was active until now
    Focused { cleared_alert: bool },
    /// Target lost; `escalated` if this observation raised the stage
    Lost { stage: u8, escalated: bool },
}

/// Alert stage bookkeeping, free of clocks and threads.
///
/// The stage rises by one per `interval` of continuous loss, capped at
/// `MAX_ALERT_STAGE`, and drops to 0 on any focused observation.
#[derive(Debug, Clone)]
pub struct EscalationTracker {
    interval: Duration,
    stage: u8,
    lost_since: Option<Instant>,
}

impl EscalationTracker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            stage: 0,
            lost_since: None,
        }
    }

    pub fn observe(&mut self, focused: bool, now: Instant) -> FocusObservation {
        if focused {
            let cleared_alert = self.stage > 0 || self.lost_since.is_some();
            self.stage = 0;
            self.lost_since = None;
            return FocusObservation::Focused { cleared_alert };
        }

        let since = *self.lost_since.get_or_insert(now);
        let escalated =
            now.saturating_duration_since(since) >= self.interval && self.stage < MAX_ALERT_STAGE;
        if escalated {
            self.stage += 1;
            // Next stage needs another full interval of loss
            self.lost_since = Some(now);
        }

        FocusObservation::Lost {
            stage: self.stage,
            escalated,
        }
    }

    pub fn stage(&self) -> u8 {
        self.stage
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    Elapsed,
    Cancelled,
}

/// Polls the active window once per tick and drives the alert sounds
pub struct FocusMonitor<W: WindowSystemInterface, A: AudioPlaybackInterface> {
    window_system: Arc<W>,
    sounds: Arc<SoundChannelManager<A>>,
    status: StatusBoard,
    tick: Duration,
    escalation_interval: Duration,
}

impl<W: WindowSystemInterface, A: AudioPlaybackInterface> FocusMonitor<W, A> {
    pub fn new(
        window_system: Arc<W>,
        sounds: Arc<SoundChannelManager<A>>,
        status: StatusBoard,
        tick: Duration,
        escalation_interval: Duration,
    ) -> Self {
        Self {
            window_system,
            sounds,
            status,
            tick,
            escalation_interval,
        }
    }

    /// Enforce focus on `target_title` for `duration` of wall-clock time or
    /// until `cancel` fires. All sounds are stopped on return.
    pub fn watch(
        &self,
        target_title: &str,
        duration: Duration,
        cancel: &CancelSignal,
    ) -> WatchOutcome {
        info!("Watching focus on '{}' for {:?}", target_title, duration);

        let started = Instant::now();
        let mut tracker = EscalationTracker::new(self.escalation_interval);
        let mut query_failures = 0usize;

        self.status.publish(|s| {
            s.time_remaining = duration;
            s.alert_stage = 0;
        });

        let outcome = loop {
            if cancel.is_cancelled() {
                break WatchOutcome::Cancelled;
            }
            if started.elapsed() >= duration {
                break WatchOutcome::Elapsed;
            }

            let focused = self.is_focused(target_title, &mut query_failures);
            match tracker.observe(focused, Instant::now()) {
                FocusObservation::Focused { cleared_alert } => {
                    if cleared_alert || !self.sounds.is_silent() {
                        info!("Focus regained on '{}', silencing alerts", target_title);
                        self.sounds.stop_all();
                    }
                }
                FocusObservation::Lost { stage, escalated } => {
                    if escalated {
                        info!("Alert stage increased to: {}", stage);
                    }
                    self.sounds.ensure_active(0..=stage);
                }
            }

            let remaining = duration.saturating_sub(started.elapsed());
            let stage = tracker.stage();
            self.status.publish(|s| {
                s.time_remaining = remaining;
                s.alert_stage = stage;
            });

            if cancel.wait_timeout(self.tick.min(remaining)) {
                break WatchOutcome::Cancelled;
            }
        };

        self.sounds.stop_all();
        let remaining = duration.saturating_sub(started.elapsed());
        self.status.publish(|s| {
            s.time_remaining = remaining;
            s.alert_stage = 0;
        });

        info!(
            "Focus monitoring ended for '{}' ({:?})",
            target_title, outcome
        );
        outcome
    }

    /// Unknown focus (query failure or no active window) counts as lost
    fn is_focused(&self, target_title: &str, query_failures: &mut usize) -> bool {
        match self.window_system.active_window_title() {
            Ok(Some(active)) => {
                *query_failures = 0;
                let focused = title_matches(&active, target_title);
                if !focused {
                    debug!("Focus lost! Active: '{}'", active);
                }
                focused
            }
            Ok(None) => {
                *query_failures = 0;
                debug!("No active window, treating focus as lost");
                false
            }
            Err(e) => {
                *query_failures += 1;
                let error = EngineError::WindowQuery(e.to_string());
                if *query_failures == 1 {
                    warn!("{}; treating focus as lost", error);
                } else {
                    debug!("{} ({} in a row)", error, query_failures);
                }
                false
            }
        }
    }
}
