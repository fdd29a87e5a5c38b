//! Phase sequencing: four game/study rounds followed by one long study block.

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::alerts::{AlertSoundTable, ChannelTimings, FocusMonitor, WatchOutcome};
use crate::config::{Config, GeneralConfig};
use crate::error::EngineError;
use crate::launcher::{ApplicationLauncher, LaunchKind, LaunchOutcome};
use crate::session::{CancelSignal, PhaseKind, SessionPhase, StatusBoard};
use crate::system::{AudioPlaybackInterface, ProcessLauncherInterface, WindowSystemInterface};

/// Game/study rounds before the long study block
pub const REPETITIONS: u8 = 4;

pub const COMPLETE_LABEL: &str = "All Cycles Complete";
pub const STOPPED_LABEL: &str = "Session Stopped";

/// One scheduled phase, fixed once the session starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseSpec {
    pub kind: PhaseKind,
    /// 1-based round number; `None` for the long study block
    pub repetition: Option<u8>,
    pub launch_path: String,
    pub launch_title: String,
    pub focus_title: String,
    pub duration: Duration,
}

impl PhaseSpec {
    pub fn new(
        kind: PhaseKind,
        repetition: Option<u8>,
        launch_path: impl Into<String>,
        title: impl Into<String>,
        duration: Duration,
    ) -> Self {
        let title = title.into();
        Self {
            kind,
            repetition,
            launch_path: launch_path.into(),
            launch_title: title.clone(),
            focus_title: title,
            duration,
        }
    }

    pub fn label(&self) -> String {
        let round = self.repetition.unwrap_or(REPETITIONS);
        match self.kind {
            PhaseKind::Distraction => format!("Game Time ({}/{})", round, REPETITIONS),
            PhaseKind::ShortFocus => format!("Study Time ({}/{})", round, REPETITIONS),
            PhaseKind::LongFocus => "Long Study Session".to_string(),
        }
    }

    pub fn launch_kind(&self) -> LaunchKind {
        match self.kind {
            PhaseKind::Distraction => LaunchKind::Distraction,
            PhaseKind::ShortFocus | PhaseKind::LongFocus => LaunchKind::Study,
        }
    }
}

/// Clock settings for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineTimings {
    pub tick: Duration,
    pub escalation_interval: Duration,
    pub launch_settle: Duration,
    pub terminate_grace: Duration,
    pub channel: ChannelTimings,
}

impl EngineTimings {
    pub fn from_config(general: &GeneralConfig) -> Self {
        Self {
            // A zero tick would spin
            tick: Duration::from_millis(general.tick_interval_ms.max(10)),
            escalation_interval: Duration::from_secs(general.escalation_interval_secs.max(1)),
            launch_settle: Duration::from_millis(general.launch_settle_ms),
            terminate_grace: Duration::from_millis(general.terminate_grace_ms),
            channel: ChannelTimings::default(),
        }
    }
}

impl Default for EngineTimings {
    fn default() -> Self {
        Self::from_config(&GeneralConfig::default())
    }
}

/// Everything a session needs, resolved from configuration at start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPlan {
    pub phases: Vec<PhaseSpec>,
    pub sounds: AlertSoundTable,
    pub timings: EngineTimings,
}

impl SessionPlan {
    pub fn new(phases: Vec<PhaseSpec>, sounds: AlertSoundTable, timings: EngineTimings) -> Self {
        Self {
            phases,
            sounds,
            timings,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, EngineError> {
        let settings = &config.settings;
        if settings.game_path.trim().is_empty() {
            return Err(EngineError::ConfigMissing("game_path"));
        }
        if settings.study_app_path.trim().is_empty() {
            return Err(EngineError::ConfigMissing("study_app_path"));
        }

        let game = config.durations.game();
        let short_study = config.durations.short_study();
        let long_study = config.durations.long_study();

        let mut phases = Vec::with_capacity(usize::from(REPETITIONS) * 2 + 1);
        for round in 1..=REPETITIONS {
            phases.push(PhaseSpec::new(
                PhaseKind::Distraction,
                Some(round),
                &settings.game_path,
                &settings.game_title,
                game,
            ));
            phases.push(PhaseSpec::new(
                PhaseKind::ShortFocus,
                Some(round),
                &settings.study_app_path,
                &settings.study_app_title,
                short_study,
            ));
        }
        phases.push(PhaseSpec::new(
            PhaseKind::LongFocus,
            None,
            &settings.study_app_path,
            &settings.study_app_title,
            long_study,
        ));

        Ok(Self::new(
            phases,
            AlertSoundTable::from_settings(&config.sounds),
            EngineTimings::from_config(&config.general),
        ))
    }

    /// Sum of all focus-watch durations, excluding launch settling.
    /// Saturates at `Duration::MAX`.
    pub fn total_duration(&self) -> Duration {
        self.phases
            .iter()
            .fold(Duration::ZERO, |total, phase| total.saturating_add(phase.duration))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Complete,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub phases_started: usize,
    /// Launch failures absorbed along the way
    pub launch_errors: Vec<EngineError>,
}

/// Runs phases in order: launch, settle, then watch focus until the
/// phase duration elapses
pub struct PhaseScheduler<W, P, A>
where
    W: WindowSystemInterface,
    P: ProcessLauncherInterface,
    A: AudioPlaybackInterface,
{
    launcher: ApplicationLauncher<W, P>,
    monitor: FocusMonitor<W, A>,
    status: StatusBoard,
    launch_settle: Duration,
}

impl<W, P, A> PhaseScheduler<W, P, A>
where
    W: WindowSystemInterface,
    P: ProcessLauncherInterface,
    A: AudioPlaybackInterface,
{
    pub fn new(
        launcher: ApplicationLauncher<W, P>,
        monitor: FocusMonitor<W, A>,
        status: StatusBoard,
        launch_settle: Duration,
    ) -> Self {
        Self {
            launcher,
            monitor,
            status,
            launch_settle,
        }
    }

    pub fn run(&self, phases: &[PhaseSpec], cancel: &CancelSignal) -> RunReport {
        let mut report = RunReport {
            outcome: RunOutcome::Complete,
            phases_started: 0,
            launch_errors: Vec::new(),
        };

        for (index, spec) in phases.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("Session cancelled before phase {}", index + 1);
                report.outcome = RunOutcome::Cancelled;
                break;
            }

            let label = spec.label();
            info!(
                "Starting phase {}/{}: {} ({:?})",
                index + 1,
                phases.len(),
                label,
                spec.duration
            );
            report.phases_started += 1;
            self.status.publish(|s| {
                s.phase = SessionPhase::Running {
                    index,
                    kind: spec.kind,
                };
                s.label = label;
                s.time_remaining = spec.duration;
                s.alert_stage = 0;
                s.running = true;
            });

            match self.launcher.ensure_running(spec) {
                Ok(LaunchOutcome::Activated(window)) => {
                    debug!("Phase {} reuses window '{}'", index + 1, window.title)
                }
                Ok(LaunchOutcome::Spawned(handle)) => {
                    debug!("Phase {} launched pid {}", index + 1, handle.pid)
                }
                Err(e) => {
                    // Best effort: watch for the window anyway
                    warn!("Launch failed, continuing with focus watch: {}", e);
                    let message = e.to_string();
                    self.status.publish(|s| s.last_error = Some(message));
                    report.launch_errors.push(e);
                }
            }

            if !self.launch_settle.is_zero() && cancel.wait_timeout(self.launch_settle) {
                report.outcome = RunOutcome::Cancelled;
                break;
            }

            if self.monitor.watch(&spec.focus_title, spec.duration, cancel) == WatchOutcome::Cancelled
            {
                report.outcome = RunOutcome::Cancelled;
                break;
            }
        }

        self.publish_finished(report.outcome);
        info!(
            "Session finished: {:?} after {} phase(s), {} launch error(s)",
            report.outcome,
            report.phases_started,
            report.launch_errors.len()
        );
        report
    }

    fn publish_finished(&self, outcome: RunOutcome) {
        let (phase, label) = match outcome {
            RunOutcome::Complete => (SessionPhase::Complete, COMPLETE_LABEL),
            RunOutcome::Cancelled => (SessionPhase::Cancelled, STOPPED_LABEL),
        };
        self.status.publish(|s| {
            s.phase = phase;
            s.label = label.to_string();
            s.time_remaining = Duration::ZERO;
            s.alert_stage = 0;
            s.running = false;
        });
    }
}
