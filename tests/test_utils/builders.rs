//! Test utility builders for configurations, session plans and a mock rig
//!
//! Individual methods may not be used by all tests, so dead code warnings are suppressed.

#![allow(dead_code)]

use focus_enforcer::alerts::{AlertSoundTable, ChannelTimings};
use focus_enforcer::config::Config;
use focus_enforcer::notifications::{NotificationManager, TestNotificationSender};
use focus_enforcer::scheduler::{EngineTimings, PhaseSpec, SessionPlan};
use focus_enforcer::service::SessionController;
use focus_enforcer::session::PhaseKind;
use focus_enforcer::system::{MockAudioPlayback, MockProcessLauncher, MockWindowSystem};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub const GAME_TITLE: &str = "Chess";
pub const STUDY_TITLE: &str = "StudyApp";

/// Millisecond-scale timings so whole sessions run in a test
pub fn fast_timings() -> EngineTimings {
    EngineTimings {
        tick: Duration::from_millis(5),
        escalation_interval: Duration::from_millis(40),
        launch_settle: Duration::ZERO,
        terminate_grace: Duration::from_millis(30),
        channel: ChannelTimings {
            join_timeout: Duration::from_millis(200),
            retry_pause: Duration::from_millis(5),
            replay_gap: Duration::from_millis(1),
        },
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Builder for creating test Config instances
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        let mut config = Config::default();
        config.general.launch_settle_ms = 0;
        config.general.terminate_grace_ms = 30;
        config.settings.game_path = "/usr/games/chess".to_string();
        config.settings.game_title = GAME_TITLE.to_string();
        config.settings.study_app_path = "studyapp --notes".to_string();
        config.settings.study_app_title = STUDY_TITLE.to_string();
        Self { config }
    }

    pub fn unconfigured() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn game(mut self, path: &str, title: &str) -> Self {
        self.config.settings.game_path = path.to_string();
        self.config.settings.game_title = title.to_string();
        self
    }

    pub fn study(mut self, path: &str, title: &str) -> Self {
        self.config.settings.study_app_path = path.to_string();
        self.config.settings.study_app_title = title.to_string();
        self
    }

    pub fn minutes(mut self, game: &str, short_study: &str, long_study: &str) -> Self {
        self.config.durations.game_min = game.to_string();
        self.config.durations.short_study_min = short_study.to_string();
        self.config.durations.long_study_min = long_study.to_string();
        self
    }

    pub fn stage_sound(mut self, stage: u8, sound: &str) -> Self {
        self.config.sounds.set_stage(stage, sound);
        self
    }

    pub fn notifications(mut self, enabled: bool) -> Self {
        self.config.notifications.session_complete = enabled;
        self.config.notifications.session_errors = enabled;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for SessionPlan instances with short phases
pub struct PlanBuilder {
    phases: Vec<PhaseSpec>,
    sounds: AlertSoundTable,
    timings: EngineTimings,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self {
            phases: Vec::new(),
            sounds: AlertSoundTable::default(),
            timings: fast_timings(),
        }
    }

    /// The full nine-phase plan from `config`, every phase shortened to `phase_length`
    pub fn from_config(config: &Config, phase_length: Duration) -> Self {
        let plan = SessionPlan::from_config(config).expect("config has both paths");
        Self {
            phases: plan
                .phases
                .into_iter()
                .map(|mut phase| {
                    phase.duration = phase_length;
                    phase
                })
                .collect(),
            sounds: plan.sounds,
            timings: fast_timings(),
        }
    }

    pub fn game_phase(mut self, duration: Duration) -> Self {
        let round = self.next_round(PhaseKind::Distraction);
        self.phases.push(PhaseSpec::new(
            PhaseKind::Distraction,
            Some(round),
            "/usr/games/chess",
            GAME_TITLE,
            duration,
        ));
        self
    }

    pub fn study_phase(mut self, duration: Duration) -> Self {
        let round = self.next_round(PhaseKind::ShortFocus);
        self.phases.push(PhaseSpec::new(
            PhaseKind::ShortFocus,
            Some(round),
            "studyapp --notes",
            STUDY_TITLE,
            duration,
        ));
        self
    }

    pub fn sounds(mut self, sounds: AlertSoundTable) -> Self {
        self.sounds = sounds;
        self
    }

    pub fn timings(mut self, timings: EngineTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn build(self) -> SessionPlan {
        SessionPlan::new(self.phases, self.sounds, self.timings)
    }

    fn next_round(&self, kind: PhaseKind) -> u8 {
        let count = self.phases.iter().filter(|p| p.kind == kind).count();
        u8::try_from(count + 1).unwrap_or(u8::MAX)
    }
}

impl Default for PlanBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub type MockController = SessionController<MockWindowSystem, MockProcessLauncher, MockAudioPlayback>;

/// A controller wired to mocks, with handles to inspect each one
pub struct MockRig {
    pub controller: MockController,
    pub windows: MockWindowSystem,
    pub processes: MockProcessLauncher,
    pub audio: MockAudioPlayback,
    pub notifications: TestNotificationSender,
}

impl MockRig {
    pub fn new(config: Config) -> Self {
        let windows = MockWindowSystem::new();
        let processes = MockProcessLauncher::new();
        let audio = MockAudioPlayback::new();
        let notifications = TestNotificationSender::new();
        let notifier =
            NotificationManager::with_sender(&config.notifications, Arc::new(notifications.clone()));

        let controller = SessionController::with_notifications(
            windows.clone(),
            processes.clone(),
            audio.clone(),
            config,
            notifier,
        );

        Self {
            controller,
            windows,
            processes,
            audio,
            notifications,
        }
    }

    pub fn wait_for_end(&self, timeout: Duration) -> bool {
        wait_until(timeout, || !self.controller.is_running())
    }
}
