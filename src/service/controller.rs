use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::alerts::{FocusMonitor, SoundChannelManager};
use crate::config::Config;
use crate::error::EngineError;
use crate::launcher::ApplicationLauncher;
use crate::notifications::NotificationManager;
use crate::scheduler::{
    EngineTimings, PhaseScheduler, PhaseSpec, RunOutcome, STOPPED_LABEL, SessionPlan,
};
use crate::session::{CancelSignal, SessionPhase, SessionSnapshot, StatusBoard};
use crate::system::{AudioPlaybackInterface, ProcessLauncherInterface, WindowSystemInterface};

pub const FAILED_LABEL: &str = "Session Failed";

/// Extra time `stop` allows the worker beyond one tick and the grace period
const STOP_SLACK: Duration = Duration::from_secs(1);

/// Start/stop/status surface for focus sessions.
///
/// One session at a time runs on a dedicated worker thread. Configuration
/// pushed with `update_config` applies from the next `start`.
pub struct SessionController<W, P, A>
where
    W: WindowSystemInterface,
    P: ProcessLauncherInterface,
    A: AudioPlaybackInterface,
{
    window_system: Arc<W>,
    processes: Arc<P>,
    playback: Arc<A>,
    status: StatusBoard,
    config: Mutex<Config>,
    notifier: Mutex<NotificationManager>,
    active: Mutex<Option<ActiveSession<W, P, A>>>,
}

struct ActiveSession<W, P, A>
where
    W: WindowSystemInterface,
    P: ProcessLauncherInterface,
    A: AudioPlaybackInterface,
{
    cancel: CancelSignal,
    launcher: ApplicationLauncher<W, P>,
    sounds: Arc<SoundChannelManager<A>>,
    timings: EngineTimings,
    // Disconnects when the worker thread exits
    finished: Receiver<()>,
    handle: JoinHandle<()>,
}

impl<W, P, A> ActiveSession<W, P, A>
where
    W: WindowSystemInterface,
    P: ProcessLauncherInterface,
    A: AudioPlaybackInterface,
{
    fn is_finished(&self) -> bool {
        matches!(self.finished.try_recv(), Err(TryRecvError::Disconnected))
    }

    fn join(self) {
        if self.handle.join().is_err() {
            // Panics are caught inside the worker; this is unreachable in practice
            warn!("Session worker exited abnormally");
        }
    }
}

impl<W, P, A> SessionController<W, P, A>
where
    W: WindowSystemInterface,
    P: ProcessLauncherInterface,
    A: AudioPlaybackInterface,
{
    pub fn new(window_system: W, processes: P, playback: A, config: Config) -> Self {
        let notifier = NotificationManager::new(&config.notifications);
        Self::with_notifications(window_system, processes, playback, config, notifier)
    }

    pub fn with_notifications(
        window_system: W,
        processes: P,
        playback: A,
        config: Config,
        notifier: NotificationManager,
    ) -> Self {
        let status = StatusBoard::new(SessionSnapshot::idle(config.durations.game()));
        Self {
            window_system: Arc::new(window_system),
            processes: Arc::new(processes),
            playback: Arc::new(playback),
            status,
            config: Mutex::new(config),
            notifier: Mutex::new(notifier),
            active: Mutex::new(None),
        }
    }

    /// Start a session from the current configuration. Returns immediately.
    pub fn start(&self) -> Result<(), EngineError> {
        if self.is_running() {
            let error = EngineError::AlreadyRunning;
            self.refuse(&error);
            return Err(error);
        }

        let config = lock(&self.config).clone();
        match SessionPlan::from_config(&config) {
            Ok(plan) => self.start_plan(plan),
            Err(e) => {
                self.refuse(&e);
                Err(e)
            }
        }
    }

    /// Start a session from an explicit plan. Returns immediately.
    pub fn start_plan(&self, plan: SessionPlan) -> Result<(), EngineError> {
        let mut active = lock(&self.active);

        if let Some(session) = active.take() {
            if session.is_finished() {
                debug!("Reaping finished session worker");
                session.join();
            } else {
                *active = Some(session);
                let error = EngineError::AlreadyRunning;
                self.refuse(&error);
                return Err(error);
            }
        }

        let timings = plan.timings;
        let total = plan.total_duration();
        let cancel = CancelSignal::new();
        let sounds = Arc::new(SoundChannelManager::with_timings(
            Arc::clone(&self.playback),
            plan.sounds.clone(),
            timings.channel,
        ));
        let launcher = ApplicationLauncher::new(
            Arc::clone(&self.window_system),
            Arc::clone(&self.processes),
            timings.terminate_grace,
        );
        let monitor = FocusMonitor::new(
            Arc::clone(&self.window_system),
            Arc::clone(&sounds),
            self.status.clone(),
            timings.tick,
            timings.escalation_interval,
        );
        let scheduler = PhaseScheduler::new(
            launcher.clone(),
            monitor,
            self.status.clone(),
            timings.launch_settle,
        );

        let previous = self.status.snapshot();
        self.status.replace(starting_snapshot(&plan.phases));

        let (done_tx, done_rx) = mpsc::channel();
        let worker = SessionWorker {
            scheduler,
            phases: plan.phases,
            cancel: cancel.clone(),
            launcher: launcher.clone(),
            sounds: Arc::clone(&sounds),
            status: self.status.clone(),
            notifier: lock(&self.notifier).clone(),
        };

        let handle = thread::Builder::new()
            .name("focus-session".to_string())
            .spawn(move || worker.run(done_tx))
            .map_err(|e| {
                let error = EngineError::WorkerSpawn(e.to_string());
                error!("{}", error);
                self.status.replace(previous);
                error
            })?;

        info!("Session started ({:?} of focus watching)", total);
        *active = Some(ActiveSession {
            cancel,
            launcher,
            sounds,
            timings,
            finished: done_rx,
            handle,
        });
        Ok(())
    }

    /// Cancel the session and tear everything down.
    ///
    /// Safe to call repeatedly or with no session; returns whether there was
    /// a session to stop.
    pub fn stop(&self) -> bool {
        let Some(session) = lock(&self.active).take() else {
            debug!("Stop requested with no session");
            return false;
        };

        let was_running = !session.is_finished();
        if was_running {
            info!("Stopping session");
        }
        session.cancel.cancel();

        let bound = session
            .timings
            .tick
            .saturating_add(session.timings.terminate_grace)
            .saturating_add(STOP_SLACK);
        let worker_done = match session.finished.recv_timeout(bound) {
            Err(RecvTimeoutError::Disconnected) | Ok(()) => true,
            Err(RecvTimeoutError::Timeout) => {
                warn!("Session worker did not exit within {:?}", bound);
                false
            }
        };

        let terminated = session.launcher.terminate_all();
        if terminated > 0 {
            info!("Terminated {} tracked process(es)", terminated);
        }
        session.sounds.stop_all();

        if worker_done {
            session.join();
        }

        if was_running {
            self.status.publish(|s| {
                s.phase = SessionPhase::Cancelled;
                s.label = STOPPED_LABEL.to_string();
                s.time_remaining = Duration::ZERO;
                s.alert_stage = 0;
                s.running = false;
            });
            info!("Session stopped");
        }
        true
    }

    /// Join a worker that ended on its own, leaving its applications running.
    ///
    /// Returns false if there is no session or it is still running.
    pub fn reap_finished(&self) -> bool {
        let mut active = lock(&self.active);
        match active.take() {
            Some(session) if session.is_finished() => {
                drop(active);
                debug!("Reaping finished session worker");
                session.join();
                true
            }
            other => {
                *active = other;
                false
            }
        }
    }

    /// Copy of the current session state; never blocks on the worker
    pub fn snapshot(&self) -> SessionSnapshot {
        self.status.snapshot()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.active)
            .as_ref()
            .is_some_and(|session| !session.is_finished())
    }

    /// Replace the configuration used by the next `start`
    pub fn update_config(&self, config: Config) {
        lock(&self.notifier).reconfigure(&config.notifications);

        if self.snapshot().phase == SessionPhase::Idle {
            self.status
                .replace(SessionSnapshot::idle(config.durations.game()));
        }
        if self.is_running() {
            info!("Configuration updated; changes apply to the next session");
        } else {
            info!("Configuration updated");
        }
        *lock(&self.config) = config;
    }

    pub fn config(&self) -> Config {
        lock(&self.config).clone()
    }

    fn refuse(&self, error: &EngineError) {
        warn!("Session start refused: {}", error);
        self.status.publish(|s| s.last_error = Some(error.to_string()));
        if let Err(e) = lock(&self.notifier).start_refused(error) {
            warn!("Failed to send notification: {}", e);
        }
    }
}

impl<W, P, A> Drop for SessionController<W, P, A>
where
    W: WindowSystemInterface,
    P: ProcessLauncherInterface,
    A: AudioPlaybackInterface,
{
    fn drop(&mut self) {
        if !self.reap_finished() {
            self.stop();
        }
    }
}

/// Runs the scheduler on the session thread and turns its ending into
/// final state and notifications
struct SessionWorker<W, P, A>
where
    W: WindowSystemInterface,
    P: ProcessLauncherInterface,
    A: AudioPlaybackInterface,
{
    scheduler: PhaseScheduler<W, P, A>,
    phases: Vec<PhaseSpec>,
    cancel: CancelSignal,
    launcher: ApplicationLauncher<W, P>,
    sounds: Arc<SoundChannelManager<A>>,
    status: StatusBoard,
    notifier: NotificationManager,
}

impl<W, P, A> SessionWorker<W, P, A>
where
    W: WindowSystemInterface,
    P: ProcessLauncherInterface,
    A: AudioPlaybackInterface,
{
    fn run(self, _done: Sender<()>) {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.scheduler.run(&self.phases, &self.cancel)
        }));

        match result {
            Ok(report) => match report.outcome {
                RunOutcome::Complete => {
                    info!("All cycles complete");
                    if let Err(e) = self.notifier.session_complete() {
                        warn!("Failed to send notification: {}", e);
                    }
                }
                RunOutcome::Cancelled => {
                    // Covers a launch that raced with stop()
                    self.launcher.terminate_all();
                }
            },
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                error!("Session worker failed: {}", reason);

                self.sounds.stop_all();
                self.launcher.terminate_all();
                self.status.publish(|s| {
                    s.phase = SessionPhase::Failed;
                    s.label = FAILED_LABEL.to_string();
                    s.time_remaining = Duration::ZERO;
                    s.alert_stage = 0;
                    s.running = false;
                    s.last_error = Some(reason.clone());
                });
                if let Err(e) = self.notifier.session_failed(&reason) {
                    warn!("Failed to send notification: {}", e);
                }
            }
        }
    }
}

fn starting_snapshot(phases: &[PhaseSpec]) -> SessionSnapshot {
    match phases.first() {
        Some(first) => SessionSnapshot {
            phase: SessionPhase::Running {
                index: 0,
                kind: first.kind,
            },
            label: first.label(),
            time_remaining: first.duration,
            alert_stage: 0,
            running: true,
            last_error: None,
        },
        None => SessionSnapshot {
            running: true,
            ..SessionSnapshot::idle(Duration::ZERO)
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
