use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::controller::SessionController;
use super::signals::{SignalHandler, SignalType};
use crate::config::ConfigLoader;
use crate::scheduler::SessionPlan;
use crate::session::SessionSnapshot;
use crate::system::{
    AudioPlaybackInterface, FileSystemInterface, ProcessLauncherInterface, WindowSystemInterface,
};

/// How the foreground session loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerExit {
    /// Every phase ran (or the worker failed) without outside intervention
    SessionEnded,
    /// SIGTERM/SIGINT or an explicit shutdown request
    Shutdown,
}

/// Runs one session in the foreground: starts it, reports status on an
/// interval, reloads configuration on SIGHUP and stops cleanly on shutdown.
pub struct SessionRunner<W, P, A, F>
where
    W: WindowSystemInterface,
    P: ProcessLauncherInterface,
    A: AudioPlaybackInterface,
    F: FileSystemInterface,
{
    controller: Arc<SessionController<W, P, A>>,
    loader: ConfigLoader<F>,
    signal_handler: SignalHandler,
    signal_rx: mpsc::UnboundedReceiver<SignalType>,
    status_interval: Duration,
}

impl<W, P, A, F> SessionRunner<W, P, A, F>
where
    W: WindowSystemInterface,
    P: ProcessLauncherInterface,
    A: AudioPlaybackInterface,
    F: FileSystemInterface,
{
    pub fn new(controller: SessionController<W, P, A>, loader: ConfigLoader<F>) -> Self {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel::<SignalType>();
        Self {
            controller: Arc::new(controller),
            loader,
            signal_handler: SignalHandler::with_sender(signal_tx),
            signal_rx,
            status_interval: Duration::from_secs(1),
        }
    }

    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = interval;
        self
    }

    /// Handle for requesting shutdown or reload from elsewhere
    pub fn signal_handler(&self) -> SignalHandler {
        self.signal_handler.clone()
    }

    pub fn controller(&self) -> &SessionController<W, P, A> {
        &self.controller
    }

    /// Start a session from the loaded configuration and block until it
    /// ends or shutdown is requested.
    ///
    /// `on_status` receives a snapshot every status interval.
    pub async fn run<S>(&mut self, listen_for_os_signals: bool, on_status: S) -> Result<RunnerExit>
    where
        S: FnMut(&SessionSnapshot),
    {
        self.controller
            .start()
            .context("Failed to start focus session")?;
        self.supervise(listen_for_os_signals, on_status).await
    }

    /// Same as `run`, with an explicit plan instead of the configuration
    pub async fn run_plan<S>(
        &mut self,
        plan: SessionPlan,
        listen_for_os_signals: bool,
        on_status: S,
    ) -> Result<RunnerExit>
    where
        S: FnMut(&SessionSnapshot),
    {
        self.controller
            .start_plan(plan)
            .context("Failed to start focus session")?;
        self.supervise(listen_for_os_signals, on_status).await
    }

    async fn supervise<S>(&mut self, listen_for_os_signals: bool, mut on_status: S) -> Result<RunnerExit>
    where
        S: FnMut(&SessionSnapshot),
    {
        if listen_for_os_signals {
            let signal_handler = self.signal_handler.clone();
            tokio::spawn(async move {
                if let Err(e) = signal_handler.listen_for_signals().await {
                    error!("Signal handler error: {}", e);
                }
            });
        }

        let mut ticker = tokio::time::interval(self.status_interval);
        let exit = loop {
            tokio::select! {
                signal = self.signal_rx.recv() => {
                    match signal {
                        Some(SignalType::Shutdown) => {
                            info!("Shutdown signal received, stopping session");
                            break RunnerExit::Shutdown;
                        }
                        Some(SignalType::Reload) => self.reload_config(),
                        None => {
                            warn!("Signal channel closed");
                            break RunnerExit::Shutdown;
                        }
                    }
                }
                _ = ticker.tick() => {
                    on_status(&self.controller.snapshot());
                    if !self.controller.is_running() {
                        info!("Session ended");
                        break RunnerExit::SessionEnded;
                    }
                }
            }
        };

        match exit {
            RunnerExit::Shutdown => {
                // stop() waits on the worker and on process termination
                let controller = Arc::clone(&self.controller);
                tokio::task::spawn_blocking(move || controller.stop())
                    .await
                    .context("Session stop task failed")?;
            }
            RunnerExit::SessionEnded => {
                // Applications stay open after a completed session
                self.controller.reap_finished();
            }
        }

        on_status(&self.controller.snapshot());
        Ok(exit)
    }

    fn reload_config(&self) {
        match self.loader.reload_config() {
            Ok(config) => {
                self.controller.update_config(config);
                info!("Configuration reloaded; changes apply to the next session");
            }
            Err(e) => error!("Failed to reload configuration: {:#}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::session::SessionPhase;
    use crate::system::{MockAudioPlayback, MockFileSystem, MockProcessLauncher, MockWindowSystem};
    use std::path::PathBuf;

    fn runner(
        config: Config,
        fs: MockFileSystem,
    ) -> SessionRunner<MockWindowSystem, MockProcessLauncher, MockAudioPlayback, MockFileSystem>
    {
        let controller = SessionController::new(
            MockWindowSystem::new(),
            MockProcessLauncher::new(),
            MockAudioPlayback::new(),
            config,
        );
        let loader = ConfigLoader::new(fs, PathBuf::from("/test/config.toml"));
        SessionRunner::new(controller, loader).with_status_interval(Duration::from_millis(10))
    }

    fn configured() -> Config {
        let mut config = Config::default();
        config.general.launch_settle_ms = 0;
        config.general.terminate_grace_ms = 20;
        config.settings.game_path = "chess".to_string();
        config.settings.game_title = "Chess".to_string();
        config.settings.study_app_path = "studyapp".to_string();
        config.settings.study_app_title = "StudyApp".to_string();
        config
    }

    #[tokio::test]
    async fn test_unconfigured_start_fails() {
        let mut runner = runner(Config::default(), MockFileSystem::new());
        assert!(runner.run(false, |_| {}).await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_request_stops_session() {
        let mut runner = runner(configured(), MockFileSystem::new());
        let handler = runner.signal_handler();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            handler.request_shutdown();
        });

        let mut updates = 0;
        let exit = runner.run(false, |_| updates += 1).await.unwrap();

        assert_eq!(exit, RunnerExit::Shutdown);
        assert!(updates >= 2);
        assert!(!runner.controller().is_running());
        assert_eq!(runner.controller().snapshot().phase, SessionPhase::Cancelled);
    }

    #[test]
    fn test_reload_updates_pending_config() {
        let fs = MockFileSystem::new();
        fs.add_file(
            "/test/config.toml",
            "[durations]\ngame_min = \"45\"\n".to_string(),
        );
        let runner = runner(Config::default(), fs);

        runner.reload_config();

        assert_eq!(runner.controller().config().durations.game_min, "45");
    }

    #[test]
    fn test_failed_reload_keeps_config() {
        let fs = MockFileSystem::new();
        fs.add_file("/test/config.toml", "not = [valid".to_string());
        let runner = runner(configured(), fs);

        runner.reload_config();

        assert_eq!(runner.controller().config(), configured());
    }
}
