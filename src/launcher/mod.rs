use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::scheduler::PhaseSpec;
use crate::system::{
    ProcessHandle, ProcessLauncherInterface, WaitStatus, WindowHandle, WindowSystemInterface,
};

/// How long to wait for a force-killed process to be reaped
const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(1);

/// Which tracked slot a launched application occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaunchKind {
    Distraction,
    Study,
}

impl LaunchKind {
    fn slot(self) -> usize {
        match self {
            LaunchKind::Distraction => 0,
            LaunchKind::Study => 1,
        }
    }
}

impl fmt::Display for LaunchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchKind::Distraction => write!(f, "game"),
            LaunchKind::Study => write!(f, "study"),
        }
    }
}

/// A process this launcher spawned and is responsible for terminating
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedProcess {
    pub kind: LaunchKind,
    pub handle: ProcessHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// An existing window was brought to the front
    Activated(WindowHandle),
    /// No window matched and a new process was started
    Spawned(ProcessHandle),
}

/// Split a configured command into program and arguments on whitespace
pub fn split_command_line(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}

type Registry = [Option<ManagedProcess>; 2];

/// Starts or re-activates the applications a session enforces.
///
/// Cloning shares the process registry, so the controller can terminate what
/// the worker launched.
pub struct ApplicationLauncher<W: WindowSystemInterface, P: ProcessLauncherInterface> {
    window_system: Arc<W>,
    processes: Arc<P>,
    registry: Arc<Mutex<Registry>>,
    terminate_grace: Duration,
}

impl<W: WindowSystemInterface, P: ProcessLauncherInterface> Clone for ApplicationLauncher<W, P> {
    fn clone(&self) -> Self {
        Self {
            window_system: Arc::clone(&self.window_system),
            processes: Arc::clone(&self.processes),
            registry: Arc::clone(&self.registry),
            terminate_grace: self.terminate_grace,
        }
    }
}

impl<W: WindowSystemInterface, P: ProcessLauncherInterface> ApplicationLauncher<W, P> {
    pub fn new(window_system: Arc<W>, processes: Arc<P>, terminate_grace: Duration) -> Self {
        Self {
            window_system,
            processes,
            registry: Arc::new(Mutex::new([None, None])),
            terminate_grace,
        }
    }

    /// Bring the phase's application to the front, starting it if no
    /// window with its title exists
    pub fn ensure_running(&self, spec: &PhaseSpec) -> Result<LaunchOutcome, EngineError> {
        let kind = spec.launch_kind();

        if let Some(window) = self.find_window(&spec.launch_title) {
            match self.window_system.activate(&window) {
                Ok(()) => {
                    info!("Activated existing {} window: '{}'", kind, window.title);
                    return Ok(LaunchOutcome::Activated(window));
                }
                Err(e) => warn!(
                    "Failed to activate '{}': {:#}. Launching a new instance",
                    window.title, e
                ),
            }
        }

        self.spawn(kind, &spec.launch_path)
            .map(LaunchOutcome::Spawned)
    }

    fn find_window(&self, title: &str) -> Option<WindowHandle> {
        if title.is_empty() {
            debug!("No window title configured, skipping window lookup");
            return None;
        }

        match self.window_system.find_windows_by_title(title) {
            Ok(windows) => windows.into_iter().next(),
            Err(e) => {
                let error = EngineError::WindowQuery(format!("{e:#}"));
                warn!("{}. Launching a new instance", error);
                None
            }
        }
    }

    fn spawn(&self, kind: LaunchKind, command: &str) -> Result<ProcessHandle, EngineError> {
        let mut parts = split_command_line(command);
        if parts.is_empty() {
            warn!("No command configured for the {} application", kind);
            return Err(EngineError::EmptyCommand(kind));
        }
        let program = parts.remove(0);

        // Terminate outside the registry lock; the grace wait can take seconds
        let previous = self.lock_registry()[kind.slot()].take();
        if let Some(previous) = previous {
            info!(
                "Replacing tracked {} process {} before launching",
                kind, previous.handle.pid
            );
            self.terminate(&previous.handle);
        }

        info!("Launching {}: {} {:?}", kind, program, parts);
        let handle = self.processes.spawn(&program, &parts).map_err(|e| {
            let error = EngineError::Launch {
                target: command.to_string(),
                reason: format!("{e:#}"),
            };
            warn!("{}", error);
            error
        })?;

        self.lock_registry()[kind.slot()] = Some(ManagedProcess {
            kind,
            handle: handle.clone(),
        });
        Ok(handle)
    }

    /// Ask the process to exit, force-killing it after the grace period.
    /// Failures are logged, never returned.
    pub fn terminate(&self, handle: &ProcessHandle) {
        debug!("Terminating process {} ({})", handle.pid, handle.program);

        if let Err(e) = self.processes.terminate(handle) {
            let error = EngineError::Termination {
                pid: handle.pid,
                reason: format!("{e:#}"),
            };
            warn!("{}", error);
        }

        match self.processes.wait(handle, self.terminate_grace) {
            Ok(WaitStatus::Exited) => {
                info!("Process {} exited", handle.pid);
                return;
            }
            Ok(WaitStatus::TimedOut) => warn!(
                "Process {} still alive after {:?}, killing it",
                handle.pid, self.terminate_grace
            ),
            Err(e) => warn!("Waiting on process {} failed: {:#}", handle.pid, e),
        }

        if let Err(e) = self.processes.kill(handle) {
            let error = EngineError::Termination {
                pid: handle.pid,
                reason: format!("{e:#}"),
            };
            warn!("{}", error);
            return;
        }
        if let Ok(WaitStatus::TimedOut) = self.processes.wait(handle, KILL_REAP_TIMEOUT) {
            warn!("Process {} did not go away after kill", handle.pid);
        }
    }

    /// Terminate every tracked process; returns how many were tracked
    pub fn terminate_all(&self) -> usize {
        let tracked: Vec<ManagedProcess> = self
            .lock_registry()
            .iter_mut()
            .filter_map(Option::take)
            .collect();

        for process in &tracked {
            info!("Stopping {} process {}", process.kind, process.handle.pid);
            self.terminate(&process.handle);
        }
        tracked.len()
    }

    /// Currently tracked processes
    pub fn tracked(&self) -> Vec<ManagedProcess> {
        self.lock_registry().iter().flatten().cloned().collect()
    }

    pub fn tracked_for(&self, kind: LaunchKind) -> Option<ManagedProcess> {
        self.lock_registry()[kind.slot()].clone()
    }

    fn lock_registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::PhaseKind;
    use crate::system::{MockProcessLauncher, MockWindowSystem};

    fn launcher() -> (
        ApplicationLauncher<MockWindowSystem, MockProcessLauncher>,
        MockWindowSystem,
        MockProcessLauncher,
    ) {
        let windows = MockWindowSystem::new();
        let processes = MockProcessLauncher::new();
        let launcher = ApplicationLauncher::new(
            Arc::new(windows.clone()),
            Arc::new(processes.clone()),
            Duration::from_millis(20),
        );
        (launcher, windows, processes)
    }

    fn game_phase() -> PhaseSpec {
        PhaseSpec::new(
            PhaseKind::Distraction,
            Some(1),
            "/usr/games/chess --fullscreen",
            "Chess",
            Duration::from_secs(60),
        )
    }

    #[test]
    fn test_split_command_line() {
        assert_eq!(
            split_command_line("  libreoffice   --writer  notes.odt "),
            vec!["libreoffice", "--writer", "notes.odt"]
        );
        assert!(split_command_line("   ").is_empty());
    }

    #[test]
    fn test_existing_window_is_activated_not_spawned() {
        let (launcher, windows, processes) = launcher();
        windows.add_window("0x01", "Chess - Game 3");

        let outcome = launcher.ensure_running(&game_phase()).unwrap();

        assert_eq!(
            outcome,
            LaunchOutcome::Activated(WindowHandle::new("0x01", "Chess - Game 3"))
        );
        assert_eq!(windows.get_activate_calls().len(), 1);
        assert!(processes.get_spawn_calls().is_empty());
        assert!(launcher.tracked().is_empty());
    }

    #[test]
    fn test_missing_window_spawns_with_split_arguments() {
        let (launcher, _windows, processes) = launcher();

        let outcome = launcher.ensure_running(&game_phase()).unwrap();

        assert!(matches!(outcome, LaunchOutcome::Spawned(ref h) if h.pid == 1000));
        assert_eq!(
            processes.get_spawn_calls(),
            vec![(
                "/usr/games/chess".to_string(),
                vec!["--fullscreen".to_string()]
            )]
        );
        let tracked = launcher.tracked_for(LaunchKind::Distraction).unwrap();
        assert_eq!(tracked.handle.pid, 1000);
    }

    #[test]
    fn test_lookup_failure_falls_back_to_spawn() {
        let (launcher, windows, processes) = launcher();
        windows.set_lookup_failure(true);

        let outcome = launcher.ensure_running(&game_phase()).unwrap();

        assert!(matches!(outcome, LaunchOutcome::Spawned(_)));
        assert_eq!(processes.get_spawn_calls().len(), 1);
    }

    #[test]
    fn test_spawn_failure_is_reported() {
        let (launcher, _windows, processes) = launcher();
        processes.set_spawn_failure(true);

        let err = launcher.ensure_running(&game_phase()).unwrap_err();

        assert!(matches!(err, EngineError::Launch { ref target, .. } if target == "/usr/games/chess --fullscreen"));
        assert!(!err.is_fatal());
        assert!(launcher.tracked().is_empty());
    }

    #[test]
    fn test_empty_command_is_reported() {
        let (launcher, _windows, processes) = launcher();
        let spec = PhaseSpec::new(
            PhaseKind::ShortFocus,
            Some(1),
            "   ",
            "StudyApp",
            Duration::from_secs(60),
        );

        let err = launcher.ensure_running(&spec).unwrap_err();

        assert_eq!(err, EngineError::EmptyCommand(LaunchKind::Study));
        assert!(processes.get_spawn_calls().is_empty());
    }

    #[test]
    fn test_relaunch_terminates_previous_handle_of_same_kind() {
        let (launcher, _windows, processes) = launcher();

        launcher.ensure_running(&game_phase()).unwrap();
        launcher.ensure_running(&game_phase()).unwrap();

        assert_eq!(processes.get_terminate_calls(), vec![1000]);
        assert!(!processes.is_alive(1000));
        assert!(processes.is_alive(1001));
        assert_eq!(launcher.tracked().len(), 1);
    }

    #[test]
    fn test_kinds_are_tracked_separately() {
        let (launcher, _windows, processes) = launcher();
        let study = PhaseSpec::new(
            PhaseKind::ShortFocus,
            Some(1),
            "studyapp",
            "StudyApp",
            Duration::from_secs(60),
        );

        launcher.ensure_running(&game_phase()).unwrap();
        launcher.ensure_running(&study).unwrap();

        assert!(processes.get_terminate_calls().is_empty());
        assert_eq!(launcher.tracked().len(), 2);
    }

    #[test]
    fn test_stubborn_process_is_killed_after_grace() {
        let (launcher, _windows, processes) = launcher();
        processes.set_ignore_terminate(true);

        launcher.ensure_running(&game_phase()).unwrap();
        assert_eq!(launcher.terminate_all(), 1);

        assert_eq!(processes.get_terminate_calls(), vec![1000]);
        assert_eq!(processes.get_kill_calls(), vec![1000]);
        assert_eq!(processes.alive_count(), 0);
        assert!(launcher.tracked().is_empty());
    }

    #[test]
    fn test_terminating_exited_process_is_harmless() {
        let (launcher, _windows, processes) = launcher();

        launcher.ensure_running(&game_phase()).unwrap();
        processes.exit_process(1000);
        launcher.terminate_all();

        assert!(processes.get_kill_calls().is_empty());
        assert_eq!(launcher.terminate_all(), 0);
    }

    #[test]
    fn test_clones_share_the_registry() {
        let (launcher, _windows, processes) = launcher();
        let controller_side = launcher.clone();

        launcher.ensure_running(&game_phase()).unwrap();
        assert_eq!(controller_side.terminate_all(), 1);
        assert_eq!(processes.alive_count(), 0);
        assert!(launcher.tracked().is_empty());
    }
}
