use anyhow::Result;
use std::path::Path;
use std::time::Duration;

use crate::session::CancelSignal;

/// Opaque reference to a top-level window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowHandle {
    pub id: String,
    pub title: String,
}

impl WindowHandle {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// Reference to a process started through a `ProcessLauncherInterface`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessHandle {
    pub pid: u32,
    pub program: String,
}

/// Result of waiting on a process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    Exited,
    TimedOut,
}

/// Trait for window manager operations - abstracts xdotool/osascript interactions
pub trait WindowSystemInterface: Send + Sync + 'static {
    /// Title of the currently focused window, `None` if nothing has focus
    fn active_window_title(&self) -> Result<Option<String>>;

    /// All windows whose title contains `title` (case-insensitive)
    fn find_windows_by_title(&self, title: &str) -> Result<Vec<WindowHandle>>;

    /// Raise and focus a window
    fn activate(&self, window: &WindowHandle) -> Result<()>;
}

/// Trait for process management - abstracts std::process for testability
pub trait ProcessLauncherInterface: Send + Sync + 'static {
    /// Spawn `program` with `args`, inheriting the caller's environment
    fn spawn(&self, program: &str, args: &[String]) -> Result<ProcessHandle>;

    /// Ask the process to exit (SIGTERM on unix)
    fn terminate(&self, handle: &ProcessHandle) -> Result<()>;

    /// Kill the process without giving it a chance to clean up
    fn kill(&self, handle: &ProcessHandle) -> Result<()>;

    /// Wait up to `timeout` for the process to exit
    fn wait(&self, handle: &ProcessHandle, timeout: Duration) -> Result<WaitStatus>;
}

/// Trait for alert sound output
///
/// Both calls block while audio is produced and must return soon after
/// `stop` is cancelled.
pub trait AudioPlaybackInterface: Send + Sync + 'static {
    /// Play a sound file once
    fn play_blocking(&self, resource: &Path, stop: &CancelSignal) -> Result<()>;

    /// Play the built-in fallback tone once
    fn play_tone(&self, stop: &CancelSignal) -> Result<()>;
}

/// Trait for file system operations - abstracts std::fs for testability
pub trait FileSystemInterface {
    /// Read the entire contents of a configuration file
    fn read_config_file(&self, path: &Path) -> Result<String>;

    /// Write configuration content to a file
    fn write_config_file(&self, path: &Path, content: &str) -> Result<()>;

    /// Check if a configuration file exists
    fn config_file_exists(&self, path: &Path) -> bool;

    /// Create the directory structure for config files
    fn create_config_dir(&self, path: &Path) -> Result<()>;
}
