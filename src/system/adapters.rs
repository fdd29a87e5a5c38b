use anyhow::{Context, Result, bail};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::session::CancelSignal;
use crate::system::traits::{
    AudioPlaybackInterface, FileSystemInterface, ProcessHandle, ProcessLauncherInterface,
    WaitStatus, WindowHandle, WindowSystemInterface,
};

const CHILD_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Window system used by the binary on this platform
#[cfg(target_os = "macos")]
pub type PlatformWindowSystem = MacOSWindowSystem;

#[cfg(not(target_os = "macos"))]
pub type PlatformWindowSystem = X11WindowSystem;

/// Sound output used by the binary
#[cfg(feature = "rodio-playback")]
pub type PlatformAudioPlayback = RodioPlayback;

#[cfg(not(feature = "rodio-playback"))]
pub type PlatformAudioPlayback = CommandAudioPlayback;

/// Run a helper tool and return its trimmed stdout
fn run_tool(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("Failed to run {program}"))?;

    if !output.status.success() {
        let error = String::from_utf8_lossy(&output.stderr);
        bail!("{} failed ({}): {}", program, output.status, error.trim());
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn escape_regex(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// X11 implementation backed by the `xdotool` command
pub struct X11WindowSystem;

impl X11WindowSystem {
    pub fn new() -> Self {
        Self
    }
}

impl WindowSystemInterface for X11WindowSystem {
    fn active_window_title(&self) -> Result<Option<String>> {
        let title = run_tool("xdotool", &["getactivewindow", "getwindowname"])?;
        Ok(if title.is_empty() { None } else { Some(title) })
    }

    fn find_windows_by_title(&self, title: &str) -> Result<Vec<WindowHandle>> {
        let pattern = escape_regex(title);
        let output = Command::new("xdotool")
            .args(["search", "--name", &pattern])
            .stdin(Stdio::null())
            .output()
            .context("Failed to run xdotool")?;

        // xdotool exits 1 without output when nothing matched
        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            if error.trim().is_empty() {
                return Ok(Vec::new());
            }
            bail!("xdotool search failed: {}", error.trim());
        }

        let mut windows = Vec::new();
        for id in String::from_utf8_lossy(&output.stdout).lines() {
            let id = id.trim();
            if id.is_empty() {
                continue;
            }
            let name = run_tool("xdotool", &["getwindowname", id]).unwrap_or_default();
            windows.push(WindowHandle::new(id, name));
        }
        Ok(windows)
    }

    fn activate(&self, window: &WindowHandle) -> Result<()> {
        run_tool("xdotool", &["windowactivate", &window.id]).map(|_| ())
    }
}

/// macOS implementation using System Events through `osascript`
///
/// Titles are reported as `"<process> - <window>"` so a target can name
/// either the application or the document.
pub struct MacOSWindowSystem;

impl MacOSWindowSystem {
    pub fn new() -> Self {
        Self
    }

    fn run_script(script: &str) -> Result<String> {
        run_tool("osascript", &["-e", script])
    }
}

impl WindowSystemInterface for MacOSWindowSystem {
    fn active_window_title(&self) -> Result<Option<String>> {
        let script = r#"tell application "System Events"
    set frontProc to first application process whose frontmost is true
    set procName to name of frontProc
    try
        set winName to name of front window of frontProc
    on error
        set winName to ""
    end try
end tell
return procName & " - " & winName"#;
        let title = Self::run_script(script)?;
        Ok(if title.is_empty() { None } else { Some(title) })
    }

    fn find_windows_by_title(&self, title: &str) -> Result<Vec<WindowHandle>> {
        let script = r#"set output to ""
tell application "System Events"
    repeat with proc in (every application process whose background only is false)
        set procName to name of proc
        repeat with win in (every window of proc)
            set output to output & procName & tab & (name of win) & linefeed
        end repeat
    end repeat
end tell
return output"#;
        let needle = title.to_lowercase();
        let listing = Self::run_script(script)?;

        Ok(listing
            .lines()
            .filter_map(|line| line.split_once('\t'))
            .filter(|(process, window)| {
                format!("{process} - {window}")
                    .to_lowercase()
                    .contains(&needle)
            })
            .map(|(process, window)| WindowHandle::new(process, format!("{process} - {window}")))
            .collect())
    }

    fn activate(&self, window: &WindowHandle) -> Result<()> {
        let script = format!(
            r#"tell application "System Events" to set frontmost of process "{}" to true"#,
            window.id.replace('"', "\\\"")
        );
        Self::run_script(&script).map(|_| ())
    }
}

/// Production implementation of ProcessLauncherInterface using std::process
///
/// Spawned children are kept so they can be waited on and reaped.
pub struct StandardProcessLauncher {
    children: Mutex<HashMap<u32, Child>>,
}

impl StandardProcessLauncher {
    pub fn new() -> Self {
        Self {
            children: Mutex::new(HashMap::new()),
        }
    }

    /// `Some(true)` if the child is still running, `None` if unknown
    fn is_running(&self, pid: u32) -> Result<Option<bool>> {
        let mut children = self.children.lock().unwrap_or_else(PoisonError::into_inner);
        match children.get_mut(&pid) {
            Some(child) => {
                let exited = child.try_wait()?.is_some();
                if exited {
                    children.remove(&pid);
                }
                Ok(Some(!exited))
            }
            None => Ok(None),
        }
    }
}

impl ProcessLauncherInterface for StandardProcessLauncher {
    fn spawn(&self, program: &str, args: &[String]) -> Result<ProcessHandle> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to spawn {program}"))?;

        let pid = child.id();
        info!("Spawned {} (pid {})", program, pid);
        self.children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pid, child);

        Ok(ProcessHandle {
            pid,
            program: program.to_string(),
        })
    }

    fn terminate(&self, handle: &ProcessHandle) -> Result<()> {
        if self.is_running(handle.pid)? != Some(true) {
            debug!("Process {} already exited", handle.pid);
            return Ok(());
        }

        #[cfg(unix)]
        {
            let pid = libc::pid_t::try_from(handle.pid).context("pid out of range")?;
            // SAFETY: plain syscall on a pid we spawned and have not reaped yet
            let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
            if rc != 0 {
                return Err(std::io::Error::last_os_error())
                    .with_context(|| format!("Failed to send SIGTERM to {}", handle.pid));
            }
            Ok(())
        }

        #[cfg(not(unix))]
        {
            self.kill(handle)
        }
    }

    fn kill(&self, handle: &ProcessHandle) -> Result<()> {
        let mut children = self.children.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(mut child) = children.remove(&handle.pid) else {
            debug!("Process {} is not tracked, nothing to kill", handle.pid);
            return Ok(());
        };
        drop(children);

        if child.try_wait()?.is_none() {
            child
                .kill()
                .with_context(|| format!("Failed to kill process {}", handle.pid))?;
        }
        child.wait()?;
        Ok(())
    }

    fn wait(&self, handle: &ProcessHandle, timeout: Duration) -> Result<WaitStatus> {
        let started = Instant::now();
        loop {
            if self.is_running(handle.pid)? != Some(true) {
                return Ok(WaitStatus::Exited);
            }
            let left = timeout.saturating_sub(started.elapsed());
            if left.is_zero() {
                return Ok(WaitStatus::TimedOut);
            }
            std::thread::sleep(CHILD_POLL_INTERVAL.min(left));
        }
    }
}

/// Plays sound files through the platform's command-line player
/// (`afplay` on macOS, `paplay` elsewhere) and rings the terminal bell as
/// the fallback tone.
pub struct CommandAudioPlayback {
    player: String,
}

impl CommandAudioPlayback {
    pub fn new() -> Self {
        let player = if cfg!(target_os = "macos") {
            "afplay"
        } else {
            "paplay"
        };
        Self::with_player(player)
    }

    pub fn with_player(player: impl Into<String>) -> Self {
        Self {
            player: player.into(),
        }
    }
}

impl AudioPlaybackInterface for CommandAudioPlayback {
    fn play_blocking(&self, resource: &Path, stop: &CancelSignal) -> Result<()> {
        if !resource.is_file() {
            bail!("Sound file not found: {}", resource.display());
        }

        let mut child = Command::new(&self.player)
            .arg(resource)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to start {}", self.player))?;

        loop {
            if let Some(status) = child.try_wait()? {
                if status.success() {
                    return Ok(());
                }
                bail!("{} exited with {}", self.player, status);
            }
            if stop.wait_timeout(CHILD_POLL_INTERVAL) {
                let _ = child.kill();
                let _ = child.wait();
                return Ok(());
            }
        }
    }

    fn play_tone(&self, _stop: &CancelSignal) -> Result<()> {
        let mut stderr = std::io::stderr();
        stderr.write_all(b"\x07")?;
        stderr.flush()?;
        Ok(())
    }
}

/// In-process playback with rodio; the fallback tone is a short sine beep
#[cfg(feature = "rodio-playback")]
pub struct RodioPlayback {
    tone_frequency: f32,
    tone_length: Duration,
}

#[cfg(feature = "rodio-playback")]
impl RodioPlayback {
    pub fn new() -> Self {
        Self {
            tone_frequency: 880.0,
            tone_length: Duration::from_millis(300),
        }
    }

    fn play_source(
        &self,
        source: Box<dyn rodio::Source<Item = f32> + Send>,
        stop: &CancelSignal,
    ) -> Result<()> {
        // OutputStream is !Send, so it lives on the calling channel thread
        let (_stream, handle) =
            rodio::OutputStream::try_default().context("Failed to open audio output")?;
        let sink = rodio::Sink::try_new(&handle).context("Failed to create audio sink")?;
        sink.append(source);

        while !sink.empty() {
            if stop.wait_timeout(CHILD_POLL_INTERVAL) {
                sink.stop();
                break;
            }
        }
        Ok(())
    }
}

#[cfg(feature = "rodio-playback")]
impl AudioPlaybackInterface for RodioPlayback {
    fn play_blocking(&self, resource: &Path, stop: &CancelSignal) -> Result<()> {
        use rodio::Source;

        let file = std::fs::File::open(resource)
            .with_context(|| format!("Failed to open sound file {}", resource.display()))?;
        let decoder = rodio::Decoder::new(std::io::BufReader::new(file))
            .with_context(|| format!("Failed to decode {}", resource.display()))?;
        self.play_source(Box::new(decoder.convert_samples::<f32>()), stop)
    }

    fn play_tone(&self, stop: &CancelSignal) -> Result<()> {
        use rodio::Source;

        let tone = rodio::source::SineWave::new(self.tone_frequency)
            .take_duration(self.tone_length)
            .amplify(0.25);
        self.play_source(Box::new(tone), stop)
    }
}

/// Production implementation of FileSystemInterface using std::fs
pub struct StandardFileSystem;

impl FileSystemInterface for StandardFileSystem {
    fn read_config_file(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))
    }

    fn write_config_file(&self, path: &Path, content: &str) -> Result<()> {
        std::fs::write(path, content)
            .map_err(|e| anyhow::anyhow!("Failed to write config file: {}", e))
    }

    fn config_file_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create_config_dir(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)
            .map_err(|e| anyhow::anyhow!("Failed to create config directory: {}", e))
    }
}

// Default implementations for production use
impl Default for X11WindowSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for MacOSWindowSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for StandardProcessLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for CommandAudioPlayback {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "rodio-playback")]
impl Default for RodioPlayback {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for StandardFileSystem {
    fn default() -> Self {
        Self
    }
}
