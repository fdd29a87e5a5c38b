use anyhow::Result;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::session::CancelSignal;
use crate::system::traits::{
    AudioPlaybackInterface, FileSystemInterface, ProcessHandle, ProcessLauncherInterface,
    WaitStatus, WindowHandle, WindowSystemInterface,
};

/// Mock window system for testing - provides controllable focus behavior
#[derive(Clone)]
pub struct MockWindowSystem {
    pub active_title: Arc<Mutex<Option<String>>>,
    pub scripted_titles: Arc<Mutex<VecDeque<Option<String>>>>,
    pub windows: Arc<Mutex<Vec<WindowHandle>>>,
    pub activate_calls: Arc<Mutex<Vec<WindowHandle>>>,
    pub query_count: Arc<AtomicUsize>,
    pub should_fail_query: Arc<AtomicBool>,
    pub should_fail_lookup: Arc<AtomicBool>,
}

impl MockWindowSystem {
    pub fn new() -> Self {
        Self {
            active_title: Arc::new(Mutex::new(None)),
            scripted_titles: Arc::new(Mutex::new(VecDeque::new())),
            windows: Arc::new(Mutex::new(Vec::new())),
            activate_calls: Arc::new(Mutex::new(Vec::new())),
            query_count: Arc::new(AtomicUsize::new(0)),
            should_fail_query: Arc::new(AtomicBool::new(false)),
            should_fail_lookup: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set the title reported once the script is exhausted
    pub fn set_active_title(&self, title: Option<&str>) {
        *self.active_title.lock().unwrap() = title.map(str::to_string);
    }

    /// Queue titles returned by successive queries before falling back to
    /// the fixed active title
    pub fn script_titles(&self, titles: &[Option<&str>]) {
        let mut scripted = self.scripted_titles.lock().unwrap();
        scripted.extend(titles.iter().map(|t| t.map(str::to_string)));
    }

    /// Add a window that `find_windows_by_title` can return
    pub fn add_window(&self, id: &str, title: &str) {
        self.windows
            .lock()
            .unwrap()
            .push(WindowHandle::new(id, title));
    }

    pub fn get_activate_calls(&self) -> Vec<WindowHandle> {
        self.activate_calls.lock().unwrap().clone()
    }

    pub fn get_query_count(&self) -> usize {
        self.query_count.load(Ordering::SeqCst)
    }

    /// Configure the mock to fail active window queries
    pub fn set_query_failure(&self, should_fail: bool) {
        self.should_fail_query.store(should_fail, Ordering::SeqCst);
    }

    /// Configure the mock to fail window lookups
    pub fn set_lookup_failure(&self, should_fail: bool) {
        self.should_fail_lookup.store(should_fail, Ordering::SeqCst);
    }
}

impl WindowSystemInterface for MockWindowSystem {
    fn active_window_title(&self) -> Result<Option<String>> {
        self.query_count.fetch_add(1, Ordering::SeqCst);

        if let Some(title) = self.scripted_titles.lock().unwrap().pop_front() {
            return Ok(title);
        }
        if self.should_fail_query.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("Mock window query failure"));
        }
        Ok(self.active_title.lock().unwrap().clone())
    }

    fn find_windows_by_title(&self, title: &str) -> Result<Vec<WindowHandle>> {
        if self.should_fail_lookup.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("Mock window lookup failure"));
        }
        let needle = title.to_lowercase();
        Ok(self
            .windows
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.title.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    fn activate(&self, window: &WindowHandle) -> Result<()> {
        self.activate_calls.lock().unwrap().push(window.clone());
        *self.active_title.lock().unwrap() = Some(window.title.clone());
        Ok(())
    }
}

impl Default for MockWindowSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// Mock process launcher for testing - tracks spawned and terminated processes
#[derive(Clone)]
pub struct MockProcessLauncher {
    pub next_pid: Arc<AtomicU32>,
    pub spawn_calls: Arc<Mutex<Vec<(String, Vec<String>)>>>,
    pub alive: Arc<Mutex<HashSet<u32>>>,
    pub terminate_calls: Arc<Mutex<Vec<u32>>>,
    pub kill_calls: Arc<Mutex<Vec<u32>>>,
    pub ignore_terminate: Arc<AtomicBool>,
    pub should_fail_spawn: Arc<AtomicBool>,
}

impl MockProcessLauncher {
    pub fn new() -> Self {
        Self {
            next_pid: Arc::new(AtomicU32::new(1000)),
            spawn_calls: Arc::new(Mutex::new(Vec::new())),
            alive: Arc::new(Mutex::new(HashSet::new())),
            terminate_calls: Arc::new(Mutex::new(Vec::new())),
            kill_calls: Arc::new(Mutex::new(Vec::new())),
            ignore_terminate: Arc::new(AtomicBool::new(false)),
            should_fail_spawn: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn get_spawn_calls(&self) -> Vec<(String, Vec<String>)> {
        self.spawn_calls.lock().unwrap().clone()
    }

    pub fn get_terminate_calls(&self) -> Vec<u32> {
        self.terminate_calls.lock().unwrap().clone()
    }

    pub fn get_kill_calls(&self) -> Vec<u32> {
        self.kill_calls.lock().unwrap().clone()
    }

    pub fn is_alive(&self, pid: u32) -> bool {
        self.alive.lock().unwrap().contains(&pid)
    }

    pub fn alive_count(&self) -> usize {
        self.alive.lock().unwrap().len()
    }

    /// Simulate a process exiting on its own
    pub fn exit_process(&self, pid: u32) {
        self.alive.lock().unwrap().remove(&pid);
    }

    /// Make spawned processes ignore graceful termination requests
    pub fn set_ignore_terminate(&self, ignore: bool) {
        self.ignore_terminate.store(ignore, Ordering::SeqCst);
    }

    /// Configure the mock to fail spawning
    pub fn set_spawn_failure(&self, should_fail: bool) {
        self.should_fail_spawn.store(should_fail, Ordering::SeqCst);
    }
}

impl ProcessLauncherInterface for MockProcessLauncher {
    fn spawn(&self, program: &str, args: &[String]) -> Result<ProcessHandle> {
        self.spawn_calls
            .lock()
            .unwrap()
            .push((program.to_string(), args.to_vec()));

        if self.should_fail_spawn.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("Mock spawn failure"));
        }

        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        self.alive.lock().unwrap().insert(pid);
        Ok(ProcessHandle {
            pid,
            program: program.to_string(),
        })
    }

    fn terminate(&self, handle: &ProcessHandle) -> Result<()> {
        self.terminate_calls.lock().unwrap().push(handle.pid);
        if !self.ignore_terminate.load(Ordering::SeqCst) {
            self.alive.lock().unwrap().remove(&handle.pid);
        }
        Ok(())
    }

    fn kill(&self, handle: &ProcessHandle) -> Result<()> {
        self.kill_calls.lock().unwrap().push(handle.pid);
        self.alive.lock().unwrap().remove(&handle.pid);
        Ok(())
    }

    fn wait(&self, handle: &ProcessHandle, timeout: Duration) -> Result<WaitStatus> {
        if self.is_alive(handle.pid) {
            // Don't actually sleep the full timeout in tests
            std::thread::sleep(timeout.min(Duration::from_millis(10)));
        }
        Ok(if self.is_alive(handle.pid) {
            WaitStatus::TimedOut
        } else {
            WaitStatus::Exited
        })
    }
}

impl Default for MockProcessLauncher {
    fn default() -> Self {
        Self::new()
    }
}

/// Mock audio output for testing - counts plays and tracks live playback
#[derive(Clone)]
pub struct MockAudioPlayback {
    pub play_calls: Arc<Mutex<Vec<PathBuf>>>,
    pub tone_calls: Arc<AtomicUsize>,
    pub playing_now: Arc<AtomicUsize>,
    pub play_length: Arc<Mutex<Duration>>,
    pub failing_resources: Arc<Mutex<HashSet<PathBuf>>>,
    pub should_fail_all: Arc<AtomicBool>,
}

impl MockAudioPlayback {
    pub fn new() -> Self {
        Self {
            play_calls: Arc::new(Mutex::new(Vec::new())),
            tone_calls: Arc::new(AtomicUsize::new(0)),
            playing_now: Arc::new(AtomicUsize::new(0)),
            play_length: Arc::new(Mutex::new(Duration::from_millis(20))),
            failing_resources: Arc::new(Mutex::new(HashSet::new())),
            should_fail_all: Arc::new(AtomicBool::new(false)),
        }
    }

    /// How long each simulated play lasts unless stopped
    pub fn set_play_length(&self, length: Duration) {
        *self.play_length.lock().unwrap() = length;
    }

    /// Make playback of one resource fail
    pub fn fail_resource<P: AsRef<Path>>(&self, resource: P) {
        self.failing_resources
            .lock()
            .unwrap()
            .insert(resource.as_ref().to_path_buf());
    }

    /// Make every playback (files and tone) fail
    pub fn set_failure(&self, should_fail: bool) {
        self.should_fail_all.store(should_fail, Ordering::SeqCst);
    }

    pub fn get_play_calls(&self) -> Vec<PathBuf> {
        self.play_calls.lock().unwrap().clone()
    }

    pub fn tone_count(&self) -> usize {
        self.tone_calls.load(Ordering::SeqCst)
    }

    /// Number of plays currently producing (simulated) audio
    pub fn playing_count(&self) -> usize {
        self.playing_now.load(Ordering::SeqCst)
    }

    fn simulate_play(&self, stop: &CancelSignal) {
        let length = *self.play_length.lock().unwrap();
        self.playing_now.fetch_add(1, Ordering::SeqCst);
        stop.wait_timeout(length);
        self.playing_now.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AudioPlaybackInterface for MockAudioPlayback {
    fn play_blocking(&self, resource: &Path, stop: &CancelSignal) -> Result<()> {
        self.play_calls.lock().unwrap().push(resource.to_path_buf());

        if self.should_fail_all.load(Ordering::SeqCst)
            || self.failing_resources.lock().unwrap().contains(resource)
        {
            return Err(anyhow::anyhow!("Mock playback failure"));
        }

        self.simulate_play(stop);
        Ok(())
    }

    fn play_tone(&self, stop: &CancelSignal) -> Result<()> {
        self.tone_calls.fetch_add(1, Ordering::SeqCst);

        if self.should_fail_all.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("Mock tone failure"));
        }

        self.simulate_play(stop);
        Ok(())
    }
}

impl Default for MockAudioPlayback {
    fn default() -> Self {
        Self::new()
    }
}

/// Mock file system for testing - provides controllable file operations
#[derive(Clone)]
pub struct MockFileSystem {
    pub files: Arc<Mutex<HashMap<PathBuf, String>>>,
    pub read_calls: Arc<Mutex<Vec<PathBuf>>>,
    pub write_calls: Arc<Mutex<Vec<(PathBuf, String)>>>,
    pub directory_creation_calls: Arc<Mutex<Vec<PathBuf>>>,
    pub should_fail_read: Arc<Mutex<bool>>,
    pub should_fail_write: Arc<Mutex<bool>>,
    pub should_fail_create_dir: Arc<Mutex<bool>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
            read_calls: Arc::new(Mutex::new(Vec::new())),
            write_calls: Arc::new(Mutex::new(Vec::new())),
            directory_creation_calls: Arc::new(Mutex::new(Vec::new())),
            should_fail_read: Arc::new(Mutex::new(false)),
            should_fail_write: Arc::new(Mutex::new(false)),
            should_fail_create_dir: Arc::new(Mutex::new(false)),
        }
    }

    /// Add a file to the mock file system
    pub fn add_file<P: AsRef<Path>>(&self, path: P, content: String) {
        self.files
            .lock()
            .unwrap()
            .insert(path.as_ref().to_path_buf(), content);
    }

    /// Contents of a file, if present
    pub fn get_file<P: AsRef<Path>>(&self, path: P) -> Option<String> {
        self.files.lock().unwrap().get(path.as_ref()).cloned()
    }

    /// Get all read calls that were made
    pub fn get_read_calls(&self) -> Vec<PathBuf> {
        self.read_calls.lock().unwrap().clone()
    }

    /// Get all write calls that were made
    pub fn get_write_calls(&self) -> Vec<(PathBuf, String)> {
        self.write_calls.lock().unwrap().clone()
    }

    /// Get all directory creation calls that were made
    pub fn get_directory_creation_calls(&self) -> Vec<PathBuf> {
        self.directory_creation_calls.lock().unwrap().clone()
    }

    /// Configure the mock to fail read operations
    pub fn set_read_failure(&self, should_fail: bool) {
        *self.should_fail_read.lock().unwrap() = should_fail;
    }

    /// Configure the mock to fail write operations
    pub fn set_write_failure(&self, should_fail: bool) {
        *self.should_fail_write.lock().unwrap() = should_fail;
    }

    /// Configure the mock to fail directory creation
    pub fn set_create_dir_failure(&self, should_fail: bool) {
        *self.should_fail_create_dir.lock().unwrap() = should_fail;
    }
}

impl FileSystemInterface for MockFileSystem {
    fn read_config_file(&self, path: &Path) -> Result<String> {
        self.read_calls.lock().unwrap().push(path.to_path_buf());

        if *self.should_fail_read.lock().unwrap() {
            return Err(anyhow::anyhow!("Mock read failure"));
        }

        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("File not found: {}", path.display()))
    }

    fn write_config_file(&self, path: &Path, content: &str) -> Result<()> {
        self.write_calls
            .lock()
            .unwrap()
            .push((path.to_path_buf(), content.to_string()));

        if *self.should_fail_write.lock().unwrap() {
            return Err(anyhow::anyhow!("Mock write failure"));
        }

        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), content.to_string());
        Ok(())
    }

    fn config_file_exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    fn create_config_dir(&self, path: &Path) -> Result<()> {
        self.directory_creation_calls
            .lock()
            .unwrap()
            .push(path.to_path_buf());

        if *self.should_fail_create_dir.lock().unwrap() {
            return Err(anyhow::anyhow!("Mock create directory failure"));
        }

        Ok(())
    }
}

impl Default for MockFileSystem {
    fn default() -> Self {
        Self::new()
    }
}
