//! Engine error taxonomy.
//!
//! Only `ConfigMissing`, `AlreadyRunning` and `WorkerSpawn` abort an operation.
//! Everything else is logged where it happens and replaced by a fallback.

use thiserror::Error;

use crate::launcher::LaunchKind;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Configuration missing: {0} must not be empty")]
    ConfigMissing(&'static str),

    #[error("A session is already running")]
    AlreadyRunning,

    #[error("Failed to launch '{target}': {reason}")]
    Launch { target: String, reason: String },

    #[error("No command configured for the {0} application")]
    EmptyCommand(LaunchKind),

    #[error("Failed to play '{resource}': {reason}")]
    Playback { resource: String, reason: String },

    #[error("Process {pid} did not terminate cleanly: {reason}")]
    Termination { pid: u32, reason: String },

    #[error("Active window query failed: {0}")]
    WindowQuery(String),

    #[error("Failed to spawn session worker: {0}")]
    WorkerSpawn(String),
}

impl EngineError {
    /// Whether this error refuses an operation instead of being absorbed
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::ConfigMissing(_) | EngineError::AlreadyRunning | EngineError::WorkerSpawn(_)
        )
    }
}
