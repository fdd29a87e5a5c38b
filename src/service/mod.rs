pub mod controller;
pub mod runner;
pub mod signals;

pub use controller::{FAILED_LABEL, SessionController};
pub use runner::{RunnerExit, SessionRunner};
pub use signals::{SignalHandler, SignalType};
