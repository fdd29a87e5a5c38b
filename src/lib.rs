pub mod alerts;
pub mod config;
pub mod error;
pub mod launcher;
pub mod logging;
pub mod notifications;
pub mod scheduler;
pub mod service;
pub mod session;
pub mod system;

pub use config::Config;
pub use error::EngineError;
pub use service::SessionController;
pub use session::{SessionPhase, SessionSnapshot};
