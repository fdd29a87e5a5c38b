pub mod cancel;
pub mod state;

pub use cancel::CancelSignal;
pub use state::{MAX_ALERT_STAGE, PhaseKind, SessionPhase, SessionSnapshot, StatusBoard};
