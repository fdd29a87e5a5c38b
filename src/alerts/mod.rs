pub mod focus;
pub mod sound;

pub use focus::{EscalationTracker, FocusMonitor, FocusObservation, WatchOutcome, title_matches};
pub use sound::{AlertSoundTable, ChannelTimings, STAGE_COUNT, SoundChannelManager, SoundResource};
