pub mod loader;
pub mod types;

pub use loader::ConfigLoader;
pub use types::{
    AppSettings, Config, DurationSettings, FALLBACK_TONE, GeneralConfig, NotificationConfig,
    PathCheck, SoundSettings,
};
