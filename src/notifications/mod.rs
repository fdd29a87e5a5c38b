use anyhow::Result;
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::NotificationConfig;
use crate::error::EngineError;

const APP_TITLE: &str = "Focus Enforcer";

/// Trait for sending notifications - allows for testing without system calls
pub trait NotificationSender: Send + Sync {
    fn send(&self, title: &str, body: &str) -> Result<()>;
}

/// Production notification sender: osascript on macOS, notify-send elsewhere
pub struct DesktopNotificationSender;

impl NotificationSender for DesktopNotificationSender {
    fn send(&self, title: &str, body: &str) -> Result<()> {
        if cfg!(target_os = "macos") {
            send_native_macos_notification(title, body)
        } else {
            send_notify_send_notification(title, body)
        }
    }
}

/// Test notification sender that records instead of sending
#[cfg(any(test, feature = "test-mocks"))]
#[derive(Clone, Default)]
pub struct TestNotificationSender {
    pub sent_notifications: Arc<std::sync::Mutex<Vec<(String, String)>>>,
}

#[cfg(any(test, feature = "test-mocks"))]
impl TestNotificationSender {
    #[allow(dead_code)] // Used by integration tests which run in different compilation context
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)] // Used by integration tests which run in different compilation context
    pub fn get_sent_notifications(&self) -> Vec<(String, String)> {
        self.sent_notifications.lock().unwrap().clone()
    }

    #[allow(dead_code)] // Used by integration tests which run in different compilation context
    pub fn clear(&self) {
        self.sent_notifications.lock().unwrap().clear();
    }
}

#[cfg(any(test, feature = "test-mocks"))]
impl NotificationSender for TestNotificationSender {
    fn send(&self, title: &str, body: &str) -> Result<()> {
        debug!("Test notification: {} - {}", title, body);
        self.sent_notifications
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
        Ok(())
    }
}

/// Sends the session's user-facing notifications.
///
/// Delivery failures are logged by callers and never affect the session.
#[derive(Clone)]
pub struct NotificationManager {
    session_complete: bool,
    session_errors: bool,
    sender: Arc<dyn NotificationSender>,
}

impl NotificationManager {
    pub fn new(config: &NotificationConfig) -> Self {
        #[cfg(not(any(test, feature = "test-mocks")))]
        {
            Self::with_sender(config, Arc::new(DesktopNotificationSender))
        }
        #[cfg(any(test, feature = "test-mocks"))]
        {
            // During tests, never pop real desktop notifications
            Self::with_sender(config, Arc::new(TestNotificationSender::new()))
        }
    }

    pub fn with_sender(config: &NotificationConfig, sender: Arc<dyn NotificationSender>) -> Self {
        Self {
            session_complete: config.session_complete,
            session_errors: config.session_errors,
            sender,
        }
    }

    /// Keep the sender, take new enable flags
    pub fn reconfigure(&mut self, config: &NotificationConfig) {
        self.session_complete = config.session_complete;
        self.session_errors = config.session_errors;
    }

    /// All phases ran to the end
    pub fn session_complete(&self) -> Result<()> {
        if !self.session_complete {
            return Ok(());
        }

        self.send_notification(APP_TITLE, "All Pomodoro cycles are complete!")?;
        info!("Sent session complete notification");
        Ok(())
    }

    /// `start` was refused, e.g. because an application path is missing
    pub fn start_refused(&self, error: &EngineError) -> Result<()> {
        if !self.session_errors {
            return Ok(());
        }

        let body = match error {
            EngineError::ConfigMissing(_) => {
                "Please configure both game and study app paths first!".to_string()
            }
            other => format!("Could not start session: {other}"),
        };
        self.send_notification(APP_TITLE, &body)?;

        warn!("Sent start refused notification: {}", error);
        Ok(())
    }

    /// The session worker died; everything has been torn down
    pub fn session_failed(&self, reason: &str) -> Result<()> {
        if !self.session_errors {
            return Ok(());
        }

        let body = format!("Session stopped unexpectedly: {reason}");
        self.send_notification(APP_TITLE, &body)?;

        warn!("Sent session failed notification: {}", reason);
        Ok(())
    }

    fn send_notification(&self, title: &str, body: &str) -> Result<()> {
        debug!("Sending notification: {} - {}", title, body);
        self.sender.send(title, body)?;
        debug!("Successfully sent notification: {}", title);
        Ok(())
    }
}

/// Send notification using native macOS osascript
fn send_native_macos_notification(title: &str, body: &str) -> Result<()> {
    let script = format!(
        r#"display notification "{}" with title "{}" subtitle """#,
        body.replace('"', "\\\""),
        title.replace('"', "\\\"")
    );

    let output = Command::new("osascript").args(["-e", &script]).output()?;

    if output.status.success() {
        Ok(())
    } else {
        let error = String::from_utf8_lossy(&output.stderr);
        Err(anyhow::anyhow!("osascript failed: {}", error))
    }
}

/// Send notification through the freedesktop notification daemon
fn send_notify_send_notification(title: &str, body: &str) -> Result<()> {
    let output = Command::new("notify-send")
        .args(["--app-name", APP_TITLE, title, body])
        .output()?;

    if output.status.success() {
        Ok(())
    } else {
        let error = String::from_utf8_lossy(&output.stderr);
        Err(anyhow::anyhow!("notify-send failed: {}", error))
    }
}
