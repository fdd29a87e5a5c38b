use anyhow::Result;
use signal_hook::consts::signal::*;
use signal_hook_tokio::Signals;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{info, warn};

/// Signal types forwarded to the session loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalType {
    /// SIGTERM/SIGINT: stop the session and exit
    Shutdown,
    /// SIGHUP: re-read configuration for the next session
    Reload,
}

/// Handles system signals for graceful shutdown and configuration reload
#[derive(Clone)]
pub struct SignalHandler {
    signal_sender: mpsc::UnboundedSender<SignalType>,
}

impl SignalHandler {
    pub fn with_sender(signal_sender: mpsc::UnboundedSender<SignalType>) -> Self {
        Self { signal_sender }
    }

    /// Listen for SIGTERM, SIGINT and SIGHUP until a shutdown signal arrives
    pub async fn listen_for_signals(&self) -> Result<()> {
        let mut signals = Signals::new([SIGTERM, SIGINT, SIGHUP])?;

        info!("Signal handler initialized, listening for SIGTERM, SIGINT, SIGHUP");

        while let Some(signal) = signals.next().await {
            match signal {
                SIGTERM | SIGINT => {
                    info!("Received shutdown signal ({}), stopping session", signal);
                    self.request_shutdown();
                    break;
                }
                SIGHUP => {
                    info!("Received SIGHUP signal, reloading configuration");
                    self.request_reload();
                }
                _ => {
                    warn!("Received unexpected signal: {}", signal);
                }
            }
        }

        Ok(())
    }

    /// Notify the receiver as if SIGTERM had arrived
    pub fn request_shutdown(&self) {
        self.forward(SignalType::Shutdown);
    }

    /// Ask the receiver to re-read configuration, as if SIGHUP had arrived
    pub fn request_reload(&self) {
        self.forward(SignalType::Reload);
    }

    fn forward(&self, signal: SignalType) {
        if let Err(e) = self.signal_sender.send(signal) {
            warn!("Failed to forward {:?} signal: {}", signal, e);
        }
    }
}
