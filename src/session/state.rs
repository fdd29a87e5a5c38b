use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Highest alert stage; stages run 0..=MAX_ALERT_STAGE
pub const MAX_ALERT_STAGE: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    /// Game time
    Distraction,
    /// Study time between game rounds
    ShortFocus,
    /// Final study block after the last repetition
    LongFocus,
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseKind::Distraction => write!(f, "Distraction"),
            PhaseKind::ShortFocus => write!(f, "Short Focus"),
            PhaseKind::LongFocus => write!(f, "Long Focus"),
        }
    }
}

/// Where the session state machine currently is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Running { index: usize, kind: PhaseKind },
    Complete,
    Cancelled,
    /// The worker died unexpectedly; everything was torn down
    Failed,
}

/// Read-only copy of the session state handed to presentation layers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub label: String,
    pub time_remaining: Duration,
    pub alert_stage: u8,
    pub running: bool,
    pub last_error: Option<String>,
}

impl SessionSnapshot {
    pub fn idle(time_remaining: Duration) -> Self {
        Self {
            phase: SessionPhase::Idle,
            label: "Ready".to_string(),
            time_remaining,
            alert_stage: 0,
            running: false,
            last_error: None,
        }
    }

    /// Time remaining as `mm:ss`
    pub fn format_remaining(&self) -> String {
        let secs = self.time_remaining.as_secs();
        format!("{:02}:{:02}", secs / 60, secs % 60)
    }
}

impl fmt::Display for SessionSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.format_remaining(), self.label)?;
        if self.alert_stage > 0 {
            write!(f, " [alert stage {}]", self.alert_stage)?;
        }
        Ok(())
    }
}

/// Single-writer status cell.
///
/// Writers build a whole new snapshot and swap it in, so readers never see a
/// half-updated set of fields.
#[derive(Debug, Clone)]
pub struct StatusBoard {
    current: Arc<RwLock<Arc<SessionSnapshot>>>,
}

impl StatusBoard {
    pub fn new(initial: SessionSnapshot) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(initial))),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        SessionSnapshot::clone(&guard)
    }

    /// Apply `update` to a copy of the current snapshot and publish it
    pub fn publish<F>(&self, update: F)
    where
        F: FnOnce(&mut SessionSnapshot),
    {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = SessionSnapshot::clone(&guard);
        update(&mut next);
        *guard = Arc::new(next);
    }

    pub fn replace(&self, snapshot: SessionSnapshot) {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(snapshot);
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new(SessionSnapshot::idle(Duration::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_format_remaining() {
        let mut snapshot = SessionSnapshot::idle(Duration::from_secs(25 * 60));
        assert_eq!(snapshot.format_remaining(), "25:00");

        snapshot.time_remaining = Duration::from_millis(65_900);
        assert_eq!(snapshot.format_remaining(), "01:05");
    }

    #[test]
    fn test_display_includes_alert_stage_only_when_alerting() {
        let mut snapshot = SessionSnapshot::idle(Duration::from_secs(90));
        assert_eq!(snapshot.to_string(), "01:30 Ready");

        snapshot.alert_stage = 3;
        assert_eq!(snapshot.to_string(), "01:30 Ready [alert stage 3]");
    }

    #[test]
    fn test_publish_is_seen_by_readers() {
        let board = StatusBoard::default();
        board.publish(|s| {
            s.alert_stage = 2;
            s.time_remaining = Duration::from_secs(42);
        });

        let snapshot = board.snapshot();
        assert_eq!(snapshot.alert_stage, 2);
        assert_eq!(snapshot.time_remaining, Duration::from_secs(42));
    }

    #[test]
    fn test_readers_never_observe_torn_updates() {
        let board = StatusBoard::default();
        let writer_board = board.clone();

        // Writer keeps alert_stage and time_remaining in lockstep
        let writer = thread::spawn(move || {
            for i in 0..2000u64 {
                writer_board.publish(|s| {
                    s.alert_stage = (i % 6) as u8;
                    s.time_remaining = Duration::from_secs(i % 6);
                });
            }
        });

        for _ in 0..2000 {
            let snapshot = board.snapshot();
            assert_eq!(
                snapshot.alert_stage as u64,
                snapshot.time_remaining.as_secs()
            );
        }

        writer.join().unwrap();
    }
}
