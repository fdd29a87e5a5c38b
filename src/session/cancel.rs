use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// One-shot stop flag that sleeping threads can wait on.
///
/// Cloning shares the flag. Once cancelled it stays cancelled; a new session
/// gets a new signal.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and wake every waiter
    pub fn cancel(&self) {
        let (lock, condvar) = &*self.inner;
        let mut cancelled = lock.lock().unwrap_or_else(PoisonError::into_inner);
        *cancelled = true;
        condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self
            .inner
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for `timeout` or until cancelled, whichever comes first.
    ///
    /// Returns `true` if the signal is cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, condvar) = &*self.inner;
        // No representable deadline means wait until cancelled
        let deadline = Instant::now().checked_add(timeout);
        let mut cancelled = lock.lock().unwrap_or_else(PoisonError::into_inner);

        while !*cancelled {
            cancelled = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    condvar
                        .wait_timeout(cancelled, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => condvar.wait(cancelled).unwrap_or_else(PoisonError::into_inner),
            };
        }

        *cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_wait_times_out_when_not_cancelled() {
        let signal = CancelSignal::new();
        let started = Instant::now();

        assert!(!signal.wait_timeout(Duration::from_millis(30)));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_cancel_wakes_waiter_early() {
        let signal = CancelSignal::new();
        let waiter = signal.clone();

        let handle = thread::spawn(move || {
            let started = Instant::now();
            let cancelled = waiter.wait_timeout(Duration::from_secs(10));
            (cancelled, started.elapsed())
        });

        thread::sleep(Duration::from_millis(20));
        signal.cancel();

        let (cancelled, waited) = handle.join().unwrap();
        assert!(cancelled);
        assert!(waited < Duration::from_secs(2));
    }

    #[test]
    fn test_unbounded_wait_still_wakes_on_cancel() {
        let signal = CancelSignal::new();
        let waiter = signal.clone();

        let handle = thread::spawn(move || waiter.wait_timeout(Duration::MAX));

        thread::sleep(Duration::from_millis(20));
        signal.cancel();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_cancel_is_sticky_and_idempotent() {
        let signal = CancelSignal::new();
        signal.cancel();
        signal.cancel();

        assert!(signal.is_cancelled());
        assert!(signal.wait_timeout(Duration::from_secs(5)));
    }
}
