use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Gate for a diagnostic that may be requested in a tight loop.
///
/// At most one emission is allowed per `interval`; the first request always passes.
pub struct RateLimitedDiagnostic {
    interval: Duration,
    last: Mutex<Option<Instant>>,
    emitted: AtomicU64,
}

impl RateLimitedDiagnostic {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
            emitted: AtomicU64::new(0),
        }
    }

    /// Returns true if a diagnostic may be emitted at `now`, and records it.
    pub fn should_emit(&self, now: Instant) -> bool {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let due = match *last {
            None => true,
            Some(prev) => now.saturating_duration_since(prev) >= self.interval,
        };
        if due {
            *last = Some(now);
            self.emitted.fetch_add(1, Ordering::Relaxed);
        }
        due
    }

    /// Number of diagnostics let through so far.
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_request_passes() {
        let gate = RateLimitedDiagnostic::new(Duration::from_secs(30));
        assert!(gate.should_emit(Instant::now()));
        assert_eq!(gate.emitted(), 1);
    }

    #[test]
    fn test_requests_inside_window_suppressed() {
        let gate = RateLimitedDiagnostic::new(Duration::from_secs(30));
        let t0 = Instant::now();
        assert!(gate.should_emit(t0));
        for secs in [0, 1, 10, 29] {
            assert!(!gate.should_emit(t0 + Duration::from_secs(secs)));
        }
        assert_eq!(gate.emitted(), 1);
    }

    #[test]
    fn test_window_reopens_after_interval() {
        let gate = RateLimitedDiagnostic::new(Duration::from_secs(30));
        let t0 = Instant::now();
        assert!(gate.should_emit(t0));
        assert!(gate.should_emit(t0 + Duration::from_secs(30)));
        assert!(!gate.should_emit(t0 + Duration::from_secs(45)));
        assert!(gate.should_emit(t0 + Duration::from_secs(61)));
        assert_eq!(gate.emitted(), 3);
    }
}
