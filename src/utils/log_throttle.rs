//! Rate limiting for repeated identity-provider failure warnings.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Streak {
    failures: u64,
    silenced: u64,
    last_logged: Instant,
}

/// Tracks consecutive failures per provider operation so an outage produces
/// one warning per window instead of one per request.
#[derive(Debug)]
pub struct FailureThrottle {
    window: Duration,
    streaks: Mutex<HashMap<&'static str, Streak>>,
}

/// How a failure should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report {
    /// Log it, mentioning the failures silenced since the last warning.
    Warn { failures: u64, silenced: u64 },
    /// Counted, but inside the current window.
    Silent,
}

impl FailureThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            streaks: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failure of `operation`.
    pub fn failure(&self, operation: &'static str) -> Report {
        let mut streaks = self.streaks.lock().unwrap_or_else(|p| p.into_inner());
        let now = Instant::now();

        let Some(streak) = streaks.get_mut(operation) else {
            streaks.insert(
                operation,
                Streak {
                    failures: 1,
                    silenced: 0,
                    last_logged: now,
                },
            );
            return Report::Warn {
                failures: 1,
                silenced: 0,
            };
        };

        streak.failures += 1;
        if now.duration_since(streak.last_logged) < self.window {
            streak.silenced += 1;
            return Report::Silent;
        }
        streak.last_logged = now;
        Report::Warn {
            failures: streak.failures,
            silenced: std::mem::take(&mut streak.silenced),
        }
    }

    /// Record a success of `operation`, ending its failure streak.
    ///
    /// Returns the length of the streak that just ended, if there was one.
    pub fn success(&self, operation: &'static str) -> Option<u64> {
        let mut streaks = self.streaks.lock().unwrap_or_else(|p| p.into_inner());
        streaks.remove(operation).map(|s| s.failures)
    }
}
