use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Provides the amount of time that has elapsed since a fixed origin.
///
/// The origin is arbitrary but must be shared across process restarts, since
/// ledger records written in one run are compared against `provide` in the
/// next. The cache queries the provider exactly once per `get` evaluation so
/// every comparison within it sees the same "now".
pub trait ElapsedTimeProvider: Send + Sync + 'static {
    fn provide(&self) -> Duration;
}

/// Production clock: elapsed time since the Unix epoch.
///
/// A process-local monotonic instant cannot be used here because its origin
/// dies with the process. Wall-clock jumps backwards are tolerated by the
/// engine, which treats any record dated after "now" as expired.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl ElapsedTimeProvider for SystemClock {
    fn provide(&self) -> Duration {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
    }
}

/// Deterministic clock advanced under explicit test control.
#[derive(Debug, Default)]
pub struct ManualClock {
    elapsed_ms: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward by `amount`.
    pub fn advance(&self, amount: Duration) {
        self.elapsed_ms
            .fetch_add(amount.as_millis() as u64, Ordering::SeqCst);
    }
}

impl ElapsedTimeProvider for ManualClock {
    fn provide(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms.load(Ordering::SeqCst))
    }
}
