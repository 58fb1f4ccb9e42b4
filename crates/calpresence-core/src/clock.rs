use chrono::{DateTime, Duration, Utc};
use tokio::time::Instant;

/// Source of wall-clock time for deadlines and "now" comparisons.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall clock derived from the tokio clock.
///
/// Anchored at construction; afterwards it advances with `tokio::time`, so
/// tests running with paused time see deadlines fire as the runtime
/// auto-advances.
#[derive(Debug, Clone)]
pub struct TokioClock {
    anchor_utc: DateTime<Utc>,
    anchor_instant: Instant,
}

impl TokioClock {
    pub fn starting_at(anchor_utc: DateTime<Utc>) -> Self {
        Self {
            anchor_utc,
            anchor_instant: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = self.anchor_instant.elapsed();
        let elapsed = Duration::from_std(elapsed).unwrap_or_else(|_| Duration::zero());
        self.anchor_utc + elapsed
    }
}
