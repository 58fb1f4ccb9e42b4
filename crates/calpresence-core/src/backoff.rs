use crate::error::SourceError;
use parking_lot::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Exponential retry delay for calendar source I/O failures.
///
/// The delay starts at `base` and doubles on every error, up to
/// `base * 2^max_doublings`. It never gives up; a success resets it.
#[derive(Debug)]
pub struct ServerBackoff {
    base: Duration,
    max_doublings: u32,
    doublings: Mutex<u32>,
}

impl ServerBackoff {
    pub fn new(base: Duration, max_doublings: u32) -> Self {
        Self {
            base,
            max_doublings,
            doublings: Mutex::new(0),
        }
    }

    pub fn current_delay(&self) -> Duration {
        let doublings = (*self.doublings.lock()).min(self.max_doublings).min(31);
        self.base.saturating_mul(1u32 << doublings)
    }

    pub fn max_delay(&self) -> Duration {
        self.base.saturating_mul(1u32 << self.max_doublings.min(31))
    }

    pub fn on_error(&self) {
        let mut doublings = self.doublings.lock();
        if *doublings < self.max_doublings {
            *doublings += 1;
        }
    }

    pub fn on_success(&self) {
        *self.doublings.lock() = 0;
    }

    /// Sleep for the current delay. Returns `Interrupted` if `cancel` fires
    /// first.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), SourceError> {
        let delay = self.current_delay();
        debug!(delay_ms = delay.as_millis() as u64, "Backing off before retry");
        tokio::select! {
            _ = cancel.cancelled() => Err(SourceError::Interrupted),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}
