//! Time source used for timestamps and `delay` suspension.
//!
//! Executions never call the wall clock directly; they go through a
//! [`Clock`] so tests can substitute [`crate::mock::VirtualClock`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Resolve once `duration` has elapsed on this clock. Sleeping is a timer
    /// registration and holds no thread while pending.
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock timestamps with tokio timers.
///
/// Under `#[tokio::test(start_paused = true)]` the timers auto-advance.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
