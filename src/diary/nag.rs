//! Nag scheduling primitives: the delay policy and a cancellable one-shot timer.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Upper bound on any nag delay or timer.
pub const MAX_DELAY: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// How long a bot waits before nagging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NagPolicy {
    /// Silence allowed after the last entry before owners are nagged.
    pub interval: Duration,
    /// Lower bound on any computed delay. Never zero.
    pub floor: Duration,
    /// Delay used when the bot has no entries at all.
    pub bootstrap: Duration,
}

impl Default for NagPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(12 * 60 * 60),
            floor: Duration::from_secs(10),
            bootstrap: Duration::from_secs(3),
        }
    }
}

impl NagPolicy {
    /// Delay until the next nag, given the last update time.
    ///
    /// `max(floor, interval - (now - last))`, or the bootstrap delay when
    /// there has never been an update. A last update in the future counts as
    /// "just now". The result is capped at [`MAX_DELAY`].
    pub fn delay(&self, last_update: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Duration {
        let floor = self.floor.max(Duration::from_millis(1));
        let Some(last) = last_update else {
            return self.bootstrap.clamp(Duration::from_millis(1), MAX_DELAY);
        };
        let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
        self.interval.saturating_sub(elapsed).max(floor).min(MAX_DELAY)
    }
}

/// A pending one-shot nag.
///
/// Dropping the timer does not cancel it; call [`NagTimer::cancel`].
#[derive(Debug)]
pub struct NagTimer {
    generation: u64,
    deadline: Instant,
    handle: JoinHandle<()>,
}

impl NagTimer {
    /// Run `callback` once after `delay` (at most [`MAX_DELAY`]) on the tokio runtime.
    pub fn spawn<F, Fut>(generation: u64, delay: Duration, callback: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let deadline = Instant::now() + delay.min(MAX_DELAY);
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            callback().await;
        });
        Self {
            generation,
            deadline,
            handle,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Time left before the callback fires.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_pending(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }
}
