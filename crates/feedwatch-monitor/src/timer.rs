//! Cancellable recurring timers.
//!
//! Each logical timer (check tick, periodic re-alert, gate re-evaluation)
//! owns one [`TimerSlot`]. Arming a slot cancels whatever it held before, so a
//! slot never has two live timers.

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Holder for the cancellation token of one logical timer.
#[derive(Debug, Default)]
pub struct TimerSlot {
    token: Option<CancellationToken>,
}

impl TimerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held timer with a fresh token and return it.
    pub fn arm(&mut self) -> CancellationToken {
        self.cancel();
        let token = CancellationToken::new();
        self.token = Some(token.clone());
        token
    }

    /// Cancel the held timer. Returns false if nothing was armed.
    pub fn cancel(&mut self) -> bool {
        match self.token.take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.token.as_ref().is_some_and(|t| !t.is_cancelled())
    }
}

/// Run `tick` every `period`, first after one full period, until `token` is
/// cancelled or `tick` breaks.
///
/// Missed ticks are delayed rather than bunched up. A zero period, or one
/// too large to schedule, never ticks; the task just waits to be cancelled.
pub fn spawn_every<F, Fut>(period: Duration, token: CancellationToken, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ControlFlow<()>> + Send + 'static,
{
    let first = Instant::now()
        .checked_add(period)
        .filter(|_| !period.is_zero());
    let Some(first) = first else {
        warn!(period_secs = period.as_secs(), "Timer period out of range, never ticking");
        return tokio::spawn(async move { token.cancelled().await });
    };

    tokio::spawn(async move {
        let mut ticker = interval_at(first, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if token.is_cancelled() || tick().await.is_break() {
                break;
            }
        }
    })
}
