//! Local countdown of the undo window.
//!
//! The timer only does deadline arithmetic on the view already in memory.
//! It never talks to the store, so the countdown stays accurate offline.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::ViewState;
use crate::clock::Clock;
use crate::domain::{FeedingEvent, UndoStatus};

/// Default tick period.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Evaluates undo eligibility of `latest` at `now`.
///
/// Undo is available for every instant strictly before the deadline. The
/// target and deadline are reported even after the window closes so the
/// UI can tell which feeding it is looking at.
#[must_use]
pub fn evaluate(latest: Option<&FeedingEvent>, now: DateTime<Utc>) -> UndoStatus {
    let Some(event) = latest else {
        return UndoStatus::unavailable();
    };
    let remaining = event.undo_deadline - now;
    let available = event.undoable_at(now);
    let remaining_secs = if available {
        // Round up so "0s left" never shows while undo is still allowed.
        let millis = u64::try_from(remaining.num_milliseconds()).unwrap_or(0);
        millis.div_ceil(1_000)
    } else {
        0
    };
    UndoStatus {
        available,
        target: Some(event.key),
        deadline: Some(event.undo_deadline),
        remaining_secs,
    }
}

/// Periodic evaluator writing [`UndoStatus`] into the view.
#[derive(Debug, Clone)]
pub struct UndoWindowTimer {
    state: ViewState,
    clock: Arc<dyn Clock>,
    period: Duration,
}

impl UndoWindowTimer {
    /// Creates a timer over `state`.
    #[must_use]
    pub fn new(state: ViewState, clock: Arc<dyn Clock>, period: Duration) -> Self {
        Self {
            state,
            clock,
            period: period.max(Duration::from_millis(1)),
        }
    }

    /// Runs one evaluation.
    ///
    /// The clock is read first and the view is evaluated under its write
    /// lock, so a reconcile landing mid-tick is never overwritten with the
    /// key it replaced. Stores and publishes the status when it changed.
    /// Returns the status, or `None` before the first load.
    pub async fn tick(&self) -> Option<UndoStatus> {
        let now = self.clock.now();
        let (previous, status) = self
            .state
            .refresh_undo(|view| evaluate(view.latest.as_ref().map(|r| &r.event), now))
            .await?;
        if previous != status {
            self.state.publish_tick(status);
            if previous.available && !status.available {
                tracing::debug!(target_event = ?status.target, "undo window closed");
            }
        }
        Some(status)
    }

    /// Ticks forever.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let _ = self.tick().await;
        }
    }

    /// Spawns [`UndoWindowTimer::run`] on the runtime.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
