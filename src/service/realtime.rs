//! Reaction to realtime change notices.
//!
//! A notice means "something in this household changed". If our own
//! write armed the echo suppressor, the notice is swallowed; otherwise the
//! view is reloaded from the store (phase (b) only).

use std::sync::Arc;

use tokio::task::JoinHandle;

use super::{EchoSuppressor, ViewModelLoader, ViewState};
use crate::store::{ChangeNotice, Subscription};

/// What a notice led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeOutcome {
    /// Echo of a local write; nothing was done.
    Suppressed,
    /// The view was reloaded.
    Reloaded,
    /// The reload failed; the current view was kept.
    ReloadFailed,
    /// The notice was for another household.
    Skipped,
}

/// Consumes change notices for one view.
#[derive(Debug, Clone)]
pub struct RealtimeHandler {
    state: ViewState,
    loader: Arc<ViewModelLoader>,
    echo: Arc<EchoSuppressor>,
}

impl RealtimeHandler {
    /// Creates a handler sharing `echo` with the coordinator.
    #[must_use]
    pub fn new(state: ViewState, loader: Arc<ViewModelLoader>, echo: Arc<EchoSuppressor>) -> Self {
        Self {
            state,
            loader,
            echo,
        }
    }

    /// Handles one notice.
    pub async fn handle(&self, notice: ChangeNotice) -> NoticeOutcome {
        if notice.household_id != self.loader.household_id() {
            return NoticeOutcome::Skipped;
        }
        if self.echo.take() {
            tracing::debug!(household_id = %notice.household_id, "echo of local write suppressed");
            return NoticeOutcome::Suppressed;
        }
        match self.loader.refresh(&self.state).await {
            Ok(_) => NoticeOutcome::Reloaded,
            Err(err) => {
                tracing::warn!(
                    household_id = %notice.household_id,
                    error = %err,
                    "background reload failed; keeping current view"
                );
                NoticeOutcome::ReloadFailed
            }
        }
    }

    /// Handles notices until the subscription ends.
    pub async fn run(self, mut subscription: Subscription) {
        while let Some(notice) = subscription.recv().await {
            let _ = self.handle(notice).await;
        }
        tracing::info!(
            household_id = %subscription.household_id(),
            "realtime subscription closed"
        );
    }

    /// Spawns [`RealtimeHandler::run`] on the runtime.
    #[must_use]
    pub fn spawn(self, subscription: Subscription) -> JoinHandle<()> {
        tokio::spawn(self.run(subscription))
    }
}
