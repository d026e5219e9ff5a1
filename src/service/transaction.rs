//! Snapshot, apply, write, then reconcile or roll back.
//!
//! Feed and undo share this sequence and differ only in how the optimistic
//! view is built, which remote write runs, and how its result is folded
//! back in.

use std::future::Future;

use crate::domain::{UpdateReason, ViewModel};
use crate::error::{StoreError, SyncError};

use super::{EchoSuppressor, ViewModelLoader, ViewState};

/// One optimistic operation against the current view.
///
/// The caller holds the single-flight guard for the whole run.
#[derive(Debug)]
pub struct OptimisticTransaction<'a> {
    state: &'a ViewState,
    loader: &'a ViewModelLoader,
    echo: &'a EchoSuppressor,
}

impl<'a> OptimisticTransaction<'a> {
    /// Creates a transaction over `state`.
    #[must_use]
    pub const fn new(
        state: &'a ViewState,
        loader: &'a ViewModelLoader,
        echo: &'a EchoSuppressor,
    ) -> Self {
        Self {
            state,
            loader,
            echo,
        }
    }

    /// Runs the transaction.
    ///
    /// 1. Snapshots the current view.
    /// 2. `build` derives the optimistic view and a write plan from it.
    ///    Returning an error here aborts with nothing applied.
    /// 3. The optimistic view is installed, cached and published, then the
    ///    echo suppressor is armed.
    /// 4. `write` performs the remote write.
    /// 5. On success `reconcile` folds the result into the current view. If
    ///    the view was replaced by a reload while the write was pending,
    ///    the view is reloaded instead since the write has landed.
    /// 6. On failure the snapshot is restored exactly and the suppressor
    ///    disarmed.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotLoaded`] without a view, the error of
    /// `build`, or [`SyncError::Remote`] after a rollback.
    pub async fn run<P, T, Fut>(
        &self,
        build: impl FnOnce(&ViewModel) -> Result<(ViewModel, P), SyncError>,
        write: impl FnOnce(P) -> Fut,
        reconcile: impl FnOnce(&mut ViewModel, &T),
    ) -> Result<T, SyncError>
    where
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let snapshot = self.state.get().await.ok_or(SyncError::NotLoaded)?;
        let (optimistic, plan) = build(&snapshot)?;

        let applied = self
            .state
            .replace(UpdateReason::Optimistic, optimistic.clone())
            .await;
        self.loader.store_cached(&optimistic).await;
        let token = self.echo.arm();

        match write(plan).await {
            Ok(output) => {
                if self.state.version() == applied {
                    if let Some((_, view)) = self
                        .state
                        .update(UpdateReason::Reconciled, |view| reconcile(view, &output))
                        .await
                    {
                        self.loader.store_cached(&view).await;
                    }
                } else {
                    tracing::debug!("view replaced during write; reloading");
                    if let Err(err) = self.loader.refresh(self.state).await {
                        tracing::warn!(error = %err, "reload after write failed");
                    }
                }
                Ok(output)
            }
            Err(err) => {
                self.echo.disarm(token);
                let _ = self
                    .state
                    .replace(UpdateReason::RolledBack, snapshot.clone())
                    .await;
                self.loader.store_cached(&snapshot).await;
                tracing::warn!(error = %err, "remote write failed; rolled back");
                Err(SyncError::Remote(err))
            }
        }
    }
}
