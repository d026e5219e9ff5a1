//! The shared cell holding the current status view.
//!
//! Every writer goes through [`ViewState`], which publishes a
//! [`ViewEvent`] for each replacement so UI clients never poll. A version
//! counter lets an in-flight transaction detect that someone else
//! replaced the view while it was waiting on the store.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::RwLock;

use crate::domain::{EventBus, UndoStatus, UpdateReason, ViewEvent, ViewModel};

/// Current view of one (household, member) pair, shared by the engine.
#[derive(Debug, Clone)]
pub struct ViewState {
    view: Arc<RwLock<Option<ViewModel>>>,
    version: Arc<AtomicU64>,
    bus: EventBus,
}

impl ViewState {
    /// Creates an empty cell publishing on `bus`.
    #[must_use]
    pub fn new(bus: EventBus) -> Self {
        Self {
            view: Arc::new(RwLock::new(None)),
            version: Arc::new(AtomicU64::new(0)),
            bus,
        }
    }

    /// Returns a copy of the current view.
    pub async fn get(&self) -> Option<ViewModel> {
        self.view.read().await.clone()
    }

    /// Returns `true` once any view has been installed.
    pub async fn is_loaded(&self) -> bool {
        self.view.read().await.is_some()
    }

    /// Current undo status, unavailable before the first load.
    pub async fn undo_status(&self) -> UndoStatus {
        self.view
            .read()
            .await
            .as_ref()
            .map_or_else(UndoStatus::unavailable, |v| v.undo)
    }

    /// Bumped on every [`ViewState::replace`] and [`ViewState::update`].
    /// Undo ticks do not count.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Installs `view` and publishes it. Returns the new version.
    pub async fn replace(&self, reason: UpdateReason, view: ViewModel) -> u64 {
        let version = {
            let mut slot = self.view.write().await;
            *slot = Some(view.clone());
            self.version.fetch_add(1, Ordering::AcqRel) + 1
        };
        self.bus.publish(ViewEvent::updated(reason, view));
        version
    }

    /// Mutates the current view in place and publishes the result.
    ///
    /// Returns `None` (and publishes nothing) when no view is loaded.
    pub async fn update<R>(
        &self,
        reason: UpdateReason,
        f: impl FnOnce(&mut ViewModel) -> R,
    ) -> Option<(R, ViewModel)> {
        let (out, view) = {
            let mut slot = self.view.write().await;
            let view = slot.as_mut()?;
            let out = f(view);
            self.version.fetch_add(1, Ordering::AcqRel);
            (out, view.clone())
        };
        self.bus.publish(ViewEvent::updated(reason, view.clone()));
        Some((out, view))
    }

    /// Re-evaluates the undo status against the view it describes.
    ///
    /// `evaluate` runs under the write lock, so the stored status always
    /// matches the `latest` event it was computed from. Returns the
    /// previous and the new status, or `None` before the first load. Does
    /// not publish and does not bump the version.
    pub async fn refresh_undo(
        &self,
        evaluate: impl FnOnce(&ViewModel) -> UndoStatus,
    ) -> Option<(UndoStatus, UndoStatus)> {
        let mut slot = self.view.write().await;
        let view = slot.as_mut()?;
        let previous = view.undo;
        view.undo = evaluate(view);
        Some((previous, view.undo))
    }

    /// Publishes an undo countdown tick.
    pub fn publish_tick(&self, status: UndoStatus) -> usize {
        self.bus.publish(ViewEvent::UndoTick {
            status,
            timestamp: Utc::now(),
        })
    }

    /// The bus this cell publishes on.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }
}
