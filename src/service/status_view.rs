//! The status view of one member in one household.
//!
//! [`StatusView`] wires the loader, the coordinator, the undo timer and
//! the realtime handler around a single [`ViewState`]. It is what the HTTP
//! and WebSocket layers talk to.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::undo_timer::DEFAULT_TICK;
use super::{
    FeedCoordinator, FeedOutcome, FeedRequest, FeedTargets, RealtimeHandler, UndoOutcome,
    UndoWindowTimer, ViewModelLoader, ViewState,
};
use crate::clock::Clock;
use crate::domain::{
    EventBus, EventKey, HouseholdId, MemberId, UNDO_WINDOW, UndoStatus, UpdateReason, ViewModel,
};
use crate::error::SyncError;
use crate::store::{ChangeNotifier, RemoteStore, SnapshotCache};

/// Default number of feeding events kept in the view.
pub const DEFAULT_HISTORY_LIMIT: usize = 30;

/// Tunables of one status view.
#[derive(Debug, Clone)]
pub struct ViewSettings {
    /// Household shown.
    pub household_id: HouseholdId,
    /// Member viewing it.
    pub member_id: MemberId,
    /// Maximum history length.
    pub history_limit: usize,
    /// Undo window applied to new feedings.
    pub undo_window: chrono::Duration,
    /// Undo countdown period.
    pub undo_tick: Duration,
}

impl ViewSettings {
    /// Settings with default limits.
    #[must_use]
    pub const fn new(household_id: HouseholdId, member_id: MemberId) -> Self {
        Self {
            household_id,
            member_id,
            history_limit: DEFAULT_HISTORY_LIMIT,
            undo_window: UNDO_WINDOW,
            undo_tick: DEFAULT_TICK,
        }
    }
}

/// External collaborators of a status view.
#[derive(Debug, Clone)]
pub struct Collaborators {
    /// Store of record.
    pub store: Arc<dyn RemoteStore>,
    /// Realtime change feed.
    pub notifier: Arc<dyn ChangeNotifier>,
    /// Local snapshot cache.
    pub cache: Arc<dyn SnapshotCache>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
}

/// Handles of the background tasks of a mounted view. Dropping them stops
/// the tasks.
#[derive(Debug)]
pub struct BackgroundTasks {
    timer: JoinHandle<()>,
    realtime: JoinHandle<()>,
}

impl BackgroundTasks {
    /// Stops both tasks.
    pub fn abort(&self) {
        self.timer.abort();
        self.realtime.abort();
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Facade over the sync engine for one (household, member) view.
#[derive(Debug)]
pub struct StatusView {
    settings: ViewSettings,
    state: ViewState,
    loader: Arc<ViewModelLoader>,
    coordinator: Arc<FeedCoordinator>,
    store: Arc<dyn RemoteStore>,
    notifier: Arc<dyn ChangeNotifier>,
    clock: Arc<dyn Clock>,
}

impl StatusView {
    /// Builds an unmounted view publishing on `bus`.
    #[must_use]
    pub fn new(settings: ViewSettings, collaborators: Collaborators, bus: EventBus) -> Self {
        let Collaborators {
            store,
            notifier,
            cache,
            clock,
        } = collaborators;
        let state = ViewState::new(bus);
        let loader = Arc::new(ViewModelLoader::new(
            settings.household_id,
            settings.member_id,
            Arc::clone(&store),
            cache,
            Arc::clone(&clock),
            settings.history_limit,
        ));
        let coordinator = Arc::new(FeedCoordinator::new(
            state.clone(),
            Arc::clone(&loader),
            Arc::clone(&store),
            Arc::clone(&clock),
            settings.undo_window,
        ));
        Self {
            settings,
            state,
            loader,
            coordinator,
            store,
            notifier,
            clock,
        }
    }

    /// Settings this view was built with.
    #[must_use]
    pub const fn settings(&self) -> &ViewSettings {
        &self.settings
    }

    /// The underlying view cell.
    #[must_use]
    pub const fn state(&self) -> &ViewState {
        &self.state
    }

    /// First load: shows the cached snapshot right away if there is one,
    /// then rebuilds from the store.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Remote`] if the store could not be read. A
    /// restored snapshot stays visible in that case.
    pub async fn mount(&self) -> Result<ViewModel, SyncError> {
        if !self.state.is_loaded().await
            && let Some(cached) = self.loader.load_cached().await
        {
            tracing::info!(
                household_id = %self.settings.household_id,
                refreshed_at = %cached.refreshed_at,
                "showing cached view"
            );
            let _ = self.state.replace(UpdateReason::CacheRestored, cached).await;
        }
        self.reload().await
    }

    /// Rebuilds the view from the store.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Remote`] if the store could not be read; the
    /// current view is kept.
    pub async fn reload(&self) -> Result<ViewModel, SyncError> {
        Ok(self.loader.refresh(&self.state).await?)
    }

    /// Feeds `targets` as this view's member.
    ///
    /// The transaction runs on its own task. Dropping the returned future
    /// abandons the result only; the write still reconciles or rolls back.
    ///
    /// # Errors
    ///
    /// See [`FeedCoordinator::feed`]. [`SyncError::Internal`] if the
    /// transaction task panicked.
    pub async fn feed(&self, targets: FeedTargets) -> Result<FeedOutcome, SyncError> {
        let view = self.state.get().await.ok_or(SyncError::NotLoaded)?;
        let request = FeedRequest::from_view(&view, targets);
        let coordinator = Arc::clone(&self.coordinator);
        detached(async move { coordinator.feed(request).await }).await
    }

    /// Undoes the feeding identified by `key`, on its own task like
    /// [`StatusView::feed`].
    ///
    /// # Errors
    ///
    /// See [`FeedCoordinator::undo`]. [`SyncError::Internal`] if the
    /// transaction task panicked.
    pub async fn undo(&self, key: EventKey) -> Result<UndoOutcome, SyncError> {
        let coordinator = Arc::clone(&self.coordinator);
        detached(async move { coordinator.undo(key).await }).await
    }

    /// Marks the member's notifications read and clears the unread count
    /// of the view. Returns how many were marked.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotLoaded`] before the first load and
    /// [`SyncError::Remote`] if the store refused; the count is kept then.
    pub async fn mark_notifications_read(&self) -> Result<u32, SyncError> {
        if !self.state.is_loaded().await {
            return Err(SyncError::NotLoaded);
        }
        let member_id = self.settings.member_id;
        let marked = self.store.mark_notifications_read(member_id).await?;
        let _ = self
            .state
            .update(UpdateReason::NotificationsRead, |view| {
                view.unread_notifications = 0;
            })
            .await;
        tracing::debug!(member_id = %member_id, marked, "notifications marked read");
        Ok(marked)
    }

    /// Current view, `None` before the first load.
    pub async fn current(&self) -> Option<ViewModel> {
        self.state.get().await
    }

    /// Undo status as of the last evaluation.
    pub async fn undo_status(&self) -> UndoStatus {
        self.state.undo_status().await
    }

    /// Current time on this view's clock.
    #[must_use]
    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    /// Returns `true` while a feed or undo is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.coordinator.is_busy()
    }

    /// Undo countdown over this view.
    #[must_use]
    pub fn timer(&self) -> UndoWindowTimer {
        UndoWindowTimer::new(
            self.state.clone(),
            Arc::clone(&self.clock),
            self.settings.undo_tick,
        )
    }

    /// Realtime handler sharing this view's echo suppressor.
    #[must_use]
    pub fn realtime_handler(&self) -> RealtimeHandler {
        RealtimeHandler::new(
            self.state.clone(),
            Arc::clone(&self.loader),
            self.coordinator.echo(),
        )
    }

    /// Subscribes to the change feed and starts the undo countdown and
    /// the realtime handler.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Remote`] if the subscription could not be
    /// opened.
    pub async fn spawn_background(&self) -> Result<BackgroundTasks, SyncError> {
        let subscription = self
            .notifier
            .subscribe(self.settings.household_id)
            .await?;
        Ok(BackgroundTasks {
            timer: self.timer().spawn(),
            realtime: self.realtime_handler().spawn(subscription),
        })
    }
}

/// Runs `operation` on a task of its own and waits for it.
async fn detached<T, F>(operation: F) -> Result<T, SyncError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, SyncError>> + Send + 'static,
{
    tokio::spawn(operation).await.map_err(|err| {
        tracing::error!(error = %err, "view transaction task failed");
        SyncError::Internal(format!("transaction task failed: {err}"))
    })?
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::task::Poll;

    use chrono::{Duration as ChronoDuration, Utc};
    use tokio::sync::broadcast;

    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::{EventId, Household, Member, Pet, ViewEvent};
    use crate::error::StoreError;
    use crate::service::NoticeOutcome;
    use crate::store::{
        FaultMode, MemoryNotifier, MemorySnapshotCache, MemoryStore, StoreOp, Subscription,
    };

    struct Harness {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        cache: Arc<MemorySnapshotCache>,
        bus: EventBus,
        view: StatusView,
        household: Household,
        member: Member,
        fido: Pet,
        rex: Pet,
    }

    impl Harness {
        async fn new(is_pro: bool) -> Self {
            let clock = Arc::new(ManualClock::new(Utc::now()));
            let store = Arc::new(MemoryStore::with_clock(Arc::clone(&clock) as Arc<dyn Clock>));
            let household = store.create_household("Home", is_pro).await;
            let member = store.create_member(household.id, "Sam").await;
            let fido = store.create_pet(household.id, "Fido").await;
            let rex = store.create_pet(household.id, "Rex").await;
            let cache = Arc::new(MemorySnapshotCache::new());
            let bus = EventBus::new(64);
            let view = device(&store, &clock, &cache, &bus, household.id, member.id);
            Self {
                store,
                clock,
                cache,
                bus,
                view,
                household,
                member,
                fido,
                rex,
            }
        }

        async fn mounted(is_pro: bool) -> Self {
            let harness = Self::new(is_pro).await;
            let Ok(_) = harness.view.mount().await else {
                panic!("mount failed");
            };
            harness
        }

        async fn subscribe(&self) -> Subscription {
            let Ok(sub) = self.store.notifier().subscribe(self.household.id).await else {
                panic!("subscribe failed");
            };
            sub
        }

        async fn current(&self) -> ViewModel {
            let Some(view) = self.view.current().await else {
                panic!("view not loaded");
            };
            view
        }
    }

    fn device(
        store: &Arc<MemoryStore>,
        clock: &Arc<ManualClock>,
        cache: &Arc<MemorySnapshotCache>,
        bus: &EventBus,
        household_id: HouseholdId,
        member_id: MemberId,
    ) -> StatusView {
        let notifier: MemoryNotifier = store.notifier();
        StatusView::new(
            ViewSettings::new(household_id, member_id),
            Collaborators {
                store: Arc::clone(store) as Arc<dyn RemoteStore>,
                notifier: Arc::new(notifier),
                cache: Arc::clone(cache) as Arc<dyn SnapshotCache>,
                clock: Arc::clone(clock) as Arc<dyn Clock>,
            },
            bus.clone(),
        )
    }

    fn committed(outcome: Result<FeedOutcome, SyncError>) -> EventId {
        match outcome {
            Ok(FeedOutcome::Committed(id)) => id,
            other => panic!("expected a committed feed, got {other:?}"),
        }
    }

    /// Waits for the optimistic update of an operation running on its own
    /// task.
    async fn optimistic_applied(rx: &mut broadcast::Receiver<ViewEvent>) -> ViewModel {
        let applied = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match rx.recv().await {
                    Ok(ViewEvent::Updated {
                        reason: UpdateReason::Optimistic,
                        view,
                        ..
                    }) => break Some(*view),
                    Ok(_) => {}
                    Err(_) => break None,
                }
            }
        })
        .await;
        let Ok(Some(view)) = applied else {
            panic!("no optimistic update");
        };
        view
    }

    /// Waits until no feed or undo is in flight.
    async fn settle(view: &StatusView) {
        let settled = tokio::time::timeout(Duration::from_secs(2), async {
            while view.is_busy() {
                tokio::task::yield_now().await;
            }
        })
        .await;
        assert!(settled.is_ok(), "operation never finished");
    }

    /// Drives a manually polled call to completion.
    async fn finish<F: Future>(task: &mut tokio_test::task::Spawn<F>) -> F::Output {
        let done = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Poll::Ready(out) = task.poll() {
                    break out;
                }
                tokio::task::yield_now().await;
            }
        })
        .await;
        let Ok(out) = done else {
            panic!("call did not complete");
        };
        out
    }

    // Scenario A
    #[tokio::test]
    async fn feed_all_shows_optimistic_event_then_commits() {
        let h = Harness::mounted(true).await;
        let mut rx = h.bus.subscribe();

        let id = committed(h.view.feed(FeedTargets::All).await);

        let Ok(ViewEvent::Updated { reason, view, .. }) = rx.recv().await else {
            panic!("expected the optimistic update first");
        };
        assert_eq!(reason, UpdateReason::Optimistic);
        let Some(latest) = view.latest.as_ref() else {
            panic!("optimistic view has no latest event");
        };
        assert!(latest.event.key.is_pending());
        assert_eq!(latest.summary(), "Sam fed Fido, Rex");
        let deadlines: Vec<_> = view
            .pets
            .iter()
            .map(|p| p.feeding.map(|f| f.undo_deadline))
            .collect();
        assert_eq!(deadlines.len(), 2);
        assert!(deadlines.iter().all(|d| d.is_some() && *d == deadlines.first().copied().flatten()));

        let Ok(ViewEvent::Updated { reason, .. }) = rx.recv().await else {
            panic!("expected the reconciled update");
        };
        assert_eq!(reason, UpdateReason::Reconciled);

        let current = h.current().await;
        assert_eq!(current.latest.map(|r| r.event.key), Some(EventKey::Committed(id)));
        assert!(current.undo.available);

        h.clock.advance(UNDO_WINDOW + ChronoDuration::seconds(1));
        let _ = h.view.timer().tick().await;
        assert!(!h.view.undo_status().await.available);
    }

    #[tokio::test]
    async fn reconcile_leaves_no_temporary_id() {
        let h = Harness::mounted(true).await;
        let _ = committed(h.view.feed(FeedTargets::All).await);
        let _ = committed(h.view.feed(FeedTargets::Only(vec![h.rex.id])).await);

        let view = h.current().await;
        assert!(!view.has_pending());
        assert!(view.undo.target.is_some_and(|k| !k.is_pending()));
        assert_eq!(view.history.len(), 2);
    }

    // Scenario B
    #[tokio::test]
    async fn failed_event_create_rolls_back_exactly() {
        let h = Harness::mounted(false).await;
        let before = h.current().await;
        let before_json = serde_json::to_vec(&before).unwrap_or_default();

        h.store.inject_fault(StoreOp::CreateEvent, FaultMode::Once);
        let result = h.view.feed(FeedTargets::All).await;

        let Err(err) = result else {
            panic!("feed should fail");
        };
        assert!(matches!(err, SyncError::Remote(StoreError::Unavailable(_))));
        assert!(err.is_retryable());

        let after = h.current().await;
        assert_eq!(after, before);
        assert_eq!(serde_json::to_vec(&after).unwrap_or_default(), before_json);
        assert!(!h.view.is_busy());
    }

    #[tokio::test]
    async fn failed_pet_update_rolls_back_and_disarms_echo() {
        let h = Harness::mounted(true).await;
        let before = h.current().await;

        h.store.inject_fault(StoreOp::UpdatePet, FaultMode::Once);
        assert!(h.view.feed(FeedTargets::Only(vec![h.fido.id])).await.is_err());
        assert_eq!(h.current().await, before);

        // The write never landed, so the next notice is someone else's.
        let mut sub = h.subscribe().await;
        let _ = h.store.create_pet(h.household.id, "Milo").await;
        let Some(notice) = sub.try_recv() else {
            panic!("expected a notice");
        };
        let handler = h.view.realtime_handler();
        assert_eq!(handler.handle(notice).await, NoticeOutcome::Reloaded);
    }

    // The pet writes are not undone remotely when the event row fails.
    #[tokio::test]
    async fn failed_event_create_leaves_remote_pets_fed() {
        let h = Harness::mounted(true).await;
        h.store.inject_fault(StoreOp::CreateEvent, FaultMode::Once);
        assert!(h.view.feed(FeedTargets::All).await.is_err());

        let local = h.current().await;
        assert!(local.pets.iter().all(|p| p.feeding.is_none()));

        let remote = h.store.pet(h.fido.id).await.and_then(|p| p.feeding);
        assert!(remote.is_some());

        let Ok(reloaded) = h.view.reload().await else {
            panic!("reload failed");
        };
        assert!(reloaded.latest.is_none());
        assert!(reloaded.pet(h.fido.id).is_some_and(|p| p.feeding.is_some()));
    }

    #[tokio::test]
    async fn overlapping_feed_is_ignored() {
        let h = Harness::mounted(true).await;
        let mut rx = h.bus.subscribe();
        h.store.hold_writes();

        let mut first = tokio_test::task::spawn(h.view.feed(FeedTargets::All));
        assert!(first.poll().is_pending());
        let _ = optimistic_applied(&mut rx).await;
        assert!(h.view.is_busy());

        let pending = h.current().await;
        assert!(pending.has_pending());

        let second = h.view.feed(FeedTargets::Only(vec![h.fido.id])).await;
        assert!(matches!(second, Ok(FeedOutcome::Ignored)));
        let undo = h.view.undo(EventKey::Committed(EventId::new())).await;
        assert!(matches!(undo, Ok(UndoOutcome::Ignored)));
        assert_eq!(h.current().await, pending);

        h.store.release_writes();
        let id = committed(finish(&mut first).await);
        drop(first);

        assert!(!h.view.is_busy());
        assert_eq!(h.store.call_count(StoreOp::CreateEvent), 1);
        let Ok(events) = h.store.list_feeding_events(h.household.id, 10).await else {
            panic!("list failed");
        };
        assert_eq!(events.len(), 1);
        assert_eq!(events.first().map(|e| e.key), Some(EventKey::Committed(id)));
        assert_eq!(events.first().map(|e| e.pet_ids.len()), Some(2));
    }

    #[tokio::test]
    async fn undo_with_temporary_id_never_reaches_store() {
        let h = Harness::mounted(true).await;
        let mut rx = h.bus.subscribe();
        h.store.hold_writes();

        let mut feed = tokio_test::task::spawn(h.view.feed(FeedTargets::All));
        assert!(feed.poll().is_pending());
        let Some(temp) = optimistic_applied(&mut rx).await.latest.map(|r| r.event.key) else {
            panic!("optimistic event missing");
        };
        assert!(temp.is_pending());

        let result = h.view.undo(temp).await;
        assert!(matches!(result, Err(SyncError::StillSyncing)));

        h.store.release_writes();
        let _ = committed(finish(&mut feed).await);
        drop(feed);

        let EventKey::Pending(stale) = temp else {
            panic!("temporary key expected");
        };
        let result = h.view.undo(EventKey::Pending(stale)).await;
        assert!(matches!(result, Err(SyncError::StillSyncing)));
        assert_eq!(h.store.call_count(StoreOp::DeleteEvent), 0);
    }

    // Scenario C
    #[tokio::test]
    async fn undo_clears_pets_and_promotes_previous_event() {
        let h = Harness::mounted(true).await;
        let first = committed(h.view.feed(FeedTargets::Only(vec![h.fido.id])).await);
        h.clock.advance(ChronoDuration::seconds(10));
        let second = committed(h.view.feed(FeedTargets::All).await);

        let result = h.view.undo(EventKey::Committed(second)).await;
        assert!(matches!(result, Ok(UndoOutcome::Undone)));

        let view = h.current().await;
        assert!(view.pets.iter().all(|p| p.feeding.is_none()));
        assert!(view.event(EventKey::Committed(second)).is_none());
        assert_eq!(view.latest.map(|r| r.event.key), Some(EventKey::Committed(first)));
        assert_eq!(view.undo.target, Some(EventKey::Committed(first)));
        assert!(h.store.feeding_event(second).await.is_none());

        let result = h.view.undo(EventKey::Committed(first)).await;
        assert!(matches!(result, Ok(UndoOutcome::Undone)));
        let view = h.current().await;
        assert!(view.latest.is_none());
        assert!(view.history.is_empty());
        assert!(!view.undo.available);
    }

    #[tokio::test]
    async fn undo_after_store_deadline_rolls_back() {
        let h = Harness::mounted(true).await;
        let id = committed(h.view.feed(FeedTargets::All).await);
        h.clock.advance(UNDO_WINDOW);
        let before = h.current().await;

        let result = h.view.undo(EventKey::Committed(id)).await;
        assert!(matches!(result, Err(SyncError::Remote(StoreError::UndoExpired(_)))));
        assert_eq!(h.current().await, before);
        assert!(h.store.feeding_event(id).await.is_some());
    }

    #[tokio::test]
    async fn failed_delete_restores_event() {
        let h = Harness::mounted(true).await;
        let id = committed(h.view.feed(FeedTargets::All).await);
        let before = h.current().await;

        h.store.inject_fault(StoreOp::DeleteEvent, FaultMode::Once);
        assert!(h.view.undo(EventKey::Committed(id)).await.is_err());
        assert_eq!(h.current().await, before);
    }

    #[tokio::test]
    async fn echo_is_swallowed_exactly_once() {
        let h = Harness::mounted(true).await;
        let mut sub = h.subscribe().await;
        let handler = h.view.realtime_handler();

        let _ = committed(h.view.feed(FeedTargets::All).await);
        let Some(echo) = sub.try_recv() else {
            panic!("own write should notify");
        };
        let reads = h.store.call_count(StoreOp::ListPets);
        assert_eq!(handler.handle(echo).await, NoticeOutcome::Suppressed);
        assert_eq!(h.store.call_count(StoreOp::ListPets), reads);

        let _ = h.store.create_pet(h.household.id, "Milo").await;
        let Some(other) = sub.try_recv() else {
            panic!("pet creation should notify");
        };
        assert_eq!(handler.handle(other).await, NoticeOutcome::Reloaded);
        assert_eq!(h.current().await.pets.len(), 3);
    }

    // Scenario D
    #[tokio::test]
    async fn second_device_reloads_on_remote_feed() {
        let h = Harness::mounted(true).await;
        let alex = h.store.create_member(h.household.id, "Alex").await;
        let other = device(&h.store, &h.clock, &h.cache, &h.bus, h.household.id, alex.id);
        let Ok(_) = other.mount().await else {
            panic!("second device failed to mount");
        };

        let mut x_sub = h.subscribe().await;
        let mut y_sub = h.subscribe().await;
        let x_handler = h.view.realtime_handler();
        let y_handler = other.realtime_handler();

        let id = committed(h.view.feed(FeedTargets::Only(vec![h.fido.id])).await);

        let (Some(x_notice), Some(y_notice)) = (x_sub.try_recv(), y_sub.try_recv()) else {
            panic!("both devices should be notified");
        };
        assert_eq!(x_handler.handle(x_notice).await, NoticeOutcome::Suppressed);
        assert_eq!(y_handler.handle(y_notice).await, NoticeOutcome::Reloaded);

        let Some(y_view) = other.current().await else {
            panic!("second device lost its view");
        };
        let Some(latest) = y_view.latest.clone() else {
            panic!("second device should see the feeding");
        };
        assert_eq!(latest.event.key, EventKey::Committed(id));
        assert_eq!(latest.summary(), "Sam fed Fido");
        assert_eq!(y_view.unread_notifications, 1);
        assert!(y_view.pet(h.fido.id).is_some_and(|p| p.feeding.is_some()));

        assert_eq!(other.mark_notifications_read().await.ok(), Some(1));
        assert_eq!(other.current().await.map(|v| v.unread_notifications), Some(0));
        assert_eq!(h.store.unread_notification_count(alex.id).await.ok(), Some(0));

        // A later reload keeps the count at zero.
        let Ok(reloaded) = other.reload().await else {
            panic!("reload failed");
        };
        assert_eq!(reloaded.unread_notifications, 0);
    }

    #[tokio::test]
    async fn failed_mark_read_keeps_unread_count() {
        let h = Harness::mounted(true).await;
        let alex = h.store.create_member(h.household.id, "Alex").await;
        let other = device(&h.store, &h.clock, &h.cache, &h.bus, h.household.id, alex.id);
        let _ = committed(h.view.feed(FeedTargets::All).await);
        let Ok(loaded) = other.mount().await else {
            panic!("second device failed to mount");
        };
        assert_eq!(loaded.unread_notifications, 1);

        h.store.inject_fault(StoreOp::MarkRead, FaultMode::Once);
        assert!(matches!(
            other.mark_notifications_read().await,
            Err(SyncError::Remote(_))
        ));
        assert_eq!(other.current().await.map(|v| v.unread_notifications), Some(1));
    }

    #[tokio::test]
    async fn reload_during_write_is_followed_by_fresh_reload() {
        let h = Harness::mounted(true).await;
        let mut rx = h.bus.subscribe();
        h.store.hold_writes();

        let mut feed = tokio_test::task::spawn(h.view.feed(FeedTargets::All));
        assert!(feed.poll().is_pending());
        let _ = optimistic_applied(&mut rx).await;

        let Ok(reloaded) = h.view.reload().await else {
            panic!("reload failed");
        };
        assert!(reloaded.latest.is_none());

        h.store.release_writes();
        let id = committed(finish(&mut feed).await);
        drop(feed);

        let view = h.current().await;
        assert_eq!(view.latest.as_ref().map(|r| r.event.key), Some(EventKey::Committed(id)));
        assert!(!view.has_pending());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dropped_feed_call_still_commits() {
        let h = Harness::mounted(true).await;
        let mut rx = h.bus.subscribe();
        h.store.hold_writes();

        let mut call = tokio_test::task::spawn(h.view.feed(FeedTargets::All));
        assert!(call.poll().is_pending());
        let temp = optimistic_applied(&mut rx).await.latest.map(|r| r.event.key);
        assert!(temp.is_some_and(|k| k.is_pending()));
        drop(call);

        h.store.release_writes();
        settle(&h.view).await;

        let view = h.current().await;
        assert!(!view.has_pending());
        let Some(key) = view.latest.as_ref().map(|r| r.event.key) else {
            panic!("feeding lost");
        };
        assert_eq!(view.undo.target, Some(key));
        assert_eq!(h.store.call_count(StoreOp::CreateEvent), 1);
        assert!(matches!(h.view.undo(key).await, Ok(UndoOutcome::Undone)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dropped_undo_call_still_deletes() {
        let h = Harness::mounted(true).await;
        let id = committed(h.view.feed(FeedTargets::All).await);
        let mut rx = h.bus.subscribe();
        h.store.hold_writes();

        let mut call = tokio_test::task::spawn(h.view.undo(EventKey::Committed(id)));
        assert!(call.poll().is_pending());
        let optimistic = optimistic_applied(&mut rx).await;
        assert!(optimistic.latest.is_none());
        drop(call);

        h.store.release_writes();
        settle(&h.view).await;

        let view = h.current().await;
        assert!(view.latest.is_none());
        assert!(view.pets.iter().all(|p| p.feeding.is_none()));
        assert!(h.store.feeding_event(id).await.is_none());
    }

    #[tokio::test]
    async fn mount_shows_cache_when_store_is_down() {
        let h = Harness::mounted(true).await;
        let _ = committed(h.view.feed(FeedTargets::All).await);
        let cached = h.current().await;

        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let cold = device(&h.store, &h.clock, &h.cache, &bus, h.household.id, h.member.id);
        h.store.inject_fault(StoreOp::ListPets, FaultMode::Always);

        assert!(matches!(cold.mount().await, Err(SyncError::Remote(_))));
        assert_eq!(cold.current().await, Some(cached));
        let Ok(event) = rx.recv().await else {
            panic!("expected cache restore");
        };
        assert_eq!(event.reason(), Some(UpdateReason::CacheRestored));

        h.store.clear_faults();
        assert!(cold.reload().await.is_ok());
    }

    #[tokio::test]
    async fn actions_before_mount_report_not_loaded() {
        let h = Harness::new(true).await;
        assert!(matches!(h.view.feed(FeedTargets::All).await, Err(SyncError::NotLoaded)));
        assert!(matches!(
            h.view.undo(EventKey::Committed(EventId::new())).await,
            Err(SyncError::NotLoaded)
        ));
        assert!(matches!(
            h.view.mark_notifications_read().await,
            Err(SyncError::NotLoaded)
        ));
        assert!(!h.view.undo_status().await.available);
    }

    #[tokio::test]
    async fn invalid_feed_touches_nothing() {
        let h = Harness::mounted(true).await;
        let before = h.current().await;

        let unknown = h.view.feed(FeedTargets::Only(vec![crate::domain::PetId::new()])).await;
        assert!(matches!(unknown, Err(SyncError::InvalidRequest(_))));
        let empty = h.view.feed(FeedTargets::Only(Vec::new())).await;
        assert!(matches!(empty, Err(SyncError::InvalidRequest(_))));

        assert_eq!(h.current().await, before);
        assert_eq!(h.store.call_count(StoreOp::UpdatePet), 0);
        assert_eq!(h.store.call_count(StoreOp::CreateEvent), 0);
    }

    #[tokio::test]
    async fn free_tier_sees_one_history_entry() {
        let h = Harness::mounted(false).await;
        let _ = committed(h.view.feed(FeedTargets::All).await);
        let _ = committed(h.view.feed(FeedTargets::All).await);

        let view = h.current().await;
        assert_eq!(view.history.len(), 2);
        assert_eq!(view.visible_history(DEFAULT_HISTORY_LIMIT).len(), 1);
    }

    #[tokio::test]
    async fn background_tasks_reload_on_remote_change() {
        let h = Harness::mounted(true).await;
        let Ok(tasks) = h.view.spawn_background().await else {
            panic!("spawn failed");
        };
        let mut rx = h.bus.subscribe();

        let _ = h.store.create_pet(h.household.id, "Milo").await;
        let reloaded = tokio::time::timeout(std::time::Duration::from_secs(2), async {
            loop {
                match rx.recv().await {
                    Ok(event) if event.reason() == Some(UpdateReason::Reloaded) => break true,
                    Ok(_) => {}
                    Err(_) => break false,
                }
            }
        })
        .await;
        assert_eq!(reloaded.ok(), Some(true));
        tasks.abort();
    }
}
