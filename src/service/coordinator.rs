//! Feed and undo, applied optimistically.
//!
//! Both operations run under one [`SingleFlight`] flag per view: while one
//! is in flight, further taps return `Ignored`. Undo of an event that is
//! still pending is refused locally without touching the store.

use std::sync::Arc;

use chrono::Duration;
use futures_util::future::{try_join, try_join_all};

use crate::clock::Clock;
use crate::domain::{
    EventId, EventKey, FeedingEvent, FeedingState, HouseholdId, Member, NewFeedingEvent,
    NewNotification, NotificationKind, PetId, ResolvedEvent, TempEventId, ViewModel,
};
use crate::error::{StoreError, SyncError};
use crate::store::RemoteStore;

use super::undo_timer::evaluate;
use super::{EchoSuppressor, OptimisticTransaction, SingleFlight, ViewModelLoader, ViewState};

/// Which pets a feed covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedTargets {
    /// Every pet currently in the view.
    All,
    /// An explicit, non-empty subset.
    Only(Vec<PetId>),
}

/// Input of [`FeedCoordinator::feed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRequest {
    /// Household being fed in.
    pub household_id: HouseholdId,
    /// Acting member.
    pub member: Member,
    /// Pets to feed.
    pub targets: FeedTargets,
}

impl FeedRequest {
    /// Builds a request acting as the view's own member.
    #[must_use]
    pub fn from_view(view: &ViewModel, targets: FeedTargets) -> Self {
        Self {
            household_id: view.household.id,
            member: view.member.clone(),
            targets,
        }
    }
}

/// Result of a feed tap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    /// The feeding reached the store under this id.
    Committed(EventId),
    /// Another operation was in flight; nothing happened.
    Ignored,
}

/// Result of an undo tap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoOutcome {
    /// The feeding was removed from the store.
    Undone,
    /// Another operation was in flight; nothing happened.
    Ignored,
}

/// Remote work of one feed.
#[derive(Debug)]
struct FeedPlan {
    temp: TempEventId,
    event: NewFeedingEvent,
    pets: Vec<(PetId, FeedingState)>,
}

/// Runs feed and undo against one view.
#[derive(Debug)]
pub struct FeedCoordinator {
    state: ViewState,
    loader: Arc<ViewModelLoader>,
    store: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
    flight: SingleFlight,
    echo: Arc<EchoSuppressor>,
    undo_window: Duration,
}

impl FeedCoordinator {
    /// Creates a coordinator owning a fresh echo suppressor.
    #[must_use]
    pub fn new(
        state: ViewState,
        loader: Arc<ViewModelLoader>,
        store: Arc<dyn RemoteStore>,
        clock: Arc<dyn Clock>,
        undo_window: Duration,
    ) -> Self {
        Self {
            state,
            loader,
            store,
            clock,
            flight: SingleFlight::new(),
            echo: Arc::new(EchoSuppressor::new()),
            undo_window,
        }
    }

    /// Echo suppressor armed by this coordinator's writes, to be handed
    /// to the realtime handler.
    #[must_use]
    pub fn echo(&self) -> Arc<EchoSuppressor> {
        Arc::clone(&self.echo)
    }

    /// Returns `true` while a feed or undo is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.flight.is_busy()
    }

    /// Feeds pets.
    ///
    /// # Errors
    ///
    /// - [`SyncError::NotLoaded`] before the first load.
    /// - [`SyncError::InvalidRequest`] for an empty or unknown pet set, or
    ///   a request for another household.
    /// - [`SyncError::Remote`] when the write failed and the view was
    ///   rolled back.
    pub async fn feed(&self, request: FeedRequest) -> Result<FeedOutcome, SyncError> {
        let Some(guard) = self.flight.try_acquire() else {
            tracing::debug!(
                household_id = %request.household_id,
                "feed ignored: operation in flight"
            );
            return Ok(FeedOutcome::Ignored);
        };

        let now = self.clock.now();
        let undo_window = self.undo_window;
        let history_limit = self.loader.history_limit();
        let store = &self.store;
        let notification_request = request.clone();

        let id = OptimisticTransaction::new(&self.state, &self.loader, &self.echo)
            .run(
                |view| build_feed(view, &request, now, undo_window, history_limit),
                |plan: FeedPlan| async move {
                    let temp = plan.temp;
                    let pet_writes = try_join_all(plan.pets.into_iter().map(|(pet_id, feeding)| {
                        store.update_pet_feeding_state(pet_id, Some(feeding))
                    }));
                    let (_, created) =
                        try_join(pet_writes, store.create_feeding_event(&plan.event)).await?;
                    let id = created.key.committed().ok_or_else(|| {
                        StoreError::Corrupt("created event has no durable id".to_string())
                    })?;
                    Ok((temp, id))
                },
                |view: &mut ViewModel, ids: &(TempEventId, EventId)| {
                    view.commit_key(ids.0, ids.1);
                },
            )
            .await
            .map(|(_, id)| id)?;

        drop(guard);
        tracing::info!(
            household_id = %notification_request.household_id,
            event_key = %EventKey::Committed(id),
            "feeding committed"
        );
        self.notify_feeding(&notification_request, id).await;
        Ok(FeedOutcome::Committed(id))
    }

    /// Undoes a feeding.
    ///
    /// # Errors
    ///
    /// - [`SyncError::StillSyncing`] for a pending key, checked before the
    ///   single-flight flag; the store is not contacted.
    /// - [`SyncError::NotLoaded`] before the first load.
    /// - [`SyncError::InvalidRequest`] if the event is not in the view.
    /// - [`SyncError::Remote`] when the delete failed and the view was
    ///   rolled back.
    pub async fn undo(&self, key: EventKey) -> Result<UndoOutcome, SyncError> {
        // A pending key is refused even while another operation is in
        // flight, so callers always get the retry signal for it.
        let Some(id) = key.committed() else {
            tracing::info!(event_key = %key, "undo refused: feeding still syncing");
            return Err(SyncError::StillSyncing);
        };
        let Some(_guard) = self.flight.try_acquire() else {
            tracing::debug!(event_key = %key, "undo ignored: operation in flight");
            return Ok(UndoOutcome::Ignored);
        };

        let now = self.clock.now();
        let store = &self.store;
        OptimisticTransaction::new(&self.state, &self.loader, &self.echo)
            .run(
                |view| build_undo(view, id, now),
                |id: EventId| async move { store.delete_feeding_event(id).await },
                |_: &mut ViewModel, _: &()| {},
            )
            .await?;

        tracing::info!(event_key = %key, "feeding undone");
        Ok(UndoOutcome::Undone)
    }

    /// Posts the "fed" notification to the rest of the household.
    async fn notify_feeding(&self, request: &FeedRequest, id: EventId) {
        let key = EventKey::Committed(id);
        let Some(message) = self.state.get().await.and_then(|view| {
            view.history
                .iter()
                .find(|r| r.event.key == key)
                .map(ResolvedEvent::summary)
        }) else {
            return;
        };
        let notification = NewNotification {
            household_id: request.household_id,
            author: request.member.id,
            kind: NotificationKind::Feeding,
            message,
        };
        if let Err(err) = self.store.add_notification(&notification).await {
            tracing::warn!(error = %err, "feeding notification failed");
        }
    }
}

/// Derives the optimistic view of a feed.
fn build_feed(
    view: &ViewModel,
    request: &FeedRequest,
    now: chrono::DateTime<chrono::Utc>,
    undo_window: Duration,
    history_limit: usize,
) -> Result<(ViewModel, FeedPlan), SyncError> {
    if request.household_id != view.household.id {
        return Err(SyncError::InvalidRequest(format!(
            "household {} is not loaded",
            request.household_id
        )));
    }

    let pet_ids: Vec<PetId> = match &request.targets {
        FeedTargets::All => view.pets.iter().map(|p| p.id).collect(),
        FeedTargets::Only(ids) => {
            let mut unique = Vec::with_capacity(ids.len());
            for id in ids {
                if view.pet(*id).is_none() {
                    return Err(SyncError::InvalidRequest(format!("unknown pet {id}")));
                }
                if !unique.contains(id) {
                    unique.push(*id);
                }
            }
            unique
        }
    };
    if pet_ids.is_empty() {
        return Err(SyncError::InvalidRequest("no pets to feed".to_string()));
    }

    let pet_names: Vec<String> = pet_ids
        .iter()
        .filter_map(|id| view.pet(*id).map(|p| p.name.clone()))
        .collect();
    let feeding = FeedingState {
        fed_at: now,
        fed_by: request.member.id,
        undo_deadline: now + undo_window,
    };
    let temp = TempEventId::new();
    let event = FeedingEvent {
        key: EventKey::Pending(temp),
        household_id: request.household_id,
        fed_by: request.member.id,
        fed_by_name: Some(request.member.name.clone()),
        pet_ids: pet_ids.clone(),
        pet_names: Some(pet_names.join(", ")),
        created_at: now,
        undo_deadline: feeding.undo_deadline,
    };
    let plan = FeedPlan {
        temp,
        event: NewFeedingEvent::from(&event),
        pets: pet_ids.iter().map(|id| (*id, feeding)).collect(),
    };

    let mut next = view.clone();
    for pet in next.pets.iter_mut().filter(|p| pet_ids.contains(&p.id)) {
        pet.feeding = Some(feeding);
    }
    let resolved = ResolvedEvent {
        event,
        pet_names,
        fed_by_name: request.member.name.clone(),
    };
    next.history.insert(0, resolved.clone());
    next.history.truncate(history_limit);
    next.undo = evaluate(Some(&resolved.event), now);
    next.latest = Some(resolved);

    Ok((next, plan))
}

/// Derives the optimistic view of an undo.
fn build_undo(
    view: &ViewModel,
    id: EventId,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<(ViewModel, EventId), SyncError> {
    let key = EventKey::Committed(id);
    let event = view
        .event(key)
        .cloned()
        .ok_or_else(|| SyncError::InvalidRequest(format!("feeding event {id} is not in view")))?;

    let mut next = view.clone();
    for pet in next
        .pets
        .iter_mut()
        .filter(|p| event.pet_ids.contains(&p.id))
    {
        pet.feeding = None;
    }
    next.history.retain(|r| r.event.key != key);
    next.latest = next.history.first().cloned();
    next.undo = evaluate(next.latest.as_ref().map(|r| &r.event), now);

    Ok((next, id))
}
