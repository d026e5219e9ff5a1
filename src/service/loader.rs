//! Cache-first loading of the status view.
//!
//! Phase (a) reads the local snapshot for an instant first paint. Phase
//! (b) always rebuilds the view from the store of record, writes it back
//! to the cache and replaces whatever is displayed. Background reloads
//! only run phase (b).

use std::collections::HashMap;
use std::sync::Arc;

use crate::clock::Clock;
use crate::domain::{
    FeedingEvent, HouseholdId, Member, MemberId, Pet, PetId, ResolvedEvent, UpdateReason,
    ViewModel,
};
use crate::error::StoreError;
use crate::store::{RemoteStore, SnapshotCache, view_cache_key};

use super::ViewState;
use super::undo_timer::evaluate;

/// Name shown for pets or members that can no longer be resolved.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Builds [`ViewModel`]s for one (household, member) pair.
#[derive(Debug)]
pub struct ViewModelLoader {
    household_id: HouseholdId,
    member_id: MemberId,
    store: Arc<dyn RemoteStore>,
    cache: Arc<dyn SnapshotCache>,
    clock: Arc<dyn Clock>,
    cache_key: String,
    history_limit: usize,
}

impl ViewModelLoader {
    /// Creates a loader.
    #[must_use]
    pub fn new(
        household_id: HouseholdId,
        member_id: MemberId,
        store: Arc<dyn RemoteStore>,
        cache: Arc<dyn SnapshotCache>,
        clock: Arc<dyn Clock>,
        history_limit: usize,
    ) -> Self {
        Self {
            household_id,
            member_id,
            store,
            cache,
            clock,
            cache_key: view_cache_key(household_id, member_id),
            history_limit: history_limit.max(1),
        }
    }

    /// Household this loader builds views for.
    #[must_use]
    pub const fn household_id(&self) -> HouseholdId {
        self.household_id
    }

    /// Member this loader builds views for.
    #[must_use]
    pub const fn member_id(&self) -> MemberId {
        self.member_id
    }

    /// Maximum number of history entries kept in a view.
    #[must_use]
    pub const fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// Phase (a): the cached snapshot, if one is readable.
    ///
    /// Failures are logged and reported as a miss. A snapshot for another
    /// household or member is ignored.
    pub async fn load_cached(&self) -> Option<ViewModel> {
        match self.cache.get(&self.cache_key).await {
            Ok(Some(view))
                if view.household.id == self.household_id && view.member.id == self.member_id =>
            {
                Some(view)
            }
            Ok(Some(_)) => {
                tracing::warn!(key = %self.cache_key, "cached view belongs to another member");
                None
            }
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(key = %self.cache_key, error = %err, "snapshot cache read failed");
                None
            }
        }
    }

    /// Writes `view` to the snapshot cache. Failures are logged only.
    pub async fn store_cached(&self, view: &ViewModel) {
        if let Err(err) = self.cache.set(&self.cache_key, view).await {
            tracing::warn!(key = %self.cache_key, error = %err, "snapshot cache write failed");
        }
    }

    /// Phase (b): rebuilds the view from the store of record.
    ///
    /// # Errors
    ///
    /// Returns the first [`StoreError`] hit while reading.
    pub async fn fetch(&self) -> Result<ViewModel, StoreError> {
        let store = &self.store;
        let (household, member, pets, events, unread_notifications) = tokio::try_join!(
            store.get_household(self.household_id),
            store.get_member(self.member_id),
            store.list_pets(self.household_id),
            store.list_feeding_events(self.household_id, self.history_limit),
            store.unread_notification_count(self.member_id),
        )?;

        let members = if events.iter().any(|e| e.fed_by_name.is_none()) {
            store.list_members(self.household_id).await?
        } else {
            Vec::new()
        };

        let history: Vec<ResolvedEvent> = events
            .into_iter()
            .map(|event| resolve_event(event, &pets, &members))
            .collect();
        let latest = history.first().cloned();
        let now = self.clock.now();

        Ok(ViewModel {
            undo: evaluate(latest.as_ref().map(|r| &r.event), now),
            household,
            member,
            pets,
            latest,
            history,
            unread_notifications,
            refreshed_at: now,
        })
    }

    /// Runs phase (b) and installs the result in `state`.
    ///
    /// # Errors
    ///
    /// Returns the [`StoreError`] of [`ViewModelLoader::fetch`]; the view
    /// in `state` is left untouched in that case.
    pub async fn refresh(&self, state: &ViewState) -> Result<ViewModel, StoreError> {
        let view = self.fetch().await?;
        let _ = state.replace(UpdateReason::Reloaded, view.clone()).await;
        self.store_cached(&view).await;
        tracing::debug!(
            household_id = %self.household_id,
            pets = view.pets.len(),
            history = view.history.len(),
            "view reloaded"
        );
        Ok(view)
    }
}

/// Resolves display names for one event.
///
/// Denormalized names stored on the event win. Legacy rows without them
/// fall back to the current pet list and member roster.
#[must_use]
pub fn resolve_event(event: FeedingEvent, pets: &[Pet], members: &[Member]) -> ResolvedEvent {
    let pet_names = match event.pet_names.as_deref() {
        Some(joined) => joined.split(", ").map(str::to_string).collect(),
        None => {
            let by_id: HashMap<PetId, &str> =
                pets.iter().map(|p| (p.id, p.name.as_str())).collect();
            event
                .pet_ids
                .iter()
                .map(|id| by_id.get(id).copied().unwrap_or(UNKNOWN_NAME).to_string())
                .collect()
        }
    };
    let fed_by_name = event.fed_by_name.clone().unwrap_or_else(|| {
        members
            .iter()
            .find(|m| m.id == event.fed_by)
            .map_or_else(|| UNKNOWN_NAME.to_string(), |m| m.name.clone())
    });
    ResolvedEvent {
        event,
        pet_names,
        fed_by_name,
    }
}
