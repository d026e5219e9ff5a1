//! Collaborator seams: the store of record, its change notifier, and the
//! local snapshot cache.
//!
//! The engine only talks to these traits. Two families of implementations
//! exist: PostgreSQL-backed ([`postgres::PgStore`], [`postgres::PgNotifier`])
//! for production and in-process ([`memory::MemoryStore`],
//! [`memory::MemoryNotifier`]) for demos and tests. Snapshot caches live in
//! [`cache`].

pub mod cache;
pub mod memory;
pub mod models;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::{
    EventId, FeedingEvent, FeedingState, Household, HouseholdId, Member, MemberId,
    NewFeedingEvent, NewNotification, Pet, PetId, ViewModel,
};
use crate::error::{CacheError, StoreError};

pub use cache::{FileSnapshotCache, MemorySnapshotCache};
pub use memory::{DemoHousehold, FaultMode, MemoryNotifier, MemoryStore, StoreOp};
pub use postgres::{PgNotifier, PgStore};

/// CRUD access to the store of record.
#[async_trait]
pub trait RemoteStore: Send + Sync + fmt::Debug {
    /// Loads a household.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for unknown ids, or a transport error.
    async fn get_household(&self, id: HouseholdId) -> Result<Household, StoreError>;

    /// Loads a member.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for unknown ids, or a transport error.
    async fn get_member(&self, id: MemberId) -> Result<Member, StoreError>;

    /// Lists the members of a household.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on transport failure.
    async fn list_members(&self, household_id: HouseholdId) -> Result<Vec<Member>, StoreError>;

    /// Lists the pets of a household, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on transport failure or corrupt rows.
    async fn list_pets(&self, household_id: HouseholdId) -> Result<Vec<Pet>, StoreError>;

    /// Sets or clears the feeding state of one pet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for unknown pets, or a transport error.
    async fn update_pet_feeding_state(
        &self,
        pet_id: PetId,
        feeding: Option<FeedingState>,
    ) -> Result<Pet, StoreError>;

    /// Creates a feeding event row and returns it with its durable id.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the row could not be written.
    async fn create_feeding_event(&self, event: &NewFeedingEvent)
    -> Result<FeedingEvent, StoreError>;

    /// Undoes a feeding: clears the feeding state of every pet in the event
    /// and deletes the event row, as one logical step.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`], [`StoreError::UndoExpired`] once
    /// the deadline has passed, or a transport error.
    async fn delete_feeding_event(&self, id: EventId) -> Result<(), StoreError>;

    /// Lists the most recent feeding events of a household, newest first.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on transport failure or corrupt rows.
    async fn list_feeding_events(
        &self,
        household_id: HouseholdId,
        limit: usize,
    ) -> Result<Vec<FeedingEvent>, StoreError>;

    /// Counts unread notifications addressed to a member.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on transport failure.
    async fn unread_notification_count(&self, member_id: MemberId) -> Result<u32, StoreError>;

    /// Marks every unread notification addressed to a member as read.
    ///
    /// Returns how many were marked.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on transport failure.
    async fn mark_notifications_read(&self, member_id: MemberId) -> Result<u32, StoreError>;

    /// Fans a notification out to every household member except its author.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on transport failure.
    async fn add_notification(&self, notification: &NewNotification) -> Result<(), StoreError>;
}

/// "Something in this household changed." Carries no other payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeNotice {
    /// Household that changed.
    pub household_id: HouseholdId,
    /// When the notice was received locally.
    pub received_at: DateTime<Utc>,
}

impl ChangeNotice {
    /// Creates a notice stamped now.
    #[must_use]
    pub fn now(household_id: HouseholdId) -> Self {
        Self {
            household_id,
            received_at: Utc::now(),
        }
    }
}

/// Live realtime subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    household_id: HouseholdId,
    rx: mpsc::Receiver<ChangeNotice>,
    forwarder: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Wraps a notice receiver. `forwarder` is aborted on drop.
    #[must_use]
    pub fn new(
        household_id: HouseholdId,
        rx: mpsc::Receiver<ChangeNotice>,
        forwarder: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            household_id,
            rx,
            forwarder,
        }
    }

    /// Household this subscription watches.
    #[must_use]
    pub const fn household_id(&self) -> HouseholdId {
        self.household_id
    }

    /// Waits for the next notice. Returns `None` once the notifier is gone.
    pub async fn recv(&mut self) -> Option<ChangeNotice> {
        self.rx.recv().await
    }

    /// Returns a queued notice without waiting.
    pub fn try_recv(&mut self) -> Option<ChangeNotice> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.forwarder.take() {
            task.abort();
        }
    }
}

/// Realtime change feed of the store of record.
///
/// Delivery is at-least-once per relevant mutation; reconnection is the
/// implementation's business.
#[async_trait]
pub trait ChangeNotifier: Send + Sync + fmt::Debug {
    /// Subscribes to changes in one household.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the subscription could not be set up.
    async fn subscribe(&self, household_id: HouseholdId) -> Result<Subscription, StoreError>;
}

/// Durable key-value store for last-known-good views.
#[async_trait]
pub trait SnapshotCache: Send + Sync + fmt::Debug {
    /// Reads a cached view, `None` when absent or unreadable.
    ///
    /// # Errors
    ///
    /// Returns a [`CacheError`] on I/O or decoding failure.
    async fn get(&self, key: &str) -> Result<Option<ViewModel>, CacheError>;

    /// Stores a view under `key`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns a [`CacheError`] on I/O or encoding failure.
    async fn set(&self, key: &str, view: &ViewModel) -> Result<(), CacheError>;
}

/// Cache key of the status view of `member_id` in `household_id`.
#[must_use]
pub fn view_cache_key(household_id: HouseholdId, member_id: MemberId) -> String {
    format!("status_view_{household_id}_{member_id}")
}
