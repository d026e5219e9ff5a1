//! In-process store of record and change notifier.
//!
//! [`MemoryStore`] implements [`RemoteStore`] over plain collections. It
//! backs the daemon when persistence is disabled and drives the engine's
//! tests: every operation is counted, any operation can be made to fail
//! ([`MemoryStore::inject_fault`]), and writes can be held pending
//! ([`MemoryStore::hold_writes`]) to observe the engine mid-flight.
//!
//! Only feeding-event inserts and deletes (and pet creation) notify
//! subscribers; pet feeding-state updates belong to the same logical
//! action as the event row and stay silent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Duration;
use tokio::sync::{RwLock, Semaphore, mpsc};

use super::{ChangeNotice, ChangeNotifier, RemoteStore, Subscription};
use crate::clock::{Clock, SystemClock};
use crate::domain::{
    EventId, EventKey, FeedingEvent, FeedingState, Household, HouseholdId, Member, MemberId,
    NewFeedingEvent, NewNotification, Pet, PetId,
};
use crate::error::StoreError;

/// Feeding events older than this are pruned on insert.
pub const DEFAULT_RETENTION: Duration = Duration::days(30);

/// Per-subscriber notice buffer. A full buffer already guarantees a reload,
/// so extra notices are dropped.
const NOTICE_BUFFER: usize = 16;

/// Operations of [`MemoryStore`], used for fault injection and call counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// [`RemoteStore::get_household`].
    GetHousehold,
    /// [`RemoteStore::get_member`].
    GetMember,
    /// [`RemoteStore::list_members`].
    ListMembers,
    /// [`RemoteStore::list_pets`].
    ListPets,
    /// [`RemoteStore::update_pet_feeding_state`].
    UpdatePet,
    /// [`RemoteStore::create_feeding_event`].
    CreateEvent,
    /// [`RemoteStore::delete_feeding_event`].
    DeleteEvent,
    /// [`RemoteStore::list_feeding_events`].
    ListEvents,
    /// [`RemoteStore::unread_notification_count`].
    UnreadCount,
    /// [`RemoteStore::mark_notifications_read`].
    MarkRead,
    /// [`RemoteStore::add_notification`].
    AddNotification,
}

impl StoreOp {
    const fn is_write(self) -> bool {
        matches!(self, Self::UpdatePet | Self::CreateEvent | Self::DeleteEvent)
    }
}

/// How an injected fault behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultMode {
    /// Fail the next call only.
    Once,
    /// Fail every call until cleared.
    Always,
}

#[derive(Debug, Clone)]
struct StoredNotification {
    recipient: MemberId,
    read: bool,
}

#[derive(Debug, Default)]
struct Inner {
    households: HashMap<HouseholdId, Household>,
    members: HashMap<MemberId, Member>,
    memberships: Vec<(HouseholdId, MemberId)>,
    pets: HashMap<PetId, Pet>,
    events: Vec<FeedingEvent>,
    notifications: Vec<StoredNotification>,
}

/// Fan-out of [`ChangeNotice`]s to in-process subscribers.
#[derive(Debug, Clone, Default)]
pub struct MemoryNotifier {
    subscribers: Arc<Mutex<Vec<(HouseholdId, mpsc::Sender<ChangeNotice>)>>>,
}

impl MemoryNotifier {
    /// Creates a notifier without subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifies every live subscriber of `household_id`.
    ///
    /// Returns how many subscribers were reached.
    pub fn notify(&self, household_id: HouseholdId) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|(_, tx)| !tx.is_closed());

        let notice = ChangeNotice::now(household_id);
        subscribers
            .iter()
            .filter(|(id, _)| *id == household_id)
            .filter(|(_, tx)| tx.try_send(notice).is_ok())
            .count()
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|(_, tx)| !tx.is_closed());
        subscribers.len()
    }
}

#[async_trait]
impl ChangeNotifier for MemoryNotifier {
    async fn subscribe(&self, household_id: HouseholdId) -> Result<Subscription, StoreError> {
        let (tx, rx) = mpsc::channel(NOTICE_BUFFER);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((household_id, tx));
        tracing::debug!(%household_id, "memory notifier subscription opened");
        Ok(Subscription::new(household_id, rx, None))
    }
}

/// Rows created by [`MemoryStore::seed_demo`].
#[derive(Debug, Clone)]
pub struct DemoHousehold {
    /// The household.
    pub household: Household,
    /// Its members; the first one is the default viewer.
    pub members: Vec<Member>,
    /// Its pets.
    pub pets: Vec<Pet>,
}

/// In-process [`RemoteStore`].
#[derive(Debug)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    notifier: MemoryNotifier,
    clock: Arc<dyn Clock>,
    retention: Duration,
    faults: Mutex<HashMap<StoreOp, FaultMode>>,
    calls: Mutex<HashMap<StoreOp, usize>>,
    hold: Mutex<Option<Arc<Semaphore>>>,
}

impl MemoryStore {
    /// Creates an empty store on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store on the given clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            notifier: MemoryNotifier::new(),
            clock,
            retention: DEFAULT_RETENTION,
            faults: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            hold: Mutex::new(None),
        }
    }

    /// Returns the notifier fed by this store's mutations.
    #[must_use]
    pub fn notifier(&self) -> MemoryNotifier {
        self.notifier.clone()
    }

    /// Makes `op` fail with [`StoreError::Unavailable`].
    pub fn inject_fault(&self, op: StoreOp, mode: FaultMode) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(op, mode);
    }

    /// Removes every injected fault.
    pub fn clear_faults(&self) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of calls made to `op`, failed ones included.
    #[must_use]
    pub fn call_count(&self, op: StoreOp) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&op)
            .copied()
            .unwrap_or(0)
    }

    /// Keeps every write pending until [`MemoryStore::release_writes`].
    pub fn hold_writes(&self) {
        *self.hold.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(Arc::new(Semaphore::new(0)));
    }

    /// Lets held and future writes proceed.
    pub fn release_writes(&self) {
        if let Some(gate) = self.hold.lock().unwrap_or_else(PoisonError::into_inner).take() {
            gate.close();
        }
    }

    /// Adds a household.
    pub async fn create_household(&self, name: &str, is_pro: bool) -> Household {
        let household = Household {
            id: HouseholdId::new(),
            name: name.to_string(),
            is_pro,
        };
        self.inner
            .write()
            .await
            .households
            .insert(household.id, household.clone());
        household
    }

    /// Switches a household between Free and Pro.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for unknown households.
    pub async fn set_pro(&self, household_id: HouseholdId, is_pro: bool) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let household = inner
            .households
            .get_mut(&household_id)
            .ok_or_else(|| not_found("household", household_id))?;
        household.is_pro = is_pro;
        Ok(())
    }

    /// Adds a member to a household.
    pub async fn create_member(&self, household_id: HouseholdId, name: &str) -> Member {
        let member = Member {
            id: MemberId::new(),
            name: name.to_string(),
        };
        let mut inner = self.inner.write().await;
        inner.members.insert(member.id, member.clone());
        inner.memberships.push((household_id, member.id));
        member
    }

    /// Adds a never-fed pet to a household and notifies subscribers.
    pub async fn create_pet(&self, household_id: HouseholdId, name: &str) -> Pet {
        let pet = Pet::new(name, household_id);
        self.inner.write().await.pets.insert(pet.id, pet.clone());
        self.notifier.notify(household_id);
        pet
    }

    /// Returns a pet as currently stored.
    pub async fn pet(&self, pet_id: PetId) -> Option<Pet> {
        self.inner.read().await.pets.get(&pet_id).cloned()
    }

    /// Returns a feeding event as currently stored.
    pub async fn feeding_event(&self, id: EventId) -> Option<FeedingEvent> {
        self.inner
            .read()
            .await
            .events
            .iter()
            .find(|e| e.key == EventKey::Committed(id))
            .cloned()
    }

    /// Seeds a Pro household with two members and two pets.
    pub async fn seed_demo(&self) -> DemoHousehold {
        let household = self.create_household("Demo Household", true).await;
        let members = vec![
            self.create_member(household.id, "Alex").await,
            self.create_member(household.id, "Sam").await,
        ];
        let pets = vec![
            self.create_pet(household.id, "Biscuit").await,
            self.create_pet(household.id, "Pepper").await,
        ];
        tracing::info!(household_id = %household.id, "seeded demo household");
        DemoHousehold {
            household,
            members,
            pets,
        }
    }

    async fn enter(&self, op: StoreOp) -> Result<(), StoreError> {
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(op)
            .or_insert(0) += 1;

        if op.is_write() {
            let gate = self
                .hold
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(gate) = gate {
                // A closed gate means writes were released.
                let _ = gate.acquire().await;
            }
        }

        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        match faults.get(&op).copied() {
            Some(FaultMode::Once) => {
                faults.remove(&op);
                Err(injected(op))
            }
            Some(FaultMode::Always) => Err(injected(op)),
            None => Ok(()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(entity: &'static str, id: impl ToString) -> StoreError {
    StoreError::NotFound {
        entity,
        id: id.to_string(),
    }
}

fn injected(op: StoreOp) -> StoreError {
    StoreError::Unavailable(format!("injected fault on {op:?}"))
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get_household(&self, id: HouseholdId) -> Result<Household, StoreError> {
        self.enter(StoreOp::GetHousehold).await?;
        self.inner
            .read()
            .await
            .households
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("household", id))
    }

    async fn get_member(&self, id: MemberId) -> Result<Member, StoreError> {
        self.enter(StoreOp::GetMember).await?;
        self.inner
            .read()
            .await
            .members
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("member", id))
    }

    async fn list_members(&self, household_id: HouseholdId) -> Result<Vec<Member>, StoreError> {
        self.enter(StoreOp::ListMembers).await?;
        let inner = self.inner.read().await;
        Ok(inner
            .memberships
            .iter()
            .filter(|(h, _)| *h == household_id)
            .filter_map(|(_, m)| inner.members.get(m).cloned())
            .collect())
    }

    async fn list_pets(&self, household_id: HouseholdId) -> Result<Vec<Pet>, StoreError> {
        self.enter(StoreOp::ListPets).await?;
        let inner = self.inner.read().await;
        let mut pets: Vec<Pet> = inner
            .pets
            .values()
            .filter(|p| p.household_id == household_id)
            .cloned()
            .collect();
        pets.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(pets)
    }

    async fn update_pet_feeding_state(
        &self,
        pet_id: PetId,
        feeding: Option<FeedingState>,
    ) -> Result<Pet, StoreError> {
        self.enter(StoreOp::UpdatePet).await?;
        let mut inner = self.inner.write().await;
        let pet = inner
            .pets
            .get_mut(&pet_id)
            .ok_or_else(|| not_found("pet", pet_id))?;
        pet.feeding = feeding;
        Ok(pet.clone())
    }

    async fn create_feeding_event(
        &self,
        event: &NewFeedingEvent,
    ) -> Result<FeedingEvent, StoreError> {
        self.enter(StoreOp::CreateEvent).await?;
        if event.pet_ids.is_empty() {
            return Err(StoreError::Corrupt(
                "feeding event must reference at least one pet".to_string(),
            ));
        }

        let stored = FeedingEvent {
            key: EventKey::Committed(EventId::new()),
            household_id: event.household_id,
            fed_by: event.fed_by,
            fed_by_name: Some(event.fed_by_name.clone()),
            pet_ids: event.pet_ids.clone(),
            pet_names: Some(event.pet_names.clone()),
            created_at: event.created_at,
            undo_deadline: event.undo_deadline,
        };

        let cutoff = self.clock.now() - self.retention;
        {
            let mut inner = self.inner.write().await;
            inner.events.push(stored.clone());
            inner.events.retain(|e| e.created_at >= cutoff);
        }
        self.notifier.notify(event.household_id);
        Ok(stored)
    }

    async fn delete_feeding_event(&self, id: EventId) -> Result<(), StoreError> {
        self.enter(StoreOp::DeleteEvent).await?;
        let now = self.clock.now();
        let household_id = {
            let mut inner = self.inner.write().await;
            let key = EventKey::Committed(id);
            let event = inner
                .events
                .iter()
                .find(|e| e.key == key)
                .cloned()
                .ok_or_else(|| not_found("feeding event", id))?;
            if !event.undoable_at(now) {
                return Err(StoreError::UndoExpired(id.to_string()));
            }
            inner.events.retain(|e| e.key != key);
            for pet_id in &event.pet_ids {
                if let Some(pet) = inner.pets.get_mut(pet_id) {
                    pet.feeding = None;
                }
            }
            event.household_id
        };
        self.notifier.notify(household_id);
        Ok(())
    }

    async fn list_feeding_events(
        &self,
        household_id: HouseholdId,
        limit: usize,
    ) -> Result<Vec<FeedingEvent>, StoreError> {
        self.enter(StoreOp::ListEvents).await?;
        let inner = self.inner.read().await;
        let mut events: Vec<FeedingEvent> = inner
            .events
            .iter()
            .filter(|e| e.household_id == household_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        events.truncate(limit);
        Ok(events)
    }

    async fn unread_notification_count(&self, member_id: MemberId) -> Result<u32, StoreError> {
        self.enter(StoreOp::UnreadCount).await?;
        let inner = self.inner.read().await;
        let unread = inner
            .notifications
            .iter()
            .filter(|n| n.recipient == member_id && !n.read)
            .count();
        Ok(u32::try_from(unread).unwrap_or(u32::MAX))
    }

    async fn mark_notifications_read(&self, member_id: MemberId) -> Result<u32, StoreError> {
        self.enter(StoreOp::MarkRead).await?;
        let mut inner = self.inner.write().await;
        let mut marked = 0_u32;
        for n in inner
            .notifications
            .iter_mut()
            .filter(|n| n.recipient == member_id && !n.read)
        {
            n.read = true;
            marked = marked.saturating_add(1);
        }
        Ok(marked)
    }

    async fn add_notification(&self, notification: &NewNotification) -> Result<(), StoreError> {
        self.enter(StoreOp::AddNotification).await?;
        let mut inner = self.inner.write().await;
        let recipients: Vec<MemberId> = inner
            .memberships
            .iter()
            .filter(|(h, m)| *h == notification.household_id && *m != notification.author)
            .map(|(_, m)| *m)
            .collect();
        inner
            .notifications
            .extend(recipients.into_iter().map(|recipient| StoredNotification {
                recipient,
                read: false,
            }));
        Ok(())
    }
}
