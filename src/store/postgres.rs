//! PostgreSQL implementation of the store of record and its change feed.
//!
//! [`PgStore`] maps every [`RemoteStore`] call to one statement (undo runs
//! in a single transaction). [`PgNotifier`] listens on the channel fed by
//! the `notify_household_change` trigger created in `migrations/`.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::{PgListener, PgPoolOptions};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::models::{
    EVENT_COLUMNS, FeedingEventRow, PET_COLUMNS, PetRow, event_from_row, pet_from_row,
};
use super::{ChangeNotice, ChangeNotifier, RemoteStore, Subscription};
use crate::config::AppConfig;
use crate::domain::{
    EventId, FeedingEvent, FeedingState, Household, HouseholdId, Member, MemberId,
    NewFeedingEvent, NewNotification, Pet, PetId,
};
use crate::error::StoreError;

/// Notices buffered per subscription before extras are dropped.
const NOTICE_BUFFER: usize = 16;

/// PostgreSQL-backed [`RemoteStore`] using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Creates a store on an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool from configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the database cannot be reached.
    pub async fn connect(config: &AppConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Applies pending migrations from `migrations/`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Returns the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RemoteStore for PgStore {
    async fn get_household(&self, id: HouseholdId) -> Result<Household, StoreError> {
        let row = sqlx::query_as::<_, (Uuid, String, bool)>(
            "SELECT id, name, is_pro FROM households WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        let (id, name, is_pro) = row.ok_or_else(|| StoreError::NotFound {
            entity: "household",
            id: id.to_string(),
        })?;
        Ok(Household {
            id: HouseholdId::from(id),
            name,
            is_pro,
        })
    }

    async fn get_member(&self, id: MemberId) -> Result<Member, StoreError> {
        let row = sqlx::query_as::<_, (Uuid, String)>("SELECT id, name FROM members WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        let (id, name) = row.ok_or_else(|| StoreError::NotFound {
            entity: "member",
            id: id.to_string(),
        })?;
        Ok(Member {
            id: MemberId::from(id),
            name,
        })
    }

    async fn list_members(&self, household_id: HouseholdId) -> Result<Vec<Member>, StoreError> {
        let rows = sqlx::query_as::<_, (Uuid, String)>(
            "SELECT m.id, m.name FROM members m \
             JOIN household_members hm ON hm.member_id = m.id \
             WHERE hm.household_id = $1 ORDER BY hm.joined_at",
        )
        .bind(household_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name)| Member {
                id: MemberId::from(id),
                name,
            })
            .collect())
    }

    async fn list_pets(&self, household_id: HouseholdId) -> Result<Vec<Pet>, StoreError> {
        let sql = format!(
            "SELECT {PET_COLUMNS} FROM pets WHERE household_id = $1 ORDER BY name, id"
        );
        let rows = sqlx::query_as::<_, PetRow>(&sql)
            .bind(household_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(pet_from_row).collect()
    }

    async fn update_pet_feeding_state(
        &self,
        pet_id: PetId,
        feeding: Option<FeedingState>,
    ) -> Result<Pet, StoreError> {
        let sql = format!(
            "UPDATE pets SET last_fed_at = $2, last_fed_by = $3, undo_deadline = $4, \
             updated_at = now() WHERE id = $1 RETURNING {PET_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PetRow>(&sql)
            .bind(pet_id.as_uuid())
            .bind(feeding.map(|f| f.fed_at))
            .bind(feeding.map(|f| Uuid::from(f.fed_by)))
            .bind(feeding.map(|f| f.undo_deadline))
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity: "pet",
                id: pet_id.to_string(),
            })?;
        pet_from_row(row)
    }

    async fn create_feeding_event(
        &self,
        event: &NewFeedingEvent,
    ) -> Result<FeedingEvent, StoreError> {
        let pet_ids: Vec<Uuid> = event.pet_ids.iter().map(|id| Uuid::from(*id)).collect();
        let sql = format!(
            "INSERT INTO feeding_events \
             (id, household_id, fed_by, fed_by_name, pet_ids, pet_names, created_at, undo_deadline) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {EVENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, FeedingEventRow>(&sql)
            .bind(EventId::new().as_uuid())
            .bind(event.household_id.as_uuid())
            .bind(event.fed_by.as_uuid())
            .bind(&event.fed_by_name)
            .bind(&pet_ids)
            .bind(&event.pet_names)
            .bind(event.created_at)
            .bind(event.undo_deadline)
            .fetch_one(&self.pool)
            .await?;
        event_from_row(row)
    }

    async fn delete_feeding_event(&self, id: EventId) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, (Vec<Uuid>, bool)>(
            "SELECT pet_ids, undo_deadline > now() FROM feeding_events WHERE id = $1 FOR UPDATE",
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;

        let Some((pet_ids, open)) = row else {
            return Err(StoreError::NotFound {
                entity: "feeding event",
                id: id.to_string(),
            });
        };
        if !open {
            return Err(StoreError::UndoExpired(id.to_string()));
        }

        sqlx::query(
            "UPDATE pets SET last_fed_at = NULL, last_fed_by = NULL, undo_deadline = NULL, \
             updated_at = now() WHERE id = ANY($1)",
        )
        .bind(&pet_ids)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM feeding_events WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_feeding_events(
        &self,
        household_id: HouseholdId,
        limit: usize,
    ) -> Result<Vec<FeedingEvent>, StoreError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM feeding_events WHERE household_id = $1 \
             ORDER BY created_at DESC LIMIT $2"
        );
        let rows = sqlx::query_as::<_, FeedingEventRow>(&sql)
            .bind(household_id.as_uuid())
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(event_from_row).collect()
    }

    async fn unread_notification_count(&self, member_id: MemberId) -> Result<u32, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND NOT read",
        )
        .bind(member_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn mark_notifications_read(&self, member_id: MemberId) -> Result<u32, StoreError> {
        let result = sqlx::query(
            "UPDATE notifications SET read = TRUE WHERE recipient_id = $1 AND NOT read",
        )
        .bind(member_id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(u32::try_from(result.rows_affected()).unwrap_or(u32::MAX))
    }

    async fn add_notification(&self, notification: &NewNotification) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO notifications (household_id, recipient_id, author_id, kind, message) \
             SELECT $1, hm.member_id, $2, $3, $4 FROM household_members hm \
             WHERE hm.household_id = $1 AND hm.member_id <> $2",
        )
        .bind(notification.household_id.as_uuid())
        .bind(notification.author.as_uuid())
        .bind(notification.kind.as_str())
        .bind(&notification.message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Realtime change feed over PostgreSQL `LISTEN/NOTIFY`.
///
/// Each subscription owns a dedicated [`PgListener`]; `sqlx` reconnects it
/// transparently, so a dropped connection only means fewer notices until
/// it is back.
#[derive(Debug, Clone)]
pub struct PgNotifier {
    pool: PgPool,
    channel: String,
}

impl PgNotifier {
    /// Creates a notifier listening on `channel`.
    #[must_use]
    pub fn new(pool: PgPool, channel: impl Into<String>) -> Self {
        Self {
            pool,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl ChangeNotifier for PgNotifier {
    async fn subscribe(&self, household_id: HouseholdId) -> Result<Subscription, StoreError> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(&self.channel).await?;

        let (tx, rx) = mpsc::channel(NOTICE_BUFFER);
        let channel = self.channel.clone();

        let forwarder = tokio::spawn(async move {
            loop {
                match listener.recv().await {
                    Ok(notification) => {
                        if household_from_payload(notification.payload()) != Some(household_id) {
                            continue;
                        }
                        // Full buffer: a reload is already queued.
                        if let Err(mpsc::error::TrySendError::Closed(_)) =
                            tx.try_send(ChangeNotice::now(household_id))
                        {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(%channel, error = %err, "realtime listener error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        tracing::info!(%household_id, channel = %self.channel, "realtime subscription opened");
        Ok(Subscription::new(household_id, rx, Some(forwarder)))
    }
}

/// Parses a notification payload into a household id.
#[must_use]
pub fn household_from_payload(payload: &str) -> Option<HouseholdId> {
    payload.trim().parse::<Uuid>().ok().map(HouseholdId::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_parses_household_id() {
        let id = HouseholdId::new();
        assert_eq!(household_from_payload(&format!(" {id}\n")), Some(id));
        assert_eq!(
            household_from_payload(&id.to_string().to_uppercase()),
            Some(id)
        );
        assert_eq!(household_from_payload("not-a-household"), None);
    }
}
