//! Type-safe identifiers for households, members, pets and feeding events.
//!
//! Every identifier is a newtype around [`uuid::Uuid`] so that a pet id
//! can never be passed where a member id is expected. Feeding events carry
//! an [`EventKey`], which distinguishes an optimistic event that has not
//! reached the store of record yet from a durable one.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Creates a new random identifier (UUID v4).
            #[must_use]
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// Wraps an existing [`uuid::Uuid`].
            #[must_use]
            pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner [`uuid::Uuid`].
            #[must_use]
            pub const fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for uuid::Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id!(
    /// Identifier of a household, the unit of sharing and realtime scope.
    HouseholdId
);
uuid_id!(
    /// Identifier of a household member.
    MemberId
);
uuid_id!(
    /// Identifier of a pet.
    PetId
);
uuid_id!(
    /// Durable identifier of a feeding event issued by the store of record.
    EventId
);
uuid_id!(
    /// Locally generated identifier of a feeding event that is still syncing.
    TempEventId
);

/// Prefix used when a pending key crosses the HTTP boundary.
const PENDING_PREFIX: &str = "temp-";

/// Identity of a feeding event as seen by the local view.
///
/// An event created optimistically starts as [`EventKey::Pending`] and is
/// moved to [`EventKey::Committed`] once the store returns its durable id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "id", rename_all = "snake_case")]
pub enum EventKey {
    /// Optimistic event; the remote write has not completed.
    Pending(TempEventId),
    /// Event acknowledged by the store of record.
    Committed(EventId),
}

impl EventKey {
    /// Returns `true` if the event has not been reconciled yet.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// Returns the durable id, if the event is committed.
    #[must_use]
    pub const fn committed(&self) -> Option<EventId> {
        match self {
            Self::Committed(id) => Some(*id),
            Self::Pending(_) => None,
        }
    }
}

impl From<EventId> for EventKey {
    fn from(id: EventId) -> Self {
        Self::Committed(id)
    }
}

impl From<TempEventId> for EventKey {
    fn from(id: TempEventId) -> Self {
        Self::Pending(id)
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending(id) => write!(f, "{PENDING_PREFIX}{id}"),
            Self::Committed(id) => write!(f, "{id}"),
        }
    }
}

impl FromStr for EventKey {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix(PENDING_PREFIX) {
            Some(rest) => Ok(Self::Pending(TempEventId::from_uuid(rest.parse()?))),
            None => Ok(Self::Committed(EventId::from_uuid(s.parse()?))),
        }
    }
}
