//! Households, members and pets with their feeding state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{HouseholdId, MemberId, PetId};

/// Number of feeding records a Free household can see.
pub const FREE_VISIBLE_HISTORY: usize = 1;

/// A household sharing responsibility for its pets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Household {
    /// Household identifier.
    pub id: HouseholdId,
    /// Display name.
    pub name: String,
    /// Whether the household has a Pro subscription.
    pub is_pro: bool,
}

impl Household {
    /// Returns how many history entries this household may see, given the
    /// configured maximum.
    #[must_use]
    pub fn visible_history(&self, max: usize) -> usize {
        if self.is_pro {
            max
        } else {
            FREE_VISIBLE_HISTORY.min(max)
        }
    }
}

/// A household member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Member identifier.
    pub id: MemberId,
    /// Display name.
    pub name: String,
}

/// The three feeding fields of a pet, which are set and cleared together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedingState {
    /// When the pet was last fed.
    pub fed_at: DateTime<Utc>,
    /// Who fed it.
    pub fed_by: MemberId,
    /// Until when the feeding may be undone.
    pub undo_deadline: DateTime<Utc>,
}

impl FeedingState {
    /// Builds a feeding state from three nullable columns.
    ///
    /// Returns `Ok(None)` when all three are null and `Ok(Some(_))` when all
    /// three are set.
    ///
    /// # Errors
    ///
    /// Returns the name of the first null column when the row is only
    /// partially populated.
    pub fn from_columns(
        fed_at: Option<DateTime<Utc>>,
        fed_by: Option<MemberId>,
        undo_deadline: Option<DateTime<Utc>>,
    ) -> Result<Option<Self>, &'static str> {
        match (fed_at, fed_by, undo_deadline) {
            (None, None, None) => Ok(None),
            (Some(fed_at), Some(fed_by), Some(undo_deadline)) => Ok(Some(Self {
                fed_at,
                fed_by,
                undo_deadline,
            })),
            (None, _, _) => Err("last_fed_at"),
            (_, None, _) => Err("last_fed_by"),
            (_, _, None) => Err("undo_deadline"),
        }
    }
}

/// A pet and its current feeding state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pet {
    /// Pet identifier.
    pub id: PetId,
    /// Display name.
    pub name: String,
    /// Owning household.
    pub household_id: HouseholdId,
    /// `None` when never fed or when the last feeding was undone.
    pub feeding: Option<FeedingState>,
}

impl Pet {
    /// Creates a pet that has never been fed.
    #[must_use]
    pub fn new(name: impl Into<String>, household_id: HouseholdId) -> Self {
        Self {
            id: PetId::new(),
            name: name.into(),
            household_id,
            feeding: None,
        }
    }

    /// Returns when the pet was last fed, if ever.
    #[must_use]
    pub fn last_fed_at(&self) -> Option<DateTime<Utc>> {
        self.feeding.map(|f| f.fed_at)
    }
}
