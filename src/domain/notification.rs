//! In-app notifications fanned out to the other members of a household.

use serde::{Deserialize, Serialize};

use super::{HouseholdId, MemberId};

/// Kind of in-app notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Someone fed one or more pets.
    Feeding,
    /// A member joined the household.
    MemberJoined,
    /// A pet was added.
    PetAdded,
    /// A member left or was removed.
    MemberRemoved,
}

impl NotificationKind {
    /// Returns the kind as a static string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Feeding => "feeding",
            Self::MemberJoined => "member_joined",
            Self::PetAdded => "pet_added",
            Self::MemberRemoved => "member_removed",
        }
    }
}

/// Notification to deliver to every household member except its author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNotification {
    /// Household whose members are notified.
    pub household_id: HouseholdId,
    /// Member whose action caused it; never notified of their own action.
    pub author: MemberId,
    /// Kind of notification.
    pub kind: NotificationKind,
    /// Rendered message, e.g. `"Sam fed Fido, Rex"`.
    pub message: String,
}
