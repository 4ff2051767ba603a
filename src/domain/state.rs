use serde::{Deserialize, Serialize};

use crate::domain::RecordId;

/// Favorite membership of a single property for the current user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteStatus {
    pub is_favorite: bool,
    pub record_id: Option<RecordId>,
}

impl FavoriteStatus {
    pub fn favorited(record_id: Option<RecordId>) -> Self {
        Self {
            is_favorite: true,
            record_id,
        }
    }

    pub fn not_favorited() -> Self {
        Self::default()
    }
}

/// Lifecycle phase of a favorites list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListPhase {
    Unauthenticated,
    Loading,
    Ready,
}

/// Result of a toggle request that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// A new favorite row was created.
    Added(RecordId),
    /// The row was already present (another tab or device won the race).
    AlreadyFavorite(Option<RecordId>),
    Removed,
    /// A toggle for the same property was still in flight.
    Ignored,
}

impl ToggleOutcome {
    pub fn is_favorite(&self) -> Option<bool> {
        match self {
            ToggleOutcome::Added(_) | ToggleOutcome::AlreadyFavorite(_) => Some(true),
            ToggleOutcome::Removed => Some(false),
            ToggleOutcome::Ignored => None,
        }
    }
}
