use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Authenticated user identity, derived from the session.
    UserId
);
string_id!(
    /// Property listing identity.
    PropertyId
);
string_id!(
    /// Server-assigned favorite row id.
    RecordId
);

/// A persisted favorite. `(user_id, property_id)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavoriteRecord {
    pub id: RecordId,
    pub user_id: UserId,
    pub property_id: PropertyId,
    pub created_at: Option<DateTime<Utc>>,
}

/// Insert payload; the backend assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewFavorite {
    pub user_id: UserId,
    pub property_id: PropertyId,
}

impl NewFavorite {
    pub fn new(user_id: UserId, property_id: PropertyId) -> Self {
        Self {
            user_id,
            property_id,
        }
    }
}
