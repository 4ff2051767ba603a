pub mod favorite;
pub mod set;
pub mod state;

pub use favorite::{FavoriteRecord, NewFavorite, PropertyId, RecordId, UserId};
pub use set::FavoriteSet;
pub use state::{FavoriteStatus, ListPhase, ToggleOutcome};
