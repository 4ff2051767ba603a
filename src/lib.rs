//! # Keepsake
//!
//! Favorites synchronization for a property-listing client.
//!
//! ## Architecture
//!
//! ```text
//! Controller → FavoriteStore → backend
//!      ↑                          │
//!      └──── RealtimeChannel ←────┘
//! ```
//!
//! Controllers write through the store and never patch their own state from
//! change events: any event triggers a full re-fetch, so the server stays
//! authoritative across tabs and devices.
//!
//! ## Quick Start
//!
//! ```bash
//! # Save or unsave a listing
//! keepsake --user alice toggle villa-42
//!
//! # Show saved listings
//! keepsake --user alice list
//!
//! # Follow the set live
//! keepsake --user alice watch
//! ```
//!
//! ## Modules
//!
//! - [`app`]: Application context and error types
//! - [`cli`]: Command-line interface definitions
//! - [`config`]: TOML configuration
//! - [`controller`]: Per-item and whole-list favorite controllers
//! - [`domain`]: Ids, records, and view state
//! - [`notify`]: User-facing notices
//! - [`realtime`]: Change notifications
//! - [`retry`]: Backoff for transient failures
//! - [`store`]: Persistence backends

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together all components:
/// store, realtime channel, notifier.
pub mod app;

/// Command-line interface using clap.
///
/// - `status <property>` - Is it a favorite
/// - `toggle <property>` - Add or remove it
/// - `list` - Saved favorites, newest first
/// - `remove <record-id>` - Delete one favorite
/// - `watch` - Print the set whenever it changes
pub mod cli;

/// Configuration loaded from `~/.config/keepsake/config.toml`.
pub mod config;

/// Favorite controllers.
///
/// - [`FavoriteToggle`](controller::FavoriteToggle): one property's status
/// - [`FavoriteList`](controller::FavoriteList): the user's whole set
pub mod controller;

/// Core domain models.
pub mod domain;

pub mod notify;

/// Change notifications for the favorites table.
///
/// - [`RealtimeHub`](realtime::RealtimeHub): in-process fan-out
/// - [`PollingChannel`](realtime::PollingChannel): snapshot diffing for backends without push
pub mod realtime;

pub mod retry;

/// Persistence layer.
///
/// - [`FavoriteStore`](store::FavoriteStore): Trait defining storage operations
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
/// - [`RestStore`](store::RestStore): Supabase PostgREST implementation
pub mod store;
