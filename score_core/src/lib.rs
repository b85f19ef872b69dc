//! Scoring core for the Panda Royale shared scoreboard.
//!
//! Each participant owns one [`Grid`] and mirrors it into a shared key-value
//! store; a [`SyncController`] applies remote snapshots and publishes local
//! edits, and a [`Leaderboard`] is rebuilt from every collection snapshot.

pub mod admin;
pub mod config;
mod grid;
mod identity;
mod leaderboard;
pub mod metrics;
pub mod network;
pub mod remote;
mod rules;
mod store;
mod sync;

use std::sync::Arc;

pub use admin::AfterDelete;
pub use config::{load_board_config_from_env, BoardConfig, BoardConfigError, EditConflictPolicy};
pub use grid::{validate_cell, CellWrite, Grid, IgnoredWrite, Row, EDITABLE_CATEGORIES};
pub use identity::{claim_identifier, IdentityError, PlayerId, Session};
pub use leaderboard::{highlight_cell, CellHighlight, Leaderboard, LeaderboardEntry};
pub use metrics::SyncMetrics;
pub use network::{start_store_server, StoreServer};
pub use remote::RemoteStore;
pub use rules::{apply, numeric_value, CellInput, Category, UnknownCategory};
pub use store::{
    CollectionCallback, MemoryStore, RecordCallback, SharedStore, StoreError, Subscription,
};
pub use sync::{EditDraft, SyncController, SyncError, SyncEvent, SyncStatus};

/// Build a controller for `player` and subscribe it to the board.
///
/// Initial snapshots are queued; call [`SyncController::pump`] to apply them.
pub fn connect_board(
    player: PlayerId,
    store: Arc<dyn SharedStore>,
    config: &BoardConfig,
) -> Result<SyncController, SyncError> {
    let mut controller = SyncController::new(player, store, config);
    controller.start()?;
    Ok(controller)
}
