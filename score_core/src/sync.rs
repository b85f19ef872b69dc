//! Keeps one player's scorecard in step with the shared store.
//!
//! Store notifications arrive on whatever thread the store uses; they are
//! queued and only applied when the host loop calls [`SyncController::pump`].
//! Between a local edit and its commit, any number of remote snapshots may be
//! applied.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use score_proto::{player_key, record_fingerprint, PlayerMap, PlayerRecord};
use thiserror::Error;

use crate::admin::{self, AfterDelete};
use crate::config::{BoardConfig, EditConflictPolicy};
use crate::grid::{validate_cell, CellWrite, Grid};
use crate::identity::{PlayerId, Session};
use crate::leaderboard::{CellHighlight, Leaderboard};
use crate::metrics::SyncMetrics;
use crate::rules::{self, CellInput, Category};
use crate::store::{SharedStore, StoreError, Subscription};

/// Notification queued by a store subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    OwnRecord(Option<PlayerRecord>),
    Players(PlayerMap),
}

/// How the local scorecard relates to the last thing written to the store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncStatus {
    /// Nothing committed yet this session.
    #[default]
    Idle,
    /// Committed; waiting for the store to echo the same record back.
    Pending { fingerprint: u64 },
    Synced,
    /// The last commit failed; local values may not be on the board.
    Stale { message: String },
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("could not save your scorecard, the board may be out of date: {0}")]
    Commit(#[source] StoreError),
    #[error("could not subscribe to the shared board: {0}")]
    Subscribe(#[source] StoreError),
    #[error("admin operation failed: {0}")]
    Admin(#[source] StoreError),
}

/// Raw input for the one cell currently being edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditDraft {
    round: usize,
    category: Category,
    input: CellInput,
}

impl EditDraft {
    pub fn round(&self) -> usize {
        self.round
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn input(&self) -> &CellInput {
        &self.input
    }
}

pub struct SyncController {
    player: PlayerId,
    prefix: String,
    key: String,
    store: Arc<dyn SharedStore>,
    grid: Grid,
    leaderboard: Leaderboard,
    draft: Option<EditDraft>,
    status: SyncStatus,
    policy: EditConflictPolicy,
    metrics: SyncMetrics,
    sender: Sender<SyncEvent>,
    events: Receiver<SyncEvent>,
    own_subscription: Option<Subscription>,
    players_subscription: Option<Subscription>,
}

impl SyncController {
    pub fn new(player: PlayerId, store: Arc<dyn SharedStore>, config: &BoardConfig) -> Self {
        let prefix = config.players_prefix().to_string();
        let key = player_key(&prefix, player.as_str());
        let (sender, events) = unbounded();
        Self {
            player,
            prefix,
            key,
            store,
            grid: Grid::new(),
            leaderboard: Leaderboard::new(config.highlight_categories().to_vec()),
            draft: None,
            status: SyncStatus::Idle,
            policy: config.edit_conflict_policy(),
            metrics: SyncMetrics::default(),
            sender,
            events,
            own_subscription: None,
            players_subscription: None,
        }
    }

    /// Subscribe to both the own record and the player collection.
    pub fn start(&mut self) -> Result<(), SyncError> {
        self.subscribe_own()?;
        self.subscribe_all()
    }

    pub fn subscribe_own(&mut self) -> Result<(), SyncError> {
        let sender = self.sender.clone();
        let subscription = self
            .store
            .subscribe(
                &self.key,
                Arc::new(move |record: Option<PlayerRecord>| {
                    let _ = sender.send(SyncEvent::OwnRecord(record));
                }),
            )
            .map_err(SyncError::Subscribe)?;
        self.own_subscription = Some(subscription);
        Ok(())
    }

    pub fn subscribe_all(&mut self) -> Result<(), SyncError> {
        let sender = self.sender.clone();
        let subscription = self
            .store
            .subscribe_collection(
                &self.prefix,
                Arc::new(move |players: PlayerMap| {
                    let _ = sender.send(SyncEvent::Players(players));
                }),
            )
            .map_err(SyncError::Subscribe)?;
        self.players_subscription = Some(subscription);
        Ok(())
    }

    /// Drop both subscriptions. Already queued events stay queued.
    pub fn stop(&mut self) {
        self.own_subscription = None;
        self.players_subscription = None;
    }

    pub fn is_subscribed(&self) -> bool {
        self.own_subscription.is_some() || self.players_subscription.is_some()
    }

    /// Apply every queued notification. Returns how many were applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events.try_recv() {
            self.apply_event(event);
            applied += 1;
        }
        applied
    }

    /// Wait up to `timeout` for one notification, then drain the rest.
    pub fn pump_timeout(&mut self, timeout: Duration) -> usize {
        match self.events.recv_timeout(timeout) {
            Ok(event) => {
                self.apply_event(event);
                1 + self.pump()
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    fn apply_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::OwnRecord(Some(record)) => self.apply_own_record(record),
            SyncEvent::OwnRecord(None) => {
                tracing::debug!(
                    target: "panda_royale::sync",
                    player = %self.player,
                    "snapshot.own_absent=kept_local"
                );
            }
            SyncEvent::Players(players) => {
                self.leaderboard.rebuild(&players);
                self.metrics.collection_snapshots += 1;
                tracing::trace!(
                    target: "panda_royale::sync",
                    players = players.len(),
                    "snapshot.players_applied"
                );
            }
        }
    }

    fn apply_own_record(&mut self, record: PlayerRecord) {
        let fingerprint = record_fingerprint(&record);
        let incoming = Grid::from_record(&record);

        if let Some(draft) = &self.draft {
            let changed = incoming.cell(draft.round, draft.category)
                != self.grid.cell(draft.round, draft.category);
            if changed && self.policy == EditConflictPolicy::Discard {
                tracing::info!(
                    target: "panda_royale::sync",
                    player = %self.player,
                    round = draft.round,
                    category = %draft.category,
                    "edit.discarded=remote_change"
                );
                self.draft = None;
                self.metrics.drafts_discarded += 1;
            }
        }

        self.grid = incoming;
        self.metrics.own_snapshots += 1;
        match &self.status {
            SyncStatus::Pending { fingerprint: expected } if *expected == fingerprint => {
                self.status = SyncStatus::Synced;
            }
            SyncStatus::Idle => self.status = SyncStatus::Synced,
            _ => {}
        }
        tracing::debug!(
            target: "panda_royale::sync",
            player = %self.player,
            total = self.grid.grand_total(),
            status = ?self.status,
            "snapshot.own_applied"
        );
    }

    /// Write the whole scorecard and its grand total to the store.
    ///
    /// On failure the local grid is kept and the status turns stale; nothing
    /// is retried.
    pub fn commit(&mut self) -> Result<(), SyncError> {
        let record = self.grid.to_record();
        let fingerprint = record_fingerprint(&record);
        let total = record.total;
        match self.store.write(&self.key, record) {
            Ok(()) => {
                self.metrics.record_commit(true);
                // The echo may already be queued; it settles the status on
                // the next pump.
                self.status = SyncStatus::Pending { fingerprint };
                tracing::debug!(
                    target: "panda_royale::sync",
                    player = %self.player,
                    total,
                    "commit.accepted"
                );
                Ok(())
            }
            Err(err) => {
                self.metrics.record_commit(false);
                let error = SyncError::Commit(err);
                self.status = SyncStatus::Stale {
                    message: error.to_string(),
                };
                tracing::warn!(
                    target: "panda_royale::sync",
                    player = %self.player,
                    error = %error,
                    "commit.failed"
                );
                Err(error)
            }
        }
    }

    /// Score `input` into a cell and commit. Refused cells are not committed.
    pub fn set_cell(
        &mut self,
        round: usize,
        category: Category,
        input: &CellInput,
    ) -> Result<CellWrite, SyncError> {
        let value = rules::apply(category, input);
        let write = self.grid.set_cell(round, category, value);
        if !write.is_applied() {
            self.metrics.ignored_writes += 1;
            return Ok(write);
        }
        self.commit()?;
        Ok(write)
    }

    /// Clear this player's own scorecard and commit.
    pub fn reset_own(&mut self) -> Result<(), SyncError> {
        self.grid.reset();
        self.draft = None;
        self.commit()
    }

    /// Start editing a cell with blank input. Returns `false` for cells that
    /// cannot be edited; any previous draft is replaced.
    pub fn open_edit(&mut self, round: usize, category: Category) -> bool {
        if validate_cell(round, category).is_err() {
            self.metrics.ignored_writes += 1;
            return false;
        }
        self.draft = Some(EditDraft {
            round,
            category,
            input: CellInput::blank_for(category),
        });
        true
    }

    pub fn draft(&self) -> Option<&EditDraft> {
        self.draft.as_ref()
    }

    pub fn draft_input_mut(&mut self) -> Option<&mut CellInput> {
        self.draft.as_mut().map(|draft| &mut draft.input)
    }

    pub fn cancel_edit(&mut self) -> Option<EditDraft> {
        self.draft.take()
    }

    /// Score the open draft against the current grid and commit it.
    ///
    /// Returns `Ok(None)` when no draft is open, for instance because a remote
    /// snapshot discarded it.
    pub fn submit_edit(&mut self) -> Result<Option<CellWrite>, SyncError> {
        let Some(draft) = self.draft.take() else {
            return Ok(None);
        };
        self.set_cell(draft.round, draft.category, &draft.input).map(Some)
    }

    /// Reset every player on the board, this one included.
    pub fn reset_all(&mut self) -> Result<usize, SyncError> {
        let count =
            admin::reset_all(self.store.as_ref(), &self.prefix).map_err(SyncError::Admin)?;
        self.grid.reset();
        self.draft = None;
        Ok(count)
    }

    /// Delete every player and sign this session out.
    ///
    /// On failure the controller keeps its subscriptions and draft.
    pub fn delete_all(&mut self, session: &mut Session) -> Result<AfterDelete, SyncError> {
        let next = admin::delete_all(self.store.as_ref(), &self.prefix, session)
            .map_err(SyncError::Admin)?;
        self.stop();
        self.draft = None;
        Ok(next)
    }

    pub fn player(&self) -> &PlayerId {
        &self.player
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn grand_total(&self) -> i64 {
        self.grid.grand_total()
    }

    pub fn leaderboard(&self) -> &Leaderboard {
        &self.leaderboard
    }

    pub fn highlight(&self, round: usize, category: Category) -> CellHighlight {
        self.leaderboard.highlight(&self.grid, round, category)
    }

    pub fn status(&self) -> &SyncStatus {
        &self.status
    }

    pub fn metrics(&self) -> SyncMetrics {
        self.metrics
    }
}
