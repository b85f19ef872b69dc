//! Board-wide operations. Any participant may run them; there is no
//! authorization check at this layer.

use std::collections::BTreeMap;

use score_proto::{player_key, PlayerRecord};

use crate::identity::Session;
use crate::store::{SharedStore, StoreError};

/// Where the caller should go after [`delete_all`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AfterDelete {
    ReturnToIdentitySelection,
}

/// Overwrite every existing player record with an empty one in a single
/// batch. Returns the number of records reset.
pub fn reset_all(store: &dyn SharedStore, prefix: &str) -> Result<usize, StoreError> {
    let players = store.read_collection(prefix)?;
    if players.is_empty() {
        tracing::info!(target: "panda_royale::admin", "admin.reset_all=nothing_to_reset");
        return Ok(0);
    }
    let batch: BTreeMap<String, PlayerRecord> = players
        .keys()
        .map(|identifier| (player_key(prefix, identifier), PlayerRecord::empty()))
        .collect();
    let count = batch.len();
    store.batch_write(batch)?;
    tracing::warn!(target: "panda_royale::admin", players = count, "admin.reset_all");
    Ok(count)
}

/// Remove the whole player collection.
pub fn delete_players(store: &dyn SharedStore, prefix: &str) -> Result<(), StoreError> {
    store.delete_subtree(prefix)?;
    tracing::warn!(target: "panda_royale::admin", prefix, "admin.delete_all");
    Ok(())
}

/// Remove every player and sign `session` out. The session is left untouched
/// when the delete fails.
pub fn delete_all(
    store: &dyn SharedStore,
    prefix: &str,
    session: &mut Session,
) -> Result<AfterDelete, StoreError> {
    delete_players(store, prefix)?;
    if let Some(player) = session.clear() {
        tracing::info!(target: "panda_royale::admin", player = %player, "session.cleared");
    }
    Ok(AfterDelete::ReturnToIdentitySelection)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crossbeam_channel::unbounded;
    use score_proto::{PlayerMap, PLAYERS_PREFIX};

    use super::*;
    use crate::identity::PlayerId;
    use crate::store::MemoryStore;

    fn scored(total: i64) -> PlayerRecord {
        let mut record = PlayerRecord::empty();
        record.grid[0][1] = total.to_string();
        record.grid[0][8] = total.to_string();
        record.total = total;
        record
    }

    #[test]
    fn reset_all_empties_every_record_in_one_change() {
        let store = MemoryStore::new();
        for (name, total) in [("a", 12), ("b", 30), ("c", 7)] {
            store
                .write(&player_key(PLAYERS_PREFIX, name), scored(total))
                .unwrap();
        }
        let (tx, rx) = unbounded();
        let _sub = store
            .subscribe_collection(
                PLAYERS_PREFIX,
                Arc::new(move |players: PlayerMap| {
                    let _ = tx.send(players);
                }),
            )
            .unwrap();
        rx.try_recv().unwrap();

        assert_eq!(reset_all(&store, PLAYERS_PREFIX).unwrap(), 3);
        let after = rx.try_recv().unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(after.len(), 3);
        assert!(after.values().all(|record| *record == PlayerRecord::empty()));
    }

    #[test]
    fn reset_all_on_empty_board_writes_nothing() {
        let store = MemoryStore::new();
        assert_eq!(reset_all(&store, PLAYERS_PREFIX).unwrap(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn failed_delete_keeps_session() {
        let store = MemoryStore::new();
        store
            .write(&player_key(PLAYERS_PREFIX, "a"), scored(1))
            .unwrap();
        let mut session = Session::new(PlayerId::from("a"));

        store.set_reachable(false);
        assert!(delete_all(&store, PLAYERS_PREFIX, &mut session).is_err());
        assert!(session.is_signed_in());

        store.set_reachable(true);
        assert_eq!(
            delete_all(&store, PLAYERS_PREFIX, &mut session).unwrap(),
            AfterDelete::ReturnToIdentitySelection
        );
        assert!(!session.is_signed_in());
        assert!(store.read_collection(PLAYERS_PREFIX).unwrap().is_empty());
    }
}
