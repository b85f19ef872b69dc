use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};
use score_proto::{identifier_from_key, PlayerMap, PlayerRecord};

/// Invoked with the latest state of one key; `None` once the key is absent.
pub type RecordCallback = Arc<dyn Fn(Option<PlayerRecord>) + Send + Sync>;
/// Invoked with every direct child of a prefix, keyed by identifier.
pub type CollectionCallback = Arc<dyn Fn(PlayerMap) + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("shared store is unreachable")]
    Unavailable,
    #[error("connection to shared store lost")]
    Disconnected,
    #[error("shared store rejected the request: {0}")]
    Rejected(String),
    #[error("unexpected reply from shared store to {0}")]
    UnexpectedReply(&'static str),
    #[error("store i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("store frame codec failed: {0}")]
    Codec(#[from] bincode::Error),
}

/// Shared key-value store with subscription semantics.
///
/// Writes are full overwrites and the last writer wins. Subscribers receive
/// the current state once on subscribe and again after every change, including
/// changes made by the subscriber's own writes. Callbacks may run on any thread
/// and must not block on the store.
pub trait SharedStore: Send + Sync {
    fn write(&self, key: &str, record: PlayerRecord) -> Result<(), StoreError>;

    fn read_once(&self, key: &str) -> Result<Option<PlayerRecord>, StoreError>;

    fn read_collection(&self, prefix: &str) -> Result<PlayerMap, StoreError>;

    fn subscribe(&self, key: &str, callback: RecordCallback) -> Result<Subscription, StoreError>;

    fn subscribe_collection(
        &self,
        prefix: &str,
        callback: CollectionCallback,
    ) -> Result<Subscription, StoreError>;

    /// Overwrite every key in `records` as one atomic change.
    fn batch_write(&self, records: BTreeMap<String, PlayerRecord>) -> Result<(), StoreError>;

    /// Remove `prefix` and everything beneath it.
    fn delete_subtree(&self, prefix: &str) -> Result<(), StoreError>;
}

/// Live subscription; dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(id: u64, cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id,
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

fn in_subtree(prefix: &str, key: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    key == prefix
        || key
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn children_of(records: &BTreeMap<String, PlayerRecord>, prefix: &str) -> PlayerMap {
    records
        .iter()
        .filter_map(|(key, record)| {
            identifier_from_key(prefix, key).map(|id| (id.to_string(), record.clone()))
        })
        .collect()
}

struct KeySubscriber {
    id: u64,
    key: String,
    callback: RecordCallback,
}

struct CollectionSubscriber {
    id: u64,
    prefix: String,
    callback: CollectionCallback,
}

#[derive(Default)]
struct MemoryState {
    records: BTreeMap<String, PlayerRecord>,
    next_subscription: u64,
    key_subscribers: Vec<KeySubscriber>,
    collection_subscribers: Vec<CollectionSubscriber>,
}

enum Notification {
    Record(RecordCallback, Option<PlayerRecord>),
    Collection(CollectionCallback, PlayerMap),
}

impl Notification {
    fn deliver(self) {
        match self {
            Notification::Record(callback, record) => callback(record),
            Notification::Collection(callback, players) => callback(players),
        }
    }
}

impl MemoryState {
    fn allocate_subscription(&mut self) -> u64 {
        self.next_subscription += 1;
        self.next_subscription
    }

    /// Notifications owed to subscribers after `changed` keys were touched.
    fn notifications_for(&self, changed: &[String]) -> Vec<Notification> {
        let mut pending = Vec::new();
        for subscriber in &self.key_subscribers {
            if changed.iter().any(|key| key == &subscriber.key) {
                pending.push(Notification::Record(
                    Arc::clone(&subscriber.callback),
                    self.records.get(&subscriber.key).cloned(),
                ));
            }
        }
        for subscriber in &self.collection_subscribers {
            if changed
                .iter()
                .any(|key| identifier_from_key(&subscriber.prefix, key).is_some())
            {
                pending.push(Notification::Collection(
                    Arc::clone(&subscriber.callback),
                    children_of(&self.records, &subscriber.prefix),
                ));
            }
        }
        pending
    }
}

struct MemoryInner {
    state: Mutex<MemoryState>,
    // Held across a mutation and its deliveries so every subscriber sees
    // changes in commit order. Reentrant so callbacks may write.
    delivery: ReentrantMutex<()>,
    reachable: AtomicBool,
}

/// In-process [`SharedStore`].
///
/// Every write notifies, even when the stored value is unchanged, so a
/// writer always observes its own echo.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                state: Mutex::new(MemoryState::default()),
                delivery: ReentrantMutex::new(()),
                reachable: AtomicBool::new(true),
            }),
        }
    }

    /// Simulate losing (or regaining) the connection to the store.
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn is_reachable(&self) -> bool {
        self.inner.reachable.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_reachable(&self) -> Result<(), StoreError> {
        if self.is_reachable() {
            Ok(())
        } else {
            Err(StoreError::Unavailable)
        }
    }

    fn mutate<F>(&self, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut BTreeMap<String, PlayerRecord>) -> Vec<String>,
    {
        self.ensure_reachable()?;
        let _delivery = self.inner.delivery.lock();
        let notifications = {
            let mut state = self.inner.state.lock();
            let changed = apply(&mut state.records);
            state.notifications_for(&changed)
        };
        for notification in notifications {
            notification.deliver();
        }
        Ok(())
    }

    fn unsubscribe_weak(inner: &Weak<MemoryInner>, id: u64) {
        if let Some(inner) = inner.upgrade() {
            let mut state = inner.state.lock();
            state.key_subscribers.retain(|subscriber| subscriber.id != id);
            state
                .collection_subscribers
                .retain(|subscriber| subscriber.id != id);
        }
    }
}

impl SharedStore for MemoryStore {
    fn write(&self, key: &str, record: PlayerRecord) -> Result<(), StoreError> {
        self.mutate(|records| {
            records.insert(key.to_string(), record);
            vec![key.to_string()]
        })
    }

    fn read_once(&self, key: &str) -> Result<Option<PlayerRecord>, StoreError> {
        self.ensure_reachable()?;
        Ok(self.inner.state.lock().records.get(key).cloned())
    }

    fn read_collection(&self, prefix: &str) -> Result<PlayerMap, StoreError> {
        self.ensure_reachable()?;
        Ok(children_of(&self.inner.state.lock().records, prefix))
    }

    fn subscribe(&self, key: &str, callback: RecordCallback) -> Result<Subscription, StoreError> {
        self.ensure_reachable()?;
        let _delivery = self.inner.delivery.lock();
        let (id, current) = {
            let mut state = self.inner.state.lock();
            let id = state.allocate_subscription();
            state.key_subscribers.push(KeySubscriber {
                id,
                key: key.to_string(),
                callback: Arc::clone(&callback),
            });
            (id, state.records.get(key).cloned())
        };
        callback(current);
        let weak = Arc::downgrade(&self.inner);
        Ok(Subscription::new(id, move || {
            MemoryStore::unsubscribe_weak(&weak, id)
        }))
    }

    fn subscribe_collection(
        &self,
        prefix: &str,
        callback: CollectionCallback,
    ) -> Result<Subscription, StoreError> {
        self.ensure_reachable()?;
        let _delivery = self.inner.delivery.lock();
        let (id, current) = {
            let mut state = self.inner.state.lock();
            let id = state.allocate_subscription();
            state.collection_subscribers.push(CollectionSubscriber {
                id,
                prefix: prefix.to_string(),
                callback: Arc::clone(&callback),
            });
            (id, children_of(&state.records, prefix))
        };
        callback(current);
        let weak = Arc::downgrade(&self.inner);
        Ok(Subscription::new(id, move || {
            MemoryStore::unsubscribe_weak(&weak, id)
        }))
    }

    fn batch_write(&self, batch: BTreeMap<String, PlayerRecord>) -> Result<(), StoreError> {
        self.mutate(|records| {
            let changed: Vec<String> = batch.keys().cloned().collect();
            records.extend(batch);
            changed
        })
    }

    fn delete_subtree(&self, prefix: &str) -> Result<(), StoreError> {
        self.mutate(|records| {
            let removed: Vec<String> = records
                .keys()
                .filter(|key| in_subtree(prefix, key))
                .cloned()
                .collect();
            for key in &removed {
                records.remove(key);
            }
            removed
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{unbounded, Sender};
    use score_proto::{player_key, PLAYERS_PREFIX};

    fn record_sink(tx: Sender<Option<PlayerRecord>>) -> RecordCallback {
        Arc::new(move |record: Option<PlayerRecord>| {
            let _ = tx.send(record);
        })
    }

    fn collection_sink(tx: Sender<PlayerMap>) -> CollectionCallback {
        Arc::new(move |players: PlayerMap| {
            let _ = tx.send(players);
        })
    }

    fn record(total: i64) -> PlayerRecord {
        let mut record = PlayerRecord::empty();
        record.total = total;
        record
    }

    #[test]
    fn write_then_read_round_trips() {
        let store = MemoryStore::new();
        let key = player_key(PLAYERS_PREFIX, "Alice");
        let mut written = record(8);
        written.grid[2][2] = "8".into();
        written.grid[2][8] = "8".into();
        store.write(&key, written.clone()).unwrap();
        assert_eq!(store.read_once(&key).unwrap(), Some(written));
        assert_eq!(store.read_once("players/nobody").unwrap(), None);
    }

    #[test]
    fn key_subscribers_see_initial_state_and_own_echo() {
        let store = MemoryStore::new();
        let key = player_key(PLAYERS_PREFIX, "Alice");
        let (tx, rx) = unbounded();
        let _sub = store.subscribe(&key, record_sink(tx)).unwrap();
        assert_eq!(rx.try_recv().unwrap(), None);

        store.write(&key, record(3)).unwrap();
        store.write(&key, record(3)).unwrap();
        assert_eq!(rx.try_recv().unwrap(), Some(record(3)));
        assert_eq!(rx.try_recv().unwrap(), Some(record(3)));

        store.write("players/Bo", record(1)).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn collection_subscribers_get_full_child_map() {
        let store = MemoryStore::new();
        let (tx, rx) = unbounded();
        let _sub = store.subscribe_collection(PLAYERS_PREFIX, collection_sink(tx)).unwrap();
        assert!(rx.try_recv().unwrap().is_empty());

        store.write("players/b", record(2)).unwrap();
        store.write("players/a", record(1)).unwrap();
        rx.try_recv().unwrap();
        let latest = rx.try_recv().unwrap();
        assert_eq!(
            latest.keys().cloned().collect::<Vec<_>>(),
            vec!["a".to_string(), "b".to_string()]
        );

        store.write("elsewhere/x", record(9)).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn batch_write_notifies_once() {
        let store = MemoryStore::new();
        let (tx, rx) = unbounded();
        let _sub = store.subscribe_collection(PLAYERS_PREFIX, collection_sink(tx)).unwrap();
        rx.try_recv().unwrap();

        let batch: BTreeMap<String, PlayerRecord> = ["a", "b", "c"]
            .iter()
            .map(|id| (player_key(PLAYERS_PREFIX, id), record(0)))
            .collect();
        store.batch_write(batch).unwrap();
        assert_eq!(rx.try_recv().unwrap().len(), 3);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn delete_subtree_removes_children_and_notifies_absent() {
        let store = MemoryStore::new();
        store.write("players/a", record(1)).unwrap();
        store.write("players/b", record(2)).unwrap();
        store.write("playersx/c", record(3)).unwrap();

        let (tx, rx) = unbounded();
        let _sub = store.subscribe("players/a", record_sink(tx)).unwrap();
        rx.try_recv().unwrap();

        store.delete_subtree(PLAYERS_PREFIX).unwrap();
        assert_eq!(rx.try_recv().unwrap(), None);
        assert!(store.read_collection(PLAYERS_PREFIX).unwrap().is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn dropping_a_subscription_stops_delivery() {
        let store = MemoryStore::new();
        let (tx, rx) = unbounded();
        let sub = store.subscribe("players/a", record_sink(tx)).unwrap();
        rx.try_recv().unwrap();
        sub.unsubscribe();
        store.write("players/a", record(1)).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unreachable_store_fails_every_operation() {
        let store = MemoryStore::new();
        store.set_reachable(false);
        assert!(matches!(
            store.write("players/a", record(1)),
            Err(StoreError::Unavailable)
        ));
        assert!(matches!(
            store.read_once("players/a"),
            Err(StoreError::Unavailable)
        ));
        store.set_reachable(true);
        assert!(store.write("players/a", record(1)).is_ok());
    }
}
