//! Wire and storage contracts for the Panda Royale scoreboard.
//!
//! Everything that crosses the shared store boundary lives here: the persisted
//! player record, the key layout, and the request/reply/event frames spoken
//! by the reference TCP store.

use ahash::RandomState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::{BuildHasher, Hasher};

/// Number of rounds on every scorecard.
pub const ROUNDS: usize = 10;
/// Columns per persisted row: round label, seven categories, row total.
pub const WIRE_COLUMNS: usize = 9;
/// Column holding the derived row total.
pub const TOTAL_COLUMN: usize = 8;
/// Default key prefix under which player records live.
pub const PLAYERS_PREFIX: &str = "players";

/// Persisted shape of one player's scorecard.
///
/// `grid` is always `ROUNDS` rows of `WIRE_COLUMNS` strings when produced by the
/// scoreboard; readers must still tolerate ragged data written by other clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    #[serde(default = "empty_wire_grid")]
    pub grid: Vec<Vec<String>>,
    #[serde(default)]
    pub total: i64,
}

impl PlayerRecord {
    pub fn new(grid: Vec<Vec<String>>, total: i64) -> Self {
        Self { grid, total }
    }

    /// Record with every cell blank and a zero total.
    pub fn empty() -> Self {
        Self {
            grid: empty_wire_grid(),
            total: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0 && self.grid.iter().flatten().all(|cell| cell.is_empty())
    }
}

impl Default for PlayerRecord {
    fn default() -> Self {
        Self::empty()
    }
}

pub fn empty_wire_grid() -> Vec<Vec<String>> {
    vec![vec![String::new(); WIRE_COLUMNS]; ROUNDS]
}

/// Full view of the player collection, keyed by identifier.
///
/// Ordered by identifier so every consumer iterates players identically.
pub type PlayerMap = BTreeMap<String, PlayerRecord>;

/// Store key for a player's record under `prefix`.
pub fn player_key(prefix: &str, identifier: &str) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), identifier)
}

/// Identifier portion of `key` when it is a direct child of `prefix`.
pub fn identifier_from_key<'a>(prefix: &str, key: &'a str) -> Option<&'a str> {
    let prefix = prefix.trim_end_matches('/');
    let rest = key.strip_prefix(prefix)?.strip_prefix('/')?;
    if rest.is_empty() || rest.contains('/') {
        None
    } else {
        Some(rest)
    }
}

/// Stable content hash of a record, used to recognise the echo of our own writes.
pub fn record_fingerprint(record: &PlayerRecord) -> u64 {
    let encoded = bincode::serialize(record).unwrap_or_default();
    let mut hasher = RandomState::with_seeds(0, 0, 0, 0).build_hasher();
    hasher.write(&encoded);
    hasher.finish()
}

pub fn encode_record_json(record: &PlayerRecord) -> serde_json::Result<String> {
    serde_json::to_string(record)
}

pub fn decode_record_json(data: &str) -> serde_json::Result<PlayerRecord> {
    serde_json::from_str(data)
}

pub fn encode_players_json(players: &PlayerMap) -> serde_json::Result<String> {
    serde_json::to_string(players)
}

pub fn decode_players_json(data: &str) -> serde_json::Result<PlayerMap> {
    serde_json::from_str(data)
}

/// Operations a client may ask of the shared store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreRequest {
    Write { key: String, record: PlayerRecord },
    ReadOnce { key: String },
    ReadCollection { prefix: String },
    Subscribe { key: String },
    SubscribeCollection { prefix: String },
    Unsubscribe { subscription: u64 },
    BatchWrite { records: BTreeMap<String, PlayerRecord> },
    DeleteSubtree { prefix: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientFrame {
    pub request_id: u64,
    pub request: StoreRequest,
}

/// Outcome of a single [`StoreRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreReply {
    Done,
    Record(Option<PlayerRecord>),
    Collection(PlayerMap),
    Subscribed(u64),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerFrame {
    Reply {
        request_id: u64,
        reply: StoreReply,
    },
    RecordChanged {
        subscription: u64,
        key: String,
        record: Option<PlayerRecord>,
    },
    CollectionChanged {
        subscription: u64,
        prefix: String,
        players: PlayerMap,
    },
}

pub fn encode_client_frame(frame: &ClientFrame) -> bincode::Result<Vec<u8>> {
    bincode::serialize(frame)
}

pub fn decode_client_frame(data: &[u8]) -> bincode::Result<ClientFrame> {
    bincode::deserialize(data)
}

pub fn encode_server_frame(frame: &ServerFrame) -> bincode::Result<Vec<u8>> {
    bincode::serialize(frame)
}

pub fn decode_server_frame(data: &[u8]) -> bincode::Result<ServerFrame> {
    bincode::deserialize(data)
}
