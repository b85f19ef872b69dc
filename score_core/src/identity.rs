use std::fmt;

use score_proto::player_key;

use crate::store::{SharedStore, StoreError};

/// Identifier a player chose at session start; doubles as their store key.
///
/// The core treats it as opaque. Two sessions holding the same identifier
/// share one record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(String);

impl PlayerId {
    /// Trimmed, non-empty identifier.
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(IdentityError::Empty);
        }
        if trimmed.contains('/') {
            return Err(IdentityError::Reserved(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for PlayerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for PlayerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("please enter a username")]
    Empty,
    #[error("username '{0}' may not contain '/'")]
    Reserved(String),
    #[error("username '{0}' is already taken")]
    Taken(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Session-scoped identity handed to the scoring core by the identity layer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Session {
    player: Option<PlayerId>,
}

impl Session {
    pub fn new(player: PlayerId) -> Self {
        Self {
            player: Some(player),
        }
    }

    pub fn player(&self) -> Option<&PlayerId> {
        self.player.as_ref()
    }

    pub fn is_signed_in(&self) -> bool {
        self.player.is_some()
    }

    pub fn clear(&mut self) -> Option<PlayerId> {
        self.player.take()
    }
}

/// Login check: accept `raw` only if it is a usable name with no record yet.
///
/// Check-then-use; a concurrent session can still claim the same name between
/// this read and its first write.
pub fn claim_identifier(
    store: &dyn SharedStore,
    prefix: &str,
    raw: &str,
) -> Result<Session, IdentityError> {
    let player = PlayerId::parse(raw)?;
    if store.read_once(&player_key(prefix, player.as_str()))?.is_some() {
        tracing::info!(
            target: "panda_royale::identity",
            player = %player,
            "identity.rejected=taken"
        );
        return Err(IdentityError::Taken(player.0));
    }
    tracing::info!(target: "panda_royale::identity", player = %player, "identity.claimed");
    Ok(Session::new(player))
}
