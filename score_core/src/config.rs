use std::{
    env, fs, io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    sync::Arc,
};

use score_proto::PLAYERS_PREFIX;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rules::Category;

pub const BUILTIN_BOARD_CONFIG: &str = include_str!("data/board_config.json");

/// What happens to an open edit when a remote snapshot changes the cell
/// being edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditConflictPolicy {
    /// Close the draft; the remote value wins.
    #[default]
    Discard,
    /// Keep the draft open; submitting it overwrites the remote value.
    Preserve,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    store_bind: SocketAddr,
    command_bind: SocketAddr,
    players_prefix: String,
    highlight_categories: Vec<Category>,
    edit_conflict_policy: EditConflictPolicy,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            store_bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 42000),
            command_bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 42001),
            players_prefix: PLAYERS_PREFIX.to_string(),
            highlight_categories: vec![Category::Yellow],
            edit_conflict_policy: EditConflictPolicy::Discard,
        }
    }
}

impl BoardConfig {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            serde_json::from_str(BUILTIN_BOARD_CONFIG).expect("builtin board config should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, BoardConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| BoardConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = BoardConfig::from_json_str(&contents)?;
        Ok(config)
    }

    pub fn store_bind(&self) -> SocketAddr {
        self.store_bind
    }

    pub fn command_bind(&self) -> SocketAddr {
        self.command_bind
    }

    pub fn players_prefix(&self) -> &str {
        &self.players_prefix
    }

    pub fn highlight_categories(&self) -> &[Category] {
        &self.highlight_categories
    }

    pub fn edit_conflict_policy(&self) -> EditConflictPolicy {
        self.edit_conflict_policy
    }

    pub fn with_store_bind(mut self, addr: SocketAddr) -> Self {
        self.store_bind = addr;
        self
    }

    pub fn with_players_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.players_prefix = prefix.into();
        self
    }

    pub fn with_highlight_categories(mut self, categories: Vec<Category>) -> Self {
        self.highlight_categories = categories;
        self
    }

    pub fn with_edit_conflict_policy(mut self, policy: EditConflictPolicy) -> Self {
        self.edit_conflict_policy = policy;
        self
    }
}

#[derive(Debug, Error)]
pub enum BoardConfigError {
    #[error("failed to parse board config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read board config from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Load the board configuration named by `BOARD_CONFIG_PATH`, or the bundled
/// default. Falls back to the builtin copy when the file is unusable.
pub fn load_board_config_from_env() -> (Arc<BoardConfig>, Option<PathBuf>) {
    let path = env::var("BOARD_CONFIG_PATH")
        .ok()
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src/data/board_config.json")
        });

    match BoardConfig::from_file(&path) {
        Ok(config) => {
            tracing::info!(
                target: "panda_royale::config",
                path = %path.display(),
                "board_config.loaded=file"
            );
            (Arc::new(config), Some(path))
        }
        Err(err) => {
            tracing::warn!(
                target: "panda_royale::config",
                path = %path.display(),
                error = %err,
                "board_config.load_failed"
            );
            tracing::info!(target: "panda_royale::config", "board_config.loaded=builtin");
            (BoardConfig::builtin(), None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_config_matches_defaults() {
        let builtin = BoardConfig::builtin();
        let defaults = BoardConfig::default();
        assert_eq!(builtin.store_bind(), defaults.store_bind());
        assert_eq!(builtin.command_bind(), defaults.command_bind());
        assert_eq!(builtin.players_prefix(), "players");
        assert_eq!(builtin.highlight_categories(), &[Category::Yellow]);
        assert_eq!(builtin.edit_conflict_policy(), EditConflictPolicy::Discard);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = BoardConfig::from_json_str(
            r#"{ "highlight_categories": ["Yellow", "Pink"], "edit_conflict_policy": "preserve" }"#,
        )
        .unwrap();
        assert_eq!(
            config.highlight_categories(),
            &[Category::Yellow, Category::Pink]
        );
        assert_eq!(config.edit_conflict_policy(), EditConflictPolicy::Preserve);
        assert_eq!(config.players_prefix(), PLAYERS_PREFIX);
    }

    #[test]
    fn missing_file_reports_read_error() {
        let err = BoardConfig::from_file(Path::new("/nonexistent/board.json")).unwrap_err();
        assert!(matches!(err, BoardConfigError::Read { .. }));
    }
}
