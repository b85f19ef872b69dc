#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};

use score_core::{
    connect_board, start_store_server, BoardConfig, MemoryStore, PlayerId, RemoteStore,
    SharedStore, StoreServer, SyncController,
};

static INIT: Once = Once::new();

pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join("test_board_config.json");

        debug_assert!(
            config_path.exists(),
            "missing test board config at {}",
            config_path.display()
        );

        std::env::set_var("BOARD_CONFIG_PATH", &config_path);
    });
}

/// Board config loaded the same way the server loads it.
pub fn test_config() -> Arc<BoardConfig> {
    ensure_test_config();
    let (config, path) = score_core::load_board_config_from_env();
    assert!(path.is_some(), "test config fell back to builtin");
    config
}

/// Store server on an ephemeral local port.
pub fn spawn_server() -> StoreServer {
    let config = test_config();
    start_store_server(config.store_bind(), MemoryStore::new())
        .expect("store server should bind an ephemeral port")
}

pub fn remote(server: &StoreServer) -> Arc<dyn SharedStore> {
    Arc::new(RemoteStore::connect(server.local_addr()).expect("connect to store server"))
}

pub fn join(store: Arc<dyn SharedStore>, name: &str) -> SyncController {
    let config = test_config();
    let mut controller =
        connect_board(PlayerId::from(name), store, &config).expect("subscribe to board");
    controller.pump();
    controller
}

/// Pump until `done` holds or a few seconds pass.
pub fn pump_until(controller: &mut SyncController, done: impl Fn(&SyncController) -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if done(controller) {
            return true;
        }
        controller.pump_timeout(Duration::from_millis(50));
    }
    done(controller)
}
