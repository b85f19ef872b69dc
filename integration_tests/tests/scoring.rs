mod common;

use std::sync::Arc;

use score_core::{CellInput, Category, MemoryStore, SharedStore, SyncStatus};

#[test]
fn purple_four_publishes_eight() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    let mut alice = common::join(Arc::new(store.clone()), "Alice");

    alice.set_cell(3, Category::Purple, &CellInput::value("4"))?;
    assert!(common::pump_until(&mut alice, |c| c.status() == &SyncStatus::Synced));

    assert_eq!(alice.grid().value(3, Category::Purple), 8);
    assert_eq!(alice.grid().row_total(3), 8);
    assert_eq!(alice.grand_total(), 8);

    let stored = store
        .read_once("players/Alice")?
        .expect("Alice's record is published");
    let json: serde_json::Value = serde_json::to_value(&stored)?;
    assert_eq!(json["total"], 8);
    assert_eq!(json["grid"][2][0], "");
    assert_eq!(json["grid"][2][2], "8");
    assert_eq!(json["grid"][2][8], "8");
    assert_eq!(json["grid"][0][8], "");

    let entries = alice.leaderboard().entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].player.as_str(), "Alice");
    assert_eq!(entries[0].grand_total, 8);
    Ok(())
}

#[test]
fn scorecard_survives_reconnect() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    {
        let mut bo = common::join(Arc::new(store.clone()), "Bo");
        bo.set_cell(1, Category::Blue, &CellInput::blue("6", true))?;
        bo.set_cell(2, Category::Red, &CellInput::red("2", "9"))?;
        bo.set_cell(2, Category::Total, &CellInput::value("100"))?;
        bo.pump();
        assert_eq!(bo.grand_total(), 30);
    }

    let bo = common::join(Arc::new(store), "Bo");
    assert_eq!(bo.grid().value(1, Category::Blue), 12);
    assert_eq!(bo.grid().value(2, Category::Red), 18);
    assert_eq!(bo.grand_total(), 30);
    Ok(())
}

#[test]
fn unreachable_store_marks_scores_stale() {
    let store = MemoryStore::new();
    let mut cy = common::join(Arc::new(store.clone()), "Cy");
    store.set_reachable(false);

    let err = cy
        .set_cell(1, Category::Green, &CellInput::value("3"))
        .unwrap_err();
    assert!(err.to_string().contains("out of date"));
    assert!(matches!(cy.status(), SyncStatus::Stale { .. }));
    assert_eq!(cy.grand_total(), 3);
}
