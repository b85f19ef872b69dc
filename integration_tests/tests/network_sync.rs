mod common;

use score_core::{
    claim_identifier, AfterDelete, CellInput, Category, IdentityError, PlayerId, Session,
    SharedStore, SyncStatus,
};

#[test]
fn remote_commit_echoes_back_as_synced() -> anyhow::Result<()> {
    let server = common::spawn_server();
    let mut alice = common::join(common::remote(&server), "Alice");

    alice.set_cell(3, Category::Purple, &CellInput::value("4"))?;
    assert!(common::pump_until(&mut alice, |c| c.status() == &SyncStatus::Synced));
    assert!(common::pump_until(&mut alice, |c| {
        c.leaderboard().entries().first().map(|e| e.grand_total) == Some(8)
    }));

    let stored = server
        .store()
        .read_once("players/Alice")?
        .expect("record stored on the server");
    assert_eq!(stored.total, 8);
    Ok(())
}

#[test]
fn two_clients_see_each_other() -> anyhow::Result<()> {
    let server = common::spawn_server();
    let mut alice = common::join(common::remote(&server), "Alice");
    let mut bo = common::join(common::remote(&server), "Bo");

    alice.set_cell(1, Category::Yellow, &CellInput::value("12"))?;
    bo.set_cell(1, Category::Yellow, &CellInput::value("20"))?;

    for controller in [&mut alice, &mut bo] {
        assert!(common::pump_until(controller, |c| {
            c.leaderboard().len() == 2 && c.leaderboard().entries()[0].grand_total == 20
        }));
        assert_eq!(c_names(controller), vec!["Bo", "Alice"]);
    }
    Ok(())
}

fn c_names(controller: &score_core::SyncController) -> Vec<String> {
    controller
        .leaderboard()
        .entries()
        .iter()
        .map(|entry| entry.player.to_string())
        .collect()
}

#[test]
fn taken_names_are_rejected_over_the_wire() -> anyhow::Result<()> {
    let server = common::spawn_server();
    let store = common::remote(&server);
    let mut alice = common::join(store.clone(), "Alice");
    alice.set_cell(1, Category::Clear, &CellInput::value("1"))?;

    let err = claim_identifier(store.as_ref(), "players", "Alice").unwrap_err();
    assert!(matches!(err, IdentityError::Taken(_)));
    let session = claim_identifier(store.as_ref(), "players", "Bo")?;
    assert_eq!(session.player(), Some(&PlayerId::from("Bo")));
    Ok(())
}

#[test]
fn reset_all_clears_every_client() -> anyhow::Result<()> {
    let server = common::spawn_server();
    let mut players: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|name| common::join(common::remote(&server), name))
        .collect();
    for (index, player) in players.iter_mut().enumerate() {
        player.set_cell(2, Category::Pink, &CellInput::value((index + 1).to_string()))?;
    }

    assert_eq!(players[0].reset_all()?, 3);
    assert_eq!(players[0].grand_total(), 0);
    for player in players.iter_mut() {
        assert!(common::pump_until(player, |c| {
            c.grand_total() == 0
                && c.leaderboard().len() == 3
                && c.leaderboard().entries().iter().all(|e| e.grand_total == 0)
        }));
    }
    Ok(())
}

#[test]
fn delete_all_returns_everyone_to_identity_selection() -> anyhow::Result<()> {
    let server = common::spawn_server();
    let mut alice = common::join(common::remote(&server), "Alice");
    let mut bo = common::join(common::remote(&server), "Bo");
    alice.set_cell(1, Category::Yellow, &CellInput::value("5"))?;
    bo.set_cell(1, Category::Yellow, &CellInput::value("6"))?;

    let mut session = Session::new(PlayerId::from("Alice"));
    assert_eq!(
        alice.delete_all(&mut session)?,
        AfterDelete::ReturnToIdentitySelection
    );
    assert!(!session.is_signed_in());
    assert!(server.store().is_empty());

    assert!(common::pump_until(&mut bo, |c| c.leaderboard().is_empty()));
    assert_eq!(bo.grand_total(), 6);
    Ok(())
}
