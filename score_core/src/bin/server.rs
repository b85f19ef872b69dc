use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{error, info, warn};

use score_core::admin;
use score_core::{
    load_board_config_from_env, start_store_server, MemoryStore, SharedStore, StoreServer,
};
use score_proto::PlayerMap;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (config, config_path) = load_board_config_from_env();
    let prefix = config.players_prefix().to_string();

    let Some(server) = start_store_server(config.store_bind(), MemoryStore::new()) else {
        error!(
            target: "panda_royale::server",
            store_bind = %config.store_bind(),
            "server.start_failed=store_bind"
        );
        return;
    };
    let Some(command_rx) = spawn_command_listener(config.command_bind()) else {
        error!(
            target: "panda_royale::server",
            command_bind = %config.command_bind(),
            "server.start_failed=command_bind"
        );
        return;
    };

    let _board_log = match server.store().subscribe_collection(
        &prefix,
        Arc::new(|players: PlayerMap| {
            let total: i64 = players
                .values()
                .map(|record| record.total)
                .fold(0, i64::saturating_add);
            info!(
                target: "panda_royale::server",
                players = players.len(),
                total,
                "board.changed"
            );
        }),
    ) {
        Ok(subscription) => Some(subscription),
        Err(err) => {
            warn!(target: "panda_royale::server", error = %err, "board.log_unavailable");
            None
        }
    };

    info!(
        store_bind = %server.local_addr(),
        command_bind = %config.command_bind(),
        config = ?config_path,
        "Panda Royale board server ready"
    );

    while let Ok(command) = command_rx.recv() {
        handle_command(&server, &prefix, command);
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    ResetAll,
    DeleteAll,
    Dump,
}

fn handle_command(server: &StoreServer, prefix: &str, command: Command) {
    let store = server.store();
    match command {
        Command::ResetAll => match admin::reset_all(store, prefix) {
            Ok(players) => info!(
                target: "panda_royale::server",
                players,
                "command.applied=reset_all"
            ),
            Err(err) => warn!(
                target: "panda_royale::server",
                error = %err,
                "command.failed=reset_all"
            ),
        },
        Command::DeleteAll => match admin::delete_players(store, prefix) {
            Ok(()) => info!(target: "panda_royale::server", "command.applied=delete_all"),
            Err(err) => warn!(
                target: "panda_royale::server",
                error = %err,
                "command.failed=delete_all"
            ),
        },
        Command::Dump => match store.read_collection(prefix) {
            Ok(players) => {
                for (player, record) in &players {
                    info!(
                        target: "panda_royale::server",
                        %player,
                        total = record.total,
                        "board.player"
                    );
                }
                info!(
                    target: "panda_royale::server",
                    players = players.len(),
                    "command.applied=dump"
                );
            }
            Err(err) => warn!(
                target: "panda_royale::server",
                error = %err,
                "command.failed=dump"
            ),
        },
    }
}

fn spawn_command_listener(bind_addr: SocketAddr) -> Option<Receiver<Command>> {
    let listener = match TcpListener::bind(bind_addr) {
        Ok(listener) => listener,
        Err(err) => {
            warn!("Command listener bind failed at {}: {}", bind_addr, err);
            return None;
        }
    };

    let (sender, receiver) = unbounded::<Command>();
    thread::spawn(move || loop {
        match listener.accept() {
            Ok((stream, addr)) => {
                info!("Command client connected: {}", addr);
                let sender = sender.clone();
                thread::spawn(move || read_admin_commands(stream, addr, sender));
            }
            Err(err) => {
                warn!("Error accepting command client: {}", err);
                thread::sleep(std::time::Duration::from_millis(200));
            }
        }
    });

    Some(receiver)
}

const COMMAND_HELP: &str = "expected reset_all, delete_all or dump";

/// Read newline-separated admin commands from one client and queue them for
/// the board loop. Every line gets a one-line acknowledgement.
fn read_admin_commands(stream: TcpStream, peer: SocketAddr, sender: Sender<Command>) {
    let mut reader = BufReader::new(&stream);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                warn!(target: "panda_royale::server", %peer, error = %err, "command.read_failed");
                break;
            }
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        let reply = match parse_command(input) {
            Some(command) => {
                if sender.send(command).is_err() {
                    break;
                }
                format!("queued {input}\n")
            }
            None => {
                warn!(target: "panda_royale::server", %peer, input, "command.rejected=unknown");
                format!("unknown command '{input}'; {COMMAND_HELP}\n")
            }
        };
        // Fire-and-forget clients hang up before reading the reply.
        if (&stream).write_all(reply.as_bytes()).is_err() {
            break;
        }
    }
}

fn parse_command(input: &str) -> Option<Command> {
    let mut parts = input.split_whitespace();
    let command = match parts.next()? {
        "reset_all" | "reset-all" => Command::ResetAll,
        "delete_all" | "delete-all" => Command::DeleteAll,
        "dump" => Command::Dump,
        _ => return None,
    };
    if parts.next().is_some() {
        return None;
    }
    Some(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_admin_commands() {
        assert_eq!(parse_command("reset_all"), Some(Command::ResetAll));
        assert_eq!(parse_command("delete-all"), Some(Command::DeleteAll));
        assert_eq!(parse_command("dump"), Some(Command::Dump));
        assert_eq!(parse_command("dump now"), None);
        assert_eq!(parse_command("turn 3"), None);
    }

    #[test]
    fn admin_commands_are_queued_and_acknowledged() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (sender, receiver) = unbounded();
        let server = thread::spawn(move || {
            let (stream, peer) = listener.accept().unwrap();
            read_admin_commands(stream, peer, sender);
        });

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"dump\n\nlaunch\n").unwrap();
        let mut replies = BufReader::new(client.try_clone().unwrap());
        let mut line = String::new();
        replies.read_line(&mut line).unwrap();
        assert_eq!(line, "queued dump\n");
        line.clear();
        replies.read_line(&mut line).unwrap();
        assert!(line.starts_with("unknown command 'launch'"));

        drop(replies);
        drop(client);
        server.join().unwrap();
        assert_eq!(receiver.try_iter().collect::<Vec<_>>(), vec![Command::Dump]);
    }
}
