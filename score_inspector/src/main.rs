use std::io::Write;
use std::net::SocketAddr;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use score_core::{
    admin, claim_identifier, connect_board, BoardConfig, CellInput, Category, Leaderboard, PlayerId,
    RemoteStore, Session, SharedStore, SyncStatus,
};
use score_proto::{
    decode_server_frame, encode_client_frame, ClientFrame, PlayerMap, ServerFrame, StoreRequest,
    PLAYERS_PREFIX,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, trace, warn};

mod app;
mod ui;

use app::{channel, ClientCommand, InspectorApp};

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Routes formatted log output into the inspector's log panel, one entry per
/// line.
#[derive(Clone)]
struct LogPanelWriter {
    lines: Sender<String>,
}

impl std::io::Write for LogPanelWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        for line in text.lines().map(str::trim_end).filter(|line| !line.is_empty()) {
            let _ = self.lines.send(line.to_string());
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Panda Royale board inspector", long_about = None)]
struct Cli {
    /// Address of the board server's shared store.
    #[arg(long, default_value = "127.0.0.1:42000")]
    endpoint: SocketAddr,
    /// Store prefix holding the player records.
    #[arg(long, default_value = PLAYERS_PREFIX)]
    prefix: String,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Live leaderboard (default).
    Watch {
        /// Address of the board server's line-command listener.
        #[arg(long, default_value = "127.0.0.1:42001")]
        command_endpoint: String,
    },
    /// Check that a username is free on the board.
    Join { name: String },
    /// Score one cell for a player and publish it.
    Set {
        player: String,
        round: usize,
        category: Category,
        /// Plain value; the Blue total; or the Red dice count.
        value: String,
        /// Blue only: the sparkly bonus doubles the total.
        #[arg(long)]
        sparkly: bool,
        /// Red only: sum of the dice.
        #[arg(long)]
        dice_sum: Option<String>,
    },
    /// Print the ranked board once.
    Show {
        /// Emit the raw player records as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Clear every player's scorecard.
    ResetAll,
    /// Remove every player from the board.
    DeleteAll,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    match cli.command {
        None => watch(cli.endpoint, cli.prefix, "127.0.0.1:42001".to_string()).await,
        Some(Command::Watch { command_endpoint }) => {
            watch(cli.endpoint, cli.prefix, command_endpoint).await
        }
        Some(command) => {
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_writer(std::io::stderr)
                .init();
            let endpoint = cli.endpoint;
            let prefix = cli.prefix;
            tokio::task::spawn_blocking(move || run_store_command(endpoint, &prefix, command))
                .await?
        }
    }
}

async fn watch(endpoint: SocketAddr, prefix: String, command_endpoint: String) -> Result<()> {
    let (log_tx, log_rx) = mpsc::channel::<String>();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .with_ansi(false)
        .with_writer(move || LogPanelWriter {
            lines: log_tx.clone(),
        })
        .init();

    info!("Connecting to board at {}", endpoint);

    let (sender, receiver) = channel();
    let (command_tx, command_rx) = mpsc::channel::<ClientCommand>();

    let _command_handle =
        std::thread::spawn(move || run_command_pump(command_endpoint, command_rx));

    // The UI owns the snapshot receiver; it is dropped when the UI exits for
    // any reason, which is the shutdown signal for this loop.
    let ui_handle = std::thread::spawn(move || -> color_eyre::Result<()> {
        let app = InspectorApp::new(receiver, command_tx, log_rx)?;
        app.run()
    });

    while !sender.is_closed() {
        match TcpStream::connect(endpoint).await {
            Ok(mut stream) => {
                info!("Connected. Watching '{}'. Press q to exit.", prefix);
                match pump_players(&mut stream, &prefix, &sender).await {
                    Ok(()) => break,
                    Err(err) => {
                        warn!("Connection error: {}", err);
                        info!("Reconnecting in {} seconds...", RECONNECT_DELAY.as_secs());
                    }
                }
            }
            Err(err) => warn!("Failed to connect: {}", err),
        }
        tokio::select! {
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            _ = sender.closed() => {}
        }
    }

    match ui_handle.join() {
        Ok(result) => result,
        Err(_) => Err(eyre!("inspector UI thread panicked")),
    }
}

async fn read_payload(stream: &mut TcpStream) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > score_core::network::MAX_FRAME_LEN {
        return Err(eyre!("frame of {len} bytes exceeds limit"));
    }
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Stream collection snapshots into the UI.
///
/// Returns `Ok(())` once the UI has gone away, even while the board is idle;
/// connection failures come back as errors so the caller can reconnect.
async fn pump_players(
    stream: &mut TcpStream,
    prefix: &str,
    sender: &UnboundedSender<PlayerMap>,
) -> Result<()> {
    let subscribe = encode_client_frame(&ClientFrame {
        request_id: 1,
        request: StoreRequest::SubscribeCollection {
            prefix: prefix.to_string(),
        },
    })?;
    let len = u32::try_from(subscribe.len())?;
    stream.write_all(&len.to_le_bytes()).await?;
    stream.write_all(&subscribe).await?;

    loop {
        let payload = tokio::select! {
            payload = read_payload(stream) => payload?,
            _ = sender.closed() => return Ok(()),
        };
        match decode_server_frame(&payload)? {
            ServerFrame::CollectionChanged { players, .. } => {
                trace!(players = players.len(), "snapshot.players");
                if sender.send(players).is_err() {
                    return Ok(());
                }
            }
            ServerFrame::Reply { request_id, reply } => {
                trace!(request_id, ?reply, "store.reply");
            }
            ServerFrame::RecordChanged { .. } => {}
        }
    }
}

fn run_command_pump(endpoint: String, receiver: Receiver<ClientCommand>) {
    for cmd in receiver {
        match send_command(&endpoint, &cmd) {
            Ok(_) => info!(?cmd, "command.sent"),
            Err(err) => warn!(?cmd, "Failed to send command: {}", err),
        }
    }
}

fn send_command(endpoint: &str, command: &ClientCommand) -> std::io::Result<()> {
    let mut stream = std::net::TcpStream::connect(endpoint)?;
    let line = match command {
        ClientCommand::ResetAll => "reset_all\n",
        ClientCommand::DeleteAll => "delete_all\n",
        ClientCommand::Dump => "dump\n",
    };
    stream.write_all(line.as_bytes())?;
    Ok(())
}

fn run_store_command(endpoint: SocketAddr, prefix: &str, command: Command) -> Result<()> {
    let store = RemoteStore::connect(endpoint)
        .wrap_err_with(|| format!("failed to connect to board at {endpoint}"))?;

    match command {
        Command::Join { name } => {
            let session = claim_identifier(&store, prefix, &name)?;
            if let Some(player) = session.player() {
                let usage = format!("set {player} <round> <category> <value>");
                println!("'{player}' is free; start scoring with `{usage}`");
            }
        }
        Command::Set {
            player,
            round,
            category,
            value,
            sparkly,
            dice_sum,
        } => {
            let player = PlayerId::parse(&player)?;
            let input = match category {
                Category::Blue => CellInput::blue(value, sparkly),
                Category::Red => CellInput::red(value, dice_sum.unwrap_or_default()),
                _ => CellInput::value(value),
            };
            let config = BoardConfig::default().with_players_prefix(prefix);
            let shared: Arc<dyn SharedStore> = Arc::new(store.clone());
            let mut controller = connect_board(player, shared, &config)?;
            controller.pump();

            let write = controller.set_cell(round, category, &input)?;
            if !write.is_applied() {
                return Err(eyre!("{category} in round {round} cannot be edited"));
            }
            controller.pump_timeout(Duration::from_secs(2));
            let status = match controller.status() {
                SyncStatus::Synced => "synced",
                SyncStatus::Pending { .. } => "pending",
                SyncStatus::Stale { .. } => "stale",
                SyncStatus::Idle => "idle",
            };
            println!(
                "{} {} round {}: {:?} (grand total {}, {status})",
                controller.player(),
                category,
                round,
                write,
                controller.grand_total()
            );
        }
        Command::Show { json } => {
            let players = store.read_collection(prefix)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&players)?);
            } else {
                let mut board = Leaderboard::default();
                board.rebuild(&players);
                for (rank, entry) in board.entries().iter().enumerate() {
                    println!("{:>3}. {:<16} {:>6}", rank + 1, entry.player, entry.grand_total);
                }
            }
        }
        Command::ResetAll => {
            let count = admin::reset_all(&store, prefix)?;
            println!("reset {count} players");
        }
        Command::DeleteAll => {
            let mut session = Session::default();
            admin::delete_all(&store, prefix, &mut session)?;
            println!("deleted all players");
        }
        Command::Watch { .. } => return Err(eyre!("watch is not a one-shot store command")),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn log_panel_writer_splits_lines() {
        let (lines, received) = mpsc::channel();
        let mut writer = LogPanelWriter { lines };
        writer.write_all(b"first  \n\nsecond\r\n").unwrap();
        assert_eq!(received.try_iter().collect::<Vec<_>>(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn idle_board_stops_pumping_when_ui_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accepts and then stays silent, like a board nobody is scoring on.
        let board = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let (sender, receiver) = channel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(receiver);
        });

        let finished = tokio::time::timeout(
            Duration::from_secs(5),
            pump_players(&mut stream, PLAYERS_PREFIX, &sender),
        )
        .await;
        assert!(matches!(finished, Ok(Ok(()))));
        board.abort();
    }
}
