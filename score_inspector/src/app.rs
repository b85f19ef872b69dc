use std::sync::mpsc::{Receiver, Sender};
use std::time::Instant;

use color_eyre::Result;
use crossterm::event::{self, Event, KeyCode};
use ratatui::backend::CrosstermBackend;
use ratatui::prelude::*;
use score_proto::PlayerMap;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{error, info, warn};

use crate::ui::{draw_ui, UiState};

pub struct InspectorApp {
    terminal: Terminal<CrosstermBackend<std::io::Stdout>>,
    ui_state: UiState,
    receiver: UnboundedReceiver<PlayerMap>,
    command_sender: Sender<ClientCommand>,
    log_receiver: Receiver<String>,
}

impl InspectorApp {
    pub fn new(
        receiver: UnboundedReceiver<PlayerMap>,
        command_sender: Sender<ClientCommand>,
        log_receiver: Receiver<String>,
    ) -> Result<Self> {
        let stdout = std::io::stdout();
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        crossterm::terminal::enable_raw_mode()?;
        terminal.clear()?;
        terminal.hide_cursor()?;
        Ok(Self {
            terminal,
            ui_state: UiState::default(),
            receiver,
            command_sender,
            log_receiver,
        })
    }

    pub fn run(mut self) -> Result<()> {
        let mut last_draw = Instant::now();

        loop {
            while let Ok(players) = self.receiver.try_recv() {
                self.ui_state.apply_players(players);
            }

            while let Ok(line) = self.log_receiver.try_recv() {
                self.ui_state.push_log(line);
            }

            if last_draw.elapsed() >= std::time::Duration::from_millis(100) {
                self.terminal.draw(|frame| draw_ui(frame, &self.ui_state))?;
                last_draw = Instant::now();
            }

            if event::poll(std::time::Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => break,
                        KeyCode::Char('r') => self.send(ClientCommand::ResetAll),
                        KeyCode::Char('D') => {
                            if self.ui_state.arm_delete() {
                                warn!("Press D again to delete every player");
                            } else {
                                self.send(ClientCommand::DeleteAll);
                            }
                        }
                        KeyCode::Char('d') => self.send(ClientCommand::Dump),
                        KeyCode::Up | KeyCode::Char('k') => self.ui_state.select_previous(),
                        KeyCode::Down | KeyCode::Char('j') => self.ui_state.select_next(),
                        _ => self.ui_state.disarm_delete(),
                    }
                }
            }
        }

        self.terminal.show_cursor()?;
        crossterm::terminal::disable_raw_mode()?;
        info!("Inspector requested shutdown");
        Ok(())
    }

    fn send(&mut self, command: ClientCommand) {
        self.ui_state.disarm_delete();
        match self.command_sender.send(command.clone()) {
            Ok(_) => info!(?command, "Requested board command"),
            Err(err) => error!("Failed to queue {:?}: {}", command, err),
        }
    }
}

pub fn channel() -> (UnboundedSender<PlayerMap>, UnboundedReceiver<PlayerMap>) {
    unbounded_channel()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    ResetAll,
    DeleteAll,
    Dump,
}
