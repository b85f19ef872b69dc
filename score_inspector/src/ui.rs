use std::collections::VecDeque;

use ratatui::layout::{Constraint, Direction, Layout, Margin};
use ratatui::prelude::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use score_core::{CellHighlight, Category, Grid, Leaderboard, LeaderboardEntry};
use score_proto::{PlayerMap, ROUNDS};

pub struct UiState {
    pub leaderboard: Leaderboard,
    pub snapshots: u64,
    pub selected: usize,
    pub delete_armed: bool,
    pub logs: VecDeque<String>,
    pub max_logs: usize,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            leaderboard: Leaderboard::default(),
            snapshots: 0,
            selected: 0,
            delete_armed: false,
            logs: VecDeque::new(),
            max_logs: 8,
        }
    }
}

impl UiState {
    pub fn apply_players(&mut self, players: PlayerMap) {
        self.leaderboard.rebuild(&players);
        self.snapshots += 1;
        if self.selected >= self.leaderboard.len() {
            self.selected = self.leaderboard.len().saturating_sub(1);
        }
    }

    pub fn push_log<S: Into<String>>(&mut self, line: S) {
        let mut text: String = line.into();
        while text.ends_with('\n') || text.ends_with('\r') {
            text.pop();
        }
        if text.is_empty() {
            return;
        }
        self.logs.push_front(text);
        while self.logs.len() > self.max_logs {
            self.logs.pop_back();
        }
    }

    pub fn select_next(&mut self) {
        if self.selected + 1 < self.leaderboard.len() {
            self.selected += 1;
        }
    }

    pub fn select_previous(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn selected_entry(&self) -> Option<&LeaderboardEntry> {
        self.leaderboard.entries().get(self.selected)
    }

    /// Returns `true` when this press only armed the delete; a second press
    /// while armed should go through.
    pub fn arm_delete(&mut self) -> bool {
        if self.delete_armed {
            self.delete_armed = false;
            false
        } else {
            self.delete_armed = true;
            true
        }
    }

    pub fn disarm_delete(&mut self) {
        self.delete_armed = false;
    }
}

pub fn draw_ui(frame: &mut Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(6),
            Constraint::Min(8),
            Constraint::Length(10),
        ])
        .split(frame.size());
    let board = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(chunks[2]);

    draw_header(frame, chunks[0], state);
    draw_commands(frame, chunks[1]);
    draw_leaderboard(frame, board[0], state);
    draw_scorecard(frame, board[1], state);
    draw_logs(frame, chunks[3], state);
}

fn render_in_block(frame: &mut Frame, area: Rect, title: &str, paragraph: Paragraph) {
    let block = Block::default().borders(Borders::ALL).title(title.to_string());
    frame.render_widget(block, area);
    frame.render_widget(
        paragraph,
        area.inner(&Margin {
            vertical: 1,
            horizontal: 1,
        }),
    );
}

fn draw_header(frame: &mut Frame, area: Rect, state: &UiState) {
    let mut spans = vec![
        Span::styled("Watching", Style::default().fg(Color::Green)),
        Span::raw(format!(
            " | {} players | {} snapshots | q to exit",
            state.leaderboard.len(),
            state.snapshots
        )),
    ];
    if state.delete_armed {
        spans.push(Span::styled(
            " | press D again to delete all",
            Style::default().fg(Color::Red),
        ));
    }
    let text = Paragraph::new(Line::from(spans)).wrap(Wrap { trim: true });
    render_in_block(frame, area, "Panda Royale Board Inspector", text);
}

fn draw_commands(frame: &mut Frame, area: Rect) {
    let key = Style::default().fg(Color::Yellow);
    let lines = vec![
        Line::from(vec![
            Span::styled("j/k", key),
            Span::raw("    select player"),
        ]),
        Line::from(vec![
            Span::styled("r", key),
            Span::raw("      reset every scorecard"),
        ]),
        Line::from(vec![
            Span::styled("D D", key),
            Span::raw("    delete every player"),
        ]),
        Line::from(vec![
            Span::styled("d", key),
            Span::raw("      dump board to server log"),
        ]),
    ];
    render_in_block(
        frame,
        area,
        "Commands",
        Paragraph::new(lines).wrap(Wrap { trim: false }),
    );
}

fn draw_leaderboard(frame: &mut Frame, area: Rect, state: &UiState) {
    let lines: Vec<Line> = state
        .leaderboard
        .entries()
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let style = if index == state.selected {
                Style::default().add_modifier(Modifier::REVERSED)
            } else {
                Style::default()
            };
            Line::from(vec![
                Span::styled(format!("{:>3}. ", index + 1), style),
                Span::styled(format!("{:<16}", entry.player), style),
                Span::styled(
                    format!("{:>6}", entry.grand_total),
                    style.fg(Color::Cyan),
                ),
            ])
        })
        .collect();
    render_in_block(
        frame,
        area,
        "Leaderboard",
        Paragraph::new(lines).wrap(Wrap { trim: false }),
    );
}

fn cell_style(highlight: CellHighlight) -> Style {
    match highlight {
        CellHighlight::Plain => Style::default(),
        CellHighlight::Leading => Style::default().fg(Color::Black).bg(Color::Yellow),
        CellHighlight::Tied => Style::default().fg(Color::Yellow),
    }
}

fn scorecard_lines(board: &Leaderboard, grid: &Grid) -> Vec<Line<'static>> {
    let mut header = vec![Span::raw(format!("{:>5}", "Round"))];
    header.extend(
        Category::EDITABLE
            .iter()
            .map(|category| Span::raw(format!("{:>7}", category.name()))),
    );
    header.push(Span::raw(format!("{:>7}", "Total")));

    let mut lines = vec![Line::from(header)];
    for round in 1..=ROUNDS {
        let mut spans = vec![Span::raw(format!("{round:>5}"))];
        for category in Category::EDITABLE {
            let text = grid
                .cell(round, category)
                .map(|value| value.to_string())
                .unwrap_or_default();
            spans.push(Span::styled(
                format!("{text:>7}"),
                cell_style(board.highlight(grid, round, category)),
            ));
        }
        spans.push(Span::styled(
            format!("{:>7}", grid.row_total(round)),
            Style::default().fg(Color::Cyan),
        ));
        lines.push(Line::from(spans));
    }
    lines
}

fn draw_scorecard(frame: &mut Frame, area: Rect, state: &UiState) {
    let (title, lines) = match state
        .selected_entry()
        .and_then(|entry| Some((entry, state.leaderboard.grid_of(&entry.player)?)))
    {
        Some((entry, grid)) => (
            format!("Scorecard: {} ({})", entry.player, grid.grand_total()),
            scorecard_lines(&state.leaderboard, grid),
        ),
        None => (
            "Scorecard".to_string(),
            vec![Line::from("No players on the board")],
        ),
    };
    render_in_block(frame, area, &title, Paragraph::new(lines));
}

fn draw_logs(frame: &mut Frame, area: Rect, state: &UiState) {
    let lines: Vec<Line> = state
        .logs
        .iter()
        .map(|entry| Line::from(Span::raw(entry)))
        .collect();
    render_in_block(
        frame,
        area,
        "Logs",
        Paragraph::new(lines).wrap(Wrap { trim: false }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn players(totals: &[(&str, i64)]) -> PlayerMap {
        totals
            .iter()
            .map(|(name, total)| {
                let mut grid = Grid::new();
                grid.set_cell(1, Category::Yellow, *total);
                (name.to_string(), grid.to_record())
            })
            .collect()
    }

    #[test]
    fn selection_stays_within_leaderboard() {
        let mut state = UiState::default();
        state.apply_players(players(&[("a", 3), ("b", 9), ("c", 5)]));
        state.select_next();
        state.select_next();
        state.select_next();
        assert_eq!(state.selected, 2);
        assert_eq!(state.selected_entry().map(|e| e.grand_total), Some(3));

        state.apply_players(players(&[("a", 3)]));
        assert_eq!(state.selected, 0);
        state.select_previous();
        assert_eq!(state.selected, 0);
    }

    #[test]
    fn delete_needs_two_presses() {
        let mut state = UiState::default();
        assert!(state.arm_delete());
        assert!(!state.arm_delete());
        assert!(state.arm_delete());
        state.disarm_delete();
        assert!(state.arm_delete());
    }

    #[test]
    fn log_lines_are_trimmed_and_capped() {
        let mut state = UiState::default();
        for index in 0..12 {
            state.push_log(format!("line {index}\n"));
        }
        state.push_log("\n");
        assert_eq!(state.logs.len(), state.max_logs);
        assert_eq!(state.logs.front().map(String::as_str), Some("line 11"));
    }
}
