use score_proto::PlayerMap;

use crate::grid::Grid;
use crate::identity::PlayerId;
use crate::rules::Category;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub player: PlayerId,
    pub grand_total: i64,
}

/// Rank players by their published total, highest first.
///
/// The sort is stable: tied players keep the map's iteration order, which is
/// ascending by identifier.
pub fn build(players: &PlayerMap) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = players
        .iter()
        .map(|(identifier, record)| LeaderboardEntry {
            player: PlayerId::from(identifier.as_str()),
            grand_total: record.total,
        })
        .collect();
    entries.sort_by(|a, b| b.grand_total.cmp(&a.grand_total));
    entries
}

/// Highlight state of one cell relative to every player's matching cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CellHighlight {
    #[default]
    Plain,
    Leading,
    Tied,
}

/// Full re-scan of `grids` for the best value at `(round, category)`.
///
/// `own` is compared against the maximum; a positive value equal to it leads,
/// or ties when more than one player holds that maximum.
pub fn highlight_cell<'a>(
    grids: impl IntoIterator<Item = &'a Grid>,
    own: &Grid,
    round: usize,
    category: Category,
) -> CellHighlight {
    let values: Vec<i64> = grids
        .into_iter()
        .map(|grid| grid.value(round, category))
        .collect();
    let Some(max) = values.iter().copied().max() else {
        return CellHighlight::Plain;
    };
    let mine = own.value(round, category);
    if mine <= 0 || mine != max {
        return CellHighlight::Plain;
    }
    if values.iter().filter(|value| **value == max).count() > 1 {
        CellHighlight::Tied
    } else {
        CellHighlight::Leading
    }
}

/// Ranked view of every known player, rebuilt in full from each snapshot.
#[derive(Clone, Debug)]
pub struct Leaderboard {
    entries: Vec<LeaderboardEntry>,
    grids: Vec<(PlayerId, Grid)>,
    highlight_categories: Vec<Category>,
}

impl Default for Leaderboard {
    fn default() -> Self {
        Self::new(vec![Category::Yellow])
    }
}

impl Leaderboard {
    pub fn new(highlight_categories: Vec<Category>) -> Self {
        Self {
            entries: Vec::new(),
            grids: Vec::new(),
            highlight_categories,
        }
    }

    pub fn rebuild(&mut self, players: &PlayerMap) {
        self.entries = build(players);
        self.grids = players
            .iter()
            .map(|(identifier, record)| {
                (PlayerId::from(identifier.as_str()), Grid::from_record(record))
            })
            .collect();
    }

    pub fn entries(&self) -> &[LeaderboardEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Zero-based position of `player`.
    pub fn position(&self, player: &PlayerId) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| &entry.player == player)
    }

    pub fn grid_of(&self, player: &PlayerId) -> Option<&Grid> {
        self.grids
            .iter()
            .find(|(id, _)| id == player)
            .map(|(_, grid)| grid)
    }

    pub fn highlight_categories(&self) -> &[Category] {
        &self.highlight_categories
    }

    /// Highlight for the viewer's own cell; categories outside the configured
    /// set are always plain.
    pub fn highlight(&self, own: &Grid, round: usize, category: Category) -> CellHighlight {
        if !self.highlight_categories.contains(&category) {
            return CellHighlight::Plain;
        }
        highlight_cell(self.grids.iter().map(|(_, grid)| grid), own, round, category)
    }
}
