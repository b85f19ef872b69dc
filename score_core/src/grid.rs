use score_proto::{PlayerRecord, ROUNDS, TOTAL_COLUMN, WIRE_COLUMNS};

use crate::rules::{numeric_value, Category};

/// Editable cells per round.
pub const EDITABLE_CATEGORIES: usize = 7;

/// One round of a scorecard: seven editable cells and their derived total.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Row {
    cells: [Option<i64>; EDITABLE_CATEGORIES],
    total: i64,
}

impl Row {
    pub fn cell(&self, category: Category) -> Option<i64> {
        category
            .editable_index()
            .and_then(|index| self.cells[index])
    }

    pub fn total(&self) -> i64 {
        self.total
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(Option::is_none)
    }

    fn set(&mut self, index: usize, value: Option<i64>) {
        self.cells[index] = value;
        self.recompute_total();
    }

    fn recompute_total(&mut self) {
        self.total = self
            .cells
            .iter()
            .map(|cell| cell.unwrap_or(0))
            .fold(0i64, i64::saturating_add);
    }
}

/// Why a cell write was refused at the grid boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoredWrite {
    NotEditable(Category),
    RoundOutOfRange(usize),
}

/// Outcome of [`Grid::set_cell`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellWrite {
    Applied {
        round: usize,
        category: Category,
        value: i64,
        row_total: i64,
    },
    Ignored(IgnoredWrite),
}

impl CellWrite {
    pub fn is_applied(&self) -> bool {
        matches!(self, CellWrite::Applied { .. })
    }
}

/// Check that `(round, category)` addresses an editable cell.
pub fn validate_cell(round: usize, category: Category) -> Result<(), IgnoredWrite> {
    if !(1..=ROUNDS).contains(&round) {
        return Err(IgnoredWrite::RoundOutOfRange(round));
    }
    if !category.is_editable() {
        return Err(IgnoredWrite::NotEditable(category));
    }
    Ok(())
}

/// A player's 10-round scorecard.
///
/// Rounds are addressed 1-based. Row totals are rebuilt on every write; the
/// grand total is never cached.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Grid {
    rows: [Row; ROUNDS],
}

impl Grid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_cell(&mut self, round: usize, category: Category, value: i64) -> CellWrite {
        if let Err(reason) = validate_cell(round, category) {
            tracing::debug!(
                target: "panda_royale::grid",
                round,
                %category,
                ?reason,
                "cell.write_ignored"
            );
            return CellWrite::Ignored(reason);
        }
        let Some(index) = category.editable_index() else {
            return CellWrite::Ignored(IgnoredWrite::NotEditable(category));
        };
        let row = &mut self.rows[round - 1];
        row.set(index, Some(value));
        CellWrite::Applied {
            round,
            category,
            value,
            row_total: row.total(),
        }
    }

    pub fn cell(&self, round: usize, category: Category) -> Option<i64> {
        self.row(round).and_then(|row| row.cell(category))
    }

    /// Numeric value of a cell, unset cells reading as 0.
    pub fn value(&self, round: usize, category: Category) -> i64 {
        self.cell(round, category).unwrap_or(0)
    }

    pub fn row(&self, round: usize) -> Option<&Row> {
        round.checked_sub(1).and_then(|index| self.rows.get(index))
    }

    pub fn rows(&self) -> &[Row; ROUNDS] {
        &self.rows
    }

    pub fn row_total(&self, round: usize) -> i64 {
        self.row(round).map(Row::total).unwrap_or(0)
    }

    pub fn grand_total(&self) -> i64 {
        self.rows
            .iter()
            .map(Row::total)
            .fold(0i64, i64::saturating_add)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_blank(&self) -> bool {
        self.rows.iter().all(Row::is_blank)
    }

    /// Persisted form: column 0 left blank for the round label, blank rows
    /// carry a blank total.
    pub fn to_wire(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                let mut wire = vec![String::new(); WIRE_COLUMNS];
                for category in Category::EDITABLE {
                    if let Some(value) = row.cell(category) {
                        wire[category.column()] = value.to_string();
                    }
                }
                if !row.is_blank() {
                    wire[TOTAL_COLUMN] = row.total().to_string();
                }
                wire
            })
            .collect()
    }

    /// Rebuild a grid from persisted rows.
    ///
    /// Missing rows and cells read as unset; non-numeric cells read as 0. The
    /// stored total column is ignored and recomputed.
    pub fn from_wire(wire: &[Vec<String>]) -> Self {
        let mut grid = Self::default();
        for (row, wire_row) in grid.rows.iter_mut().zip(wire.iter()) {
            for category in Category::EDITABLE {
                let Some(index) = category.editable_index() else {
                    continue;
                };
                row.cells[index] = wire_row
                    .get(category.column())
                    .filter(|raw| !raw.trim().is_empty())
                    .map(|raw| numeric_value(raw));
            }
            row.recompute_total();
        }
        grid
    }

    pub fn to_record(&self) -> PlayerRecord {
        PlayerRecord::new(self.to_wire(), self.grand_total())
    }

    pub fn from_record(record: &PlayerRecord) -> Self {
        Self::from_wire(&record.grid)
    }
}
