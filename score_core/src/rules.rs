use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Scorecard columns in display order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Round,
    Yellow,
    Purple,
    Blue,
    Red,
    Green,
    Clear,
    Pink,
    Total,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Round,
        Category::Yellow,
        Category::Purple,
        Category::Blue,
        Category::Red,
        Category::Green,
        Category::Clear,
        Category::Pink,
        Category::Total,
    ];

    /// The seven columns a player can write to.
    pub const EDITABLE: [Category; 7] = [
        Category::Yellow,
        Category::Purple,
        Category::Blue,
        Category::Red,
        Category::Green,
        Category::Clear,
        Category::Pink,
    ];

    pub fn is_editable(self) -> bool {
        !matches!(self, Category::Round | Category::Total)
    }

    /// Column index in the persisted 9-wide row.
    pub fn column(self) -> usize {
        self as usize
    }

    /// Slot among the editable cells, `None` for the label and total columns.
    pub fn editable_index(self) -> Option<usize> {
        if self.is_editable() {
            Some(self as usize - 1)
        } else {
            None
        }
    }

    pub fn from_column(column: usize) -> Option<Self> {
        Self::ALL.get(column).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Category::Round => "Round",
            Category::Yellow => "Yellow",
            Category::Purple => "Purple",
            Category::Blue => "Blue",
            Category::Red => "Red",
            Category::Green => "Green",
            Category::Clear => "Clear",
            Category::Pink => "Pink",
            Category::Total => "Total",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category '{0}'")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|category| category.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// Raw, uncommitted input for one cell, shaped by the category being edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellInput {
    Value(String),
    Blue { total: String, sparkly: bool },
    Red { dice_count: String, dice_sum: String },
}

impl CellInput {
    /// Blank input of the shape `category` expects.
    pub fn blank_for(category: Category) -> Self {
        match category {
            Category::Blue => CellInput::Blue {
                total: String::new(),
                sparkly: false,
            },
            Category::Red => CellInput::Red {
                dice_count: String::new(),
                dice_sum: String::new(),
            },
            _ => CellInput::Value(String::new()),
        }
    }

    pub fn value(raw: impl Into<String>) -> Self {
        CellInput::Value(raw.into())
    }

    pub fn blue(total: impl Into<String>, sparkly: bool) -> Self {
        CellInput::Blue {
            total: total.into(),
            sparkly,
        }
    }

    pub fn red(dice_count: impl Into<String>, dice_sum: impl Into<String>) -> Self {
        CellInput::Red {
            dice_count: dice_count.into(),
            dice_sum: dice_sum.into(),
        }
    }

    /// The primary numeric field, whatever the shape.
    fn primary(&self) -> &str {
        match self {
            CellInput::Value(raw) => raw,
            CellInput::Blue { total, .. } => total,
            CellInput::Red { dice_count, .. } => dice_count,
        }
    }
}

/// Lenient number parse: blank, malformed and non-finite input all read as 0.
///
/// Fractions truncate toward zero.
pub fn numeric_value(raw: &str) -> i64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return 0;
    }
    if let Ok(value) = trimmed.parse::<i64>() {
        return value;
    }
    match trimmed.parse::<f64>() {
        // `as` saturates at the i64 bounds.
        Ok(value) if value.is_finite() => value.trunc() as i64,
        _ => 0,
    }
}

/// Stored value for `input` written into a `category` cell.
///
/// Input shaped for another category is read through its primary field, so a
/// plain value submitted to Blue counts as not sparkly and one submitted to
/// Red multiplies by an empty dice sum.
pub fn apply(category: Category, input: &CellInput) -> i64 {
    match (category, input) {
        (Category::Purple, input) => numeric_value(input.primary()).saturating_mul(2),
        (Category::Blue, CellInput::Blue { total, sparkly }) => {
            let total = numeric_value(total);
            if *sparkly {
                total.saturating_mul(2)
            } else {
                total
            }
        }
        (
            Category::Red,
            CellInput::Red {
                dice_count,
                dice_sum,
            },
        ) => numeric_value(dice_count).saturating_mul(numeric_value(dice_sum)),
        (Category::Red, _) => 0,
        (_, input) => numeric_value(input.primary()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_categories_store_the_number() {
        for category in [
            Category::Yellow,
            Category::Green,
            Category::Clear,
            Category::Pink,
        ] {
            assert_eq!(apply(category, &CellInput::value("7")), 7);
            assert_eq!(apply(category, &CellInput::value(" -3 ")), -3);
        }
    }

    #[test]
    fn purple_doubles() {
        for v in [-4, 0, 1, 4, 13] {
            assert_eq!(apply(Category::Purple, &CellInput::value(v.to_string())), 2 * v);
        }
    }

    #[test]
    fn blue_doubles_only_when_sparkly() {
        assert_eq!(apply(Category::Blue, &CellInput::blue("9", true)), 18);
        assert_eq!(apply(Category::Blue, &CellInput::blue("9", false)), 9);
        assert_eq!(apply(Category::Blue, &CellInput::value("9")), 9);
    }

    #[test]
    fn red_multiplies_count_by_sum() {
        assert_eq!(apply(Category::Red, &CellInput::red("3", "14")), 42);
        assert_eq!(apply(Category::Red, &CellInput::red("0", "14")), 0);
        assert_eq!(apply(Category::Red, &CellInput::value("5")), 0);
    }

    #[test]
    fn malformed_input_reads_as_zero() {
        for raw in ["", "   ", "abc", "NaN", "inf", "-infinity", "4x", "--1"] {
            for category in Category::EDITABLE {
                let input = match category {
                    Category::Blue => CellInput::blue(raw, true),
                    Category::Red => CellInput::red(raw, raw),
                    _ => CellInput::value(raw),
                };
                assert_eq!(apply(category, &input), 0, "{category} with {raw:?}");
            }
        }
    }

    #[test]
    fn fractional_and_exponent_input_truncates() {
        assert_eq!(numeric_value("2.9"), 2);
        assert_eq!(numeric_value("-2.9"), -2);
        assert_eq!(numeric_value("1e2"), 100);
    }

    #[test]
    fn huge_products_saturate() {
        let big = i64::MAX.to_string();
        assert_eq!(apply(Category::Purple, &CellInput::value(&big)), i64::MAX);
        assert_eq!(apply(Category::Red, &CellInput::red(&big, "3")), i64::MAX);
    }

    #[test]
    fn categories_parse_by_name_and_map_to_columns() {
        assert_eq!("purple".parse::<Category>(), Ok(Category::Purple));
        assert!("mauve".parse::<Category>().is_err());
        assert_eq!(Category::Yellow.column(), 1);
        assert_eq!(Category::Total.column(), 8);
        assert_eq!(Category::Pink.editable_index(), Some(6));
        assert_eq!(Category::Round.editable_index(), None);
        assert_eq!(Category::from_column(3), Some(Category::Blue));
        assert_eq!(Category::from_column(9), None);
    }
}
