use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::coerce::parse_flag;

/// Integer grid address. Columns grow right, rows grow down from the map origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub col: u32,
    pub row: u32,
}

pub type CellSet = BTreeSet<Cell>;

impl Cell {
    pub const fn new(col: u32, row: u32) -> Self {
        Self { col, row }
    }

    /// Stored key form, `"<col>,<row>"`.
    pub fn key(self) -> String {
        self.to_string()
    }

    /// Parses a stored key. Only two runs of ASCII digits joined by one comma
    /// are accepted; anything else is `None`.
    pub fn parse_key(raw: &str) -> Option<Self> {
        let (col, row) = raw.split_once(',')?;
        Some(Self {
            col: parse_component(col)?,
            row: parse_component(row)?,
        })
    }
}

fn parse_component(raw: &str) -> Option<u32> {
    if raw.is_empty() || !raw.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    raw.parse::<u32>().ok()
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.col, self.row)
    }
}

/// Revealed cell set of one scene.
///
/// Persisted as a presence map `{"c,r": true}`. Reads also accept an array of
/// key strings; malformed keys and falsy presence values are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevealedCells {
    cells: CellSet,
}

impl RevealedCells {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(raw: &Value) -> Self {
        let mut cells = CellSet::new();
        match raw {
            Value::Object(map) => {
                for (key, present) in map {
                    if !parse_flag(Some(present), false) {
                        continue;
                    }
                    if let Some(cell) = Cell::parse_key(key) {
                        cells.insert(cell);
                    }
                }
            }
            Value::Array(keys) => {
                cells.extend(keys.iter().filter_map(Value::as_str).filter_map(Cell::parse_key));
            }
            _ => {}
        }
        Self { cells }
    }

    pub fn has(&self, cell: Cell) -> bool {
        self.cells.contains(&cell)
    }

    pub fn add(&mut self, cell: Cell) -> bool {
        self.cells.insert(cell)
    }

    pub fn remove(&mut self, cell: Cell) -> bool {
        self.cells.remove(&cell)
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Cell> + '_ {
        self.cells.iter().copied()
    }

    pub fn as_set(&self) -> &CellSet {
        &self.cells
    }
}

impl FromIterator<Cell> for RevealedCells {
    fn from_iter<I: IntoIterator<Item = Cell>>(iter: I) -> Self {
        Self {
            cells: iter.into_iter().collect(),
        }
    }
}

impl Serialize for RevealedCells {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.cells.iter().map(|cell| (cell.key(), true)))
    }
}

impl<'de> Deserialize<'de> for RevealedCells {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&raw))
    }
}
