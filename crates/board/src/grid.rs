use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::cells::Cell;
use crate::coerce::{finite_number, parse_flag};

pub const GRID_SIZE_MIN: u32 = 8;
pub const GRID_SIZE_MAX: u32 = 320;
pub const GRID_SIZE_DEFAULT: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GridConfig {
    pub size: u32,
    pub locked: bool,
    pub visible: bool,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            size: GRID_SIZE_DEFAULT,
            locked: false,
            visible: true,
        }
    }
}

impl GridConfig {
    pub fn with_size(size: u32) -> Self {
        Self {
            size: clamp_grid_size(size as f64),
            ..Self::default()
        }
    }

    pub fn from_value(raw: &Value) -> Self {
        let size = finite_number(raw.get("size"))
            .map(clamp_grid_size)
            .unwrap_or(GRID_SIZE_DEFAULT);
        Self {
            size,
            locked: parse_flag(raw.get("locked"), false),
            visible: parse_flag(raw.get("visible"), true),
        }
    }
}

fn clamp_grid_size(size: f64) -> u32 {
    size.round().clamp(GRID_SIZE_MIN as f64, GRID_SIZE_MAX as f64) as u32
}

impl<'de> Deserialize<'de> for GridConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&raw))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GridOffsets {
    pub left: f64,
    pub top: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MapSize {
    pub width: f64,
    pub height: f64,
}

impl MapSize {
    fn has_area(self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// Per-frame view transform. Pointer pixels map to map pixels through
/// `local = (pointer - translation) / scale`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    pub scale: f64,
    pub translation: PixelPoint,
    pub grid_size: u32,
    pub grid_offsets: GridOffsets,
    pub map_pixel_size: MapSize,
}

impl ViewState {
    pub fn new(grid_size: u32, map_pixel_size: MapSize) -> Self {
        Self {
            scale: 1.0,
            translation: PixelPoint::default(),
            grid_size,
            grid_offsets: GridOffsets::default(),
            map_pixel_size,
        }
    }

    fn scale_is_usable(&self) -> bool {
        self.scale.is_finite() && self.scale != 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellRect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

/// Column and row count covered by a map, partial edge cells included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridBounds {
    pub columns: u32,
    pub rows: u32,
}

impl GridBounds {
    pub fn contains(&self, cell: Cell) -> bool {
        cell.col < self.columns && cell.row < self.rows
    }

    /// Pulls a cell back onto the last column/row. `None` for an empty grid.
    pub fn clamp(&self, cell: Cell) -> Option<Cell> {
        if self.columns == 0 || self.rows == 0 {
            return None;
        }
        Some(Cell::new(
            cell.col.min(self.columns - 1),
            cell.row.min(self.rows - 1),
        ))
    }

    pub fn cell_count(&self) -> u64 {
        self.columns as u64 * self.rows as u64
    }

    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        (0..self.rows).flat_map(move |row| (0..self.columns).map(move |col| Cell::new(col, row)))
    }
}

pub fn pixel_to_cell(pointer: PixelPoint, view: &ViewState) -> Option<Cell> {
    if !view.scale_is_usable() || !view.map_pixel_size.has_area() || view.grid_size == 0 {
        return None;
    }
    let local_x = (pointer.x - view.translation.x) / view.scale;
    let local_y = (pointer.y - view.translation.y) / view.scale;
    let size = view.grid_size as f64;
    let col = ((local_x - view.grid_offsets.left) / size).floor();
    let row = ((local_y - view.grid_offsets.top) / size).floor();
    Some(Cell::new(cell_component(col)?, cell_component(row)?))
}

fn cell_component(value: f64) -> Option<u32> {
    if !value.is_finite() || value < 0.0 || value > u32::MAX as f64 {
        return None;
    }
    Some(value as u32)
}

/// Map-space rectangle of a cell.
pub fn cell_to_local_rect(cell: Cell, view: &ViewState) -> CellRect {
    let size = view.grid_size as f64;
    CellRect {
        x: view.grid_offsets.left + cell.col as f64 * size,
        y: view.grid_offsets.top + cell.row as f64 * size,
        w: size,
        h: size,
    }
}

/// Pointer-space rectangle of a cell; `pixel_to_cell` of its top-left corner
/// yields the same cell.
pub fn cell_to_rect(cell: Cell, view: &ViewState) -> CellRect {
    let local = cell_to_local_rect(cell, view);
    CellRect {
        x: local.x * view.scale + view.translation.x,
        y: local.y * view.scale + view.translation.y,
        w: local.w * view.scale,
        h: local.h * view.scale,
    }
}

pub fn visible_grid_bounds(view: &ViewState) -> Option<GridBounds> {
    if !view.map_pixel_size.has_area() || view.grid_size == 0 {
        return None;
    }
    let size = view.grid_size as f64;
    let columns = ((view.map_pixel_size.width - view.grid_offsets.left) / size).ceil();
    let rows = ((view.map_pixel_size.height - view.grid_offsets.top) / size).ceil();
    Some(GridBounds {
        columns: cell_component(columns)?,
        rows: cell_component(rows)?,
    })
}
