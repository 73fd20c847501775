use tracing::debug;

use crate::cells::{Cell, CellSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PointerId(pub i64);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    pub active: bool,
    pub anchor: Option<Cell>,
    pub cursor: Option<Cell>,
    pub cells: CellSet,
}

/// Rectangle drag over grid cells for the GM's reveal/conceal commands.
///
/// `Idle -> Dragging` on primary pointer down, back to `Idle` on pointer up
/// (cells kept) or on cancel/deactivation (cells cleared). Only the pointer
/// that started the drag is tracked.
#[derive(Debug, Default)]
pub struct SelectionController {
    state: SelectionState,
    drag_pointer: Option<PointerId>,
}

impl SelectionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.active
    }

    pub fn is_dragging(&self) -> bool {
        self.drag_pointer.is_some()
    }

    pub fn cells(&self) -> &CellSet {
        &self.state.cells
    }

    pub fn activate(&mut self) {
        self.state.active = true;
    }

    pub fn deactivate(&mut self) {
        self.state.active = false;
        self.reset();
    }

    pub fn pointer_down(
        &mut self,
        pointer: PointerId,
        button: PointerButton,
        cell: Option<Cell>,
    ) -> bool {
        if !self.state.active || self.is_dragging() || button != PointerButton::Primary {
            return false;
        }
        let Some(cell) = cell else {
            return false;
        };
        self.drag_pointer = Some(pointer);
        self.state.anchor = Some(cell);
        self.state.cursor = Some(cell);
        self.recompute_cells();
        true
    }

    /// Updates the drag corner. A pointer outside the map (`None`) keeps the
    /// previous corner.
    pub fn pointer_move(&mut self, pointer: PointerId, cell: Option<Cell>) -> bool {
        if self.drag_pointer != Some(pointer) {
            return false;
        }
        let Some(cell) = cell else {
            return false;
        };
        if self.state.cursor == Some(cell) {
            return false;
        }
        self.state.cursor = Some(cell);
        self.recompute_cells();
        true
    }

    /// Ends the drag and keeps the selected cells for a follow-up command.
    pub fn pointer_up(&mut self, pointer: PointerId) -> bool {
        if self.drag_pointer != Some(pointer) {
            return false;
        }
        self.drag_pointer = None;
        debug!(cells = self.state.cells.len(), "selection_drag_finished");
        true
    }

    pub fn pointer_cancel(&mut self, pointer: PointerId) -> bool {
        if self.drag_pointer != Some(pointer) {
            return false;
        }
        self.reset();
        true
    }

    pub fn document_hidden(&mut self) {
        self.reset();
    }

    /// Returns the selected cells and clears the selection.
    pub fn take_cells(&mut self) -> CellSet {
        let cells = std::mem::take(&mut self.state.cells);
        self.reset();
        cells
    }

    fn reset(&mut self) {
        self.drag_pointer = None;
        self.state.anchor = None;
        self.state.cursor = None;
        self.state.cells.clear();
    }

    fn recompute_cells(&mut self) {
        self.state.cells = match (self.state.anchor, self.state.cursor) {
            (Some(anchor), Some(cursor)) => selection_rect(anchor, cursor),
            _ => CellSet::new(),
        };
    }
}

/// Inclusive rectangle spanned by two corner cells.
pub fn selection_rect(anchor: Cell, cursor: Cell) -> CellSet {
    let (col_min, col_max) = (anchor.col.min(cursor.col), anchor.col.max(cursor.col));
    let (row_min, row_max) = (anchor.row.min(cursor.row), anchor.row.max(cursor.row));
    (row_min..=row_max)
        .flat_map(|row| (col_min..=col_max).map(move |col| Cell::new(col, row)))
        .collect()
}
