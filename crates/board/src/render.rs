use crate::cells::{Cell, CellSet};
use crate::fog::{SceneFog, ViewerRole};
use crate::grid::{cell_to_rect, visible_grid_bounds, CellRect, ViewState};

/// Paint seam for the host canvas. Rectangles are in pointer space.
pub trait FogPainter {
    fn fill_cells(&mut self, rects: &[CellRect], opacity: f32);
    fn outline_cells(&mut self, rects: &[CellRect]);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FogStyle {
    pub gm_opacity: f32,
    pub player_opacity: f32,
}

impl Default for FogStyle {
    fn default() -> Self {
        Self {
            gm_opacity: 0.5,
            player_opacity: 1.0,
        }
    }
}

impl FogStyle {
    pub fn opacity_for(&self, role: ViewerRole) -> f32 {
        let opacity = if role.is_gm() {
            self.gm_opacity
        } else {
            self.player_opacity
        };
        opacity.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FogFrame {
    pub fog_cells: usize,
    pub selection_cells: usize,
    pub opacity: f32,
}

/// Cells to darken this frame. Empty when fog is off or the view has no
/// usable map size.
pub fn render_fog_cells(fog: &SceneFog<'_>, view: &ViewState) -> CellSet {
    if !fog.is_enabled() {
        return CellSet::new();
    }
    visible_grid_bounds(view)
        .map(|bounds| fog.concealed_cells(bounds))
        .unwrap_or_default()
}

pub fn cell_rects<'a, I>(cells: I, view: &ViewState) -> Vec<CellRect>
where
    I: IntoIterator<Item = &'a Cell>,
{
    cells
        .into_iter()
        .map(|cell| cell_to_rect(*cell, view))
        .collect()
}

/// Paints one frame of fog. Both roles see the darkening; the GM gets the
/// lighter opacity plus an outline of the pending selection.
pub fn render_fog<P: FogPainter + ?Sized>(
    fog: &SceneFog<'_>,
    view: &ViewState,
    role: ViewerRole,
    selection: &CellSet,
    style: FogStyle,
    painter: &mut P,
) -> FogFrame {
    let opacity = style.opacity_for(role);
    let fog_cells = render_fog_cells(fog, view);
    if !fog_cells.is_empty() {
        painter.fill_cells(&cell_rects(&fog_cells, view), opacity);
    }

    let mut selection_cells = 0;
    if role.is_gm() && !selection.is_empty() {
        painter.outline_cells(&cell_rects(selection, view));
        selection_cells = selection.len();
    }

    FogFrame {
        fog_cells: fog_cells.len(),
        selection_cells,
        opacity,
    }
}
