use tracing::debug;

use crate::cells::{Cell, CellSet};
use crate::config::BoardConfig;
use crate::fog::{FogChecker, FogState, FogSummary, SceneFog, ViewerRole};
use crate::grid::{pixel_to_cell, visible_grid_bounds, PixelPoint, ViewState};
use crate::overlay::{MaskPoint, OverlayConfig, OverlayError, OverlayLayer};
use crate::render::{self, FogFrame, FogPainter};
use crate::selection::{PointerButton, PointerId, SelectionController};
use crate::state::{SceneId, SceneState};
use crate::store::BoardStore;

/// Per-board context owned by the host: the store, the viewer's settings and
/// the transient selection. Every fog and overlay operation goes through here.
///
/// Mutations commit through the store, mark the scene dirty and request a
/// persist. A blank scene id turns every operation into a no-op.
pub struct BoardSession<S> {
    store: S,
    config: BoardConfig,
    selection: SelectionController,
}

impl<S: BoardStore> BoardSession<S> {
    pub fn new(store: S, config: BoardConfig) -> Self {
        Self {
            store,
            config,
            selection: SelectionController::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn role(&self) -> ViewerRole {
        self.config.viewer_role
    }

    fn scene_fog(&self, scene_id: &SceneId) -> SceneFog<'_> {
        SceneFog::resolve(
            self.store.state(),
            scene_id,
            &self.config.player_folder_name,
        )
    }

    fn mutate_scene<R, F>(&mut self, scene_id: &SceneId, mutator: F) -> Option<R>
    where
        F: FnOnce(&mut SceneState) -> R,
    {
        if is_blank(scene_id) {
            debug!("scene_mutation_skipped_blank_scene_id");
            return None;
        }
        let grid = self.config.default_grid();
        let result = self
            .store
            .update_state(|state| mutator(state.ensure_scene(scene_id, grid)));
        self.store.mark_scene_state_dirty(scene_id);
        self.store.persist_board_state();
        Some(result)
    }

    pub fn get_fog_state(&self, scene_id: &SceneId) -> Option<&FogState> {
        self.store.state().scene(scene_id)?.fog_of_war.as_ref()
    }

    pub fn is_fog_enabled(&self, scene_id: &SceneId) -> bool {
        self.get_fog_state(scene_id).is_some_and(|fog| fog.enabled)
    }

    pub fn is_revealed(&self, scene_id: &SceneId, cell: Cell) -> bool {
        self.scene_fog(scene_id).is_revealed(cell)
    }

    pub fn pc_auto_revealed(&self, scene_id: &SceneId) -> CellSet {
        self.scene_fog(scene_id).pc_auto_revealed().clone()
    }

    /// Gameplay gate for the session's viewer. Always `false` for the GM.
    pub fn is_position_fogged(&self, scene_id: &SceneId, col: u32, row: u32) -> bool {
        self.scene_fog(scene_id)
            .is_hidden_for(self.role(), Cell::new(col, row))
    }

    pub fn create_fog_checker(&self, scene_id: &SceneId) -> Option<FogChecker> {
        self.scene_fog(scene_id).checker(self.role())
    }

    pub fn fog_summary(&self, scene_id: &SceneId, view: &ViewState) -> Option<FogSummary> {
        let bounds = visible_grid_bounds(view)?;
        Some(self.scene_fog(scene_id).summary(bounds))
    }

    /// Creates the fog record on first use. Disabling keeps revealed cells.
    pub fn set_fog_enabled(&mut self, scene_id: &SceneId, enabled: bool) -> bool {
        let applied = self
            .mutate_scene(scene_id, |scene| scene.fog_mut().set_enabled(enabled))
            .is_some();
        if applied {
            debug!(scene_id = %scene_id, enabled, "fog_enabled_set");
        }
        applied
    }

    /// Reveal inserts the cells into the revealed set, conceal removes them.
    /// Returns how many cells changed.
    pub fn apply_cell_change<I>(&mut self, scene_id: &SceneId, cells: I, reveal: bool) -> usize
    where
        I: IntoIterator<Item = Cell>,
    {
        let changed = self
            .mutate_scene(scene_id, |scene| {
                scene.fog_mut().apply_cell_change(cells, reveal)
            })
            .unwrap_or(0);
        debug!(scene_id = %scene_id, reveal, changed, "fog_cells_applied");
        changed
    }

    pub fn reveal_all(&mut self, scene_id: &SceneId, view: &ViewState) -> usize {
        let Some(bounds) = visible_grid_bounds(view) else {
            debug!(scene_id = %scene_id, "fog_reveal_all_skipped_no_bounds");
            return 0;
        };
        let changed = self
            .mutate_scene(scene_id, |scene| scene.fog_mut().reveal_all(bounds))
            .unwrap_or(0);
        debug!(scene_id = %scene_id, changed, "fog_revealed_all");
        changed
    }

    pub fn conceal_all(&mut self, scene_id: &SceneId) -> usize {
        let changed = self
            .mutate_scene(scene_id, |scene| scene.fog_mut().conceal_all())
            .unwrap_or(0);
        debug!(scene_id = %scene_id, changed, "fog_concealed_all");
        changed
    }

    pub fn selection(&self) -> &SelectionController {
        &self.selection
    }

    /// Select-mode is a GM tool; other roles are refused.
    pub fn activate_selection(&mut self) -> bool {
        if !self.role().is_gm() {
            debug!("selection_activation_refused_non_gm");
            return false;
        }
        self.selection.activate();
        true
    }

    pub fn deactivate_selection(&mut self) {
        self.selection.deactivate();
    }

    /// Starts a drag. Pointers outside the map's grid are ignored.
    pub fn selection_pointer_down(
        &mut self,
        pointer: PointerId,
        button: PointerButton,
        point: PixelPoint,
        view: &ViewState,
    ) -> bool {
        let cell = pixel_to_cell(point, view).filter(|cell| {
            visible_grid_bounds(view).is_some_and(|bounds| bounds.contains(*cell))
        });
        self.selection.pointer_down(pointer, button, cell)
    }

    /// Drag corners past the map edge are clamped onto the last column/row.
    pub fn selection_pointer_move(
        &mut self,
        pointer: PointerId,
        point: PixelPoint,
        view: &ViewState,
    ) -> bool {
        let cell = pixel_to_cell(point, view)
            .and_then(|cell| visible_grid_bounds(view)?.clamp(cell));
        self.selection.pointer_move(pointer, cell)
    }

    pub fn selection_pointer_up(&mut self, pointer: PointerId) -> bool {
        self.selection.pointer_up(pointer)
    }

    pub fn selection_pointer_cancel(&mut self, pointer: PointerId) -> bool {
        self.selection.pointer_cancel(pointer)
    }

    pub fn document_hidden(&mut self) {
        self.selection.document_hidden();
    }

    /// Reveals or conceals the selected cells, then clears the selection.
    pub fn apply_selection(&mut self, scene_id: &SceneId, reveal: bool) -> usize {
        let cells = self.selection.take_cells();
        if cells.is_empty() {
            return 0;
        }
        self.apply_cell_change(scene_id, cells, reveal)
    }

    pub fn render_fog_cells(&self, scene_id: &SceneId, view: &ViewState) -> CellSet {
        render::render_fog_cells(&self.scene_fog(scene_id), view)
    }

    pub fn render_selection_cells(&self) -> CellSet {
        self.selection.cells().clone()
    }

    pub fn render_fog<P: FogPainter + ?Sized>(
        &self,
        scene_id: &SceneId,
        view: &ViewState,
        painter: &mut P,
    ) -> FogFrame {
        render::render_fog(
            &self.scene_fog(scene_id),
            view,
            self.role(),
            self.selection.cells(),
            self.config.fog_style(),
            painter,
        )
    }

    /// Canonical overlay for the scene; empty when none is stored.
    pub fn get_overlay_config(&self, scene_id: &SceneId) -> OverlayConfig {
        self.store
            .state()
            .scene(scene_id)
            .and_then(|scene| scene.overlay.clone())
            .unwrap_or_default()
    }

    /// Runs `command` on a copy of the scene overlay and commits it only on
    /// success.
    fn edit_overlay<R, F>(
        &mut self,
        scene_id: &SceneId,
        command_name: &'static str,
        command: F,
    ) -> Result<R, OverlayError>
    where
        F: FnOnce(&mut OverlayConfig) -> Result<R, OverlayError>,
    {
        if is_blank(scene_id) {
            return Err(OverlayError::MissingScene);
        }
        let mut overlay = self.get_overlay_config(scene_id);
        let result = match command(&mut overlay) {
            Ok(result) => result,
            Err(error) => {
                debug!(
                    scene_id = %scene_id,
                    command = command_name,
                    error = %error,
                    "overlay_command_rejected"
                );
                return Err(error);
            }
        };
        let layers = overlay.layers().len();
        self.mutate_scene(scene_id, |scene| scene.overlay = Some(overlay));
        debug!(
            scene_id = %scene_id,
            command = command_name,
            layers,
            "overlay_command_applied"
        );
        Ok(result)
    }

    pub fn add_overlay_layer(
        &mut self,
        scene_id: &SceneId,
        requested_name: &str,
    ) -> Result<OverlayLayer, OverlayError> {
        self.edit_overlay(scene_id, "add_layer", |overlay| {
            Ok(overlay.add_layer(scene_id.as_str(), requested_name))
        })
    }

    pub fn rename_overlay_layer(
        &mut self,
        scene_id: &SceneId,
        layer_id: &str,
        requested_name: &str,
    ) -> Result<String, OverlayError> {
        self.edit_overlay(scene_id, "rename_layer", |overlay| {
            overlay.rename_layer(layer_id, requested_name)
        })
    }

    pub fn delete_overlay_layer(
        &mut self,
        scene_id: &SceneId,
        layer_id: &str,
    ) -> Result<OverlayLayer, OverlayError> {
        self.edit_overlay(scene_id, "delete_layer", |overlay| {
            overlay.delete_layer(layer_id)
        })
    }

    pub fn toggle_overlay_layer_visibility(
        &mut self,
        scene_id: &SceneId,
        layer_id: &str,
    ) -> Result<bool, OverlayError> {
        self.edit_overlay(scene_id, "toggle_layer_visibility", |overlay| {
            overlay.toggle_layer_visibility(layer_id)
        })
    }

    pub fn set_active_overlay_layer(
        &mut self,
        scene_id: &SceneId,
        layer_id: &str,
    ) -> Result<Option<String>, OverlayError> {
        self.edit_overlay(scene_id, "set_active_layer", |overlay| {
            overlay.set_active_layer(layer_id)
        })
    }

    pub fn set_overlay_layer_image(
        &mut self,
        scene_id: &SceneId,
        layer_id: &str,
        url: Option<&str>,
    ) -> Result<(), OverlayError> {
        self.edit_overlay(scene_id, "set_layer_image", |overlay| {
            overlay.set_layer_image(layer_id, url)
        })
    }

    pub fn add_overlay_mask_polygon(
        &mut self,
        scene_id: &SceneId,
        layer_id: Option<&str>,
        points: &[MaskPoint],
    ) -> Result<usize, OverlayError> {
        self.edit_overlay(scene_id, "add_mask_polygon", |overlay| {
            overlay.add_mask_polygon(layer_id, points)
        })
    }

    pub fn clear_overlay_layer_mask(
        &mut self,
        scene_id: &SceneId,
        layer_id: &str,
    ) -> Result<(), OverlayError> {
        self.edit_overlay(scene_id, "clear_layer_mask", |overlay| {
            overlay.clear_layer_mask(layer_id)
        })
    }

    pub fn set_overlay_layer_mask_visibility(
        &mut self,
        scene_id: &SceneId,
        layer_id: &str,
        visible: bool,
    ) -> Result<(), OverlayError> {
        self.edit_overlay(scene_id, "set_layer_mask_visibility", |overlay| {
            overlay.set_layer_mask_visibility(layer_id, visible)
        })
    }

    pub fn move_overlay_layer(
        &mut self,
        scene_id: &SceneId,
        layer_id: &str,
        to_index: usize,
    ) -> Result<usize, OverlayError> {
        self.edit_overlay(scene_id, "move_layer", |overlay| {
            overlay.move_layer(layer_id, to_index)
        })
    }
}

fn is_blank(scene_id: &SceneId) -> bool {
    scene_id.as_str().trim().is_empty()
}
