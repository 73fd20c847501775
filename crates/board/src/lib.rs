pub mod cells;
mod coerce;
pub mod config;
pub mod fog;
pub mod grid;
pub mod overlay;
pub mod render;
pub mod selection;
pub mod session;
pub mod state;
pub mod store;

pub use cells::{Cell, CellSet, RevealedCells};
pub use config::{
    BoardConfig, ConfigError, PERSIST_DEBOUNCE_ENV_VAR, PLAYER_FOLDER_ENV_VAR, ROLE_ENV_VAR,
};
pub use fog::{
    normalize_folder_name, pc_auto_revealed, placement_footprint, FogChecker, FogState,
    FogSummary, SceneFog, ViewerRole, ALLY_COMBAT_TEAM,
};
pub use grid::{
    cell_to_local_rect, cell_to_rect, pixel_to_cell, visible_grid_bounds, CellRect, GridBounds,
    GridConfig, GridOffsets, MapSize, PixelPoint, ViewState,
};
pub use overlay::{
    ensure_unique_name, normalize_mask, normalize_overlay, rebuild_aggregate_mask,
    resolve_active_layer_id, resolve_overlay_map_url, MaskPoint, MaskPolygon, OverlayConfig,
    OverlayError, OverlayLayer, OverlayMask,
};
pub use render::{render_fog, render_fog_cells, FogFrame, FogPainter, FogStyle};
pub use selection::{selection_rect, PointerButton, PointerId, SelectionController, SelectionState};
pub use session::BoardSession;
pub use state::{BoardState, Placement, SceneId, SceneState, TokenLibrary};
pub use store::{
    BoardListener, BoardStore, DebouncedPersister, FlushOutcome, JsonFileBackend,
    MemoryBoardStore, PersistBackend, PersistError, SubscriptionId,
};
