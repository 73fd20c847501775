use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use board::{
    BoardConfig, BoardSession, BoardState, BoardStore, GridConfig, GridOffsets, JsonFileBackend,
    MapSize, MemoryBoardStore, PersistBackend, SceneId, SceneState, ViewState, ViewerRole,
};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum BoardLoadError {
    #[error("failed to read board file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse board file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FogCellsOptions {
    pub scene: SceneId,
    pub map: MapSize,
    pub grid_size: Option<u32>,
    pub offset: GridOffsets,
    pub role: Option<ViewerRole>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    Inspect { path: PathBuf, json: bool },
    FogCells { path: PathBuf, options: FogCellsOptions },
    Normalize { input: PathBuf, output: PathBuf },
}

/// Loads a board file, normalizing every scene record. Parse failures name the
/// JSON path that broke.
pub fn load_board(path: &Path) -> Result<BoardState, BoardLoadError> {
    let raw = fs::read_to_string(path).map_err(|source| BoardLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut deserializer = serde_json::Deserializer::from_str(&raw);
    let state: BoardState =
        serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
            let json_path = error.path().to_string();
            let source = error.into_inner();
            let message = if json_path.is_empty() || json_path == "." {
                source.to_string()
            } else {
                format!("at {json_path}: {source}")
            };
            BoardLoadError::Parse {
                path: path.to_path_buf(),
                message,
            }
        })?;
    info!(
        path = %path.display(),
        scenes = state.scene_state.len(),
        "board_loaded"
    );
    Ok(state)
}

/// `"640x480"` (also `X` or `*`) into a map size.
pub fn parse_map_size(raw: &str) -> Result<MapSize, String> {
    let (width, height) = raw
        .split_once(['x', 'X', '*'])
        .ok_or_else(|| format!("invalid --map value '{raw}' (expected WIDTHxHEIGHT)"))?;
    let parse = |value: &str| {
        value
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite() && *value > 0.0)
            .ok_or_else(|| format!("invalid --map value '{raw}' (expected positive numbers)"))
    };
    Ok(MapSize {
        width: parse(width)?,
        height: parse(height)?,
    })
}

/// `"LEFT,TOP"` into grid offsets.
pub fn parse_offset(raw: &str) -> Result<GridOffsets, String> {
    let (left, top) = raw
        .split_once(',')
        .ok_or_else(|| format!("invalid --offset value '{raw}' (expected LEFT,TOP)"))?;
    let parse = |value: &str| {
        value
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| format!("invalid --offset value '{raw}' (expected numbers)"))
    };
    Ok(GridOffsets {
        left: parse(left)?,
        top: parse(top)?,
    })
}

pub fn parse_role(raw: &str) -> Result<ViewerRole, String> {
    ViewerRole::parse(raw)
        .ok_or_else(|| format!("invalid --role value '{raw}' (expected gm|player)"))
}

pub fn run<W: Write>(
    kind: CommandKind,
    config: &BoardConfig,
    stdout: &mut W,
) -> Result<(), String> {
    match kind {
        CommandKind::Inspect { path, json } => {
            let state = load_board(&path).map_err(|error| error.to_string())?;
            let report = InspectReport::from_state(&state);
            if json {
                let text = serde_json::to_string_pretty(&report)
                    .map_err(|error| format!("failed to encode report: {error}"))?;
                write_line(stdout, &text)
            } else {
                write_inspect_text(stdout, &report)
            }
        }
        CommandKind::FogCells { path, options } => {
            let state = load_board(&path).map_err(|error| error.to_string())?;
            write_fog_cells(stdout, state, config, &options)
        }
        CommandKind::Normalize { input, output } => {
            let state = load_board(&input).map_err(|error| error.to_string())?;
            let mut backend = JsonFileBackend::new(&output);
            backend.write(&state).map_err(|error| error.to_string())?;
            info!(
                input = %input.display(),
                output = %output.display(),
                "board_normalized"
            );
            write_line(
                stdout,
                &format!(
                    "normalized {} scene(s) into {}",
                    state.scene_state.len(),
                    output.display()
                ),
            )
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InspectReport {
    scenes: Vec<SceneReport>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SceneReport {
    scene_id: String,
    grid_size: u32,
    grid_locked: bool,
    grid_visible: bool,
    fog_enabled: bool,
    revealed_cells: usize,
    placements: usize,
    layers: Vec<LayerReport>,
    active_layer_id: Option<String>,
    map_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LayerReport {
    id: String,
    name: String,
    visible: bool,
    map_url: Option<String>,
    polygons: usize,
}

impl InspectReport {
    fn from_state(state: &BoardState) -> Self {
        let scenes = state
            .scene_state
            .iter()
            .map(|(scene_id, scene)| SceneReport::new(state, scene_id, scene))
            .collect();
        Self { scenes }
    }
}

impl SceneReport {
    fn new(state: &BoardState, scene_id: &SceneId, scene: &SceneState) -> Self {
        let fog = scene.fog_of_war.as_ref();
        let overlay = scene.overlay.clone().unwrap_or_default();
        let layers = overlay
            .layers()
            .iter()
            .map(|layer| LayerReport {
                id: layer.id.clone(),
                name: layer.name.clone(),
                visible: layer.visible,
                map_url: layer.map_url.clone(),
                polygons: layer.mask.polygons.len(),
            })
            .collect();
        Self {
            scene_id: scene_id.to_string(),
            grid_size: scene.grid.size,
            grid_locked: scene.grid.locked,
            grid_visible: scene.grid.visible,
            fog_enabled: fog.is_some_and(|fog| fog.enabled),
            revealed_cells: fog.map_or(0, |fog| fog.revealed_cells.len()),
            placements: state.placements_for(scene_id).len(),
            layers,
            active_layer_id: overlay.active_layer_id().map(str::to_string),
            map_url: overlay.map_url().map(str::to_string),
        }
    }
}

fn write_inspect_text<W: Write>(stdout: &mut W, report: &InspectReport) -> Result<(), String> {
    if report.scenes.is_empty() {
        return write_line(stdout, "no scenes");
    }
    for scene in &report.scenes {
        write_line(
            stdout,
            &format!(
                "scene {}: grid={} locked={} visible={} placements={}",
                scene.scene_id,
                scene.grid_size,
                scene.grid_locked,
                scene.grid_visible,
                scene.placements
            ),
        )?;
        write_line(
            stdout,
            &format!(
                "  fog: enabled={} revealed={}",
                scene.fog_enabled, scene.revealed_cells
            ),
        )?;
        write_line(
            stdout,
            &format!(
                "  overlay: layers={} active={} map={}",
                scene.layers.len(),
                scene.active_layer_id.as_deref().unwrap_or("-"),
                scene.map_url.as_deref().unwrap_or("-")
            ),
        )?;
        for layer in &scene.layers {
            write_line(
                stdout,
                &format!(
                    "    - {} \"{}\" visible={} map={} polygons={}",
                    layer.id,
                    layer.name,
                    layer.visible,
                    layer.map_url.as_deref().unwrap_or("-"),
                    layer.polygons
                ),
            )?;
        }
    }
    Ok(())
}

fn write_fog_cells<W: Write>(
    stdout: &mut W,
    state: BoardState,
    config: &BoardConfig,
    options: &FogCellsOptions,
) -> Result<(), String> {
    let grid_size = match options.grid_size {
        Some(size) => GridConfig::with_size(size).size,
        None => state
            .scene(&options.scene)
            .map_or(config.default_grid_size, |scene| scene.grid.size),
    };
    let view = ViewState {
        grid_offsets: options.offset,
        ..ViewState::new(grid_size, options.map)
    };
    let session_config = BoardConfig {
        viewer_role: options.role.unwrap_or(config.viewer_role),
        ..config.clone()
    };
    let session = BoardSession::new(MemoryBoardStore::new(state), session_config);
    if session.store().state().scene(&options.scene).is_none() {
        return Err(format!("scene '{}' not found", options.scene));
    }

    let cells = session.render_fog_cells(&options.scene, &view);
    let summary = session.fog_summary(&options.scene, &view).unwrap_or_default();
    write_line(
        stdout,
        &format!(
            "scene={} role={} fog={} grid={} paint={} revealed={} auto_revealed={}",
            options.scene,
            session.role().as_str(),
            if session.is_fog_enabled(&options.scene) {
                "on"
            } else {
                "off"
            },
            grid_size,
            cells.len(),
            summary.revealed,
            summary.auto_revealed
        ),
    )?;
    for cell in &cells {
        write_line(stdout, &cell.key())?;
    }
    Ok(())
}

fn write_line<W: Write>(stdout: &mut W, line: &str) -> Result<(), String> {
    writeln!(stdout, "{line}").map_err(|error| format!("failed to write output: {error}"))
}
