use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fog::FogState;
use crate::grid::GridConfig;
use crate::overlay::OverlayConfig;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneId(pub String);

impl SceneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SceneId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shared board document. Only `scene_state` is written by this crate;
/// placements and the token library are read-only inputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardState {
    #[serde(default)]
    pub scene_state: BTreeMap<SceneId, SceneState>,
    #[serde(default)]
    pub placements: BTreeMap<SceneId, Vec<Placement>>,
    #[serde(default)]
    pub tokens: TokenLibrary,
}

impl BoardState {
    pub fn scene(&self, scene_id: &SceneId) -> Option<&SceneState> {
        self.scene_state.get(scene_id)
    }

    pub fn scene_mut(&mut self, scene_id: &SceneId) -> Option<&mut SceneState> {
        self.scene_state.get_mut(scene_id)
    }

    /// Returns the scene record, creating it with `grid` when absent.
    pub fn ensure_scene(&mut self, scene_id: &SceneId, grid: GridConfig) -> &mut SceneState {
        self.scene_state
            .entry(scene_id.clone())
            .or_insert_with(|| SceneState::new(grid))
    }

    pub fn placements_for(&self, scene_id: &SceneId) -> &[Placement] {
        self.placements
            .get(scene_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneState {
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fog_of_war: Option<FogState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay: Option<OverlayConfig>,
}

impl SceneState {
    pub fn new(grid: GridConfig) -> Self {
        Self {
            grid,
            fog_of_war: None,
            overlay: None,
        }
    }

    /// Fog record, created empty and disabled on first use.
    pub fn fog_mut(&mut self) -> &mut FogState {
        self.fog_of_war.get_or_insert_with(FogState::default)
    }

    pub fn overlay_mut(&mut self) -> &mut OverlayConfig {
        self.overlay.get_or_insert_with(OverlayConfig::default)
    }
}

/// Token occupancy on a scene, in grid cells. Position and footprint arrive as
/// plain numbers and are normalized where they are consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub token_id: String,
    #[serde(default)]
    pub column: f64,
    #[serde(default)]
    pub row: f64,
    #[serde(default = "default_footprint")]
    pub width: f64,
    #[serde(default = "default_footprint")]
    pub height: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combat_team: Option<String>,
    /// Folder of the placed token, for tokens the library does not list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
}

fn default_footprint() -> f64 {
    1.0
}

impl Placement {
    pub fn new(token_id: impl Into<String>, column: f64, row: f64) -> Self {
        Self {
            token_id: token_id.into(),
            column,
            row,
            width: 1.0,
            height: 1.0,
            combat_team: None,
            folder_id: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenLibrary {
    #[serde(default)]
    pub folders: Vec<TokenFolder>,
    #[serde(default)]
    pub items: Vec<TokenItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenFolder {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    /// Inline folder reference carried by older token records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<InlineFolder>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineFolder {
    #[serde(default)]
    pub name: String,
}
