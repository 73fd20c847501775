mod layers;
mod normalize;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use layers::{default_layer_name, ensure_unique_name};
pub use normalize::{normalize_mask, normalize_overlay};

pub const DEFAULT_LAYER_PREFIX: &str = "Overlay";
pub const MIN_POLYGON_POINTS: usize = 3;

/// Mask vertex in grid units; fractional values address positions inside a cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MaskPoint {
    pub column: f64,
    pub row: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MaskPolygon {
    pub points: Vec<MaskPoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OverlayMask {
    pub visible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub polygons: Vec<MaskPolygon>,
}

impl OverlayMask {
    pub fn visible_empty() -> Self {
        Self {
            visible: true,
            url: None,
            polygons: Vec::new(),
        }
    }

    pub fn has_content(&self) -> bool {
        self.url.is_some() || !self.polygons.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayLayer {
    pub id: String,
    pub name: String,
    pub visible: bool,
    pub map_url: Option<String>,
    pub mask: OverlayMask,
}

impl OverlayLayer {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            visible: true,
            map_url: None,
            mask: OverlayMask::visible_empty(),
        }
    }

    fn contributes(&self) -> bool {
        self.visible && self.mask.visible
    }
}

/// Per-scene overlay stack.
///
/// `map_url`, `mask` and `active_layer_id` are projections of `layers` and are
/// recomputed after every change; they have no setters. The one exception is a
/// config with no layers at all, which keeps a legacy flat `mapUrl`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayConfig {
    map_url: Option<String>,
    mask: OverlayMask,
    layers: Vec<OverlayLayer>,
    active_layer_id: Option<String>,
}

impl OverlayConfig {
    pub fn map_url(&self) -> Option<&str> {
        self.map_url.as_deref()
    }

    pub fn mask(&self) -> &OverlayMask {
        &self.mask
    }

    pub fn layers(&self) -> &[OverlayLayer] {
        &self.layers
    }

    pub fn active_layer_id(&self) -> Option<&str> {
        self.active_layer_id.as_deref()
    }

    pub fn layer(&self, layer_id: &str) -> Option<&OverlayLayer> {
        self.layers.iter().find(|layer| layer.id == layer_id)
    }

    pub fn active_layer(&self) -> Option<&OverlayLayer> {
        self.active_layer_id().and_then(|id| self.layer(id))
    }

    fn rebuild(&mut self) {
        let preferred = self.active_layer_id.take();
        self.rebuild_with_active(preferred);
    }

    fn rebuild_with_active(&mut self, preferred: Option<String>) {
        self.active_layer_id = resolve_active_layer_id(preferred.as_deref(), &self.layers);
        self.map_url = resolve_overlay_map_url(&self.layers, self.active_layer_id.as_deref());
        self.mask = rebuild_aggregate_mask(&self.layers);
    }
}

impl<'de> Deserialize<'de> for OverlayConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(normalize_overlay(&raw))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OverlayError {
    #[error("overlay command needs a scene id")]
    MissingScene,
    #[error("overlay layer not found: {layer_id}")]
    LayerNotFound { layer_id: String },
    #[error("no active overlay layer")]
    NoActiveLayer,
    #[error("overlay layer name cannot be empty")]
    EmptyLayerName,
    #[error("mask polygon needs at least {MIN_POLYGON_POINTS} points, got {points}")]
    PolygonTooSmall { points: usize },
}

/// Preferred id when it names a visible layer, else the first visible layer,
/// else the first layer.
pub fn resolve_active_layer_id(
    preferred: Option<&str>,
    layers: &[OverlayLayer],
) -> Option<String> {
    let with_id = || layers.iter().filter(|layer| !layer.id.is_empty());
    if let Some(preferred) = preferred {
        if with_id().any(|layer| layer.id == preferred && layer.visible) {
            return Some(preferred.to_string());
        }
    }
    with_id()
        .find(|layer| layer.visible)
        .or_else(|| with_id().next())
        .map(|layer| layer.id.clone())
}

/// Active layer image, else the first visible layer with an image, else the
/// first layer with an image.
pub fn resolve_overlay_map_url(
    layers: &[OverlayLayer],
    active_layer_id: Option<&str>,
) -> Option<String> {
    let active = active_layer_id
        .and_then(|id| layers.iter().find(|layer| layer.id == id))
        .and_then(|layer| layer.map_url.clone());
    active
        .or_else(|| {
            layers
                .iter()
                .filter(|layer| layer.visible)
                .find_map(|layer| layer.map_url.clone())
        })
        .or_else(|| layers.iter().find_map(|layer| layer.map_url.clone()))
}

/// Concatenates the polygons of every contributing layer. No geometric union
/// is performed.
pub fn rebuild_aggregate_mask(layers: &[OverlayLayer]) -> OverlayMask {
    let mut aggregate = OverlayMask::default();
    for layer in layers.iter().filter(|layer| layer.contributes()) {
        aggregate.visible = true;
        if aggregate.url.is_none() {
            aggregate.url = layer.mask.url.clone();
        }
        aggregate
            .polygons
            .extend(layer.mask.polygons.iter().cloned());
    }
    aggregate
}
