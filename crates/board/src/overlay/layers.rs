use std::collections::HashSet;

use sha2::{Digest, Sha256};

use super::{
    MaskPoint, MaskPolygon, OverlayConfig, OverlayError, OverlayLayer, DEFAULT_LAYER_PREFIX,
    MIN_POLYGON_POINTS,
};
use crate::coerce::round4;

const LAYER_ID_PREFIX: &str = "layer-";
const LAYER_ID_HEX_LEN: usize = 12;

pub fn default_layer_name(index: usize) -> String {
    format!("{DEFAULT_LAYER_PREFIX} {}", index + 1)
}

/// Returns `requested` (trimmed) if no existing name matches it ignoring case,
/// otherwise the first free `"<prefix> <n>"`, continuing from a trailing
/// numeric suffix when there is one.
pub fn ensure_unique_name<'a, I>(requested: &str, existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let taken: HashSet<String> = existing
        .into_iter()
        .map(|name| name.trim().to_lowercase())
        .collect();
    let requested = requested.trim();
    if !taken.contains(&requested.to_lowercase()) {
        return requested.to_string();
    }
    let (mut prefix, mut n) = match split_numeric_suffix(requested)
        .and_then(|(prefix, suffix)| Some((prefix, suffix.checked_add(1)?)))
    {
        Some(start) => start,
        None => (requested, 2),
    };
    loop {
        let candidate = format!("{prefix} {n}");
        if !taken.contains(&candidate.to_lowercase()) {
            return candidate;
        }
        match n.checked_add(1) {
            Some(next) => n = next,
            // Suffix space exhausted: number the whole name instead.
            None => (prefix, n) = (requested, 2),
        }
    }
}

fn split_numeric_suffix(name: &str) -> Option<(&str, u64)> {
    let (prefix, suffix) = name.rsplit_once(' ')?;
    let prefix = prefix.trim_end();
    if prefix.is_empty() || suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((prefix, suffix.parse().ok()?))
}

/// Derives `layer-<12 hex>` from the seed, position and name, re-salting until
/// `is_taken` accepts it.
pub(crate) fn allocate_layer_id(
    seed: &str,
    index: usize,
    name: &str,
    is_taken: impl Fn(&str) -> bool,
) -> String {
    let mut attempt: u32 = 0;
    loop {
        let mut hasher = Sha256::new();
        hasher.update(seed.as_bytes());
        hasher.update([0u8]);
        hasher.update((index as u64).to_le_bytes());
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(attempt.to_le_bytes());
        let digest = hasher.finalize();
        let mut id = String::from(LAYER_ID_PREFIX);
        id.push_str(&to_hex_lower(&digest)[..LAYER_ID_HEX_LEN]);
        if !is_taken(&id) {
            return id;
        }
        attempt = attempt.wrapping_add(1);
    }
}

fn to_hex_lower(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

/// Layer commands. Each one leaves the config rebuilt, so the aggregate
/// `map_url`, `mask` and `active_layer_id` always match the layer list.
impl OverlayConfig {
    /// Appends a layer and makes it active. A blank name falls back to
    /// `"Overlay <n>"`.
    pub fn add_layer(&mut self, seed: &str, requested_name: &str) -> OverlayLayer {
        let requested = requested_name.trim();
        let base_name = if requested.is_empty() {
            default_layer_name(self.layers.len())
        } else {
            requested.to_string()
        };
        let name = ensure_unique_name(&base_name, self.layer_names(None));
        let id = allocate_layer_id(seed, self.layers.len(), &name, |candidate| {
            self.layer(candidate).is_some()
        });
        let mut layer = OverlayLayer::new(id, name);
        if self.layers.is_empty() {
            // A base image kept from a layerless config goes to the first layer.
            layer.map_url = self.map_url.take();
        }
        self.layers.push(layer.clone());
        self.rebuild_with_active(Some(layer.id.clone()));
        layer
    }

    /// Renames a layer and returns the name actually stored.
    pub fn rename_layer(
        &mut self,
        layer_id: &str,
        requested_name: &str,
    ) -> Result<String, OverlayError> {
        let requested = requested_name.trim();
        if requested.is_empty() {
            return Err(OverlayError::EmptyLayerName);
        }
        let index = self.position(layer_id)?;
        let name = ensure_unique_name(requested, self.layer_names(Some(index)));
        self.layers[index].name = name.clone();
        self.rebuild();
        Ok(name)
    }

    pub fn delete_layer(&mut self, layer_id: &str) -> Result<OverlayLayer, OverlayError> {
        let index = self.position(layer_id)?;
        let removed = self.layers.remove(index);
        self.rebuild();
        Ok(removed)
    }

    /// Flips layer visibility and returns the new value.
    pub fn toggle_layer_visibility(&mut self, layer_id: &str) -> Result<bool, OverlayError> {
        let index = self.position(layer_id)?;
        let layer = &mut self.layers[index];
        layer.visible = !layer.visible;
        let visible = layer.visible;
        self.rebuild();
        Ok(visible)
    }

    /// Requests `layer_id` as active. A hidden layer does not stick; the
    /// returned id is the one actually active after the rebuild.
    pub fn set_active_layer(&mut self, layer_id: &str) -> Result<Option<String>, OverlayError> {
        self.position(layer_id)?;
        self.rebuild_with_active(Some(layer_id.to_string()));
        Ok(self.active_layer_id.clone())
    }

    pub fn set_layer_image(
        &mut self,
        layer_id: &str,
        url: Option<&str>,
    ) -> Result<(), OverlayError> {
        let index = self.position(layer_id)?;
        self.layers[index].map_url = url
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string);
        self.rebuild();
        Ok(())
    }

    /// Adds a polygon to `layer_id`, or to the active layer when `None`.
    /// Returns the layer's polygon count.
    pub fn add_mask_polygon(
        &mut self,
        layer_id: Option<&str>,
        points: &[MaskPoint],
    ) -> Result<usize, OverlayError> {
        let target = match layer_id {
            Some(id) => id.to_string(),
            None => self
                .active_layer_id
                .clone()
                .ok_or(OverlayError::NoActiveLayer)?,
        };
        let index = self.position(&target)?;
        let points: Vec<MaskPoint> = points
            .iter()
            .filter(|point| point.column.is_finite() && point.row.is_finite())
            .map(|point| MaskPoint {
                column: round4(point.column),
                row: round4(point.row),
            })
            .collect();
        if points.len() < MIN_POLYGON_POINTS {
            return Err(OverlayError::PolygonTooSmall {
                points: points.len(),
            });
        }
        let mask = &mut self.layers[index].mask;
        mask.polygons.push(MaskPolygon { points });
        let count = mask.polygons.len();
        self.rebuild();
        Ok(count)
    }

    /// Drops the layer's polygons and mask image.
    pub fn clear_layer_mask(&mut self, layer_id: &str) -> Result<(), OverlayError> {
        let index = self.position(layer_id)?;
        let mask = &mut self.layers[index].mask;
        mask.polygons.clear();
        mask.url = None;
        self.rebuild();
        Ok(())
    }

    pub fn set_layer_mask_visibility(
        &mut self,
        layer_id: &str,
        visible: bool,
    ) -> Result<(), OverlayError> {
        let index = self.position(layer_id)?;
        self.layers[index].mask.visible = visible;
        self.rebuild();
        Ok(())
    }

    /// Moves a layer to `to_index`, clamped to the list. Returns the final index.
    pub fn move_layer(&mut self, layer_id: &str, to_index: usize) -> Result<usize, OverlayError> {
        let from = self.position(layer_id)?;
        let layer = self.layers.remove(from);
        let to = to_index.min(self.layers.len());
        self.layers.insert(to, layer);
        self.rebuild();
        Ok(to)
    }

    fn position(&self, layer_id: &str) -> Result<usize, OverlayError> {
        self.layers
            .iter()
            .position(|layer| layer.id == layer_id)
            .ok_or_else(|| OverlayError::LayerNotFound {
                layer_id: layer_id.to_string(),
            })
    }

    fn layer_names(&self, skip: Option<usize>) -> impl Iterator<Item = &str> + '_ {
        self.layers
            .iter()
            .enumerate()
            .filter(move |(index, _)| Some(*index) != skip)
            .map(|(_, layer)| layer.name.as_str())
    }
}
