//! Canonicalization of stored overlay records.
//!
//! Accepts the current layered shape, the `items` alias for `layers`, and the
//! legacy flat `{mapUrl, mask, name, visible}` shape. Output always passes back
//! through unchanged.

use std::collections::HashSet;

use serde_json::Value;

use super::layers::{allocate_layer_id, default_layer_name, ensure_unique_name};
use super::{MaskPoint, MaskPolygon, OverlayConfig, OverlayLayer, OverlayMask, MIN_POLYGON_POINTS};
use crate::coerce::{finite_number, parse_flag, round4, trimmed_string};

/// Mask from any stored value. Non-objects become a visible empty mask.
pub fn normalize_mask(raw: &Value) -> OverlayMask {
    if !raw.is_object() {
        return OverlayMask::visible_empty();
    }
    let polygons = raw
        .get("polygons")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(normalize_polygon).collect())
        .unwrap_or_default();
    OverlayMask {
        visible: parse_flag(raw.get("visible"), true),
        url: trimmed_string(raw.get("url")),
        polygons,
    }
}

/// Polygon from `{points: [...]}` or a bare point array. Invalid points are
/// dropped first; fewer than three survivors drops the polygon.
fn normalize_polygon(raw: &Value) -> Option<MaskPolygon> {
    let entries = match raw {
        Value::Array(points) => points,
        Value::Object(_) => raw.get("points")?.as_array()?,
        _ => return None,
    };
    let points: Vec<MaskPoint> = entries.iter().filter_map(normalize_point).collect();
    if points.len() < MIN_POLYGON_POINTS {
        return None;
    }
    Some(MaskPolygon { points })
}

fn normalize_point(raw: &Value) -> Option<MaskPoint> {
    let column = ["column", "col", "x"]
        .iter()
        .find_map(|key| finite_number(raw.get(*key)))?;
    let row = ["row", "y"]
        .iter()
        .find_map(|key| finite_number(raw.get(*key)))?;
    Some(MaskPoint {
        column: round4(column),
        row: round4(row),
    })
}

fn raw_layer_id(raw: &Value) -> Option<String> {
    match raw.get("id")? {
        Value::Number(number) => Some(number.to_string()),
        other => trimmed_string(Some(other)),
    }
}

fn normalize_layer(raw: &Value, index: usize, layers: &[OverlayLayer]) -> OverlayLayer {
    let requested_name =
        trimmed_string(raw.get("name")).unwrap_or_else(|| default_layer_name(index));
    let name = ensure_unique_name(&requested_name, layers.iter().map(|layer| layer.name.as_str()));

    let taken: HashSet<&str> = layers.iter().map(|layer| layer.id.as_str()).collect();
    let id = match raw_layer_id(raw) {
        Some(id) if !taken.contains(id.as_str()) => id,
        _ => allocate_layer_id("", index, &name, |candidate| taken.contains(candidate)),
    };

    OverlayLayer {
        id,
        name,
        visible: parse_flag(raw.get("visible"), true),
        map_url: trimmed_string(raw.get("mapUrl")),
        mask: raw
            .get("mask")
            .map(normalize_mask)
            .unwrap_or_else(OverlayMask::visible_empty),
    }
}

/// Canonical overlay config from any stored shape.
pub fn normalize_overlay(raw: &Value) -> OverlayConfig {
    let base_map_url = trimmed_string(raw.get("mapUrl"));
    let preferred_active = trimmed_string(raw.get("activeLayerId"));

    let entries = raw
        .get("layers")
        .and_then(Value::as_array)
        .or_else(|| raw.get("items").and_then(Value::as_array));
    let mut layers: Vec<OverlayLayer> = Vec::new();
    for (index, entry) in entries.into_iter().flatten().enumerate() {
        if !entry.is_object() {
            continue;
        }
        let layer = normalize_layer(entry, index, &layers);
        layers.push(layer);
    }

    if let Some(url) = base_map_url.as_deref() {
        attach_base_map_url(&mut layers, url, preferred_active.as_deref());
    }

    if layers.is_empty() {
        if let Some(layer) = legacy_layer(raw, base_map_url.as_deref()) {
            layers.push(layer);
        }
    }

    let mut config = OverlayConfig {
        layers,
        ..OverlayConfig::default()
    };
    config.rebuild_with_active(preferred_active);
    if config.layers.is_empty() {
        config.map_url = base_map_url;
    }
    config
}

/// Gives a top-level `mapUrl` that no layer owns to the preferred layer (or the
/// first one) when that layer has no image of its own.
fn attach_base_map_url(layers: &mut [OverlayLayer], url: &str, preferred: Option<&str>) {
    if layers
        .iter()
        .any(|layer| layer.map_url.as_deref() == Some(url))
    {
        return;
    }
    let target = preferred
        .and_then(|id| layers.iter().position(|layer| layer.id == id))
        .unwrap_or(0);
    if let Some(layer) = layers.get_mut(target) {
        if layer.map_url.is_none() {
            layer.map_url = Some(url.to_string());
        }
    }
}

/// Single layer synthesized from the flat legacy shape, when it carries
/// anything worth keeping.
fn legacy_layer(raw: &Value, base_map_url: Option<&str>) -> Option<OverlayLayer> {
    let mask = raw
        .get("mask")
        .map(normalize_mask)
        .unwrap_or_else(OverlayMask::visible_empty);
    let has_layer_fields = raw.get("name").is_some() || raw.get("visible").is_some();
    if !mask.has_content() && !has_layer_fields {
        return None;
    }
    let name = trimmed_string(raw.get("name")).unwrap_or_else(|| default_layer_name(0));
    let id = trimmed_string(raw.get("id"))
        .unwrap_or_else(|| allocate_layer_id("", 0, &name, |_| false));
    Some(OverlayLayer {
        id,
        name,
        visible: parse_flag(raw.get("visible"), true),
        map_url: base_map_url.map(str::to_string),
        mask,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::overlay::resolve_overlay_map_url;

    fn round_trip(config: &OverlayConfig) -> OverlayConfig {
        let encoded = serde_json::to_value(config).expect("encode");
        normalize_overlay(&encoded)
    }

    #[test]
    fn legacy_flat_overlay_becomes_one_layer() {
        let raw = json!({
            "mapUrl": "u",
            "mask": {"visible": true, "polygons": [[
                {"column": 0, "row": 0},
                {"column": 1, "row": 0},
                {"column": 0, "row": 1}
            ]]}
        });
        let config = normalize_overlay(&raw);
        assert_eq!(config.layers().len(), 1);
        let layer = &config.layers()[0];
        assert_eq!(layer.map_url.as_deref(), Some("u"));
        assert_eq!(layer.mask.polygons.len(), 1);
        assert_eq!(layer.name, "Overlay 1");
        assert!(layer.id.starts_with("layer-"));
        assert_eq!(config.active_layer_id(), Some(layer.id.as_str()));
        assert_eq!(config.map_url(), Some("u"));
        assert_eq!(config.mask().polygons.len(), 1);
        assert!(config.mask().visible);
    }

    #[test]
    fn legacy_mask_url_survives_dropped_polygon() {
        let config = normalize_overlay(&json!({
            "mapUrl": "a.png",
            "mask": {"url": "m.png", "polygons": [{"points": [{"x": 1, "y": 1}, {"x": 2, "y": 2}]}]}
        }));
        assert_eq!(config.layers().len(), 1);
        let mask = &config.layers()[0].mask;
        assert!(mask.polygons.is_empty());
        assert_eq!(mask.url.as_deref(), Some("m.png"));
        assert_eq!(
            resolve_overlay_map_url(config.layers(), config.active_layer_id()),
            Some("a.png".to_string())
        );
    }

    #[test]
    fn flat_url_without_mask_content_keeps_legacy_map_url() {
        let config = normalize_overlay(&json!({"mapUrl": " only.png "}));
        assert!(config.layers().is_empty());
        assert_eq!(config.map_url(), Some("only.png"));
        assert_eq!(config.active_layer_id(), None);
        assert_eq!(round_trip(&config), config);
    }

    #[test]
    fn legacy_name_or_visible_forces_a_layer() {
        let config = normalize_overlay(&json!({"name": "Roof", "visible": "off"}));
        assert_eq!(config.layers().len(), 1);
        assert_eq!(config.layers()[0].name, "Roof");
        assert!(!config.layers()[0].visible);
        assert!(!config.mask().visible);
    }

    #[test]
    fn items_alias_and_non_object_entries() {
        let config = normalize_overlay(&json!({
            "items": [3, {"id": "a", "name": "First"}, "junk", {"id": "b"}]
        }));
        let names: Vec<&str> = config.layers().iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["First", "Overlay 4"]);
    }

    #[test]
    fn duplicate_ids_and_names_are_repaired() {
        let config = normalize_overlay(&json!({
            "layers": [
                {"id": "a", "name": "Map"},
                {"id": "a", "name": "map"},
                {"id": "  ", "name": "Map"}
            ]
        }));
        let ids: HashSet<&str> = config.layers().iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(config.layers()[0].id, "a");
        let names: Vec<&str> = config.layers().iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Map", "map 2", "Map 3"]);
    }

    #[test]
    fn top_level_map_url_attaches_to_preferred_layer() {
        let config = normalize_overlay(&json!({
            "mapUrl": "base.png",
            "activeLayerId": "b",
            "layers": [{"id": "a"}, {"id": "b"}]
        }));
        assert_eq!(config.layers()[0].map_url, None);
        assert_eq!(config.layers()[1].map_url.as_deref(), Some("base.png"));
        assert_eq!(config.active_layer_id(), Some("b"));
        assert_eq!(config.map_url(), Some("base.png"));

        let owned = normalize_overlay(&json!({
            "mapUrl": "base.png",
            "layers": [{"id": "a", "mapUrl": "x.png"}, {"id": "b", "mapUrl": "base.png"}]
        }));
        assert_eq!(owned.layers()[0].map_url.as_deref(), Some("x.png"));
        assert_eq!(owned.map_url(), Some("x.png"));
    }

    #[test]
    fn hidden_preferred_layer_is_not_active() {
        let config = normalize_overlay(&json!({
            "activeLayerId": "a",
            "layers": [{"id": "a", "visible": false}, {"id": "b"}]
        }));
        assert_eq!(config.active_layer_id(), Some("b"));
    }

    #[test]
    fn mask_points_accept_aliases_and_drop_bad_points() {
        let mask = normalize_mask(&json!({
            "visible": "no",
            "url": "  ",
            "polygons": [
                {"points": [{"x": "1.23456", "y": 2}, {"col": 3, "row": 4}, {"column": 5, "row": "6"}]},
                [{"column": 0, "row": 0}, {"column": "nan", "row": 1}, {"column": 1, "row": 1}],
                "nonsense"
            ]
        }));
        assert!(!mask.visible);
        assert_eq!(mask.url, None);
        assert_eq!(mask.polygons.len(), 1);
        assert_eq!(
            mask.polygons[0].points[0],
            MaskPoint {
                column: 1.2346,
                row: 2.0
            }
        );
        assert_eq!(normalize_mask(&json!(null)), OverlayMask::visible_empty());
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in [
            json!({"mapUrl": "u", "mask": {"url": "m.png", "polygons": []}}),
            json!({"layers": [
                {"id": "a", "name": "One", "mapUrl": "1.png", "mask": {"polygons": [
                    [{"x": 0, "y": 0}, {"x": 2, "y": 0}, {"x": 0, "y": 2}]
                ]}},
                {"id": "a", "name": "one", "visible": 0}
            ], "activeLayerId": "a"}),
            json!({"items": [{"name": "Solo"}], "mapUrl": "base.png"}),
            json!({"name": "Flat"}),
            json!({"layers": [
                {"name": "Map 2"}, {"name": "map 2"}, {"name": "Map 3"}, {"name": "MAP"}
            ]}),
            json!({"layers": [
                {"name": "Map 18446744073709551615"},
                {"name": "map 18446744073709551615"}
            ]}),
            json!({"mapUrl": "only-base.png"}),
            json!({}),
            json!("not an object"),
        ] {
            let once = normalize_overlay(&raw);
            let twice = round_trip(&once);
            assert_eq!(once, twice, "{raw}");
        }
    }

    #[test]
    fn suffixed_duplicate_names_are_renumbered() {
        let config = normalize_overlay(&json!({"layers": [
            {"name": "Map 2"}, {"name": "map 2"}, {"name": "Map 3"}
        ]}));
        let names: Vec<&str> = config.layers().iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["Map 2", "map 3", "Map 4"]);

        let config = normalize_overlay(&json!({"layers": [
            {"name": "Map 18446744073709551615"},
            {"name": "map 18446744073709551615"}
        ]}));
        assert_eq!(config.layers().len(), 2);
        assert_eq!(config.layers()[1].name, "map 18446744073709551615 2");
    }

    #[test]
    fn deserialize_goes_through_normalization() {
        let config: OverlayConfig =
            serde_json::from_value(json!({"items": [{"name": " Attic "}]})).expect("decode");
        assert_eq!(config.layers()[0].name, "Attic");
        assert!(config.active_layer_id().is_some());
    }
}
