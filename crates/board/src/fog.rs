use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::cells::{Cell, CellSet, RevealedCells};
use crate::coerce::parse_flag;
use crate::grid::GridBounds;
use crate::state::{BoardState, Placement, SceneId, TokenLibrary};

pub const ALLY_COMBAT_TEAM: &str = "ally";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ViewerRole {
    Gm,
    #[default]
    Player,
}

impl ViewerRole {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "gm" | "dm" => Some(Self::Gm),
            "player" => Some(Self::Player),
            _ => None,
        }
    }

    pub fn is_gm(self) -> bool {
        matches!(self, Self::Gm)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gm => "gm",
            Self::Player => "player",
        }
    }
}

/// Per-scene fog record. `enabled == false` means fog is not drawn at all;
/// the revealed set is kept for the next time it is switched on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FogState {
    pub enabled: bool,
    pub revealed_cells: RevealedCells,
}

impl FogState {
    pub fn from_value(raw: &Value) -> Self {
        Self {
            enabled: parse_flag(raw.get("enabled"), false),
            revealed_cells: raw
                .get("revealedCells")
                .map(RevealedCells::from_value)
                .unwrap_or_default(),
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Single mutation path for revealed cells. Returns how many cells changed.
    pub fn apply_cell_change<I>(&mut self, cells: I, reveal: bool) -> usize
    where
        I: IntoIterator<Item = Cell>,
    {
        let mut changed = 0;
        for cell in cells {
            let did_change = if reveal {
                self.revealed_cells.add(cell)
            } else {
                self.revealed_cells.remove(cell)
            };
            if did_change {
                changed += 1;
            }
        }
        changed
    }

    pub fn reveal_all(&mut self, bounds: GridBounds) -> usize {
        self.apply_cell_change(bounds.cells(), true)
    }

    pub fn conceal_all(&mut self) -> usize {
        let changed = self.revealed_cells.len();
        self.revealed_cells.clear();
        changed
    }
}

impl<'de> Deserialize<'de> for FogState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&raw))
    }
}

/// Case-insensitive, whitespace-collapsed folder name.
pub fn normalize_folder_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Cells covered by a placement. Fractional positions are floored, the
/// footprint is at least one cell, and cells left of or above the origin are
/// dropped.
pub fn placement_footprint(placement: &Placement) -> CellSet {
    let mut cells = CellSet::new();
    let (Some(col), Some(row)) = (
        footprint_origin(placement.column),
        footprint_origin(placement.row),
    ) else {
        return cells;
    };
    let width = footprint_extent(placement.width);
    let height = footprint_extent(placement.height);
    for dy in 0..height {
        for dx in 0..width {
            let (c, r) = (col + dx, row + dy);
            if c < 0 || r < 0 || c > u32::MAX as i64 || r > u32::MAX as i64 {
                continue;
            }
            cells.insert(Cell::new(c as u32, r as u32));
        }
    }
    cells
}

const MAX_FOOTPRINT_CELLS: f64 = 64.0;

/// Floored origin, or `None` when no cell of the footprint can land in `u32`
/// space.
fn footprint_origin(raw: f64) -> Option<i64> {
    if !raw.is_finite() {
        return None;
    }
    let floored = raw.floor();
    if floored <= -MAX_FOOTPRINT_CELLS || floored > u32::MAX as f64 {
        return None;
    }
    Some(floored as i64)
}

fn footprint_extent(raw: f64) -> i64 {
    if !raw.is_finite() {
        return 1;
    }
    raw.round().clamp(1.0, MAX_FOOTPRINT_CELLS) as i64
}

fn player_folder_ids<'a>(tokens: &'a TokenLibrary, wanted: &str) -> HashSet<&'a str> {
    tokens
        .folders
        .iter()
        .filter(|folder| normalize_folder_name(&folder.name) == wanted)
        .map(|folder| folder.id.as_str())
        .collect()
}

/// Token ids whose owning folder is the player-visible folder, by folder id
/// or by inline folder name.
fn player_token_ids<'a>(
    tokens: &'a TokenLibrary,
    folder_ids: &HashSet<&str>,
    wanted: &str,
) -> HashSet<&'a str> {
    tokens
        .items
        .iter()
        .filter(|item| {
            let by_id = item
                .folder_id
                .as_deref()
                .is_some_and(|id| folder_ids.contains(id));
            let by_inline_name = item
                .folder
                .as_ref()
                .is_some_and(|folder| normalize_folder_name(&folder.name) == wanted);
            by_id || by_inline_name
        })
        .map(|item| item.id.as_str())
        .collect()
}

/// Cells treated as revealed because a player-folder token or an ally
/// occupies them. The two triggers are independent.
pub fn pc_auto_revealed(
    placements: &[Placement],
    tokens: &TokenLibrary,
    player_folder_name: &str,
) -> CellSet {
    let wanted = normalize_folder_name(player_folder_name);
    let folder_ids = player_folder_ids(tokens, &wanted);
    let player_tokens = player_token_ids(tokens, &folder_ids, &wanted);
    let mut cells = CellSet::new();
    for placement in placements {
        // A placement's own folder id covers tokens missing from the library.
        let in_player_folder = player_tokens.contains(placement.token_id.as_str())
            || placement
                .folder_id
                .as_deref()
                .is_some_and(|id| folder_ids.contains(id));
        let is_ally = placement
            .combat_team
            .as_deref()
            .is_some_and(|team| team.trim().eq_ignore_ascii_case(ALLY_COMBAT_TEAM));
        if in_player_folder || is_ally {
            cells.extend(placement_footprint(placement));
        }
    }
    cells
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FogSummary {
    pub total: u64,
    pub revealed: u64,
    pub auto_revealed: u64,
    pub concealed: u64,
}

/// Read-only fog view of one scene with the auto-reveal set already computed.
#[derive(Debug, Clone)]
pub struct SceneFog<'a> {
    fog: Option<&'a FogState>,
    auto_revealed: CellSet,
}

impl<'a> SceneFog<'a> {
    pub fn resolve(state: &'a BoardState, scene_id: &SceneId, player_folder_name: &str) -> Self {
        let fog = state
            .scene(scene_id)
            .and_then(|scene| scene.fog_of_war.as_ref());
        let auto_revealed = pc_auto_revealed(
            state.placements_for(scene_id),
            &state.tokens,
            player_folder_name,
        );
        Self { fog, auto_revealed }
    }

    pub fn fog_state(&self) -> Option<&'a FogState> {
        self.fog
    }

    pub fn is_enabled(&self) -> bool {
        self.fog.is_some_and(|fog| fog.enabled)
    }

    pub fn pc_auto_revealed(&self) -> &CellSet {
        &self.auto_revealed
    }

    pub fn is_revealed(&self, cell: Cell) -> bool {
        self.fog.is_some_and(|fog| fog.revealed_cells.has(cell))
            || self.auto_revealed.contains(&cell)
    }

    /// Gameplay gate. The GM is never fogged; with fog off nothing is.
    pub fn is_hidden_for(&self, role: ViewerRole, cell: Cell) -> bool {
        if role.is_gm() || !self.is_enabled() {
            return false;
        }
        !self.is_revealed(cell)
    }

    /// Snapshot for repeated queries within one frame. `None` when fog is off
    /// or the viewer is the GM.
    pub fn checker(&self, role: ViewerRole) -> Option<FogChecker> {
        if role.is_gm() || !self.is_enabled() {
            return None;
        }
        let revealed = self
            .fog
            .map(|fog| fog.revealed_cells.as_set().clone())
            .unwrap_or_default();
        Some(FogChecker {
            revealed,
            auto_revealed: self.auto_revealed.clone(),
        })
    }

    /// Cells inside `bounds` that are neither revealed nor auto-revealed.
    pub fn concealed_cells(&self, bounds: GridBounds) -> CellSet {
        bounds.cells().filter(|cell| !self.is_revealed(*cell)).collect()
    }

    pub fn summary(&self, bounds: GridBounds) -> FogSummary {
        let mut summary = FogSummary {
            total: bounds.cell_count(),
            ..FogSummary::default()
        };
        for cell in bounds.cells() {
            if self.fog.is_some_and(|fog| fog.revealed_cells.has(cell)) {
                summary.revealed += 1;
            } else if self.auto_revealed.contains(&cell) {
                summary.auto_revealed += 1;
            } else {
                summary.concealed += 1;
            }
        }
        summary
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FogChecker {
    revealed: CellSet,
    auto_revealed: CellSet,
}

impl FogChecker {
    pub fn is_hidden(&self, col: u32, row: u32) -> bool {
        let cell = Cell::new(col, row);
        !self.revealed.contains(&cell) && !self.auto_revealed.contains(&cell)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::grid::GridConfig;
    use crate::state::{InlineFolder, TokenFolder, TokenItem};

    fn scene_id() -> SceneId {
        SceneId::from("scene-1")
    }

    fn board_with_fog(revealed: &[Cell], enabled: bool) -> BoardState {
        let mut state = BoardState::default();
        let fog = state.ensure_scene(&scene_id(), GridConfig::default()).fog_mut();
        fog.set_enabled(enabled);
        fog.apply_cell_change(revealed.iter().copied(), true);
        state
    }

    fn ally(token_id: &str, column: f64, row: f64, size: f64) -> Placement {
        Placement {
            width: size,
            height: size,
            combat_team: Some("ally".to_string()),
            ..Placement::new(token_id, column, row)
        }
    }

    #[test]
    fn folder_names_match_ignoring_case_and_spacing() {
        assert_eq!(
            normalize_folder_name("  Player   Characters "),
            normalize_folder_name("player characters")
        );
    }

    #[test]
    fn ally_placement_reveals_full_footprint() {
        let cells = pc_auto_revealed(&[ally("t1", 5.0, 5.0, 2.0)], &TokenLibrary::default(), "PCs");
        let expected: CellSet = [
            Cell::new(5, 5),
            Cell::new(5, 6),
            Cell::new(6, 5),
            Cell::new(6, 6),
        ]
        .into_iter()
        .collect();
        assert_eq!(cells, expected);
    }

    #[test]
    fn player_folder_membership_reveals_without_combat_team() {
        let tokens = TokenLibrary {
            folders: vec![
                TokenFolder {
                    id: "f-pc".into(),
                    name: " player  characters".into(),
                },
                TokenFolder {
                    id: "f-npc".into(),
                    name: "Villains".into(),
                },
            ],
            items: vec![
                TokenItem {
                    id: "hero".into(),
                    name: None,
                    folder_id: Some("f-pc".into()),
                    folder: None,
                },
                TokenItem {
                    id: "legacy-hero".into(),
                    name: None,
                    folder_id: None,
                    folder: Some(InlineFolder {
                        name: "PLAYER CHARACTERS".into(),
                    }),
                },
                TokenItem {
                    id: "orc".into(),
                    name: None,
                    folder_id: Some("f-npc".into()),
                    folder: None,
                },
            ],
        };
        let placements = vec![
            Placement::new("hero", 0.0, 0.0),
            Placement::new("legacy-hero", 3.0, 1.0),
            Placement::new("orc", 8.0, 8.0),
            Placement {
                combat_team: Some("enemy".into()),
                ..Placement::new("hero", 9.0, 9.0)
            },
        ];
        let cells = pc_auto_revealed(&placements, &tokens, "Player Characters");
        let expected: CellSet = [Cell::new(0, 0), Cell::new(3, 1), Cell::new(9, 9)]
            .into_iter()
            .collect();
        assert_eq!(cells, expected);
    }

    #[test]
    fn footprint_normalizes_odd_placements() {
        let mut placement = Placement::new("t", 1.7, -1.0);
        placement.width = 0.0;
        placement.height = 2.0;
        assert_eq!(
            placement_footprint(&placement).into_iter().collect::<Vec<_>>(),
            vec![Cell::new(1, 0)]
        );
        placement.column = f64::NAN;
        assert!(placement_footprint(&placement).is_empty());
    }

    #[test]
    fn far_away_placements_are_skipped_without_overflow() {
        let mut placement = Placement::new("t", 1e300, 0.0);
        placement.width = 2.0;
        assert!(placement_footprint(&placement).is_empty());

        placement.column = -1e300;
        assert!(placement_footprint(&placement).is_empty());

        let mut edge = Placement::new("t", u32::MAX as f64, 0.0);
        edge.width = 3.0;
        assert_eq!(
            placement_footprint(&edge).into_iter().collect::<Vec<_>>(),
            vec![Cell::new(u32::MAX, 0)]
        );

        let cells = pc_auto_revealed(
            &[ally("t", 1e300, 1e300, 4.0)],
            &TokenLibrary::default(),
            "PCs",
        );
        assert!(cells.is_empty());
    }

    #[test]
    fn placement_folder_id_counts_as_player_folder() {
        let tokens = TokenLibrary {
            folders: vec![TokenFolder {
                id: "f-pc".into(),
                name: "Player Characters".into(),
            }],
            items: Vec::new(),
        };
        let placements = vec![
            Placement {
                folder_id: Some("f-pc".into()),
                ..Placement::new("unlisted", 2.0, 2.0)
            },
            Placement {
                folder_id: Some("f-other".into()),
                ..Placement::new("stranger", 4.0, 4.0)
            },
        ];
        let cells = pc_auto_revealed(&placements, &tokens, "player characters");
        assert_eq!(cells.into_iter().collect::<Vec<_>>(), vec![Cell::new(2, 2)]);
    }

    #[test]
    fn apply_cell_change_counts_changed_cells() {
        let mut fog = FogState::default();
        let cells = [Cell::new(1, 1), Cell::new(2, 1)];
        assert_eq!(fog.apply_cell_change(cells, true), 2);
        assert_eq!(fog.apply_cell_change(cells, true), 0);
        assert!(fog.revealed_cells.has(Cell::new(2, 1)));
        assert_eq!(fog.apply_cell_change([Cell::new(2, 1)], false), 1);
        assert!(!fog.revealed_cells.has(Cell::new(2, 1)));
        assert!(fog.revealed_cells.has(Cell::new(1, 1)));
    }

    #[test]
    fn disabling_keeps_revealed_cells() {
        let mut fog = FogState::default();
        fog.set_enabled(true);
        fog.apply_cell_change([Cell::new(4, 4)], true);
        fog.set_enabled(false);
        fog.set_enabled(true);
        assert!(fog.revealed_cells.has(Cell::new(4, 4)));
    }

    #[test]
    fn reveal_all_and_conceal_all() {
        let mut fog = FogState::default();
        let bounds = GridBounds {
            columns: 3,
            rows: 2,
        };
        assert_eq!(fog.reveal_all(bounds), 6);
        assert_eq!(fog.conceal_all(), 6);
        assert!(fog.revealed_cells.is_empty());
    }

    #[test]
    fn visibility_is_union_of_revealed_and_auto_revealed() {
        let mut state = board_with_fog(&[Cell::new(2, 3)], true);
        state
            .placements
            .insert(scene_id(), vec![ally("t1", 5.0, 5.0, 2.0)]);
        let fog = SceneFog::resolve(&state, &scene_id(), "PCs");
        let bounds = GridBounds {
            columns: 10,
            rows: 10,
        };
        for cell in bounds.cells() {
            let expected = fog
                .fog_state()
                .is_some_and(|f| f.revealed_cells.has(cell))
                || fog.pc_auto_revealed().contains(&cell);
            assert_eq!(fog.is_revealed(cell), expected, "{cell}");
        }
        assert_eq!(fog.concealed_cells(bounds).len(), 95);
        assert_eq!(
            fog.summary(bounds),
            FogSummary {
                total: 100,
                revealed: 1,
                auto_revealed: 4,
                concealed: 95
            }
        );
    }

    #[test]
    fn gm_is_never_fogged() {
        let state = board_with_fog(&[], true);
        let fog = SceneFog::resolve(&state, &scene_id(), "PCs");
        assert!(!fog.is_hidden_for(ViewerRole::Gm, Cell::new(0, 0)));
        assert!(fog.is_hidden_for(ViewerRole::Player, Cell::new(0, 0)));
        assert!(fog.checker(ViewerRole::Gm).is_none());
    }

    #[test]
    fn checker_snapshots_visibility_and_is_absent_when_disabled() {
        let state = board_with_fog(&[Cell::new(1, 0)], true);
        let fog = SceneFog::resolve(&state, &scene_id(), "PCs");
        let checker = fog.checker(ViewerRole::Player).expect("checker");
        assert!(!checker.is_hidden(1, 0));
        assert!(checker.is_hidden(0, 0));

        let state = board_with_fog(&[], false);
        let fog = SceneFog::resolve(&state, &scene_id(), "PCs");
        assert!(fog.checker(ViewerRole::Player).is_none());
        assert!(!fog.is_hidden_for(ViewerRole::Player, Cell::new(0, 0)));
    }

    #[test]
    fn missing_scene_has_no_fog() {
        let state = BoardState::default();
        let fog = SceneFog::resolve(&state, &scene_id(), "PCs");
        assert!(!fog.is_enabled());
        assert!(fog.fog_state().is_none());
    }

    #[test]
    fn fog_state_normalization_is_idempotent() {
        for raw in [
            json!({"enabled": 1, "revealedCells": {"1,1": true, "oops": true, "2,-2": true}}),
            json!({"enabled": "no", "revealedCells": ["3,3", "3,3", "x"]}),
            json!(null),
            json!({"revealedCells": 5}),
        ] {
            let once = FogState::from_value(&raw);
            let encoded = serde_json::to_value(&once).expect("encode");
            let twice = FogState::from_value(&encoded);
            assert_eq!(once, twice);
        }
    }
}
