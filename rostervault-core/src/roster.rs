/*!
Roster payload types.

The engine never looks inside a snapshot; these types exist for callers that
store a team roster and want old records upgraded on the way in.
*/

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Number of slots in a fresh team
pub const TEAM_SIZE: usize = 6;

/// Zoom applied when a record carries none
pub const DEFAULT_ZOOM: f64 = 1.5;

/// Ball a slot was caught in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pokeball {
    #[default]
    Pokeball,
    Superball,
    Sanaball,
}

/// Where a slot is kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoxKind {
    #[default]
    Team,
    Other,
    Graveyard,
}

/// One roster slot
///
/// Deserialization accepts the legacy shape too: a single `zoom` fills both
/// zoom fields and a missing `box` means the slot is on the team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawSlot")]
pub struct TeamSlot {
    pub id: String,
    /// Species data, kept as-is
    pub pokemon: Option<Value>,
    pub nickname: String,
    pub level: u32,
    pub ability: String,
    pub pokeball: Pokeball,
    pub animated: bool,
    pub static_zoom: f64,
    pub animated_zoom: f64,
    pub place: String,
    #[serde(rename = "box")]
    pub box_kind: BoxKind,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSlot {
    id: String,
    #[serde(default)]
    pokemon: Option<Value>,
    #[serde(default)]
    nickname: String,
    #[serde(default = "default_level")]
    level: u32,
    #[serde(default)]
    ability: String,
    #[serde(default)]
    pokeball: Pokeball,
    #[serde(default)]
    animated: bool,
    static_zoom: Option<f64>,
    animated_zoom: Option<f64>,
    zoom: Option<f64>,
    #[serde(default)]
    place: String,
    #[serde(rename = "box", default)]
    box_kind: Option<BoxKind>,
}

fn default_level() -> u32 {
    1
}

/// Zero means "unset" in records written by older versions
fn zoom_or(primary: Option<f64>, legacy: Option<f64>) -> f64 {
    [primary, legacy]
        .into_iter()
        .flatten()
        .find(|zoom| *zoom != 0.0)
        .unwrap_or(DEFAULT_ZOOM)
}

impl From<RawSlot> for TeamSlot {
    fn from(raw: RawSlot) -> Self {
        Self {
            static_zoom: zoom_or(raw.static_zoom, raw.zoom),
            animated_zoom: zoom_or(raw.animated_zoom, raw.zoom),
            id: raw.id,
            pokemon: raw.pokemon,
            nickname: raw.nickname,
            level: raw.level,
            ability: raw.ability,
            pokeball: raw.pokeball,
            animated: raw.animated,
            place: raw.place,
            box_kind: raw.box_kind.unwrap_or_default(),
        }
    }
}

impl TeamSlot {
    /// An unoccupied slot with the given id
    pub fn empty<S: Into<String>>(id: S) -> Self {
        Self {
            id: id.into(),
            pokemon: None,
            nickname: String::new(),
            level: 1,
            ability: String::new(),
            pokeball: Pokeball::Pokeball,
            animated: false,
            static_zoom: DEFAULT_ZOOM,
            animated_zoom: DEFAULT_ZOOM,
            place: String::new(),
            box_kind: BoxKind::Team,
        }
    }
}

/// Six empty slots, `slot-0` to `slot-5`
pub fn default_team() -> Vec<TeamSlot> {
    (0..TEAM_SIZE)
        .map(|index| TeamSlot::empty(format!("slot-{index}")))
        .collect()
}

/// Decode a team, upgrading legacy slots; anything unreadable yields the default team
pub fn migrate_legacy_team(json: &str) -> Vec<TeamSlot> {
    serde_json::from_str(json).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "legacy team unreadable, starting from an empty team");
        default_team()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_team() {
        let team = default_team();
        assert_eq!(team.len(), 6);
        assert_eq!(team[0].id, "slot-0");
        assert_eq!(team[5].id, "slot-5");
        assert!(team.iter().all(|slot| slot.pokemon.is_none()));
        assert!(team.iter().all(|slot| slot.box_kind == BoxKind::Team));
    }

    #[test]
    fn test_legacy_slot_is_upgraded() {
        let legacy = json!([{
            "id": "slot-0",
            "pokemon": null,
            "nickname": "Test",
            "level": 10,
            "ability": "overgrow",
            "pokeball": "pokeball",
            "animated": false,
            "zoom": 2,
            "place": "route-1"
        }])
        .to_string();

        let team = migrate_legacy_team(&legacy);
        assert_eq!(team[0].static_zoom, 2.0);
        assert_eq!(team[0].animated_zoom, 2.0);
        assert_eq!(team[0].box_kind, BoxKind::Team);
        assert_eq!(team[0].nickname, "Test");
    }

    #[test]
    fn test_current_fields_win_over_legacy_zoom() {
        let slot: TeamSlot = serde_json::from_value(json!({
            "id": "slot-1",
            "staticZoom": 1.2,
            "animatedZoom": 0,
            "zoom": 3,
            "box": "graveyard"
        }))
        .unwrap();

        assert_eq!(slot.static_zoom, 1.2);
        assert_eq!(slot.animated_zoom, 3.0);
        assert_eq!(slot.box_kind, BoxKind::Graveyard);
        assert_eq!(slot.level, 1);
    }

    #[test]
    fn test_serializes_with_current_field_names() {
        let value = serde_json::to_value(TeamSlot::empty("slot-2")).unwrap();
        assert_eq!(value["staticZoom"], json!(1.5));
        assert_eq!(value["box"], json!("team"));
        assert!(value.get("zoom").is_none());
        assert!(value.get("boxKind").is_none());
    }

    #[test]
    fn test_unreadable_legacy_team_falls_back_to_default() {
        assert_eq!(migrate_legacy_team("not-json"), default_team());
    }
}
