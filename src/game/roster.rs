//! Roster Store
//!
//! Immutable player data loaded once at startup. Nothing in the battle
//! engine writes back to the roster file.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::info;

use crate::game::creature::Creature;

/// A registered player and every creature they own.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Player {
    /// Numeric id from the roster file.
    pub id: u32,
    /// Login name (primary key).
    pub name: String,
    /// Full owned roster, in file order.
    #[serde(rename = "pokemon_list", default)]
    pub creatures: Vec<Creature>,
}

/// Roster loading errors.
#[derive(Debug, Error)]
pub enum RosterError {
    /// Roster file could not be read.
    #[error("failed to read roster file: {0}")]
    Io(#[from] std::io::Error),
    /// Roster file is not valid JSON for a list of players.
    #[error("failed to parse roster: {0}")]
    Parse(#[from] serde_json::Error),
    /// Two records share a name.
    #[error("duplicate player name in roster: {0}")]
    DuplicatePlayer(String),
}

/// Read-only lookup of players by name.
#[derive(Debug, Default)]
pub struct RosterStore {
    players: BTreeMap<String, Player>,
}

impl RosterStore {
    /// Build a store from already-parsed players.
    pub fn from_players(players: Vec<Player>) -> Result<Self, RosterError> {
        let mut map = BTreeMap::new();
        for player in players {
            if map.contains_key(&player.name) {
                return Err(RosterError::DuplicatePlayer(player.name));
            }
            map.insert(player.name.clone(), player);
        }
        Ok(Self { players: map })
    }

    /// Parse a JSON array of player records.
    pub fn from_json(json: &str) -> Result<Self, RosterError> {
        let players: Vec<Player> = serde_json::from_str(json)?;
        Self::from_players(players)
    }

    /// Load the roster file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RosterError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let store = Self::from_json(&json)?;
        info!("Loaded {} players from {}", store.len(), path.display());
        Ok(store)
    }

    /// Look up a player by name.
    pub fn get(&self, name: &str) -> Option<&Player> {
        self.players.get(name)
    }

    /// Number of players.
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// True when no players are loaded.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::game::creature::fixtures::creature;

    /// Player owning creatures with ids `first_id..first_id + count`.
    pub fn player(name: &str, first_id: u32, count: u32, hp: i32, stat: i32) -> Player {
        Player {
            id: first_id,
            name: name.to_string(),
            creatures: (0..count)
                .map(|i| creature(first_id + i, &format!("{}-mon-{}", name, i + 1), hp, stat))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROSTER: &str = r#"[
        {"id": 1, "name": "ash", "pokemon_list": [
            {"id": 1, "name": "Pikachu", "type": ["Electric"], "base_exp": 112,
             "hp": 35, "ev": 2.0, "level": 12, "current_exp": 40, "speed": 90,
             "attack": 55, "defense": 40, "special_atk": 50, "special_def": 50}
        ]},
        {"id": 2, "name": "misty", "pokemon_list": []}
    ]"#;

    #[test]
    fn test_from_json() {
        let store = RosterStore::from_json(ROSTER).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("ash").unwrap().creatures[0].name, "Pikachu");
        assert!(store.get("brock").is_none());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let json = r#"[{"id": 1, "name": "ash"}, {"id": 2, "name": "ash"}]"#;
        let result = RosterStore::from_json(json);
        assert!(matches!(result, Err(RosterError::DuplicatePlayer(name)) if name == "ash"));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            RosterStore::from_json("{not json"),
            Err(RosterError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = RosterStore::load("/nonexistent/pokebat/player.json");
        assert!(matches!(result, Err(RosterError::Io(_))));
    }

    #[test]
    fn test_load_from_disk() {
        let path = std::env::temp_dir().join(format!("pokebat-roster-{}.json", std::process::id()));
        std::fs::write(&path, ROSTER).unwrap();

        let store = RosterStore::load(&path).unwrap();
        assert_eq!(store.len(), 2);

        std::fs::remove_file(&path).ok();
    }
}
