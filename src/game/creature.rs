//! Creature Records
//!
//! A captured creature with its base stats and progression, exactly as
//! stored in the roster file.

use serde::{Serialize, Deserialize};

/// Creature identifier, unique within a player's roster.
pub type CreatureId = u32;

/// A captured creature.
///
/// Field names follow the roster file format. `hp` is the only stat the
/// battle engine lowers; `current_exp` is only raised by experience
/// distribution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Creature {
    /// Roster-unique id.
    pub id: CreatureId,
    /// Species name.
    pub name: String,
    /// Type tags, in roster order.
    #[serde(rename = "type", default)]
    pub types: Vec<String>,
    /// Experience cap.
    pub base_exp: i32,
    /// Current hit points. May go negative after a hit.
    pub hp: i32,
    /// Effort value yield.
    #[serde(default)]
    pub ev: f64,
    /// Level.
    #[serde(default)]
    pub level: u32,
    /// Accumulated experience, never above `base_exp` after a battle.
    #[serde(default)]
    pub current_exp: i32,
    /// Decides who attacks first.
    pub speed: i32,
    /// Normal attack power.
    pub attack: i32,
    /// Normal attack resistance.
    pub defense: i32,
    /// Special attack power.
    pub special_atk: i32,
    /// Special attack resistance.
    pub special_def: i32,
}

impl Creature {
    /// A creature has fainted once its HP reaches zero or below.
    #[inline]
    pub fn is_fainted(&self) -> bool {
        self.hp <= 0
    }

    /// Two-line stat block shown to players.
    pub fn profile(&self) -> String {
        format!(
            "Name: {} | Type: [{}] | Base Exp: {} | HP: {} | EV: {:.1} | Level: {} | Current Exp: {}\n\
             Speed: {} | Attack: {} | Defense: {} | Special Atk: {} | Special Def: {}\n",
            self.name,
            self.types.join(" "),
            self.base_exp,
            self.hp,
            self.ev,
            self.level,
            self.current_exp,
            self.speed,
            self.attack,
            self.defense,
            self.special_atk,
            self.special_def,
        )
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Creature with every combat stat set to `stat`.
    pub fn creature(id: CreatureId, name: &str, hp: i32, stat: i32) -> Creature {
        Creature {
            id,
            name: name.to_string(),
            types: vec!["Normal".to_string()],
            base_exp: 100,
            hp,
            ev: 1.0,
            level: 5,
            current_exp: 0,
            speed: stat,
            attack: stat,
            defense: stat,
            special_atk: stat,
            special_def: stat,
        }
    }
}
