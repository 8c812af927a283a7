//! Battle Events
//!
//! Transcript of everything that happened in a battle, in order.
//! Logged as JSON when the battle ends.

use serde::{Serialize, Deserialize};

use crate::game::combat::AttackReport;
use crate::game::creature::CreatureId;
use crate::game::state::EndReason;

/// Event data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BattleEventData {
    /// A turn began.
    TurnStarted {
        attacker: String,
        defender: String,
    },

    /// An attack landed.
    Attacked {
        attacker: String,
        report: AttackReport,
    },

    /// A creature fainted.
    Fainted {
        owner: String,
        creature_id: CreatureId,
        creature_name: String,
    },

    /// A gamer changed their active fighter.
    Switched {
        owner: String,
        creature_id: CreatureId,
        creature_name: String,
    },

    /// Experience went to the winner's squad.
    ExperienceAwarded {
        winner: String,
        share: i32,
    },

    /// Battle reached its terminal state.
    BattleEnded {
        winner: String,
        loser: String,
        reason: EndReason,
    },
}

/// A battle event stamped with the turn it happened on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BattleEvent {
    /// Turn number (1-based).
    pub turn: u32,
    /// Event data.
    pub data: BattleEventData,
}

impl BattleEvent {
    /// Create a new event.
    pub fn new(turn: u32, data: BattleEventData) -> Self {
        Self { turn, data }
    }

    /// True for the last event of a battle.
    pub fn is_terminal(&self) -> bool {
        matches!(self.data, BattleEventData::BattleEnded { .. })
    }
}
