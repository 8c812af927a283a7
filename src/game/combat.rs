//! Combat Resolution
//!
//! Attack mode selection, the damage formula, and turn-one initiative.

use serde::{Serialize, Deserialize};

use crate::core::rng::DeterministicRng;
use crate::game::creature::{Creature, CreatureId};
use crate::game::squad::Squad;
use crate::game::state::Slot;

/// Every hit deals at least this much.
pub const MIN_DAMAGE: i32 = 1;

/// Which stat pair an attack uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackMode {
    /// Attack against Defense.
    Normal,
    /// Special Atk against Special Def.
    Special,
}

impl AttackMode {
    /// Uniform coin flip, independent per turn.
    pub fn roll(rng: &mut DeterministicRng) -> Self {
        if rng.coin_flip() {
            AttackMode::Special
        } else {
            AttackMode::Normal
        }
    }

    /// Word used in narration.
    pub fn label(self) -> &'static str {
        match self {
            AttackMode::Normal => "normal",
            AttackMode::Special => "special",
        }
    }
}

/// Damage dealt by `attacker` to `defender` in the given mode.
///
/// `max(1, attack stat - defense stat)`.
#[inline]
pub fn compute_damage(attacker: &Creature, defender: &Creature, mode: AttackMode) -> i32 {
    let (power, resistance) = match mode {
        AttackMode::Normal => (attacker.attack, defender.defense),
        AttackMode::Special => (attacker.special_atk, defender.special_def),
    };
    power.saturating_sub(resistance).max(MIN_DAMAGE)
}

/// Result of one attack.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackReport {
    /// Mode used.
    pub mode: AttackMode,
    /// Attacking creature.
    pub attacker_id: CreatureId,
    /// Attacking creature's name.
    pub attacker_name: String,
    /// Defending creature.
    pub target_id: CreatureId,
    /// Defending creature's name.
    pub target_name: String,
    /// Damage dealt.
    pub damage: i32,
    /// Target HP after the hit.
    pub remaining_hp: i32,
    /// Target fainted from this hit.
    pub fainted: bool,
}

/// Hit the defender's active fighter with the attacker's active fighter.
///
/// The new HP is stored in the defender's squad under the target's id.
pub fn resolve_attack(attacker: &Squad, defender: &mut Squad, mode: AttackMode) -> AttackReport {
    let striker = attacker.active();
    let damage = compute_damage(striker, defender.active(), mode);
    let target = defender.damage_active(damage);

    AttackReport {
        mode,
        attacker_id: striker.id,
        attacker_name: striker.name.clone(),
        target_id: target.id,
        target_name: target.name.clone(),
        damage,
        remaining_hp: target.hp,
        fainted: target.is_fainted(),
    }
}

/// Which slot attacks on turn one.
///
/// Higher active-fighter Speed wins; exact ties go to the first slot.
pub fn initiative(first: &Squad, second: &Squad) -> Slot {
    if second.active().speed > first.active().speed {
        Slot::Second
    } else {
        Slot::First
    }
}
