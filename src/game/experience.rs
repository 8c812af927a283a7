//! Experience Distribution
//!
//! The winner's squad splits experience drawn from the loser's squad.
//! There is no leveling: experience is capped at each creature's base exp.

use serde::{Serialize, Deserialize};

use crate::game::creature::CreatureId;
use crate::game::squad::Squad;

/// Experience change for one winning creature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperienceGain {
    /// Creature id.
    pub id: CreatureId,
    /// Experience before the award.
    pub before: i32,
    /// Experience after the award and cap.
    pub after: i32,
}

/// Result of one distribution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperienceAward {
    /// Sum of the loser squad's current exp.
    pub pool: i64,
    /// Amount offered to each winning creature.
    pub share: i32,
    /// Per-creature outcome, in winner selection order.
    pub gains: Vec<ExperienceGain>,
}

/// `pool / (3 * loser squad size)`, truncating, clamped to the `i32` range.
pub fn experience_share(pool: i64, loser_size: usize) -> i32 {
    let divisor = 3 * loser_size as i64;
    if divisor == 0 {
        return 0;
    }
    (pool / divisor).clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Award the winner's squad its share of the loser's experience.
pub fn distribute_experience(winner: &mut Squad, loser: &Squad) -> ExperienceAward {
    let pool: i64 = loser.members().map(|c| i64::from(c.current_exp)).sum();
    let share = experience_share(pool, loser.len());

    let order: Vec<CreatureId> = winner.members().map(|c| c.id).collect();
    let mut gains = Vec::with_capacity(order.len());

    for creature in winner.members_mut() {
        let before = creature.current_exp;
        creature.current_exp = before.saturating_add(share).min(creature.base_exp);
        gains.push(ExperienceGain {
            id: creature.id,
            before,
            after: creature.current_exp,
        });
    }

    gains.sort_by_key(|g| order.iter().position(|id| *id == g.id));

    ExperienceAward { pool, share, gains }
}
