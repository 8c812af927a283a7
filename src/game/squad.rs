//! Squad Selection and Fighter Switching
//!
//! A squad is exactly three creatures keyed by creature id, plus the id of
//! the active fighter. The squad map is the only copy of each creature's
//! battle HP, so switching back to a creature always sees its damage.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::game::creature::{Creature, CreatureId};
use crate::game::roster::Player;

/// Creatures per squad.
pub const SQUAD_SIZE: usize = 3;

/// Squad selection errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SquadError {
    /// Player owns fewer creatures than a squad needs.
    #[error("roster has {owned} creatures, a squad needs {required}")]
    RosterTooSmall {
        /// Creatures owned.
        owned: usize,
        /// Creatures required.
        required: usize,
    },
    /// Fewer than three distinct creatures were chosen.
    #[error("selected {chosen} distinct creatures, need {required}")]
    Underselected {
        /// Distinct creatures chosen.
        chosen: usize,
        /// Creatures required.
        required: usize,
    },
}

/// Fighter switch errors. None of these end the prompt loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwitchError {
    /// Input is not an integer.
    #[error("not a valid id: {0:?}")]
    NotANumber(String),
    /// No squad member has this id.
    #[error("no squad member with id {0}")]
    UnknownId(CreatureId),
    /// The creature has fainted.
    #[error("creature {0} has fainted")]
    Fainted(CreatureId),
}

/// Parse a squad selection message into 1-based roster indices.
///
/// Tokens are whitespace-delimited. Tokens that are not integers or fall
/// outside `1..=max` are skipped; everything else is kept in order,
/// duplicates included.
pub fn parse_indices(input: &str, max: usize) -> Vec<usize> {
    input
        .split_whitespace()
        .filter_map(|token| token.parse::<usize>().ok())
        .filter(|&index| (1..=max).contains(&index))
        .collect()
}

/// Three creatures fighting for one gamer.
#[derive(Debug, Clone, PartialEq)]
pub struct Squad {
    members: BTreeMap<CreatureId, Creature>,
    /// Selection order, used for listings.
    order: Vec<CreatureId>,
    active: CreatureId,
}

impl Squad {
    /// Build a squad from exactly three distinct creatures.
    ///
    /// The first creature becomes the active fighter.
    pub fn new(creatures: Vec<Creature>) -> Result<Self, SquadError> {
        let mut members = BTreeMap::new();
        let mut order = Vec::with_capacity(SQUAD_SIZE);

        for creature in creatures {
            if order.len() == SQUAD_SIZE {
                break;
            }
            if members.contains_key(&creature.id) {
                continue;
            }
            order.push(creature.id);
            members.insert(creature.id, creature);
        }

        if order.len() < SQUAD_SIZE {
            return Err(SquadError::Underselected {
                chosen: order.len(),
                required: SQUAD_SIZE,
            });
        }

        Ok(Self {
            active: order[0],
            members,
            order,
        })
    }

    /// Build a squad from a player's selection message.
    ///
    /// The first three distinct creatures named by valid indices are taken.
    pub fn from_selection(player: &Player, input: &str) -> Result<Self, SquadError> {
        let owned = player.creatures.len();
        if owned < SQUAD_SIZE {
            return Err(SquadError::RosterTooSmall {
                owned,
                required: SQUAD_SIZE,
            });
        }

        let chosen = parse_indices(input, owned)
            .into_iter()
            .map(|index| player.creatures[index - 1].clone())
            .collect();

        Self::new(chosen)
    }

    /// The creature currently fighting.
    pub fn active(&self) -> &Creature {
        &self.members[&self.active]
    }

    /// Id of the creature currently fighting.
    pub fn active_id(&self) -> CreatureId {
        self.active
    }

    /// Look up a member by id.
    pub fn get(&self, id: CreatureId) -> Option<&Creature> {
        self.members.get(&id)
    }

    /// Members in selection order.
    pub fn members(&self) -> impl Iterator<Item = &Creature> {
        self.order.iter().filter_map(|id| self.members.get(id))
    }

    /// Mutable access to every member.
    pub fn members_mut(&mut self) -> impl Iterator<Item = &mut Creature> {
        self.members.values_mut()
    }

    /// Members still able to fight, in selection order.
    pub fn living(&self) -> Vec<&Creature> {
        self.members().filter(|c| !c.is_fainted()).collect()
    }

    /// True while any member can fight.
    pub fn has_living(&self) -> bool {
        self.members.values().any(|c| !c.is_fainted())
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always false for a constructed squad.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Validate a fighter-switch reply without changing the squad.
    pub fn choose_fighter(&self, input: &str) -> Result<CreatureId, SwitchError> {
        let trimmed = input.trim();
        let id: CreatureId = trimmed
            .parse()
            .map_err(|_| SwitchError::NotANumber(trimmed.to_string()))?;

        match self.members.get(&id) {
            None => Err(SwitchError::UnknownId(id)),
            Some(creature) if creature.is_fainted() => Err(SwitchError::Fainted(id)),
            Some(_) => Ok(id),
        }
    }

    /// Make a living member the active fighter.
    pub fn set_active(&mut self, id: CreatureId) -> Result<&Creature, SwitchError> {
        match self.members.get(&id) {
            None => Err(SwitchError::UnknownId(id)),
            Some(creature) if creature.is_fainted() => Err(SwitchError::Fainted(id)),
            Some(_) => {
                self.active = id;
                Ok(&self.members[&id])
            }
        }
    }

    /// Subtract damage from the active fighter and return its new state.
    pub fn damage_active(&mut self, damage: i32) -> &Creature {
        if let Some(fighter) = self.members.get_mut(&self.active) {
            fighter.hp -= damage;
        }
        self.active()
    }
}
