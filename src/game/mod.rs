//! Battle Rules
//!
//! All battle logic. 100% deterministic, no I/O.
//!
//! ## Module Structure
//!
//! - `creature`: Creature records and profile text
//! - `roster`: Player records and the Roster Store
//! - `squad`: Squad selection and fighter switching
//! - `combat`: Attack mode, damage, initiative
//! - `experience`: Experience distribution with cap
//! - `state`: Turn state machine
//! - `events`: Battle transcript

pub mod combat;
pub mod creature;
pub mod events;
pub mod experience;
pub mod roster;
pub mod squad;
pub mod state;

// Re-export key types
pub use combat::{compute_damage, AttackMode, AttackReport};
pub use creature::{Creature, CreatureId};
pub use events::{BattleEvent, BattleEventData};
pub use experience::{distribute_experience, ExperienceAward};
pub use roster::{Player, RosterError, RosterStore};
pub use squad::{Squad, SquadError, SwitchError, SQUAD_SIZE};
pub use state::{BattleResult, BattleState, Combatant, EndReason, Slot, TurnPhase};
