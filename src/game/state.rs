//! Battle State Machine
//!
//! Pure turn logic for one pair of gamers. The network coordinator reads
//! [`BattleState::phase`] and calls the matching transition, doing any
//! prompting in between; nothing here performs I/O.
//!
//! ```text
//! TurnStart -> ChooseAttack -> ResolveDamage -> CheckFaint
//!     ^                                          |        |
//!     |                            fainted       |        | survived
//!     |                          SwitchFighter <-+        +-> OfferSwitch
//!     |                                 |                      |
//!     +--- SwapRoles <--- CheckWinner <-+----------------------+
//!                              |
//!                              +--> Ended (defender has no living fighter)
//! ```

use serde::{Serialize, Deserialize};

use crate::core::rng::DeterministicRng;
use crate::game::combat::{initiative, resolve_attack, AttackMode, AttackReport};
use crate::game::creature::{Creature, CreatureId};
use crate::game::events::{BattleEvent, BattleEventData};
use crate::game::experience::{distribute_experience, ExperienceAward};
use crate::game::squad::{Squad, SwitchError};

// =============================================================================
// SLOTS
// =============================================================================

/// One of the two fixed positions in a battle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    /// First gamer of the claimed pair.
    First,
    /// Second gamer of the claimed pair.
    Second,
}

impl Slot {
    /// The opposing slot.
    #[inline]
    pub fn other(self) -> Self {
        match self {
            Slot::First => Slot::Second,
            Slot::Second => Slot::First,
        }
    }

    /// Array index for this slot.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Slot::First => 0,
            Slot::Second => 1,
        }
    }
}

/// A gamer's battle-side data.
#[derive(Clone, Debug, PartialEq)]
pub struct Combatant {
    /// Player name.
    pub name: String,
    /// Chosen squad.
    pub squad: Squad,
}

impl Combatant {
    /// Create a combatant.
    pub fn new(name: impl Into<String>, squad: Squad) -> Self {
        Self { name: name.into(), squad }
    }

    /// Active fighter.
    pub fn fighter(&self) -> &Creature {
        self.squad.active()
    }
}

// =============================================================================
// PHASES
// =============================================================================

/// Where the battle is within a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnPhase {
    /// Announce the turn.
    TurnStart,
    /// Flip for attack mode.
    ChooseAttack,
    /// Apply damage with the chosen mode.
    ResolveDamage(AttackMode),
    /// Did the defender's fighter faint?
    CheckFaint,
    /// Defender must pick a living fighter.
    SwitchFighter,
    /// Attacker may swap fighters.
    OfferSwitch,
    /// Does the defender have anyone left?
    CheckWinner,
    /// Exchange attacker and defender.
    SwapRoles,
    /// Terminal.
    Ended,
}

/// How a battle ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Loser has no living fighter.
    Knockout,
    /// Loser stopped answering prompts.
    Forfeit,
}

/// Terminal result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleResult {
    /// Winning slot.
    pub winner: Slot,
    /// How it ended.
    pub reason: EndReason,
    /// Only present for knockouts.
    pub experience: Option<ExperienceAward>,
}

// =============================================================================
// BATTLE STATE
// =============================================================================

/// State of one battle.
#[derive(Clone, Debug)]
pub struct BattleState {
    sides: [Combatant; 2],
    attacker: Slot,
    turn: u32,
    phase: TurnPhase,
    result: Option<BattleResult>,
    events: Vec<BattleEvent>,
}

impl BattleState {
    /// Set up a battle. The faster active fighter attacks on turn one.
    pub fn new(first: Combatant, second: Combatant) -> Self {
        let attacker = initiative(&first.squad, &second.squad);
        Self {
            sides: [first, second],
            attacker,
            turn: 1,
            phase: TurnPhase::TurnStart,
            result: None,
            events: Vec::new(),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Current turn number (1-based).
    pub fn turn(&self) -> u32 {
        self.turn
    }

    /// Slot attacking this turn.
    pub fn attacker_slot(&self) -> Slot {
        self.attacker
    }

    /// Slot defending this turn.
    pub fn defender_slot(&self) -> Slot {
        self.attacker.other()
    }

    /// Side in a slot.
    pub fn side(&self, slot: Slot) -> &Combatant {
        &self.sides[slot.index()]
    }

    /// Attacking side.
    pub fn attacker(&self) -> &Combatant {
        self.side(self.attacker_slot())
    }

    /// Defending side.
    pub fn defender(&self) -> &Combatant {
        self.side(self.defender_slot())
    }

    /// Terminal result, once ended.
    pub fn result(&self) -> Option<&BattleResult> {
        self.result.as_ref()
    }

    /// Event transcript so far.
    pub fn events(&self) -> &[BattleEvent] {
        &self.events
    }

    /// Consume the state, returning both sides and the transcript.
    pub fn into_parts(self) -> ([Combatant; 2], Option<BattleResult>, Vec<BattleEvent>) {
        (self.sides, self.result, self.events)
    }

    fn record(&mut self, data: BattleEventData) {
        self.events.push(BattleEvent::new(self.turn, data));
    }

    /// TurnStart -> ChooseAttack.
    pub fn begin_turn(&mut self) {
        debug_assert_eq!(self.phase, TurnPhase::TurnStart);
        let data = BattleEventData::TurnStarted {
            attacker: self.attacker().name.clone(),
            defender: self.defender().name.clone(),
        };
        self.record(data);
        self.phase = TurnPhase::ChooseAttack;
    }

    /// ChooseAttack -> ResolveDamage.
    pub fn choose_attack(&mut self, rng: &mut DeterministicRng) -> AttackMode {
        debug_assert_eq!(self.phase, TurnPhase::ChooseAttack);
        let mode = AttackMode::roll(rng);
        self.phase = TurnPhase::ResolveDamage(mode);
        mode
    }

    /// ResolveDamage -> CheckFaint.
    pub fn resolve_attack(&mut self, mode: AttackMode) -> AttackReport {
        let (attacker, defender) = self.split_mut();
        let report = resolve_attack(&attacker.squad, &mut defender.squad, mode);

        let data = BattleEventData::Attacked {
            attacker: self.attacker().name.clone(),
            report: report.clone(),
        };
        self.record(data);

        if report.fainted {
            let data = BattleEventData::Fainted {
                owner: self.defender().name.clone(),
                creature_id: report.target_id,
                creature_name: report.target_name.clone(),
            };
            self.record(data);
        }

        self.phase = TurnPhase::CheckFaint;
        report
    }

    /// CheckFaint -> SwitchFighter or OfferSwitch. Returns true if the
    /// defender's fighter fainted.
    pub fn check_faint(&mut self) -> bool {
        let fainted = self.defender().fighter().is_fainted();
        self.phase = if fainted {
            TurnPhase::SwitchFighter
        } else {
            TurnPhase::OfferSwitch
        };
        fainted
    }

    /// Change a side's active fighter.
    pub fn switch_fighter(&mut self, slot: Slot, id: CreatureId) -> Result<&Creature, SwitchError> {
        self.sides[slot.index()].squad.set_active(id)?;

        let side = &self.sides[slot.index()];
        let data = BattleEventData::Switched {
            owner: side.name.clone(),
            creature_id: id,
            creature_name: side.fighter().name.clone(),
        };
        self.record(data);

        Ok(self.sides[slot.index()].fighter())
    }

    /// SwitchFighter/OfferSwitch -> CheckWinner.
    pub fn finish_switching(&mut self) {
        self.phase = TurnPhase::CheckWinner;
    }

    /// CheckWinner -> Ended or SwapRoles. Returns the result if the
    /// defender has no living fighter left.
    pub fn check_winner(&mut self) -> Option<BattleResult> {
        if self.defender().squad.has_living() {
            self.phase = TurnPhase::SwapRoles;
            return None;
        }
        let winner = self.attacker_slot();
        Some(self.conclude(winner, EndReason::Knockout))
    }

    /// SwapRoles -> TurnStart. Exchanges the slots' roles and advances the turn.
    pub fn swap_roles(&mut self) {
        self.attacker = self.attacker.other();
        self.turn += 1;
        self.phase = TurnPhase::TurnStart;
    }

    /// End the battle because `slot` stopped responding.
    pub fn forfeit(&mut self, slot: Slot) -> BattleResult {
        self.conclude(slot.other(), EndReason::Forfeit)
    }

    /// Any phase -> Ended. Knockouts distribute experience exactly once.
    fn conclude(&mut self, winner: Slot, reason: EndReason) -> BattleResult {
        if let Some(result) = &self.result {
            return result.clone();
        }

        let experience = match reason {
            EndReason::Knockout => {
                let (winning, losing) = self.pair_mut(winner);
                Some(distribute_experience(&mut winning.squad, &losing.squad))
            }
            EndReason::Forfeit => None,
        };

        if let Some(award) = &experience {
            let data = BattleEventData::ExperienceAwarded {
                winner: self.side(winner).name.clone(),
                share: award.share,
            };
            self.record(data);
        }

        let data = BattleEventData::BattleEnded {
            winner: self.side(winner).name.clone(),
            loser: self.side(winner.other()).name.clone(),
            reason,
        };
        self.record(data);

        let result = BattleResult { winner, reason, experience };
        self.result = Some(result.clone());
        self.phase = TurnPhase::Ended;
        result
    }

    /// (attacker, defender) as mutable references.
    fn split_mut(&mut self) -> (&Combatant, &mut Combatant) {
        let (first, second) = self.sides.split_at_mut(1);
        match self.attacker {
            Slot::First => (&first[0], &mut second[0]),
            Slot::Second => (&second[0], &mut first[0]),
        }
    }

    /// (slot, other slot) as mutable references.
    fn pair_mut(&mut self, slot: Slot) -> (&mut Combatant, &mut Combatant) {
        let (first, second) = self.sides.split_at_mut(1);
        match slot {
            Slot::First => (&mut first[0], &mut second[0]),
            Slot::Second => (&mut second[0], &mut first[0]),
        }
    }
}
