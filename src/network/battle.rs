//! Battle Coordinator
//!
//! Runs one claimed pair to completion. Each iteration reads the
//! [`BattleState`] phase, narrates it to both peers, prompts where the
//! phase needs an answer, and applies the matching transition.
//!
//! Pacing delays are plain `sleep`s between narration steps. No lock is
//! held across them. A side whose prompt times out or whose link closes
//! forfeits.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::core::rng::DeterministicRng;
use crate::game::combat::AttackMode;
use crate::game::creature::Creature;
use crate::game::events::BattleEvent;
use crate::game::experience::ExperienceAward;
use crate::game::squad::SwitchError;
use crate::game::state::{BattleResult, BattleState, Combatant, EndReason, Slot, TurnPhase};
use crate::network::protocol::ServerMessage;
use crate::network::session::Gamer;
use crate::network::transport::{LinkError, PeerLink};

/// Line separating narration blocks.
pub const DIVIDER: &str = "________________________";

/// Timing knobs for a battle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BattleConfig {
    /// Delay after each profile dump of an attack.
    pub pacing: Duration,
    /// Delay after the damage report.
    pub result_pause: Duration,
    /// Limit on each prompt. `None` waits forever.
    pub prompt_timeout: Option<Duration>,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            pacing: Duration::from_secs(2),
            result_pause: Duration::from_secs(3),
            prompt_timeout: None,
        }
    }
}

impl BattleConfig {
    /// No pacing delays, same timeout.
    pub fn without_pacing(mut self) -> Self {
        self.pacing = Duration::ZERO;
        self.result_pause = Duration::ZERO;
        self
    }
}

/// What a finished battle reports.
#[derive(Debug, Clone, Serialize)]
pub struct BattleOutcome {
    /// Battle identifier.
    pub battle_id: Uuid,
    /// Winner name.
    pub winner: String,
    /// Loser name.
    pub loser: String,
    /// How it ended.
    pub reason: EndReason,
    /// Turn on which it ended.
    pub turns: u32,
    /// Experience award (knockouts only).
    pub experience: Option<ExperienceAward>,
    /// Winner's squad after experience distribution.
    pub winner_squad: Vec<Creature>,
    /// Full transcript.
    pub events: Vec<BattleEvent>,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// End time.
    pub ended_at: DateTime<Utc>,
}

/// One running battle.
pub struct Battle {
    id: Uuid,
    state: BattleState,
    links: [PeerLink; 2],
    rng: DeterministicRng,
    config: BattleConfig,
}

impl Battle {
    /// Pair two gamers. `first` takes [`Slot::First`] and wins Speed ties.
    pub fn new(id: Uuid, first: Gamer, second: Gamer, config: BattleConfig) -> Self {
        let rng = DeterministicRng::for_battle(id.as_bytes(), &[&first.name, &second.name]);
        let state = BattleState::new(
            Combatant::new(first.name, first.squad),
            Combatant::new(second.name, second.squad),
        );

        Self {
            id,
            state,
            links: [first.link, second.link],
            rng,
            config,
        }
    }

    /// Battle identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current state.
    pub fn state(&self) -> &BattleState {
        &self.state
    }

    /// Short id for logs.
    fn tag(&self) -> String {
        hex::encode(&self.id.as_bytes()[..4])
    }

    /// Run to the terminal state.
    #[instrument(skip(self), fields(battle = %self.tag()))]
    pub async fn run(mut self) -> BattleOutcome {
        let started_at = Utc::now();
        info!(
            "Battle started: {} vs {}",
            self.state.side(Slot::First).name,
            self.state.side(Slot::Second).name
        );

        self.broadcast("Two players connected. The battle is starting!").await;

        let result = loop {
            if let Some(result) = self.step().await {
                break result;
            }
        };

        self.announce_result(&result).await;

        let tag = self.tag();
        let turns = self.state.turn();
        let (sides, _, events) = self.state.into_parts();
        let [first, second] = sides;
        let (winner, loser) = match result.winner {
            Slot::First => (first, second),
            Slot::Second => (second, first),
        };

        let outcome = BattleOutcome {
            battle_id: self.id,
            winner: winner.name,
            loser: loser.name,
            reason: result.reason,
            turns,
            experience: result.experience,
            winner_squad: winner.squad.members().cloned().collect(),
            events,
            started_at,
            ended_at: Utc::now(),
        };

        info!(
            "Battle {} ended on turn {}: {} beat {} ({:?})",
            tag, outcome.turns, outcome.winner, outcome.loser, outcome.reason
        );
        match serde_json::to_string(&outcome) {
            Ok(json) => debug!("Battle summary: {}", json),
            Err(e) => warn!("Failed to encode battle summary: {}", e),
        }

        outcome
    }

    /// Advance one phase. Returns the result once the battle has ended.
    async fn step(&mut self) -> Option<BattleResult> {
        match self.state.phase() {
            TurnPhase::TurnStart => {
                self.announce_turn().await;
                self.state.begin_turn();
            }
            TurnPhase::ChooseAttack => {
                self.state.choose_attack(&mut self.rng);
            }
            TurnPhase::ResolveDamage(mode) => {
                self.resolve(mode).await;
            }
            TurnPhase::CheckFaint => {
                if self.state.check_faint() {
                    self.announce_faint().await;
                }
            }
            TurnPhase::SwitchFighter => {
                let slot = self.state.defender_slot();
                if let Err(e) = self.switch_fighter(slot).await {
                    return Some(self.forfeit(slot, e));
                }
                self.state.finish_switching();
            }
            TurnPhase::OfferSwitch => {
                let slot = self.state.attacker_slot();
                if let Err(e) = self.offer_switch(slot).await {
                    return Some(self.forfeit(slot, e));
                }
                self.state.finish_switching();
            }
            TurnPhase::CheckWinner => return self.state.check_winner(),
            TurnPhase::SwapRoles => self.state.swap_roles(),
            TurnPhase::Ended => return self.state.result().cloned(),
        }
        None
    }

    // =========================================================================
    // NARRATION
    // =========================================================================

    async fn announce_turn(&self) {
        self.broadcast(DIVIDER).await;
        let banner = format!("Turn {}, attacker {}:", self.state.turn(), self.state.attacker().name);
        self.broadcast(&banner).await;
    }

    async fn resolve(&mut self, mode: AttackMode) {
        let attacking = self.state.attacker().fighter().profile();
        let defending = self.state.defender().fighter().profile();

        self.broadcast("ATTACKING:").await;
        self.broadcast(&attacking).await;
        pause(self.config.pacing).await;

        self.broadcast("DEFENDING:").await;
        self.broadcast(&defending).await;
        pause(self.config.pacing).await;

        let report = self.state.resolve_attack(mode);
        debug!(
            "Turn {}: {} hit {} for {}",
            self.state.turn(),
            report.attacker_name,
            report.target_name,
            report.damage
        );

        self.broadcast(&format!("{} used a {} attack!", report.attacker_name, mode.label()))
            .await;
        self.broadcast(DIVIDER).await;
        self.broadcast(&format!("Damage dealt: {}", report.damage)).await;
        self.broadcast(&format!("{}'s HP: {}", report.target_name, report.remaining_hp))
            .await;
        pause(self.config.result_pause).await;

        let result = self.state.defender().fighter().profile();
        self.broadcast("Turn result:").await;
        self.broadcast(&result).await;
        self.broadcast(DIVIDER).await;
    }

    async fn announce_faint(&self) {
        let defender = self.state.defender();
        let notice = format!(
            "{}'s {} fainted! You have to switch your fighter!",
            defender.name,
            defender.fighter().name
        );
        self.send(self.state.defender_slot(), ServerMessage::Text(notice)).await;
        self.send(
            self.state.attacker_slot(),
            ServerMessage::text("The opponent's fighter fainted! Wait for them to switch the fighter!"),
        )
        .await;
    }

    async fn announce_result(&self, result: &BattleResult) {
        let winner = result.winner;
        let loser = winner.other();

        if result.reason == EndReason::Forfeit {
            let notice = format!("{} did not respond and forfeits.", self.state.side(loser).name);
            self.send(winner, ServerMessage::Text(notice)).await;
        }

        if let Some(award) = &result.experience {
            let notice = format!(
                "RECEIVE EXP: Each pokemon of {} will get {} bonus exp!",
                self.state.side(winner).name,
                award.share
            );
            self.send(winner, ServerMessage::Text(notice)).await;
        }

        self.send(winner, ServerMessage::text("END BATTLE: YOU WIN!!!")).await;
        self.send(loser, ServerMessage::text("END BATTLE: YOU LOST!!!")).await;
        self.broadcast("BATTLE ENDED!").await;
    }

    // =========================================================================
    // PROMPTS
    // =========================================================================

    /// List the living squad and ask until a valid living id arrives.
    /// Returns false without prompting if nobody is left.
    async fn switch_fighter(&mut self, slot: Slot) -> Result<bool, LinkError> {
        let listing: Vec<String> = self
            .state
            .side(slot)
            .squad
            .living()
            .iter()
            .map(|c| format!("{}. {}", c.id, c.profile()))
            .collect();

        if listing.is_empty() {
            self.send(slot, ServerMessage::text("You don't have any available fighter left!"))
                .await;
            return Ok(false);
        }

        for entry in listing {
            self.send(slot, ServerMessage::Text(entry)).await;
        }

        loop {
            let reply = self.prompt(slot, "Select your fighter by ID: ").await?;

            let choice = self.state.side(slot).squad.choose_fighter(&reply);
            let name = match choice.and_then(|id| self.state.switch_fighter(slot, id).map(|c| c.name.clone())) {
                Ok(name) => name,
                Err(SwitchError::NotANumber(_)) => {
                    self.send(
                        slot,
                        ServerMessage::BadInput("Invalid input. Please enter valid pokemon ID.".into()),
                    )
                    .await;
                    continue;
                }
                Err(_) => {
                    self.send(
                        slot,
                        ServerMessage::BadSelection(
                            "Invalid ID or your selected pokemon has fainted.".into(),
                        ),
                    )
                    .await;
                    continue;
                }
            };

            debug!("{} switched to {}", self.state.side(slot).name, name);
            self.send(slot, ServerMessage::Text(format!("Selected fighter: {}", name))).await;
            return Ok(true);
        }
    }

    /// Ask the attacker whether to switch. Anything but Y declines.
    async fn offer_switch(&mut self, slot: Slot) -> Result<(), LinkError> {
        let question = format!(
            "{}, do you want to switch your fighter? (Y/N)",
            self.state.side(slot).name
        );
        let reply = self.prompt(slot, &question).await?;
        if !reply.trim().eq_ignore_ascii_case("y") {
            return Ok(());
        }

        let notice = if self.switch_fighter(slot).await? {
            "You have switched your fighter."
        } else {
            "Failed to switch fighter. Continue with the current fighter."
        };
        self.send(slot, ServerMessage::text(notice)).await;
        Ok(())
    }

    fn forfeit(&mut self, slot: Slot, error: LinkError) -> BattleResult {
        warn!("{} forfeits: {}", self.state.side(slot).name, error);
        self.state.forfeit(slot)
    }

    // =========================================================================
    // LINKS
    // =========================================================================

    async fn prompt(&mut self, slot: Slot, question: &str) -> Result<String, LinkError> {
        self.send(slot, ServerMessage::text(question)).await;
        self.links[slot.index()].recv(self.config.prompt_timeout).await
    }

    async fn send(&self, slot: Slot, message: ServerMessage) {
        self.links[slot.index()].send(message).await;
    }

    async fn broadcast(&self, text: &str) {
        for link in &self.links {
            link.send(ServerMessage::text(text)).await;
        }
    }
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}
