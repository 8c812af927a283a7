//! Squad Selection Lobby
//!
//! The dialogue between a successful login and a registered gamer. It runs
//! in its own task and reads only its own peer's inbox.
//!
//! A lobby acts only on the login session its link was opened for. If the
//! player logs out and back in while an old lobby is still unwinding, the
//! old lobby leaves the new session and its route untouched.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::game::roster::Player;
use crate::game::squad::{Squad, SquadError, SQUAD_SIZE};
use crate::network::matchmaker::Matchmaker;
use crate::network::protocol::ServerMessage;
use crate::network::session::{Gamer, SessionId, SessionRegistry};
use crate::network::transport::{LinkError, PeerLink, Router};

/// Squad selection prompt.
pub const SELECT_PROMPT: &str = "Select three Pokemon (Please enter the pokemon ID separated by space): ";

/// Why a selection dialogue ended without a squad.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LobbyError {
    /// Peer went away or stopped answering.
    #[error(transparent)]
    Link(#[from] LinkError),
    /// Player cannot field a squad at all.
    #[error(transparent)]
    Squad(#[from] SquadError),
}

/// Show the player's roster and read selections until a full squad is
/// chosen.
///
/// Under-selection repeats the prompt. A roster too small for any squad
/// fails immediately.
pub async fn select_squad(
    player: &Player,
    link: &mut PeerLink,
    timeout: Option<Duration>,
) -> Result<Squad, LobbyError> {
    if player.creatures.len() < SQUAD_SIZE {
        return Err(SquadError::RosterTooSmall {
            owned: player.creatures.len(),
            required: SQUAD_SIZE,
        }
        .into());
    }

    link.send(ServerMessage::Text(format!("Player: {}", player.name))).await;
    for (index, creature) in player.creatures.iter().enumerate() {
        link.send(ServerMessage::Text(format!("{}. {}", index + 1, creature.profile())))
            .await;
    }

    loop {
        link.send(ServerMessage::text(SELECT_PROMPT)).await;
        let reply = link.recv(timeout).await?;

        match Squad::from_selection(player, &reply) {
            Ok(squad) => return Ok(squad),
            Err(SquadError::Underselected { chosen, required }) => {
                let message = format!(
                    "Choose {} different Pokemon by their list numbers ({} valid).",
                    required, chosen
                );
                link.send(ServerMessage::BadSelection(message)).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Everything a lobby task needs after login.
pub struct Lobby {
    registry: Arc<SessionRegistry>,
    router: Arc<Router>,
    matchmaker: Arc<Matchmaker>,
    prompt_timeout: Option<Duration>,
}

impl Lobby {
    /// Create a lobby.
    pub fn new(
        registry: Arc<SessionRegistry>,
        router: Arc<Router>,
        matchmaker: Arc<Matchmaker>,
        prompt_timeout: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            router,
            matchmaker,
            prompt_timeout,
        }
    }

    /// Run selection for a logged-in player, register the gamer, and try
    /// to start a battle. Any failure ends the session.
    ///
    /// The registration confirmation goes out before the gamer becomes
    /// visible to the matchmaker, so it always precedes the battle opening.
    #[instrument(skip(self, player, link), fields(player = %player.name, session = link.session()))]
    pub async fn enroll(&self, player: Player, mut link: PeerLink) {
        let addr = link.addr();
        let session = link.session();

        let squad = match select_squad(&player, &mut link, self.prompt_timeout).await {
            Ok(squad) => squad,
            Err(LobbyError::Squad(e)) => {
                warn!("{} cannot field a squad: {}", player.name, e);
                link.send(ServerMessage::Failed(format!("{} cannot field a squad: {}", player.name, e)))
                    .await;
                self.end_session(&player.name, session, addr).await;
                return;
            }
            Err(LobbyError::Link(e)) => {
                info!("{} left squad selection: {}", player.name, e);
                self.end_session(&player.name, session, addr).await;
                return;
            }
        };

        if !self.registry.is_selecting(&player.name, session).await {
            info!("Session ended during selection, dropping squad");
            self.router.close(addr, session).await;
            return;
        }

        link.send(ServerMessage::Success(format!(
            "You have registered with name: {}",
            player.name
        )))
        .await;

        let gamer = Gamer::new(player.name.clone(), squad, link);
        if let Err(e) = self.registry.register_gamer(gamer).await {
            warn!("Dropping squad: {}", e);
            self.router.close(addr, session).await;
            return;
        }

        self.matchmaker.poll().await;
    }

    async fn end_session(&self, name: &str, session: SessionId, addr: SocketAddr) {
        self.registry.abandon(name, session).await;
        self.router.close(addr, session).await;
    }
}
