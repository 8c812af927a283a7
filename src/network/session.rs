//! Session Registry
//!
//! Tracks every identity from login until its battle ends. One exclusive
//! lock guards the whole table; nothing awaits I/O while holding it.
//!
//! An identity moves through
//!
//! ```text
//! login -> SelectingSquad -> Waiting -> InBattle -> released
//!              |                |
//!              +---- logout ----+
//! ```
//!
//! `InBattle` is the per-identity battle lock: a claimed identity cannot
//! log in again, log out, or be claimed a second time until its battle
//! task releases it.
//!
//! Every login gets a fresh [`SessionId`]. Tasks that outlive their login
//! (a lobby still waiting on a closed link) act through that id, so they
//! can only touch the session they were started for.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::game::roster::{Player, RosterStore};
use crate::game::squad::Squad;
use crate::network::transport::PeerLink;

/// Identifies one login. Never reused within a registry.
pub type SessionId = u64;

/// Session state of one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Logged in, choosing a squad.
    SelectingSquad,
    /// Squad chosen, waiting for an opponent.
    Waiting,
    /// Claimed by a running battle.
    InBattle,
}

/// An identity with a chosen squad, ready to battle.
#[derive(Debug)]
pub struct Gamer {
    /// Player name.
    pub name: String,
    /// Chosen squad.
    pub squad: Squad,
    /// Conversation with the peer.
    pub link: PeerLink,
}

impl Gamer {
    /// Create a gamer.
    pub fn new(name: impl Into<String>, squad: Squad, link: PeerLink) -> Self {
        Self { name: name.into(), squad, link }
    }
}

/// Session errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Name is not in the roster.
    #[error("no player found {0}")]
    NoSuchPlayer(String),

    /// Name already has a session.
    #[error("{0} is already logged in")]
    AlreadyActive(String),

    /// Name is locked by a running battle.
    #[error("{0} is in a battle")]
    InBattle(String),

    /// Address already has a session under another name.
    #[error("address {0} already has a session")]
    PeerBusy(SocketAddr),

    /// Name has no session in the expected state.
    #[error("{0} is not logged in")]
    NotLoggedIn(String),
}

#[derive(Debug)]
struct SessionEntry {
    addr: SocketAddr,
    session: SessionId,
    state: SessionState,
}

#[derive(Debug, Default)]
struct RegistryState {
    sessions: BTreeMap<String, SessionEntry>,
    gamers: BTreeMap<String, Gamer>,
    next_session: SessionId,
}

// =============================================================================
// SESSION REGISTRY
// =============================================================================

/// Login, squad registration, and pair claiming.
pub struct SessionRegistry {
    roster: Arc<RosterStore>,
    state: Mutex<RegistryState>,
}

impl SessionRegistry {
    /// Create a registry over a loaded roster.
    pub fn new(roster: Arc<RosterStore>) -> Self {
        Self {
            roster,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Reserve `name` for the peer at `addr`.
    ///
    /// Succeeds iff the name is in the roster and has no session. Returns
    /// the new session's id with the player's record.
    pub async fn login(&self, name: &str, addr: SocketAddr) -> Result<(SessionId, Player), SessionError> {
        let player = self
            .roster
            .get(name)
            .ok_or_else(|| SessionError::NoSuchPlayer(name.to_string()))?;

        let mut state = self.state.lock().await;

        match state.sessions.get(name).map(|e| e.state) {
            Some(SessionState::InBattle) => return Err(SessionError::InBattle(name.to_string())),
            Some(_) => return Err(SessionError::AlreadyActive(name.to_string())),
            None => {}
        }

        if state.sessions.values().any(|e| e.addr == addr) {
            return Err(SessionError::PeerBusy(addr));
        }

        state.next_session += 1;
        let session = state.next_session;
        state.sessions.insert(name.to_string(), SessionEntry {
            addr,
            session,
            state: SessionState::SelectingSquad,
        });

        info!("{} logged in from {} (session {})", name, addr, session);
        Ok((session, player.clone()))
    }

    /// Record a chosen squad. The identity must still be selecting under
    /// the session the gamer's link was opened for.
    pub async fn register_gamer(&self, gamer: Gamer) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        let session = gamer.link.session();

        match state.sessions.get_mut(&gamer.name) {
            Some(entry) if entry.session == session && entry.state == SessionState::SelectingSquad => {
                entry.state = SessionState::Waiting;
            }
            _ => return Err(SessionError::NotLoggedIn(gamer.name.clone())),
        }

        info!("{} registered a squad", gamer.name);
        state.gamers.insert(gamer.name.clone(), gamer);
        Ok(())
    }

    /// True if `session` is the live login of `name` and is still choosing
    /// a squad.
    pub async fn is_selecting(&self, name: &str, session: SessionId) -> bool {
        self.state
            .lock()
            .await
            .sessions
            .get(name)
            .is_some_and(|e| e.session == session && e.state == SessionState::SelectingSquad)
    }

    /// End a session that is not in battle. Returns the address and session
    /// whose route should be closed.
    ///
    /// Idempotent: unknown names are ignored.
    pub async fn logout(&self, name: &str) -> Option<(SocketAddr, SessionId)> {
        let mut state = self.state.lock().await;

        match state.sessions.get(name).map(|e| e.state) {
            None => {
                debug!("Logout for {} without a session", name);
                None
            }
            Some(SessionState::InBattle) => {
                warn!("Ignoring logout for {} during a battle", name);
                None
            }
            Some(_) => {
                state.gamers.remove(name);
                let entry = state.sessions.remove(name)?;
                info!("{} logged out", name);
                Some((entry.addr, entry.session))
            }
        }
    }

    /// End `session` for `name` if it is still the live login and not in
    /// battle. A newer login under the same name is left alone.
    pub async fn abandon(&self, name: &str, session: SessionId) -> bool {
        let mut state = self.state.lock().await;

        let owned = state
            .sessions
            .get(name)
            .is_some_and(|e| e.session == session && e.state != SessionState::InBattle);
        if !owned {
            debug!("Session {} of {} already gone", session, name);
            return false;
        }

        state.gamers.remove(name);
        state.sessions.remove(name);
        info!("{} left (session {})", name, session);
        true
    }

    /// Claim the waiting pair when exactly two gamers are waiting.
    ///
    /// Both identities become `InBattle` and stay locked until
    /// [`release`](Self::release).
    pub async fn claim_pair(&self) -> Option<(Gamer, Gamer)> {
        let mut state = self.state.lock().await;

        if state.gamers.len() != 2 {
            return None;
        }

        let mut waiting = std::mem::take(&mut state.gamers).into_values();
        let (first, second) = (waiting.next()?, waiting.next()?);

        for name in [&first.name, &second.name] {
            if let Some(entry) = state.sessions.get_mut(name) {
                entry.state = SessionState::InBattle;
            }
        }

        info!("Claimed pair {} vs {}", first.name, second.name);
        Some((first, second))
    }

    /// Unlock identities whose battle has ended. Returns the addresses and
    /// sessions whose routes should be closed.
    pub async fn release(&self, names: &[&str]) -> Vec<(SocketAddr, SessionId)> {
        let mut state = self.state.lock().await;
        let mut addrs = Vec::with_capacity(names.len());

        for name in names {
            let in_battle = state
                .sessions
                .get(*name)
                .is_some_and(|e| e.state == SessionState::InBattle);
            if in_battle {
                if let Some(entry) = state.sessions.remove(*name) {
                    addrs.push((entry.addr, entry.session));
                }
            }
        }

        debug!("Released {:?}", names);
        addrs
    }

    /// Session state of a name.
    pub async fn state_of(&self, name: &str) -> Option<SessionState> {
        self.state.lock().await.sessions.get(name).map(|e| e.state)
    }

    /// Identities with any session.
    pub async fn session_count(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    /// Gamers waiting for an opponent.
    pub async fn gamer_count(&self) -> usize {
        self.state.lock().await.gamers.len()
    }

    /// Identities locked by running battles.
    pub async fn in_battle_count(&self) -> usize {
        self.state
            .lock()
            .await
            .sessions
            .values()
            .filter(|e| e.state == SessionState::InBattle)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::roster::fixtures::player;
    use tokio::sync::mpsc;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn registry() -> SessionRegistry {
        let roster = RosterStore::from_players(vec![
            player("ash", 1, 4, 30, 10),
            player("misty", 10, 4, 30, 10),
            player("brock", 20, 4, 30, 10),
            player("gary", 30, 4, 30, 10),
        ])
        .unwrap();
        SessionRegistry::new(Arc::new(roster))
    }

    fn gamer(player: &Player, port: u16, session: SessionId) -> Gamer {
        let (out_tx, _out_rx) = mpsc::channel(8);
        let (_in_tx, in_rx) = mpsc::channel(8);
        let squad = Squad::from_selection(player, "1 2 3").unwrap();
        let link = PeerLink::new(addr(port), session, out_tx, in_rx);
        Gamer::new(player.name.clone(), squad, link)
    }

    async fn enroll(registry: &SessionRegistry, name: &str, port: u16) {
        let (session, player) = registry.login(name, addr(port)).await.unwrap();
        registry.register_gamer(gamer(&player, port, session)).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_login_leaves_no_trace() {
        let registry = registry();

        let result = registry.login("team-rocket", addr(7000)).await;
        assert_eq!(result, Err(SessionError::NoSuchPlayer("team-rocket".into())));
        assert_eq!(registry.session_count().await, 0);
        assert_eq!(registry.gamer_count().await, 0);
    }

    #[tokio::test]
    async fn test_double_login_rejected() {
        let registry = registry();

        registry.login("ash", addr(7000)).await.unwrap();
        assert_eq!(
            registry.login("ash", addr(7001)).await,
            Err(SessionError::AlreadyActive("ash".into()))
        );
        assert_eq!(
            registry.login("misty", addr(7000)).await,
            Err(SessionError::PeerBusy(addr(7000)))
        );
        assert_eq!(registry.state_of("ash").await, Some(SessionState::SelectingSquad));
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let registry = registry();
        enroll(&registry, "ash", 7000).await;

        assert!(matches!(registry.logout("ash").await, Some((a, _)) if a == addr(7000)));
        assert_eq!(registry.logout("ash").await, None);
        assert_eq!(registry.logout("nobody").await, None);
        assert_eq!(registry.gamer_count().await, 0);

        // Can log in again afterwards.
        assert!(registry.login("ash", addr(7000)).await.is_ok());
    }

    #[tokio::test]
    async fn test_register_after_logout_rejected() {
        let registry = registry();
        let (session, player) = registry.login("ash", addr(7000)).await.unwrap();
        registry.logout("ash").await;

        assert_eq!(
            registry.register_gamer(gamer(&player, 7000, session)).await,
            Err(SessionError::NotLoggedIn("ash".into()))
        );
        assert_eq!(registry.gamer_count().await, 0);
    }

    #[tokio::test]
    async fn test_old_session_cannot_touch_new_login() {
        let registry = registry();
        let (old, player) = registry.login("ash", addr(7000)).await.unwrap();
        registry.logout("ash").await;
        let (current, _) = registry.login("ash", addr(7000)).await.unwrap();
        assert_ne!(old, current);

        assert!(!registry.is_selecting("ash", old).await);
        assert!(registry.is_selecting("ash", current).await);

        // A squad chosen under the old login is refused.
        assert_eq!(
            registry.register_gamer(gamer(&player, 7000, old)).await,
            Err(SessionError::NotLoggedIn("ash".into()))
        );
        assert!(!registry.abandon("ash", old).await);
        assert_eq!(registry.state_of("ash").await, Some(SessionState::SelectingSquad));
        assert_eq!(registry.gamer_count().await, 0);

        assert!(registry.abandon("ash", current).await);
        assert_eq!(registry.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_claim_requires_exactly_two() {
        let registry = registry();

        enroll(&registry, "misty", 7001).await;
        assert!(registry.claim_pair().await.is_none());

        enroll(&registry, "ash", 7000).await;
        let (first, second) = registry.claim_pair().await.unwrap();
        assert_eq!(first.name, "ash");
        assert_eq!(second.name, "misty");
        assert_eq!(registry.gamer_count().await, 0);
        assert_eq!(registry.in_battle_count().await, 2);

        // Nothing left to claim.
        assert!(registry.claim_pair().await.is_none());
    }

    #[tokio::test]
    async fn test_battle_lock_held_until_release() {
        let registry = registry();
        enroll(&registry, "ash", 7000).await;
        enroll(&registry, "misty", 7001).await;
        registry.claim_pair().await.unwrap();

        // Claimed identities cannot re-enter or leave mid-battle.
        assert_eq!(
            registry.login("ash", addr(7100)).await,
            Err(SessionError::InBattle("ash".into()))
        );
        assert_eq!(registry.logout("misty").await, None);
        assert_eq!(registry.state_of("misty").await, Some(SessionState::InBattle));

        // Another pair can form and battle concurrently.
        enroll(&registry, "brock", 7002).await;
        enroll(&registry, "gary", 7003).await;
        let (first, second) = registry.claim_pair().await.unwrap();
        assert_eq!((first.name.as_str(), second.name.as_str()), ("brock", "gary"));
        assert_eq!(registry.in_battle_count().await, 4);

        let released: Vec<SocketAddr> = registry
            .release(&["ash", "misty"])
            .await
            .into_iter()
            .map(|(addr, _)| addr)
            .collect();
        assert_eq!(released, vec![addr(7000), addr(7001)]);
        assert_eq!(registry.in_battle_count().await, 2);
        assert!(registry.login("ash", addr(7000)).await.is_ok());
    }

    #[tokio::test]
    async fn test_release_ignores_non_battle_sessions() {
        let registry = registry();
        enroll(&registry, "ash", 7000).await;

        assert!(registry.release(&["ash"]).await.is_empty());
        assert_eq!(registry.state_of("ash").await, Some(SessionState::Waiting));
    }
}
