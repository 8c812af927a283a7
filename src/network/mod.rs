//! Network Layer
//!
//! UDP server, per-peer routing, sessions, and battle coordination.
//! This layer is **non-deterministic**: all battle rules run through `game/`.

pub mod battle;
pub mod lobby;
pub mod matchmaker;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;

pub use battle::{Battle, BattleConfig, BattleOutcome};
pub use lobby::{Lobby, LobbyError};
pub use matchmaker::Matchmaker;
pub use protocol::{ClientMessage, ServerMessage};
pub use server::{BattleServer, ServerConfig, ServerError};
pub use session::{Gamer, SessionError, SessionRegistry, SessionState};
pub use transport::{Datagram, LinkError, PeerLink, Router};
