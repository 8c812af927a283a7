//! # Pokebat Battle Server
//!
//! Two-player, turn-based creature battles over UDP.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    POKEBAT SERVER                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/             - Deterministic primitives                │
//! │  └── rng.rs        - Xorshift128+ PRNG, battle seeds         │
//! │                                                              │
//! │  game/             - Battle rules (deterministic)            │
//! │  ├── creature.rs   - Creature records                        │
//! │  ├── roster.rs     - Roster Store                            │
//! │  ├── squad.rs      - Squad selection, fighter switching      │
//! │  ├── combat.rs     - Damage and initiative                   │
//! │  ├── experience.rs - Experience distribution                 │
//! │  ├── state.rs      - Turn state machine                      │
//! │  └── events.rs     - Battle transcript                       │
//! │                                                              │
//! │  network/          - Networking (non-deterministic)          │
//! │  ├── protocol.rs   - Wire messages                           │
//! │  ├── transport.rs  - UDP pump and per-peer routing           │
//! │  ├── session.rs    - Session Registry                        │
//! │  ├── lobby.rs      - Squad selection dialogue                │
//! │  ├── matchmaker.rs - Pair claiming                           │
//! │  ├── battle.rs     - Battle Coordinator                      │
//! │  └── server.rs     - Dispatch loop                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/` and `game/` modules do no I/O and read no clocks:
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - All randomness from a seeded Xorshift128+
//!
//! Given the same squads and seed, a battle's damage rolls, faints, and
//! experience award come out identical.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::rng::DeterministicRng;
pub use game::roster::{Player, RosterStore};
pub use game::state::{BattleState, TurnPhase};
pub use network::server::{BattleServer, ServerConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
