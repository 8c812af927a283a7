//! Core deterministic primitives.
//!
//! Everything random in a battle comes from here, seeded per battle so a
//! battle can be replayed from its id and participants.

pub mod rng;

pub use rng::{derive_battle_seed, DeterministicRng};
