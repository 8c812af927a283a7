//! Matchmaker
//!
//! Claims a waiting pair from the registry and spawns its battle. The
//! claimed identities stay locked until the battle task finishes and
//! releases them, so nobody can be matched into two battles at once.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::network::battle::{Battle, BattleConfig, BattleOutcome};
use crate::network::session::SessionRegistry;
use crate::network::transport::Router;

/// Pairs waiting gamers and launches battles.
pub struct Matchmaker {
    registry: Arc<SessionRegistry>,
    router: Arc<Router>,
    config: BattleConfig,
}

impl Matchmaker {
    /// Create a matchmaker.
    pub fn new(registry: Arc<SessionRegistry>, router: Arc<Router>, config: BattleConfig) -> Self {
        Self {
            registry,
            router,
            config,
        }
    }

    /// Launch a battle if exactly two gamers are waiting.
    ///
    /// The returned task releases both identities and closes their routes
    /// once the battle has ended.
    pub async fn poll(&self) -> Option<JoinHandle<BattleOutcome>> {
        let (first, second) = self.registry.claim_pair().await?;

        let battle_id = Uuid::new_v4();
        info!(
            "Matched {} vs {} in battle {}",
            first.name,
            second.name,
            hex::encode(&battle_id.as_bytes()[..4])
        );

        let battle = Battle::new(battle_id, first, second, self.config.clone());
        let registry = Arc::clone(&self.registry);
        let router = Arc::clone(&self.router);

        Some(tokio::spawn(async move {
            let outcome = battle.run().await;

            let names = [outcome.winner.as_str(), outcome.loser.as_str()];
            for (addr, session) in registry.release(&names).await {
                router.close(addr, session).await;
            }

            outcome
        }))
    }
}
