//! UDP Battle Server
//!
//! One dispatch loop reads datagrams and routes them:
//!
//! - `LOGIN:<name>` reserves the name and spawns its lobby task.
//! - `LOGOUT:<name>` ends a session that is not in battle.
//! - Anything else goes to the sender's inbox, then matchmaking is polled.
//!
//! The loop never waits on a peer. Lobby and battle tasks do.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, error, info, instrument, warn};

use crate::game::roster::RosterStore;
use crate::network::battle::BattleConfig;
use crate::network::lobby::Lobby;
use crate::network::matchmaker::Matchmaker;
use crate::network::protocol::{ClientMessage, ServerMessage};
use crate::network::session::{SessionError, SessionRegistry};
use crate::network::transport::{run_outbound, Datagram, Router};

/// Welcome banner sent after a successful login.
pub const WELCOME: &str = "Welcome to the Pokemon Battle Server!";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Roster file.
    pub roster_path: PathBuf,
    /// Limit on each prompt. `None` waits forever.
    pub prompt_timeout: Option<Duration>,
    /// Delay between attack narration steps.
    pub pacing: Duration,
    /// Delay after a damage report.
    pub result_pause: Duration,
    /// Receive buffer size.
    pub max_datagram: usize,
    /// Outbound queue capacity.
    pub outbound_capacity: usize,
    /// Per-peer inbox capacity.
    pub inbox_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            roster_path: PathBuf::from("player.json"),
            prompt_timeout: None,
            pacing: Duration::from_millis(2000),
            result_pause: Duration::from_millis(3000),
            max_datagram: 1024,
            outbound_capacity: 1024,
            inbox_capacity: 16,
        }
    }
}

impl ServerConfig {
    /// Read overrides from `POKEBAT_*` environment variables. Unparsable
    /// values keep the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_or("POKEBAT_BIND", defaults.bind_addr),
            roster_path: std::env::var("POKEBAT_ROSTER")
                .map(PathBuf::from)
                .unwrap_or(defaults.roster_path),
            prompt_timeout: std::env::var("POKEBAT_PROMPT_TIMEOUT_SECS")
                .ok()
                .and_then(|v| parse_logged::<u64>("POKEBAT_PROMPT_TIMEOUT_SECS", &v))
                .map(Duration::from_secs),
            pacing: Duration::from_millis(env_or("POKEBAT_PACING_MS", 2000)),
            result_pause: Duration::from_millis(env_or("POKEBAT_RESULT_PAUSE_MS", 3000)),
            max_datagram: env_or("POKEBAT_MAX_DATAGRAM", defaults.max_datagram),
            ..defaults
        }
    }

    /// Settings handed to each battle.
    pub fn battle_config(&self) -> BattleConfig {
        BattleConfig {
            pacing: self.pacing,
            result_pause: self.result_pause,
            prompt_timeout: self.prompt_timeout,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| parse_logged(key, &v))
        .unwrap_or(default)
}

fn parse_logged<T: FromStr>(key: &str, value: &str) -> Option<T> {
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("Ignoring invalid {}={:?}", key, value);
            None
        }
    }
}

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind the socket.
    #[error("Failed to bind: {0}")]
    BindFailed(#[source] std::io::Error),

    /// Socket I/O error.
    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),
}

/// The battle server.
pub struct BattleServer {
    config: ServerConfig,
    socket: Arc<UdpSocket>,
    registry: Arc<SessionRegistry>,
    router: Arc<Router>,
    matchmaker: Arc<Matchmaker>,
    lobby: Arc<Lobby>,
    outbound: Mutex<Option<mpsc::Receiver<Datagram>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl BattleServer {
    /// Bind the socket and wire up the session layer.
    pub async fn bind(config: ServerConfig, roster: RosterStore) -> Result<Self, ServerError> {
        let socket = UdpSocket::bind(config.bind_addr)
            .await
            .map_err(ServerError::BindFailed)?;

        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));
        let registry = Arc::new(SessionRegistry::new(Arc::new(roster)));
        let router = Arc::new(Router::new(outbound_tx, config.inbox_capacity));
        let matchmaker = Arc::new(Matchmaker::new(
            registry.clone(),
            router.clone(),
            config.battle_config(),
        ));
        let lobby = Arc::new(Lobby::new(
            registry.clone(),
            router.clone(),
            matchmaker.clone(),
            config.prompt_timeout,
        ));
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            socket: Arc::new(socket),
            registry,
            router,
            matchmaker,
            lobby,
            outbound: Mutex::new(Some(outbound_rx)),
            shutdown_tx,
        })
    }

    /// Bound address.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.socket.local_addr()?)
    }

    /// Session registry.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Stop the dispatch loop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Dispatch datagrams until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), ServerError> {
        info!("Battle server listening on {}", self.local_addr()?);

        let pump = match self.outbound.lock().await.take() {
            Some(queue) => tokio::spawn(run_outbound(self.socket.clone(), queue)),
            None => {
                warn!("Server already ran, outbound queue is gone");
                return Ok(());
            }
        };

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut buf = vec![0u8; self.config.max_datagram.max(1)];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((n, addr)) => {
                            let message = ClientMessage::from_bytes(&buf[..n]);
                            self.dispatch(message, addr).await;
                        }
                        Err(e) => {
                            error!("Receive error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        pump.abort();
        Ok(())
    }

    async fn dispatch(&self, message: ClientMessage, addr: SocketAddr) {
        match message {
            ClientMessage::Login(name) => self.handle_login(name, addr).await,
            ClientMessage::Logout(name) => {
                if let Some((peer, session)) = self.registry.logout(&name).await {
                    self.router.close(peer, session).await;
                }
            }
            ClientMessage::Text(text) => {
                debug!("{} sent {:?}", addr, text);
                self.router.forward(addr, text).await;
                self.matchmaker.poll().await;
            }
        }
    }

    async fn handle_login(&self, name: String, addr: SocketAddr) {
        let (session, player) = match self.registry.login(&name, addr).await {
            Ok(login) => login,
            Err(e) => {
                info!("Login {} from {} rejected: {}", name, addr, e);
                let reply = match e {
                    SessionError::NoSuchPlayer(_) => ServerMessage::Failed(e.to_string()),
                    _ => ServerMessage::Error(e.to_string()),
                };
                self.router.send_to(addr, reply).await;
                return;
            }
        };

        let Some(link) = self.router.open(addr, session).await else {
            warn!("Route for {} still open, rejecting login {}", addr, name);
            self.registry.abandon(&name, session).await;
            self.router
                .send_to(addr, ServerMessage::Error(format!("{} already has a session", addr)))
                .await;
            return;
        };

        link.send(ServerMessage::Success(format!("You have registered as {}", name)))
            .await;
        link.send(ServerMessage::text(WELCOME)).await;

        let lobby = self.lobby.clone();
        tokio::spawn(async move {
            lobby.enroll(player, link).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::roster::fixtures::player;

    async fn start(players: Vec<crate::game::roster::Player>) -> (SocketAddr, Arc<SessionRegistry>, Arc<BattleServer>) {
        let config = ServerConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            pacing: Duration::ZERO,
            result_pause: Duration::ZERO,
            prompt_timeout: Some(Duration::from_secs(5)),
            ..ServerConfig::default()
        };
        let roster = RosterStore::from_players(players).unwrap();
        let server = Arc::new(BattleServer::bind(config, roster).await.unwrap());
        let addr = server.local_addr().unwrap();
        let registry = server.registry().clone();
        let runner = server.clone();
        tokio::spawn(async move { runner.run().await });
        (addr, registry, server)
    }

    async fn client() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0").await.unwrap()
    }

    /// Read until a line satisfies `pred`, returning every line read.
    async fn read_until(socket: &UdpSocket, pred: impl Fn(&str) -> bool) -> Vec<String> {
        let mut lines = Vec::new();
        let mut buf = [0u8; 2048];
        loop {
            let (n, _) = tokio::time::timeout(Duration::from_secs(10), socket.recv_from(&mut buf))
                .await
                .expect("server went quiet")
                .unwrap();
            let line = String::from_utf8_lossy(&buf[..n]).to_string();
            let done = pred(&line);
            lines.push(line);
            if done {
                return lines;
            }
        }
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.max_datagram, 1024);
        assert!(config.prompt_timeout.is_none());

        let battle = config.battle_config();
        assert_eq!(battle.pacing, Duration::from_secs(2));
        assert_eq!(battle.result_pause, Duration::from_secs(3));
    }

    #[test]
    fn test_parse_logged_rejects_garbage() {
        assert_eq!(parse_logged::<u64>("X", " 15 "), Some(15));
        assert_eq!(parse_logged::<u64>("X", "soon"), None);
    }

    #[tokio::test]
    async fn test_unknown_login_rejected() {
        let (server, registry, handle) = start(vec![player("ash", 1, 3, 30, 10)]).await;
        let socket = client().await;

        socket.send_to(b"LOGIN:gary\n", server).await.unwrap();
        let lines = read_until(&socket, |_| true).await;
        assert_eq!(lines, vec!["FAILED: no player found gary".to_string()]);
        assert_eq!(registry.session_count().await, 0);

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_duplicate_login_rejected() {
        let (server, _registry, handle) = start(vec![player("ash", 1, 3, 30, 10)]).await;
        let first = client().await;
        let second = client().await;

        first.send_to(b"LOGIN:ash", server).await.unwrap();
        read_until(&first, |l| l == SELECT_PROMPT_LINE).await;

        second.send_to(b"LOGIN:ash", server).await.unwrap();
        let lines = read_until(&second, |_| true).await;
        assert_eq!(lines, vec!["ERROR: ash is already logged in".to_string()]);

        handle.shutdown();
    }

    const SELECT_PROMPT_LINE: &str = crate::network::lobby::SELECT_PROMPT;

    #[tokio::test]
    async fn test_relogin_from_same_peer_survives_old_lobby() {
        let (server, registry, handle) = start(vec![player("ash", 1, 3, 30, 10)]).await;
        let ash = client().await;

        ash.send_to(b"LOGIN:ash", server).await.unwrap();
        read_until(&ash, |l| l == SELECT_PROMPT_LINE).await;
        ash.send_to(b"LOGOUT:ash", server).await.unwrap();
        ash.send_to(b"LOGIN:ash", server).await.unwrap();
        read_until(&ash, |l| l == SELECT_PROMPT_LINE).await;

        // The first lobby has seen its link close by now; the second one
        // still owns the session and accepts the selection.
        ash.send_to(b"1 2 3", server).await.unwrap();
        read_until(&ash, |l| l == "SUCCESS: You have registered with name: ash").await;
        assert_eq!(registry.gamer_count().await, 1);

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_full_battle_over_udp() {
        // Every creature faints in one hit; ash attacks first (name order).
        let (server, registry, handle) = start(vec![
            player("ash", 1, 3, 1, 10),
            player("misty", 10, 3, 1, 10),
        ])
        .await;
        let ash = client().await;
        let misty = client().await;

        ash.send_to(b"LOGIN:ash", server).await.unwrap();
        let lines = read_until(&ash, |l| l == SELECT_PROMPT_LINE).await;
        assert_eq!(lines[0], "SUCCESS: You have registered as ash");
        assert_eq!(lines[1], WELCOME);
        ash.send_to(b"1 2 3", server).await.unwrap();
        read_until(&ash, |l| l.starts_with("SUCCESS: You have registered with name")).await;

        misty.send_to(b"LOGIN:misty", server).await.unwrap();
        read_until(&misty, |l| l == SELECT_PROMPT_LINE).await;
        misty.send_to(b"1 2 3", server).await.unwrap();

        // misty loses creature 10 on turn 1 and picks 11.
        read_until(&misty, |l| l.starts_with("Select your fighter by ID")).await;
        misty.send_to(b"11", server).await.unwrap();

        // misty's 11 knocks out ash's 1 on turn 2; ash picks 2.
        read_until(&ash, |l| l.starts_with("Select your fighter by ID")).await;
        ash.send_to(b"2", server).await.unwrap();

        // ash's 2 knocks out 11; misty picks 12.
        read_until(&misty, |l| l.starts_with("Select your fighter by ID")).await;
        misty.send_to(b"12", server).await.unwrap();

        // misty's 12 knocks out 2; ash picks 3.
        read_until(&ash, |l| l.starts_with("Select your fighter by ID")).await;
        ash.send_to(b"3", server).await.unwrap();

        // ash's 3 knocks out 12 and misty has nobody left.
        let ash_tail = read_until(&ash, |l| l == "BATTLE ENDED!").await;
        assert!(ash_tail.contains(&"END BATTLE: YOU WIN!!!".to_string()));
        assert!(ash_tail.iter().any(|l| l.starts_with("RECEIVE EXP: Each pokemon of ash")));

        let misty_tail = read_until(&misty, |l| l == "BATTLE ENDED!").await;
        assert!(misty_tail.contains(&"END BATTLE: YOU LOST!!!".to_string()));
        assert!(misty_tail.contains(&"You don't have any available fighter left!".to_string()));

        // Released after the battle.
        for _ in 0..50 {
            if registry.session_count().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(registry.session_count().await, 0);

        handle.shutdown();
    }
}
