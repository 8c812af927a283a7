//! Datagram Transport
//!
//! UDP in, UDP out, and a routing table in between.
//!
//! - The dispatch loop owns the socket's receive side and hands every
//!   non-command datagram to [`Router::forward`].
//! - Each logged-in peer address has one inbox channel. The task talking
//!   to that peer (lobby, then battle) holds the receiving [`PeerLink`],
//!   so a read suspends only that task, never the dispatch loop.
//! - Every outbound message goes through one bounded queue drained by
//!   [`run_outbound`], the only writer to the socket.
//! - Routes are tagged with the login session that opened them. Closing
//!   a route needs the same session, so a task left over from an earlier
//!   login at the same address cannot close a newer route.
//!
//! There is no retransmission or ordering guarantee. Send failures are
//! logged and the message dropped.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::network::protocol::ServerMessage;
use crate::network::session::SessionId;

/// An outbound message addressed to a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Destination.
    pub addr: SocketAddr,
    /// Encoded message.
    pub payload: String,
}

/// Why a read from a peer produced no message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LinkError {
    /// Peer did not answer in time.
    #[error("peer did not answer within {0:?}")]
    Timeout(Duration),
    /// Route was closed (logout or shutdown).
    #[error("peer link closed")]
    Closed,
}

/// One peer's conversation handle: a way to send to it and its inbox.
#[derive(Debug)]
pub struct PeerLink {
    addr: SocketAddr,
    session: SessionId,
    outbound: mpsc::Sender<Datagram>,
    inbox: mpsc::Receiver<String>,
}

impl PeerLink {
    /// Wrap an address, its login session, the shared outbound queue,
    /// and this peer's inbox.
    pub fn new(
        addr: SocketAddr,
        session: SessionId,
        outbound: mpsc::Sender<Datagram>,
        inbox: mpsc::Receiver<String>,
    ) -> Self {
        Self {
            addr,
            session,
            outbound,
            inbox,
        }
    }

    /// Peer address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Login session this link belongs to.
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Queue a message for the peer. Dropped with a warning if the
    /// outbound queue is gone.
    pub async fn send(&self, message: ServerMessage) {
        let datagram = Datagram {
            addr: self.addr,
            payload: message.to_wire(),
        };
        if self.outbound.send(datagram).await.is_err() {
            warn!("Outbound queue closed, dropping message for {}", self.addr);
        }
    }

    /// Wait for the peer's next message.
    ///
    /// `None` waits forever.
    pub async fn recv(&mut self, timeout: Option<Duration>) -> Result<String, LinkError> {
        match timeout {
            None => self.inbox.recv().await.ok_or(LinkError::Closed),
            Some(limit) => match tokio::time::timeout(limit, self.inbox.recv()).await {
                Ok(Some(text)) => Ok(text),
                Ok(None) => Err(LinkError::Closed),
                Err(_) => Err(LinkError::Timeout(limit)),
            },
        }
    }
}

struct Route {
    session: SessionId,
    inbox: mpsc::Sender<String>,
}

/// Routing table from peer address to inbox.
pub struct Router {
    routes: RwLock<BTreeMap<SocketAddr, Route>>,
    outbound: mpsc::Sender<Datagram>,
    inbox_capacity: usize,
}

impl Router {
    /// Create a router feeding the given outbound queue.
    pub fn new(outbound: mpsc::Sender<Datagram>, inbox_capacity: usize) -> Self {
        Self {
            routes: RwLock::new(BTreeMap::new()),
            outbound,
            inbox_capacity: inbox_capacity.max(1),
        }
    }

    /// Open an inbox for `addr` on behalf of `session`. Returns `None` if
    /// one is already open.
    pub async fn open(&self, addr: SocketAddr, session: SessionId) -> Option<PeerLink> {
        let mut routes = self.routes.write().await;
        if routes.contains_key(&addr) {
            return None;
        }
        let (tx, rx) = mpsc::channel(self.inbox_capacity);
        routes.insert(addr, Route { session, inbox: tx });
        debug!("Opened route for {} (session {})", addr, session);
        Some(PeerLink::new(addr, session, self.outbound.clone(), rx))
    }

    /// Close the inbox for `addr` if it was opened by `session`. The holder
    /// of its link sees [`LinkError::Closed`] once buffered messages are
    /// read.
    pub async fn close(&self, addr: SocketAddr, session: SessionId) -> bool {
        let mut routes = self.routes.write().await;
        match routes.get(&addr) {
            Some(route) if route.session == session => {
                routes.remove(&addr);
                debug!("Closed route for {} (session {})", addr, session);
                true
            }
            Some(route) => {
                debug!(
                    "Route for {} belongs to session {}, not {}",
                    addr, route.session, session
                );
                false
            }
            None => false,
        }
    }

    /// True if `addr` has an open inbox.
    pub async fn is_routed(&self, addr: SocketAddr) -> bool {
        self.routes.read().await.contains_key(&addr)
    }

    /// Number of open inboxes.
    pub async fn route_count(&self) -> usize {
        self.routes.read().await.len()
    }

    /// Deliver free text from `addr` to its inbox. Returns false if the
    /// message was dropped.
    pub async fn forward(&self, addr: SocketAddr, text: String) -> bool {
        let sender = self.routes.read().await.get(&addr).map(|route| route.inbox.clone());
        let Some(sender) = sender else {
            debug!("No route for {}, dropping message", addr);
            return false;
        };

        match sender.try_send(text) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Inbox full for {}, dropping message", addr);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Inbox for {} has no reader, dropping message", addr);
                false
            }
        }
    }

    /// Send a message to any address, routed or not.
    pub async fn send_to(&self, addr: SocketAddr, message: ServerMessage) {
        let datagram = Datagram {
            addr,
            payload: message.to_wire(),
        };
        if self.outbound.send(datagram).await.is_err() {
            warn!("Outbound queue closed, dropping message for {}", addr);
        }
    }
}

/// Drain the outbound queue into the socket until every sender is gone.
pub async fn run_outbound(socket: Arc<UdpSocket>, mut queue: mpsc::Receiver<Datagram>) {
    while let Some(datagram) = queue.recv().await {
        if let Err(e) = socket.send_to(datagram.payload.as_bytes(), datagram.addr).await {
            warn!("Failed to send to {}: {}", datagram.addr, e);
        }
    }
    debug!("Outbound queue closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[tokio::test]
    async fn test_open_forward_recv() {
        let (tx, _rx) = mpsc::channel(8);
        let router = Router::new(tx, 4);

        let mut link = router.open(addr(5000), 1).await.unwrap();
        assert!(router.open(addr(5000), 1).await.is_none());
        assert!(router.is_routed(addr(5000)).await);

        assert!(router.forward(addr(5000), "1 2 3".into()).await);
        assert_eq!(link.recv(None).await, Ok("1 2 3".to_string()));
    }

    #[tokio::test]
    async fn test_forward_without_route() {
        let (tx, _rx) = mpsc::channel(8);
        let router = Router::new(tx, 4);
        assert!(!router.forward(addr(5001), "hello".into()).await);
    }

    #[tokio::test]
    async fn test_full_inbox_drops() {
        let (tx, _rx) = mpsc::channel(8);
        let router = Router::new(tx, 1);
        let _link = router.open(addr(5002), 1).await.unwrap();

        assert!(router.forward(addr(5002), "first".into()).await);
        assert!(!router.forward(addr(5002), "second".into()).await);
    }

    #[tokio::test]
    async fn test_recv_timeout() {
        let (tx, _rx) = mpsc::channel(8);
        let router = Router::new(tx, 4);
        let mut link = router.open(addr(5003), 1).await.unwrap();

        let limit = Duration::from_millis(20);
        assert_eq!(link.recv(Some(limit)).await, Err(LinkError::Timeout(limit)));
    }

    #[tokio::test]
    async fn test_close_drains_then_closes() {
        let (tx, _rx) = mpsc::channel(8);
        let router = Router::new(tx, 4);
        let mut link = router.open(addr(5004), 1).await.unwrap();

        router.forward(addr(5004), "buffered".into()).await;
        assert!(router.close(addr(5004), 1).await);
        assert!(!router.close(addr(5004), 1).await);

        assert_eq!(link.recv(None).await, Ok("buffered".to_string()));
        assert_eq!(link.recv(None).await, Err(LinkError::Closed));
        assert_eq!(router.route_count().await, 0);
    }

    #[tokio::test]
    async fn test_close_ignores_other_session() {
        let (tx, _rx) = mpsc::channel(8);
        let router = Router::new(tx, 4);

        let old = router.open(addr(5006), 1).await.unwrap();
        assert_eq!(old.session(), 1);
        assert!(router.close(addr(5006), 1).await);

        let mut current = router.open(addr(5006), 2).await.unwrap();
        assert!(!router.close(addr(5006), old.session()).await);
        assert!(router.is_routed(addr(5006)).await);

        assert!(router.forward(addr(5006), "still here".into()).await);
        assert_eq!(current.recv(None).await, Ok("still here".to_string()));
    }

    #[tokio::test]
    async fn test_send_encodes_prefix() {
        let (tx, mut rx) = mpsc::channel(8);
        let router = Router::new(tx, 4);
        let link = router.open(addr(5005), 1).await.unwrap();

        link.send(ServerMessage::BadInput("try again".into())).await;
        router.send_to(addr(6000), ServerMessage::Failed("nope".into())).await;

        let first = rx.recv().await.unwrap();
        assert_eq!(first.addr, addr(5005));
        assert_eq!(first.payload, "BAD INPUT: try again");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.addr, addr(6000));
        assert_eq!(second.payload, "FAILED: nope");
    }

    #[tokio::test]
    async fn test_outbound_pump() {
        let server = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let (tx, rx) = mpsc::channel(8);
        let pump = tokio::spawn(run_outbound(server, rx));

        tx.send(Datagram {
            addr: client.local_addr().unwrap(),
            payload: "Turn 1".into(),
        })
        .await
        .unwrap();

        let mut buf = [0u8; 64];
        let (n, _) = tokio::time::timeout(Duration::from_secs(5), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"Turn 1");

        drop(tx);
        pump.await.unwrap();
    }
}
