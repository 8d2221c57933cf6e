// ganglion-membership/src/gossip.rs
//
// C7: wraps "the gossip library" (spec.md §1 names it an external
// collaborator with "a well-defined event channel"). No real Rust
// SWIM/gossip crate appears anywhere in the corpus this was grounded
// against, so this is a from-scratch UDP heartbeat implementation
// shaped to the same public surface spec.md §4.7 describes (member
// list, Join, UserEvent, Leave, Shutdown, one event channel), grounded
// on the teacher's cell-discovery::lan (periodic UDP signal cache) and
// cell-discovery::health (periodic failure-detector loop) modules, and
// on original_source/Godeps/.../serfer's event vocabulary.

use crate::types::{MembershipEvent, WireMessage};
use ganglion_core::{Error, MemberStatus, NodeDetails};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct MembershipConfig {
    pub heartbeat_interval: Duration,
    pub failure_timeout: Duration,
    pub reap_timeout: Duration,
    pub event_channel_capacity: usize,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(1),
            failure_timeout: Duration::from_secs(5),
            reap_timeout: Duration::from_secs(30),
            event_channel_capacity: 256,
        }
    }
}

struct Peer {
    details: NodeDetails,
    addr: SocketAddr,
    last_heartbeat: Instant,
    status: MemberStatus,
}

pub struct Membership {
    local: NodeDetails,
    socket: Arc<UdpSocket>,
    peers: Arc<RwLock<HashMap<String, Peer>>>,
    events_tx: mpsc::Sender<MembershipEvent>,
    config: MembershipConfig,
    cancel: CancellationToken,
}

impl Membership {
    pub async fn bind(
        local: NodeDetails,
        bind_addr: SocketAddr,
        config: MembershipConfig,
    ) -> Result<(Arc<Self>, mpsc::Receiver<MembershipEvent>), Error> {
        let socket = Arc::new(UdpSocket::bind(bind_addr).await.map_err(Error::Io)?);
        let (events_tx, events_rx) = mpsc::channel(config.event_channel_capacity);

        let membership = Arc::new(Self {
            local,
            socket,
            peers: Arc::new(RwLock::new(HashMap::new())),
            events_tx,
            config,
            cancel: CancellationToken::new(),
        });

        membership.clone().spawn_receiver();
        membership.clone().spawn_heartbeat();
        membership.clone().spawn_failure_detector();

        Ok((membership, events_rx))
    }

    pub fn members(&self) -> Vec<NodeDetails> {
        self.peers
            .read()
            .expect("membership peer map poisoned")
            .values()
            .map(|p| p.details.clone())
            .collect()
    }

    pub fn local(&self) -> &NodeDetails {
        &self.local
    }

    /// Sends a heartbeat to each existing peer address. In bootstrap
    /// mode `existing` is empty and this is a no-op success (spec.md
    /// §4.10: a bootstrap node legitimately has no peers to join).
    /// Otherwise failure to reach every listed address is a join
    /// failure, which the lifecycle supervisor (C11) treats as fatal.
    pub async fn join(&self, existing: &[SocketAddr]) -> Result<usize, Error> {
        if existing.is_empty() {
            return Ok(0);
        }
        let mut successes = 0;
        for addr in existing {
            if self.send_to(addr, &WireMessage::Heartbeat(self.local.clone())).await.is_ok() {
                successes += 1;
            }
        }
        if successes == 0 {
            return Err(Error::Other(format!(
                "failed to reach any of {} existing node(s)",
                existing.len()
            )));
        }
        Ok(successes)
    }

    /// Broadcasts a user event to all known peers. `coalesce` mirrors
    /// the gossip library's de-duplication hint; this implementation
    /// does not suppress repeats itself (see DESIGN.md).
    pub async fn user_event(&self, name: &str, payload: Vec<u8>, _coalesce: bool) -> Result<(), Error> {
        let msg = WireMessage::User {
            name: name.to_string(),
            payload,
        };
        self.broadcast(&msg).await;
        Ok(())
    }

    /// Graceful leave: tells every known peer so they emit `MemberLeave`
    /// instead of eventually detecting a failure (spec.md §3 invariant:
    /// "a node never deregisters itself", distinct from announcing its
    /// own departure to peers, which is this operation).
    pub async fn leave(&self) -> Result<(), Error> {
        let msg = WireMessage::Leaving(self.local.clone());
        self.broadcast(&msg).await;
        Ok(())
    }

    pub async fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn broadcast(&self, msg: &WireMessage) {
        let addrs: Vec<SocketAddr> = {
            let peers = self.peers.read().expect("membership peer map poisoned");
            peers.values().map(|p| p.addr).collect()
        };
        for addr in addrs {
            let _ = self.send_to(&addr, msg).await;
        }
    }

    async fn send_to(&self, addr: &SocketAddr, msg: &WireMessage) -> Result<(), Error> {
        let bytes = serde_json::to_vec(msg).map_err(|e| Error::Other(e.to_string()))?;
        self.socket.send_to(&bytes, addr).await.map_err(Error::Io)?;
        Ok(())
    }

    fn spawn_receiver(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    received = self.socket.recv_from(&mut buf) => {
                        let (len, addr) = match received {
                            Ok(pair) => pair,
                            Err(err) => {
                                tracing::warn!(%err, "membership recv error");
                                continue;
                            }
                        };
                        self.handle_datagram(&buf[..len], addr).await;
                    }
                }
            }
        });
    }

    async fn handle_datagram(&self, bytes: &[u8], addr: SocketAddr) {
        let msg: WireMessage = match serde_json::from_slice(bytes) {
            Ok(m) => m,
            Err(err) => {
                tracing::warn!(%addr, %err, "discarding malformed membership datagram");
                return;
            }
        };

        let event = match msg {
            WireMessage::Heartbeat(details) => self.observe_heartbeat(details, addr),
            WireMessage::Leaving(details) => self.observe_leave(details),
            WireMessage::User { name, payload } => Some(MembershipEvent::User {
                name,
                payload,
                coalesce: false,
            }),
            WireMessage::Query { name, payload } => Some(MembershipEvent::Query { name, payload }),
        };

        if let Some(event) = event {
            if self.events_tx.send(event).await.is_err() {
                tracing::warn!("membership event consumer gone");
            }
        }
    }

    fn observe_heartbeat(&self, details: NodeDetails, addr: SocketAddr) -> Option<MembershipEvent> {
        if details.id == self.local.id {
            return None;
        }
        let mut peers = self.peers.write().expect("membership peer map poisoned");
        match peers.get_mut(&details.id) {
            Some(peer) => {
                let rejoined = peer.status != MemberStatus::Alive;
                let changed = peer.details != details;
                peer.last_heartbeat = Instant::now();
                peer.status = MemberStatus::Alive;
                peer.addr = addr;
                peer.details = details.clone();
                if rejoined {
                    Some(MembershipEvent::MemberJoin(details))
                } else if changed {
                    Some(MembershipEvent::MemberUpdate(details))
                } else {
                    None
                }
            }
            None => {
                peers.insert(
                    details.id.clone(),
                    Peer {
                        details: details.clone(),
                        addr,
                        last_heartbeat: Instant::now(),
                        status: MemberStatus::Alive,
                    },
                );
                Some(MembershipEvent::MemberJoin(details))
            }
        }
    }

    fn observe_leave(&self, mut details: NodeDetails) -> Option<MembershipEvent> {
        let mut peers = self.peers.write().expect("membership peer map poisoned");
        if peers.remove(&details.id).is_some() {
            details.status = MemberStatus::Left;
            Some(MembershipEvent::MemberLeave(details))
        } else {
            None
        }
    }

    fn spawn_heartbeat(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.heartbeat_interval);
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let msg = WireMessage::Heartbeat(self.local.clone());
                        self.broadcast(&msg).await;
                    }
                }
            }
        });
    }

    fn spawn_failure_detector(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.heartbeat_interval);
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = ticker.tick() => self.sweep_failures().await,
                }
            }
        });
    }

    async fn sweep_failures(&self) {
        let now = Instant::now();
        let mut to_fail = Vec::new();
        let mut to_reap = Vec::new();

        {
            let mut peers = self.peers.write().expect("membership peer map poisoned");
            for peer in peers.values_mut() {
                let idle = now.duration_since(peer.last_heartbeat);
                match peer.status {
                    MemberStatus::Alive if idle > self.config.failure_timeout => {
                        peer.status = MemberStatus::Failed;
                        to_fail.push(peer.details.clone());
                    }
                    MemberStatus::Failed
                        if idle > self.config.failure_timeout + self.config.reap_timeout =>
                    {
                        to_reap.push(peer.details.clone());
                    }
                    _ => {}
                }
            }
            for details in &to_reap {
                peers.remove(&details.id);
            }
        }

        for details in to_fail {
            let mut failed = details;
            failed.status = MemberStatus::Failed;
            if self.events_tx.send(MembershipEvent::MemberFail(failed)).await.is_err() {
                return;
            }
        }
        for details in to_reap {
            let mut reaped = details;
            reaped.status = MemberStatus::Reap;
            if self.events_tx.send(MembershipEvent::MemberReap(reaped)).await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ganglion_core::ServiceEntry;

    fn node(id: &str, port: u16) -> NodeDetails {
        NodeDetails {
            id: id.to_string(),
            name: id.to_string(),
            role: ganglion_core::node::SERVICE_ROLE.to_string(),
            data_center: "dc1".to_string(),
            bootstrap: false,
            address: "127.0.0.1".parse().unwrap(),
            port,
            services: Vec::<ServiceEntry>::new(),
            status: MemberStatus::Alive,
        }
    }

    #[tokio::test]
    async fn join_and_observe_heartbeat() {
        let cfg = MembershipConfig {
            heartbeat_interval: Duration::from_millis(20),
            failure_timeout: Duration::from_millis(200),
            reap_timeout: Duration::from_millis(200),
            event_channel_capacity: 16,
        };
        let (a, mut a_events) =
            Membership::bind(node("a", 0), "127.0.0.1:0".parse().unwrap(), cfg.clone())
                .await
                .unwrap();
        let (b, _b_events) =
            Membership::bind(node("b", 0), "127.0.0.1:0".parse().unwrap(), cfg)
                .await
                .unwrap();

        let a_addr = a.socket.local_addr().unwrap();
        b.join(&[a_addr]).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), a_events.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            MembershipEvent::MemberJoin(details) => assert_eq!(details.id, "b"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn failure_then_reap_sequence() {
        let cfg = MembershipConfig {
            heartbeat_interval: Duration::from_millis(10),
            failure_timeout: Duration::from_millis(30),
            reap_timeout: Duration::from_millis(30),
            event_channel_capacity: 16,
        };
        let (a, mut a_events) =
            Membership::bind(node("a", 0), "127.0.0.1:0".parse().unwrap(), cfg.clone())
                .await
                .unwrap();
        let (b, _b_events) =
            Membership::bind(node("b", 0), "127.0.0.1:0".parse().unwrap(), cfg)
                .await
                .unwrap();

        let a_addr = a.socket.local_addr().unwrap();
        b.join(&[a_addr]).await.unwrap();
        // consume the join event
        let _ = tokio::time::timeout(Duration::from_secs(1), a_events.recv()).await;

        b.shutdown().await; // stop b's heartbeats so a's detector fires

        let fail = tokio::time::timeout(Duration::from_secs(2), a_events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(fail, MembershipEvent::MemberFail(_)));

        let reap = tokio::time::timeout(Duration::from_secs(2), a_events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(reap, MembershipEvent::MemberReap(_)));
    }
}
