// ganglion-consensus/src/leader.rs
//
// C9: the leader-only duties performed between a leader-acquired and a
// leader-lost edge. Grounded on original_source/leader.go's `leaderLoop`
// (the barrier/establish/reconcile cycle, one stop-channel per term) and
// `reconcileMember` (the status-to-action table). The Go source's
// `goto RECONCILE`/`goto WAIT` control flow becomes two nested labelled
// loops: `'term` restarts the barrier+establish cycle on every reconcile
// interval, `'select` drains the reconcile channel between ticks.

use crate::applier::Applier;
use crate::traits::{LeadershipHooks, RaftHandle};
use ganglion_core::{leader_event_name, Error, MemberStatus, NodeDetails, NodeStatus, NodeStatusValue};
use ganglion_membership::Membership;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct LeaderLoopConfig {
    pub service_prefix: String,
    pub local: NodeDetails,
    pub reconcile_interval: Duration,
    pub barrier_timeout: Duration,
}

pub struct LeaderLoop {
    raft: Arc<dyn RaftHandle>,
    applier: Arc<Applier>,
    membership: Arc<Membership>,
    hooks: Arc<dyn LeadershipHooks>,
    config: LeaderLoopConfig,
    first_bootstrap_id: Mutex<Option<String>>,
}

impl LeaderLoop {
    pub fn new(
        raft: Arc<dyn RaftHandle>,
        applier: Arc<Applier>,
        membership: Arc<Membership>,
        hooks: Arc<dyn LeadershipHooks>,
        config: LeaderLoopConfig,
    ) -> Arc<Self> {
        let first_bootstrap_id = if config.local.bootstrap {
            Some(config.local.id.clone())
        } else {
            None
        };
        Arc::new(Self {
            raft,
            applier,
            membership,
            hooks,
            config,
            first_bootstrap_id: Mutex::new(first_bootstrap_id),
        })
    }

    /// Observes `leader_changes` for the lifetime of the process,
    /// spawning a fresh term on each true edge and tearing it down on
    /// each false edge or global cancel (spec.md §4.8).
    pub async fn run(
        self: Arc<Self>,
        mut leader_changes: watch::Receiver<bool>,
        reconcile_rx: mpsc::Receiver<NodeDetails>,
        cancel: CancellationToken,
    ) {
        let mut reconcile_rx = reconcile_rx;
        if *leader_changes.borrow() {
            self.clone()
                .run_term(&mut reconcile_rx, leader_changes.clone(), cancel.child_token())
                .await;
        }
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = leader_changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if *leader_changes.borrow() {
                        self.clone()
                            .run_term(&mut reconcile_rx, leader_changes.clone(), cancel.child_token())
                            .await;
                    }
                }
            }
        }
    }

    async fn run_term(
        self: Arc<Self>,
        reconcile_rx: &mut mpsc::Receiver<NodeDetails>,
        mut leader_changes: watch::Receiver<bool>,
        term_cancel: CancellationToken,
    ) {
        let leader_event = leader_event_name(&self.config.service_prefix);
        let _ = self
            .membership
            .user_event(&leader_event, self.config.local.name.clone().into_bytes(), false)
            .await;

        let mut established = false;
        let mut ticker = tokio::time::interval(self.config.reconcile_interval);
        ticker.tick().await; // consume the immediate first tick

        'term: loop {
            if let Err(err) = self.raft.barrier(self.config.barrier_timeout).await {
                tracing::warn!(%err, "raft barrier failed, retrying next cycle");
                tokio::select! {
                    _ = term_cancel.cancelled() => break 'term,
                    _ = ticker.tick() => continue 'term,
                }
            }

            if !established {
                match self.hooks.establish_leadership().await {
                    Ok(()) => {
                        established = true;
                    }
                    Err(err) => {
                        tracing::warn!(%err, "establish_leadership failed, retrying next cycle");
                        tokio::select! {
                            _ = term_cancel.cancelled() => break 'term,
                            _ = ticker.tick() => continue 'term,
                        }
                    }
                }
            }

            loop {
                tokio::select! {
                    _ = term_cancel.cancelled() => break 'term,
                    changed = leader_changes.changed() => {
                        if changed.is_err() || !*leader_changes.borrow() {
                            break 'term;
                        }
                    }
                    _ = ticker.tick() => continue 'term,
                    member = reconcile_rx.recv() => {
                        match member {
                            Some(m) => self.reconcile_member(m).await,
                            None => break 'term,
                        }
                    }
                }
            }
        }

        if let Err(err) = self.hooks.revoke_leadership().await {
            tracing::warn!(%err, "revoke_leadership hook failed");
        }
    }

    /// Maps a reconciled member's status to a Raft-peer action and a
    /// published `NodeStatus` (spec.md §4.8's table). Peer add/remove
    /// errors are logged and otherwise ignored -- "already known" and
    /// "unknown peer" are idempotent no-ops for this core's purposes.
    async fn reconcile_member(&self, member: NodeDetails) {
        if member.data_center != self.config.local.data_center {
            tracing::warn!(member = %member.name, dc = %member.data_center, "skipping reconcile for member in a different data center");
            return;
        }

        let is_self = member.id == self.config.local.id;
        let addr = SocketAddr::new(member.address, member.port);

        match member.status {
            MemberStatus::Alive => {
                if !is_self {
                    if self.detect_dual_bootstrap(&member) {
                        self.publish_status(&member, NodeStatusValue::Alive).await;
                        return;
                    }
                    if let Err(err) = self.raft.add_peer(&member.id, addr).await {
                        tracing::debug!(%err, member = %member.name, "add_peer error ignored");
                    }
                }
                self.publish_status(&member, NodeStatusValue::Alive).await;
            }
            MemberStatus::Failed => {
                self.publish_status(&member, NodeStatusValue::Failed).await;
            }
            MemberStatus::Left => {
                if is_self {
                    return;
                }
                if let Err(err) = self.raft.remove_peer(&member.id).await {
                    tracing::debug!(%err, member = %member.name, "remove_peer error ignored");
                }
                self.publish_status(&member, NodeStatusValue::Left).await;
            }
            MemberStatus::Reap => {
                if is_self {
                    return;
                }
                if let Err(err) = self.raft.remove_peer(&member.id).await {
                    tracing::debug!(%err, member = %member.name, "remove_peer error ignored");
                }
                self.publish_status(&member, NodeStatusValue::Reaped).await;
            }
        }
    }

    /// A second distinct bootstrap-tagged member arriving after the
    /// first is a misconfigured operator starting two independent
    /// clusters; the peer add is skipped and the attempt is logged
    /// (spec.md §4.8 table note).
    fn detect_dual_bootstrap(&self, member: &NodeDetails) -> bool {
        if !member.bootstrap {
            return false;
        }
        let mut guard = self.first_bootstrap_id.lock().expect("bootstrap guard poisoned");
        match guard.as_ref() {
            None => {
                *guard = Some(member.id.clone());
                false
            }
            Some(existing) if existing == &member.id => false,
            Some(existing) => {
                tracing::warn!(
                    err = %Error::DualBootstrap(member.id.clone()),
                    existing,
                    "skipping peer add for second bootstrap node"
                );
                true
            }
        }
    }

    async fn publish_status(&self, member: &NodeDetails, status: NodeStatusValue) {
        let node_status = NodeStatus {
            id: member.id.clone(),
            name: member.name.clone(),
            data_center: member.data_center.clone(),
            status,
            addr: member.address,
            port: member.port,
        };
        let bytes = ganglion_codec::node_status::encode(&node_status);
        if let Err(err) = self.applier.apply(bytes).await {
            tracing::warn!(%err, member = %member.name, "failed to publish node status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::applier::ApplierConfig;
    use crate::fsm::FsmWrapper;
    use crate::local_raft::LocalRaftHandle;
    use crate::traits::{BoxFuture, NullApplicationFsm};
    use ganglion_core::ServiceEntry;
    use ganglion_transport::ConnectionPool;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn local_node(id: &str, bootstrap: bool) -> NodeDetails {
        NodeDetails {
            id: id.to_string(),
            name: id.to_string(),
            role: ganglion_core::node::SERVICE_ROLE.to_string(),
            data_center: "dc1".to_string(),
            bootstrap,
            address: "127.0.0.1".parse().unwrap(),
            port: 1,
            services: Vec::<ServiceEntry>::new(),
            status: MemberStatus::Alive,
        }
    }

    struct CountingHooks {
        establishes: AtomicUsize,
        revokes: AtomicUsize,
    }

    impl LeadershipHooks for CountingHooks {
        fn establish_leadership(&self) -> BoxFuture<'_, Result<(), Error>> {
            self.establishes.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }
        fn revoke_leadership(&self) -> BoxFuture<'_, Result<(), Error>> {
            self.revokes.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }
    }

    async fn build(local: NodeDetails) -> (Arc<LeaderLoop>, Arc<FsmWrapper>, Arc<LocalRaftHandle>, Arc<CountingHooks>) {
        let fsm = FsmWrapper::new(Arc::new(NullApplicationFsm));
        let raft = LocalRaftHandle::new(fsm.clone(), "127.0.0.1:9200".parse().unwrap());
        let pool = ConnectionPool::new(
            ganglion_transport::tls::insecure_client_config(),
            Duration::from_secs(1),
            Duration::from_secs(60),
        );
        let applier = Applier::new(raft.clone(), pool, ApplierConfig::default());
        let (membership, _events) = Membership::bind(
            local.clone(),
            "127.0.0.1:0".parse().unwrap(),
            ganglion_membership::MembershipConfig::default(),
        )
        .await
        .unwrap();
        let hooks = Arc::new(CountingHooks {
            establishes: AtomicUsize::new(0),
            revokes: AtomicUsize::new(0),
        });
        let config = LeaderLoopConfig {
            service_prefix: "ganglion".to_string(),
            local,
            reconcile_interval: Duration::from_millis(30),
            barrier_timeout: Duration::from_secs(1),
        };
        let leader_loop = LeaderLoop::new(raft.clone(), applier, membership, hooks.clone(), config);
        (leader_loop, fsm, raft, hooks)
    }

    #[tokio::test]
    async fn reconcile_member_skips_different_data_center() {
        let (leader_loop, fsm, _raft, _hooks) = build(local_node("n1", false)).await;
        let mut other_dc = local_node("n2", false);
        other_dc.data_center = "dc2".to_string();
        leader_loop.reconcile_member(other_dc).await;
        assert!(fsm.status_of("n2").is_none());
    }

    #[tokio::test]
    async fn reconcile_member_publishes_alive_status() {
        let (leader_loop, fsm, _raft, _hooks) = build(local_node("n1", false)).await;
        leader_loop.reconcile_member(local_node("n2", false)).await;
        assert_eq!(fsm.status_of("n2").map(|s| s.status), Some(NodeStatusValue::Alive));
    }

    #[tokio::test]
    async fn self_left_is_never_published() {
        let (leader_loop, fsm, _raft, _hooks) = build(local_node("n1", false)).await;
        let mut myself = local_node("n1", false);
        myself.status = MemberStatus::Left;
        leader_loop.reconcile_member(myself).await;
        assert!(fsm.status_of("n1").is_none());
    }

    #[tokio::test]
    async fn second_bootstrap_node_skips_peer_add_but_still_publishes() {
        let (leader_loop, fsm, _raft, _hooks) = build(local_node("n1", true)).await;
        leader_loop.reconcile_member(local_node("n2", true)).await;
        assert_eq!(fsm.status_of("n2").map(|s| s.status), Some(NodeStatusValue::Alive));
        assert!(leader_loop.detect_dual_bootstrap(&local_node("n3", true)));
    }

    #[tokio::test]
    async fn leader_leader_transition_establishes_once() {
        let (leader_loop, _fsm, raft, hooks) = build(local_node("n1", false)).await;
        let (_tx, reconcile_rx) = mpsc::channel(32);
        let cancel = CancellationToken::new();
        let leader_changes = raft.leader_changes();

        let run_cancel = cancel.clone();
        let handle = tokio::spawn(async move { leader_loop.run(leader_changes, reconcile_rx, run_cancel).await });

        tokio::time::sleep(Duration::from_millis(80)).await;
        raft.set_leader(true); // already true; watch only fires on change, so this is a no-op edge
        tokio::time::sleep(Duration::from_millis(80)).await;

        cancel.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;

        assert_eq!(hooks.establishes.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.revokes.load(Ordering::SeqCst), 1);
    }
}
