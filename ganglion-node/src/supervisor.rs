// ganglion-node/src/supervisor.rs
//
// C11: owns every component's lifetime and enforces spec.md §4.10's
// start/stop ordering. Grounded on original_source/service.go's
// `Service`/`Context` start contract and `server.go`'s directory-layout
// creation; this core has no real Raft library to vendor, so the Raft
// node itself is `ganglion_consensus::LocalRaftHandle` (single-node,
// always-leader) rather than a wired-up multi-node cluster -- the stand-in
// documented in SPEC_FULL.md and DESIGN.md.

use crate::config::GanglionConfig;
use ganglion_consensus::{
    Applier, ApplierConfig, ForwardHandler, FsmWrapper, LeaderLoop, LeaderLoopConfig, LocalRaftHandle,
    RaftHandle, RaftStreamLayer,
};
use ganglion_consensus::{ApplicationFsm, LeadershipHooks};
use ganglion_core::{Error, NodeDetails, StreamType};
use ganglion_membership::{EventBridge, Membership, MembershipConfig, MembershipHooks, ReconcileFlags};
use ganglion_transport::{tls, ConnectionPool, Dispatcher, StreamHandler};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

/// Sets up `<data>/serf`, `<data>/raft`, `<data>/raft/snapshots`,
/// `<data>/tmp` and clears the temp directory on start (spec.md §6,
/// original_source/server.go's `os.MkdirAll` sequence).
fn prepare_data_dirs(root: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(root.join("serf"))?;
    std::fs::create_dir_all(root.join("raft").join("snapshots"))?;
    let tmp = root.join("tmp");
    if tmp.exists() {
        std::fs::remove_dir_all(&tmp)?;
    }
    std::fs::create_dir_all(&tmp)?;
    Ok(())
}

struct Handles {
    accept: JoinHandle<()>,
    reaper: JoinHandle<()>,
    event_bridge: JoinHandle<()>,
    leader_loop: JoinHandle<()>,
}

pub struct Supervisor {
    config: GanglionConfig,
    cancel: CancellationToken,
    pool: Arc<ConnectionPool>,
    membership: Arc<Membership>,
    fsm: Arc<FsmWrapper>,
    raft: Arc<LocalRaftHandle>,
    applier: Arc<Applier>,
    handles: Option<Handles>,
    leader: Arc<AtomicBool>,
}

impl Supervisor {
    /// Start ordering (spec.md §4.10): directories, TLS, Raft stream
    /// layer via the dispatcher, Raft node, applier/forwarder, leader
    /// monitor, membership event handler, then `membership.join` -- a
    /// join failure aborts startup unless `bootstrap` is set.
    pub async fn start(
        config: GanglionConfig,
        local: NodeDetails,
        membership_hooks: Arc<dyn MembershipHooks>,
        leadership_hooks: Arc<dyn LeadershipHooks>,
        application_fsm: Arc<dyn ApplicationFsm>,
    ) -> anyhow::Result<Self> {
        prepare_data_dirs(&config.data_path)?;

        let (cert_chain, key) = match (&config.tls.cert_path, &config.tls.key_path) {
            (Some(cert_path), Some(key_path)) => {
                let cert_pem = std::fs::read(cert_path)?;
                let key_pem = std::fs::read(key_path)?;
                (tls::load_cert_chain(&cert_pem)?, tls::load_private_key(&key_pem)?)
            }
            _ => tls::generate_self_signed(&config.node_name)?,
        };
        let server_config = tls::server_config(cert_chain, key)?;
        let acceptor = TlsAcceptor::from(server_config);
        let client_config = tls::insecure_client_config();

        let cancel = CancellationToken::new();

        let pool = ConnectionPool::new(client_config, config.connection_deadline, config.connection_deadline * 12);
        let reaper = pool.spawn_reaper();

        let dispatcher = Dispatcher::new(config.connection_deadline, 1024);

        let fsm = FsmWrapper::new(application_fsm);
        let raft = LocalRaftHandle::new(fsm.clone(), config.raft_bind_addr);

        let (raft_layer, handoff_tx) = RaftStreamLayer::new(pool.clone(), config.raft_bind_addr, 64);
        dispatcher.register(
            StreamType::Raft,
            Arc::new(ganglion_consensus::raft_layer::handoff_handler(handoff_tx)) as Arc<dyn StreamHandler>,
        );
        // The in-repo single-node Raft stand-in never dials or accepts
        // through the layer; it is still wired into the dispatcher so C4
        // is exercised exactly as a real multi-node Raft library would
        // use it.
        drop(raft_layer);

        let applier = Applier::new(
            raft.clone(),
            pool.clone(),
            ApplierConfig {
                enqueue_timeout: config.enqueue_timeout,
                ..ApplierConfig::default()
            },
        );
        let forward_handler = ForwardHandler::new(applier.clone(), ganglion_codec::DEFAULT_MAX_SIZE);
        dispatcher.register(StreamType::Forward, forward_handler as Arc<dyn StreamHandler>);

        let listener = TcpListener::bind(config.raft_bind_addr).await?;
        let accept = dispatcher.bind(listener, acceptor, cancel.child_token());

        let (membership, events_rx) = Membership::bind(local.clone(), config.gossip_bind_socket(), MembershipConfig::default())
            .await
            .map_err(anyhow::Error::from)?;

        let leader = Arc::new(AtomicBool::new(raft.is_leader()));
        let (reconcile_tx, reconcile_rx) = mpsc::channel(32);
        let leader_for_bridge = leader.clone();
        let event_bridge = EventBridge::new(
            config.service_prefix.clone(),
            membership_hooks,
            ReconcileFlags::default(),
            Arc::new(move || leader_for_bridge.load(Ordering::SeqCst)),
            reconcile_tx,
        );
        let event_bridge = Arc::new(event_bridge);
        let event_bridge_handle = tokio::spawn(event_bridge.clone().run(events_rx, cancel.child_token()));

        let leader_loop = LeaderLoop::new(
            raft.clone(),
            applier.clone(),
            membership.clone(),
            leadership_hooks,
            LeaderLoopConfig {
                service_prefix: config.service_prefix.clone(),
                local: local.clone(),
                reconcile_interval: config.reconcile_interval,
                barrier_timeout: config.connection_deadline,
            },
        );
        let mut leader_changes = raft.leader_changes();
        let leader_tracker = leader.clone();
        let leader_loop_handle = {
            let leader_changes_for_loop = leader_changes.clone();
            let loop_cancel = cancel.child_token();
            tokio::spawn(async move { leader_loop.run(leader_changes_for_loop, reconcile_rx, loop_cancel).await })
        };
        let tracker_cancel = cancel.child_token();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tracker_cancel.cancelled() => break,
                    changed = leader_changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        leader_tracker.store(*leader_changes.borrow(), Ordering::SeqCst);
                    }
                }
            }
        });

        let existing: Vec<SocketAddr> = config.existing_nodes.clone();
        if let Err(err) = membership.join(&existing).await {
            if !config.bootstrap {
                cancel.cancel();
                return Err(anyhow::anyhow!("membership join failed: {err}"));
            }
            tracing::warn!(%err, "membership join failed, continuing in bootstrap mode");
        }

        Ok(Self {
            config,
            cancel,
            pool,
            membership,
            fsm,
            raft,
            applier,
            handles: Some(Handles {
                accept,
                reaper,
                event_bridge: event_bridge_handle,
                leader_loop: leader_loop_handle,
            }),
            leader,
        })
    }

    pub fn fsm(&self) -> &Arc<FsmWrapper> {
        &self.fsm
    }

    pub fn raft(&self) -> &Arc<LocalRaftHandle> {
        &self.raft
    }

    pub fn applier(&self) -> &Arc<Applier> {
        &self.applier
    }

    pub fn is_leader(&self) -> bool {
        self.leader.load(Ordering::SeqCst)
    }

    /// Stop ordering (spec.md §4.10): cancel the global context, leave
    /// the gossip cluster, then tear transport down from the inside out.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        let _ = self.membership.leave().await;
        self.membership.shutdown().await;

        if let Some(handles) = self.handles.take() {
            handles.accept.abort();
            handles.reaper.abort();
            let _ = handles.event_bridge.await;
            let _ = handles.leader_loop.await;
        }

        self.pool.shutdown().await;
    }

    pub fn config(&self) -> &GanglionConfig {
        &self.config
    }
}

pub type SupervisorResult<T> = Result<T, Error>;
