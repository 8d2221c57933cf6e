// ganglion-membership/src/bridge.rs
//
// C8: classifies events from C7's channel, filters user events by
// service prefix, detects the leader-election event, and routes
// membership events onto the reconcile channel when the local node is
// leader. Ported from
// original_source/Godeps/.../serfer/handler.go's `SerfEventHandler
// ::HandleEvent` -- trait-object hooks replace the Go struct's function
// pointers, a `match` replaces its event-type switch.

use crate::types::MembershipEvent;
use ganglion_core::{leader_event_name, NodeDetails};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// User-provided reactions to membership facts. Every method has a
/// no-op default so a caller only overrides the events it cares about,
/// matching the Go source's optional handler-function-pointer fields.
pub trait MembershipHooks: Send + Sync {
    fn on_join(&self, _node: &NodeDetails) {}
    fn on_update(&self, _node: &NodeDetails) {}
    fn on_leave(&self, _node: &NodeDetails) {}
    fn on_fail(&self, _node: &NodeDetails) {}
    fn on_reap(&self, _node: &NodeDetails) {}
    fn on_user_event(&self, _name: &str, _payload: &[u8]) {}
    fn on_unknown_event(&self, _name: &str, _payload: &[u8]) {}
    fn on_query(&self, _name: &str, _payload: &[u8]) {}
    fn on_leader_elected(&self, _leader_name: &str) {}
}

#[derive(Debug, Clone, Copy)]
pub struct ReconcileFlags {
    pub on_join: bool,
    pub on_update: bool,
    pub on_leave: bool,
    pub on_fail: bool,
    pub on_reap: bool,
}

impl Default for ReconcileFlags {
    fn default() -> Self {
        Self {
            on_join: true,
            on_update: true,
            on_leave: true,
            on_fail: true,
            on_reap: true,
        }
    }
}

pub struct EventBridge {
    service_prefix: String,
    hooks: Arc<dyn MembershipHooks>,
    reconcile_flags: ReconcileFlags,
    is_leader: Arc<dyn Fn() -> bool + Send + Sync>,
    reconcile_tx: mpsc::Sender<NodeDetails>,
    known_leader: RwLock<Option<String>>,
}

impl EventBridge {
    pub fn new(
        service_prefix: impl Into<String>,
        hooks: Arc<dyn MembershipHooks>,
        reconcile_flags: ReconcileFlags,
        is_leader: Arc<dyn Fn() -> bool + Send + Sync>,
        reconcile_tx: mpsc::Sender<NodeDetails>,
    ) -> Self {
        Self {
            service_prefix: service_prefix.into(),
            hooks,
            reconcile_flags,
            is_leader,
            reconcile_tx,
            known_leader: RwLock::new(None),
        }
    }

    /// The single consumer task of C7's event channel (spec.md §5:
    /// "processed in the order the gossip library delivers them, by a
    /// single consumer task").
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<MembershipEvent>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => break,
                    }
                }
            }
        }
    }

    /// The locally-cached leader name from the user-event broadcast.
    /// Informational only -- spec.md §9 is explicit that it "must not be
    /// used for correctness decisions"; authoritative leadership comes
    /// from Raft state.
    pub fn cached_leader(&self) -> Option<String> {
        self.known_leader.read().expect("known_leader lock poisoned").clone()
    }

    fn handle_event(&self, event: MembershipEvent) {
        match event {
            MembershipEvent::MemberJoin(n) => {
                self.hooks.on_join(&n);
                if self.reconcile_flags.on_join {
                    self.reconcile(n);
                }
            }
            MembershipEvent::MemberUpdate(n) => {
                self.hooks.on_update(&n);
                if self.reconcile_flags.on_update {
                    self.reconcile(n);
                }
            }
            MembershipEvent::MemberLeave(n) => {
                self.hooks.on_leave(&n);
                if self.reconcile_flags.on_leave {
                    self.reconcile(n);
                }
            }
            MembershipEvent::MemberFail(n) => {
                self.hooks.on_fail(&n);
                if self.reconcile_flags.on_fail {
                    self.reconcile(n);
                }
            }
            MembershipEvent::MemberReap(n) => {
                self.hooks.on_reap(&n);
                if self.reconcile_flags.on_reap {
                    self.reconcile(n);
                }
            }
            MembershipEvent::User { name, payload, .. } => self.handle_user_event(&name, payload),
            MembershipEvent::Query { name, payload } => self.hooks.on_query(&name, &payload),
        }
    }

    fn handle_user_event(&self, name: &str, payload: Vec<u8>) {
        let leader_event = leader_event_name(&self.service_prefix);
        if name == leader_event {
            if let Ok(leader_name) = String::from_utf8(payload.clone()) {
                *self.known_leader.write().expect("known_leader lock poisoned") = Some(leader_name.clone());
                self.hooks.on_leader_elected(&leader_name);
            }
            return;
        }

        let prefix = format!("{}:", self.service_prefix);
        match name.strip_prefix(&prefix) {
            Some(stripped) => self.hooks.on_user_event(stripped, &payload),
            None => self.hooks.on_unknown_event(name, &payload),
        }
    }

    /// Non-blocking send; dropped silently when the reconcile channel is
    /// full or when the local node is not leader (spec.md §4.7, §8
    /// Property 4). The leader loop's periodic re-reconciliation is what
    /// guarantees eventual convergence for dropped events.
    fn reconcile(&self, member: NodeDetails) {
        if !(self.is_leader)() {
            return;
        }
        if self.reconcile_tx.try_send(member).is_err() {
            tracing::trace!("reconcile channel full or closed, dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ganglion_core::{MemberStatus, ServiceEntry};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn node(id: &str) -> NodeDetails {
        NodeDetails {
            id: id.to_string(),
            name: id.to_string(),
            role: ganglion_core::node::SERVICE_ROLE.to_string(),
            data_center: "dc1".to_string(),
            bootstrap: false,
            address: "127.0.0.1".parse().unwrap(),
            port: 1,
            services: Vec::<ServiceEntry>::new(),
            status: MemberStatus::Alive,
        }
    }

    struct CountingHooks {
        joins: AtomicUsize,
        leader_elections: std::sync::Mutex<Vec<String>>,
    }

    impl MembershipHooks for CountingHooks {
        fn on_join(&self, _node: &NodeDetails) {
            self.joins.fetch_add(1, Ordering::SeqCst);
        }
        fn on_leader_elected(&self, leader_name: &str) {
            self.leader_elections.lock().unwrap().push(leader_name.to_string());
        }
    }

    #[tokio::test]
    async fn reconcile_is_dropped_when_not_leader() {
        let hooks = Arc::new(CountingHooks {
            joins: AtomicUsize::new(0),
            leader_elections: std::sync::Mutex::new(Vec::new()),
        });
        let (tx, mut rx) = mpsc::channel(32);
        let bridge = EventBridge::new(
            "ganglion",
            hooks.clone(),
            ReconcileFlags::default(),
            Arc::new(|| false),
            tx,
        );

        bridge.handle_event(MembershipEvent::MemberJoin(node("n2")));
        assert_eq!(hooks.joins.load(Ordering::SeqCst), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn reconcile_enqueues_when_leader() {
        let hooks = Arc::new(CountingHooks {
            joins: AtomicUsize::new(0),
            leader_elections: std::sync::Mutex::new(Vec::new()),
        });
        let (tx, mut rx) = mpsc::channel(32);
        let bridge = EventBridge::new(
            "ganglion",
            hooks,
            ReconcileFlags::default(),
            Arc::new(|| true),
            tx,
        );

        bridge.handle_event(MembershipEvent::MemberJoin(node("n2")));
        let member = rx.try_recv().unwrap();
        assert_eq!(member.id, "n2");
    }

    #[tokio::test]
    async fn leader_election_event_is_recognised() {
        let hooks = Arc::new(CountingHooks {
            joins: AtomicUsize::new(0),
            leader_elections: std::sync::Mutex::new(Vec::new()),
        });
        let (tx, _rx) = mpsc::channel(32);
        let bridge = EventBridge::new(
            "ganglion",
            hooks.clone(),
            ReconcileFlags::default(),
            Arc::new(|| false),
            tx,
        );

        bridge.handle_event(MembershipEvent::User {
            name: "ganglion:new-leader".to_string(),
            payload: b"n1".to_vec(),
            coalesce: false,
        });
        assert_eq!(bridge.cached_leader(), Some("n1".to_string()));
        assert_eq!(hooks.leader_elections.lock().unwrap().as_slice(), ["n1"]);
    }
}
