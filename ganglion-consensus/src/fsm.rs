// ganglion-consensus/src/fsm.rs
//
// C10: the single `raft.FSM` the core registers with the Raft library
// (spec.md §4.10). Committed entries that decode as a `NodeStatus` tuple
// update this node's own view of cluster member status internally;
// every other entry passes through to the application's FSM unchanged.
// Grounded on original_source/fsm.go's `FsmWrapper.Apply` (the
// type-sniffing dispatch) and `boltFsm.Snapshot`/`Restore` for the
// snapshot envelope shape.

use crate::traits::ApplicationFsm;
use ganglion_codec::node_status;
use ganglion_core::NodeStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Serialize, Deserialize)]
struct Snapshot {
    statuses: HashMap<String, NodeStatus>,
    application: Vec<u8>,
}

pub struct FsmWrapper {
    statuses: RwLock<HashMap<String, NodeStatus>>,
    application: Arc<dyn ApplicationFsm>,
}

impl FsmWrapper {
    pub fn new(application: Arc<dyn ApplicationFsm>) -> Arc<Self> {
        Arc::new(Self {
            statuses: RwLock::new(HashMap::new()),
            application,
        })
    }

    /// Applies one committed log entry. Entries this core does not
    /// recognise (any decode error, not just `UnknownType`) are handed
    /// to the application FSM verbatim -- a truncated or unregistered
    /// frame is exactly as much "not ours" as one with a foreign type
    /// hash.
    pub fn apply_committed(&self, entry: &[u8]) {
        match node_status::decode(entry) {
            Ok(status) => {
                self.statuses
                    .write()
                    .expect("fsm status map poisoned")
                    .insert(status.id.clone(), status);
            }
            Err(_) => self.application.apply_unknown(entry),
        }
    }

    pub fn status_of(&self, id: &str) -> Option<NodeStatus> {
        self.statuses.read().expect("fsm status map poisoned").get(id).cloned()
    }

    pub fn all_statuses(&self) -> Vec<NodeStatus> {
        self.statuses.read().expect("fsm status map poisoned").values().cloned().collect()
    }

    pub fn snapshot(&self) -> Vec<u8> {
        let snap = Snapshot {
            statuses: self.statuses.read().expect("fsm status map poisoned").clone(),
            application: self.application.snapshot(),
        };
        serde_json::to_vec(&snap).expect("fsm snapshot serialises")
    }

    pub fn restore(&self, bytes: &[u8]) {
        let snap: Snapshot = match serde_json::from_slice(bytes) {
            Ok(s) => s,
            Err(err) => {
                tracing::error!(%err, "discarding unreadable fsm snapshot");
                return;
            }
        };
        *self.statuses.write().expect("fsm status map poisoned") = snap.statuses;
        self.application.restore(&snap.application);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::NullApplicationFsm;
    use ganglion_core::NodeStatusValue;

    fn sample() -> NodeStatus {
        NodeStatus {
            id: "n1".into(),
            name: "n1".into(),
            data_center: "dc1".into(),
            status: NodeStatusValue::Alive,
            addr: "127.0.0.1".parse().unwrap(),
            port: 9000,
        }
    }

    #[test]
    fn applies_known_node_status_internally() {
        let fsm = FsmWrapper::new(Arc::new(NullApplicationFsm));
        let entry = node_status::encode(&sample());
        fsm.apply_committed(&entry);
        assert_eq!(fsm.status_of("n1"), Some(sample()));
    }

    #[test]
    fn snapshot_restore_roundtrips() {
        let fsm = FsmWrapper::new(Arc::new(NullApplicationFsm));
        fsm.apply_committed(&node_status::encode(&sample()));
        let snap = fsm.snapshot();

        let restored = FsmWrapper::new(Arc::new(NullApplicationFsm));
        restored.restore(&snap);
        assert_eq!(restored.status_of("n1"), Some(sample()));
    }

    #[test]
    fn unrecognised_entry_goes_to_application_fsm() {
        struct Counting(std::sync::atomic::AtomicUsize);
        impl ApplicationFsm for Counting {
            fn apply_unknown(&self, _entry: &[u8]) {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
            fn snapshot(&self) -> Vec<u8> {
                Vec::new()
            }
            fn restore(&self, _snapshot: &[u8]) {}
        }
        let app = Arc::new(Counting(std::sync::atomic::AtomicUsize::new(0)));
        let fsm = FsmWrapper::new(app.clone());
        fsm.apply_committed(b"not a tuple");
        assert_eq!(app.0.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
