// ganglion-consensus/src/local_raft.rs
//
// Single-node, always-leader `RaftHandle` test double. Stands in for the
// real Raft library in this crate's own tests and in ganglion-node's
// end-to-end scenarios, the way the teacher's `cell-consensus` tests
// exercise `WriteAheadLog`/`NetworkTransport` against an in-memory
// double rather than a real multi-node cluster.

use crate::fsm::FsmWrapper;
use crate::traits::{BoxFuture, RaftHandle};
use ganglion_core::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub struct LocalRaftHandle {
    fsm: Arc<FsmWrapper>,
    local_addr: SocketAddr,
    leader_tx: watch::Sender<bool>,
    leader_rx: watch::Receiver<bool>,
}

impl LocalRaftHandle {
    pub fn new(fsm: Arc<FsmWrapper>, local_addr: SocketAddr) -> Arc<Self> {
        let (leader_tx, leader_rx) = watch::channel(true);
        Arc::new(Self {
            fsm,
            local_addr,
            leader_tx,
            leader_rx,
        })
    }

    /// Test hook: flips this node's leadership, as if it had been
    /// deposed or re-elected by a real cluster.
    pub fn set_leader(&self, leader: bool) {
        let _ = self.leader_tx.send(leader);
    }
}

impl RaftHandle for LocalRaftHandle {
    fn apply(&self, entry: Vec<u8>, _enqueue_timeout: Duration) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async move {
            self.fsm.apply_committed(&entry);
            Ok(())
        })
    }

    fn current_leader(&self) -> Option<SocketAddr> {
        if *self.leader_rx.borrow() {
            Some(self.local_addr)
        } else {
            None
        }
    }

    fn is_leader(&self) -> bool {
        *self.leader_rx.borrow()
    }

    fn barrier(&self, _timeout: Duration) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async { Ok(()) })
    }

    fn add_peer(&self, _id: &str, _addr: SocketAddr) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async { Ok(()) })
    }

    fn remove_peer(&self, _id: &str) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async { Ok(()) })
    }

    fn leader_changes(&self) -> watch::Receiver<bool> {
        self.leader_rx.clone()
    }
}
