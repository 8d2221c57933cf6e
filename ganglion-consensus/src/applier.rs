// ganglion-consensus/src/applier.rs
//
// C6: the single entry point every encoded tuple passes through on its
// way into the Raft log, whether it originated locally (the leader loop,
// C9) or arrived over a forwarding stream (C5). Grounded on
// original_source/applier.go's `Applier.Apply` -- only the
// configurable-enqueue-timeout variant survives (design note, Open
// Question resolved in DESIGN.md: the source's second, hard-coded-timeout
// `Apply` overload added nothing this core's callers need) -- and
// forwarder.go's leader-forwarding dial/write sequence.

use crate::traits::RaftHandle;
use ganglion_core::{Error, StreamType};
use ganglion_transport::{ConnectionPool, Deadline, DeadlineError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, Copy)]
pub struct ApplierConfig {
    /// Bound on getting an entry accepted into the local Raft log
    /// (spec.md §4.6). Configurable per deployment.
    pub enqueue_timeout: Duration,
    /// Fixed dial timeout to the current leader when forwarding
    /// (spec.md §4.5): 3 seconds, not configurable.
    pub forward_dial_timeout: Duration,
    /// Payloads past this size are applied anyway, just logged at warn
    /// level (spec.md §4.6 edge case).
    pub payload_warn_threshold: usize,
}

impl Default for ApplierConfig {
    fn default() -> Self {
        Self {
            enqueue_timeout: Duration::from_secs(5),
            forward_dial_timeout: Duration::from_secs(3),
            payload_warn_threshold: 1024 * 1024,
        }
    }
}

pub struct Applier {
    raft: Arc<dyn RaftHandle>,
    pool: Arc<ConnectionPool>,
    config: ApplierConfig,
}

impl Applier {
    pub fn new(raft: Arc<dyn RaftHandle>, pool: Arc<ConnectionPool>, config: ApplierConfig) -> Arc<Self> {
        Arc::new(Self { raft, pool, config })
    }

    /// Applies an already-encoded tuple record. Leaders submit directly
    /// to Raft; followers forward to the current leader. A cluster with
    /// no known leader fails the call outright (spec.md §4.6: callers
    /// must not silently queue work with no leader to apply it).
    pub async fn apply(&self, tuple: Vec<u8>) -> Result<(), Error> {
        if tuple.len() > self.config.payload_warn_threshold {
            tracing::warn!(bytes = tuple.len(), "applying unusually large tuple payload");
        }

        if self.raft.is_leader() {
            return self.raft.apply(tuple, self.config.enqueue_timeout).await;
        }

        let leader = self.raft.current_leader().ok_or(Error::NoLeader)?;
        self.forward(leader, tuple).await
    }

    async fn forward(&self, leader: SocketAddr, tuple: Vec<u8>) -> Result<(), Error> {
        let deadline = Deadline::new(self.config.forward_dial_timeout);
        let mut stream = deadline
            .execute(self.pool.dial(StreamType::Forward, leader))
            .await
            .map_err(|err| match err {
                DeadlineError::Elapsed(_) => Error::DialTimeout { addr: leader },
                DeadlineError::Inner(inner) => inner,
            })?;

        stream.write_all(&tuple).await.map_err(Error::Io)?;
        stream.shutdown().await.map_err(Error::Io)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsm::FsmWrapper;
    use crate::local_raft::LocalRaftHandle;
    use crate::traits::NullApplicationFsm;
    use ganglion_codec::node_status;
    use ganglion_core::{NodeStatus, NodeStatusValue};

    fn pool() -> Arc<ConnectionPool> {
        ConnectionPool::new(
            ganglion_transport::tls::insecure_client_config(),
            Duration::from_secs(1),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn leader_applies_directly() {
        let fsm = FsmWrapper::new(Arc::new(NullApplicationFsm));
        let raft = LocalRaftHandle::new(fsm.clone(), "127.0.0.1:9100".parse().unwrap());
        let applier = Applier::new(raft, pool(), ApplierConfig::default());

        let status = NodeStatus {
            id: "n1".into(),
            name: "n1".into(),
            data_center: "dc1".into(),
            status: NodeStatusValue::Alive,
            addr: "127.0.0.1".parse().unwrap(),
            port: 9000,
        };
        applier.apply(node_status::encode(&status)).await.unwrap();
        assert_eq!(fsm.status_of("n1"), Some(status));
    }

    #[tokio::test]
    async fn follower_with_no_leader_fails() {
        let fsm = FsmWrapper::new(Arc::new(NullApplicationFsm));
        let raft = LocalRaftHandle::new(fsm, "127.0.0.1:9101".parse().unwrap());
        raft.set_leader(false);
        let applier = Applier::new(raft, pool(), ApplierConfig::default());

        let err = applier.apply(vec![0u8; 4]).await.unwrap_err();
        assert!(matches!(err, Error::NoLeader));
    }
}
