// ganglion-consensus/src/traits.rs
//
// The two external collaborators spec.md §1 names but treats as given:
// "the Raft library" and "the application's state machine". Boxed-future
// shape matches ganglion-transport::handler::StreamHandler rather than
// pulling in async-trait.

use ganglion_core::Error;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::watch;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What C6 (applier) and C9 (leader loop) need from the Raft library:
/// submit log entries, read current leadership, and watch for leadership
/// transitions (spec.md §2, §4.6, §4.9).
pub trait RaftHandle: Send + Sync {
    /// Submits `entry` to the Raft log. `enqueue_timeout` bounds only the
    /// wait to get the entry accepted into the log, not replication or
    /// commit (spec.md §4.6 Open Question: the enqueue-timeout `Apply`
    /// variant is the only one this core exposes).
    fn apply(&self, entry: Vec<u8>, enqueue_timeout: Duration) -> BoxFuture<'_, Result<(), Error>>;

    /// `None` when the cluster currently has no leader (spec.md §4.6:
    /// callers must be able to distinguish "no leader" from "I am not the
    /// leader").
    fn current_leader(&self) -> Option<SocketAddr>;

    fn is_leader(&self) -> bool;

    /// Blocks until all Raft operations enqueued before this call have
    /// been applied to the local FSM (used by the leader loop to avoid
    /// reconciling against stale state after a leadership transition).
    fn barrier(&self, timeout: Duration) -> BoxFuture<'_, Result<(), Error>>;

    fn add_peer(&self, id: &str, addr: SocketAddr) -> BoxFuture<'_, Result<(), Error>>;

    fn remove_peer(&self, id: &str) -> BoxFuture<'_, Result<(), Error>>;

    /// `true` on the watch channel whenever this node becomes leader,
    /// `false` whenever it steps down. C9 selects on this to start and
    /// stop the leader loop.
    fn leader_changes(&self) -> watch::Receiver<bool>;
}

/// What C10 (FSM wrapper) delegates to once it has consumed the
/// NodeStatus entries the core understands itself (spec.md §4.10: "any
/// other committed entry is handed to the application's own FSM
/// unchanged").
pub trait ApplicationFsm: Send + Sync {
    fn apply_unknown(&self, entry: &[u8]);
    fn snapshot(&self) -> Vec<u8>;
    fn restore(&self, snapshot: &[u8]);
}

/// An `ApplicationFsm` that ignores every entry, for deployments with no
/// application-level state machine of their own.
pub struct NullApplicationFsm;

impl ApplicationFsm for NullApplicationFsm {
    fn apply_unknown(&self, _entry: &[u8]) {}
    fn snapshot(&self) -> Vec<u8> {
        Vec::new()
    }
    fn restore(&self, _snapshot: &[u8]) {}
}

/// The two application hooks the leader loop (C9) drives (spec.md §4.8,
/// §6): called once per established/revoked term.
pub trait LeadershipHooks: Send + Sync {
    fn establish_leadership(&self) -> BoxFuture<'_, Result<(), Error>>;
    fn revoke_leadership(&self) -> BoxFuture<'_, Result<(), Error>>;
}

pub struct NullLeadershipHooks;

impl LeadershipHooks for NullLeadershipHooks {
    fn establish_leadership(&self) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async { Ok(()) })
    }
    fn revoke_leadership(&self) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async { Ok(()) })
    }
}
