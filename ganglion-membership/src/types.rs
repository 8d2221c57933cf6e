// ganglion-membership/src/types.rs

use ganglion_core::NodeDetails;

/// The single channel of events C7 emits (spec.md §4.7). The sentinel
/// `Reap` status lives on `NodeDetails::status`, not as a separate
/// variant here -- C8 rewrites a member's status to the sentinel before
/// classifying a `Fail` event as a reap (spec.md §4.7, §4.8).
#[derive(Debug, Clone)]
pub enum MembershipEvent {
    MemberJoin(NodeDetails),
    MemberUpdate(NodeDetails),
    MemberLeave(NodeDetails),
    MemberFail(NodeDetails),
    MemberReap(NodeDetails),
    User {
        name: String,
        payload: Vec<u8>,
        coalesce: bool,
    },
    Query {
        name: String,
        payload: Vec<u8>,
    },
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) enum WireMessage {
    Heartbeat(NodeDetails),
    Leaving(NodeDetails),
    User { name: String, payload: Vec<u8> },
    Query { name: String, payload: Vec<u8> },
}
