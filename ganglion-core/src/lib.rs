// SPDX-License-Identifier: MIT
//
// Shared vocabulary for the ganglion coordination core: the error enum
// every crate's leaf errors funnel into, the node/member data model, and
// the one-byte stream-type tags the transport dispatches on.

pub mod error;
pub mod node;
pub mod stream;

pub use error::{DecodeError, Error};
pub use node::{MemberStatus, NodeDetails, NodeStatus, NodeStatusValue, ServiceEntry};
pub use stream::{StreamType, STREAM_FORWARD, STREAM_RAFT};

/// Reserved user-event name prefix used for the leader-election broadcast
/// (`<service_prefix>:new-leader`, spec.md §6). The default prefix; a
/// deployment may configure a different one via `GanglionConfig`.
pub const DEFAULT_SERVICE_PREFIX: &str = "ganglion";
pub const NEW_LEADER_EVENT: &str = "new-leader";

pub fn leader_event_name(service_prefix: &str) -> String {
    format!("{service_prefix}:{NEW_LEADER_EVENT}")
}

pub type Result<T> = std::result::Result<T, Error>;
