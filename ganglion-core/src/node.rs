// ganglion-core/src/node.rs
//
// NodeDetails and the two distinct status enums (spec.md §3): the gossip
// level MemberStatus (what the membership layer observed) and the
// NodeStatusValue written into the Raft log by the leader loop. Keeping
// them as separate types matches the source's split between serf's
// member status and the codec's NodeStatus tuple -- collapsing them would
// make the Reap sentinel (a reconcile-time concept, not a gossip-level
// one) ambiguous with a genuine gossip "left" observation.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

pub const SERVICE_ROLE: &str = "ganglion-server";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberStatus {
    Alive,
    Failed,
    Left,
    /// Sentinel used only during reconciliation to distinguish a reap
    /// (failure-detector timeout past the leave grace period) from a
    /// plain graceful leave. Never observed directly from the wire.
    Reap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeStatusValue {
    Alive = 0,
    Failed = 1,
    Left = 2,
    Reaped = 3,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub name: String,
    pub port: u16,
}

/// Derived from a gossip member's tags at event-delivery time. Immutable
/// per event snapshot -- a later event for the same member produces a
/// fresh `NodeDetails`, it never mutates one in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDetails {
    pub id: String,
    pub name: String,
    pub role: String,
    pub data_center: String,
    pub bootstrap: bool,
    pub address: IpAddr,
    pub port: u16,
    pub services: Vec<ServiceEntry>,
    pub status: MemberStatus,
}

impl NodeDetails {
    /// A member counts as a ganglion node only if it carries both an
    /// `id` tag and `role == ganglion-server` (spec.md §3).
    pub fn is_ganglion_node(&self) -> bool {
        !self.id.is_empty() && self.role == SERVICE_ROLE
    }
}

/// The durable record the leader loop publishes through Raft (spec.md §3,
/// §4.8). Field layout matches the tuple codec's `NodeStatus` schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub id: String,
    pub name: String,
    pub data_center: String,
    pub status: NodeStatusValue,
    pub addr: IpAddr,
    pub port: u16,
}

/// `name:port(;name:port)*` tag parsing (spec.md §6). Malformed entries
/// are a hard error -- the whole node is rejected, not just that entry.
pub fn parse_services(raw: &str) -> Result<Vec<ServiceEntry>, String> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    raw.split(';')
        .map(|entry| {
            let (name, port) = entry
                .split_once(':')
                .ok_or_else(|| format!("malformed services entry: {entry:?}"))?;
            let port: u16 = port
                .parse()
                .map_err(|_| format!("malformed services port: {entry:?}"))?;
            if name.is_empty() {
                return Err(format!("malformed services entry: {entry:?}"));
            }
            Ok(ServiceEntry {
                name: name.to_string(),
                port,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multiple_services() {
        let svcs = parse_services("http:8080;grpc:9090").unwrap();
        assert_eq!(
            svcs,
            vec![
                ServiceEntry { name: "http".into(), port: 8080 },
                ServiceEntry { name: "grpc".into(), port: 9090 },
            ]
        );
    }

    #[test]
    fn empty_services_is_ok() {
        assert_eq!(parse_services("").unwrap(), Vec::new());
    }

    #[test]
    fn rejects_malformed_entry() {
        assert!(parse_services("http").is_err());
        assert!(parse_services("http:notaport").is_err());
        assert!(parse_services(":8080").is_err());
    }

    #[test]
    fn ganglion_node_requires_id_and_role() {
        let mut n = NodeDetails {
            id: String::new(),
            name: "n1".into(),
            role: SERVICE_ROLE.into(),
            data_center: "dc1".into(),
            bootstrap: false,
            address: "127.0.0.1".parse().unwrap(),
            port: 1,
            services: vec![],
            status: MemberStatus::Alive,
        };
        assert!(!n.is_ganglion_node());
        n.id = "abc".into();
        assert!(n.is_ganglion_node());
        n.role = "something-else".into();
        assert!(!n.is_ganglion_node());
    }
}
