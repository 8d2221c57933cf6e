// ganglion-codec/src/node_status.rs
//
// The only tuple type the core itself consumes (spec.md §4.1): NodeStatus
// { id, name, data_center, status, addr, port }. Schema is registered
// once at first use via a `Lazy`, matching spec.md §9's "initialise at
// startup, never remove" registry lifecycle.

use crate::builder::TupleBuilder;
use crate::decoder::{decode_record, DecodedTuple, DEFAULT_MAX_SIZE};
use crate::registry::{self, TupleSchema};
use ganglion_core::{DecodeError, NodeStatus, NodeStatusValue};
use once_cell::sync::Lazy;
use std::net::IpAddr;

pub static NODE_STATUS_SCHEMA: Lazy<TupleSchema> =
    Lazy::new(|| registry::register("ganglion", "NodeStatus", 6));

pub fn encode(status: &NodeStatus) -> Vec<u8> {
    let schema = *NODE_STATUS_SCHEMA;
    let mut b = TupleBuilder::new(schema);
    b.push_field(status.id.as_bytes().to_vec());
    b.push_field(status.name.as_bytes().to_vec());
    b.push_field(status.data_center.as_bytes().to_vec());
    b.push_field(vec![status.status as u8]);
    b.push_field(status.addr.to_string().into_bytes());
    b.push_field(status.port.to_le_bytes().to_vec());
    b.build()
}

pub fn decode(bytes: &[u8]) -> Result<NodeStatus, DecodeError> {
    decode_with_max(bytes, DEFAULT_MAX_SIZE)
}

pub fn decode_with_max(bytes: &[u8], max_size: usize) -> Result<NodeStatus, DecodeError> {
    let tuple = decode_record(bytes, max_size)?;
    if tuple.schema.type_hash != NODE_STATUS_SCHEMA.type_hash
        || tuple.schema.namespace_hash != NODE_STATUS_SCHEMA.namespace_hash
    {
        return Err(DecodeError::UnknownType);
    }
    parse_fields(&tuple)
}

fn parse_fields(tuple: &DecodedTuple) -> Result<NodeStatus, DecodeError> {
    if tuple.field_count() != 6 {
        return Err(DecodeError::Truncated);
    }
    let id = field_string(tuple, 0)?;
    let name = field_string(tuple, 1)?;
    let data_center = field_string(tuple, 2)?;
    let status = match tuple.field_bytes(3).first().copied() {
        Some(0) => NodeStatusValue::Alive,
        Some(1) => NodeStatusValue::Failed,
        Some(2) => NodeStatusValue::Left,
        Some(3) => NodeStatusValue::Reaped,
        _ => return Err(DecodeError::Truncated),
    };
    let addr_str = field_string(tuple, 4)?;
    let addr: IpAddr = addr_str.parse().map_err(|_| DecodeError::Truncated)?;
    let port_bytes = tuple.field_bytes(5);
    if port_bytes.len() != 2 {
        return Err(DecodeError::Truncated);
    }
    let port = u16::from_le_bytes([port_bytes[0], port_bytes[1]]);

    Ok(NodeStatus {
        id,
        name,
        data_center,
        status,
        addr,
        port,
    })
}

fn field_string(tuple: &DecodedTuple, idx: usize) -> Result<String, DecodeError> {
    String::from_utf8(tuple.field_bytes(idx).to_vec()).map_err(|_| DecodeError::Truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NodeStatus {
        NodeStatus {
            id: "node-1".into(),
            name: "n1".into(),
            data_center: "dc1".into(),
            status: NodeStatusValue::Alive,
            addr: "10.0.0.5".parse().unwrap(),
            port: 9122,
        }
    }

    #[test]
    fn roundtrips() {
        let ns = sample();
        let bytes = encode(&ns);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, ns);
    }

    #[test]
    fn roundtrips_every_status_value() {
        for status in [
            NodeStatusValue::Alive,
            NodeStatusValue::Failed,
            NodeStatusValue::Left,
            NodeStatusValue::Reaped,
        ] {
            let mut ns = sample();
            ns.status = status;
            let bytes = encode(&ns);
            assert_eq!(decode(&bytes).unwrap(), ns);
        }
    }

    #[test]
    fn oversized_frame_fails_exceeds_max() {
        let ns = sample();
        let bytes = encode(&ns);
        assert_eq!(decode_with_max(&bytes, 4), Err(DecodeError::ExceedsMax));
    }
}
