// ganglion-codec/src/registry.rs
//
// Process-wide type registry: "initialise at startup, never remove"
// (spec.md §9). A `TupleSchema` is registered once per (namespace, type)
// pair; lookups are race-safe via a single RwLock.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TupleSchema {
    pub namespace: &'static str,
    pub type_name: &'static str,
    pub namespace_hash: u32,
    pub type_hash: u32,
    pub field_count: u32,
}

fn hash32(name: &str) -> u32 {
    let digest = blake3::hash(name.as_bytes());
    let bytes = digest.as_bytes();
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

static REGISTRY: Lazy<RwLock<HashMap<(u32, u32), TupleSchema>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Registers `type_name` under `namespace` with `field_count` fields.
/// Idempotent: registering the same (namespace, type_name) pair twice is
/// a no-op rather than a panic, so module-initialisation-time
/// registration is safe to call more than once (e.g. from tests).
pub fn register(namespace: &'static str, type_name: &'static str, field_count: u32) -> TupleSchema {
    let namespace_hash = hash32(namespace);
    let type_hash = hash32(type_name);
    let schema = TupleSchema {
        namespace,
        type_name,
        namespace_hash,
        type_hash,
        field_count,
    };
    REGISTRY
        .write()
        .expect("tuple registry lock poisoned")
        .entry((namespace_hash, type_hash))
        .or_insert(schema);
    schema
}

pub fn lookup(namespace_hash: u32, type_hash: u32) -> Option<TupleSchema> {
    REGISTRY
        .read()
        .expect("tuple registry lock poisoned")
        .get(&(namespace_hash, type_hash))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_lookup() {
        let schema = register("ganglion-test", "Widget", 2);
        let found = lookup(schema.namespace_hash, schema.type_hash).unwrap();
        assert_eq!(found, schema);
    }

    #[test]
    fn unknown_pair_is_none() {
        assert!(lookup(0xdead_beef, 0xfeed_face).is_none());
    }
}
