//! Well-known keys in the cluster key space and in store-local storage.

use crate::node::NodeId;
use crate::store::StoreId;

/// Lower bound of the user key space.
pub const KEY_MIN: &[u8] = b"";

/// Prefix of keys that are local to a single store and never routed.
pub const LOCAL_PREFIX: &[u8] = b"\x01local-";

/// Persisted [`StoreIdent`](crate::store::StoreIdent) of a store.
pub const STORE_IDENT_KEY: &[u8] = b"\x01local-store-ident";

/// Range descriptors hosted by a store.
pub const RANGE_DESCRIPTORS_KEY: &[u8] = b"\x01local-range-descriptors";

/// Addresses persisted on behalf of the gossip substrate.
pub const GOSSIP_BOOTSTRAP_KEY: &[u8] = b"\x01local-gossip-bootstrap";

/// Prefix of the system key space.
pub const SYSTEM_PREFIX: &[u8] = b"\x02sys-";

/// Counter used to allocate node IDs.
pub const NODE_ID_GENERATOR: &[u8] = b"\x02sys-node-idgen";

/// Counter used to allocate store IDs.
pub const STORE_ID_GENERATOR: &[u8] = b"\x02sys-store-idgen";

/// Prefix under which schema descriptors are seeded.
pub const DESCRIPTOR_PREFIX: &[u8] = b"\x02sys-desc-";

/// Prefix of the name-to-descriptor-ID index.
pub const NAMESPACE_PREFIX: &[u8] = b"\x02sys-ns-";

/// Gossip key of the cluster ID.
pub const KEY_CLUSTER_ID: &str = "cluster-id";

const KEY_NODE_ID_PREFIX: &str = "node";
const KEY_STORE_PREFIX: &str = "store";

pub fn is_local(key: &[u8]) -> bool {
    key.starts_with(LOCAL_PREFIX)
}

/// Gossip key under which a node's descriptor is published.
pub fn make_node_id_key(node_id: NodeId) -> String {
    format!("{KEY_NODE_ID_PREFIX}:{node_id}")
}

/// Gossip key under which a store's descriptor is published.
pub fn make_store_key(store_id: StoreId) -> String {
    format!("{KEY_STORE_PREFIX}:{store_id}")
}

/// Key mapping `(parent_id, name)` to a descriptor ID.
pub fn make_name_key(parent_id: u32, name: &str) -> Vec<u8> {
    let mut key = NAMESPACE_PREFIX.to_vec();
    key.extend_from_slice(&parent_id.to_be_bytes());
    key.extend_from_slice(name.as_bytes());
    key
}

pub fn make_descriptor_key(id: u32) -> Vec<u8> {
    let mut key = DESCRIPTOR_PREFIX.to_vec();
    key.extend_from_slice(&id.to_be_bytes());
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gossip_keys() {
        assert_eq!(make_node_id_key(NodeId(5)), "node:5");
        assert_eq!(make_store_key(StoreId(12)), "store:12");
    }

    #[test]
    fn local_keys_are_recognised() {
        assert!(is_local(STORE_IDENT_KEY));
        assert!(is_local(GOSSIP_BOOTSTRAP_KEY));
        assert!(!is_local(NODE_ID_GENERATOR));
        assert!(!is_local(b"user-key"));
    }

    #[test]
    fn name_keys_group_by_parent() {
        assert!(make_name_key(1, "zzz") < make_name_key(2, "aaa"));
        assert!(make_name_key(1, "users").ends_with(b"users"));
    }

    #[test]
    fn descriptor_keys_sort_by_id() {
        assert!(make_descriptor_key(2) < make_descriptor_key(10));
        assert!(make_descriptor_key(1).starts_with(SYSTEM_PREFIX));
    }
}
