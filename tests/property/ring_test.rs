// tests/property/ring_test.rs

//! Property-based tests for the consistent hash ring

use proptest::prelude::*;
use spineldb_router::connection::NodeAddress;
use spineldb_router::core::sharding::{ConsistentHashRing, RingHash};

fn ring_hash() -> impl Strategy<Value = RingHash> {
    prop_oneof![Just(RingHash::Crc32), Just(RingHash::Murmur3)]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 50,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_removal_only_remaps_removed_node(
        node_count in 2usize..8,
        removed in 0usize..8,
        weights in prop::collection::vec(1u32..400, 8),
        hash in ring_hash(),
    ) {
        let removed = removed % node_count;
        let nodes: Vec<NodeAddress> = (0..node_count)
            .map(|i| NodeAddress::new("10.1.0.1", 7000 + i as u16))
            .collect();
        let mut ring = ConsistentHashRing::new(64, 100, hash);
        for (node, weight) in nodes.iter().zip(&weights) {
            ring.add(node.clone(), Some(*weight));
        }

        let keys: Vec<String> = (0..300).map(|i| format!("key:{i}")).collect();
        let before: Vec<NodeAddress> = keys
            .iter()
            .map(|k| ring.get_by_key(k.as_bytes()).cloned().unwrap())
            .collect();

        prop_assert!(ring.remove(&nodes[removed]));
        for (key, owner) in keys.iter().zip(&before) {
            let now = ring.get_by_key(key.as_bytes()).unwrap();
            prop_assert_ne!(now, &nodes[removed]);
            if owner != &nodes[removed] {
                prop_assert_eq!(now, owner);
            }
        }
    }

    #[test]
    fn test_lookup_always_hits_a_member(hash_value in any::<u32>(), node_count in 1usize..6) {
        let mut ring = ConsistentHashRing::default();
        for i in 0..node_count {
            ring.add(NodeAddress::new(format!("node{i}"), 6379), None);
        }
        let owner = ring.get(hash_value).unwrap();
        prop_assert!(ring.contains(owner));
    }
}
