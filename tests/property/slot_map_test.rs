// tests/property/slot_map_test.rs

//! Property-based tests for slot range algebra
//! Every sequence of assignments must match a flat one-owner-per-slot model

use proptest::prelude::*;
use spineldb_router::connection::NodeAddress;
use spineldb_router::core::cluster::SlotMap;

fn owner(i: u8) -> NodeAddress {
    NodeAddress::new(format!("10.0.0.{i}"), 7000)
}

fn assignment() -> impl Strategy<Value = (u32, u32, u8)> {
    (0u32..16384, 0u32..512, 0u8..4).prop_map(|(first, len, node)| {
        (first, (first + len).min(16383), node)
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        max_shrink_iters: 500,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_last_write_wins(assignments in prop::collection::vec(assignment(), 1..20)) {
        let mut map = SlotMap::new();
        let mut model: Vec<Option<NodeAddress>> = vec![None; 16384];
        for (first, last, node) in &assignments {
            map.set_range(*first, *last, owner(*node)).unwrap();
            for slot in *first..=*last {
                model[slot as usize] = Some(owner(*node));
            }
        }
        prop_assert_eq!(map.to_vec(), model);
    }

    #[test]
    fn test_ranges_stay_sorted_disjoint_and_merged(
        assignments in prop::collection::vec(assignment(), 1..20)
    ) {
        let mut map = SlotMap::new();
        for (first, last, node) in &assignments {
            map.set_range(*first, *last, owner(*node)).unwrap();
        }
        for pair in map.ranges().windows(2) {
            prop_assert!(pair[0].last < pair[1].first);
            prop_assert!(
                pair[0].owner != pair[1].owner || pair[0].last + 1 < pair[1].first
            );
        }
    }
}
