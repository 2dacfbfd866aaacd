// tests/property/hash_tag_test.rs

//! Property-based tests for hash tags and slot hashing

use proptest::prelude::*;
use spineldb_router::core::cluster::slot::{MAX_SLOT, get_slot, hash_tag, slot_for_tag};

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 500,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_slot_is_deterministic_and_bounded(key in prop::collection::vec(any::<u8>(), 0..64)) {
        let slot = get_slot(&key);
        prop_assert!(slot <= MAX_SLOT);
        prop_assert_eq!(slot, get_slot(&key));
    }

    #[test]
    fn test_tagged_keys_hash_to_their_tag(
        prefix in "[a-z:]{0,10}",
        tag in "[a-z0-9:]{1,10}",
        suffix in "[a-z:{}]{0,10}",
    ) {
        let key = format!("{prefix}{{{tag}}}{suffix}");
        prop_assert_eq!(hash_tag(key.as_bytes()), tag.as_bytes());
        prop_assert_eq!(get_slot(key.as_bytes()), slot_for_tag(tag.as_bytes()));
    }

    #[test]
    fn test_keys_without_braces_hash_whole(key in "[a-z0-9:_]{0,32}") {
        prop_assert_eq!(hash_tag(key.as_bytes()), key.as_bytes());
    }
}
