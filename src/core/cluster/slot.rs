// src/core/cluster/slot.rs

//! Implements the cluster hash slot algorithm: hash-tag extraction and CRC16.

use crc::{CRC_16_XMODEM, Crc};

/// The total number of hash slots in the cluster.
pub const NUM_SLOTS: usize = 16384;

/// The highest valid slot index.
pub const MAX_SLOT: u16 = (NUM_SLOTS - 1) as u16;

/// CRC16 with polynomial 0x1021, initial value 0 and no reflection, as used
/// by every Redis-compatible cluster node to assign keys to slots.
const CRC16_ALGO: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Returns the part of `key` that is hashed.
///
/// If the key contains a `{`, and a `}` follows it with at least one byte in
/// between, only the bytes between the first `{` and the first `}` after it
/// are used. Otherwise the whole key is returned unchanged.
pub fn hash_tag(key: &[u8]) -> &[u8] {
    if let Some(start) = key.iter().position(|&b| b == b'{')
        && let Some(end_offset) = key[start + 1..].iter().position(|&b| b == b'}')
        && end_offset > 0
    {
        return &key[start + 1..start + 1 + end_offset];
    }
    key
}

/// Computes the slot for bytes that have already gone through [`hash_tag`].
pub fn slot_for_tag(tag: &[u8]) -> u16 {
    CRC16_ALGO.checksum(tag) & MAX_SLOT
}

/// Calculates the hash slot for a given key, honouring hash tags.
pub fn get_slot(key: &[u8]) -> u16 {
    slot_for_tag(hash_tag(key))
}

/// Returns `true` if `slot` is a valid slot index.
pub fn is_valid_slot(slot: u32) -> bool {
    slot <= MAX_SLOT as u32
}
