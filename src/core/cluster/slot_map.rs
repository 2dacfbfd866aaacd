// src/core/cluster/slot_map.rs

//! A ranged map from the 16384 cluster slots to their owning nodes.

use super::slot::{MAX_SLOT, NUM_SLOTS, is_valid_slot};
use crate::connection::NodeAddress;
use crate::core::RouterError;
use std::collections::BTreeSet;

/// An inclusive range of slots owned by one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRange {
    pub first: u16,
    pub last: u16,
    pub owner: NodeAddress,
}

impl SlotRange {
    /// Creates a range after validating `0 <= first <= last <= 16383`.
    pub fn new(first: u32, last: u32, owner: NodeAddress) -> Result<Self, RouterError> {
        if first > last || !is_valid_slot(last) {
            return Err(RouterError::InvalidSlotRange { first, last });
        }
        Ok(Self {
            first: first as u16,
            last: last as u16,
            owner,
        })
    }

    pub fn len(&self) -> usize {
        (self.last - self.first) as usize + 1
    }

    pub fn contains(&self, slot: u16) -> bool {
        self.first <= slot && slot <= self.last
    }

    pub fn intersects(&self, first: u16, last: u16) -> bool {
        self.first <= last && first <= self.last
    }
}

/// The slot table of a cluster router.
///
/// Ranges are kept sorted and disjoint. Assigning over existing ranges splits
/// them so that the most recent assignment wins for the intersecting slots,
/// and adjacent ranges with the same owner are coalesced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotMap {
    ranges: Vec<SlotRange>,
}

impl SlotMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns the inclusive range `[first, last]` to `owner`.
    pub fn set_range(&mut self, first: u32, last: u32, owner: NodeAddress) -> Result<(), RouterError> {
        let range = SlotRange::new(first, last, owner)?;
        self.insert(range);
        Ok(())
    }

    /// Assigns a single slot, leaving every other slot untouched.
    pub fn set_slot(&mut self, slot: u32, owner: NodeAddress) -> Result<(), RouterError> {
        self.set_range(slot, slot, owner)
    }

    fn insert(&mut self, range: SlotRange) {
        let mut ranges = Vec::with_capacity(self.ranges.len() + 2);
        for existing in self.ranges.drain(..) {
            if !existing.intersects(range.first, range.last) {
                ranges.push(existing);
                continue;
            }
            if existing.first < range.first {
                ranges.push(SlotRange {
                    first: existing.first,
                    last: range.first - 1,
                    owner: existing.owner.clone(),
                });
            }
            if existing.last > range.last {
                ranges.push(SlotRange {
                    first: range.last + 1,
                    last: existing.last,
                    owner: existing.owner,
                });
            }
        }
        let pos = ranges.partition_point(|r| r.first < range.first);
        ranges.insert(pos, range);
        self.ranges = coalesce(ranges);
    }

    /// Returns the owner of `slot`, if any.
    pub fn get(&self, slot: u16) -> Option<&NodeAddress> {
        let idx = self.ranges.partition_point(|r| r.last < slot);
        self.ranges
            .get(idx)
            .filter(|r| r.contains(slot))
            .map(|r| &r.owner)
    }

    /// Returns the assigned slots within `[first, last]`, clipped to that window.
    pub fn get_ranges(&self, first: u32, last: u32) -> Result<Vec<SlotRange>, RouterError> {
        if first > last || !is_valid_slot(last) {
            return Err(RouterError::InvalidSlotRange { first, last });
        }
        let (first, last) = (first as u16, last as u16);
        Ok(self
            .ranges
            .iter()
            .filter(|r| r.intersects(first, last))
            .map(|r| SlotRange {
                first: r.first.max(first),
                last: r.last.min(last),
                owner: r.owner.clone(),
            })
            .collect())
    }

    /// Clears every assignment.
    pub fn reset(&mut self) {
        self.ranges.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Returns `true` if all 16384 slots have an owner.
    pub fn is_complete(&self) -> bool {
        self.assigned_slots() == NUM_SLOTS
    }

    /// The number of slots that currently have an owner.
    pub fn assigned_slots(&self) -> usize {
        self.ranges.iter().map(SlotRange::len).sum()
    }

    /// The distinct owners present in the map.
    pub fn nodes(&self) -> BTreeSet<NodeAddress> {
        self.ranges.iter().map(|r| r.owner.clone()).collect()
    }

    pub fn ranges(&self) -> &[SlotRange] {
        &self.ranges
    }

    /// Expands the map into one entry per slot.
    pub fn to_vec(&self) -> Vec<Option<NodeAddress>> {
        let mut slots = vec![None; NUM_SLOTS];
        for range in &self.ranges {
            for slot in range.first..=range.last {
                slots[slot as usize] = Some(range.owner.clone());
            }
        }
        slots
    }
}

fn coalesce(ranges: Vec<SlotRange>) -> Vec<SlotRange> {
    let mut merged: Vec<SlotRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        if let Some(prev) = merged.last_mut()
            && prev.owner == range.owner
            && prev.last < MAX_SLOT
            && prev.last + 1 == range.first
        {
            prev.last = range.last;
            continue;
        }
        merged.push(range);
    }
    merged
}

/// Parses a static slot hint such as `"0-5460,5461,5462-5500"` into inclusive ranges.
pub fn parse_slot_hints(hints: &str) -> Result<Vec<(u32, u32)>, RouterError> {
    let mut ranges = Vec::new();
    for part in hints.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (first, last) = match part.split_once('-') {
            Some((first, last)) => (first.trim().parse::<u32>()?, last.trim().parse::<u32>()?),
            None => {
                let slot = part.parse::<u32>()?;
                (slot, slot)
            }
        };
        if first > last || !is_valid_slot(last) {
            return Err(RouterError::InvalidSlotRange { first, last });
        }
        ranges.push((first, last));
    }
    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(port: u16) -> NodeAddress {
        NodeAddress::new("127.0.0.1", port)
    }

    #[test]
    fn overlap_splits_existing_range() {
        let mut map = SlotMap::new();
        map.set_range(0, 16383, node(1)).unwrap();
        map.set_range(0, 8191, node(2)).unwrap();
        assert_eq!(map.get(0), Some(&node(2)));
        assert_eq!(map.get(8191), Some(&node(2)));
        assert_eq!(map.get(8192), Some(&node(1)));
        assert_eq!(map.get(16383), Some(&node(1)));
        assert_eq!(map.nodes(), BTreeSet::from([node(1), node(2)]));
        assert!(map.is_complete());
    }

    #[test]
    fn middle_assignment_produces_three_ranges() {
        let mut map = SlotMap::new();
        map.set_range(0, 99, node(1)).unwrap();
        map.set_range(40, 59, node(2)).unwrap();
        let ranges: Vec<_> = map.ranges().iter().map(|r| (r.first, r.last)).collect();
        assert_eq!(ranges, vec![(0, 39), (40, 59), (60, 99)]);
        map.set_slot(50, node(1)).unwrap();
        assert_eq!(map.get(50), Some(&node(1)));
        assert_eq!(map.get(49), Some(&node(2)));
        assert_eq!(map.get(51), Some(&node(2)));
    }

    #[test]
    fn adjacent_ranges_with_same_owner_merge() {
        let mut map = SlotMap::new();
        map.set_range(0, 10, node(1)).unwrap();
        map.set_range(11, 20, node(1)).unwrap();
        assert_eq!(map.ranges().len(), 1);
        assert_eq!(map.assigned_slots(), 21);
    }

    #[test]
    fn invalid_ranges_fail_fast() {
        let mut map = SlotMap::new();
        assert_eq!(
            map.set_range(10, 5, node(1)),
            Err(RouterError::InvalidSlotRange { first: 10, last: 5 })
        );
        assert!(map.set_range(0, 16384, node(1)).is_err());
        assert!(map.set_slot(20000, node(1)).is_err());
        assert!(map.is_empty());
    }

    #[test]
    fn unassigned_and_reset() {
        let mut map = SlotMap::new();
        assert_eq!(map.get(5), None);
        map.set_range(100, 200, node(1)).unwrap();
        assert_eq!(map.get(99), None);
        assert_eq!(map.get(201), None);
        map.reset();
        assert!(map.is_empty());
        assert_eq!(map.get(150), None);
    }

    #[test]
    fn window_query_clips_ranges() {
        let mut map = SlotMap::new();
        map.set_range(0, 100, node(1)).unwrap();
        map.set_range(101, 200, node(2)).unwrap();
        let window = map.get_ranges(50, 150).unwrap();
        assert_eq!(window.len(), 2);
        assert_eq!((window[0].first, window[0].last), (50, 100));
        assert_eq!((window[1].first, window[1].last), (101, 150));
    }

    #[test]
    fn parses_hints() {
        assert_eq!(
            parse_slot_hints("0-5460, 5461,5462-5500").unwrap(),
            vec![(0, 5460), (5461, 5461), (5462, 5500)]
        );
        assert!(parse_slot_hints("10-5").is_err());
        assert!(parse_slot_hints("0-16384").is_err());
        assert!(parse_slot_hints("a-b").is_err());
    }
}
