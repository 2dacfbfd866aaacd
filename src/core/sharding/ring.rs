// src/core/sharding/ring.rs

//! A weighted consistent hash ring for client-decided sharding.
//!
//! Every node contributes a number of points on a 32-bit circle proportional
//! to its weight. A hash resolves to the first point at or after it, wrapping
//! around to the lowest point. A node's points depend only on its own address
//! and weight, so adding or removing one node only remaps the keys that land
//! on that node's points.

use crate::connection::NodeAddress;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Points per node at the default weight.
pub const DEFAULT_REPLICAS: u32 = 128;

/// The weight a node gets when none is configured.
pub const DEFAULT_WEIGHT: u32 = 100;

const CRC32_ALGO: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);

/// The hash function used both for ring points and for keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RingHash {
    #[default]
    Crc32,
    Murmur3,
}

impl RingHash {
    pub fn hash(&self, bytes: &[u8]) -> u32 {
        match self {
            RingHash::Crc32 => CRC32_ALGO.checksum(bytes),
            // Reading from an in-memory cursor cannot fail.
            RingHash::Murmur3 => murmur3::murmur3_32(&mut Cursor::new(bytes), 0).unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RingNode {
    address: NodeAddress,
    weight: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Point {
    value: u32,
    node: usize,
}

#[derive(Debug, Clone)]
pub struct ConsistentHashRing {
    nodes: Vec<RingNode>,
    points: Vec<Point>,
    replicas: u32,
    default_weight: u32,
    hash: RingHash,
}

impl Default for ConsistentHashRing {
    fn default() -> Self {
        Self::new(DEFAULT_REPLICAS, DEFAULT_WEIGHT, RingHash::default())
    }
}

impl ConsistentHashRing {
    pub fn new(replicas: u32, default_weight: u32, hash: RingHash) -> Self {
        Self {
            nodes: Vec::new(),
            points: Vec::new(),
            replicas: replicas.max(1),
            default_weight: default_weight.max(1),
            hash,
        }
    }

    /// Adds a node, or updates its weight if it is already on the ring.
    pub fn add(&mut self, address: NodeAddress, weight: Option<u32>) {
        let weight = weight.unwrap_or(self.default_weight).max(1);
        match self.nodes.iter_mut().find(|n| n.address == address) {
            Some(node) => node.weight = weight,
            None => self.nodes.push(RingNode { address, weight }),
        }
        self.rebuild();
    }

    /// Removes a node and all of its points. Returns `false` if it was absent.
    pub fn remove(&mut self, address: &NodeAddress) -> bool {
        let before = self.nodes.len();
        self.nodes.retain(|n| &n.address != address);
        if self.nodes.len() == before {
            return false;
        }
        self.rebuild();
        true
    }

    /// Resolves a hash value to the node owning the next point clockwise.
    pub fn get(&self, hash: u32) -> Option<&NodeAddress> {
        match self.nodes.len() {
            0 => None,
            1 => Some(&self.nodes[0].address),
            _ => {
                let idx = self.points.partition_point(|p| p.value < hash);
                let point = self.points.get(idx).or_else(|| self.points.first())?;
                Some(&self.nodes[point.node].address)
            }
        }
    }

    /// Hashes `key` with the ring's hash function and resolves it.
    pub fn get_by_key(&self, key: &[u8]) -> Option<&NodeAddress> {
        self.get(self.hash.hash(key))
    }

    pub fn hash(&self, bytes: &[u8]) -> u32 {
        self.hash.hash(bytes)
    }

    pub fn contains(&self, address: &NodeAddress) -> bool {
        self.nodes.iter().any(|n| &n.address == address)
    }

    pub fn weight_of(&self, address: &NodeAddress) -> Option<u32> {
        self.nodes
            .iter()
            .find(|n| &n.address == address)
            .map(|n| n.weight)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeAddress> {
        self.nodes.iter().map(|n| &n.address)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The total number of points on the circle.
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    fn points_for(&self, weight: u32) -> u32 {
        let scaled = (self.replicas as f64 * weight as f64 / self.default_weight as f64).round();
        (scaled as u32).max(1)
    }

    fn rebuild(&mut self) {
        let mut points = Vec::new();
        for (idx, node) in self.nodes.iter().enumerate() {
            let address = node.address.to_string();
            for i in 0..self.points_for(node.weight) {
                let value = self.hash.hash(format!("{address}-{i}").as_bytes());
                points.push(Point { value, node: idx });
            }
        }
        // Stable sort: on equal values the earlier-added node comes first.
        points.sort_by_key(|p| p.value);
        self.points = points;
    }
}
