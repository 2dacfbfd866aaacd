// src/core/sharding/mod.rs

//! Client-side sharding over a weighted consistent hash ring.

pub mod ring;
pub mod router;

pub use ring::{ConsistentHashRing, DEFAULT_REPLICAS, DEFAULT_WEIGHT, RingHash};
pub use router::{ShardedRouter, ShardingOptions};
