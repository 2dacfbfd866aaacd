// src/core/cluster/mod.rs

//! Routing for server-partitioned clusters: slot hashing, the slot map,
//! `CLUSTER SLOTS` parsing, redirection replies and the router itself.

pub mod config;
pub mod redirect;
pub mod router;
pub mod slot;
pub mod slot_map;
pub mod topology;

// Re-export key types for easier access from other modules.
pub use config::{ClusterConfig, ClusterOptions, RetryLimit};
pub use redirect::ClusterReply;
pub use router::ClusterRouter;
pub use slot::{MAX_SLOT, NUM_SLOTS, get_slot, hash_tag};
pub use slot_map::{SlotMap, SlotRange, parse_slot_hints};
