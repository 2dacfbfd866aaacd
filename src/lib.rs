// src/lib.rs

pub mod config;
pub mod connection;
pub mod core;

// Re-export
pub use crate::config::Config;
pub use crate::connection::{ConnectionFactory, NodeAddress, NodeConnection};
pub use crate::core::cluster::ClusterRouter;
pub use crate::core::pool::{NodeHandle, NodeOptions};
pub use crate::core::router::Router;
pub use crate::core::sharding::ShardedRouter;
pub use crate::core::{Command, RespFrame, RouterError};
