// src/core/mod.rs

//! The central module containing the routing logic and its data structures.

pub mod cluster;
pub mod commands;
pub mod errors;
pub mod pool;
pub mod protocol;
pub mod router;
pub mod sharding;

pub use commands::Command;
pub use errors::RouterError;
pub use protocol::RespFrame;
