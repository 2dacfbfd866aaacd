// src/connection/mod.rs

//! Single-node connections: addressing, the traits routers drive them through,
//! and the bundled RESP-over-TCP implementation.

mod address;
mod node;
mod tcp;

// Publicly re-export the primary types from the sub-modules.
pub use address::NodeAddress;
pub use node::{ConnectionFactory, NodeConnection};
pub use tcp::{TcpConnection, TcpConnectionFactory};
