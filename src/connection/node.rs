// src/connection/node.rs

//! The seams between the routers and single-node connections.

use super::NodeAddress;
use crate::core::protocol::RespFrame;
use crate::core::{Command, RouterError};
use async_trait::async_trait;
use std::fmt;

/// A connection to exactly one node.
///
/// Routers never share a `NodeConnection` between in-flight commands: each one
/// is owned by a pool entry that serialises access to it.
#[async_trait]
pub trait NodeConnection: Send + fmt::Debug {
    /// The address this connection talks to.
    fn address(&self) -> &NodeAddress;

    /// Establishes the underlying transport. Calling it while connected is a no-op.
    async fn connect(&mut self) -> Result<(), RouterError>;

    /// Tears down the underlying transport.
    async fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Sends one command and waits for its reply.
    ///
    /// Error replies from the node are returned as `Ok(RespFrame::Error(..))`;
    /// `Err` is reserved for transport and protocol failures.
    async fn execute(&mut self, command: &Command) -> Result<RespFrame, RouterError>;
}

/// Creates connections for nodes discovered at runtime (redirections, topology
/// replies). Creation must not perform I/O; connections connect lazily.
pub trait ConnectionFactory: Send + Sync {
    fn create(&self, address: &NodeAddress) -> Result<Box<dyn NodeConnection>, RouterError>;
}

impl<F> ConnectionFactory for F
where
    F: Fn(&NodeAddress) -> Result<Box<dyn NodeConnection>, RouterError> + Send + Sync,
{
    fn create(&self, address: &NodeAddress) -> Result<Box<dyn NodeConnection>, RouterError> {
        self(address)
    }
}
