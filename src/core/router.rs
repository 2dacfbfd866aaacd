// src/core/router.rs

//! The interface shared by the cluster and sharded routers.

use crate::connection::{NodeAddress, NodeConnection};
use crate::core::pool::{NodeHandle, NodeOptions, NodePool};
use crate::core::protocol::RespFrame;
use crate::core::{Command, RouterError};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;

/// An aggregate connection that spreads commands over a pool of nodes.
#[async_trait]
pub trait Router: Send + Sync {
    /// The read-only routing snapshot returned by [`Router::topology`].
    type Topology;

    /// The node pool backing this router.
    fn pool(&self) -> &NodePool;

    /// Resolves `command` to a node and runs it there.
    async fn execute(&self, command: &Command) -> Result<RespFrame, RouterError>;

    /// Adds a node with per-node options. Adding an address that is already
    /// pooled returns the existing handle.
    fn add_node_with(
        &self,
        connection: Box<dyn NodeConnection>,
        options: NodeOptions,
    ) -> Result<Arc<NodeHandle>, RouterError>;

    fn add_node(&self, connection: Box<dyn NodeConnection>) -> Result<Arc<NodeHandle>, RouterError> {
        self.add_node_with(connection, NodeOptions::default())
    }

    /// Removes a node and disconnects it. Returns `false` if it was not present.
    async fn remove_node(&self, address: &NodeAddress) -> bool;

    /// A snapshot of the current routing table.
    fn topology(&self) -> Self::Topology;

    fn node_by_address(&self, address: &NodeAddress) -> Option<Arc<NodeHandle>> {
        self.pool().get(address)
    }

    fn node_by_alias(&self, alias: &str) -> Option<Arc<NodeHandle>> {
        self.pool().get_by_alias(alias)
    }

    /// Runs a keyless command (e.g. `PING`, `FLUSHALL`) on every pooled node concurrently.
    async fn execute_on_each_node(
        &self,
        command: &Command,
    ) -> Vec<(NodeAddress, Result<RespFrame, RouterError>)> {
        let handles = self.pool().handles();
        let replies = join_all(handles.iter().map(|h| h.execute(command))).await;
        handles
            .iter()
            .map(|h| h.address().clone())
            .zip(replies)
            .collect()
    }

    /// Connects every pooled node, returning the first error.
    async fn connect(&self) -> Result<(), RouterError> {
        let handles = self.pool().handles();
        let results = join_all(handles.iter().map(|h| h.connect())).await;
        results.into_iter().collect()
    }

    async fn disconnect(&self) {
        let handles = self.pool().handles();
        join_all(handles.iter().map(|h| h.disconnect())).await;
    }

    /// Returns `true` if at least one node is connected.
    fn is_connected(&self) -> bool {
        self.pool().handles().iter().any(|h| h.is_connected())
    }

    fn len(&self) -> usize {
        self.pool().len()
    }

    fn is_empty(&self) -> bool {
        self.pool().is_empty()
    }
}
