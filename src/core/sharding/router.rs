// src/core/sharding/router.rs

//! The router for client-partitioned deployments.
//!
//! Nodes know nothing about each other; the router alone decides ownership by
//! hashing each command's routing tag onto a consistent hash ring. There is no
//! redirection protocol, so replies are always returned as they arrive.

use super::ring::{ConsistentHashRing, RingHash};
use crate::config::Config;
use crate::connection::{ConnectionFactory, NodeAddress, NodeConnection, TcpConnectionFactory};
use crate::core::commands::key_extractor::{CommandSlotResolver, KeyRule};
use crate::core::pool::{NodeHandle, NodeOptions, NodePool};
use crate::core::protocol::RespFrame;
use crate::core::router::Router;
use crate::core::{Command, RouterError};
use anyhow::Context;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// The runtime form of the `[sharding]` configuration section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardingOptions {
    pub replicas: u32,
    pub default_weight: u32,
    pub hash: RingHash,
}

impl Default for ShardingOptions {
    fn default() -> Self {
        Self {
            replicas: super::ring::DEFAULT_REPLICAS,
            default_weight: super::ring::DEFAULT_WEIGHT,
            hash: RingHash::default(),
        }
    }
}

#[derive(Debug)]
pub struct ShardedRouter {
    pool: NodePool,
    ring: RwLock<ConsistentHashRing>,
    resolver: RwLock<CommandSlotResolver>,
}

impl Default for ShardedRouter {
    fn default() -> Self {
        Self::new(ShardingOptions::default())
    }
}

impl ShardedRouter {
    pub fn new(options: ShardingOptions) -> Self {
        Self {
            pool: NodePool::new(),
            ring: RwLock::new(ConsistentHashRing::new(
                options.replicas,
                options.default_weight,
                options.hash,
            )),
            resolver: RwLock::new(CommandSlotResolver::new()),
        }
    }

    /// Builds a router over TCP connections to the nodes listed in `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let router = Self::new(ShardingOptions {
            replicas: config.sharding.replicas,
            default_weight: config.sharding.default_weight,
            hash: config.sharding.hash,
        });
        let factory = TcpConnectionFactory::new(config.connection.clone());
        for node in &config.nodes {
            let address = node.address();
            router
                .add_node_with(factory.create(&address)?, node.options())
                .with_context(|| format!("Failed to add shard {address}"))?;
        }
        Ok(router)
    }

    /// Installs, replaces or (with `None`) removes the extraction rule for a command.
    pub fn set_rule(&self, command_id: &str, rule: Option<KeyRule>) {
        self.resolver.write().set_rule(command_id, rule);
    }

    /// Returns the node owning `key`, honouring hash tags.
    pub fn node_for_key(&self, key: &[u8]) -> Result<Arc<NodeHandle>, RouterError> {
        let tag = crate::core::cluster::slot::hash_tag(key);
        self.node_for_tag(tag)
    }

    fn node_for_tag(&self, tag: &[u8]) -> Result<Arc<NodeHandle>, RouterError> {
        let address = self
            .ring
            .read()
            .get_by_key(tag)
            .cloned()
            .ok_or(RouterError::NoConnections)?;
        self.pool
            .get(&address)
            .ok_or_else(|| RouterError::UnknownNode(address.to_string()))
    }
}

#[async_trait]
impl Router for ShardedRouter {
    type Topology = ConsistentHashRing;

    fn pool(&self) -> &NodePool {
        &self.pool
    }

    async fn execute(&self, command: &Command) -> Result<RespFrame, RouterError> {
        let tag = self.resolver.read().routing_tag(command)?;
        let handle = self.node_for_tag(&tag)?;
        debug!("{} goes to shard {}", command.id(), handle.address());
        handle.execute(command).await
    }

    fn add_node_with(
        &self,
        connection: Box<dyn NodeConnection>,
        options: NodeOptions,
    ) -> Result<Arc<NodeHandle>, RouterError> {
        if options.weight == Some(0) {
            return Err(RouterError::Internal(format!(
                "node {} cannot have a weight of 0",
                connection.address()
            )));
        }
        let weight = options.weight;
        let handle = self.pool.insert(NodeHandle::new(connection, options));
        let mut ring = self.ring.write();
        if !ring.contains(handle.address()) {
            ring.add(handle.address().clone(), weight);
        }
        Ok(handle)
    }

    async fn remove_node(&self, address: &NodeAddress) -> bool {
        self.ring.write().remove(address);
        self.pool.remove(address).await
    }

    fn topology(&self) -> ConsistentHashRing {
        self.ring.read().clone()
    }
}
