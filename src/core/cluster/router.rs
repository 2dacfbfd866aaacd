// src/core/cluster/router.rs

//! The router for server-partitioned clusters.
//!
//! Commands are mapped to one of the 16384 slots and sent to the slot's owner.
//! The slot map is learned from static hints, from `CLUSTER SLOTS` replies and
//! from `MOVED` redirections. `ASK` redirections are followed once without
//! touching the map. Connection failures and `CLUSTERDOWN` replies are retried
//! with exponential backoff, and every retry or redirection draws from the same
//! budget so that a redirection loop between two nodes always terminates.

use super::config::ClusterOptions;
use super::redirect::ClusterReply;
use super::slot::{NUM_SLOTS, get_slot};
use super::slot_map::{SlotMap, parse_slot_hints};
use super::topology::parse_cluster_slots;
use crate::config::Config;
use crate::connection::{ConnectionFactory, NodeAddress, NodeConnection, TcpConnectionFactory};
use crate::core::commands::key_extractor::{CommandSlotResolver, KeyRule};
use crate::core::pool::{NodeHandle, NodeOptions, NodePool};
use crate::core::protocol::RespFrame;
use crate::core::router::Router;
use crate::core::{Command, RouterError};
use anyhow::Context;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ClusterRouter {
    pool: NodePool,
    slot_map: RwLock<SlotMap>,
    /// Slot to handle decisions, flushed whenever the map or the pool changes.
    slot_cache: DashMap<u16, Arc<NodeHandle>>,
    resolver: RwLock<CommandSlotResolver>,
    factory: Arc<dyn ConnectionFactory>,
    options: ClusterOptions,
}

impl fmt::Debug for ClusterRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterRouter")
            .field("nodes", &self.pool.addresses())
            .field("assigned_slots", &self.slot_map.read().assigned_slots())
            .field("options", &self.options)
            .finish()
    }
}

impl ClusterRouter {
    pub fn new(factory: Arc<dyn ConnectionFactory>, options: ClusterOptions) -> Self {
        Self {
            pool: NodePool::new(),
            slot_map: RwLock::new(SlotMap::new()),
            slot_cache: DashMap::new(),
            resolver: RwLock::new(CommandSlotResolver::new()),
            factory,
            options,
        }
    }

    /// Builds a router over TCP connections to the nodes listed in `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let options = ClusterOptions::try_from(&config.cluster).map_err(anyhow::Error::msg)?;
        let factory = Arc::new(TcpConnectionFactory::new(config.connection.clone()));
        let router = Self::new(factory.clone(), options);
        for node in &config.nodes {
            let address = node.address();
            let connection = factory.create(&address)?;
            router
                .add_node_with(connection, node.options())
                .with_context(|| format!("Failed to add cluster node {address}"))?;
        }
        Ok(router)
    }

    pub fn options(&self) -> &ClusterOptions {
        &self.options
    }

    /// A copy of the key extraction rules in use.
    pub fn resolver(&self) -> CommandSlotResolver {
        self.resolver.read().clone()
    }

    /// Installs, replaces or (with `None`) removes the extraction rule for a command.
    pub fn set_rule(&self, command_id: &str, rule: Option<KeyRule>) {
        self.resolver.write().set_rule(command_id, rule);
    }

    /// A snapshot of the slot map.
    pub fn slot_map(&self) -> SlotMap {
        self.slot_map.read().clone()
    }

    /// Returns the node serving `slot`, creating a connection to the owner if
    /// it is not pooled yet, or guessing one if the slot has no known owner.
    pub fn connection_by_slot(&self, slot: u16) -> Result<Arc<NodeHandle>, RouterError> {
        loop {
            if let Some(handle) = self.slot_cache.get(&slot) {
                return Ok(handle.value().clone());
            }
            let owner = self.slot_map.read().get(slot).cloned();
            let handle = match owner {
                Some(address) => self.handle_for(&address)?,
                None => self.guess_node(slot)?,
            };
            if self.cache_if_pooled(slot, &handle) {
                return Ok(handle);
            }
            debug!("{} left the pool during lookup of slot {}", handle.address(), slot);
        }
    }

    /// Returns the node serving the slot of `key`.
    pub fn connection_by_key(&self, key: &[u8]) -> Result<Arc<NodeHandle>, RouterError> {
        self.connection_by_slot(get_slot(key))
    }

    /// Rebuilds the slot map from `CLUSTER SLOTS`, asking random pooled nodes
    /// until one answers or the retry budget runs out.
    pub async fn refresh_topology(&self) -> Result<(), RouterError> {
        let mut tried = HashSet::new();
        let mut retries = 0;
        let mut last_error = RouterError::NoConnections;
        loop {
            let Some(handle) = self.pool.random_except(&tried) else {
                return Err(last_error);
            };
            tried.insert(handle.address().clone());
            match self.refresh_from(&handle).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("Topology query to {} failed: {}", handle.address(), e);
                    last_error = e;
                }
            }
            if !self.options.retry_limit.allows(retries) {
                return Err(last_error);
            }
            retries += 1;
        }
    }

    async fn refresh_from(&self, handle: &NodeHandle) -> Result<(), RouterError> {
        let reply = handle.execute(&Command::cluster_slots()).await?;
        let ranges = parse_cluster_slots(&reply, handle.address())?;
        let mut map = SlotMap::new();
        for range in ranges {
            map.set_range(range.first.into(), range.last.into(), range.owner)?;
        }
        info!(
            "Rebuilt slot map from {}: {} slots over {} nodes",
            handle.address(),
            map.assigned_slots(),
            map.nodes().len()
        );
        *self.slot_map.write() = map;
        self.slot_cache.clear();
        Ok(())
    }

    /// Caches `handle` for `slot` unless it has left the pool in the meantime.
    ///
    /// Removal takes a node out of the pool before flushing the cache, so
    /// checking membership after the insert never leaves a detached handle cached.
    fn cache_if_pooled(&self, slot: u16, handle: &Arc<NodeHandle>) -> bool {
        self.slot_cache.insert(slot, handle.clone());
        let pooled = self
            .pool
            .get(handle.address())
            .is_some_and(|current| Arc::ptr_eq(&current, handle));
        if !pooled {
            self.slot_cache
                .remove_if(&slot, |_, cached| Arc::ptr_eq(cached, handle));
        }
        pooled
    }

    /// Returns the pooled handle for `address`, creating (but not connecting) one if needed.
    fn handle_for(&self, address: &NodeAddress) -> Result<Arc<NodeHandle>, RouterError> {
        if let Some(handle) = self.pool.get(address) {
            return Ok(handle);
        }
        let connection = self.factory.create(address)?;
        Ok(self
            .pool
            .insert(NodeHandle::new(connection, NodeOptions::default())))
    }

    /// Picks a node for a slot with no known owner.
    ///
    /// An empty map is first seeded from the pooled nodes' slot hints. Failing
    /// that, the slot space is split evenly over the pooled nodes in address order.
    fn guess_node(&self, slot: u16) -> Result<Arc<NodeHandle>, RouterError> {
        let unmapped = self.slot_map.read().is_empty();
        if unmapped && self.seed_from_hints()? {
            let owner = self.slot_map.read().get(slot).cloned();
            if let Some(address) = owner {
                return self.handle_for(&address);
            }
        }
        let addresses = self.pool.addresses();
        if addresses.is_empty() {
            return Err(RouterError::NoConnections);
        }
        let count = addresses.len();
        let index = (slot as usize / (NUM_SLOTS / count).max(1)).min(count - 1);
        debug!("Slot {} has no owner, guessing {}", slot, addresses[index]);
        self.pool
            .get(&addresses[index])
            .ok_or(RouterError::NoConnections)
    }

    /// Fills the slot map from static hints. Returns `false` if no node has any.
    fn seed_from_hints(&self) -> Result<bool, RouterError> {
        let mut map = SlotMap::new();
        for handle in self.pool.handles() {
            let Some(hints) = handle.options().slots.as_deref() else {
                continue;
            };
            for (first, last) in parse_slot_hints(hints)? {
                map.set_range(first, last, handle.address().clone())?;
            }
        }
        if map.is_empty() {
            return Ok(false);
        }
        debug!("Seeded slot map from hints: {} slots", map.assigned_slots());
        let mut current = self.slot_map.write();
        if current.is_empty() {
            *current = map;
        }
        Ok(true)
    }

    async fn on_moved(&self, slot: u16, address: NodeAddress) -> Result<(), RouterError> {
        let handle = self.handle_for(&address)?;
        if self.options.refresh_on_moved
            && let Err(e) = self.refresh_from(&handle).await
        {
            warn!("Topology refresh from {} failed: {}", address, e);
        }
        self.slot_map.write().set_slot(slot.into(), address)?;
        self.slot_cache.remove(&slot);
        Ok(())
    }

    /// Drops a node that failed at the transport level, then relearns the
    /// topology from the remaining nodes. Without a successful refresh the map
    /// is reset so the next attempt is guessed over the survivors. With no
    /// survivors the map is kept and the next attempt reconnects to the same owner.
    async fn evict(&self, address: &NodeAddress) {
        if let Some(handle) = self.pool.take(address) {
            handle.disconnect().await;
            warn!("Evicted node {} after a connection failure", address);
        }
        self.slot_cache.retain(|_, handle| handle.address() != address);
        if self.pool.is_empty() {
            return;
        }
        if self.options.refresh_on_moved {
            match self.refresh_topology().await {
                Ok(()) => return,
                Err(e) => {
                    warn!("Could not refresh the slot map after evicting {}: {}", address, e)
                }
            }
        }
        debug!("Resetting the slot map after evicting {}", address);
        self.invalidate();
    }

    fn invalidate(&self) {
        self.slot_map.write().reset();
        self.slot_cache.clear();
    }
}

#[async_trait]
impl Router for ClusterRouter {
    type Topology = SlotMap;

    fn pool(&self) -> &NodePool {
        &self.pool
    }

    async fn execute(&self, command: &Command) -> Result<RespFrame, RouterError> {
        let slot = self.resolver.read().slot_for(command)?;
        let mut retries: u32 = 0;
        let mut ask_target: Option<NodeAddress> = None;
        let mut last_failure: Option<RouterError> = None;

        loop {
            let (handle, asking) = match ask_target.take() {
                Some(address) => (self.handle_for(&address), true),
                None => (self.connection_by_slot(slot), false),
            };
            let handle = match handle {
                Ok(handle) => handle,
                // Every node we knew about has been evicted.
                Err(RouterError::NoConnections) => {
                    return Err(last_failure.unwrap_or(RouterError::NoConnections));
                }
                Err(e) => return Err(e),
            };
            debug!("{} for slot {} goes to {}", command.id(), slot, handle.address());

            let result = if asking {
                handle.execute_asking(command).await
            } else {
                handle.execute(command).await
            };

            let failure = match result {
                Ok(reply) => match ClusterReply::from_frame(&reply) {
                    None => return Ok(reply),
                    Some(ClusterReply::Moved { slot: moved, addr }) => {
                        if !self.options.retry_limit.allows(retries) {
                            return Err(RouterError::Moved {
                                slot: moved,
                                addr: addr.to_string(),
                            });
                        }
                        retries += 1;
                        debug!("Slot {} moved to {}", moved, addr);
                        self.on_moved(moved, addr).await?;
                        continue;
                    }
                    Some(ClusterReply::Ask { slot: asked, addr }) => {
                        if !self.options.retry_limit.allows(retries) {
                            return Err(RouterError::Ask {
                                slot: asked,
                                addr: addr.to_string(),
                            });
                        }
                        retries += 1;
                        debug!("Slot {} is migrating, asking {}", asked, addr);
                        ask_target = Some(addr);
                        continue;
                    }
                    Some(ClusterReply::Unavailable(msg)) => RouterError::ClusterDown(
                        msg.strip_prefix("CLUSTERDOWN ").unwrap_or(&msg).to_string(),
                    ),
                },
                Err(e) if e.is_connection_failure() => {
                    self.evict(handle.address()).await;
                    e
                }
                Err(e) => return Err(e),
            };

            if !self.options.retry_limit.allows(retries) {
                return Err(failure);
            }
            retries += 1;
            let delay = self.options.backoff(retries);
            warn!(
                "{} failed ({}), retry {} in {:?}",
                command.id(),
                failure,
                retries,
                delay
            );
            last_failure = Some(failure);
            tokio::time::sleep(delay).await;
        }
    }

    fn add_node_with(
        &self,
        connection: Box<dyn NodeConnection>,
        options: NodeOptions,
    ) -> Result<Arc<NodeHandle>, RouterError> {
        if let Some(hints) = options.slots.as_deref() {
            parse_slot_hints(hints)?;
        }
        let handle = self.pool.insert(NodeHandle::new(connection, options));
        self.invalidate();
        Ok(handle)
    }

    async fn remove_node(&self, address: &NodeAddress) -> bool {
        let removed = self.pool.remove(address).await;
        if removed {
            self.invalidate();
        }
        removed
    }

    fn topology(&self) -> SlotMap {
        self.slot_map()
    }
}
