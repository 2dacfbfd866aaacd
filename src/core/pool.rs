// src/core/pool.rs

//! The set of node connections owned by a router.

use crate::connection::{NodeAddress, NodeConnection};
use crate::core::protocol::RespFrame;
use crate::core::{Command, RouterError};
use parking_lot::RwLock;
use rand::seq::IteratorRandom;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Per-node settings supplied when a node is added to a router.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeOptions {
    /// A user-supplied name the node can be looked up by.
    pub alias: Option<String>,
    /// The node's share of a hash ring. Ignored by the cluster router.
    pub weight: Option<u32>,
    /// Static slot hints such as `"0-5460"`. Ignored by the sharded router.
    pub slots: Option<String>,
}

/// A pool entry: one node connection plus its options.
///
/// Access to the connection is serialised, so one in-flight command at a time
/// runs on it. Commands for different nodes never contend.
#[derive(Debug)]
pub struct NodeHandle {
    address: NodeAddress,
    options: NodeOptions,
    connection: Mutex<Box<dyn NodeConnection>>,
    connected: AtomicBool,
}

impl NodeHandle {
    pub fn new(connection: Box<dyn NodeConnection>, options: NodeOptions) -> Self {
        let connected = connection.is_connected();
        Self {
            address: connection.address().clone(),
            options,
            connection: Mutex::new(connection),
            connected: AtomicBool::new(connected),
        }
    }

    pub fn address(&self) -> &NodeAddress {
        &self.address
    }

    pub fn options(&self) -> &NodeOptions {
        &self.options
    }

    pub fn alias(&self) -> Option<&str> {
        self.options.alias.as_deref()
    }

    /// The connection state observed after the last operation on this node.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub async fn connect(&self) -> Result<(), RouterError> {
        let mut conn = self.connection.lock().await;
        let result = Self::ensure_connected(&mut **conn).await;
        self.connected.store(conn.is_connected(), Ordering::Release);
        result
    }

    pub async fn disconnect(&self) {
        let mut conn = self.connection.lock().await;
        conn.disconnect().await;
        self.connected.store(false, Ordering::Release);
    }

    /// Sends `command`, connecting first if needed.
    pub async fn execute(&self, command: &Command) -> Result<RespFrame, RouterError> {
        let mut conn = self.connection.lock().await;
        let result = match Self::ensure_connected(&mut **conn).await {
            Ok(()) => conn.execute(command).await,
            Err(e) => Err(e),
        };
        self.connected.store(conn.is_connected(), Ordering::Release);
        result
    }

    /// Sends `ASKING` followed by `command` without letting another command in between.
    pub async fn execute_asking(&self, command: &Command) -> Result<RespFrame, RouterError> {
        let mut conn = self.connection.lock().await;
        let result = async {
            Self::ensure_connected(&mut **conn).await?;
            let reply = conn.execute(&Command::asking()).await?;
            if let Some(msg) = reply.as_error() {
                debug!("ASKING rejected by {}: {}", self.address, msg);
            }
            conn.execute(command).await
        }
        .await;
        self.connected.store(conn.is_connected(), Ordering::Release);
        result
    }

    async fn ensure_connected(conn: &mut dyn NodeConnection) -> Result<(), RouterError> {
        if !conn.is_connected() {
            conn.connect().await?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct PoolInner {
    nodes: HashMap<NodeAddress, Arc<NodeHandle>>,
    aliases: HashMap<String, NodeAddress>,
}

/// Maps node addresses (and aliases) to their handles.
#[derive(Debug, Default)]
pub struct NodePool {
    inner: RwLock<PoolInner>,
}

impl NodePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a node. If the address is already present the existing handle is
    /// kept and returned, and `handle` is dropped.
    pub fn insert(&self, handle: NodeHandle) -> Arc<NodeHandle> {
        let mut inner = self.inner.write();
        if let Some(existing) = inner.nodes.get(handle.address()) {
            return existing.clone();
        }
        let handle = Arc::new(handle);
        if let Some(alias) = handle.alias() {
            match inner.aliases.entry(alias.to_string()) {
                Entry::Vacant(slot) => {
                    slot.insert(handle.address().clone());
                }
                Entry::Occupied(taken) => warn!(
                    "Alias '{}' already names {}, ignoring it for {}",
                    alias,
                    taken.get(),
                    handle.address()
                ),
            }
        }
        inner.nodes.insert(handle.address().clone(), handle.clone());
        info!("Node {} joined the pool", handle.address());
        handle
    }

    /// Detaches a node from the pool without touching its connection.
    pub fn take(&self, address: &NodeAddress) -> Option<Arc<NodeHandle>> {
        let mut inner = self.inner.write();
        let handle = inner.nodes.remove(address)?;
        if let Some(alias) = handle.alias()
            && inner.aliases.get(alias) == Some(address)
        {
            inner.aliases.remove(alias);
        }
        Some(handle)
    }

    /// Removes a node and disconnects it. Returns `false` if it was not pooled.
    pub async fn remove(&self, address: &NodeAddress) -> bool {
        let Some(handle) = self.take(address) else {
            return false;
        };
        handle.disconnect().await;
        info!("Node {} left the pool", address);
        true
    }

    pub fn get(&self, address: &NodeAddress) -> Option<Arc<NodeHandle>> {
        self.inner.read().nodes.get(address).cloned()
    }

    pub fn get_by_alias(&self, alias: &str) -> Option<Arc<NodeHandle>> {
        let inner = self.inner.read();
        let address = inner.aliases.get(alias)?;
        inner.nodes.get(address).cloned()
    }

    pub fn contains(&self, address: &NodeAddress) -> bool {
        self.inner.read().nodes.contains_key(address)
    }

    /// Picks a random node.
    pub fn random(&self) -> Option<Arc<NodeHandle>> {
        self.random_except(&HashSet::new())
    }

    /// Picks a random node whose address is not in `excluded`.
    pub fn random_except(&self, excluded: &HashSet<NodeAddress>) -> Option<Arc<NodeHandle>> {
        self.inner
            .read()
            .nodes
            .values()
            .filter(|h| !excluded.contains(h.address()))
            .choose(&mut rand::thread_rng())
            .cloned()
    }

    /// The pooled addresses in ascending order.
    pub fn addresses(&self) -> Vec<NodeAddress> {
        let mut addresses: Vec<NodeAddress> = self.inner.read().nodes.keys().cloned().collect();
        addresses.sort();
        addresses
    }

    /// The pooled handles, ordered by address.
    pub fn handles(&self) -> Vec<Arc<NodeHandle>> {
        let mut handles: Vec<Arc<NodeHandle>> = self.inner.read().nodes.values().cloned().collect();
        handles.sort_by(|a, b| a.address().cmp(b.address()));
        handles
    }

    pub fn len(&self) -> usize {
        self.inner.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().nodes.is_empty()
    }
}
