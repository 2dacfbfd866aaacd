// tests/integration/test_helpers.rs

//! Test helpers: scripted in-memory nodes, loopback RESP servers and tracing setup.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use spineldb_router::connection::{ConnectionFactory, NodeAddress, NodeConnection};
use spineldb_router::core::protocol::{RespFrame, RespFrameCodec};
use spineldb_router::core::{Command, RouterError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tokio_util::codec::Framed;
use tracing_subscriber::EnvFilter;

/// Installs a test-friendly tracing subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

pub fn addr(s: &str) -> NodeAddress {
    s.parse().expect("valid test address")
}

pub fn ok() -> RespFrame {
    RespFrame::SimpleString("OK".into())
}

pub fn bulk(s: &str) -> RespFrame {
    RespFrame::BulkString(s.to_string().into())
}

pub fn err(s: &str) -> RespFrame {
    RespFrame::Error(s.to_string())
}

/// Builds a `CLUSTER SLOTS` reply from `(first, last, "host:port")` triples.
pub fn cluster_slots_reply(ranges: &[(i64, i64, &str)]) -> RespFrame {
    RespFrame::Array(
        ranges
            .iter()
            .map(|(first, last, owner)| {
                let owner = addr(owner);
                RespFrame::Array(vec![
                    RespFrame::Integer(*first),
                    RespFrame::Integer(*last),
                    RespFrame::Array(vec![
                        bulk(&owner.host),
                        RespFrame::Integer(owner.port as i64),
                    ]),
                ])
            })
            .collect(),
    )
}

type Handler = Arc<dyn Fn(&Command) -> RespFrame + Send + Sync>;

#[derive(Default)]
struct MockState {
    handlers: HashMap<NodeAddress, Handler>,
    down: HashSet<NodeAddress>,
    log: Vec<(NodeAddress, String)>,
    connects: Vec<(NodeAddress, Instant)>,
    created: Vec<NodeAddress>,
}

/// A set of scripted in-memory nodes.
///
/// Each node answers through a handler closure. Nodes marked down refuse every
/// connection attempt. Every command and connection attempt is logged.
#[derive(Clone, Default)]
pub struct MockCluster {
    state: Arc<Mutex<MockState>>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, address: &str, handler: F)
    where
        F: Fn(&Command) -> RespFrame + Send + Sync + 'static,
    {
        self.state
            .lock()
            .handlers
            .insert(addr(address), Arc::new(handler));
    }

    pub fn set_down(&self, address: &str, down: bool) {
        let mut state = self.state.lock();
        if down {
            state.down.insert(addr(address));
        } else {
            state.down.remove(&addr(address));
        }
    }

    pub fn connection(&self, address: &str) -> Box<dyn NodeConnection> {
        Box::new(MockConnection {
            address: addr(address),
            cluster: self.clone(),
            connected: false,
        })
    }

    pub fn factory(&self) -> Arc<dyn ConnectionFactory> {
        Arc::new(self.clone())
    }

    /// Every command seen so far, as `(node, "ID arg ...")`.
    pub fn log(&self) -> Vec<(String, String)> {
        self.state
            .lock()
            .log
            .iter()
            .map(|(a, c)| (a.to_string(), c.clone()))
            .collect()
    }

    pub fn commands_on(&self, address: &str) -> Vec<String> {
        let address = addr(address);
        self.state
            .lock()
            .log
            .iter()
            .filter(|(a, _)| *a == address)
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn connect_times(&self, address: &str) -> Vec<Instant> {
        let address = addr(address);
        self.state
            .lock()
            .connects
            .iter()
            .filter(|(a, _)| *a == address)
            .map(|(_, t)| *t)
            .collect()
    }

    /// Addresses the factory was asked to create connections for.
    pub fn created(&self) -> Vec<String> {
        self.state
            .lock()
            .created
            .iter()
            .map(ToString::to_string)
            .collect()
    }
}

impl ConnectionFactory for MockCluster {
    fn create(&self, address: &NodeAddress) -> Result<Box<dyn NodeConnection>, RouterError> {
        self.state.lock().created.push(address.clone());
        Ok(Box::new(MockConnection {
            address: address.clone(),
            cluster: self.clone(),
            connected: false,
        }))
    }
}

#[derive(Debug)]
struct MockConnection {
    address: NodeAddress,
    cluster: MockCluster,
    connected: bool,
}

impl std::fmt::Debug for MockCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MockCluster")
    }
}

#[async_trait]
impl NodeConnection for MockConnection {
    fn address(&self) -> &NodeAddress {
        &self.address
    }

    async fn connect(&mut self) -> Result<(), RouterError> {
        let mut state = self.cluster.state.lock();
        state.connects.push((self.address.clone(), Instant::now()));
        if state.down.contains(&self.address) {
            return Err(RouterError::connection_failure(
                &self.address,
                "connection refused",
            ));
        }
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn execute(&mut self, command: &Command) -> Result<RespFrame, RouterError> {
        let handler = {
            let mut state = self.cluster.state.lock();
            if state.down.contains(&self.address) {
                self.connected = false;
                return Err(RouterError::connection_failure(
                    &self.address,
                    "connection reset by peer",
                ));
            }
            state.log.push((self.address.clone(), command.to_string()));
            state.handlers.get(&self.address).cloned()
        };
        Ok(match handler {
            Some(handler) => handler(command),
            None => err("ERR no handler"),
        })
    }
}

/// A RESP server on a loopback port that answers every command through `handler`.
pub struct LoopbackNode {
    pub address: NodeAddress,
    task: tokio::task::JoinHandle<()>,
}

impl LoopbackNode {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&Command) -> RespFrame + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind loopback listener");
        let local = listener.local_addr().expect("local address");
        let handler: Handler = Arc::new(handler);
        let task = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let handler = handler.clone();
                tokio::spawn(async move {
                    let mut framed = Framed::new(socket, RespFrameCodec);
                    while let Some(Ok(frame)) = framed.next().await {
                        let reply = match request_to_command(frame) {
                            Some(command) => handler(&command),
                            None => err("ERR invalid request"),
                        };
                        if framed.send(reply).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
        Self {
            address: NodeAddress::new(local.ip().to_string(), local.port()),
            task,
        }
    }

    /// Stops accepting new connections.
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for LoopbackNode {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn request_to_command(frame: RespFrame) -> Option<Command> {
    let RespFrame::Array(parts) = frame else {
        return None;
    };
    let mut tokens = Vec::with_capacity(parts.len());
    for part in parts {
        match part {
            RespFrame::BulkString(b) => tokens.push(b),
            _ => return None,
        }
    }
    Command::raw(tokens)
}
