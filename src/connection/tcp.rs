// src/connection/tcp.rs

//! A plain TCP `NodeConnection` speaking RESP, with connect/read/write timeouts.

use super::{ConnectionFactory, NodeAddress, NodeConnection};
use crate::config::ConnectionConfig;
use crate::core::protocol::{RespFrame, RespFrameCodec};
use crate::core::{Command, RouterError};
use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

#[derive(Debug)]
pub struct TcpConnection {
    address: NodeAddress,
    config: ConnectionConfig,
    stream: Option<TcpStream>,
    codec: RespFrameCodec,
    read_buf: BytesMut,
}

impl TcpConnection {
    pub fn new(address: NodeAddress, config: ConnectionConfig) -> Self {
        Self {
            address,
            config,
            stream: None,
            codec: RespFrameCodec,
            read_buf: BytesMut::with_capacity(4096),
        }
    }

    fn failure(&self, reason: impl ToString) -> RouterError {
        RouterError::connection_failure(&self.address, reason)
    }

    async fn send_and_receive(&mut self, frame: RespFrame) -> Result<RespFrame, RouterError> {
        let mut write_buf = BytesMut::new();
        self.codec.encode(frame, &mut write_buf)?;

        let write_timeout = self.config.write_timeout;
        let read_timeout = self.config.read_timeout;
        let addr = self.address.clone();
        let Some(stream) = self.stream.as_mut() else {
            return Err(RouterError::connection_failure(&addr, "not connected"));
        };

        match tokio::time::timeout(write_timeout, stream.write_all(&write_buf)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(RouterError::connection_failure(&addr, e)),
            Err(_) => {
                return Err(RouterError::connection_failure(
                    &addr,
                    "write timeout while sending command",
                ));
            }
        }

        loop {
            // A reply may already be sitting in the buffer from a previous read.
            if let Some(reply) = self.codec.decode(&mut self.read_buf)? {
                return Ok(reply);
            }
            let read_fut = stream.read_buf(&mut self.read_buf);
            match tokio::time::timeout(read_timeout, read_fut).await {
                Ok(Ok(0)) => {
                    return Err(RouterError::connection_failure(
                        &addr,
                        "connection closed by peer",
                    ));
                }
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => return Err(RouterError::connection_failure(&addr, e)),
                Err(_) => {
                    return Err(RouterError::connection_failure(
                        &addr,
                        "read timeout while waiting for response",
                    ));
                }
            }
        }
    }
}

#[async_trait]
impl NodeConnection for TcpConnection {
    fn address(&self) -> &NodeAddress {
        &self.address
    }

    async fn connect(&mut self) -> Result<(), RouterError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let target = (self.address.host.as_str(), self.address.port);
        let stream = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(target))
            .await
            .map_err(|_| self.failure("connect timeout"))?
            .map_err(|e| self.failure(e))?;
        stream.set_nodelay(true).map_err(|e| self.failure(e))?;
        debug!("Connected to node {}", self.address);
        self.read_buf.clear();
        self.stream = Some(stream);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
            debug!("Disconnected from node {}", self.address);
        }
        self.read_buf.clear();
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn execute(&mut self, command: &Command) -> Result<RespFrame, RouterError> {
        self.connect().await?;
        let result = self.send_and_receive(command.to_frame()).await;
        if matches!(result, Err(ref e) if e.is_connection_failure()) {
            // The stream is in an unknown state after a transport error.
            self.stream = None;
            self.read_buf.clear();
        }
        result
    }
}

/// Creates `TcpConnection`s sharing one set of timeouts.
#[derive(Debug, Clone, Default)]
pub struct TcpConnectionFactory {
    config: ConnectionConfig,
}

impl TcpConnectionFactory {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }
}

impl ConnectionFactory for TcpConnectionFactory {
    fn create(&self, address: &NodeAddress) -> Result<Box<dyn NodeConnection>, RouterError> {
        Ok(Box::new(TcpConnection::new(
            address.clone(),
            self.config.clone(),
        )))
    }
}
