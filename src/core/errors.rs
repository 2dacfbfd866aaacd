// src/core/errors.rs

//! Defines the primary error type for the routing layer.

use std::num::ParseIntError;
use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing every failure a router can surface.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Incomplete data in stream")]
    IncompleteData,

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A transport-level failure while reaching a node.
    #[error("Connection to {addr} failed: {reason}")]
    ConnectionFailure { addr: String, reason: String },

    /// The command has no key extraction rule, or its keys do not agree on one slot.
    #[error("Cannot use '{command}' with a partitioned backend: {reason}")]
    Unroutable { command: String, reason: String },

    #[error("Invalid slot range [{first}, {last}]")]
    InvalidSlotRange { first: u32, last: u32 },

    #[error("No connections available in the pool")]
    NoConnections,

    #[error("Invalid node address '{0}'")]
    InvalidAddress(String),

    #[error("Unknown node '{0}'")]
    UnknownNode(String),

    #[error("Internal Error: {0}")]
    Internal(String),

    // --- Cluster replies surfaced once the retry budget is spent ---
    /// The slot kept moving while the command was being redirected.
    #[error("MOVED {slot} {addr}")]
    Moved { slot: u16, addr: String },

    /// The slot was still migrating when the retry budget ran out.
    #[error("ASK {slot} {addr}")]
    Ask { slot: u16, addr: String },

    /// The cluster reported itself unavailable on every attempt.
    #[error("CLUSTERDOWN {0}")]
    ClusterDown(String),
}

impl RouterError {
    /// Builds an `Unroutable` error for the given command ID.
    pub fn unroutable(command: &str, reason: impl Into<String>) -> Self {
        RouterError::Unroutable {
            command: command.to_string(),
            reason: reason.into(),
        }
    }

    /// Builds a `ConnectionFailure` for the given node.
    pub fn connection_failure(addr: impl ToString, reason: impl ToString) -> Self {
        RouterError::ConnectionFailure {
            addr: addr.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Returns `true` if the error comes from the transport rather than the server.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            RouterError::ConnectionFailure { .. } | RouterError::Io(_)
        )
    }

    /// Returns `true` if the router may retry the command after this error.
    pub fn is_retryable(&self) -> bool {
        self.is_connection_failure() || matches!(self, RouterError::ClusterDown(_))
    }
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
impl Clone for RouterError {
    fn clone(&self) -> Self {
        match self {
            RouterError::Io(e) => RouterError::Io(Arc::clone(e)),
            RouterError::IncompleteData => RouterError::IncompleteData,
            RouterError::Protocol(s) => RouterError::Protocol(s.clone()),
            RouterError::ConnectionFailure { addr, reason } => RouterError::ConnectionFailure {
                addr: addr.clone(),
                reason: reason.clone(),
            },
            RouterError::Unroutable { command, reason } => RouterError::Unroutable {
                command: command.clone(),
                reason: reason.clone(),
            },
            RouterError::InvalidSlotRange { first, last } => RouterError::InvalidSlotRange {
                first: *first,
                last: *last,
            },
            RouterError::NoConnections => RouterError::NoConnections,
            RouterError::InvalidAddress(s) => RouterError::InvalidAddress(s.clone()),
            RouterError::UnknownNode(s) => RouterError::UnknownNode(s.clone()),
            RouterError::Internal(s) => RouterError::Internal(s.clone()),
            RouterError::Moved { slot, addr } => RouterError::Moved {
                slot: *slot,
                addr: addr.clone(),
            },
            RouterError::Ask { slot, addr } => RouterError::Ask {
                slot: *slot,
                addr: addr.clone(),
            },
            RouterError::ClusterDown(s) => RouterError::ClusterDown(s.clone()),
        }
    }
}

impl PartialEq for RouterError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RouterError::Io(e1), RouterError::Io(e2)) => e1.to_string() == e2.to_string(),
            (RouterError::Protocol(s1), RouterError::Protocol(s2)) => s1 == s2,
            (
                RouterError::ConnectionFailure { addr: a1, reason: r1 },
                RouterError::ConnectionFailure { addr: a2, reason: r2 },
            ) => a1 == a2 && r1 == r2,
            (
                RouterError::Unroutable { command: c1, reason: r1 },
                RouterError::Unroutable { command: c2, reason: r2 },
            ) => c1 == c2 && r1 == r2,
            (
                RouterError::InvalidSlotRange { first: f1, last: l1 },
                RouterError::InvalidSlotRange { first: f2, last: l2 },
            ) => f1 == f2 && l1 == l2,
            (RouterError::InvalidAddress(s1), RouterError::InvalidAddress(s2)) => s1 == s2,
            (RouterError::UnknownNode(s1), RouterError::UnknownNode(s2)) => s1 == s2,
            (RouterError::Internal(s1), RouterError::Internal(s2)) => s1 == s2,
            (RouterError::ClusterDown(s1), RouterError::ClusterDown(s2)) => s1 == s2,
            (
                RouterError::Moved { slot: s1, addr: a1 },
                RouterError::Moved { slot: s2, addr: a2 },
            ) => s1 == s2 && a1 == a2,
            (
                RouterError::Ask { slot: s1, addr: a1 },
                RouterError::Ask { slot: s2, addr: a2 },
            ) => s1 == s2 && a1 == a2,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for RouterError {
    fn from(e: std::io::Error) -> Self {
        RouterError::Io(Arc::new(e))
    }
}

impl From<ParseIntError> for RouterError {
    fn from(e: ParseIntError) -> Self {
        RouterError::Protocol(format!("invalid integer: {e}"))
    }
}

impl From<std::str::Utf8Error> for RouterError {
    fn from(e: std::str::Utf8Error) -> Self {
        RouterError::Protocol(format!("invalid UTF-8: {e}"))
    }
}
