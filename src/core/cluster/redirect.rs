// src/core/cluster/redirect.rs

//! Classifies the cluster-specific error replies a node may send back.

use crate::connection::NodeAddress;
use crate::core::protocol::RespFrame;

/// A reply that tells the router to do something other than return it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterReply {
    /// `-MOVED <slot> <host:port>`: the slot now lives on another node.
    Moved { slot: u16, addr: NodeAddress },
    /// `-ASK <slot> <host:port>`: retry once on another node while the slot migrates.
    Ask { slot: u16, addr: NodeAddress },
    /// `-CLUSTERDOWN ...` or `-TRYAGAIN ...`: the cluster cannot serve the slot right now.
    Unavailable(String),
}

impl ClusterReply {
    /// Inspects a reply frame. Anything that is not a cluster error yields `None`
    /// and is returned to the caller untouched.
    pub fn from_frame(frame: &RespFrame) -> Option<Self> {
        Self::parse(frame.as_error()?)
    }

    pub fn parse(message: &str) -> Option<Self> {
        let mut parts = message.split_whitespace();
        let kind = parts.next()?;
        match kind {
            "MOVED" | "ASK" => {
                let slot = parts.next()?.parse::<u16>().ok()?;
                let addr = parts.next()?.parse::<NodeAddress>().ok()?;
                if kind == "MOVED" {
                    Some(ClusterReply::Moved { slot, addr })
                } else {
                    Some(ClusterReply::Ask { slot, addr })
                }
            }
            "CLUSTERDOWN" | "TRYAGAIN" => Some(ClusterReply::Unavailable(message.to_string())),
            _ => None,
        }
    }
}
