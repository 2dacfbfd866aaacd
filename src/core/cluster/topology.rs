// src/core/cluster/topology.rs

//! Parses `CLUSTER SLOTS` replies into slot ranges.

use super::slot_map::SlotRange;
use crate::connection::NodeAddress;
use crate::core::RouterError;
use crate::core::protocol::RespFrame;

/// Parses a `CLUSTER SLOTS` reply.
///
/// Each entry is `[first, last, [host, port, id?], replica...]`; only the
/// master (the first node) is kept. A master with an empty host refers to the
/// node that answered the query, `queried`.
pub fn parse_cluster_slots(
    reply: &RespFrame,
    queried: &NodeAddress,
) -> Result<Vec<SlotRange>, RouterError> {
    let entries = match reply {
        RespFrame::Array(entries) => entries,
        RespFrame::Error(msg) => {
            return Err(RouterError::Protocol(format!(
                "CLUSTER SLOTS failed on {queried}: {msg}"
            )));
        }
        other => {
            return Err(RouterError::Protocol(format!(
                "unexpected reply to CLUSTER SLOTS: {other:?}"
            )));
        }
    };

    let mut ranges = Vec::with_capacity(entries.len());
    for entry in entries {
        let RespFrame::Array(parts) = entry else {
            return Err(RouterError::Protocol(
                "CLUSTER SLOTS entry is not an array".to_string(),
            ));
        };
        if parts.len() < 3 {
            return Err(RouterError::Protocol(
                "CLUSTER SLOTS entry has no master".to_string(),
            ));
        }
        let first = slot_number(&parts[0])?;
        let last = slot_number(&parts[1])?;
        let owner = master_address(&parts[2], queried)?;
        ranges.push(SlotRange::new(first, last, owner)?);
    }
    Ok(ranges)
}

fn slot_number(frame: &RespFrame) -> Result<u32, RouterError> {
    let value = match frame {
        RespFrame::Integer(i) => *i,
        other => other
            .to_text()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| RouterError::Protocol(format!("invalid slot number {other:?}")))?,
    };
    u32::try_from(value).map_err(|_| RouterError::Protocol(format!("negative slot number {value}")))
}

fn master_address(frame: &RespFrame, queried: &NodeAddress) -> Result<NodeAddress, RouterError> {
    let RespFrame::Array(node) = frame else {
        return Err(RouterError::Protocol(
            "CLUSTER SLOTS node is not an array".to_string(),
        ));
    };
    let host = node
        .first()
        .and_then(RespFrame::to_text)
        .ok_or_else(|| RouterError::Protocol("CLUSTER SLOTS node has no host".to_string()))?;
    if host.is_empty() {
        return Ok(queried.clone());
    }
    let port = node
        .get(1)
        .and_then(|p| p.as_integer().or_else(|| p.to_text()?.parse().ok()))
        .and_then(|p| u16::try_from(p).ok())
        .filter(|p| *p != 0)
        .ok_or_else(|| RouterError::InvalidAddress(format!("{host}:?")))?;
    Ok(NodeAddress::new(host, port))
}
