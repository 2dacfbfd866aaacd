// src/connection/address.rs

use crate::core::RouterError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The network identity of a node: `host:port`.
///
/// This is the key used for pool membership and the value stored in slot maps
/// and hash rings, so its `Display` form is canonical.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for NodeAddress {
    type Err = RouterError;

    /// Parses `host:port`, `[ipv6]:port` or a bare IPv6 address with a trailing port.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RouterError::InvalidAddress(s.to_string());
        let (host, port) = s.trim().rsplit_once(':').ok_or_else(invalid)?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(invalid());
        }
        let port: u16 = port.parse().map_err(|_| invalid())?;
        if port == 0 {
            return Err(invalid());
        }
        Ok(NodeAddress::new(host, port))
    }
}

impl TryFrom<&str> for NodeAddress {
    type Error = RouterError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays() {
        let addr: NodeAddress = "10.0.0.2:7000".parse().unwrap();
        assert_eq!(addr, NodeAddress::new("10.0.0.2", 7000));
        assert_eq!(addr.to_string(), "10.0.0.2:7000");
    }

    #[test]
    fn parses_ipv6() {
        let addr: NodeAddress = "[::1]:7001".parse().unwrap();
        assert_eq!(addr.host, "::1");
        assert_eq!(addr.to_string(), "[::1]:7001");
        let bare: NodeAddress = "::1:7001".parse().unwrap();
        assert_eq!(bare, addr);
    }

    #[test]
    fn rejects_garbage() {
        assert!("localhost".parse::<NodeAddress>().is_err());
        assert!(":7000".parse::<NodeAddress>().is_err());
        assert!("host:abc".parse::<NodeAddress>().is_err());
        assert!("host:0".parse::<NodeAddress>().is_err());
    }
}
