use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use thiserror::Error;

/// Error type for parsing a `NodeAddress` from a string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeAddressParseError {
    #[error("Invalid node address format (expected 'host:port'): {0}")]
    InvalidFormat(String),
    #[error("Invalid port number in address '{0}': {1}")]
    InvalidPort(String, String),
}

/// Unresolved network address of a node, `host:port`.
///
/// Two addresses are equal only when host and port match textually, which is
/// how a node recognises itself in its own join list.
#[derive(Clone, Encode, Decode, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        NodeAddress {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl Debug for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl TryFrom<&str> for NodeAddress {
    type Error = NodeAddressParseError;

    fn try_from(addr: &str) -> Result<Self, Self::Error> {
        let (host, port) = addr
            .rsplit_once(':')
            .filter(|(host, _)| !host.is_empty())
            .ok_or_else(|| NodeAddressParseError::InvalidFormat(addr.to_string()))?;
        let port = port
            .parse::<u16>()
            .map_err(|e| NodeAddressParseError::InvalidPort(addr.to_string(), e.to_string()))?;
        Ok(NodeAddress::new(host, port))
    }
}

impl std::str::FromStr for NodeAddress {
    type Err = NodeAddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s)
    }
}
