use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::node::{NodeAddress, NodeAddressParseError};

/// Address of a cluster member to contact when joining the gossip network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Decode, Serialize, Deserialize)]
pub struct Resolver {
    address: NodeAddress,
}

impl Resolver {
    pub fn from_address(address: NodeAddress) -> Self {
        Resolver { address }
    }

    pub fn address(&self) -> &NodeAddress {
        &self.address
    }
}

impl fmt::Display for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}

impl TryFrom<&str> for Resolver {
    type Error = NodeAddressParseError;

    fn try_from(addr: &str) -> Result<Self, Self::Error> {
        Ok(Resolver::from_address(NodeAddress::try_from(addr)?))
    }
}
