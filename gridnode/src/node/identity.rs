use crate::halt::FatalError;
use crate::node::{Attributes, NodeAddress, NodeDescriptor, NodeId};

/// Who this node is: cluster, descriptor and start time.
///
/// Written only by the initialization sequence. The cluster ID goes from
/// empty to set exactly once; the node ID likewise never changes once non-zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeIdentity {
    cluster_id: String,
    descriptor: NodeDescriptor,
    started_at: u64,
}

impl NodeIdentity {
    pub fn new(address: NodeAddress, attrs: Attributes) -> Self {
        NodeIdentity {
            cluster_id: String::new(),
            descriptor: NodeDescriptor {
                node_id: NodeId::default(),
                address,
                attrs,
            },
            started_at: 0,
        }
    }

    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    pub fn node_id(&self) -> NodeId {
        self.descriptor.node_id
    }

    pub fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    pub fn started_at(&self) -> u64 {
        self.started_at
    }

    pub(crate) fn set_started_at(&mut self, started_at: u64) {
        self.started_at = started_at;
    }

    /// Sets the cluster ID once. Repeating the same value is accepted.
    pub(crate) fn set_cluster_id(&mut self, cluster_id: &str) -> Result<(), FatalError> {
        if self.cluster_id.is_empty() {
            self.cluster_id = cluster_id.to_string();
            return Ok(());
        }
        if self.cluster_id != cluster_id {
            return Err(FatalError::ClusterIdReassigned {
                current: self.cluster_id.clone(),
                requested: cluster_id.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn set_node_id(&mut self, node_id: NodeId) -> Result<(), FatalError> {
        let current = self.descriptor.node_id;
        if !current.is_unset() && current != node_id {
            return Err(FatalError::NodeIdConflict {
                current,
                requested: node_id,
            });
        }
        self.descriptor.node_id = node_id;
        Ok(())
    }
}
