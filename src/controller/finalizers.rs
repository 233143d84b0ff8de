//! Finalizer handling for NodeRoutingTable cleanup
//!
//! The agent's finalizer keeps a deleted NRT around until every route that
//! only this NRT contributed has been removed from the node's kernel tables.

use kube::ResourceExt;

use crate::crd::NodeRoutingTable;

/// Finalizer owned by the routing agent
pub const NRT_FINALIZER: &str = "routing-tables-manager.network.deckhouse.io";

/// `metadata.finalizers` modelled as a set that keeps the API server's order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FinalizerSet {
    items: Vec<String>,
}

impl FinalizerSet {
    pub fn from_nrt(nrt: &NodeRoutingTable) -> Self {
        Self {
            items: nrt.finalizers().to_vec(),
        }
    }

    /// Returns whether the finalizer was newly added
    pub fn add(&mut self, finalizer: &str) -> bool {
        if self.contains(finalizer) {
            return false;
        }
        self.items.push(finalizer.to_string());
        true
    }

    /// Returns whether the finalizer was present
    pub fn remove(&mut self, finalizer: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|f| f != finalizer);
        self.items.len() != before
    }

    pub fn contains(&self, finalizer: &str) -> bool {
        self.items.iter().any(|f| f == finalizer)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.items
    }
}

/// Check if the NRT carries `finalizer`
pub fn has_finalizer(nrt: &NodeRoutingTable, finalizer: &str) -> bool {
    nrt.finalizers().iter().any(|f| f == finalizer)
}

/// Drop `finalizer` from the NRT's metadata; returns whether it was present
pub fn remove_finalizer(nrt: &mut NodeRoutingTable, finalizer: &str) -> bool {
    let mut set = FinalizerSet::from_nrt(nrt);
    if !set.remove(finalizer) {
        return false;
    }
    nrt.metadata.finalizers = Some(set.into_vec());
    true
}
