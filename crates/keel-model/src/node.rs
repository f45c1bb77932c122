//! Cluster nodes and per-resource node views.

use serde::{Deserialize, Serialize};

use crate::score::Score;

/// Index of a node in the working set's node arena.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct NodeId(pub usize);

/// A cluster node and its liveness state.
///
/// This is the single global record per node. Resources see nodes through
/// `NodeEntry` views in their allowed-node tables, which carry the
/// resource-specific score and assignment count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub online: bool,
    pub standby: bool,
    /// Node state is unknown or it needs fencing.
    pub unclean: bool,
    pub shutting_down: bool,
}

impl Node {
    /// Whether this node may run resources.
    ///
    /// `include_standby` counts standby nodes as available (used when asking
    /// "is the current location still there" rather than "can we start
    /// something new here"). `include_unclean` likewise tolerates nodes whose
    /// state is unknown.
    pub fn available(&self, include_standby: bool, include_unclean: bool) -> bool {
        if !self.online || self.shutting_down {
            return false;
        }
        if self.unclean && !include_unclean {
            return false;
        }
        if self.standby && !include_standby {
            return false;
        }
        true
    }
}

/// One resource's view of one node: the score the resource has there and
/// how many instances of its collective are assigned there.
///
/// `count` is transient per-pass state. The collective assigner zeroes it at
/// the start of a pass (where it doubles as the assignment denominator) and
/// bumps it on every successful instance assignment.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NodeEntry {
    pub score: Score,
    pub count: u32,
}

impl NodeEntry {
    pub fn new(score: Score) -> NodeEntry {
        NodeEntry { score, count: 0 }
    }
}
