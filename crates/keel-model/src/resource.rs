//! Resources: primitives, groups, clones, and bundles.

use std::collections::HashMap;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::action::ActionId;
use crate::constraint::ColocationId;
use crate::node::{NodeEntry, NodeId};

/// Index of a resource in the working set's resource arena.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ResourceId(pub usize);

/// The kind of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    Primitive,
    Group,
    Clone,
    Bundle,
}

impl Variant {
    /// Clones and bundles provide their value through interchangeable
    /// instances; groups and primitives do not.
    pub fn is_collective(self) -> bool {
        matches!(self, Variant::Clone | Variant::Bundle)
    }
}

/// Role of a resource, ordered from "least active" to "most active".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Unknown,
    Stopped,
    Started,
    Unpromoted,
    Promoted,
}

bitflags! {
    /// Per-resource flags. PROVISIONAL and ALLOCATING are transient
    /// per-pass state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ResourceFlags: u8 {
        /// Present in live state but no longer configured.
        const ORPHAN = 1 << 0;
        /// No node has been chosen yet in this pass.
        const PROVISIONAL = 1 << 1;
        /// Node choice is in progress; seeing this again means a
        /// colocation cycle.
        const ALLOCATING = 1 << 2;
        /// The cluster is allowed to act on this resource.
        const MANAGED = 1 << 3;
        const FAILED = 1 << 4;
        /// Blocked from any further action.
        const BLOCKED = 1 << 5;
    }
}

/// A configured resource.
///
/// Parent links are back-references for lookup only; the parent owns the
/// child list. Clone instances and bundle replica containers appear as
/// children of their collective.
#[derive(Debug, Clone)]
pub struct Resource {
    pub id: ResourceId,
    pub name: String,
    pub variant: Variant,
    pub parent: Option<ResourceId>,
    pub children: Vec<ResourceId>,
    /// Nodes this resource may run on, with resource-specific score and
    /// per-pass assignment count.
    pub allowed_nodes: HashMap<NodeId, NodeEntry>,
    /// Colocations where this resource is the dependent side.
    pub this_with: Vec<ColocationId>,
    /// Colocations where this resource is the primary side.
    pub with_this: Vec<ColocationId>,
    pub actions: Vec<ActionId>,
    pub flags: ResourceFlags,
    /// String metadata, notably `interleave` on collectives.
    pub meta: HashMap<String, String>,
    /// Nodes this resource is currently running on, per live state.
    pub running_on: Vec<NodeId>,
    /// Node chosen in this pass, once no longer provisional.
    pub assigned_node: Option<NodeId>,
    pub role: Role,
    pub next_role: Role,
    /// For a bundle replica container, the resource running inside it.
    pub inner: Option<ResourceId>,
}

impl Resource {
    pub fn is_provisional(&self) -> bool {
        self.flags.contains(ResourceFlags::PROVISIONAL)
    }

    pub fn is_managed(&self) -> bool {
        self.flags.contains(ResourceFlags::MANAGED)
    }

    /// Whether the `interleave` meta attribute is set truthy.
    pub fn interleaves(&self) -> bool {
        self.meta
            .get("interleave")
            .is_some_and(|v| matches!(v.as_str(), "true" | "yes" | "on" | "1"))
    }
}
