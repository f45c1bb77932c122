//! keel-model: the in-memory cluster model for the Keel policy engine.
//!
//! Holds everything one scheduling pass reasons over:
//!
//! - Nodes with liveness state, and per-resource node views with scores
//! - Resources (primitives, groups, clones, bundles) with allowed-node
//!   tables, flags, and colocation constraint lists
//! - Actions with ordering edges and flag words
//! - The `WorkingSet` arena tying them together, plus the primitive-level
//!   operations the scheduling core builds on (node choice, action lookup,
//!   ordering-edge installation, ordered-pair flag propagation)
//!
//! # Architecture
//!
//! ```text
//! WorkingSet
//!   ├── nodes:       Vec<Node>          (global liveness records)
//!   ├── resources:   Vec<Resource>      (allowed_nodes: NodeId -> NodeEntry)
//!   ├── actions:     Vec<Action>        (ordering edges by ActionId)
//!   └── colocations: Vec<Colocation>    (indexed on both endpoints)
//! ```
//!
//! The model is built by a loader, mutated by exactly one scheduling pass,
//! and read back out as a plan. Nothing here performs I/O.

pub mod action;
pub mod config;
pub mod constraint;
pub mod error;
pub mod node;
pub mod ordering;
pub mod resource;
pub mod score;
pub mod working_set;

pub use action::{
    Action, ActionFlags, ActionId, OpKey, OrderingEdge, OrderingKind, Task, Updated, parse_op_key,
};
pub use config::CollectiveConfig;
pub use constraint::{Colocation, ColocationId};
pub use error::{ModelError, ModelResult};
pub use node::{Node, NodeEntry, NodeId};
pub use ordering::NotifyOps;
pub use resource::{Resource, ResourceFlags, ResourceId, Role, Variant};
pub use score::{SCORE_INFINITY, Score};
pub use working_set::WorkingSet;
