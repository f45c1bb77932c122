//! keel-sched: the collective-instance scheduling core of the Keel policy
//! engine.
//!
//! Given a cluster model from `keel-model`, this crate decides, for each
//! collective resource (a clone with N interchangeable instances, or a
//! bundle with N replica containers):
//!
//! - Which node each instance runs on, subject to per-node caps,
//!   colocation preferences, and affinity to the current location
//! - How the instances' start/stop/promote/demote actions are ordered
//!   against other resources' actions, pairing instances up when the
//!   collectives interleave
//!
//! # Architecture
//!
//! ```text
//! assign_instances            create_instance_actions
//!   ├── preferred_node          ├── check_instance_state
//!   └── assign_instance         └── pseudo actions + notifications
//!       ├── can_run_instance
//!       └── allowed-node counts
//!
//! instance_update_ordered_actions
//!   ├── can_interleave  ──>  update_interleaved_actions
//!   │                          ├── find_compatible_instance
//!   │                          └── find_instance_action
//!   └── otherwise       ──>  per-instance non-interleaved updates
//! ```
//!
//! The whole pass is a pure function over the working set: no I/O, no
//! retries, no persistence.

pub mod actions;
pub mod assign;
pub mod interleave;

pub use actions::{InstanceStateFlags, collective_action_flags, create_instance_actions};
pub use assign::{assign_collective, assign_instances};
pub use interleave::{find_compatible_instance, instance_matches, instance_update_ordered_actions};
