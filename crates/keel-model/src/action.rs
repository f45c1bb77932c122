//! Actions, action flags, and ordering edges.
//!
//! Every action has an operation key ("uuid") of the form
//! `<resource>_<task>_<interval>`; notification actions use the longer
//! `<resource>_{confirmed-}{pre,post}_notify_<task>_<interval>` form.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::node::NodeId;
use crate::resource::ResourceId;
use crate::score::Score;

/// Index of an action in the working set's action arena.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ActionId(pub usize);

/// What an action does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    Start,
    Started,
    Stop,
    Stopped,
    Promote,
    Promoted,
    Demote,
    Demoted,
    Notify,
    Notified,
    Monitor,
}

impl Task {
    pub fn text(self) -> &'static str {
        match self {
            Task::Start => "start",
            Task::Started => "started",
            Task::Stop => "stop",
            Task::Stopped => "stopped",
            Task::Promote => "promote",
            Task::Promoted => "promoted",
            Task::Demote => "demote",
            Task::Demoted => "demoted",
            Task::Notify => "notify",
            Task::Notified => "notified",
            Task::Monitor => "monitor",
        }
    }

    /// Map a completion task to the task it completes (`stopped` to `stop`
    /// and so on). Non-completion tasks map to themselves.
    pub fn simplified(self) -> Task {
        match self {
            Task::Started => Task::Start,
            Task::Stopped => Task::Stop,
            Task::Promoted => Task::Promote,
            Task::Demoted => Task::Demote,
            other => other,
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

impl FromStr for Task {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Task> {
        match s {
            "start" => Ok(Task::Start),
            "started" => Ok(Task::Started),
            "stop" => Ok(Task::Stop),
            "stopped" => Ok(Task::Stopped),
            "promote" => Ok(Task::Promote),
            "promoted" => Ok(Task::Promoted),
            "demote" => Ok(Task::Demote),
            "demoted" => Ok(Task::Demoted),
            "notify" => Ok(Task::Notify),
            "notified" => Ok(Task::Notified),
            "monitor" => Ok(Task::Monitor),
            other => Err(ModelError::UnknownTask(other.to_string())),
        }
    }
}

bitflags! {
    /// Per-action flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ActionFlags: u8 {
        /// The action is not required by the transition; it only records
        /// that the state is already as desired.
        const OPTIONAL = 1 << 0;
        /// The action can actually be executed.
        const RUNNABLE = 1 << 1;
        /// Synthetic action used only as an ordering anchor.
        const PSEUDO = 1 << 2;
        /// A stop that does not break a migration.
        const MIGRATE_RUNNABLE = 1 << 3;
    }
}

bitflags! {
    /// Kinds attached to an ordering edge between two actions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct OrderingKind: u8 {
        /// Pure ordering; neither side forces the other.
        const OPTIONAL = 1 << 0;
        /// A mandatory "first" makes "then" mandatory.
        const IMPLIES_THEN = 1 << 1;
        /// A mandatory "then" makes "first" mandatory.
        const IMPLIES_FIRST = 1 << 2;
        /// "then" can only run if "first" can.
        const RUNNABLE_LEFT = 1 << 3;
    }
}

bitflags! {
    /// Which side(s) of an ordered action pair were changed by an update.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Updated: u8 {
        const FIRST = 1 << 0;
        const THEN = 1 << 1;
    }
}

/// One ordering edge from or to another action.
#[derive(Debug, Clone, Copy)]
pub struct OrderingEdge {
    pub action: ActionId,
    pub kinds: OrderingKind,
}

/// A scheduled (or pseudo) action.
#[derive(Debug, Clone)]
pub struct Action {
    pub id: ActionId,
    /// Operation key, e.g. `db_start_0`.
    pub uuid: String,
    pub task: Task,
    pub rsc: Option<ResourceId>,
    pub node: Option<NodeId>,
    pub flags: ActionFlags,
    pub priority: Score,
    /// Actions ordered after this one.
    pub actions_after: Vec<OrderingEdge>,
    /// Actions ordered before this one.
    pub actions_before: Vec<OrderingEdge>,
}

/// A parsed operation key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpKey {
    pub rsc: String,
    pub task: String,
    pub interval_ms: u32,
}

fn malformed(key: &str) -> ModelError {
    ModelError::MalformedOpKey(key.to_string())
}

/// Split an operation key into resource name, task text, and interval.
///
/// Notification keys keep their full task text (for example
/// `confirmed-post_notify_start`); resource names may themselves contain
/// underscores.
pub fn parse_op_key(key: &str) -> ModelResult<OpKey> {
    let (rest, interval) = key.rsplit_once('_').ok_or_else(|| malformed(key))?;
    let interval_ms: u32 = interval.parse().map_err(|_| malformed(key))?;

    const NOTIFY_MARKERS: [&str; 4] = [
        "_confirmed-pre_notify_",
        "_confirmed-post_notify_",
        "_pre_notify_",
        "_post_notify_",
    ];
    for marker in NOTIFY_MARKERS {
        if let Some(pos) = rest.find(marker) {
            return Ok(OpKey {
                rsc: rest[..pos].to_string(),
                task: rest[pos + 1..].to_string(),
                interval_ms,
            });
        }
    }

    let (rsc, task) = rest.rsplit_once('_').ok_or_else(|| malformed(key))?;
    if rsc.is_empty() || task.is_empty() {
        return Err(malformed(key));
    }
    Ok(OpKey {
        rsc: rsc.to_string(),
        task: task.to_string(),
        interval_ms,
    })
}
