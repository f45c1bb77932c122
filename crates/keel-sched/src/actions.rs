//! Collective-level actions: state folding, pseudo actions, notifications,
//! and action-flag folding across instances.

use bitflags::bitflags;
use keel_model::{
    ActionFlags, ActionId, NodeId, NotifyOps, OrderingKind, ResourceId, Score, Task, Variant,
    WorkingSet, parse_op_key,
};
use serde::{Deserialize, Serialize};
use tracing::{error, trace};

bitflags! {
    /// What the instances of a collective are about to do.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct InstanceStateFlags: u8 {
        const STARTING = 1 << 0;
        const STOPPING = 1 << 1;
        /// Some single instance both starts and stops. Not the same as
        /// STARTING|STOPPING, which may come from different instances.
        const RESTARTING = 1 << 2;
        const ACTIVE = 1 << 3;
    }
}

/// Fold one instance's situation into `state`.
///
/// Non-primitive instances (cloned groups) recurse into their members. A
/// stop may count while merely pseudo because a fenced node's stops are
/// implied rather than executed.
pub(crate) fn check_instance_state(
    ws: &WorkingSet,
    instance: ResourceId,
    state: &mut InstanceStateFlags,
) {
    // Nothing left to detect.
    if state.contains(InstanceStateFlags::all()) {
        return;
    }

    let rsc = ws.resource(instance);
    if rsc.variant != Variant::Primitive {
        for &child in &rsc.children {
            if state.contains(InstanceStateFlags::all()) {
                break;
            }
            check_instance_state(ws, child, state);
        }
        return;
    }

    let mut instance_state = InstanceStateFlags::empty();
    if !rsc.running_on.is_empty() {
        instance_state |= InstanceStateFlags::ACTIVE;
    }

    for &aid in &rsc.actions {
        if instance_state.contains(InstanceStateFlags::STARTING | InstanceStateFlags::STOPPING) {
            break;
        }
        let action = ws.action(aid);
        let optional = action.flags.contains(ActionFlags::OPTIONAL);
        match action.task {
            Task::Start => {
                if !optional && action.flags.contains(ActionFlags::RUNNABLE) {
                    trace!(instance = %rsc.name, action = %action.uuid, "instance is starting");
                    instance_state |= InstanceStateFlags::STARTING;
                } else {
                    trace!(
                        instance = %rsc.name,
                        action = %action.uuid,
                        optional,
                        "start does not affect instance state"
                    );
                }
            }
            Task::Stop => {
                if !optional
                    && action
                        .flags
                        .intersects(ActionFlags::PSEUDO | ActionFlags::RUNNABLE)
                {
                    trace!(instance = %rsc.name, action = %action.uuid, "instance is stopping");
                    instance_state |= InstanceStateFlags::STOPPING;
                } else {
                    trace!(
                        instance = %rsc.name,
                        action = %action.uuid,
                        optional,
                        "stop does not affect instance state"
                    );
                }
            }
            _ => {}
        }
    }

    if instance_state.contains(InstanceStateFlags::STARTING | InstanceStateFlags::STOPPING) {
        instance_state |= InstanceStateFlags::RESTARTING;
    }
    *state |= instance_state;
}

/// Create the collective-level pseudo actions (start/started, stop/stopped)
/// around the instances' own actions, plus the notification pseudo-op sets
/// when requested.
///
/// A notification slot that is `Some(&mut None)` is filled in; a slot that
/// already holds ops is left alone. When both sets are built here, the stop
/// set's final confirmation is ordered before the start set's first
/// notification.
pub fn create_instance_actions(
    ws: &mut WorkingSet,
    collective: ResourceId,
    instances: &[ResourceId],
    start_notify: Option<&mut Option<NotifyOps>>,
    stop_notify: Option<&mut Option<NotifyOps>>,
) {
    let mut state = InstanceStateFlags::empty();

    trace!(
        collective = %ws.resource(collective).name,
        "creating collective instance actions"
    );
    for &instance in instances {
        ws.create_actions(instance);
        check_instance_state(ws, instance, &mut state);
    }

    // Pseudo actions for collective start and started.
    let start = ws.new_pseudo_action(
        collective,
        Task::Start,
        !state.contains(InstanceStateFlags::STARTING),
        true,
    );
    let started = ws.new_pseudo_action(
        collective,
        Task::Started,
        !state.contains(InstanceStateFlags::STARTING),
        false,
    );
    ws.action_mut(started).priority = Score::INFINITY;
    if state.intersects(InstanceStateFlags::ACTIVE | InstanceStateFlags::STARTING) {
        ws.set_action_flags(started, ActionFlags::RUNNABLE);
    }

    let built_start: Option<NotifyOps> = match start_notify {
        Some(slot) => {
            if slot.is_none() {
                *slot = Some(ws.clone_notif_pseudo_ops(collective, Task::Start, start, started));
            }
            *slot
        }
        None => None,
    };

    // Pseudo actions for collective stop and stopped.
    let stop = ws.new_pseudo_action(
        collective,
        Task::Stop,
        !state.contains(InstanceStateFlags::STOPPING),
        true,
    );
    let stopped = ws.new_pseudo_action(
        collective,
        Task::Stopped,
        !state.contains(InstanceStateFlags::STOPPING),
        true,
    );
    ws.action_mut(stopped).priority = Score::INFINITY;
    if !state.contains(InstanceStateFlags::RESTARTING) {
        ws.set_action_flags(stop, ActionFlags::MIGRATE_RUNNABLE);
    }

    if let Some(slot) = stop_notify {
        if slot.is_none() {
            let ops = ws.clone_notif_pseudo_ops(collective, Task::Stop, stop, stopped);
            *slot = Some(ops);
            if let Some(start_ops) = built_start {
                ws.order_actions(ops.post_done, start_ops.pre, OrderingKind::OPTIONAL);
            }
        }
    }
}

/// The task a collective action is really about: notifications map to the
/// action being notified, and completion tasks collapse to the action they
/// complete when the instances are primitives.
pub(crate) fn orig_action_task(ws: &WorkingSet, action: ActionId) -> Option<Task> {
    let a = ws.action(action);
    let rsc = a.rsc?;
    let child = ws.resource(rsc).children.first().copied()?;

    let task = if matches!(a.task, Task::Notify | Task::Notified) {
        // The key is <rsc>_{confirmed-}{pre,post}_notify_<task>_<interval>.
        let key = match parse_op_key(&a.uuid) {
            Ok(key) => key,
            Err(err) => {
                error!(action = %a.uuid, error = %err, "cannot parse notification key");
                return None;
            }
        };
        let Some(pos) = key.task.find("_notify_") else {
            error!(action = %a.uuid, "notification key has no notified action");
            return None;
        };
        let inner = &key.task[pos + "_notify_".len()..];
        match inner.parse::<Task>() {
            Ok(task) => task,
            Err(err) => {
                error!(action = %a.uuid, error = %err, "unknown notified action");
                return None;
            }
        }
    } else {
        a.task
    };

    Some(ws.simplified_task(child, task))
}

/// Fold per-instance action flags into a collective action's flag word:
/// optional folds as AND, runnable as OR.
///
/// `node` scopes the fold to one node for primitive instances. The
/// action-object's runnable bit is only cleared for the global view
/// (`node == None`); its optional bit is cleared for any view.
pub fn collective_action_flags(
    ws: &mut WorkingSet,
    action: ActionId,
    instances: &[ResourceId],
    node: Option<NodeId>,
) -> ActionFlags {
    let mut any_runnable = false;
    let orig_task = orig_action_task(ws, action);

    // Original assumptions; optional and runnable may be cleared below.
    let mut flags = ActionFlags::OPTIONAL | ActionFlags::RUNNABLE | ActionFlags::PSEUDO;

    for &instance in instances {
        // Node is relevant only to primitive instances.
        let instance_node = if ws.resource(instance).variant == Variant::Primitive {
            node
        } else {
            None
        };
        let Some(task) = orig_task else {
            continue;
        };
        let Some(instance_action) = ws.find_first_action(instance, task, instance_node) else {
            trace!(
                instance = %ws.resource(instance).name,
                task = %task,
                "instance has no matching action"
            );
            continue;
        };
        let instance_flags = ws.action_flags(instance_action, node);

        if flags.contains(ActionFlags::OPTIONAL)
            && !instance_flags.contains(ActionFlags::OPTIONAL)
        {
            trace!(
                action = %ws.action(action).uuid,
                because = %ws.action(instance_action).uuid,
                "collective action is mandatory because an instance action is"
            );
            flags.remove(ActionFlags::OPTIONAL);
            ws.clear_action_flags(action, ActionFlags::OPTIONAL);
        }
        if instance_flags.contains(ActionFlags::RUNNABLE) {
            any_runnable = true;
        }
    }

    if !any_runnable {
        trace!(
            action = %ws.action(action).uuid,
            "collective action is not runnable, no instance can run it"
        );
        flags.remove(ActionFlags::RUNNABLE);
        if node.is_none() {
            ws.clear_action_flags(action, ActionFlags::RUNNABLE);
        }
    }
    flags
}
