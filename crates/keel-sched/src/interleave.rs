//! Interleaved orderings between collectives.
//!
//! When an ordering relates two collectives that both interleave, the
//! constraint is applied between matched instance pairs (same node) instead
//! of between every cross product. Stops and demotes match on current
//! location; everything else matches on the assigned one.

use keel_model::{
    ActionFlags, ActionId, NodeId, OrderingKind, ResourceFlags, ResourceId, Role, Task, Updated,
    WorkingSet,
};
use tracing::{debug, error, info, trace};

use crate::actions::orig_action_task;

/// Check whether an instance is compatible with a node and role.
///
/// `current` selects the instance's original node and role rather than the
/// assigned ones. Instances that are blocked anywhere in their subtree
/// never match.
pub fn instance_matches(
    ws: &WorkingSet,
    instance: ResourceId,
    node: NodeId,
    role: Option<Role>,
    current: bool,
) -> bool {
    if let Some(role) = role {
        if role != ws.state(instance, current) {
            trace!(
                instance = %ws.resource(instance).name,
                role = ?role,
                "not a compatible instance, role differs"
            );
            return false;
        }
    }

    // Only instances that have not failed anywhere are candidates.
    let instance_node = if ws.is_set_recursive(instance, ResourceFlags::BLOCKED, true) {
        None
    } else {
        ws.location(instance, current)
    };

    let Some(instance_node) = instance_node else {
        trace!(
            instance = %ws.resource(instance).name,
            "not a compatible instance, not assigned to a node"
        );
        return false;
    };
    if instance_node != node {
        trace!(
            instance = %ws.resource(instance).name,
            on = %ws.node_name(instance_node),
            wanted = %ws.node_name(node),
            "not a compatible instance, assigned to another node"
        );
        return false;
    }
    true
}

fn find_compatible_instance_on_node(
    ws: &WorkingSet,
    match_rsc: ResourceId,
    rsc: ResourceId,
    node: NodeId,
    role: Option<Role>,
    current: bool,
) -> Option<ResourceId> {
    for instance in ws.instance_list(rsc) {
        if instance_matches(ws, instance, node, role, current) {
            trace!(
                instance = %ws.resource(instance).name,
                matching = %ws.resource(match_rsc).name,
                node = %ws.node_name(node),
                "found compatible instance"
            );
            return Some(instance);
        }
    }
    trace!(
        collective = %ws.resource(rsc).name,
        matching = %ws.resource(match_rsc).name,
        node = %ws.node_name(node),
        "no compatible instance on node"
    );
    None
}

/// Find an instance of `rsc` compatible with `match_rsc` by node and role.
///
/// If `match_rsc` has a location only that node is checked; otherwise its
/// allowed nodes are tried best-first.
pub fn find_compatible_instance(
    ws: &WorkingSet,
    match_rsc: ResourceId,
    rsc: ResourceId,
    role: Option<Role>,
    current: bool,
) -> Option<ResourceId> {
    if let Some(node) = ws.location(match_rsc, current) {
        return find_compatible_instance_on_node(ws, match_rsc, rsc, node, role, current);
    }

    for node in ws.sorted_allowed_nodes(match_rsc) {
        if let Some(instance) =
            find_compatible_instance_on_node(ws, match_rsc, rsc, node, role, current)
        {
            return Some(instance);
        }
    }

    debug!(
        collective = %ws.resource(rsc).name,
        matching = %ws.resource(match_rsc).name,
        "no compatible instance found"
    );
    None
}

/// Whether an ordering between two actions should be interleaved: distinct
/// collective resources on both sides, and the `interleave` meta set on the
/// governing one (the first resource for stops and demotes, the then
/// resource otherwise).
fn can_interleave_actions(ws: &WorkingSet, first: ActionId, then: ActionId) -> bool {
    let (first_rsc, then_rsc) = match (ws.action(first).rsc, ws.action(then).rsc) {
        (Some(f), Some(t)) => (f, t),
        _ => {
            trace!(
                first = %ws.action(first).uuid,
                then = %ws.action(then).uuid,
                "not interleaving, not resource actions"
            );
            return false;
        }
    };
    if first_rsc == then_rsc {
        trace!(
            first = %ws.action(first).uuid,
            then = %ws.action(then).uuid,
            "not interleaving, same resource"
        );
        return false;
    }
    if !ws.resource(first_rsc).variant.is_collective()
        || !ws.resource(then_rsc).variant.is_collective()
    {
        trace!(
            first = %ws.action(first).uuid,
            then = %ws.action(then).uuid,
            "not interleaving, not clones or bundles"
        );
        return false;
    }

    let then_uuid = &ws.action(then).uuid;
    let governing = if then_uuid.ends_with("_stop_0") || then_uuid.ends_with("_demote_0") {
        first_rsc
    } else {
        then_rsc
    };
    let interleave = ws.resource(governing).interleaves();
    trace!(
        first = %ws.action(first).uuid,
        then = %ws.action(then).uuid,
        governing = %ws.resource(governing).name,
        interleave,
        "interleaving decision"
    );
    interleave
}

/// Handle a then-instance with no interleave match. Going down is always
/// allowed; coming up is inhibited when the ordering makes the first side
/// mandatory.
fn unassign_if_mandatory(
    ws: &mut WorkingSet,
    first: ActionId,
    then_instance: ResourceId,
    kinds: OrderingKind,
    current: bool,
) -> bool {
    if current {
        trace!(
            first = %ws.action(first).uuid,
            instance = %ws.resource(then_instance).name,
            "no instance to order before stopping or demoting"
        );
        false
    } else if kinds.intersects(OrderingKind::RUNNABLE_LEFT | OrderingKind::IMPLIES_THEN) {
        info!(
            instance = %ws.resource(then_instance).name,
            first = %ws.action(first).uuid,
            "inhibiting instance from being active, nothing to interleave with"
        );
        ws.assign_resource(then_instance, None, true)
    } else {
        false
    }
}

/// Find the action named `task` on an instance, resolving the bundle
/// container-versus-inner split.
///
/// For the first side of an ordering the containerized resource is used for
/// everything except stops; for the then side it is used only for promote
/// and demote. Containerized actions run on the bundle-created guest node,
/// so the node scope is dropped when the inner resource is picked.
fn find_instance_action(
    ws: &WorkingSet,
    action: ActionId,
    instance: ResourceId,
    task: Task,
    node: Option<NodeId>,
    for_first: bool,
) -> Option<ActionId> {
    let action_task = ws.action(action).task;
    let use_inner = if for_first {
        !matches!(action_task, Task::Stop | Task::Stopped)
    } else {
        matches!(
            action_task,
            Task::Promote | Task::Promoted | Task::Demote | Task::Demoted
        )
    };
    let (target, node) = match (use_inner, ws.container_inner(instance)) {
        (true, Some(inner)) => (inner, None),
        _ => (instance, node),
    };

    let found = ws.find_first_action(target, task, node);
    if found.is_none() {
        let orphan = ws.resource(instance).flags.contains(ResourceFlags::ORPHAN);
        if orphan || matches!(task, Task::Stop | Task::Demote) {
            trace!(
                task = %task,
                instance = %ws.resource(instance).name,
                orphan,
                "no action found for instance"
            );
        } else {
            error!(
                task = %task,
                instance = %ws.resource(instance).name,
                "no action found for instance to interleave"
            );
        }
    }
    found
}

/// Pair up first- and then-instances and order their matching actions.
fn update_interleaved_actions(
    ws: &mut WorkingSet,
    first: ActionId,
    then: ActionId,
    node: Option<NodeId>,
    filter: ActionFlags,
    kinds: OrderingKind,
) -> Updated {
    let mut changed = Updated::empty();
    let orig_first_task = orig_action_task(ws, first);

    let (first_rsc, then_rsc) = match (ws.action(first).rsc, ws.action(then).rsc) {
        (Some(f), Some(t)) => (f, t),
        _ => return changed,
    };

    // Stops and demotes must be interleaved with the instance on the
    // current node.
    let first_uuid = ws.action(first).uuid.clone();
    let current = first_uuid.ends_with("_stopped_0") || first_uuid.ends_with("_demoted_0");

    for then_instance in ws.instance_list(then_rsc) {
        let first_instance = find_compatible_instance(ws, then_instance, first_rsc, None, current);
        let Some(first_instance) = first_instance else {
            if unassign_if_mandatory(ws, first, then_instance, kinds, current) {
                changed |= Updated::THEN;
            }
            continue;
        };

        let Some(first_task) = orig_first_task else {
            continue;
        };
        let Some(first_action) = find_instance_action(ws, first, first_instance, first_task, node, true)
        else {
            continue;
        };
        let then_task = ws.action(then).task;
        let Some(then_action) =
            find_instance_action(ws, then, then_instance, then_task, node, false)
        else {
            continue;
        };

        if ws.order_actions(first_action, then_action, kinds) {
            changed |= Updated::FIRST | Updated::THEN;
        }

        let first_flags = ws.action_flags(first_action, node);
        changed |= ws.update_action_pair(first_action, then_action, node, first_flags, filter, kinds);
    }
    changed
}

/// Apply a non-interleaved ordering to one then-instance: its equivalent of
/// the then action, when runnable, is updated against `first`, and any
/// resulting change cascades to the actions ordered after it.
fn update_noninterleaved_actions(
    ws: &mut WorkingSet,
    instance: ResourceId,
    first: ActionId,
    then: ActionId,
    node: Option<NodeId>,
    flags: ActionFlags,
    filter: ActionFlags,
    kinds: OrderingKind,
) -> Updated {
    let then_task = ws.action(then).task;
    let Some(instance_action) = ws.find_first_action(instance, then_task, node) else {
        return Updated::empty();
    };
    let instance_flags = ws.action_flags(instance_action, node);
    if !instance_flags.contains(ActionFlags::RUNNABLE) {
        return Updated::empty();
    }

    let changed = ws.update_action_pair(first, instance_action, node, flags, filter, kinds);

    if changed.contains(Updated::THEN) {
        let afters: Vec<ActionId> = ws
            .action(instance_action)
            .actions_after
            .iter()
            .map(|e| e.action)
            .collect();
        for after in afters {
            ws.update_action_for_orderings(after);
        }
    }
    changed
}

/// Update two collective actions according to an ordering between them.
///
/// Interleaved orderings are applied between matched instance pairs; for
/// everything else the collective-level ordering itself is updated and the
/// effect is propagated into each then-instance.
pub fn instance_update_ordered_actions(
    ws: &mut WorkingSet,
    first: ActionId,
    then: ActionId,
    node: Option<NodeId>,
    flags: ActionFlags,
    filter: ActionFlags,
    kinds: OrderingKind,
) -> Updated {
    let Some(then_rsc) = ws.action(then).rsc else {
        return Updated::empty();
    };

    if can_interleave_actions(ws, first, then) {
        return update_interleaved_actions(ws, first, then, node, filter, kinds);
    }

    // Update the ordering for the collective itself, then for each of its
    // instances individually.
    let mut changed = ws.update_action_pair(first, then, node, flags, filter, kinds);
    for instance in ws.instance_list(then_rsc) {
        changed |= update_noninterleaved_actions(ws, instance, first, then, node, flags, filter, kinds);
    }
    changed
}
