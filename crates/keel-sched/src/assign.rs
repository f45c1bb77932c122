//! Instance assignment: choosing a node for each instance of a collective.
//!
//! Assignment runs in two passes over the instance list:
//!
//! 1. **Stickiness**: instances that are already running somewhere useful
//!    are assigned to their current node early, so healthy instances do not
//!    get shuffled around.
//! 2. **Remainder**: everything still provisional gets a full assignment,
//!    and instances over the collective's total limit are banned outright.
//!
//! The per-node cap is enforced through the collective's allowed-node
//! counts, which double as the assignment denominator at the start of a
//! pass.

use keel_model::{
    CollectiveConfig, ModelResult, NodeId, ResourceFlags, ResourceId, Score, WorkingSet,
};
use tracing::{debug, error, info, trace, warn};

/// Check whether `node` may host one more instance of a collective.
///
/// The node must be able to run resources, the instance must not be an
/// orphan, and the collective's view of the node must exist with a
/// non-negative score and room under `max_per_node`.
pub(crate) fn can_run_instance(
    ws: &WorkingSet,
    instance: ResourceId,
    node: NodeId,
    max_per_node: u32,
) -> bool {
    let rsc = ws.resource(instance);
    if rsc.flags.contains(ResourceFlags::ORPHAN) {
        trace!(
            instance = %rsc.name,
            node = %ws.node_name(node),
            "instance cannot run here, orphaned"
        );
        return false;
    }
    if !ws.available(node, false, false) {
        trace!(
            instance = %rsc.name,
            node = %ws.node_name(node),
            "instance cannot run here, node cannot run resources"
        );
        return false;
    }
    let Some(entry) = ws.top_allowed_node(instance, node) else {
        warn!(
            instance = %rsc.name,
            node = %ws.node_name(node),
            "instance cannot run here, node not allowed for its collective"
        );
        return false;
    };
    if entry.score.is_negative() {
        trace!(
            instance = %rsc.name,
            node = %ws.node_name(node),
            score = %entry.score,
            "instance cannot run here, collective score is negative"
        );
        return false;
    }
    if entry.count >= max_per_node {
        trace!(
            instance = %rsc.name,
            node = %ws.node_name(node),
            count = entry.count,
            max_per_node,
            "instance cannot run here, node already has its instances"
        );
        return false;
    }
    trace!(
        instance = %rsc.name,
        node = %ws.node_name(node),
        count = entry.count,
        "instance can run here"
    );
    true
}

/// Ban an instance (and its descendants) from every allowed node it cannot
/// actually use.
fn ban_unavailable_allowed_nodes(ws: &mut WorkingSet, instance: ResourceId, max_per_node: u32) {
    let nodes: Vec<NodeId> = ws.resource(instance).allowed_nodes.keys().copied().collect();
    for node in nodes {
        if !can_run_instance(ws, instance, node, max_per_node) {
            ws.set_allowed_score_recursive(instance, node, Score::NEG_INFINITY);
        }
    }
}

/// Zero the per-node assignment counts of a collective and return how many
/// of its allowed nodes can currently run resources.
fn reset_allowed_node_counts(ws: &mut WorkingSet, rsc: ResourceId) -> u32 {
    let nodes: Vec<NodeId> = ws.resource(rsc).allowed_nodes.keys().copied().collect();
    let mut available = 0;
    for node in nodes {
        if let Some(entry) = ws.resource_mut(rsc).allowed_nodes.get_mut(&node) {
            entry.count = 0;
        }
        if ws.available(node, false, false) {
            available += 1;
        }
    }
    available
}

/// Copy the relevant parent colocations onto a child instance.
///
/// With `all` set every parent colocation propagates; otherwise only
/// negative ones do (plus mandatory positive ones on the dependent side),
/// to avoid shuffling instances between equally good nodes.
fn append_parent_colocation(ws: &mut WorkingSet, parent: ResourceId, child: ResourceId, all: bool) {
    let this_with = ws.resource(parent).this_with.clone();
    for col in this_with {
        let score = ws.colocation(col).score;
        if all || score.is_negative() || score.is_infinite() {
            ws.add_this_with(child, col);
        }
    }
    let with_this = ws.resource(parent).with_this.clone();
    for col in with_this {
        if !ws.colocation_has_influence(col, Some(child)) {
            continue;
        }
        let score = ws.colocation(col).score;
        if all || score.is_negative() {
            ws.add_with_this(child, col);
        }
    }
}

/// The node an instance should be assigned to early, if any: its current
/// node, provided the instance is healthy and still unassigned, the node is
/// there, and the node has not reached the optimal instance count yet.
fn preferred_node(
    ws: &WorkingSet,
    collective: ResourceId,
    instance: ResourceId,
    optimal_per_node: u32,
) -> Option<NodeId> {
    let rsc = ws.resource(instance);
    if rsc.running_on.is_empty()
        || !rsc.is_provisional()
        || rsc.flags.contains(ResourceFlags::FAILED)
    {
        return None;
    }
    let node = rsc.running_on[0];
    if !ws.available(node, true, false) {
        trace!(
            collective = %ws.resource(collective).name,
            instance = %rsc.name,
            node = %ws.node_name(node),
            "not assigning instance early, current node unavailable"
        );
        return None;
    }
    if let Some(entry) = ws.top_allowed_node(instance, node) {
        if entry.count >= optimal_per_node {
            trace!(
                collective = %ws.resource(collective).name,
                instance = %rsc.name,
                node = %ws.node_name(node),
                "not assigning instance early, optimal instances already assigned"
            );
            return None;
        }
    }
    Some(node)
}

/// Assign one instance to a node.
///
/// With a `prefer` node the assignment is attempted early: the allowed-node
/// table is snapshotted, and if the resource's own choice lands elsewhere
/// the snapshot is restored and the instance stays provisional. On success
/// the collective's per-node count is bumped.
pub(crate) fn assign_instance(
    ws: &mut WorkingSet,
    instance: ResourceId,
    prefer: Option<NodeId>,
    all_coloc: bool,
    max_per_node: u32,
) -> bool {
    trace!(
        instance = %ws.resource(instance).name,
        prefer = ?prefer.map(|n| ws.node_name(n)),
        colocations = if all_coloc { "all" } else { "essential" },
        "assigning instance"
    );

    if !ws.resource(instance).is_provisional() {
        // Already assigned; report whether it actually has a node.
        return ws.location(instance, false).is_some();
    }

    if ws.resource(instance).flags.contains(ResourceFlags::ALLOCATING) {
        debug!(
            instance = %ws.resource(instance).name,
            "assignment loop detected involving instance colocations"
        );
        return false;
    }

    if let Some(p) = prefer {
        match ws.resource(instance).allowed_nodes.get(&p) {
            None => {
                trace!(
                    instance = %ws.resource(instance).name,
                    node = %ws.node_name(p),
                    "not assigning instance to preferred node, not allowed there"
                );
                return false;
            }
            Some(entry) if entry.score.is_negative() => {
                trace!(
                    instance = %ws.resource(instance).name,
                    node = %ws.node_name(p),
                    score = %entry.score,
                    "not assigning instance to preferred node, unavailable"
                );
                return false;
            }
            Some(_) => {}
        }
    }

    ban_unavailable_allowed_nodes(ws, instance, max_per_node);

    let chosen = match prefer {
        None => ws.choose_node(instance, None),
        Some(p) => {
            let backup = ws.copy_node_table(instance);
            match ws.choose_node(instance, Some(p)) {
                Some(chosen) if chosen != p => {
                    info!(
                        instance = %ws.resource(instance).name,
                        preferred = %ws.node_name(p),
                        chosen = %ws.node_name(chosen),
                        "not assigning instance to preferred node, another is better"
                    );
                    ws.restore_node_table(instance, backup);
                    ws.unassign_resource(instance);
                    None
                }
                other => other,
            }
        }
    };

    // The collective tracks how many instances each node has been given.
    if let Some(node) = chosen {
        let managed = ws.resource(instance).is_managed();
        match ws.top_allowed_node_mut(instance, node) {
            Some(entry) => entry.count += 1,
            None => {
                // The instance is allowed here but its collective is not.
                // The per-node cap cannot be tracked for this assignment.
                if managed {
                    error!(
                        instance = %ws.resource(instance).name,
                        node = %ws.node_name(node),
                        "instance assigned to a node its collective does not allow"
                    );
                    debug_assert!(
                        false,
                        "managed instance assigned outside its collective's allowed nodes"
                    );
                }
            }
        }
    }
    chosen.is_some()
}

/// Assign the instances of a collective to nodes, honoring the total and
/// per-node limits.
pub fn assign_instances(
    ws: &mut WorkingSet,
    collective: ResourceId,
    instances: &[ResourceId],
    max_total: u32,
    max_per_node: u32,
) {
    // The node counts double as the assignment denominator here.
    let available_nodes = reset_allowed_node_counts(ws, collective);

    // Include finite positive colocations only if not every node will get
    // an instance anyway.
    let all_coloc = max_total < available_nodes;
    let optimal_per_node = (max_total / available_nodes.max(1)).max(1);
    let mut assigned: u32 = 0;

    debug!(
        collective = %ws.resource(collective).name,
        max_total,
        available_nodes,
        max_per_node,
        optimal_per_node,
        "assigning collective instances"
    );

    // Assign as many instances as possible to their current location.
    for &instance in instances {
        if assigned >= max_total {
            break;
        }
        let parent = ws.resource(instance).parent.unwrap_or(collective);
        append_parent_colocation(ws, parent, instance, all_coloc);

        if let Some(current) = preferred_node(ws, collective, instance, optimal_per_node) {
            if assign_instance(ws, instance, Some(current), all_coloc, max_per_node) {
                trace!(
                    instance = %ws.resource(instance).name,
                    node = %ws.node_name(current),
                    "assigned instance to current node"
                );
                assigned += 1;
            }
        }
    }
    trace!(assigned, max_total, "assigned instances to current nodes");

    // Place whatever is still provisional.
    for &instance in instances {
        if !ws.resource(instance).is_provisional() {
            continue;
        }
        if let Some(current) = ws.resource(instance).running_on.first().copied() {
            if ws.top_allowed_node(instance, current).is_none() {
                let managed = ws.resource(instance).is_managed();
                info!(
                    instance = %ws.resource(instance).name,
                    node = %ws.node_name(current),
                    unmanaged = !managed,
                    "instance is running on a node which is no longer allowed"
                );
            }
        }
        if assigned >= max_total {
            debug!(
                instance = %ws.resource(instance).name,
                max_total,
                "not assigning instance, maximum instances already assigned"
            );
            ws.resource_location(
                instance,
                None,
                Score::NEG_INFINITY,
                "collective_limit_reached",
            );
        } else if assign_instance(ws, instance, None, all_coloc, max_per_node) {
            assigned += 1;
        }
    }

    debug!(
        collective = %ws.resource(collective).name,
        assigned,
        max_total,
        "assigned collective instances"
    );
}

/// Assign a collective's instances using the limits configured in its meta
/// attributes (`instances-max`, `instances-per-node`).
pub fn assign_collective(ws: &mut WorkingSet, collective: ResourceId) -> ModelResult<()> {
    let config =
        CollectiveConfig::from_meta(&ws.resource(collective).meta, ws.node_count() as u32)?;
    let instances = ws.instance_list(collective);
    assign_instances(
        ws,
        collective,
        &instances,
        config.max_total,
        config.max_per_node,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_model::Variant;

    /// Build a clone with `instances` primitive instances, all allowed on
    /// all `nodes` with score zero (collective included).
    fn make_clone(
        ws: &mut WorkingSet,
        name: &str,
        instances: usize,
        nodes: &[NodeId],
    ) -> (ResourceId, Vec<ResourceId>) {
        let clone = ws.add_resource(name, Variant::Clone);
        let mut children = Vec::new();
        for i in 0..instances {
            let child = ws.add_resource(&format!("{name}:{i}"), Variant::Primitive);
            ws.add_child(clone, child);
            for &node in nodes {
                ws.allow_node(child, node, Score::ZERO);
            }
            children.push(child);
        }
        for &node in nodes {
            ws.allow_node(clone, node, Score::ZERO);
        }
        (clone, children)
    }

    fn three_nodes(ws: &mut WorkingSet) -> Vec<NodeId> {
        vec![
            ws.add_node("node-1"),
            ws.add_node("node-2"),
            ws.add_node("node-3"),
        ]
    }

    #[test]
    fn eligibility_rejects_orphans() {
        let mut ws = WorkingSet::new();
        let nodes = three_nodes(&mut ws);
        let (_, children) = make_clone(&mut ws, "web", 1, &nodes);
        ws.resource_mut(children[0])
            .flags
            .insert(ResourceFlags::ORPHAN);

        assert!(!can_run_instance(&ws, children[0], nodes[0], 1));
    }

    #[test]
    fn eligibility_rejects_unavailable_node() {
        let mut ws = WorkingSet::new();
        let nodes = three_nodes(&mut ws);
        let (_, children) = make_clone(&mut ws, "web", 1, &nodes);
        ws.node_mut(nodes[0]).online = false;

        assert!(!can_run_instance(&ws, children[0], nodes[0], 1));
        assert!(can_run_instance(&ws, children[0], nodes[1], 1));
    }

    #[test]
    fn eligibility_requires_collective_view_of_node() {
        let mut ws = WorkingSet::new();
        let nodes = three_nodes(&mut ws);
        let clone = ws.add_resource("web", Variant::Clone);
        let child = ws.add_resource("web:0", Variant::Primitive);
        ws.add_child(clone, child);
        ws.allow_node(child, nodes[0], Score::ZERO);
        // The collective has no view of node-1 at all.

        assert!(!can_run_instance(&ws, child, nodes[0], 1));
    }

    #[test]
    fn eligibility_rejects_negative_collective_score() {
        let mut ws = WorkingSet::new();
        let nodes = three_nodes(&mut ws);
        let (clone, children) = make_clone(&mut ws, "web", 1, &nodes);
        ws.resource_mut(clone)
            .allowed_nodes
            .get_mut(&nodes[0])
            .unwrap()
            .score = Score::new(-1);

        assert!(!can_run_instance(&ws, children[0], nodes[0], 1));
    }

    #[test]
    fn eligibility_enforces_per_node_cap() {
        let mut ws = WorkingSet::new();
        let nodes = three_nodes(&mut ws);
        let (clone, children) = make_clone(&mut ws, "web", 1, &nodes);
        ws.resource_mut(clone)
            .allowed_nodes
            .get_mut(&nodes[0])
            .unwrap()
            .count = 2;

        assert!(!can_run_instance(&ws, children[0], nodes[0], 2));
        assert!(can_run_instance(&ws, children[0], nodes[0], 3));
    }

    #[test]
    fn reset_counts_reports_available_nodes() {
        let mut ws = WorkingSet::new();
        let nodes = three_nodes(&mut ws);
        let (clone, _) = make_clone(&mut ws, "web", 1, &nodes);
        ws.resource_mut(clone)
            .allowed_nodes
            .get_mut(&nodes[0])
            .unwrap()
            .count = 5;
        ws.node_mut(nodes[2]).standby = true;

        let available = reset_allowed_node_counts(&mut ws, clone);
        assert_eq!(available, 2);
        assert_eq!(ws.resource(clone).allowed_nodes[&nodes[0]].count, 0);
    }

    #[test]
    fn parent_colocations_propagate_selectively() {
        let mut ws = WorkingSet::new();
        let nodes = three_nodes(&mut ws);
        let (clone, children) = make_clone(&mut ws, "web", 1, &nodes);
        let other = ws.add_resource("db", Variant::Primitive);

        let weak = ws.add_colocation("weak", clone, other, Score::new(10), true);
        let negative = ws.add_colocation("neg", clone, other, Score::new(-10), true);
        let mandatory = ws.add_colocation("must", clone, other, Score::INFINITY, true);
        let primary_weak = ws.add_colocation("p-weak", other, clone, Score::new(10), true);
        let primary_neg = ws.add_colocation("p-neg", other, clone, Score::new(-10), true);

        let child = children[0];
        append_parent_colocation(&mut ws, clone, child, false);
        let this_with = &ws.resource(child).this_with;
        assert!(!this_with.contains(&weak));
        assert!(this_with.contains(&negative));
        assert!(this_with.contains(&mandatory));
        let with_this = &ws.resource(child).with_this;
        assert!(!with_this.contains(&primary_weak));
        assert!(with_this.contains(&primary_neg));

        append_parent_colocation(&mut ws, clone, child, true);
        assert!(ws.resource(child).this_with.contains(&weak));
        assert!(ws.resource(child).with_this.contains(&primary_weak));
    }

    #[test]
    fn assign_instance_detects_allocation_loop() {
        let mut ws = WorkingSet::new();
        let nodes = three_nodes(&mut ws);
        let (_, children) = make_clone(&mut ws, "web", 1, &nodes);
        ws.resource_mut(children[0])
            .flags
            .insert(ResourceFlags::ALLOCATING);

        assert!(!assign_instance(&mut ws, children[0], None, false, 1));
        assert!(ws.resource(children[0]).is_provisional());
    }

    #[test]
    fn assign_instance_rejects_unusable_preferred_node() {
        let mut ws = WorkingSet::new();
        let nodes = three_nodes(&mut ws);
        let (_, children) = make_clone(&mut ws, "web", 1, &nodes);
        let stranger = ws.add_node("node-4");

        // Not in the instance's allowed table at all.
        assert!(!assign_instance(&mut ws, children[0], Some(stranger), false, 1));

        // Present, but banned.
        ws.resource_mut(children[0])
            .allowed_nodes
            .get_mut(&nodes[1])
            .unwrap()
            .score = Score::NEG_INFINITY;
        assert!(!assign_instance(&mut ws, children[0], Some(nodes[1]), false, 1));
        assert!(ws.resource(children[0]).is_provisional());
    }

    #[test]
    fn assign_instance_rolls_back_when_preference_loses() {
        let mut ws = WorkingSet::new();
        let nodes = three_nodes(&mut ws);
        let (_, children) = make_clone(&mut ws, "web", 1, &nodes);
        // node-3 scores higher than the preferred node-1.
        ws.resource_mut(children[0])
            .allowed_nodes
            .get_mut(&nodes[2])
            .unwrap()
            .score = Score::new(100);

        assert!(!assign_instance(&mut ws, children[0], Some(nodes[0]), false, 1));
        assert!(ws.resource(children[0]).is_provisional());
        assert_eq!(ws.resource(children[0]).assigned_node, None);
    }

    #[test]
    fn assign_instance_counts_on_the_collective() {
        let mut ws = WorkingSet::new();
        let nodes = three_nodes(&mut ws);
        let (clone, children) = make_clone(&mut ws, "web", 2, &nodes);

        assert!(assign_instance(&mut ws, children[0], Some(nodes[0]), false, 1));
        assert_eq!(ws.resource(clone).allowed_nodes[&nodes[0]].count, 1);
    }

    #[test]
    fn unmanaged_instance_outside_collective_nodes_is_tolerated() {
        let mut ws = WorkingSet::new();
        let node = ws.add_node("node-1");
        let clone = ws.add_resource("web", Variant::Clone);
        let child = ws.add_resource("web:0", Variant::Primitive);
        ws.add_child(clone, child);
        ws.allow_node(child, node, Score::ZERO);
        ws.resource_mut(child).flags.remove(ResourceFlags::MANAGED);

        // The collective has no entry for the node; an unmanaged instance
        // may still land there without tripping the invariant.
        assert!(!assign_instance(&mut ws, child, None, false, 1));
    }

    #[test]
    fn stickiness_keeps_instances_on_current_nodes() {
        // Three instances running on three nodes stay exactly where they
        // are, one per node.
        let mut ws = WorkingSet::new();
        let nodes = three_nodes(&mut ws);
        let (clone, children) = make_clone(&mut ws, "web", 3, &nodes);
        for (child, node) in children.iter().zip(&nodes) {
            ws.set_running_on(*child, *node);
        }

        assign_instances(&mut ws, clone, &children, 3, 1);

        for (child, node) in children.iter().zip(&nodes) {
            assert_eq!(ws.resource(*child).assigned_node, Some(*node));
            assert!(!ws.resource(*child).is_provisional());
        }
        for node in &nodes {
            assert_eq!(ws.resource(clone).allowed_nodes[node].count, 1);
        }
    }

    #[test]
    fn cap_spills_remaining_instances_over() {
        // Four instances, two nodes, two per node: the two running
        // instances stay put, the rest fill up the remaining capacity.
        let mut ws = WorkingSet::new();
        let n1 = ws.add_node("node-1");
        let n2 = ws.add_node("node-2");
        let (clone, children) = make_clone(&mut ws, "web", 4, &[n1, n2]);
        ws.set_running_on(children[0], n1);
        ws.set_running_on(children[1], n2);

        assign_instances(&mut ws, clone, &children, 4, 2);

        assert_eq!(ws.resource(children[0]).assigned_node, Some(n1));
        assert_eq!(ws.resource(children[1]).assigned_node, Some(n2));
        assert_eq!(ws.resource(clone).allowed_nodes[&n1].count, 2);
        assert_eq!(ws.resource(clone).allowed_nodes[&n2].count, 2);
        for child in &children {
            assert!(ws.resource(*child).assigned_node.is_some());
        }
    }

    #[test]
    fn overflow_instances_are_banned() {
        // Three instances but a total limit of two: the third is banned
        // from every node and stays unassigned.
        let mut ws = WorkingSet::new();
        let nodes = three_nodes(&mut ws);
        let (clone, children) = make_clone(&mut ws, "web", 3, &nodes);
        for (child, node) in children.iter().zip(&nodes) {
            ws.set_running_on(*child, *node);
        }

        assign_instances(&mut ws, clone, &children, 2, 1);

        let assigned: Vec<_> = children
            .iter()
            .filter(|c| ws.resource(**c).assigned_node.is_some())
            .collect();
        assert_eq!(assigned.len(), 2);

        let last = children[2];
        assert_eq!(ws.resource(last).assigned_node, None);
        for entry in ws.resource(last).allowed_nodes.values() {
            assert!(entry.score.is_neg_infinite());
        }
    }

    #[test]
    fn assignment_is_idempotent() {
        let mut ws = WorkingSet::new();
        let nodes = three_nodes(&mut ws);
        let (clone, children) = make_clone(&mut ws, "web", 3, &nodes);
        for (child, node) in children.iter().zip(&nodes) {
            ws.set_running_on(*child, *node);
        }

        assign_instances(&mut ws, clone, &children, 3, 1);
        let first: Vec<_> = children
            .iter()
            .map(|c| ws.resource(*c).assigned_node)
            .collect();

        assign_instances(&mut ws, clone, &children, 3, 1);
        let second: Vec<_> = children
            .iter()
            .map(|c| ws.resource(*c).assigned_node)
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn orphans_are_never_assigned() {
        let mut ws = WorkingSet::new();
        let nodes = three_nodes(&mut ws);
        let (clone, children) = make_clone(&mut ws, "web", 2, &nodes);
        ws.resource_mut(children[1])
            .flags
            .insert(ResourceFlags::ORPHAN);

        assign_instances(&mut ws, clone, &children, 2, 1);

        assert!(ws.resource(children[0]).assigned_node.is_some());
        assert_eq!(ws.resource(children[1]).assigned_node, None);
    }

    #[test]
    fn per_node_cap_holds_under_pressure() {
        // Five instances squeezed onto two nodes with a cap of two: only
        // four can be assigned and no node exceeds the cap.
        let mut ws = WorkingSet::new();
        let n1 = ws.add_node("node-1");
        let n2 = ws.add_node("node-2");
        let (clone, children) = make_clone(&mut ws, "web", 5, &[n1, n2]);

        assign_instances(&mut ws, clone, &children, 5, 2);

        let assigned = children
            .iter()
            .filter(|c| ws.resource(**c).assigned_node.is_some())
            .count();
        assert_eq!(assigned, 4);
        assert!(ws.resource(clone).allowed_nodes[&n1].count <= 2);
        assert!(ws.resource(clone).allowed_nodes[&n2].count <= 2);
    }

    #[test]
    fn assign_collective_reads_limits_from_meta() {
        let mut ws = WorkingSet::new();
        let nodes = three_nodes(&mut ws);
        let (clone, children) = make_clone(&mut ws, "web", 3, &nodes);
        ws.resource_mut(clone)
            .meta
            .insert("instances-max".to_string(), "2".to_string());

        assign_collective(&mut ws, clone).unwrap();

        let assigned = children
            .iter()
            .filter(|c| ws.resource(**c).assigned_node.is_some())
            .count();
        assert_eq!(assigned, 2);
    }

    #[test]
    fn assign_collective_rejects_bad_meta() {
        let mut ws = WorkingSet::new();
        let nodes = three_nodes(&mut ws);
        let (clone, _) = make_clone(&mut ws, "web", 1, &nodes);
        ws.resource_mut(clone)
            .meta
            .insert("instances-per-node".to_string(), "several".to_string());

        assert!(assign_collective(&mut ws, clone).is_err());
    }

    #[test]
    fn running_on_disallowed_node_is_reassigned() {
        let mut ws = WorkingSet::new();
        let n1 = ws.add_node("node-1");
        let n2 = ws.add_node("node-2");
        let clone = ws.add_resource("web", Variant::Clone);
        let child = ws.add_resource("web:0", Variant::Primitive);
        ws.add_child(clone, child);
        // The collective only allows node-2 but the instance still runs on
        // node-1.
        ws.allow_node(clone, n2, Score::ZERO);
        ws.allow_node(child, n1, Score::ZERO);
        ws.allow_node(child, n2, Score::ZERO);
        ws.set_running_on(child, n1);

        assign_instances(&mut ws, clone, &[child], 1, 1);

        assert_eq!(ws.resource(child).assigned_node, Some(n2));
    }
}
