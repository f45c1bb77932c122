//! Action creation, lookup, ordering edges, and ordered-pair updates.

use std::collections::HashSet;

use tracing::trace;

use crate::action::{Action, ActionFlags, ActionId, OrderingEdge, OrderingKind, Task, Updated};
use crate::node::NodeId;
use crate::resource::{ResourceId, Variant};
use crate::score::Score;
use crate::working_set::WorkingSet;

/// The pseudo-action set for one phase of collective notifications:
/// pre-notify, its confirmation, post-notify, and its confirmation.
#[derive(Debug, Clone, Copy)]
pub struct NotifyOps {
    pub pre: ActionId,
    pub pre_done: ActionId,
    pub post: ActionId,
    pub post_done: ActionId,
}

impl WorkingSet {
    /// Add a concrete action for `rsc`. New actions start runnable and
    /// mandatory.
    pub fn add_action(&mut self, rsc: ResourceId, task: Task, node: Option<NodeId>) -> ActionId {
        let uuid = format!("{}_{}_0", self.resources[rsc.0].name, task.text());
        self.add_action_with_uuid(rsc, uuid, task, node, ActionFlags::RUNNABLE)
    }

    pub(crate) fn add_action_with_uuid(
        &mut self,
        rsc: ResourceId,
        uuid: String,
        task: Task,
        node: Option<NodeId>,
        flags: ActionFlags,
    ) -> ActionId {
        let id = ActionId(self.actions.len());
        self.actions.push(Action {
            id,
            uuid,
            task,
            rsc: Some(rsc),
            node,
            flags,
            priority: Score::ZERO,
            actions_after: Vec::new(),
            actions_before: Vec::new(),
        });
        self.resources[rsc.0].actions.push(id);
        id
    }

    /// Set flags on an action, tracing the change.
    pub fn set_action_flags(&mut self, action: ActionId, flags: ActionFlags) {
        let a = &mut self.actions[action.0];
        if !a.flags.contains(flags) {
            a.flags.insert(flags);
            trace!(action = %a.uuid, flags = ?flags, "set action flags");
        }
    }

    /// Clear flags on an action, tracing the change.
    pub fn clear_action_flags(&mut self, action: ActionId, flags: ActionFlags) {
        let a = &mut self.actions[action.0];
        if a.flags.intersects(flags) {
            a.flags.remove(flags);
            trace!(action = %a.uuid, flags = ?flags, "cleared action flags");
        }
    }

    /// First action of `rsc` matching `task`, and `node` when given.
    pub fn find_first_action(
        &self,
        rsc: ResourceId,
        task: Task,
        node: Option<NodeId>,
    ) -> Option<ActionId> {
        for &aid in &self.resources[rsc.0].actions {
            let action = &self.actions[aid.0];
            if action.task != task {
                continue;
            }
            match node {
                None => return Some(aid),
                Some(n) if action.node == Some(n) => return Some(aid),
                Some(_) => {}
            }
        }
        None
    }

    /// Install an ordering edge `first -> then`. Returns false when an
    /// equivalent edge already exists (its kinds are still merged).
    pub fn order_actions(&mut self, first: ActionId, then: ActionId, kinds: OrderingKind) -> bool {
        if first == then {
            return false;
        }
        let exists = self.actions[first.0]
            .actions_after
            .iter()
            .any(|e| e.action == then);
        if exists {
            if let Some(edge) = self.actions[first.0]
                .actions_after
                .iter_mut()
                .find(|e| e.action == then)
            {
                edge.kinds |= kinds;
            }
            if let Some(edge) = self.actions[then.0]
                .actions_before
                .iter_mut()
                .find(|e| e.action == first)
            {
                edge.kinds |= kinds;
            }
            return false;
        }
        self.actions[first.0]
            .actions_after
            .push(OrderingEdge { action: then, kinds });
        self.actions[then.0]
            .actions_before
            .push(OrderingEdge { action: first, kinds });
        trace!(
            first = %self.actions[first.0].uuid,
            then = %self.actions[then.0].uuid,
            kinds = ?kinds,
            "ordered actions"
        );
        true
    }

    /// Flags of an action as seen through its owning resource.
    ///
    /// Primitive actions report their own flags. For a non-primitive the
    /// view folds the matching actions of its children: optional as AND,
    /// runnable as OR. `node` scopes the fold for primitive children.
    pub fn action_flags(&self, action: ActionId, node: Option<NodeId>) -> ActionFlags {
        let a = &self.actions[action.0];
        let Some(rid) = a.rsc else {
            return a.flags;
        };
        if self.resources[rid.0].variant == Variant::Primitive {
            return a.flags;
        }
        let mut flags = ActionFlags::OPTIONAL | ActionFlags::RUNNABLE | ActionFlags::PSEUDO;
        let mut any_runnable = false;
        for &child in &self.resources[rid.0].children {
            let child_node = if self.resources[child.0].variant == Variant::Primitive {
                node
            } else {
                None
            };
            let task = self.simplified_task(child, a.task);
            let Some(child_action) = self.find_first_action(child, task, child_node) else {
                continue;
            };
            let child_flags = self.action_flags(child_action, node);
            if !child_flags.contains(ActionFlags::OPTIONAL) {
                flags.remove(ActionFlags::OPTIONAL);
            }
            if child_flags.contains(ActionFlags::RUNNABLE) {
                any_runnable = true;
            }
        }
        if !any_runnable {
            flags.remove(ActionFlags::RUNNABLE);
        }
        flags
    }

    /// Apply one ordering between two actions, given `first`'s flags for
    /// ordering purposes and a `filter` limiting which updates may fire.
    ///
    /// RUNNABLE_LEFT stops `then` from running when `first` cannot run;
    /// IMPLIES_THEN makes `then` mandatory when `first` is; IMPLIES_FIRST
    /// makes `first` mandatory when `then` is.
    pub fn update_action_pair(
        &mut self,
        first: ActionId,
        then: ActionId,
        _node: Option<NodeId>,
        first_flags: ActionFlags,
        filter: ActionFlags,
        kinds: OrderingKind,
    ) -> Updated {
        let mut changed = Updated::empty();
        let then_flags = self.actions[then.0].flags;

        if kinds.contains(OrderingKind::RUNNABLE_LEFT)
            && filter.contains(ActionFlags::RUNNABLE)
            && then_flags.contains(ActionFlags::RUNNABLE)
            && !first_flags.contains(ActionFlags::RUNNABLE)
        {
            self.clear_action_flags(then, ActionFlags::RUNNABLE);
            changed |= Updated::THEN;
        }

        if kinds.contains(OrderingKind::IMPLIES_THEN)
            && filter.contains(ActionFlags::OPTIONAL)
            && self.actions[then.0].flags.contains(ActionFlags::OPTIONAL)
            && !first_flags.contains(ActionFlags::OPTIONAL)
        {
            self.clear_action_flags(then, ActionFlags::OPTIONAL);
            changed |= Updated::THEN;
        }

        if kinds.contains(OrderingKind::IMPLIES_FIRST)
            && filter.contains(ActionFlags::OPTIONAL)
            && self.actions[first.0].flags.contains(ActionFlags::OPTIONAL)
            && !self.actions[then.0].flags.contains(ActionFlags::OPTIONAL)
        {
            self.clear_action_flags(first, ActionFlags::OPTIONAL);
            changed |= Updated::FIRST;
        }

        if !changed.is_empty() {
            trace!(
                first = %self.actions[first.0].uuid,
                then = %self.actions[then.0].uuid,
                changed = ?changed,
                "updated ordered action pair"
            );
        }
        changed
    }

    /// Re-apply orderings downstream of an action whose flags changed.
    /// Each action is visited at most once, so cascades terminate.
    pub fn update_action_for_orderings(&mut self, action: ActionId) {
        let mut visited: HashSet<ActionId> = HashSet::new();
        visited.insert(action);
        let mut queue = vec![action];
        while let Some(current) = queue.pop() {
            let edges = self.actions[current.0].actions_after.clone();
            let current_flags = self.actions[current.0].flags;
            for edge in edges {
                let changed = self.update_action_pair(
                    current,
                    edge.action,
                    None,
                    current_flags,
                    ActionFlags::OPTIONAL | ActionFlags::RUNNABLE,
                    edge.kinds,
                );
                if changed.contains(Updated::THEN) && visited.insert(edge.action) {
                    queue.push(edge.action);
                }
            }
        }
    }

    /// Create a collective-level pseudo action (an ordering anchor that is
    /// never executed).
    pub fn new_pseudo_action(
        &mut self,
        rsc: ResourceId,
        task: Task,
        optional: bool,
        runnable: bool,
    ) -> ActionId {
        let mut flags = ActionFlags::PSEUDO;
        if optional {
            flags |= ActionFlags::OPTIONAL;
        }
        if runnable {
            flags |= ActionFlags::RUNNABLE;
        }
        let uuid = format!("{}_{}_0", self.resources[rsc.0].name, task.text());
        let id = self.add_action_with_uuid(rsc, uuid, task, None, flags);
        trace!(
            action = %self.actions[id.0].uuid,
            optional,
            runnable,
            "created pseudo action"
        );
        id
    }

    /// Build the notification pseudo-op set around an action and its
    /// completion, ordered pre -> confirmed-pre -> action and
    /// completion -> post -> confirmed-post.
    pub fn clone_notif_pseudo_ops(
        &mut self,
        rsc: ResourceId,
        task: Task,
        action: ActionId,
        complete: ActionId,
    ) -> NotifyOps {
        let optional = self.actions[action.0].flags.contains(ActionFlags::OPTIONAL);
        let name = self.resources[rsc.0].name.clone();
        let mut flags = ActionFlags::PSEUDO | ActionFlags::RUNNABLE;
        if optional {
            flags |= ActionFlags::OPTIONAL;
        }
        let pre = self.add_action_with_uuid(
            rsc,
            format!("{name}_pre_notify_{task}_0"),
            Task::Notify,
            None,
            flags,
        );
        let pre_done = self.add_action_with_uuid(
            rsc,
            format!("{name}_confirmed-pre_notify_{task}_0"),
            Task::Notified,
            None,
            flags,
        );
        let post = self.add_action_with_uuid(
            rsc,
            format!("{name}_post_notify_{task}_0"),
            Task::Notify,
            None,
            flags,
        );
        let post_done = self.add_action_with_uuid(
            rsc,
            format!("{name}_confirmed-post_notify_{task}_0"),
            Task::Notified,
            None,
            flags,
        );
        self.order_actions(pre, pre_done, OrderingKind::OPTIONAL);
        self.order_actions(pre_done, action, OrderingKind::OPTIONAL);
        self.order_actions(complete, post, OrderingKind::OPTIONAL);
        self.order_actions(post, post_done, OrderingKind::OPTIONAL);
        NotifyOps {
            pre,
            pre_done,
            post,
            post_done,
        }
    }

    /// Create the actions implied by the difference between where `rsc`
    /// runs and where it has been assigned, recursively for non-primitives.
    pub fn create_actions(&mut self, rsc: ResourceId) {
        if self.resources[rsc.0].variant == Variant::Primitive {
            self.create_primitive_actions(rsc);
        } else {
            let children = self.resources[rsc.0].children.clone();
            for child in children {
                self.create_actions(child);
            }
        }
        if let Some(inner) = self.resources[rsc.0].inner {
            self.create_actions(inner);
        }
    }

    fn create_primitive_actions(&mut self, rsc: ResourceId) {
        let current = self.resources[rsc.0].running_on.first().copied();
        let next = self.resources[rsc.0].assigned_node;
        match (current, next) {
            (None, Some(node)) => {
                if self.find_first_action(rsc, Task::Start, Some(node)).is_none() {
                    self.add_action(rsc, Task::Start, Some(node));
                }
            }
            (Some(current), Some(next)) if current == next => {
                // Already where it should be; record the start as optional.
                if self.find_first_action(rsc, Task::Start, Some(next)).is_none() {
                    let id = self.add_action(rsc, Task::Start, Some(next));
                    self.set_action_flags(id, ActionFlags::OPTIONAL);
                }
            }
            (Some(current), Some(next)) => {
                // Relocation: stop on the old node, start on the new one.
                if self.find_first_action(rsc, Task::Stop, Some(current)).is_none() {
                    self.add_action(rsc, Task::Stop, Some(current));
                }
                if self.find_first_action(rsc, Task::Start, Some(next)).is_none() {
                    self.add_action(rsc, Task::Start, Some(next));
                }
            }
            (Some(current), None) => {
                if self.find_first_action(rsc, Task::Stop, Some(current)).is_none() {
                    self.add_action(rsc, Task::Stop, Some(current));
                }
            }
            (None, None) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (WorkingSet, ResourceId, NodeId) {
        let mut ws = WorkingSet::new();
        let node = ws.add_node("node-1");
        let rsc = ws.add_resource("db", Variant::Primitive);
        ws.allow_node(rsc, node, Score::new(1));
        (ws, rsc, node)
    }

    #[test]
    fn find_first_action_scopes_by_node() {
        let (mut ws, rsc, node) = fixture();
        let other = ws.add_node("node-2");
        let on_other = ws.add_action(rsc, Task::Start, Some(other));
        let on_node = ws.add_action(rsc, Task::Start, Some(node));

        assert_eq!(ws.find_first_action(rsc, Task::Start, Some(node)), Some(on_node));
        assert_eq!(ws.find_first_action(rsc, Task::Start, None), Some(on_other));
        assert_eq!(ws.find_first_action(rsc, Task::Stop, None), None);
    }

    #[test]
    fn order_actions_rejects_duplicates_and_merges_kinds() {
        let (mut ws, rsc, node) = fixture();
        let start = ws.add_action(rsc, Task::Start, Some(node));
        let stop = ws.add_action(rsc, Task::Stop, Some(node));

        assert!(ws.order_actions(stop, start, OrderingKind::OPTIONAL));
        assert!(!ws.order_actions(stop, start, OrderingKind::RUNNABLE_LEFT));

        let edge = ws.action(stop).actions_after[0];
        assert_eq!(edge.action, start);
        assert!(edge.kinds.contains(OrderingKind::OPTIONAL | OrderingKind::RUNNABLE_LEFT));
        assert_eq!(ws.action(start).actions_before.len(), 1);
    }

    #[test]
    fn runnable_left_propagates_unrunnable_first() {
        let (mut ws, rsc, node) = fixture();
        let first = ws.add_action(rsc, Task::Stop, Some(node));
        let then = ws.add_action(rsc, Task::Start, Some(node));
        ws.clear_action_flags(first, ActionFlags::RUNNABLE);

        let changed = ws.update_action_pair(
            first,
            then,
            None,
            ws.action(first).flags,
            ActionFlags::RUNNABLE,
            OrderingKind::RUNNABLE_LEFT,
        );
        assert_eq!(changed, Updated::THEN);
        assert!(!ws.action(then).flags.contains(ActionFlags::RUNNABLE));
    }

    #[test]
    fn implies_then_makes_then_mandatory() {
        let (mut ws, rsc, node) = fixture();
        let first = ws.add_action(rsc, Task::Stop, Some(node));
        let then = ws.add_action(rsc, Task::Start, Some(node));
        ws.set_action_flags(then, ActionFlags::OPTIONAL);

        let changed = ws.update_action_pair(
            first,
            then,
            None,
            ws.action(first).flags,
            ActionFlags::OPTIONAL,
            OrderingKind::IMPLIES_THEN,
        );
        assert_eq!(changed, Updated::THEN);
        assert!(!ws.action(then).flags.contains(ActionFlags::OPTIONAL));
    }

    #[test]
    fn filter_gates_updates() {
        let (mut ws, rsc, node) = fixture();
        let first = ws.add_action(rsc, Task::Stop, Some(node));
        let then = ws.add_action(rsc, Task::Start, Some(node));
        ws.set_action_flags(then, ActionFlags::OPTIONAL);

        // Same ordering kind, but the filter only allows runnable updates.
        let changed = ws.update_action_pair(
            first,
            then,
            None,
            ws.action(first).flags,
            ActionFlags::RUNNABLE,
            OrderingKind::IMPLIES_THEN,
        );
        assert!(changed.is_empty());
        assert!(ws.action(then).flags.contains(ActionFlags::OPTIONAL));
    }

    #[test]
    fn implies_first_makes_first_mandatory() {
        let (mut ws, rsc, node) = fixture();
        let first = ws.add_action(rsc, Task::Stop, Some(node));
        let then = ws.add_action(rsc, Task::Start, Some(node));
        ws.set_action_flags(first, ActionFlags::OPTIONAL);

        let changed = ws.update_action_pair(
            first,
            then,
            None,
            ws.action(first).flags,
            ActionFlags::OPTIONAL,
            OrderingKind::IMPLIES_FIRST,
        );
        assert_eq!(changed, Updated::FIRST);
        assert!(!ws.action(first).flags.contains(ActionFlags::OPTIONAL));
    }

    #[test]
    fn cascade_reaches_transitive_orderings() {
        let (mut ws, rsc, node) = fixture();
        let a = ws.add_action(rsc, Task::Stop, Some(node));
        let b = ws.add_action(rsc, Task::Start, Some(node));
        let c = ws.add_action(rsc, Task::Promote, Some(node));
        ws.order_actions(a, b, OrderingKind::RUNNABLE_LEFT);
        ws.order_actions(b, c, OrderingKind::RUNNABLE_LEFT);

        ws.clear_action_flags(a, ActionFlags::RUNNABLE);
        ws.update_action_for_orderings(a);

        assert!(!ws.action(b).flags.contains(ActionFlags::RUNNABLE));
        assert!(!ws.action(c).flags.contains(ActionFlags::RUNNABLE));
    }

    #[test]
    fn pseudo_action_uuid_and_flags() {
        let mut ws = WorkingSet::new();
        let clone = ws.add_resource("web-clone", Variant::Clone);
        let id = ws.new_pseudo_action(clone, Task::Started, true, false);

        let action = ws.action(id);
        assert_eq!(action.uuid, "web-clone_started_0");
        assert!(action.flags.contains(ActionFlags::PSEUDO | ActionFlags::OPTIONAL));
        assert!(!action.flags.contains(ActionFlags::RUNNABLE));
        assert_eq!(action.node, None);
    }

    #[test]
    fn notify_ops_wrap_action_and_completion() {
        let mut ws = WorkingSet::new();
        let clone = ws.add_resource("web-clone", Variant::Clone);
        let start = ws.new_pseudo_action(clone, Task::Start, false, true);
        let started = ws.new_pseudo_action(clone, Task::Started, false, true);

        let ops = ws.clone_notif_pseudo_ops(clone, Task::Start, start, started);

        assert_eq!(ws.action(ops.pre).uuid, "web-clone_pre_notify_start_0");
        assert_eq!(
            ws.action(ops.post_done).uuid,
            "web-clone_confirmed-post_notify_start_0"
        );
        // Mandatory action means mandatory notifications.
        assert!(!ws.action(ops.pre).flags.contains(ActionFlags::OPTIONAL));
        // pre -> pre_done -> start, started -> post -> post_done.
        assert!(ws.action(ops.pre).actions_after.iter().any(|e| e.action == ops.pre_done));
        assert!(ws.action(ops.pre_done).actions_after.iter().any(|e| e.action == start));
        assert!(ws.action(started).actions_after.iter().any(|e| e.action == ops.post));
        assert!(ws.action(ops.post).actions_after.iter().any(|e| e.action == ops.post_done));
    }

    #[test]
    fn create_actions_for_inactive_assigned_resource() {
        let (mut ws, rsc, node) = fixture();
        ws.resource_mut(rsc).assigned_node = Some(node);
        ws.create_actions(rsc);

        let start = ws.find_first_action(rsc, Task::Start, Some(node)).unwrap();
        let flags = ws.action(start).flags;
        assert!(flags.contains(ActionFlags::RUNNABLE));
        assert!(!flags.contains(ActionFlags::OPTIONAL));
    }

    #[test]
    fn create_actions_for_resource_staying_put() {
        let (mut ws, rsc, node) = fixture();
        ws.set_running_on(rsc, node);
        ws.resource_mut(rsc).assigned_node = Some(node);
        ws.create_actions(rsc);

        let start = ws.find_first_action(rsc, Task::Start, Some(node)).unwrap();
        assert!(ws.action(start).flags.contains(ActionFlags::OPTIONAL));
        assert_eq!(ws.find_first_action(rsc, Task::Stop, None), None);
    }

    #[test]
    fn create_actions_for_relocation() {
        let (mut ws, rsc, node) = fixture();
        let other = ws.add_node("node-2");
        ws.set_running_on(rsc, node);
        ws.resource_mut(rsc).assigned_node = Some(other);
        ws.create_actions(rsc);

        assert!(ws.find_first_action(rsc, Task::Stop, Some(node)).is_some());
        assert!(ws.find_first_action(rsc, Task::Start, Some(other)).is_some());
    }

    #[test]
    fn group_action_flags_fold_over_members() {
        let mut ws = WorkingSet::new();
        let node = ws.add_node("node-1");
        let group = ws.add_resource("grp", Variant::Group);
        let a = ws.add_resource("grp:a", Variant::Primitive);
        let b = ws.add_resource("grp:b", Variant::Primitive);
        ws.add_child(group, a);
        ws.add_child(group, b);

        let start_a = ws.add_action(a, Task::Start, Some(node));
        ws.set_action_flags(start_a, ActionFlags::OPTIONAL);
        ws.add_action(b, Task::Start, Some(node));
        let group_start = ws.add_action(group, Task::Start, None);

        let flags = ws.action_flags(group_start, Some(node));
        // One member start is mandatory, so the group start is mandatory;
        // both are runnable, so the group start is runnable.
        assert!(!flags.contains(ActionFlags::OPTIONAL));
        assert!(flags.contains(ActionFlags::RUNNABLE));
    }
}
