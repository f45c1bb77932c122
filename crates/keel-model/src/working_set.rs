//! The cluster working set: one arena holding nodes, resources, actions,
//! and colocation constraints for a single scheduling pass.
//!
//! The working set is threaded explicitly through every operation; there is
//! no process-wide state. Objects are addressed by index ids (`NodeId`,
//! `ResourceId`, `ActionId`, `ColocationId`) so that parent/child and
//! constraint links never form ownership cycles.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::action::{Action, ActionFlags, ActionId, Task};
use crate::constraint::{Colocation, ColocationId};
use crate::node::{Node, NodeEntry, NodeId};
use crate::resource::{Resource, ResourceFlags, ResourceId, Role, Variant};
use crate::score::Score;

/// The in-memory cluster model for one scheduling pass.
#[derive(Debug, Default)]
pub struct WorkingSet {
    pub(crate) nodes: Vec<Node>,
    pub(crate) resources: Vec<Resource>,
    pub(crate) actions: Vec<Action>,
    pub(crate) colocations: Vec<Colocation>,
}

impl WorkingSet {
    pub fn new() -> WorkingSet {
        WorkingSet::default()
    }

    // ── Builders ───────────────────────────────────────────────────

    /// Add an online cluster node.
    pub fn add_node(&mut self, name: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            id,
            name: name.to_string(),
            online: true,
            standby: false,
            unclean: false,
            shutting_down: false,
        });
        id
    }

    /// Add a resource. New resources start provisional and managed.
    pub fn add_resource(&mut self, name: &str, variant: Variant) -> ResourceId {
        let id = ResourceId(self.resources.len());
        self.resources.push(Resource {
            id,
            name: name.to_string(),
            variant,
            parent: None,
            children: Vec::new(),
            allowed_nodes: HashMap::new(),
            this_with: Vec::new(),
            with_this: Vec::new(),
            actions: Vec::new(),
            flags: ResourceFlags::PROVISIONAL | ResourceFlags::MANAGED,
            meta: HashMap::new(),
            running_on: Vec::new(),
            assigned_node: None,
            role: Role::Stopped,
            next_role: Role::Unknown,
            inner: None,
        });
        id
    }

    /// Link `child` under `parent`. The parent owns the child list; the
    /// child keeps only a back-reference.
    pub fn add_child(&mut self, parent: ResourceId, child: ResourceId) {
        self.resources[child.0].parent = Some(parent);
        self.resources[parent.0].children.push(child);
    }

    /// Wire a containerized resource into a bundle replica container.
    pub fn set_inner(&mut self, container: ResourceId, inner: ResourceId) {
        self.resources[inner.0].parent = Some(container);
        self.resources[container.0].inner = Some(inner);
    }

    /// Allow `rsc` on `node` with the given score.
    pub fn allow_node(&mut self, rsc: ResourceId, node: NodeId, score: Score) {
        self.resources[rsc.0]
            .allowed_nodes
            .insert(node, NodeEntry::new(score));
    }

    /// Record `rsc` as currently active on `node` (live state).
    pub fn set_running_on(&mut self, rsc: ResourceId, node: NodeId) {
        self.resources[rsc.0].running_on = vec![node];
        self.resources[rsc.0].role = Role::Started;
    }

    /// Register a colocation and index it on both endpoints.
    pub fn add_colocation(
        &mut self,
        label: &str,
        dependent: ResourceId,
        primary: ResourceId,
        score: Score,
        influence: bool,
    ) -> ColocationId {
        let id = ColocationId(self.colocations.len());
        self.colocations.push(Colocation {
            id,
            label: label.to_string(),
            dependent,
            primary,
            score,
            influence,
        });
        self.resources[dependent.0].this_with.push(id);
        self.resources[primary.0].with_this.push(id);
        id
    }

    // ── Accessors ──────────────────────────────────────────────────

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn node_name(&self, id: NodeId) -> &str {
        &self.nodes[id.0].name
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn resource(&self, id: ResourceId) -> &Resource {
        &self.resources[id.0]
    }

    pub fn resource_mut(&mut self, id: ResourceId) -> &mut Resource {
        &mut self.resources[id.0]
    }

    pub fn action(&self, id: ActionId) -> &Action {
        &self.actions[id.0]
    }

    pub fn action_mut(&mut self, id: ActionId) -> &mut Action {
        &mut self.actions[id.0]
    }

    pub fn colocation(&self, id: ColocationId) -> &Colocation {
        &self.colocations[id.0]
    }

    /// Whether `node` may run resources.
    pub fn available(&self, node: NodeId, include_standby: bool, include_unclean: bool) -> bool {
        self.nodes[node.0].available(include_standby, include_unclean)
    }

    // ── Node tables ────────────────────────────────────────────────

    fn top_parent(&self, mut rsc: ResourceId) -> ResourceId {
        while let Some(parent) = self.resources[rsc.0].parent {
            rsc = parent;
        }
        rsc
    }

    /// The topmost ancestor's view of `node`. For an instance of a
    /// collective this is the collective's allowed-node entry, which
    /// carries the per-node assignment count.
    pub fn top_allowed_node(&self, instance: ResourceId, node: NodeId) -> Option<&NodeEntry> {
        let top = self.top_parent(instance);
        self.resources[top.0].allowed_nodes.get(&node)
    }

    pub fn top_allowed_node_mut(
        &mut self,
        instance: ResourceId,
        node: NodeId,
    ) -> Option<&mut NodeEntry> {
        let top = self.top_parent(instance);
        self.resources[top.0].allowed_nodes.get_mut(&node)
    }

    /// Overwrite `rsc`'s score on `node`, and its descendants' scores too.
    /// Entries that do not exist are not created.
    pub fn set_allowed_score_recursive(&mut self, rsc: ResourceId, node: NodeId, score: Score) {
        if let Some(entry) = self.resources[rsc.0].allowed_nodes.get_mut(&node) {
            entry.score = score;
        }
        let children = self.resources[rsc.0].children.clone();
        for child in children {
            self.set_allowed_score_recursive(child, node, score);
        }
        if let Some(inner) = self.resources[rsc.0].inner {
            self.set_allowed_score_recursive(inner, node, score);
        }
    }

    /// Merge a location score into `rsc` (and its descendants): one node
    /// when given, every allowed node otherwise. `tag` names the reason in
    /// the trace output.
    pub fn resource_location(
        &mut self,
        rsc: ResourceId,
        node: Option<NodeId>,
        score: Score,
        tag: &str,
    ) {
        match node {
            Some(n) => {
                let entry = self.resources[rsc.0]
                    .allowed_nodes
                    .entry(n)
                    .or_insert_with(|| NodeEntry::new(Score::ZERO));
                entry.score = entry.score + score;
            }
            None => {
                for entry in self.resources[rsc.0].allowed_nodes.values_mut() {
                    entry.score = entry.score + score;
                }
            }
        }
        trace!(
            resource = %self.resources[rsc.0].name,
            score = %score,
            tag,
            "applied location score"
        );
        let children = self.resources[rsc.0].children.clone();
        for child in children {
            self.resource_location(child, node, score, tag);
        }
    }

    /// Snapshot `rsc`'s allowed-node table.
    pub fn copy_node_table(&self, rsc: ResourceId) -> HashMap<NodeId, NodeEntry> {
        self.resources[rsc.0].allowed_nodes.clone()
    }

    /// Restore a snapshot taken with [`WorkingSet::copy_node_table`].
    pub fn restore_node_table(&mut self, rsc: ResourceId, table: HashMap<NodeId, NodeEntry>) {
        self.resources[rsc.0].allowed_nodes = table;
    }

    /// Allowed nodes of `rsc` under the standard comparator: score
    /// descending, then node name for determinism.
    pub fn sorted_allowed_nodes(&self, rsc: ResourceId) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self.resources[rsc.0].allowed_nodes.keys().copied().collect();
        nodes.sort_by(|a, b| {
            let ea = self.resources[rsc.0].allowed_nodes[a];
            let eb = self.resources[rsc.0].allowed_nodes[b];
            eb.score
                .cmp(&ea.score)
                .then_with(|| self.nodes[a.0].name.cmp(&self.nodes[b.0].name))
        });
        nodes
    }

    // ── Colocations ────────────────────────────────────────────────

    /// Add a dependent-side colocation to `rsc` if not already present.
    pub fn add_this_with(&mut self, rsc: ResourceId, col: ColocationId) {
        let list = &mut self.resources[rsc.0].this_with;
        if !list.contains(&col) {
            list.push(col);
        }
    }

    /// Add a primary-side colocation to `rsc` if not already present.
    pub fn add_with_this(&mut self, rsc: ResourceId, col: ColocationId) {
        let list = &mut self.resources[rsc.0].with_this;
        if !list.contains(&col) {
            list.push(col);
        }
    }

    /// Whether a primary-side colocation should influence placement for
    /// this dependent instance. Without the influence flag the dependent
    /// only matters while it is active.
    pub fn colocation_has_influence(&self, col: ColocationId, instance: Option<ResourceId>) -> bool {
        let c = &self.colocations[col.0];
        if c.influence {
            return true;
        }
        let dependent = instance.unwrap_or(c.dependent);
        !self.resources[dependent.0].running_on.is_empty()
    }

    // ── Assignment primitives ──────────────────────────────────────

    /// Choose the best node for `rsc` and record the choice, clearing the
    /// provisional flag. `prefer` wins ties at the best score.
    ///
    /// Dependent-side colocations are folded into the node scores first,
    /// assigning provisional primaries on the way; the ALLOCATING flag
    /// breaks colocation cycles.
    pub fn choose_node(&mut self, rsc: ResourceId, prefer: Option<NodeId>) -> Option<NodeId> {
        if !self.resources[rsc.0].is_provisional() {
            return self.resources[rsc.0].assigned_node;
        }
        if self.resources[rsc.0].flags.contains(ResourceFlags::ALLOCATING) {
            debug!(
                resource = %self.resources[rsc.0].name,
                "not choosing a node while a choice is already in progress"
            );
            return None;
        }
        self.resources[rsc.0].flags.insert(ResourceFlags::ALLOCATING);
        self.apply_dependent_colocations(rsc);

        let mut candidates: Vec<NodeId> = self.resources[rsc.0]
            .allowed_nodes
            .iter()
            .filter(|(id, entry)| {
                !entry.score.is_neg_infinite() && self.available(**id, false, false)
            })
            .map(|(id, _)| *id)
            .collect();
        candidates.sort_by(|a, b| {
            let ea = self.resources[rsc.0].allowed_nodes[a];
            let eb = self.resources[rsc.0].allowed_nodes[b];
            eb.score
                .cmp(&ea.score)
                .then_with(|| self.nodes[a.0].name.cmp(&self.nodes[b.0].name))
        });

        let chosen = match candidates.first().copied() {
            None => None,
            Some(best) => {
                let best_score = self.resources[rsc.0].allowed_nodes[&best].score;
                match prefer {
                    Some(p)
                        if candidates.contains(&p)
                            && self.resources[rsc.0].allowed_nodes[&p].score == best_score =>
                    {
                        Some(p)
                    }
                    _ => Some(best),
                }
            }
        };

        self.resources[rsc.0].flags.remove(ResourceFlags::ALLOCATING);
        self.resources[rsc.0].flags.remove(ResourceFlags::PROVISIONAL);
        self.resources[rsc.0].assigned_node = chosen;
        let children = self.resources[rsc.0].children.clone();
        for child in children {
            self.follow_parent_assignment(child, chosen);
        }
        if let Some(inner) = self.resources[rsc.0].inner {
            self.follow_parent_assignment(inner, chosen);
        }

        match chosen {
            Some(node) => trace!(
                resource = %self.resources[rsc.0].name,
                node = %self.nodes[node.0].name,
                "chose node"
            ),
            None => trace!(
                resource = %self.resources[rsc.0].name,
                "no node could be chosen"
            ),
        }
        chosen
    }

    /// Fold dependent-side colocations into `rsc`'s node scores.
    fn apply_dependent_colocations(&mut self, rsc: ResourceId) {
        let cols = self.resources[rsc.0].this_with.clone();
        for cid in cols {
            let (primary, score, label) = {
                let c = &self.colocations[cid.0];
                (c.primary, c.score, c.label.clone())
            };
            let primary_ready = {
                let p = &self.resources[primary.0];
                p.is_provisional()
                    && !p.flags.contains(ResourceFlags::ALLOCATING)
                    && !p.variant.is_collective()
            };
            if primary_ready {
                self.choose_node(primary, None);
            }
            match self.location(primary, false) {
                Some(node) => {
                    if let Some(entry) = self.resources[rsc.0].allowed_nodes.get_mut(&node) {
                        entry.score = entry.score + score;
                    }
                    trace!(
                        resource = %self.resources[rsc.0].name,
                        constraint = %label,
                        node = %self.nodes[node.0].name,
                        score = %score,
                        "applied colocation to node score"
                    );
                }
                None if score.is_infinite() => {
                    // A mandatory colocation with an unplaced primary bans
                    // the dependent everywhere.
                    for entry in self.resources[rsc.0].allowed_nodes.values_mut() {
                        entry.score = Score::NEG_INFINITY;
                    }
                    trace!(
                        resource = %self.resources[rsc.0].name,
                        constraint = %label,
                        "mandatory colocation primary has no node, banning dependent"
                    );
                }
                None => {}
            }
        }
    }

    fn follow_parent_assignment(&mut self, rsc: ResourceId, node: Option<NodeId>) {
        self.resources[rsc.0].flags.remove(ResourceFlags::PROVISIONAL);
        self.resources[rsc.0].assigned_node = node;
        let children = self.resources[rsc.0].children.clone();
        for child in children {
            self.follow_parent_assignment(child, node);
        }
        if let Some(inner) = self.resources[rsc.0].inner {
            self.follow_parent_assignment(inner, node);
        }
    }

    /// Directed (re)assignment of `rsc` to `node`, recursively.
    ///
    /// With `node == None` the resource is pinned down: it loses its node
    /// and its start actions become unrunnable. Returns false only when the
    /// resource was already assigned and `force` is not set.
    pub fn assign_resource(&mut self, rsc: ResourceId, node: Option<NodeId>, force: bool) -> bool {
        if !self.resources[rsc.0].is_provisional() {
            if !force {
                return false;
            }
            self.unassign_resource(rsc);
        }
        self.resources[rsc.0].flags.remove(ResourceFlags::PROVISIONAL);
        self.resources[rsc.0].assigned_node = node;
        match node {
            Some(n) => trace!(
                resource = %self.resources[rsc.0].name,
                node = %self.nodes[n.0].name,
                "assigned resource to node"
            ),
            None => {
                trace!(
                    resource = %self.resources[rsc.0].name,
                    "resource cannot run anywhere, keeping it down"
                );
                let actions = self.resources[rsc.0].actions.clone();
                for aid in actions {
                    if self.actions[aid.0].task == Task::Start {
                        self.clear_action_flags(aid, ActionFlags::RUNNABLE);
                    }
                }
            }
        }
        let children = self.resources[rsc.0].children.clone();
        for child in children {
            self.assign_resource(child, node, true);
        }
        if let Some(inner) = self.resources[rsc.0].inner {
            self.assign_resource(inner, node, true);
        }
        true
    }

    /// Make `rsc` provisional again, recursively.
    pub fn unassign_resource(&mut self, rsc: ResourceId) {
        self.resources[rsc.0].flags.insert(ResourceFlags::PROVISIONAL);
        self.resources[rsc.0].assigned_node = None;
        let children = self.resources[rsc.0].children.clone();
        for child in children {
            self.unassign_resource(child);
        }
        if let Some(inner) = self.resources[rsc.0].inner {
            self.unassign_resource(inner);
        }
    }

    // ── State and location ─────────────────────────────────────────

    /// Role of `rsc`: current when `current`, otherwise the role implied
    /// by this pass's assignment. Non-primitives report their most active
    /// descendant.
    pub fn state(&self, rsc: ResourceId, current: bool) -> Role {
        let r = &self.resources[rsc.0];
        if r.variant != Variant::Primitive {
            return r
                .children
                .iter()
                .map(|c| self.state(*c, current))
                .max()
                .unwrap_or(Role::Stopped);
        }
        if current {
            if r.running_on.is_empty() {
                Role::Stopped
            } else {
                r.role
            }
        } else if r.next_role != Role::Unknown {
            r.next_role
        } else if r.assigned_node.is_some() {
            Role::Started
        } else {
            Role::Stopped
        }
    }

    /// Node of `rsc`: current location when `current`, otherwise the node
    /// assigned in this pass. Groups report their first located member;
    /// clones and bundles report a node only when their instances agree.
    pub fn location(&self, rsc: ResourceId, current: bool) -> Option<NodeId> {
        let r = &self.resources[rsc.0];
        match r.variant {
            Variant::Primitive => {
                if current {
                    r.running_on.first().copied()
                } else {
                    r.assigned_node
                }
            }
            Variant::Group => r.children.iter().find_map(|c| self.location(*c, current)),
            Variant::Clone | Variant::Bundle => {
                let mut found: Option<NodeId> = None;
                for child in &r.children {
                    if let Some(node) = self.location(*child, current) {
                        if found.is_some() && found != Some(node) {
                            return None;
                        }
                        found = Some(node);
                    }
                }
                found
            }
        }
    }

    /// Test `flag` over the subtree rooted at `rsc`: any member when
    /// `any`, every member otherwise.
    pub fn is_set_recursive(&self, rsc: ResourceId, flag: ResourceFlags, any: bool) -> bool {
        let set = self.resources[rsc.0].flags.contains(flag);
        if any && set {
            return true;
        }
        if !any && !set {
            return false;
        }
        for &child in &self.resources[rsc.0].children {
            let child_set = self.is_set_recursive(child, flag, any);
            if any && child_set {
                return true;
            }
            if !any && !child_set {
                return false;
            }
        }
        !any
    }

    // ── Instances ──────────────────────────────────────────────────

    /// The instances of a collective: clone children, or bundle replica
    /// containers.
    pub fn instance_list(&self, rsc: ResourceId) -> Vec<ResourceId> {
        self.resources[rsc.0].children.clone()
    }

    /// The containerized resource of a bundle replica, if any.
    pub fn container_inner(&self, instance: ResourceId) -> Option<ResourceId> {
        self.resources[instance.0].inner
    }

    /// Map a collective-level task to what it means on `child`: for
    /// primitive children completion tasks collapse to the action they
    /// complete.
    pub fn simplified_task(&self, child: ResourceId, task: Task) -> Task {
        if self.resources[child.0].variant == Variant::Primitive {
            task.simplified()
        } else {
            task
        }
    }
}
