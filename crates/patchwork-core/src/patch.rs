//! Reconciles a new vnode tree against the previously realized one.
//!
//! Nodes that satisfy [`same_vnode`] are patched in place, everything else is
//! replaced. Sibling lists go through [`KeyedDiff`]. Insert hooks, enter
//! transitions and child `Mounted` hooks are queued while the patch runs and
//! fired once it has completed, deepest first.

use std::rc::Rc;

use crate::host::{Host, HostError};
use crate::instance::{Instance, InstanceInit};
use crate::keyed_diff::{Anchor, DiffStats, KeyedDiff, ListOp, ListPatcher};
use crate::modules;
use crate::runtime::RuntimeHandle;
use crate::vnode::{same_vnode, Leave, NodeHook, TransitionHooks, VKey, VNode, VNodeData};
use crate::NodeId;

pub(crate) enum InsertedEntry {
    Node {
        elm: NodeId,
        insert: Option<NodeHook>,
        enter: Option<Rc<dyn TransitionHooks>>,
    },
    Component(Instance),
}

pub(crate) fn run_inserted(entries: Vec<InsertedEntry>) {
    for entry in entries {
        match entry {
            InsertedEntry::Node { elm, insert, enter } => {
                if let Some(enter) = enter {
                    enter.enter(elm);
                }
                if let Some(insert) = insert {
                    insert(elm);
                }
            }
            InsertedEntry::Component(instance) => instance.mark_mounted(),
        }
    }
}

pub struct Patcher<'a> {
    host: &'a mut dyn Host,
    runtime: RuntimeHandle,
    context: Option<Instance>,
    inserted: Vec<InsertedEntry>,
    remove_only: bool,
    debug: bool,
}

impl<'a> Patcher<'a> {
    pub fn new(host: &'a mut dyn Host, runtime: RuntimeHandle) -> Self {
        let debug = runtime.config().debug_patches;
        Self {
            host,
            runtime,
            context: None,
            inserted: Vec::new(),
            remove_only: false,
            debug,
        }
    }

    /// Instance whose render produced the trees being patched.
    pub fn context(mut self, instance: Instance) -> Self {
        self.context = Some(instance);
        self
    }

    /// Patch and remove without moving surviving nodes.
    pub fn remove_only(mut self) -> Self {
        self.remove_only = true;
        self
    }

    /// Reconciles `old` into `new` and returns the realized root. Without an
    /// old tree the new one is created detached.
    pub fn patch(mut self, old: Option<VNode>, new: &mut VNode) -> Option<NodeId> {
        match old {
            None => self.create(new, None, None),
            Some(old) if same_vnode(&old, new) => self.patch_vnode(old, new),
            Some(old) => self.replace(old, new),
        }
        self.flush();
        new.elm()
    }

    /// Creates `new` and inserts it under `parent`.
    pub fn mount(
        mut self,
        new: &mut VNode,
        parent: NodeId,
        anchor: Option<NodeId>,
    ) -> Option<NodeId> {
        self.create(new, Some(parent), anchor);
        self.flush();
        new.elm()
    }

    /// Destroys and removes a realized tree.
    pub fn unmount(mut self, old: VNode) {
        self.remove_vnode(old);
    }

    /// Runs destroy hooks through a tree without touching the host.
    pub(crate) fn destroy_tree(mut self, tree: &VNode) {
        self.invoke_destroy(tree);
    }

    pub(crate) fn take_inserted(&mut self) -> Vec<InsertedEntry> {
        std::mem::take(&mut self.inserted)
    }

    fn flush(&mut self) {
        run_inserted(self.take_inserted());
    }

    fn report(&self, result: Result<(), HostError>) {
        if let Err(err) = result {
            self.runtime.warn(&format!("host operation failed: {err}"));
        }
    }

    // Initial renders do not run enter transitions.
    fn context_mounted(&self) -> bool {
        self.context
            .as_ref()
            .is_some_and(|instance| instance.is_mounted())
    }

    fn queue_node_hooks(&mut self, elm: NodeId, data: &VNodeData) {
        let insert = data.hooks.insert.clone();
        let enter = data
            .transition
            .clone()
            .filter(|_| self.context_mounted());
        if insert.is_some() || enter.is_some() {
            self.inserted.push(InsertedEntry::Node { elm, insert, enter });
        }
    }

    pub(crate) fn create(
        &mut self,
        vnode: &mut VNode,
        parent: Option<NodeId>,
        anchor: Option<NodeId>,
    ) {
        if vnode.component_options.is_some() {
            self.create_component(vnode, parent, anchor);
            return;
        }
        let elm = match vnode.tag.clone() {
            Some(tag) => {
                let elm = self.host.create_element(&tag);
                vnode.elm = Some(elm);
                for child in vnode.children.iter_mut() {
                    self.create(child, Some(elm), None);
                }
                if let Some(data) = vnode.data.as_mut() {
                    let result = modules::create_data(&mut *self.host, elm, data);
                    self.report(result);
                    if let Some(hook) = data.hooks.create.clone() {
                        hook(elm);
                    }
                }
                if let Some(data) = vnode.data.as_ref() {
                    self.queue_node_hooks(elm, data);
                }
                elm
            }
            None if vnode.is_comment => self
                .host
                .create_comment(vnode.text.as_deref().unwrap_or_default()),
            None => self
                .host
                .create_text(vnode.text.as_deref().unwrap_or_default()),
        };
        vnode.elm = Some(elm);
        self.insert(parent, elm, anchor);
    }

    fn create_component(
        &mut self,
        vnode: &mut VNode,
        parent: Option<NodeId>,
        anchor: Option<NodeId>,
    ) {
        let Some(options) = vnode.component_options.as_ref() else {
            return;
        };
        let init = InstanceInit {
            props: options.props.clone(),
            listeners: options.listeners.clone(),
            slot: options.children.clone(),
            parent: self.context.clone(),
            tag: options.tag.clone(),
        };
        let child = Instance::new(options.class.clone(), init, self.runtime.clone());
        let pending = child.mount_into(&mut *self.host, parent, anchor);
        self.inserted.extend(pending);
        self.inserted.push(InsertedEntry::Component(child.clone()));
        vnode.elm = child.el();
        if let (Some(elm), Some(data)) = (child.el(), vnode.data.as_ref()) {
            if let Some(hook) = data.hooks.create.clone() {
                hook(elm);
            }
            self.queue_node_hooks(elm, data);
        }
        vnode.component_instance = Some(child);
    }

    fn insert(&mut self, parent: Option<NodeId>, elm: NodeId, anchor: Option<NodeId>) {
        let Some(parent) = parent else {
            return;
        };
        // An anchor that moved elsewhere degrades to an append.
        let reference =
            anchor.filter(|reference| self.host.parent_node(*reference) == Some(parent));
        let result = self.host.insert_before(parent, elm, reference);
        self.report(result);
    }

    fn replace(&mut self, old: VNode, new: &mut VNode) {
        let old_elm = old.elm();
        let parent = old_elm.and_then(|elm| self.host.parent_node(elm));
        let anchor = old_elm.and_then(|elm| self.host.next_sibling(elm));
        self.create(new, parent, anchor);
        if parent.is_some() {
            self.remove_vnode(old);
        } else {
            self.invoke_destroy(&old);
        }
    }

    fn patch_vnode(&mut self, old: VNode, new: &mut VNode) {
        if is_same_realization(&old, new) {
            *new = old;
            return;
        }
        if new.component_options.is_some() {
            self.prepatch_component(old, new);
            return;
        }
        let Some(elm) = old.elm else {
            self.runtime
                .warn("patched a vnode that was never realized; creating it again");
            self.create(new, None, None);
            return;
        };
        new.elm = Some(elm);

        if new.tag.is_none() {
            if old.text != new.text {
                let result = self
                    .host
                    .set_text(elm, new.text.as_deref().unwrap_or_default());
                self.report(result);
            }
            return;
        }

        let VNode {
            data: old_data,
            children: old_children,
            ..
        } = old;
        if let Some(data) = new.data.as_mut() {
            let result = modules::update_data(&mut *self.host, elm, old_data, data);
            self.report(result);
            if let Some(hook) = data.hooks.update.clone() {
                hook(elm);
            }
        }

        match (old_children.is_empty(), new.children.is_empty()) {
            (false, false) => self.update_children(elm, old_children, &mut new.children),
            (true, false) => {
                for child in new.children.iter_mut() {
                    self.create(child, Some(elm), None);
                }
            }
            (false, true) => {
                for child in old_children {
                    self.remove_vnode(child);
                }
            }
            (true, true) => {}
        }
    }

    fn prepatch_component(&mut self, old: VNode, new: &mut VNode) {
        let Some(instance) = old.component_instance.clone() else {
            self.replace(old, new);
            return;
        };
        if let Some(options) = new.component_options.as_ref() {
            instance.receive(&options.props, &options.listeners, &options.children);
        }
        new.elm = instance.el();
        if let (Some(elm), Some(data)) = (instance.el(), new.data.as_ref()) {
            if let Some(hook) = data.hooks.update.clone() {
                hook(elm);
            }
        }
        new.component_instance = Some(instance);
    }

    fn update_children(&mut self, parent: NodeId, old: Vec<VNode>, new: &mut [VNode]) {
        let diff = if self.remove_only {
            KeyedDiff::remove_only()
        } else {
            KeyedDiff::new()
        };
        let debug = self.debug;
        let old_elms = old.iter().map(VNode::elm).collect();
        let mut list = ChildPatch {
            patcher: self,
            parent,
            old: old.into_iter().map(Some).collect(),
            old_elms,
            new,
            stats: DiffStats::default(),
        };
        diff.run(&mut list);
        if debug {
            log::debug!(
                "patched children of node {parent}: {} patched, {} moved, {} created, {} removed",
                list.stats.patched,
                list.stats.moved,
                list.stats.created,
                list.stats.removed
            );
        }
    }

    fn remove_vnode(&mut self, vnode: VNode) {
        let elm = vnode.elm();
        self.invoke_destroy(&vnode);
        let Some(elm) = elm else {
            return;
        };
        let transition = vnode.data.as_ref().and_then(|data| data.transition.clone());
        if let Some(transition) = transition {
            if transition.leave(elm) == Leave::Deferred {
                log::trace!("leave of node {elm} deferred");
                self.runtime.defer_leave(elm);
                return;
            }
        }
        if let Some(parent) = self.host.parent_node(elm) {
            let result = self.host.remove_child(parent, elm);
            self.report(result);
        }
    }

    fn invoke_destroy(&mut self, vnode: &VNode) {
        if let (Some(elm), Some(data)) = (vnode.elm(), vnode.data.as_ref()) {
            if let Some(hook) = &data.hooks.destroy {
                hook(elm);
            }
        }
        if let Some(instance) = &vnode.component_instance {
            instance.destroy(&mut *self.host);
            return;
        }
        for child in &vnode.children {
            self.invoke_destroy(child);
        }
    }
}

// A vnode cloned from the realized tree stands for the same nodes.
fn is_same_realization(old: &VNode, new: &VNode) -> bool {
    match (&old.component_instance, &new.component_instance) {
        (Some(a), Some(b)) => a.ptr_eq(b),
        (None, None) => new.elm.is_some() && new.elm == old.elm,
        _ => false,
    }
}

struct ChildPatch<'p, 'a, 'n> {
    patcher: &'p mut Patcher<'a>,
    parent: NodeId,
    old: Vec<Option<VNode>>,
    old_elms: Vec<Option<NodeId>>,
    new: &'n mut [VNode],
    stats: DiffStats,
}

impl ChildPatch<'_, '_, '_> {
    fn resolve(&self, anchor: Anchor) -> Option<NodeId> {
        match anchor {
            Anchor::BeforeOld(index) => self.old_elms[index],
            Anchor::AfterOld(index) => self.old_elms[index]
                .and_then(|elm| self.patcher.host.next_sibling(elm)),
            Anchor::BeforeNew(index) => self.new[index].elm(),
            Anchor::End => None,
        }
    }
}

impl ListPatcher for ChildPatch<'_, '_, '_> {
    fn old_len(&self) -> usize {
        self.old.len()
    }

    fn new_len(&self) -> usize {
        self.new.len()
    }

    fn old_key(&self, index: usize) -> Option<&VKey> {
        self.old[index].as_ref().and_then(|vnode| vnode.key.as_ref())
    }

    fn new_key(&self, index: usize) -> Option<&VKey> {
        self.new[index].key.as_ref()
    }

    fn same(&self, old: usize, new: usize) -> bool {
        self.old[old]
            .as_ref()
            .is_some_and(|vnode| same_vnode(vnode, &self.new[new]))
    }

    fn patch(&mut self, old: usize, new: usize) {
        if let Some(vnode) = self.old[old].take() {
            self.patcher.patch_vnode(vnode, &mut self.new[new]);
            self.stats.record(&ListOp::Patch { old, new });
        }
    }

    fn move_before(&mut self, new: usize, anchor: Anchor) {
        let Some(elm) = self.new[new].elm() else {
            return;
        };
        let reference = self.resolve(anchor);
        let result = self.patcher.host.insert_before(self.parent, elm, reference);
        self.patcher.report(result);
        self.stats.record(&ListOp::Move { new, anchor });
    }

    fn create(&mut self, new: usize, anchor: Anchor) {
        let reference = self.resolve(anchor);
        self.patcher.create(&mut self.new[new], Some(self.parent), reference);
        self.stats.record(&ListOp::Create { new, anchor });
    }

    fn remove(&mut self, old: usize) {
        if let Some(vnode) = self.old[old].take() {
            self.patcher.remove_vnode(vnode);
            self.stats.record(&ListOp::Remove { old });
        }
    }

    fn warn(&self, message: &str) {
        self.patcher.runtime.warn(message);
    }
}

#[cfg(test)]
#[path = "tests/patch_tests.rs"]
mod tests;
