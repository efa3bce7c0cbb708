use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use indexmap::IndexMap;

use crate::component::{ComponentClass, ResolvedOptions};
use crate::host::{Event, Handler, Host};
use crate::patch::{InsertedEntry, Patcher};
use crate::render::RenderContext;
use crate::runtime::RuntimeHandle;
use crate::vnode::VNode;
use crate::NodeId;

pub type InstanceId = u64;
pub type Props = IndexMap<Rc<str>, Rc<str>>;
pub type Listeners = IndexMap<Rc<str>, Handler>;
pub type HookFn = Rc<dyn Fn(&Instance)>;

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleHook {
    BeforeCreate,
    Created,
    BeforeMount,
    Mounted,
    BeforeUpdate,
    Updated,
    BeforeDestroy,
    Destroyed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstanceState {
    Created,
    Mounted,
    Destroyed,
}

/// Returned by [`Instance::on_hook`]; pass it to [`Instance::off_hook`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HookHandle {
    instance: InstanceId,
    id: u64,
}

/// Inputs a parent hands to a child instance.
#[derive(Clone, Default)]
pub struct InstanceInit {
    pub props: Props,
    pub listeners: Listeners,
    pub slot: Vec<VNode>,
    pub parent: Option<Instance>,
    pub tag: Option<Rc<str>>,
}

struct InstanceInner {
    id: InstanceId,
    class: ComponentClass,
    options: Rc<ResolvedOptions>,
    runtime: RuntimeHandle,
    parent: Option<WeakInstance>,
    tag: Option<Rc<str>>,
    props: RefCell<Props>,
    listeners: RefCell<Listeners>,
    slot: RefCell<Vec<VNode>>,
    vnode: RefCell<Option<VNode>>,
    el: Cell<Option<NodeId>>,
    state: Cell<InstanceState>,
    hook_listeners: RefCell<Vec<(HookHandle, LifecycleHook, HookFn)>>,
    next_hook_id: Cell<u64>,
    update_count: Cell<usize>,
}

/// A live component: its inputs, rendered tree and lifecycle state.
#[derive(Clone)]
pub struct Instance {
    inner: Rc<InstanceInner>,
}

#[derive(Clone)]
pub struct WeakInstance {
    inner: Weak<InstanceInner>,
}

impl WeakInstance {
    pub fn upgrade(&self) -> Option<Instance> {
        self.inner.upgrade().map(|inner| Instance { inner })
    }
}

impl Instance {
    /// Creates the instance and runs `BeforeCreate` and `Created`.
    pub fn new(class: ComponentClass, init: InstanceInit, runtime: RuntimeHandle) -> Self {
        let started = runtime.performance().then(Instant::now);
        let options = class.options();
        let instance = Self {
            inner: Rc::new(InstanceInner {
                id: NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed),
                class,
                options,
                runtime,
                parent: init.parent.as_ref().map(Instance::downgrade),
                tag: init.tag,
                props: RefCell::new(init.props),
                listeners: RefCell::new(init.listeners),
                slot: RefCell::new(init.slot),
                vnode: RefCell::new(None),
                el: Cell::new(None),
                state: Cell::new(InstanceState::Created),
                hook_listeners: RefCell::new(Vec::new()),
                next_hook_id: Cell::new(1),
                update_count: Cell::new(0),
            }),
        };
        instance.call_hook(LifecycleHook::BeforeCreate);
        instance.call_hook(LifecycleHook::Created);
        instance.measure("init", started);
        instance
    }

    pub fn id(&self) -> InstanceId {
        self.inner.id
    }

    pub fn class(&self) -> &ComponentClass {
        &self.inner.class
    }

    pub fn options(&self) -> &Rc<ResolvedOptions> {
        &self.inner.options
    }

    pub fn name(&self) -> Option<Rc<str>> {
        self.inner.options.name.clone()
    }

    pub fn runtime(&self) -> &RuntimeHandle {
        &self.inner.runtime
    }

    pub fn parent(&self) -> Option<Instance> {
        self.inner.parent.as_ref().and_then(WeakInstance::upgrade)
    }

    pub fn tag(&self) -> Option<Rc<str>> {
        self.inner.tag.clone()
    }

    pub fn state(&self) -> InstanceState {
        self.inner.state.get()
    }

    pub fn is_mounted(&self) -> bool {
        self.state() == InstanceState::Mounted
    }

    pub fn is_destroyed(&self) -> bool {
        self.state() == InstanceState::Destroyed
    }

    /// Realized root node.
    pub fn el(&self) -> Option<NodeId> {
        self.inner.el.get()
    }

    pub fn update_count(&self) -> usize {
        self.inner.update_count.get()
    }

    pub fn prop(&self, name: &str) -> Option<Rc<str>> {
        self.inner.props.borrow().get(name).cloned()
    }

    pub fn props(&self) -> Props {
        self.inner.props.borrow().clone()
    }

    pub fn slot(&self) -> Vec<VNode> {
        self.inner.slot.borrow().clone()
    }

    /// Copy of the tree produced by the last render that was patched.
    pub fn current_tree(&self) -> Option<VNode> {
        self.inner.vnode.borrow().clone()
    }

    pub fn downgrade(&self) -> WeakInstance {
        WeakInstance {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Calls the listener the parent bound for `event`, if any.
    pub fn emit(&self, event: &str, detail: Option<&str>) -> bool {
        let handler = self.inner.listeners.borrow().get(event).cloned();
        let Some(handler) = handler else {
            return false;
        };
        let mut payload = Event::new(event);
        if let Some(detail) = detail {
            payload = payload.with_detail(detail);
        }
        handler(&payload);
        true
    }

    pub fn on_hook(
        &self,
        hook: LifecycleHook,
        callback: impl Fn(&Instance) + 'static,
    ) -> HookHandle {
        let id = self.inner.next_hook_id.get();
        self.inner.next_hook_id.set(id + 1);
        let handle = HookHandle {
            instance: self.inner.id,
            id,
        };
        self.inner
            .hook_listeners
            .borrow_mut()
            .push((handle, hook, Rc::new(callback)));
        handle
    }

    /// Returns whether the listener was still registered.
    pub fn off_hook(&self, handle: HookHandle) -> bool {
        if handle.instance != self.inner.id {
            return false;
        }
        let mut listeners = self.inner.hook_listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(registered, _, _)| *registered != handle);
        listeners.len() != before
    }

    pub fn hook_listener_count(&self) -> usize {
        self.inner.hook_listeners.borrow().len()
    }

    pub fn call_hook(&self, hook: LifecycleHook) {
        for callback in self.inner.options.hooks.for_hook(hook) {
            callback(self);
        }
        let dynamic: Vec<HookFn> = self
            .inner
            .hook_listeners
            .borrow()
            .iter()
            .filter(|(_, kind, _)| *kind == hook)
            .map(|(_, _, callback)| Rc::clone(callback))
            .collect();
        for callback in dynamic {
            callback(self);
        }
    }

    /// Queues a re-render on the runtime.
    pub fn force_update(&self) {
        if self.is_destroyed() {
            return;
        }
        self.inner.runtime.queue_update(self.inner.id, self.downgrade());
    }

    pub fn render(&self) -> VNode {
        let Some(render) = self.inner.options.render.clone() else {
            self.inner.runtime.warn(&format!(
                "Failed to mount component: render function not defined.{}",
                self.trace()
            ));
            return VNode::empty();
        };
        let mut context = RenderContext::new(self);
        render(&mut context)
    }

    /// Renders and creates the instance's tree under `parent`. Insert hooks
    /// are handed back so they run with the enclosing patch.
    pub(crate) fn mount_into(
        &self,
        host: &mut dyn Host,
        parent: Option<NodeId>,
        anchor: Option<NodeId>,
    ) -> Vec<InsertedEntry> {
        self.call_hook(LifecycleHook::BeforeMount);
        let started = self.inner.runtime.performance().then(Instant::now);
        let mut vnode = self.render();
        self.measure("render", started);
        let started = started.map(|_| Instant::now());
        let mut patcher = Patcher::new(host, self.inner.runtime.clone()).context(self.clone());
        patcher.create(&mut vnode, parent, anchor);
        self.measure("patch", started);
        self.inner.el.set(vnode.elm());
        *self.inner.vnode.borrow_mut() = Some(vnode);
        patcher.take_inserted()
    }

    pub(crate) fn mark_mounted(&self) {
        if self.state() != InstanceState::Created {
            return;
        }
        self.inner.state.set(InstanceState::Mounted);
        self.call_hook(LifecycleHook::Mounted);
    }

    /// Takes new inputs from a re-rendered parent. Changed props or any slot
    /// content queue a forced update.
    pub(crate) fn receive(&self, props: &Props, listeners: &Listeners, slot: &[VNode]) {
        let has_slot = !slot.is_empty() || !self.inner.slot.borrow().is_empty();
        let props_changed = *self.inner.props.borrow() != *props;
        *self.inner.props.borrow_mut() = props.clone();
        *self.inner.listeners.borrow_mut() = listeners.clone();
        *self.inner.slot.borrow_mut() = slot.to_vec();
        if props_changed || has_slot {
            self.force_update();
        }
    }

    /// Re-renders and patches. Returns false when the instance is not
    /// mounted.
    pub fn update(&self, host: &mut dyn Host) -> bool {
        if !self.is_mounted() {
            return false;
        }
        self.call_hook(LifecycleHook::BeforeUpdate);
        let mut next = self.render();
        let mut previous = self.inner.vnode.borrow_mut().take();
        if let Some(pass) = self.inner.options.removal_pass.clone() {
            if let Some(mut kept) = pass(self) {
                Patcher::new(host, self.inner.runtime.clone())
                    .context(self.clone())
                    .remove_only()
                    .patch(previous.take(), &mut kept);
                previous = Some(kept);
            }
        }
        let el = Patcher::new(host, self.inner.runtime.clone())
            .context(self.clone())
            .patch(previous, &mut next);
        self.inner.el.set(el);
        self.propagate_el(el);
        *self.inner.vnode.borrow_mut() = Some(next);
        self.inner.update_count.set(self.inner.update_count.get() + 1);
        self.call_hook(LifecycleHook::Updated);
        true
    }

    /// Tears the instance down: destroy hooks run through the rendered tree
    /// and listeners are dropped. The host removal of the root is left to
    /// whoever owns the placeholder.
    pub fn destroy(&self, host: &mut dyn Host) {
        if self.is_destroyed() {
            return;
        }
        self.call_hook(LifecycleHook::BeforeDestroy);
        self.inner.state.set(InstanceState::Destroyed);
        let tree = self.inner.vnode.borrow_mut().take();
        if let Some(tree) = tree {
            Patcher::new(host, self.inner.runtime.clone())
                .context(self.clone())
                .destroy_tree(&tree);
            // Keep the realized root reachable for the pending removal.
            self.inner.el.set(tree.elm());
        }
        self.inner.runtime.forget_update(self.inner.id);
        self.call_hook(LifecycleHook::Destroyed);
        self.inner.hook_listeners.borrow_mut().clear();
        self.inner.listeners.borrow_mut().clear();
    }

    // Parents whose root is this instance share its element.
    fn propagate_el(&self, el: Option<NodeId>) {
        let mut child = self.clone();
        while let Some(parent) = child.parent() {
            let is_root = parent
                .inner
                .vnode
                .borrow()
                .as_ref()
                .and_then(VNode::component_instance)
                .is_some_and(|root| root.ptr_eq(&child));
            if !is_root {
                break;
            }
            parent.inner.el.set(el);
            child = parent;
        }
    }

    fn display_name(&self) -> String {
        self.name()
            .map(|name| format!("<{name}>"))
            .unwrap_or_else(|| "<anonymous>".to_string())
    }

    /// Reports the time since `started` when timing is on.
    fn measure(&self, phase: &str, started: Option<Instant>) {
        let Some(started) = started else {
            return;
        };
        let label = format!("{} {phase}", self.display_name());
        self.inner.runtime.config().measure(&label, started.elapsed());
    }

    fn trace(&self) -> String {
        let mut chain = Vec::new();
        let mut current = Some(self.clone());
        while let Some(instance) = current {
            chain.push(instance.display_name());
            current = instance.parent();
        }
        format!("\n\nfound in\n\n---> {}", chain.join("\n       "))
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.inner.id)
            .field("name", &self.inner.options.name)
            .field("state", &self.inner.state.get())
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/instance_tests.rs"]
mod tests;
