//! Virtual nodes: cheap descriptions of realized host nodes.
//!
//! A fresh tree is built on every render and consumed by the patch that
//! diffs against it. The only link back to the host is [`VNode::elm`], a
//! plain node id that the tree never owns.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::async_component::AsyncFactory;
use crate::component::ComponentClass;
use crate::host::{Event, Handler, Invoker};
use crate::instance::{Instance, Listeners, Props};
use crate::NodeId;

/// Identity token for a child within its sibling list.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum VKey {
    Int(i64),
    Str(Rc<str>),
}

impl fmt::Display for VKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VKey::Int(value) => write!(f, "{value}"),
            VKey::Str(value) => f.write_str(value),
        }
    }
}

impl From<i64> for VKey {
    fn from(value: i64) -> Self {
        VKey::Int(value)
    }
}

impl From<i32> for VKey {
    fn from(value: i32) -> Self {
        VKey::Int(i64::from(value))
    }
}

impl From<u32> for VKey {
    fn from(value: u32) -> Self {
        VKey::Int(i64::from(value))
    }
}

impl From<usize> for VKey {
    fn from(value: usize) -> Self {
        match i64::try_from(value) {
            Ok(value) => VKey::Int(value),
            // Out of `i64` range: keep the key distinct as text.
            Err(_) => VKey::Str(Rc::from(value.to_string())),
        }
    }
}

impl From<&str> for VKey {
    fn from(value: &str) -> Self {
        VKey::Str(Rc::from(value))
    }
}

impl From<String> for VKey {
    fn from(value: String) -> Self {
        VKey::Str(Rc::from(value))
    }
}

impl From<Rc<str>> for VKey {
    fn from(value: Rc<str>) -> Self {
        VKey::Str(value)
    }
}

pub type NodeHook = Rc<dyn Fn(NodeId)>;

/// Per-node callbacks fired by the patcher.
#[derive(Clone, Default)]
pub struct VNodeHooks {
    /// After the node and its children exist, before insertion.
    pub create: Option<NodeHook>,
    /// Once the whole patch that inserted the node has completed.
    pub insert: Option<NodeHook>,
    pub update: Option<NodeHook>,
    /// Before the node leaves the host.
    pub destroy: Option<NodeHook>,
}

impl VNodeHooks {
    pub fn is_empty(&self) -> bool {
        self.create.is_none()
            && self.insert.is_none()
            && self.update.is_none()
            && self.destroy.is_none()
    }
}

/// Outcome of a leave transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Leave {
    /// Remove the node from the host right away.
    Now,
    /// Keep the node until the app is told the leave finished.
    Deferred,
}

pub trait TransitionHooks {
    fn enter(&self, _elm: NodeId) {}

    fn leave(&self, _elm: NodeId) -> Leave {
        Leave::Now
    }
}

#[derive(Clone, Default)]
pub struct VNodeData {
    pub attrs: IndexMap<Rc<str>, Rc<str>>,
    pub class: Vec<Rc<str>>,
    pub style: IndexMap<Rc<str>, Rc<str>>,
    pub on: IndexMap<Rc<str>, Handler>,
    pub hooks: VNodeHooks,
    pub transition: Option<Rc<dyn TransitionHooks>>,
    pub(crate) invokers: IndexMap<Rc<str>, Invoker>,
}

impl VNodeData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attr(mut self, name: impl Into<Rc<str>>, value: impl Into<Rc<str>>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn class(mut self, name: impl Into<Rc<str>>) -> Self {
        self.class.push(name.into());
        self
    }

    pub fn style(mut self, name: impl Into<Rc<str>>, value: impl Into<Rc<str>>) -> Self {
        self.style.insert(name.into(), value.into());
        self
    }

    pub fn on(mut self, event: impl Into<Rc<str>>, handler: impl Fn(&Event) + 'static) -> Self {
        self.on.insert(event.into(), Rc::new(handler));
        self
    }

    pub fn on_create(mut self, hook: impl Fn(NodeId) + 'static) -> Self {
        self.hooks.create = Some(Rc::new(hook));
        self
    }

    pub fn on_insert(mut self, hook: impl Fn(NodeId) + 'static) -> Self {
        self.hooks.insert = Some(Rc::new(hook));
        self
    }

    pub fn on_update(mut self, hook: impl Fn(NodeId) + 'static) -> Self {
        self.hooks.update = Some(Rc::new(hook));
        self
    }

    pub fn on_destroy(mut self, hook: impl Fn(NodeId) + 'static) -> Self {
        self.hooks.destroy = Some(Rc::new(hook));
        self
    }

    pub fn transition(mut self, hooks: Rc<dyn TransitionHooks>) -> Self {
        self.transition = Some(hooks);
        self
    }
}

impl fmt::Debug for VNodeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VNodeData")
            .field("attrs", &self.attrs)
            .field("class", &self.class)
            .field("style", &self.style)
            .field("on", &self.on.keys().collect::<Vec<_>>())
            .field("transition", &self.transition.is_some())
            .finish()
    }
}

/// What a component placeholder carries into the child instance.
#[derive(Clone)]
pub struct VNodeComponentOptions {
    pub class: ComponentClass,
    pub props: Props,
    pub listeners: Listeners,
    /// Slot content rendered by the child.
    pub children: Vec<VNode>,
    /// Tag the component was referenced by in the parent's render.
    pub tag: Option<Rc<str>>,
}

/// Rendering inputs kept on an unresolved async placeholder.
#[derive(Clone, Default)]
pub struct AsyncMeta {
    pub data: Option<VNodeData>,
    pub children: Vec<VNode>,
    pub tag: Option<Rc<str>>,
}

#[derive(Clone, Default)]
pub struct VNode {
    pub tag: Option<Rc<str>>,
    pub key: Option<VKey>,
    pub data: Option<VNodeData>,
    pub children: Vec<VNode>,
    pub text: Option<Rc<str>>,
    pub is_comment: bool,
    pub component_options: Option<VNodeComponentOptions>,
    pub async_factory: Option<AsyncFactory>,
    pub async_meta: Option<AsyncMeta>,
    pub(crate) component_instance: Option<Instance>,
    pub(crate) elm: Option<NodeId>,
}

impl VNode {
    pub fn element(tag: impl Into<Rc<str>>, data: Option<VNodeData>, children: Vec<VNode>) -> Self {
        Self {
            tag: Some(tag.into()),
            data,
            children,
            ..Self::default()
        }
    }

    pub fn text(text: impl Into<Rc<str>>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn comment(text: impl Into<Rc<str>>) -> Self {
        Self {
            text: Some(text.into()),
            is_comment: true,
            ..Self::default()
        }
    }

    /// An empty comment, rendered where nothing should appear.
    pub fn empty() -> Self {
        Self {
            is_comment: true,
            ..Self::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<VKey>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Realized node for this vnode. Component vnodes answer through their
    /// instance so a re-rendered child root is always current.
    pub fn elm(&self) -> Option<NodeId> {
        match &self.component_instance {
            Some(instance) => instance.el(),
            None => self.elm,
        }
    }

    pub fn is_component(&self) -> bool {
        self.component_options.is_some()
    }

    pub fn is_async_placeholder(&self) -> bool {
        self.is_comment && self.async_factory.is_some()
    }

    pub fn is_text(&self) -> bool {
        self.tag.is_none() && !self.is_comment
    }

    pub fn component_instance(&self) -> Option<&Instance> {
        self.component_instance.as_ref()
    }

    pub fn component_class(&self) -> Option<&ComponentClass> {
        self.component_options.as_ref().map(|options| &options.class)
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("VNode");
        if let Some(tag) = &self.tag {
            out.field("tag", tag);
        }
        if let Some(key) = &self.key {
            out.field("key", key);
        }
        if let Some(text) = &self.text {
            out.field("text", text);
        }
        if self.is_comment {
            out.field("is_comment", &true);
        }
        if self.async_factory.is_some() {
            out.field("async", &true);
        }
        out.field("elm", &self.elm());
        if !self.children.is_empty() {
            out.field("children", &self.children);
        }
        out.finish()
    }
}

/// Whether `new` may be patched onto the realization of `old`.
pub fn same_vnode(old: &VNode, new: &VNode) -> bool {
    old.key == new.key
        && same_factory(old.async_factory.as_ref(), new.async_factory.as_ref())
        && old.tag == new.tag
        && old.is_comment == new.is_comment
        && old.data.is_some() == new.data.is_some()
        && same_input_type(old, new)
}

fn same_factory(old: Option<&AsyncFactory>, new: Option<&AsyncFactory>) -> bool {
    match (old, new) {
        (None, None) => true,
        (Some(a), Some(b)) => a.ptr_eq(b),
        _ => false,
    }
}

// An <input> cannot switch its type in place.
fn same_input_type(old: &VNode, new: &VNode) -> bool {
    if old.tag.as_deref() != Some("input") {
        return true;
    }
    let input_type = |vnode: &VNode| {
        vnode
            .data
            .as_ref()
            .and_then(|data| data.attrs.get("type").cloned())
    };
    input_type(old) == input_type(new)
}

#[cfg(test)]
#[path = "tests/vnode_tests.rs"]
mod tests;
