//! Component definitions and the classes they are layered into.
//!
//! A [`ComponentClass`] is a stack of option layers on top of a parent
//! class. Resolving a class folds the parent's resolved options with its own
//! layers; the result is cached against a stamp derived from every layer in
//! the lineage, so registering a component on a base class is visible to all
//! classes extended from it.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::{IndexMap, IndexSet};

use crate::async_component::AsyncFactory;
use crate::collections::map::HashMap;
use crate::instance::{HookFn, Instance, LifecycleHook};
use crate::render::RenderContext;
use crate::vnode::VNode;

pub type RenderFn = Rc<dyn Fn(&mut RenderContext<'_>) -> VNode>;

/// Produces the tree a removal-only pass should patch to before the full
/// update of an instance.
pub type RemovalPassFn = Rc<dyn Fn(&Instance) -> Option<VNode>>;

#[derive(Clone, Default)]
pub struct LifecycleHooks {
    entries: Vec<(LifecycleHook, HookFn)>,
}

impl LifecycleHooks {
    pub fn add(&mut self, hook: LifecycleHook, callback: HookFn) {
        self.entries.push((hook, callback));
    }

    pub fn for_hook(&self, hook: LifecycleHook) -> impl Iterator<Item = &HookFn> + '_ {
        self.entries
            .iter()
            .filter(move |(kind, _)| *kind == hook)
            .map(|(_, callback)| callback)
    }

    pub fn extend(&mut self, other: &LifecycleHooks) {
        self.entries.extend(other.entries.iter().cloned());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Plain options for a component, before it is layered into a class.
#[derive(Clone, Default)]
pub struct ComponentDescriptor {
    pub name: Option<Rc<str>>,
    pub render: Option<RenderFn>,
    pub props: Vec<Rc<str>>,
    pub components: IndexMap<Rc<str>, ComponentEntry>,
    pub hooks: LifecycleHooks,
    pub removal_pass: Option<RemovalPassFn>,
}

impl ComponentDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<Rc<str>>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn render(mut self, render: impl Fn(&mut RenderContext<'_>) -> VNode + 'static) -> Self {
        self.render = Some(Rc::new(render));
        self
    }

    pub fn prop(mut self, name: impl Into<Rc<str>>) -> Self {
        self.props.push(name.into());
        self
    }

    pub fn component(mut self, name: impl Into<Rc<str>>, entry: impl Into<ComponentEntry>) -> Self {
        self.components.insert(name.into(), entry.into());
        self
    }

    pub fn hook(mut self, hook: LifecycleHook, callback: impl Fn(&Instance) + 'static) -> Self {
        self.hooks.add(hook, Rc::new(callback));
        self
    }

    pub fn removal_pass(mut self, pass: impl Fn(&Instance) -> Option<VNode> + 'static) -> Self {
        self.removal_pass = Some(Rc::new(pass));
        self
    }
}

#[derive(Clone)]
pub enum ComponentDefinition {
    /// Options that still need a class built from them.
    Inline(Rc<ComponentDescriptor>),
    Constructed(ComponentClass),
}

impl From<ComponentDescriptor> for ComponentDefinition {
    fn from(descriptor: ComponentDescriptor) -> Self {
        ComponentDefinition::Inline(Rc::new(descriptor))
    }
}

impl From<Rc<ComponentDescriptor>> for ComponentDefinition {
    fn from(descriptor: Rc<ComponentDescriptor>) -> Self {
        ComponentDefinition::Inline(descriptor)
    }
}

impl From<ComponentClass> for ComponentDefinition {
    fn from(class: ComponentClass) -> Self {
        ComponentDefinition::Constructed(class)
    }
}

/// What a name in a component registry resolves to.
#[derive(Clone)]
pub enum ComponentEntry {
    Definition(ComponentDefinition),
    Async(AsyncFactory),
}

impl From<ComponentDefinition> for ComponentEntry {
    fn from(definition: ComponentDefinition) -> Self {
        ComponentEntry::Definition(definition)
    }
}

impl From<ComponentDescriptor> for ComponentEntry {
    fn from(descriptor: ComponentDescriptor) -> Self {
        ComponentEntry::Definition(descriptor.into())
    }
}

impl From<Rc<ComponentDescriptor>> for ComponentEntry {
    fn from(descriptor: Rc<ComponentDescriptor>) -> Self {
        ComponentEntry::Definition(descriptor.into())
    }
}

impl From<ComponentClass> for ComponentEntry {
    fn from(class: ComponentClass) -> Self {
        ComponentEntry::Definition(class.into())
    }
}

impl From<AsyncFactory> for ComponentEntry {
    fn from(factory: AsyncFactory) -> Self {
        ComponentEntry::Async(factory)
    }
}

/// Options after every layer of a class lineage has been folded in.
#[derive(Clone, Default)]
pub struct ResolvedOptions {
    pub name: Option<Rc<str>>,
    pub render: Option<RenderFn>,
    pub props: IndexSet<Rc<str>>,
    pub components: IndexMap<Rc<str>, ComponentEntry>,
    /// Parent layers first.
    pub hooks: LifecycleHooks,
    pub removal_pass: Option<RemovalPassFn>,
}

impl ResolvedOptions {
    fn absorb(&mut self, layer: &ComponentDescriptor) {
        if layer.name.is_some() {
            self.name = layer.name.clone();
        }
        if layer.render.is_some() {
            self.render = layer.render.clone();
        }
        if layer.removal_pass.is_some() {
            self.removal_pass = layer.removal_pass.clone();
        }
        self.props.extend(layer.props.iter().cloned());
        for (name, entry) in &layer.components {
            self.components.insert(name.clone(), entry.clone());
        }
        self.hooks.extend(&layer.hooks);
    }
}

static NEXT_CLASS_ID: AtomicU64 = AtomicU64::new(1);

struct ClassInner {
    id: u64,
    parent: Option<ComponentClass>,
    layers: RefCell<Vec<Rc<ComponentDescriptor>>>,
    revision: Cell<u64>,
    cache: RefCell<Option<(u64, Rc<ResolvedOptions>)>>,
    extended: RefCell<HashMap<usize, Weak<ClassInner>>>,
}

#[derive(Clone)]
pub struct ComponentClass {
    inner: Rc<ClassInner>,
}

impl ComponentClass {
    fn from_layers(parent: Option<ComponentClass>, layers: Vec<Rc<ComponentDescriptor>>) -> Self {
        Self {
            inner: Rc::new(ClassInner {
                id: NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed),
                parent,
                layers: RefCell::new(layers),
                revision: Cell::new(0),
                cache: RefCell::new(None),
                extended: RefCell::new(HashMap::default()),
            }),
        }
    }

    /// A root class with no options of its own.
    pub fn base() -> Self {
        Self::from_layers(None, Vec::new())
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn parent(&self) -> Option<&ComponentClass> {
        self.inner.parent.as_ref()
    }

    pub fn root(&self) -> ComponentClass {
        let mut current = self.clone();
        while let Some(parent) = current.inner.parent.clone() {
            current = parent;
        }
        current
    }

    pub fn name(&self) -> Option<Rc<str>> {
        self.options().name.clone()
    }

    /// Builds a subclass from `descriptor`. Extending twice with the same
    /// descriptor returns the same class while that class is alive.
    pub fn extend(&self, descriptor: Rc<ComponentDescriptor>) -> ComponentClass {
        let identity = Rc::as_ptr(&descriptor) as usize;
        let cached = self
            .inner
            .extended
            .borrow()
            .get(&identity)
            .and_then(Weak::upgrade)
            .map(|inner| ComponentClass { inner });
        if let Some(class) = cached {
            let same_layer = class
                .inner
                .layers
                .borrow()
                .first()
                .is_some_and(|layer| Rc::ptr_eq(layer, &descriptor));
            if same_layer {
                return class;
            }
        }
        let class = Self::from_layers(Some(self.clone()), vec![descriptor]);
        self.inner
            .extended
            .borrow_mut()
            .insert(identity, Rc::downgrade(&class.inner));
        class
    }

    /// Adds an options layer on top of this class. Subclasses pick it up
    /// the next time their options are resolved.
    pub fn mixin(&self, descriptor: impl Into<Rc<ComponentDescriptor>>) {
        self.inner.layers.borrow_mut().push(descriptor.into());
        self.inner.revision.set(self.inner.revision.get() + 1);
    }

    /// Registers a component under `name` for this class and every class
    /// extended from it.
    pub fn register(&self, name: impl Into<Rc<str>>, entry: impl Into<ComponentEntry>) {
        self.mixin(ComponentDescriptor::new().component(name, entry));
    }

    fn lineage_stamp(&self) -> u64 {
        let mut stamp = 0;
        let mut current = Some(self);
        while let Some(class) = current {
            stamp += class.inner.revision.get();
            current = class.inner.parent.as_ref();
        }
        stamp
    }

    pub fn options(&self) -> Rc<ResolvedOptions> {
        let stamp = self.lineage_stamp();
        if let Some((cached_stamp, options)) = self.inner.cache.borrow().as_ref() {
            if *cached_stamp == stamp {
                return Rc::clone(options);
            }
        }
        let mut resolved = match &self.inner.parent {
            Some(parent) => (*parent.options()).clone(),
            None => ResolvedOptions::default(),
        };
        for layer in self.inner.layers.borrow().iter() {
            resolved.absorb(layer);
        }
        let resolved = Rc::new(resolved);
        *self.inner.cache.borrow_mut() = Some((stamp, Rc::clone(&resolved)));
        resolved
    }

    pub fn ptr_eq(&self, other: &ComponentClass) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Turns a definition into a class, extending `base` for inline options.
    pub fn normalize(definition: ComponentDefinition, base: &ComponentClass) -> ComponentClass {
        match definition {
            ComponentDefinition::Inline(descriptor) => base.extend(descriptor),
            ComponentDefinition::Constructed(class) => class,
        }
    }
}

impl std::fmt::Debug for ComponentClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentClass")
            .field("id", &self.inner.id)
            .field("name", &self.name())
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/component_tests.rs"]
mod tests;
