use std::rc::Rc;

use crate::async_component::resolve_async_component;
use crate::component::{ComponentClass, ComponentDefinition, ComponentEntry};
use crate::instance::{Instance, Listeners, Props};
use crate::vnode::{AsyncMeta, VNode, VNodeComponentOptions, VNodeData};

/// Handed to render functions; carries the instance being rendered.
pub struct RenderContext<'a> {
    instance: &'a Instance,
}

impl<'a> RenderContext<'a> {
    pub fn new(instance: &'a Instance) -> Self {
        Self { instance }
    }

    pub fn instance(&self) -> &Instance {
        self.instance
    }

    pub fn prop(&self, name: &str) -> Option<Rc<str>> {
        self.instance.prop(name)
    }

    pub fn slot(&self) -> Vec<VNode> {
        self.instance.slot()
    }

    /// Builds a vnode for `tag`, resolving registered component names first.
    pub fn h(&self, tag: &str, data: Option<VNodeData>, children: Vec<VNode>) -> VNode {
        let options = Rc::clone(self.instance.options());
        if let Some(entry) = options.components.get(tag) {
            return self.component_tagged(entry.clone(), Some(tag), data, children);
        }
        if options.name.as_deref() == Some(tag) {
            let own = ComponentEntry::Definition(ComponentDefinition::Constructed(
                self.instance.class().clone(),
            ));
            return self.component_tagged(own, Some(tag), data, children);
        }
        if tag.contains('-') {
            self.instance.runtime().warn(&format!(
                "Unknown custom element: <{tag}> - did you register the component correctly?"
            ));
        }
        VNode::element(tag, data, children)
    }

    pub fn element(&self, tag: &str, data: Option<VNodeData>, children: Vec<VNode>) -> VNode {
        VNode::element(tag, data, children)
    }

    pub fn text(&self, text: impl Into<Rc<str>>) -> VNode {
        VNode::text(text)
    }

    pub fn empty(&self) -> VNode {
        VNode::empty()
    }

    pub fn component(
        &self,
        entry: impl Into<ComponentEntry>,
        data: Option<VNodeData>,
        children: Vec<VNode>,
    ) -> VNode {
        self.component_tagged(entry.into(), None, data, children)
    }

    fn component_tagged(
        &self,
        entry: ComponentEntry,
        tag: Option<&str>,
        data: Option<VNodeData>,
        children: Vec<VNode>,
    ) -> VNode {
        create_component(entry, self.instance, tag.map(Rc::from), data, children)
    }
}

pub(crate) fn create_component(
    entry: ComponentEntry,
    context: &Instance,
    tag: Option<Rc<str>>,
    data: Option<VNodeData>,
    children: Vec<VNode>,
) -> VNode {
    let base = context.class().root();
    let (class, factory) = match entry {
        ComponentEntry::Definition(definition) => {
            (ComponentClass::normalize(definition, &base), None)
        }
        ComponentEntry::Async(factory) => {
            match resolve_async_component(&factory, &base, Some(context)) {
                Some(class) => (class, Some(factory)),
                None => {
                    return VNode {
                        is_comment: true,
                        async_factory: Some(factory),
                        async_meta: Some(AsyncMeta {
                            data,
                            children,
                            tag,
                        }),
                        ..VNode::default()
                    };
                }
            }
        }
    };

    let options = class.options();
    let mut data = data.unwrap_or_default();
    let mut props = Props::new();
    for name in &options.props {
        if let Some(value) = data.attrs.shift_remove(name) {
            props.insert(Rc::clone(name), value);
        }
    }
    let listeners: Listeners = std::mem::take(&mut data.on);
    let name = options
        .name
        .clone()
        .or_else(|| tag.clone())
        .unwrap_or_else(|| Rc::from("anonymous"));

    VNode {
        tag: Some(Rc::from(format!("component-{}-{}", class.id(), name))),
        data: Some(data),
        component_options: Some(VNodeComponentOptions {
            class,
            props,
            listeners,
            children,
            tag,
        }),
        async_factory: factory,
        ..VNode::default()
    }
}
