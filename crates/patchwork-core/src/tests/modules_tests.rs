use super::*;
use crate::host::{Event, MemoryHost};
use std::cell::Cell;

/// Memory host that refuses every attribute write.
struct AttrlessHost(MemoryHost);

impl Host for AttrlessHost {
    fn create_element(&mut self, tag: &str) -> NodeId {
        self.0.create_element(tag)
    }

    fn create_text(&mut self, text: &str) -> NodeId {
        self.0.create_text(text)
    }

    fn create_comment(&mut self, text: &str) -> NodeId {
        self.0.create_comment(text)
    }

    fn insert_before(
        &mut self,
        parent: NodeId,
        node: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), HostError> {
        self.0.insert_before(parent, node, reference)
    }

    fn remove_child(&mut self, parent: NodeId, node: NodeId) -> Result<(), HostError> {
        self.0.remove_child(parent, node)
    }

    fn parent_node(&self, node: NodeId) -> Option<NodeId> {
        self.0.parent_node(node)
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.0.next_sibling(node)
    }

    fn set_text(&mut self, node: NodeId, text: &str) -> Result<(), HostError> {
        self.0.set_text(node, text)
    }

    fn set_attribute(&mut self, node: NodeId, _name: &str, _value: &str) -> Result<(), HostError> {
        Err(HostError::Missing { id: node })
    }

    fn remove_attribute(&mut self, node: NodeId, _name: &str) -> Result<(), HostError> {
        Err(HostError::Missing { id: node })
    }

    fn set_class(&mut self, node: NodeId, class: &str) -> Result<(), HostError> {
        self.0.set_class(node, class)
    }

    fn set_style(
        &mut self,
        node: NodeId,
        name: &str,
        value: Option<&str>,
    ) -> Result<(), HostError> {
        self.0.set_style(node, name, value)
    }

    fn add_listener(
        &mut self,
        node: NodeId,
        event: &str,
        invoker: Invoker,
    ) -> Result<(), HostError> {
        self.0.add_listener(node, event, invoker)
    }

    fn remove_listener(&mut self, node: NodeId, event: &str) -> Result<(), HostError> {
        self.0.remove_listener(node, event)
    }
}

#[test]
fn failing_attribute_write_still_updates_other_modules() {
    let mut host = AttrlessHost(MemoryHost::new());
    let elm = host.create_element("button");
    let mut first = VNodeData::new().on("click", |_| {});
    create_data(&mut host, elm, &mut first).expect("no attributes to write");
    let original = first.invokers.get("click").cloned().expect("registered");

    let clicks = Rc::new(Cell::new(0));
    let counter = Rc::clone(&clicks);
    let mut next = VNodeData::new()
        .attr("id", "save")
        .class("primary")
        .style("color", "red")
        .on("click", move |_: &Event| counter.set(counter.get() + 1));
    host.0.reset_stats();

    let result = update_data(&mut host, elm, Some(first), &mut next);

    assert_eq!(result, Err(HostError::Missing { id: elm }));
    assert_eq!(host.0.class_name(elm), Some("primary"));
    assert_eq!(host.0.style(elm, "color"), Some("red"));
    let carried = next.invokers.get("click").expect("invoker carried over");
    assert!(carried.ptr_eq(&original));
    assert_eq!(host.0.stats().listener_writes, 0);
    assert!(host.0.dispatch(elm, "click", None));
    assert_eq!(clicks.get(), 1);
}

#[test]
fn removed_listeners_are_dropped_from_the_host() {
    let mut host = MemoryHost::new();
    let elm = host.create_element("input");
    let mut first = VNodeData::new().on("input", |_| {}).on("blur", |_| {});
    create_data(&mut host, elm, &mut first).expect("created");
    assert_eq!(host.listener_count(elm), 2);

    let mut next = VNodeData::new().on("input", |_| {});
    update_data(&mut host, elm, Some(first), &mut next).expect("updated");
    assert_eq!(host.listener_count(elm), 1);
    assert!(!host.dispatch(elm, "blur", None));
    assert_eq!(next.invokers.len(), 1);
}
