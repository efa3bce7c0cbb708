use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::NodeId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub name: Rc<str>,
    pub detail: Option<Rc<str>>,
}

impl Event {
    pub fn new(name: impl Into<Rc<str>>) -> Self {
        Self {
            name: name.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<Rc<str>>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

pub type Handler = Rc<dyn Fn(&Event)>;

/// Stable listener registered with the host once per node and event.
///
/// Re-renders swap the handler it forwards to instead of re-registering.
#[derive(Clone)]
pub struct Invoker(Rc<RefCell<Handler>>);

impl Invoker {
    pub fn new(handler: Handler) -> Self {
        Self(Rc::new(RefCell::new(handler)))
    }

    pub fn invoke(&self, event: &Event) {
        let handler = self.0.borrow().clone();
        handler(event);
    }

    pub fn replace(&self, handler: Handler) {
        *self.0.borrow_mut() = handler;
    }

    pub fn ptr_eq(&self, other: &Invoker) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Invoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Invoker")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    Missing { id: NodeId },
    NotAChild { parent: NodeId, child: NodeId },
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::Missing { id } => write!(f, "node {id} missing"),
            HostError::NotAChild { parent, child } => {
                write!(f, "node {child} is not a child of node {parent}")
            }
        }
    }
}

impl std::error::Error for HostError {}

/// Platform node operations the patcher is written against.
pub trait Host {
    fn create_element(&mut self, tag: &str) -> NodeId;
    fn create_text(&mut self, text: &str) -> NodeId;
    fn create_comment(&mut self, text: &str) -> NodeId;

    /// Inserts `node` under `parent` before `reference`, appending when
    /// `reference` is `None`. A node that already has a parent is moved.
    fn insert_before(
        &mut self,
        parent: NodeId,
        node: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), HostError>;
    fn remove_child(&mut self, parent: NodeId, node: NodeId) -> Result<(), HostError>;
    fn parent_node(&self, node: NodeId) -> Option<NodeId>;
    fn next_sibling(&self, node: NodeId) -> Option<NodeId>;

    fn set_text(&mut self, node: NodeId, text: &str) -> Result<(), HostError>;
    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), HostError>;
    fn remove_attribute(&mut self, node: NodeId, name: &str) -> Result<(), HostError>;
    fn set_class(&mut self, node: NodeId, class: &str) -> Result<(), HostError>;
    /// `None` clears the property.
    fn set_style(&mut self, node: NodeId, name: &str, value: Option<&str>)
        -> Result<(), HostError>;
    fn add_listener(&mut self, node: NodeId, event: &str, invoker: Invoker)
        -> Result<(), HostError>;
    fn remove_listener(&mut self, node: NodeId, event: &str) -> Result<(), HostError>;
}

impl<H: Host> Host for Rc<RefCell<H>> {
    fn create_element(&mut self, tag: &str) -> NodeId {
        self.borrow_mut().create_element(tag)
    }

    fn create_text(&mut self, text: &str) -> NodeId {
        self.borrow_mut().create_text(text)
    }

    fn create_comment(&mut self, text: &str) -> NodeId {
        self.borrow_mut().create_comment(text)
    }

    fn insert_before(
        &mut self,
        parent: NodeId,
        node: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), HostError> {
        self.borrow_mut().insert_before(parent, node, reference)
    }

    fn remove_child(&mut self, parent: NodeId, node: NodeId) -> Result<(), HostError> {
        self.borrow_mut().remove_child(parent, node)
    }

    fn parent_node(&self, node: NodeId) -> Option<NodeId> {
        self.borrow().parent_node(node)
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.borrow().next_sibling(node)
    }

    fn set_text(&mut self, node: NodeId, text: &str) -> Result<(), HostError> {
        self.borrow_mut().set_text(node, text)
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), HostError> {
        self.borrow_mut().set_attribute(node, name, value)
    }

    fn remove_attribute(&mut self, node: NodeId, name: &str) -> Result<(), HostError> {
        self.borrow_mut().remove_attribute(node, name)
    }

    fn set_class(&mut self, node: NodeId, class: &str) -> Result<(), HostError> {
        self.borrow_mut().set_class(node, class)
    }

    fn set_style(
        &mut self,
        node: NodeId,
        name: &str,
        value: Option<&str>,
    ) -> Result<(), HostError> {
        self.borrow_mut().set_style(node, name, value)
    }

    fn add_listener(
        &mut self,
        node: NodeId,
        event: &str,
        invoker: Invoker,
    ) -> Result<(), HostError> {
        self.borrow_mut().add_listener(node, event, invoker)
    }

    fn remove_listener(&mut self, node: NodeId, event: &str) -> Result<(), HostError> {
        self.borrow_mut().remove_listener(node, event)
    }
}

/// Counters of host mutations, for asserting how much work a patch did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostStats {
    pub created: usize,
    pub inserted: usize,
    pub moved: usize,
    pub removed: usize,
    pub attribute_writes: usize,
    pub listener_writes: usize,
    pub text_writes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum MemoryNodeKind {
    Element(String),
    Text,
    Comment,
}

#[derive(Debug)]
struct MemoryNode {
    kind: MemoryNodeKind,
    text: String,
    attrs: IndexMap<String, String>,
    class: String,
    style: IndexMap<String, String>,
    listeners: IndexMap<String, Invoker>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl MemoryNode {
    fn new(kind: MemoryNodeKind, text: &str) -> Self {
        Self {
            kind,
            text: text.to_string(),
            attrs: IndexMap::new(),
            class: String::new(),
            style: IndexMap::new(),
            listeners: IndexMap::new(),
            children: Vec::new(),
            parent: None,
        }
    }
}

/// In-memory host used by tests, benches and the demo app.
///
/// Nodes are never freed; a removed node is only detached, the same way a
/// document keeps nodes alive while something still refers to them.
#[derive(Debug, Default)]
pub struct MemoryHost {
    nodes: Vec<MemoryNode>,
    stats: HostStats,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, node: MemoryNode) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(node);
        self.stats.created += 1;
        id
    }

    fn node(&self, id: NodeId) -> Result<&MemoryNode, HostError> {
        self.nodes.get(id).ok_or(HostError::Missing { id })
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut MemoryNode, HostError> {
        self.nodes.get_mut(id).ok_or(HostError::Missing { id })
    }

    fn detach(&mut self, node: NodeId) -> Result<bool, HostError> {
        let Some(parent) = self.node(node)?.parent else {
            return Ok(false);
        };
        self.node_mut(parent)?.children.retain(|child| *child != node);
        self.node_mut(node)?.parent = None;
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn stats(&self) -> HostStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = HostStats::default();
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(node)
            .map(|entry| entry.children.clone())
            .unwrap_or_default()
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        match &self.nodes.get(node)?.kind {
            MemoryNodeKind::Element(tag) => Some(tag),
            _ => None,
        }
    }

    pub fn text(&self, node: NodeId) -> Option<&str> {
        let entry = self.nodes.get(node)?;
        match entry.kind {
            MemoryNodeKind::Element(_) => None,
            _ => Some(&entry.text),
        }
    }

    pub fn is_comment(&self, node: NodeId) -> bool {
        self.nodes
            .get(node)
            .is_some_and(|entry| entry.kind == MemoryNodeKind::Comment)
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.nodes.get(node)?.attrs.get(name).map(String::as_str)
    }

    pub fn class_name(&self, node: NodeId) -> Option<&str> {
        let entry = self.nodes.get(node)?;
        (!entry.class.is_empty()).then_some(entry.class.as_str())
    }

    pub fn style(&self, node: NodeId, name: &str) -> Option<&str> {
        self.nodes.get(node)?.style.get(name).map(String::as_str)
    }

    pub fn listener_count(&self, node: NodeId) -> usize {
        self.nodes
            .get(node)
            .map(|entry| entry.listeners.len())
            .unwrap_or(0)
    }

    /// Fires `event` at `node`. Returns whether a listener was registered.
    pub fn dispatch(&self, node: NodeId, event: &str, detail: Option<&str>) -> bool {
        let invoker = self
            .nodes
            .get(node)
            .and_then(|entry| entry.listeners.get(event).cloned());
        match invoker {
            Some(invoker) => {
                let mut payload = Event::new(event);
                if let Some(detail) = detail {
                    payload = payload.with_detail(detail);
                }
                invoker.invoke(&payload);
                true
            }
            None => false,
        }
    }

    pub fn render_html(&self, node: NodeId) -> String {
        let mut output = String::new();
        self.write_html(&mut output, node);
        output
    }

    fn write_html(&self, output: &mut String, id: NodeId) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        match &node.kind {
            MemoryNodeKind::Text => output.push_str(&node.text),
            MemoryNodeKind::Comment => {
                output.push_str("<!--");
                output.push_str(&node.text);
                output.push_str("-->");
            }
            MemoryNodeKind::Element(tag) => {
                output.push('<');
                output.push_str(tag);
                if !node.class.is_empty() {
                    output.push_str(&format!(" class=\"{}\"", node.class));
                }
                for (name, value) in &node.attrs {
                    output.push_str(&format!(" {name}=\"{value}\""));
                }
                if !node.style.is_empty() {
                    let style: Vec<String> = node
                        .style
                        .iter()
                        .map(|(name, value)| format!("{name}: {value}"))
                        .collect();
                    output.push_str(&format!(" style=\"{}\"", style.join("; ")));
                }
                output.push('>');
                for child in &node.children {
                    self.write_html(output, *child);
                }
                output.push_str("</");
                output.push_str(tag);
                output.push('>');
            }
        }
    }

    pub fn dump_tree(&self, root: Option<NodeId>) -> String {
        let mut output = String::new();
        if let Some(root_id) = root {
            self.dump_node(&mut output, root_id, 0);
        } else {
            output.push_str("(no root)\n");
        }
        output
    }

    fn dump_node(&self, output: &mut String, id: NodeId, depth: usize) {
        let indent = "  ".repeat(depth);
        match self.nodes.get(id) {
            Some(node) => {
                let label = match &node.kind {
                    MemoryNodeKind::Element(tag) => format!("<{tag}>"),
                    MemoryNodeKind::Text => format!("{:?}", node.text),
                    MemoryNodeKind::Comment => format!("<!--{}-->", node.text),
                };
                output.push_str(&format!("{indent}[{id}] {label}\n"));
                for child in &node.children {
                    self.dump_node(output, *child, depth + 1);
                }
            }
            None => output.push_str(&format!("{indent}[{id}] (missing)\n")),
        }
    }
}

impl Host for MemoryHost {
    fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(MemoryNode::new(MemoryNodeKind::Element(tag.to_string()), ""))
    }

    fn create_text(&mut self, text: &str) -> NodeId {
        self.push(MemoryNode::new(MemoryNodeKind::Text, text))
    }

    fn create_comment(&mut self, text: &str) -> NodeId {
        self.push(MemoryNode::new(MemoryNodeKind::Comment, text))
    }

    fn insert_before(
        &mut self,
        parent: NodeId,
        node: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), HostError> {
        self.node(parent)?;
        self.node(node)?;
        if reference == Some(node) {
            return Ok(());
        }
        if let Some(reference) = reference {
            if self.node(reference)?.parent != Some(parent) {
                return Err(HostError::NotAChild {
                    parent,
                    child: reference,
                });
            }
        }
        if self.detach(node)? {
            self.stats.moved += 1;
        } else {
            self.stats.inserted += 1;
        }
        let parent_node = self.node_mut(parent)?;
        let index = reference
            .and_then(|reference| parent_node.children.iter().position(|c| *c == reference))
            .unwrap_or(parent_node.children.len());
        parent_node.children.insert(index, node);
        self.node_mut(node)?.parent = Some(parent);
        Ok(())
    }

    fn remove_child(&mut self, parent: NodeId, node: NodeId) -> Result<(), HostError> {
        if self.node(node)?.parent != Some(parent) {
            return Err(HostError::NotAChild {
                parent,
                child: node,
            });
        }
        self.detach(node)?;
        self.stats.removed += 1;
        Ok(())
    }

    fn parent_node(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node)?.parent
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.nodes.get(node)?.parent?;
        let siblings = &self.nodes.get(parent)?.children;
        let index = siblings.iter().position(|child| *child == node)?;
        siblings.get(index + 1).copied()
    }

    fn set_text(&mut self, node: NodeId, text: &str) -> Result<(), HostError> {
        self.node_mut(node)?.text = text.to_string();
        self.stats.text_writes += 1;
        Ok(())
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), HostError> {
        self.node_mut(node)?
            .attrs
            .insert(name.to_string(), value.to_string());
        self.stats.attribute_writes += 1;
        Ok(())
    }

    fn remove_attribute(&mut self, node: NodeId, name: &str) -> Result<(), HostError> {
        self.node_mut(node)?.attrs.shift_remove(name);
        self.stats.attribute_writes += 1;
        Ok(())
    }

    fn set_class(&mut self, node: NodeId, class: &str) -> Result<(), HostError> {
        self.node_mut(node)?.class = class.to_string();
        self.stats.attribute_writes += 1;
        Ok(())
    }

    fn set_style(
        &mut self,
        node: NodeId,
        name: &str,
        value: Option<&str>,
    ) -> Result<(), HostError> {
        let entry = self.node_mut(node)?;
        match value {
            Some(value) => {
                entry.style.insert(name.to_string(), value.to_string());
            }
            None => {
                entry.style.shift_remove(name);
            }
        }
        self.stats.attribute_writes += 1;
        Ok(())
    }

    fn add_listener(
        &mut self,
        node: NodeId,
        event: &str,
        invoker: Invoker,
    ) -> Result<(), HostError> {
        self.node_mut(node)?
            .listeners
            .insert(event.to_string(), invoker);
        self.stats.listener_writes += 1;
        Ok(())
    }

    fn remove_listener(&mut self, node: NodeId, event: &str) -> Result<(), HostError> {
        self.node_mut(node)?.listeners.shift_remove(event);
        self.stats.listener_writes += 1;
        Ok(())
    }
}
