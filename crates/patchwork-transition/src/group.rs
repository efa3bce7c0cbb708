use std::cell::RefCell;
use std::rc::Rc;

use patchwork_core::collections::map::{HashMap, HashSet};
use patchwork_core::{
    ComponentDescriptor, ComponentEntry, Instance, InstanceId, Leave, LifecycleHook, NodeId,
    RenderContext, TransitionHooks, VKey, VNode, VNodeData,
};

use crate::driver::{Rect, TransitionDriver};

const DEFAULT_TAG: &str = "span";
const DEFAULT_NAME: &str = "v";

/// Props a transition group reads from its component vnode: `tag`, `name`
/// and `move-class`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupProps {
    pub tag: Rc<str>,
    pub name: Rc<str>,
    pub move_class: Rc<str>,
}

impl GroupProps {
    pub fn of(instance: &Instance) -> Self {
        let tag = instance.prop("tag").unwrap_or_else(|| Rc::from(DEFAULT_TAG));
        let name = instance
            .prop("name")
            .unwrap_or_else(|| Rc::from(DEFAULT_NAME));
        let move_class = instance
            .prop("move-class")
            .unwrap_or_else(|| Rc::from(format!("{name}-move")));
        Self {
            tag,
            name,
            move_class,
        }
    }
}

struct GroupTransition {
    driver: Rc<dyn TransitionDriver>,
    name: Rc<str>,
}

impl TransitionHooks for GroupTransition {
    fn enter(&self, elm: NodeId) {
        self.driver.enter(elm, &self.name);
    }

    fn leave(&self, elm: NodeId) -> Leave {
        self.driver.leave(elm, &self.name)
    }
}

#[derive(Default)]
struct GroupState {
    /// Old children that survive the update, wrapped for the removal pass.
    kept: Option<VNode>,
    /// Old children with the position they had before the update.
    previous: Vec<(NodeId, Option<Rect>)>,
}

struct Shared {
    driver: Rc<dyn TransitionDriver>,
    states: RefCell<HashMap<InstanceId, GroupState>>,
}

/// Builds `<transition-group>` component definitions around a driver.
#[derive(Clone)]
pub struct TransitionGroup {
    driver: Rc<dyn TransitionDriver>,
}

impl TransitionGroup {
    pub fn new(driver: Rc<dyn TransitionDriver>) -> Self {
        Self { driver }
    }

    pub fn into_descriptor(self) -> ComponentDescriptor {
        let shared = Rc::new(Shared {
            driver: self.driver,
            states: RefCell::new(HashMap::default()),
        });
        let render_state = Rc::clone(&shared);
        let removal_state = Rc::clone(&shared);
        let updated_state = Rc::clone(&shared);
        let destroyed_state = shared;
        ComponentDescriptor::named("transition-group")
            .prop("tag")
            .prop("name")
            .prop("move-class")
            .render(move |cx| render(&render_state, cx))
            .removal_pass(move |instance| {
                removal_state
                    .states
                    .borrow_mut()
                    .get_mut(&instance.id())
                    .and_then(|state| state.kept.take())
            })
            .hook(LifecycleHook::Updated, move |instance| {
                apply_moves(&updated_state, instance)
            })
            .hook(LifecycleHook::Destroyed, move |instance| {
                destroyed_state.states.borrow_mut().remove(&instance.id());
            })
    }
}

impl From<TransitionGroup> for ComponentDescriptor {
    fn from(group: TransitionGroup) -> Self {
        group.into_descriptor()
    }
}

impl From<TransitionGroup> for ComponentEntry {
    fn from(group: TransitionGroup) -> Self {
        group.into_descriptor().into()
    }
}

fn set_transition(child: &mut VNode, hooks: &Rc<dyn TransitionHooks>) {
    child
        .data
        .get_or_insert_with(VNodeData::new)
        .transition = Some(Rc::clone(hooks));
}

fn child_name(child: &VNode) -> Rc<str> {
    match &child.component_options {
        Some(options) => options
            .class
            .name()
            .or_else(|| options.tag.clone())
            .unwrap_or_else(|| Rc::from("")),
        None => child.tag.clone().unwrap_or_else(|| Rc::from("")),
    }
}

fn render(shared: &Shared, cx: &mut RenderContext<'_>) -> VNode {
    let instance = cx.instance().clone();
    let props = GroupProps::of(&instance);
    let hooks: Rc<dyn TransitionHooks> = Rc::new(GroupTransition {
        driver: Rc::clone(&shared.driver),
        name: Rc::clone(&props.name),
    });

    let mut children = Vec::new();
    let mut keys: HashSet<VKey> = HashSet::default();
    for mut child in cx.slot() {
        if child.tag.is_none() {
            continue;
        }
        let Some(key) = child.key.clone() else {
            instance.runtime().warn(&format!(
                "<transition-group> children must be keyed: <{}>",
                child_name(&child)
            ));
            continue;
        };
        keys.insert(key);
        set_transition(&mut child, &hooks);
        children.push(child);
    }

    let mut state = GroupState::default();
    if let Some(tree) = instance.current_tree() {
        let mut kept = Vec::new();
        for mut child in tree.children {
            set_transition(&mut child, &hooks);
            if let Some(elm) = child.elm() {
                state.previous.push((elm, shared.driver.rect(elm)));
            }
            if child.key.as_ref().is_some_and(|key| keys.contains(key)) {
                kept.push(child);
            }
        }
        state.kept = Some(VNode::element(Rc::clone(&props.tag), None, kept));
    }
    shared.states.borrow_mut().insert(instance.id(), state);

    VNode::element(props.tag, None, children)
}

fn apply_moves(shared: &Shared, instance: &Instance) {
    let previous = shared
        .states
        .borrow_mut()
        .get_mut(&instance.id())
        .map(|state| std::mem::take(&mut state.previous))
        .unwrap_or_default();
    let Some(&(first, _)) = previous.first() else {
        return;
    };
    let props = GroupProps::of(instance);
    let driver = &shared.driver;
    if !driver.has_move_transition(first, &props.move_class) {
        return;
    }

    for (elm, _) in &previous {
        driver.settle_pending(*elm);
    }
    let mut moved = Vec::new();
    for (elm, old) in previous {
        let (Some(old), Some(new)) = (old, driver.rect(elm)) else {
            continue;
        };
        let (dx, dy) = (old.x - new.x, old.y - new.y);
        if dx != 0.0 || dy != 0.0 {
            driver.translate(elm, dx, dy);
            moved.push(elm);
        }
    }
    log::trace!(
        "transition group {} moving {} child(ren)",
        instance.id(),
        moved.len()
    );
    for elm in moved {
        driver.start_move(elm, &props.move_class);
    }
}
