//! Data modules: attributes, class, style and listeners.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::host::{Host, HostError, Invoker};
use crate::vnode::VNodeData;
use crate::NodeId;

pub(crate) fn create_data(
    host: &mut dyn Host,
    elm: NodeId,
    data: &mut VNodeData,
) -> Result<(), HostError> {
    update_data(host, elm, None, data)
}

/// Applies the difference between `old` and `new` to `elm`, carrying
/// listener invokers from the old data over to the new one.
///
/// A failing module does not stop the others; the first error is returned
/// once every module has run.
pub(crate) fn update_data(
    host: &mut dyn Host,
    elm: NodeId,
    old: Option<VNodeData>,
    new: &mut VNodeData,
) -> Result<(), HostError> {
    let mut old = old.unwrap_or_default();
    let attrs = update_attrs(host, elm, &old.attrs, &new.attrs);
    let class = update_class(host, elm, &old.class, &new.class);
    let style = update_style(host, elm, &old.style, &new.style);
    let (invokers, listeners) =
        update_listeners(host, elm, std::mem::take(&mut old.invokers), new);
    new.invokers = invokers;
    attrs.and(class).and(style).and(listeners)
}

fn update_attrs(
    host: &mut dyn Host,
    elm: NodeId,
    old: &IndexMap<Rc<str>, Rc<str>>,
    new: &IndexMap<Rc<str>, Rc<str>>,
) -> Result<(), HostError> {
    for (name, value) in new {
        if old.get(name) != Some(value) {
            host.set_attribute(elm, name, value)?;
        }
    }
    for name in old.keys() {
        if !new.contains_key(name) {
            host.remove_attribute(elm, name)?;
        }
    }
    Ok(())
}

fn update_class(
    host: &mut dyn Host,
    elm: NodeId,
    old: &[Rc<str>],
    new: &[Rc<str>],
) -> Result<(), HostError> {
    let joined = join_class(new);
    if join_class(old) != joined {
        host.set_class(elm, &joined)?;
    }
    Ok(())
}

fn join_class(names: &[Rc<str>]) -> String {
    names
        .iter()
        .filter(|name| !name.is_empty())
        .map(|name| name.as_ref())
        .collect::<Vec<_>>()
        .join(" ")
}

fn update_style(
    host: &mut dyn Host,
    elm: NodeId,
    old: &IndexMap<Rc<str>, Rc<str>>,
    new: &IndexMap<Rc<str>, Rc<str>>,
) -> Result<(), HostError> {
    for name in old.keys() {
        if !new.contains_key(name) {
            host.set_style(elm, name, None)?;
        }
    }
    for (name, value) in new {
        if old.get(name) != Some(value) {
            host.set_style(elm, name, Some(&**value))?;
        }
    }
    Ok(())
}

/// Returns the invokers now registered on `elm`, which always reflect what
/// the host accepted, alongside the first host error.
fn update_listeners(
    host: &mut dyn Host,
    elm: NodeId,
    mut old: IndexMap<Rc<str>, Invoker>,
    new: &VNodeData,
) -> (IndexMap<Rc<str>, Invoker>, Result<(), HostError>) {
    let mut invokers = IndexMap::with_capacity(new.on.len());
    let mut outcome = Ok(());
    for (event, handler) in &new.on {
        let invoker = match old.shift_remove(event) {
            Some(invoker) => {
                // Same registration, new target.
                invoker.replace(Rc::clone(handler));
                invoker
            }
            None => {
                let invoker = Invoker::new(Rc::clone(handler));
                if let Err(err) = host.add_listener(elm, event, invoker.clone()) {
                    outcome = outcome.and(Err(err));
                    continue;
                }
                invoker
            }
        };
        invokers.insert(Rc::clone(event), invoker);
    }
    for event in old.keys() {
        if let Err(err) = host.remove_listener(elm, event) {
            outcome = outcome.and(Err(err));
        }
    }
    (invokers, outcome)
}

#[cfg(test)]
#[path = "tests/modules_tests.rs"]
mod tests;
