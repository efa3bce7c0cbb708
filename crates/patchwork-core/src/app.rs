use std::sync::Arc;
use std::time::Duration;

use crate::collections::map::HashMap;
use crate::component::{ComponentClass, ComponentDefinition};
use crate::config::Config;
use crate::host::Host;
use crate::instance::{Instance, InstanceId, InstanceInit};
use crate::patch::{run_inserted, InsertedEntry};
use crate::runtime::{DefaultScheduler, Runtime, RuntimeHandle};
use crate::NodeId;

/// Updates of a single instance allowed in one flush before it is assumed
/// to be re-queueing itself forever.
pub const MAX_UPDATE_COUNT: usize = 100;

/// Owns a host, the runtime and the base class, and drives a root instance.
pub struct App<H: Host> {
    host: H,
    runtime: Runtime,
    base: ComponentClass,
    root: Option<Instance>,
    container: Option<NodeId>,
}

impl<H: Host> App<H> {
    pub fn new(host: H) -> Self {
        Self::with_runtime(host, Runtime::default())
    }

    pub fn with_config(host: H, config: Config) -> Self {
        Self::with_runtime(host, Runtime::with_config(Arc::new(DefaultScheduler), config))
    }

    pub fn with_runtime(host: H, runtime: Runtime) -> Self {
        Self {
            host,
            runtime,
            base: ComponentClass::base(),
            root: None,
            container: None,
        }
    }

    /// Class every inline definition mounted through this app extends.
    pub fn base(&self) -> &ComponentClass {
        &self.base
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn runtime_handle(&self) -> RuntimeHandle {
        self.runtime.handle()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn root(&self) -> Option<&Instance> {
        self.root.as_ref()
    }

    pub fn container(&self) -> Option<NodeId> {
        self.container
    }

    pub fn mount(
        &mut self,
        definition: impl Into<ComponentDefinition>,
        container: NodeId,
    ) -> Instance {
        self.mount_with(definition, container, InstanceInit::default())
    }

    /// Mounts a root instance at the end of `container`, replacing any
    /// previously mounted root.
    pub fn mount_with(
        &mut self,
        definition: impl Into<ComponentDefinition>,
        container: NodeId,
        init: InstanceInit,
    ) -> Instance {
        self.unmount();
        let class = ComponentClass::normalize(definition.into(), &self.base);
        let instance = Instance::new(class, init, self.runtime.handle());
        let mut entries = instance.mount_into(&mut self.host, Some(container), None);
        entries.push(InsertedEntry::Component(instance.clone()));
        run_inserted(entries);
        log::debug!("mounted {:?} into node {container}", instance);
        self.root = Some(instance.clone());
        self.container = Some(container);
        instance
    }

    /// Runs woken tasks and re-renders dirty instances, parents first,
    /// until nothing is left. Returns how many updates ran.
    pub fn flush(&mut self) -> usize {
        let handle = self.runtime.handle();
        let mut counts: HashMap<InstanceId, usize> = HashMap::default();
        let mut updated = 0;
        handle.run_tasks();
        loop {
            let next = handle.pop_dirty().or_else(|| {
                handle.run_tasks();
                handle.pop_dirty()
            });
            let Some((id, weak)) = next else {
                break;
            };
            let Some(instance) = weak.upgrade() else {
                continue;
            };
            let count = counts.entry(id).or_insert(0);
            *count += 1;
            if *count > MAX_UPDATE_COUNT {
                if *count == MAX_UPDATE_COUNT + 1 {
                    let name = instance.name().unwrap_or_else(|| "anonymous".into());
                    handle.warn(&format!(
                        "You may have an infinite update loop in component <{name}>."
                    ));
                }
                continue;
            }
            if instance.update(&mut self.host) {
                updated += 1;
            }
        }
        self.runtime.set_needs_flush(false);
        updated
    }

    /// Advances virtual time, firing due timers, then flushes.
    pub fn advance_by(&mut self, delta: Duration) -> usize {
        self.runtime.handle().advance_by(delta);
        self.flush()
    }

    pub fn advance_to(&mut self, target: Duration) -> usize {
        self.runtime.handle().advance_to(target);
        self.flush()
    }

    pub fn should_flush(&self) -> bool {
        self.runtime.needs_flush()
    }

    /// Removes a node whose leave transition was deferred. Returns false if
    /// no leave was pending for `elm`.
    pub fn complete_leave(&mut self, elm: NodeId) -> bool {
        if !self.runtime.handle().take_deferred_leave(elm) {
            return false;
        }
        if let Some(parent) = self.host.parent_node(elm) {
            if let Err(err) = self.host.remove_child(parent, elm) {
                self.runtime
                    .handle()
                    .warn(&format!("host operation failed: {err}"));
            }
        }
        true
    }

    /// Destroys the root instance and detaches its node.
    pub fn unmount(&mut self) {
        let Some(root) = self.root.take() else {
            return;
        };
        let el = root.el();
        root.destroy(&mut self.host);
        if let (Some(el), Some(container)) = (el, self.container.take()) {
            if self.host.parent_node(el) == Some(container) {
                if let Err(err) = self.host.remove_child(container, el) {
                    self.runtime
                        .handle()
                        .warn(&format!("host operation failed: {err}"));
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/app_tests.rs"]
mod tests;
