//! Async component factories.
//!
//! A factory wraps a loader that runs at most once, the first time an
//! instance renders it. Every instance that renders the factory while it is
//! pending becomes an owner and is re-rendered when the load settles. The
//! record moves forward only: pending, optionally loading, then resolved or
//! error.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use indexmap::IndexMap;

use crate::component::{ComponentClass, ComponentDefinition, ComponentDescriptor};
use crate::instance::{HookHandle, Instance, InstanceId, LifecycleHook};
use crate::runtime::{LocalBoxFuture, RuntimeHandle};
use crate::timer::TimerRegistration;

/// What a loader hands back on success.
#[derive(Clone)]
pub enum LoadedComponent {
    Definition(ComponentDefinition),
    /// A module whose default export is the component.
    Module { default: ComponentDefinition },
}

impl From<ComponentDefinition> for LoadedComponent {
    fn from(definition: ComponentDefinition) -> Self {
        LoadedComponent::Definition(definition)
    }
}

impl From<ComponentDescriptor> for LoadedComponent {
    fn from(descriptor: ComponentDescriptor) -> Self {
        LoadedComponent::Definition(descriptor.into())
    }
}

impl From<ComponentClass> for LoadedComponent {
    fn from(class: ComponentClass) -> Self {
        LoadedComponent::Definition(class.into())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadError {
    pub reason: Option<String>,
}

impl LoadError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "async component failed to load: {reason}"),
            None => f.write_str("async component failed to load"),
        }
    }
}

impl std::error::Error for LoadError {}

pub type LoadFuture = LocalBoxFuture<Result<LoadedComponent, LoadError>>;

/// Loader result with presentation states for the wait.
#[derive(Default)]
pub struct AsyncOptions {
    pub component: Option<LoadFuture>,
    pub loading: Option<ComponentDefinition>,
    pub error: Option<ComponentDefinition>,
    /// Wait before the loading view shows. Zero shows it right away.
    pub delay: Option<Duration>,
    pub timeout: Option<Duration>,
}

impl AsyncOptions {
    pub fn new(
        component: impl std::future::Future<Output = Result<LoadedComponent, LoadError>> + 'static,
    ) -> Self {
        Self {
            component: Some(Box::pin(component)),
            ..Self::default()
        }
    }

    pub fn loading(mut self, definition: impl Into<ComponentDefinition>) -> Self {
        self.loading = Some(definition.into());
        self
    }

    pub fn error(mut self, definition: impl Into<ComponentDefinition>) -> Self {
        self.error = Some(definition.into());
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

pub enum LoaderOutput {
    /// The loader keeps the [`Settle`] handle and calls it later (or already
    /// did).
    Pending,
    Future(LoadFuture),
    Advanced(AsyncOptions),
}

type Loader = Box<dyn FnOnce(Settle) -> LoaderOutput>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AsyncState {
    Pending,
    Loading,
    Resolved,
    Error,
}

struct OwnerEntry {
    instance: Instance,
    teardown: HookHandle,
}

#[derive(Default)]
struct FactoryState {
    started: bool,
    resolved: Option<ComponentClass>,
    error: bool,
    loading: bool,
    owners: IndexMap<InstanceId, OwnerEntry>,
    error_comp: Option<ComponentClass>,
    loading_comp: Option<ComponentClass>,
    timer_loading: Option<TimerRegistration>,
    timer_timeout: Option<TimerRegistration>,
    sync: bool,
    runtime: Option<RuntimeHandle>,
}

struct FactoryRecord {
    id: u64,
    name: Rc<str>,
    loader: RefCell<Option<Loader>>,
    state: RefCell<FactoryState>,
}

static NEXT_FACTORY_ID: AtomicU64 = AtomicU64::new(1);

/// Shared handle to one async component definition.
#[derive(Clone)]
pub struct AsyncFactory {
    record: Rc<FactoryRecord>,
}

impl AsyncFactory {
    pub fn new(loader: impl FnOnce(Settle) -> LoaderOutput + 'static) -> Self {
        Self::named("anonymous", loader)
    }

    pub fn named(
        name: impl Into<Rc<str>>,
        loader: impl FnOnce(Settle) -> LoaderOutput + 'static,
    ) -> Self {
        Self {
            record: Rc::new(FactoryRecord {
                id: NEXT_FACTORY_ID.fetch_add(1, Ordering::Relaxed),
                name: name.into(),
                loader: RefCell::new(Some(Box::new(loader))),
                state: RefCell::new(FactoryState::default()),
            }),
        }
    }

    /// A factory whose loader is a single future.
    pub fn from_future(
        name: impl Into<Rc<str>>,
        future: impl std::future::Future<Output = Result<LoadedComponent, LoadError>> + 'static,
    ) -> Self {
        Self::named(name, move |_| LoaderOutput::Future(Box::pin(future)))
    }

    pub fn id(&self) -> u64 {
        self.record.id
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn state(&self) -> AsyncState {
        let state = self.record.state.borrow();
        if state.resolved.is_some() {
            AsyncState::Resolved
        } else if state.error {
            AsyncState::Error
        } else if state.loading {
            AsyncState::Loading
        } else {
            AsyncState::Pending
        }
    }

    pub fn resolved(&self) -> Option<ComponentClass> {
        self.record.state.borrow().resolved.clone()
    }

    /// Whether the loader has been invoked.
    pub fn started(&self) -> bool {
        self.record.state.borrow().started
    }

    pub fn owner_count(&self) -> usize {
        self.record.state.borrow().owners.len()
    }

    pub fn has_pending_timers(&self) -> bool {
        let state = self.record.state.borrow();
        let pending = |timer: &Option<TimerRegistration>| {
            timer.as_ref().is_some_and(TimerRegistration::is_pending)
        };
        pending(&state.timer_loading) || pending(&state.timer_timeout)
    }

    pub fn ptr_eq(&self, other: &AsyncFactory) -> bool {
        Rc::ptr_eq(&self.record, &other.record)
    }
}

impl fmt::Debug for AsyncFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncFactory")
            .field("id", &self.record.id)
            .field("name", &self.record.name)
            .field("state", &self.state())
            .finish()
    }
}

/// Resolve and reject callbacks handed to a loader. Clones share one
/// guard: whichever settles first wins and later calls do nothing.
#[derive(Clone)]
pub struct Settle {
    record: Weak<FactoryRecord>,
    base: ComponentClass,
    settled: Rc<Cell<bool>>,
}

impl Settle {
    pub fn is_settled(&self) -> bool {
        self.settled.get()
    }

    pub fn resolve(&self, loaded: impl Into<LoadedComponent>) {
        if self.settled.replace(true) {
            return;
        }
        let Some(record) = self.record.upgrade() else {
            return;
        };
        let class = ensure_class(loaded.into(), &self.base);
        let sync = {
            let mut state = record.state.borrow_mut();
            state.resolved = Some(class);
            state.sync
        };
        if sync {
            // Resolved inside the loader call: the caller renders the class
            // directly.
            release_owners(&record);
        } else {
            force_render(&record, true);
        }
    }

    pub fn reject(&self, error: LoadError) {
        if self.settled.replace(true) {
            return;
        }
        let Some(record) = self.record.upgrade() else {
            return;
        };
        let mut message = format!("Failed to resolve async component: {}", record.name);
        if let Some(reason) = &error.reason {
            message.push_str(&format!("\nReason: {reason}"));
        }
        let (runtime, has_error_view) = {
            let mut state = record.state.borrow_mut();
            state.error = true;
            (state.runtime.clone(), state.error_comp.is_some())
        };
        match runtime {
            Some(runtime) => runtime.warn(&message),
            None => log::warn!("[patchwork] {message}"),
        }
        if has_error_view {
            force_render(&record, true);
        } else {
            release_owners(&record);
        }
    }
}

fn ensure_class(loaded: LoadedComponent, base: &ComponentClass) -> ComponentClass {
    let definition = match loaded {
        LoadedComponent::Definition(definition) => definition,
        LoadedComponent::Module { default } => default,
    };
    ComponentClass::normalize(definition, base)
}

fn force_render(record: &Rc<FactoryRecord>, completed: bool) {
    let owners: Vec<Instance> = record
        .state
        .borrow()
        .owners
        .values()
        .map(|entry| entry.instance.clone())
        .collect();
    log::trace!(
        "async component {} re-rendering {} owner(s)",
        record.name,
        owners.len()
    );
    for owner in &owners {
        owner.force_update();
    }
    if completed {
        release_owners(record);
    }
}

fn release_owners(record: &Rc<FactoryRecord>) {
    let (owners, timers) = {
        let mut state = record.state.borrow_mut();
        let owners: Vec<OwnerEntry> = state.owners.drain(..).map(|(_, entry)| entry).collect();
        let timers = (state.timer_loading.take(), state.timer_timeout.take());
        (owners, timers)
    };
    drop(timers);
    for entry in owners {
        entry.instance.off_hook(entry.teardown);
    }
}

fn attach_owner(record: &Rc<FactoryRecord>, owner: &Instance) {
    let id = owner.id();
    if record.state.borrow().owners.contains_key(&id) {
        return;
    }
    let weak = Rc::downgrade(record);
    let teardown = owner.on_hook(LifecycleHook::Destroyed, move |_| {
        if let Some(record) = weak.upgrade() {
            detach_owner(&record, id);
        }
    });
    record.state.borrow_mut().owners.insert(
        id,
        OwnerEntry {
            instance: owner.clone(),
            teardown,
        },
    );
}

fn detach_owner(record: &Rc<FactoryRecord>, id: InstanceId) {
    let timers = {
        let mut state = record.state.borrow_mut();
        if state.owners.shift_remove(&id).is_none() || !state.owners.is_empty() {
            return;
        }
        // Nobody is waiting any more.
        (state.timer_loading.take(), state.timer_timeout.take())
    };
    drop(timers);
}

/// Looks up what to render for `factory`.
///
/// Returns the resolved class, the error or loading view when one applies,
/// or `None` while the placeholder should be shown. `owner` is recorded and
/// re-rendered once the load settles; the first owner starts the loader.
pub fn resolve_async_component(
    factory: &AsyncFactory,
    base: &ComponentClass,
    owner: Option<&Instance>,
) -> Option<ComponentClass> {
    let record = &factory.record;
    {
        let state = record.state.borrow();
        if state.error {
            if let Some(error_comp) = &state.error_comp {
                return Some(error_comp.clone());
            }
        }
        if let Some(resolved) = &state.resolved {
            return Some(resolved.clone());
        }
    }

    let owner = owner?;
    attach_owner(record, owner);

    {
        let state = record.state.borrow();
        if state.loading {
            if let Some(loading_comp) = &state.loading_comp {
                return Some(loading_comp.clone());
            }
        }
        if state.started {
            return None;
        }
    }

    start_loader(record, base, owner)
}

fn start_loader(
    record: &Rc<FactoryRecord>,
    base: &ComponentClass,
    owner: &Instance,
) -> Option<ComponentClass> {
    let runtime = owner.runtime().clone();
    {
        let mut state = record.state.borrow_mut();
        state.started = true;
        state.sync = true;
        state.runtime = Some(runtime.clone());
    }
    let settle = Settle {
        record: Rc::downgrade(record),
        base: base.clone(),
        settled: Rc::new(Cell::new(false)),
    };
    let loader = record.loader.borrow_mut().take();
    let output = match loader {
        Some(loader) => loader(settle.clone()),
        None => LoaderOutput::Pending,
    };

    match output {
        LoaderOutput::Pending => {}
        LoaderOutput::Future(future) => {
            if !settle.is_settled() {
                spawn_settle(&runtime, settle.clone(), future);
            }
        }
        LoaderOutput::Advanced(options) => apply_options(record, base, &runtime, &settle, options),
    }

    let mut state = record.state.borrow_mut();
    state.sync = false;
    if let Some(resolved) = &state.resolved {
        return Some(resolved.clone());
    }
    if state.error {
        return state.error_comp.clone();
    }
    if state.loading {
        return state.loading_comp.clone();
    }
    None
}

fn spawn_settle(runtime: &RuntimeHandle, settle: Settle, future: LoadFuture) {
    runtime.spawn_local(async move {
        match future.await {
            Ok(loaded) => settle.resolve(loaded),
            Err(error) => settle.reject(error),
        }
    });
}

fn apply_options(
    record: &Rc<FactoryRecord>,
    base: &ComponentClass,
    runtime: &RuntimeHandle,
    settle: &Settle,
    options: AsyncOptions,
) {
    let Some(component) = options.component else {
        return;
    };
    if !settle.is_settled() {
        spawn_settle(runtime, settle.clone(), component);
    }

    if let Some(error) = options.error {
        record.state.borrow_mut().error_comp = Some(ComponentClass::normalize(error, base));
    }

    if let Some(loading) = options.loading {
        let loading_comp = ComponentClass::normalize(loading, base);
        let delay = options
            .delay
            .unwrap_or_else(|| runtime.config().default_loading_delay);
        let mut state = record.state.borrow_mut();
        state.loading_comp = Some(loading_comp);
        if delay.is_zero() {
            state.loading = true;
        } else if !settle.is_settled() {
            let weak = Rc::downgrade(record);
            state.timer_loading = Some(runtime.timers().set_timeout(delay, move || {
                if let Some(record) = weak.upgrade() {
                    on_loading_delay(&record);
                }
            }));
        }
    }

    if let Some(timeout) = options.timeout {
        if !settle.is_settled() {
            let weak = Rc::downgrade(record);
            let settle = settle.clone();
            let registration = runtime.timers().set_timeout(timeout, move || {
                let Some(record) = weak.upgrade() else {
                    return;
                };
                let pending = {
                    let mut state = record.state.borrow_mut();
                    state.timer_timeout = None;
                    state.resolved.is_none()
                };
                if pending {
                    settle.reject(LoadError::new(format!("timeout ({}ms)", timeout.as_millis())));
                }
            });
            record.state.borrow_mut().timer_timeout = Some(registration);
        }
    }
}

fn on_loading_delay(record: &Rc<FactoryRecord>) {
    let show = {
        let mut state = record.state.borrow_mut();
        state.timer_loading = None;
        if state.resolved.is_none() && !state.error {
            state.loading = true;
            true
        } else {
            false
        }
    };
    if show {
        force_render(record, false);
    }
}

#[cfg(test)]
#[path = "tests/async_component_tests.rs"]
mod tests;
