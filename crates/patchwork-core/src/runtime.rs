use std::cell::{Cell, RefCell};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_task::{waker_ref, ArcWake};
use indexmap::{IndexMap, IndexSet};

use crate::collections::map::HashMap;
use crate::config::Config;
use crate::instance::{InstanceId, WeakInstance};
use crate::platform::RuntimeScheduler;
use crate::timer::Timers;
use crate::NodeId;

pub(crate) type TimerId = u64;

pub type LocalBoxFuture<T> = Pin<Box<dyn Future<Output = T> + 'static>>;

type TimerCallback = Box<dyn FnOnce() + 'static>;

/// Pending timers ordered by `(due, id)`. Cancelling only drops the
/// callback; its heap slot is discarded when it reaches the top.
#[derive(Default)]
struct TimerQueue {
    order: BinaryHeap<Reverse<(Duration, TimerId)>>,
    callbacks: HashMap<TimerId, TimerCallback>,
}

impl TimerQueue {
    fn push(&mut self, id: TimerId, due: Duration, callback: TimerCallback) {
        self.order.push(Reverse((due, id)));
        self.callbacks.insert(id, callback);
    }

    fn cancel(&mut self, id: TimerId) {
        self.callbacks.remove(&id);
    }

    fn contains(&self, id: TimerId) -> bool {
        self.callbacks.contains_key(&id)
    }

    fn discard_cancelled(&mut self) {
        while let Some(Reverse((_, id))) = self.order.peek() {
            if self.callbacks.contains_key(id) {
                break;
            }
            self.order.pop();
        }
    }

    fn next_due(&mut self) -> Option<Duration> {
        self.discard_cancelled();
        self.order.peek().map(|Reverse((due, _))| *due)
    }

    fn pop_due(&mut self, target: Duration) -> Option<(Duration, TimerCallback)> {
        self.discard_cancelled();
        let Reverse((due, id)) = *self.order.peek()?;
        if due > target {
            return None;
        }
        self.order.pop();
        self.callbacks.remove(&id).map(|callback| (due, callback))
    }
}

struct TaskWake {
    woken: AtomicBool,
    scheduler: Arc<dyn RuntimeScheduler>,
}

impl ArcWake for TaskWake {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.woken.store(true, Ordering::SeqCst);
        arc_self.scheduler.schedule_flush();
    }
}

struct LocalTask {
    future: LocalBoxFuture<()>,
    wake: Arc<TaskWake>,
}

struct RuntimeInner {
    scheduler: Arc<dyn RuntimeScheduler>,
    config: RefCell<Config>,
    needs_flush: Cell<bool>,
    dirty: RefCell<IndexMap<InstanceId, WeakInstance>>,
    now: Cell<Duration>,
    timers: RefCell<TimerQueue>,
    next_timer_id: Cell<TimerId>,
    tasks: RefCell<Vec<LocalTask>>,
    deferred_leaves: RefCell<IndexSet<NodeId>>,
}

impl RuntimeInner {
    fn new(scheduler: Arc<dyn RuntimeScheduler>, config: Config) -> Self {
        Self {
            scheduler,
            config: RefCell::new(config),
            needs_flush: Cell::new(false),
            dirty: RefCell::new(IndexMap::new()),
            now: Cell::new(Duration::ZERO),
            timers: RefCell::new(TimerQueue::default()),
            next_timer_id: Cell::new(1),
            tasks: RefCell::new(Vec::new()),
            deferred_leaves: RefCell::new(IndexSet::new()),
        }
    }

    fn schedule(&self) {
        self.needs_flush.set(true);
        self.scheduler.schedule_flush();
    }

    fn queue_update(&self, id: InstanceId, instance: WeakInstance) {
        let mut dirty = self.dirty.borrow_mut();
        if dirty.contains_key(&id) {
            return;
        }
        dirty.insert(id, instance);
        drop(dirty);
        self.schedule();
    }

    fn forget_update(&self, id: InstanceId) {
        self.dirty.borrow_mut().shift_remove(&id);
    }

    fn is_queued(&self, id: InstanceId) -> bool {
        self.dirty.borrow().contains_key(&id)
    }

    /// Removes the queued instance with the lowest id. Parents carry lower
    /// ids than the children they create, so they run first, and a child a
    /// parent re-queues is still deduplicated while it waits.
    fn pop_dirty(&self) -> Option<(InstanceId, WeakInstance)> {
        let mut dirty = self.dirty.borrow_mut();
        let index = dirty
            .keys()
            .enumerate()
            .min_by_key(|(_, id)| **id)
            .map(|(index, _)| index)?;
        dirty.swap_remove_index(index)
    }

    fn has_dirty(&self) -> bool {
        !self.dirty.borrow().is_empty()
    }

    fn register_timer(&self, delay: Duration, callback: TimerCallback) -> TimerId {
        let id = self.next_timer_id.get();
        self.next_timer_id.set(id + 1);
        self.timers
            .borrow_mut()
            .push(id, self.now.get() + delay, callback);
        self.schedule();
        id
    }

    fn cancel_timer(&self, id: TimerId) {
        self.timers.borrow_mut().cancel(id);
    }

    fn has_timer(&self, id: TimerId) -> bool {
        self.timers.borrow().contains(id)
    }

    fn next_timer_due(&self) -> Option<Duration> {
        self.timers.borrow_mut().next_due()
    }

    fn advance_to(&self, target: Duration) -> usize {
        let mut fired = 0;
        loop {
            let next = self.timers.borrow_mut().pop_due(target);
            let Some((due, callback)) = next else {
                break;
            };
            if due > self.now.get() {
                self.now.set(due);
            }
            callback();
            fired += 1;
        }
        if target > self.now.get() {
            self.now.set(target);
        }
        fired
    }

    fn spawn_local(&self, future: LocalBoxFuture<()>) {
        let wake = Arc::new(TaskWake {
            woken: AtomicBool::new(true),
            scheduler: Arc::clone(&self.scheduler),
        });
        self.tasks.borrow_mut().push(LocalTask { future, wake });
        self.schedule();
    }

    fn run_tasks(&self) -> usize {
        let mut completed = 0;
        loop {
            let taken: Vec<LocalTask> = std::mem::take(&mut *self.tasks.borrow_mut());
            let mut pending = Vec::with_capacity(taken.len());
            for mut task in taken {
                if !task.wake.woken.swap(false, Ordering::SeqCst) {
                    pending.push(task);
                    continue;
                }
                let waker = waker_ref(&task.wake);
                let mut cx = Context::from_waker(&waker);
                match task.future.as_mut().poll(&mut cx) {
                    Poll::Ready(()) => completed += 1,
                    Poll::Pending => pending.push(task),
                }
            }
            let mut slot = self.tasks.borrow_mut();
            // Tasks spawned while polling landed in the emptied slot.
            pending.append(&mut *slot);
            *slot = pending;
            let any_woken = slot
                .iter()
                .any(|task| task.wake.woken.load(Ordering::SeqCst));
            if !any_woken {
                break;
            }
        }
        completed
    }

    fn has_tasks(&self) -> bool {
        !self.tasks.borrow().is_empty()
    }
}

#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    pub fn new(scheduler: Arc<dyn RuntimeScheduler>) -> Self {
        Self::with_config(scheduler, Config::from_env())
    }

    pub fn with_config(scheduler: Arc<dyn RuntimeScheduler>, config: Config) -> Self {
        Self {
            inner: Rc::new(RuntimeInner::new(scheduler, config)),
        }
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle(Rc::downgrade(&self.inner))
    }

    pub fn needs_flush(&self) -> bool {
        self.inner.needs_flush.get()
    }

    pub fn set_needs_flush(&self, value: bool) {
        self.inner.needs_flush.set(value);
    }

    pub fn has_dirty(&self) -> bool {
        self.inner.has_dirty()
    }

    pub fn timers(&self) -> Timers {
        Timers::new(self.handle())
    }

    pub fn config(&self) -> Config {
        self.inner.config.borrow().clone()
    }

    pub fn set_config(&self, config: Config) {
        *self.inner.config.borrow_mut() = config;
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(Arc::new(DefaultScheduler))
    }
}

#[derive(Default)]
pub struct DefaultScheduler;

impl RuntimeScheduler for DefaultScheduler {
    fn schedule_flush(&self) {}
}

#[cfg(test)]
#[derive(Default)]
pub struct TestScheduler {
    requests: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl TestScheduler {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
impl RuntimeScheduler for TestScheduler {
    fn schedule_flush(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct RuntimeHandle(pub(crate) Weak<RuntimeInner>);

impl RuntimeHandle {
    pub fn schedule(&self) {
        if let Some(inner) = self.0.upgrade() {
            inner.schedule();
        }
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    pub(crate) fn queue_update(&self, id: InstanceId, instance: WeakInstance) {
        if let Some(inner) = self.0.upgrade() {
            inner.queue_update(id, instance);
        }
    }

    pub(crate) fn forget_update(&self, id: InstanceId) {
        if let Some(inner) = self.0.upgrade() {
            inner.forget_update(id);
        }
    }

    pub fn is_queued(&self, id: InstanceId) -> bool {
        self.0
            .upgrade()
            .map(|inner| inner.is_queued(id))
            .unwrap_or(false)
    }

    pub(crate) fn pop_dirty(&self) -> Option<(InstanceId, WeakInstance)> {
        self.0.upgrade().and_then(|inner| inner.pop_dirty())
    }

    pub fn has_dirty(&self) -> bool {
        self.0
            .upgrade()
            .map(|inner| inner.has_dirty())
            .unwrap_or(false)
    }

    pub(crate) fn register_timer(
        &self,
        delay: Duration,
        callback: impl FnOnce() + 'static,
    ) -> Option<TimerId> {
        self.0
            .upgrade()
            .map(|inner| inner.register_timer(delay, Box::new(callback)))
    }

    pub(crate) fn cancel_timer(&self, id: TimerId) {
        if let Some(inner) = self.0.upgrade() {
            inner.cancel_timer(id);
        }
    }

    pub(crate) fn has_timer(&self, id: TimerId) -> bool {
        self.0
            .upgrade()
            .map(|inner| inner.has_timer(id))
            .unwrap_or(false)
    }

    pub fn next_timer_due(&self) -> Option<Duration> {
        self.0.upgrade().and_then(|inner| inner.next_timer_due())
    }

    pub fn now(&self) -> Duration {
        self.0
            .upgrade()
            .map(|inner| inner.now.get())
            .unwrap_or_default()
    }

    /// Fires every timer due at or before `target`, in due order.
    pub fn advance_to(&self, target: Duration) -> usize {
        self.0
            .upgrade()
            .map(|inner| inner.advance_to(target))
            .unwrap_or(0)
    }

    pub fn advance_by(&self, delta: Duration) -> usize {
        self.advance_to(self.now() + delta)
    }

    pub fn timers(&self) -> Timers {
        Timers::new(self.clone())
    }

    pub fn spawn_local(&self, future: impl Future<Output = ()> + 'static) {
        if let Some(inner) = self.0.upgrade() {
            inner.spawn_local(Box::pin(future));
        }
    }

    /// Polls woken local tasks until none are woken; returns how many finished.
    pub fn run_tasks(&self) -> usize {
        self.0
            .upgrade()
            .map(|inner| inner.run_tasks())
            .unwrap_or(0)
    }

    pub fn has_pending_tasks(&self) -> bool {
        self.0
            .upgrade()
            .map(|inner| inner.has_tasks())
            .unwrap_or(false)
    }

    pub(crate) fn defer_leave(&self, elm: NodeId) {
        if let Some(inner) = self.0.upgrade() {
            inner.deferred_leaves.borrow_mut().insert(elm);
        }
    }

    pub(crate) fn take_deferred_leave(&self, elm: NodeId) -> bool {
        self.0
            .upgrade()
            .map(|inner| inner.deferred_leaves.borrow_mut().shift_remove(&elm))
            .unwrap_or(false)
    }

    pub fn deferred_leaves(&self) -> Vec<NodeId> {
        self.0
            .upgrade()
            .map(|inner| inner.deferred_leaves.borrow().iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn config(&self) -> Config {
        self.0
            .upgrade()
            .map(|inner| inner.config.borrow().clone())
            .unwrap_or_default()
    }

    pub(crate) fn performance(&self) -> bool {
        self.0
            .upgrade()
            .is_some_and(|inner| inner.config.borrow().performance)
    }

    pub fn warn(&self, message: &str) {
        match self.0.upgrade() {
            Some(inner) => {
                let config = inner.config.borrow().clone();
                config.warn(message);
            }
            None => log::warn!("[patchwork] {message}"),
        }
    }

    pub fn set_needs_flush(&self, value: bool) {
        if let Some(inner) = self.0.upgrade() {
            inner.needs_flush.set(value);
        }
    }
}

#[cfg(test)]
#[path = "tests/runtime_tests.rs"]
mod tests;
