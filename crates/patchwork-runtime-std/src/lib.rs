//! Standard runtime services backed by Rust's `std` library.
//!
//! The core runtime keeps virtual time and only asks its scheduler for a
//! flush. [`StdRuntime`] pairs it with a scheduler that records those
//! requests (and can wake an event loop), plus a wall clock that moves the
//! runtime's timers forward as real time passes.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use patchwork_core::{App, Clock, Config, Host, Runtime, RuntimeHandle, RuntimeScheduler};

type FlushWaker = Arc<dyn Fn() + Send + Sync + 'static>;

/// Scheduler that records flush requests and optionally wakes an event loop.
pub struct StdScheduler {
    flush_requested: AtomicBool,
    flush_waker: RwLock<Option<FlushWaker>>,
}

impl StdScheduler {
    pub fn new() -> Self {
        Self {
            flush_requested: AtomicBool::new(false),
            flush_waker: RwLock::new(None),
        }
    }

    /// Returns whether a flush has been requested since the last call.
    pub fn take_flush_request(&self) -> bool {
        self.flush_requested.swap(false, Ordering::SeqCst)
    }

    /// Registers a waker invoked whenever the runtime asks for a flush.
    pub fn set_flush_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        *self
            .flush_waker
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(waker));
    }

    pub fn clear_flush_waker(&self) {
        *self
            .flush_waker
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn wake(&self) {
        let waker = self
            .flush_waker
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(waker) = waker {
            waker();
        }
    }
}

impl Default for StdScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StdScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdScheduler")
            .field(
                "flush_requested",
                &self.flush_requested.load(Ordering::SeqCst),
            )
            .finish()
    }
}

impl RuntimeScheduler for StdScheduler {
    fn schedule_flush(&self) {
        self.flush_requested.store(true, Ordering::SeqCst);
        self.wake();
    }
}

/// Clock implementation backed by [`std::time`].
#[derive(Debug, Default, Clone)]
pub struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Self::Instant {
        Instant::now()
    }

    fn elapsed_millis(&self, since: Self::Instant) -> u64 {
        since.elapsed().as_millis() as u64
    }
}

impl StdClock {
    pub fn elapsed(&self, since: Instant) -> Duration {
        since.elapsed()
    }
}

/// Bundles the standard scheduler and clock with a core runtime.
#[derive(Clone)]
pub struct StdRuntime {
    scheduler: Arc<StdScheduler>,
    clock: Arc<StdClock>,
    runtime: Runtime,
    started: Instant,
}

impl StdRuntime {
    pub fn new() -> Self {
        Self::with_config(Config::from_env())
    }

    pub fn with_config(config: Config) -> Self {
        let scheduler = Arc::new(StdScheduler::default());
        let runtime = Runtime::with_config(scheduler.clone(), config);
        let clock = Arc::new(StdClock);
        let started = clock.now();
        Self {
            scheduler,
            clock,
            runtime,
            started,
        }
    }

    /// Returns the core runtime; hand it to [`App::with_runtime`].
    pub fn runtime(&self) -> Runtime {
        self.runtime.clone()
    }

    pub fn runtime_handle(&self) -> RuntimeHandle {
        self.runtime.handle()
    }

    pub fn scheduler(&self) -> Arc<StdScheduler> {
        Arc::clone(&self.scheduler)
    }

    pub fn clock(&self) -> Arc<StdClock> {
        Arc::clone(&self.clock)
    }

    /// Returns whether a flush was requested since the last poll.
    pub fn take_flush_request(&self) -> bool {
        self.scheduler.take_flush_request()
    }

    pub fn set_flush_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        self.scheduler.set_flush_waker(waker);
    }

    pub fn clear_flush_waker(&self) {
        self.scheduler.clear_flush_waker();
    }

    /// Wall-clock time since this runtime was created.
    pub fn elapsed(&self) -> Duration {
        self.clock.elapsed(self.started)
    }

    /// Fires every runtime timer that is due by now. Returns how many fired.
    pub fn sync_timers(&self) -> usize {
        let fired = self.runtime_handle().advance_to(self.elapsed());
        if fired > 0 {
            log::trace!("fired {fired} timer(s) at {:?}", self.elapsed());
        }
        fired
    }

    /// Instant at which the earliest pending timer becomes due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.runtime_handle()
            .next_timer_due()
            .map(|due| self.started + due)
    }

    /// Catches timers up with the wall clock, then flushes `app`. Returns
    /// the number of instance updates.
    pub fn pump<H: Host>(&self, app: &mut App<H>) -> usize {
        self.sync_timers();
        self.take_flush_request();
        app.flush()
    }
}

impl fmt::Debug for StdRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdRuntime")
            .field("scheduler", &self.scheduler)
            .field("clock", &self.clock)
            .field("started", &self.started)
            .finish()
    }
}

impl Default for StdRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;
    use std::sync::atomic::AtomicUsize;

    use patchwork_core::{ComponentDescriptor, MemoryHost};

    use super::*;

    fn counter(count: Rc<Cell<u32>>) -> ComponentDescriptor {
        ComponentDescriptor::named("counter")
            .render(move |cx| cx.h("b", None, vec![cx.text(count.get().to_string())]))
    }

    #[test]
    fn std_runtime_requests_flush_when_instance_is_dirtied() {
        let runtime = StdRuntime::new();
        let mut app = App::with_runtime(MemoryHost::new(), runtime.runtime());
        let body = app.host_mut().create_element("body");
        let count = Rc::new(Cell::new(0));
        let root = app.mount(counter(Rc::clone(&count)), body);
        runtime.take_flush_request();

        count.set(3);
        root.force_update();
        assert!(
            runtime.take_flush_request(),
            "force_update should request a flush"
        );
        assert!(!runtime.take_flush_request());

        assert_eq!(runtime.pump(&mut app), 1);
        assert_eq!(app.host().render_html(body), "<body><b>3</b></body>");
    }

    #[test]
    fn flush_waker_is_called_per_request() {
        let runtime = StdRuntime::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        runtime.set_flush_waker(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        runtime.runtime_handle().schedule();
        runtime.runtime_handle().schedule();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        runtime.clear_flush_waker();
        runtime.runtime_handle().schedule();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn timers_follow_the_wall_clock() {
        let runtime = StdRuntime::new();
        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        let _zero = runtime
            .runtime()
            .timers()
            .set_timeout(Duration::ZERO, move || flag.set(true));
        let _later = runtime
            .runtime()
            .timers()
            .set_timeout(Duration::from_secs(3600), || {});

        assert!(runtime.next_deadline().is_some());
        assert_eq!(runtime.sync_timers(), 1);
        assert!(fired.get());
        let deadline = runtime.next_deadline().expect("hour-long timer pending");
        assert!(deadline > Instant::now());
    }

    #[test]
    fn clock_reports_elapsed_millis() {
        let clock = StdClock;
        let start = clock.now() - Duration::from_millis(20);
        assert!(clock.elapsed_millis(start) >= 20);
    }
}
