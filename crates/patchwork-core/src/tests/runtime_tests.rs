use super::*;
use std::task::Waker;

use crate::component::ComponentClass;
use crate::instance::{Instance, InstanceInit};
use crate::timer::TimerRegistration;

fn runtime_with_scheduler() -> (Runtime, Arc<TestScheduler>) {
    let scheduler = Arc::new(TestScheduler::default());
    let runtime = Runtime::with_config(scheduler.clone(), Config::default());
    (runtime, scheduler)
}

fn blank_instance(runtime: &Runtime) -> Instance {
    Instance::new(ComponentClass::base(), InstanceInit::default(), runtime.handle())
}

#[test]
fn queued_updates_are_deduplicated_and_sorted() {
    let (runtime, scheduler) = runtime_with_scheduler();
    let first = blank_instance(&runtime);
    let second = blank_instance(&runtime);

    second.force_update();
    first.force_update();
    second.force_update();
    assert_eq!(scheduler.requests(), 2);
    assert!(runtime.needs_flush());
    assert!(runtime.handle().is_queued(first.id()));

    let handle = runtime.handle();
    let ids: Vec<InstanceId> = std::iter::from_fn(|| handle.pop_dirty().map(|(id, _)| id)).collect();
    assert_eq!(ids, vec![first.id(), second.id()]);
    assert!(!runtime.has_dirty());
}

#[test]
fn forgotten_update_leaves_the_queue() {
    let runtime = Runtime::default();
    let instance = blank_instance(&runtime);
    instance.force_update();
    runtime.handle().forget_update(instance.id());
    assert!(!runtime.handle().has_dirty());
}

#[test]
fn timers_fire_in_due_order() {
    let runtime = Runtime::default();
    let timers = runtime.timers();
    let fired = Rc::new(RefCell::new(Vec::new()));
    let push = |label: &'static str| {
        let fired = Rc::clone(&fired);
        move || fired.borrow_mut().push(label)
    };
    let _late = timers.set_timeout(Duration::from_millis(30), push("late"));
    let _early = timers.set_timeout(Duration::from_millis(10), push("early"));
    let _tie = timers.set_timeout(Duration::from_millis(10), push("tie"));
    assert_eq!(runtime.handle().next_timer_due(), Some(Duration::from_millis(10)));

    assert_eq!(runtime.handle().advance_by(Duration::from_millis(10)), 2);
    assert_eq!(*fired.borrow(), vec!["early", "tie"]);
    assert_eq!(runtime.handle().advance_to(Duration::from_millis(100)), 1);
    assert_eq!(*fired.borrow(), vec!["early", "tie", "late"]);
    assert_eq!(runtime.handle().now(), Duration::from_millis(100));
    assert!(runtime.handle().next_timer_due().is_none());
}

#[test]
fn dropping_a_registration_cancels_the_timer() {
    let runtime = Runtime::default();
    let fired = Rc::new(Cell::new(false));
    let flag = Rc::clone(&fired);
    let registration = runtime
        .timers()
        .set_timeout(Duration::from_millis(5), move || flag.set(true));
    assert!(registration.is_pending());
    drop(registration);

    assert_eq!(runtime.handle().advance_by(Duration::from_millis(5)), 0);
    assert!(!fired.get());

    let kept = runtime.timers().set_timeout(Duration::from_millis(5), || {});
    kept.cancel();
    assert!(runtime.handle().next_timer_due().is_none());
}

#[test]
fn cancelled_earliest_timer_does_not_hold_the_deadline() {
    let runtime = Runtime::default();
    let timers = runtime.timers();
    let early = timers.set_timeout(Duration::from_millis(5), || {});
    let late = timers.set_timeout(Duration::from_millis(20), || {});
    early.cancel();
    assert_eq!(runtime.handle().next_timer_due(), Some(Duration::from_millis(20)));
    assert!(late.is_pending());

    assert_eq!(runtime.handle().advance_by(Duration::from_millis(20)), 1);
    assert!(!late.is_pending());
    assert!(runtime.handle().next_timer_due().is_none());
}

#[test]
fn timer_armed_while_firing_runs_in_the_same_advance() {
    let runtime = Runtime::default();
    let handle = runtime.handle();
    let fired = Rc::new(Cell::new(0));
    let outer_count = Rc::clone(&fired);
    let held: Rc<RefCell<Vec<TimerRegistration>>> = Rc::default();
    let slot = Rc::clone(&held);
    let inner_handle = handle.clone();
    held.borrow_mut().push(handle.timers().set_timeout(Duration::from_millis(5), move || {
        outer_count.set(outer_count.get() + 1);
        let inner_count = Rc::clone(&outer_count);
        slot.borrow_mut().push(
            inner_handle
                .timers()
                .set_timeout(Duration::from_millis(5), move || inner_count.set(inner_count.get() + 1)),
        );
    }));

    assert_eq!(handle.advance_by(Duration::from_millis(10)), 2);
    assert_eq!(fired.get(), 2);
}

#[derive(Default)]
struct Gate {
    open: Cell<bool>,
    waker: RefCell<Option<Waker>>,
    polls: Cell<usize>,
}

struct GateFuture(Rc<Gate>);

impl Future for GateFuture {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let gate = &self.0;
        gate.polls.set(gate.polls.get() + 1);
        if gate.open.get() {
            Poll::Ready(())
        } else {
            *gate.waker.borrow_mut() = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}

#[test]
fn local_tasks_poll_only_when_woken() {
    let (runtime, scheduler) = runtime_with_scheduler();
    let handle = runtime.handle();
    let gate = Rc::new(Gate::default());
    let done = Rc::new(Cell::new(false));
    let finished = Rc::clone(&done);
    let future = GateFuture(Rc::clone(&gate));
    handle.spawn_local(async move {
        future.await;
        finished.set(true);
    });
    assert_eq!(scheduler.requests(), 1);
    assert!(handle.has_pending_tasks());

    assert_eq!(handle.run_tasks(), 0);
    assert_eq!(gate.polls.get(), 1);
    assert_eq!(handle.run_tasks(), 0);
    assert_eq!(gate.polls.get(), 1);

    gate.open.set(true);
    let waker = gate.waker.borrow_mut().take().expect("waker stored");
    waker.wake();
    assert_eq!(scheduler.requests(), 2);

    assert_eq!(handle.run_tasks(), 1);
    assert!(done.get());
    assert!(!handle.has_pending_tasks());
}

#[test]
fn tasks_spawned_while_polling_run_in_the_same_pass() {
    let runtime = Runtime::default();
    let handle = runtime.handle();
    let order = Rc::new(RefCell::new(Vec::new()));
    let outer_order = Rc::clone(&order);
    let spawner = handle.clone();
    handle.spawn_local(async move {
        outer_order.borrow_mut().push("outer");
        let inner_order = Rc::clone(&outer_order);
        spawner.spawn_local(async move {
            inner_order.borrow_mut().push("inner");
        });
    });

    assert_eq!(handle.run_tasks(), 2);
    assert_eq!(*order.borrow(), vec!["outer", "inner"]);
}

#[test]
fn deferred_leaves_are_taken_once() {
    let runtime = Runtime::default();
    let handle = runtime.handle();
    handle.defer_leave(4);
    handle.defer_leave(9);
    assert_eq!(handle.deferred_leaves(), vec![4, 9]);
    assert!(handle.take_deferred_leave(4));
    assert!(!handle.take_deferred_leave(4));
    assert_eq!(handle.deferred_leaves(), vec![9]);
}

#[test]
fn handle_outliving_runtime_is_inert() {
    let runtime = Runtime::default();
    let handle = runtime.handle();
    assert!(handle.is_alive());
    drop(runtime);

    assert!(!handle.is_alive());
    handle.spawn_local(async {});
    assert!(!handle.has_pending_tasks());
    assert!(handle.register_timer(Duration::from_millis(1), || {}).is_none());
    assert_eq!(handle.advance_by(Duration::from_secs(1)), 0);
    assert_eq!(handle.now(), Duration::ZERO);
    handle.warn("dropped runtime");
}

#[test]
fn config_can_be_replaced_at_runtime() {
    let runtime = Runtime::default();
    let warnings = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&warnings);
    runtime.set_config(Config::default().with_warn_handler(move |message| sink.borrow_mut().push(message.to_string())));
    runtime.handle().warn("first");
    runtime.set_config(Config::default().silent(true));
    runtime.handle().warn("second");
    assert_eq!(*warnings.borrow(), vec!["first".to_string()]);
    assert!(runtime.config().silent);
}
