use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use patchwork_core::{
    App, AsyncFactory, AsyncOptions, AsyncState, ComponentDescriptor, Host, Leave, LoaderOutput,
    MemoryHost, NodeId, TimerRegistration, Timers, VNodeData,
};
use patchwork_runtime_std::StdRuntime;
use patchwork_transition::{Rect, TransitionDriver, TransitionGroup};

type SharedHost = Rc<RefCell<MemoryHost>>;

const ROW_HEIGHT: f32 = 20.0;
const DETAILS_LATENCY: Duration = Duration::from_millis(600);

/// Lays rows out in a column and logs every transition it is asked to play.
struct ConsoleDriver {
    host: SharedHost,
}

impl ConsoleDriver {
    fn label(&self, elm: NodeId) -> String {
        let host = self.host.borrow();
        host.children(elm)
            .first()
            .and_then(|text| host.text(*text))
            .unwrap_or_default()
            .to_string()
    }
}

impl TransitionDriver for ConsoleDriver {
    fn rect(&self, elm: NodeId) -> Option<Rect> {
        let host = self.host.borrow();
        let parent = host.parent_node(elm)?;
        let row = host.children(parent).iter().position(|child| *child == elm)?;
        Some(Rect::new(0.0, row as f32 * ROW_HEIGHT, 200.0, ROW_HEIGHT))
    }

    fn enter(&self, elm: NodeId, name: &str) {
        log::info!("{name}-enter: {}", self.label(elm));
    }

    fn leave(&self, elm: NodeId, name: &str) -> Leave {
        log::info!("{name}-leave: {}", self.label(elm));
        Leave::Now
    }

    fn has_move_transition(&self, _elm: NodeId, move_class: &str) -> bool {
        move_class == "row-move"
    }

    fn translate(&self, elm: NodeId, dx: f32, dy: f32) {
        let transform = format!("translate({dx}px, {dy}px)");
        if let Err(err) = self
            .host
            .borrow_mut()
            .set_style(elm, "transform", Some(&transform))
        {
            log::warn!("could not offset {elm}: {err}");
        }
    }

    fn start_move(&self, elm: NodeId, move_class: &str) {
        log::info!("{move_class}: {}", self.label(elm));
        if let Err(err) = self.host.borrow_mut().set_style(elm, "transform", None) {
            log::warn!("could not clear offset of {elm}: {err}");
        }
    }
}

fn paragraph(name: &'static str, text: &'static str) -> ComponentDescriptor {
    ComponentDescriptor::named(name).render(move |cx| cx.h("p", None, vec![cx.text(text)]))
}

/// An async component that pretends to fetch its definition over a slow link.
fn details(timers: Timers, latency: Rc<RefCell<Option<TimerRegistration>>>) -> AsyncFactory {
    AsyncFactory::named("details", move |settle| {
        let timer = timers.set_timeout(DETAILS_LATENCY, move || {
            settle.resolve(paragraph("details", "details loaded"));
        });
        *latency.borrow_mut() = Some(timer);
        LoaderOutput::Advanced(
            AsyncOptions::new(std::future::pending())
                .loading(paragraph("details-loading", "loading..."))
                .error(paragraph("details-error", "details unavailable"))
                .delay(Duration::from_millis(150))
                .timeout(Duration::from_secs(2)),
        )
    })
}

fn html(host: &SharedHost, body: NodeId) -> String {
    host.borrow().render_html(body)
}

fn main() {
    env_logger::init();

    println!("=== Patchwork keyed list demo ===");
    println!("Set RUST_LOG=info to see transitions, PATCHWORK_DEBUG=1 for patch traces.");
    println!();

    let runtime = StdRuntime::new();
    let host: SharedHost = Rc::new(RefCell::new(MemoryHost::new()));
    let mut app = App::with_runtime(Rc::clone(&host), runtime.runtime());
    let body = app.host_mut().create_element("body");

    let rows = Rc::new(RefCell::new(vec!["alpha", "beta", "gamma", "delta"]));
    let latency = Rc::new(RefCell::new(None));
    let factory = details(runtime.runtime().timers(), Rc::clone(&latency));
    let driver: Rc<dyn TransitionDriver> = Rc::new(ConsoleDriver {
        host: Rc::clone(&host),
    });

    let state = Rc::clone(&rows);
    let demo = ComponentDescriptor::named("demo")
        .component("transition-group", TransitionGroup::new(driver))
        .component("details", factory.clone())
        .render(move |cx| {
            let items = state
                .borrow()
                .iter()
                .map(|row| cx.h("li", None, vec![cx.text(*row)]).with_key(*row))
                .collect();
            let group = VNodeData::new().attr("tag", "ul").attr("name", "row");
            cx.h(
                "main",
                None,
                vec![
                    cx.h("transition-group", Some(group), items),
                    cx.h("details", None, vec![]),
                ],
            )
        });
    let root = app.mount(demo, body);
    println!("mounted:        {}", html(&host, body));

    let steps: [(&str, fn(&mut Vec<&'static str>)); 3] = [
        ("reverse", |rows| rows.reverse()),
        ("drop beta", |rows| rows.retain(|row| *row != "beta")),
        ("append epsilon", |rows| rows.push("epsilon")),
    ];
    for (label, step) in steps {
        step(&mut rows.borrow_mut());
        root.force_update();
        let updates = runtime.pump(&mut app);
        println!("{label:<15} {}  ({updates} update(s))", html(&host, body));
    }

    while matches!(factory.state(), AsyncState::Pending | AsyncState::Loading) {
        let Some(deadline) = runtime.next_deadline() else {
            break;
        };
        std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
        if runtime.pump(&mut app) > 0 {
            println!(
                "{:<15} {}  (at {:?})",
                format!("{:?}", factory.state()).to_lowercase(),
                html(&host, body),
                runtime.elapsed()
            );
        }
    }
    latency.borrow_mut().take();

    app.unmount();
    println!("unmounted:      {}", html(&host, body));
}
