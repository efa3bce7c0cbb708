use super::*;
use crate::app::App;
use crate::component::ComponentDescriptor;
use crate::config::Config;
use crate::host::MemoryHost;
use crate::runtime::Runtime;
use crate::vnode::VNodeData;

type Journal = Rc<RefCell<Vec<String>>>;

fn record_all(descriptor: ComponentDescriptor, label: &'static str, journal: &Journal) -> ComponentDescriptor {
    let hooks = [
        (LifecycleHook::BeforeCreate, "beforeCreate"),
        (LifecycleHook::Created, "created"),
        (LifecycleHook::BeforeMount, "beforeMount"),
        (LifecycleHook::Mounted, "mounted"),
        (LifecycleHook::BeforeUpdate, "beforeUpdate"),
        (LifecycleHook::Updated, "updated"),
        (LifecycleHook::BeforeDestroy, "beforeDestroy"),
        (LifecycleHook::Destroyed, "destroyed"),
    ];
    hooks.into_iter().fold(descriptor, |descriptor, (hook, name)| {
        let journal = Rc::clone(journal);
        descriptor.hook(hook, move |_| journal.borrow_mut().push(format!("{label}:{name}")))
    })
}

fn leaf(text: &'static str) -> ComponentDescriptor {
    ComponentDescriptor::named("leaf").render(move |cx| cx.h("i", None, vec![cx.text(text)]))
}

#[test]
fn construction_runs_create_hooks() {
    let journal = Journal::default();
    let runtime = Runtime::default();
    let class = ComponentClass::base().extend(Rc::new(record_all(leaf("x"), "leaf", &journal)));
    let instance = Instance::new(class, InstanceInit::default(), runtime.handle());

    assert_eq!(*journal.borrow(), vec!["leaf:beforeCreate", "leaf:created"]);
    assert_eq!(instance.state(), InstanceState::Created);
    assert!(instance.el().is_none());
    assert!(instance.current_tree().is_none());
}

#[test]
fn children_mount_before_their_parent() {
    let journal = Journal::default();
    let child = record_all(leaf("x"), "child", &journal);
    let parent = record_all(
        ComponentDescriptor::named("parent")
            .component("leaf", child)
            .render(|cx| cx.h("div", None, vec![cx.h("leaf", None, vec![])])),
        "parent",
        &journal,
    );
    let mut app = App::new(MemoryHost::new());
    let body = app.host_mut().create_element("body");
    let root = app.mount(parent, body);

    assert_eq!(
        *journal.borrow(),
        vec![
            "parent:beforeCreate",
            "parent:created",
            "parent:beforeMount",
            "child:beforeCreate",
            "child:created",
            "child:beforeMount",
            "child:mounted",
            "parent:mounted",
        ]
    );
    assert!(root.is_mounted());
    assert_eq!(app.host().render_html(body), "<body><div><i>x</i></div></body>");
}

#[test]
fn updates_and_destruction_follow_hook_order() {
    let journal = Journal::default();
    let parent = record_all(
        ComponentDescriptor::named("parent")
            .component("leaf", record_all(leaf("x"), "child", &journal))
            .render(|cx| cx.h("div", None, vec![cx.h("leaf", None, vec![])])),
        "parent",
        &journal,
    );
    let mut app = App::new(MemoryHost::new());
    let body = app.host_mut().create_element("body");
    let root = app.mount(parent, body);
    journal.borrow_mut().clear();

    root.force_update();
    assert_eq!(app.flush(), 1);
    // Unchanged props and no slot leave the child alone.
    assert_eq!(*journal.borrow(), vec!["parent:beforeUpdate", "parent:updated"]);

    journal.borrow_mut().clear();
    app.unmount();
    assert_eq!(
        *journal.borrow(),
        vec![
            "parent:beforeDestroy",
            "child:beforeDestroy",
            "child:destroyed",
            "parent:destroyed",
        ]
    );
    assert!(root.is_destroyed());
    assert_eq!(app.host().render_html(body), "<body></body>");
}

#[test]
fn hook_listeners_can_be_removed_once() {
    let runtime = Runtime::default();
    let instance = Instance::new(
        ComponentClass::base().extend(Rc::new(leaf("x"))),
        InstanceInit::default(),
        runtime.handle(),
    );
    let other = Instance::new(ComponentClass::base(), InstanceInit::default(), runtime.handle());
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    let handle = instance.on_hook(LifecycleHook::Updated, move |_| counter.set(counter.get() + 1));
    assert_eq!(instance.hook_listener_count(), 1);

    instance.call_hook(LifecycleHook::Updated);
    assert_eq!(calls.get(), 1);

    assert!(!other.off_hook(handle));
    assert!(instance.off_hook(handle));
    assert!(!instance.off_hook(handle));
    instance.call_hook(LifecycleHook::Updated);
    assert_eq!(calls.get(), 1);
}

#[test]
fn emit_calls_bound_listener() {
    let runtime = Runtime::default();
    let seen = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&seen);
    let mut listeners = Listeners::new();
    let handler: Handler = Rc::new(move |event: &Event| {
        *sink.borrow_mut() = event.detail.as_deref().map(str::to_string);
    });
    listeners.insert(Rc::from("select"), handler);
    let instance = Instance::new(
        ComponentClass::base(),
        InstanceInit {
            listeners,
            ..InstanceInit::default()
        },
        runtime.handle(),
    );

    assert!(instance.emit("select", Some("row-3")));
    assert_eq!(seen.borrow().as_deref(), Some("row-3"));
    assert!(!instance.emit("close", None));
}

#[test]
fn missing_render_warns_with_component_trace() {
    let warnings = Rc::new(RefCell::new(Vec::<String>::new()));
    let sink = Rc::clone(&warnings);
    let runtime = Runtime::with_config(
        std::sync::Arc::new(crate::runtime::DefaultScheduler),
        Config::default().with_warn_handler(move |message| sink.borrow_mut().push(message.to_string())),
    );
    let base = ComponentClass::base();
    let parent = Instance::new(
        base.extend(Rc::new(ComponentDescriptor::named("shell"))),
        InstanceInit::default(),
        runtime.handle(),
    );
    let child = Instance::new(
        base.extend(Rc::new(ComponentDescriptor::named("broken"))),
        InstanceInit {
            parent: Some(parent.clone()),
            ..InstanceInit::default()
        },
        runtime.handle(),
    );

    let tree = child.render();
    assert!(tree.is_comment);
    assert_eq!(
        *warnings.borrow(),
        vec![
            "Failed to mount component: render function not defined.\n\nfound in\n\n---> <broken>\n       <shell>"
                .to_string()
        ]
    );
}

#[test]
fn update_requires_a_mounted_instance() {
    let runtime = Runtime::default();
    let mut host = MemoryHost::new();
    let instance = Instance::new(
        ComponentClass::base().extend(Rc::new(leaf("x"))),
        InstanceInit::default(),
        runtime.handle(),
    );
    assert!(!instance.update(&mut host));
    assert_eq!(instance.update_count(), 0);
}

#[test]
fn receive_queues_only_on_changes() {
    let runtime = Runtime::default();
    let mut props = Props::new();
    props.insert(Rc::from("title"), Rc::from("a"));
    let instance = Instance::new(
        ComponentClass::base().extend(Rc::new(leaf("x").prop("title"))),
        InstanceInit {
            props: props.clone(),
            ..InstanceInit::default()
        },
        runtime.handle(),
    );

    instance.receive(&props, &Listeners::new(), &[]);
    assert!(!runtime.handle().is_queued(instance.id()));

    props.insert(Rc::from("title"), Rc::from("b"));
    instance.receive(&props, &Listeners::new(), &[]);
    assert!(runtime.handle().is_queued(instance.id()));
    assert_eq!(instance.prop("title").as_deref(), Some("b"));
}

#[test]
fn slot_content_always_forces_update() {
    let runtime = Runtime::default();
    let instance = Instance::new(
        ComponentClass::base().extend(Rc::new(leaf("x"))),
        InstanceInit::default(),
        runtime.handle(),
    );
    instance.receive(&Props::new(), &Listeners::new(), &[VNode::text("slot")]);
    assert!(runtime.handle().is_queued(instance.id()));
    assert_eq!(instance.slot().len(), 1);
}

#[test]
fn props_and_listeners_flow_from_parent_vnode() {
    let clicks = Rc::new(Cell::new(0));
    let counter = Rc::clone(&clicks);
    let child = ComponentDescriptor::named("labelled")
        .prop("label")
        .render(|cx| {
            let label = cx.prop("label").unwrap_or_else(|| Rc::from("?"));
            cx.h("b", None, vec![cx.text(label)])
        });
    let parent = ComponentDescriptor::named("parent")
        .component("labelled", child)
        .render(move |cx| {
            let counter = Rc::clone(&counter);
            let data = VNodeData::new()
                .attr("label", "hello")
                .attr("title", "ignored")
                .on("pick", move |_| counter.set(counter.get() + 1));
            cx.h("labelled", Some(data), vec![])
        });
    let mut app = App::new(MemoryHost::new());
    let body = app.host_mut().create_element("body");
    let root = app.mount(parent, body);

    assert_eq!(app.host().render_html(body), "<body><b>hello</b></body>");
    let tree = root.current_tree().expect("rendered");
    let child = tree.component_instance().expect("component root");
    assert_eq!(child.prop("label").as_deref(), Some("hello"));
    assert!(child.prop("title").is_none());
    assert!(child.emit("pick", None));
    assert_eq!(clicks.get(), 1);
    assert_eq!(root.el(), child.el());
    assert!(child.parent().is_some_and(|parent| parent.ptr_eq(&root)));
}

#[test]
fn child_rerender_updates_parent_root_element() {
    let swap = Rc::new(Cell::new(false));
    let flag = Rc::clone(&swap);
    let child = ComponentDescriptor::named("swapper").render(move |cx| {
        if flag.get() {
            cx.h("section", None, vec![])
        } else {
            cx.h("article", None, vec![])
        }
    });
    let parent = ComponentDescriptor::named("parent")
        .component("swapper", child)
        .render(|cx| cx.h("swapper", None, vec![]));
    let mut app = App::new(MemoryHost::new());
    let body = app.host_mut().create_element("body");
    let root = app.mount(parent, body);
    let child = root
        .current_tree()
        .and_then(|tree| tree.component_instance().cloned())
        .expect("component root");

    swap.set(true);
    child.force_update();
    assert_eq!(app.flush(), 1);
    assert_eq!(app.host().render_html(body), "<body><section></section></body>");
    assert_eq!(root.el(), child.el());
    assert_eq!(app.host().tag(root.el().expect("element")), Some("section"));
}

#[test]
fn destroyed_instance_ignores_force_update() {
    let runtime = Runtime::default();
    let mut host = MemoryHost::new();
    let instance = Instance::new(
        ComponentClass::base().extend(Rc::new(leaf("x"))),
        InstanceInit::default(),
        runtime.handle(),
    );
    instance.on_hook(LifecycleHook::Destroyed, |_| {});
    instance.destroy(&mut host);
    assert_eq!(instance.hook_listener_count(), 0);
    instance.force_update();
    assert!(!runtime.handle().is_queued(instance.id()));
    // A second destroy is a no-op.
    instance.destroy(&mut host);
    assert!(instance.is_destroyed());
}

fn timed_app(config: Config) -> (App<MemoryHost>, NodeId) {
    let mut app = App::with_config(MemoryHost::new(), config);
    let body = app.host_mut().create_element("body");
    (app, body)
}

#[test]
fn performance_timing_measures_init_render_and_patch() {
    let measured = Rc::new(RefCell::new(Vec::<String>::new()));
    let sink = Rc::clone(&measured);
    let config = Config::default().with_measure_handler(move |label, _elapsed| {
        sink.borrow_mut().push(label.to_string())
    });
    let (mut app, body) = timed_app(config);
    let list = ComponentDescriptor::named("list")
        .component("leaf", leaf("x"))
        .render(|cx| cx.h("ul", None, vec![cx.h("leaf", None, vec![])]));
    app.mount(list, body);

    assert_eq!(
        *measured.borrow(),
        vec![
            "<list> init",
            "<list> render",
            "<leaf> init",
            "<leaf> render",
            "<leaf> patch",
            "<list> patch",
        ]
    );
}

#[test]
fn timing_is_off_unless_enabled() {
    assert!(!Config::default().performance);
    let measured = Rc::new(Cell::new(0));
    let counter = Rc::clone(&measured);
    let config = Config {
        performance: false,
        ..Config::default().with_measure_handler(move |_, _| counter.set(counter.get() + 1))
    };
    let (mut app, body) = timed_app(config);
    app.mount(leaf("x"), body);
    assert_eq!(measured.get(), 0);
}
