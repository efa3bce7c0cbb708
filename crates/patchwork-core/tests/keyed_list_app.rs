use std::cell::RefCell;
use std::rc::Rc;

use patchwork_core::{App, ComponentDescriptor, Config, Host, MemoryHost, NodeId, VNodeData};

#[derive(Clone)]
struct Todo {
    id: u32,
    title: &'static str,
    done: bool,
}

type Todos = Rc<RefCell<Vec<Todo>>>;

fn todo(id: u32, title: &'static str) -> Todo {
    Todo {
        id,
        title,
        done: false,
    }
}

fn todo_list(todos: &Todos) -> ComponentDescriptor {
    let state = Rc::clone(todos);
    ComponentDescriptor::named("todo-list").render(move |cx| {
        let items = state
            .borrow()
            .iter()
            .map(|item| {
                let state = Rc::clone(&state);
                let id = item.id;
                let mut data = VNodeData::new().on("click", move |_| {
                    if let Some(entry) = state.borrow_mut().iter_mut().find(|entry| entry.id == id) {
                        entry.done = !entry.done;
                    }
                });
                if item.done {
                    data = data.class("done");
                }
                cx.h("li", Some(data), vec![cx.text(item.title)]).with_key(item.id)
            })
            .collect();
        cx.h("ul", None, items)
    })
}

struct Fixture {
    app: App<MemoryHost>,
    todos: Todos,
    body: NodeId,
    warnings: Rc<RefCell<Vec<String>>>,
}

impl Fixture {
    fn new(initial: Vec<Todo>) -> Self {
        let warnings = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&warnings);
        let config =
            Config::default().with_warn_handler(move |message| sink.borrow_mut().push(message.to_string()));
        let mut app = App::with_config(MemoryHost::new(), config);
        let todos: Todos = Rc::new(RefCell::new(initial));
        let body = app.host_mut().create_element("body");
        app.mount(todo_list(&todos), body);
        Self {
            app,
            todos,
            body,
            warnings,
        }
    }

    fn list(&self) -> NodeId {
        self.app.root().and_then(|root| root.el()).expect("mounted list")
    }

    fn items(&self) -> Vec<NodeId> {
        self.app.host().children(self.list())
    }

    fn rerender(&mut self) -> usize {
        if let Some(root) = self.app.root() {
            root.force_update();
        }
        self.app.flush()
    }

    fn html(&self) -> String {
        self.app.host().render_html(self.body)
    }
}

#[test]
fn reordering_moves_existing_nodes() {
    let mut fixture = Fixture::new(vec![todo(1, "a"), todo(2, "b"), todo(3, "c"), todo(4, "d")]);
    let before = fixture.items();
    fixture.app.host_mut().reset_stats();

    fixture.todos.borrow_mut().reverse();
    assert_eq!(fixture.rerender(), 1);

    assert_eq!(
        fixture.html(),
        "<body><ul><li>d</li><li>c</li><li>b</li><li>a</li></ul></body>"
    );
    let after = fixture.items();
    let mut expected = before.clone();
    expected.reverse();
    assert_eq!(after, expected);

    let stats = fixture.app.host().stats();
    assert_eq!(stats.created, 0);
    assert_eq!(stats.removed, 0);
    assert_eq!(stats.moved, 3);
}

#[test]
fn insert_and_remove_touch_only_changed_items() {
    let mut fixture = Fixture::new(vec![todo(1, "a"), todo(2, "b"), todo(3, "c")]);
    let before = fixture.items();
    fixture.app.host_mut().reset_stats();

    {
        let mut todos = fixture.todos.borrow_mut();
        todos.remove(1);
        todos.insert(0, todo(9, "z"));
    }
    fixture.rerender();

    assert_eq!(fixture.html(), "<body><ul><li>z</li><li>a</li><li>c</li></ul></body>");
    let after = fixture.items();
    assert_eq!(&after[1..], &[before[0], before[2]]);
    let stats = fixture.app.host().stats();
    // One li plus its text node.
    assert_eq!(stats.created, 2);
    assert_eq!(stats.removed, 1);
    // "a" is matched against the tail and moved past "b" before "b" goes.
    assert_eq!(stats.moved, 1);
}

#[test]
fn events_reach_the_latest_handler_without_rebinding() {
    let mut fixture = Fixture::new(vec![todo(1, "a"), todo(2, "b")]);
    let second = fixture.items()[1];
    assert_eq!(fixture.app.host().listener_count(second), 1);

    assert!(fixture.app.host().dispatch(second, "click", None));
    fixture.app.host_mut().reset_stats();
    fixture.rerender();
    assert_eq!(fixture.html(), "<body><ul><li>a</li><li class=\"done\">b</li></ul></body>");
    assert_eq!(fixture.app.host().stats().listener_writes, 0);

    fixture.todos.borrow_mut().swap(0, 1);
    fixture.rerender();
    // The node now sitting first still toggles item 2.
    let first = fixture.items()[0];
    assert_eq!(first, second);
    assert!(fixture.app.host().dispatch(first, "click", None));
    assert!(!fixture.todos.borrow().iter().any(|entry| entry.done));
}

#[test]
fn duplicate_keys_warn_and_still_render() {
    let mut fixture = Fixture::new(vec![todo(1, "a"), todo(2, "b")]);
    {
        let mut todos = fixture.todos.borrow_mut();
        todos.clear();
        todos.extend([todo(2, "x"), todo(2, "y"), todo(1, "a")]);
    }
    fixture.rerender();
    assert_eq!(
        *fixture.warnings.borrow(),
        vec!["Duplicate keys detected: '2'. This may cause an update error.".to_string()]
    );
    assert_eq!(
        fixture.html(),
        "<body><ul><li>x</li><li>y</li><li>a</li></ul></body>"
    );
}

#[test]
fn clearing_the_list_removes_every_item() {
    let mut fixture = Fixture::new(vec![todo(1, "a"), todo(2, "b")]);
    fixture.todos.borrow_mut().clear();
    fixture.rerender();
    assert_eq!(fixture.html(), "<body><ul></ul></body>");
    fixture.todos.borrow_mut().push(todo(5, "e"));
    fixture.rerender();
    assert_eq!(fixture.html(), "<body><ul><li>e</li></ul></body>");
}
