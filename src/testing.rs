//! In-memory collaborators for driving bindings in tests.
//!
//! Only available with the `testing` feature.
//!
//! - [`TestDom`]: a node tree with fragment semantics, class-driven computed
//!   style, dispatchable event listeners and virtual timers
//! - [`TestScope`]: a flat name → value scope over [`Properties`]
//! - [`TestLoader`]: template sources answered immediately or held open
//! - [`TestCompiler`]: records compile, link and unbind calls

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use spin::Mutex;

use crate::component::{ComponentEvent, Properties};
use crate::host::{
    Dom, DomListener, Handler, Linker, ListenerId, NodeId, RepeatItem, Scope, ScopeRef,
    TemplateCompiler, TemplateError, TemplateLoader, TimerCallback, TimerId, Unbind, Unwatch, Vendor,
    WatchCallback,
};
use crate::markup::{has_interpolation, single_interpolation};

#[derive(Clone, Debug, PartialEq, Eq)]
enum NodeKind {
    Element(String),
    Text(String),
    Comment(String),
    Fragment,
}

struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attributes: Vec<(String, String)>,
    classes: Vec<String>,
    styles: HashMap<String, String>,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            attributes: Vec::new(),
            classes: Vec::new(),
            styles: HashMap::new(),
        }
    }
}

struct RegisteredListener {
    id: ListenerId,
    node: NodeId,
    event: String,
    callback: Arc<dyn Fn() + Send + Sync>,
}

struct Timer {
    id: TimerId,
    due: Duration,
    callback: TimerCallback,
}

#[derive(Default)]
struct DomState {
    next_id: u64,
    nodes: HashMap<NodeId, Node>,
    listeners: Vec<RegisteredListener>,
    timers: Vec<Timer>,
    now: Duration,
    class_styles: HashMap<String, Vec<(String, String)>>,
    vendor: Vendor,
}

impl DomState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn create(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.next_id());
        self.nodes.insert(id, Node::new(kind));
        id
    }

    fn detach(&mut self, node: NodeId) {
        let Some(parent) = self.nodes.get_mut(&node).and_then(|node| node.parent.take()) else {
            return;
        };
        if let Some(parent) = self.nodes.get_mut(&parent) {
            parent.children.retain(|child| *child != node);
        }
    }

    /// The nodes an insertion of `node` moves: a fragment's children, or the node itself.
    fn take_insertable(&mut self, node: NodeId) -> Vec<NodeId> {
        let is_fragment = self
            .nodes
            .get(&node)
            .is_some_and(|node| node.kind == NodeKind::Fragment);

        let items = if is_fragment {
            self.nodes
                .get_mut(&node)
                .map(|fragment| std::mem::take(&mut fragment.children))
                .unwrap_or_default()
        } else {
            self.detach(node);
            vec![node]
        };

        for item in &items {
            if let Some(item) = self.nodes.get_mut(item) {
                item.parent = None;
            }
        }
        items
    }

    fn insert_at(&mut self, parent: NodeId, index: usize, items: Vec<NodeId>) {
        for item in &items {
            if let Some(item) = self.nodes.get_mut(item) {
                item.parent = Some(parent);
            }
        }
        if let Some(parent) = self.nodes.get_mut(&parent) {
            let index = index.min(parent.children.len());
            parent.children.splice(index..index, items);
        }
    }

    fn position(&self, node: NodeId) -> Option<(NodeId, usize)> {
        let parent = self.nodes.get(&node)?.parent?;
        let index = self
            .nodes
            .get(&parent)?
            .children
            .iter()
            .position(|child| *child == node)?;
        Some((parent, index))
    }
}

/// In-memory [`Dom`].
///
/// Computed style is driven by rules registered with
/// [`style_class`](Self::style_class): a node's computed value for a
/// property is the inline style if set, else the rule of the last matching
/// class, else `"0s"` for durations and `""` otherwise.
///
/// Timers only fire when [`advance`](Self::advance) moves the virtual clock
/// past them; listeners only fire through [`dispatch`](Self::dispatch).
/// Callbacks run without any internal lock held.
#[derive(Clone, Default)]
pub struct TestDom {
    state: Arc<Mutex<DomState>>,
}

impl TestDom {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_vendor(&self, vendor: Vendor) {
        self.state.lock().vendor = vendor;
    }

    /// Create a detached element.
    pub fn element(&self, tag: &str) -> NodeId {
        self.state.lock().create(NodeKind::Element(tag.to_string()))
    }

    /// Create a detached element carrying `attributes` in order.
    pub fn element_with(&self, tag: &str, attributes: &[(&str, &str)]) -> NodeId {
        let node = self.element(tag);
        for (name, value) in attributes {
            self.set_attribute(node, name, value);
        }
        node
    }

    pub fn text(&self, content: &str) -> NodeId {
        self.state.lock().create(NodeKind::Text(content.to_string()))
    }

    /// Create a fragment holding `children`.
    pub fn fragment_of(&self, children: &[NodeId]) -> NodeId {
        let fragment = self.create_fragment();
        for &child in children {
            self.append_child(fragment, child);
        }
        fragment
    }

    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        let mut state = self.state.lock();
        let Some(node) = state.nodes.get_mut(&node) else {
            return;
        };
        match node.attributes.iter_mut().find(|(existing, _)| existing == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => node.attributes.push((name.to_string(), value.to_string())),
        }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.state.lock().nodes.get(&node)?.parent
    }

    pub fn classes(&self, node: NodeId) -> Vec<String> {
        self.state
            .lock()
            .nodes
            .get(&node)
            .map(|node| node.classes.clone())
            .unwrap_or_default()
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.classes(node).iter().any(|existing| existing == class)
    }

    /// Inline style set on `node`.
    pub fn style(&self, node: NodeId, property: &str) -> Option<String> {
        self.state.lock().nodes.get(&node)?.styles.get(property).cloned()
    }

    /// Text of a text or comment node.
    pub fn text_of(&self, node: NodeId) -> Option<String> {
        match &self.state.lock().nodes.get(&node)?.kind {
            NodeKind::Text(text) | NodeKind::Comment(text) => Some(text.clone()),
            _ => None,
        }
    }

    pub fn is_comment(&self, node: NodeId) -> bool {
        self.state
            .lock()
            .nodes
            .get(&node)
            .is_some_and(|node| matches!(node.kind, NodeKind::Comment(_)))
    }

    /// Computed value of `property` on every node carrying `class`.
    pub fn style_class(&self, class: &str, property: &str, value: &str) {
        self.state
            .lock()
            .class_styles
            .entry(class.to_string())
            .or_default()
            .push((property.to_string(), value.to_string()));
    }

    pub fn listener_count(&self, node: NodeId) -> usize {
        self.state
            .lock()
            .listeners
            .iter()
            .filter(|listener| listener.node == node)
            .count()
    }

    /// Fire `event` on `node`. Returns how many listeners ran.
    pub fn dispatch(&self, node: NodeId, event: &str) -> usize {
        let targets: Vec<(ListenerId, Arc<dyn Fn() + Send + Sync>)> = self
            .state
            .lock()
            .listeners
            .iter()
            .filter(|listener| listener.node == node && listener.event == event)
            .map(|listener| (listener.id, listener.callback.clone()))
            .collect();

        let mut ran = 0;
        for (id, callback) in targets {
            let registered = self.state.lock().listeners.iter().any(|listener| listener.id == id);
            if registered {
                (callback.as_ref())();
                ran += 1;
            }
        }
        ran
    }

    pub fn pending_timers(&self) -> usize {
        self.state.lock().timers.len()
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    /// Move the virtual clock forward, firing due timers in order.
    pub fn advance(&self, by: Duration) {
        let target = self.state.lock().now + by;

        loop {
            let due = {
                let mut state = self.state.lock();
                let next = state
                    .timers
                    .iter()
                    .enumerate()
                    .filter(|(_, timer)| timer.due <= target)
                    .min_by_key(|(_, timer)| (timer.due, timer.id.0))
                    .map(|(index, _)| index);

                next.map(|index| {
                    let timer = state.timers.remove(index);
                    state.now = timer.due;
                    timer.callback
                })
            };

            match due {
                Some(callback) => callback(),
                None => break,
            }
        }

        self.state.lock().now = target;
    }
}

impl Dom for TestDom {
    fn create_marker(&self, text: &str) -> NodeId {
        self.state.lock().create(NodeKind::Comment(text.to_string()))
    }

    fn create_fragment(&self) -> NodeId {
        self.state.lock().create(NodeKind::Fragment)
    }

    fn append_child(&self, parent: NodeId, child: NodeId) {
        let mut state = self.state.lock();
        let items = state.take_insertable(child);
        state.insert_at(parent, usize::MAX, items);
    }

    fn replace(&self, node: NodeId, old: NodeId) {
        if node == old {
            return;
        }
        let mut state = self.state.lock();
        if state.position(old).is_none() {
            return;
        }
        let items = state.take_insertable(node);
        let Some((parent, index)) = state.position(old) else {
            return;
        };
        state.detach(old);
        state.insert_at(parent, index, items);
    }

    fn insert_after(&self, node: NodeId, reference: NodeId) {
        let mut state = self.state.lock();
        if node == reference || state.position(reference).is_none() {
            return;
        }
        let items = state.take_insertable(node);
        let Some((parent, index)) = state.position(reference) else {
            return;
        };
        state.insert_at(parent, index + 1, items);
    }

    fn remove(&self, node: NodeId) {
        self.state.lock().detach(node);
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let state = self.state.lock();
        let (parent, index) = state.position(node)?;
        state.nodes.get(&parent)?.children.get(index + 1).copied()
    }

    fn child_nodes(&self, node: NodeId) -> Vec<NodeId> {
        self.state
            .lock()
            .nodes
            .get(&node)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    fn attributes(&self, node: NodeId) -> Vec<(String, String)> {
        self.state
            .lock()
            .nodes
            .get(&node)
            .map(|node| node.attributes.clone())
            .unwrap_or_default()
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.state
            .lock()
            .nodes
            .get(&node)?
            .attributes
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.clone())
    }

    fn remove_attribute(&self, node: NodeId, name: &str) {
        if let Some(node) = self.state.lock().nodes.get_mut(&node) {
            node.attributes.retain(|(existing, _)| existing != name);
        }
    }

    fn add_class(&self, node: NodeId, class: &str) {
        if let Some(node) = self.state.lock().nodes.get_mut(&node) {
            if !node.classes.iter().any(|existing| existing == class) {
                node.classes.push(class.to_string());
            }
        }
    }

    fn remove_class(&self, node: NodeId, class: &str) {
        if let Some(node) = self.state.lock().nodes.get_mut(&node) {
            node.classes.retain(|existing| existing != class);
        }
    }

    fn computed_style(&self, node: NodeId, property: &str) -> String {
        let state = self.state.lock();
        let fallback = if property.ends_with("Duration") { "0s" } else { "" };
        let Some(node) = state.nodes.get(&node) else {
            return fallback.to_string();
        };
        if let Some(inline) = node.styles.get(property) {
            return inline.clone();
        }

        node.classes
            .iter()
            .filter_map(|class| state.class_styles.get(class))
            .flat_map(|rules| rules.iter())
            .filter(|(name, _)| name == property)
            .map(|(_, value)| value.clone())
            .last()
            .unwrap_or_else(|| fallback.to_string())
    }

    fn set_style(&self, node: NodeId, property: &str, value: &str) {
        if let Some(node) = self.state.lock().nodes.get_mut(&node) {
            node.styles.insert(property.to_string(), value.to_string());
        }
    }

    fn vendor(&self) -> Vendor {
        self.state.lock().vendor
    }

    fn add_event_listener(&self, node: NodeId, event: &str, listener: DomListener) -> ListenerId {
        let mut state = self.state.lock();
        let id = ListenerId(state.next_id());
        state.listeners.push(RegisteredListener {
            id,
            node,
            event: event.to_string(),
            callback: Arc::from(listener),
        });
        id
    }

    fn remove_event_listener(&self, node: NodeId, listener: ListenerId) {
        self.state
            .lock()
            .listeners
            .retain(|registered| !(registered.node == node && registered.id == listener));
    }

    fn set_timeout(&self, delay: Duration, callback: TimerCallback) -> TimerId {
        let mut state = self.state.lock();
        let id = TimerId(state.next_id());
        let due = state.now + delay;
        state.timers.push(Timer { id, due, callback });
        id
    }

    fn clear_timeout(&self, timer: TimerId) {
        self.state.lock().timers.retain(|pending| pending.id != timer);
    }
}

/// A handler invocation recorded by [`TestScope`].
#[derive(Clone, Debug, PartialEq)]
pub struct HandlerCall {
    pub expression: String,
    pub event_type: String,
    pub args: Vec<Value>,
}

/// A [`RepeatItem`] remembering the nodes it tracks.
#[derive(Clone, Default)]
pub struct TestRepeatItem {
    nodes: Arc<Mutex<Vec<NodeId>>>,
}

impl TestRepeatItem {
    pub fn new(nodes: Vec<NodeId>) -> Self {
        Self {
            nodes: Arc::new(Mutex::new(nodes)),
        }
    }
}

impl RepeatItem for TestRepeatItem {
    fn tracked_nodes(&self) -> Vec<NodeId> {
        self.nodes.lock().clone()
    }

    fn set_tracked_nodes(&self, nodes: Vec<NodeId>) {
        *self.nodes.lock() = nodes;
    }
}

/// A [`Scope`] over flat names.
///
/// `{{ name }}` reads `name`; handlers are any call expression (text ending
/// in `)`) and record their invocations instead of running.
#[derive(Clone, Default)]
pub struct TestScope {
    values: Properties,
    assignments: Arc<Mutex<Vec<(String, Value)>>>,
    calls: Arc<Mutex<Vec<HandlerCall>>>,
    repeat: Option<TestRepeatItem>,
}

impl TestScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scope that is an item of a repeated list.
    pub fn with_repeat_item(mut self, item: TestRepeatItem) -> Self {
        self.repeat = Some(item);
        self
    }

    pub fn get(&self, name: &str) -> Value {
        self.values.get(name)
    }

    /// Write `name` as the host page would, notifying watchers.
    pub fn set(&self, name: &str, value: Value) {
        self.values.set(name, value);
    }

    pub fn watcher_count(&self, name: &str) -> usize {
        self.values.watcher_count(name)
    }

    /// Writes received through [`Scope::assign`].
    pub fn assignments(&self) -> Vec<(String, Value)> {
        self.assignments.lock().clone()
    }

    pub fn calls(&self) -> Vec<HandlerCall> {
        self.calls.lock().clone()
    }
}

fn interpolated_names(expression: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = expression;
    while let Some(open) = rest.find("{{") {
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            break;
        };
        names.push(after[..close].trim().to_string());
        rest = &after[close + 2..];
    }
    names
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn evaluate_with(values: &Properties, expression: &str) -> Value {
    if let Some(name) = single_interpolation(expression) {
        return values.get(name);
    }
    if !has_interpolation(expression) {
        return Value::String(expression.to_string());
    }

    let mut out = String::new();
    let mut rest = expression;
    while let Some(open) = rest.find("{{") {
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            break;
        };
        out.push_str(&rest[..open]);
        out.push_str(&display(&values.get(after[..close].trim())));
        rest = &after[close + 2..];
    }
    out.push_str(rest);
    Value::String(out)
}

impl Scope for TestScope {
    fn evaluate(&self, expression: &str) -> Value {
        evaluate_with(&self.values, expression)
    }

    fn watch(&self, expression: &str, callback: WatchCallback) -> Unwatch {
        let unwatches: Vec<Unwatch> = interpolated_names(expression)
            .into_iter()
            .map(|name| {
                let values = self.values.clone();
                let expression = expression.to_string();
                let callback = callback.clone();
                self.values.watch(
                    &name,
                    Arc::new(move |_: &Value| callback(&evaluate_with(&values, &expression))),
                )
            })
            .collect();

        Box::new(move || {
            for unwatch in unwatches {
                unwatch();
            }
        })
    }

    fn assign(&self, path: &str, value: Value) {
        self.assignments.lock().push((path.to_string(), value.clone()));
        self.values.set(path, value);
    }

    fn compile_handler(&self, expression: &str) -> Result<Handler, String> {
        let expression = expression.trim().to_string();
        if !(expression.contains('(') && expression.ends_with(')')) {
            return Err(format!("`{expression}` is not a call expression"));
        }

        let calls = self.calls.clone();
        Ok(Arc::new(move |event: &ComponentEvent| {
            calls.lock().push(HandlerCall {
                expression: expression.clone(),
                event_type: event.event_type.clone(),
                args: event.args.clone(),
            });
        }))
    }

    fn repeat_item(&self) -> Option<&dyn RepeatItem> {
        self.repeat.as_ref().map(|item| item as &dyn RepeatItem)
    }
}

type Response = Result<NodeId, TemplateError>;

#[derive(Default)]
struct LoaderState {
    responses: HashMap<String, Response>,
    held: HashMap<String, oneshot::Receiver<Response>>,
    requests: Vec<String>,
}

/// A [`TemplateLoader`] answering from a table of canned responses.
///
/// Unknown sources fail to load.
#[derive(Clone, Default)]
pub struct TestLoader {
    state: Arc<Mutex<LoaderState>>,
}

impl TestLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer requests for `source` with `response` immediately.
    pub fn respond(&self, source: &str, response: Response) {
        self.state.lock().responses.insert(source.to_string(), response);
    }

    /// Hold the next request for `source` open until the returned sender
    /// answers it. Dropping the sender fails the load.
    pub fn hold(&self, source: &str) -> oneshot::Sender<Response> {
        let (sender, receiver) = oneshot::channel();
        self.state.lock().held.insert(source.to_string(), receiver);
        sender
    }

    /// Sources requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().requests.clone()
    }
}

impl TemplateLoader for TestLoader {
    fn load_fragment(&self, source: &str) -> BoxFuture<'static, Response> {
        let mut state = self.state.lock();
        state.requests.push(source.to_string());

        if let Some(receiver) = state.held.remove(source) {
            return receiver
                .map(|answer| answer.unwrap_or_else(|_| Err(TemplateError::new("load abandoned"))))
                .boxed();
        }

        let response = state
            .responses
            .get(source)
            .cloned()
            .unwrap_or_else(|| Err(TemplateError::new(format!("{source}: not found"))));
        futures::future::ready(response).boxed()
    }
}

/// A [`TemplateCompiler`] whose linkers only record what they bound.
#[derive(Clone, Default)]
pub struct TestCompiler {
    compiled: Arc<Mutex<Vec<NodeId>>>,
    linked: Arc<Mutex<Vec<NodeId>>>,
    unbound: Arc<AtomicUsize>,
}

impl TestCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compiled(&self) -> Vec<NodeId> {
        self.compiled.lock().clone()
    }

    pub fn linked(&self) -> Vec<NodeId> {
        self.linked.lock().clone()
    }

    pub fn unbind_count(&self) -> usize {
        self.unbound.load(Ordering::SeqCst)
    }
}

impl TemplateCompiler for TestCompiler {
    fn compile(&self, node: NodeId) -> Linker {
        self.compiled.lock().push(node);

        let linked = self.linked.clone();
        let unbound = self.unbound.clone();
        Box::new(move |_: &ScopeRef, node: NodeId| {
            linked.lock().push(node);
            let unbind: Unbind = Box::new(move || {
                unbound.fetch_add(1, Ordering::SeqCst);
            });
            unbind
        })
    }
}
