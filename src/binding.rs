//! The component binding lifecycle.
//!
//! ```text
//! Initializing ─▶ Resolving (async only) ─▶ Ready ─▶ ProcessingAttributes
//!                      │                                   │
//!                      ▼                                   ▼
//!              ResolutionFailed                       Realizing ─▶ Mounted
//!                                                          │
//!                                                          ▼
//!                                                    RealizeFailed
//! ```
//!
//! Any state can move to `Released`. Release is idempotent and safe while
//! resolution or realisation is still in flight: the task is aborted and
//! re-checks the disposed flag after every suspension point, so it never
//! instantiates a component or touches the document afterwards.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures::future::{abortable, AbortHandle};
use serde_json::Value;
use spin::Mutex;

use crate::component::{lifecycle, Component, ComponentEvent};
use crate::emitter::Listener;
use crate::error::{BindingError, Result};
use crate::host::{NodeId, ScopeRef, Unwatch};
use crate::markup::{camel_case, has_interpolation, parse_event_statements, parse_static, single_interpolation};
use crate::runtime::Runtime;

/// Where a component binding is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingState {
    Initializing,
    Resolving,
    Ready,
    ProcessingAttributes,
    Realizing,
    Mounted,
    Released,
    ResolutionFailed,
    RealizeFailed,
}

/// How one component property is fed.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyBinding {
    /// Attribute text the property came from.
    pub expression: String,
    /// Last value written through the binding.
    pub value: Value,
    /// Whether the property is driven by a watch.
    pub dynamic: bool,
}

type PropertyTable = Arc<Mutex<HashMap<String, PropertyBinding>>>;

struct Core {
    runtime: Runtime,
    name: String,
    element: NodeId,
    disposed: AtomicBool,
    scope: Mutex<Option<ScopeRef>>,
    state: Mutex<BindingState>,
    failure: Mutex<Option<BindingError>>,
    component: Mutex<Option<Arc<dyn Component>>>,
    properties: PropertyTable,
    events: Mutex<HashMap<String, String>>,
    unwatches: Mutex<Vec<Unwatch>>,
    markers: Mutex<Option<(NodeId, NodeId)>>,
    realization: Mutex<Option<AbortHandle>>,
}

/// Mounts a component in place of its placeholder element and keeps its
/// properties and events wired to the declaring scope.
///
/// Clones are handles onto the same binding.
#[derive(Clone)]
pub struct ComponentBinding {
    core: Arc<Core>,
}

impl ComponentBinding {
    /// Resolve the component named `name` for `element` and start mounting it.
    ///
    /// Synchronously registered components are instantiated and have their
    /// attributes processed before this returns; configuration errors are
    /// returned here. Components with an external template (a template
    /// source attribute or a registered resource) resolve on the spawner.
    pub fn init(runtime: &Runtime, element: NodeId, name: &str, scope: ScopeRef) -> Result<Self> {
        let binding = Self {
            core: Arc::new(Core {
                runtime: runtime.clone(),
                name: name.to_string(),
                element,
                disposed: AtomicBool::new(false),
                scope: Mutex::new(Some(scope)),
                state: Mutex::new(BindingState::Initializing),
                failure: Mutex::new(None),
                component: Mutex::new(None),
                properties: PropertyTable::default(),
                events: Mutex::new(HashMap::new()),
                unwatches: Mutex::new(Vec::new()),
                markers: Mutex::new(None),
                realization: Mutex::new(None),
            }),
        };

        let dom = runtime.dom();
        let source_attribute = &runtime.config().template_source_attribute;
        let source = dom.attribute(element, source_attribute);
        dom.remove_attribute(element, source_attribute);

        if let Some(source) = source.filter(|source| !source.is_empty()) {
            binding.core.resolve_async(source);
            return Ok(binding);
        }

        let Some(factory) = runtime.components().constructor(name) else {
            if let Some(resource) = runtime.components().resource(name) {
                binding.core.resolve_async(resource);
                return Ok(binding);
            }
            return Err(BindingError::UnknownComponent {
                name: name.to_string(),
            });
        };

        binding.core.set_state(BindingState::Ready);
        let component = factory();
        *binding.core.component.lock() = Some(component.clone());

        if let Err(error) = binding.core.process_attributes(&component) {
            binding.release();
            return Err(error);
        }

        binding.core.set_state(BindingState::Realizing);
        let core = binding.core.clone();
        binding.core.spawn(async move { core.realize(component).await });
        Ok(binding)
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// The placeholder element the binding was declared on.
    pub fn element(&self) -> NodeId {
        self.core.element
    }

    pub fn state(&self) -> BindingState {
        *self.core.state.lock()
    }

    /// Why the binding failed, if it did.
    pub fn failure(&self) -> Option<BindingError> {
        self.core.failure.lock().clone()
    }

    pub fn component(&self) -> Option<Arc<dyn Component>> {
        self.core.component.lock().clone()
    }

    pub fn properties(&self) -> HashMap<String, PropertyBinding> {
        self.core.properties.lock().clone()
    }

    /// Declared event name → handler expression.
    pub fn events(&self) -> HashMap<String, String> {
        self.core.events.lock().clone()
    }

    /// Head and tail markers bracketing the rendered template.
    pub fn markers(&self) -> Option<(NodeId, NodeId)> {
        *self.core.markers.lock()
    }

    pub fn is_released(&self) -> bool {
        self.core.disposed.load(Ordering::SeqCst)
    }

    pub fn same(&self, other: &ComponentBinding) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }

    /// Tear the binding down.
    ///
    /// Aborts pending resolution, releases the component, runs every watch
    /// teardown exactly once, and removes both markers together.
    pub fn release(&self) {
        let core = &self.core;
        if core.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let realization = core.realization.lock().take();
        if let Some(realization) = realization {
            realization.abort();
        }

        let component = core.component.lock().take();
        if let Some(component) = component {
            component.emitter().emit(lifecycle::RELEASE, &[]);
            component.release();
            component.emitter().unsubscribe_all(None);
        }

        let unwatches = std::mem::take(&mut *core.unwatches.lock());
        for unwatch in unwatches {
            unwatch();
        }

        let markers = core.markers.lock().take();
        if let Some((head, tail)) = markers {
            let dom = core.runtime.dom();
            dom.remove(head);
            dom.remove(tail);

            let refs = core.runtime.bindings();
            refs.detach(head, core);
            refs.detach(tail, core);
        }

        core.properties.lock().clear();
        core.events.lock().clear();
        core.scope.lock().take();
        core.set_state(BindingState::Released);
        tracing::debug!(component = %core.name, "component binding released");
    }
}

impl Core {
    fn set_state(&self, state: BindingState) {
        let mut current = self.state.lock();
        if *current != BindingState::Released {
            *current = state;
        }
    }

    fn fail(&self, state: BindingState, error: BindingError) {
        tracing::error!(component = %self.name, error = %error, "component binding failed");
        *self.failure.lock() = Some(error);
        self.set_state(state);
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn scope(&self) -> Option<ScopeRef> {
        self.scope.lock().clone()
    }

    fn spawn(&self, future: impl std::future::Future<Output = ()> + Send + 'static) {
        let (task, handle) = abortable(future);
        *self.realization.lock() = Some(handle);
        self.runtime.spawner().spawn(Box::pin(async move {
            let _ = task.await;
        }));
    }

    fn resolve_async(self: &Arc<Self>, source: String) {
        self.set_state(BindingState::Resolving);

        let core = self.clone();
        self.spawn(async move {
            let loaded = core.runtime.loader().load_fragment(&source).await;
            if core.is_disposed() {
                return;
            }

            let fragment = match loaded {
                Ok(fragment) => fragment,
                Err(source) => {
                    let error = BindingError::TemplateLoad {
                        name: core.name.clone(),
                        source,
                    };
                    return core.fail(BindingState::ResolutionFailed, error);
                }
            };

            let Some(factory) = core.runtime.components().constructor(&core.name) else {
                let error = BindingError::UnknownComponent {
                    name: core.name.clone(),
                };
                return core.fail(BindingState::ResolutionFailed, error);
            };

            core.set_state(BindingState::Ready);
            let component = factory();
            component.set_element(core.runtime.dom().child_nodes(fragment));
            *core.component.lock() = Some(component.clone());

            if let Err(error) = core.process_attributes(&component) {
                core.unwind_watches();
                return core.fail(BindingState::ResolutionFailed, error);
            }

            core.realize(component).await;
        });
    }

    fn unwind_watches(&self) {
        let unwatches = std::mem::take(&mut *self.unwatches.lock());
        for unwatch in unwatches {
            unwatch();
        }
    }

    fn two_way_properties(&self) -> HashSet<String> {
        let dom = self.runtime.dom();
        let attribute = &self.runtime.config().two_way_attribute;
        let value = dom.attribute(self.element, attribute);
        dom.remove_attribute(self.element, attribute);

        value
            .map(|value| value.split_whitespace().map(camel_case).collect())
            .unwrap_or_default()
    }

    fn process_attributes(&self, component: &Arc<dyn Component>) -> Result<()> {
        self.set_state(BindingState::ProcessingAttributes);

        let config = self.runtime.config();
        let dom = self.runtime.dom();
        let two_way = self.two_way_properties();

        self.process_event_directive(component)?;

        for (name, value) in dom.attributes(self.element) {
            if config.is_directive(&name) {
                tracing::warn!(
                    component = %self.name,
                    attribute = %name,
                    "binding directives are not supported on a component tag"
                );
                continue;
            }

            if value.is_empty() {
                component.set(&camel_case(&name), Value::Bool(true));
                continue;
            }

            let expression = value.trim();
            if let Some(event) = name.strip_prefix(config.event_attribute_prefix.as_str()) {
                self.register_event(component, &camel_case(event), expression)?;
                continue;
            }

            let property = camel_case(&name);
            if !has_interpolation(expression) {
                let parsed = parse_static(&value);
                self.properties.lock().insert(
                    property.clone(),
                    PropertyBinding {
                        expression: value.clone(),
                        value: parsed.clone(),
                        dynamic: false,
                    },
                );
                component.set(&property, parsed);
                continue;
            }

            let is_two_way = two_way.contains(&property);
            self.watch_property(component, property, expression, is_two_way)?;
        }

        component.emitter().emit(lifecycle::CREATED, &[]);
        Ok(())
    }

    fn process_event_directive(&self, component: &Arc<dyn Component>) -> Result<()> {
        let dom = self.runtime.dom();
        let directive = self.runtime.config().event_directive();
        let Some(text) = dom.attribute(self.element, &directive) else {
            return Ok(());
        };
        dom.remove_attribute(self.element, &directive);

        for (event, expression) in parse_event_statements(&text)? {
            self.register_event(component, &event, &expression)?;
        }
        Ok(())
    }

    fn register_event(&self, component: &Arc<dyn Component>, event: &str, expression: &str) -> Result<()> {
        let Some(scope) = self.scope() else {
            return Ok(());
        };
        let handler = scope
            .compile_handler(expression)
            .map_err(|message| BindingError::InvalidHandler {
                event: event.to_string(),
                expression: expression.to_string(),
                message,
            })?;

        self.events.lock().insert(event.to_string(), expression.to_string());

        let target = Arc::downgrade(component);
        let event_type = event.to_string();
        let statement = expression.to_string();
        let listener: Listener = Arc::new(move |args: &[Value]| {
            let Some(target) = target.upgrade() else {
                return;
            };
            tracing::debug!(event = %event_type, expression = %statement, "component event");
            handler(&ComponentEvent {
                event_type: event_type.clone(),
                args: args.to_vec(),
                target,
            });
        });
        component.emitter().subscribe(event, listener);
        Ok(())
    }

    fn watch_property(
        &self,
        component: &Arc<dyn Component>,
        property: String,
        expression: &str,
        two_way: bool,
    ) -> Result<()> {
        let Some(scope) = self.scope() else {
            return Ok(());
        };

        let owner = if two_way {
            let owner = single_interpolation(expression).ok_or_else(|| BindingError::InvalidTwoWay {
                property: property.clone(),
                expression: expression.to_string(),
            })?;
            Some(owner.to_string())
        } else {
            None
        };

        self.properties.lock().insert(
            property.clone(),
            PropertyBinding {
                expression: expression.to_string(),
                value: Value::Null,
                dynamic: true,
            },
        );

        if let Some(owner) = owner {
            let scope = scope.clone();
            let properties = self.properties.clone();
            let (name, expression) = (property.clone(), expression.to_string());
            let unwatch = component.watch(
                &property,
                Arc::new(move |value: &Value| {
                    if scope.evaluate(&expression) == *value {
                        return;
                    }
                    record(&properties, &name, value);
                    scope.assign(&owner, value.clone());
                }),
            );
            self.unwatches.lock().push(unwatch);
        }

        let target: Weak<dyn Component> = Arc::downgrade(component);
        let properties = self.properties.clone();
        let apply: Arc<dyn Fn(&Value) + Send + Sync> = Arc::new(move |value: &Value| {
            let Some(component) = target.upgrade() else {
                return;
            };
            if component.get(&property) == *value {
                return;
            }
            record(&properties, &property, value);
            component.set(&property, value.clone());
        });

        let unwatch = scope.watch(expression, apply.clone());
        self.unwatches.lock().push(unwatch);

        apply(&scope.evaluate(expression));
        Ok(())
    }

    async fn realize(self: Arc<Self>, component: Arc<dyn Component>) {
        self.set_state(BindingState::Realizing);

        let template = component.process_template().await;
        if self.is_disposed() {
            return;
        }

        let fragment = match template {
            Ok(fragment) => fragment,
            Err(source) => {
                let error = BindingError::Realize {
                    name: self.name.clone(),
                    source,
                };
                self.fail(BindingState::RealizeFailed, error);
                component.emitter().emit(lifecycle::TEMPLATE_LOAD_FAILED, &[]);
                return;
            }
        };
        let Some(scope) = self.scope() else {
            return;
        };

        let dom = self.runtime.dom();
        let rendered = dom.child_nodes(fragment);
        let head = dom.create_marker(&format!("<component>: {}", self.name));
        let tail = dom.create_marker(&format!("</component>: {}", self.name));

        dom.replace(head, self.element);
        dom.insert_after(tail, head);
        dom.insert_after(fragment, head);
        *self.markers.lock() = Some((head, tail));

        let refs = self.runtime.bindings();
        refs.attach(head, &self);
        refs.attach(tail, &self);

        component.mount(&rendered, &scope, self.element);
        if self.is_disposed() {
            return;
        }

        let mut nodes = vec![head];
        let mut current = dom.next_sibling(head);
        while let Some(node) = current {
            if node == tail {
                break;
            }
            nodes.push(node);
            current = dom.next_sibling(node);
        }
        nodes.push(tail);

        if let Some(item) = scope.repeat_item() {
            if item.tracked_nodes() == [self.element] {
                item.set_tracked_nodes(nodes);
            }
        }

        self.set_state(BindingState::Mounted);
        tracing::debug!(component = %self.name, "component mounted");
        component.emitter().emit(lifecycle::MOUNTED, &[]);
    }
}

fn record(properties: &PropertyTable, property: &str, value: &Value) {
    if let Some(binding) = properties.lock().get_mut(property) {
        binding.value = value.clone();
    }
}

/// Weak association from marker nodes to the component binding they bracket.
///
/// Entries are added when a template is mounted and removed when the
/// binding is released.
#[derive(Clone, Default)]
pub struct BindingRefs {
    refs: Arc<Mutex<HashMap<NodeId, Weak<Core>>>>,
}

impl BindingRefs {
    fn attach(&self, node: NodeId, core: &Arc<Core>) {
        self.refs.lock().insert(node, Arc::downgrade(core));
    }

    fn detach(&self, node: NodeId, core: &Arc<Core>) {
        let mut refs = self.refs.lock();
        if refs
            .get(&node)
            .is_some_and(|held| std::ptr::eq(held.as_ptr(), Arc::as_ptr(core)))
        {
            refs.remove(&node);
        }
    }

    /// The live binding bracketed by `node`, if it is a marker.
    pub fn lookup(&self, node: NodeId) -> Option<ComponentBinding> {
        let core = self.refs.lock().get(&node)?.upgrade()?;
        Some(ComponentBinding { core })
    }

    pub fn len(&self) -> usize {
        self.refs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
