//! Components, their property bags and the name registry.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use spin::Mutex;

use crate::emitter::{EventEmitter, Listener};
use crate::error::{BindingError, Result};
use crate::host::{NodeId, ScopeRef, TemplateError, Unwatch, WatchCallback};

/// Lifecycle events emitted on a component's [`EventEmitter`].
pub mod lifecycle {
    /// Attribute processing finished; properties and handlers are in place.
    pub const CREATED: &str = "created";
    /// The rendered template sits in the document and is bound.
    pub const MOUNTED: &str = "mounted";
    /// The binding is tearing the component down.
    pub const RELEASE: &str = "release";
    /// The component's template could not be materialised.
    pub const TEMPLATE_LOAD_FAILED: &str = "templateLoadFailed";
}

/// A component implementation driven by a component binding.
///
/// Components compose an [`EventEmitter`] for their events and usually a
/// [`Properties`] bag for their state.
pub trait Component: Send + Sync {
    fn emitter(&self) -> &EventEmitter;

    /// Current value of `property`, `Value::Null` when unset.
    fn get(&self, property: &str) -> Value;

    fn set(&self, property: &str, value: Value);

    /// Invoke `callback` with the new value whenever `property` changes.
    fn watch(&self, property: &str, callback: WatchCallback) -> Unwatch;

    /// Hand over the nodes of an externally loaded template before
    /// attribute processing starts.
    fn set_element(&self, _nodes: Vec<NodeId>) {}

    /// Materialise the template into a detached fragment.
    fn process_template(&self) -> BoxFuture<'static, core::result::Result<NodeId, TemplateError>>;

    /// Bind the rendered `nodes` now that they sit in the document.
    fn mount(&self, nodes: &[NodeId], scope: &ScopeRef, placeholder: NodeId);

    /// Release the component and its children.
    fn release(&self);
}

/// Creates component instances for a registered name.
pub type ComponentFactory = Arc<dyn Fn() -> Arc<dyn Component> + Send + Sync>;

/// The synthetic event object passed to declared handlers.
#[derive(Clone)]
pub struct ComponentEvent {
    /// Name the event was emitted under.
    pub event_type: String,
    /// Arguments forwarded from the emission.
    pub args: Vec<Value>,
    /// The emitting component.
    pub target: Arc<dyn Component>,
}

impl core::fmt::Debug for ComponentEvent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ComponentEvent")
            .field("event_type", &self.event_type)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// A watchable property bag.
///
/// Writes that do not change the stored value notify nobody. Watchers run
/// synchronously, in registration order, after the value is stored.
#[derive(Clone, Default)]
pub struct Properties {
    values: Arc<Mutex<HashMap<String, Value>>>,
    changes: EventEmitter,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Value {
        self.values.lock().get(name).cloned().unwrap_or(Value::Null)
    }

    /// Store `value`. Returns whether watchers were notified.
    pub fn set(&self, name: &str, value: Value) -> bool {
        let previous = self
            .values
            .lock()
            .insert(name.to_string(), value.clone())
            .unwrap_or(Value::Null);

        if previous == value {
            return false;
        }
        self.changes.emit(name, &[value, previous]);
        true
    }

    pub fn watch(&self, name: &str, callback: WatchCallback) -> Unwatch {
        let listener: Listener = Arc::new(move |args: &[Value]| {
            if let Some(value) = args.first() {
                callback(value);
            }
        });
        self.changes.subscribe(name, listener.clone());

        let changes = self.changes.clone();
        let name = name.to_string();
        Box::new(move || {
            changes.unsubscribe(&name, &listener);
        })
    }

    pub fn watcher_count(&self, name: &str) -> usize {
        self.changes.listener_count(name)
    }

    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.values.lock().clone()
    }
}

#[derive(Default)]
struct Registrations {
    factories: HashMap<String, ComponentFactory>,
    resources: HashMap<String, String>,
}

/// Name → implementation registry for components.
///
/// Names are validated when registered. Registering a name twice keeps the
/// last definition and logs a warning.
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    registrations: Arc<Mutex<Registrations>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a synchronous factory under `name`.
    pub fn define(&self, name: &str, factory: ComponentFactory) -> Result<()> {
        validate_component_name(name)?;
        if self
            .registrations
            .lock()
            .factories
            .insert(name.to_string(), factory)
            .is_some()
        {
            tracing::warn!(component = name, "component definition overwritten");
        }
        Ok(())
    }

    /// Register an external template source for a component whose
    /// implementation becomes available once that template is loaded.
    pub fn define_resource(&self, name: &str, source: impl Into<String>) -> Result<()> {
        validate_component_name(name)?;
        if self
            .registrations
            .lock()
            .resources
            .insert(name.to_string(), source.into())
            .is_some()
        {
            tracing::warn!(component = name, "component resource overwritten");
        }
        Ok(())
    }

    pub fn constructor(&self, name: &str) -> Option<ComponentFactory> {
        self.registrations.lock().factories.get(name).cloned()
    }

    pub fn resource(&self, name: &str) -> Option<String> {
        self.registrations.lock().resources.get(name).cloned()
    }
}

fn validate_component_name(name: &str) -> Result<()> {
    let invalid = |reason| BindingError::InvalidName {
        kind: "component",
        name: name.to_string(),
        reason,
    };

    match name.chars().next() {
        None => return Err(invalid("name is empty")),
        Some(first) if !first.is_ascii_lowercase() => {
            return Err(invalid("name must start with a lowercase letter"))
        }
        _ => {}
    }

    if name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        Ok(())
    } else {
        Err(invalid("only lowercase letters, digits and `-` are allowed"))
    }
}

