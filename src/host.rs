//! Interfaces to the collaborators bindings consume.
//!
//! The engine never touches a real document, parser or loader directly. The
//! host page supplies them through these traits:
//!
//! - [`Dom`]: node insertion/removal, attributes, classes, computed style,
//!   end-of-transition notifications and timers
//! - [`Scope`]: the reactive expression context a binding was declared in
//! - [`TemplateLoader`]: fetches and compiles an external template into a
//!   detached fragment
//! - [`TemplateCompiler`]: compiles a node into a linker that binds it to a scope

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

use crate::component::ComponentEvent;

/// Identity of a node owned by the host document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

/// Handle of an event listener registered through [`Dom::add_event_listener`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Handle of a timer started through [`Dom::set_timeout`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

/// Style vendor of the host engine.
///
/// Decides the property prefix used for computed style lookups and the
/// names of the end-of-transition events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Vendor {
    #[default]
    Standard,
    Webkit,
    Moz,
    Ms,
}

impl Vendor {
    pub fn style_prefix(self) -> &'static str {
        match self {
            Vendor::Standard => "",
            Vendor::Webkit => "webkit",
            Vendor::Moz => "moz",
            Vendor::Ms => "ms",
        }
    }

    /// Only webkit engines fire prefixed end events.
    pub fn transition_end_event(self) -> &'static str {
        match self {
            Vendor::Webkit => "webkitTransitionEnd",
            _ => "transitionend",
        }
    }

    pub fn animation_end_event(self) -> &'static str {
        match self {
            Vendor::Webkit => "webkitAnimationEnd",
            _ => "animationend",
        }
    }

    /// Style property name with the vendor prefix applied,
    /// e.g. `transitionDuration` → `webkitTransitionDuration`.
    pub fn property(self, property: &str) -> String {
        let prefix = self.style_prefix();
        if prefix.is_empty() {
            return property.to_string();
        }

        let mut chars = property.chars();
        match chars.next() {
            Some(first) => format!("{prefix}{}{}", first.to_ascii_uppercase(), chars.as_str()),
            None => prefix.to_string(),
        }
    }
}

/// Callback fired when a DOM event reaches a listener.
pub type DomListener = Box<dyn Fn() + Send + Sync>;

/// Callback fired once when a timer elapses.
pub type TimerCallback = Box<dyn FnOnce() + Send>;

/// The host document.
///
/// Fragments follow DOM semantics: inserting or replacing with a fragment
/// moves its children into place and leaves the fragment empty.
///
/// Implementations must not hold internal locks while invoking listener or
/// timer callbacks; callbacks routinely call back into the `Dom`.
pub trait Dom: Send + Sync {
    /// Create a detached comment node used as a range marker.
    fn create_marker(&self, text: &str) -> NodeId;

    fn create_fragment(&self) -> NodeId;

    fn append_child(&self, parent: NodeId, child: NodeId);

    /// Put `node` where `old` is and detach `old`.
    fn replace(&self, node: NodeId, old: NodeId);

    fn insert_after(&self, node: NodeId, reference: NodeId);

    /// Detach `node` from its parent. No-op for detached nodes.
    fn remove(&self, node: NodeId);

    fn next_sibling(&self, node: NodeId) -> Option<NodeId>;

    fn child_nodes(&self, node: NodeId) -> Vec<NodeId>;

    /// Declared attributes in document order.
    fn attributes(&self, node: NodeId) -> Vec<(String, String)>;

    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    fn remove_attribute(&self, node: NodeId, name: &str);

    fn add_class(&self, node: NodeId, class: &str);

    fn remove_class(&self, node: NodeId, class: &str);

    /// Computed style value, e.g. `"0.3s"` for `transitionDuration`.
    fn computed_style(&self, node: NodeId, property: &str) -> String;

    fn set_style(&self, node: NodeId, property: &str, value: &str);

    fn vendor(&self) -> Vendor;

    fn add_event_listener(&self, node: NodeId, event: &str, listener: DomListener) -> ListenerId;

    fn remove_event_listener(&self, node: NodeId, listener: ListenerId);

    fn set_timeout(&self, delay: Duration, callback: TimerCallback) -> TimerId;

    fn clear_timeout(&self, timer: TimerId);
}

/// Fired with the new value whenever a watched expression or property changes.
pub type WatchCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Tears a watch down. Consumed on use, so it runs at most once.
pub type Unwatch = Box<dyn FnOnce() + Send>;

/// An event handler compiled once and bound to its scope.
pub type Handler = Arc<dyn Fn(&ComponentEvent) + Send + Sync>;

/// The reactive expression context a binding was declared in.
pub trait Scope: Send + Sync {
    /// Evaluate interpolated text. A single bare `{{ expr }}` yields the raw
    /// value; mixed text yields a string; text without interpolation yields
    /// itself.
    fn evaluate(&self, expression: &str) -> Value;

    /// Invoke `callback` whenever the value of `expression` changes.
    /// The callback is not fired for the current value.
    fn watch(&self, expression: &str, callback: WatchCallback) -> Unwatch;

    /// Write `value` to the property path `path`.
    fn assign(&self, path: &str, value: Value);

    /// Parse a handler statement once into a callable bound to this scope.
    fn compile_handler(&self, expression: &str) -> Result<Handler, String>;

    /// Present when this scope is an item of a repeated list.
    fn repeat_item(&self) -> Option<&dyn RepeatItem> {
        None
    }
}

/// Shared handle to a [`Scope`].
pub type ScopeRef = Arc<dyn Scope>;

/// A repeated-list item tracking the nodes it rendered.
pub trait RepeatItem: Send + Sync {
    fn tracked_nodes(&self) -> Vec<NodeId>;

    fn set_tracked_nodes(&self, nodes: Vec<NodeId>);
}

/// Failure reported by a template collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TemplateError {
    pub message: String,
}

impl TemplateError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Fetches and compiles external templates.
pub trait TemplateLoader: Send + Sync {
    /// Load `source` into a detached fragment node.
    fn load_fragment(&self, source: &str) -> BoxFuture<'static, Result<NodeId, TemplateError>>;
}

/// Detaches the bindings a [`Linker`] created.
pub type Unbind = Box<dyn FnOnce() + Send>;

/// Binds a compiled node to a scope.
pub type Linker = Box<dyn FnOnce(&ScopeRef, NodeId) -> Unbind + Send>;

/// Compiles markup into linkers.
pub trait TemplateCompiler: Send + Sync {
    fn compile(&self, node: NodeId) -> Linker;
}
