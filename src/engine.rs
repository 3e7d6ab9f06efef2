//! Enter/exit actions on nodes.
//!
//! A descriptor names the work to run for one lifecycle phase:
//!
//! - a number is a delay in seconds (`"0.5"`)
//! - a name registered with [`ActionEngine::define`] runs that scripted action
//! - anything else is a CSS class stem: `fade` toggles `fade-created` /
//!   `fade-removed`, and an empty descriptor uses `<prefix>created` /
//!   `<prefix>removed`
//!
//! Every node has at most one live [`Action`]. Starting a phase on a node
//! first cancels whatever is still running there, which is how an exit
//! interrupts an unfinished enter.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use spin::{Mutex, Once};

use crate::action::{Action, Canceller};
use crate::config::Config;
use crate::error::{BindingError, Result};
use crate::host::{Dom, ListenerId, NodeId, ScopeRef};
use crate::markup::split_descriptors;
use crate::runtime::Runtime;
use crate::scheduler::Spawner;
use serde_json::Value;

/// Lifecycle phase an action runs for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Created,
    Removed,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Created => "created",
            Phase::Removed => "removed",
        }
    }
}

/// Completion callback handed to a scripted action.
pub type Done = Box<dyn FnOnce() + Send>;

/// Runs one phase of a scripted action on a node and returns its canceller.
pub type ActionExecutor = Arc<dyn Fn(NodeId, Done) -> Canceller + Send + Sync>;

/// A scripted enter/exit pair registered by name.
#[derive(Clone)]
pub struct ActionDefinition {
    pub created: ActionExecutor,
    pub removed: ActionExecutor,
}

impl ActionDefinition {
    pub fn new(created: ActionExecutor, removed: ActionExecutor) -> Self {
        Self { created, removed }
    }

    fn executor(&self, phase: Phase) -> &ActionExecutor {
        match phase {
            Phase::Created => &self.created,
            Phase::Removed => &self.removed,
        }
    }
}

struct VendorNames {
    transition_duration: String,
    animation_duration: String,
    fill_mode: String,
    transition_end: &'static str,
    animation_end: &'static str,
}

struct EngineInner {
    config: Config,
    dom: Arc<dyn Dom>,
    spawner: Arc<dyn Spawner>,
    definitions: Mutex<HashMap<String, ActionDefinition>>,
    current: Mutex<HashMap<NodeId, Action>>,
    vendor: Once<VendorNames>,
}

/// Runs descriptors against nodes and owns the per-node action records.
///
/// A node's record is dropped when its action settles, when a new phase
/// supersedes it, and through [`forget`](Self::forget).
#[derive(Clone)]
pub struct ActionEngine {
    inner: Arc<EngineInner>,
}

impl ActionEngine {
    pub fn new(config: Config, dom: Arc<dyn Dom>, spawner: Arc<dyn Spawner>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config,
                dom,
                spawner,
                definitions: Mutex::new(HashMap::new()),
                current: Mutex::new(HashMap::new()),
                vendor: Once::new(),
            }),
        }
    }

    /// Register a scripted action under `name`. The last registration wins.
    pub fn define(&self, name: &str, definition: ActionDefinition) -> Result<()> {
        let invalid = |reason| BindingError::InvalidName {
            kind: "action",
            name: name.to_string(),
            reason,
        };

        if name.is_empty() {
            return Err(invalid("name is empty"));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(invalid("descriptors are whitespace separated"));
        }
        if parse_delay(name).is_some() {
            return Err(invalid("numeric names are read as delays"));
        }

        if self
            .inner
            .definitions
            .lock()
            .insert(name.to_string(), definition)
            .is_some()
        {
            tracing::warn!(action = name, "action definition overwritten");
        }
        Ok(())
    }

    pub fn definition(&self, name: &str) -> Option<ActionDefinition> {
        self.inner.definitions.lock().get(name).cloned()
    }

    /// Run a single descriptor on `node` without touching its action record.
    pub fn run(&self, node: NodeId, descriptor: &str, phase: Phase) -> Action {
        let descriptor = descriptor.trim();
        tracing::trace!(?node, descriptor, phase = phase.as_str(), "action started");

        if let Some(delay) = parse_delay(descriptor) {
            return self.wait(delay);
        }
        if let Some(definition) = self.definition(descriptor) {
            return run_scripted(node, &definition, phase);
        }
        self.run_css(node, descriptor, phase)
    }

    /// Start `phase` on `node`, one descriptor after another.
    ///
    /// Cancels the node's current action first. The returned action stands
    /// for the whole sequence: cancelling it cancels the running step and
    /// drops the rest.
    pub fn start(&self, node: NodeId, descriptors: &[String], phase: Phase) -> Action {
        self.cancel(node);

        let action = match descriptors {
            [] => self.run(node, "", phase),
            [only] => self.run(node, only, phase),
            [first, rest @ ..] => self.sequence(node, first, rest.to_vec(), phase),
        };
        self.inner.current.lock().insert(node, action.clone());

        let engine = self.clone();
        let finished = action.clone();
        action.then(&*self.inner.spawner, move || engine.discard(node, &finished));
        action
    }

    fn sequence(&self, node: NodeId, first: &str, rest: Vec<String>, phase: Phase) -> Action {
        let aggregate = Action::pending();
        let step = self.run(node, first, phase);
        let running = Arc::new(Mutex::new(Some(step.clone())));

        let cancel_running = running.clone();
        aggregate.set_canceller(Box::new(move || {
            let step = cancel_running.lock().take();
            if let Some(step) = step {
                step.cancel();
            }
        }));

        let engine = self.clone();
        let queue = aggregate.clone();
        self.inner.spawner.spawn(Box::pin(async move {
            let mut step = step;
            let mut rest = rest.into_iter();

            loop {
                if !step.finished().await.is_settled() || !queue.is_pending() {
                    return;
                }
                match rest.next() {
                    Some(descriptor) => {
                        step = engine.run(node, &descriptor, phase);
                        *running.lock() = Some(step.clone());
                    }
                    None => break,
                }
            }

            running.lock().take();
            queue.settle();
        }));

        aggregate
    }

    /// The action currently running on `node`.
    pub fn current(&self, node: NodeId) -> Option<Action> {
        self.inner.current.lock().get(&node).cloned()
    }

    /// Cancel and drop the node's current action. Returns whether one was pending.
    pub fn cancel(&self, node: NodeId) -> bool {
        let current = self.inner.current.lock().remove(&node);
        current.is_some_and(|action| action.cancel())
    }

    /// Drop the node's record without cancelling it.
    pub fn forget(&self, node: NodeId) {
        self.inner.current.lock().remove(&node);
    }

    /// Resolves once the node's current action has finished, at once when
    /// there is none.
    pub fn when_idle(&self, node: NodeId) -> impl core::future::Future<Output = ()> + Send + 'static {
        let current = self.current(node);
        async move {
            if let Some(action) = current {
                action.finished().await;
            }
        }
    }

    fn discard(&self, node: NodeId, action: &Action) {
        tracing::trace!(?node, "action settled");
        let mut current = self.inner.current.lock();
        if current.get(&node).is_some_and(|live| live.same(action)) {
            current.remove(&node);
        }
    }

    fn wait(&self, delay: Duration) -> Action {
        let action = Action::pending();
        let settle = action.clone();
        let timer = self.inner.dom.set_timeout(
            delay,
            Box::new(move || {
                settle.settle();
            }),
        );

        let dom = self.inner.dom.clone();
        action.set_canceller(Box::new(move || dom.clear_timeout(timer)));
        action
    }

    fn vendor_names(&self) -> &VendorNames {
        self.inner.vendor.call_once(|| {
            let vendor = self.inner.dom.vendor();
            VendorNames {
                transition_duration: vendor.property("transitionDuration"),
                animation_duration: vendor.property("animationDuration"),
                fill_mode: vendor.property("animationFillMode"),
                transition_end: vendor.transition_end_event(),
                animation_end: vendor.animation_end_event(),
            }
        })
    }

    fn run_css(&self, node: NodeId, descriptor: &str, phase: Phase) -> Action {
        let dom = &self.inner.dom;
        let names = self.vendor_names();
        let (stem, class) = if descriptor.is_empty() {
            let prefix = self.inner.config.prefix.clone();
            let class = self.inner.config.default_action_class(phase.as_str());
            (prefix, class)
        } else {
            (format!("{descriptor}-"), format!("{descriptor}-{}", phase.as_str()))
        };

        // Transition duration must be read before the class lands for the
        // transition to start; animation duration only exists after.
        let transition_set = duration_is_set(&dom.computed_style(node, &names.transition_duration));
        dom.add_class(node, &class);
        let animation_set = duration_is_set(&dom.computed_style(node, &names.animation_duration));

        let action = Action::pending();
        if !transition_set && !animation_set {
            action.settle();
            return action;
        }
        dom.set_style(node, &names.fill_mode, "both");

        let listeners: Arc<Mutex<Vec<ListenerId>>> = Arc::default();
        let on_end: Arc<dyn Fn() + Send + Sync> = {
            let dom = dom.clone();
            let listeners = listeners.clone();
            let action = action.clone();
            let class = class.clone();
            Arc::new(move || {
                let registered = core::mem::take(&mut *listeners.lock());
                for listener in registered {
                    dom.remove_event_listener(node, listener);
                }
                if !action.is_pending() {
                    return;
                }
                if phase == Phase::Removed {
                    dom.remove_class(node, &format!("{stem}{}", Phase::Created.as_str()));
                    dom.remove_class(node, &class);
                }
                action.settle();
            })
        };

        for event in [names.animation_end, names.transition_end] {
            let on_end = on_end.clone();
            let id = dom.add_event_listener(node, event, Box::new(move || on_end()));
            listeners.lock().push(id);
        }

        let dom = dom.clone();
        action.set_canceller(Box::new(move || {
            let registered = core::mem::take(&mut *listeners.lock());
            for listener in registered {
                dom.remove_event_listener(node, listener);
            }
            dom.remove_class(node, &class);
        }));
        action
    }
}

fn run_scripted(node: NodeId, definition: &ActionDefinition, phase: Phase) -> Action {
    let action = Action::pending();
    let done = action.clone();
    let canceller = (definition.executor(phase))(
        node,
        Box::new(move || {
            done.settle();
        }),
    );
    action.set_canceller(canceller);
    action
}

/// Longest delay a timer is armed for, the 32-bit millisecond cap hosts apply.
pub const MAX_DELAY: Duration = Duration::from_millis(i32::MAX as u64);

/// Delay of a numeric descriptor. Negative delays run as zero, longer ones
/// than [`MAX_DELAY`] run as [`MAX_DELAY`].
fn parse_delay(descriptor: &str) -> Option<Duration> {
    if descriptor.is_empty() {
        return None;
    }
    descriptor
        .parse::<f64>()
        .ok()
        .filter(|seconds| seconds.is_finite())
        .map(|seconds| {
            Duration::try_from_secs_f64(seconds.max(0.0))
                .map_or(MAX_DELAY, |delay| delay.min(MAX_DELAY))
        })
}

/// `"0s"`, `"0s, 0s"` and unparseable values count as unset.
fn duration_is_set(value: &str) -> bool {
    value.split(',').map(str::trim).any(|entry| {
        let seconds = if let Some(ms) = entry.strip_suffix("ms") {
            ms.trim().parse::<f64>().map(|ms| ms / 1000.0)
        } else if let Some(s) = entry.strip_suffix('s') {
            s.trim().parse::<f64>()
        } else {
            return false;
        };
        seconds.is_ok_and(|seconds| seconds > 0.0)
    })
}

/// The action directive: runs the created phase on init and the removed
/// phase, in reverse descriptor order, on release.
pub struct ActionBinding {
    engine: ActionEngine,
    element: NodeId,
    expression: Option<String>,
    scope: Option<ScopeRef>,
}

impl ActionBinding {
    pub fn init(runtime: &Runtime, element: NodeId, expression: Option<&str>, scope: ScopeRef) -> Self {
        let binding = Self {
            engine: runtime.actions().clone(),
            element,
            expression: expression.map(str::to_string),
            scope: Some(scope),
        };
        binding.run_phase(Phase::Created);
        binding
    }

    pub fn element(&self) -> NodeId {
        self.element
    }

    /// Descriptors for `phase`, re-evaluated against the scope.
    pub fn descriptors(&self, phase: Phase) -> Vec<String> {
        let (Some(expression), Some(scope)) = (self.expression.as_deref(), self.scope.as_ref()) else {
            return Vec::new();
        };
        if expression.trim().is_empty() {
            return Vec::new();
        }

        let text = match scope.evaluate(expression) {
            Value::String(text) => text,
            Value::Null => String::new(),
            other => other.to_string(),
        };
        let mut descriptors = split_descriptors(&text);
        if phase == Phase::Removed {
            descriptors.reverse();
        }
        descriptors
    }

    fn run_phase(&self, phase: Phase) -> Action {
        self.engine.start(self.element, &self.descriptors(phase), phase)
    }

    /// Run the exit phase. Later calls return `None`.
    pub fn release(&mut self) -> Option<Action> {
        self.scope.as_ref()?;
        let action = self.run_phase(Phase::Removed);
        self.scope = None;
        self.expression = None;
        Some(action)
    }
}
