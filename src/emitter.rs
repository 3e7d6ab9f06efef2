//! Per-object event pub/sub.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use spin::Mutex;

/// A callback registered on an [`EventEmitter`].
///
/// Listeners are compared by identity: pass the same `Arc` to
/// [`unsubscribe`](EventEmitter::unsubscribe) that was given to
/// [`subscribe`](EventEmitter::subscribe).
pub type Listener = Arc<dyn Fn(&[Value]) + Send + Sync>;

static NEXT_EMITTER_ID: AtomicU64 = AtomicU64::new(1);

struct Registration {
    listener: Listener,
    once: bool,
    fired: AtomicBool,
}

impl Registration {
    fn holds(&self, listener: &Listener) -> bool {
        same_listener(&self.listener, listener)
    }
}

fn same_listener(a: &Listener, b: &Listener) -> bool {
    core::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

type Registry = HashMap<String, Vec<Arc<Registration>>>;

/// Mapping from event name to an ordered listener list.
///
/// Components hold one of these rather than inheriting pub/sub behaviour.
/// Cloning yields another handle onto the same listener table.
///
/// The table is owned by the emitter: it is created empty, a type's entry
/// disappears when its last listener goes, and everything is released by
/// [`unsubscribe_all(None)`](Self::unsubscribe_all) or when the last handle
/// is dropped.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use oxide_bind::{EventEmitter, Listener, Value};
///
/// let emitter = EventEmitter::new();
/// let hits = Arc::new(AtomicUsize::new(0));
/// let counter = hits.clone();
/// let listener: Listener = Arc::new(move |_args: &[Value]| {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
///
/// emitter.subscribe_once("ping", listener);
/// emitter.emit("ping", &[]).emit("ping", &[]);
///
/// assert_eq!(hits.load(Ordering::SeqCst), 1);
/// assert_eq!(emitter.listener_count("ping"), 0);
/// ```
#[derive(Clone)]
pub struct EventEmitter {
    id: u64,
    registry: Arc<Mutex<Registry>>,
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let types: Vec<String> = self.registry.lock().keys().cloned().collect();
        f.debug_struct("EventEmitter")
            .field("id", &self.id)
            .field("types", &types)
            .finish()
    }
}

impl EventEmitter {
    pub fn new() -> Self {
        Self {
            id: NEXT_EMITTER_ID.fetch_add(1, Ordering::Relaxed),
            registry: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Identity shared by every clone of this emitter.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Register `listener` for `event`.
    ///
    /// Registering a listener that is already present for `event` is a no-op.
    pub fn subscribe(&self, event: &str, listener: Listener) -> &Self {
        self.register(event, listener, false)
    }

    /// Register `listener` for a single invocation of `event`.
    pub fn subscribe_once(&self, event: &str, listener: Listener) -> &Self {
        self.register(event, listener, true)
    }

    fn register(&self, event: &str, listener: Listener, once: bool) -> &Self {
        let mut registry = self.registry.lock();
        let entries = registry.entry(event.to_string()).or_default();

        if !entries.iter().any(|entry| entry.holds(&listener)) {
            entries.push(Arc::new(Registration {
                listener,
                once,
                fired: AtomicBool::new(false),
            }));
        }
        self
    }

    pub fn unsubscribe(&self, event: &str, listener: &Listener) -> &Self {
        let mut registry = self.registry.lock();

        if let Some(entries) = registry.get_mut(event) {
            if let Some(index) = entries.iter().position(|entry| entry.holds(listener)) {
                entries.remove(index);
            }
            if entries.is_empty() {
                registry.remove(event);
            }
        }
        self
    }

    /// Drop every listener of `event`, or of every event when `None`.
    pub fn unsubscribe_all(&self, event: Option<&str>) -> &Self {
        let mut registry = self.registry.lock();
        match event {
            Some(event) => {
                registry.remove(event);
            }
            None => registry.clear(),
        }
        self
    }

    /// Invoke the listeners of `event` in registration order.
    ///
    /// The list is snapshotted first, so listeners may subscribe or
    /// unsubscribe while the emission runs. Emitting an event nobody listens
    /// to does nothing.
    pub fn emit(&self, event: &str, args: &[Value]) -> &Self {
        let snapshot = match self.registry.lock().get(event) {
            Some(entries) if !entries.is_empty() => entries.clone(),
            _ => return self,
        };

        for entry in snapshot {
            if entry.once && entry.fired.swap(true, Ordering::SeqCst) {
                continue;
            }

            (entry.listener)(args);

            if entry.once {
                self.discard(event, &entry);
            }
        }
        self
    }

    fn discard(&self, event: &str, entry: &Arc<Registration>) {
        let mut registry = self.registry.lock();
        if let Some(entries) = registry.get_mut(event) {
            entries.retain(|candidate| !Arc::ptr_eq(candidate, entry));
            if entries.is_empty() {
                registry.remove(event);
            }
        }
    }

    /// Snapshot of the listeners currently registered for `event`.
    pub fn listeners(&self, event: &str) -> Vec<Listener> {
        self.registry
            .lock()
            .get(event)
            .map(|entries| entries.iter().map(|entry| entry.listener.clone()).collect())
            .unwrap_or_default()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.registry.lock().get(event).map_or(0, Vec::len)
    }

    /// Number of event types with at least one listener.
    pub fn event_count(&self) -> usize {
        self.registry.lock().len()
    }
}
