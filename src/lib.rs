//! A declarative binding lifecycle engine.
//!
//! Turns markup directives into live, cancellable runtime behaviour:
//!
//! - [`ComponentBinding`] resolves a component (registered or loaded from an
//!   external template), feeds it static, one-way and two-way properties,
//!   wires its events to the declaring scope and mounts its template between
//!   two marker nodes
//! - [`ActionEngine`] runs enter/exit effects (delays, scripted actions, CSS
//!   transitions) with at most one live [`Action`] per node
//! - [`TranscludeBinding`] relays consumer content into a component while
//!   keeping it bound to the consumer's scope
//! - [`EventEmitter`] is the pub/sub primitive all of them signal through
//!
//! All asynchronous work runs on a [`Spawner`]; the host document, the
//! expression scope and the template loader/compiler are supplied through
//! the traits in [`host`].
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use oxide_bind::testing::{TestCompiler, TestDom, TestLoader};
//! use oxide_bind::{ActionEngine, ActionState, Config, Phase, Runtime, Scheduler};
//!
//! let dom = Arc::new(TestDom::new());
//! let scheduler = Scheduler::new();
//! let runtime = Runtime::new(
//!     Config::default(),
//!     dom.clone(),
//!     Arc::new(TestLoader::new()),
//!     Arc::new(TestCompiler::new()),
//!     Arc::new(scheduler.clone()),
//! );
//!
//! let node = dom.element("div");
//! let action = runtime.actions().start(node, &["0.2".to_string()], Phase::Created);
//! assert_eq!(action.state(), ActionState::Pending);
//!
//! dom.advance(std::time::Duration::from_millis(200));
//! scheduler.run_until_idle();
//! assert_eq!(action.state(), ActionState::Settled);
//! assert!(runtime.actions().current(node).is_none());
//! ```

// Module declarations
mod action;
mod binding;
mod component;
mod config;
mod emitter;
mod engine;
mod error;
pub mod host;
pub mod markup;
mod runtime;
mod scheduler;
mod transclude;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Public re-exports
pub use action::{Action, ActionState, Canceller, Finished, Outcome};
pub use binding::{BindingRefs, BindingState, ComponentBinding, PropertyBinding};
pub use component::{
    lifecycle, Component, ComponentEvent, ComponentFactory, ComponentRegistry, Properties,
};
pub use config::Config;
pub use emitter::{EventEmitter, Listener};
pub use engine::{
    ActionBinding, ActionDefinition, ActionEngine, ActionExecutor, Done, Phase, MAX_DELAY,
};
pub use error::{BindingError, Result};
pub use host::{Dom, NodeId, RepeatItem, Scope, ScopeRef, TemplateCompiler, TemplateError, TemplateLoader};
pub use runtime::Runtime;
pub use scheduler::{Scheduler, Spawner};
pub use serde_json::Value;
pub use transclude::TranscludeBinding;
