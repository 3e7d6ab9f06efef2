//! Error types raised while wiring bindings.

use thiserror::Error;

use crate::host::TemplateError;

/// Configuration and resolution errors for one binding.
///
/// Configuration errors are returned synchronously from `init` and abort only
/// the binding that raised them. Resolution and realisation errors happen on
/// the asynchronous path; they are logged and recorded in the binding state
/// instead of being propagated.
///
/// Cancellation is never reported through this type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BindingError {
    /// No synchronous factory and no async resource are registered under the name.
    #[error("{name}: component not found")]
    UnknownComponent {
        /// The component name from the directive.
        name: String,
    },

    /// A two-way property whose expression is not a single bare interpolation.
    #[error("{expression}: two-way binding requires a single `{{{{ name }}}}` interpolation (property `{property}`)")]
    InvalidTwoWay {
        /// The camel-cased property name.
        property: String,
        /// The attribute value as written.
        expression: String,
    },

    /// A segment of the event directive that is not `event: expression`.
    #[error("invalid event statement `{statement}`, expected `event: expression; other: callback()`")]
    InvalidEventStatement {
        /// The offending segment.
        statement: String,
    },

    /// The host scope refused to compile an event handler.
    #[error("{event}: cannot compile handler `{expression}`: {message}")]
    InvalidHandler {
        /// Event name the handler was declared for.
        event: String,
        /// Handler expression text.
        expression: String,
        /// Reason given by the scope.
        message: String,
    },

    /// A registry name rejected at registration time.
    #[error("invalid {kind} name `{name}`: {reason}")]
    InvalidName {
        /// What was being registered ("component", "action").
        kind: &'static str,
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The external template fragment failed to load.
    #[error("{name}: template load failed")]
    TemplateLoad {
        /// The component name.
        name: String,
        #[source]
        source: TemplateError,
    },

    /// The component failed to materialise its template.
    #[error("{name}: component creation failed")]
    Realize {
        /// The component name.
        name: String,
        #[source]
        source: TemplateError,
    },
}

/// Result type for binding operations.
pub type Result<T> = core::result::Result<T, BindingError>;
