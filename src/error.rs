//! Crate-level error types for update scopes, handler binding, and dispatch.
//!
//! Every variant here describes a wiring or programming mistake. An
//! unavailable changeset aggregation is not an error: it is reported as
//! `None` by [`ChangesetManager::get_aggregated`](crate::ChangesetManager::get_aggregated).

/// Boxed error returned from a command handler body.
///
/// Any error type converts into this via `?`, including the crate's own
/// [`ScopeError`].
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type returned by command handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// Error returned when an update scope cannot be opened on a component.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    /// The component is already held by an open update scope, or is being
    /// read while a scope tries to open.
    ///
    /// Only one update scope may exist per component at a time.
    #[error("state component '{component}' is already in an update scope")]
    AlreadyOpen {
        /// Component type name (see `ComponentState::COMPONENT_TYPE`).
        component: &'static str,
    },
}

/// Error returned when a handler cannot be bound to its state components.
///
/// Raised at registration time, never deferred to the first dispatch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindError {
    /// A handler parameter names a component type that was never registered.
    #[error("handler '{handler}' needs state component '{parameter}', which is not registered")]
    UnresolvedType {
        /// Handler type name.
        handler: &'static str,
        /// Component type name of the unresolved parameter.
        parameter: &'static str,
    },

    /// The number of supplied arguments does not match the handler's arity.
    #[error("handler '{handler}' takes {expected} state components, {found} supplied")]
    ArityMismatch {
        /// Handler type name.
        handler: &'static str,
        /// Number of state-component parameters the handler declares.
        expected: usize,
        /// Number of arguments supplied.
        found: usize,
    },

    /// A supplied argument does not have the declared parameter type.
    #[error(
        "handler '{handler}' parameter {position} expects '{expected}', got '{found}'"
    )]
    ArgumentType {
        /// Handler type name.
        handler: &'static str,
        /// Zero-based parameter position.
        position: usize,
        /// Declared component type name.
        expected: &'static str,
        /// Supplied component type name.
        found: &'static str,
    },
}

/// Error returned when dispatching or invoking a command fails.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No handler is registered for the command's runtime type.
    #[error("no handler registered for command '{command}'")]
    Unhandled {
        /// Command type name.
        command: &'static str,
    },

    /// The functor was invoked before its state components were bound.
    #[error("handler '{handler}' was invoked before being bound")]
    Unbound {
        /// Handler type name.
        handler: &'static str,
    },

    /// The command passed to a functor is not the type it was built for.
    #[error("handler expects command '{expected}', got '{found}'")]
    CommandTypeMismatch {
        /// Command type the functor was built for.
        expected: &'static str,
        /// Runtime type of the supplied command.
        found: &'static str,
    },

    /// A dispatch started while the same target was still dispatching.
    ///
    /// Only reported when `Diagnostics::check_recursive_dispatch` is set.
    #[error("command '{command}' dispatched while '{active}' is still being handled")]
    RecursiveDispatch {
        /// Command type name of the rejected dispatch.
        command: &'static str,
        /// Command type name of the dispatch in progress.
        active: &'static str,
    },

    /// The handler body returned an error.
    #[error("handler for command '{command}' failed: {source}")]
    Handler {
        /// Command type name.
        command: &'static str,
        /// Error returned by the handler.
        #[source]
        source: HandlerError,
    },
}

/// Error returned by [`State`](crate::State) container operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    /// A component of this type is already owned by the container.
    #[error("state already holds a component of type '{component}'")]
    DuplicateComponent {
        /// Component type name.
        component: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_error_display_names_component() {
        let err = ScopeError::AlreadyOpen {
            component: "counter",
        };
        assert_eq!(
            err.to_string(),
            "state component 'counter' is already in an update scope"
        );
    }

    #[test]
    fn bind_error_unresolved_display() {
        let err = BindError::UnresolvedType {
            handler: "add_node",
            parameter: "graph",
        };
        assert_eq!(
            err.to_string(),
            "handler 'add_node' needs state component 'graph', which is not registered"
        );
    }

    #[test]
    fn bind_error_arity_display() {
        let err = BindError::ArityMismatch {
            handler: "h",
            expected: 2,
            found: 1,
        };
        assert_eq!(err.to_string(), "handler 'h' takes 2 state components, 1 supplied");
    }

    #[test]
    fn dispatch_error_handler_keeps_source() {
        use std::error::Error as _;

        let inner: HandlerError = Box::new(ScopeError::AlreadyOpen {
            component: "counter",
        });
        let err = DispatchError::Handler {
            command: "Increment",
            source: inner,
        };
        assert!(err.to_string().contains("Increment"));
        let source = err.source().expect("handler error should expose its source");
        assert!(source.to_string().contains("counter"));
    }

    #[test]
    fn scope_error_converts_into_handler_error() {
        fn body() -> HandlerResult {
            let opened: Result<(), ScopeError> = Err(ScopeError::AlreadyOpen {
                component: "counter",
            });
            opened?;
            Ok(())
        }
        let err = body().expect_err("body should fail");
        assert!(err.to_string().contains("already in an update scope"));
    }

    // Verify `Send + Sync` bounds so errors can be carried across threads
    // by callers that add their own synchronization boundary.
    const _: () = {
        #[allow(dead_code)]
        fn assert_send_sync<T: Send + Sync>() {}

        #[allow(dead_code)]
        fn check() {
            assert_send_sync::<ScopeError>();
            assert_send_sync::<BindError>();
            assert_send_sync::<DispatchError>();
            assert_send_sync::<StateError>();
        }
    };
}
