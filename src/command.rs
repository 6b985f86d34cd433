//! Command marker trait and dispatch diagnostics flags.

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};

/// An immutable message describing an intended state mutation.
///
/// Commands carry only domain fields. The dispatch layer routes them by
/// their runtime type, so a command needs no identity beyond the type
/// itself.
///
/// # Examples
///
/// ```
/// use statefold::Command;
///
/// #[derive(Debug)]
/// struct RenameNode {
///     node: u32,
///     name: String,
/// }
///
/// impl Command for RenameNode {}
///
/// let cmd = RenameNode { node: 7, name: "sum".into() };
/// assert!(cmd.command_name().ends_with("RenameNode"));
/// ```
pub trait Command: Any + fmt::Debug {
    /// Type name used in diagnostics and error messages.
    fn command_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Diagnostics flags passed to every dispatch call.
///
/// Deserializes from partial configuration: absent fields keep their
/// default (`false`).
///
/// # Examples
///
/// ```
/// use statefold::Diagnostics;
///
/// let flags = Diagnostics::default()
///     .with_trace_handlers(true)
///     .with_check_recursive_dispatch(true);
///
/// assert!(flags.trace_handlers);
/// assert!(flags.check_recursive_dispatch);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Diagnostics {
    /// Emit a trace record naming the handler that ran for each command.
    pub trace_handlers: bool,
    /// Reject a dispatch that starts while the same target is still
    /// dispatching another command.
    pub check_recursive_dispatch: bool,
}

impl Diagnostics {
    /// All diagnostics disabled.
    pub const NONE: Self = Self {
        trace_handlers: false,
        check_recursive_dispatch: false,
    };

    /// Set whether handler invocations are traced.
    pub fn with_trace_handlers(mut self, enabled: bool) -> Self {
        self.trace_handlers = enabled;
        self
    }

    /// Set whether recursive dispatch is checked.
    pub fn with_check_recursive_dispatch(mut self, enabled: bool) -> Self {
        self.check_recursive_dispatch = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Ping;

    impl Command for Ping {}

    #[test]
    fn default_diagnostics_are_disabled() {
        assert_eq!(Diagnostics::default(), Diagnostics::NONE);
    }

    #[test]
    fn builder_chains_flags() {
        let flags = Diagnostics::default()
            .with_trace_handlers(true)
            .with_check_recursive_dispatch(false);
        assert!(flags.trace_handlers);
        assert!(!flags.check_recursive_dispatch);
    }

    #[test]
    fn diagnostics_load_from_partial_config() {
        let flags: Diagnostics = serde_json::from_str(r#"{"trace_handlers": true}"#)
            .expect("partial config should deserialize");
        assert!(flags.trace_handlers);
        assert!(!flags.check_recursive_dispatch);
    }

    #[test]
    fn command_name_through_trait_object() {
        let cmd: &dyn Command = &Ping;
        assert!(cmd.command_name().ends_with("Ping"));
    }

    #[test]
    fn trait_object_upcasts_to_any() {
        let cmd: &dyn Command = &Ping;
        let any: &dyn Any = cmd;
        assert!(any.downcast_ref::<Ping>().is_some());
    }
}
