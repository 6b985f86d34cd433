//! Command routing: handler tables, the registrar that binds into them,
//! and the hierarchical [`CommandTarget`].
//!
//! Each target owns a [`CommandHandlerRegistry`] keyed by command type and
//! an optional weak link to its parent. `dispatch_to_self` runs the local
//! handler only; `dispatch_to_hierarchy` walks from the target up through
//! its ancestors and runs every handler it finds on the way.

use std::any::TypeId;
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::command::{Command, Diagnostics};
use crate::error::{BindError, DispatchError};
use crate::functor::{CommandHandlerFunctor, CommandType, DefaultCommandHandler, IntoHandler};
use crate::registry::ComponentRegistry;

/// Callback run before a target dispatches a command to its handler.
type PreDispatchCallback = Box<dyn Fn(&dyn Command)>;

/// Map from command type to its bound handler.
///
/// At most one handler per command type: inserting a second one replaces
/// the first.
#[derive(Debug, Default)]
pub struct CommandHandlerRegistry {
    handlers: HashMap<TypeId, CommandHandlerFunctor>,
}

impl CommandHandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `functor` under its command type.
    ///
    /// Returns the handler it replaced, if any.
    pub fn insert(&mut self, functor: CommandHandlerFunctor) -> Option<CommandHandlerFunctor> {
        let command_type = functor.command_type();
        let replaced = self.handlers.insert(command_type.type_id(), functor);
        if replaced.is_some() {
            tracing::debug!(command = command_type.name(), "command handler replaced");
        } else {
            tracing::debug!(command = command_type.name(), "command handler registered");
        }
        replaced
    }

    /// The handler for `command_type`.
    pub fn get(&self, command_type: CommandType) -> Option<&CommandHandlerFunctor> {
        self.handlers.get(&command_type.type_id())
    }

    /// Remove and return the handler for `command_type`.
    pub fn remove(&mut self, command_type: CommandType) -> Option<CommandHandlerFunctor> {
        self.handlers.remove(&command_type.type_id())
    }

    /// Whether a handler is registered for `C`.
    pub fn contains<C: Command>(&self) -> bool {
        self.handlers.contains_key(&TypeId::of::<C>())
    }

    /// Command types with a registered handler, in no particular order.
    pub fn command_types(&self) -> impl Iterator<Item = CommandType> + '_ {
        self.handlers.values().map(CommandHandlerFunctor::command_type)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Binds handlers against a component registry and stores them.
///
/// Binding happens at registration: a handler whose component types are
/// not all registered is rejected here and never stored.
pub struct CommandHandlerRegistrar<'a> {
    components: &'a ComponentRegistry,
    handlers: &'a mut CommandHandlerRegistry,
}

impl<'a> CommandHandlerRegistrar<'a> {
    /// Registrar that binds against `components` and stores into `handlers`.
    pub fn new(
        components: &'a ComponentRegistry,
        handlers: &'a mut CommandHandlerRegistry,
    ) -> Self {
        Self {
            components,
            handlers,
        }
    }

    /// Wrap, bind, and store `handler`.
    ///
    /// # Errors
    ///
    /// [`BindError::UnresolvedType`] if one of the handler's component
    /// types is not registered. Nothing is stored on error.
    pub fn register_handler<Cmd, Args, F>(&mut self, handler: F) -> Result<(), BindError>
    where
        F: IntoHandler<Cmd, Args>,
    {
        self.register_functor(handler.into_functor())
    }

    /// Bind and store the canonical handler of `Cmd`.
    ///
    /// # Errors
    ///
    /// Same as [`register_handler`](Self::register_handler).
    pub fn register_default_handler<Cmd: DefaultCommandHandler>(&mut self) -> Result<(), BindError> {
        self.register_functor(Cmd::default_functor())
    }

    /// Bind and store an already built functor.
    ///
    /// # Errors
    ///
    /// Same as [`register_handler`](Self::register_handler).
    pub fn register_functor(&mut self, mut functor: CommandHandlerFunctor) -> Result<(), BindError> {
        functor.bind(self.components)?;
        self.handlers.insert(functor);
        Ok(())
    }
}

/// Restores the active-dispatch marker of a target when dropped.
struct ActiveDispatch<'a> {
    slot: &'a Cell<Option<&'static str>>,
    previous: Option<&'static str>,
}

impl Drop for ActiveDispatch<'_> {
    fn drop(&mut self) {
        self.slot.set(self.previous);
    }
}

/// A node in the command routing hierarchy.
///
/// Targets are built and configured by value, then shared behind `Rc` so
/// children can link to them with [`with_parent`](Self::with_parent). The
/// parent link is weak: a child never keeps its parent alive.
///
/// # Examples
///
/// ```
/// use std::rc::Rc;
/// use statefold::{Command, CommandTarget, ComponentRegistry, Diagnostics, HandlerResult};
///
/// #[derive(Debug)]
/// struct Save;
/// impl Command for Save {}
///
/// let components = ComponentRegistry::new();
///
/// let mut app = CommandTarget::new("app");
/// app.registrar(&components)
///     .register_handler(|_cmd: &Save| -> HandlerResult { Ok(()) })
///     .unwrap();
/// let app = Rc::new(app);
///
/// let panel = CommandTarget::new("panel").with_parent(&app);
/// assert!(!panel.can_dispatch(&Save));
/// panel.dispatch_to_hierarchy(&Save, Diagnostics::NONE).unwrap();
/// ```
pub struct CommandTarget {
    name: String,
    handlers: CommandHandlerRegistry,
    parent: Option<Weak<CommandTarget>>,
    pre_dispatch: Vec<PreDispatchCallback>,
    active: Cell<Option<&'static str>>,
}

impl CommandTarget {
    /// Create a root target with no handlers.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: CommandHandlerRegistry::new(),
            parent: None,
            pre_dispatch: Vec::new(),
            active: Cell::new(None),
        }
    }

    /// Link this target under `parent`.
    pub fn with_parent(mut self, parent: &Rc<CommandTarget>) -> Self {
        self.parent = Some(Rc::downgrade(parent));
        self
    }

    /// Target name, used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The parent target, if it is still alive.
    pub fn parent(&self) -> Option<Rc<CommandTarget>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// This target's handler table.
    pub fn handlers(&self) -> &CommandHandlerRegistry {
        &self.handlers
    }

    /// A registrar that binds against `components` into this target.
    pub fn registrar<'a>(
        &'a mut self,
        components: &'a ComponentRegistry,
    ) -> CommandHandlerRegistrar<'a> {
        CommandHandlerRegistrar::new(components, &mut self.handlers)
    }

    /// Run `callback` before every local dispatch, in registration order.
    pub fn add_pre_dispatch_callback(&mut self, callback: impl Fn(&dyn Command) + 'static) {
        self.pre_dispatch.push(Box::new(callback));
    }

    /// Whether this target has a handler for the runtime type of `command`.
    pub fn can_dispatch(&self, command: &dyn Command) -> bool {
        self.handlers.get(CommandType::of_val(command)).is_some()
    }

    /// Run this target's handler for `command`.
    ///
    /// Pre-dispatch callbacks run first, then the handler.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Unhandled`] if this target has no handler.
    /// - [`DispatchError::RecursiveDispatch`] if `diagnostics` requests the
    ///   check and this target is already dispatching.
    /// - Whatever [`CommandHandlerFunctor::invoke`] returns.
    pub fn dispatch_to_self(
        &self,
        command: &dyn Command,
        diagnostics: Diagnostics,
    ) -> Result<(), DispatchError> {
        let command_type = CommandType::of_val(command);
        let _span = tracing::debug_span!(
            "dispatch",
            target_name = %self.name,
            command = command_type.name()
        )
        .entered();

        let _active = self.enter(command_type, diagnostics)?;

        for callback in &self.pre_dispatch {
            callback(command);
        }

        let functor = self
            .handlers
            .get(command_type)
            .ok_or(DispatchError::Unhandled {
                command: command_type.name(),
            })?;
        functor.invoke(command, diagnostics)
    }

    /// Run every handler for `command` from this target up to the root.
    ///
    /// Targets without a handler are skipped. The walk stops at the first
    /// handler error.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Unhandled`] if no target in the chain has a
    ///   handler.
    /// - The first error returned by [`dispatch_to_self`](Self::dispatch_to_self).
    pub fn dispatch_to_hierarchy(
        &self,
        command: &dyn Command,
        diagnostics: Diagnostics,
    ) -> Result<(), DispatchError> {
        let mut handled = false;

        if self.can_dispatch(command) {
            self.dispatch_to_self(command, diagnostics)?;
            handled = true;
        }

        let mut next = self.parent();
        while let Some(target) = next {
            if target.can_dispatch(command) {
                target.dispatch_to_self(command, diagnostics)?;
                handled = true;
            }
            next = target.parent();
        }

        if handled {
            Ok(())
        } else {
            let command = command.command_name();
            tracing::warn!(target_name = %self.name, command, "no handler in target hierarchy");
            Err(DispatchError::Unhandled { command })
        }
    }

    fn enter(
        &self,
        command_type: CommandType,
        diagnostics: Diagnostics,
    ) -> Result<ActiveDispatch<'_>, DispatchError> {
        if diagnostics.check_recursive_dispatch
            && let Some(active) = self.active.get()
        {
            return Err(DispatchError::RecursiveDispatch {
                command: command_type.name(),
                active,
            });
        }
        let previous = self.active.replace(Some(command_type.name()));
        Ok(ActiveDispatch {
            slot: &self.active,
            previous,
        })
    }
}

impl fmt::Debug for CommandTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandTarget")
            .field("name", &self.name)
            .field("handlers", &self.handlers.len())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}
