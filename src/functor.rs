//! Command handler functors: a handler function plus its bound state
//! components.
//!
//! A handler is any `Fn(&ComponentHandle<A>, ..., &Cmd) -> HandlerResult`
//! with zero to five component parameters. [`IntoHandler`] erases it into a
//! [`CommandHandlerFunctor`] that records the parameter types, so binding
//! can be checked against a [`ComponentRegistry`] before the first
//! dispatch.

use std::any::{Any, TypeId};
use std::fmt;
use std::slice;

use crate::command::{Command, Diagnostics};
use crate::component::{ComponentHandle, ComponentState};
use crate::error::{BindError, DispatchError, HandlerResult};
use crate::registry::{BoundComponent, ComponentRegistry, ParameterType};

/// Type-erased call into the wrapped handler.
type ErasedHandler = Box<dyn Fn(&[BoundComponent], &dyn Command) -> Result<(), DispatchError>>;

/// Runtime descriptor of a command type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandType {
    type_id: TypeId,
    name: &'static str,
}

impl CommandType {
    /// Descriptor for the statically known command type `C`.
    pub fn of<C: Command>() -> Self {
        Self {
            type_id: TypeId::of::<C>(),
            name: std::any::type_name::<C>(),
        }
    }

    /// Descriptor for the runtime type of `command`.
    pub fn of_val(command: &dyn Command) -> Self {
        let any: &dyn Any = command;
        Self {
            type_id: any.type_id(),
            name: command.command_name(),
        }
    }

    /// `TypeId` of the command type.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Command type name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// A handler with its declared parameter types and, once bound, the state
/// component instances it is invoked with.
pub struct CommandHandlerFunctor {
    command_type: CommandType,
    handler_name: &'static str,
    parameters: Vec<ParameterType>,
    arguments: Option<Vec<BoundComponent>>,
    call: ErasedHandler,
}

impl CommandHandlerFunctor {
    /// Wrap `handler` into an unbound functor.
    ///
    /// # Examples
    ///
    /// ```
    /// use statefold::{
    ///     Command, CommandHandlerFunctor, ComponentHandle, ComponentState, HandlerResult,
    ///     NoChangeset,
    /// };
    ///
    /// #[derive(Debug, Default)]
    /// struct Counter(u64);
    ///
    /// impl ComponentState for Counter {
    ///     const COMPONENT_TYPE: &'static str = "counter";
    ///     type Changeset = NoChangeset;
    /// }
    ///
    /// #[derive(Debug)]
    /// struct Increment;
    /// impl Command for Increment {}
    ///
    /// fn increment(counter: &ComponentHandle<Counter>, _cmd: &Increment) -> HandlerResult {
    ///     let mut scope = counter.update()?;
    ///     let next = Counter(scope.data().0 + 1);
    ///     scope.replace(next);
    ///     Ok(())
    /// }
    ///
    /// let functor = CommandHandlerFunctor::new(increment);
    /// assert_eq!(functor.arity(), 1);
    /// assert!(!functor.is_bound());
    /// ```
    pub fn new<Cmd, Args, F>(handler: F) -> Self
    where
        F: IntoHandler<Cmd, Args>,
    {
        handler.into_functor()
    }

    fn from_parts(
        command_type: CommandType,
        handler_name: &'static str,
        parameters: Vec<ParameterType>,
        call: ErasedHandler,
    ) -> Self {
        Self {
            command_type,
            handler_name,
            parameters,
            arguments: None,
            call,
        }
    }

    /// The command type this functor handles.
    pub fn command_type(&self) -> CommandType {
        self.command_type
    }

    /// Type name of the wrapped handler.
    pub fn handler_name(&self) -> &'static str {
        self.handler_name
    }

    /// Number of state-component parameters.
    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    /// Declared state-component parameter types, in order.
    pub fn parameters(&self) -> &[ParameterType] {
        &self.parameters
    }

    /// True once arguments have been bound.
    pub fn is_bound(&self) -> bool {
        self.arguments.is_some()
    }

    /// Resolve every parameter type against `registry` and bind the result.
    ///
    /// # Errors
    ///
    /// [`BindError::UnresolvedType`] if a parameter type is not registered.
    /// The functor stays unbound on error.
    pub fn bind(&mut self, registry: &ComponentRegistry) -> Result<(), BindError> {
        let arguments = registry.bind(self.handler_name, &self.parameters)?;
        self.arguments = Some(arguments);
        Ok(())
    }

    /// Bind an explicit argument list, replacing any previous binding.
    ///
    /// # Errors
    ///
    /// - [`BindError::ArityMismatch`] if the count differs from the arity.
    /// - [`BindError::ArgumentType`] if an argument has the wrong type.
    pub fn bind_arguments(&mut self, arguments: Vec<BoundComponent>) -> Result<(), BindError> {
        if arguments.len() != self.parameters.len() {
            return Err(BindError::ArityMismatch {
                handler: self.handler_name,
                expected: self.parameters.len(),
                found: arguments.len(),
            });
        }
        for (position, (parameter, argument)) in
            self.parameters.iter().zip(&arguments).enumerate()
        {
            let found = argument.parameter_type();
            if found != *parameter {
                return Err(BindError::ArgumentType {
                    handler: self.handler_name,
                    position,
                    expected: parameter.name(),
                    found: found.name(),
                });
            }
        }
        self.arguments = Some(arguments);
        Ok(())
    }

    /// Call the handler with the bound arguments and `command`.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Unbound`] if no arguments are bound.
    /// - [`DispatchError::CommandTypeMismatch`] if `command` is not this
    ///   functor's command type.
    /// - [`DispatchError::Handler`] if the handler body fails.
    pub fn invoke(
        &self,
        command: &dyn Command,
        diagnostics: Diagnostics,
    ) -> Result<(), DispatchError> {
        let arguments = self
            .arguments
            .as_deref()
            .ok_or(DispatchError::Unbound {
                handler: self.handler_name,
            })?;

        let found = CommandType::of_val(command);
        if found.type_id != self.command_type.type_id {
            return Err(DispatchError::CommandTypeMismatch {
                expected: self.command_type.name,
                found: found.name,
            });
        }

        if diagnostics.trace_handlers {
            tracing::info!(
                command = self.command_type.name,
                handler = self.handler_name,
                "handling command"
            );
        }

        (self.call)(arguments, command)
    }
}

impl fmt::Debug for CommandHandlerFunctor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandHandlerFunctor")
            .field("command_type", &self.command_type.name)
            .field("handler", &self.handler_name)
            .field("parameters", &self.parameters)
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// Conversion of a handler function into a [`CommandHandlerFunctor`].
///
/// Implemented for every `Fn(&ComponentHandle<A>, ..., &Cmd) -> HandlerResult`
/// with up to five component parameters. `Args` is the tuple of component
/// types and only serves to keep the implementations apart.
pub trait IntoHandler<Cmd, Args> {
    /// Erase the handler, recording its command and parameter types.
    fn into_functor(self) -> CommandHandlerFunctor;
}

/// A command with a canonical handler.
///
/// The handler's command parameter is `Self` by construction, so
/// registering the default handler can only fail on unresolved
/// components.
///
/// # Examples
///
/// ```
/// use statefold::{
///     Command, ComponentHandle, ComponentState, DefaultCommandHandler, HandlerResult,
///     IntoHandler, NoChangeset,
/// };
///
/// #[derive(Debug, Default)]
/// struct Counter(u64);
///
/// impl ComponentState for Counter {
///     const COMPONENT_TYPE: &'static str = "counter";
///     type Changeset = NoChangeset;
/// }
///
/// #[derive(Debug)]
/// struct Reset;
/// impl Command for Reset {}
///
/// fn reset(counter: &ComponentHandle<Counter>, _cmd: &Reset) -> HandlerResult {
///     counter.update()?.replace(Counter(0));
///     Ok(())
/// }
///
/// impl DefaultCommandHandler for Reset {
///     type Components = (Counter,);
///
///     fn handler() -> impl IntoHandler<Self, Self::Components> {
///         reset
///     }
/// }
/// ```
pub trait DefaultCommandHandler: Command + Sized {
    /// Tuple of the handler's component types.
    type Components;

    /// The canonical handler for this command.
    fn handler() -> impl IntoHandler<Self, Self::Components>;

    /// The canonical handler as an unbound functor.
    fn default_functor() -> CommandHandlerFunctor {
        Self::handler().into_functor()
    }
}

fn downcast_command<Cmd: Command>(command: &dyn Command) -> Result<&Cmd, DispatchError> {
    let any: &dyn Any = command;
    any.downcast_ref::<Cmd>()
        .ok_or(DispatchError::CommandTypeMismatch {
            expected: std::any::type_name::<Cmd>(),
            found: command.command_name(),
        })
}

fn next_argument<'a, S: ComponentState>(
    arguments: &mut slice::Iter<'a, BoundComponent>,
    handler: &'static str,
) -> Result<&'a ComponentHandle<S>, DispatchError> {
    arguments
        .next()
        .and_then(BoundComponent::handle::<S>)
        .ok_or(DispatchError::Unbound { handler })
}

macro_rules! impl_into_handler {
    ($($component:ident $arg:ident),*) => {
        impl<Cmd, F, $($component),*> IntoHandler<Cmd, ($($component,)*)> for F
        where
            Cmd: Command,
            F: Fn($(&ComponentHandle<$component>,)* &Cmd) -> HandlerResult + 'static,
            $($component: ComponentState,)*
        {
            #[allow(unused_mut, unused_variables)]
            fn into_functor(self) -> CommandHandlerFunctor {
                let handler_name = std::any::type_name::<F>();
                let parameters: Vec<ParameterType> =
                    vec![$(ParameterType::of::<$component>()),*];
                let call: ErasedHandler = Box::new(
                    move |arguments: &[BoundComponent],
                          command: &dyn Command|
                          -> Result<(), DispatchError> {
                        let command = downcast_command::<Cmd>(command)?;
                        let mut arguments = arguments.iter();
                        $(
                            let $arg = next_argument::<$component>(&mut arguments, handler_name)?;
                        )*
                        (self)($($arg,)* command).map_err(|source| DispatchError::Handler {
                            command: std::any::type_name::<Cmd>(),
                            source,
                        })
                    },
                );
                CommandHandlerFunctor::from_parts(
                    CommandType::of::<Cmd>(),
                    handler_name,
                    parameters,
                    call,
                )
            }
        }
    };
}

impl_into_handler!();
impl_into_handler!(A a);
impl_into_handler!(A a, B b);
impl_into_handler!(A a, B b, C c);
impl_into_handler!(A a, B b, C c, D d);
impl_into_handler!(A a, B b, C c, D d, E e);
