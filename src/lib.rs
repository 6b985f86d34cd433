//! Versioned state components with incremental change tracking and
//! type-bound command dispatch.
//!
//! A [`State`] owns [`StateComponent`]s. Every mutation happens inside an
//! [`UpdateScope`]; closing the scope bumps the component version and
//! archives what changed. Observers record the version they last saw in
//! [`ObservedVersions`] and get back either an aggregated changeset or a
//! request to refresh completely.
//!
//! Commands reach state through handlers whose component parameters are
//! resolved by type against a [`ComponentRegistry`] when the handler is
//! registered on a [`CommandTarget`].
//!
//! # Examples
//!
//! ```
//! use statefold::{
//!     Command, CommandTarget, ComponentHandle, ComponentState, Diagnostics, HandlerResult,
//!     Observation, ObservedVersions, SequentialIds, SimpleChangeset, State, UpdateType,
//! };
//! use std::collections::BTreeMap;
//!
//! #[derive(Debug, Default)]
//! struct Notes(BTreeMap<u32, String>);
//!
//! impl ComponentState for Notes {
//!     const COMPONENT_TYPE: &'static str = "notes";
//!     type Changeset = SimpleChangeset<u32>;
//! }
//!
//! #[derive(Debug)]
//! struct AddNote(u32, &'static str);
//! impl Command for AddNote {}
//!
//! fn add_note(notes: &ComponentHandle<Notes>, cmd: &AddNote) -> HandlerResult {
//!     let mut scope = notes.update()?;
//!     let (data, changeset) = scope.parts_mut();
//!     data.0.insert(cmd.0, cmd.1.to_owned());
//!     if let Some(changeset) = changeset {
//!         changeset.created(cmd.0);
//!     }
//!     scope.set_update_type(UpdateType::Partial);
//!     Ok(())
//! }
//!
//! let mut state = State::new(SequentialIds::new("notes"));
//! let notes = state.add_component(Notes::default()).unwrap();
//!
//! let mut editor = CommandTarget::new("editor");
//! editor
//!     .registrar(&state.component_registry())
//!     .register_handler(add_note)
//!     .unwrap();
//!
//! let mut seen = ObservedVersions::default();
//! seen.observe(&notes, |_| {}).unwrap();
//!
//! editor.dispatch_to_self(&AddNote(1, "hello"), Diagnostics::NONE).unwrap();
//!
//! let mut created = Vec::new();
//! seen.observe(&notes, |obs| {
//!     if let Observation::Partial(changeset) = obs {
//!         created.extend(changeset.created_keys().copied());
//!     }
//! })
//! .unwrap();
//! assert_eq!(created, vec![1]);
//! ```

mod changeset;
pub use changeset::{Changeset, NoChangeset, SimpleChangeset};
mod changeset_manager;
pub use changeset_manager::ChangesetManager;
mod command;
mod component;
pub use component::{
    ComponentHandle, ComponentState, INITIAL_VERSION, StateComponent, UndoDirection, UpdateScope,
};
mod dispatch;
mod error;
mod functor;
mod id;
mod observer;
mod registry;
mod state;

pub use command::{Command, Diagnostics};
pub use dispatch::{CommandHandlerRegistrar, CommandHandlerRegistry, CommandTarget};
pub use error::{BindError, DispatchError, HandlerError, HandlerResult, ScopeError, StateError};
pub use functor::{CommandHandlerFunctor, CommandType, DefaultCommandHandler, IntoHandler};
pub use id::{ComponentId, IdAllocator, RandomIds, SequentialIds};
pub use observer::{Observation, ObservedVersions, StateComponentVersion, UpdateType};
pub use registry::{BoundComponent, ComponentRegistry, ParameterType};
pub use state::State;
