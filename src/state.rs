//! The state container: owns one component per component type and hands
//! out shared handles to them.
//!
//! Components are type-erased behind [`AnyComponent`] so the container can
//! register, prune, and tear down all of them without knowing their data
//! types.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use crate::component::{ComponentHandle, ComponentState, StateComponent};
use crate::error::{ScopeError, StateError};
use crate::id::IdAllocator;
use crate::observer::ObservedVersions;
use crate::registry::ComponentRegistry;

/// Object-safe view of a `ComponentHandle<S>` for container-wide passes.
trait AnyComponent {
    fn register_into(&self, registry: &mut ComponentRegistry);

    fn prune_for(&self, observers: &[&ObservedVersions]) -> Result<(), ScopeError>;

    fn clear_history(&self) -> Result<(), ScopeError>;

    fn as_any(&self) -> &dyn Any;
}

impl<S: ComponentState> AnyComponent for ComponentHandle<S> {
    fn register_into(&self, registry: &mut ComponentRegistry) {
        registry.register_state_component(self);
    }

    fn prune_for(&self, observers: &[&ObservedVersions]) -> Result<(), ScopeError> {
        let mut component = self.read_mut()?;
        let hash = component.identity_hash();
        let version = component.version();
        // An observer that saw another instance in this slot will refresh
        // completely and holds nothing back.
        let up_to = observers
            .iter()
            .map(|observer| {
                let seen = observer.last_seen(S::COMPONENT_TYPE);
                if seen.hash == hash { seen.version } else { version }
            })
            .min()
            .unwrap_or(version);
        component.prune_changesets(up_to);
        Ok(())
    }

    fn clear_history(&self) -> Result<(), ScopeError> {
        self.read_mut()?.clear_history();
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Owner of the application's state components.
///
/// Holds at most one component per [`ComponentState`] type. Identities are
/// drawn from the injected [`IdAllocator`].
///
/// # Examples
///
/// ```
/// use statefold::{ComponentState, NoChangeset, SequentialIds, State};
///
/// #[derive(Debug, Default)]
/// struct Counter(u64);
///
/// impl ComponentState for Counter {
///     const COMPONENT_TYPE: &'static str = "counter";
///     type Changeset = NoChangeset;
/// }
///
/// let mut state = State::new(SequentialIds::new("app"));
/// let counter = state.add_component(Counter::default()).unwrap();
/// assert_eq!(counter.read().unwrap().version(), 1);
/// assert!(state.add_component(Counter(5)).is_err());
/// ```
pub struct State {
    ids: Box<dyn IdAllocator>,
    components: BTreeMap<&'static str, Box<dyn AnyComponent>>,
}

impl State {
    /// Create an empty container drawing ids from `ids`.
    pub fn new(ids: impl IdAllocator + 'static) -> Self {
        Self {
            ids: Box::new(ids),
            components: BTreeMap::new(),
        }
    }

    /// Create a component holding `data` at the initial version.
    ///
    /// # Errors
    ///
    /// [`StateError::DuplicateComponent`] if a component of this type (or
    /// of another type with the same `COMPONENT_TYPE`) already exists.
    pub fn add_component<S: ComponentState>(
        &mut self,
        data: S,
    ) -> Result<ComponentHandle<S>, StateError> {
        if self.components.contains_key(S::COMPONENT_TYPE) {
            return Err(StateError::DuplicateComponent {
                component: S::COMPONENT_TYPE,
            });
        }
        let id = self.ids.allocate();
        let handle = ComponentHandle::new(StateComponent::new(id, data));
        self.components
            .insert(S::COMPONENT_TYPE, Box::new(handle.clone()));
        tracing::debug!(component = S::COMPONENT_TYPE, %id, "state component added");
        Ok(handle)
    }

    /// Remove the component of type `S` and clear its changeset history.
    ///
    /// Outstanding handles keep the data alive but no longer belong to the
    /// container. Returns `None` if there was no such component.
    pub fn remove_component<S: ComponentState>(&mut self) -> Option<ComponentHandle<S>> {
        let handle = self.component::<S>()?;
        let removed = self.components.remove(S::COMPONENT_TYPE)?;
        if let Err(error) = removed.clear_history() {
            tracing::warn!(
                component = S::COMPONENT_TYPE,
                %error,
                "changeset history not cleared on removal"
            );
        }
        tracing::debug!(component = S::COMPONENT_TYPE, "state component removed");
        Some(handle)
    }

    /// Handle to the component of type `S`.
    pub fn component<S: ComponentState>(&self) -> Option<ComponentHandle<S>> {
        self.components
            .get(S::COMPONENT_TYPE)?
            .as_any()
            .downcast_ref::<ComponentHandle<S>>()
            .cloned()
    }

    /// Whether a component of type `S` exists.
    pub fn contains<S: ComponentState>(&self) -> bool {
        self.component::<S>().is_some()
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// True if the container holds no component.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Component type names, sorted.
    pub fn component_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.components.keys().copied()
    }

    /// A binding registry holding every component in the container.
    pub fn component_registry(&self) -> ComponentRegistry {
        let mut registry = ComponentRegistry::new();
        for component in self.components.values() {
            component.register_into(&mut registry);
        }
        registry
    }

    /// Drop every changeset that all `observers` have already seen.
    ///
    /// With no observers, every archived changeset is dropped.
    ///
    /// # Errors
    ///
    /// [`ScopeError::AlreadyOpen`] for the first component that is inside
    /// an update scope. Components before it are already pruned.
    pub fn prune_changesets(&self, observers: &[&ObservedVersions]) -> Result<(), ScopeError> {
        for component in self.components.values() {
            component.prune_for(observers)?;
        }
        tracing::debug!(
            components = self.components.len(),
            observers = observers.len(),
            "changesets pruned"
        );
        Ok(())
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field(
                "components",
                &self.components.keys().collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}
