//! Type-keyed registry of state components used to bind handler arguments.
//!
//! The registry is filled once at setup and only read afterwards: each
//! handler's declared component types are resolved against it at
//! registration, so a missing component is reported before any dispatch.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::component::{ComponentHandle, ComponentState};
use crate::error::BindError;

/// Runtime descriptor of a handler's state-component parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParameterType {
    type_id: TypeId,
    name: &'static str,
}

impl ParameterType {
    /// Descriptor for a parameter of type `&ComponentHandle<S>`.
    pub fn of<S: ComponentState>() -> Self {
        Self {
            type_id: TypeId::of::<S>(),
            name: S::COMPONENT_TYPE,
        }
    }

    /// `TypeId` of the component data type.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Component type name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// A type-erased component handle bound to a handler parameter.
///
/// Holds a `ComponentHandle<S>` behind `dyn Any`; downcasting with the
/// matching `S` recovers the typed handle.
#[derive(Clone)]
pub struct BoundComponent {
    parameter: ParameterType,
    handle: Rc<dyn Any>,
}

impl BoundComponent {
    /// Erase a typed handle.
    pub fn new<S: ComponentState>(handle: &ComponentHandle<S>) -> Self {
        Self {
            parameter: ParameterType::of::<S>(),
            handle: Rc::new(handle.clone()),
        }
    }

    /// Which parameter type this argument satisfies.
    pub fn parameter_type(&self) -> ParameterType {
        self.parameter
    }

    /// Recover the typed handle. `None` if `S` is not the bound type.
    pub fn handle<S: ComponentState>(&self) -> Option<&ComponentHandle<S>> {
        self.handle.downcast_ref::<ComponentHandle<S>>()
    }
}

// Manual `Debug` because `dyn Any` is not `Debug`.
impl fmt::Debug for BoundComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundComponent")
            .field("component", &self.parameter.name)
            .finish()
    }
}

/// Map from component type to the registered instance.
#[derive(Debug, Default, Clone)]
pub struct ComponentRegistry {
    components: HashMap<TypeId, BoundComponent>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` as the instance bound to `S` parameters.
    ///
    /// Returns the previously registered instance, if any.
    pub fn register_state_component<S: ComponentState>(
        &mut self,
        handle: &ComponentHandle<S>,
    ) -> Option<BoundComponent> {
        tracing::debug!(component = S::COMPONENT_TYPE, "state component registered");
        self.components
            .insert(TypeId::of::<S>(), BoundComponent::new(handle))
    }

    /// The instance registered for `parameter`.
    pub fn resolve(&self, parameter: ParameterType) -> Option<&BoundComponent> {
        self.components.get(&parameter.type_id)
    }

    /// Whether an instance is registered for `S`.
    pub fn contains<S: ComponentState>(&self) -> bool {
        self.components.contains_key(&TypeId::of::<S>())
    }

    /// Number of registered component types.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Resolve every parameter of `handler`, in order.
    ///
    /// # Errors
    ///
    /// [`BindError::UnresolvedType`] naming the first parameter with no
    /// registered instance.
    pub fn bind(
        &self,
        handler: &'static str,
        parameters: &[ParameterType],
    ) -> Result<Vec<BoundComponent>, BindError> {
        parameters
            .iter()
            .map(|parameter| {
                self.resolve(*parameter)
                    .cloned()
                    .ok_or(BindError::UnresolvedType {
                        handler,
                        parameter: parameter.name,
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::StateComponent;
    use crate::component::test_fixtures::{Graph, Selection};
    use crate::id::{IdAllocator, SequentialIds};

    fn handle<S: ComponentState>(data: S) -> ComponentHandle<S> {
        ComponentHandle::new(StateComponent::new(
            SequentialIds::new("registry").allocate(),
            data,
        ))
    }

    #[test]
    fn bound_component_downcasts_to_its_type() {
        let graph = handle(Graph::default());
        let bound = BoundComponent::new(&graph);
        assert!(bound.handle::<Graph>().is_some_and(|h| h.ptr_eq(&graph)));
        assert!(bound.handle::<Selection>().is_none());
        assert_eq!(bound.parameter_type(), ParameterType::of::<Graph>());
    }

    #[test]
    fn bind_resolves_in_declared_order() {
        let graph = handle(Graph::default());
        let selection = handle(Selection::default());
        let mut registry = ComponentRegistry::new();
        registry.register_state_component(&graph);
        registry.register_state_component(&selection);

        let params = [ParameterType::of::<Selection>(), ParameterType::of::<Graph>()];
        let bound = registry.bind("h", &params).expect("both types are registered");
        assert_eq!(bound.len(), 2);
        assert_eq!(bound[0].parameter_type().name(), "selection");
        assert_eq!(bound[1].parameter_type().name(), "graph");
    }

    #[test]
    fn bind_reports_missing_type() {
        let mut registry = ComponentRegistry::new();
        registry.register_state_component(&handle(Graph::default()));

        let params = [ParameterType::of::<Graph>(), ParameterType::of::<Selection>()];
        let err = registry.bind("h", &params).expect_err("selection is missing");
        assert_eq!(
            err,
            BindError::UnresolvedType {
                handler: "h",
                parameter: "selection",
            }
        );
    }

    #[test]
    fn reregistering_replaces_instance() {
        let first = handle(Graph::default());
        let second = handle(Graph::default());
        let mut registry = ComponentRegistry::new();
        assert!(registry.register_state_component(&first).is_none());
        assert!(registry.register_state_component(&second).is_some());
        assert_eq!(registry.len(), 1);

        let resolved = registry
            .resolve(ParameterType::of::<Graph>())
            .and_then(BoundComponent::handle::<Graph>)
            .expect("graph is registered");
        assert!(resolved.ptr_eq(&second));
    }

    #[test]
    fn empty_parameter_list_binds_nothing() {
        let registry = ComponentRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.bind("h", &[]).expect("nothing to resolve").is_empty());
        assert!(!registry.contains::<Graph>());
    }
}
