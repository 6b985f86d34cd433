//! Versioned state components and the update scopes that mutate them.
//!
//! A [`StateComponent`] wraps domain data of a [`ComponentState`] type with
//! an identity, a version counter, and (optionally) a changeset log. Data is
//! only mutated inside an [`UpdateScope`]; closing the scope bumps the version
//! and archives what changed.
//!
//! Two ways to open a scope:
//! - [`StateComponent::update`] borrows the component exclusively, so a
//!   second scope on the same component does not compile.
//! - [`ComponentHandle::update`] works through a shared handle and reports
//!   re-entry as [`ScopeError::AlreadyOpen`].

use std::cell::{Ref, RefCell, RefMut};
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use crate::changeset::Changeset;
use crate::changeset_manager::ChangesetManager;
use crate::error::ScopeError;
use crate::id::ComponentId;
use crate::observer::{StateComponentVersion, UpdateType};

/// Version of a freshly created component.
pub const INITIAL_VERSION: u32 = 1;

/// Domain data held by a state component.
///
/// # Contract
///
/// - `COMPONENT_TYPE` names the component slot in logs, errors, and
///   observer bookkeeping. It must be unique within a [`State`](crate::State).
/// - When `TRACKS_CHANGESETS` is `false` the component keeps no changeset
///   log and observers always get a complete refresh.
pub trait ComponentState: 'static {
    /// Identifies this component type (e.g. `"graph"`).
    const COMPONENT_TYPE: &'static str;

    /// Whether the component records changesets for partial refreshes.
    const TRACKS_CHANGESETS: bool = true;

    /// Delta type describing changes between versions.
    type Changeset: Changeset;
}

/// How a restored undo snapshot relates to the recorded changeset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoDirection {
    /// Going back: the recorded changeset is reversed before use.
    Undo,
    /// Going forward again: the recorded changeset is used as is.
    Redo,
}

/// A versioned, independently observable slice of application state.
#[derive(Debug)]
pub struct StateComponent<S: ComponentState> {
    id: ComponentId,
    version: u32,
    changesets: Option<ChangesetManager<S::Changeset>>,
    data: S,
}

impl<S: ComponentState> StateComponent<S> {
    /// Create a component at [`INITIAL_VERSION`].
    ///
    /// A changeset log is attached iff `S::TRACKS_CHANGESETS`.
    pub fn new(id: ComponentId, data: S) -> Self {
        Self {
            id,
            version: INITIAL_VERSION,
            changesets: S::TRACKS_CHANGESETS.then(ChangesetManager::new),
            data,
        }
    }

    /// Stable identity of this instance.
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// Current version. Starts at [`INITIAL_VERSION`] and never decreases.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Identity hash recorded by observers.
    pub fn identity_hash(&self) -> u64 {
        self.id.identity_hash()
    }

    /// The `(identity hash, version)` pair an observer records after
    /// processing this component.
    pub fn version_stamp(&self) -> StateComponentVersion {
        StateComponentVersion {
            hash: self.identity_hash(),
            version: self.version,
        }
    }

    /// Read-only view of the domain data.
    pub fn data(&self) -> &S {
        &self.data
    }

    /// Consume the component, returning its data.
    pub fn into_data(self) -> S {
        self.data
    }

    /// The changeset log, if this component tracks changesets.
    pub fn changesets(&self) -> Option<&ChangesetManager<S::Changeset>> {
        self.changesets.as_ref()
    }

    /// Classify what an observer that last saw `last_seen` must refresh.
    pub fn update_type_for(&self, last_seen: StateComponentVersion) -> UpdateType {
        if last_seen.hash != self.identity_hash() || last_seen.version == 0 {
            return UpdateType::Complete;
        }
        if last_seen.version == self.version {
            return UpdateType::None;
        }
        match &self.changesets {
            Some(manager) if manager.has_valid_run(last_seen.version, self.version) => {
                UpdateType::Partial
            }
            _ => UpdateType::Complete,
        }
    }

    /// Aggregate of every changeset after version `after`.
    ///
    /// `None` if the component keeps no log, if history after `after` was
    /// pruned, or if the range crosses a complete replacement.
    pub fn aggregated_changeset(&mut self, after: u32) -> Option<&S::Changeset> {
        let version = self.version;
        let manager = self.changesets.as_mut()?;
        if after < version && !manager.has_valid_run(after, version) {
            return None;
        }
        manager.get_aggregated(after, version)
    }

    /// Drop changesets no observer needs any more.
    pub fn prune_changesets(&mut self, up_to: u32) {
        let version = self.version;
        if let Some(manager) = self.changesets.as_mut() {
            manager.prune_obsolete(up_to, version);
        }
    }

    /// Open an update scope.
    ///
    /// The scope holds the only borrow of the component until it is dropped.
    pub fn update(&mut self) -> UpdateScope<'_, S> {
        UpdateScope::open(ScopeTarget::Exclusive(self))
    }

    /// Lifecycle hook run by [`State`](crate::State) on removal.
    pub(crate) fn clear_history(&mut self) {
        if let Some(manager) = self.changesets.as_mut() {
            manager.clear();
        }
    }

    fn close_scope(&mut self, update_type: UpdateType) {
        match update_type {
            UpdateType::None => {
                if let Some(manager) = self.changesets.as_mut() {
                    manager.current_mut().clear();
                }
                return;
            }
            UpdateType::Partial => {
                self.version += 1;
                if let Some(manager) = self.changesets.as_mut() {
                    manager.push_current(self.version);
                }
            }
            UpdateType::Complete => {
                self.version += 1;
                if let Some(manager) = self.changesets.as_mut() {
                    manager.push_null(self.version);
                }
            }
        }
        tracing::trace!(
            component = S::COMPONENT_TYPE,
            version = self.version,
            ?update_type,
            "update scope closed"
        );
    }
}

/// Cheap-clone shared handle to a state component.
///
/// Handles are what the binding registry stores and what command handlers
/// receive. They are single-threaded: the whole dispatch-and-scope sequence
/// runs on the caller's thread.
#[derive(Debug)]
pub struct ComponentHandle<S: ComponentState> {
    inner: Rc<RefCell<StateComponent<S>>>,
}

// Manual `Clone` so `S` need not be `Clone`.
impl<S: ComponentState> Clone for ComponentHandle<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S: ComponentState> ComponentHandle<S> {
    /// Wrap a component in a shared handle.
    pub fn new(component: StateComponent<S>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(component)),
        }
    }

    /// Open an update scope through the handle.
    ///
    /// # Errors
    ///
    /// [`ScopeError::AlreadyOpen`] if a scope (or a read borrow) is already
    /// held on this component.
    pub fn update(&self) -> Result<UpdateScope<'_, S>, ScopeError> {
        let component = self.inner.try_borrow_mut().map_err(|_| already_open::<S>())?;
        Ok(UpdateScope::open(ScopeTarget::Shared(component)))
    }

    /// Borrow the component for reading.
    ///
    /// # Errors
    ///
    /// [`ScopeError::AlreadyOpen`] if an update scope is open.
    pub fn read(&self) -> Result<Ref<'_, StateComponent<S>>, ScopeError> {
        self.inner.try_borrow().map_err(|_| already_open::<S>())
    }

    /// Borrow the component mutably outside of a scope.
    ///
    /// Used for queries that refresh internal caches (aggregation) and for
    /// pruning; never bumps the version.
    pub(crate) fn read_mut(&self) -> Result<RefMut<'_, StateComponent<S>>, ScopeError> {
        self.inner.try_borrow_mut().map_err(|_| already_open::<S>())
    }

    /// Current `(identity hash, version)` stamp.
    pub fn version_stamp(&self) -> Result<StateComponentVersion, ScopeError> {
        Ok(self.read()?.version_stamp())
    }

    /// See [`StateComponent::update_type_for`].
    pub fn update_type_for(&self, last_seen: StateComponentVersion) -> Result<UpdateType, ScopeError> {
        Ok(self.read()?.update_type_for(last_seen))
    }

    /// Run `f` on the aggregated changeset after version `after`.
    ///
    /// See [`StateComponent::aggregated_changeset`].
    pub fn with_aggregated<R>(
        &self,
        after: u32,
        f: impl FnOnce(Option<&S::Changeset>) -> R,
    ) -> Result<R, ScopeError> {
        let mut component = self.read_mut()?;
        Ok(f(component.aggregated_changeset(after)))
    }

    /// True if both handles point at the same component.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

fn already_open<S: ComponentState>() -> ScopeError {
    ScopeError::AlreadyOpen {
        component: S::COMPONENT_TYPE,
    }
}

enum ScopeTarget<'a, S: ComponentState> {
    Exclusive(&'a mut StateComponent<S>),
    Shared(RefMut<'a, StateComponent<S>>),
}

impl<S: ComponentState> Deref for ScopeTarget<'_, S> {
    type Target = StateComponent<S>;

    fn deref(&self) -> &Self::Target {
        match self {
            ScopeTarget::Exclusive(component) => component,
            ScopeTarget::Shared(component) => component,
        }
    }
}

impl<S: ComponentState> DerefMut for ScopeTarget<'_, S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            ScopeTarget::Exclusive(component) => component,
            ScopeTarget::Shared(component) => component,
        }
    }
}

/// Bracketed transaction granting exclusive mutation access to one
/// component.
///
/// Writers report how much they changed through
/// [`set_update_type`](UpdateScope::set_update_type), which only ever raises
/// the tracked kind. Dropping the scope closes it:
///
/// | final kind | version | changeset log                  |
/// |------------|---------|--------------------------------|
/// | `None`     | same    | live changeset discarded       |
/// | `Partial`  | `+1`    | live changeset archived        |
/// | `Complete` | `+1`    | null marker archived           |
///
/// The close runs on every exit path, including early `?` returns from a
/// handler.
pub struct UpdateScope<'a, S: ComponentState> {
    target: ScopeTarget<'a, S>,
    update_type: UpdateType,
}

impl<'a, S: ComponentState> UpdateScope<'a, S> {
    fn open(target: ScopeTarget<'a, S>) -> Self {
        Self {
            target,
            update_type: UpdateType::None,
        }
    }

    /// Raise the tracked update kind. Lower values are ignored.
    pub fn set_update_type(&mut self, update_type: UpdateType) {
        self.update_type = self.update_type.max(update_type);
    }

    /// Update kind accumulated so far.
    pub fn update_type(&self) -> UpdateType {
        self.update_type
    }

    /// Component identity.
    pub fn id(&self) -> ComponentId {
        self.target.id
    }

    /// Version before this scope closes.
    pub fn version(&self) -> u32 {
        self.target.version
    }

    /// Read the domain data.
    pub fn data(&self) -> &S {
        &self.target.data
    }

    /// Mutate the domain data.
    ///
    /// Does not raise the update kind; callers say what they changed.
    pub fn data_mut(&mut self) -> &mut S {
        &mut self.target.data
    }

    /// The live changeset, if the component tracks changesets.
    pub fn changeset_mut(&mut self) -> Option<&mut S::Changeset> {
        self.target.changesets.as_mut().map(ChangesetManager::current_mut)
    }

    /// Data and live changeset together.
    pub fn parts_mut(&mut self) -> (&mut S, Option<&mut S::Changeset>) {
        let component = &mut *self.target;
        (
            &mut component.data,
            component.changesets.as_mut().map(ChangesetManager::current_mut),
        )
    }

    /// Replace the data wholesale. Marks the scope `Complete`.
    pub fn replace(&mut self, data: S) {
        self.target.data = data;
        self.set_update_type(UpdateType::Complete);
    }

    /// Take over the data of a persisted component.
    ///
    /// The source is consumed. The target keeps its own identity, so its
    /// version stays the only one observers have stamped it with.
    pub fn restore_from_persisted(&mut self, source: StateComponent<S>) {
        self.target.data = source.data;
        self.set_update_type(UpdateType::Complete);
    }

    /// Take over the data of an undo snapshot.
    ///
    /// `changeset` describes the original forward change between the
    /// snapshots. It becomes the live changeset (reversed when
    /// `direction` is [`UndoDirection::Undo`]), making the restore a
    /// `Partial` update. Without a changeset, without a changeset log, or
    /// when the changeset cannot be reversed, the restore is `Complete`.
    pub fn restore_from_undo(
        &mut self,
        source: StateComponent<S>,
        changeset: Option<S::Changeset>,
        direction: UndoDirection,
    ) {
        self.target.data = source.data;

        let representable = match (changeset, self.target.changesets.as_mut()) {
            (Some(mut changeset), Some(manager)) => {
                let usable = match direction {
                    UndoDirection::Undo => changeset.reverse(),
                    UndoDirection::Redo => true,
                };
                if usable {
                    manager.current_mut().copy_from(&changeset);
                }
                usable
            }
            _ => false,
        };

        self.set_update_type(if representable {
            UpdateType::Partial
        } else {
            UpdateType::Complete
        });
    }
}

impl<S: ComponentState> Drop for UpdateScope<'_, S> {
    fn drop(&mut self) {
        let update_type = self.update_type;
        self.target.close_scope(update_type);
    }
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use std::collections::{BTreeMap, BTreeSet};

    use super::{ComponentState, UpdateScope};
    use crate::changeset::{Changeset, NoChangeset, SimpleChangeset};
    use crate::observer::UpdateType;

    /// Keyed node collection tracked with a [`SimpleChangeset`].
    #[derive(Debug, Clone, Default, PartialEq)]
    pub(crate) struct Graph {
        pub nodes: BTreeMap<u32, String>,
    }

    impl ComponentState for Graph {
        const COMPONENT_TYPE: &'static str = "graph";
        type Changeset = SimpleChangeset<u32>;
    }

    /// Insert or rename a node, recording the delta.
    pub(crate) fn put_node(scope: &mut UpdateScope<'_, Graph>, id: u32, name: &str) {
        let (graph, changeset) = scope.parts_mut();
        let existed = graph.nodes.insert(id, name.to_owned()).is_some();
        if let Some(cs) = changeset {
            if existed {
                cs.changed(id);
            } else {
                cs.created(id);
            }
        }
        scope.set_update_type(UpdateType::Partial);
    }

    /// Remove a node, recording the delta.
    pub(crate) fn remove_node(scope: &mut UpdateScope<'_, Graph>, id: u32) {
        let (graph, changeset) = scope.parts_mut();
        if graph.nodes.remove(&id).is_some() {
            if let Some(cs) = changeset {
                cs.deleted(id);
            }
            scope.set_update_type(UpdateType::Partial);
        }
    }

    /// Selected node ids.
    #[derive(Debug, Clone, Default, PartialEq)]
    pub(crate) struct Selection {
        pub selected: BTreeSet<u32>,
    }

    impl ComponentState for Selection {
        const COMPONENT_TYPE: &'static str = "selection";
        type Changeset = SimpleChangeset<u32>;
    }

    /// View settings that never describe partial deltas.
    #[derive(Debug, Clone, Default, PartialEq)]
    pub(crate) struct Viewport {
        pub zoom: u32,
    }

    impl ComponentState for Viewport {
        const COMPONENT_TYPE: &'static str = "viewport";
        const TRACKS_CHANGESETS: bool = false;
        type Changeset = NoChangeset;
    }

    /// Append-only log whose changeset cannot be reversed.
    #[derive(Debug, Clone, Default, PartialEq)]
    pub(crate) struct Journal {
        pub lines: Vec<String>,
    }

    /// Number of lines appended.
    #[derive(Debug, Clone, Default, PartialEq)]
    pub(crate) struct Appended {
        pub count: usize,
    }

    impl Changeset for Appended {
        fn clear(&mut self) {
            self.count = 0;
        }

        fn aggregate_from(&mut self, changesets: &[&Self]) {
            self.count = changesets.iter().map(|cs| cs.count).sum();
        }

        fn reverse(&mut self) -> bool {
            false
        }
    }

    impl ComponentState for Journal {
        const COMPONENT_TYPE: &'static str = "journal";
        type Changeset = Appended;
    }
}
