//! Observer-side bookkeeping: what each observer last saw, and what it
//! must refresh now.
//!
//! An observer (a view, an inspector, a serializer) records one
//! [`StateComponentVersion`] per component slot. On its next pass it asks
//! the component for an [`UpdateType`] and, when partial, pulls the
//! aggregated changeset instead of re-reading everything.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::component::{ComponentHandle, ComponentState};
use crate::error::ScopeError;

/// How much an observer must refresh.
///
/// Ordered: `None < Partial < Complete`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UpdateType {
    /// Nothing changed since the observer last looked.
    #[default]
    None,
    /// The aggregated changeset describes every change.
    Partial,
    /// Re-read the whole component.
    Complete,
}

/// `(identity hash, version)` an observer recorded for one component.
///
/// The default value (`version == 0`) means "never observed".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateComponentVersion {
    /// Identity hash of the component instance that was observed.
    pub hash: u64,
    /// Version that was observed.
    pub version: u32,
}

/// What an observer receives for one component on one pass.
#[derive(Debug)]
pub enum Observation<'a, S: ComponentState> {
    /// Nothing changed.
    Unchanged,
    /// Apply this delta.
    Partial(&'a S::Changeset),
    /// Rebuild from this data.
    Complete(&'a S),
}

/// Per-observer record of the last version seen of each component slot.
///
/// Slots are keyed by `ComponentState::COMPONENT_TYPE`, so substituting a
/// different instance into the same slot is caught by the identity hash.
///
/// # Examples
///
/// ```
/// use statefold::{
///     ComponentState, NoChangeset, Observation, ObservedVersions, SequentialIds, State,
/// };
///
/// #[derive(Debug, Default)]
/// struct Title(String);
///
/// impl ComponentState for Title {
///     const COMPONENT_TYPE: &'static str = "title";
///     const TRACKS_CHANGESETS: bool = false;
///     type Changeset = NoChangeset;
/// }
///
/// let mut state = State::new(SequentialIds::new("doc"));
/// let title = state.add_component(Title("draft".into())).unwrap();
///
/// let mut seen = ObservedVersions::default();
/// let mut refreshed = false;
/// seen.observe(&title, |obs| refreshed = matches!(obs, Observation::Complete(_)))
///     .unwrap();
/// assert!(refreshed);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedVersions {
    versions: BTreeMap<String, StateComponentVersion>,
}

impl ObservedVersions {
    /// Last recorded stamp for `component_type`, or the "never observed"
    /// default.
    pub fn last_seen(&self, component_type: &str) -> StateComponentVersion {
        self.versions
            .get(component_type)
            .copied()
            .unwrap_or_default()
    }

    /// Record that `component_type` was observed at `stamp`.
    pub fn record(&mut self, component_type: &str, stamp: StateComponentVersion) {
        self.versions.insert(component_type.to_owned(), stamp);
    }

    /// Forget a slot; the next observation is complete.
    pub fn forget(&mut self, component_type: &str) {
        self.versions.remove(component_type);
    }

    /// Number of slots with a recorded stamp.
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// True if nothing was ever recorded.
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Classify, fetch, hand over, and record one component in one pass.
    ///
    /// A partial classification whose aggregation turns out unavailable is
    /// degraded to a complete observation. Returns the update type that was
    /// actually delivered to `f`.
    ///
    /// # Errors
    ///
    /// [`ScopeError::AlreadyOpen`] if the component is inside an update scope.
    pub fn observe<S: ComponentState>(
        &mut self,
        handle: &ComponentHandle<S>,
        f: impl FnOnce(Observation<'_, S>),
    ) -> Result<UpdateType, ScopeError> {
        let last_seen = self.last_seen(S::COMPONENT_TYPE);
        let mut component = handle.read_mut()?;
        let stamp = component.version_stamp();

        let delivered = match component.update_type_for(last_seen) {
            UpdateType::None => {
                f(Observation::Unchanged);
                UpdateType::None
            }
            UpdateType::Partial => match component.aggregated_changeset(last_seen.version) {
                Some(changeset) => {
                    f(Observation::Partial(changeset));
                    UpdateType::Partial
                }
                None => {
                    f(Observation::Complete(component.data()));
                    UpdateType::Complete
                }
            },
            UpdateType::Complete => {
                f(Observation::Complete(component.data()));
                UpdateType::Complete
            }
        };

        self.record(S::COMPONENT_TYPE, stamp);
        Ok(delivered)
    }
}
