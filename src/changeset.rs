//! Changeset contract and the stock implementations.
//!
//! A changeset is a domain-defined description of the delta between two
//! versions of a state component. The runtime never looks inside one: it
//! only clears, merges, and reverses them through [`Changeset`].

use std::collections::BTreeSet;
use std::fmt;

/// A delta between two versions of a state component.
///
/// # Contract
///
/// - [`aggregate_from`](Changeset::aggregate_from) replaces `self` with a
///   changeset equivalent to applying the listed deltas in order.
/// - [`reverse`](Changeset::reverse) inverts the direction of the delta in
///   place, returning `false` (and leaving `self` in an unspecified state)
///   if the delta cannot be inverted.
pub trait Changeset: Default + fmt::Debug + 'static {
    /// Reset to the empty delta.
    fn clear(&mut self);

    /// Replace `self` with the in-order aggregate of `changesets`.
    fn aggregate_from(&mut self, changesets: &[&Self]);

    /// Invert the direction of the delta.
    fn reverse(&mut self) -> bool;

    /// Make `self` equivalent to `other`.
    fn copy_from(&mut self, other: &Self) {
        self.clear();
        self.aggregate_from(&[other]);
    }
}

/// Changeset for components that never describe partial deltas.
///
/// Pair it with `ComponentState::TRACKS_CHANGESETS = false`; observers of
/// such components always receive a complete refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoChangeset;

impl Changeset for NoChangeset {
    fn clear(&mut self) {}

    fn aggregate_from(&mut self, _changesets: &[&Self]) {}

    fn reverse(&mut self) -> bool {
        true
    }
}

/// Created / changed / deleted key sets.
///
/// Suits any component holding a keyed collection (nodes, entries, rows).
/// A key appears in at most one of the three sets.
///
/// # Examples
///
/// ```
/// use statefold::{Changeset, SimpleChangeset};
///
/// let mut first = SimpleChangeset::default();
/// first.created(1);
/// let mut second = SimpleChangeset::default();
/// second.deleted(1);
/// second.changed(2);
///
/// let mut total = SimpleChangeset::default();
/// total.aggregate_from(&[&first, &second]);
///
/// // Created then deleted within the run: nothing to report for key 1.
/// assert!(!total.is_created(&1) && !total.is_deleted(&1));
/// assert!(total.is_changed(&2));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleChangeset<K: Ord> {
    created: BTreeSet<K>,
    changed: BTreeSet<K>,
    deleted: BTreeSet<K>,
}

// Manual `Default` so `K` need not be `Default`.
impl<K: Ord> Default for SimpleChangeset<K> {
    fn default() -> Self {
        Self {
            created: BTreeSet::new(),
            changed: BTreeSet::new(),
            deleted: BTreeSet::new(),
        }
    }
}

impl<K: Ord + Clone> SimpleChangeset<K> {
    /// Record that `key` was created.
    pub fn created(&mut self, key: K) {
        if self.deleted.remove(&key) {
            self.changed.insert(key);
        } else {
            self.created.insert(key);
        }
    }

    /// Record that `key` was modified.
    pub fn changed(&mut self, key: K) {
        if !self.created.contains(&key) {
            self.changed.insert(key);
        }
    }

    /// Record that `key` was deleted.
    pub fn deleted(&mut self, key: K) {
        if self.created.remove(&key) {
            return;
        }
        self.changed.remove(&key);
        self.deleted.insert(key);
    }

    /// Whether `key` is reported as created.
    pub fn is_created(&self, key: &K) -> bool {
        self.created.contains(key)
    }

    /// Whether `key` is reported as changed.
    pub fn is_changed(&self, key: &K) -> bool {
        self.changed.contains(key)
    }

    /// Whether `key` is reported as deleted.
    pub fn is_deleted(&self, key: &K) -> bool {
        self.deleted.contains(key)
    }

    /// Keys reported as created, in order.
    pub fn created_keys(&self) -> impl Iterator<Item = &K> {
        self.created.iter()
    }

    /// Keys reported as changed, in order.
    pub fn changed_keys(&self) -> impl Iterator<Item = &K> {
        self.changed.iter()
    }

    /// Keys reported as deleted, in order.
    pub fn deleted_keys(&self) -> impl Iterator<Item = &K> {
        self.deleted.iter()
    }

    /// True if no key is reported.
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.changed.is_empty() && self.deleted.is_empty()
    }

    fn apply(&mut self, delta: &Self) {
        for key in &delta.created {
            self.created(key.clone());
        }
        for key in &delta.changed {
            self.changed(key.clone());
        }
        for key in &delta.deleted {
            self.deleted(key.clone());
        }
    }
}

impl<K: Ord + Clone + fmt::Debug + 'static> Changeset for SimpleChangeset<K> {
    fn clear(&mut self) {
        self.created.clear();
        self.changed.clear();
        self.deleted.clear();
    }

    fn aggregate_from(&mut self, changesets: &[&Self]) {
        self.clear();
        for delta in changesets {
            self.apply(delta);
        }
    }

    fn reverse(&mut self) -> bool {
        std::mem::swap(&mut self.created, &mut self.deleted);
        true
    }
}
