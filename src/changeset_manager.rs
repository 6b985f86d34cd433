//! Append-only, front-prunable log of version-tagged changesets.
//!
//! Each state component that tracks changesets owns one manager. Closing
//! an update scope archives the live changeset under the component's new
//! version (or archives a null marker for a complete replacement). Observers
//! then ask for the aggregate of every delta after the version they last saw.

use std::collections::VecDeque;

use crate::changeset::Changeset;

/// One archived log entry.
///
/// `changeset == None` marks a complete replacement at `version` that no
/// delta can describe.
#[derive(Debug)]
struct VersionedChangeset<C> {
    version: u32,
    changeset: Option<C>,
}

/// Last aggregation result, valid only for the exact bounds it was built for.
#[derive(Debug)]
struct AggregationCache<C> {
    after: u32,
    current: u32,
    changeset: C,
}

/// Version-tagged changeset log with a cached aggregation query.
///
/// Entries are kept in ascending version order and only ever removed from
/// the front by [`prune_obsolete`](ChangesetManager::prune_obsolete).
///
/// # Type Parameters
///
/// * `C` - The component's [`Changeset`] type.
#[derive(Debug)]
pub struct ChangesetManager<C: Changeset> {
    entries: VecDeque<VersionedChangeset<C>>,
    current: C,
    empty: C,
    cache: Option<AggregationCache<C>>,
    aggregations: u64,
}

impl<C: Changeset> Default for ChangesetManager<C> {
    fn default() -> Self {
        Self {
            entries: VecDeque::new(),
            current: C::default(),
            empty: C::default(),
            cache: None,
            aggregations: 0,
        }
    }
}

impl<C: Changeset> ChangesetManager<C> {
    /// Create an empty manager with a fresh live changeset.
    pub fn new() -> Self {
        Self::default()
    }

    /// The live changeset being accumulated for the next version.
    pub fn current(&self) -> &C {
        &self.current
    }

    /// Mutable access to the live changeset.
    pub fn current_mut(&mut self) -> &mut C {
        &mut self.current
    }

    /// Archive the live changeset under `version` and start a new empty one.
    pub fn push_current(&mut self, version: u32) {
        let archived = std::mem::take(&mut self.current);
        self.push_entry(version, Some(archived));
    }

    /// Archive a null marker under `version` and clear the live changeset.
    pub fn push_null(&mut self, version: u32) {
        self.current.clear();
        self.push_entry(version, None);
    }

    fn push_entry(&mut self, version: u32, changeset: Option<C>) {
        debug_assert!(
            self.entries.back().is_none_or(|last| last.version < version),
            "changeset versions must be pushed in ascending order"
        );
        self.cache = None;
        self.entries.push_back(VersionedChangeset { version, changeset });
    }

    /// Drop every entry with a version `<= up_to`.
    ///
    /// When `up_to >= current_version` no observer can need the live
    /// changeset either, so it is cleared too.
    pub fn prune_obsolete(&mut self, up_to: u32, current_version: u32) {
        let before = self.entries.len();
        while self.entries.front().is_some_and(|e| e.version <= up_to) {
            self.entries.pop_front();
        }
        if up_to >= current_version {
            self.current.clear();
        }
        if self.entries.len() != before {
            self.cache = None;
        }
    }

    /// Drop every entry and reset the live changeset.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.current.clear();
        self.cache = None;
    }

    /// Number of archived entries, null markers included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no entry is archived.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Versions of the archived entries, oldest first.
    pub fn versions(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().map(|e| e.version)
    }

    /// How many times an aggregation was actually computed.
    ///
    /// Cache hits and the single-entry shortcuts do not count.
    pub fn aggregation_count(&self) -> u64 {
        self.aggregations
    }

    /// Whether every delta in `(after, current_version]` is on record.
    ///
    /// False when nothing changed, when history before `after + 1` was
    /// pruned away, or when a null marker lies inside the range.
    pub fn has_valid_run(&self, after: u32, current_version: u32) -> bool {
        if current_version <= after {
            return false;
        }
        match self.entries.front() {
            None => return false,
            Some(first) if after.saturating_add(1) < first.version => return false,
            Some(_) => {}
        }
        self.entries
            .iter()
            .filter(|e| e.version > after)
            .all(|e| e.changeset.is_some())
    }

    /// Aggregate every delta after `after`, up to `current_version`.
    ///
    /// Returns `None` when a null marker lies in the range; the caller must
    /// fall back to a complete refresh. The returned reference borrows the
    /// manager, so it cannot outlive the next mutation; clone it to keep a
    /// snapshot.
    pub fn get_aggregated(&mut self, after: u32, current_version: u32) -> Option<&C> {
        let hit = self
            .cache
            .as_ref()
            .is_some_and(|c| c.after == after && c.current == current_version);
        if hit {
            return self.cache.as_ref().map(|c| &c.changeset);
        }
        self.cache = None;

        let mut run: Vec<&C> = Vec::new();
        for entry in self.entries.iter().filter(|e| e.version > after) {
            run.push(entry.changeset.as_ref()?);
        }

        if run.is_empty() {
            return Some(if current_version > after {
                &self.current
            } else {
                &self.empty
            });
        }

        if current_version > after {
            run.push(&self.current);
        }
        let mut aggregated = C::default();
        aggregated.aggregate_from(&run);
        self.aggregations += 1;

        tracing::trace!(after, current_version, "changesets aggregated");

        let cache = self.cache.insert(AggregationCache {
            after,
            current: current_version,
            changeset: aggregated,
        });
        Some(&cache.changeset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::SimpleChangeset;

    type Nodes = SimpleChangeset<u32>;

    /// Record `f` into the live changeset and archive it under `version`.
    fn push(manager: &mut ChangesetManager<Nodes>, version: u32, f: impl FnOnce(&mut Nodes)) {
        f(manager.current_mut());
        manager.push_current(version);
    }

    fn manager_with_two_versions() -> ChangesetManager<Nodes> {
        let mut m = ChangesetManager::new();
        push(&mut m, 2, |cs| cs.created(10));
        push(&mut m, 3, |cs| {
            cs.changed(10);
            cs.created(11);
        });
        m
    }

    #[test]
    fn aggregation_matches_manual_merge() {
        let mut first = Nodes::default();
        first.created(10);
        let mut second = Nodes::default();
        second.changed(10);
        second.created(11);
        let mut expected = Nodes::default();
        expected.aggregate_from(&[&first, &second, &Nodes::default()]);

        let mut m = manager_with_two_versions();
        let aggregated = m.get_aggregated(1, 3).expect("run should be available");
        assert_eq!(aggregated, &expected);
    }

    #[test]
    fn null_marker_poisons_aggregation() {
        let mut m = manager_with_two_versions();
        m.push_null(4);
        push(&mut m, 5, |cs| cs.created(12));

        assert!(m.get_aggregated(1, 5).is_none());
        assert!(m.get_aggregated(3, 5).is_none());
        assert!(!m.has_valid_run(1, 5));
        // The range after the marker is still representable.
        assert!(m.get_aggregated(4, 5).is_some());
        assert!(m.has_valid_run(4, 5));
    }

    #[test]
    fn identical_queries_hit_the_cache() {
        let mut m = manager_with_two_versions();
        m.get_aggregated(1, 3);
        m.get_aggregated(1, 3);
        assert_eq!(m.aggregation_count(), 1);
    }

    #[test]
    fn changing_either_bound_recomputes() {
        let mut m = manager_with_two_versions();
        m.get_aggregated(1, 3);
        m.get_aggregated(1, 4);
        assert_eq!(m.aggregation_count(), 2);
        m.get_aggregated(0, 4);
        assert_eq!(m.aggregation_count(), 3);
        // Going back to the first bounds recomputes: only one pair is cached.
        m.get_aggregated(1, 3);
        assert_eq!(m.aggregation_count(), 4);
    }

    #[test]
    fn push_invalidates_cache() {
        let mut m = manager_with_two_versions();
        m.get_aggregated(1, 4);
        push(&mut m, 4, |cs| cs.deleted(10));
        let aggregated = m.get_aggregated(1, 4).expect("run should be available");
        // The archived entry 4 replaced the live changeset in the run.
        assert!(!aggregated.is_created(&10));
        assert_eq!(m.aggregation_count(), 2);
    }

    #[test]
    fn empty_range_returns_live_changeset() {
        let mut m = manager_with_two_versions();
        m.current_mut().changed(99);

        let live = m.get_aggregated(3, 4).expect("live changeset should be returned");
        assert!(live.is_changed(&99));
        assert_eq!(m.aggregation_count(), 0);
    }

    #[test]
    fn up_to_date_query_returns_empty_changeset() {
        let mut m = manager_with_two_versions();
        m.current_mut().changed(99);

        let aggregated = m.get_aggregated(3, 3).expect("empty changeset should be returned");
        assert!(aggregated.is_empty());
    }

    #[test]
    fn returned_live_changeset_snapshot_is_independent() {
        let mut m = manager_with_two_versions();
        m.current_mut().changed(99);
        let snapshot = m.get_aggregated(3, 4).cloned().expect("live changeset");

        m.current_mut().deleted(99);
        m.push_current(4);

        assert!(snapshot.is_changed(&99));
        assert!(!snapshot.is_deleted(&99));
    }

    #[test]
    fn prune_removes_entries_up_to_version() {
        let mut m = manager_with_two_versions();
        push(&mut m, 4, |cs| cs.created(12));

        m.prune_obsolete(3, 4);
        assert_eq!(m.versions().collect::<Vec<_>>(), vec![4]);
    }

    #[test]
    fn prune_keeps_live_changeset_below_current() {
        let mut m = manager_with_two_versions();
        m.current_mut().created(50);

        m.prune_obsolete(2, 3);
        assert!(m.current().is_created(&50));
    }

    #[test]
    fn prune_at_current_clears_live_changeset() {
        let mut m = manager_with_two_versions();
        m.current_mut().created(50);

        m.prune_obsolete(3, 3);
        assert!(m.is_empty());
        assert!(m.current().is_empty());
    }

    #[test]
    fn pruned_history_is_not_a_valid_run() {
        let mut m = manager_with_two_versions();
        push(&mut m, 4, |cs| cs.created(12));
        m.prune_obsolete(2, 4);

        assert!(!m.has_valid_run(1, 4));
        assert!(m.has_valid_run(2, 4));
    }

    #[test]
    fn empty_log_is_not_a_valid_run() {
        let m = ChangesetManager::<Nodes>::new();
        assert!(!m.has_valid_run(1, 2));
    }

    #[test]
    fn no_change_is_not_a_valid_run() {
        let m = manager_with_two_versions();
        assert!(!m.has_valid_run(3, 3));
    }

    #[test]
    fn push_null_clears_live_changeset() {
        let mut m = manager_with_two_versions();
        m.current_mut().created(77);
        m.push_null(4);
        assert!(m.current().is_empty());
        assert_eq!(m.len(), 3);
    }
}
