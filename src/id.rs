//! State component identities and the allocators that mint them.
//!
//! Identities are injected through [`State::new`](crate::State::new) rather
//! than drawn from a process-wide generator, so a test (or a replay) can
//! reproduce the exact ids of a previous run.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed namespace for [`SequentialIds`] derivation.
const COMPONENT_NAMESPACE: Uuid = Uuid::from_bytes([
    0x3c, 0x71, 0x0e, 0x5a, 0x92, 0x4b, 0x4f, 0x1d, 0x8a, 0x27, 0x6e, 0xc0, 0x15, 0xd9, 0x44, 0xb8,
]);

/// Stable 128-bit identity of a state component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(Uuid);

impl ComponentId {
    /// Wrap an existing UUID.
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// 64-bit identity hash stored by observers.
    ///
    /// Folds both halves of the UUID together.
    pub fn identity_hash(&self) -> u64 {
        let (high, low) = self.0.as_u64_pair();
        high ^ low.rotate_left(32)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Source of fresh component identities.
pub trait IdAllocator {
    /// Mint a new identity, distinct from every identity minted before.
    fn allocate(&mut self) -> ComponentId;
}

/// Deterministic allocator: UUID v5 ids derived from a seed and a counter.
///
/// Two allocators built with the same seed produce the same sequence.
///
/// # Examples
///
/// ```
/// use statefold::{IdAllocator, SequentialIds};
///
/// let mut a = SequentialIds::new("editor");
/// let mut b = SequentialIds::new("editor");
/// assert_eq!(a.allocate(), b.allocate());
/// assert_ne!(a.allocate(), SequentialIds::new("other").allocate());
/// ```
#[derive(Debug, Clone)]
pub struct SequentialIds {
    seed: String,
    next: u64,
}

impl SequentialIds {
    /// Create an allocator whose sequence is determined by `seed`.
    pub fn new(seed: impl Into<String>) -> Self {
        Self {
            seed: seed.into(),
            next: 0,
        }
    }
}

impl IdAllocator for SequentialIds {
    fn allocate(&mut self) -> ComponentId {
        let name = format!("{}/{}", self.seed, self.next);
        self.next += 1;
        ComponentId(Uuid::new_v5(&COMPONENT_NAMESPACE, name.as_bytes()))
    }
}

/// Allocator backed by random UUID v4 ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIds;

impl IdAllocator for RandomIds {
    fn allocate(&mut self) -> ComponentId {
        ComponentId(Uuid::new_v4())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_ids_are_deterministic() {
        let mut a = SequentialIds::new("seed");
        let mut b = SequentialIds::new("seed");
        for _ in 0..4 {
            assert_eq!(a.allocate(), b.allocate());
        }
    }

    #[test]
    fn sequential_ids_are_distinct() {
        let mut ids = SequentialIds::new("seed");
        let first = ids.allocate();
        let second = ids.allocate();
        assert_ne!(first, second);
        assert_ne!(first.identity_hash(), second.identity_hash());
    }

    #[test]
    fn sequential_ids_are_v5() {
        let id = SequentialIds::new("seed").allocate();
        assert_eq!(id.as_uuid().get_version_num(), 5);
    }

    #[test]
    fn random_ids_are_v4() {
        let id = RandomIds.allocate();
        assert_eq!(id.as_uuid().get_version_num(), 4);
    }

    #[test]
    fn identity_hash_is_stable_for_same_id() {
        let id = SequentialIds::new("seed").allocate();
        let copy = ComponentId::from_uuid(*id.as_uuid());
        assert_eq!(id.identity_hash(), copy.identity_hash());
    }

    #[test]
    fn display_matches_uuid() {
        let id = SequentialIds::new("seed").allocate();
        assert_eq!(id.to_string(), id.as_uuid().to_string());
    }
}
