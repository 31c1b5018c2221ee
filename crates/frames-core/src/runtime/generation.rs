use std::{
    collections::BTreeSet,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Logical clock value identifying a frame and the records written under it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Generation(pub u64);

impl Generation {
    /// Never minted; sorts below every real generation
    pub const ZERO: Generation = Generation(0);

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Process-wide monotonically increasing generation source
#[derive(Debug)]
pub struct GenerationCounter {
    next: AtomicU64,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Mint a fresh generation. Never returns the same value twice.
    pub fn mint(&self) -> Generation {
        Generation(self.next.fetch_add(1, Ordering::AcqRel))
    }

    /// The generation the next call to `mint` will return
    pub fn peek(&self) -> Generation {
        Generation(self.next.load(Ordering::Acquire))
    }
}

impl Default for GenerationCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Generations that were open when a frame was opened; their records stay
/// hidden from that frame for its whole lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidSet(Arc<BTreeSet<Generation>>);

impl InvalidSet {
    pub fn new(generations: impl IntoIterator<Item = Generation>) -> Self {
        Self(Arc::new(generations.into_iter().collect()))
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains(&self, generation: Generation) -> bool {
        self.0.contains(&generation)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Generation> + '_ {
        self.0.iter().copied()
    }
}

/// What one reader is allowed to see: its own generation plus everything
/// older that was not open when it started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visibility {
    /// Reader's generation; for a snapshot of "now" this is the next
    /// unminted generation
    pub generation: Generation,
    pub invalid: InvalidSet,
    own: bool,
}

impl Visibility {
    /// View of a frame, which also sees its own writes
    pub fn new(generation: Generation, invalid: InvalidSet) -> Self {
        Self {
            generation,
            invalid,
            own: true,
        }
    }

    /// View of everything committed strictly before `upper`
    pub fn snapshot(upper: Generation, invalid: InvalidSet) -> Self {
        Self {
            generation: upper,
            invalid,
            own: false,
        }
    }

    /// Newest record with generation <= reader's, excluding invalid ones
    pub fn can_see(&self, record: Generation) -> bool {
        (self.own && record == self.generation)
            || (record < self.generation && !self.invalid.contains(record))
    }
}

/// Identity of a framed instance, stable across all of its records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub Uuid);

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", &self.0.to_string()[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_is_strictly_increasing() {
        let counter = GenerationCounter::new();
        let a = counter.mint();
        let b = counter.mint();
        let c = counter.mint();
        assert!(a < b && b < c);
        assert_eq!(counter.peek(), Generation(c.get() + 1));
    }

    #[test]
    fn test_counter_never_mints_zero() {
        let counter = GenerationCounter::new();
        assert!(counter.mint() > Generation::ZERO);
    }

    #[test]
    fn test_visibility_hides_invalid_and_future_generations() {
        let view = Visibility::new(Generation(5), InvalidSet::new([Generation(3)]));
        assert!(view.can_see(Generation(5)));
        assert!(view.can_see(Generation(4)));
        assert!(view.can_see(Generation(1)));
        assert!(!view.can_see(Generation(3)));
        assert!(!view.can_see(Generation(6)));
    }

    #[test]
    fn test_snapshot_excludes_its_upper_bound() {
        let view = Visibility::snapshot(Generation(5), InvalidSet::new([Generation(4)]));
        assert!(!view.can_see(Generation(5)));
        assert!(!view.can_see(Generation(4)));
        assert!(view.can_see(Generation(3)));
    }
}
