//! State records and per-instance record chains
//!
//! A framed instance keeps all of its materialized generations in one
//! [`RecordChain`]. Records are kept sorted by generation so a reader can walk
//! from the newest towards the oldest and stop at the first one its frame is
//! allowed to see.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::trace;

use super::{
    context,
    gc::GcView,
    generation::{Generation, ObjectId, Visibility},
    manager::FrameManager,
    snapshot::SnapshotCell,
};

/// Field storage for one generation of a framed type.
///
/// Generated record types implement this with one field per framed property.
pub trait Record: Send + Sync + 'static {
    /// A fresh record with every field at its type's zero value
    fn create() -> Self
    where
        Self: Sized;

    /// Copy every field from `other` into `self`
    fn assign(&mut self, other: &Self);

    /// Reconcile a write that raced with a committed one.
    ///
    /// `current` is the committing frame's value, `base` the value it branched
    /// from and `committed` the value another frame published in between.
    /// Returning `None` reports a conflict.
    fn merge(current: &Self, base: &Self, committed: &Self) -> Option<Self>
    where
        Self: Sized,
    {
        let _ = (current, base, committed);
        None
    }
}

/// One generation's values for one instance
pub struct StateRecord<R> {
    generation: Generation,
    base: Option<Generation>,
    // set when the frame that wrote the only record of a chain is discarded
    discarded: AtomicBool,
    value: RwLock<R>,
}

impl<R> StateRecord<R> {
    pub fn new(generation: Generation, base: Option<Generation>, value: R) -> Self {
        Self {
            generation,
            base,
            discarded: AtomicBool::new(false),
            value: RwLock::new(value),
        }
    }

    /// Generation this record was written in
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Generation this record was branched from, if any
    pub fn base(&self) -> Option<Generation> {
        self.base
    }

    /// True once the frame that wrote it was discarded; no reader sees it
    pub fn is_discarded(&self) -> bool {
        self.discarded.load(Ordering::Acquire)
    }

    pub fn read(&self) -> RwLockReadGuard<'_, R> {
        self.value.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, R> {
        self.value.write()
    }

    fn visible_to(&self, view: &Visibility) -> bool {
        !self.is_discarded() && view.can_see(self.generation)
    }
}

impl<R: fmt::Debug> fmt::Debug for StateRecord<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateRecord")
            .field("generation", &self.generation)
            .field("base", &self.base)
            .field("discarded", &self.is_discarded())
            .field("value", &*self.value.read())
            .finish()
    }
}

type Records<R> = Vec<Arc<StateRecord<R>>>;

struct ChainInner<R> {
    id: ObjectId,
    type_name: Arc<str>,
    manager: Arc<FrameManager>,
    announced: AtomicBool,
    // ascending by generation, never empty
    records: SnapshotCell<Records<R>>,
}

/// The indirection field of a framed instance: every record it owns.
///
/// Readers pick a record from a published snapshot of the chain and never
/// wait on writers; writers publish an edited copy.
pub struct RecordChain<R: Record> {
    inner: Arc<ChainInner<R>>,
}

impl<R: Record> RecordChain<R> {
    /// Build a chain holding `initial` as its only record.
    ///
    /// The record is stamped with the generation of the current frame when
    /// one of `manager`'s writable frames is entered on this thread, and the
    /// chain is registered with that frame so a discard hides it. Otherwise
    /// it gets a freshly minted generation that is visible to every later
    /// frame.
    pub fn new_in(manager: &Arc<FrameManager>, type_name: impl Into<Arc<str>>, initial: R) -> Self {
        if let Some(frame) = context::current_frame() {
            if Arc::ptr_eq(frame.manager(), manager) && !frame.is_read_only() {
                if let Some(_open) = frame.hold_open() {
                    let chain = Self::with_record(manager, type_name.into(), frame.generation(), initial);
                    frame.track(chain.tracked());
                    return chain;
                }
            }
        }
        Self::with_record(manager, type_name.into(), manager.mint_committed(), initial)
    }

    fn with_record(
        manager: &Arc<FrameManager>,
        type_name: Arc<str>,
        generation: Generation,
        initial: R,
    ) -> Self {
        let inner = ChainInner {
            id: ObjectId::new(),
            type_name,
            manager: Arc::clone(manager),
            announced: AtomicBool::new(false),
            records: SnapshotCell::new(vec![Arc::new(StateRecord::new(generation, None, initial))]),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    pub fn type_name(&self) -> &str {
        &self.inner.type_name
    }

    pub fn manager(&self) -> &Arc<FrameManager> {
        &self.inner.manager
    }

    /// Oldest record; right after construction this is the only one
    pub fn first_record(&self) -> Arc<StateRecord<R>> {
        self.inner.records.load(|records| Arc::clone(&records[0]))
    }

    pub fn len(&self) -> usize {
        self.inner.records.load(Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.records.load(Vec::is_empty)
    }

    /// Generations of every record, newest first
    pub fn generations(&self) -> Vec<Generation> {
        self.inner
            .records
            .load(|records| records.iter().rev().map(|record| record.generation).collect())
    }

    /// Record written in exactly `generation`
    pub fn find(&self, generation: Generation) -> Option<Arc<StateRecord<R>>> {
        self.inner.records.load(|records| {
            records
                .binary_search_by_key(&generation, |record| record.generation)
                .ok()
                .map(|index| Arc::clone(&records[index]))
        })
    }

    /// Newest record the reader is allowed to see
    pub fn select(&self, view: &Visibility) -> Option<Arc<StateRecord<R>>> {
        let found = self.inner.records.load(|records| {
            records
                .iter()
                .rev()
                .find(|record| record.visible_to(view))
                .cloned()
        });
        trace!(
            object = %self.inner.id,
            reader = %view.generation,
            selected = ?found.as_ref().map(|record| record.generation),
            "select record"
        );
        found
    }

    /// Newest committed record right now.
    ///
    /// A commit may trim the record an older snapshot selects, so a miss is
    /// retried against a fresh snapshot until the view stops moving.
    pub fn select_committed(&self) -> Option<Arc<StateRecord<R>>> {
        let mut view = self.manager().now();
        loop {
            if let Some(record) = self.select(&view) {
                return Some(record);
            }
            let fresh = self.manager().now();
            if fresh == view {
                return None;
            }
            view = fresh;
        }
    }

    /// Whether a read on this thread right now would find a record
    pub fn has_visible_record(&self) -> bool {
        match context::current_frame() {
            Some(frame) if Arc::ptr_eq(frame.manager(), self.manager()) => {
                let view = frame.visibility();
                self.inner
                    .records
                    .load(|records| records.iter().any(|record| record.visible_to(view)))
            }
            _ => self.select_committed().is_some(),
        }
    }

    /// Link a new record into the chain.
    ///
    /// If another record for the same generation got there first, that one is
    /// returned and `record` is dropped.
    pub fn prepend(&self, record: StateRecord<R>) -> Arc<StateRecord<R>> {
        if let Some(existing) = self.find(record.generation) {
            return existing;
        }
        self.inner.records.update(|records| {
            match records.binary_search_by_key(&record.generation, |existing| existing.generation) {
                Ok(index) => Arc::clone(&records[index]),
                Err(index) => {
                    let record = Arc::new(record);
                    records.insert(index, Arc::clone(&record));
                    record
                }
            }
        })
    }

    /// Remove the record of `generation` unless it is the last one left
    pub fn unlink(&self, generation: Generation) -> bool {
        if self.len() <= 1 || self.find(generation).is_none() {
            return false;
        }
        self.inner.records.update(|records| {
            if records.len() <= 1 {
                return false;
            }
            match records.binary_search_by_key(&generation, |record| record.generation) {
                Ok(index) => {
                    records.remove(index);
                    true
                }
                Err(_) => false,
            }
        })
    }

    /// Make the records of a discarded `generation` unreachable.
    ///
    /// A chain whose only record belongs to that generation keeps it as a
    /// tombstone that no reader selects.
    pub fn discard_generation(&self, generation: Generation) {
        if self.unlink(generation) {
            return;
        }
        if let Some(record) = self.find(generation) {
            record.discarded.store(true, Ordering::Release);
        }
    }

    /// Drop records no reader described by `view` can reach
    pub fn trim(&self, view: &GcView) -> usize {
        self.inner.records.update(|records| {
            let entries: Vec<(Generation, Option<Generation>)> = records
                .iter()
                .map(|record| (record.generation, record.base))
                .collect();
            let keep = view.retain_mask(&entries);
            if !keep.contains(&true) {
                return 0;
            }

            let before = records.len();
            let mut flags = keep.into_iter();
            records.retain(|_| flags.next().unwrap_or(true));
            before - records.len()
        })
    }

    /// Mark the creation notification as delivered; true the first time
    pub(crate) fn announce(&self) -> bool {
        !self.inner.announced.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn tracked(&self) -> Arc<dyn TrackedChain> {
        Arc::new(self.clone())
    }
}

impl<R: Record> Clone for RecordChain<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Record> fmt::Debug for RecordChain<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordChain")
            .field("id", &self.inner.id)
            .field("type_name", &self.inner.type_name)
            .field("generations", &self.generations())
            .finish()
    }
}

/// Deferred publication of a merged record, run once every chain passed
pub(crate) type PendingMerge = Box<dyn FnOnce(Generation) + Send>;

/// Outcome of validating one touched chain at commit time
pub(crate) enum CommitCheck {
    Clean,
    Merge(PendingMerge),
    Conflict { committed: Generation },
}

/// Chain operations a frame needs without knowing the record type
pub(crate) trait TrackedChain: Send + Sync {
    fn object_id(&self) -> ObjectId;

    fn type_name(&self) -> &str;

    fn check_commit(
        &self,
        view: &Visibility,
        is_open: &dyn Fn(Generation) -> bool,
    ) -> CommitCheck;

    fn discard_generation(&self, generation: Generation);

    fn trim_records(&self, view: &GcView) -> usize;
}

impl<R: Record> TrackedChain for RecordChain<R> {
    fn object_id(&self) -> ObjectId {
        self.id()
    }

    fn type_name(&self) -> &str {
        RecordChain::type_name(self)
    }

    fn check_commit(
        &self,
        view: &Visibility,
        is_open: &dyn Fn(Generation) -> bool,
    ) -> CommitCheck {
        let generation = view.generation;
        let Some(mine) = self.find(generation) else {
            return CommitCheck::Clean;
        };

        // newest record another frame committed that this frame never saw
        let committed = self.inner.records.load(|records| {
            records
                .iter()
                .rev()
                .find(|record| {
                    record.generation != generation
                        && !record.is_discarded()
                        && !view.can_see(record.generation)
                        && !is_open(record.generation)
                })
                .cloned()
        });
        let Some(committed) = committed else {
            return CommitCheck::Clean;
        };

        let base = mine.base.and_then(|base| self.find(base));
        let merged = base.and_then(|base| {
            R::merge(&mine.read(), &base.read(), &committed.read())
        });

        match merged {
            Some(value) => {
                let chain = self.clone();
                let from = committed.generation;
                CommitCheck::Merge(Box::new(move |merged_generation| {
                    chain.unlink(generation);
                    chain.prepend(StateRecord::new(merged_generation, Some(from), value));
                }))
            }
            None => CommitCheck::Conflict {
                committed: committed.generation,
            },
        }
    }

    fn discard_generation(&self, generation: Generation) {
        RecordChain::discard_generation(self, generation)
    }

    fn trim_records(&self, view: &GcView) -> usize {
        self.trim(view)
    }
}

/// A type whose stored properties live in a record chain.
///
/// Generated code implements this; the runtime only talks to framed
/// instances through it.
pub trait Framed: Send + Sync {
    type Record: Record;

    /// The instance's record chain (its `$record` field)
    fn first_frame_record(&self) -> &RecordChain<Self::Record>;

    /// Push a new generation onto the instance's chain
    fn prepend_frame_record(&self, record: StateRecord<Self::Record>) -> Arc<StateRecord<Self::Record>> {
        self.first_frame_record().prepend(record)
    }

    fn object_id(&self) -> ObjectId {
        self.first_frame_record().id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{generation::InvalidSet, FrameManager};
    use crate::FramesConfig;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Pair {
        left: i64,
        right: i64,
    }

    impl Record for Pair {
        fn create() -> Self {
            Self::default()
        }

        fn assign(&mut self, other: &Self) {
            self.left = other.left;
            self.right = other.right;
        }
    }

    fn chain() -> RecordChain<Pair> {
        let manager = FrameManager::new(FramesConfig::default());
        RecordChain::new_in(&manager, "Pair", Pair { left: 1, right: 2 })
    }

    #[test]
    fn test_new_chain_has_exactly_one_record() {
        let chain = chain();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.first_record().read().left, 1);
    }

    #[test]
    fn test_prepend_keeps_generation_order() {
        let chain = chain();
        let first = chain.first_record().generation();
        chain.prepend(StateRecord::new(Generation(first.get() + 5), Some(first), Pair::default()));
        chain.prepend(StateRecord::new(Generation(first.get() + 2), Some(first), Pair::default()));

        assert_eq!(
            chain.generations(),
            vec![
                Generation(first.get() + 5),
                Generation(first.get() + 2),
                first
            ]
        );
    }

    #[test]
    fn test_prepend_same_generation_returns_existing() {
        let chain = chain();
        let first = chain.first_record().generation();
        let g = Generation(first.get() + 1);
        let a = chain.prepend(StateRecord::new(g, Some(first), Pair { left: 7, right: 7 }));
        let b = chain.prepend(StateRecord::new(g, Some(first), Pair::default()));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_select_newest_visible() {
        let chain = chain();
        let first = chain.first_record().generation();
        let later = Generation(first.get() + 3);
        chain.prepend(StateRecord::new(later, Some(first), Pair { left: 9, right: 9 }));

        let old_reader = Visibility::new(Generation(first.get() + 1), InvalidSet::empty());
        assert_eq!(chain.select(&old_reader).unwrap().generation(), first);

        let new_reader = Visibility::new(Generation(later.get() + 1), InvalidSet::empty());
        assert_eq!(chain.select(&new_reader).unwrap().read().left, 9);

        let blind_reader =
            Visibility::new(Generation(later.get() + 1), InvalidSet::new([later]));
        assert_eq!(chain.select(&blind_reader).unwrap().generation(), first);
    }

    #[test]
    fn test_unlink_never_empties_chain() {
        let chain = chain();
        let first = chain.first_record().generation();
        assert!(!chain.unlink(first));
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_discarding_sole_record_leaves_tombstone() {
        let chain = chain();
        let first = chain.first_record().generation();
        chain.discard_generation(first);

        assert_eq!(chain.len(), 1);
        assert!(chain.first_record().is_discarded());
        let reader = Visibility::new(Generation(first.get() + 1), InvalidSet::empty());
        assert!(chain.select(&reader).is_none());
    }

    #[test]
    fn test_discarding_branch_unlinks_it() {
        let chain = chain();
        let first = chain.first_record().generation();
        let branch = Generation(first.get() + 1);
        chain.prepend(StateRecord::new(branch, Some(first), Pair { left: 5, right: 5 }));
        chain.discard_generation(branch);

        assert_eq!(chain.generations(), vec![first]);
        assert!(!chain.first_record().is_discarded());
    }

    #[test]
    fn test_announce_only_once() {
        let chain = chain();
        assert!(chain.announce());
        assert!(!chain.announce());
    }
}
