//! Frame manager: generation minting, open-frame bookkeeping, commit and
//! discard, and the outward notification hooks.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, OnceLock,
    },
};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, warn};

use super::{
    context,
    errors::FrameError,
    frame::{Frame, FrameInner, FrameOptions, FrameState},
    gc::{GcPolicy, GcView},
    generation::{Generation, GenerationCounter, InvalidSet, ObjectId, Visibility},
    record::{CommitCheck, Framed, TrackedChain},
    snapshot::SnapshotCell,
};
use crate::FramesConfig;

/// Announcement that a framed instance was constructed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedObject {
    pub id: ObjectId,
    pub type_name: String,
    /// Generation of the instance's initial record
    pub generation: Generation,
}

/// What a successful commit published
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitEvent {
    pub generation: Generation,
    /// Every instance the frame wrote to
    pub changed: Vec<ObjectId>,
    /// Instances whose write was reconciled through `Record::merge`
    pub merged: Vec<ObjectId>,
    /// Generation each merged value was published under, in `merged` order
    pub merged_generations: Vec<Generation>,
}

/// Callback invoked once per framed instance construction
pub type CreationObserver = Arc<dyn Fn(&CreatedObject) + Send + Sync>;

/// Callback invoked after every successful commit
pub type CommitObserver = Arc<dyn Fn(&CommitEvent) + Send + Sync>;

/// Counters describing a manager's activity so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameStats {
    pub opened: u64,
    pub committed: u64,
    pub discarded: u64,
    pub conflicts: u64,
    pub merged: u64,
    pub created: u64,
    pub records_trimmed: u64,
    pub open_now: usize,
}

#[derive(Default)]
struct Counters {
    opened: AtomicU64,
    committed: AtomicU64,
    discarded: AtomicU64,
    conflicts: AtomicU64,
    merged: AtomicU64,
    created: AtomicU64,
    records_trimmed: AtomicU64,
}

static GLOBAL: OnceLock<Arc<FrameManager>> = OnceLock::new();

/// Owner of the generation clock and of every open frame
pub struct FrameManager {
    config: FramesConfig,
    generations: GenerationCounter,
    /// Open generations and the invalid set each one captured
    open: Mutex<BTreeMap<Generation, InvalidSet>>,
    /// Keys of `open`, republished on every change for lock-free readers
    open_view: SnapshotCell<InvalidSet>,
    /// Serializes commits and discards
    commit_lock: Mutex<()>,
    creation_observers: RwLock<Vec<CreationObserver>>,
    commit_observers: RwLock<Vec<CommitObserver>>,
    commit_subscribers: Mutex<Vec<Sender<CommitEvent>>>,
    counters: Counters,
}

impl FrameManager {
    pub fn new(config: FramesConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            generations: GenerationCounter::new(),
            open: Mutex::new(BTreeMap::new()),
            open_view: SnapshotCell::new(InvalidSet::empty()),
            commit_lock: Mutex::new(()),
            creation_observers: RwLock::new(Vec::new()),
            commit_observers: RwLock::new(Vec::new()),
            commit_subscribers: Mutex::new(Vec::new()),
            counters: Counters::default(),
        })
    }

    /// Process-wide manager with the default configuration
    pub fn global() -> &'static Arc<FrameManager> {
        GLOBAL.get_or_init(|| FrameManager::new(FramesConfig::default()))
    }

    /// Manager of the frame entered on this thread, or the global one
    pub fn ambient() -> Arc<FrameManager> {
        match context::current_frame() {
            Some(frame) => Arc::clone(frame.manager()),
            None => Arc::clone(Self::global()),
        }
    }

    pub fn config(&self) -> &FramesConfig {
        &self.config
    }

    /// Open a writable frame with default options
    pub fn open(self: &Arc<Self>) -> Result<Frame, FrameError> {
        self.open_with(FrameOptions::default())
    }

    pub fn open_with(self: &Arc<Self>, options: FrameOptions) -> Result<Frame, FrameError> {
        let visibility = {
            let mut open = self.open.lock();
            if open.len() >= self.config.max_open_frames {
                return Err(FrameError::TooManyOpenFrames {
                    limit: self.config.max_open_frames,
                });
            }
            // minted under the lock so every older open frame is in the table
            let generation = self.generations.mint();
            let invalid = InvalidSet::new(open.keys().copied());
            open.insert(generation, invalid.clone());
            self.publish_open(&open);
            Visibility::new(generation, invalid)
        };
        self.counters.opened.fetch_add(1, Ordering::Relaxed);

        debug!(
            generation = %visibility.generation,
            invalid = visibility.invalid.len(),
            read_only = options.read_only,
            "frame opened"
        );

        Ok(Frame::from_inner(FrameInner::new(visibility, Arc::clone(self), options)))
    }

    /// Validate and publish a frame's writes (first committer wins)
    pub fn commit(&self, frame: &Frame) -> Result<CommitEvent, FrameError> {
        let inner = frame.inner();
        let guard = self.commit_lock.lock();
        // waits for writes in flight and keeps new ones out
        let closing = inner.gate.write();
        frame.ensure_open("commit");

        let generation = inner.visibility.generation;
        let chains: Vec<Arc<dyn TrackedChain>> = inner
            .touched
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let is_open = |candidate: Generation| self.open.lock().contains_key(&candidate);

        let mut merges = Vec::new();
        for chain in &chains {
            match chain.check_commit(&inner.visibility, &is_open) {
                CommitCheck::Clean => {}
                CommitCheck::Merge(apply) => merges.push((chain.object_id(), apply)),
                CommitCheck::Conflict { committed } => {
                    let error = FrameError::Conflict {
                        object: chain.object_id(),
                        type_name: chain.type_name().to_string(),
                        generation,
                        committed,
                    };
                    warn!(%error, "commit rejected, discarding frame");
                    self.close(inner, FrameState::Discarded);
                    self.counters.conflicts.fetch_add(1, Ordering::Relaxed);
                    return Err(error);
                }
            }
        }

        let mut merged = Vec::with_capacity(merges.len());
        let mut merged_generations = Vec::with_capacity(merges.len());
        for (object, apply) in merges {
            // stays open until the commit finishes so nobody sees it early
            let merged_generation = {
                let mut open = self.open.lock();
                let minted = self.generations.mint();
                open.insert(minted, InvalidSet::empty());
                self.publish_open(&open);
                minted
            };
            apply(merged_generation);
            debug!(%object, %generation, merged = %merged_generation, "merged concurrent write");
            merged.push(object);
            merged_generations.push(merged_generation);
        }

        {
            let mut open = self.open.lock();
            open.remove(&generation);
            for merged_generation in &merged_generations {
                open.remove(merged_generation);
            }
            self.publish_open(&open);
        }
        inner.set_state(FrameState::Committed);
        drop(closing);
        self.counters.committed.fetch_add(1, Ordering::Relaxed);
        self.counters
            .merged
            .fetch_add(merged.len() as u64, Ordering::Relaxed);

        if self.config.gc == GcPolicy::OnCommit && !chains.is_empty() {
            let view = self.gc_view();
            let trimmed: usize = chains.iter().map(|chain| chain.trim_records(&view)).sum();
            self.counters
                .records_trimmed
                .fetch_add(trimmed as u64, Ordering::Relaxed);
        }
        drop(guard);

        let event = CommitEvent {
            generation,
            changed: chains.iter().map(|chain| chain.object_id()).collect(),
            merged,
            merged_generations,
        };
        debug!(%generation, changed = event.changed.len(), "frame committed");
        self.publish_commit(&event);
        Ok(event)
    }

    /// Throw away a frame's writes; closed frames are left alone
    pub fn discard(&self, frame: &Frame) {
        let _guard = self.commit_lock.lock();
        let _closing = frame.inner().gate.write();
        if !frame.is_open() {
            return;
        }
        self.close(frame.inner(), FrameState::Discarded);
        debug!(generation = %frame.generation(), "frame discarded");
    }

    /// Called when the last handle of a still-open frame goes away
    pub(crate) fn abandon(&self, inner: &FrameInner) {
        let _guard = self.commit_lock.lock();
        let _closing = inner.gate.write();
        if inner.state() != FrameState::Open {
            return;
        }
        self.close(inner, FrameState::Discarded);
        debug!(generation = %inner.visibility.generation, "open frame dropped, discarded");
    }

    // caller holds the commit lock and the frame's gate exclusively
    fn close(&self, inner: &FrameInner, state: FrameState) {
        let generation = inner.visibility.generation;
        // hidden before leaving the open table so later readers never see them
        for entry in inner.touched.iter() {
            entry.value().discard_generation(generation);
        }
        {
            let mut open = self.open.lock();
            open.remove(&generation);
            self.publish_open(&open);
        }
        inner.set_state(state);
        if state == FrameState::Discarded {
            self.counters.discarded.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Open a frame, run `body` inside it and commit
    pub fn with_frame<T>(self: &Arc<Self>, body: impl FnOnce(&Frame) -> T) -> Result<T, FrameError> {
        let frame = self.open()?;
        let value = frame.enter(|| body(&frame));
        frame.commit()?;
        Ok(value)
    }

    /// Like [`with_frame`](Self::with_frame), discarding when `body` fails
    pub fn try_with_frame<T, E>(
        self: &Arc<Self>,
        body: impl FnOnce(&Frame) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<FrameError>,
    {
        let frame = self.open()?;
        match frame.enter(|| body(&frame)) {
            Ok(value) => {
                frame.commit()?;
                Ok(value)
            }
            Err(error) => {
                frame.discard();
                Err(error)
            }
        }
    }

    /// Run `body` in a read-only frame
    pub fn read_frame<T>(self: &Arc<Self>, body: impl FnOnce(&Frame) -> T) -> Result<T, FrameError> {
        let frame = self.open_with(FrameOptions::new().read_only())?;
        let value = frame.enter(|| body(&frame));
        frame.discard();
        Ok(value)
    }

    /// Transient view of everything committed so far; takes no lock
    pub fn now(&self) -> Visibility {
        // a generation is published as open before any record carries it,
        // so reading the bound first never exposes an open frame
        let upper = self.generations.peek();
        let open = self.open_view.load(InvalidSet::clone);
        Visibility::snapshot(upper, open)
    }

    // caller holds `open`
    fn publish_open(&self, open: &BTreeMap<Generation, InvalidSet>) {
        let keys = InvalidSet::new(open.keys().copied());
        self.open_view.update(|view| *view = keys);
    }

    pub fn open_generations(&self) -> Vec<Generation> {
        self.open.lock().keys().copied().collect()
    }

    /// Lowest open generation, or the next one to be minted
    pub fn watermark(&self) -> Generation {
        let open = self.open.lock();
        open.keys()
            .next()
            .copied()
            .unwrap_or_else(|| self.generations.peek())
    }

    pub fn gc_view(&self) -> GcView {
        let open = self.open.lock();
        let upper = self.generations.peek();
        let watermark = open.keys().next().copied().unwrap_or(upper);
        let mut readers: Vec<Visibility> = open
            .iter()
            .map(|(generation, invalid)| Visibility::new(*generation, invalid.clone()))
            .collect();
        readers.push(Visibility::snapshot(upper, InvalidSet::new(open.keys().copied())));
        GcView {
            watermark,
            readers,
            open: open.keys().copied().collect(),
        }
    }

    /// Trim one instance's chain right now, whatever the policy
    pub fn collect<F: Framed + ?Sized>(&self, instance: &F) -> usize {
        let view = self.gc_view();
        let trimmed = instance.first_frame_record().trim(&view);
        self.counters
            .records_trimmed
            .fetch_add(trimmed as u64, Ordering::Relaxed);
        debug!(object = %instance.object_id(), trimmed, "collected chain");
        trimmed
    }

    pub fn on_created(&self, observer: impl Fn(&CreatedObject) + Send + Sync + 'static) {
        self.creation_observers.write().push(Arc::new(observer));
    }

    pub fn on_commit(&self, observer: impl Fn(&CommitEvent) + Send + Sync + 'static) {
        self.commit_observers.write().push(Arc::new(observer));
    }

    /// Channel receiving every commit from now on
    pub fn subscribe_commits(&self) -> Receiver<CommitEvent> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        self.commit_subscribers.lock().push(sender);
        receiver
    }

    pub fn stats(&self) -> FrameStats {
        FrameStats {
            opened: self.counters.opened.load(Ordering::Relaxed),
            committed: self.counters.committed.load(Ordering::Relaxed),
            discarded: self.counters.discarded.load(Ordering::Relaxed),
            conflicts: self.counters.conflicts.load(Ordering::Relaxed),
            merged: self.counters.merged.load(Ordering::Relaxed),
            created: self.counters.created.load(Ordering::Relaxed),
            records_trimmed: self.counters.records_trimmed.load(Ordering::Relaxed),
            open_now: self.open.lock().len(),
        }
    }

    /// A generation that belongs to no frame and is committed on creation
    pub(crate) fn mint_committed(&self) -> Generation {
        self.generations.mint()
    }

    pub(crate) fn notify_created(&self, created: CreatedObject) {
        self.counters.created.fetch_add(1, Ordering::Relaxed);
        debug!(
            object = %created.id,
            type_name = %created.type_name,
            generation = %created.generation,
            "framed object created"
        );
        let observers = self.creation_observers.read().clone();
        for observer in observers {
            observer(&created);
        }
    }

    fn publish_commit(&self, event: &CommitEvent) {
        let observers = self.commit_observers.read().clone();
        for observer in observers {
            observer(event);
        }
        self.commit_subscribers
            .lock()
            .retain(|sender| sender.send(event.clone()).is_ok());
    }
}

impl fmt::Debug for FrameManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameManager")
            .field("config", &self.config)
            .field("next_generation", &self.generations.peek())
            .field("open", &self.open_generations())
            .finish()
    }
}
