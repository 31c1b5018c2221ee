use std::{
    fmt,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
};

use dashmap::{DashMap, DashSet};
use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};

use super::{
    context,
    errors::FrameError,
    generation::{Generation, InvalidSet, ObjectId, Visibility},
    manager::{CommitEvent, FrameManager},
    record::TrackedChain,
};

/// Callback invoked with the object a frame read from or wrote to
pub type AccessObserver = Arc<dyn Fn(ObjectId) + Send + Sync>;

/// Lifecycle of a frame; both closed states are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameState {
    Open,
    Committed,
    Discarded,
}

impl FrameState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Open,
            1 => Self::Committed,
            _ => Self::Discarded,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Open => 0,
            Self::Committed => 1,
            Self::Discarded => 2,
        }
    }
}

/// Per-frame settings chosen at open time
#[derive(Clone, Default)]
pub struct FrameOptions {
    pub read_only: bool,
    pub read_observer: Option<AccessObserver>,
    pub write_observer: Option<AccessObserver>,
}

impl FrameOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Called on every record read through the frame
    pub fn on_read(mut self, observer: impl Fn(ObjectId) + Send + Sync + 'static) -> Self {
        self.read_observer = Some(Arc::new(observer));
        self
    }

    /// Called the first time the frame writes to each instance
    pub fn on_write(mut self, observer: impl Fn(ObjectId) + Send + Sync + 'static) -> Self {
        self.write_observer = Some(Arc::new(observer));
        self
    }
}

impl fmt::Debug for FrameOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameOptions")
            .field("read_only", &self.read_only)
            .field("read_observer", &self.read_observer.as_ref().map(|_| "<function>"))
            .field("write_observer", &self.write_observer.as_ref().map(|_| "<function>"))
            .finish()
    }
}

pub(crate) struct FrameInner {
    pub(crate) visibility: Visibility,
    pub(crate) manager: Arc<FrameManager>,
    state: AtomicU8,
    /// Shared while a record is being linked, exclusive while closing
    pub(crate) gate: RwLock<()>,
    pub(crate) options: FrameOptions,
    /// Chains to validate on commit and to clean up on discard
    pub(crate) touched: DashMap<ObjectId, Arc<dyn TrackedChain>>,
    written: DashSet<ObjectId>,
}

impl FrameInner {
    pub(crate) fn new(visibility: Visibility, manager: Arc<FrameManager>, options: FrameOptions) -> Self {
        Self {
            visibility,
            manager,
            state: AtomicU8::new(FrameState::Open.as_u8()),
            gate: RwLock::new(()),
            options,
            touched: DashMap::new(),
            written: DashSet::new(),
        }
    }

    pub(crate) fn state(&self) -> FrameState {
        FrameState::from_u8(self.state.load(Ordering::Acquire))
    }

    // caller holds `gate` exclusively
    pub(crate) fn set_state(&self, state: FrameState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }
}

impl Drop for FrameInner {
    fn drop(&mut self) {
        if self.state() == FrameState::Open {
            self.manager.abandon(self);
        }
    }
}

/// Handle to one open (or closed) frame.
///
/// Clones share the same frame. A frame whose last handle is dropped while
/// still open is discarded.
#[derive(Clone)]
pub struct Frame {
    inner: Arc<FrameInner>,
}

impl Frame {
    pub(crate) fn from_inner(inner: FrameInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub(crate) fn inner(&self) -> &FrameInner {
        &self.inner
    }

    pub fn generation(&self) -> Generation {
        self.inner.visibility.generation
    }

    /// Generations that were open when this frame was opened
    pub fn invalid(&self) -> &InvalidSet {
        &self.inner.visibility.invalid
    }

    pub fn visibility(&self) -> &Visibility {
        &self.inner.visibility
    }

    pub fn state(&self) -> FrameState {
        self.inner.state()
    }

    pub fn is_open(&self) -> bool {
        self.state() == FrameState::Open
    }

    pub fn is_read_only(&self) -> bool {
        self.inner.options.read_only
    }

    pub fn manager(&self) -> &Arc<FrameManager> {
        &self.inner.manager
    }

    /// Instances this frame has created or written to
    pub fn touched_objects(&self) -> Vec<ObjectId> {
        self.inner.touched.iter().map(|entry| *entry.key()).collect()
    }

    pub fn same_frame(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Make this frame current on this thread while `body` runs
    pub fn enter<T>(&self, body: impl FnOnce() -> T) -> T {
        context::enter(self, body)
    }

    /// Publish this frame's writes to frames opened afterwards
    pub fn commit(self) -> Result<CommitEvent, FrameError> {
        let manager = Arc::clone(&self.inner.manager);
        manager.commit(&self)
    }

    /// Drop every record this frame wrote
    pub fn discard(self) {
        let manager = Arc::clone(&self.inner.manager);
        manager.discard(&self);
    }

    pub(crate) fn ensure_open(&self, action: &str) {
        let state = self.state();
        if state != FrameState::Open {
            panic!("cannot {action} through frame {}: frame is {state:?}", self.generation());
        }
    }

    /// Keep the frame from closing while the guard lives; `None` if it
    /// already closed
    pub(crate) fn hold_open(&self) -> Option<RwLockReadGuard<'_, ()>> {
        let guard = self.inner.gate.read();
        (self.state() == FrameState::Open).then_some(guard)
    }

    /// Like [`hold_open`](Self::hold_open), panicking on a closed frame
    pub(crate) fn expect_open(&self, action: &str) -> RwLockReadGuard<'_, ()> {
        let guard = self.inner.gate.read();
        self.ensure_open(action);
        guard
    }

    /// Register a chain with this frame; call with the frame held open
    pub(crate) fn track(&self, chain: Arc<dyn TrackedChain>) {
        let id = chain.object_id();
        if !self.inner.touched.contains_key(&id) {
            self.inner.touched.insert(id, chain);
        }
    }

    /// Note a write to `object`; true the first time
    pub(crate) fn note_write(&self, object: ObjectId) -> bool {
        self.inner.written.insert(object)
    }

    pub(crate) fn observe_read(&self, object: ObjectId) {
        if let Some(observer) = &self.inner.options.read_observer {
            observer(object);
        }
    }

    pub(crate) fn observe_write(&self, object: ObjectId) {
        if let Some(observer) = &self.inner.options.write_observer {
            observer(object);
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("generation", &self.generation())
            .field("invalid", &self.invalid())
            .field("state", &self.state())
            .field("options", &self.inner.options)
            .finish()
    }
}
