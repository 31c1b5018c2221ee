//! # Frame runtime
//!
//! Multi-version state for framed objects. Every framed instance owns a
//! [`RecordChain`] of [`StateRecord`]s, one per generation that wrote it.
//! A [`Frame`] is a unit of isolated work with its own generation; it sees
//! its own writes plus everything committed before it opened, and publishes
//! its writes atomically on [`Frame::commit`].
//!
//! Generated (or [`framed!`](crate::framed)) accessors go through
//! [`readable`] and [`writable`], which pick up the frame entered on the
//! current thread.

pub mod access;
pub mod context;
pub mod errors;
pub mod frame;
pub mod gc;
pub mod generation;
pub mod manager;
pub mod record;

mod macros;
mod snapshot;

pub use access::{notify_created, readable, readable_in, writable, writable_in};
pub use context::current_frame;
pub use errors::FrameError;
pub use frame::{AccessObserver, Frame, FrameOptions, FrameState};
pub use gc::{GcPolicy, GcView};
pub use generation::{Generation, GenerationCounter, InvalidSet, ObjectId, Visibility};
pub use manager::{CommitEvent, CommitObserver, CreatedObject, CreationObserver, FrameManager, FrameStats};
pub use record::{Framed, Record, RecordChain, StateRecord};
