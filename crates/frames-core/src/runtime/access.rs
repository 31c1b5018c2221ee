//! Record selection for property reads and writes.
//!
//! Generated accessors call [`readable`] and [`writable`]; both pick up the
//! frame entered on the current thread. The `_in` variants take the frame
//! explicitly.

use std::sync::Arc;

use tracing::trace;

use super::{
    context,
    frame::Frame,
    manager::CreatedObject,
    record::{Framed, Record, RecordChain, StateRecord},
};

/// Record a property read must use.
///
/// Outside any frame this is the newest committed record.
pub fn readable<F>(chain: &RecordChain<F::Record>, instance: &F) -> Arc<StateRecord<F::Record>>
where
    F: Framed + ?Sized,
{
    match context::current_frame() {
        Some(frame) if Arc::ptr_eq(frame.manager(), chain.manager()) => {
            readable_in(&frame, chain, instance)
        }
        _ => chain.select_committed().unwrap_or_else(|| {
            panic!(
                "no committed record of {} {} is visible",
                chain.type_name(),
                chain.id()
            )
        }),
    }
}

/// Record a property read must use inside `frame`
pub fn readable_in<F>(
    frame: &Frame,
    chain: &RecordChain<F::Record>,
    instance: &F,
) -> Arc<StateRecord<F::Record>>
where
    F: Framed + ?Sized,
{
    debug_assert!(std::ptr::eq(instance.first_frame_record(), chain));
    frame.ensure_open("read");

    let record = chain.select(frame.visibility()).unwrap_or_else(|| {
        panic!(
            "no record of {} {} is visible in frame {} (created after the frame opened?)",
            chain.type_name(),
            chain.id(),
            frame.generation()
        )
    });
    if frame.manager().config().trace_reads {
        trace!(
            object = %chain.id(),
            frame = %frame.generation(),
            record = %record.generation(),
            "readable"
        );
    }
    frame.observe_read(chain.id());
    record
}

/// Record a property write must mutate.
///
/// Panics when no frame is entered on this thread: writing outside a frame
/// is a programming error.
pub fn writable<F>(chain: &RecordChain<F::Record>, instance: &F) -> Arc<StateRecord<F::Record>>
where
    F: Framed + ?Sized,
{
    let frame = context::current_frame().unwrap_or_else(|| {
        panic!(
            "cannot write {} {}: no frame is open on this thread",
            chain.type_name(),
            chain.id()
        )
    });
    writable_in(&frame, chain, instance)
}

/// Record of exactly `frame`'s generation, branching one from the readable
/// record when the frame has not written this instance yet.
///
/// The frame cannot close between the open check and linking the record,
/// so a concurrent discard always finds what was linked.
pub fn writable_in<F>(
    frame: &Frame,
    chain: &RecordChain<F::Record>,
    instance: &F,
) -> Arc<StateRecord<F::Record>>
where
    F: Framed + ?Sized,
{
    debug_assert!(std::ptr::eq(instance.first_frame_record(), chain));
    let generation = frame.generation();
    let (record, first_write) = {
        let _open = frame.expect_open("write");
        if frame.is_read_only() {
            panic!(
                "cannot write {} {}: frame {} is read-only",
                chain.type_name(),
                chain.id(),
                generation
            );
        }
        if !Arc::ptr_eq(frame.manager(), chain.manager()) {
            panic!(
                "cannot write {} {}: frame {} belongs to another manager",
                chain.type_name(),
                chain.id(),
                generation
            );
        }

        let first_write = frame.note_write(chain.id());
        if first_write {
            frame.track(chain.tracked());
        }
        let record = match chain.find(generation) {
            Some(existing) => existing,
            None => branch(frame, chain, instance),
        };
        (record, first_write)
    };

    // outside the gate: an observer may close the frame
    if first_write {
        frame.observe_write(chain.id());
    }
    record
}

fn branch<F>(frame: &Frame, chain: &RecordChain<F::Record>, instance: &F) -> Arc<StateRecord<F::Record>>
where
    F: Framed + ?Sized,
{
    let generation = frame.generation();
    let base = chain.select(frame.visibility()).unwrap_or_else(|| {
        panic!(
            "no record of {} {} to branch from in frame {}",
            chain.type_name(),
            chain.id(),
            generation
        )
    });
    let mut value = <F::Record as Record>::create();
    value.assign(&base.read());

    let record = instance.prepend_frame_record(StateRecord::new(
        generation,
        Some(base.generation()),
        value,
    ));
    trace!(
        object = %chain.id(),
        frame = %generation,
        base = %base.generation(),
        "branched writable record"
    );
    record
}

/// Announce a freshly constructed instance to the manager's observers.
///
/// Only the first call per instance is delivered.
pub fn notify_created<F: Framed + ?Sized>(instance: &F) {
    let chain = instance.first_frame_record();
    if !chain.announce() {
        return;
    }
    let created = CreatedObject {
        id: chain.id(),
        type_name: chain.type_name().to_string(),
        generation: chain.first_record().generation(),
    };
    chain.manager().notify_created(created);
}
