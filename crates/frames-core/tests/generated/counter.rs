// Generated by framec from counter.frames. Do not edit.

use std::sync::Arc;

use frames_core::runtime::{notify_created, readable, writable, FrameManager, Framed, Record, RecordChain, StateRecord};

pub struct Counter {
    frame_record: RecordChain<CounterRecord>,
}

impl Counter {
    /// Construct in the ambient frame manager
    pub fn new() -> Self {
        Self::new_in(&FrameManager::ambient())
    }

    pub fn new_in(manager: &Arc<FrameManager>) -> Self {
        let this = Self {
            frame_record: RecordChain::new_in(manager, "Counter", CounterRecord::default()),
        };
        this.frame_record.first_record().write().count = 0;
        notify_created(&this);
        this
    }

    pub fn count(&self) -> i64 {
        readable(&self.frame_record, self).read().count
    }

    pub fn set_count(&self, value: i64) {
        writable(&self.frame_record, self).write().count = value;
    }
}

impl std::fmt::Debug for Counter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Counter")
            .field("id", &self.frame_record.id())
            .field("generations", &self.frame_record.generations())
            .finish()
    }
}

impl Framed for Counter {
    type Record = CounterRecord;

    fn first_frame_record(&self) -> &RecordChain<CounterRecord> {
        &self.frame_record
    }

    fn prepend_frame_record(&self, record: StateRecord<CounterRecord>) -> Arc<StateRecord<CounterRecord>> {
        self.frame_record.prepend(record)
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CounterRecord {
    pub count: i64,
}

impl Record for CounterRecord {
    fn create() -> Self {
        CounterRecord::default()
    }

    fn assign(&mut self, other: &Self) {
        self.count = other.count;
    }
}
