//! Runs framec output that is checked in under `tests/generated`

use std::sync::{Arc, Mutex};

use frames_core::parser::parse_module;
use frames_core::runtime::{FrameManager, Framed};
use frames_core::transform::ClassTransformer;
use frames_core::{EmitConfig, FramesConfig, RustEmitter};

mod counter {
    #![allow(dead_code)]
    include!("generated/counter.rs");
}

use counter::Counter;

fn manager() -> Arc<FrameManager> {
    FrameManager::new(FramesConfig::default())
}

fn significant_lines(code: &str) -> Vec<&str> {
    code.lines().map(str::trim_end).filter(|line| !line.is_empty()).collect()
}

#[test]
fn test_checked_in_counter_matches_emitter() {
    let module = parse_module(include_str!("generated/counter.frames")).unwrap();
    let outcome = ClassTransformer::framing().transform_module(module);
    assert!(outcome.summary.success(), "{:?}", outcome.summary.errors);
    let code = RustEmitter::new(EmitConfig::default())
        .emit_module(&outcome.module, "counter.frames")
        .unwrap();

    pretty_assertions::assert_eq!(
        significant_lines(&code),
        significant_lines(include_str!("generated/counter.rs"))
    );
}

#[test]
fn test_generated_counter_reads_and_writes_through_frames() {
    let manager = manager();
    let counter = Counter::new_in(&manager);
    assert_eq!(counter.count(), 0);

    let frame = manager.open().unwrap();
    frame.enter(|| counter.set_count(3));
    assert_eq!(frame.enter(|| counter.count()), 3);
    assert_eq!(counter.count(), 0);

    frame.commit().unwrap();
    assert_eq!(counter.count(), 3);
}

#[test]
fn test_generated_counter_discard_restores_value() {
    let manager = manager();
    let counter = Counter::new_in(&manager);
    manager.with_frame(|_| counter.set_count(7)).unwrap();

    let frame = manager.open().unwrap();
    frame.enter(|| counter.set_count(8));
    frame.discard();

    assert_eq!(counter.count(), 7);
}

#[test]
fn test_generated_counter_announces_creation() {
    let manager = manager();
    let created = Arc::new(Mutex::new(Vec::new()));
    {
        let created = Arc::clone(&created);
        manager.on_created(move |object| created.lock().unwrap().push(object.type_name.clone()));
    }

    let frame = manager.open().unwrap();
    let counter = frame.enter(|| Counter::new_in(&manager));
    frame.enter(|| counter.set_count(1));
    frame.commit().unwrap();

    assert_eq!(*created.lock().unwrap(), vec!["Counter".to_string()]);
    assert_eq!(counter.count(), 1);
}
