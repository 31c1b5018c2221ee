//! Thread-scoped "current frame"
//!
//! A frame becomes current only for the duration of [`Frame::enter`], so
//! there is no global mutable state to forget to reset.

use std::cell::RefCell;

use super::frame::Frame;

thread_local! {
    static CURRENT: RefCell<Option<Frame>> = const { RefCell::new(None) };
}

/// The frame entered on this thread, if any
pub fn current_frame() -> Option<Frame> {
    CURRENT.with(|current| current.borrow().clone())
}

struct Restore(Option<Frame>);

impl Drop for Restore {
    fn drop(&mut self) {
        let previous = self.0.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

/// Run `body` with `frame` current on this thread.
///
/// Re-entering the frame that is already current is allowed; entering a
/// different frame while one is current is not.
pub(crate) fn enter<T>(frame: &Frame, body: impl FnOnce() -> T) -> T {
    let previous = CURRENT.with(|current| {
        let mut current = current.borrow_mut();
        if let Some(active) = current.as_ref() {
            if !active.same_frame(frame) {
                panic!(
                    "cannot enter frame {} while frame {} is current on this thread",
                    frame.generation(),
                    active.generation()
                );
            }
        }
        current.replace(frame.clone())
    });

    let _restore = Restore(previous);
    body()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::FrameManager;
    use crate::FramesConfig;

    #[test]
    fn test_enter_sets_and_restores_current() {
        let manager = FrameManager::new(FramesConfig::default());
        let frame = manager.open().unwrap();
        assert!(current_frame().is_none());

        let seen = frame.enter(|| current_frame().map(|f| f.generation()));
        assert_eq!(seen, Some(frame.generation()));
        assert!(current_frame().is_none());
        frame.discard();
    }

    #[test]
    fn test_enter_is_reentrant_for_same_frame() {
        let manager = FrameManager::new(FramesConfig::default());
        let frame = manager.open().unwrap();
        let depth = frame.enter(|| frame.enter(|| 2));
        assert_eq!(depth, 2);
        assert!(current_frame().is_none());
        frame.discard();
    }

    #[test]
    #[should_panic(expected = "while frame")]
    fn test_enter_other_frame_panics() {
        let manager = FrameManager::new(FramesConfig::default());
        let outer = manager.open().unwrap();
        let inner = manager.open().unwrap();
        outer.enter(|| inner.enter(|| ()));
    }

    #[test]
    fn test_current_restored_after_panic() {
        let manager = FrameManager::new(FramesConfig::default());
        let frame = manager.open().unwrap();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            frame.enter(|| panic!("boom"));
        }));
        assert!(result.is_err());
        assert!(current_frame().is_none());
        frame.discard();
    }
}
