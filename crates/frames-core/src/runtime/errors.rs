use thiserror::Error;

use super::generation::{Generation, ObjectId};

/// Recoverable frame runtime conditions.
///
/// Broken invariants (writing with no open frame, reading an instance that
/// has nothing visible) are panics, not variants here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Write conflict on {type_name} {object}: frame {generation} lost to committed {committed}")]
    Conflict {
        object: ObjectId,
        type_name: String,
        generation: Generation,
        committed: Generation,
    },

    #[error("Too many open frames: limit is {limit}")]
    TooManyOpenFrames { limit: usize },
}

impl FrameError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
