//! Watermark-based trimming of record chains

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::generation::{Generation, Visibility};

/// When stale records are dropped from chains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GcPolicy {
    /// Trim every chain a frame touched as part of its commit
    #[default]
    OnCommit,
    /// Only trim when `FrameManager::collect` is called
    Manual,
}

/// Everything a trim needs to know about the readers alive right now
#[derive(Debug, Clone)]
pub struct GcView {
    /// Lowest open generation, or the next unminted one when nothing is open
    pub watermark: Generation,
    /// Every open frame plus a snapshot of "now"
    pub readers: Vec<Visibility>,
    pub open: BTreeSet<Generation>,
}

impl GcView {
    /// Which of `records` (ascending `(generation, base)` pairs) must survive.
    ///
    /// A record stays when it is at or above the watermark, belongs to an
    /// open frame, is what some reader would select, or is the base an open
    /// frame's record was branched from.
    pub fn retain_mask(&self, records: &[(Generation, Option<Generation>)]) -> Vec<bool> {
        let mut keep: Vec<bool> = records
            .iter()
            .map(|(generation, _)| *generation >= self.watermark || self.open.contains(generation))
            .collect();

        for reader in &self.readers {
            if let Some(index) = records
                .iter()
                .rposition(|(generation, _)| reader.can_see(*generation))
            {
                keep[index] = true;
            }
        }

        for (generation, base) in records {
            if !self.open.contains(generation) {
                continue;
            }
            if let Some(base) = base {
                if let Ok(index) = records.binary_search_by_key(base, |(g, _)| *g) {
                    keep[index] = true;
                }
            }
        }

        keep
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::generation::InvalidSet;

    fn g(n: u64) -> Generation {
        Generation(n)
    }

    #[test]
    fn test_drops_records_nobody_reads() {
        let view = GcView {
            watermark: g(10),
            readers: vec![Visibility::snapshot(g(10), InvalidSet::empty())],
            open: BTreeSet::new(),
        };
        let records = [(g(1), None), (g(4), Some(g(1))), (g(7), Some(g(4)))];
        assert_eq!(view.retain_mask(&records), vec![false, false, true]);
    }

    #[test]
    fn test_keeps_what_an_old_frame_still_reads() {
        let view = GcView {
            watermark: g(5),
            readers: vec![
                Visibility::new(g(5), InvalidSet::empty()),
                Visibility::snapshot(g(9), InvalidSet::new([g(5)])),
            ],
            open: [g(5)].into_iter().collect(),
        };
        let records = [(g(1), None), (g(3), Some(g(1))), (g(8), Some(g(3)))];
        assert_eq!(view.retain_mask(&records), vec![false, true, true]);
    }

    #[test]
    fn test_keeps_record_hidden_by_invalid_set() {
        // frame 6 opened while 4 was still open, so it keeps reading 2
        let view = GcView {
            watermark: g(6),
            readers: vec![
                Visibility::new(g(6), InvalidSet::new([g(4)])),
                Visibility::snapshot(g(7), InvalidSet::new([g(6)])),
            ],
            open: [g(6)].into_iter().collect(),
        };
        let records = [(g(2), None), (g(4), Some(g(2)))];
        assert_eq!(view.retain_mask(&records), vec![true, true]);
    }

    #[test]
    fn test_keeps_base_of_open_write() {
        let view = GcView {
            watermark: g(6),
            readers: vec![
                Visibility::new(g(6), InvalidSet::empty()),
                Visibility::snapshot(g(8), InvalidSet::new([g(6)])),
            ],
            open: [g(6)].into_iter().collect(),
        };
        // frame 6 branched from 2; 5 was committed later by someone else
        let records = [(g(2), None), (g(5), Some(g(2))), (g(6), Some(g(2)))];
        assert_eq!(view.retain_mask(&records), vec![true, true, true]);
    }
}
