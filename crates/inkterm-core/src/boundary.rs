//! The command boundary: where the session's own text ends and the user's
//! command line begins.

use crate::buffer::{Change, EditBatch};

/// First offset of the command region plus the document version at which
/// the boundary was taken.
///
/// Everything before `offset` belongs to the transcript. Edit batches whose
/// version is not newer than `version` were already accounted for when the
/// boundary was set, so they must not move it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandBoundary {
    pub offset: usize,
    pub version: u64,
}

impl CommandBoundary {
    pub fn new(offset: usize, version: u64) -> Self {
        Self { offset, version }
    }

    /// Offset of the last transcript character, if there is one.
    pub fn marker(&self) -> Option<usize> {
        self.offset.checked_sub(1)
    }

    /// Whether `batch` predates this boundary.
    pub fn is_stale(&self, batch: &EditBatch) -> bool {
        batch.version <= self.version
    }

    /// Whether any change in `batch` touches the last transcript character.
    ///
    /// A pure insertion touches it only when it lands exactly on it; a
    /// replacement or deletion touches it when its range covers it.
    pub fn touched_by(&self, batch: &EditBatch) -> bool {
        let Some(marker) = self.marker() else {
            return false;
        };
        batch
            .changes
            .iter()
            .any(|change| touches(change, marker))
    }

    /// The boundary after `batch`, clamped to `document_length`.
    pub fn shifted(&self, batch: &EditBatch, document_length: usize) -> Self {
        Self {
            offset: shift_offset(self.offset, &batch.changes).min(document_length),
            version: batch.version,
        }
    }
}

fn touches(change: &Change, marker: usize) -> bool {
    let start = change.range_offset;
    if change.range_length == 0 {
        start == marker
    } else {
        start <= marker && marker < start + change.range_length
    }
}

/// Move `offset` by the net length change of every change starting before it.
pub fn shift_offset(offset: usize, changes: &[Change]) -> usize {
    let delta: isize = changes
        .iter()
        .filter(|change| change.range_offset < offset)
        .map(Change::delta)
        .sum();
    offset.saturating_add_signed(delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(version: u64, changes: Vec<Change>) -> EditBatch {
        EditBatch { version, changes }
    }

    #[test]
    fn test_marker() {
        assert_eq!(CommandBoundary::new(0, 1).marker(), None);
        assert_eq!(CommandBoundary::new(4, 1).marker(), Some(3));
    }

    #[test]
    fn test_insert_after_marker_does_not_touch() {
        let boundary = CommandBoundary::new(4, 1);
        assert!(!boundary.touched_by(&batch(2, vec![Change::insert(4, "ls")])));
        assert!(!boundary.touched_by(&batch(2, vec![Change::insert(0, "x")])));
    }

    #[test]
    fn test_insert_on_marker_touches() {
        let boundary = CommandBoundary::new(4, 1);
        assert!(boundary.touched_by(&batch(2, vec![Change::insert(3, "x")])));
    }

    #[test]
    fn test_range_covering_marker_touches() {
        let boundary = CommandBoundary::new(4, 1);
        assert!(boundary.touched_by(&batch(2, vec![Change::delete(3, 1)])));
        assert!(boundary.touched_by(&batch(2, vec![Change::replace(0, 10, "")])));
        assert!(!boundary.touched_by(&batch(2, vec![Change::delete(0, 3)])));
        assert!(!boundary.touched_by(&batch(2, vec![Change::delete(4, 2)])));
    }

    #[test]
    fn test_empty_transcript_is_never_touched() {
        let boundary = CommandBoundary::new(0, 1);
        assert!(!boundary.touched_by(&batch(2, vec![Change::insert(0, "x")])));
    }

    #[test]
    fn test_stale_batches() {
        let boundary = CommandBoundary::new(4, 5);
        assert!(boundary.is_stale(&batch(5, vec![])));
        assert!(boundary.is_stale(&batch(3, vec![])));
        assert!(!boundary.is_stale(&batch(6, vec![])));
    }

    #[test]
    fn test_shift_offset() {
        let changes = vec![
            Change::insert(0, "abc"),
            Change::delete(2, 1),
            Change::insert(10, "zz"),
        ];
        assert_eq!(shift_offset(5, &changes), 7);
        assert_eq!(shift_offset(0, &changes), 0);
    }

    #[test]
    fn test_shifted_clamps_and_takes_version() {
        let boundary = CommandBoundary::new(8, 2);
        let shifted = boundary.shifted(&batch(3, vec![Change::delete(0, 2)]), 4);
        assert_eq!(shifted, CommandBoundary::new(4, 3));
    }
}
