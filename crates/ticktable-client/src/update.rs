//! The diff emitted once per fully-processed update.

use ticktable_rowset::RowSequence;

use crate::table::TableSnapshot;

/// An immutable description of one update, emitted exactly once per
/// server tick that this client finished processing.
///
/// Bundles four table snapshots (before any change, after removes, after
/// removes+shifts+adds, and after everything) plus the row sets naming
/// exactly which positions were removed, added, and per-column modified.
/// All row sets are in position space; consumers working incrementally
/// never need key space.
///
/// Snapshot pairs compare identical (`TableSnapshot::ptr_eq`) when the
/// corresponding phase was a no-op, letting consumers skip work.
#[derive(Debug, Clone)]
pub struct TickingUpdate {
    prev: TableSnapshot,
    removed_rows: RowSequence,
    after_removes: TableSnapshot,
    added_rows: RowSequence,
    after_adds: TableSnapshot,
    modified_rows: Vec<RowSequence>,
    after_modifies: TableSnapshot,
}

impl TickingUpdate {
    pub(crate) fn new(
        prev: TableSnapshot,
        removed_rows: RowSequence,
        after_removes: TableSnapshot,
        added_rows: RowSequence,
        after_adds: TableSnapshot,
        modified_rows: Vec<RowSequence>,
        after_modifies: TableSnapshot,
    ) -> Self {
        Self {
            prev,
            removed_rows,
            after_removes,
            added_rows,
            after_adds,
            modified_rows,
            after_modifies,
        }
    }

    /// The table as it was before this update.
    #[must_use]
    pub fn prev(&self) -> &TableSnapshot {
        &self.prev
    }

    /// Positions removed, relative to [`TickingUpdate::prev`].
    #[must_use]
    pub fn removed_rows(&self) -> &RowSequence {
        &self.removed_rows
    }

    /// The table after removes were applied.
    #[must_use]
    pub fn after_removes(&self) -> &TableSnapshot {
        &self.after_removes
    }

    /// Positions added, relative to [`TickingUpdate::after_adds`].
    #[must_use]
    pub fn added_rows(&self) -> &RowSequence {
        &self.added_rows
    }

    /// The table after removes, shifts, and adds were applied.
    #[must_use]
    pub fn after_adds(&self) -> &TableSnapshot {
        &self.after_adds
    }

    /// Per-column modified positions, relative to
    /// [`TickingUpdate::after_modifies`]. One entry per table column.
    #[must_use]
    pub fn modified_rows(&self) -> &[RowSequence] {
        &self.modified_rows
    }

    /// The table with the whole update applied.
    #[must_use]
    pub fn after_modifies(&self) -> &TableSnapshot {
        &self.after_modifies
    }

    /// The table with the whole update applied (alias for
    /// [`TickingUpdate::after_modifies`]).
    #[must_use]
    pub fn current(&self) -> &TableSnapshot {
        &self.after_modifies
    }
}
