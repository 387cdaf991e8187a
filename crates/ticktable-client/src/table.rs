//! The table content store: per-column value arrays in position order,
//! kept in lockstep with the key↔position index.
//!
//! Adding data is a two-step protocol: `add_keys` first updates the
//! key→position mapping (leaving it briefly ahead of the data), then one
//! or more `add_data` calls fill the assigned positions in position order
//! without gaps. Only new keys may be added; re-adding a live key is a
//! defect.
//!
//! Columns live behind `Arc`s. A snapshot clones the handles; any later
//! mutation of the live store goes through `Arc::make_mut`, copying a
//! column only if a snapshot still holds it. A handed-out snapshot is
//! therefore never retroactively changed.

use std::sync::Arc;

use ticktable_rowset::RowSequence;

use crate::column::{CellValue, ColumnData, ColumnSource, DataType};
use crate::error::{ClientError, Result};
use crate::shift::ShiftPlan;
use crate::space_mapper::SpaceMapper;

/// Owns the live column arrays and the key↔position index.
#[derive(Debug, Clone)]
pub struct TableState {
    columns: Vec<Arc<ColumnData>>,
    mapper: SpaceMapper,
}

impl TableState {
    /// Create an empty table with the given column types.
    #[must_use]
    pub fn new(column_types: &[DataType]) -> Self {
        Self {
            columns: column_types
                .iter()
                .map(|ty| Arc::new(ColumnData::new(*ty)))
                .collect(),
            mapper: SpaceMapper::new(),
        }
    }

    /// Number of columns.
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Number of live rows.
    #[must_use]
    pub fn num_rows(&self) -> u64 {
        self.mapper.cardinality()
    }

    /// Register `keys` (key space) as live and return the positions they
    /// were assigned. The data for those positions must follow via
    /// [`TableState::add_data`] before the table is consistent again.
    pub fn add_keys(&mut self, keys_key_space: &RowSequence) -> Result<RowSequence> {
        self.mapper.add_keys(keys_key_space)
    }

    /// Splice one chunk of per-column source data into the value arrays at
    /// `positions` (position space). Each source must supply exactly
    /// `positions.size()` rows from its `begins[i]..ends[i]` range.
    pub fn add_data(
        &mut self,
        sources: &[&dyn ColumnSource],
        begins: &[usize],
        ends: &[usize],
        positions: &RowSequence,
    ) -> Result<()> {
        self.check_column_count(sources.len())?;
        self.check_column_count(begins.len())?;
        self.check_column_count(ends.len())?;
        for (i, source) in sources.iter().enumerate() {
            let mut chunk = ColumnData::new(self.columns[i].data_type());
            source.fill_from(begins[i], ends[i], &mut chunk)?;
            Arc::make_mut(&mut self.columns[i]).splice_insert(positions, &chunk)?;
        }
        Ok(())
    }

    /// Remove the rows named by `keys` (key space) from the index and
    /// every column array in lockstep. Returns the removed positions as
    /// they were before removal. Every key must be live.
    pub fn erase(&mut self, keys_key_space: &RowSequence) -> Result<RowSequence> {
        let positions = self.mapper.convert_keys_to_indices(keys_key_space)?;
        for span in keys_key_space.spans() {
            self.mapper.erase_range(span.begin, span.end);
        }
        for column in &mut self.columns {
            Arc::make_mut(column).remove_positions(&positions);
        }
        Ok(positions)
    }

    /// Apply a batch of shift tuples (closed ranges `[first, last]` moving
    /// to start at `dest`) in a self-overlap-safe order. Row data follows
    /// its key to the new position; cardinality is unchanged.
    pub fn apply_shifts(
        &mut self,
        first_keys: &RowSequence,
        last_keys: &RowSequence,
        dest_keys: &RowSequence,
    ) -> Result<()> {
        for (span, dest) in ShiftPlan::new(first_keys, last_keys, dest_keys)? {
            let moved_keys = self.mapper.intersect_range(span.begin, span.end);
            if moved_keys.is_empty() {
                continue;
            }
            let old_positions = self.mapper.convert_keys_to_indices(&moved_keys)?;
            self.mapper.apply_shift(span.begin, span.end, dest)?;

            let shifted_keys = translate_keys(&moved_keys, span.begin, dest);
            let new_positions = self.mapper.convert_keys_to_indices(&shifted_keys)?;
            if new_positions != old_positions {
                for column in &mut self.columns {
                    let column = Arc::make_mut(column);
                    let chunk = column.extract_positions(&old_positions);
                    column.splice_insert(&new_positions, &chunk)?;
                }
            }
        }
        Ok(())
    }

    /// Overwrite one column's values at `positions` (position space) with
    /// rows `begin..end` of `source`. Cardinality and key assignment are
    /// untouched.
    pub fn modify_data(
        &mut self,
        col_num: usize,
        source: &dyn ColumnSource,
        begin: usize,
        end: usize,
        positions: &RowSequence,
    ) -> Result<()> {
        let num_columns = self.columns.len();
        let Some(column) = self.columns.get_mut(col_num) else {
            return Err(ClientError::ColumnCountMismatch {
                expected: num_columns,
                actual: col_num + 1,
            });
        };
        let mut chunk = ColumnData::new(column.data_type());
        source.fill_from(begin, end, &mut chunk)?;
        Arc::make_mut(column).splice_overwrite(positions, &chunk)
    }

    /// Translate `keys` (key space) to positions (position space).
    pub fn convert_keys_to_indices(&self, keys_key_space: &RowSequence) -> Result<RowSequence> {
        self.mapper.convert_keys_to_indices(keys_key_space)
    }

    /// A point-in-time, independently-readable view of the table.
    #[must_use]
    pub fn snapshot(&self) -> TableSnapshot {
        TableSnapshot {
            columns: self.columns.clone(),
            num_rows: self.mapper.cardinality(),
        }
    }

    fn check_column_count(&self, actual: usize) -> Result<()> {
        if actual != self.columns.len() {
            return Err(ClientError::ColumnCountMismatch {
                expected: self.columns.len(),
                actual,
            });
        }
        Ok(())
    }
}

/// Translate every key in `keys` from the range starting at `begin` to
/// the range starting at `dest`.
fn translate_keys(keys: &RowSequence, begin: u64, dest: u64) -> RowSequence {
    let mut builder = ticktable_rowset::RowSequenceBuilder::new();
    for span in keys.spans() {
        if dest >= begin {
            let delta = dest - begin;
            builder.add_span(span.begin + delta, span.end + delta);
        } else {
            let delta = begin - dest;
            builder.add_span(span.begin - delta, span.end - delta);
        }
    }
    builder.build()
}

/// An immutable view of the table at one instant.
///
/// Cheap to clone and safe to read from another thread while the live
/// store keeps mutating; column storage is shared until the live store
/// actually touches a column.
#[derive(Debug, Clone)]
pub struct TableSnapshot {
    columns: Vec<Arc<ColumnData>>,
    num_rows: u64,
}

impl TableSnapshot {
    /// Number of rows at snapshot time.
    #[must_use]
    pub const fn num_rows(&self) -> u64 {
        self.num_rows
    }

    /// Number of columns.
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// One column's data.
    ///
    /// # Panics
    ///
    /// Panics if `col_num` is out of bounds.
    #[must_use]
    pub fn column(&self, col_num: usize) -> &ColumnData {
        &self.columns[col_num]
    }

    /// Read one cell.
    ///
    /// # Panics
    ///
    /// Panics if `col_num` or `row` is out of bounds.
    #[must_use]
    pub fn cell(&self, col_num: usize, row: usize) -> CellValue {
        self.columns[col_num].cell(row)
    }

    /// Identity comparison: true when both snapshots share the exact same
    /// column storage. Consumers use this to skip no-op phases (an update
    /// with no removes hands out `after_removes` identical to `prev`).
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.num_rows == other.num_rows
            && self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| Arc::ptr_eq(a, b))
    }
}
