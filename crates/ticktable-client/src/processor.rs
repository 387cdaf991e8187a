//! The per-subscription update state machine.
//!
//! One [`UpdateProcessor`] lives per active subscription. The transport
//! layer calls [`UpdateProcessor::process_next_chunk`] once per delivered
//! network unit; the processor applies the mandated order (removes, then
//! shifts, then adds, then modifies) across however many partial chunk
//! deliveries it takes, and returns one [`TickingUpdate`] exactly when an
//! update completes.
//!
//! Phases are a closed enum moved by value through each call: a handler
//! either finishes its unit of work and forwards to the next phase within
//! the same call, or returns "no diff yet, same phase". All resume state
//! lives in the phase value, never on a call stack, so suspension is just
//! returning.

use tracing::{debug, trace};

use ticktable_protocol::{MessageKind, MessageWrapper, UpdateMetadata, decode_compressed_delta};
use ticktable_rowset::RowSequence;

use crate::column::{ColumnSource, DataType};
use crate::error::{ClientError, Result};
use crate::table::{TableSnapshot, TableState};
use crate::update::TickingUpdate;

/// Tracks how much of the caller's per-column chunk data each phase has
/// consumed during one `process_next_chunk` call.
struct ChunkCursor<'a> {
    sources: &'a [&'a dyn ColumnSource],
    begins: Vec<usize>,
    ends: Vec<usize>,
}

impl<'a> ChunkCursor<'a> {
    fn new(sources: &'a [&'a dyn ColumnSource], sizes: &[usize]) -> Result<Self> {
        if sources.len() != sizes.len() {
            return Err(ClientError::ColumnCountMismatch {
                expected: sources.len(),
                actual: sizes.len(),
            });
        }
        Ok(Self {
            sources,
            begins: vec![0; sources.len()],
            ends: sizes.to_vec(),
        })
    }

    fn num_sources(&self) -> usize {
        self.sources.len()
    }

    fn source(&self, i: usize) -> &'a dyn ColumnSource {
        self.sources[i]
    }

    fn begin(&self, i: usize) -> usize {
        self.begins[i]
    }

    fn end(&self, i: usize) -> usize {
        self.ends[i]
    }

    fn remaining(&self, i: usize) -> usize {
        self.ends[i] - self.begins[i]
    }

    fn is_fully_consumed(&self) -> bool {
        (0..self.num_sources()).all(|i| self.remaining(i) == 0)
    }

    fn consume(&mut self, i: usize) {
        self.begins[i] = self.ends[i];
    }

    fn consume_all(&mut self) {
        self.begins.copy_from_slice(&self.ends);
    }
}

/// Resume state while added-row data is still being delivered.
struct AwaitingAdds {
    prev: TableSnapshot,
    removed_positions: RowSequence,
    after_removes: TableSnapshot,
    added_positions: RowSequence,
    added_remaining: RowSequence,
    per_column_modifies: Vec<RowSequence>,
}

/// Resume state while modified-row data is still being delivered.
struct AwaitingModifies {
    prev: TableSnapshot,
    removed_positions: RowSequence,
    after_removes: TableSnapshot,
    added_positions: RowSequence,
    after_adds: TableSnapshot,
    modified_positions: Vec<RowSequence>,
    modified_remaining: Vec<RowSequence>,
}

/// The current phase of the per-update state machine.
enum Phase {
    /// Between updates; the next call must carry metadata.
    AwaitingMetadata,
    AwaitingAdds(Box<AwaitingAdds>),
    AwaitingModifies(Box<AwaitingModifies>),
    /// A previous call returned a fatal error; the subscription is dead.
    Failed,
}

/// Reconstructs a live table from the server's update stream, one
/// subscription per instance.
pub struct UpdateProcessor {
    table: TableState,
    num_cols: usize,
    phase: Phase,
}

impl UpdateProcessor {
    /// Create a processor for a table with the given column types.
    #[must_use]
    pub fn new(column_types: &[DataType]) -> Self {
        Self {
            table: TableState::new(column_types),
            num_cols: column_types.len(),
            phase: Phase::AwaitingMetadata,
        }
    }

    /// Number of table columns.
    #[must_use]
    pub const fn num_columns(&self) -> usize {
        self.num_cols
    }

    /// Feed one delivered network unit into the state machine.
    ///
    /// `sources`/`sizes` describe the per-column row data in this unit
    /// (both may be empty); `metadata` carries the framed update header
    /// when present. Returns `Ok(Some(update))` exactly when an update
    /// completes, `Ok(None)` when more data is needed.
    ///
    /// Any error is fatal to the subscription: the processor refuses
    /// further calls and the caller must discard it and resubscribe.
    pub fn process_next_chunk(
        &mut self,
        sources: &[&dyn ColumnSource],
        sizes: &[usize],
        metadata: Option<&[u8]>,
    ) -> Result<Option<TickingUpdate>> {
        let mut cursor = ChunkCursor::new(sources, sizes)?;

        // The phase moves out by value; until the handler returns the
        // next phase, a propagated error leaves the processor failed.
        let phase = std::mem::replace(&mut self.phase, Phase::Failed);
        let (update, next) = match phase {
            Phase::AwaitingMetadata => self.awaiting_metadata(&mut cursor, metadata)?,
            Phase::AwaitingAdds(state) => self.awaiting_adds(*state, &mut cursor)?,
            Phase::AwaitingModifies(state) => self.awaiting_modifies(*state, &mut cursor)?,
            Phase::Failed => return Err(ClientError::SubscriptionFailed),
        };
        self.phase = next;
        Ok(update)
    }

    fn awaiting_metadata(
        &mut self,
        cursor: &mut ChunkCursor<'_>,
        metadata: Option<&[u8]>,
    ) -> Result<(Option<TickingUpdate>, Phase)> {
        let Some(bytes) = metadata else {
            return Err(ClientError::MetadataRequired);
        };

        let wrapper = MessageWrapper::decode(&mut &*bytes)?;
        debug_assert_eq!(wrapper.kind, MessageKind::UpdateMetadata);
        let metadata = UpdateMetadata::decode(&mut wrapper.payload.as_slice())?;

        let removed_rows = decode_compressed_delta(&mut metadata.removed_rows.as_slice())?;
        let mut shift_reader = metadata.shift_data.as_slice();
        let shift_first = decode_compressed_delta(&mut shift_reader)?;
        let shift_last = decode_compressed_delta(&mut shift_reader)?;
        let shift_dest = decode_compressed_delta(&mut shift_reader)?;
        let added_rows = decode_compressed_delta(&mut metadata.added_rows.as_slice())?;

        let per_column_modifies = if metadata.mod_column_rows.is_empty() {
            // No modifies this update; the header may omit the nodes.
            vec![RowSequence::empty(); self.num_cols]
        } else {
            if metadata.mod_column_rows.len() != self.num_cols {
                return Err(ClientError::ColumnCountMismatch {
                    expected: self.num_cols,
                    actual: metadata.mod_column_rows.len(),
                });
            }
            let mut decoded = Vec::with_capacity(self.num_cols);
            for rows in &metadata.mod_column_rows {
                decoded.push(decode_compressed_delta(&mut rows.as_slice())?);
            }
            decoded
        };

        debug!(
            "update seq {}..{}: {} removed, {} shifted ranges, {} added{}",
            metadata.first_seq,
            metadata.last_seq,
            removed_rows.size(),
            shift_first.size(),
            added_rows.size(),
            if metadata.is_snapshot { " (snapshot)" } else { "" },
        );

        // Correct order to process an update is:
        // 1. removes
        // 2. shifts
        // 3. adds
        // 4. modifies
        // Add and modify data has not arrived yet, but removes and shifts
        // can be applied now, and the added keys can claim positions.
        let prev = self.table.snapshot();
        let (removed_positions, after_removes) = if removed_rows.is_empty() {
            // Unchanged tables are reported via snapshot identity, so
            // consumers can compare handles to skip no-op work.
            (RowSequence::empty(), prev.clone())
        } else {
            let positions = self.table.erase(&removed_rows)?;
            (positions, self.table.snapshot())
        };

        self.table
            .apply_shifts(&shift_first, &shift_last, &shift_dest)?;

        let added_positions = self.table.add_keys(&added_rows)?;

        let state = AwaitingAdds {
            prev,
            removed_positions,
            after_removes,
            added_remaining: added_positions.clone(),
            added_positions,
            per_column_modifies,
        };

        if state.added_positions.is_empty() {
            let after_adds = state.after_removes.clone();
            return self.begin_modifies(state, after_adds, cursor);
        }
        if self.num_cols == 0 {
            return Err(ClientError::NoColumns);
        }
        self.awaiting_adds(state, cursor)
    }

    fn awaiting_adds(
        &mut self,
        mut state: AwaitingAdds,
        cursor: &mut ChunkCursor<'_>,
    ) -> Result<(Option<TickingUpdate>, Phase)> {
        debug_assert!(!state.added_remaining.is_empty());

        if cursor.is_fully_consumed() {
            // Need more data from the caller.
            return Ok((None, Phase::AwaitingAdds(Box::new(state))));
        }

        // Added rows arrive row-aligned: every column must deliver the
        // same number of rows in one chunk.
        let chunk_size = cursor.remaining(0);
        for i in 1..cursor.num_sources() {
            if cursor.remaining(i) != chunk_size {
                return Err(ClientError::ChunkSizeMismatch {
                    expected: chunk_size,
                    actual: cursor.remaining(i),
                });
            }
        }

        let outstanding = state.added_remaining.size();
        if chunk_size as u64 > outstanding {
            return Err(ClientError::ExcessAddData {
                supplied: chunk_size as u64,
                outstanding,
            });
        }

        let rows_this_time = state.added_remaining.take(chunk_size as u64);
        state.added_remaining = state.added_remaining.drop_front(chunk_size as u64);
        trace!(
            "add chunk: {} rows, {} still outstanding",
            chunk_size,
            state.added_remaining.size()
        );

        self.table
            .add_data(cursor.sources, &cursor.begins, &cursor.ends, &rows_this_time)?;
        // Mark the data consumed so it cannot also feed the modify phase.
        cursor.consume_all();

        if !state.added_remaining.is_empty() {
            return Ok((None, Phase::AwaitingAdds(Box::new(state))));
        }

        let after_adds = self.table.snapshot();
        self.begin_modifies(state, after_adds, cursor)
    }

    fn begin_modifies(
        &mut self,
        adds: AwaitingAdds,
        after_adds: TableSnapshot,
        cursor: &mut ChunkCursor<'_>,
    ) -> Result<(Option<TickingUpdate>, Phase)> {
        let AwaitingAdds {
            prev,
            removed_positions,
            after_removes,
            added_positions,
            per_column_modifies,
            ..
        } = adds;

        if per_column_modifies.iter().all(RowSequence::is_empty) {
            let after_modifies = after_adds.clone();
            let state = AwaitingModifies {
                prev,
                removed_positions,
                after_removes,
                added_positions,
                after_adds,
                modified_positions: per_column_modifies,
                modified_remaining: Vec::new(),
            };
            return self.build_result(state, after_modifies, cursor);
        }

        // Convert each column's modified rows to position space up front;
        // the positions stay valid for the rest of the update because
        // modifies never change the key assignment.
        let mut modified_positions = Vec::with_capacity(per_column_modifies.len());
        for rows in &per_column_modifies {
            modified_positions.push(self.table.convert_keys_to_indices(rows)?);
        }
        let state = AwaitingModifies {
            prev,
            removed_positions,
            after_removes,
            added_positions,
            after_adds,
            modified_remaining: modified_positions.clone(),
            modified_positions,
        };
        self.awaiting_modifies(state, cursor)
    }

    fn awaiting_modifies(
        &mut self,
        mut state: AwaitingModifies,
        cursor: &mut ChunkCursor<'_>,
    ) -> Result<(Option<TickingUpdate>, Phase)> {
        if cursor.is_fully_consumed() {
            return Ok((None, Phase::AwaitingModifies(Box::new(state))));
        }

        if cursor.num_sources() > state.modified_remaining.len() {
            return Err(ClientError::ColumnCountMismatch {
                expected: state.modified_remaining.len(),
                actual: cursor.num_sources(),
            });
        }

        // Columns are independent here: each may deliver a different
        // number of rows and finish at a different time.
        for i in 0..cursor.num_sources() {
            let available = cursor.remaining(i) as u64;
            if available == 0 {
                continue;
            }
            let outstanding = state.modified_remaining[i].size();
            if available > outstanding {
                return Err(ClientError::ExcessModifyData {
                    column: i,
                    supplied: available,
                    outstanding,
                });
            }

            let rows = state.modified_remaining[i].take(available);
            state.modified_remaining[i] = state.modified_remaining[i].drop_front(available);
            trace!(
                "modify chunk: column {}, {} rows, {} still outstanding",
                i,
                available,
                state.modified_remaining[i].size()
            );

            self.table
                .modify_data(i, cursor.source(i), cursor.begin(i), cursor.end(i), &rows)?;
            cursor.consume(i);
        }

        if state.modified_remaining.iter().any(|r| !r.is_empty()) {
            return Ok((None, Phase::AwaitingModifies(Box::new(state))));
        }

        let after_modifies = self.table.snapshot();
        self.build_result(state, after_modifies, cursor)
    }

    fn build_result(
        &mut self,
        state: AwaitingModifies,
        after_modifies: TableSnapshot,
        cursor: &ChunkCursor<'_>,
    ) -> Result<(Option<TickingUpdate>, Phase)> {
        if !cursor.is_fully_consumed() {
            return Err(ClientError::LeftoverData);
        }

        debug!(
            "update complete: {} rows live",
            self.table.num_rows()
        );

        let AwaitingModifies {
            prev,
            removed_positions,
            after_removes,
            added_positions,
            after_adds,
            modified_positions,
            ..
        } = state;

        let update = TickingUpdate::new(
            prev,
            removed_positions,
            after_removes,
            added_positions,
            after_adds,
            modified_positions,
            after_modifies,
        );
        Ok((Some(update), Phase::AwaitingMetadata))
    }
}
