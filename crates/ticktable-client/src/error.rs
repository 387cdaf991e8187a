//! Engine error types.
//!
//! Everything here is fatal to the subscription that raised it: either the
//! metadata was malformed, or the bookkeeping invariants that keep the
//! client's view consistent with the server's were violated. "Need more
//! data" is not an error; it is the `Ok(None)` return of
//! [`crate::UpdateProcessor::process_next_chunk`].

use thiserror::Error;
use ticktable_protocol::ProtocolError;

use crate::column::DataType;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Malformed frame or payload.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A metadata frame was required to start the next update.
    #[error("metadata was required here, but none was supplied")]
    MetadataRequired,

    /// Attempted to add a key that is already live.
    #[error("key {0} is already present in the index")]
    KeyAlreadyPresent(u64),

    /// Attempted to look up or erase a key that is not live.
    #[error("key {0} is not present in the index")]
    KeyNotFound(u64),

    /// The three shift-component row sets disagree on length.
    #[error("shift components have differing sizes: first={first}, last={last}, dest={dest}")]
    ShiftComponentMismatch { first: u64, last: u64, dest: u64 },

    /// The caller supplied a different number of column sources than the
    /// table has columns (or than the metadata declared).
    #[error("column count mismatch: expected {expected}, got {actual}")]
    ColumnCountMismatch { expected: usize, actual: usize },

    /// Added-row chunks must deliver the same number of rows per column.
    #[error("chunks have inconsistent sizes: {actual} vs {expected}")]
    ChunkSizeMismatch { expected: usize, actual: usize },

    /// The chunk delivered more added rows than remain outstanding.
    #[error("excess added rows in chunk: {supplied} supplied but only {outstanding} outstanding")]
    ExcessAddData { supplied: u64, outstanding: u64 },

    /// A column delivered more modified rows than remain outstanding.
    #[error("column {column}: {supplied} modified rows supplied but only {outstanding} outstanding")]
    ExcessModifyData {
        column: usize,
        supplied: u64,
        outstanding: u64,
    },

    /// The update finished but caller-provided column data was left over.
    #[error("update complete but undelivered column data remains")]
    LeftoverData,

    /// A column source's data type does not match the table column.
    #[error("expected {expected:?} data, got {actual:?}")]
    TypeMismatch {
        expected: DataType,
        actual: DataType,
    },

    /// The metadata announced added rows, but the table has no columns.
    #[error("added rows present but the table has no columns")]
    NoColumns,

    /// A source range referenced rows past the end of the source.
    #[error("source range {begin}..{end} out of bounds for length {len}")]
    SourceOutOfBounds {
        begin: usize,
        end: usize,
        len: usize,
    },

    /// A prior call failed; the processor must be discarded and the
    /// subscription re-established.
    #[error("subscription processor previously failed and must be discarded")]
    SubscriptionFailed,
}

pub type Result<T> = std::result::Result<T, ClientError>;
