//! The key↔position index: a bijection between sparse server-assigned row
//! keys and dense zero-based client positions.
//!
//! A row's position is the number of live keys strictly below its key, so
//! the whole mapping is captured by the sorted set of live keys. The set
//! is stored as coalesced half-open spans: server deltas name contiguous
//! runs, so one structural edit is one binary search plus one `Vec`
//! splice, and rank accumulates span lengths instead of counting keys.

use ticktable_rowset::{RowSequence, RowSequenceBuilder, Span};

use crate::error::{ClientError, Result};

/// Maps live row keys (key space) to dense row positions (position space).
#[derive(Debug, Clone, Default)]
pub struct SpaceMapper {
    /// Sorted, disjoint, maximally-coalesced spans of live keys.
    spans: Vec<Span>,
    cardinality: u64,
}

impl SpaceMapper {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    #[must_use]
    pub const fn cardinality(&self) -> u64 {
        self.cardinality
    }

    /// Check whether no keys are live.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.cardinality == 0
    }

    /// Number of live keys strictly less than `key`.
    ///
    /// Defined for absent keys as well (lower-bound rank).
    #[must_use]
    pub fn rank(&self, key: u64) -> u64 {
        let idx = self.spans.partition_point(|s| s.end <= key);
        let mut rank: u64 = self.spans[..idx].iter().map(|s| s.len()).sum();
        if let Some(span) = self.spans.get(idx) {
            if span.begin < key {
                rank += key - span.begin;
            }
        }
        rank
    }

    /// Check whether `key` is live.
    #[must_use]
    pub fn contains(&self, key: u64) -> bool {
        let idx = self.spans.partition_point(|s| s.end <= key);
        self.spans.get(idx).is_some_and(|s| s.begin <= key)
    }

    /// The live keys inside the half-open range `begin..end`.
    #[must_use]
    pub fn intersect_range(&self, begin: u64, end: u64) -> RowSequence {
        let mut builder = RowSequenceBuilder::new();
        if begin < end {
            let start = self.spans.partition_point(|s| s.end <= begin);
            for span in &self.spans[start..] {
                if span.begin >= end {
                    break;
                }
                builder.add_span(span.begin.max(begin), span.end.min(end));
            }
        }
        builder.build()
    }

    /// Insert every key in `begin..end`, none of which may be live.
    ///
    /// Returns the rank of `begin` (equivalently, the position of the
    /// first inserted key). Inserting a key that is already live is a
    /// bookkeeping defect.
    pub fn add_range(&mut self, begin: u64, end: u64) -> Result<u64> {
        if begin >= end {
            return Ok(0);
        }
        let rank = self.rank(begin);

        // Window of spans touching [begin, end], including mere adjacency.
        let start = self.spans.partition_point(|s| s.end < begin);
        let mut stop = start;
        while stop < self.spans.len() && self.spans[stop].begin <= end {
            let span = self.spans[stop];
            if span.begin < end && span.end > begin {
                return Err(ClientError::KeyAlreadyPresent(begin.max(span.begin)));
            }
            stop += 1;
        }

        // Anything left in the window only touches at the endpoints, so the
        // inserted range coalesces with at most one span on each side.
        let mut new_begin = begin;
        let mut new_end = end;
        if start < stop {
            new_begin = new_begin.min(self.spans[start].begin);
            new_end = new_end.max(self.spans[stop - 1].end);
        }
        self.spans
            .splice(start..stop, std::iter::once(Span::new(new_begin, new_end)));
        self.cardinality += end - begin;
        Ok(rank)
    }

    /// Insert `keys` (key space) and report where they landed (position
    /// space), as if all keys were inserted first and positions computed
    /// afterwards.
    ///
    /// Example: if the index holds `{100, 300}` and `keys` is
    /// `{1, 2, 200, 201, 400, 401}`, the final state is
    /// `{1, 2, 100, 200, 201, 300, 400, 401}` and the result is
    /// `{0, 1, 3, 4, 6, 7}`.
    pub fn add_keys(&mut self, keys: &RowSequence) -> Result<RowSequence> {
        for span in keys.spans() {
            self.add_range(span.begin, span.end)?;
        }
        let mut builder = RowSequenceBuilder::new();
        for span in keys.spans() {
            let rank = self.rank(span.begin);
            builder.add_span(rank, rank + span.len());
        }
        Ok(builder.build())
    }

    /// Remove every live key in `begin..end`; keys in the range that are
    /// not live are skipped.
    ///
    /// Returns the rank `begin` held before removal, from which the caller
    /// can reconstruct the vacated positions.
    pub fn erase_range(&mut self, begin: u64, end: u64) -> u64 {
        let rank = self.rank(begin);
        if begin >= end {
            return rank;
        }

        let start = self.spans.partition_point(|s| s.end <= begin);
        let mut kept: Vec<Span> = Vec::new();
        let mut removed = 0u64;
        let mut stop = start;
        while stop < self.spans.len() && self.spans[stop].begin < end {
            let span = self.spans[stop];
            removed += span.end.min(end) - span.begin.max(begin);
            if span.begin < begin {
                kept.push(Span::new(span.begin, begin));
            }
            if span.end > end {
                kept.push(Span::new(end, span.end));
            }
            stop += 1;
        }
        self.spans.splice(start..stop, kept);
        self.cardinality -= removed;
        rank
    }

    /// Relocate every live key in `begin..end` to
    /// `key - begin + dest`.
    ///
    /// This is a relocation, not an add or remove: total cardinality is
    /// unchanged. Moving keys onto other live keys is a bookkeeping
    /// defect.
    pub fn apply_shift(&mut self, begin: u64, end: u64, dest: u64) -> Result<()> {
        if begin >= end {
            return Ok(());
        }

        // Detach the present pieces of the range.
        let start = self.spans.partition_point(|s| s.end <= begin);
        let mut kept: Vec<Span> = Vec::new();
        let mut moved: Vec<Span> = Vec::new();
        let mut stop = start;
        while stop < self.spans.len() && self.spans[stop].begin < end {
            let span = self.spans[stop];
            moved.push(Span::new(span.begin.max(begin), span.end.min(end)));
            if span.begin < begin {
                kept.push(Span::new(span.begin, begin));
            }
            if span.end > end {
                kept.push(Span::new(end, span.end));
            }
            stop += 1;
        }
        if moved.is_empty() {
            return Ok(());
        }
        let moved_count: u64 = moved.iter().map(|s| s.len()).sum();
        self.spans.splice(start..stop, kept);
        self.cardinality -= moved_count;

        // Reinsert shifted; add_range rejects landing on live keys. Pieces
        // start at or above `begin`, so a downward move cannot underflow.
        for piece in moved {
            let (new_begin, new_end) = if dest >= begin {
                let delta = dest - begin;
                (piece.begin + delta, piece.end + delta)
            } else {
                let delta = begin - dest;
                (piece.begin - delta, piece.end - delta)
            };
            self.add_range(new_begin, new_end)?;
        }
        Ok(())
    }

    /// Look up `keys` (key space) and return their positions (position
    /// space). Every key must be live; an absent key is a bookkeeping
    /// defect.
    pub fn convert_keys_to_indices(&self, keys: &RowSequence) -> Result<RowSequence> {
        let mut builder = RowSequenceBuilder::new();
        for span in keys.spans() {
            let idx = self.spans.partition_point(|s| s.end <= span.begin);
            let covering = self
                .spans
                .get(idx)
                .copied()
                .filter(|s| s.begin <= span.begin);
            let Some(covering) = covering else {
                return Err(ClientError::KeyNotFound(span.begin));
            };
            if covering.end < span.end {
                return Err(ClientError::KeyNotFound(covering.end));
            }
            let rank = self.rank(span.begin);
            builder.add_span(rank, rank + span.len());
        }
        Ok(builder.build())
    }

    /// The live keys themselves, as a sequence.
    #[must_use]
    pub fn keys(&self) -> RowSequence {
        let mut builder = RowSequenceBuilder::new();
        for span in &self.spans {
            builder.add_span(span.begin, span.end);
        }
        builder.build()
    }
}
