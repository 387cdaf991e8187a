//! Ordered, deduplicated sets of 64-bit row keys or row positions.
//!
//! A [`RowSequence`] is stored as a sorted list of half-open spans rather
//! than individual keys, because server deltas overwhelmingly name
//! contiguous runs of rows. Sequences are immutable once built; the state
//! machine consumes them by slicing prefixes off with [`RowSequence::take`]
//! and [`RowSequence::drop_front`].

use std::fmt;

use smallvec::SmallVec;

/// A half-open span of `u64` values: `begin..end`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    /// First value in the span.
    pub begin: u64,
    /// One past the last value in the span.
    pub end: u64,
}

impl Span {
    /// Create a span covering `begin..end`.
    #[must_use]
    pub const fn new(begin: u64, end: u64) -> Self {
        Self { begin, end }
    }

    /// Number of values covered.
    #[must_use]
    pub const fn len(self) -> u64 {
        self.end - self.begin
    }

    /// Check whether the span covers nothing.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.begin >= self.end
    }

    /// Check whether `value` falls inside the span.
    #[must_use]
    pub const fn contains(self, value: u64) -> bool {
        value >= self.begin && value < self.end
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.begin, self.end)
    }
}

/// An ordered, deduplicated set of `u64` row keys or row positions.
///
/// Internally a sorted, maximally-coalesced list of half-open spans plus a
/// cached total size. Most sequences produced by the protocol hold a
/// handful of spans, so the span list is inlined up to four entries.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct RowSequence {
    spans: SmallVec<[Span; 4]>,
    size: u64,
}

impl RowSequence {
    /// The empty sequence.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A sequence holding a single key.
    #[must_use]
    pub fn single(key: u64) -> Self {
        Self::of_span(key, key + 1)
    }

    /// A sequence holding the half-open span `begin..end`.
    #[must_use]
    pub fn of_span(begin: u64, end: u64) -> Self {
        if begin >= end {
            return Self::empty();
        }
        let mut spans = SmallVec::new();
        spans.push(Span::new(begin, end));
        Self {
            spans,
            size: end - begin,
        }
    }

    /// Collect a sequence from arbitrary keys (duplicates are merged).
    #[must_use]
    pub fn from_keys<I: IntoIterator<Item = u64>>(keys: I) -> Self {
        let mut builder = RowSequenceBuilder::new();
        for key in keys {
            builder.add_key(key);
        }
        builder.build()
    }

    /// Total number of values in the sequence.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Check whether the sequence holds no values.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Smallest value, if any.
    #[must_use]
    pub fn first(&self) -> Option<u64> {
        self.spans.first().map(|s| s.begin)
    }

    /// Largest value, if any.
    #[must_use]
    pub fn last(&self) -> Option<u64> {
        self.spans.last().map(|s| s.end - 1)
    }

    /// Iterate the coalesced spans in ascending order.
    pub fn spans(&self) -> impl Iterator<Item = Span> + '_ {
        self.spans.iter().copied()
    }

    /// Iterate every individual value in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = u64> + '_ {
        self.spans.iter().flat_map(|s| s.begin..s.end)
    }

    /// The first `n` values as a new sequence.
    ///
    /// Taking more values than exist returns the whole sequence.
    #[must_use]
    pub fn take(&self, n: u64) -> Self {
        if n >= self.size {
            return self.clone();
        }
        let mut spans = SmallVec::new();
        let mut remaining = n;
        for span in &self.spans {
            if remaining == 0 {
                break;
            }
            let len = span.len().min(remaining);
            spans.push(Span::new(span.begin, span.begin + len));
            remaining -= len;
        }
        Self { spans, size: n }
    }

    /// Everything after the first `n` values, as a new sequence.
    ///
    /// Dropping more values than exist returns the empty sequence.
    #[must_use]
    pub fn drop_front(&self, n: u64) -> Self {
        if n >= self.size {
            return Self::empty();
        }
        if n == 0 {
            return self.clone();
        }
        let mut spans = SmallVec::new();
        let mut to_skip = n;
        for span in &self.spans {
            if to_skip >= span.len() {
                to_skip -= span.len();
                continue;
            }
            spans.push(Span::new(span.begin + to_skip, span.end));
            to_skip = 0;
        }
        Self {
            spans,
            size: self.size - n,
        }
    }

    /// Check whether `value` is a member.
    #[must_use]
    pub fn contains(&self, value: u64) -> bool {
        self.spans
            .binary_search_by(|s| {
                if s.end <= value {
                    std::cmp::Ordering::Less
                } else if s.begin > value {
                    std::cmp::Ordering::Greater
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }
}

impl fmt::Debug for RowSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RowSequence{self}")
    }
}

impl fmt::Display for RowSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        let mut sep = "";
        for span in &self.spans {
            if span.len() == 1 {
                write!(f, "{sep}{}", span.begin)?;
            } else {
                write!(f, "{sep}{}-{}", span.begin, span.end - 1)?;
            }
            sep = ", ";
        }
        write!(f, "]")
    }
}

impl FromIterator<u64> for RowSequence {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        Self::from_keys(iter)
    }
}

/// Accumulates keys and spans in any order, producing a coalesced
/// [`RowSequence`]. Overlapping input is merged (set union).
#[derive(Default)]
pub struct RowSequenceBuilder {
    spans: Vec<Span>,
}

impl RowSequenceBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single key.
    pub fn add_key(&mut self, key: u64) {
        self.add_span(key, key + 1);
    }

    /// Add every key in the half-open span `begin..end`.
    pub fn add_span(&mut self, begin: u64, end: u64) {
        if begin < end {
            self.spans.push(Span::new(begin, end));
        }
    }

    /// Check whether anything has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Sort, merge, and produce the final sequence.
    #[must_use]
    pub fn build(mut self) -> RowSequence {
        if self.spans.is_empty() {
            return RowSequence::empty();
        }
        self.spans.sort_unstable_by_key(|s| s.begin);

        let mut merged: SmallVec<[Span; 4]> = SmallVec::new();
        let mut size = 0u64;
        for span in self.spans {
            match merged.last_mut() {
                Some(prev) if span.begin <= prev.end => {
                    if span.end > prev.end {
                        size += span.end - prev.end;
                        prev.end = span.end;
                    }
                }
                _ => {
                    size += span.len();
                    merged.push(span);
                }
            }
        }
        RowSequence {
            spans: merged,
            size,
        }
    }
}
