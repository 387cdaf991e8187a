//! Ordering of shift application.
//!
//! A shift tuple `(first, last, dest)` moves the closed key range
//! `[first, last]` so it starts at `dest`. Applying tuples in arrival
//! order is unsafe when ranges overlap their own destinations: an upward
//! shift applied early can clobber key space a later tuple still needs to
//! read. The safe order is one forward pass applying downward shifts
//! (`dest < first`) as they appear, with upward shifts held back and
//! replayed in reverse input order afterwards.

use ticktable_rowset::{RowSequence, Span};

use crate::error::{ClientError, Result};

/// Iterator over `(span, dest_key)` pairs in a self-overlap-safe
/// application order.
///
/// `span` is the half-open key range to relocate so that it starts at
/// `dest_key`.
#[derive(Debug)]
pub struct ShiftPlan {
    tuples: Vec<(u64, u64, u64)>,
    next: usize,
    deferred: Vec<(Span, u64)>,
    draining: bool,
}

impl ShiftPlan {
    /// Build a plan from the three parallel shift-component row sets
    /// (first-keys, last-keys, dest-keys), paired positionally.
    pub fn new(first: &RowSequence, last: &RowSequence, dest: &RowSequence) -> Result<Self> {
        if first.size() != last.size() || first.size() != dest.size() {
            return Err(ClientError::ShiftComponentMismatch {
                first: first.size(),
                last: last.size(),
                dest: dest.size(),
            });
        }
        let tuples = first
            .keys()
            .zip(last.keys())
            .zip(dest.keys())
            .map(|((f, l), d)| (f, l, d))
            .collect();
        Ok(Self {
            tuples,
            next: 0,
            deferred: Vec::new(),
            draining: false,
        })
    }

    /// Check whether the plan holds no shifts at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }
}

impl Iterator for ShiftPlan {
    type Item = (Span, u64);

    fn next(&mut self) -> Option<Self::Item> {
        while !self.draining {
            let Some(&(first, last, dest)) = self.tuples.get(self.next) else {
                self.draining = true;
                break;
            };
            self.next += 1;

            let span = Span::new(first, last + 1);
            if dest >= first {
                // Upward shift: hold back, replay after the forward pass.
                self.deferred.push((span, dest));
                continue;
            }
            return Some((span, dest));
        }
        self.deferred.pop()
    }
}
