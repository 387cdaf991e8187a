//! Client-side reconciliation engine for streaming table deltas.
//!
//! A server periodically emits a compact metadata header describing which
//! rows were removed, shifted, added, or modified since the last update,
//! followed by column data for the added/modified rows in arbitrarily
//! sized chunks. This crate turns that stream back into a consistent,
//! queryable table and reports every update as a structured diff.
//!
//! # Key Concepts
//!
//! - **Key space**: rows addressed by sparse, server-assigned 64-bit keys
//!   that stay stable while a row is alive
//! - **Position space**: rows addressed by dense, zero-based rank among
//!   live keys; renumbered by every structural change
//! - **[`SpaceMapper`]**: the bijection between the two spaces
//! - **[`TableState`]**: per-column value arrays in position order, kept
//!   in lockstep with the mapper
//! - **[`UpdateProcessor`]**: the per-subscription state machine driving
//!   removes → shifts → adds → modifies across chunk deliveries
//! - **[`TickingUpdate`]**: the immutable diff emitted once per update
//!
//! The engine is synchronous and single-threaded; callers must serialize
//! calls per subscription. Snapshots handed out in diffs are immutable
//! values, safe to read from other threads while the live table keeps
//! ticking.

mod column;
mod error;
mod processor;
mod shift;
mod space_mapper;
mod table;
mod update;

pub use column::{ArrayColumnSource, CellValue, ColumnData, ColumnSource, ColumnValues, DataType};
pub use error::{ClientError, Result};
pub use processor::UpdateProcessor;
pub use shift::ShiftPlan;
pub use space_mapper::SpaceMapper;
pub use table::{TableSnapshot, TableState};
pub use update::TickingUpdate;

pub use ticktable_rowset::{RowSequence, RowSequenceBuilder, Span};
