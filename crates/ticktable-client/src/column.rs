//! Typed column storage and the pull interface that feeds it.
//!
//! Column types are a closed, protocol-level set, so columns are typed
//! vectors behind an enum rather than type-erased storage. Null flags live
//! in a parallel `Vec<bool>`; a null cell keeps a type-default placeholder
//! in the value vector, and the flag vector is the authority.

use ticktable_rowset::RowSequence;

use crate::error::{ClientError, Result};

/// Data type of one table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int32,
    Int64,
    Float64,
    Bool,
    Text,
}

/// The value vector of one column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float64(Vec<f64>),
    Bool(Vec<bool>),
    Text(Vec<String>),
}

impl ColumnValues {
    fn new(data_type: DataType) -> Self {
        match data_type {
            DataType::Int32 => Self::Int32(Vec::new()),
            DataType::Int64 => Self::Int64(Vec::new()),
            DataType::Float64 => Self::Float64(Vec::new()),
            DataType::Bool => Self::Bool(Vec::new()),
            DataType::Text => Self::Text(Vec::new()),
        }
    }

    /// The data type these values carry.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
            Self::Float64(_) => DataType::Float64,
            Self::Bool(_) => DataType::Bool,
            Self::Text(_) => DataType::Text,
        }
    }

    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Int32(v) => v.len(),
            Self::Int64(v) => v.len(),
            Self::Float64(v) => v.len(),
            Self::Bool(v) => v.len(),
            Self::Text(v) => v.len(),
        }
    }

    /// Check whether there are no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One cell, read dynamically.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Bool(bool),
    Text(String),
}

/// One column's values plus null flags, in row-position order.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnData {
    values: ColumnValues,
    nulls: Vec<bool>,
}

impl ColumnData {
    /// Create an empty column of the given type.
    #[must_use]
    pub fn new(data_type: DataType) -> Self {
        Self {
            values: ColumnValues::new(data_type),
            nulls: Vec::new(),
        }
    }

    /// The column's data type.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.values.data_type()
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nulls.len()
    }

    /// Check whether the column has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nulls.is_empty()
    }

    /// The raw value vector.
    #[must_use]
    pub fn values(&self) -> &ColumnValues {
        &self.values
    }

    /// Check whether the cell at `row` is null.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    #[must_use]
    pub fn is_null(&self, row: usize) -> bool {
        self.nulls[row]
    }

    /// Read the cell at `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    #[must_use]
    pub fn cell(&self, row: usize) -> CellValue {
        if self.nulls[row] {
            return CellValue::Null;
        }
        match &self.values {
            ColumnValues::Int32(v) => CellValue::Int32(v[row]),
            ColumnValues::Int64(v) => CellValue::Int64(v[row]),
            ColumnValues::Float64(v) => CellValue::Float64(v[row]),
            ColumnValues::Bool(v) => CellValue::Bool(v[row]),
            ColumnValues::Text(v) => CellValue::Text(v[row].clone()),
        }
    }

    /// Append rows `begin..end` of `src` onto the end of this column.
    pub fn append_from(&mut self, src: &Self, begin: usize, end: usize) -> Result<()> {
        if begin > end || end > src.len() {
            return Err(ClientError::SourceOutOfBounds {
                begin,
                end,
                len: src.len(),
            });
        }
        let expected = self.data_type();
        match (&mut self.values, &src.values) {
            (ColumnValues::Int32(d), ColumnValues::Int32(s)) => d.extend_from_slice(&s[begin..end]),
            (ColumnValues::Int64(d), ColumnValues::Int64(s)) => d.extend_from_slice(&s[begin..end]),
            (ColumnValues::Float64(d), ColumnValues::Float64(s)) => {
                d.extend_from_slice(&s[begin..end]);
            }
            (ColumnValues::Bool(d), ColumnValues::Bool(s)) => d.extend_from_slice(&s[begin..end]),
            (ColumnValues::Text(d), ColumnValues::Text(s)) => d.extend_from_slice(&s[begin..end]),
            _ => {
                return Err(ClientError::TypeMismatch {
                    expected,
                    actual: src.data_type(),
                });
            }
        }
        self.nulls.extend_from_slice(&src.nulls[begin..end]);
        Ok(())
    }

    /// Insert `chunk` at `positions`, keeping every existing row at its
    /// renumbered position. `positions` are final positions, as if all
    /// inserts happened at once.
    pub(crate) fn splice_insert(&mut self, positions: &RowSequence, chunk: &Self) -> Result<()> {
        if chunk.len() as u64 != positions.size() {
            return Err(ClientError::ChunkSizeMismatch {
                expected: positions.size() as usize,
                actual: chunk.len(),
            });
        }
        let final_len = self.len() + chunk.len();
        if let Some(last) = positions.last() {
            if last >= final_len as u64 {
                return Err(ClientError::SourceOutOfBounds {
                    begin: last as usize,
                    end: last as usize + 1,
                    len: final_len,
                });
            }
        }
        let expected = self.data_type();
        match (&mut self.values, &chunk.values) {
            (ColumnValues::Int32(d), ColumnValues::Int32(s)) => insert_typed(d, positions, s),
            (ColumnValues::Int64(d), ColumnValues::Int64(s)) => insert_typed(d, positions, s),
            (ColumnValues::Float64(d), ColumnValues::Float64(s)) => insert_typed(d, positions, s),
            (ColumnValues::Bool(d), ColumnValues::Bool(s)) => insert_typed(d, positions, s),
            (ColumnValues::Text(d), ColumnValues::Text(s)) => insert_typed(d, positions, s),
            _ => {
                return Err(ClientError::TypeMismatch {
                    expected,
                    actual: chunk.data_type(),
                });
            }
        }
        insert_typed(&mut self.nulls, positions, &chunk.nulls);
        Ok(())
    }

    /// Overwrite the rows at `positions` with `chunk`. Row count and key
    /// assignment are untouched.
    pub(crate) fn splice_overwrite(&mut self, positions: &RowSequence, chunk: &Self) -> Result<()> {
        if chunk.len() as u64 != positions.size() {
            return Err(ClientError::ChunkSizeMismatch {
                expected: positions.size() as usize,
                actual: chunk.len(),
            });
        }
        if let Some(last) = positions.last() {
            if last >= self.len() as u64 {
                return Err(ClientError::SourceOutOfBounds {
                    begin: last as usize,
                    end: last as usize + 1,
                    len: self.len(),
                });
            }
        }
        let expected = self.data_type();
        match (&mut self.values, &chunk.values) {
            (ColumnValues::Int32(d), ColumnValues::Int32(s)) => overwrite_typed(d, positions, s),
            (ColumnValues::Int64(d), ColumnValues::Int64(s)) => overwrite_typed(d, positions, s),
            (ColumnValues::Float64(d), ColumnValues::Float64(s)) => overwrite_typed(d, positions, s),
            (ColumnValues::Bool(d), ColumnValues::Bool(s)) => overwrite_typed(d, positions, s),
            (ColumnValues::Text(d), ColumnValues::Text(s)) => overwrite_typed(d, positions, s),
            _ => {
                return Err(ClientError::TypeMismatch {
                    expected,
                    actual: chunk.data_type(),
                });
            }
        }
        overwrite_typed(&mut self.nulls, positions, &chunk.nulls);
        Ok(())
    }

    /// Remove the rows at `positions` (positions in the current order).
    pub(crate) fn remove_positions(&mut self, positions: &RowSequence) {
        match &mut self.values {
            ColumnValues::Int32(d) => remove_typed(d, positions),
            ColumnValues::Int64(d) => remove_typed(d, positions),
            ColumnValues::Float64(d) => remove_typed(d, positions),
            ColumnValues::Bool(d) => remove_typed(d, positions),
            ColumnValues::Text(d) => remove_typed(d, positions),
        }
        remove_typed(&mut self.nulls, positions);
    }

    /// Remove the rows at `positions` and return them, in position order,
    /// as a chunk of the same type.
    pub(crate) fn extract_positions(&mut self, positions: &RowSequence) -> Self {
        let values = match &mut self.values {
            ColumnValues::Int32(d) => ColumnValues::Int32(extract_typed(d, positions)),
            ColumnValues::Int64(d) => ColumnValues::Int64(extract_typed(d, positions)),
            ColumnValues::Float64(d) => ColumnValues::Float64(extract_typed(d, positions)),
            ColumnValues::Bool(d) => ColumnValues::Bool(extract_typed(d, positions)),
            ColumnValues::Text(d) => ColumnValues::Text(extract_typed(d, positions)),
        };
        let nulls = extract_typed(&mut self.nulls, positions);
        Self { values, nulls }
    }
}

fn insert_typed<T: Clone>(dest: &mut Vec<T>, positions: &RowSequence, src: &[T]) {
    let final_len = dest.len() + src.len();
    let mut old_iter = std::mem::take(dest).into_iter();
    let mut result = Vec::with_capacity(final_len);
    let mut src_offset = 0usize;
    let mut cursor = 0usize;
    for span in positions.spans() {
        let gap = span.begin as usize - cursor;
        result.extend(old_iter.by_ref().take(gap));
        let count = span.len() as usize;
        result.extend_from_slice(&src[src_offset..src_offset + count]);
        src_offset += count;
        cursor = span.end as usize;
    }
    result.extend(old_iter);
    *dest = result;
}

fn overwrite_typed<T: Clone>(dest: &mut [T], positions: &RowSequence, src: &[T]) {
    let mut src_offset = 0usize;
    for span in positions.spans() {
        let begin = span.begin as usize;
        let count = span.len() as usize;
        dest[begin..begin + count].clone_from_slice(&src[src_offset..src_offset + count]);
        src_offset += count;
    }
}

fn remove_typed<T>(dest: &mut Vec<T>, positions: &RowSequence) {
    let removed = positions.size() as usize;
    let mut old_iter = std::mem::take(dest).into_iter();
    let mut result = Vec::with_capacity(old_iter.len() - removed);
    let mut cursor = 0u64;
    for span in positions.spans() {
        result.extend(old_iter.by_ref().take((span.begin - cursor) as usize));
        old_iter.by_ref().take(span.len() as usize).for_each(drop);
        cursor = span.end;
    }
    result.extend(old_iter);
    *dest = result;
}

fn extract_typed<T>(dest: &mut Vec<T>, positions: &RowSequence) -> Vec<T> {
    let extracted = positions.size() as usize;
    let mut iter = std::mem::take(dest).into_iter();
    let mut kept = Vec::with_capacity(iter.len() - extracted);
    let mut taken = Vec::with_capacity(extracted);
    let mut cursor = 0u64;
    for span in positions.spans() {
        kept.extend(iter.by_ref().take((span.begin - cursor) as usize));
        taken.extend(iter.by_ref().take(span.len() as usize));
        cursor = span.end;
    }
    kept.extend(iter);
    *dest = kept;
    taken
}

/// Pull interface over already-decoded columnar data.
///
/// The transport layer decodes record batches into column sources; the
/// engine pulls value ranges out of them into the content store.
pub trait ColumnSource {
    /// The data type this source yields.
    fn data_type(&self) -> DataType;

    /// Number of rows available.
    fn len(&self) -> usize;

    /// Check whether the source has no rows.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append rows `begin..end` (values and null flags) into `dest`.
    fn fill_from(&self, begin: usize, end: usize, dest: &mut ColumnData) -> Result<()>;
}

/// An in-memory [`ColumnSource`] over fully-materialized data.
#[derive(Debug, Clone)]
pub struct ArrayColumnSource {
    data: ColumnData,
}

impl ArrayColumnSource {
    /// Wrap an existing column.
    #[must_use]
    pub fn new(data: ColumnData) -> Self {
        Self { data }
    }

    /// A 32-bit integer source; `None` entries are null cells.
    pub fn int32<I: IntoIterator<Item = Option<i32>>>(values: I) -> Self {
        let (values, nulls) = collect_nullable(values);
        Self::new(ColumnData {
            values: ColumnValues::Int32(values),
            nulls,
        })
    }

    /// A 64-bit integer source; `None` entries are null cells.
    pub fn int64<I: IntoIterator<Item = Option<i64>>>(values: I) -> Self {
        let (values, nulls) = collect_nullable(values);
        Self::new(ColumnData {
            values: ColumnValues::Int64(values),
            nulls,
        })
    }

    /// A 64-bit float source; `None` entries are null cells.
    pub fn float64<I: IntoIterator<Item = Option<f64>>>(values: I) -> Self {
        let (values, nulls) = collect_nullable(values);
        Self::new(ColumnData {
            values: ColumnValues::Float64(values),
            nulls,
        })
    }

    /// A boolean source; `None` entries are null cells.
    pub fn bools<I: IntoIterator<Item = Option<bool>>>(values: I) -> Self {
        let (values, nulls) = collect_nullable(values);
        Self::new(ColumnData {
            values: ColumnValues::Bool(values),
            nulls,
        })
    }

    /// A text source; `None` entries are null cells.
    pub fn text<S: Into<String>, I: IntoIterator<Item = Option<S>>>(values: I) -> Self {
        let (values, nulls) = collect_nullable(values.into_iter().map(|v| v.map(Into::into)));
        Self::new(ColumnData {
            values: ColumnValues::Text(values),
            nulls,
        })
    }
}

fn collect_nullable<T: Default>(values: impl IntoIterator<Item = Option<T>>) -> (Vec<T>, Vec<bool>) {
    let mut out = Vec::new();
    let mut nulls = Vec::new();
    for value in values {
        nulls.push(value.is_none());
        out.push(value.unwrap_or_default());
    }
    (out, nulls)
}

impl ColumnSource for ArrayColumnSource {
    fn data_type(&self) -> DataType {
        self.data.data_type()
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn fill_from(&self, begin: usize, end: usize, dest: &mut ColumnData) -> Result<()> {
        dest.append_from(&self.data, begin, end)
    }
}
