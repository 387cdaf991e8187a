//! Compressed-delta row set codec.
//!
//! A row set travels as a stream of commands. Each command byte carries a
//! value-width tag in its low three bits and the command itself in bits
//! 3..7. Values are signed deltas against a running offset; a negative
//! delta closes a range whose inclusive start was the previous positive
//! value. The stream is terminated by an `END` command, at which point a
//! still-pending start value is appended as a singleton key.

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use ticktable_rowset::{RowSequence, RowSequenceBuilder};

use crate::{ProtocolError, Result};

const SHORT_VALUE: u8 = 1;
const INT_VALUE: u8 = 2;
const LONG_VALUE: u8 = 3;
const BYTE_VALUE: u8 = 4;
const VALUE_MASK: u8 = 0x07;

const OFFSET: u8 = 8;
const SHORT_ARRAY: u8 = 16;
const BYTE_ARRAY: u8 = 24;
const END: u8 = 32;
const CMD_MASK: u8 = 0x78;

fn read_value<R: Read>(reader: &mut R, command: u8) -> Result<i64> {
    let value = match command & VALUE_MASK {
        LONG_VALUE => reader.read_i64::<BigEndian>()?,
        INT_VALUE => i64::from(reader.read_i32::<BigEndian>()?),
        SHORT_VALUE => i64::from(reader.read_i16::<BigEndian>()?),
        BYTE_VALUE => i64::from(reader.read_i8()?),
        _ => return Err(ProtocolError::BadCommand(command)),
    };
    Ok(value)
}

/// Running decoder state: the delta offset and the pending start of a
/// possible range.
#[derive(Default)]
struct DeltaState {
    offset: u64,
    pending: Option<u64>,
}

impl DeltaState {
    /// Apply one signed delta. A non-negative delta advances the offset
    /// and becomes the pending start of the next key or range; a negative
    /// delta closes the pending start into an inclusive range.
    fn apply(&mut self, builder: &mut RowSequenceBuilder, value: i64) -> Result<()> {
        let actual = self
            .offset
            .checked_add(value.unsigned_abs())
            .ok_or(ProtocolError::BadDelta)?;
        if value < 0 {
            let start = self.pending.take().ok_or(ProtocolError::BadDelta)?;
            let end = actual.checked_add(1).ok_or(ProtocolError::BadDelta)?;
            builder.add_span(start, end);
        } else {
            if let Some(prev) = self.pending.take() {
                builder.add_key(prev);
            }
            self.pending = Some(actual);
        }
        self.offset = actual;
        Ok(())
    }

    fn finish(self, builder: &mut RowSequenceBuilder) {
        if let Some(prev) = self.pending {
            builder.add_key(prev);
        }
    }
}

/// Decode one compressed-delta row set from the reader.
///
/// The reader is left positioned immediately after the `END` command, so
/// several row sets may be decoded back to back from one buffer (the shift
/// payload concatenates three).
pub fn decode_compressed_delta<R: Read>(reader: &mut R) -> Result<RowSequence> {
    let mut builder = RowSequenceBuilder::new();
    let mut state = DeltaState::default();

    loop {
        let command = reader.read_u8()?;
        match command & CMD_MASK {
            OFFSET => {
                let value = read_value(reader, command)?;
                state.apply(&mut builder, value)?;
            }
            SHORT_ARRAY => {
                let count = read_value(reader, command)?;
                for _ in 0..count {
                    let value = i64::from(reader.read_i16::<BigEndian>()?);
                    state.apply(&mut builder, value)?;
                }
            }
            BYTE_ARRAY => {
                let count = read_value(reader, command)?;
                for _ in 0..count {
                    let value = i64::from(reader.read_i8()?);
                    state.apply(&mut builder, value)?;
                }
            }
            END => break,
            _ => return Err(ProtocolError::BadCommand(command)),
        }
    }

    state.finish(&mut builder);
    Ok(builder.build())
}

fn write_offset<W: Write>(writer: &mut W, delta: i64) -> Result<()> {
    if let Ok(value) = i8::try_from(delta) {
        writer.write_u8(OFFSET | BYTE_VALUE)?;
        writer.write_i8(value)?;
    } else if let Ok(value) = i16::try_from(delta) {
        writer.write_u8(OFFSET | SHORT_VALUE)?;
        writer.write_i16::<BigEndian>(value)?;
    } else if let Ok(value) = i32::try_from(delta) {
        writer.write_u8(OFFSET | INT_VALUE)?;
        writer.write_i32::<BigEndian>(value)?;
    } else {
        writer.write_u8(OFFSET | LONG_VALUE)?;
        writer.write_i64::<BigEndian>(delta)?;
    }
    Ok(())
}

/// Encode a row set as a compressed-delta command stream.
///
/// Emits one `OFFSET` command per span boundary with the narrowest value
/// width that fits the delta; any decoder of the format accepts it. Keys
/// above `i64::MAX` are not representable in the signed delta encoding.
pub fn encode_compressed_delta<W: Write>(writer: &mut W, rows: &RowSequence) -> Result<()> {
    if let Some(last) = rows.last() {
        if last > i64::MAX as u64 {
            return Err(ProtocolError::KeyOutOfRange(last));
        }
    }

    let mut offset: i64 = 0;
    for span in rows.spans() {
        let first = span.begin as i64;
        let last = (span.end - 1) as i64;
        write_offset(writer, first - offset)?;
        offset = first;
        if last != first {
            write_offset(writer, -(last - offset))?;
            offset = last;
        }
    }
    writer.write_u8(END)?;
    Ok(())
}
