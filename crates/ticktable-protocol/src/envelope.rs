//! Message framing and the update-metadata payload.
//!
//! Every server message starts with the magic number and a kind byte; the
//! payload is length-prefixed. The core engine only consumes
//! [`MessageKind::UpdateMetadata`] messages, whose payload is decoded into
//! [`UpdateMetadata`]. The row sets inside stay as raw bytes here; the
//! engine runs them through [`crate::decode_compressed_delta`] itself.

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::{MAGIC, ProtocolError, Result};

/// Upper bound for any length-prefixed blob, to fail fast on corrupt
/// frames instead of attempting a giant allocation.
const MAX_BLOB_LEN: usize = 1 << 30;

/// Kind tag of a framed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    /// One update's metadata: removed/shifted/added/modified row sets.
    UpdateMetadata = 1,
}

impl MessageKind {
    fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            1 => Ok(Self::UpdateMetadata),
            actual => Err(ProtocolError::BadMessageKind { actual }),
        }
    }
}

fn read_blob<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let len = reader.read_u32::<BigEndian>()? as usize;
    if len > MAX_BLOB_LEN {
        return Err(ProtocolError::BlobTooLarge {
            len,
            max: MAX_BLOB_LEN,
        });
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn write_blob<W: Write>(writer: &mut W, blob: &[u8]) -> Result<()> {
    writer.write_u32::<BigEndian>(blob.len() as u32)?;
    writer.write_all(blob)?;
    Ok(())
}

fn read_bool<R: Read>(reader: &mut R) -> Result<bool> {
    match reader.read_u8()? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(ProtocolError::InvalidBool(other)),
    }
}

/// The outer frame around every server message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageWrapper {
    pub kind: MessageKind,
    pub payload: Vec<u8>,
}

impl MessageWrapper {
    /// Decode a frame, validating the magic number and kind tag.
    pub fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        let magic = reader.read_u32::<BigEndian>()?;
        if magic != MAGIC {
            return Err(ProtocolError::BadMagic { actual: magic });
        }
        let kind = MessageKind::from_byte(reader.read_u8()?)?;
        let payload = read_blob(reader)?;
        Ok(Self { kind, payload })
    }

    /// Encode the frame.
    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<BigEndian>(MAGIC)?;
        writer.write_u8(self.kind as u8)?;
        write_blob(writer, &self.payload)
    }
}

/// Payload of an update message.
///
/// The row sets are kept as their encoded bytes; `first_seq`/`last_seq`
/// describe the server-side coalescing window and are informational only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateMetadata {
    pub first_seq: i64,
    pub last_seq: i64,
    /// True when this update is a full snapshot rather than a delta.
    pub is_snapshot: bool,
    /// Viewport descriptor, present only for viewport subscriptions.
    /// Preserved for callers; unused by the reconciliation core.
    pub viewport: Option<Vec<u8>>,
    pub removed_rows: Vec<u8>,
    /// Three concatenated row sets: shift first-keys, last-keys, dest-keys.
    pub shift_data: Vec<u8>,
    pub added_rows: Vec<u8>,
    /// One encoded modified-rows set per column, in schema column order.
    pub mod_column_rows: Vec<Vec<u8>>,
}

impl UpdateMetadata {
    /// Decode the payload of an [`MessageKind::UpdateMetadata`] frame.
    pub fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        let first_seq = reader.read_i64::<BigEndian>()?;
        let last_seq = reader.read_i64::<BigEndian>()?;
        let is_snapshot = read_bool(reader)?;
        let viewport = if read_bool(reader)? {
            Some(read_blob(reader)?)
        } else {
            None
        };
        let removed_rows = read_blob(reader)?;
        let shift_data = read_blob(reader)?;
        let added_rows = read_blob(reader)?;
        let num_mod_columns = reader.read_u32::<BigEndian>()? as usize;
        let mut mod_column_rows = Vec::with_capacity(num_mod_columns.min(1024));
        for _ in 0..num_mod_columns {
            mod_column_rows.push(read_blob(reader)?);
        }
        Ok(Self {
            first_seq,
            last_seq,
            is_snapshot,
            viewport,
            removed_rows,
            shift_data,
            added_rows,
            mod_column_rows,
        })
    }

    /// Encode the payload.
    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_i64::<BigEndian>(self.first_seq)?;
        writer.write_i64::<BigEndian>(self.last_seq)?;
        writer.write_u8(u8::from(self.is_snapshot))?;
        match &self.viewport {
            Some(viewport) => {
                writer.write_u8(1)?;
                write_blob(writer, viewport)?;
            }
            None => writer.write_u8(0)?,
        }
        write_blob(writer, &self.removed_rows)?;
        write_blob(writer, &self.shift_data)?;
        write_blob(writer, &self.added_rows)?;
        writer.write_u32::<BigEndian>(self.mod_column_rows.len() as u32)?;
        for rows in &self.mod_column_rows {
            write_blob(writer, rows)?;
        }
        Ok(())
    }

    /// Encode this metadata wrapped in a full frame, ready for transport.
    pub fn to_wrapped_bytes(&self) -> Result<Vec<u8>> {
        let mut payload = Vec::new();
        self.encode(&mut payload)?;
        let wrapper = MessageWrapper {
            kind: MessageKind::UpdateMetadata,
            payload,
        };
        let mut bytes = Vec::new();
        wrapper.encode(&mut bytes)?;
        Ok(bytes)
    }
}
