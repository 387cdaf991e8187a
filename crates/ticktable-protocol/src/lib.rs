//! Wire-format decoding for the table update stream.
//!
//! The server frames every message in a [`MessageWrapper`] (magic number,
//! message kind, payload). Update messages carry an [`UpdateMetadata`]
//! payload whose row sets are encoded with the compressed-delta codec in
//! [`codec`]. All reads go through `byteorder` over `std::io::Read`; a
//! short buffer surfaces as an I/O error rather than a panic.

use std::io;

use thiserror::Error;

mod codec;
mod envelope;

pub use codec::{decode_compressed_delta, encode_compressed_delta};
pub use envelope::{MessageKind, MessageWrapper, UpdateMetadata};

/// Magic number leading every framed message.
pub const MAGIC: u32 = 0x746B_7462;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("bad magic number: expected {MAGIC:#010x}, got {actual:#010x}")]
    BadMagic { actual: u32 },
    #[error("unexpected message kind: {actual}")]
    BadMessageKind { actual: u8 },
    #[error("bad rowset command byte: {0:#04x}")]
    BadCommand(u8),
    #[error("rowset range end with no pending range start")]
    BadDelta,
    #[error("invalid boolean byte: {0}")]
    InvalidBool(u8),
    #[error("blob length {len} exceeds limit {max}")]
    BlobTooLarge { len: usize, max: usize },
    #[error("row key {0} cannot be represented in the delta encoding")]
    KeyOutOfRange(u64),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
