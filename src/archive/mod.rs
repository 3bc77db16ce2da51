//! The archive collaborator boundary.
//!
//! The core never decodes a zip central directory or runs inflate itself;
//! it consumes archive entries through the [`ZipArchive`] trait, which hands
//! back [`EntryMeta`] records and lets the core ask for a decoded copy of a
//! compressed entry when it must. [`zip`] ships the concrete, ambient
//! implementation used by the reference CLI and by most tests.

pub mod zip;

mod entry_reader;

pub use entry_reader::StreamingEntryReader;

use crate::error::Result;

/// Metadata describing a single entry inside an archive, as seen by the
/// flash driver. Mirrors exactly what a zip central directory records,
/// without requiring the core to parse one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    /// Full path of the entry inside the archive, e.g. `"boot/script.txt"`.
    pub filename: String,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    /// Raw zip compression method identifier; `0` means stored (no
    /// compression), any other value requires [`ZipArchive::decode_entry`].
    pub compression_method: u16,
    /// Byte offset of this entry's local file header within the outer blob.
    pub offset: u64,
    /// Size in bytes of the local file header (fixed 30 bytes plus the
    /// variable-length filename and extra field), i.e. the distance between
    /// `offset` and the first byte of entry data.
    pub local_header_size: u64,
}

impl EntryMeta {
    pub fn is_stored(&self) -> bool {
        self.compression_method == 0
    }
}

/// The interface the flash driver consumes for reading an optimized factory
/// archive. Archive-format parsing (central directory decoding, CRC
/// verification, inflate) lives entirely on the implementor's side of this
/// trait; the core only ever asks for metadata and bytes.
pub trait ZipArchive {
    /// Every entry's metadata, in archive (central directory) order.
    fn entries(&self) -> &[EntryMeta];

    /// The raw bytes of the entire outer archive blob. Stored entries are
    /// read as slices of this buffer; the core never copies it.
    fn blob(&self) -> &[u8];

    /// Fully decode a compressed entry into an owned buffer. Only called for
    /// entries where [`EntryMeta::is_stored`] is `false`.
    fn decode_entry(&self, meta: &EntryMeta) -> Result<Vec<u8>>;

    /// Convenience lookup by exact entry path.
    fn entry_by_name(&self, name: &str) -> Option<&EntryMeta> {
        self.entries().iter().find(|entry| entry.filename == name)
    }
}
