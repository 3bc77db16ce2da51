//! Random-access and sequential reading over a single archive entry.

use std::borrow::Cow;
use std::io::{self, Read};

use super::{EntryMeta, ZipArchive};
use crate::error::Result;

/// A byte reader over one entry of an optimized factory archive.
///
/// For a stored (uncompressed) entry, this is a zero-copy slice of the outer
/// blob: no intermediate buffer the size of the partition image is ever
/// allocated. For a compressed entry, the archive collaborator is asked for
/// a one-shot decoded copy and reads are served from that instead.
pub struct StreamingEntryReader<'a> {
    data: Cow<'a, [u8]>,
    pos: usize,
}

impl<'a> StreamingEntryReader<'a> {
    /// Build a reader for `meta` against `archive`'s outer blob.
    pub fn new(archive: &'a dyn ZipArchive, meta: &EntryMeta) -> Result<Self> {
        let data = if meta.is_stored() {
            let start = (meta.offset + meta.local_header_size) as usize;
            let end = start + meta.compressed_size as usize;
            Cow::Borrowed(&archive.blob()[start..end])
        } else {
            Cow::Owned(archive.decode_entry(meta)?)
        };

        Ok(Self { data, pos: 0 })
    }

    /// Logical size of the entry: `compressed_size` for stored entries
    /// (where it equals the uncompressed size), or the decoded length
    /// otherwise.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Random-access read of the half-open byte range `[start, end)`.
    ///
    /// Negative indices count back from the end of the entry; indices past
    /// the end saturate at the entry's length. This mirrors how the
    /// underlying blob slice is computed: no bounds-panicking is possible
    /// from caller-supplied indices.
    pub fn read_range(&self, start: i64, end: i64) -> &[u8] {
        let size = self.data.len() as i64;
        let clamp = |x: i64| -> usize {
            if x < 0 {
                (x + size).max(0) as usize
            } else {
                x.min(size) as usize
            }
        };

        let start = clamp(start);
        let end = clamp(end).max(start);
        &self.data[start..end]
    }
}

impl Read for StreamingEntryReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = &self.data[self.pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::zip::ZipContainer;

    fn archive_with(entry_name: &str, contents: &[u8]) -> ZipContainer {
        ZipContainer::build_stored(vec![(entry_name.to_string(), contents.to_vec())])
    }

    #[test]
    fn stored_entry_reads_full_range() {
        let archive = archive_with("boot/boot.img", b"hello world");
        let meta = archive.entry_by_name("boot/boot.img").unwrap().clone();
        let reader = StreamingEntryReader::new(&archive, &meta).unwrap();

        assert_eq!(reader.read_range(0, reader.len() as i64), b"hello world");
    }

    #[test]
    fn negative_and_oversize_indices_clamp() {
        let archive = archive_with("boot/boot.img", b"0123456789");
        let meta = archive.entry_by_name("boot/boot.img").unwrap().clone();
        let reader = StreamingEntryReader::new(&archive, &meta).unwrap();

        assert_eq!(reader.read_range(-3, 100), b"789");
        assert_eq!(reader.read_range(-100, -100), b"");
        assert_eq!(reader.read_range(5, 2), b"");
    }

    #[test]
    fn sequential_read_matches_whole_payload() {
        let payload = vec![7u8; 4096];
        let archive = archive_with("boot/boot.img", &payload);
        let meta = archive.entry_by_name("boot/boot.img").unwrap().clone();
        let mut reader = StreamingEntryReader::new(&archive, &meta).unwrap();

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, payload);
    }
}
