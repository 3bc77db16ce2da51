//! A minimal, from-scratch zip central-directory reader.
//!
//! This is the ambient, concrete [`super::ZipArchive`] implementation shipped
//! alongside the core so the crate is usable against real optimized factory
//! archives. It walks the end-of-central-directory record and the central
//! directory by hand rather than pulling in a general-purpose zip library,
//! since the core only ever needs entry metadata and the ability to inflate
//! a single entry — `flate2`, already part of this stack, supplies the
//! latter.
//!
//! Zip64 and multi-disk archives are not supported; optimized factory
//! archives are never large enough (individual partition images aside, which
//! stay under the 4 GiB per-entry limit in practice) to need them.

use std::io::Read;

use flate2::read::DeflateDecoder;

use super::{EntryMeta, ZipArchive};
use crate::error::{Error, Result};

const EOCD_SIGNATURE: u32 = 0x0605_4b50;
const CENTRAL_DIR_SIGNATURE: u32 = 0x0201_4b50;
const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;
const EOCD_FIXED_SIZE: usize = 22;
const CENTRAL_DIR_FIXED_SIZE: usize = 46;
const LOCAL_HEADER_FIXED_SIZE: usize = 30;
const MAX_COMMENT_LEN: usize = 0xffff;

/// A zip archive fully buffered in memory, with its central directory parsed
/// up front.
pub struct ZipContainer {
    blob: Vec<u8>,
    entries: Vec<EntryMeta>,
}

impl ZipContainer {
    /// Parse `blob` as a zip archive.
    pub fn open(blob: Vec<u8>) -> Result<Self> {
        let eocd_offset = find_eocd(&blob)?;
        let central_dir_entries = u16::from_le_bytes(
            blob[eocd_offset + 10..eocd_offset + 12]
                .try_into()
                .unwrap(),
        ) as usize;
        let central_dir_offset = u32::from_le_bytes(
            blob[eocd_offset + 16..eocd_offset + 20]
                .try_into()
                .unwrap(),
        ) as usize;

        let mut entries = Vec::with_capacity(central_dir_entries);
        let mut cursor = central_dir_offset;

        for _ in 0..central_dir_entries {
            let (entry, next) = parse_central_dir_entry(&blob, cursor)?;
            entries.push(entry);
            cursor = next;
        }

        Ok(Self { blob, entries })
    }

    #[cfg(test)]
    pub(crate) fn build_stored(files: Vec<(String, Vec<u8>)>) -> Self {
        build_stored_zip(files)
    }
}

impl ZipArchive for ZipContainer {
    fn entries(&self) -> &[EntryMeta] {
        &self.entries
    }

    fn blob(&self) -> &[u8] {
        &self.blob
    }

    fn decode_entry(&self, meta: &EntryMeta) -> Result<Vec<u8>> {
        let start = (meta.offset + meta.local_header_size) as usize;
        let end = start + meta.compressed_size as usize;
        let raw = &self.blob[start..end];

        let mut out = Vec::with_capacity(meta.uncompressed_size as usize);
        match meta.compression_method {
            0 => out.extend_from_slice(raw),
            8 => {
                DeflateDecoder::new(raw).read_to_end(&mut out)?;
            }
            other => {
                return Err(Error::Zip(format!(
                    "unsupported compression method {other} for entry '{}'",
                    meta.filename
                )))
            }
        }

        Ok(out)
    }
}

fn find_eocd(blob: &[u8]) -> Result<usize> {
    if blob.len() < EOCD_FIXED_SIZE {
        return Err(Error::Zip("archive too small to contain a zip directory".into()));
    }

    let search_floor = blob.len().saturating_sub(EOCD_FIXED_SIZE + MAX_COMMENT_LEN);
    let search_window = &blob[search_floor..];

    for start in (0..=search_window.len() - EOCD_FIXED_SIZE).rev() {
        let candidate = search_floor + start;
        let sig = u32::from_le_bytes(blob[candidate..candidate + 4].try_into().unwrap());
        if sig == EOCD_SIGNATURE {
            return Ok(candidate);
        }
    }

    Err(Error::Zip("end-of-central-directory record not found".into()))
}

fn parse_central_dir_entry(blob: &[u8], offset: usize) -> Result<(EntryMeta, usize)> {
    if offset + CENTRAL_DIR_FIXED_SIZE > blob.len() {
        return Err(Error::Zip("truncated central directory entry".into()));
    }

    let sig = u32::from_le_bytes(blob[offset..offset + 4].try_into().unwrap());
    if sig != CENTRAL_DIR_SIGNATURE {
        return Err(Error::Zip("malformed central directory entry signature".into()));
    }

    let compression_method = u16::from_le_bytes(blob[offset + 10..offset + 12].try_into().unwrap());
    let compressed_size =
        u32::from_le_bytes(blob[offset + 20..offset + 24].try_into().unwrap()) as u64;
    let uncompressed_size =
        u32::from_le_bytes(blob[offset + 24..offset + 28].try_into().unwrap()) as u64;
    let filename_len = u16::from_le_bytes(blob[offset + 28..offset + 30].try_into().unwrap()) as usize;
    let extra_len = u16::from_le_bytes(blob[offset + 30..offset + 32].try_into().unwrap()) as usize;
    let comment_len = u16::from_le_bytes(blob[offset + 32..offset + 34].try_into().unwrap()) as usize;
    let local_header_offset =
        u32::from_le_bytes(blob[offset + 42..offset + 46].try_into().unwrap()) as u64;

    let filename_start = offset + CENTRAL_DIR_FIXED_SIZE;
    let filename_end = filename_start + filename_len;
    if filename_end > blob.len() {
        return Err(Error::Zip("truncated central directory filename".into()));
    }
    let filename = std::str::from_utf8(&blob[filename_start..filename_end])
        .map_err(|_| Error::InvalidUtf8(format!("<entry at offset {offset}>")))?
        .to_string();

    let local_header_size = local_header_size(blob, local_header_offset as usize)?;

    let meta = EntryMeta {
        filename,
        uncompressed_size,
        compressed_size,
        compression_method,
        offset: local_header_offset,
        local_header_size,
    };

    let next = filename_end + extra_len + comment_len;
    Ok((meta, next))
}

fn local_header_size(blob: &[u8], offset: usize) -> Result<u64> {
    if offset + LOCAL_HEADER_FIXED_SIZE > blob.len() {
        return Err(Error::Zip("truncated local file header".into()));
    }

    let sig = u32::from_le_bytes(blob[offset..offset + 4].try_into().unwrap());
    if sig != LOCAL_HEADER_SIGNATURE {
        return Err(Error::Zip("malformed local file header signature".into()));
    }

    let filename_len = u16::from_le_bytes(blob[offset + 26..offset + 28].try_into().unwrap()) as u64;
    let extra_len = u16::from_le_bytes(blob[offset + 28..offset + 30].try_into().unwrap()) as u64;

    Ok(LOCAL_HEADER_FIXED_SIZE as u64 + filename_len + extra_len)
}

#[cfg(test)]
fn build_stored_zip(files: Vec<(String, Vec<u8>)>) -> ZipContainer {
    let mut blob = Vec::new();
    let mut central_dir = Vec::new();
    let mut records = Vec::new();

    for (name, data) in &files {
        let local_offset = blob.len() as u32;
        let name_bytes = name.as_bytes();

        blob.extend_from_slice(&LOCAL_HEADER_SIGNATURE.to_le_bytes());
        blob.extend_from_slice(&20u16.to_le_bytes()); // version needed
        blob.extend_from_slice(&0u16.to_le_bytes()); // flags
        blob.extend_from_slice(&0u16.to_le_bytes()); // compression: stored
        blob.extend_from_slice(&0u16.to_le_bytes()); // mod time
        blob.extend_from_slice(&0u16.to_le_bytes()); // mod date
        blob.extend_from_slice(&0u32.to_le_bytes()); // crc32 (unchecked by our reader)
        blob.extend_from_slice(&(data.len() as u32).to_le_bytes()); // compressed size
        blob.extend_from_slice(&(data.len() as u32).to_le_bytes()); // uncompressed size
        blob.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
        blob.extend_from_slice(&0u16.to_le_bytes()); // extra len
        blob.extend_from_slice(name_bytes);
        blob.extend_from_slice(data);

        records.push((name.clone(), data.len() as u32, local_offset));
    }

    for (name, size, local_offset) in &records {
        let name_bytes = name.as_bytes();
        central_dir.extend_from_slice(&CENTRAL_DIR_SIGNATURE.to_le_bytes());
        central_dir.extend_from_slice(&20u16.to_le_bytes()); // version made by
        central_dir.extend_from_slice(&20u16.to_le_bytes()); // version needed
        central_dir.extend_from_slice(&0u16.to_le_bytes()); // flags
        central_dir.extend_from_slice(&0u16.to_le_bytes()); // compression
        central_dir.extend_from_slice(&0u16.to_le_bytes()); // mod time
        central_dir.extend_from_slice(&0u16.to_le_bytes()); // mod date
        central_dir.extend_from_slice(&0u32.to_le_bytes()); // crc32
        central_dir.extend_from_slice(&size.to_le_bytes()); // compressed size
        central_dir.extend_from_slice(&size.to_le_bytes()); // uncompressed size
        central_dir.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
        central_dir.extend_from_slice(&0u16.to_le_bytes()); // extra len
        central_dir.extend_from_slice(&0u16.to_le_bytes()); // comment len
        central_dir.extend_from_slice(&0u16.to_le_bytes()); // disk number start
        central_dir.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
        central_dir.extend_from_slice(&0u32.to_le_bytes()); // external attrs
        central_dir.extend_from_slice(&local_offset.to_le_bytes());
        central_dir.extend_from_slice(name_bytes);
    }

    let central_dir_offset = blob.len() as u32;
    let central_dir_size = central_dir.len() as u32;
    blob.extend_from_slice(&central_dir);

    blob.extend_from_slice(&EOCD_SIGNATURE.to_le_bytes());
    blob.extend_from_slice(&0u16.to_le_bytes()); // disk number
    blob.extend_from_slice(&0u16.to_le_bytes()); // disk with central dir
    blob.extend_from_slice(&(records.len() as u16).to_le_bytes());
    blob.extend_from_slice(&(records.len() as u16).to_le_bytes());
    blob.extend_from_slice(&central_dir_size.to_le_bytes());
    blob.extend_from_slice(&central_dir_offset.to_le_bytes());
    blob.extend_from_slice(&0u16.to_le_bytes()); // comment len

    ZipContainer::open(blob).expect("hand-built zip must parse")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_stored_entries() {
        let container = ZipContainer::build_stored(vec![
            ("boot/script.txt".to_string(), b"flash boot boot.img\n".to_vec()),
            ("boot/boot.img".to_string(), vec![0xAAu8; 256]),
        ]);

        assert_eq!(container.entries().len(), 2);

        let script = container.entry_by_name("boot/script.txt").unwrap();
        assert_eq!(script.uncompressed_size, 21);
        assert!(script.is_stored());

        let image = container.entry_by_name("boot/boot.img").unwrap();
        assert_eq!(image.uncompressed_size, 256);

        let start = (image.offset + image.local_header_size) as usize;
        let end = start + image.compressed_size as usize;
        assert_eq!(&container.blob()[start..end], vec![0xAAu8; 256].as_slice());
    }

    #[test]
    fn missing_entry_lookup_returns_none() {
        let container = ZipContainer::build_stored(vec![("a".to_string(), vec![1, 2, 3])]);
        assert!(container.entry_by_name("missing").is_none());
    }
}
