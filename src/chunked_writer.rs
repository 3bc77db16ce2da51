//! [`ChunkedWriter`]: a write-side adapter turning arbitrarily sized writes
//! into fixed-size chunk deliveries, with a declared total length enforced
//! along the way.

use crate::error::{Error, Result};

/// Converts a stream of writes into fixed-size chunks handed to a consumer
/// closure, with a smaller final chunk for the tail.
///
/// Used by [`crate::connection::usb::UsbFastbootSession`] to stage a single
/// fastboot `download` payload into fixed-size USB bulk writes without
/// buffering the whole payload in memory.
pub struct ChunkedWriter<F>
where
    F: FnMut(&[u8]) -> Result<()>,
{
    chunk_size: usize,
    consumer: F,
    stream_length: u64,
    buffer: Vec<u8>,
    delivered: u64,
}

impl<F> ChunkedWriter<F>
where
    F: FnMut(&[u8]) -> Result<()>,
{
    /// Build a writer that delivers `chunk_size`-byte chunks to `consumer`,
    /// for a stream declared to be exactly `stream_length` bytes long.
    /// `chunk_size` must be non-zero.
    pub fn new(chunk_size: usize, consumer: F, stream_length: u64) -> Self {
        assert!(chunk_size > 0, "chunk_size must be non-zero");
        Self {
            chunk_size,
            consumer,
            stream_length,
            buffer: Vec::with_capacity(chunk_size),
            delivered: 0,
        }
    }

    /// Confirm the caller's view of the total write size against the
    /// declared `stream_length`. Must be called with `size == stream_length`
    /// or this fails with [`Error::SizeMismatch`].
    pub fn init(&mut self, size: u64) -> Result<()> {
        if size != self.stream_length {
            Err(Error::SizeMismatch)
        } else {
            Ok(())
        }
    }

    /// Total bytes handed to the consumer so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Accept `data`, coalescing into `chunk_size`-byte deliveries.
    ///
    /// Writes aligned to the chunk size that land on an empty internal
    /// buffer bypass it entirely and are forwarded straight to the consumer.
    pub fn write(&mut self, mut data: &[u8]) -> Result<()> {
        let stream_length = self.stream_length;

        let observed = self.delivered + self.buffer.len() as u64 + data.len() as u64;
        if observed > stream_length {
            return Err(Error::StreamOverflow);
        }

        // Fast path: buffer empty and data is a whole multiple of chunk_size
        // larger than one chunk — forward full chunks with no copy.
        if self.buffer.is_empty() {
            while data.len() >= self.chunk_size {
                let (chunk, rest) = data.split_at(self.chunk_size);
                (self.consumer)(chunk)?;
                self.delivered += chunk.len() as u64;
                data = rest;
            }
        }

        let mut remaining = data;
        while !remaining.is_empty() {
            let space = self.chunk_size - self.buffer.len();
            let take = space.min(remaining.len());
            self.buffer.extend_from_slice(&remaining[..take]);
            remaining = &remaining[take..];

            if self.buffer.len() == self.chunk_size {
                (self.consumer)(&self.buffer)?;
                self.delivered += self.buffer.len() as u64;
                self.buffer.clear();
            }
        }

        if self.delivered + self.buffer.len() as u64 == stream_length && !self.buffer.is_empty() {
            (self.consumer)(&self.buffer)?;
            self.delivered += self.buffer.len() as u64;
            self.buffer.clear();
        }

        Ok(())
    }

    /// Flush any buffered tail and return the total number of bytes handed
    /// to the consumer.
    pub fn finish(mut self) -> Result<u64> {
        if !self.buffer.is_empty() {
            (self.consumer)(&self.buffer)?;
            self.delivered += self.buffer.len() as u64;
            self.buffer.clear();
        }

        Ok(self.delivered)
    }
}
