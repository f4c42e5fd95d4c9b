//! Fixed-capacity receive ring buffer.
//!
//! Accumulates partially received frames between socket reads. Capacity never
//! grows: a write that does not fit is an overflow error, never a silent
//! drop or overwrite.

use crate::error::{Result, TransportError};
use bytes::{Bytes, BytesMut};
use std::io::{self, Read};

/// Capacity used when zero is requested
pub const DEFAULT_RING_CAPACITY: usize = datalink_config::defaults::link::RECEIVE_BUFFER_SIZE;

/// Smallest ring that still holds a frame header
pub const MIN_RING_CAPACITY: usize = 64;

pub struct RingBuffer {
    storage: Box<[u8]>,
    head: usize,
    len: usize,
}

impl RingBuffer {
    /// Create a ring of `capacity` bytes (`0` selects the default)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = match capacity {
            0 => DEFAULT_RING_CAPACITY,
            n => n.max(MIN_RING_CAPACITY),
        };
        Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Free bytes
    pub fn free(&self) -> usize {
        self.capacity() - self.len
    }

    /// Append `data`, failing without side effects if it does not fit
    pub fn push(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > self.free() {
            return Err(TransportError::buffer_overflow(
                self.len + data.len(),
                self.capacity(),
            ));
        }

        let mut written = 0;
        while written < data.len() {
            let region = self.write_region();
            let n = region.len().min(data.len() - written);
            region[..n].copy_from_slice(&data[written..written + n]);
            self.len += n;
            written += n;
        }
        Ok(())
    }

    /// Read once from `reader` into the free space
    ///
    /// Returns what the single `read` call returned, so `Ok(0)` means end of
    /// stream. Must not be called on a full ring.
    pub fn fill_from<R: Read>(&mut self, reader: &mut R) -> io::Result<usize> {
        debug_assert!(!self.is_full(), "fill_from on a full ring");
        let region = self.write_region();
        let n = reader.read(region)?;
        self.len += n;
        Ok(n)
    }

    /// Copy the first `out.len()` buffered bytes without consuming them
    ///
    /// Returns how many bytes were copied.
    pub fn peek_into(&self, out: &mut [u8]) -> usize {
        let (first, second) = self.as_slices();
        let n = out.len().min(self.len);
        let from_first = n.min(first.len());
        out[..from_first].copy_from_slice(&first[..from_first]);
        out[from_first..n].copy_from_slice(&second[..n - from_first]);
        n
    }

    /// Discard the first `n` buffered bytes
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.len);
        self.head = (self.head + n) % self.capacity();
        self.len -= n;
        if self.len == 0 {
            self.head = 0;
        }
    }

    /// Remove and return the first `n` buffered bytes
    pub fn take(&mut self, n: usize) -> Bytes {
        let n = n.min(self.len);
        let (first, second) = self.as_slices();
        let mut out = BytesMut::with_capacity(n);
        let from_first = n.min(first.len());
        out.extend_from_slice(&first[..from_first]);
        out.extend_from_slice(&second[..n - from_first]);
        self.consume(n);
        out.freeze()
    }

    /// Remove and return everything buffered
    pub fn take_all(&mut self) -> Bytes {
        self.take(self.len)
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Buffered bytes in order, split at the wrap point
    pub fn as_slices(&self) -> (&[u8], &[u8]) {
        let cap = self.capacity();
        if self.head + self.len <= cap {
            (&self.storage[self.head..self.head + self.len], &[])
        } else {
            let wrapped = self.head + self.len - cap;
            (&self.storage[self.head..], &self.storage[..wrapped])
        }
    }

    /// Largest contiguous free region after the buffered data
    fn write_region(&mut self) -> &mut [u8] {
        if self.len == 0 {
            self.head = 0;
        }
        let cap = self.capacity();
        let tail = (self.head + self.len) % cap;
        if self.len == cap {
            &mut self.storage[tail..tail]
        } else if tail >= self.head {
            &mut self.storage[tail..]
        } else {
            &mut self.storage[tail..self.head]
        }
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("len", &self.len)
            .field("head", &self.head)
            .finish()
    }
}
