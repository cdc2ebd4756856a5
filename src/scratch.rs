/// The event loop's reusable read/write scratch buffer.
///
/// One `ScratchBuffer` is lazily allocated per [`EventLoop`](crate::EventLoop)
/// and reused across every `recv`/`send` call made on that loop's thread
/// (§5: "Shared read scratch buffer per loop ... used only inside
/// read/write handlers on that loop"). It follows the rewind/limit/flip
/// vocabulary of the original `ProtoBuffer` collaborator: `rewind` resets
/// the buffer for a fresh read, `limit` marks how much of it is valid after
/// a `recv`, and `flip`/`clear` prepare it for a write-side `get`.
#[derive(Debug)]
pub struct ScratchBuffer {
    buf: Vec<u8>,
    // Bytes [0, limit) are valid; `pos` is the read cursor into that range.
    pos: usize,
    limit: usize,
}

impl ScratchBuffer {
    pub fn with_capacity(capacity: usize) -> ScratchBuffer {
        ScratchBuffer {
            buf: vec![0u8; capacity],
            pos: 0,
            limit: 0,
        }
    }

    /// Resets the buffer to its full capacity, ready to receive a `recv()`.
    pub fn rewind(&mut self) {
        self.pos = 0;
        self.limit = self.buf.len();
    }

    /// Empties the buffer entirely (used before a write-side `get`, which
    /// appends via [`ScratchBuffer::put_slice`] rather than `recv`).
    pub fn clear(&mut self) {
        self.pos = 0;
        self.limit = 0;
    }

    /// Marks the first `n` bytes of the buffer as valid, e.g. after `recv`
    /// returned `n`.
    pub fn limit(&mut self, n: usize) {
        debug_assert!(n <= self.buf.len());
        self.limit = n;
        self.pos = 0;
    }

    /// Rewinds the read cursor to the start of the valid region, preparing
    /// the buffer to be drained (used after filling it via `put_slice`).
    pub fn flip(&mut self) {
        self.pos = 0;
    }

    /// The number of unread bytes remaining in the valid region.
    pub fn remaining(&self) -> usize {
        self.limit - self.pos
    }

    /// How many more bytes can be appended via `put_slice` before the
    /// underlying allocation is exhausted.
    pub fn remaining_capacity(&self) -> usize {
        self.buf.len() - self.limit
    }

    /// The unread bytes, as a slice.
    pub fn bytes(&self) -> &[u8] {
        &self.buf[self.pos..self.limit]
    }

    /// The whole backing allocation, as a mutable slice — used as the
    /// destination buffer for `recv`.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// Appends `data` starting at the current limit, growing the
    /// allocation if needed. Used by [`ByteStream::get`](crate::byte_stream::ByteStream::get).
    pub fn put_slice(&mut self, data: &[u8]) {
        let end = self.limit + data.len();
        if end > self.buf.len() {
            self.buf.resize(end, 0);
        }
        self.buf[self.limit..end].copy_from_slice(data);
        self.limit = end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewind_exposes_full_capacity_for_recv() {
        let mut buf = ScratchBuffer::with_capacity(16);
        buf.rewind();
        assert_eq!(buf.as_mut_slice().len(), 16);
    }

    #[test]
    fn limit_then_bytes_exposes_only_valid_region() {
        let mut buf = ScratchBuffer::with_capacity(16);
        buf.rewind();
        buf.as_mut_slice()[..4].copy_from_slice(b"ping");
        buf.limit(4);
        assert_eq!(buf.bytes(), b"ping");
    }

    #[test]
    fn put_slice_grows_buffer_past_initial_capacity() {
        let mut buf = ScratchBuffer::with_capacity(2);
        buf.clear();
        buf.put_slice(b"hello world");
        buf.flip();
        assert_eq!(buf.bytes(), b"hello world");
    }
}
