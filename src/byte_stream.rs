use std::collections::VecDeque;

use crate::scratch::ScratchBuffer;

/// The outbound byte-stream container a [`Connection`](crate::Connection)
/// writes queued bytes into and the write path drains from.
///
/// This is one of the collaborators `spec.md` §1 calls out as external to the
/// reactor core ("the byte-stream container that holds outbound data"); it is
/// given a minimal concrete implementation here so the crate is self
/// contained and testable end to end. It does no I/O itself — it is a plain
/// growable byte queue.
#[derive(Debug, Default)]
pub struct ByteStream {
    buf: VecDeque<u8>,
}

impl ByteStream {
    pub fn new() -> ByteStream {
        ByteStream {
            buf: VecDeque::new(),
        }
    }

    /// Appends `bytes` to the end of the stream.
    pub fn append(&mut self, bytes: &[u8]) {
        self.buf.extend(bytes.iter().copied());
    }

    /// Copies as many queued bytes as fit into `scratch` (starting at its
    /// current write position), without consuming them. Callers follow this
    /// with [`ByteStream::discard`] once the bytes have actually been sent.
    pub fn get(&self, scratch: &mut ScratchBuffer) {
        let cap = scratch.remaining_capacity();
        let n = cap.min(self.buf.len());
        let (a, b) = self.buf.as_slices();
        if n <= a.len() {
            scratch.put_slice(&a[..n]);
        } else {
            scratch.put_slice(a);
            scratch.put_slice(&b[..n - a.len()]);
        }
    }

    /// Drops the first `n` bytes, e.g. after a successful partial `send`.
    pub fn discard(&mut self, n: usize) {
        let n = n.min(self.buf.len());
        self.buf.drain(..n);
    }

    pub fn has_data(&self) -> bool {
        !self.buf.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Drops all queued bytes.
    pub fn clean(&mut self) {
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_get_discard_round_trips_bytes() {
        let mut stream = ByteStream::new();
        stream.append(b"hello, ");
        stream.append(b"world");
        assert_eq!(stream.len(), 12);

        let mut scratch = ScratchBuffer::with_capacity(64);
        stream.get(&mut scratch);
        scratch.flip();
        assert_eq!(scratch.bytes(), b"hello, world");

        stream.discard(7);
        assert_eq!(stream.len(), 5);
        let mut scratch = ScratchBuffer::with_capacity(64);
        stream.get(&mut scratch);
        scratch.flip();
        assert_eq!(scratch.bytes(), b"world");
    }

    #[test]
    fn clean_drops_all_data() {
        let mut stream = ByteStream::new();
        stream.append(b"abc");
        stream.clean();
        assert!(!stream.has_data());
    }

    #[test]
    fn get_respects_scratch_capacity_and_ring_wrap() {
        let mut stream = ByteStream::new();
        stream.append(b"0123456789");
        // discard enough from the front to force the VecDeque's internal
        // ring buffer to wrap, then append more: `as_slices()` now returns
        // two discontiguous chunks.
        stream.discard(8);
        stream.append(b"ABCDEFGH");

        let mut scratch = ScratchBuffer::with_capacity(4);
        stream.get(&mut scratch);
        scratch.flip();
        assert_eq!(scratch.bytes(), b"89AB");
    }
}
