//! Buffer views, buffer sequences and the growable sink.
//!
//! Codecs only ever see one contiguous input chunk and one contiguous output
//! chunk per step. The traits here let the transform engine walk single
//! slices, fragmented sequences and a growable [`DynamicBuffer`] the same way.
//!
//! ```
//! use tarflate_core::buffer::{InputBuffers, MutableBufferSeq, OutputBuffers};
//!
//! let mut a = [0u8; 2];
//! let mut b = [0u8; 3];
//! let mut seq = MutableBufferSeq::new([&mut a[..], &mut b[..]]);
//! assert_eq!(seq.remaining_mut(), 5);
//! seq.chunk_mut()[..2].copy_from_slice(b"hi");
//! seq.advance(2);
//! assert_eq!(seq.chunk_mut().len(), 3);
//!
//! let mut input: &[u8] = b"abc";
//! input.consume(1);
//! assert_eq!(input.chunk(), b"bc");
//! ```

/// A source of read-only bytes, possibly fragmented.
pub trait InputBuffers {
    /// The current contiguous fragment. Empty only when nothing remains.
    fn chunk(&self) -> &[u8];

    /// Mark `count` bytes of the current fragment as consumed.
    fn consume(&mut self, count: usize);

    /// Total bytes left across all fragments.
    fn remaining(&self) -> usize;
}

/// A destination of mutable bytes, possibly fragmented or growable.
pub trait OutputBuffers {
    /// The current contiguous fragment of writable space. Empty only when
    /// no room is left.
    fn chunk_mut(&mut self) -> &mut [u8];

    /// Mark `count` bytes of the current fragment as written.
    fn advance(&mut self, count: usize);

    /// Total writable bytes left across all fragments.
    fn remaining_mut(&self) -> usize;
}

impl InputBuffers for &[u8] {
    fn chunk(&self) -> &[u8] {
        self
    }

    fn consume(&mut self, count: usize) {
        *self = &self[count..];
    }

    fn remaining(&self) -> usize {
        self.len()
    }
}

impl OutputBuffers for &mut [u8] {
    fn chunk_mut(&mut self) -> &mut [u8] {
        self
    }

    fn advance(&mut self, count: usize) {
        let buf = std::mem::take(self);
        *self = &mut buf[count..];
    }

    fn remaining_mut(&self) -> usize {
        self.len()
    }
}

/// An ordered list of read-only views treated as one logical region.
#[derive(Debug, Clone, Default)]
pub struct ConstBufferSeq<'a> {
    parts: Vec<&'a [u8]>,
    /// Index of the current fragment.
    index: usize,
    /// Offset within the current fragment.
    offset: usize,
    remaining: usize,
}

impl<'a> ConstBufferSeq<'a> {
    /// Build a sequence from fragments. Empty fragments are skipped.
    pub fn new(parts: impl IntoIterator<Item = &'a [u8]>) -> Self {
        let parts: Vec<&'a [u8]> = parts.into_iter().filter(|p| !p.is_empty()).collect();
        let remaining = parts.iter().map(|p| p.len()).sum();
        Self {
            parts,
            index: 0,
            offset: 0,
            remaining,
        }
    }

    /// Split `data` into fragments of at most `size` bytes.
    pub fn chunked(data: &'a [u8], size: usize) -> Self {
        Self::new(data.chunks(size.max(1)))
    }
}

impl InputBuffers for ConstBufferSeq<'_> {
    fn chunk(&self) -> &[u8] {
        match self.parts.get(self.index) {
            Some(part) => &part[self.offset..],
            None => &[],
        }
    }

    fn consume(&mut self, count: usize) {
        let mut count = count;
        debug_assert!(count <= self.remaining);
        self.remaining -= count;
        while count > 0 {
            let left = self.parts[self.index].len() - self.offset;
            if count < left {
                self.offset += count;
                return;
            }
            count -= left;
            self.index += 1;
            self.offset = 0;
        }
    }

    fn remaining(&self) -> usize {
        self.remaining
    }
}

/// An ordered list of mutable views treated as one logical region.
#[derive(Debug, Default)]
pub struct MutableBufferSeq<'a> {
    parts: Vec<&'a mut [u8]>,
    index: usize,
    offset: usize,
    remaining: usize,
    written: usize,
}

impl<'a> MutableBufferSeq<'a> {
    /// Build a sequence from fragments. Empty fragments are skipped.
    pub fn new(parts: impl IntoIterator<Item = &'a mut [u8]>) -> Self {
        let parts: Vec<&'a mut [u8]> = parts.into_iter().filter(|p| !p.is_empty()).collect();
        let remaining = parts.iter().map(|p| p.len()).sum();
        Self {
            parts,
            index: 0,
            offset: 0,
            remaining,
            written: 0,
        }
    }

    /// Total bytes written into the sequence so far.
    pub fn written(&self) -> usize {
        self.written
    }
}

impl OutputBuffers for MutableBufferSeq<'_> {
    fn chunk_mut(&mut self) -> &mut [u8] {
        let offset = self.offset;
        match self.parts.get_mut(self.index) {
            Some(part) => &mut part[offset..],
            None => &mut [],
        }
    }

    fn advance(&mut self, count: usize) {
        let mut count = count;
        debug_assert!(count <= self.remaining);
        self.remaining -= count;
        self.written += count;
        while count > 0 {
            let left = self.parts[self.index].len() - self.offset;
            if count < left {
                self.offset += count;
                return;
            }
            count -= left;
            self.index += 1;
            self.offset = 0;
        }
    }

    fn remaining_mut(&self) -> usize {
        self.remaining
    }
}

/// Minimum scratch space exposed by [`DynamicBuffer`] per step.
const MIN_PREPARE: usize = 4096;

/// A growable sink separating committed output from uncommitted scratch.
///
/// Codecs write into the scratch area returned by [`prepare`], then
/// [`commit`] the bytes they produced. Committed bytes are never discarded
/// except by [`reset`].
///
/// [`prepare`]: DynamicBuffer::prepare
/// [`commit`]: DynamicBuffer::commit
/// [`reset`]: DynamicBuffer::reset
#[derive(Debug, Clone)]
pub struct DynamicBuffer {
    storage: Vec<u8>,
    committed: usize,
    max_size: usize,
}

impl DynamicBuffer {
    /// Create an empty, unbounded sink.
    pub fn new() -> Self {
        Self::with_max_size(usize::MAX)
    }

    /// Create a sink that never grows past `max_size` committed bytes.
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            storage: Vec::new(),
            committed: 0,
            max_size,
        }
    }

    /// The committed bytes.
    pub fn data(&self) -> &[u8] {
        &self.storage[..self.committed]
    }

    /// Number of committed bytes.
    pub fn len(&self) -> usize {
        self.committed
    }

    /// Whether nothing has been committed.
    pub fn is_empty(&self) -> bool {
        self.committed == 0
    }

    /// Size of the scratch area beyond the committed bytes.
    pub fn uncommitted_len(&self) -> usize {
        self.storage.len() - self.committed
    }

    /// Expose `count` bytes of scratch after the committed region, growing
    /// as needed (capped by the maximum size).
    pub fn prepare(&mut self, count: usize) -> &mut [u8] {
        let count = count.min(self.max_size - self.committed);
        let end = self.committed + count;
        if self.storage.len() < end {
            self.storage.resize(end, 0);
        }
        &mut self.storage[self.committed..end]
    }

    /// Move `count` scratch bytes into the committed region.
    pub fn commit(&mut self, count: usize) {
        self.committed += count.min(self.uncommitted_len());
    }

    /// Drop the scratch area.
    pub fn shrink_uncommitted(&mut self) {
        self.storage.truncate(self.committed);
        self.storage.shrink_to_fit();
    }

    /// Discard everything, including committed bytes.
    pub fn reset(&mut self) {
        self.storage.clear();
        self.committed = 0;
    }

    /// Take the committed bytes.
    pub fn into_vec(mut self) -> Vec<u8> {
        self.storage.truncate(self.committed);
        self.storage
    }
}

impl Default for DynamicBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputBuffers for DynamicBuffer {
    fn chunk_mut(&mut self) -> &mut [u8] {
        // Grow geometrically once the scratch area is used up.
        let want = self.uncommitted_len().max(MIN_PREPARE.max(self.committed / 2));
        self.prepare(want)
    }

    fn advance(&mut self, count: usize) {
        self.commit(count);
    }

    fn remaining_mut(&self) -> usize {
        self.max_size - self.committed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_const_seq_walks_fragments() {
        let mut seq = ConstBufferSeq::new([&b"ab"[..], b"", b"cde"]);
        assert_eq!(seq.remaining(), 5);
        assert_eq!(seq.chunk(), b"ab");
        seq.consume(2);
        assert_eq!(seq.chunk(), b"cde");
        seq.consume(1);
        assert_eq!(seq.chunk(), b"de");
        seq.consume(2);
        assert_eq!(seq.remaining(), 0);
        assert!(seq.chunk().is_empty());
    }

    #[test]
    fn test_const_seq_chunked() {
        let data = [7u8; 25];
        let seq = ConstBufferSeq::chunked(&data, 10);
        assert_eq!(seq.remaining(), 25);
        assert_eq!(seq.chunk().len(), 10);
    }

    #[test]
    fn test_mutable_seq_advance_across_fragments() {
        let mut a = [0u8; 3];
        let mut b = [0u8; 3];
        {
            let mut seq = MutableBufferSeq::new([&mut a[..], &mut b[..]]);
            seq.chunk_mut().copy_from_slice(b"xyz");
            seq.advance(3);
            seq.chunk_mut()[0] = b'!';
            seq.advance(1);
            assert_eq!(seq.written(), 4);
            assert_eq!(seq.remaining_mut(), 2);
        }
        assert_eq!(&a, b"xyz");
        assert_eq!(b[0], b'!');
    }

    #[test]
    fn test_slice_output_advance() {
        let mut storage = [0u8; 4];
        let mut out = &mut storage[..];
        out.chunk_mut()[0] = 1;
        out.advance(1);
        assert_eq!(out.remaining_mut(), 3);
    }

    #[test]
    fn test_dynamic_commit_and_shrink() {
        let mut sink = DynamicBuffer::new();
        sink.prepare(8)[..3].copy_from_slice(b"abc");
        sink.commit(3);
        assert_eq!(sink.data(), b"abc");
        assert_eq!(sink.uncommitted_len(), 5);

        sink.shrink_uncommitted();
        assert_eq!(sink.uncommitted_len(), 0);
        assert_eq!(sink.data(), b"abc");

        // Commit never exceeds the scratch that exists.
        sink.commit(10);
        assert_eq!(sink.len(), 3);

        sink.reset();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_dynamic_as_output_grows() {
        let mut sink = DynamicBuffer::new();
        let first = sink.chunk_mut().len();
        assert!(first >= MIN_PREPARE);
        sink.advance(first);
        assert!(!sink.chunk_mut().is_empty());
        assert_eq!(sink.len(), first);
    }

    #[test]
    fn test_dynamic_max_size() {
        let mut sink = DynamicBuffer::with_max_size(10);
        assert_eq!(sink.chunk_mut().len(), 10);
        sink.advance(10);
        assert!(sink.chunk_mut().is_empty());
        assert_eq!(sink.remaining_mut(), 0);
    }
}
