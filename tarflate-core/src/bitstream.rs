//! Bit-level I/O for resumable codecs.
//!
//! Neither side owns a stream. [`BitReader`] is an accumulator that pulls
//! bytes from whatever input slice the current call was given, one byte at a
//! time and only when the caller asks for more bits than it holds. So a
//! decoder never swallows bytes that belong to a following container
//! trailer. [`BitWriter`] packs bits into an internal queue that the encoder
//! drains into caller buffers as room appears.
//!
//! # Bit Ordering
//!
//! DEFLATE uses LSB-first ordering within bytes: bits are packed starting
//! from the least significant bit of each byte.
//!
//! # Example
//!
//! ```
//! use tarflate_core::bitstream::{BitReader, BitWriter};
//!
//! let mut writer = BitWriter::new();
//! writer.write_bits(0b101, 3);
//! writer.write_bits(0b1100, 4);
//! writer.align_to_byte();
//!
//! let mut encoded = [0u8; 4];
//! let n = writer.drain_into(&mut encoded);
//! assert_eq!(n, 1);
//!
//! let mut input = &encoded[..n];
//! let mut reader = BitReader::new();
//! assert_eq!(reader.try_read_bits(3, &mut input), Some(0b101));
//! assert_eq!(reader.try_read_bits(4, &mut input), Some(0b1100));
//! ```

/// Bit accumulator fed from caller-supplied input slices.
///
/// The accumulator survives between calls, so a codec can stop in the
/// middle of a multi-bit field when input runs dry and pick up exactly where
/// it left off.
#[derive(Debug, Clone, Default)]
pub struct BitReader {
    /// Bit buffer (LSB-first).
    buffer: u64,
    /// Number of valid bits in buffer.
    bits_in_buffer: u32,
    /// Total bytes pulled from input so far.
    bytes_pulled: u64,
}

impl BitReader {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bits currently held.
    #[inline]
    pub fn available(&self) -> u32 {
        self.bits_in_buffer
    }

    /// Total bytes pulled from input (for error offsets).
    pub fn bytes_pulled(&self) -> u64 {
        self.bytes_pulled
    }

    /// Pull one byte from `input` into the accumulator.
    ///
    /// Returns `false` when `input` is empty.
    #[inline]
    pub fn pull_byte(&mut self, input: &mut &[u8]) -> bool {
        debug_assert!(self.bits_in_buffer <= 56);
        match input.split_first() {
            Some((&byte, rest)) => {
                self.buffer |= (byte as u64) << self.bits_in_buffer;
                self.bits_in_buffer += 8;
                self.bytes_pulled += 1;
                *input = rest;
                true
            }
            None => false,
        }
    }

    /// Make sure at least `count` bits are held, pulling from `input`.
    ///
    /// Returns `false` if `input` ran out first; whatever was pulled stays in
    /// the accumulator.
    #[inline]
    pub fn ensure(&mut self, count: u32, input: &mut &[u8]) -> bool {
        debug_assert!(count <= 32);
        while self.bits_in_buffer < count {
            if !self.pull_byte(input) {
                return false;
            }
        }
        true
    }

    /// Look at the held bits without consuming them. Bits beyond
    /// [`available`](Self::available) read as zero.
    #[inline]
    pub fn peek(&self) -> u64 {
        self.buffer
    }

    /// Drop `count` held bits.
    #[inline]
    pub fn consume(&mut self, count: u32) {
        debug_assert!(count <= self.bits_in_buffer);
        self.buffer >>= count;
        self.bits_in_buffer -= count;
    }

    /// Read `count` bits (up to 32), first bit in the LSB position.
    ///
    /// Returns `None`, consuming nothing, if not enough input is available.
    #[inline]
    pub fn try_read_bits(&mut self, count: u32, input: &mut &[u8]) -> Option<u32> {
        if !self.ensure(count, input) {
            return None;
        }
        let value = (self.buffer & ((1u64 << count) - 1)) as u32;
        self.consume(count);
        Some(value)
    }

    /// Discard bits up to the next byte boundary.
    pub fn align_to_byte(&mut self) {
        let extra = self.bits_in_buffer % 8;
        self.consume(extra);
    }

    /// Take one whole byte that is already held, after alignment.
    ///
    /// Used when switching from bit-level to byte-level reading (stored
    /// blocks). Returns `None` if no full byte is held.
    pub fn take_held_byte(&mut self) -> Option<u8> {
        if self.bits_in_buffer >= 8 && self.bits_in_buffer % 8 == 0 {
            let byte = (self.buffer & 0xFF) as u8;
            self.consume(8);
            Some(byte)
        } else {
            None
        }
    }

    /// Reset to the empty state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Bit packer with an internal output queue.
///
/// Completed bytes accumulate in the queue until [`drain_into`] moves them to
/// a caller buffer. At most 7 bits stay in the accumulator between writes.
///
/// [`drain_into`]: BitWriter::drain_into
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    /// Completed bytes not yet handed out.
    queue: Vec<u8>,
    /// Read position within `queue`.
    drained: usize,
    /// Bit buffer (LSB-first).
    buffer: u64,
    /// Number of valid bits in buffer.
    bits_in_buffer: u32,
    /// Total bits written.
    total_bits: u64,
}

impl BitWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write up to 32 bits, first bit taken from the LSB of `value`.
    #[inline]
    pub fn write_bits(&mut self, value: u32, count: u32) {
        debug_assert!(count <= 32);
        if count == 0 {
            return;
        }
        let mask = (1u64 << count) - 1;
        self.buffer |= (value as u64 & mask) << self.bits_in_buffer;
        self.bits_in_buffer += count;
        self.total_bits += count as u64;

        while self.bits_in_buffer >= 8 {
            self.queue.push(self.buffer as u8);
            self.buffer >>= 8;
            self.bits_in_buffer -= 8;
        }
    }

    /// Pad with zero bits up to the next byte boundary.
    pub fn align_to_byte(&mut self) {
        let pad = (8 - self.bits_in_buffer % 8) % 8;
        self.write_bits(0, pad);
    }

    /// Whether the writer sits on a byte boundary.
    pub fn is_aligned(&self) -> bool {
        self.bits_in_buffer == 0
    }

    /// Append raw bytes. The writer must be byte aligned.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        debug_assert!(self.is_aligned());
        self.queue.extend_from_slice(bytes);
        self.total_bits += 8 * bytes.len() as u64;
    }

    /// Total bits written since creation or the last reset.
    pub fn bits_written(&self) -> u64 {
        self.total_bits
    }

    /// Number of completed bytes waiting to be drained.
    pub fn pending(&self) -> usize {
        self.queue.len() - self.drained
    }

    /// Move as many completed bytes as fit into `out`. Returns the count.
    pub fn drain_into(&mut self, out: &mut [u8]) -> usize {
        let pending = &self.queue[self.drained..];
        let n = pending.len().min(out.len());
        out[..n].copy_from_slice(&pending[..n]);
        self.drained += n;
        if self.drained == self.queue.len() {
            self.queue.clear();
            self.drained = 0;
        }
        n
    }

    /// Reset to the empty state, keeping the queue allocation.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.drained = 0;
        self.buffer = 0;
        self.bits_in_buffer = 0;
        self.total_bits = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_across_calls() {
        let data = [0b1010_1100u8, 0b0000_0011];
        let mut reader = BitReader::new();

        // Only the first byte is offered.
        let mut first = &data[..1];
        assert_eq!(reader.try_read_bits(4, &mut first), Some(0b1100));
        assert_eq!(reader.try_read_bits(6, &mut first), None);
        assert_eq!(reader.available(), 4);

        let mut second = &data[1..];
        assert_eq!(reader.try_read_bits(6, &mut second), Some(0b11_1010));
        assert!(second.is_empty());
        assert_eq!(reader.bytes_pulled(), 2);
    }

    #[test]
    fn test_pulls_lazily() {
        let data = [0xFFu8, 0x12, 0x34];
        let mut input = &data[..];
        let mut reader = BitReader::new();
        assert_eq!(reader.try_read_bits(3, &mut input), Some(0b111));
        // Only one byte taken for three bits.
        assert_eq!(input.len(), 2);

        reader.align_to_byte();
        assert_eq!(reader.available(), 0);
        assert_eq!(reader.try_read_bits(8, &mut input), Some(0x12));
    }

    #[test]
    fn test_take_held_byte() {
        let data = [0xABu8, 0xCD];
        let mut input = &data[..];
        let mut reader = BitReader::new();
        assert!(reader.ensure(16, &mut input));
        assert_eq!(reader.take_held_byte(), Some(0xAB));
        assert_eq!(reader.take_held_byte(), Some(0xCD));
        assert_eq!(reader.take_held_byte(), None);
    }

    #[test]
    fn test_writer_drain_in_pieces() {
        let mut writer = BitWriter::new();
        writer.write_bits(0xBEEF, 16);
        writer.write_bits(0b1, 1);
        assert_eq!(writer.pending(), 2);
        writer.align_to_byte();
        assert_eq!(writer.pending(), 3);

        let mut a = [0u8; 1];
        let mut b = [0u8; 8];
        assert_eq!(writer.drain_into(&mut a), 1);
        assert_eq!(writer.drain_into(&mut b), 2);
        assert_eq!(a, [0xEF]);
        assert_eq!(&b[..2], &[0xBE, 0x01]);
        assert_eq!(writer.pending(), 0);
        assert_eq!(writer.bits_written(), 24);
    }

    #[test]
    fn test_write_bytes_after_align() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b11, 2);
        writer.align_to_byte();
        writer.write_bytes(&[1, 2, 3]);
        let mut out = [0u8; 4];
        assert_eq!(writer.drain_into(&mut out), 4);
        assert_eq!(out, [0b11, 1, 2, 3]);
    }
}
