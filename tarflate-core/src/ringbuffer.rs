//! Ring buffer (sliding window) holding decoder history.
//!
//! Back-references may point into bytes already handed to the caller, which
//! the codec no longer owns. The ring buffer keeps its own copy of the most
//! recent `capacity` bytes so copies work no matter where the caller put the
//! output.

/// Window size for DEFLATE (32 KiB).
pub const DEFLATE_WINDOW: usize = 32768;

/// A circular buffer of the most recently produced bytes.
///
/// Copies are bounded by the caller's output, so a long match that does not
/// fit can be resumed later from the same distance.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    /// The underlying buffer.
    buffer: Vec<u8>,
    /// Current write position (next byte will be written here).
    position: usize,
    /// Number of valid history bytes (up to capacity).
    size: usize,
    /// Mask for efficient modulo (capacity - 1).
    mask: usize,
}

impl RingBuffer {
    /// Create a new ring buffer with the specified capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is not a power of 2.
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two(),
            "Capacity must be a power of 2, got {}",
            capacity
        );

        Self {
            buffer: vec![0; capacity],
            position: 0,
            size: 0,
            mask: capacity - 1,
        }
    }

    /// Create a ring buffer sized for DEFLATE (32 KiB).
    pub fn deflate() -> Self {
        Self::new(DEFLATE_WINDOW)
    }

    /// Get the capacity of the buffer.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Get the number of history bytes currently held.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Forget all history.
    pub fn clear(&mut self) {
        self.position = 0;
        self.size = 0;
    }

    /// Whether `distance` points at a byte that is still held.
    #[inline]
    pub fn contains_distance(&self, distance: usize) -> bool {
        distance != 0 && distance <= self.size
    }

    /// Append a single byte.
    #[inline]
    pub fn write_byte(&mut self, byte: u8) {
        self.buffer[self.position] = byte;
        self.position = (self.position + 1) & self.mask;
        if self.size < self.buffer.len() {
            self.size += 1;
        }
    }

    /// Append a run of bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        let capacity = self.buffer.len();
        // Only the tail can survive.
        let bytes = &bytes[bytes.len().saturating_sub(capacity)..];

        let first = bytes.len().min(capacity - self.position);
        self.buffer[self.position..self.position + first].copy_from_slice(&bytes[..first]);
        let rest = &bytes[first..];
        self.buffer[..rest.len()].copy_from_slice(rest);

        self.position = (self.position + bytes.len()) & self.mask;
        self.size = (self.size + bytes.len()).min(capacity);
    }

    /// Copy up to `length` bytes from `distance` back into both the history
    /// and `output`, stopping early when `output` is full.
    ///
    /// Overlapping copies (`length > distance`) repeat the pattern, as LZ77
    /// requires. Returns the number of bytes copied; the caller keeps the
    /// remainder of the match and calls again with fresh output.
    pub fn copy_from_history(&mut self, distance: usize, length: usize, output: &mut [u8]) -> usize {
        debug_assert!(self.contains_distance(distance));

        let count = length.min(output.len());
        let mut src_pos = self.position.wrapping_sub(distance) & self.mask;

        for slot in &mut output[..count] {
            let byte = self.buffer[src_pos];
            *slot = byte;
            self.buffer[self.position] = byte;
            self.position = (self.position + 1) & self.mask;
            src_pos = (src_pos + 1) & self.mask;
        }

        self.size = (self.size + count).min(self.buffer.len());
        count
    }

    /// Get the last N bytes written.
    pub fn last_bytes(&self, count: usize) -> Vec<u8> {
        let count = count.min(self.size);
        (0..count)
            .map(|i| self.buffer[self.position.wrapping_sub(count - i) & self.mask])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_last_bytes() {
        let mut ring = RingBuffer::new(8);
        ring.write_bytes(b"abc");
        ring.write_byte(b'd');
        assert_eq!(ring.len(), 4);
        assert_eq!(ring.last_bytes(3), b"bcd");
    }

    #[test]
    fn test_wraparound() {
        let mut ring = RingBuffer::new(8);
        ring.write_bytes(b"0123456789AB");
        assert_eq!(ring.len(), 8);
        assert_eq!(ring.last_bytes(8), b"456789AB");
        assert!(!ring.contains_distance(9));
        assert!(ring.contains_distance(8));
    }

    #[test]
    fn test_overlapping_copy() {
        let mut ring = RingBuffer::new(16);
        ring.write_bytes(b"ab");
        let mut out = [0u8; 6];
        assert_eq!(ring.copy_from_history(2, 6, &mut out), 6);
        assert_eq!(&out, b"ababab");
        assert_eq!(ring.last_bytes(8), b"abababab");
    }

    #[test]
    fn test_copy_resumes_across_outputs() {
        let mut ring = RingBuffer::new(32);
        ring.write_bytes(b"xyz");

        let mut first = [0u8; 4];
        let mut second = [0u8; 10];
        let mut remaining = 7;
        remaining -= ring.copy_from_history(3, remaining, &mut first);
        assert_eq!(remaining, 3);
        remaining -= ring.copy_from_history(3, remaining, &mut second);
        assert_eq!(remaining, 0);

        assert_eq!(&first, b"xyzx");
        assert_eq!(&second[..3], b"yzx");
    }

    #[test]
    fn test_zero_distance_rejected() {
        let ring = RingBuffer::deflate();
        assert!(!ring.contains_distance(0));
        assert!(!ring.contains_distance(1));
    }
}
