//! Huffman coding for DEFLATE.
//!
//! DEFLATE uses canonical Huffman codes: codes of the same length are
//! consecutive integers, ordered by symbol. A code is fully described by its
//! list of code lengths.
//!
//! # Alphabets
//!
//! - **Literal/Length**: 0-285 (0-255 literals, 256 EOB, 257-285 lengths)
//! - **Distance**: 0-29
//! - **Code Length**: 0-18 (for encoding dynamic Huffman trees)
//!
//! Decoding pulls input bytes one at a time, and only while the bits held
//! so far do not yet spell out a complete code.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use tarflate_core::bitstream::BitReader;
use tarflate_core::error::{Result, StreamLayer, TarflateError};

/// Maximum code length in DEFLATE (15 bits).
pub const MAX_CODE_LENGTH: usize = 15;

/// Bits resolved by one lookup in the fast table.
const FAST_BITS: u32 = 9;
const FAST_MASK: u64 = (1 << FAST_BITS) - 1;

/// Outcome of decoding against the bits currently held.
enum Lookup {
    Found { symbol: u16, length: u32 },
    NeedMoreBits,
    Invalid,
}

/// A canonical Huffman code prepared for decoding.
///
/// Codes up to 9 bits resolve through a direct lookup table. Longer codes,
/// and codes decoded while fewer than 9 bits are available, walk the
/// per-length counts instead.
#[derive(Debug, Clone)]
pub struct HuffmanTree {
    /// Number of codes of each length.
    counts: [u16; MAX_CODE_LENGTH + 1],
    /// Symbols in canonical code order.
    symbols: Vec<u16>,
    /// Lookup by the next `FAST_BITS` stream bits: `symbol << 4 | length`,
    /// or 0 when the code is longer than `FAST_BITS`.
    fast: Vec<u16>,
    /// Longest code length in use.
    max_length: u32,
    /// Whether the lengths fill the code space exactly.
    complete: bool,
}

impl HuffmanTree {
    /// Build a decoding tree from code lengths.
    ///
    /// `code_lengths[i]` is the bit length of symbol `i`, 0 meaning unused.
    /// Over-subscribed lengths are rejected. Incomplete codes are accepted;
    /// hitting one of their unassigned codes fails at decode time.
    pub fn from_code_lengths(code_lengths: &[u8]) -> Result<Self> {
        let mut counts = [0u16; MAX_CODE_LENGTH + 1];
        for &len in code_lengths {
            if len as usize > MAX_CODE_LENGTH {
                return Err(corrupt(0, format!("code length {len} exceeds 15")));
            }
            counts[len as usize] += 1;
        }
        counts[0] = 0;

        // Remaining code space after each length.
        let mut left: i32 = 1;
        for &count in &counts[1..] {
            left = (left << 1) - count as i32;
            if left < 0 {
                return Err(corrupt(0, "over-subscribed Huffman code"));
            }
        }
        let used: usize = counts.iter().map(|&c| c as usize).sum();
        let complete = left == 0 && used > 0;

        // Offsets of each length into the canonical symbol list.
        let mut offsets = [0usize; MAX_CODE_LENGTH + 2];
        for len in 1..=MAX_CODE_LENGTH {
            offsets[len + 1] = offsets[len] + counts[len] as usize;
        }
        let mut symbols = vec![0u16; used];
        for (symbol, &len) in code_lengths.iter().enumerate() {
            if len != 0 {
                symbols[offsets[len as usize]] = symbol as u16;
                offsets[len as usize] += 1;
            }
        }

        let codes = canonical_codes(code_lengths);
        let mut fast = vec![0u16; 1 << FAST_BITS];
        for (symbol, (&len, &code)) in code_lengths.iter().zip(&codes).enumerate() {
            let len = len as u32;
            if len == 0 || len > FAST_BITS {
                continue;
            }
            let entry = ((symbol as u16) << 4) | len as u16;
            let mut index = code as usize;
            while index < fast.len() {
                fast[index] = entry;
                index += 1 << len;
            }
        }

        let max_length = (1..=MAX_CODE_LENGTH)
            .rev()
            .find(|&len| counts[len] != 0)
            .unwrap_or(0) as u32;

        Ok(Self {
            counts,
            symbols,
            fast,
            max_length,
            complete,
        })
    }

    /// Whether the code lengths use the whole code space.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Whether no symbol has a code.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Decode one symbol.
    ///
    /// Returns `Ok(None)` when `input` ran out before a full code was seen;
    /// the bits gathered so far stay in `reader` for the next call.
    #[inline]
    pub fn decode(&self, reader: &mut BitReader, input: &mut &[u8]) -> Result<Option<u16>> {
        loop {
            let bits = reader.peek();
            let available = reader.available();

            if available >= FAST_BITS {
                let entry = self.fast[(bits & FAST_MASK) as usize];
                if entry != 0 {
                    reader.consume((entry & 0xF) as u32);
                    return Ok(Some(entry >> 4));
                }
            }

            match self.lookup_slow(bits, available) {
                Lookup::Found { symbol, length } => {
                    reader.consume(length);
                    return Ok(Some(symbol));
                }
                Lookup::Invalid => {
                    return Err(corrupt(reader.bytes_pulled(), "invalid Huffman code"));
                }
                Lookup::NeedMoreBits => {
                    if !reader.pull_byte(input) {
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Walk the canonical code one bit at a time.
    fn lookup_slow(&self, bits: u64, available: u32) -> Lookup {
        let mut code: i32 = 0;
        let mut first: i32 = 0;
        let mut index: i32 = 0;

        for len in 1..=self.max_length {
            if len > available {
                return Lookup::NeedMoreBits;
            }
            code |= ((bits >> (len - 1)) & 1) as i32;
            let count = self.counts[len as usize] as i32;
            if code - count < first {
                return Lookup::Found {
                    symbol: self.symbols[(index + code - first) as usize],
                    length: len,
                };
            }
            index += count;
            first = (first + count) << 1;
            code <<= 1;
        }

        Lookup::Invalid
    }
}

fn corrupt(offset: u64, message: impl Into<String>) -> TarflateError {
    TarflateError::corrupt(StreamLayer::Deflate, offset, message)
}

/// Canonical codes for `lengths`, bit-reversed so they can be written
/// LSB-first. Unused symbols get code 0.
pub fn canonical_codes(lengths: &[u8]) -> Vec<u16> {
    let mut counts = [0u16; MAX_CODE_LENGTH + 1];
    for &len in lengths {
        counts[len as usize] += 1;
    }
    counts[0] = 0;

    let mut next_code = [0u16; MAX_CODE_LENGTH + 1];
    let mut code = 0u16;
    for bits in 1..=MAX_CODE_LENGTH {
        code = (code + counts[bits - 1]) << 1;
        next_code[bits] = code;
    }

    lengths
        .iter()
        .map(|&len| {
            if len == 0 {
                return 0;
            }
            let code = next_code[len as usize];
            next_code[len as usize] += 1;
            reverse_bits(code, len as u32)
        })
        .collect()
}

/// Reverse the low `count` bits of `code`.
#[inline]
pub fn reverse_bits(code: u16, count: u32) -> u16 {
    code.reverse_bits() >> (16 - count)
}

/// Builds length-limited Huffman code lengths from symbol frequencies.
#[derive(Debug, Clone)]
pub struct HuffmanBuilder {
    frequencies: Vec<u32>,
    max_length: usize,
}

impl HuffmanBuilder {
    /// Create a builder for an alphabet of `num_symbols` with codes of at
    /// most `max_length` bits.
    pub fn new(num_symbols: usize, max_length: usize) -> Self {
        debug_assert!((1..=MAX_CODE_LENGTH).contains(&max_length));
        debug_assert!(num_symbols <= 1 << max_length);
        Self {
            frequencies: vec![0; num_symbols],
            max_length,
        }
    }

    /// Create a builder from a frequency table.
    pub fn from_frequencies(frequencies: &[u32], max_length: usize) -> Self {
        let mut builder = Self::new(frequencies.len(), max_length);
        builder.frequencies.copy_from_slice(frequencies);
        builder
    }

    /// Add `count` occurrences of `symbol`.
    pub fn add_count(&mut self, symbol: u16, count: u32) {
        self.frequencies[symbol as usize] += count;
    }

    /// Compute code lengths.
    ///
    /// The result is always a complete code with at least two symbols, so
    /// any decoder accepts it. Unused symbols are padded in when fewer than
    /// two are used.
    pub fn build_lengths(&self) -> Vec<u8> {
        let n = self.frequencies.len();
        let mut used: Vec<usize> = (0..n).filter(|&s| self.frequencies[s] > 0).collect();
        for filler in 0..n {
            if used.len() >= 2 {
                break;
            }
            if !used.contains(&filler) {
                used.push(filler);
            }
        }

        let mut lengths = vec![0u8; n];
        if used.len() < 2 {
            // Alphabet of a single symbol.
            for &s in &used {
                lengths[s] = 1;
            }
            return lengths;
        }

        // Plain Huffman depths.
        let depths = huffman_depths(&used.iter().map(|&s| self.frequencies[s]).collect::<Vec<_>>());

        // Per-length counts with everything too long folded into max_length.
        let max = self.max_length;
        let mut bl_count = vec![0u32; MAX_CODE_LENGTH.max(max) + 1];
        for &depth in &depths {
            bl_count[depth.min(max)] += 1;
        }

        // Restore the Kraft equality: the fold above can only over-subscribe.
        let mut total: u64 = (1..=max).map(|len| (bl_count[len] as u64) << (max - len)).sum();
        while total > 1 << max {
            bl_count[max] -= 1;
            if let Some(len) = (1..max).rev().find(|&len| bl_count[len] != 0) {
                bl_count[len] -= 1;
                bl_count[len + 1] += 2;
            }
            total -= 1;
        }

        // Hand the shortest codes to the most frequent symbols.
        let mut order = used;
        order.sort_by_key(|&s| (Reverse(self.frequencies[s]), s));
        let mut symbols = order.into_iter();
        for (len, &count) in bl_count.iter().enumerate().take(max + 1).skip(1) {
            for _ in 0..count {
                if let Some(s) = symbols.next() {
                    lengths[s] = len as u8;
                }
            }
        }

        lengths
    }
}

/// Depth of each leaf in an unrestricted Huffman tree over `weights`
/// (at least two entries).
fn huffman_depths(weights: &[u32]) -> Vec<usize> {
    let leaves = weights.len();
    let mut parent = vec![0usize; 2 * leaves - 1];
    let mut heap: BinaryHeap<Reverse<(u64, usize)>> = weights
        .iter()
        .enumerate()
        .map(|(i, &w)| Reverse((w.max(1) as u64, i)))
        .collect();

    let mut next = leaves;
    while let (Some(Reverse((wa, a))), Some(Reverse((wb, b)))) = (heap.pop(), heap.pop()) {
        parent[a] = next;
        parent[b] = next;
        heap.push(Reverse((wa + wb, next)));
        next += 1;
    }

    // Parents always sit above their children, so walk downward from the root.
    let root = next - 1;
    let mut depth = vec![0usize; next];
    for node in (0..root).rev() {
        depth[node] = depth[parent[node]] + 1;
    }
    depth.truncate(leaves);
    depth
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kraft_sum(lengths: &[u8], max: usize) -> u64 {
        lengths
            .iter()
            .filter(|&&l| l > 0)
            .map(|&l| 1u64 << (max - l as usize))
            .sum()
    }

    #[test]
    fn test_canonical_codes_rfc_example() {
        // RFC 1951 section 3.2.2: lengths (3, 3, 3, 3, 3, 2, 4, 4)
        let lengths = [3, 3, 3, 3, 3, 2, 4, 4];
        let codes = canonical_codes(&lengths);
        let expected = [0b010, 0b011, 0b100, 0b101, 0b110, 0b00, 0b1110, 0b1111];
        for ((&code, &len), &want) in codes.iter().zip(&lengths).zip(&expected) {
            assert_eq!(reverse_bits(code, len as u32), want);
        }
    }

    #[test]
    fn test_decode_rfc_example() {
        let lengths = [3, 3, 3, 3, 3, 2, 4, 4];
        let tree = HuffmanTree::from_code_lengths(&lengths).unwrap();
        assert!(tree.is_complete());

        // Symbol 5 (code 00), symbol 7 (code 1111), symbol 0 (code 010),
        // written LSB-first.
        let mut writer = tarflate_core::BitWriter::new();
        let codes = canonical_codes(&lengths);
        for s in [5usize, 7, 0] {
            writer.write_bits(codes[s] as u32, lengths[s] as u32);
        }
        writer.align_to_byte();
        let mut buf = [0u8; 4];
        let n = writer.drain_into(&mut buf);

        let mut reader = BitReader::new();
        let mut input = &buf[..n];
        let mut decoded = Vec::new();
        for _ in 0..3 {
            decoded.push(tree.decode(&mut reader, &mut input).unwrap().unwrap());
        }
        assert_eq!(decoded, vec![5, 7, 0]);
    }

    #[test]
    fn test_decode_needs_more_input() {
        let tree = HuffmanTree::from_code_lengths(&[1, 2, 3, 3]).unwrap();
        let mut reader = BitReader::new();
        let mut input: &[u8] = &[];
        assert_eq!(tree.decode(&mut reader, &mut input).unwrap(), None);
    }

    #[test]
    fn test_over_subscribed_rejected() {
        assert!(HuffmanTree::from_code_lengths(&[1, 1, 1]).is_err());
    }

    #[test]
    fn test_incomplete_code_rejects_unused_pattern() {
        // One code of length 1: symbol 0 is '0', '1' is unassigned.
        let tree = HuffmanTree::from_code_lengths(&[1, 0]).unwrap();
        assert!(!tree.is_complete());

        let mut reader = BitReader::new();
        let mut input: &[u8] = &[0b0000_0001];
        assert!(tree.decode(&mut reader, &mut input).is_err());
    }

    #[test]
    fn test_builder_respects_limit() {
        // Fibonacci weights force a very deep unrestricted tree.
        let mut freqs = vec![0u32; 30];
        let (mut a, mut b) = (1u32, 1u32);
        for f in freqs.iter_mut() {
            *f = a;
            let c = a.saturating_add(b);
            a = b;
            b = c;
        }
        let lengths = HuffmanBuilder::from_frequencies(&freqs, 7).build_lengths();
        assert!(lengths.iter().all(|&l| (1..=7).contains(&l)));
        assert_eq!(kraft_sum(&lengths, 7), 1 << 7);
        assert!(HuffmanTree::from_code_lengths(&lengths).unwrap().is_complete());
    }

    #[test]
    fn test_builder_single_symbol_gets_partner() {
        let mut builder = HuffmanBuilder::new(30, 15);
        builder.add_count(4, 10);
        let lengths = builder.build_lengths();
        assert_eq!(lengths.iter().filter(|&&l| l == 1).count(), 2);
        assert_eq!(lengths[4], 1);
    }

    #[test]
    fn test_builder_frequent_symbols_are_shorter() {
        let freqs = [100, 1, 1, 50, 1, 1];
        let lengths = HuffmanBuilder::from_frequencies(&freqs, 15).build_lengths();
        assert!(lengths[0] <= lengths[3]);
        assert!(lengths[3] <= lengths[1]);
        assert_eq!(kraft_sum(&lengths, 15), 1 << 15);
    }
}
