//! Streaming DEFLATE decompression.
//!
//! [`Inflater`] is a resumable state machine: every step either completes a
//! piece of a block or stops because input ran dry or output is full,
//! recording exactly where it was. A back-reference copy cut short by a full
//! output buffer resumes from the same distance with the bytes still owed.
//!
//! Input bytes are pulled only when the current step needs more bits, so
//! the decoder never consumes bytes past the end of the final block. A gzip
//! trailer following the stream is left untouched in the caller's input.

use crate::huffman::HuffmanTree;
use crate::tables::{
    CODE_LENGTH_ORDER, DISTANCE_BASE, DISTANCE_EXTRA_BITS, END_OF_BLOCK, LENGTH_BASE,
    LENGTH_EXTRA_BITS, MAX_DIST_CODES, MAX_LITLEN_CODES, fixed_distance_tree, fixed_litlen_tree,
};
use log::trace;
use tarflate_core::bitstream::BitReader;
use tarflate_core::buffer::DynamicBuffer;
use tarflate_core::error::{Result, StreamLayer, TarflateError};
use tarflate_core::ringbuffer::RingBuffer;
use tarflate_core::traits::{Codec, FlushMode};
use tarflate_core::transform::{DeferredError, TransformResult, transform};

/// Position of the decoder within the DEFLATE grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// BFINAL and BTYPE.
    BlockHeader,
    /// LEN and NLEN of a stored block.
    StoredHeader,
    /// Raw bytes of a stored block.
    StoredCopy { remaining: usize },
    /// HLIT, HDIST and HCLEN.
    DynamicHeader,
    /// 3-bit lengths of the code-length code.
    CodeLengthCodes { index: usize },
    /// Huffman-coded literal/length and distance code lengths.
    CodeLengths { index: usize },
    /// Extra bits of a repeat code (16, 17, 18).
    CodeLengthRepeat { index: usize, symbol: u16 },
    /// Next literal/length symbol.
    Symbol,
    /// A decoded literal waiting for output room.
    Literal { byte: u8 },
    /// Extra bits of a length symbol.
    LengthExtra { symbol: u16 },
    /// Distance symbol of a match.
    DistanceCode { length: usize },
    /// Extra bits of a distance symbol.
    DistanceExtra { length: usize, symbol: u16 },
    /// Copying a match out of the window.
    Copy { remaining: usize, distance: usize },
    /// Final block fully consumed.
    Done,
}

/// Why a run of steps stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    NeedInput,
    OutputFull,
    Done,
}

/// Streaming DEFLATE decompressor.
///
/// # Example
///
/// ```
/// use tarflate_core::{Codec, FlushMode};
/// use tarflate_deflate::{Inflater, deflate};
///
/// let compressed = deflate(b"Hello, DEFLATE!", 6).unwrap();
/// let mut inflater = Inflater::new();
/// let mut out = [0u8; 50];
/// let result = inflater
///     .transform_chunk(&mut out, &compressed, FlushMode::Finish)
///     .unwrap();
/// assert!(result.done);
/// assert_eq!(&out[..result.bytes_written], b"Hello, DEFLATE!");
/// ```
#[derive(Debug)]
pub struct Inflater {
    state: State,
    bits: BitReader,
    window: RingBuffer,
    /// Whether the current block is the last one.
    final_block: bool,
    /// Whether the current block uses the fixed codes.
    fixed: bool,
    hlit: usize,
    hdist: usize,
    hclen: usize,
    codelen_lengths: [u8; 19],
    lengths: [u8; MAX_LITLEN_CODES + MAX_DIST_CODES],
    codelen_tree: Option<HuffmanTree>,
    litlen_tree: Option<HuffmanTree>,
    dist_tree: Option<HuffmanTree>,
    /// Stored-block bytes copied without going through `bits`.
    raw_bytes: u64,
    total_in: u64,
    total_out: u64,
    deferred: DeferredError,
}

impl Inflater {
    /// Create a decompressor positioned at the start of a stream.
    pub fn new() -> Self {
        Self {
            state: State::BlockHeader,
            bits: BitReader::new(),
            window: RingBuffer::deflate(),
            final_block: false,
            fixed: false,
            hlit: 0,
            hdist: 0,
            hclen: 0,
            codelen_lengths: [0; 19],
            lengths: [0; MAX_LITLEN_CODES + MAX_DIST_CODES],
            codelen_tree: None,
            litlen_tree: None,
            dist_tree: None,
            raw_bytes: 0,
            total_in: 0,
            total_out: 0,
            deferred: DeferredError::new(),
        }
    }

    /// Compressed bytes consumed so far.
    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    /// Decompressed bytes produced so far.
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    fn corrupt(&self, message: impl Into<String>) -> TarflateError {
        TarflateError::corrupt(
            StreamLayer::Deflate,
            self.bits.bytes_pulled() + self.raw_bytes,
            message,
        )
    }

    fn end_block(&mut self) {
        if self.final_block {
            self.bits.align_to_byte();
            self.state = State::Done;
        } else {
            self.state = State::BlockHeader;
        }
    }

    /// Build a Huffman tree, accepting incomplete codes only in the forms
    /// zlib accepts: no codes at all, or a single one-bit code.
    fn build_tree(&self, lengths: &[u8], what: &str) -> Result<HuffmanTree> {
        let tree = HuffmanTree::from_code_lengths(lengths)
            .map_err(|_| self.corrupt(format!("over-subscribed {what} code")))?;
        let used = lengths.iter().filter(|&&l| l != 0).count();
        let single_short = used == 1 && lengths.iter().any(|&l| l == 1);
        if !tree.is_complete() && !tree.is_empty() && !single_short {
            return Err(self.corrupt(format!("incomplete {what} code")));
        }
        Ok(tree)
    }

    fn build_dynamic_tables(&mut self) -> Result<()> {
        let (litlen, dist) = self.lengths[..self.hlit + self.hdist].split_at(self.hlit);
        if litlen[END_OF_BLOCK as usize] == 0 {
            return Err(self.corrupt("missing end-of-block code"));
        }
        let litlen_tree = self.build_tree(litlen, "literal/length")?;
        let dist_tree = self.build_tree(dist, "distance")?;
        self.litlen_tree = Some(litlen_tree);
        self.dist_tree = Some(dist_tree);
        self.fixed = false;
        Ok(())
    }

    /// Advance the state machine as far as input and output allow.
    fn run(&mut self, output: &mut [u8], input: &mut &[u8], written: &mut usize) -> Result<Stop> {
        loop {
            match self.state {
                State::BlockHeader => {
                    let Some(header) = self.bits.try_read_bits(3, input) else {
                        return Ok(Stop::NeedInput);
                    };
                    self.final_block = header & 1 != 0;
                    self.state = match header >> 1 {
                        0 => {
                            self.bits.align_to_byte();
                            State::StoredHeader
                        }
                        1 => {
                            self.fixed = true;
                            State::Symbol
                        }
                        2 => State::DynamicHeader,
                        _ => return Err(self.corrupt("reserved block type")),
                    };
                    trace!(
                        "deflate block: type {}, final {}",
                        header >> 1,
                        self.final_block
                    );
                }

                State::StoredHeader => {
                    let Some(value) = self.bits.try_read_bits(32, input) else {
                        return Ok(Stop::NeedInput);
                    };
                    let len = value & 0xFFFF;
                    let nlen = value >> 16;
                    if len != !nlen & 0xFFFF {
                        return Err(self.corrupt("stored block length does not match its complement"));
                    }
                    self.state = State::StoredCopy {
                        remaining: len as usize,
                    };
                }

                State::StoredCopy { remaining } => {
                    if remaining == 0 {
                        self.end_block();
                        continue;
                    }
                    if *written == output.len() {
                        return Ok(Stop::OutputFull);
                    }
                    // Whole bytes pulled before the block started come first.
                    if let Some(byte) = self.bits.take_held_byte() {
                        output[*written] = byte;
                        self.window.write_byte(byte);
                        *written += 1;
                        self.state = State::StoredCopy {
                            remaining: remaining - 1,
                        };
                        continue;
                    }
                    if input.is_empty() {
                        return Ok(Stop::NeedInput);
                    }
                    let n = remaining.min(input.len()).min(output.len() - *written);
                    output[*written..*written + n].copy_from_slice(&input[..n]);
                    self.window.write_bytes(&input[..n]);
                    *input = &input[n..];
                    *written += n;
                    self.raw_bytes += n as u64;
                    self.state = State::StoredCopy {
                        remaining: remaining - n,
                    };
                }

                State::DynamicHeader => {
                    let Some(value) = self.bits.try_read_bits(14, input) else {
                        return Ok(Stop::NeedInput);
                    };
                    self.hlit = (value & 0x1F) as usize + 257;
                    self.hdist = ((value >> 5) & 0x1F) as usize + 1;
                    self.hclen = ((value >> 10) & 0xF) as usize + 4;
                    if self.hlit > MAX_LITLEN_CODES || self.hdist > MAX_DIST_CODES {
                        return Err(self.corrupt("too many length or distance codes"));
                    }
                    self.codelen_lengths = [0; 19];
                    self.state = State::CodeLengthCodes { index: 0 };
                }

                State::CodeLengthCodes { index } => {
                    if index == self.hclen {
                        let tree = HuffmanTree::from_code_lengths(&self.codelen_lengths)
                            .map_err(|_| self.corrupt("over-subscribed code length code"))?;
                        if !tree.is_complete() {
                            return Err(self.corrupt("incomplete code length code"));
                        }
                        self.codelen_tree = Some(tree);
                        self.state = State::CodeLengths { index: 0 };
                        continue;
                    }
                    let Some(value) = self.bits.try_read_bits(3, input) else {
                        return Ok(Stop::NeedInput);
                    };
                    self.codelen_lengths[CODE_LENGTH_ORDER[index]] = value as u8;
                    self.state = State::CodeLengthCodes { index: index + 1 };
                }

                State::CodeLengths { index } => {
                    if index == self.hlit + self.hdist {
                        self.build_dynamic_tables()?;
                        self.state = State::Symbol;
                        continue;
                    }
                    let Some(tree) = self.codelen_tree.as_ref() else {
                        return Err(self.corrupt("code lengths without a code length code"));
                    };
                    let Some(symbol) = tree.decode(&mut self.bits, input)? else {
                        return Ok(Stop::NeedInput);
                    };
                    self.state = if symbol < 16 {
                        self.lengths[index] = symbol as u8;
                        State::CodeLengths { index: index + 1 }
                    } else {
                        State::CodeLengthRepeat { index, symbol }
                    };
                }

                State::CodeLengthRepeat { index, symbol } => {
                    let (extra_bits, base) = match symbol {
                        16 => (2, 3),
                        17 => (3, 3),
                        _ => (7, 11),
                    };
                    let Some(extra) = self.bits.try_read_bits(extra_bits, input) else {
                        return Ok(Stop::NeedInput);
                    };
                    let count = base + extra as usize;
                    let value = if symbol == 16 {
                        if index == 0 {
                            return Err(self.corrupt("repeat code with no previous length"));
                        }
                        self.lengths[index - 1]
                    } else {
                        0
                    };
                    if index + count > self.hlit + self.hdist {
                        return Err(self.corrupt("code length repeat overflows the table"));
                    }
                    self.lengths[index..index + count].fill(value);
                    self.state = State::CodeLengths {
                        index: index + count,
                    };
                }

                State::Symbol => {
                    let tree = if self.fixed {
                        fixed_litlen_tree()
                    } else {
                        match self.litlen_tree.as_ref() {
                            Some(tree) => tree,
                            None => return Err(self.corrupt("block without literal codes")),
                        }
                    };
                    let Some(symbol) = tree.decode(&mut self.bits, input)? else {
                        return Ok(Stop::NeedInput);
                    };
                    match symbol {
                        0..=255 => {
                            let byte = symbol as u8;
                            if *written < output.len() {
                                output[*written] = byte;
                                self.window.write_byte(byte);
                                *written += 1;
                            } else {
                                self.state = State::Literal { byte };
                                return Ok(Stop::OutputFull);
                            }
                        }
                        END_OF_BLOCK => self.end_block(),
                        257..=285 => self.state = State::LengthExtra { symbol },
                        _ => return Err(self.corrupt(format!("invalid length symbol {symbol}"))),
                    }
                }

                State::Literal { byte } => {
                    if *written == output.len() {
                        return Ok(Stop::OutputFull);
                    }
                    output[*written] = byte;
                    self.window.write_byte(byte);
                    *written += 1;
                    self.state = State::Symbol;
                }

                State::LengthExtra { symbol } => {
                    let index = (symbol - 257) as usize;
                    let Some(extra) =
                        self.bits
                            .try_read_bits(LENGTH_EXTRA_BITS[index] as u32, input)
                    else {
                        return Ok(Stop::NeedInput);
                    };
                    self.state = State::DistanceCode {
                        length: LENGTH_BASE[index] as usize + extra as usize,
                    };
                }

                State::DistanceCode { length } => {
                    let tree = if self.fixed {
                        fixed_distance_tree()
                    } else {
                        match self.dist_tree.as_ref() {
                            Some(tree) => tree,
                            None => return Err(self.corrupt("block without distance codes")),
                        }
                    };
                    let Some(symbol) = tree.decode(&mut self.bits, input)? else {
                        return Ok(Stop::NeedInput);
                    };
                    if symbol as usize >= MAX_DIST_CODES {
                        return Err(self.corrupt(format!("invalid distance symbol {symbol}")));
                    }
                    self.state = State::DistanceExtra { length, symbol };
                }

                State::DistanceExtra { length, symbol } => {
                    let index = symbol as usize;
                    let Some(extra) = self
                        .bits
                        .try_read_bits(DISTANCE_EXTRA_BITS[index] as u32, input)
                    else {
                        return Ok(Stop::NeedInput);
                    };
                    let distance = DISTANCE_BASE[index] as usize + extra as usize;
                    if !self.window.contains_distance(distance) {
                        return Err(self.corrupt(format!(
                            "distance {distance} reaches before the start of the output"
                        )));
                    }
                    self.state = State::Copy {
                        remaining: length,
                        distance,
                    };
                }

                State::Copy {
                    remaining,
                    distance,
                } => {
                    if *written == output.len() {
                        return Ok(Stop::OutputFull);
                    }
                    let copied =
                        self.window
                            .copy_from_history(distance, remaining, &mut output[*written..]);
                    *written += copied;
                    self.state = if copied == remaining {
                        State::Symbol
                    } else {
                        State::Copy {
                            remaining: remaining - copied,
                            distance,
                        }
                    };
                }

                State::Done => return Ok(Stop::Done),
            }
        }
    }
}

impl Default for Inflater {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for Inflater {
    fn transform_chunk(
        &mut self,
        output: &mut [u8],
        input: &[u8],
        flush: FlushMode,
    ) -> Result<TransformResult> {
        self.deferred.check()?;
        if self.state == State::Done {
            return Err(TarflateError::protocol(
                "inflate driven after the end of the stream",
            ));
        }

        let mut cursor = input;
        let mut written = 0;
        let stop = self.run(output, &mut cursor, &mut written);

        let read = input.len() - cursor.len();
        self.total_in += read as u64;
        self.total_out += written as u64;

        let progress = TransformResult::new(read, written, false);
        match stop {
            Ok(Stop::NeedInput) if flush == FlushMode::Finish => self.deferred.defer(
                TarflateError::truncated("deflate stream ended before its final block"),
                progress,
            ),
            Ok(stop) => Ok(TransformResult {
                done: stop == Stop::Done,
                ..progress
            }),
            Err(err) => self.deferred.defer(err, progress),
        }
    }

    fn is_done(&self) -> bool {
        self.state == State::Done
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Decompress a complete DEFLATE stream in one call.
///
/// Bytes after the end of the stream are ignored.
pub fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut inflater = Inflater::new();
    let mut sink = DynamicBuffer::new();
    let mut input = data;
    transform(&mut inflater, &mut sink, &mut input, FlushMode::Finish)?;
    if !inflater.is_done() {
        return Err(TarflateError::truncated("deflate stream is incomplete"));
    }
    Ok(sink.into_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_block() {
        // BFINAL=1 BTYPE=00, LEN=5, NLEN=!5, "hello"
        let data = [0x01, 0x05, 0x00, 0xFA, 0xFF, b'h', b'e', b'l', b'l', b'o'];
        assert_eq!(inflate(&data).unwrap(), b"hello");
    }

    #[test]
    fn test_fixed_block_from_zlib() {
        // `printf 'Hello' | zlib raw deflate` with fixed codes.
        let data = [0xF3, 0x48, 0xCD, 0xC9, 0xC9, 0x07, 0x00];
        assert_eq!(inflate(&data).unwrap(), b"Hello");
    }

    #[test]
    fn test_empty_fixed_block() {
        assert_eq!(inflate(&[0x03, 0x00]).unwrap(), b"");
    }

    #[test]
    fn test_reserved_block_type() {
        let err = inflate(&[0x07]).unwrap_err();
        assert_eq!(err.corrupt_layer(), Some(StreamLayer::Deflate));
    }

    #[test]
    fn test_output_before_corrupt_block_is_reported() {
        // Non-final stored "hello", then a final block of reserved type.
        let data = [0x00, 0x05, 0x00, 0xFA, 0xFF, b'h', b'e', b'l', b'l', b'o', 0x07];

        let mut inflater = Inflater::new();
        let mut out = [0u8; 32];
        let result = inflater
            .transform_chunk(&mut out, &data, FlushMode::Finish)
            .unwrap();
        assert_eq!(result.bytes_written, 5);
        assert!(!result.done);
        assert_eq!(&out[..5], b"hello");

        let err = inflater
            .transform_chunk(&mut out, &[], FlushMode::Finish)
            .unwrap_err();
        assert_eq!(err.corrupt_layer(), Some(StreamLayer::Deflate));
        assert!(matches!(
            inflater.transform_chunk(&mut out, &[], FlushMode::Finish),
            Err(TarflateError::ProtocolViolation { .. })
        ));

        let mut sink = DynamicBuffer::new();
        let mut input = &data[..];
        let err = transform(&mut Inflater::new(), &mut sink, &mut input, FlushMode::Finish)
            .unwrap_err();
        assert!(err.to_string().contains("reserved block type"));
        assert_eq!(sink.data(), b"hello");
    }

    #[test]
    fn test_stored_length_mismatch() {
        let data = [0x01, 0x05, 0x00, 0x00, 0x00];
        assert!(matches!(
            inflate(&data),
            Err(TarflateError::CorruptStream { .. })
        ));
    }

    #[test]
    fn test_distance_before_start() {
        // Fixed block: length 3 (symbol 257, 7 bits 0000001), distance code 0.
        let mut writer = tarflate_core::BitWriter::new();
        writer.write_bits(1, 1); // BFINAL
        writer.write_bits(1, 2); // fixed
        writer.write_bits(0b1000000, 7); // symbol 257, reversed
        writer.write_bits(0, 5); // distance code 0
        writer.align_to_byte();
        let mut buf = [0u8; 8];
        let n = writer.drain_into(&mut buf);

        let err = inflate(&buf[..n]).unwrap_err();
        assert!(err.to_string().contains("distance"));
    }

    #[test]
    fn test_truncated_stream() {
        let data = [0x01, 0x05, 0x00, 0xFA, 0xFF, b'h', b'e'];
        assert!(matches!(
            inflate(&data),
            Err(TarflateError::Truncated { .. })
        ));
    }

    #[test]
    fn test_leaves_trailing_bytes() {
        let data = [0x03, 0x00, 0xAA, 0xBB];
        let mut inflater = Inflater::new();
        let mut out = [0u8; 4];
        let result = inflater
            .transform_chunk(&mut out, &data, FlushMode::None)
            .unwrap();
        assert!(result.done);
        assert_eq!(result.bytes_read, 2);
        assert_eq!(inflater.total_in(), 2);
    }

    #[test]
    fn test_resumes_after_full_output() {
        let data = [0x01, 0x02, 0x00, 0xFD, 0xFF, b'o', b'k'];
        let mut inflater = Inflater::new();
        let mut empty: [u8; 0] = [];
        let first = inflater
            .transform_chunk(&mut empty, &data, FlushMode::None)
            .unwrap();
        assert_eq!(first.bytes_written, 0);
        assert!(!first.done);

        let mut out = [0u8; 2];
        let rest = &data[first.bytes_read..];
        let second = inflater
            .transform_chunk(&mut out, rest, FlushMode::Finish)
            .unwrap();
        assert!(second.done);
        assert_eq!(&out, b"ok");
    }
}
