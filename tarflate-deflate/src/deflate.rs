//! Streaming DEFLATE compression.
//!
//! This module implements DEFLATE compression as specified in RFC 1951.
//! Input is gathered into blocks of up to 64 KiB. Each block is written as
//! whichever of the three block types comes out smallest:
//! - Stored blocks (no compression)
//! - Fixed Huffman codes
//! - Dynamic Huffman codes
//!
//! Level 0 always writes stored blocks.
//!
//! Encoded bytes wait in an internal queue until the caller supplies output
//! room, and no new input is accepted while the queue is non-empty. Memory
//! use therefore stays bounded by one block no matter how small the
//! caller's output buffers are.

use crate::huffman::{HuffmanBuilder, MAX_CODE_LENGTH, canonical_codes};
use crate::lz77::{Lz77Encoder, Lz77Token};
use crate::tables::{
    CODE_LENGTH_ORDER, END_OF_BLOCK, MAX_DIST_CODES, MAX_LITLEN_CODES, distance_to_code,
    fixed_distance_lengths, fixed_litlen_lengths, length_to_code,
};
use log::{debug, trace};
use tarflate_core::bitstream::BitWriter;
use tarflate_core::buffer::DynamicBuffer;
use tarflate_core::error::{Result, TarflateError};
use tarflate_core::traits::{Codec, CompressionLevel, FlushMode};
use tarflate_core::transform::{TransformResult, transform};

/// Uncompressed bytes gathered before a block is emitted.
const BLOCK_SIZE: usize = 64 * 1024;

/// Largest payload of one stored block.
const MAX_STORED_LEN: usize = 65535;

/// Longest code in the code-length alphabet.
const MAX_CODELEN_LENGTH: usize = 7;

/// Block type chosen for a run of input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Stored,
    Fixed,
    Dynamic,
}

/// Streaming DEFLATE compressor.
///
/// # Example
///
/// ```
/// use tarflate_core::{Codec, FlushMode};
/// use tarflate_deflate::{Deflater, inflate};
///
/// let mut deflater = Deflater::new(6);
/// let mut out = [0u8; 64];
/// let result = deflater
///     .transform_chunk(&mut out, b"hello hello hello", FlushMode::Finish)
///     .unwrap();
/// assert!(result.done);
/// assert_eq!(inflate(&out[..result.bytes_written]).unwrap(), b"hello hello hello");
/// ```
#[derive(Debug, Clone)]
pub struct Deflater {
    /// LZ77 encoder.
    lz77: Lz77Encoder,
    /// Compression level.
    level: CompressionLevel,
    /// Input gathered for the next block.
    block: Vec<u8>,
    /// Token scratch space.
    tokens: Vec<Lz77Token>,
    /// Encoded output waiting for room.
    writer: BitWriter,
    /// No input has arrived since the last sync point.
    synced: bool,
    /// Final block written.
    finished: bool,
    /// Final block written and fully drained.
    done: bool,
    total_in: u64,
    total_out: u64,
}

impl Deflater {
    /// Create a new DEFLATE compressor with the specified level (0-9).
    pub fn new(level: u8) -> Self {
        Self::with_level(CompressionLevel::new(level))
    }

    /// Create a compressor from a [`CompressionLevel`].
    pub fn with_level(level: CompressionLevel) -> Self {
        Self {
            lz77: Lz77Encoder::with_level(level.level()),
            level,
            block: Vec::with_capacity(BLOCK_SIZE),
            tokens: Vec::new(),
            writer: BitWriter::new(),
            synced: true,
            finished: false,
            done: false,
            total_in: 0,
            total_out: 0,
        }
    }

    /// The configured level.
    pub fn level(&self) -> CompressionLevel {
        self.level
    }

    /// Uncompressed bytes consumed so far.
    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    /// Compressed bytes produced so far.
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    /// Encode the gathered input as one logical block.
    fn emit_block(&mut self, is_final: bool) {
        let data = std::mem::take(&mut self.block);

        if self.level.level() == 0 {
            write_stored_blocks(&mut self.writer, &data, is_final);
            trace!("deflate block: {} bytes stored", data.len());
        } else {
            let mut tokens = std::mem::take(&mut self.tokens);
            tokens.clear();
            self.lz77.compress(&data, &mut tokens);
            self.write_best_block(&data, &tokens, is_final);
            self.tokens = tokens;
        }

        self.block = data;
        self.block.clear();
    }

    fn write_best_block(&mut self, data: &[u8], tokens: &[Lz77Token], is_final: bool) {
        let freqs = Frequencies::count(tokens);
        let dynamic = DynamicCodes::build(&freqs);

        let fixed_litlen = fixed_litlen_lengths();
        let fixed_dist = fixed_distance_lengths();
        let fixed_bits = 3 + freqs.data_bits(&fixed_litlen, &fixed_dist);
        let dynamic_bits = 3 + dynamic.header_bits() + freqs.data_bits(&dynamic.litlen, &dynamic.dist);
        let stored_bits = stored_cost(self.writer.bits_written(), data.len());

        let kind = if stored_bits <= fixed_bits.min(dynamic_bits) {
            BlockKind::Stored
        } else if fixed_bits <= dynamic_bits {
            BlockKind::Fixed
        } else {
            BlockKind::Dynamic
        };
        trace!(
            "deflate block: {} bytes, {} tokens as {:?} (stored {stored_bits}, fixed {fixed_bits}, dynamic {dynamic_bits} bits)",
            data.len(),
            tokens.len(),
            kind
        );

        let writer = &mut self.writer;
        match kind {
            BlockKind::Stored => write_stored_blocks(writer, data, is_final),
            BlockKind::Fixed => {
                writer.write_bits(is_final as u32, 1);
                writer.write_bits(0b01, 2);
                write_tokens(writer, tokens, &fixed_litlen, &fixed_dist);
            }
            BlockKind::Dynamic => {
                writer.write_bits(is_final as u32, 1);
                writer.write_bits(0b10, 2);
                dynamic.write_header(writer);
                write_tokens(writer, tokens, &dynamic.litlen, &dynamic.dist);
            }
        }
    }

    /// Close the current block and write an empty stored block, leaving the
    /// output byte aligned.
    fn emit_sync_point(&mut self) {
        if !self.block.is_empty() {
            self.emit_block(false);
        }
        self.writer.write_bits(0, 3);
        self.writer.align_to_byte();
        self.writer.write_bytes(&[0x00, 0x00, 0xFF, 0xFF]);
    }
}

impl Default for Deflater {
    fn default() -> Self {
        Self::with_level(CompressionLevel::DEFAULT)
    }
}

impl Codec for Deflater {
    fn transform_chunk(
        &mut self,
        output: &mut [u8],
        input: &[u8],
        flush: FlushMode,
    ) -> Result<TransformResult> {
        if self.done {
            return Err(TarflateError::protocol(
                "deflate driven after the stream was finished",
            ));
        }

        let mut read = 0;
        let mut written = 0;

        loop {
            written += self.writer.drain_into(&mut output[written..]);
            if self.writer.pending() > 0 {
                break;
            }
            if self.finished {
                self.done = true;
                break;
            }

            if read < input.len() {
                let take = (BLOCK_SIZE - self.block.len()).min(input.len() - read);
                self.block.extend_from_slice(&input[read..read + take]);
                read += take;
                self.synced = false;
                if self.block.len() == BLOCK_SIZE {
                    self.emit_block(false);
                }
                continue;
            }

            match flush {
                FlushMode::Finish => {
                    self.emit_block(true);
                    self.writer.align_to_byte();
                    self.finished = true;
                }
                FlushMode::Sync if !self.synced => {
                    self.emit_sync_point();
                    self.synced = true;
                }
                _ => break,
            }
        }

        self.total_in += read as u64;
        self.total_out += written as u64;
        if self.done {
            debug!(
                "deflate finished: {} bytes in, {} bytes out",
                self.total_in, self.total_out
            );
        }

        Ok(TransformResult::new(read, written, self.done))
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn reset(&mut self) {
        self.lz77.reset();
        self.block.clear();
        self.tokens.clear();
        self.writer.reset();
        self.synced = true;
        self.finished = false;
        self.done = false;
        self.total_in = 0;
        self.total_out = 0;
    }
}

/// Compress `data` into a complete DEFLATE stream in one call.
pub fn deflate(data: &[u8], level: u8) -> Result<Vec<u8>> {
    let mut deflater = Deflater::new(level);
    let mut sink = DynamicBuffer::new();
    let mut input = data;
    transform(&mut deflater, &mut sink, &mut input, FlushMode::Finish)?;
    Ok(sink.into_vec())
}

/// Symbol statistics of one block.
struct Frequencies {
    litlen: [u32; MAX_LITLEN_CODES],
    dist: [u32; MAX_DIST_CODES],
    /// Length and distance extra bits, identical for every block type.
    extra_bits: u64,
}

impl Frequencies {
    fn count(tokens: &[Lz77Token]) -> Self {
        let mut litlen = [0u32; MAX_LITLEN_CODES];
        let mut dist = [0u32; MAX_DIST_CODES];
        let mut extra_bits = 0u64;

        for token in tokens {
            match *token {
                Lz77Token::Literal(byte) => litlen[byte as usize] += 1,
                Lz77Token::Match { length, distance } => {
                    let (len_code, len_extra_bits, _) = length_to_code(length);
                    let (dist_code, dist_extra_bits, _) = distance_to_code(distance);
                    litlen[len_code as usize] += 1;
                    dist[dist_code as usize] += 1;
                    extra_bits += len_extra_bits as u64 + dist_extra_bits as u64;
                }
            }
        }
        litlen[END_OF_BLOCK as usize] += 1;

        Self {
            litlen,
            dist,
            extra_bits,
        }
    }

    /// Bits needed to encode the block body with the given code lengths.
    fn data_bits(&self, litlen_lengths: &[u8], dist_lengths: &[u8]) -> u64 {
        let weighted = |freqs: &[u32], lengths: &[u8]| -> u64 {
            freqs
                .iter()
                .zip(lengths)
                .map(|(&f, &l)| f as u64 * l as u64)
                .sum()
        };
        weighted(&self.litlen, litlen_lengths) + weighted(&self.dist, dist_lengths) + self.extra_bits
    }
}

/// One run-length coded entry of the code length sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CodeLengthSymbol {
    symbol: u8,
    extra: u8,
    extra_bits: u8,
}

impl CodeLengthSymbol {
    fn plain(length: u8) -> Self {
        Self {
            symbol: length,
            extra: 0,
            extra_bits: 0,
        }
    }

    fn repeat(symbol: u8, extra: usize, extra_bits: u8) -> Self {
        Self {
            symbol,
            extra: extra as u8,
            extra_bits,
        }
    }
}

/// Everything needed to write a dynamic block header.
struct DynamicCodes {
    litlen: Vec<u8>,
    dist: Vec<u8>,
    /// Number of literal/length code lengths sent (257-286).
    hlit: usize,
    /// Number of distance code lengths sent (1-30).
    hdist: usize,
    /// Number of code-length code lengths sent (4-19).
    hclen: usize,
    codelen_lengths: Vec<u8>,
    rle: Vec<CodeLengthSymbol>,
}

impl DynamicCodes {
    fn build(freqs: &Frequencies) -> Self {
        let litlen = HuffmanBuilder::from_frequencies(&freqs.litlen, MAX_CODE_LENGTH).build_lengths();
        let dist = HuffmanBuilder::from_frequencies(&freqs.dist, MAX_CODE_LENGTH).build_lengths();

        let hlit = used_prefix(&litlen, 257);
        let hdist = used_prefix(&dist, 1);

        let mut combined = Vec::with_capacity(hlit + hdist);
        combined.extend_from_slice(&litlen[..hlit]);
        combined.extend_from_slice(&dist[..hdist]);
        let rle = rle_encode_lengths(&combined);

        let mut codelen_builder = HuffmanBuilder::new(19, MAX_CODELEN_LENGTH);
        for entry in &rle {
            codelen_builder.add_count(entry.symbol as u16, 1);
        }
        let codelen_lengths = codelen_builder.build_lengths();

        let hclen = CODE_LENGTH_ORDER
            .iter()
            .rposition(|&symbol| codelen_lengths[symbol] != 0)
            .map_or(4, |last| (last + 1).max(4));

        Self {
            litlen,
            dist,
            hlit,
            hdist,
            hclen,
            codelen_lengths,
            rle,
        }
    }

    /// Header size after the 3 block-type bits.
    fn header_bits(&self) -> u64 {
        let lengths_bits: u64 = self
            .rle
            .iter()
            .map(|e| self.codelen_lengths[e.symbol as usize] as u64 + e.extra_bits as u64)
            .sum();
        14 + 3 * self.hclen as u64 + lengths_bits
    }

    fn write_header(&self, writer: &mut BitWriter) {
        writer.write_bits((self.hlit - 257) as u32, 5);
        writer.write_bits((self.hdist - 1) as u32, 5);
        writer.write_bits((self.hclen - 4) as u32, 4);
        for &symbol in &CODE_LENGTH_ORDER[..self.hclen] {
            writer.write_bits(self.codelen_lengths[symbol] as u32, 3);
        }

        let codes = canonical_codes(&self.codelen_lengths);
        for entry in &self.rle {
            let symbol = entry.symbol as usize;
            writer.write_bits(codes[symbol] as u32, self.codelen_lengths[symbol] as u32);
            writer.write_bits(entry.extra as u32, entry.extra_bits as u32);
        }
    }
}

/// Number of leading entries that must be sent: through the last used
/// code, and at least `min`.
fn used_prefix(lengths: &[u8], min: usize) -> usize {
    lengths
        .iter()
        .rposition(|&len| len != 0)
        .map_or(min, |last| (last + 1).max(min))
}

/// Run-length encode code lengths with symbols 16, 17 and 18.
fn rle_encode_lengths(lengths: &[u8]) -> Vec<CodeLengthSymbol> {
    let mut out = Vec::new();
    let mut i = 0;

    while i < lengths.len() {
        let len = lengths[i];
        let run = lengths[i..].iter().take_while(|&&l| l == len).count();
        i += run;

        let mut count = run;
        if len == 0 {
            while count > 0 {
                if count >= 11 {
                    let n = count.min(138);
                    out.push(CodeLengthSymbol::repeat(18, n - 11, 7));
                    count -= n;
                } else if count >= 3 {
                    let n = count.min(10);
                    out.push(CodeLengthSymbol::repeat(17, n - 3, 3));
                    count -= n;
                } else {
                    out.push(CodeLengthSymbol::plain(0));
                    count -= 1;
                }
            }
        } else {
            out.push(CodeLengthSymbol::plain(len));
            count -= 1;
            while count > 0 {
                if count >= 3 {
                    let n = count.min(6);
                    out.push(CodeLengthSymbol::repeat(16, n - 3, 2));
                    count -= n;
                } else {
                    out.push(CodeLengthSymbol::plain(len));
                    count -= 1;
                }
            }
        }
    }

    out
}

/// Exact size of `len` bytes written as stored blocks starting at bit
/// position `bit_pos`.
fn stored_cost(bit_pos: u64, len: usize) -> u64 {
    let blocks = len.div_ceil(MAX_STORED_LEN).max(1) as u64;
    let first_pad = (8 - (bit_pos + 3) % 8) % 8;
    // Later headers start byte aligned, so 3 header bits plus 5 padding.
    3 + first_pad + (blocks - 1) * 8 + blocks * 32 + 8 * len as u64
}

fn write_stored_blocks(writer: &mut BitWriter, data: &[u8], is_final: bool) {
    if data.is_empty() {
        write_stored_block(writer, &[], is_final);
        return;
    }
    let mut chunks = data.chunks(MAX_STORED_LEN).peekable();
    while let Some(chunk) = chunks.next() {
        let last = chunks.peek().is_none();
        write_stored_block(writer, chunk, is_final && last);
    }
}

fn write_stored_block(writer: &mut BitWriter, chunk: &[u8], is_final: bool) {
    writer.write_bits(is_final as u32, 1);
    writer.write_bits(0b00, 2);
    writer.align_to_byte();
    let len = chunk.len() as u16;
    writer.write_bytes(&len.to_le_bytes());
    writer.write_bytes(&(!len).to_le_bytes());
    writer.write_bytes(chunk);
}

/// Write the block body and end-of-block code.
fn write_tokens(writer: &mut BitWriter, tokens: &[Lz77Token], litlen_lengths: &[u8], dist_lengths: &[u8]) {
    let litlen_codes = canonical_codes(litlen_lengths);
    let dist_codes = canonical_codes(dist_lengths);

    for token in tokens {
        match *token {
            Lz77Token::Literal(byte) => {
                let symbol = byte as usize;
                writer.write_bits(litlen_codes[symbol] as u32, litlen_lengths[symbol] as u32);
            }
            Lz77Token::Match { length, distance } => {
                let (len_code, len_extra_bits, len_extra) = length_to_code(length);
                let symbol = len_code as usize;
                writer.write_bits(litlen_codes[symbol] as u32, litlen_lengths[symbol] as u32);
                writer.write_bits(len_extra as u32, len_extra_bits as u32);

                let (dist_code, dist_extra_bits, dist_extra) = distance_to_code(distance);
                let symbol = dist_code as usize;
                writer.write_bits(dist_codes[symbol] as u32, dist_lengths[symbol] as u32);
                writer.write_bits(dist_extra as u32, dist_extra_bits as u32);
            }
        }
    }

    let eob = END_OF_BLOCK as usize;
    writer.write_bits(litlen_codes[eob] as u32, litlen_lengths[eob] as u32);
}
