//! Streaming gzip codecs.

use super::header::{GzipHeader, HeaderParser};
use log::debug;
use tarflate_core::Crc32;
use tarflate_core::error::{Result, StreamLayer, TarflateError};
use tarflate_core::traits::{Codec, CompressionLevel, FlushMode};
use tarflate_core::transform::{DeferredError, TransformResult};
use tarflate_deflate::{Deflater, Inflater};

/// Trailer length: CRC-32 and ISIZE.
const TRAILER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Header,
    Body,
    Trailer,
    Done,
}

/// Gzip decompressor: header, DEFLATE body, verified trailer.
///
/// Bytes following the trailer are not consumed, so a caller can tell
/// where the member ended.
#[derive(Debug)]
pub struct GzipDecompressor {
    state: DecodeState,
    header: HeaderParser,
    inflater: Inflater,
    crc: Crc32,
    /// Uncompressed length modulo 2^32.
    size: u32,
    trailer: [u8; TRAILER_LEN],
    trailer_len: usize,
    deferred: DeferredError,
}

impl GzipDecompressor {
    /// Create a decompressor for a single gzip member.
    pub fn new() -> Self {
        Self {
            state: DecodeState::Header,
            header: HeaderParser::new(),
            inflater: Inflater::new(),
            crc: Crc32::new(),
            size: 0,
            trailer: [0; TRAILER_LEN],
            trailer_len: 0,
            deferred: DeferredError::new(),
        }
    }

    /// The member header, once it has been parsed.
    pub fn header(&self) -> Option<&GzipHeader> {
        self.header.header()
    }

    /// Offset of the trailer within the member.
    fn trailer_offset(&self) -> u64 {
        self.header.consumed() + self.inflater.total_in()
    }

    fn check_trailer(&self) -> Result<()> {
        let t = &self.trailer;
        let stored_crc = u32::from_le_bytes([t[0], t[1], t[2], t[3]]);
        let stored_size = u32::from_le_bytes([t[4], t[5], t[6], t[7]]);
        let crc = self.crc.value();

        if stored_crc != crc {
            return Err(TarflateError::corrupt(
                StreamLayer::Gzip,
                self.trailer_offset(),
                format!("CRC-32 mismatch: stored {stored_crc:08x}, computed {crc:08x}"),
            ));
        }
        if stored_size != self.size {
            return Err(TarflateError::corrupt(
                StreamLayer::Gzip,
                self.trailer_offset() + 4,
                format!(
                    "length mismatch: stored {stored_size}, decoded {}",
                    self.size
                ),
            ));
        }
        Ok(())
    }

    /// Run the member state machine until it needs more input or room.
    fn decode(
        &mut self,
        output: &mut [u8],
        input: &[u8],
        read: &mut usize,
        written: &mut usize,
    ) -> Result<()> {
        loop {
            match self.state {
                DecodeState::Header => {
                    *read += self.header.feed(&input[*read..])?;
                    if !self.header.is_complete() {
                        return Ok(());
                    }
                    self.state = DecodeState::Body;
                }
                DecodeState::Body => {
                    let step = self.inflater.transform_chunk(
                        &mut output[*written..],
                        &input[*read..],
                        FlushMode::None,
                    )?;
                    let produced = &output[*written..*written + step.bytes_written];
                    self.crc.update(produced);
                    self.size = self.size.wrapping_add(produced.len() as u32);
                    *read += step.bytes_read;
                    *written += step.bytes_written;
                    if !step.done {
                        return Ok(());
                    }
                    self.state = DecodeState::Trailer;
                }
                DecodeState::Trailer => {
                    let take = (TRAILER_LEN - self.trailer_len).min(input.len() - *read);
                    self.trailer[self.trailer_len..self.trailer_len + take]
                        .copy_from_slice(&input[*read..*read + take]);
                    self.trailer_len += take;
                    *read += take;
                    if self.trailer_len < TRAILER_LEN {
                        return Ok(());
                    }
                    self.check_trailer()?;
                    self.state = DecodeState::Done;
                    debug!(
                        "gzip member verified: {} bytes, crc {:08x}",
                        self.size,
                        self.crc.value()
                    );
                }
                DecodeState::Done => return Ok(()),
            }
        }
    }
}

impl Default for GzipDecompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for GzipDecompressor {
    fn transform_chunk(
        &mut self,
        output: &mut [u8],
        input: &[u8],
        flush: FlushMode,
    ) -> Result<TransformResult> {
        self.deferred.check()?;
        if self.state == DecodeState::Done {
            return Err(TarflateError::protocol(
                "gzip decompressor driven after the end of the member",
            ));
        }

        let mut read = 0;
        let mut written = 0;
        let outcome = self.decode(output, input, &mut read, &mut written);
        let progress = TransformResult::new(read, written, false);
        if let Err(err) = outcome {
            return self.deferred.defer(err, progress);
        }

        let done = self.state == DecodeState::Done;
        // Stalled for input with none left to come.
        if !done && flush == FlushMode::Finish && read == input.len() && written < output.len() {
            let err = TarflateError::truncated(match self.state {
                DecodeState::Header => "gzip header",
                DecodeState::Trailer => "gzip trailer",
                _ => "gzip body",
            });
            return self.deferred.defer(err, progress);
        }

        Ok(TransformResult { done, ..progress })
    }

    fn is_done(&self) -> bool {
        self.state == DecodeState::Done
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EncodeState {
    Header { sent: usize },
    Body,
    Trailer { sent: usize },
    Done,
}

/// Gzip compressor: header, DEFLATE body and trailer.
#[derive(Debug, Clone)]
pub struct GzipCompressor {
    state: EncodeState,
    header: Vec<u8>,
    deflater: Deflater,
    crc: Crc32,
    size: u32,
    trailer: [u8; TRAILER_LEN],
}

impl GzipCompressor {
    /// Create a compressor with a default header.
    pub fn new(level: u8) -> Self {
        Self::with_header(GzipHeader::new(), CompressionLevel::new(level))
    }

    /// Create a compressor with a specific header. XFL is derived from the
    /// level.
    pub fn with_header(mut header: GzipHeader, level: CompressionLevel) -> Self {
        header.xfl = match level.level() {
            0..=1 => 4, // Fastest
            9 => 2,     // Maximum compression
            _ => 0,
        };
        Self {
            state: EncodeState::Header { sent: 0 },
            header: header.to_bytes(),
            deflater: Deflater::with_level(level),
            crc: Crc32::new(),
            size: 0,
            trailer: [0; TRAILER_LEN],
        }
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self::with_header(GzipHeader::new(), CompressionLevel::DEFAULT)
    }
}

/// Copy as much of `pending` as fits into `output`.
fn copy_pending(pending: &[u8], output: &mut [u8]) -> usize {
    let n = pending.len().min(output.len());
    output[..n].copy_from_slice(&pending[..n]);
    n
}

impl Codec for GzipCompressor {
    fn transform_chunk(
        &mut self,
        output: &mut [u8],
        input: &[u8],
        flush: FlushMode,
    ) -> Result<TransformResult> {
        if self.state == EncodeState::Done {
            return Err(TarflateError::protocol(
                "gzip compressor driven after the stream was finished",
            ));
        }

        let mut read = 0;
        let mut written = 0;

        loop {
            match self.state {
                EncodeState::Header { sent } => {
                    let n = copy_pending(&self.header[sent..], &mut output[written..]);
                    written += n;
                    if sent + n < self.header.len() {
                        self.state = EncodeState::Header { sent: sent + n };
                        break;
                    }
                    self.state = EncodeState::Body;
                }
                EncodeState::Body => {
                    let step =
                        self.deflater
                            .transform_chunk(&mut output[written..], &input[read..], flush)?;
                    let accepted = &input[read..read + step.bytes_read];
                    self.crc.update(accepted);
                    self.size = self.size.wrapping_add(accepted.len() as u32);
                    read += step.bytes_read;
                    written += step.bytes_written;
                    if !step.done {
                        break;
                    }
                    self.trailer[..4].copy_from_slice(&self.crc.value().to_le_bytes());
                    self.trailer[4..].copy_from_slice(&self.size.to_le_bytes());
                    self.state = EncodeState::Trailer { sent: 0 };
                }
                EncodeState::Trailer { sent } => {
                    let n = copy_pending(&self.trailer[sent..], &mut output[written..]);
                    written += n;
                    if sent + n < TRAILER_LEN {
                        self.state = EncodeState::Trailer { sent: sent + n };
                        break;
                    }
                    self.state = EncodeState::Done;
                }
                EncodeState::Done => break,
            }
        }

        Ok(TransformResult::new(
            read,
            written,
            self.state == EncodeState::Done,
        ))
    }

    fn is_done(&self) -> bool {
        self.state == EncodeState::Done
    }

    fn reset(&mut self) {
        self.state = EncodeState::Header { sent: 0 };
        self.deflater.reset();
        self.crc.reset();
        self.size = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarflate_core::buffer::{ConstBufferSeq, DynamicBuffer};
    use tarflate_core::transform::transform;

    fn gzip(data: &[u8], level: u8) -> Vec<u8> {
        let mut codec = GzipCompressor::new(level);
        let mut sink = DynamicBuffer::new();
        let mut input = data;
        let result = transform(&mut codec, &mut sink, &mut input, FlushMode::Finish).unwrap();
        assert!(result.done);
        sink.into_vec()
    }

    #[test]
    fn test_trailer_layout() {
        let data = b"123456789";
        let stream = gzip(data, 6);
        let trailer = &stream[stream.len() - 8..];
        assert_eq!(trailer[..4], 0xCBF4_3926u32.to_le_bytes());
        assert_eq!(trailer[4..], 9u32.to_le_bytes());
    }

    #[test]
    fn test_fragmented_roundtrip() {
        let data: Vec<u8> = (0..30_000u32).map(|i| (i % 97) as u8).collect();
        let stream = gzip(&data, 6);

        let mut codec = GzipDecompressor::new();
        let mut sink = DynamicBuffer::new();
        let mut input = ConstBufferSeq::chunked(&stream, 10);
        let result = transform(&mut codec, &mut sink, &mut input, FlushMode::Finish).unwrap();
        assert!(result.done);
        assert_eq!(result.bytes_read, stream.len());
        assert_eq!(sink.data(), data.as_slice());
    }

    #[test]
    fn test_corrupted_payload_fails_at_trailer() {
        let data = vec![b'z'; 1000];
        // Level 0 keeps the payload byte-for-byte, so the flip stays decodable.
        let mut stream = gzip(&data, 0);
        stream[10 + 5 + 100] ^= 0x01;

        let mut codec = GzipDecompressor::new();
        let mut sink = DynamicBuffer::new();
        let mut input = stream.as_slice();
        let err = transform(&mut codec, &mut sink, &mut input, FlushMode::Finish).unwrap_err();
        assert_eq!(err.corrupt_layer(), Some(StreamLayer::Gzip));
        // The decoded body stays committed in the sink.
        assert_eq!(sink.data().len(), data.len());
        assert_eq!(sink.data()[100], b'z' ^ 0x01);
    }

    #[test]
    fn test_truncated_trailer() {
        let stream = gzip(b"short", 6);
        let cut = &stream[..stream.len() - 3];
        let mut codec = GzipDecompressor::new();
        let mut out = [0u8; 64];
        let result = codec
            .transform_chunk(&mut out, cut, FlushMode::Finish)
            .unwrap();
        assert!(!result.done);
        assert_eq!(&out[..result.bytes_written], b"short");

        let err = codec
            .transform_chunk(&mut out, &[], FlushMode::Finish)
            .unwrap_err();
        assert!(matches!(err, TarflateError::Truncated { .. }));
    }

    #[test]
    fn test_leaves_bytes_after_member() {
        let mut stream = gzip(b"member", 6);
        let end = stream.len();
        stream.extend_from_slice(b"junk");

        let mut codec = GzipDecompressor::new();
        let mut out = [0u8; 64];
        let result = codec
            .transform_chunk(&mut out, &stream, FlushMode::Finish)
            .unwrap();
        assert!(result.done);
        assert_eq!(result.bytes_read, end);
        assert_eq!(&out[..result.bytes_written], b"member");
    }

    #[test]
    fn test_compressor_xfl_and_protocol() {
        let mut codec = GzipCompressor::new(9);
        let mut out = [0u8; 128];
        let result = codec
            .transform_chunk(&mut out, b"", FlushMode::Finish)
            .unwrap();
        assert!(result.done);
        assert_eq!(out[8], 2);
        assert_eq!(out[9], 255);

        let err = codec
            .transform_chunk(&mut out, b"", FlushMode::Finish)
            .unwrap_err();
        assert!(matches!(err, TarflateError::ProtocolViolation { .. }));
    }

    #[test]
    fn test_header_exposed_after_parse() {
        let header = GzipHeader::with_filename("report.csv");
        let mut codec = GzipCompressor::with_header(header, CompressionLevel::FAST);
        let mut sink = DynamicBuffer::new();
        let mut input: &[u8] = b"a,b\n1,2\n";
        transform(&mut codec, &mut sink, &mut input, FlushMode::Finish).unwrap();

        let mut decoder = GzipDecompressor::new();
        assert!(decoder.header().is_none());
        let mut out = [0u8; 64];
        decoder
            .transform_chunk(&mut out, sink.data(), FlushMode::Finish)
            .unwrap();
        let parsed = decoder.header().unwrap();
        assert_eq!(parsed.filename.as_deref(), Some("report.csv"));
        assert_eq!(parsed.xfl, 4);
    }
}
