//! GZIP format support (RFC 1952).
//!
//! GZIP wraps a single DEFLATE stream between a small header and a CRC-32 /
//! length trailer. [`GzipDecompressor`] and [`GzipCompressor`] are
//! [`Codec`](tarflate_core::Codec)s, so they run through the same transform
//! engine and stream adapters as the raw DEFLATE codecs.
//!
//! A checksum or length mismatch in the trailer is reported as a corrupt
//! stream at the gzip layer, separate from corruption inside the DEFLATE
//! data.
//!
//! ## Example
//!
//! ```rust
//! use tarflate_archive::gzip;
//!
//! // Compress data
//! let data = b"Hello, World!";
//! let compressed = gzip::compress(data, 6).unwrap();
//!
//! // Decompress data
//! let mut reader = std::io::Cursor::new(compressed);
//! let decompressed = gzip::decompress(&mut reader).unwrap();
//! assert_eq!(decompressed, data);
//! ```

mod codec;
mod header;

pub use codec::{GzipCompressor, GzipDecompressor};
pub use header::{CM_DEFLATE, GZIP_MAGIC, GzipHeader, OS_UNKNOWN, flags};

use std::io::Read;
use tarflate_core::buffer::DynamicBuffer;
use tarflate_core::error::Result;
use tarflate_core::traits::{CompressionLevel, FlushMode};
use tarflate_core::transform::{TransformReader, transform};

/// Compress data to GZIP format.
pub fn compress(data: &[u8], level: u8) -> Result<Vec<u8>> {
    compress_with_header(data, GzipHeader::new(), level)
}

/// Compress data to GZIP format with filename.
pub fn compress_with_filename(data: &[u8], filename: &str, level: u8) -> Result<Vec<u8>> {
    let header = GzipHeader::with_filename(filename).with_mtime_now();
    compress_with_header(data, header, level)
}

fn compress_with_header(data: &[u8], header: GzipHeader, level: u8) -> Result<Vec<u8>> {
    let mut codec = GzipCompressor::with_header(header, CompressionLevel::new(level));
    let mut sink = DynamicBuffer::new();
    let mut input = data;
    transform(&mut codec, &mut sink, &mut input, FlushMode::Finish)?;
    Ok(sink.into_vec())
}

/// Decompress a GZIP member read from `reader`.
pub fn decompress<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut decoder = TransformReader::new(reader, GzipDecompressor::new());
    let mut output = Vec::new();
    decoder.read_to_end(&mut output)?;
    Ok(output)
}
