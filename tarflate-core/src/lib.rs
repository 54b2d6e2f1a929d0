//! # Tarflate Core
//!
//! Core components for the Tarflate streaming compression toolkit.
//!
//! This crate provides the building blocks every codec shares:
//!
//! - [`buffer`]: Buffer views, fragmented sequences and a growable sink
//! - [`transform`]: The transform engine and `io` adapters for chaining
//! - [`bitstream`]: Resumable bit-level reader and writer
//! - [`ringbuffer`]: Sliding window history for LZ77 decoding
//! - [`crc`]: CRC-32 checksum
//! - [`traits`]: The `Codec` trait, flush modes and compression levels
//! - [`entry`]: Archive entry kinds and member path handling
//! - [`error`]: Error types
//!
//! ## Architecture
//!
//! Tarflate is designed as a layered protocol stack:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ L4: CLI                                                 │
//! │     compress / expand / list / test                     │
//! ├─────────────────────────────────────────────────────────┤
//! │ L3: Container                                           │
//! │     GZIP envelope, ustar/pax, directory orchestration   │
//! ├─────────────────────────────────────────────────────────┤
//! │ L2: Codec                                               │
//! │     Deflate (LZ77+Huffman)                              │
//! ├─────────────────────────────────────────────────────────┤
//! │ L1: Core (this crate)                                   │
//! │     Buffers, transform engine, bitstream, window, CRC   │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use tarflate_core::buffer::{DynamicBuffer, OutputBuffers};
//! use tarflate_core::crc::Crc32;
//!
//! let mut sink = DynamicBuffer::new();
//! let room = sink.chunk_mut();
//! room[..5].copy_from_slice(b"hello");
//! sink.advance(5);
//!
//! assert_eq!(Crc32::compute(sink.data()), 0x3610A686);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod bitstream;
pub mod buffer;
pub mod crc;
pub mod entry;
pub mod error;
pub mod ringbuffer;
pub mod traits;
pub mod transform;

// Re-exports for convenience
pub use bitstream::{BitReader, BitWriter};
pub use buffer::{ConstBufferSeq, DynamicBuffer, InputBuffers, MutableBufferSeq, OutputBuffers};
pub use crc::Crc32;
pub use entry::EntryType;
pub use error::{Result, StreamLayer, TarflateError};
pub use ringbuffer::RingBuffer;
pub use traits::{Codec, CompressionLevel, FlushMode};
pub use transform::{DeferredError, TransformReader, TransformResult, TransformWriter, transform};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::buffer::{
        ConstBufferSeq, DynamicBuffer, InputBuffers, MutableBufferSeq, OutputBuffers,
    };
    pub use crate::error::{Result, StreamLayer, TarflateError};
    pub use crate::traits::{Codec, CompressionLevel, FlushMode};
    pub use crate::transform::{TransformReader, TransformResult, TransformWriter, transform};
}
