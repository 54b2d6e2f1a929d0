//! Core traits and small value types shared by every codec.

use crate::error::Result;
use crate::transform::TransformResult;

/// Flush mode passed to each transform step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushMode {
    /// No flush - the codec may buffer output indefinitely.
    #[default]
    None,
    /// Sync flush - emit a byte-aligned boundary so everything consumed so
    /// far is decodable, without ending the stream.
    Sync,
    /// Finish - complete the stream, including trailers and padding.
    Finish,
}

/// A stateful, resumable byte transform (compressor, decompressor or a
/// container wrapper around one).
///
/// A single step consumes a prefix of `input` and fills a prefix of `output`,
/// never blocking. The caller keeps calling with advanced buffers until the
/// returned result says `done` (or until it runs out of input for
/// [`FlushMode::None`] and [`FlushMode::Sync`]).
///
/// A step that fails after writing output reports that output and returns
/// the error from the next call (see
/// [`DeferredError`](crate::transform::DeferredError)).
///
/// Use [`transform`](crate::transform::transform) to drive a codec across
/// buffer sequences and dynamic sinks.
pub trait Codec {
    /// Run one step over a contiguous output and input region.
    ///
    /// Returns [`TarflateError::ProtocolViolation`](crate::TarflateError::ProtocolViolation)
    /// when called after the codec reported `done`.
    fn transform_chunk(
        &mut self,
        output: &mut [u8],
        input: &[u8],
        flush: FlushMode,
    ) -> Result<TransformResult>;

    /// Whether the codec reached its terminal state.
    fn is_done(&self) -> bool;

    /// Reset the codec to its initial state, ready for a new stream.
    fn reset(&mut self);
}

impl<C: Codec + ?Sized> Codec for &mut C {
    fn transform_chunk(
        &mut self,
        output: &mut [u8],
        input: &[u8],
        flush: FlushMode,
    ) -> Result<TransformResult> {
        (**self).transform_chunk(output, input, flush)
    }

    fn is_done(&self) -> bool {
        (**self).is_done()
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

impl<C: Codec + ?Sized> Codec for Box<C> {
    fn transform_chunk(
        &mut self,
        output: &mut [u8],
        input: &[u8],
        flush: FlushMode,
    ) -> Result<TransformResult> {
        (**self).transform_chunk(output, input, flush)
    }

    fn is_done(&self) -> bool {
        (**self).is_done()
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// DEFLATE effort, clamped to `0..=9`.
///
/// Higher values search longer match chains; `0` writes stored blocks only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompressionLevel(u8);

impl CompressionLevel {
    /// Stored blocks, no matching.
    pub const NONE: Self = Self(0);
    /// Shortest match chains.
    pub const FAST: Self = Self(1);
    /// The level used when none is given.
    pub const DEFAULT: Self = Self(6);
    /// Longest match chains and full lazy matching.
    pub const BEST: Self = Self(9);

    /// Values above 9 are treated as 9.
    pub fn new(level: u8) -> Self {
        Self(level.min(9))
    }

    /// Numeric level in `0..=9`.
    pub fn level(&self) -> u8 {
        self.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<u8> for CompressionLevel {
    fn from(level: u8) -> Self {
        Self::new(level)
    }
}
