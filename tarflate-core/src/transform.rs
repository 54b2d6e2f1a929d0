//! The transform engine.
//!
//! [`transform`] drives any [`Codec`] across buffer sequences and growable
//! sinks in one non-blocking call. [`TransformReader`] and
//! [`TransformWriter`] chain a codec in front of an `io::Read` source or an
//! `io::Write` sink, which is how the archive layer decompresses on the fly
//! without holding the whole stream in memory.
//!
//! # Example
//!
//! ```
//! use tarflate_core::buffer::{ConstBufferSeq, DynamicBuffer};
//! use tarflate_core::transform::{TransformResult, transform};
//! use tarflate_core::{Codec, FlushMode, Result};
//!
//! /// Upper-cases ASCII.
//! struct Upper(bool);
//!
//! impl Codec for Upper {
//!     fn transform_chunk(&mut self, out: &mut [u8], input: &[u8], flush: FlushMode) -> Result<TransformResult> {
//!         let n = out.len().min(input.len());
//!         for (o, i) in out.iter_mut().zip(input) {
//!             *o = i.to_ascii_uppercase();
//!         }
//!         self.0 = flush == FlushMode::Finish && n == input.len();
//!         Ok(TransformResult::new(n, n, self.0))
//!     }
//!     fn is_done(&self) -> bool { self.0 }
//!     fn reset(&mut self) { self.0 = false }
//! }
//!
//! let mut input = ConstBufferSeq::new([&b"hello, "[..], b"world"]);
//! let mut sink = DynamicBuffer::new();
//! let result = transform(&mut Upper(false), &mut sink, &mut input, FlushMode::Finish).unwrap();
//! assert!(result.done);
//! assert_eq!(sink.data(), b"HELLO, WORLD");
//! ```

use crate::buffer::{InputBuffers, OutputBuffers};
use crate::error::{Result, TarflateError};
use crate::traits::{Codec, FlushMode};
use log::trace;
use std::io::{self, Read, Write};
use std::ops::AddAssign;

/// Default scratch size of the stream adapters.
const ADAPTER_BUFFER_SIZE: usize = 32 * 1024;

/// Progress of one or more transform steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformResult {
    /// Input bytes consumed.
    pub bytes_read: usize,
    /// Output bytes produced.
    pub bytes_written: usize,
    /// Whether the codec reached its terminal state.
    pub done: bool,
}

impl TransformResult {
    /// Create a result.
    pub fn new(bytes_read: usize, bytes_written: usize, done: bool) -> Self {
        Self {
            bytes_read,
            bytes_written,
            done,
        }
    }

    /// Whether any bytes moved.
    pub fn made_progress(&self) -> bool {
        self.bytes_read > 0 || self.bytes_written > 0
    }
}

impl AddAssign for TransformResult {
    fn add_assign(&mut self, rhs: Self) {
        self.bytes_read += rhs.bytes_read;
        self.bytes_written += rhs.bytes_written;
        self.done |= rhs.done;
    }
}

/// Holds an error raised by a step that had already written output.
///
/// The failing step returns its progress, and the error comes back from the
/// next call, so output written before the failure still reaches the caller.
/// Once an error has been reported, every later call fails with
/// [`TarflateError::ProtocolViolation`].
#[derive(Debug, Default)]
pub struct DeferredError {
    pending: Option<TarflateError>,
    failed: bool,
}

impl DeferredError {
    /// Create an empty holder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Call at the start of a step: returns the held error, if any.
    pub fn check(&mut self) -> Result<()> {
        if let Some(err) = self.pending.take() {
            return Err(err);
        }
        if self.failed {
            return Err(TarflateError::protocol("codec driven after a stream error"));
        }
        Ok(())
    }

    /// Fail a step that made `progress`. Without output the error is returned
    /// now; otherwise it is held and the progress is reported.
    pub fn defer(
        &mut self,
        err: TarflateError,
        progress: TransformResult,
    ) -> Result<TransformResult> {
        self.failed = true;
        if progress.bytes_written == 0 {
            return Err(err);
        }
        self.pending = Some(err);
        Ok(TransformResult {
            done: false,
            ..progress
        })
    }
}

/// Run `codec` over as much of `input` and `output` as it can use.
///
/// Fragments are visited in order. Only the step that sees the last input
/// fragment carries `flush`; earlier steps run with [`FlushMode::None`].
/// Returns once the codec is done, or once a step makes no progress (input
/// exhausted with nothing more to emit, or output full). `input` and
/// `output` are advanced past what was used, including by steps that ran
/// before an error.
pub fn transform<C, O, I>(
    codec: &mut C,
    output: &mut O,
    input: &mut I,
    flush: FlushMode,
) -> Result<TransformResult>
where
    C: Codec + ?Sized,
    O: OutputBuffers + ?Sized,
    I: InputBuffers + ?Sized,
{
    let mut total = TransformResult::default();

    loop {
        let chunk = input.chunk();
        let step_flush = if chunk.len() == input.remaining() {
            flush
        } else {
            FlushMode::None
        };

        let step = codec.transform_chunk(output.chunk_mut(), chunk, step_flush)?;
        input.consume(step.bytes_read);
        output.advance(step.bytes_written);
        total += step;

        if step.done || !step.made_progress() {
            return Ok(total);
        }
    }
}

/// A codec chained in front of a byte source.
///
/// Reading pulls raw bytes from the inner reader on demand and returns the
/// codec's output. When the inner reader hits end of file the codec is
/// driven with [`FlushMode::Finish`], so a compressor finalizes its stream
/// and a decompressor reports [`TarflateError::Truncated`] if its stream is
/// incomplete. Once the codec is done, reads return 0; any raw bytes past
/// the end of the codec's stream are left unused.
#[derive(Debug)]
pub struct TransformReader<R, C> {
    inner: R,
    codec: C,
    buffer: Box<[u8]>,
    pos: usize,
    filled: usize,
    eof: bool,
}

impl<R: Read, C: Codec> TransformReader<R, C> {
    /// Chain `codec` in front of `inner`.
    pub fn new(inner: R, codec: C) -> Self {
        Self::with_capacity(ADAPTER_BUFFER_SIZE, inner, codec)
    }

    /// Chain with a custom raw-input buffer size.
    pub fn with_capacity(capacity: usize, inner: R, codec: C) -> Self {
        Self {
            inner,
            codec,
            buffer: vec![0u8; capacity.max(1)].into_boxed_slice(),
            pos: 0,
            filled: 0,
            eof: false,
        }
    }

    /// Get a reference to the codec.
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Get a reference to the underlying reader.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Get a mutable reference to the underlying reader.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Raw bytes read from the source but not consumed by the codec.
    pub fn unconsumed(&self) -> &[u8] {
        &self.buffer[self.pos..self.filled]
    }

    /// Consume the adapter, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn fill(&mut self) -> io::Result<()> {
        if self.pos == self.filled && !self.eof {
            self.filled = self.inner.read(&mut self.buffer)?;
            self.pos = 0;
            self.eof = self.filled == 0;
        }
        Ok(())
    }
}

impl<R: Read, C: Codec> Read for TransformReader<R, C> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        loop {
            if self.codec.is_done() {
                return Ok(0);
            }
            self.fill()?;

            let flush = if self.eof {
                FlushMode::Finish
            } else {
                FlushMode::None
            };
            let step =
                self.codec
                    .transform_chunk(out, &self.buffer[self.pos..self.filled], flush)?;
            self.pos += step.bytes_read;

            if step.done && self.pos < self.filled {
                trace!(
                    "codec finished with {} source bytes unconsumed",
                    self.filled - self.pos
                );
            }
            if step.bytes_written > 0 || step.done {
                return Ok(step.bytes_written);
            }
            if self.eof && step.bytes_read == 0 {
                return Err(TarflateError::truncated("source ended before the stream did").into());
            }
        }
    }
}

/// A codec chained in front of a byte sink.
///
/// Written bytes go through the codec and its output lands in the inner
/// writer. `flush` issues a [`FlushMode::Sync`] step; [`finish`] completes
/// the stream and hands the inner writer back.
///
/// [`finish`]: TransformWriter::finish
#[derive(Debug)]
pub struct TransformWriter<W: Write, C> {
    inner: W,
    codec: C,
    buffer: Box<[u8]>,
}

impl<W: Write, C: Codec> TransformWriter<W, C> {
    /// Chain `codec` in front of `inner`.
    pub fn new(inner: W, codec: C) -> Self {
        Self {
            inner,
            codec,
            buffer: vec![0u8; ADAPTER_BUFFER_SIZE].into_boxed_slice(),
        }
    }

    /// Get a reference to the codec.
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Get a reference to the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Get a mutable reference to the underlying writer.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Complete the stream and return the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        if !self.codec.is_done() {
            self.drive(FlushMode::Finish)?;
        }
        if !self.codec.is_done() {
            return Err(TarflateError::protocol("codec did not finish its stream"));
        }
        self.inner.flush()?;
        Ok(self.inner)
    }

    /// Run the codec with no new input until it stops producing output.
    fn drive(&mut self, flush: FlushMode) -> Result<()> {
        loop {
            let step = self.codec.transform_chunk(&mut self.buffer, &[], flush)?;
            self.inner.write_all(&self.buffer[..step.bytes_written])?;
            if step.done || step.bytes_written == 0 {
                return Ok(());
            }
        }
    }
}

impl<W: Write, C: Codec> Write for TransformWriter<W, C> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }

        loop {
            let step = self
                .codec
                .transform_chunk(&mut self.buffer, data, FlushMode::None)?;
            self.inner.write_all(&self.buffer[..step.bytes_written])?;

            if step.bytes_read > 0 {
                return Ok(step.bytes_read);
            }
            if step.bytes_written == 0 {
                return Err(TarflateError::protocol("codec refused further input").into());
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.codec.is_done() {
            self.drive(FlushMode::Sync)?;
        }
        self.inner.flush()
    }
}
