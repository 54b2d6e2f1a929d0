//! Error types for Tarflate operations.
//!
//! Every failure a codec or the archive layer can report is one of a small
//! set of kinds: the caller drove a codec wrongly, the bytes are corrupt, the
//! bytes ended too early, or the input uses something deliberately left out.
//! Transport failures pass through as [`TarflateError::Io`].

use std::fmt;
use std::io;
use thiserror::Error;

/// The format layer that detected a corrupt stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamLayer {
    /// Raw DEFLATE bitstream.
    Deflate,
    /// Gzip envelope (header, CRC-32 or length trailer).
    Gzip,
    /// Ustar/pax archive structure.
    Tar,
}

impl fmt::Display for StreamLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamLayer::Deflate => write!(f, "deflate"),
            StreamLayer::Gzip => write!(f, "gzip"),
            StreamLayer::Tar => write!(f, "tar"),
        }
    }
}

/// The main error type for Tarflate operations.
#[derive(Debug, Error)]
pub enum TarflateError {
    /// I/O error from an underlying reader/writer or the filesystem.
    #[error("I/O error: {0}")]
    Io(io::Error),

    /// A codec was driven after reaching its terminal state, or with an
    /// invalid sequence of calls.
    #[error("Protocol violation: {message}")]
    ProtocolViolation {
        /// Description of the misuse.
        message: String,
    },

    /// The input does not follow the format.
    #[error("Corrupt {layer} stream at offset {offset}: {message}")]
    CorruptStream {
        /// Layer that rejected the input.
        layer: StreamLayer,
        /// Byte offset (within that layer's input) where it was detected.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// Input ended in the middle of a record or block.
    #[error("Truncated input: {context}")]
    Truncated {
        /// What was being read when the input ran out.
        context: String,
    },

    /// The input uses a feature this implementation does not support.
    #[error("Unsupported feature: {feature}")]
    UnsupportedFeature {
        /// Name of the feature.
        feature: String,
    },

    /// A member path is unusable: empty after stripping, absolute, or
    /// escaping the destination.
    #[error("Invalid path in entry: {path:?}")]
    InvalidPath {
        /// The offending path.
        path: String,
    },
}

/// Result type alias for Tarflate operations.
pub type Result<T> = std::result::Result<T, TarflateError>;

impl TarflateError {
    /// Create a protocol violation error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            message: message.into(),
        }
    }

    /// Create a corrupt stream error for the given layer.
    pub fn corrupt(layer: StreamLayer, offset: u64, message: impl Into<String>) -> Self {
        Self::CorruptStream {
            layer,
            offset,
            message: message.into(),
        }
    }

    /// Create a truncated input error.
    pub fn truncated(context: impl Into<String>) -> Self {
        Self::Truncated {
            context: context.into(),
        }
    }

    /// Create an unsupported feature error.
    pub fn unsupported(feature: impl Into<String>) -> Self {
        Self::UnsupportedFeature {
            feature: feature.into(),
        }
    }

    /// Create an invalid path error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath { path: path.into() }
    }

    /// The layer that reported corruption, if this is a corrupt stream error.
    pub fn corrupt_layer(&self) -> Option<StreamLayer> {
        match self {
            Self::CorruptStream { layer, .. } => Some(*layer),
            _ => None,
        }
    }
}

impl From<io::Error> for TarflateError {
    /// Unwraps errors that were tunnelled through `std::io` adapters so the
    /// original kind survives a round trip through `Read`/`Write`.
    fn from(err: io::Error) -> Self {
        if err.get_ref().is_some_and(|inner| inner.is::<TarflateError>()) {
            let kind = err.kind();
            return match err.into_inner().map(|inner| inner.downcast::<TarflateError>()) {
                Some(Ok(inner)) => *inner,
                Some(Err(other)) => Self::Io(io::Error::new(kind, other)),
                None => Self::Io(kind.into()),
            };
        }
        Self::Io(err)
    }
}

impl From<TarflateError> for io::Error {
    fn from(err: TarflateError) -> Self {
        match err {
            TarflateError::Io(inner) => inner,
            TarflateError::Truncated { .. } => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            TarflateError::InvalidPath { .. } => io::Error::new(io::ErrorKind::InvalidInput, err),
            TarflateError::UnsupportedFeature { .. } => {
                io::Error::new(io::ErrorKind::Unsupported, err)
            }
            _ => io::Error::new(io::ErrorKind::InvalidData, err),
        }
    }
}
