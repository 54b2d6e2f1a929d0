//! Streaming DEFLATE (RFC 1951) for tarflate.
//!
//! [`Inflater`] and [`Deflater`] are resumable state machines that implement
//! [`tarflate_core::Codec`]. They accept input and output buffers of any
//! size, down to a single byte, and pick up from the exact bit position they
//! stopped at on the previous call. Wrap them in
//! [`tarflate_core::TransformReader`] or [`tarflate_core::TransformWriter`]
//! to use them as `std::io` adapters.
//!
//! The inflater accepts stored, fixed-code and dynamic-code blocks. The
//! deflater tokenizes with a hash-chained LZ77 matcher and, for every block,
//! emits whichever of the three encodings is smallest. A flush request ends
//! the current block and appends an empty stored block so the receiver can
//! decode everything written so far.
//!
//! ```rust
//! use tarflate_deflate::{deflate, inflate};
//!
//! let text = b"abcabcabcabcabc, then something different";
//! let packed = deflate(text, 9).unwrap();
//! assert_eq!(inflate(&packed).unwrap(), text);
//! ```
//!
//! Levels run from 0 (stored blocks only) to 9. Higher levels follow longer
//! hash chains, and from level 5 up a match is held back one byte when the
//! next position might yield a longer one.

#![warn(missing_docs)]

pub mod deflate;
pub mod huffman;
pub mod inflate;
pub mod lz77;
pub mod tables;

pub use deflate::{Deflater, deflate};
pub use huffman::{HuffmanBuilder, HuffmanTree};
pub use inflate::{Inflater, inflate};
pub use lz77::{Lz77Encoder, Lz77Token};
