//! # Tarflate Archive
//!
//! Container formats for Tarflate.
//!
//! - [`gzip`]: GZIP envelope codecs (RFC 1952)
//! - [`tar`]: Streaming ustar/pax reader and writer
//! - [`dirs`]: Directory trees to and from `.tar.gz`
//!
//! Everything streams. A `.tar.gz` is read by layering a [`TarReader`] over a
//! [`TransformReader`](tarflate_core::TransformReader) running a
//! [`GzipDecompressor`], and written by layering a [`TarWriter`] over a
//! [`TransformWriter`](tarflate_core::TransformWriter) running a
//! [`GzipCompressor`].
//!
//! ## Example
//!
//! ```rust
//! use std::io::{Cursor, Read};
//! use tarflate_archive::{GzipCompressor, GzipDecompressor, TarReader, TarWriter};
//! use tarflate_core::{TransformReader, TransformWriter};
//!
//! let encoder = TransformWriter::new(Vec::new(), GzipCompressor::new(6));
//! let mut writer = TarWriter::new(encoder);
//! writer.add_file("notes.txt", b"streamed through gzip").unwrap();
//! let targz = writer.into_inner().unwrap().finish().unwrap();
//!
//! let decoder = TransformReader::new(Cursor::new(targz), GzipDecompressor::new());
//! let mut reader = TarReader::new(decoder);
//! let mut member = reader.next_member().unwrap().unwrap();
//! let mut text = String::new();
//! member.read_to_string(&mut text).unwrap();
//! assert_eq!(text, "streamed through gzip");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dirs;
pub mod gzip;
pub mod tar;

pub use dirs::{
    CompressOptions, ExpandOptions, ExpandSummary, compress_directory_targz,
    compress_directory_targz_to_path, expand_directory_targz, expand_directory_targz_from_path,
};
pub use gzip::{GzipCompressor, GzipDecompressor, GzipHeader};
pub use tar::{Member, PaxExtensions, TarHeader, TarReader, TarWriter};
