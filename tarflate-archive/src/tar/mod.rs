//! TAR archive format support.
//!
//! Reads and writes POSIX ustar archives with pax extended headers. Both
//! sides stream: [`TarReader`] yields one [`Member`] at a time over any
//! `Read`, and [`TarWriter`] copies member data from any `Read` into any
//! `Write`, so either can sit on top of a gzip codec adapter.
//!
//! ## Example
//!
//! ```rust
//! use std::io::{Cursor, Read};
//! use tarflate_archive::tar::{TarReader, TarWriter};
//!
//! let mut writer = TarWriter::new(Vec::new());
//! writer.add_file("hello.txt", b"Hello, TAR!").unwrap();
//! let archive = writer.into_inner().unwrap();
//!
//! let mut reader = TarReader::new(Cursor::new(archive));
//! let mut member = reader.next_member().unwrap().unwrap();
//! let mut text = String::new();
//! member.read_to_string(&mut text).unwrap();
//! assert_eq!(member.name(), "hello.txt");
//! assert_eq!(text, "Hello, TAR!");
//! ```

mod header;
mod pax;
mod reader;
mod writer;

pub use header::{GNU_LONGLINK, GNU_LONGNAME, PAX_GLOBAL_HEADER, PAX_HEADER, TarHeader};
pub use pax::{MAX_PAX_SIZE, PaxExtensions, format_pax_record};
pub use reader::{Member, TarReader};
pub use writer::TarWriter;

/// TAR block size.
pub const BLOCK_SIZE: usize = 512;

/// Zero bytes following `size` bytes of data up to the next block boundary.
pub(crate) fn padding(size: u64) -> u64 {
    let rem = size % BLOCK_SIZE as u64;
    if rem == 0 { 0 } else { BLOCK_SIZE as u64 - rem }
}
