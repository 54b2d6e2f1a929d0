//! Streaming tar writer.

use super::header::{PAX_GLOBAL_HEADER, PAX_HEADER, TarHeader, ustar_fallback};
use super::pax::PaxExtensions;
use super::{BLOCK_SIZE, padding};
use log::trace;
use std::io::{self, Read, Write};
use tarflate_core::error::{Result, TarflateError};

const ZERO_BLOCK: [u8; BLOCK_SIZE] = [0u8; BLOCK_SIZE];

/// Writes ustar members, adding pax records for fields ustar cannot hold.
///
/// Call [`finish`](Self::finish) or [`into_inner`](Self::into_inner) to
/// write the end-of-archive marker; dropping the writer does not.
pub struct TarWriter<W: Write> {
    writer: W,
    finished: bool,
}

impl<W: Write> TarWriter<W> {
    /// Create a new tar writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            finished: false,
        }
    }

    /// Append a member, copying exactly `header.size` bytes from `data`.
    pub fn append<R: Read>(&mut self, header: &TarHeader, data: R) -> Result<()> {
        self.check_open()?;

        let pax = header.required_extensions();
        if !pax.is_empty() {
            trace!("pax record for {:?}: {} keys", header.name, pax.len());
            self.write_pax(PAX_HEADER, &format!("PaxHeaders/{}", header.name), &pax)?;
        }

        self.writer.write_all(&header.to_block())?;
        let copied = io::copy(&mut data.take(header.size), &mut self.writer)?;
        if copied < header.size {
            return Err(TarflateError::truncated(format!(
                "data for {:?}: {copied} of {} bytes",
                header.name, header.size
            )));
        }
        self.pad(header.size)
    }

    /// Append a standalone pax header. `typeflag` selects local (`x`) or
    /// global (`g`) scope.
    pub fn append_pax(&mut self, typeflag: u8, records: &PaxExtensions) -> Result<()> {
        self.check_open()?;
        if typeflag != PAX_HEADER && typeflag != PAX_GLOBAL_HEADER {
            return Err(TarflateError::protocol(format!(
                "{:?} is not a pax header type",
                typeflag as char
            )));
        }
        let name = if typeflag == PAX_GLOBAL_HEADER {
            "GlobalHead"
        } else {
            "PaxHeader"
        };
        self.write_pax(typeflag, name, records)
    }

    /// Add a regular file with mode 0644.
    pub fn add_file(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.add_file_with_mode(name, data, 0o644)
    }

    /// Add a regular file with the given mode.
    pub fn add_file_with_mode(&mut self, name: &str, data: &[u8], mode: u32) -> Result<()> {
        let header = TarHeader::new_file(name, data.len() as u64, mode);
        self.append(&header, data)
    }

    /// Add a directory with mode 0755.
    pub fn add_directory(&mut self, name: &str) -> Result<()> {
        self.add_directory_with_mode(name, 0o755)
    }

    /// Add a directory with the given mode.
    pub fn add_directory_with_mode(&mut self, name: &str, mode: u32) -> Result<()> {
        self.append(&TarHeader::new_directory(name, mode), io::empty())
    }

    /// Add a symbolic link.
    pub fn add_symlink(&mut self, name: &str, target: &str) -> Result<()> {
        self.append(&TarHeader::new_symlink(name, target), io::empty())
    }

    /// Write the end-of-archive marker. Calling it again does nothing.
    pub fn finish(&mut self) -> Result<()> {
        if !self.finished {
            self.writer.write_all(&ZERO_BLOCK)?;
            self.writer.write_all(&ZERO_BLOCK)?;
            self.writer.flush()?;
            self.finished = true;
        }
        Ok(())
    }

    /// Finish the archive and return the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.finish()?;
        Ok(self.writer)
    }

    /// Get a reference to the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Get a mutable reference to the underlying writer.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    fn check_open(&self) -> Result<()> {
        if self.finished {
            return Err(TarflateError::protocol("append after finish"));
        }
        Ok(())
    }

    fn write_pax(&mut self, typeflag: u8, name: &str, records: &PaxExtensions) -> Result<()> {
        let data = records.to_bytes();
        let mut header = TarHeader::new_file(&ustar_fallback(name, 100), data.len() as u64, 0o644);
        header.typeflag = typeflag;
        self.writer.write_all(&header.to_block())?;
        self.writer.write_all(&data)?;
        self.pad(data.len() as u64)
    }

    fn pad(&mut self, size: u64) -> Result<()> {
        let pad = padding(size) as usize;
        if pad > 0 {
            self.writer.write_all(&ZERO_BLOCK[..pad])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tar::TarReader;
    use std::io::Cursor;

    #[test]
    fn test_tar_writer_single_file() {
        let mut writer = TarWriter::new(Vec::new());
        writer.add_file("test.txt", b"Hello, World!").unwrap();
        let tar = writer.into_inner().unwrap();

        // header + one data block + two end blocks
        assert_eq!(tar.len(), 4 * BLOCK_SIZE);
        assert_eq!(&tar[0..8], b"test.txt");
        assert_eq!(&tar[257..262], b"ustar");
        assert_eq!(&tar[BLOCK_SIZE..BLOCK_SIZE + 13], b"Hello, World!");
        assert!(tar[2 * BLOCK_SIZE..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_directory_gets_trailing_slash() {
        let mut writer = TarWriter::new(Vec::new());
        writer.add_directory("mydir").unwrap();
        let tar = writer.into_inner().unwrap();
        assert_eq!(&tar[0..6], b"mydir/");
        assert_eq!(tar[156], b'5');
    }

    #[test]
    fn test_long_name_writes_pax_first() {
        let long = "d".repeat(120) + "/file.txt";
        let mut writer = TarWriter::new(Vec::new());
        writer.add_file(&long, b"x").unwrap();
        let tar = writer.into_inner().unwrap();

        assert_eq!(tar[156], PAX_HEADER);
        let record = format!("{} path={long}\n", long.len() + 10);
        assert_eq!(&tar[BLOCK_SIZE..BLOCK_SIZE + record.len()], record.as_bytes());
    }

    #[test]
    fn test_non_ascii_symlink_target() {
        let mut writer = TarWriter::new(Vec::new());
        writer.add_symlink("link", "cible-\u{e9}t\u{e9}").unwrap();
        let tar = writer.into_inner().unwrap();

        let mut reader = TarReader::new(Cursor::new(tar));
        let member = reader.next_member().unwrap().unwrap();
        assert!(member.entry_type().is_symlink());
        assert_eq!(member.header().linkname, "cible-\u{e9}t\u{e9}");
    }

    #[test]
    fn test_large_size_uses_pax() {
        let header = TarHeader::new_file("huge", 8 << 30, 0o644);
        let mut writer = TarWriter::new(Vec::new());
        // The copy fails once the reader runs dry, after the headers.
        let err = writer.append(&header, &b"abc"[..]).unwrap_err();
        assert!(matches!(err, TarflateError::Truncated { .. }));

        let written = writer.get_ref();
        assert_eq!(written[156], PAX_HEADER);
        let record = b"19 size=8589934592\n";
        assert_eq!(&written[BLOCK_SIZE..BLOCK_SIZE + record.len()], record);
    }

    #[test]
    fn test_short_reader_truncated() {
        let header = TarHeader::new_file("f", 10, 0o644);
        let mut writer = TarWriter::new(Vec::new());
        assert!(matches!(
            writer.append(&header, &b"short"[..]),
            Err(TarflateError::Truncated { .. })
        ));
    }

    #[test]
    fn test_append_after_finish() {
        let mut writer = TarWriter::new(Vec::new());
        writer.finish().unwrap();
        writer.finish().unwrap();
        assert_eq!(writer.get_ref().len(), 2 * BLOCK_SIZE);
        assert!(matches!(
            writer.add_file("late", b""),
            Err(TarflateError::ProtocolViolation { .. })
        ));
    }

    #[test]
    fn test_streams_from_reader() {
        let data = vec![0x5Au8; 5000];
        let header = TarHeader::new_file("stream.bin", data.len() as u64, 0o600).with_mtime(42);
        let mut writer = TarWriter::new(Vec::new());
        writer.append(&header, Cursor::new(&data)).unwrap();
        let tar = writer.into_inner().unwrap();

        let mut reader = TarReader::new(Cursor::new(tar));
        let mut member = reader.next_member().unwrap().unwrap();
        assert_eq!(member.header().mode, 0o600);
        assert_eq!(member.header().mtime, 42);
        let mut out = Vec::new();
        member.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }
}
