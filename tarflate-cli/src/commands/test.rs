//! Test command implementation.

use crate::utils::{ArchiveReader, create_progress_bar, open_archive};
use log::debug;
use std::io::{self, Read};
use std::path::Path;

/// Totals for a fully decoded archive.
#[derive(Debug, Default, PartialEq, Eq)]
struct Verified {
    members: u64,
    bytes: u64,
}

/// Read every member and the gzip trailer. Any corruption surfaces as an
/// error from the codec chain.
fn verify<R: Read>(mut reader: ArchiveReader<R>) -> Result<Verified, Box<dyn std::error::Error>> {
    let mut verified = Verified::default();
    while let Some(mut member) = reader.next_member()? {
        let copied = io::copy(&mut member, &mut io::sink())?;
        debug!("OK: {} ({copied} bytes)", member.name());
        verified.members += 1;
        verified.bytes += copied;
    }

    let trailing = io::copy(&mut reader.into_inner(), &mut io::sink())?;
    if trailing > 0 {
        debug!("{trailing} bytes of padding after the end of the archive");
    }
    Ok(verified)
}

pub fn cmd_test(archive: &Path, progress: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Testing {}", archive.display());

    let pb = create_progress_bar(progress);
    let verified = verify(open_archive(archive, &pb)?)?;
    pb.finish_and_clear();

    println!(
        "{} members, {} bytes: everything is OK",
        verified.members, verified.bytes
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tarflate_archive::{GzipCompressor, GzipDecompressor, TarReader, TarWriter};
    use tarflate_core::{TransformReader, TransformWriter};

    fn sample_targz() -> Vec<u8> {
        let encoder = TransformWriter::new(Vec::new(), GzipCompressor::new(6));
        let mut writer = TarWriter::new(encoder);
        writer.add_directory("dir").unwrap();
        writer.add_file("dir/a.txt", b"alpha alpha alpha").unwrap();
        writer.add_file("dir/b.txt", &[0u8; 1500]).unwrap();
        writer.into_inner().unwrap().finish().unwrap()
    }

    fn reader(data: Vec<u8>) -> ArchiveReader<Cursor<Vec<u8>>> {
        TarReader::new(TransformReader::new(Cursor::new(data), GzipDecompressor::new()))
    }

    #[test]
    fn test_verify_counts_members() {
        let verified = verify(reader(sample_targz())).unwrap();
        assert_eq!(
            verified,
            Verified {
                members: 3,
                bytes: 17 + 1500
            }
        );
    }

    #[test]
    fn test_verify_detects_bad_trailer() {
        let mut data = sample_targz();
        let size_pos = data.len() - 2;
        data[size_pos] ^= 0x01;
        assert!(verify(reader(data)).is_err());
    }
}
