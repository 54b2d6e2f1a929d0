//! Ustar header records.

use super::BLOCK_SIZE;
use super::pax::PaxExtensions;
use std::time::{SystemTime, UNIX_EPOCH};
use tarflate_core::EntryType;
use tarflate_core::error::{Result, StreamLayer, TarflateError};

/// Typeflag of a pax extended header (applies to the next member only).
pub const PAX_HEADER: u8 = b'x';

/// Typeflag of a pax global extended header (applies to all later members).
pub const PAX_GLOBAL_HEADER: u8 = b'g';

/// GNU LongName typeflag.
pub const GNU_LONGNAME: u8 = b'L';

/// GNU LongLink typeflag.
pub const GNU_LONGLINK: u8 = b'K';

const NAME_LEN: usize = 100;

/// Largest value an 11-digit octal field (size, mtime) can hold.
pub(crate) const MAX_OCTAL_11: u64 = 0o77777777777;

/// Largest value a 7-digit octal field (uid, gid) can hold.
pub(crate) const MAX_OCTAL_7: u64 = 0o7777777;

/// A tar member header, with pax overrides already applied when it came
/// from a [`TarReader`](super::TarReader).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarHeader {
    /// Member name (`/`-separated; directories end in `/`).
    pub name: String,
    /// Permission bits.
    pub mode: u32,
    /// Owner UID.
    pub uid: u64,
    /// Owner GID.
    pub gid: u64,
    /// Data size in bytes.
    pub size: u64,
    /// Modification time (Unix seconds).
    pub mtime: u64,
    /// Stored header checksum (0 for headers not read from an archive).
    pub checksum: u32,
    /// Raw type flag.
    pub typeflag: u8,
    /// Link target for symlinks and hard links.
    pub linkname: String,
    /// Owner name.
    pub uname: String,
    /// Group name.
    pub gname: String,
}

impl TarHeader {
    fn new(name: &str, typeflag: u8, mode: u32) -> Self {
        Self {
            name: name.to_string(),
            mode,
            uid: 0,
            gid: 0,
            size: 0,
            mtime: now(),
            checksum: 0,
            typeflag,
            linkname: String::new(),
            uname: String::new(),
            gname: String::new(),
        }
    }

    /// Create a header for a regular file.
    pub fn new_file(name: &str, size: u64, mode: u32) -> Self {
        Self {
            size,
            ..Self::new(name, b'0', mode)
        }
    }

    /// Create a header for a directory. A trailing `/` is added if missing.
    pub fn new_directory(name: &str, mode: u32) -> Self {
        let name = if name.ends_with('/') {
            name.to_string()
        } else {
            format!("{name}/")
        };
        Self::new(&name, b'5', mode)
    }

    /// Create a header for a symlink.
    pub fn new_symlink(name: &str, target: &str) -> Self {
        Self {
            linkname: target.to_string(),
            ..Self::new(name, b'2', 0o777)
        }
    }

    /// Set the modification time.
    pub fn with_mtime(mut self, mtime: u64) -> Self {
        self.mtime = mtime;
        self
    }

    /// Kind of member described by the type flag.
    pub fn entry_type(&self) -> EntryType {
        match self.typeflag {
            b'0' | 0 | b'7' => EntryType::Regular,
            b'1' => EntryType::Hardlink,
            b'2' => EntryType::Symlink,
            b'3' => EntryType::CharDevice,
            b'4' => EntryType::BlockDevice,
            b'5' => EntryType::Directory,
            b'6' => EntryType::Fifo,
            other => EntryType::Other(other),
        }
    }

    /// Parse a non-zero header block at archive offset `offset`.
    pub fn from_block(block: &[u8; BLOCK_SIZE], offset: u64) -> Result<Self> {
        let stored = parse_u32(&block[148..156], offset + 148)?;
        let (unsigned, signed) = checksums(block);
        if stored != unsigned && stored as i64 != signed {
            return Err(TarflateError::corrupt(
                StreamLayer::Tar,
                offset,
                format!("header checksum mismatch: stored {stored:o}, computed {unsigned:o}"),
            ));
        }

        let name = parse_string(&block[0..100]);
        let ustar = &block[257..262] == b"ustar";
        let prefix = if ustar {
            parse_string(&block[345..500])
        } else {
            String::new()
        };

        Ok(Self {
            name: if prefix.is_empty() {
                name
            } else {
                format!("{prefix}/{name}")
            },
            mode: parse_u32(&block[100..108], offset + 100)?,
            uid: parse_numeric(&block[108..116], offset + 108)?,
            gid: parse_numeric(&block[116..124], offset + 116)?,
            size: parse_numeric(&block[124..136], offset + 124)?,
            mtime: parse_numeric(&block[136..148], offset + 136)?,
            checksum: stored,
            typeflag: block[156],
            linkname: parse_string(&block[157..257]),
            uname: if ustar {
                parse_string(&block[265..297])
            } else {
                String::new()
            },
            gname: if ustar {
                parse_string(&block[297..329])
            } else {
                String::new()
            },
        })
    }

    /// Pax records needed to carry fields a ustar block cannot hold.
    pub(crate) fn required_extensions(&self) -> PaxExtensions {
        let mut pax = PaxExtensions::new();
        if needs_pax_string(&self.name, NAME_LEN) {
            pax.insert("path", &self.name);
        }
        if needs_pax_string(&self.linkname, NAME_LEN) {
            pax.insert("linkpath", &self.linkname);
        }
        if self.size > MAX_OCTAL_11 {
            pax.insert("size", &self.size.to_string());
        }
        if self.mtime > MAX_OCTAL_11 {
            pax.insert("mtime", &self.mtime.to_string());
        }
        if self.uid > MAX_OCTAL_7 {
            pax.insert("uid", &self.uid.to_string());
        }
        if self.gid > MAX_OCTAL_7 {
            pax.insert("gid", &self.gid.to_string());
        }
        if needs_pax_string(&self.uname, 32) {
            pax.insert("uname", &self.uname);
        }
        if needs_pax_string(&self.gname, 32) {
            pax.insert("gname", &self.gname);
        }
        pax
    }

    /// Convert header to a 512-byte ustar block.
    ///
    /// Fields that do not fit are truncated or zeroed; pair the block with
    /// [`required_extensions`](Self::required_extensions) to keep them.
    pub fn to_block(&self) -> [u8; BLOCK_SIZE] {
        let mut block = [0u8; BLOCK_SIZE];

        write_string(&mut block[0..100], &ustar_fallback(&self.name, NAME_LEN));
        write_octal(&mut block[100..108], (self.mode & 0o7777777) as u64);
        write_octal(&mut block[108..116], clamp(self.uid, MAX_OCTAL_7));
        write_octal(&mut block[116..124], clamp(self.gid, MAX_OCTAL_7));
        write_octal(&mut block[124..136], clamp(self.size, MAX_OCTAL_11));
        write_octal(&mut block[136..148], clamp(self.mtime, MAX_OCTAL_11));
        block[156] = self.typeflag;
        write_string(&mut block[157..257], &ustar_fallback(&self.linkname, NAME_LEN));
        block[257..263].copy_from_slice(b"ustar\0");
        block[263..265].copy_from_slice(b"00");
        write_string(&mut block[265..297], &ustar_fallback(&self.uname, 32));
        write_string(&mut block[297..329], &ustar_fallback(&self.gname, 32));

        // Checksum is computed with its own field as spaces.
        block[148..156].copy_from_slice(b"        ");
        let (checksum, _) = checksums(&block);
        let field = format!("{checksum:06o}\0 ");
        block[148..156].copy_from_slice(field.as_bytes());

        block
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Unsigned and historic signed header sums, checksum field as spaces.
fn checksums(block: &[u8; BLOCK_SIZE]) -> (u32, i64) {
    let mut unsigned = 0u32;
    let mut signed = 0i64;
    for (i, &b) in block.iter().enumerate() {
        let b = if (148..156).contains(&i) { b' ' } else { b };
        unsigned += b as u32;
        signed += b as i8 as i64;
    }
    (unsigned, signed)
}

fn clamp(value: u64, max: u64) -> u64 {
    if value > max { 0 } else { value }
}

fn needs_pax_string(value: &str, field_len: usize) -> bool {
    value.len() > field_len || !value.is_ascii()
}

/// ASCII form of `value` that fits `field_len` bytes, keeping its tail.
pub(crate) fn ustar_fallback(value: &str, field_len: usize) -> String {
    let ascii: String = value
        .chars()
        .map(|c| if c.is_ascii() && c != '\0' { c } else { '_' })
        .collect();
    ascii[ascii.len().saturating_sub(field_len)..].to_string()
}

/// Parse a NUL-terminated string.
pub(crate) fn parse_string(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

/// Parse an octal field (NUL or space terminated), or a GNU base-256 field
/// when the high bit of the first byte is set.
pub(crate) fn parse_numeric(data: &[u8], offset: u64) -> Result<u64> {
    if data.first().is_some_and(|&b| b & 0x80 != 0) {
        let mut value = (data[0] & 0x7F) as u64;
        for &b in &data[1..] {
            value = value
                .checked_mul(256)
                .map(|v| v + b as u64)
                .ok_or_else(|| TarflateError::corrupt(StreamLayer::Tar, offset, "numeric field overflows"))?;
        }
        return Ok(value);
    }

    let digits: &[u8] = {
        let start = data.iter().position(|&b| b != b' ').unwrap_or(data.len());
        let rest = &data[start..];
        let end = rest
            .iter()
            .position(|&b| b == 0 || b == b' ')
            .unwrap_or(rest.len());
        &rest[..end]
    };

    digits.iter().try_fold(0u64, |acc, &b| {
        if !(b'0'..=b'7').contains(&b) {
            return Err(TarflateError::corrupt(
                StreamLayer::Tar,
                offset,
                format!("invalid octal field {:?}", String::from_utf8_lossy(data)),
            ));
        }
        acc.checked_mul(8)
            .map(|v| v + (b - b'0') as u64)
            .ok_or_else(|| TarflateError::corrupt(StreamLayer::Tar, offset, "octal field overflows"))
    })
}

fn parse_u32(data: &[u8], offset: u64) -> Result<u32> {
    let value = parse_numeric(data, offset)?;
    u32::try_from(value).map_err(|_| {
        TarflateError::corrupt(StreamLayer::Tar, offset, format!("field value {value:o} out of range"))
    })
}

/// Write a string, truncated to the field.
fn write_string(field: &mut [u8], s: &str) {
    let bytes = s.as_bytes();
    let len = bytes.len().min(field.len());
    field[..len].copy_from_slice(&bytes[..len]);
}

/// Write a zero-padded octal number followed by NUL.
fn write_octal(field: &mut [u8], value: u64) {
    let s = format!("{:0width$o}", value, width = field.len() - 1);
    let bytes = s.as_bytes();
    if bytes.len() < field.len() {
        field[..bytes.len()].copy_from_slice(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_octal() {
        assert_eq!(parse_numeric(b"0000644\0", 0).unwrap(), 0o644);
        assert_eq!(parse_numeric(b"  1750 \0", 0).unwrap(), 0o1750);
        assert_eq!(parse_numeric(b"\0\0\0\0", 0).unwrap(), 0);
        assert!(parse_numeric(b"00009\0\0\0", 0).is_err());
    }

    #[test]
    fn test_parse_base256() {
        let mut field = [0u8; 12];
        field[0] = 0x80;
        field[7] = 0x02; // 2 << 32
        assert_eq!(parse_numeric(&field, 0).unwrap(), 2 << 32);
    }

    #[test]
    fn test_parse_string() {
        assert_eq!(parse_string(b"hello\0world"), "hello");
        assert_eq!(parse_string(b"test"), "test");
    }

    #[test]
    fn test_block_roundtrip() {
        let header = TarHeader::new_file("dir/file.txt", 1234, 0o640).with_mtime(1_600_000_000);
        let block = header.to_block();
        let parsed = TarHeader::from_block(&block, 0).unwrap();

        assert_eq!(parsed.name, "dir/file.txt");
        assert_eq!(parsed.size, 1234);
        assert_eq!(parsed.mode, 0o640);
        assert_eq!(parsed.mtime, 1_600_000_000);
        assert_eq!(parsed.entry_type(), EntryType::Regular);
        assert_ne!(parsed.checksum, 0);
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut block = TarHeader::new_file("a.txt", 1, 0o644).to_block();
        block[0] = b'b';
        let err = TarHeader::from_block(&block, 1024).unwrap_err();
        assert_eq!(err.corrupt_layer(), Some(tarflate_core::StreamLayer::Tar));
        assert!(err.to_string().contains("offset 1024"));
    }

    #[test]
    fn test_oversized_checksum_field() {
        let mut block = TarHeader::new_file("a.txt", 1, 0o644).to_block();
        // Base-256 2^32 would wrap to 0 if narrowed.
        block[148..156].copy_from_slice(&[0x80, 0, 0, 1, 0, 0, 0, 0]);
        let err = TarHeader::from_block(&block, 512).unwrap_err();
        assert_eq!(err.corrupt_layer(), Some(tarflate_core::StreamLayer::Tar));
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_signed_checksum_accepted() {
        let mut block = TarHeader::new_file("caf\u{e9}", 0, 0o644).to_block();
        // Put a high byte in the name and store the signed sum.
        block[0] = 0xE9;
        block[148..156].copy_from_slice(b"        ");
        let (_, signed) = checksums(&block);
        let field = format!("{signed:06o}\0 ");
        block[148..156].copy_from_slice(field.as_bytes());
        assert!(TarHeader::from_block(&block, 0).is_ok());
    }

    #[test]
    fn test_ustar_prefix_joined() {
        let mut block = TarHeader::new_file("file.txt", 0, 0o644).to_block();
        block[345..352].copy_from_slice(b"a/b/cde");
        block[148..156].copy_from_slice(b"        ");
        let (sum, _) = checksums(&block);
        block[148..156].copy_from_slice(format!("{sum:06o}\0 ").as_bytes());
        assert_eq!(
            TarHeader::from_block(&block, 0).unwrap().name,
            "a/b/cde/file.txt"
        );
    }

    #[test]
    fn test_long_fields_need_pax() {
        let long = "x".repeat(150);
        let header = TarHeader::new_file(&long, 9 << 30, 0o644);
        let pax = header.required_extensions();
        assert_eq!(pax.get("path"), Some(long.as_str()));
        assert_eq!(pax.get("size"), Some((9u64 << 30).to_string().as_str()));

        let block = header.to_block();
        assert_eq!(parse_string(&block[0..100]).len(), 100);
        assert_eq!(parse_numeric(&block[124..136], 0).unwrap(), 0);
    }

    #[test]
    fn test_non_ascii_name_needs_pax() {
        let header = TarHeader::new_file("r\u{e9}sum\u{e9}.txt", 0, 0o644);
        assert!(header.required_extensions().get("path").is_some());
        assert_eq!(parse_string(&header.to_block()[0..100]), "r_sum_.txt");
    }
}
