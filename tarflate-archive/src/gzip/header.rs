//! GZIP header parsing and writing.

use log::trace;
use std::time::{SystemTime, UNIX_EPOCH};
use tarflate_core::Crc32;
use tarflate_core::error::{Result, StreamLayer, TarflateError};

/// GZIP magic bytes.
pub const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// GZIP compression method: DEFLATE.
pub const CM_DEFLATE: u8 = 8;

/// Operating system byte for "unknown".
pub const OS_UNKNOWN: u8 = 255;

/// GZIP header flags.
pub mod flags {
    /// Text file.
    pub const FTEXT: u8 = 0x01;
    /// Header CRC present.
    pub const FHCRC: u8 = 0x02;
    /// Extra field present.
    pub const FEXTRA: u8 = 0x04;
    /// Original filename present.
    pub const FNAME: u8 = 0x08;
    /// Comment present.
    pub const FCOMMENT: u8 = 0x10;
    /// Bits that must be zero.
    pub const RESERVED: u8 = 0xE0;
}

/// GZIP member header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GzipHeader {
    /// Modification time (Unix timestamp, 0 if unknown).
    pub mtime: u32,
    /// Extra flags.
    pub xfl: u8,
    /// Operating system.
    pub os: u8,
    /// The payload is probably text.
    pub text: bool,
    /// Original filename (FNAME).
    pub filename: Option<String>,
    /// Comment (FCOMMENT).
    pub comment: Option<String>,
    /// Extra field payload (FEXTRA).
    pub extra: Option<Vec<u8>>,
    /// Whether a header CRC16 (FHCRC) is present.
    pub header_crc: bool,
}

impl Default for GzipHeader {
    fn default() -> Self {
        Self {
            mtime: 0,
            xfl: 0,
            os: OS_UNKNOWN,
            text: false,
            filename: None,
            comment: None,
            extra: None,
            header_crc: false,
        }
    }
}

impl GzipHeader {
    /// Create a new GZIP header with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a header with filename.
    pub fn with_filename(filename: &str) -> Self {
        Self {
            filename: Some(filename.to_string()),
            ..Self::default()
        }
    }

    /// Set the modification time to now.
    pub fn with_mtime_now(mut self) -> Self {
        self.mtime = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        self
    }

    /// Set the comment.
    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }

    /// Flag byte implied by the optional fields.
    pub fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.text {
            flags |= flags::FTEXT;
        }
        if self.header_crc {
            flags |= flags::FHCRC;
        }
        if self.extra.is_some() {
            flags |= flags::FEXTRA;
        }
        if self.filename.is_some() {
            flags |= flags::FNAME;
        }
        if self.comment.is_some() {
            flags |= flags::FCOMMENT;
        }
        flags
    }

    /// Serialize the header.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(10);
        out.extend_from_slice(&GZIP_MAGIC);
        out.push(CM_DEFLATE);
        out.push(self.flags());
        out.extend_from_slice(&self.mtime.to_le_bytes());
        out.push(self.xfl);
        out.push(self.os);

        if let Some(ref extra) = self.extra {
            let len = extra.len().min(u16::MAX as usize);
            out.extend_from_slice(&(len as u16).to_le_bytes());
            out.extend_from_slice(&extra[..len]);
        }
        if let Some(ref filename) = self.filename {
            out.extend(filename.bytes().filter(|&b| b != 0));
            out.push(0);
        }
        if let Some(ref comment) = self.comment {
            out.extend(comment.bytes().filter(|&b| b != 0));
            out.push(0);
        }
        if self.header_crc {
            let crc = Crc32::compute(&out) as u16;
            out.extend_from_slice(&crc.to_le_bytes());
        }

        out
    }
}

/// Position within the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Fixed,
    ExtraLen,
    Extra { remaining: usize },
    Name,
    Comment,
    HeaderCrc,
    Complete,
}

/// Incremental header parser, fed one input chunk at a time.
#[derive(Debug, Clone)]
pub(crate) struct HeaderParser {
    field: Field,
    flags: u8,
    /// Bytes of the field being collected.
    scratch: Vec<u8>,
    header: GzipHeader,
    crc: Crc32,
    consumed: u64,
}

impl HeaderParser {
    pub(crate) fn new() -> Self {
        Self {
            field: Field::Fixed,
            flags: 0,
            scratch: Vec::with_capacity(10),
            header: GzipHeader::default(),
            crc: Crc32::new(),
            consumed: 0,
        }
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.field == Field::Complete
    }

    /// The parsed header, once complete.
    pub(crate) fn header(&self) -> Option<&GzipHeader> {
        self.is_complete().then_some(&self.header)
    }

    /// Header length in bytes so far.
    pub(crate) fn consumed(&self) -> u64 {
        self.consumed
    }

    fn corrupt(&self, message: impl Into<String>) -> TarflateError {
        TarflateError::corrupt(StreamLayer::Gzip, self.consumed, message)
    }

    /// Consume header bytes from `input`, stopping at the end of the header.
    /// Returns the number of bytes used.
    pub(crate) fn feed(&mut self, input: &[u8]) -> Result<usize> {
        let mut used = 0;

        while self.field != Field::Complete && used < input.len() {
            let byte = input[used];
            used += 1;
            if self.field != Field::HeaderCrc {
                self.crc.update(&[byte]);
            }
            self.step(byte)?;
            self.consumed += 1;
        }

        Ok(used)
    }

    fn step(&mut self, byte: u8) -> Result<()> {
        match self.field {
            Field::Fixed => {
                self.scratch.push(byte);
                match self.scratch.len() {
                    2 if self.scratch[..] != GZIP_MAGIC => {
                        return Err(self.corrupt(format!(
                            "not a gzip stream (magic {:02x} {:02x})",
                            self.scratch[0], self.scratch[1]
                        )));
                    }
                    3 if byte != CM_DEFLATE => {
                        return Err(TarflateError::unsupported(format!(
                            "gzip compression method {byte}"
                        )));
                    }
                    4 if byte & flags::RESERVED != 0 => {
                        return Err(TarflateError::unsupported(format!(
                            "gzip reserved flag bits {byte:#04x}"
                        )));
                    }
                    10 => {
                        let fixed = &self.scratch;
                        self.flags = fixed[3];
                        self.header.text = self.flags & flags::FTEXT != 0;
                        self.header.mtime =
                            u32::from_le_bytes([fixed[4], fixed[5], fixed[6], fixed[7]]);
                        self.header.xfl = fixed[8];
                        self.header.os = fixed[9];
                        self.scratch.clear();
                        self.field = self.next_field(flags::FTEXT);
                    }
                    _ => {}
                }
            }
            Field::ExtraLen => {
                self.scratch.push(byte);
                if self.scratch.len() == 2 {
                    let len = u16::from_le_bytes([self.scratch[0], self.scratch[1]]) as usize;
                    self.scratch.clear();
                    self.header.extra = Some(Vec::with_capacity(len));
                    self.field = if len == 0 {
                        self.next_field(flags::FEXTRA)
                    } else {
                        Field::Extra { remaining: len }
                    };
                }
            }
            Field::Extra { remaining } => {
                if let Some(extra) = self.header.extra.as_mut() {
                    extra.push(byte);
                }
                self.field = if remaining == 1 {
                    self.next_field(flags::FEXTRA)
                } else {
                    Field::Extra {
                        remaining: remaining - 1,
                    }
                };
            }
            Field::Name | Field::Comment => {
                if byte != 0 {
                    self.scratch.push(byte);
                    return Ok(());
                }
                // ISO 8859-1 per RFC 1952; decoded leniently.
                let text = String::from_utf8_lossy(&self.scratch).into_owned();
                self.scratch.clear();
                if self.field == Field::Name {
                    self.header.filename = Some(text);
                    self.field = self.next_field(flags::FNAME);
                } else {
                    self.header.comment = Some(text);
                    self.field = self.next_field(flags::FCOMMENT);
                }
            }
            Field::HeaderCrc => {
                self.scratch.push(byte);
                if self.scratch.len() == 2 {
                    let stored = u16::from_le_bytes([self.scratch[0], self.scratch[1]]);
                    let computed = self.crc.value() as u16;
                    if stored != computed {
                        return Err(self.corrupt(format!(
                            "header CRC mismatch: stored {stored:#06x}, computed {computed:#06x}"
                        )));
                    }
                    self.scratch.clear();
                    self.header.header_crc = true;
                    self.field = Field::Complete;
                }
            }
            Field::Complete => {}
        }

        if self.field == Field::Complete {
            trace!("gzip header parsed: {:?}", self.header);
        }
        Ok(())
    }

    /// The optional field following the one flagged by `after`.
    fn next_field(&self, after: u8) -> Field {
        let order = [
            (flags::FEXTRA, Field::ExtraLen),
            (flags::FNAME, Field::Name),
            (flags::FCOMMENT, Field::Comment),
            (flags::FHCRC, Field::HeaderCrc),
        ];
        let start = match after {
            flags::FEXTRA => 1,
            flags::FNAME => 2,
            flags::FCOMMENT => 3,
            _ => 0,
        };
        order[start..]
            .iter()
            .find(|(flag, _)| self.flags & flag != 0)
            .map_or(Field::Complete, |&(_, field)| field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(bytes: &[u8]) -> Result<(GzipHeader, usize)> {
        let mut parser = HeaderParser::new();
        let used = parser.feed(bytes)?;
        let header = parser.header().cloned().ok_or_else(|| {
            TarflateError::truncated("header incomplete")
        })?;
        Ok((header, used))
    }

    #[test]
    fn test_gzip_magic() {
        assert_eq!(GZIP_MAGIC, [0x1F, 0x8B]);
    }

    #[test]
    fn test_header_default() {
        let header = GzipHeader::new();
        assert_eq!(header.flags(), 0);
        assert_eq!(header.os, OS_UNKNOWN);
        assert_eq!(header.to_bytes().len(), 10);
    }

    #[test]
    fn test_header_with_filename() {
        let header = GzipHeader::with_filename("test.txt");
        assert_eq!(header.flags() & flags::FNAME, flags::FNAME);
        assert_eq!(header.filename, Some("test.txt".to_string()));
    }

    #[test]
    fn test_all_optional_fields() {
        let header = GzipHeader {
            mtime: 1_700_000_000,
            text: true,
            filename: Some("data.txt".into()),
            comment: Some("made by a test".into()),
            extra: Some(vec![b'A', b'B', 2, 0, 7, 9]),
            header_crc: true,
            ..GzipHeader::default()
        };
        let mut bytes = header.to_bytes();
        let len = bytes.len();
        bytes.extend_from_slice(b"deflate data follows");

        let (parsed, used) = parse(&bytes).unwrap();
        assert_eq!(used, len);
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_byte_at_a_time() {
        let header = GzipHeader::with_filename("name").with_comment("note");
        let bytes = header.to_bytes();
        let mut parser = HeaderParser::new();
        for b in &bytes {
            assert!(!parser.is_complete());
            assert_eq!(parser.feed(std::slice::from_ref(b)).unwrap(), 1);
        }
        assert_eq!(parser.header(), Some(&header));
        assert_eq!(parser.consumed(), bytes.len() as u64);
    }

    #[test]
    fn test_bad_magic() {
        let err = parse(&[0x1F, 0x8C, 8, 0, 0, 0, 0, 0, 0, 0]).unwrap_err();
        assert_eq!(err.corrupt_layer(), Some(StreamLayer::Gzip));
    }

    #[test]
    fn test_unsupported_method_and_flags() {
        let method = parse(&[0x1F, 0x8B, 7, 0, 0, 0, 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(method, TarflateError::UnsupportedFeature { .. }));

        let reserved = parse(&[0x1F, 0x8B, 8, 0x20, 0, 0, 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(reserved, TarflateError::UnsupportedFeature { .. }));
    }

    #[test]
    fn test_header_crc_mismatch() {
        let header = GzipHeader {
            header_crc: true,
            ..GzipHeader::default()
        };
        let mut bytes = header.to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            parse(&bytes),
            Err(TarflateError::CorruptStream { .. })
        ));
    }
}
