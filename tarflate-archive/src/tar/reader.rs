//! Streaming tar reader.

use super::header::{GNU_LONGLINK, GNU_LONGNAME, PAX_GLOBAL_HEADER, PAX_HEADER, TarHeader};
use super::pax::{MAX_PAX_SIZE, PaxExtensions};
use super::{BLOCK_SIZE, padding};
use log::{debug, warn};
use std::io::{self, Read};
use tarflate_core::EntryType;
use tarflate_core::entry::strip_components;
use tarflate_core::error::{Result, StreamLayer, TarflateError};

/// Reads tar members one at a time from a byte source.
///
/// Each [`Member`] borrows the reader, so only one can be alive at a time.
/// Data the caller leaves unread is skipped by the next call to
/// [`next_member`](Self::next_member).
pub struct TarReader<R: Read> {
    reader: R,
    offset: u64,
    remaining: u64,
    padding: u64,
    strip_components: usize,
    global: PaxExtensions,
    finished: bool,
}

impl<R: Read> TarReader<R> {
    /// Create a new tar reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            offset: 0,
            remaining: 0,
            padding: 0,
            strip_components: 0,
            global: PaxExtensions::new(),
            finished: false,
        }
    }

    /// Drop `count` leading path segments from every member name.
    pub fn with_strip_components(mut self, count: usize) -> Self {
        self.strip_components = count;
        self
    }

    /// Bytes consumed from the source so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Consume the reader, returning the source.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Advance to the next member, or `None` at the end of the archive.
    pub fn next_member(&mut self) -> Result<Option<Member<'_, R>>> {
        if self.finished {
            return Ok(None);
        }
        self.skip_current()?;

        let mut local: Option<PaxExtensions> = None;
        let mut zero_blocks = 0;
        loop {
            let header_offset = self.offset;
            let Some(block) = self.read_block()? else {
                if local.is_some() {
                    return Err(TarflateError::truncated("member after pax header"));
                }
                if zero_blocks == 1 {
                    warn!("tar archive ends after a single zero block at offset {header_offset}");
                }
                self.finished = true;
                return Ok(None);
            };

            if block.iter().all(|&b| b == 0) {
                zero_blocks += 1;
                if zero_blocks == 2 {
                    debug!("end of tar archive at offset {}", self.offset);
                    self.finished = true;
                    return Ok(None);
                }
                continue;
            }
            if zero_blocks == 1 {
                warn!(
                    "ignoring lone zero block at offset {}",
                    header_offset - BLOCK_SIZE as u64
                );
                zero_blocks = 0;
            }

            let mut header = TarHeader::from_block(&block, header_offset)?;
            match header.typeflag {
                PAX_HEADER | PAX_GLOBAL_HEADER => {
                    let records = self.read_pax(&header)?;
                    if header.typeflag == PAX_GLOBAL_HEADER {
                        self.global.merge(&records);
                    } else {
                        local.get_or_insert_with(PaxExtensions::new).overlay(&records);
                    }
                    continue;
                }
                GNU_LONGNAME | GNU_LONGLINK => {
                    return Err(TarflateError::unsupported(format!(
                        "GNU long name record ({:?})",
                        header.typeflag as char
                    )));
                }
                _ => {}
            }

            let mut pax = self.global.clone();
            if let Some(local) = local.take() {
                pax.merge(&local);
            }
            pax.apply_to(&mut header, header_offset)?;

            self.remaining = header.size;
            self.padding = padding(header.size);

            if self.strip_components > 0 {
                let stripped = strip_components(&header.name, self.strip_components);
                if stripped.is_empty() {
                    if header.entry_type().is_file() {
                        return Err(TarflateError::invalid_path(header.name));
                    }
                    debug!("skipping {} after stripping components", header.name);
                    self.skip_current()?;
                    continue;
                }
                header.name = stripped;
                if header.entry_type() == EntryType::Hardlink {
                    header.linkname = strip_components(&header.linkname, self.strip_components);
                }
            }

            debug!(
                "tar member {:?} ({}, {} bytes) at offset {header_offset}",
                header.name,
                header.entry_type(),
                header.size
            );
            return Ok(Some(Member {
                header,
                pax,
                archive: self,
            }));
        }
    }

    fn read_pax(&mut self, header: &TarHeader) -> Result<PaxExtensions> {
        if header.size > MAX_PAX_SIZE {
            return Err(TarflateError::corrupt(
                StreamLayer::Tar,
                self.offset,
                format!("pax header of {} bytes exceeds limit", header.size),
            ));
        }
        let data_offset = self.offset;
        let mut data = vec![0u8; header.size as usize];
        self.fill(&mut data, "pax header data")?;
        self.remaining = 0;
        self.padding = padding(header.size);
        self.skip_current()?;
        PaxExtensions::parse(&data, data_offset)
    }

    /// Skip whatever is left of the current member's data and padding.
    fn skip_current(&mut self) -> Result<()> {
        let pending = self.remaining + self.padding;
        if pending == 0 {
            return Ok(());
        }
        let skipped = io::copy(&mut (&mut self.reader).take(pending), &mut io::sink())?;
        self.offset += skipped;
        if skipped < pending {
            return Err(TarflateError::truncated("tar member data"));
        }
        self.remaining = 0;
        self.padding = 0;
        Ok(())
    }

    /// Read one block, or `None` on a clean end of input.
    fn read_block(&mut self) -> Result<Option<[u8; BLOCK_SIZE]>> {
        let mut block = [0u8; BLOCK_SIZE];
        let filled = self.read_up_to(&mut block)?;
        match filled {
            0 => Ok(None),
            BLOCK_SIZE => Ok(Some(block)),
            _ => Err(TarflateError::truncated(format!(
                "tar header block at offset {}",
                self.offset - filled as u64
            ))),
        }
    }

    fn fill(&mut self, buf: &mut [u8], context: &str) -> Result<()> {
        if self.read_up_to(buf)? < buf.len() {
            return Err(TarflateError::truncated(context));
        }
        Ok(())
    }

    fn read_up_to(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.offset += filled as u64;
        Ok(filled)
    }
}

/// A member of a tar archive, readable as exactly `size` bytes of data.
pub struct Member<'a, R: Read> {
    header: TarHeader,
    pax: PaxExtensions,
    archive: &'a mut TarReader<R>,
}

impl<R: Read> Member<'_, R> {
    /// Effective member name (pax `path` when present, components stripped).
    pub fn name(&self) -> &str {
        &self.header.name
    }

    /// Effective data size.
    pub fn size(&self) -> u64 {
        self.header.size
    }

    /// Kind of member.
    pub fn entry_type(&self) -> EntryType {
        self.header.entry_type()
    }

    /// Header with pax overrides applied.
    pub fn header(&self) -> &TarHeader {
        &self.header
    }

    /// All pax records that applied to this member, global and local.
    pub fn pax_extensions(&self) -> &PaxExtensions {
        &self.pax
    }
}

impl<R: Read> Read for Member<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let archive = &mut *self.archive;
        if archive.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = buf.len().min(archive.remaining.min(usize::MAX as u64) as usize);
        let n = archive.reader.read(&mut buf[..max])?;
        if n == 0 {
            return Err(TarflateError::truncated(format!("data of {:?}", self.header.name)).into());
        }
        archive.remaining -= n as u64;
        archive.offset += n as u64;
        Ok(n)
    }
}
