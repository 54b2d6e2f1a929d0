//! Directory trees to and from `.tar.gz`.
//!
//! Compression walks a directory in sorted order and streams every member
//! through `TarWriter` → `TransformWriter<GzipCompressor>`. Expansion runs
//! the reverse chain, `TransformReader<GzipDecompressor>` → `TarReader`, and
//! recreates the tree below a destination directory.

use crate::gzip::{GzipCompressor, GzipDecompressor, GzipHeader};
use crate::tar::{TarHeader, TarReader, TarWriter};
use filetime::FileTime;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, Metadata};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tarflate_core::entry::validate_path;
use tarflate_core::error::{Result, TarflateError};
use tarflate_core::transform::{TransformReader, TransformWriter};
use tarflate_core::{CompressionLevel, EntryType};

/// Options for [`compress_directory_targz`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CompressOptions {
    /// DEFLATE compression level.
    pub level: CompressionLevel,
}

impl CompressOptions {
    /// Options with the default level.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the compression level.
    pub fn with_level(mut self, level: CompressionLevel) -> Self {
        self.level = level;
        self
    }
}

/// Options for [`expand_directory_targz`].
///
/// Loadable from JSON; missing fields take their defaults:
///
/// ```
/// # use tarflate_archive::ExpandOptions;
/// let json = r#"{ "destination_directory": "out", "strip_components": 1 }"#;
/// let options: ExpandOptions = serde_json::from_str(json).unwrap();
/// assert_eq!(options.strip_components, 1);
/// assert!(options.input_name.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpandOptions {
    /// Directory the archive is expanded into. Created if missing.
    pub destination_directory: PathBuf,
    /// Name of the archive, used only in diagnostics.
    pub input_name: String,
    /// Leading path segments removed from every member name.
    pub strip_components: usize,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            destination_directory: PathBuf::from("."),
            input_name: String::new(),
            strip_components: 0,
        }
    }
}

impl ExpandOptions {
    /// Expand into `destination_directory`.
    pub fn new(destination_directory: impl Into<PathBuf>) -> Self {
        Self {
            destination_directory: destination_directory.into(),
            ..Self::default()
        }
    }

    /// Set the archive name shown in diagnostics.
    pub fn with_input_name(mut self, name: impl Into<String>) -> Self {
        self.input_name = name.into();
        self
    }

    /// Remove `count` leading path segments from member names.
    pub fn with_strip_components(mut self, count: usize) -> Self {
        self.strip_components = count;
        self
    }

    fn label(&self) -> &str {
        if self.input_name.is_empty() {
            "<input>"
        } else {
            &self.input_name
        }
    }
}

/// What an expansion created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExpandSummary {
    /// Regular files written.
    pub files: u64,
    /// Directories created.
    pub directories: u64,
    /// Symbolic links created.
    pub symlinks: u64,
    /// Bytes of file data written.
    pub bytes: u64,
}

/// Archive the contents of `root` as a `.tar.gz` stream into `dest`.
///
/// Member names are relative to `root`. Returns `dest` once the gzip
/// trailer has been written.
pub fn compress_directory_targz<W: Write>(
    root: &Path,
    dest: W,
    options: &CompressOptions,
) -> Result<W> {
    let gzip = GzipCompressor::with_header(GzipHeader::new().with_mtime_now(), options.level);
    let mut archive = TarWriter::new(TransformWriter::new(dest, gzip));

    let mut members = 0u64;
    append_directory(&mut archive, root, "", &mut members)?;
    debug!("archived {members} members from {}", root.display());

    archive.into_inner()?.finish()
}

/// [`compress_directory_targz`] into a newly created file.
pub fn compress_directory_targz_to_path(
    root: &Path,
    output: &Path,
    options: &CompressOptions,
) -> Result<()> {
    let file = BufWriter::new(File::create(output)?);
    compress_directory_targz(root, file, options)?;
    Ok(())
}

fn append_directory<W: Write>(
    archive: &mut TarWriter<W>,
    dir: &Path,
    prefix: &str,
    members: &mut u64,
) -> Result<()> {
    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let name = entry
            .file_name()
            .into_string()
            .map_err(|raw| TarflateError::invalid_path(raw.to_string_lossy()))?;
        let name = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };

        let meta = fs::symlink_metadata(&path)?;
        let file_type = meta.file_type();
        let mtime = modified_seconds(&meta);

        if file_type.is_dir() {
            let header = TarHeader::new_directory(&name, file_mode(&meta, 0o755)).with_mtime(mtime);
            archive.append(&header, io::empty())?;
            append_directory(archive, &path, &name, members)?;
        } else if file_type.is_file() {
            let header =
                TarHeader::new_file(&name, meta.len(), file_mode(&meta, 0o644)).with_mtime(mtime);
            archive.append(&header, File::open(&path)?)?;
        } else if file_type.is_symlink() {
            let target = fs::read_link(&path)?;
            let target = target
                .to_str()
                .ok_or_else(|| TarflateError::invalid_path(target.to_string_lossy()))?;
            let header = TarHeader::new_symlink(&name, target).with_mtime(mtime);
            archive.append(&header, io::empty())?;
        } else {
            warn!("skipping special file {}", path.display());
            continue;
        }
        *members += 1;
    }
    Ok(())
}

/// Expand a `.tar.gz` stream below `options.destination_directory`.
pub fn expand_directory_targz<R: Read>(
    options: &ExpandOptions,
    source: R,
) -> Result<ExpandSummary> {
    expand(options, source)
        .inspect(|summary| {
            debug!(
                "{}: expanded {} files, {} directories, {} symlinks ({} bytes)",
                options.label(),
                summary.files,
                summary.directories,
                summary.symlinks,
                summary.bytes
            )
        })
        .inspect_err(|e| debug!("{}: expansion failed: {e}", options.label()))
}

/// [`expand_directory_targz`] reading from a file. The file path is used as
/// the input name when the options do not set one.
pub fn expand_directory_targz_from_path(
    options: &ExpandOptions,
    archive: &Path,
) -> Result<ExpandSummary> {
    let file = File::open(archive)?;
    if options.input_name.is_empty() {
        let options = options
            .clone()
            .with_input_name(archive.display().to_string());
        expand_directory_targz(&options, file)
    } else {
        expand_directory_targz(options, file)
    }
}

fn expand<R: Read>(options: &ExpandOptions, source: R) -> Result<ExpandSummary> {
    let decoder = TransformReader::new(source, GzipDecompressor::new());
    let mut archive = TarReader::new(decoder).with_strip_components(options.strip_components);
    let root = options.destination_directory.as_path();
    fs::create_dir_all(root)?;

    let mut summary = ExpandSummary::default();
    // Directory metadata is applied last so extracting children does not
    // disturb it.
    let mut directories: Vec<(PathBuf, u32, u64)> = Vec::new();

    while let Some(mut member) = archive.next_member()? {
        let name = member.name().to_string();
        validate_path(&name)?;
        check_parents(root, &name)?;
        let path = root.join(name.trim_end_matches('/'));
        let (mode, mtime) = (member.header().mode, member.header().mtime);
        debug!("{}: {} {name}", options.label(), member.entry_type());

        match member.entry_type() {
            EntryType::Directory => {
                fs::create_dir_all(&path)?;
                directories.push((path, mode, mtime));
                summary.directories += 1;
            }
            EntryType::Regular => {
                create_parent(&path)?;
                remove_symlink(&path)?;
                let mut file = File::create(&path)?;
                summary.bytes += io::copy(&mut member, &mut file)?;
                file.flush()?;
                drop(file);
                set_mode(&path, mode)?;
                filetime::set_file_mtime(&path, FileTime::from_unix_time(mtime as i64, 0))?;
                summary.files += 1;
            }
            EntryType::Symlink => {
                create_parent(&path)?;
                remove_symlink(&path)?;
                let target = member.header().linkname.clone();
                create_symlink(&target, &path)?;
                summary.symlinks += 1;
            }
            other => {
                return Err(TarflateError::unsupported(format!(
                    "{other} member {name:?} in {}",
                    options.label()
                )));
            }
        }
    }

    // Drain the rest of the gzip member so its trailer is verified.
    let mut decoder = archive.into_inner();
    io::copy(&mut decoder, &mut io::sink())?;

    for (path, mode, mtime) in directories.iter().rev() {
        set_mode(path, *mode)?;
        filetime::set_file_mtime(path, FileTime::from_unix_time(*mtime as i64, 0))?;
    }
    Ok(summary)
}

/// Reject members whose parent directories are symlinks created earlier.
fn check_parents(root: &Path, name: &str) -> Result<()> {
    let mut current = root.to_path_buf();
    let segments: Vec<&str> = name.split('/').filter(|s| !s.is_empty()).collect();
    for segment in segments.iter().take(segments.len().saturating_sub(1)) {
        current.push(segment);
        if fs::symlink_metadata(&current).is_ok_and(|m| m.file_type().is_symlink()) {
            return Err(TarflateError::invalid_path(name));
        }
    }
    Ok(())
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn remove_symlink(path: &Path) -> Result<()> {
    if fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink()) {
        fs::remove_file(path)?;
    }
    Ok(())
}

fn modified_seconds(meta: &Metadata) -> u64 {
    FileTime::from_last_modification_time(meta)
        .unix_seconds()
        .max(0) as u64
}

#[cfg(unix)]
fn file_mode(meta: &Metadata, _default: u32) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(_meta: &Metadata, default: u32) -> u32 {
    default
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn create_symlink(target: &str, path: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, path)?;
    Ok(())
}

#[cfg(not(unix))]
fn create_symlink(target: &str, path: &Path) -> Result<()> {
    Err(TarflateError::unsupported(format!(
        "symlink {} -> {target}",
        path.display()
    )))
}
