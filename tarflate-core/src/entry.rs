//! Archive entry kinds and member path handling.
//!
//! Archive member names are `/`-separated, relative paths. The helpers here
//! normalize them, strip leading components and reject names that would
//! escape an extraction directory.

use crate::error::{Result, TarflateError};
use std::fmt;

/// Type of an archive entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryType {
    /// Regular file.
    #[default]
    Regular,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Hard link to an earlier member.
    Hardlink,
    /// Character device node.
    CharDevice,
    /// Block device node.
    BlockDevice,
    /// Named pipe.
    Fifo,
    /// Any other (vendor-specific) type, carrying its raw type byte.
    Other(u8),
}

impl EntryType {
    /// Check if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, EntryType::Regular)
    }

    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, EntryType::Directory)
    }

    /// Check if this is a symbolic link.
    pub fn is_symlink(&self) -> bool {
        matches!(self, EntryType::Symlink)
    }

    /// One-character tag used in listings.
    pub fn tag(&self) -> char {
        match self {
            EntryType::Regular => '-',
            EntryType::Directory => 'd',
            EntryType::Symlink => 'l',
            EntryType::Hardlink => 'h',
            EntryType::CharDevice => 'c',
            EntryType::BlockDevice => 'b',
            EntryType::Fifo => 'p',
            EntryType::Other(_) => '?',
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryType::Regular => write!(f, "file"),
            EntryType::Directory => write!(f, "directory"),
            EntryType::Symlink => write!(f, "symlink"),
            EntryType::Hardlink => write!(f, "hardlink"),
            EntryType::CharDevice => write!(f, "character device"),
            EntryType::BlockDevice => write!(f, "block device"),
            EntryType::Fifo => write!(f, "fifo"),
            EntryType::Other(flag) => write!(f, "type {:?}", *flag as char),
        }
    }
}

/// Remove the first `count` path segments of `name`.
///
/// Empty segments and `.` are ignored when counting, and the result keeps a
/// trailing `/` when `name` had one. Returns an empty string when nothing is
/// left.
///
/// ```
/// use tarflate_core::entry::strip_components;
///
/// assert_eq!(strip_components("a/b/c.txt", 1), "b/c.txt");
/// assert_eq!(strip_components("./a/b/", 1), "b/");
/// assert_eq!(strip_components("a/", 1), "");
/// ```
pub fn strip_components(name: &str, count: usize) -> String {
    let segments: Vec<&str> = name
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    if segments.len() <= count {
        return String::new();
    }

    let mut stripped = segments[count..].join("/");
    if name.ends_with('/') {
        stripped.push('/');
    }
    stripped
}

/// Check that a member path is safe to extract below a destination
/// directory: relative, without `..` segments and without NUL bytes.
pub fn validate_path(name: &str) -> Result<()> {
    let path = std::path::Path::new(name);

    if name.is_empty() || name.starts_with('/') || path.is_absolute() {
        return Err(TarflateError::invalid_path(name));
    }

    for component in path.components() {
        match component {
            std::path::Component::Normal(s) => {
                if s.to_string_lossy().contains('\0') {
                    return Err(TarflateError::invalid_path(name));
                }
            }
            std::path::Component::CurDir => {}
            _ => return Err(TarflateError::invalid_path(name)),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_components() {
        assert_eq!(strip_components("a/b/c.txt", 0), "a/b/c.txt");
        assert_eq!(strip_components("a/b/c.txt", 1), "b/c.txt");
        assert_eq!(strip_components("a/b/c.txt", 2), "c.txt");
        assert_eq!(strip_components("a/b/c.txt", 3), "");
        assert_eq!(strip_components("a//b", 1), "b");
    }

    #[test]
    fn test_strip_keeps_directory_slash() {
        assert_eq!(strip_components("top/sub/", 1), "sub/");
        assert_eq!(strip_components("top/", 1), "");
    }

    #[test]
    fn test_validate_path_safe() {
        assert!(validate_path("subdir/file.txt").is_ok());
        assert!(validate_path("./file.txt").is_ok());
        assert!(validate_path("dir/").is_ok());
    }

    #[test]
    fn test_validate_path_traversal() {
        assert!(validate_path("../etc/passwd").is_err());
        assert!(validate_path("a/../../b").is_err());
        assert!(validate_path("/etc/passwd").is_err());
        assert!(validate_path("").is_err());
        assert!(matches!(
            validate_path("bad\0name"),
            Err(TarflateError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_entry_type_tags() {
        assert_eq!(EntryType::Directory.tag(), 'd');
        assert!(EntryType::Regular.is_file());
        assert_eq!(EntryType::Other(b'V').to_string(), "type 'V'");
    }
}
