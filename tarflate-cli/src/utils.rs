//! Utility functions for the CLI.

use glob::Pattern;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use tarflate_archive::{GzipDecompressor, TarReader};
use tarflate_core::TransformReader;

/// The decoding chain every read-side command uses.
pub type ArchiveReader<R> = TarReader<TransformReader<R, GzipDecompressor>>;

/// Open a `.tar.gz` file for streaming, reporting compressed bytes consumed
/// on `progress`.
pub fn open_archive(
    path: &Path,
    progress: &ProgressBar,
) -> io::Result<ArchiveReader<impl io::Read>> {
    let file = File::open(path)?;
    if let Ok(meta) = file.metadata() {
        progress.set_length(meta.len());
    }
    let source = progress.wrap_read(BufReader::new(file));
    Ok(TarReader::new(TransformReader::new(
        source,
        GzipDecompressor::new(),
    )))
}

/// Create a byte progress bar with standard styling.
pub fn create_progress_bar(enable: bool) -> ProgressBar {
    if !enable {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::with_template(
        "[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
    ) {
        pb.set_style(style.progress_chars("█▓▒░ "));
    }
    pb
}

/// Create a spinner that counts bytes for streams of unknown length.
pub fn create_spinner(enable: bool) -> ProgressBar {
    if !enable {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bytes} {msg}") {
        pb.set_style(style);
    }
    pb
}

/// Include/exclude globs, compiled once per command.
#[derive(Debug, Default)]
pub struct MemberFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl MemberFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, glob::PatternError> {
        let compile = |patterns: &[String]| {
            patterns
                .iter()
                .map(|p| Pattern::new(p))
                .collect::<Result<Vec<_>, _>>()
        };
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    /// A name passes when it matches no exclude pattern and, if any include
    /// patterns are set, at least one of them.
    pub fn matches(&self, name: &str) -> bool {
        if self.exclude.iter().any(|p| p.matches(name)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|p| p.matches(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(patterns: &[&str]) -> Vec<String> {
        patterns.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_member_filter() {
        assert!(MemberFilter::default().matches("src/main.rs"));

        let rust = MemberFilter::new(&strings(&["*.rs"]), &[]).unwrap();
        assert!(rust.matches("src/main.rs"));
        assert!(!rust.matches("README.md"));

        let filter = MemberFilter::new(&strings(&["*.rs"]), &strings(&["src/*"])).unwrap();
        assert!(!filter.matches("src/main.rs"));
        assert!(filter.matches("build.rs"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        assert!(MemberFilter::new(&strings(&["["]), &[]).is_err());
        assert!(MemberFilter::new(&[], &strings(&["a[b"])).is_err());
    }
}
