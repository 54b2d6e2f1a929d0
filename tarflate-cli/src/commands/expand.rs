//! Expand command implementation.

use crate::utils::create_progress_bar;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tarflate_archive::{ExpandOptions, expand_directory_targz};

/// Load options from a JSON config file, then apply command-line overrides.
fn resolve_options(
    archive: &Path,
    output: Option<PathBuf>,
    strip_components: Option<usize>,
    config: Option<&Path>,
) -> Result<ExpandOptions, Box<dyn std::error::Error>> {
    let mut options = match config {
        Some(path) => {
            let file = File::open(path)
                .map_err(|e| format!("cannot open config {}: {e}", path.display()))?;
            serde_json::from_reader::<_, ExpandOptions>(BufReader::new(file))
                .map_err(|e| format!("invalid config {}: {e}", path.display()))?
        }
        None => ExpandOptions::default(),
    };

    if let Some(output) = output {
        options.destination_directory = output;
    }
    if let Some(count) = strip_components {
        options.strip_components = count;
    }
    if options.input_name.is_empty() {
        options.input_name = archive.display().to_string();
    }
    Ok(options)
}

pub fn cmd_expand(
    archive: &Path,
    output: Option<PathBuf>,
    strip_components: Option<usize>,
    config: Option<&Path>,
    progress: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let options = resolve_options(archive, output, strip_components, config)?;

    let file = File::open(archive)?;
    let pb = create_progress_bar(progress);
    pb.set_length(file.metadata()?.len());
    pb.set_message("Expanding");

    let summary = expand_directory_targz(&options, pb.wrap_read(BufReader::new(file)))?;
    pb.finish_with_message("Done");

    println!(
        "Expanded {} into {}: {} files, {} directories, {} symlinks, {} bytes",
        options.input_name,
        options.destination_directory.display(),
        summary.files,
        summary.directories,
        summary.symlinks,
        summary.bytes
    );
    Ok(())
}
