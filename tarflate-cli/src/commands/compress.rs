//! Compress command implementation.

use crate::utils::create_spinner;
use log::info;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tarflate_archive::{CompressOptions, compress_directory_targz};
use tarflate_core::CompressionLevel;

pub fn cmd_compress(
    directory: &Path,
    output: &Path,
    level: CompressionLevel,
    progress: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !directory.is_dir() {
        return Err(format!("{} is not a directory", directory.display()).into());
    }

    let pb = create_spinner(progress);
    pb.set_message(output.display().to_string());

    let sink = pb.wrap_write(BufWriter::new(File::create(output)?));
    let options = CompressOptions::new().with_level(level);
    compress_directory_targz(directory, sink, &options)?;
    pb.finish_with_message("Done");

    let size = std::fs::metadata(output)?.len();
    info!(
        "compressed {} into {} ({size} bytes, level {})",
        directory.display(),
        output.display(),
        level.level()
    );
    println!("Created: {} ({} bytes)", output.display(), size);
    Ok(())
}
