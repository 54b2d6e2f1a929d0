//! Tarflate CLI - streaming .tar.gz utility
//!
//! Packs directories into `.tar.gz` archives and expands, lists and verifies
//! them, all without buffering whole archives in memory.

mod commands;
mod utils;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use commands::{ListOptions, cmd_compress, cmd_expand, cmd_list, cmd_test};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tarflate")]
#[command(author, version, about = "Streaming DEFLATE, gzip and tar/pax utility")]
#[command(long_about = "
Tarflate is a Pure Rust implementation of DEFLATE, gzip and ustar/pax,
driven as one streaming pipeline.

Examples:
  tarflate compress ./project project.tar.gz
  tarflate compress -l best ./project project.tar.gz
  tarflate expand project.tar.gz -o out --strip-components 1
  tarflate expand project.tar.gz --config expand.json
  tarflate list project.tar.gz --json -I '*.rs'
  tarflate test project.tar.gz
")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack a directory into a .tar.gz archive
    #[command(alias = "c")]
    Compress {
        /// Directory to archive
        directory: PathBuf,

        /// Output archive file
        output: PathBuf,

        /// Compression level
        #[arg(short = 'l', long, value_enum, default_value = "normal")]
        compression: CompressionLevel,

        /// Show progress
        #[arg(short = 'P', long)]
        progress: bool,
    },

    /// Expand a .tar.gz archive into a directory
    #[command(alias = "x")]
    Expand {
        /// Archive file to expand
        archive: PathBuf,

        /// Output directory (default: ".", or the config file's value)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Remove this many leading path segments from member names
        #[arg(long)]
        strip_components: Option<usize>,

        /// JSON file with expand options
        #[arg(long)]
        config: Option<PathBuf>,

        /// Show progress
        #[arg(short = 'P', long)]
        progress: bool,
    },

    /// List the members of a .tar.gz archive
    #[command(alias = "l")]
    List {
        /// Archive file to list
        archive: PathBuf,

        /// Show mode, owner, size and modification time
        #[arg(short, long)]
        long: bool,

        /// Output as JSON (machine-readable)
        #[arg(short, long)]
        json: bool,

        /// Include only members matching pattern (glob syntax: *.txt, src/**/*)
        #[arg(short = 'I', long)]
        include: Vec<String>,

        /// Exclude members matching pattern (glob syntax)
        #[arg(short = 'X', long)]
        exclude: Vec<String>,

        /// Remove this many leading path segments from member names
        #[arg(long, default_value_t = 0)]
        strip_components: usize,
    },

    /// Decode an archive completely and verify its checksums
    #[command(alias = "t")]
    Test {
        /// Archive file to test
        archive: PathBuf,

        /// Show progress
        #[arg(short = 'P', long)]
        progress: bool,
    },

    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

/// Compression level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
enum CompressionLevel {
    /// Store without compression
    Store,
    /// Fast compression
    Fast,
    /// Normal compression (default)
    #[default]
    Normal,
    /// Best compression
    Best,
}

impl From<CompressionLevel> for tarflate_core::CompressionLevel {
    fn from(level: CompressionLevel) -> Self {
        match level {
            CompressionLevel::Store => Self::NONE,
            CompressionLevel::Fast => Self::FAST,
            CompressionLevel::Normal => Self::DEFAULT,
            CompressionLevel::Best => Self::BEST,
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Compress {
            directory,
            output,
            compression,
            progress,
        } => cmd_compress(&directory, &output, compression.into(), progress),
        Commands::Expand {
            archive,
            output,
            strip_components,
            config,
            progress,
        } => cmd_expand(
            &archive,
            output,
            strip_components,
            config.as_deref(),
            progress,
        ),
        Commands::List {
            archive,
            long,
            json,
            include,
            exclude,
            strip_components,
        } => cmd_list(
            &archive,
            &ListOptions {
                long,
                json,
                include: &include,
                exclude: &exclude,
                strip_components,
            },
        ),
        Commands::Test { archive, progress } => cmd_test(&archive, progress),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "tarflate", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
