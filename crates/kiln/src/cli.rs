use std::path::PathBuf;

use clap::Parser;

/// Batch music-library transformer (§6 "The CLI").
#[derive(Debug, Parser)]
#[command(name = "kiln", version, about)]
pub struct Cli {
    /// Library root directories to walk.
    #[arg(required = true)]
    pub roots: Vec<PathBuf>,

    /// Render the computed changes without materializing them.
    #[arg(long)]
    pub dry_run: bool,

    /// Append resolved output documents to this index file for later
    /// tag-edit round-trips (§6 "Index file").
    #[arg(long)]
    pub index: Option<PathBuf>,

    /// Override the worker count the config file would otherwise set.
    #[arg(long)]
    pub cores: Option<usize>,
}
