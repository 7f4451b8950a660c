use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "music-sorter")]
#[command(about = "Index, deduplicate and reorganize a music collection", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Walk a directory and add its audio files to the catalog
    Index {
        /// Root of the collection to index
        root: PathBuf,
        /// Ignore any checkpoint left by an interrupted run
        #[arg(long)]
        no_resume: bool,
    },
    /// Read tags for every indexed file that has no metadata yet
    Metadata,
    /// Group files with identical content and pick the best copy of each
    Dedupe,
    /// List stored duplicate groups
    Duplicates {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Copy catalogued files into the target layout
    Migrate {
        /// Also migrate non-primary duplicate copies
        #[arg(long)]
        include_duplicates: bool,
        /// Show where files would go without copying anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Show catalog and migration progress
    Status,
    /// Print configuration values
    PrintConfig,
    /// Delete every catalog row
    ResetDb,
}
