use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{DEFAULT_BATCH_WORKERS, DEFAULT_CHAPTER_WORKERS, DEFAULT_PAGE_WORKERS};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download a series (or a single chapter) into a new archive.
    Download(DownloadArgs),
    /// Add the chapters an existing archive is missing.
    Update(UpdateArgs),
    /// Reorganize local archives and embed ComicInfo.xml.
    Tag(TagArgs),
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Series URL, or a chapter URL to download only that chapter.
    pub url: String,

    /// Archive title (default: derived from the URL).
    #[arg(short, long)]
    pub title: Option<String>,

    /// Chapter slug to skip (repeatable).
    #[arg(long = "exclude", value_name = "SLUG")]
    pub exclude: Vec<String>,

    /// Directory the archive is written to.
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,

    /// Overwrite an existing archive.
    #[arg(short, long)]
    pub force: bool,

    /// Concurrent page downloads per chapter.
    #[arg(short, long, default_value_t = DEFAULT_PAGE_WORKERS)]
    pub workers: usize,

    /// Chapters downloaded concurrently.
    #[arg(long, default_value_t = DEFAULT_CHAPTER_WORKERS)]
    pub chapter_workers: usize,

    /// Print the sync report as JSON on stdout.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct UpdateArgs {
    /// Series URL.
    pub url: String,

    /// Archive to update in place.
    #[arg(long)]
    pub archive: PathBuf,

    /// Archive title (default: archive file stem).
    #[arg(short, long)]
    pub title: Option<String>,

    /// Chapter slug to skip (repeatable).
    #[arg(long = "exclude", value_name = "SLUG")]
    pub exclude: Vec<String>,

    /// Concurrent page downloads per chapter.
    #[arg(short, long, default_value_t = DEFAULT_PAGE_WORKERS)]
    pub workers: usize,

    /// Chapters downloaded concurrently.
    #[arg(long, default_value_t = DEFAULT_CHAPTER_WORKERS)]
    pub chapter_workers: usize,

    /// Print the sync report as JSON on stdout.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct TagArgs {
    /// Archives, or directories containing archives.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Archive title (single archive only).
    #[arg(short, long)]
    pub title: Option<String>,

    /// Rebuild archives that already carry ComicInfo.xml.
    #[arg(short, long)]
    pub force: bool,

    /// Archives processed concurrently.
    #[arg(long, default_value_t = DEFAULT_BATCH_WORKERS)]
    pub batch_workers: usize,
}
