use std::path::{Path, PathBuf};

use thiserror::Error;

/// Failures of the reconciliation and sync engine.
///
/// Variants below chapter level (`PageFetchFailed`, `ChapterFetchFailed`) are
/// collected into reports and logged; they never abort a sync on their own.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("could not infer chapters from archive entry names")]
    InferenceFailed,

    #[error("source returned no chapters")]
    NoRemoteChapters,

    #[error("page {position} of chapter {slug} failed ({url}): {reason}")]
    PageFetchFailed {
        slug: String,
        position: usize,
        url: String,
        reason: String,
    },

    #[error("chapter {slug} failed: {reason}")]
    ChapterFetchFailed { slug: String, reason: String },

    #[error("reconciled archive would contain zero pages")]
    EmptyResult,

    #[error("not a valid archive: {}: {source}", path.display())]
    CorruptArchive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("output already exists: {} (use --force to overwrite)", path.display())]
    OutputExists { path: PathBuf },

    #[error("write archive {}: {source}", path.display())]
    ArchiveWrite {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn corrupt(path: &Path, source: zip::result::ZipError) -> Self {
        Self::CorruptArchive {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn archive_write(path: &Path, source: zip::result::ZipError) -> Self {
        Self::ArchiveWrite {
            path: path.to_path_buf(),
            source,
        }
    }
}
