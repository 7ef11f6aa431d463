use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Problems that stop a run before any file is processed.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("source directory does not exist: {0}")]
    MissingSource(PathBuf),

    #[error("source is not a directory: {0}")]
    SourceNotDirectory(PathBuf),

    #[error("destination is the source directory: {0}")]
    DestinationIsSource(PathBuf),

    #[error("cannot create destination {path}: {source}")]
    Destination {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot create archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot start worker pool: {0}")]
    WorkerPool(String),
}

/// The metadata backend could not read a file.
#[derive(Error, Debug, Clone)]
#[error("metadata extraction failed for {path}: {reason}")]
pub struct ExtractionError {
    pub path: PathBuf,
    pub reason: String,
}

impl ExtractionError {
    pub fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Copying a file or appending it to the archive failed.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("write to {path} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("archive entry {entry} failed: {source}")]
    Archive {
        entry: String,
        #[source]
        source: zip::result::ZipError,
    },
}

/// Run-fatal errors.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to finalize archive {path}: {source}")]
    Finalize {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
}
