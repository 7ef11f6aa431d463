use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Pipeline stage at which a file failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Discover,
    Extract,
    Transfer,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Discover => "discover",
            Stage::Extract => "extract",
            Stage::Transfer => "transfer",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub path: PathBuf,
    pub stage: Stage,
    pub reason: String,
}

/// Outcome of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    /// In-scope files that entered the pipeline
    pub processed: u64,
    /// Files copied or archived (or planned, in a dry run)
    pub transferred: u64,
    /// Media files outside the media-type filter
    pub skipped: u64,
    /// Files that are not photos or videos
    pub ignored: u64,
    pub failed: u64,
    pub failures: Vec<Failure>,
    pub interrupted: bool,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive: Option<PathBuf>,
}

impl RunSummary {
    pub fn record_failure(&mut self, path: &Path, stage: Stage, reason: impl Into<String>) {
        self.failed += 1;
        self.failures.push(Failure {
            path: path.to_path_buf(),
            stage,
            reason: reason.into(),
        });
    }

    /// Write the summary as pretty JSON.
    pub fn write_report(&self, path: &Path) -> anyhow::Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }
}
