pub mod cancel;
pub mod error;
pub mod extract;
pub mod geocode;
pub mod media;
pub mod metadata;
pub mod organizer;
pub mod path_builder;
pub mod summary;
pub mod writer;

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

pub use cancel::CancellationToken;
pub use error::{ConfigError, ExtractionError, RunError, WriteError};
pub use extract::{build_extractor, Extractor, ExtractorKind};
pub use geocode::{build_geocoder, Geocoder, LocationMode};
pub use media::{classify, MediaFile, MediaFilter, MediaKind};
pub use metadata::{MetadataRecord, Tag, TagValue};
pub use organizer::Organizer;
pub use path_builder::{DestinationSpec, PathBuilder};
pub use summary::{Failure, RunSummary, Stage};

fn default_archive_name() -> String {
    "media.zip".to_string()
}

fn default_jobs() -> usize {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    #[default]
    Copy,
    Archive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizeOptions {
    pub source: PathBuf,
    pub destination: PathBuf,
    #[serde(default)]
    pub mode: TransferMode,
    /// Archive file name inside the destination (archive mode only)
    #[serde(default = "default_archive_name")]
    pub archive_name: String,
    #[serde(default)]
    pub media_filter: MediaFilter,
    #[serde(default)]
    pub extractor: ExtractorKind,
    #[serde(default)]
    pub location: LocationMode,
    /// Metadata extraction workers
    #[serde(default = "default_jobs")]
    pub jobs: usize,
    #[serde(default)]
    pub dry_run: bool,
}

impl OrganizeOptions {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            mode: TransferMode::Copy,
            archive_name: default_archive_name(),
            media_filter: MediaFilter::Both,
            extractor: ExtractorKind::Auto,
            location: LocationMode::Off,
            jobs: default_jobs(),
            dry_run: false,
        }
    }
}

/// Type alias for progress callback: (stage, current, total, message)
pub type ProgressCallback = dyn Fn(&str, u64, u64, &str) + Send + Sync;

/// Throttled progress reporter: emits at most every 200ms, and always on completion.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback,
    last_emit: Mutex<Instant>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a ProgressCallback) -> Self {
        let start = Instant::now()
            .checked_sub(Duration::from_secs(1))
            .unwrap_or_else(Instant::now);
        Self {
            inner,
            last_emit: Mutex::new(start),
        }
    }

    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let is_done = current + 1 >= total;
        if !is_done {
            let Ok(mut last) = self.last_emit.lock() else {
                return;
            };
            if last.elapsed().as_millis() < 200 {
                return;
            }
            *last = Instant::now();
        }
        (self.inner)(stage, current, total, message);
    }
}

/// Organize `options.source` into `options.destination` with the backends
/// named in the options.
pub fn organize(
    options: &OrganizeOptions,
    cancel: Option<&CancellationToken>,
    progress_callback: &ProgressCallback,
) -> Result<RunSummary, RunError> {
    let organizer = Organizer::new(
        options.clone(),
        build_extractor(options.extractor),
        build_geocoder(options.location),
    );
    organizer.run(cancel, progress_callback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_throttled_progress_always_emits_completion() {
        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        let cb = move |_: &str, _: u64, _: u64, _: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
        };
        let tp = ThrottledProgress::new(&cb);
        for i in 0..50 {
            tp.report("organize", i, 100, "");
        }
        tp.report("organize", 99, 100, "");
        let n = calls.load(Ordering::SeqCst);
        // first report passes the throttle, the rest are swallowed until completion
        assert!(n >= 2 && n < 50, "unexpected call count {n}");
    }

    #[test]
    fn test_options_deserialize_defaults() {
        let options: OrganizeOptions =
            serde_json::from_str(r#"{"source": "/in", "destination": "/out"}"#).unwrap();
        assert_eq!(options.mode, TransferMode::Copy);
        assert_eq!(options.archive_name, "media.zip");
        assert_eq!(options.media_filter, MediaFilter::Both);
        assert_eq!(options.jobs, 1);
        assert!(!options.dry_run);
    }
}
