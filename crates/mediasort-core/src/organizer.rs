use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::cancel::CancellationToken;
use crate::error::{ConfigError, ExtractionError, RunError};
use crate::extract::Extractor;
use crate::geocode::Geocoder;
use crate::media::{modified_time, MediaFile, MediaKind};
use crate::metadata::MetadataRecord;
use crate::path_builder::PathBuilder;
use crate::summary::{RunSummary, Stage};
use crate::writer::{ArchiveTarget, CopyTarget, Target};
use crate::{OrganizeOptions, ProgressCallback, ThrottledProgress, TransferMode};

/// Files extracted per worker before the sequential transfer step runs.
const BATCH_PER_WORKER: usize = 4;

/// Drives one run: walk, classify, extract, build path, transfer.
pub struct Organizer {
    options: OrganizeOptions,
    extractor: Box<dyn Extractor>,
    builder: PathBuilder,
}

impl Organizer {
    pub fn new(
        options: OrganizeOptions,
        extractor: Box<dyn Extractor>,
        geocoder: Option<Box<dyn Geocoder>>,
    ) -> Self {
        Self {
            options,
            extractor,
            builder: PathBuilder::new(geocoder),
        }
    }

    pub fn options(&self) -> &OrganizeOptions {
        &self.options
    }

    pub fn run(
        &self,
        cancel: Option<&CancellationToken>,
        progress_callback: &ProgressCallback,
    ) -> Result<RunSummary, RunError> {
        let tp = ThrottledProgress::new(progress_callback);
        let opts = &self.options;

        // Nothing under the destination may change before the source checks out
        let source = validate_source(&opts.source)?;
        if fs::canonicalize(&opts.destination).ok().as_deref() == Some(source.as_path()) {
            return Err(ConfigError::DestinationIsSource(source).into());
        }
        let jobs = opts.jobs.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build()
            .map_err(|e| ConfigError::WorkerPool(e.to_string()))?;
        let mut target = self.open_target()?;
        let destination = fs::canonicalize(&opts.destination).ok();

        info!(
            "Organizing {} into {} ({:?}{})",
            source.display(),
            opts.destination.display(),
            opts.mode,
            if opts.dry_run { ", dry run" } else { "" }
        );

        let mut summary = RunSummary {
            dry_run: opts.dry_run,
            ..Default::default()
        };

        let files = discover(&source, destination.as_deref(), &mut summary);
        let mut in_scope = Vec::with_capacity(files.len());
        for file in files {
            if file.kind == MediaKind::Unknown {
                debug!("Ignoring {}", file.path.display());
                summary.ignored += 1;
            } else if !opts.media_filter.includes(file.kind) {
                debug!("Skipping {} ({:?})", file.path.display(), file.kind);
                summary.skipped += 1;
            } else {
                in_scope.push(file);
            }
        }
        info!(
            "Found {} media files to process ({} skipped, {} ignored)",
            in_scope.len(),
            summary.skipped,
            summary.ignored
        );

        let total = in_scope.len() as u64;
        let batch_size = if jobs == 1 { 1 } else { jobs * BATCH_PER_WORKER };
        let extractor = &self.extractor;
        let mut done = 0u64;

        'batches: for batch in in_scope.chunks(batch_size) {
            if is_cancelled(cancel) {
                summary.interrupted = true;
                break;
            }

            let records: Vec<Result<MetadataRecord, ExtractionError>> =
                pool.install(|| batch.par_iter().map(|f| extractor.extract(&f.path)).collect());

            for (file, record) in batch.iter().zip(records) {
                if is_cancelled(cancel) {
                    summary.interrupted = true;
                    break 'batches;
                }
                summary.processed += 1;
                self.process_file(file, record, &mut target, &mut summary);
                tp.report("organize", done, total, &file.file_name());
                done += 1;
            }
        }

        if summary.interrupted {
            warn!("Interrupted after {} of {} files", done, total);
        }

        summary.archive = target.finish()?;
        if let Some(archive) = &summary.archive {
            info!("Archive written to {}", archive.display());
        }

        info!(
            "Done: {} processed, {} transferred, {} skipped, {} failed",
            summary.processed, summary.transferred, summary.skipped, summary.failed
        );
        Ok(summary)
    }

    fn open_target(&self) -> Result<Target, ConfigError> {
        let opts = &self.options;
        if opts.dry_run {
            return Ok(Target::DryRun(CopyTarget::new(&opts.destination)));
        }

        fs::create_dir_all(&opts.destination).map_err(|source| ConfigError::Destination {
            path: opts.destination.clone(),
            source,
        })?;
        match opts.mode {
            TransferMode::Copy => Ok(Target::Copy(CopyTarget::new(&opts.destination))),
            TransferMode::Archive => Ok(Target::Archive(ArchiveTarget::create(
                &opts.destination,
                &opts.archive_name,
            )?)),
        }
    }

    /// Build the destination and transfer one file. Failures stay with this file.
    fn process_file(
        &self,
        file: &MediaFile,
        record: Result<MetadataRecord, ExtractionError>,
        target: &mut Target,
        summary: &mut RunSummary,
    ) {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!("{}", e);
                summary.record_failure(&file.path, Stage::Extract, e.reason);
                return;
            }
        };
        debug!("{}: {} tags", file.path.display(), record.len());

        let spec = self.builder.build(file, &record);
        match target.place(&file.path, &spec) {
            Ok(placed) => {
                debug!("{} -> {}", file.path.display(), placed);
                summary.transferred += 1;
            }
            Err(e) => {
                warn!("{}: {}", file.path.display(), e);
                summary.record_failure(&file.path, Stage::Transfer, e.to_string());
            }
        }
    }
}

fn is_cancelled(cancel: Option<&CancellationToken>) -> bool {
    cancel.is_some_and(|c| c.is_cancelled())
}

fn validate_source(source: &Path) -> Result<PathBuf, ConfigError> {
    if !source.exists() {
        return Err(ConfigError::MissingSource(source.to_path_buf()));
    }
    if !source.is_dir() {
        return Err(ConfigError::SourceNotDirectory(source.to_path_buf()));
    }
    fs::canonicalize(source).map_err(|_| ConfigError::MissingSource(source.to_path_buf()))
}

/// Recursively list regular files under `source`, skipping `exclude` (the
/// destination, when it lives inside the source). Symlinks are not followed
/// and count as ignored. Walk errors are recorded.
fn discover(source: &Path, exclude: Option<&Path>, summary: &mut RunSummary) -> Vec<MediaFile> {
    let mut files = Vec::new();
    let walker = WalkDir::new(source)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| exclude != Some(e.path()));

    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_file() => {
                let modified = entry.metadata().ok().as_ref().and_then(modified_time);
                files.push(MediaFile::new(entry.into_path(), modified));
            }
            Ok(entry) if entry.path_is_symlink() => {
                debug!("Ignoring symlink {}", entry.path().display());
                summary.ignored += 1;
            }
            Ok(_) => {}
            Err(e) => {
                let path = e.path().unwrap_or(source).to_path_buf();
                warn!("Cannot read {}: {}", path.display(), e);
                summary.record_failure(&path, Stage::Discover, e.to_string());
            }
        }
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeSet, HashMap};
    use std::fs::File;
    use std::io::{Read, Write};
    use tempfile::tempdir;

    use crate::metadata::Tag;
    use crate::path_builder::UNKNOWN_CAMERA;

    /// Returns canned records keyed by file name; unknown names get an empty record.
    #[derive(Default)]
    struct FakeExtractor {
        records: HashMap<String, MetadataRecord>,
        failing: Vec<String>,
    }

    impl FakeExtractor {
        fn with(mut self, name: &str, record: MetadataRecord) -> Self {
            self.records.insert(name.to_string(), record);
            self
        }

        fn failing(mut self, name: &str) -> Self {
            self.failing.push(name.to_string());
            self
        }
    }

    impl Extractor for FakeExtractor {
        fn extract(&self, path: &Path) -> Result<MetadataRecord, ExtractionError> {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            if self.failing.contains(&name) {
                return Err(ExtractionError::new(path, "corrupt file"));
            }
            Ok(self.records.get(&name).cloned().unwrap_or_default())
        }
    }

    fn write_file(path: &Path, bytes: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        File::create(path).unwrap().write_all(bytes).unwrap();
    }

    fn acme() -> MetadataRecord {
        MetadataRecord::new()
            .with(Tag::DateTimeOriginal, "2023:06:01 09:30:00")
            .with(Tag::Make, "Acme")
            .with(Tag::Model, "X")
    }

    fn noop(_: &str, _: u64, _: u64, _: &str) {}

    fn run(options: OrganizeOptions, extractor: FakeExtractor) -> Result<RunSummary, RunError> {
        Organizer::new(options, Box::new(extractor), None).run(None, &noop)
    }

    fn old_mtime(path: &Path) {
        // 2020-02-02, well away from any timezone date boundary
        let ft = filetime::FileTime::from_unix_time(1_580_644_800, 0);
        filetime::set_file_mtime(path, ft).unwrap();
    }

    #[test]
    fn test_archive_scenario() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        write_file(&src.path().join("one.jpg"), b"one");
        write_file(&src.path().join("nested/two.jpg"), b"two");
        write_file(&src.path().join("bare.png"), b"bare");
        old_mtime(&src.path().join("bare.png"));
        write_file(&src.path().join("clip.mov"), b"video");

        let extractor = FakeExtractor::default()
            .with("one.jpg", acme())
            .with("two.jpg", acme());
        let mut options = OrganizeOptions::new(src.path(), dst.path());
        options.mode = TransferMode::Archive;
        options.media_filter = crate::MediaFilter::Photos;

        let summary = run(options, extractor).unwrap();
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.transferred, 3);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 0);

        let archive_path = summary.archive.clone().unwrap();
        assert_eq!(archive_path, dst.path().join("media.zip"));
        let mut archive = zip::ZipArchive::new(File::open(&archive_path).unwrap()).unwrap();
        let names: BTreeSet<String> = archive.file_names().map(str::to_string).collect();
        let expected: BTreeSet<String> = [
            "2023/2023-06/Acme X/one.jpg".to_string(),
            "2023/2023-06/Acme X/two.jpg".to_string(),
            format!("2020/2020-02/{}/bare.png", UNKNOWN_CAMERA),
        ]
        .into_iter()
        .collect();
        assert_eq!(names, expected);

        let mut content = String::new();
        archive
            .by_name("2023/2023-06/Acme X/two.jpg")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "two");
    }

    #[test]
    fn test_filter_scenario() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        write_file(&src.path().join("a.jpg"), b"a");
        write_file(&src.path().join("b.HEIC"), b"b");
        write_file(&src.path().join("c.mp4"), b"c");
        write_file(&src.path().join("notes.txt"), b"not media");

        let mut options = OrganizeOptions::new(src.path(), dst.path());
        options.media_filter = crate::MediaFilter::Videos;

        let summary = run(options, FakeExtractor::default()).unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.ignored, 1);
        assert_eq!(summary.transferred, 1);
    }

    #[test]
    fn test_copy_mode_round_trip_and_collisions() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        write_file(&src.path().join("a/IMG_1.jpg"), b"first");
        write_file(&src.path().join("b/IMG_1.jpg"), b"second");

        let extractor = FakeExtractor::default().with("IMG_1.jpg", acme());
        let summary = run(OrganizeOptions::new(src.path(), dst.path()), extractor).unwrap();
        assert_eq!(summary.transferred, 2);

        let dir = dst.path().join("2023").join("2023-06").join("Acme X");
        let mut contents = vec![
            fs::read(dir.join("IMG_1.jpg")).unwrap(),
            fs::read(dir.join("IMG_1(1).jpg")).unwrap(),
        ];
        contents.sort();
        assert_eq!(contents, vec![b"first".to_vec(), b"second".to_vec()]);
    }

    #[test]
    fn test_per_file_failures_do_not_abort() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        write_file(&src.path().join("bad.jpg"), b"bad");
        write_file(&src.path().join("good.jpg"), b"good");

        let extractor = FakeExtractor::default()
            .with("good.jpg", acme())
            .failing("bad.jpg");
        let summary = run(OrganizeOptions::new(src.path(), dst.path()), extractor).unwrap();

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.transferred, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].stage, Stage::Extract);
        assert!(summary.failures[0].path.ends_with("bad.jpg"));
        assert_eq!(summary.failures[0].reason, "corrupt file");
        assert!(dst.path().join("2023/2023-06/Acme X/good.jpg").exists());
    }

    #[test]
    fn test_missing_source_leaves_destination_untouched() {
        let root = tempdir().unwrap();
        let dst = root.path().join("out");
        let options = OrganizeOptions::new(root.path().join("does-not-exist"), &dst);

        let err = run(options, FakeExtractor::default()).unwrap_err();
        assert!(matches!(err, RunError::Config(ConfigError::MissingSource(_))));
        assert!(!dst.exists());
    }

    #[test]
    fn test_uncreatable_destination_is_config_error() {
        let src = tempdir().unwrap();
        let root = tempdir().unwrap();
        write_file(&src.path().join("a.jpg"), b"a");
        let blocker = root.path().join("blocker");
        write_file(&blocker, b"a regular file");

        let err = run(OrganizeOptions::new(src.path(), &blocker), FakeExtractor::default()).unwrap_err();
        assert!(matches!(err, RunError::Config(ConfigError::Destination { .. })));
        assert_eq!(fs::read(&blocker).unwrap(), b"a regular file");
    }

    #[test]
    fn test_uncreatable_archive_is_config_error() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        write_file(&src.path().join("a.jpg"), b"a");

        let mut options = OrganizeOptions::new(src.path(), dst.path());
        options.mode = TransferMode::Archive;
        options.archive_name = "no-such-dir/media.zip".to_string();
        let err = run(options, FakeExtractor::default()).unwrap_err();
        assert!(matches!(err, RunError::Config(ConfigError::Archive { .. })));
    }

    #[test]
    fn test_destination_equal_to_source_is_rejected() {
        let src = tempdir().unwrap();
        write_file(&src.path().join("a.jpg"), b"a");

        let err = run(OrganizeOptions::new(src.path(), src.path()), FakeExtractor::default()).unwrap_err();
        assert!(matches!(err, RunError::Config(ConfigError::DestinationIsSource(_))));
        let entries = fs::read_dir(src.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_counted_as_ignored() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        write_file(&src.path().join("a.jpg"), b"a");
        std::os::unix::fs::symlink(src.path().join("a.jpg"), src.path().join("link.jpg")).unwrap();

        let summary = run(OrganizeOptions::new(src.path(), dst.path()), FakeExtractor::default()).unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.ignored, 1);
    }

    #[test]
    fn test_source_must_be_directory() {
        let root = tempdir().unwrap();
        let file = root.path().join("file.jpg");
        write_file(&file, b"x");
        let options = OrganizeOptions::new(&file, root.path().join("out"));
        let err = run(options, FakeExtractor::default()).unwrap_err();
        assert!(matches!(err, RunError::Config(ConfigError::SourceNotDirectory(_))));
    }

    #[test]
    fn test_destination_inside_source_is_not_walked() {
        let src = tempdir().unwrap();
        write_file(&src.path().join("a.jpg"), b"a");
        let dst = src.path().join("sorted");
        write_file(&dst.join("old/previous.jpg"), b"previous run");

        let summary = run(OrganizeOptions::new(src.path(), &dst), FakeExtractor::default()).unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.transferred, 1);
    }

    #[test]
    fn test_dry_run_does_not_create_destination() {
        let src = tempdir().unwrap();
        let root = tempdir().unwrap();
        write_file(&src.path().join("a.jpg"), b"a");
        let dst = root.path().join("out");

        let mut options = OrganizeOptions::new(src.path(), &dst);
        options.dry_run = true;
        let summary = run(options, FakeExtractor::default().with("a.jpg", acme())).unwrap();
        assert!(summary.dry_run);
        assert_eq!(summary.transferred, 1);
        assert!(!dst.exists());
    }

    #[test]
    fn test_cancelled_run_still_finalizes_archive() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        write_file(&src.path().join("a.jpg"), b"a");

        let mut options = OrganizeOptions::new(src.path(), dst.path());
        options.mode = TransferMode::Archive;
        let token = CancellationToken::new();
        token.cancel();

        let summary = Organizer::new(options, Box::new(FakeExtractor::default()), None)
            .run(Some(&token), &noop)
            .unwrap();
        assert!(summary.interrupted);
        assert_eq!(summary.processed, 0);
        let archive = zip::ZipArchive::new(File::open(summary.archive.unwrap()).unwrap()).unwrap();
        assert_eq!(archive.len(), 0);
    }

    #[test]
    fn test_parallel_extraction_matches_sequential() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        let mut extractor = FakeExtractor::default();
        for i in 0..20 {
            let name = format!("IMG_{i:02}.jpg");
            write_file(&src.path().join(&name), name.as_bytes());
            extractor = extractor.with(&name, acme());
        }

        let mut options = OrganizeOptions::new(src.path(), dst.path());
        options.jobs = 4;
        let summary = run(options, extractor).unwrap();
        assert_eq!(summary.processed, 20);
        assert_eq!(summary.transferred, 20);
        let copied = fs::read_dir(dst.path().join("2023/2023-06/Acme X")).unwrap().count();
        assert_eq!(copied, 20);
    }
}
