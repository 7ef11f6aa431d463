use std::collections::HashSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDateTime, Timelike};
use log::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{ConfigError, RunError, WriteError};
use crate::media::modified_time;
use crate::path_builder::DestinationSpec;

/// Where a file ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placed {
    File(PathBuf),
    Entry(String),
    Planned(PathBuf),
}

impl std::fmt::Display for Placed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Placed::File(p) | Placed::Planned(p) => write!(f, "{}", p.display()),
            Placed::Entry(e) => f.write_str(e),
        }
    }
}

/// The only code that mutates the destination.
pub enum Target {
    Copy(CopyTarget),
    Archive(ArchiveTarget),
    DryRun(CopyTarget),
}

impl Target {
    pub fn place(&mut self, source: &Path, spec: &DestinationSpec) -> Result<Placed, WriteError> {
        match self {
            Target::Copy(t) => t.copy(source, spec).map(Placed::File),
            Target::Archive(t) => t.append(source, spec).map(Placed::Entry),
            Target::DryRun(t) => Ok(Placed::Planned(t.resolve(spec))),
        }
    }

    /// Finalize the run; writes the zip central directory in archive mode.
    pub fn finish(self) -> Result<Option<PathBuf>, RunError> {
        match self {
            Target::Archive(t) => t.finish().map(Some),
            Target::Copy(_) | Target::DryRun(_) => Ok(None),
        }
    }
}

/// Copies into a directory tree, never overwriting.
pub struct CopyTarget {
    root: PathBuf,
    used_paths: HashSet<PathBuf>,
    created_dirs: HashSet<PathBuf>,
}

impl CopyTarget {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            used_paths: HashSet::new(),
            created_dirs: HashSet::new(),
        }
    }

    /// First free path for `spec`, counting both files on disk and paths
    /// already handed out this run.
    fn resolve(&mut self, spec: &DestinationSpec) -> PathBuf {
        let mut dest = self.root.join(spec.relative_path());
        let mut counter = 1u32;
        while self.used_paths.contains(&dest) || dest.exists() {
            dest = self.root.join(spec.disambiguated(counter).relative_path());
            counter += 1;
        }
        self.used_paths.insert(dest.clone());
        dest
    }

    fn copy(&mut self, source: &Path, spec: &DestinationSpec) -> Result<PathBuf, WriteError> {
        let sub_dir = self.root.join(spec.directory());
        if !self.created_dirs.contains(&sub_dir) {
            fs::create_dir_all(&sub_dir).map_err(|e| io_error(&sub_dir, e))?;
            self.created_dirs.insert(sub_dir);
        }

        let dest = self.resolve(spec);
        if let Err(e) = fs::copy(source, &dest) {
            fs::remove_file(&dest).ok();
            return Err(io_error(&dest, e));
        }

        match fs::metadata(source) {
            Ok(meta) => {
                let mtime = filetime::FileTime::from_last_modification_time(&meta);
                if let Err(e) = filetime::set_file_mtime(&dest, mtime) {
                    debug!("Could not preserve mtime on {}: {}", dest.display(), e);
                }
            }
            Err(e) => debug!("Could not read mtime of {}: {}", source.display(), e),
        }

        Ok(dest)
    }
}

/// Appends every file to a single zip archive.
pub struct ArchiveTarget {
    path: PathBuf,
    writer: ZipWriter<File>,
    entries: HashSet<String>,
}

impl ArchiveTarget {
    /// Create `<dir>/<name>`, choosing `name(1).zip` etc. if it already exists.
    pub fn create(dir: &Path, name: &str) -> Result<Self, ConfigError> {
        let base = DestinationSpec::new(Vec::new(), name);
        let mut path = dir.join(name);
        let mut counter = 1u32;
        while path.exists() {
            path = dir.join(base.disambiguated(counter).file_name);
            counter += 1;
        }

        let file = File::create(&path).map_err(|source| ConfigError::Archive {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            path,
            writer: ZipWriter::new(file),
            entries: HashSet::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn resolve(&mut self, spec: &DestinationSpec) -> String {
        let mut name = spec.entry_name();
        let mut counter = 1u32;
        while self.entries.contains(&name) {
            name = spec.disambiguated(counter).entry_name();
            counter += 1;
        }
        self.entries.insert(name.clone());
        name
    }

    fn append(&mut self, source: &Path, spec: &DestinationSpec) -> Result<String, WriteError> {
        let mut input = File::open(source).map_err(|e| io_error(source, e))?;
        let meta = input.metadata().map_err(|e| io_error(source, e))?;

        // Photos and videos are already compressed
        let mut options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .large_file(meta.len() >= u32::MAX as u64);
        if let Some(dt) = modified_time(&meta).and_then(zip_datetime) {
            options = options.last_modified_time(dt);
        }

        let name = self.resolve(spec);
        if let Err(e) = self.writer.start_file(name.as_str(), options) {
            self.entries.remove(&name);
            return Err(WriteError::Archive {
                entry: name,
                source: e,
            });
        }
        if let Err(e) = io::copy(&mut input, &mut self.writer) {
            self.writer.abort_file().ok();
            self.entries.remove(&name);
            return Err(io_error(source, e));
        }
        Ok(name)
    }

    fn finish(self) -> Result<PathBuf, RunError> {
        let Self { path, writer, .. } = self;
        match writer.finish() {
            Ok(_) => Ok(path),
            Err(source) => Err(RunError::Finalize { path, source }),
        }
    }
}

/// Zip timestamps cover 1980..=2107; anything else keeps the default.
fn zip_datetime(dt: NaiveDateTime) -> Option<zip::DateTime> {
    let year = u16::try_from(dt.year()).ok()?;
    zip::DateTime::from_date_and_time(
        year,
        dt.month() as u8,
        dt.day() as u8,
        dt.hour() as u8,
        dt.minute() as u8,
        dt.second() as u8,
    )
    .ok()
}

fn io_error(path: &Path, source: io::Error) -> WriteError {
    WriteError::Io {
        path: path.to_path_buf(),
        source,
    }
}
