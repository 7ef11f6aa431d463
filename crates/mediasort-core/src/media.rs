use std::fs::Metadata;
use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

const PHOTO_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "heic", "heif", "tif", "tiff", "webp", "gif", "dng", "cr2", "cr3",
    "nef", "arw", "raf", "orf", "rw2",
];

const VIDEO_EXTENSIONS: &[&str] = &["mov", "mp4", "m4v", "3gp", "avi", "mkv", "mts", "m2ts"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
    Unknown,
}

/// Which media kinds a run should pick up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MediaFilter {
    Photos,
    Videos,
    #[default]
    Both,
}

impl MediaFilter {
    /// Unknown files are never in scope, whatever the filter.
    pub fn includes(self, kind: MediaKind) -> bool {
        match (self, kind) {
            (_, MediaKind::Unknown) => false,
            (MediaFilter::Both, _) => true,
            (MediaFilter::Photos, MediaKind::Photo) => true,
            (MediaFilter::Videos, MediaKind::Video) => true,
            _ => false,
        }
    }
}

/// Classify a file by extension (case-insensitive, without the leading dot).
pub fn classify(extension: &str) -> MediaKind {
    let ext = extension.trim_start_matches('.').to_ascii_lowercase();
    if ext.is_empty() {
        return MediaKind::Unknown;
    }
    if PHOTO_EXTENSIONS.contains(&ext.as_str()) {
        return MediaKind::Photo;
    }
    if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        return MediaKind::Video;
    }

    match mime_guess::from_ext(&ext).first() {
        Some(m) if m.type_() == mime_guess::mime::IMAGE => MediaKind::Photo,
        Some(m) if m.type_() == mime_guess::mime::VIDEO => MediaKind::Video,
        _ => MediaKind::Unknown,
    }
}

/// Convert a file-system timestamp to local wall-clock time.
pub fn local_time(t: SystemTime) -> NaiveDateTime {
    DateTime::<Local>::from(t).naive_local()
}

pub fn modified_time(meta: &Metadata) -> Option<NaiveDateTime> {
    meta.modified().ok().map(local_time)
}

/// A file found while walking the source directory.
#[derive(Debug, Clone)]
pub struct MediaFile {
    pub path: PathBuf,
    /// Lowercase extension, empty when the file has none
    pub extension: String,
    pub kind: MediaKind,
    /// File-system modification time in local time
    pub modified: Option<NaiveDateTime>,
}

impl MediaFile {
    pub fn new(path: PathBuf, modified: Option<NaiveDateTime>) -> Self {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        let kind = classify(&extension);
        Self {
            path,
            extension,
            kind,
            modified,
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string())
    }
}
