use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;

use crate::geocode::Geocoder;
use crate::media::MediaFile;
use crate::metadata::MetadataRecord;

/// Camera folder for files without make/model tags
pub const UNKNOWN_CAMERA: &str = "Unknown";

/// Date folder when neither a date tag nor a modification time is available
pub const UNDATED: &str = "Undated";

static UNSAFE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[/\\:*?"<>|\x00-\x1f\x7f]"#).unwrap());
static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Relative destination of one file: directory segments plus file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DestinationSpec {
    pub segments: Vec<String>,
    pub file_name: String,
}

impl DestinationSpec {
    pub fn new(segments: Vec<String>, file_name: impl Into<String>) -> Self {
        Self {
            segments,
            file_name: file_name.into(),
        }
    }

    pub fn directory(&self) -> PathBuf {
        self.segments.iter().collect()
    }

    pub fn relative_path(&self) -> PathBuf {
        self.directory().join(&self.file_name)
    }

    /// Zip entry name, always `/`-separated.
    pub fn entry_name(&self) -> String {
        let mut parts: Vec<&str> = self.segments.iter().map(String::as_str).collect();
        parts.push(&self.file_name);
        parts.join("/")
    }

    /// Same directory, file name with a numeric suffix: `IMG_1.jpg` -> `IMG_1(2).jpg`.
    pub fn disambiguated(&self, counter: u32) -> Self {
        let name = Path::new(&self.file_name);
        let stem = name
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("file");
        let ext = name.extension().and_then(|s| s.to_str()).unwrap_or("");
        let file_name = if ext.is_empty() {
            format!("{}({})", stem, counter)
        } else {
            format!("{}({}).{}", stem, counter, ext)
        };
        Self {
            segments: self.segments.clone(),
            file_name,
        }
    }
}

/// Make a tag value usable as a single path segment. Returns `None` when
/// nothing printable is left.
pub fn sanitize_segment(value: &str) -> Option<String> {
    let replaced = UNSAFE_RE.replace_all(value, "_");
    let collapsed = SPACE_RE.replace_all(&replaced, " ");
    let trimmed = collapsed.trim_matches(|c: char| c == ' ' || c == '.');
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '_') {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// `Make Model`, without repeating the make when the model already starts with it.
pub fn camera_label(make: Option<&str>, model: Option<&str>) -> Option<String> {
    let label = match (make, model) {
        (Some(make), Some(model)) => {
            if model.to_lowercase().starts_with(&make.to_lowercase()) {
                model.to_string()
            } else {
                format!("{} {}", make, model)
            }
        }
        (Some(make), None) => make.to_string(),
        (None, Some(model)) => model.to_string(),
        (None, None) => return None,
    };
    sanitize_segment(&label)
}

fn date_segments(date: Option<NaiveDateTime>) -> Vec<String> {
    match date {
        Some(dt) => vec![dt.format("%Y").to_string(), dt.format("%Y-%m").to_string()],
        None => vec![UNDATED.to_string()],
    }
}

/// Maps a metadata record to a destination:
/// `YYYY/YYYY-MM/[location]/camera/[software]/name`.
#[derive(Default)]
pub struct PathBuilder {
    geocoder: Option<Box<dyn Geocoder>>,
}

impl PathBuilder {
    pub fn new(geocoder: Option<Box<dyn Geocoder>>) -> Self {
        Self { geocoder }
    }

    pub fn build(&self, file: &MediaFile, record: &MetadataRecord) -> DestinationSpec {
        let date = record.date_taken(file.kind).or(file.modified);
        let mut segments = date_segments(date);

        if let (Some(geocoder), Some((lat, lon))) = (&self.geocoder, record.gps()) {
            if let Some(place) = geocoder.locate(lat, lon).as_deref().and_then(sanitize_segment) {
                segments.push(place);
            }
        }

        let make = record.make();
        let model = record.model();
        segments.push(
            camera_label(make.as_deref(), model.as_deref())
                .unwrap_or_else(|| UNKNOWN_CAMERA.to_string()),
        );

        if let Some(software) = record.software().as_deref().and_then(sanitize_segment) {
            segments.push(software);
        }

        DestinationSpec::new(segments, file.file_name())
    }
}
