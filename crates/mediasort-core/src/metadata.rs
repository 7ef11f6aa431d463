use std::collections::HashMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};

use crate::media::MediaKind;

/// The metadata tags the organizer cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    DateTimeOriginal,
    CreateDate,
    /// QuickTime local capture time with offset; `CreateDate` in videos is UTC
    CreationDate,
    Make,
    Model,
    Software,
    CreatorTool,
    GpsLatitude,
    GpsLongitude,
}

impl Tag {
    pub const ALL: [Tag; 9] = [
        Tag::DateTimeOriginal,
        Tag::CreateDate,
        Tag::CreationDate,
        Tag::Make,
        Tag::Model,
        Tag::Software,
        Tag::CreatorTool,
        Tag::GpsLatitude,
        Tag::GpsLongitude,
    ];

    /// Tag name as exiftool prints it without group prefixes.
    pub fn name(self) -> &'static str {
        match self {
            Tag::DateTimeOriginal => "DateTimeOriginal",
            Tag::CreateDate => "CreateDate",
            Tag::CreationDate => "CreationDate",
            Tag::Make => "Make",
            Tag::Model => "Model",
            Tag::Software => "Software",
            Tag::CreatorTool => "CreatorTool",
            Tag::GpsLatitude => "GPSLatitude",
            Tag::GpsLongitude => "GPSLongitude",
        }
    }

    pub fn from_name(name: &str) -> Option<Tag> {
        Tag::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn is_coordinate(self) -> bool {
        matches!(self, Tag::GpsLatitude | Tag::GpsLongitude)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Text(String),
    Number(f64),
}

impl TagValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TagValue::Number(n) => Some(*n),
            TagValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Text(s) => f.write_str(s),
            TagValue::Number(n) => write!(f, "{}", n),
        }
    }
}

/// Tag values extracted from one file. Every tag is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataRecord {
    tags: HashMap<Tag, TagValue>,
}

impl MetadataRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value; blank text is treated as absent.
    pub fn insert(&mut self, tag: Tag, value: TagValue) {
        if let TagValue::Text(s) = &value {
            if s.trim().is_empty() {
                return;
            }
        }
        self.tags.insert(tag, value);
    }

    pub fn with(mut self, tag: Tag, value: impl Into<TagValue>) -> Self {
        self.insert(tag, value.into());
        self
    }

    pub fn get(&self, tag: Tag) -> Option<&TagValue> {
        self.tags.get(&tag)
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    fn text(&self, tag: Tag) -> Option<String> {
        self.get(tag)
            .map(|v| v.to_string().trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub fn make(&self) -> Option<String> {
        self.text(Tag::Make)
    }

    pub fn model(&self) -> Option<String> {
        self.text(Tag::Model)
    }

    /// Editing software, falling back to the XMP creator tool.
    pub fn software(&self) -> Option<String> {
        self.text(Tag::Software)
            .or_else(|| self.text(Tag::CreatorTool))
    }

    /// Capture date. Photos prefer DateTimeOriginal; videos prefer the local
    /// QuickTime CreationDate over the UTC CreateDate.
    pub fn date_taken(&self, kind: MediaKind) -> Option<NaiveDateTime> {
        let order = match kind {
            MediaKind::Video => [Tag::CreationDate, Tag::CreateDate, Tag::DateTimeOriginal],
            _ => [Tag::DateTimeOriginal, Tag::CreateDate, Tag::CreationDate],
        };
        order
            .into_iter()
            .filter_map(|t| self.text(t))
            .find_map(|s| parse_datetime(&s))
    }

    /// Latitude/longitude in signed decimal degrees, when both are present and plausible.
    pub fn gps(&self) -> Option<(f64, f64)> {
        let lat = self.get(Tag::GpsLatitude)?.as_f64()?;
        let lon = self.get(Tag::GpsLongitude)?.as_f64()?;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return None;
        }
        // Cameras without a fix often write 0/0
        if lat == 0.0 && lon == 0.0 {
            return None;
        }
        Some((lat, lon))
    }
}

impl From<String> for TagValue {
    fn from(s: String) -> Self {
        TagValue::Text(s)
    }
}

impl From<&str> for TagValue {
    fn from(s: &str) -> Self {
        TagValue::Text(s.to_string())
    }
}

impl From<f64> for TagValue {
    fn from(n: f64) -> Self {
        TagValue::Number(n)
    }
}

/// Parse an EXIF/QuickTime style timestamp ("2023:06:01 10:20:30", optionally
/// followed by sub-seconds or a UTC offset). Zeroed dates are rejected.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let cleaned: String = s
        .trim()
        .chars()
        .take(19)
        .map(|c| match c {
            '-' | '/' | '\\' | '.' => ':',
            'T' => ' ',
            c => c,
        })
        .collect();

    if let Ok(dt) = NaiveDateTime::parse_from_str(&cleaned, "%Y:%m:%d %H:%M:%S") {
        return Some(dt);
    }

    let date_part = cleaned.split(' ').next()?;
    let d = NaiveDate::parse_from_str(date_part, "%Y:%m:%d").ok()?;
    d.and_hms_opt(0, 0, 0)
}
