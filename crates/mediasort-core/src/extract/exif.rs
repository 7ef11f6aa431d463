use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use exif::{Exif, In, Reader, Value};

use super::Extractor;
use crate::error::ExtractionError;
use crate::media::{classify, MediaKind};
use crate::metadata::{MetadataRecord, Tag, TagValue};

/// In-process EXIF reader for JPEG, TIFF, HEIF, PNG and WebP containers.
/// Video containers carry no EXIF block and yield an empty record.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifReader;

impl Extractor for ExifReader {
    fn extract(&self, path: &Path) -> Result<MetadataRecord, ExtractionError> {
        let kind = path
            .extension()
            .and_then(|e| e.to_str())
            .map(classify)
            .unwrap_or(MediaKind::Unknown);
        if kind == MediaKind::Video {
            return Ok(MetadataRecord::new());
        }

        let file = File::open(path).map_err(|e| ExtractionError::new(path, e.to_string()))?;
        let mut reader = BufReader::new(file);
        match Reader::new().read_from_container(&mut reader) {
            Ok(exif) => Ok(record_from_exif(&exif)),
            Err(exif::Error::NotFound(_)) => Ok(MetadataRecord::new()),
            Err(e) => Err(ExtractionError::new(path, e.to_string())),
        }
    }
}

/// Extract the recognized tags from parsed EXIF data.
/// EXIF datetimes have no timezone info - they are local time as-is.
pub fn record_from_exif(exif: &Exif) -> MetadataRecord {
    let mut record = MetadataRecord::new();

    let text_tags = [
        (exif::Tag::DateTimeOriginal, Tag::DateTimeOriginal),
        (exif::Tag::DateTimeDigitized, Tag::CreateDate),
        (exif::Tag::Make, Tag::Make),
        (exif::Tag::Model, Tag::Model),
        (exif::Tag::Software, Tag::Software),
    ];
    for (exif_tag, tag) in text_tags {
        if let Some(s) = ascii_field(exif, exif_tag) {
            record.insert(tag, TagValue::Text(s));
        }
    }

    let coords = [
        (exif::Tag::GPSLatitude, exif::Tag::GPSLatitudeRef, "S", Tag::GpsLatitude),
        (exif::Tag::GPSLongitude, exif::Tag::GPSLongitudeRef, "W", Tag::GpsLongitude),
    ];
    for (value_tag, ref_tag, negative, tag) in coords {
        if let Some(mut degrees) = dms_field(exif, value_tag) {
            if ascii_field(exif, ref_tag).is_some_and(|r| r.eq_ignore_ascii_case(negative)) {
                degrees = -degrees;
            }
            record.insert(tag, TagValue::Number(degrees));
        }
    }

    record
}

fn ascii_field(exif: &Exif, tag: exif::Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Ascii(parts) => {
            let bytes = parts.first()?;
            let s = String::from_utf8_lossy(bytes);
            let s = s.trim_matches(|c: char| c == '\0' || c.is_whitespace());
            (!s.is_empty()).then(|| s.to_string())
        }
        _ => {
            let s = field.display_value().to_string();
            (!s.is_empty()).then_some(s)
        }
    }
}

/// Degrees/minutes/seconds rationals to decimal degrees.
fn dms_field(exif: &Exif, tag: exif::Tag) -> Option<f64> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Rational(parts) if !parts.is_empty() => {
            let mut degrees = 0.0;
            for (i, r) in parts.iter().take(3).enumerate() {
                if r.denom == 0 {
                    return None;
                }
                degrees += r.to_f64() / 60f64.powi(i as i32);
            }
            Some(degrees)
        }
        _ => None,
    }
}
