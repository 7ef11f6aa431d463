use std::path::{Path, PathBuf};
use std::process::Command;

use log::trace;
use serde_json::{Map, Value};

use super::Extractor;
use crate::error::ExtractionError;
use crate::metadata::{MetadataRecord, Tag, TagValue};

/// Runs the external `exiftool` program, one process per file.
#[derive(Debug, Clone)]
pub struct ExifTool {
    program: PathBuf,
}

impl Default for ExifTool {
    fn default() -> Self {
        Self::new()
    }
}

impl ExifTool {
    pub fn new() -> Self {
        Self::with_program("exiftool")
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

/// Check if exiftool can be executed
pub fn exiftool_available() -> bool {
    Command::new("exiftool")
        .arg("-ver")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

impl Extractor for ExifTool {
    fn extract(&self, path: &Path) -> Result<MetadataRecord, ExtractionError> {
        let mut command = Command::new(&self.program);
        command.arg("-j").arg("-n");
        for tag in Tag::ALL {
            command.arg(format!("-{}", tag.name()));
        }
        command.arg("-GPSLatitudeRef").arg("-GPSLongitudeRef");

        let output = command
            .arg("--")
            .arg(path)
            .output()
            .map_err(|e| ExtractionError::new(path, format!("cannot run exiftool: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::new(path, stderr.trim().to_string()));
        }

        parse_output(path, &output.stdout)
    }
}

/// Parse `exiftool -j -n` output for a single file.
pub fn parse_output(path: &Path, stdout: &[u8]) -> Result<MetadataRecord, ExtractionError> {
    let parsed: Vec<Map<String, Value>> = serde_json::from_slice(stdout)
        .map_err(|e| ExtractionError::new(path, format!("unreadable exiftool output: {e}")))?;
    let tags = parsed
        .into_iter()
        .next()
        .ok_or_else(|| ExtractionError::new(path, "exiftool returned no result"))?;

    trace!("{} exiftool output: {:?}", path.display(), tags);

    let mut record = MetadataRecord::new();
    for (key, value) in &tags {
        let Some(tag) = Tag::from_name(key) else {
            continue;
        };
        let value = match value {
            Value::String(s) => TagValue::Text(s.clone()),
            // Only coordinates are numeric; `17.0` stays `17.0` for text tags
            Value::Number(n) if tag.is_coordinate() => match n.as_f64() {
                Some(f) => TagValue::Number(f),
                None => continue,
            },
            Value::Number(n) => TagValue::Text(n.to_string()),
            Value::Null => continue,
            other => TagValue::Text(other.to_string()),
        };
        record.insert(tag, value);
    }

    apply_ref_sign(&mut record, &tags, Tag::GpsLatitude, "GPSLatitudeRef", "S");
    apply_ref_sign(&mut record, &tags, Tag::GpsLongitude, "GPSLongitudeRef", "W");

    Ok(record)
}

/// Unsigned EXIF coordinates carry their hemisphere in a separate ref tag.
fn apply_ref_sign(
    record: &mut MetadataRecord,
    tags: &Map<String, Value>,
    tag: Tag,
    ref_key: &str,
    negative: &str,
) {
    let is_negative = tags
        .get(ref_key)
        .and_then(|v| v.as_str())
        .is_some_and(|r| r.trim().eq_ignore_ascii_case(negative));
    if !is_negative {
        return;
    }
    if let Some(v) = record.get(tag).and_then(|v| v.as_f64()) {
        if v > 0.0 {
            record.insert(tag, TagValue::Number(-v));
        }
    }
}
