pub mod exif;
pub mod exiftool;

use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::ExtractionError;
use crate::metadata::MetadataRecord;

pub use self::exif::ExifReader;
pub use self::exiftool::{exiftool_available, ExifTool};

/// Metadata backend. Implementations must not share mutable state between
/// calls, since files may be extracted from several workers at once.
pub trait Extractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<MetadataRecord, ExtractionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    /// exiftool when installed, the built-in reader otherwise
    #[default]
    Auto,
    Exiftool,
    Builtin,
}

/// Build the backend for `kind`. `Auto` probes for an exiftool binary once.
pub fn build_extractor(kind: ExtractorKind) -> Box<dyn Extractor> {
    match kind {
        ExtractorKind::Exiftool => {
            if !exiftool_available() {
                warn!("exiftool was requested but does not run; every file will fail extraction");
            }
            Box::new(ExifTool::new())
        }
        ExtractorKind::Builtin => Box::new(ExifReader),
        ExtractorKind::Auto => {
            if exiftool_available() {
                info!("Using exiftool for metadata extraction");
                Box::new(ExifTool::new())
            } else {
                info!("exiftool not found, using the built-in EXIF reader");
                Box::new(ExifReader)
            }
        }
    }
}
