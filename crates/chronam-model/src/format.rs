use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the four files kept for every digitized page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    /// Scanned page image.
    Pdf,
    /// High-resolution JPEG 2000 image.
    Jp2,
    /// Coordinate-annotated OCR (ALTO XML).
    Xml,
    /// Plain-text OCR derived from the ALTO XML by the text service.
    Txt,
}

impl FileFormat {
    /// All formats in download order.
    pub const ALL: [FileFormat; 4] = [
        FileFormat::Pdf,
        FileFormat::Jp2,
        FileFormat::Xml,
        FileFormat::Txt,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            FileFormat::Pdf => "pdf",
            FileFormat::Jp2 => "jp2",
            FileFormat::Xml => "xml",
            FileFormat::Txt => "txt",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
