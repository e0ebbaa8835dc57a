use crate::format::FileFormat;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Directory (relative to the corpus root) holding downloaded page files.
pub const PAGES_DIR: &str = "pages";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("LCCN must be non-empty ASCII alphanumeric, got '{0}'")]
    InvalidLccn(String),

    #[error("edition and sequence numbers start at 1")]
    ZeroNumber,

    #[error("malformed page id '{0}': expected <lccn>/<YYYY-MM-DD>/ed-<n>/seq-<n>")]
    MalformedPageId(String),
}

/// Composite key naming one digitized newspaper page.
///
/// The string form is `{lccn}/{date}/ed-{edition}/seq-{sequence}`, matching
/// the path segments of the archive's own page URLs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageId {
    pub lccn: String,
    pub date: NaiveDate,
    pub edition: u32,
    pub sequence: u32,
}

impl PageId {
    pub fn new(lccn: &str, date: NaiveDate, edition: u32, sequence: u32) -> Result<Self, ModelError> {
        if lccn.is_empty() || !lccn.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ModelError::InvalidLccn(lccn.to_string()));
        }
        if edition == 0 || sequence == 0 {
            return Err(ModelError::ZeroNumber);
        }
        Ok(Self {
            lccn: lccn.to_string(),
            date,
            edition,
            sequence,
        })
    }

    /// Filesystem-safe stem shared by the four files of this page.
    pub fn file_stem(&self) -> String {
        format!(
            "{}_{}_ed-{}_seq-{}",
            self.lccn,
            self.date.format("%Y-%m-%d"),
            self.edition,
            self.sequence
        )
    }

    /// Relative paths (from the corpus root) for every format of this page.
    pub fn local_files(&self) -> BTreeMap<FileFormat, String> {
        let stem = self.file_stem();
        FileFormat::ALL
            .iter()
            .map(|&f| (f, format!("{PAGES_DIR}/{stem}.{}", f.extension())))
            .collect()
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/ed-{}/seq-{}",
            self.lccn,
            self.date.format("%Y-%m-%d"),
            self.edition,
            self.sequence
        )
    }
}

impl FromStr for PageId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ModelError::MalformedPageId(s.to_string());
        let parts: Vec<&str> = s.split('/').collect();
        let [lccn, date, edition, sequence] = parts[..] else {
            return Err(malformed());
        };
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| malformed())?;
        let edition = edition
            .strip_prefix("ed-")
            .and_then(|n| n.parse().ok())
            .ok_or_else(malformed)?;
        let sequence = sequence
            .strip_prefix("seq-")
            .and_then(|n| n.parse().ok())
            .ok_or_else(malformed)?;
        PageId::new(lccn, date, edition, sequence)
    }
}

/// Metadata for one digitized page accepted into a corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    /// String form of the [`PageId`].
    pub page_id: String,
    pub newspaper_title: String,
    pub lccn: String,
    pub date: NaiveDate,
    pub edition: u32,
    pub sequence: u32,
    /// Descriptive only; not part of the page identity.
    pub state: String,
    pub city: String,
    /// Storage-service path fragment identifying the scan batch
    /// (e.g. `ndnp/dlc/batch_dlc_fogler_ver01/data/sn83030214/00206532518/1920050201/0027`).
    pub batch_path: String,
    /// Human-facing page URL on loc.gov.
    pub url: String,
    /// Format to path relative to the corpus root.
    pub files: BTreeMap<FileFormat, String>,
}

impl PageRecord {
    /// Rebuild the page identity from its four key fields.
    pub fn id(&self) -> Result<PageId, ModelError> {
        PageId::new(&self.lccn, self.date, self.edition, self.sequence)
    }

    pub fn file(&self, format: FileFormat) -> Option<&str> {
        self.files.get(&format).map(String::as_str)
    }
}
