use crate::page::{PageRecord, PAGES_DIR};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the corpus metadata document inside the corpus directory.
pub const METADATA_FILE: &str = "metadata.json";

/// A named, bounded collection of newspaper pages selected by search criteria.
///
/// This is the only durable state of the system: the builder writes it once,
/// the fetcher reads it, and downloaded files are derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusMetadata {
    pub corpus: String,
    pub search_query: String,
    /// Inclusive lower bound of the date filter.
    pub start_date: Option<NaiveDate>,
    /// Inclusive upper bound of the date filter.
    pub end_date: Option<NaiveDate>,
    pub state_filter: Option<String>,
    pub total_pages: usize,
    /// RFC 3339 timestamp of the build.
    #[serde(default)]
    pub built_at: String,
    pub pages: Vec<PageRecord>,
}

impl CorpusMetadata {
    pub fn new(
        corpus: &str,
        search_query: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        state_filter: Option<String>,
        pages: Vec<PageRecord>,
    ) -> Self {
        Self {
            corpus: corpus.to_string(),
            search_query: search_query.to_string(),
            start_date,
            end_date,
            state_filter,
            total_pages: pages.len(),
            built_at: chrono::Utc::now().to_rfc3339(),
            pages,
        }
    }

    /// True when `date` lies within the recorded (inclusive, possibly open) range.
    pub fn date_in_range(&self, date: NaiveDate) -> bool {
        self.start_date.map_or(true, |s| date >= s) && self.end_date.map_or(true, |e| date <= e)
    }
}

/// On-disk layout of one corpus: `<data_dir>/<corpus>/{metadata.json,pages/}`.
#[derive(Debug, Clone)]
pub struct CorpusLayout {
    root: PathBuf,
}

impl CorpusLayout {
    pub fn new(data_dir: impl AsRef<Path>, corpus: &str) -> Self {
        Self {
            root: data_dir.as_ref().join(corpus),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.root.join(METADATA_FILE)
    }

    pub fn pages_dir(&self) -> PathBuf {
        self.root.join(PAGES_DIR)
    }

    /// Resolve a path stored in a [`PageRecord`] against the corpus root.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Read and deserialize `metadata.json`.
    pub fn load_metadata(&self) -> std::io::Result<CorpusMetadata> {
        let contents = std::fs::read_to_string(self.metadata_path())?;
        serde_json::from_str(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_date_in_range_inclusive_and_open() {
        let mut meta = CorpusMetadata::new(
            "gold_rush",
            "gold rush",
            Some(date("1848-01-01")),
            Some(date("1855-12-31")),
            None,
            Vec::new(),
        );
        assert!(meta.date_in_range(date("1848-01-01")));
        assert!(meta.date_in_range(date("1855-12-31")));
        assert!(!meta.date_in_range(date("1856-01-01")));
        assert!(!meta.date_in_range(date("1847-12-31")));

        meta.end_date = None;
        assert!(meta.date_in_range(date("1900-01-01")));
    }

    #[test]
    fn test_metadata_json_shape() {
        let meta = CorpusMetadata::new("c", "q", None, None, Some("ohio".into()), Vec::new());
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["total_pages"], 0);
        assert_eq!(json["state_filter"], "ohio");
        assert!(json["start_date"].is_null());
        assert!(json["pages"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_layout_paths() {
        let layout = CorpusLayout::new("data", "prohibition_1920s");
        assert_eq!(
            layout.metadata_path(),
            Path::new("data/prohibition_1920s/metadata.json")
        );
        assert_eq!(layout.pages_dir(), Path::new("data/prohibition_1920s/pages"));
        assert_eq!(
            layout.resolve("pages/a.pdf"),
            Path::new("data/prohibition_1920s/pages/a.pdf")
        );
    }
}
