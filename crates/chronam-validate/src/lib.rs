use anyhow::{Context, Result};
use chronam_model::{CorpusLayout, CorpusMetadata, FileFormat, PageId, PAGES_DIR};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("duplicate page ID: {0}")]
    DuplicatePageId(String),

    #[error("page ID '{recorded}' does not match its fields ({derived})")]
    PageIdMismatch { recorded: String, derived: String },

    #[error("page {page}: invalid identity fields: {reason}")]
    InvalidIdentity { page: String, reason: String },

    #[error("page {page}: no {format} file path")]
    MissingFile { page: String, format: FileFormat },

    #[error("page {page}: {format} path '{path}' should be '{expected}'")]
    UnexpectedPath {
        page: String,
        format: FileFormat,
        path: String,
        expected: String,
    },

    #[error("file path '{0}' is used by more than one page or format")]
    SharedPath(String),

    #[error("page {page}: date {date} outside the corpus date range")]
    DateOutOfRange { page: String, date: String },

    #[error("start date {start} is after end date {end}")]
    InvertedRange { start: String, end: String },

    #[error("total_pages is {recorded} but {actual} pages are listed")]
    TotalMismatch { recorded: usize, actual: usize },
}

/// How much of a corpus is present on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletenessReport {
    pub total: usize,
    /// Pages with all four files present and non-empty.
    pub complete: usize,
    pub partial: usize,
    pub missing: usize,
}

/// Validate a corpus's metadata and report local completeness.
///
/// Fails if the metadata cannot be read or breaks any invariant.
pub fn validate(data_dir: &Path, corpus: &str) -> Result<CompletenessReport> {
    let layout = CorpusLayout::new(data_dir, corpus);
    let metadata = layout
        .load_metadata()
        .with_context(|| format!("Failed to read {}", layout.metadata_path().display()))?;

    let errors = validate_metadata(&metadata);
    let report = completeness(&layout, &metadata);
    tracing::info!(
        total = report.total,
        complete = report.complete,
        partial = report.partial,
        missing = report.missing,
        "Local files"
    );

    if !errors.is_empty() {
        anyhow::bail!("{} validation errors in {}", errors.len(), corpus);
    }
    tracing::info!(corpus, pages = metadata.pages.len(), "Corpus metadata is valid");
    Ok(report)
}

/// Check the metadata invariants: unique, reconstructible page IDs; four
/// deterministic, pairwise distinct file paths per page; dates within range.
pub fn validate_metadata(metadata: &CorpusMetadata) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if metadata.total_pages != metadata.pages.len() {
        errors.push(ValidationError::TotalMismatch {
            recorded: metadata.total_pages,
            actual: metadata.pages.len(),
        });
    }
    if let (Some(start), Some(end)) = (metadata.start_date, metadata.end_date) {
        if start > end {
            errors.push(ValidationError::InvertedRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
    }

    let mut seen_ids = HashSet::new();
    let mut seen_paths = HashSet::new();
    for page in &metadata.pages {
        if !seen_ids.insert(page.page_id.as_str()) {
            errors.push(ValidationError::DuplicatePageId(page.page_id.clone()));
        }
        if !metadata.date_in_range(page.date) {
            errors.push(ValidationError::DateOutOfRange {
                page: page.page_id.clone(),
                date: page.date.to_string(),
            });
        }

        let id = match page.id() {
            Ok(id) => id,
            Err(e) => {
                errors.push(ValidationError::InvalidIdentity {
                    page: page.page_id.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
        };
        if id.to_string() != page.page_id {
            errors.push(ValidationError::PageIdMismatch {
                recorded: page.page_id.clone(),
                derived: id.to_string(),
            });
        }

        check_paths(&id, page, &mut errors);
        for path in page.files.values() {
            if !seen_paths.insert(path.as_str()) {
                errors.push(ValidationError::SharedPath(path.clone()));
            }
        }
    }

    for e in &errors {
        tracing::warn!("{e}");
    }
    errors
}

fn check_paths(id: &PageId, page: &chronam_model::PageRecord, errors: &mut Vec<ValidationError>) {
    let expected = id.local_files();
    for format in FileFormat::ALL {
        match page.file(format) {
            None => errors.push(ValidationError::MissingFile {
                page: page.page_id.clone(),
                format,
            }),
            Some(path) if path != expected[&format] || !path.starts_with(PAGES_DIR) => {
                errors.push(ValidationError::UnexpectedPath {
                    page: page.page_id.clone(),
                    format,
                    path: path.to_string(),
                    expected: expected[&format].clone(),
                })
            }
            Some(_) => {}
        }
    }
}

/// Count pages by how many of their files are present and non-empty.
pub fn completeness(layout: &CorpusLayout, metadata: &CorpusMetadata) -> CompletenessReport {
    let mut report = CompletenessReport {
        total: metadata.pages.len(),
        ..Default::default()
    };
    for page in &metadata.pages {
        let present = FileFormat::ALL
            .iter()
            .filter_map(|&f| page.file(f))
            .filter(|p| {
                std::fs::metadata(layout.resolve(p))
                    .map(|m| m.len() > 0)
                    .unwrap_or(false)
            })
            .count();
        match present {
            0 => report.missing += 1,
            n if n == FileFormat::ALL.len() => report.complete += 1,
            _ => report.partial += 1,
        }
    }
    report
}
