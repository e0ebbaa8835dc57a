use crate::builder::validate_corpus_name;
use crate::client::ArchiveClient;
use crate::error::{AcquireError, Result};
use crate::output::{self, PartialFile};
use chronam_model::{CorpusLayout, FileFormat, PageRecord};
use std::path::{Component, Path};
use std::time::Duration;

pub const DEFAULT_FETCH_DELAY: Duration = Duration::from_secs(2);

/// Parameters of one fetch run over an existing corpus.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub corpus: String,
    /// Process at most this many pages (in metadata order).
    pub max_docs: Option<usize>,
    /// Pause after every network request.
    pub delay: Duration,
}

impl FetchRequest {
    pub fn new(corpus: &str) -> Self {
        Self {
            corpus: corpus.to_string(),
            max_docs: None,
            delay: DEFAULT_FETCH_DELAY,
        }
    }
}

/// Counts reported at the end of a fetch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub pages: usize,
    pub downloaded: usize,
    /// Files already complete on disk.
    pub skipped: usize,
    pub failed: usize,
    pub requests: usize,
}

/// Download every missing file of a corpus.
///
/// Complete local files are never requested again, so re-running after an
/// interruption or a failed download only fetches what is missing. A failed
/// file is logged and counted; it never stops the run.
pub async fn fetch_corpus(
    client: &ArchiveClient,
    data_dir: &Path,
    request: &FetchRequest,
) -> Result<FetchSummary> {
    validate_corpus_name(&request.corpus)?;
    let layout = CorpusLayout::new(data_dir, &request.corpus);
    let metadata_path = layout.metadata_path();
    if !metadata_path.is_file() {
        return Err(AcquireError::CorpusNotFound(metadata_path));
    }
    let metadata = layout
        .load_metadata()
        .map_err(|e| AcquireError::io(&metadata_path, e))?;

    let total = request
        .max_docs
        .map_or(metadata.pages.len(), |cap| cap.min(metadata.pages.len()));
    tracing::info!(corpus = %metadata.corpus, pages = total, of = metadata.pages.len(), "Fetching page files");

    let mut summary = FetchSummary::default();
    for (index, page) in metadata.pages.iter().take(total).enumerate() {
        fetch_page(client, &layout, page, request.delay, &mut summary).await;
        summary.pages += 1;
        tracing::info!(
            page = %page.page_id,
            progress = format!("{}/{total}", index + 1),
            "Page done"
        );
    }

    tracing::info!(
        pages = summary.pages,
        downloaded = summary.downloaded,
        skipped = summary.skipped,
        failed = summary.failed,
        "Fetch complete"
    );
    Ok(summary)
}

async fn fetch_page(
    client: &ArchiveClient,
    layout: &CorpusLayout,
    page: &PageRecord,
    delay: Duration,
    summary: &mut FetchSummary,
) {
    for format in FileFormat::ALL {
        let Some(relative) = page.file(format).filter(|p| is_contained(p)) else {
            tracing::warn!(page = %page.page_id, format = %format, "No usable local path in metadata");
            summary.failed += 1;
            continue;
        };
        let dest = layout.resolve(relative);
        if output::is_complete(&dest) {
            tracing::debug!(path = %dest.display(), "Already downloaded");
            summary.skipped += 1;
            continue;
        }

        let url = client.endpoints.file_url(&page.batch_path, format);
        let result = match format {
            FileFormat::Txt => download_text(client, &url, &dest).await,
            _ => download_file(client, &url, &dest).await,
        };
        summary.requests += 1;

        match result {
            Ok(bytes) => {
                tracing::debug!(path = %dest.display(), bytes, "Downloaded");
                summary.downloaded += 1;
            }
            Err(e) => {
                tracing::warn!(page = %page.page_id, format = %format, error = %e, "Download failed");
                summary.failed += 1;
            }
        }

        tokio::time::sleep(delay).await;
    }
}

/// Stored paths must stay inside the corpus directory.
fn is_contained(relative: &str) -> bool {
    Path::new(relative)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn parent_dir(dest: &Path) -> &Path {
    dest.parent().unwrap_or_else(|| Path::new("."))
}

/// Stream a storage-service file to `dest`.
async fn download_file(client: &ArchiveClient, url: &str, dest: &Path) -> Result<u64> {
    let mut response = client.get_once(url).await?;
    let mut part = PartialFile::create(parent_dir(dest))?;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|source| AcquireError::Transport {
            url: url.to_string(),
            source,
        })?
    {
        part.write_chunk(&chunk)?;
    }
    if part.bytes_written() == 0 {
        return Err(AcquireError::MalformedResponse {
            url: url.to_string(),
            reason: "empty body".into(),
        });
    }
    part.commit(dest)
}

/// Fetch OCR text from the text service and save its `full_text` as plain text.
///
/// The service answers `{"/service/<batch>.xml": {"full_text": "...", ...}}`.
async fn download_text(client: &ArchiveClient, url: &str, dest: &Path) -> Result<u64> {
    let response = client.get_once(url).await?;
    let body = response
        .text()
        .await
        .map_err(|source| AcquireError::Transport {
            url: url.to_string(),
            source,
        })?;
    let malformed = |reason: &str| AcquireError::MalformedResponse {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let value: serde_json::Value =
        serde_json::from_str(&body).map_err(|e| malformed(&e.to_string()))?;
    let full_text = value
        .as_object()
        .and_then(|segments| segments.values().next())
        .and_then(|segment| segment.get("full_text"))
        .and_then(|text| text.as_str())
        .ok_or_else(|| malformed("no full_text in text service response"))?;
    if full_text.is_empty() {
        return Err(malformed("empty full_text"));
    }

    let mut part = PartialFile::create(parent_dir(dest))?;
    part.write_chunk(full_text.as_bytes())?;
    part.commit(dest)
}
