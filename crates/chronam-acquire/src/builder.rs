use crate::client::ArchiveClient;
use crate::error::{AcquireError, ItemError, Result};
use crate::output;
use crate::search::{self, SearchResponse};
use chrono::NaiveDate;
use chronam_model::{CorpusLayout, CorpusMetadata, PageRecord};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_MAX_PAGES: usize = 150;

/// 20 requests per minute.
pub const DEFAULT_SEARCH_DELAY: Duration = Duration::from_secs(3);

/// Parameters of one corpus build.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub query: String,
    pub corpus: String,
    pub max_pages: usize,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub state: Option<String>,
    /// Pause between consecutive search requests.
    pub delay: Duration,
}

impl BuildRequest {
    pub fn new(query: &str, corpus: &str) -> Self {
        Self {
            query: query.to_string(),
            corpus: corpus.to_string(),
            max_pages: DEFAULT_MAX_PAGES,
            start_date: None,
            end_date: None,
            state: None,
            delay: DEFAULT_SEARCH_DELAY,
        }
    }

    /// Reject bad input before any request is made.
    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(AcquireError::Validation("search query must not be empty".into()));
        }
        validate_corpus_name(&self.corpus)?;
        if self.max_pages == 0 {
            return Err(AcquireError::Validation("max pages must be at least 1".into()));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(AcquireError::Validation(format!(
                    "start date {start} is after end date {end}"
                )));
            }
        }
        Ok(())
    }

    fn accepts(&self, record: &PageRecord) -> bool {
        let after_start = self.start_date.map_or(true, |s| record.date >= s);
        let before_end = self.end_date.map_or(true, |e| record.date <= e);
        let in_state = self
            .state
            .as_deref()
            .map_or(true, |s| record.state.eq_ignore_ascii_case(s.trim()));
        after_start && before_end && in_state
    }
}

/// Corpus names become directory names: ASCII letters, digits, `.`, `_`, `-`.
pub fn validate_corpus_name(name: &str) -> Result<()> {
    let safe = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if safe {
        Ok(())
    } else {
        Err(AcquireError::Validation(format!(
            "corpus name '{name}' is not filesystem-safe (use letters, digits, '.', '_', '-')"
        )))
    }
}

/// Outcome of a build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub accepted: usize,
    /// Items that could not be used (malformed, missing storage path).
    pub skipped: usize,
    /// Usable items outside the date/state filter or already accepted.
    pub filtered: usize,
    pub requests: usize,
    pub metadata_path: PathBuf,
}

/// Search the archive and write the corpus metadata file.
///
/// Nothing is written unless the whole search succeeds.
pub async fn build_corpus(
    client: &ArchiveClient,
    data_dir: &Path,
    request: &BuildRequest,
) -> Result<BuildSummary> {
    request.validate()?;
    tracing::info!(query = %request.query, corpus = %request.corpus, max_pages = request.max_pages, "Searching");

    let (pages, mut summary) = search_pages(client, request).await?;

    let metadata = CorpusMetadata::new(
        &request.corpus,
        &request.query,
        request.start_date,
        request.end_date,
        request.state.clone(),
        pages,
    );
    let layout = CorpusLayout::new(data_dir, &request.corpus);
    summary.metadata_path = output::write_metadata(&layout, &metadata)?;

    tracing::info!(
        accepted = summary.accepted,
        skipped = summary.skipped,
        filtered = summary.filtered,
        requests = summary.requests,
        "Build complete"
    );
    Ok(summary)
}

/// Page through search results until `max_pages` records are accepted or
/// the results run out.
pub async fn search_pages(
    client: &ArchiveClient,
    request: &BuildRequest,
) -> Result<(Vec<PageRecord>, BuildSummary)> {
    let mut pages: Vec<PageRecord> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut summary = BuildSummary::default();
    let url = client.endpoints.search_url.clone();

    let mut page_num = 1;
    while pages.len() < request.max_pages {
        if page_num > 1 {
            tokio::time::sleep(request.delay).await;
        }

        let params = search::search_params(
            &request.query,
            request.start_date,
            request.end_date,
            request.state.as_deref(),
            page_num,
        );
        let body = client.get_text_with_retry(&url, &params).await?;
        summary.requests += 1;

        let response: SearchResponse =
            serde_json::from_str(&body).map_err(|e| AcquireError::MalformedResponse {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        if response.results.is_empty() {
            tracing::info!(page = page_num, "No more results");
            break;
        }
        let has_next = response.has_next();

        for raw in response.results {
            if pages.len() >= request.max_pages {
                break;
            }
            let record = match search::decode_item(raw).and_then(|item| item.to_record()) {
                Ok(record) => record,
                Err(ItemError::NotAPage) => {
                    summary.filtered += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(page = page_num, error = %e, "Skipping search result");
                    summary.skipped += 1;
                    continue;
                }
            };
            if !request.accepts(&record) {
                tracing::debug!(page_id = %record.page_id, date = %record.date, state = %record.state, "Outside filter");
                summary.filtered += 1;
                continue;
            }
            if !seen.insert(record.page_id.clone()) {
                tracing::debug!(page_id = %record.page_id, "Duplicate result");
                summary.filtered += 1;
                continue;
            }
            pages.push(record);
        }

        tracing::info!(page = page_num, accepted = pages.len(), "Search page processed");
        if !has_next {
            break;
        }
        page_num += 1;
    }

    summary.accepted = pages.len();
    Ok((pages, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Endpoints, RetryPolicy};
    use chronam_model::FileFormat;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SEARCH_PATH: &str = "/collections/chronicling-america/";

    fn client_for(server: &MockServer, max_retries: u32) -> ArchiveClient {
        let endpoints = Endpoints {
            search_url: format!("{}{SEARCH_PATH}", server.uri()),
            ..Endpoints::default()
        };
        let retry = RetryPolicy {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        };
        ArchiveClient::new(endpoints, retry).unwrap()
    }

    fn request(max_pages: usize) -> BuildRequest {
        BuildRequest {
            max_pages,
            start_date: NaiveDate::from_ymd_opt(1848, 1, 1),
            end_date: NaiveDate::from_ymd_opt(1855, 12, 31),
            delay: Duration::ZERO,
            ..BuildRequest::new("gold rush", "gold_rush")
        }
    }

    fn segment(lccn: &str, date: &str, seq: u32) -> serde_json::Value {
        let compact = date.replace('-', "");
        json!({
            "type": ["segment"],
            "image_url": [format!(
                "https://tile.loc.gov/image-services/iiif/service:ndnp:curiv:batch_curiv_x_ver01:data:{lccn}:0000:{compact}01:{seq:04}/full/pct:25/0/default.jpg"
            )],
            "number_lccn": [lccn],
            "date": date,
            "number_edition": ["1"],
            "number_page": [format!("{seq:04}")],
            "partof_title": ["Daily Alta California"],
            "location_state": ["california"],
            "location_city": ["san francisco"],
            "url": format!("https://www.loc.gov/resource/{lccn}/{date}/ed-1/?sp={seq}")
        })
    }

    fn results_page(items: Vec<serde_json::Value>, next: Option<&str>) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "results": items,
            "pagination": { "next": next }
        }))
    }

    #[tokio::test]
    async fn test_gold_rush_build() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SEARCH_PATH))
            .and(query_param("sp", "1"))
            .and(query_param("qs", "gold rush"))
            .and(query_param("dates", "1848/1855"))
            .respond_with(results_page(
                vec![
                    segment("sn85066387", "1847-06-10", 1),
                    segment("sn85066387", "1849-01-04", 1),
                    segment("sn85066387", "1856-03-02", 2),
                    segment("sn85066387", "1850-07-15", 3),
                    segment("sn85066387", "1852-11-20", 4),
                ],
                Some("https://www.loc.gov/collections/chronicling-america/?sp=2"),
            ))
            .mount(&server)
            .await;

        let data = TempDir::new().unwrap();
        let summary = build_corpus(&client_for(&server, 0), data.path(), &request(3))
            .await
            .unwrap();
        assert_eq!(summary.accepted, 3);
        assert_eq!(summary.requests, 1);

        let meta = CorpusLayout::new(data.path(), "gold_rush").load_metadata().unwrap();
        assert_eq!(meta.total_pages, 3);
        assert_eq!(meta.pages.len(), 3);
        for page in &meta.pages {
            assert!(meta.date_in_range(page.date), "{} out of range", page.date);
            assert_eq!(page.files.len(), 4);
            for format in FileFormat::ALL {
                assert!(page.file(format).unwrap().starts_with("pages/"));
            }
        }
        let dates: Vec<String> = meta.pages.iter().map(|p| p.date.to_string()).collect();
        assert_eq!(dates, ["1849-01-04", "1850-07-15", "1852-11-20"]);
    }

    #[tokio::test]
    async fn test_paginates_until_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SEARCH_PATH))
            .and(query_param("sp", "1"))
            .respond_with(results_page(
                vec![segment("sn1", "1849-01-01", 1), segment("sn1", "1849-01-01", 2)],
                Some("next"),
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(SEARCH_PATH))
            .and(query_param("sp", "2"))
            .respond_with(results_page(vec![segment("sn1", "1849-01-02", 1)], None))
            .mount(&server)
            .await;

        let (pages, summary) = search_pages(&client_for(&server, 0), &request(50))
            .await
            .unwrap();
        assert_eq!(pages.len(), 3);
        assert_eq!(summary.requests, 2);
    }

    #[tokio::test]
    async fn test_skips_unusable_and_duplicate_items() {
        let server = MockServer::start().await;
        let mut no_image = segment("sn1", "1849-01-01", 9);
        no_image["image_url"] = json!([]);
        Mock::given(method("GET"))
            .and(path(SEARCH_PATH))
            .respond_with(results_page(
                vec![
                    segment("sn1", "1849-01-01", 1),
                    no_image,
                    json!({"type": "segment"}),
                    segment("sn1", "1849-01-01", 1),
                    json!({"type": ["newspaper"]}),
                    segment("sn1", "1849-01-01", 2),
                ],
                None,
            ))
            .mount(&server)
            .await;

        let (pages, summary) = search_pages(&client_for(&server, 0), &request(10))
            .await
            .unwrap();
        let ids: HashSet<&str> = pages.iter().map(|p| p.page_id.as_str()).collect();
        assert_eq!(pages.len(), 2);
        assert_eq!(ids.len(), 2);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.filtered, 2);
    }

    #[tokio::test]
    async fn test_state_filter() {
        let server = MockServer::start().await;
        let mut oregon = segment("sn2", "1850-01-01", 1);
        oregon["location_state"] = json!(["oregon"]);
        Mock::given(method("GET"))
            .and(path(SEARCH_PATH))
            .and(query_param("location_state", "california"))
            .respond_with(results_page(vec![oregon, segment("sn1", "1850-01-01", 1)], None))
            .mount(&server)
            .await;

        let req = BuildRequest {
            state: Some("California".into()),
            ..request(10)
        };
        let (pages, _) = search_pages(&client_for(&server, 0), &req).await.unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].lccn, "sn1");
    }

    #[tokio::test]
    async fn test_exhausted_retries_write_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let data = TempDir::new().unwrap();
        let err = build_corpus(&client_for(&server, 2), data.path(), &request(3))
            .await
            .unwrap_err();
        assert!(matches!(err, AcquireError::RetriesExhausted { attempts: 3, .. }));
        assert!(!data.path().join("gold_rush").exists());
    }

    #[tokio::test]
    async fn test_start_only_range_stays_open() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SEARCH_PATH))
            .and(query_param("dates", "1848/9999"))
            .respond_with(results_page(
                vec![
                    segment("sn85066387", "1847-12-31", 1),
                    segment("sn85066387", "1850-02-01", 1),
                    segment("sn85066387", "1851-08-09", 2),
                ],
                None,
            ))
            .mount(&server)
            .await;

        let req = BuildRequest {
            end_date: None,
            ..request(10)
        };
        let (pages, summary) = search_pages(&client_for(&server, 0), &req).await.unwrap();
        let dates: Vec<String> = pages.iter().map(|p| p.date.to_string()).collect();
        assert_eq!(dates, ["1850-02-01", "1851-08-09"]);
        assert_eq!(summary.filtered, 1);
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_previous_metadata() {
        let healthy = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SEARCH_PATH))
            .respond_with(results_page(vec![segment("sn1", "1849-01-01", 1)], None))
            .mount(&healthy)
            .await;
        let data = TempDir::new().unwrap();
        build_corpus(&client_for(&healthy, 0), data.path(), &request(3))
            .await
            .unwrap();
        let metadata_path = CorpusLayout::new(data.path(), "gold_rush").metadata_path();
        let before = std::fs::read(&metadata_path).unwrap();

        let failing = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&failing)
            .await;
        let err = build_corpus(&client_for(&failing, 1), data.path(), &request(3))
            .await
            .unwrap_err();
        assert!(matches!(err, AcquireError::RetriesExhausted { .. }));
        assert_eq!(std::fs::read(&metadata_path).unwrap(), before);

        let entries = std::fs::read_dir(metadata_path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn test_invalid_request_makes_no_requests() {
        let server = MockServer::start().await;
        let client = client_for(&server, 0);
        let data = TempDir::new().unwrap();

        let reversed = BuildRequest {
            start_date: NaiveDate::from_ymd_opt(1856, 1, 1),
            ..request(3)
        };
        let empty_query = BuildRequest {
            query: "   ".into(),
            ..request(3)
        };
        let bad_name = BuildRequest {
            corpus: "../escape".into(),
            ..request(3)
        };
        for req in [reversed, empty_query, bad_name] {
            let err = build_corpus(&client, data.path(), &req).await.unwrap_err();
            assert!(matches!(err, AcquireError::Validation(_)), "got {err:?}");
        }
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[test]
    fn test_corpus_names() {
        assert!(validate_corpus_name("prohibition_1920s").is_ok());
        assert!(validate_corpus_name("spanish-flu.1918").is_ok());
        assert!(validate_corpus_name("").is_err());
        assert!(validate_corpus_name("..").is_err());
        assert!(validate_corpus_name("a/b").is_err());
        assert!(validate_corpus_name("gold rush").is_err());
    }
}
