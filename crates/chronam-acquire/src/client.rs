use crate::error::{AcquireError, Result};
use chronam_model::FileFormat;
use std::time::Duration;

const USER_AGENT: &str = concat!(
    "chronam/",
    env!("CARGO_PKG_VERSION"),
    " (historical research corpus builder)"
);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Base URLs of the three archive services the pipeline talks to.
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// Collection search (paginated JSON).
    pub search_url: String,
    /// Storage service serving `{batch_path}.{ext}` files.
    pub storage_url: String,
    /// Text service deriving plain text from an ALTO XML segment.
    pub text_service_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            search_url: "https://www.loc.gov/collections/chronicling-america/".into(),
            storage_url: "https://tile.loc.gov/storage-services/service".into(),
            text_service_url: "https://tile.loc.gov/text-services/word-coordinates-service".into(),
        }
    }
}

impl Endpoints {
    /// Download URL for one format of a page.
    ///
    /// Plain text goes through the text service, which takes the ALTO XML
    /// segment as input; the storage service's own `.txt` files are not used.
    pub fn file_url(&self, batch_path: &str, format: FileFormat) -> String {
        match format {
            FileFormat::Txt => format!(
                "{}?segment=/service/{batch_path}.xml&format=alto_xml&full_text=1",
                self.text_service_url
            ),
            other => format!("{}/{batch_path}.{}", self.storage_url, other.extension()),
        }
    }
}

/// Bounded exponential backoff for search requests.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `attempt + 1`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// [`delay_for`](Self::delay_for) plus up to 10% random jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let delay = self.delay_for(attempt);
        let spread = (delay.as_millis() / 10) as u64;
        if spread == 0 {
            return delay;
        }
        delay + Duration::from_millis(random_u64() % (spread + 1))
    }
}

/// Random bits from the std hasher's per-instance random keys.
fn random_u64() -> u64 {
    use std::hash::{BuildHasher, Hasher};
    std::collections::hash_map::RandomState::new()
        .build_hasher()
        .finish()
}

/// Parse a numeric `Retry-After` header as seconds.
fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// HTTP access to the archive: one shared `reqwest::Client`, strictly one
/// request in flight at a time.
#[derive(Debug, Clone)]
pub struct ArchiveClient {
    http: reqwest::Client,
    pub endpoints: Endpoints,
    pub retry: RetryPolicy,
}

impl ArchiveClient {
    pub fn new(endpoints: Endpoints, retry: RetryPolicy) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| AcquireError::Transport {
                url: String::new(),
                source,
            })?;
        Ok(Self {
            http,
            endpoints,
            retry,
        })
    }

    /// Single GET with no retry. Non-success statuses are errors.
    pub async fn get_once(&self, url: &str) -> Result<reqwest::Response> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| AcquireError::Transport {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(AcquireError::Status {
                url: url.to_string(),
                status,
            });
        }
        Ok(response)
    }

    /// GET the full body as text, retrying transient failures with backoff.
    ///
    /// Transport errors, 429 and 5xx are retried; any other non-success
    /// status fails at once.
    pub async fn get_text_with_retry(&self, url: &str, query: &[(&str, String)]) -> Result<String> {
        let attempts = self.retry.max_retries + 1;
        let mut last = String::new();

        for attempt in 0..attempts {
            let (err, wait) = match self.http.get(url).query(query).send().await {
                Ok(response) if response.status().is_success() => match response.text().await {
                    Ok(body) => return Ok(body),
                    Err(source) => (
                        AcquireError::Transport {
                            url: url.to_string(),
                            source,
                        },
                        self.retry.backoff(attempt),
                    ),
                },
                Ok(response) => {
                    let wait = self
                        .retry
                        .backoff(attempt)
                        .max(retry_after(&response).unwrap_or_default());
                    let err = AcquireError::Status {
                        url: url.to_string(),
                        status: response.status(),
                    };
                    (err, wait)
                }
                Err(source) => (
                    AcquireError::Transport {
                        url: url.to_string(),
                        source,
                    },
                    self.retry.backoff(attempt),
                ),
            };

            if !err.is_transient() {
                return Err(err);
            }
            last = err.to_string();

            if attempt + 1 < attempts {
                tracing::warn!(
                    attempt = attempt + 1,
                    max = self.retry.max_retries,
                    wait_ms = wait.as_millis() as u64,
                    error = %last,
                    "Request failed, retrying"
                );
                tokio::time::sleep(wait).await;
            }
        }

        Err(AcquireError::RetriesExhausted {
            url: url.to_string(),
            attempts,
            last,
        })
    }
}
