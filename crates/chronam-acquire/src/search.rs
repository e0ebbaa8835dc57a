//! Types and parsing for the loc.gov collection search API.

use crate::error::ItemError;
use chrono::NaiveDate;
use chronam_model::{PageId, PageRecord};
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

/// Results requested per search page.
const RESULTS_PER_PAGE: u32 = 100;

/// One page of search results.
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    /// Items are decoded one at a time so a single bad item can be skipped.
    #[serde(default)]
    pub results: Vec<serde_json::Value>,
    #[serde(default)]
    pub pagination: Pagination,
}

#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub next: Option<serde_json::Value>,
}

impl SearchResponse {
    /// Whether the API reports another page after this one.
    pub fn has_next(&self) -> bool {
        match &self.pagination.next {
            None | Some(serde_json::Value::Null) | Some(serde_json::Value::Bool(false)) => false,
            Some(serde_json::Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }
}

/// A page-level ("segment") search result. Most fields arrive as arrays.
#[derive(Debug, Default, Deserialize)]
pub struct SearchItem {
    #[serde(default, rename = "type")]
    pub kind: Vec<String>,
    #[serde(default)]
    pub image_url: Vec<String>,
    #[serde(default)]
    pub number_lccn: Vec<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub number_edition: Vec<String>,
    #[serde(default)]
    pub number_page: Vec<String>,
    #[serde(default)]
    pub partof_title: Vec<String>,
    #[serde(default)]
    pub location_state: Vec<String>,
    #[serde(default)]
    pub location_city: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
}

fn first_or<'a>(values: &'a [String], default: &'a str) -> &'a str {
    values.first().map(String::as_str).unwrap_or(default)
}

/// Extract the storage-service path fragment from an IIIF image URL.
///
/// `.../iiif/service:ndnp:dlc:batch_x:data:sn83030214:00206532518:1920050201:0027/full/...`
/// becomes `ndnp/dlc/batch_x/data/sn83030214/00206532518/1920050201/0027`.
pub fn extract_batch_path(image_url: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"service:([^/]+)/full").expect("valid regex"));
    re.captures(image_url)
        .map(|caps| caps[1].replace(':', "/"))
}

/// Parse an edition or page number; leading zeros are allowed and an
/// all-zero or empty value means 1.
fn parse_number(field: &'static str, value: &str) -> Result<u32, ItemError> {
    let trimmed = value.trim().trim_start_matches('0');
    if trimmed.is_empty() {
        return Ok(1);
    }
    trimmed.parse().map_err(|_| ItemError::BadNumber {
        field,
        value: value.to_string(),
    })
}

impl SearchItem {
    pub fn state(&self) -> &str {
        first_or(&self.location_state, "Unknown")
    }

    pub fn parsed_date(&self) -> Result<NaiveDate, ItemError> {
        self.date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .ok_or_else(|| ItemError::BadDate(self.date.clone()))
    }

    /// Turn a search result into a page record with its local file paths.
    pub fn to_record(&self) -> Result<PageRecord, ItemError> {
        if self.kind.len() != 1 || self.kind[0] != "segment" {
            return Err(ItemError::NotAPage);
        }

        let image_url = self.image_url.first().ok_or(ItemError::MissingImageUrl)?;
        let batch_path = extract_batch_path(image_url)
            .ok_or_else(|| ItemError::NoStoragePath(image_url.clone()))?;

        let date = self.parsed_date()?;
        let lccn = first_or(&self.number_lccn, "");
        let edition = parse_number("edition", first_or(&self.number_edition, "1"))?;
        let sequence = parse_number("page number", first_or(&self.number_page, "1"))?;
        let id = PageId::new(lccn, date, edition, sequence)?;

        Ok(PageRecord {
            page_id: id.to_string(),
            newspaper_title: first_or(&self.partof_title, "Unknown").to_string(),
            lccn: id.lccn.clone(),
            date,
            edition,
            sequence,
            state: self.state().to_string(),
            city: first_or(&self.location_city, "Unknown").to_string(),
            batch_path,
            url: self.url.clone().unwrap_or_default(),
            files: id.local_files(),
        })
    }
}

/// Decode one raw result item.
pub fn decode_item(value: serde_json::Value) -> Result<SearchItem, ItemError> {
    serde_json::from_value(value).map_err(|e| ItemError::Undecodable(e.to_string()))
}

/// Year bounds sent for the open side of a half-open date range.
const OPEN_START_YEAR: &str = "0000";
const OPEN_END_YEAR: &str = "9999";

/// The API narrows dates by year only (`YYYY/YYYY`); exact bounds are
/// applied client-side. A missing bound stays open.
fn dates_param(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Option<String> {
    let year = |d: NaiveDate| d.format("%Y").to_string();
    match (start, end) {
        (Some(s), Some(e)) => Some(format!("{}/{}", year(s), year(e))),
        (Some(s), None) => Some(format!("{}/{OPEN_END_YEAR}", year(s))),
        (None, Some(e)) => Some(format!("{OPEN_START_YEAR}/{}", year(e))),
        (None, None) => None,
    }
}

/// Query parameters for one page of a page-level search.
pub fn search_params(
    query: &str,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    state: Option<&str>,
    page: u32,
) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("fo", "json".to_string()),
        ("c", RESULTS_PER_PAGE.to_string()),
        ("dl", "page".to_string()),
        ("qs", query.to_string()),
        ("fa", "partof_collection:chronicling america".to_string()),
    ];
    if let Some(dates) = dates_param(start, end) {
        params.push(("dates", dates));
    }
    if let Some(state) = state {
        params.push(("location_state", state.to_lowercase()));
    }
    params.push(("sp", page.to_string()));
    params
}
