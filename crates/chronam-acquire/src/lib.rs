//! Building and materializing Chronicling America page corpora.
//!
//! [`builder::build_corpus`] turns a search into `metadata.json`;
//! [`fetcher::fetch_corpus`] downloads the four files of every page listed
//! there. Both issue one request at a time.

pub mod builder;
pub mod client;
pub mod error;
pub mod fetcher;
pub mod output;
pub mod search;

pub use builder::{build_corpus, BuildRequest, BuildSummary};
pub use client::{ArchiveClient, Endpoints, RetryPolicy};
pub use error::{AcquireError, ItemError};
pub use fetcher::{fetch_corpus, FetchRequest, FetchSummary};
