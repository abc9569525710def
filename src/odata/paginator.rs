//! Cursor-following pagination with a partial-result failure policy.
//!
//! Starting from a first-page URL, pages are requested one at a time and
//! their records appended in arrival order. Pagination ends when a page
//! advertises no next cursor, or at the first failure; in the latter case all
//! records gathered so far are still returned, together with the failure.
//!
//! Two guards keep a misbehaving source from hanging the run: a cursor that
//! was already requested stops pagination, and so does an optional page
//! ceiling.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use tracing::{info, warn};

use crate::error::PageFailure;
use crate::Record;

/// One successfully fetched page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Records in the order the source returned them.
    pub records: Vec<Record>,
    /// Cursor of the following page, if any.
    pub next_cursor: Option<String>,
}

/// Result of paginating through a source.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// All records from successful pages, in page and in-page order.
    pub records: Vec<Record>,
    /// Number of pages fetched successfully.
    pub pages: u32,
    /// Set when pagination stopped before the source ran out of pages.
    pub failure: Option<PageFailure>,
}

impl FetchOutcome {
    /// True when every advertised page was fetched.
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

/// A source of pages addressed by cursor.
///
/// This keeps the pagination loop independent of HTTP: the OData client
/// implements it for real requests, tests provide scripted fakes.
pub trait PageSource: Send + Sync {
    /// Requests the page identified by `cursor`.
    fn fetch_page<'a>(
        &'a self,
        cursor: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Page, PageFailure>> + Send + 'a>>;
}

/// Fetches every page reachable from `start_cursor`.
///
/// # Arguments
///
/// * `start_cursor` - Cursor (URL) of the first page
/// * `source` - Performs one page request per call
/// * `max_pages` - Optional ceiling on the number of pages requested
///
/// Never fails as a whole: a page failure ends pagination and is returned in
/// [`FetchOutcome::failure`] alongside the records accumulated before it.
pub async fn fetch_all(
    start_cursor: &str,
    source: &dyn PageSource,
    max_pages: Option<u32>,
) -> FetchOutcome {
    let mut outcome = FetchOutcome::default();
    let mut visited: HashSet<String> = HashSet::new();
    let mut cursor: Option<String> = Some(start_cursor.to_string());

    while let Some(current) = cursor.take() {
        if let Some(limit) = max_pages {
            if outcome.pages >= limit {
                outcome.failure = Some(PageFailure::PageLimit(limit));
                break;
            }
        }

        if !visited.insert(current.clone()) {
            outcome.failure = Some(PageFailure::CursorCycle(current));
            break;
        }

        match source.fetch_page(&current).await {
            Ok(page) => {
                outcome.pages += 1;
                outcome.records.extend(page.records);
                cursor = page.next_cursor;

                info!(
                    "[PAGE] page {} fetched, {} records so far",
                    outcome.pages,
                    outcome.records.len()
                );
            }
            Err(failure) => {
                outcome.failure = Some(failure);
                break;
            }
        }
    }

    match &outcome.failure {
        None => info!(
            "[PAGE] Fetched {} total records in {} pages",
            outcome.records.len(),
            outcome.pages
        ),
        Some(failure) => warn!(
            "[PAGE] Pagination stopped after {} pages ({} records kept): {}",
            outcome.pages,
            outcome.records.len(),
            failure
        ),
    }

    outcome
}
