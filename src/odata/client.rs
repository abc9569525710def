//! OData HTTP client with secure credential handling and safe logging.

use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

use crate::error::{report_body, AppError, PageFailure};
use crate::odata::paginator::{Page, PageSource};
use crate::Record;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// User agent string for all API requests.
const CLIENT_USER_AGENT: &str = concat!("ivanti-export/", env!("CARGO_PKG_VERSION"));

/// Prefix of the `Authorization` header value expected by the REST API.
const API_KEY_SCHEME: &str = "rest_api_key=";

/// Query parameter keys (case-insensitive) that should have their values redacted.
const SENSITIVE_QUERY_PARAMS: &[&str] = &[
    "rest_api_key",
    "api_key",
    "access_token",
    "token",
    "sid",
    "session",
    "authorization",
];

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// Mirrors one OData collection response.
#[derive(Debug, Deserialize)]
struct WirePage {
    /// The records of this page. A missing array counts as an empty page.
    #[serde(default)]
    value: Vec<Record>,
    /// Absolute or relative URL of the next page.
    #[serde(rename = "@odata.nextLink", default)]
    next_link: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// ApiCredentials
// ─────────────────────────────────────────────────────────────────────────────

/// REST API key, wrapped so it never shows up in `Debug` output or logs.
#[derive(Clone)]
pub struct ApiCredentials {
    api_key: SecretString,
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl ApiCredentials {
    pub fn new(api_key: SecretString) -> Self {
        Self { api_key }
    }

    /// Value for the `Authorization` header: `rest_api_key=<key>`.
    ///
    /// A key that already carries the scheme prefix is used as given.
    fn authorization_value(&self) -> String {
        let key = self.api_key.expose_secret().trim();
        if key.starts_with(API_KEY_SCHEME) {
            key.to_string()
        } else {
            format!("{}{}", API_KEY_SCHEME, key)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// URL Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Determines if a query parameter key is sensitive and should be redacted.
fn is_sensitive_param(key: &str) -> bool {
    let key_lower = key.to_ascii_lowercase();
    SENSITIVE_QUERY_PARAMS
        .iter()
        .any(|&sensitive| key_lower == sensitive)
}

/// Renders a URL for logging as its path and query, with sensitive query
/// values redacted.
///
/// Example: `/HEAT/api/odata/businessobject/Incidents?$top=100&$skip=200`.
/// The result never contains the scheme, host, or fragment.
pub fn sanitize_url_for_logs(url: &Url) -> String {
    let path = url.path();

    let query_pairs: Vec<_> = url.query_pairs().collect();
    if query_pairs.is_empty() {
        return path.to_string();
    }

    let redacted_pairs: Vec<String> = query_pairs
        .into_iter()
        .map(|(key, value)| {
            if is_sensitive_param(&key) {
                format!("{}=***", key)
            } else {
                format!("{}={}", key, value)
            }
        })
        .collect();

    format!("{}?{}", path, redacted_pairs.join("&"))
}

/// Builds the first-page URL of an entity collection.
///
/// `resource` is resolved below `base_url` (a trailing slash is added to the
/// base when missing), then the optional `$filter` and `$top` parameters are
/// appended.
///
/// # Errors
///
/// Returns `AppError::Config` if the base URL or resource is not a valid URL.
pub fn build_entity_url(
    base_url: &str,
    resource: &str,
    filter: Option<&str>,
    page_size: Option<u32>,
) -> Result<Url, AppError> {
    let base = if base_url.ends_with('/') {
        base_url.to_string()
    } else {
        format!("{}/", base_url)
    };

    let base = Url::parse(&base)
        .map_err(|e| AppError::Config(format!("Invalid base URL '{}': {}", base_url, e)))?;
    let mut url = base
        .join(resource.trim_start_matches('/'))
        .map_err(|e| AppError::Config(format!("Invalid resource '{}': {}", resource, e)))?;

    if filter.is_some() || page_size.is_some() {
        let mut pairs = url.query_pairs_mut();
        if let Some(filter) = filter {
            pairs.append_pair("$filter", filter);
        }
        if let Some(top) = page_size {
            pairs.append_pair("$top", &top.to_string());
        }
    }

    Ok(url)
}

// ─────────────────────────────────────────────────────────────────────────────
// ODataClient
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP client for reading OData business object collections page by page.
#[derive(Clone)]
pub struct ODataClient {
    /// The underlying HTTP client.
    http: reqwest::Client,
    /// API credential sent with every request.
    credentials: ApiCredentials,
}

impl ODataClient {
    /// Creates a new client with the provided credentials.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Internal` if the HTTP client fails to initialize.
    pub fn new(credentials: ApiCredentials) -> Result<Self, AppError> {
        let http = build_http_client()?;
        Ok(Self { http, credentials })
    }

    /// Fetches and parses one page.
    ///
    /// # Errors
    ///
    /// - `PageFailure::MalformedCursor` - `cursor` is not an absolute URL
    /// - `PageFailure::Transport` - the request could not be completed
    /// - `PageFailure::Status` - non-2xx response (status and body reported)
    /// - `PageFailure::MalformedPage` - success response that is not a page
    pub async fn get_page(&self, cursor: &str) -> Result<Page, PageFailure> {
        let url = Url::parse(cursor).map_err(|_| PageFailure::MalformedCursor(cursor.to_string()))?;

        let response = self.execute_get(&url).await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("Unable to read error body"));
            return Err(PageFailure::Status {
                status: status.as_u16(),
                body: report_body(&body),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|_| PageFailure::Transport("Failed to read response body".to_string()))?;

        let wire: WirePage = serde_json::from_slice(&body)
            .map_err(|e| PageFailure::MalformedPage(format!("Failed to parse page: {}", e)))?;

        Ok(Page {
            records: wire.value,
            next_cursor: resolve_next_link(&url, wire.next_link),
        })
    }

    /// Executes a single authenticated GET with timing and logging.
    ///
    /// Never logs the Authorization header, bodies, or the raw transport
    /// error (which may echo the full URL).
    async fn execute_get(&self, url: &Url) -> Result<reqwest::Response, PageFailure> {
        let start = Instant::now();
        let sanitized_url = sanitize_url_for_logs(url);

        let result = self
            .http
            .get(url.as_str())
            .header(AUTHORIZATION, self.credentials.authorization_value())
            .send()
            .await;
        let duration_ms = start.elapsed().as_millis();

        match result {
            Ok(response) => {
                info!(
                    "[ODATA] GET {} {} {}ms",
                    sanitized_url,
                    response.status().as_u16(),
                    duration_ms
                );
                Ok(response)
            }
            Err(_) => {
                warn!("[ODATA] GET {} FAILED {}ms", sanitized_url, duration_ms);
                Err(PageFailure::Transport(format!(
                    "Request to {} failed",
                    sanitized_url
                )))
            }
        }
    }
}

impl PageSource for ODataClient {
    fn fetch_page<'a>(
        &'a self,
        cursor: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Page, PageFailure>> + Send + 'a>> {
        Box::pin(self.get_page(cursor))
    }
}

/// Resolves an advertised next link against the URL of the page carrying it.
///
/// Blank links mean there is no next page. A link that cannot be resolved is
/// passed through unchanged so the next request reports it as malformed.
fn resolve_next_link(current: &Url, next_link: Option<String>) -> Option<String> {
    let link = next_link?;
    let link = link.trim();
    if link.is_empty() {
        return None;
    }
    match current.join(link) {
        Ok(resolved) => Some(resolved.into()),
        Err(_) => Some(link.to_string()),
    }
}

/// Builds the configured HTTP client.
fn build_http_client() -> Result<reqwest::Client, AppError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

    reqwest::Client::builder()
        .default_headers(headers)
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
