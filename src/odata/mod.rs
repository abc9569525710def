//! OData HTTP access and pagination.
//!
//! - **Secure credential handling** via `secrecy::SecretString`
//! - **Safe logging** that never leaks the API key or sensitive URL parameters
//! - **Cursor pagination** following `@odata.nextLink`, keeping partial results
//!   when a page fails

pub mod client;
pub mod paginator;

pub use client::{build_entity_url, ApiCredentials, ODataClient};
pub use paginator::{fetch_all, FetchOutcome, Page, PageSource};
