//! Exports Ivanti (HEAT) OData business objects into JSON batch files.
//!
//! Every entity type goes through the same three stages:
//!
//! 1. [`odata::fetch_all`] follows `@odata.nextLink` cursors and accumulates
//!    records, keeping what it has if a page fails.
//! 2. [`normalize::clean_all`] drops vacuous top-level fields and records that
//!    end up empty.
//! 3. [`batch::write_batches`] packs the records, in order, into files of at
//!    most `max_batch_bytes` each (`<entity>_batch_<n>.json`).

pub mod batch;
pub mod commands;
pub mod config;
pub mod error;
pub mod normalize;
pub mod odata;
pub mod pipeline;

/// A schema-less record: an ordered map from field name to JSON value.
pub type Record = serde_json::Map<String, serde_json::Value>;

pub use error::{AppError, PageFailure};
