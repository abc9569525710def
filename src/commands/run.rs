//! `run` command: export entities one after the other.

use std::path::PathBuf;

use clap::Args;
use secrecy::{ExposeSecret, SecretString};
use tracing::{error, info, warn};

use crate::commands::Outcome;
use crate::config::ExportConfig;
use crate::error::AppError;
use crate::odata::{ApiCredentials, ODataClient};
use crate::pipeline::{run_entity, EntityReport};

/// Arguments for `run`.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// OData business object root URL (overrides the config file).
    #[arg(long, env = "IVANTI_BASE_URL")]
    pub base_url: Option<String>,

    /// REST API key sent as `Authorization: rest_api_key=<key>`.
    #[arg(long, env = "IVANTI_API_KEY", hide_env_values = true, value_parser = parse_secret)]
    pub api_key: Option<SecretString>,

    /// Directory under which `<entity>_batches` directories are created.
    #[arg(long)]
    pub output_root: Option<PathBuf>,

    /// Byte budget per batch file.
    #[arg(long)]
    pub max_batch_bytes: Option<u64>,

    /// Stop an entity after this many pages.
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// Entities to export (default: all configured).
    pub entities: Vec<String>,
}

impl RunArgs {
    /// Applies command-line overrides on top of the file configuration.
    pub fn apply(&self, mut config: ExportConfig) -> Result<ExportConfig, AppError> {
        if let Some(base_url) = &self.base_url {
            config.base_url = Some(base_url.clone());
        }
        if let Some(output_root) = &self.output_root {
            config.output_root = output_root.clone();
        }
        if let Some(max_batch_bytes) = self.max_batch_bytes {
            config.max_batch_bytes = max_batch_bytes;
        }
        if let Some(max_pages) = self.max_pages {
            config.max_pages = Some(max_pages);
        }
        config.validate()?;
        Ok(config)
    }

    fn credentials(&self) -> Result<ApiCredentials, AppError> {
        let key = self
            .api_key
            .as_ref()
            .map(|k| k.expose_secret().trim())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                AppError::Config("No API key given (use --api-key or IVANTI_API_KEY)".into())
            })?;
        Ok(ApiCredentials::new(SecretString::from(key.to_string())))
    }
}

fn parse_secret(value: &str) -> Result<SecretString, std::convert::Infallible> {
    Ok(SecretString::from(value.to_string()))
}

/// Runs the export for every selected entity.
///
/// Entities are independent: a fatal error in one is reported and the
/// remaining entities still run.
///
/// # Errors
///
/// Returns an error only for problems that prevent any export from starting
/// (bad configuration, unknown entity, missing credentials).
pub async fn execute(args: RunArgs, config: ExportConfig) -> Result<Outcome, AppError> {
    let config = args.apply(config)?;
    config.base_url()?;
    let entities = config.select(&args.entities)?;
    let client = ODataClient::new(args.credentials()?)?;

    let mut reports: Vec<EntityReport> = Vec::new();
    let mut fatal = 0usize;

    for entity in &entities {
        match run_entity(&client, &config, entity).await {
            Ok(report) => reports.push(report),
            Err(e) => {
                error!("[EXPORT] {}: aborted: {}", entity.name, e);
                fatal += 1;
            }
        }
    }

    for report in &reports {
        match &report.failure {
            None => info!(
                "[SUMMARY] {}: {} records in {} files",
                report.entity,
                report.cleaned,
                report.files.len()
            ),
            Some(failure) => warn!(
                "[SUMMARY] {}: INCOMPLETE after {} pages (status {}): {} - rerun required",
                report.entity,
                report.pages,
                failure
                    .status_code()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                failure
            ),
        }
    }

    Ok(outcome_of(&reports, fatal))
}

fn outcome_of(reports: &[EntityReport], fatal: usize) -> Outcome {
    if fatal > 0 {
        Outcome::Failed
    } else if reports.iter().any(|r| !r.is_complete()) {
        Outcome::Partial
    } else {
        Outcome::Complete
    }
}
