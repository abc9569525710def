//! The per-entity export pipeline: fetch, clean, batch-write.
//!
//! Each stage consumes the full output of the previous one. All state lives
//! in locals of a single invocation, so entities can be exported one after
//! the other (or in separate processes) without coordination.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::batch::write_batches;
use crate::config::{EntityConfig, ExportConfig};
use crate::error::{AppError, PageFailure};
use crate::normalize::clean_all;
use crate::odata::{build_entity_url, fetch_all, PageSource};

/// What one entity export produced.
#[derive(Debug, Clone)]
pub struct EntityReport {
    /// Entity name.
    pub entity: String,
    /// Pages fetched successfully.
    pub pages: u32,
    /// Records received from the source.
    pub fetched: usize,
    /// Records left after cleaning (all of them written).
    pub cleaned: usize,
    /// Batch files written, in batch number order.
    pub files: Vec<PathBuf>,
    /// Why pagination stopped early, if it did.
    pub failure: Option<PageFailure>,
}

impl EntityReport {
    /// True when every page was fetched and every record written.
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

/// Exports one entity.
///
/// A page failure does not abort the export: the records fetched before it
/// are cleaned and written, and the failure is returned in the report.
///
/// # Errors
///
/// - `AppError::Config` - the entity URL cannot be built
/// - `AppError::Serialization` / `AppError::Io` - batch output failed
pub async fn run_entity(
    source: &dyn PageSource,
    config: &ExportConfig,
    entity: &EntityConfig,
) -> Result<EntityReport, AppError> {
    let start_url = build_entity_url(
        config.base_url()?,
        &entity.resource,
        entity.filter.as_deref(),
        entity.page_size,
    )?;
    let output_dir = entity.output_dir(&config.output_root);

    info!("[EXPORT] {}: starting ({})", entity.name, entity.resource);

    // 1) Fetch
    let outcome = fetch_all(start_url.as_str(), source, config.max_pages).await;
    let fetched = outcome.records.len();
    if let Some(failure) = &outcome.failure {
        warn!(
            "[EXPORT] {}: fetch stopped early, writing {} records fetched before the failure: {}",
            entity.name, fetched, failure
        );
    }

    // 2) Clean
    let cleaned = clean_all(outcome.records);
    let cleaned_count = cleaned.len();

    // 3) Batch-write
    let summary = write_batches(&entity.name, &output_dir, cleaned, config.max_batch_bytes).await?;

    info!(
        "[EXPORT] {}: fetched {}, kept {}, wrote {} files to {}",
        entity.name,
        fetched,
        cleaned_count,
        summary.files.len(),
        output_dir.display()
    );

    Ok(EntityReport {
        entity: entity.name.clone(),
        pages: outcome.pages,
        fetched,
        cleaned: cleaned_count,
        files: summary.files,
        failure: outcome.failure,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::read_batch_file;
    use crate::odata::{ApiCredentials, ODataClient};
    use crate::Record;
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client() -> ODataClient {
        ODataClient::new(ApiCredentials::new(SecretString::from("KEY".to_string()))).unwrap()
    }

    fn test_config(server: &MockServer, output_root: &std::path::Path) -> ExportConfig {
        ExportConfig {
            base_url: Some(format!("{}/HEAT/api/odata/businessobject", server.uri())),
            output_root: output_root.to_path_buf(),
            ..ExportConfig::default()
        }
    }

    fn incidents() -> EntityConfig {
        EntityConfig {
            name: "incidents".into(),
            resource: "Incidents".into(),
            filter: Some("Status eq 'Resolved'".into()),
            page_size: Some(2),
            output_dir: None,
        }
    }

    fn read_all(files: &[PathBuf]) -> Vec<Record> {
        files
            .iter()
            .flat_map(|p| read_batch_file(p).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_end_to_end_fetch_clean_write() {
        let mock_server = MockServer::start().await;
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&mock_server, temp_dir.path());
        let entity_path = "/HEAT/api/odata/businessobject/Incidents";

        Mock::given(method("GET"))
            .and(path(entity_path))
            .and(query_param("$filter", "Status eq 'Resolved'"))
            .and(query_param("$top", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    { "IncidentNumber": 1, "Subject": "Café printer", "Notes": "" },
                    { "IncidentNumber": null, "Subject": "", "Tags": [] }
                ],
                "@odata.nextLink": format!("{}{}?$skip=2", mock_server.uri(), entity_path)
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path(entity_path))
            .and(query_param("$skip", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    { "IncidentNumber": 3, "Closed": false, "Owner": {} }
                ]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let report = run_entity(&test_client(), &config, &incidents())
            .await
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.pages, 2);
        assert_eq!(report.fetched, 3);
        assert_eq!(report.cleaned, 2);
        assert_eq!(report.files.len(), 1);
        assert!(report.files[0].ends_with("incidents_batches/incidents_batch_1.json"));

        let written = read_all(&report.files);
        assert_eq!(
            Value::from(written.into_iter().map(Value::Object).collect::<Vec<_>>()),
            json!([
                { "IncidentNumber": 1, "Subject": "Café printer" },
                { "IncidentNumber": 3, "Closed": false }
            ])
        );

        let content = std::fs::read_to_string(&report.files[0]).unwrap();
        assert!(content.contains("Café"), "non-ASCII must be written unescaped");
    }

    #[tokio::test]
    async fn test_page_failure_keeps_partial_results() {
        let mock_server = MockServer::start().await;
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&mock_server, temp_dir.path());
        let entity_path = "/HEAT/api/odata/businessobject/Incidents";

        Mock::given(method("GET"))
            .and(path(entity_path))
            .and(query_param("$top", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{ "IncidentNumber": 1 }, { "IncidentNumber": 2 }],
                "@odata.nextLink": format!("{}{}?$skip=2", mock_server.uri(), entity_path)
            })))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path(entity_path))
            .and(query_param("$skip", "2"))
            .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
            .mount(&mock_server)
            .await;

        let report = run_entity(&test_client(), &config, &incidents())
            .await
            .unwrap();

        assert!(!report.is_complete());
        assert_eq!(
            report.failure,
            Some(PageFailure::Status {
                status: 503,
                body: "Service Unavailable".into()
            })
        );
        assert_eq!(report.fetched, 2);
        assert_eq!(read_all(&report.files).len(), 2);
    }

    #[tokio::test]
    async fn test_all_vacuous_records_write_no_files() {
        let mock_server = MockServer::start().await;
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&mock_server, temp_dir.path());

        Mock::given(method("GET"))
            .and(path("/HEAT/api/odata/businessobject/ProblemSources"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{ "Name": "" }, { "Name": null }]
            })))
            .mount(&mock_server)
            .await;

        let sources = EntityConfig {
            name: "sources".into(),
            resource: "ProblemSources".into(),
            filter: None,
            page_size: None,
            output_dir: None,
        };
        let report = run_entity(&test_client(), &config, &sources).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(report.fetched, 2);
        assert_eq!(report.cleaned, 0);
        assert!(report.files.is_empty());
        let output_dir = temp_dir.path().join("sources_batches");
        assert_eq!(std::fs::read_dir(output_dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_missing_base_url_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let config = ExportConfig {
            output_root: temp_dir.path().to_path_buf(),
            ..ExportConfig::default()
        };

        let result = run_entity(&test_client(), &config, &incidents()).await;

        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
