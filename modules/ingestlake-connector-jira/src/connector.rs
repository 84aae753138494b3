//! `templateId = http.jira`, unit `jira.issues` (spec §8 scenario 6). Jira's
//! search API is offset-paginated and only supports a single `updated >=`
//! bound for incremental pulls, so `SliceCapable` is the natural fit: one
//! slice per page of `maxResults` issues, checkpointed on the max `updated`
//! timestamp seen so far.

use std::sync::Mutex;

use async_trait::async_trait;
use ingestlake_common::{IngestError, Result};
use ingestlake_connector::{
    Connector, Dataset, Record, RecordIterator, Slice, SliceCapable, SourceEndpoint, UrlValidator,
    ValidateConfigResult, VecRecordIterator,
};

const DATASET_ID: &str = "jira.issues";
const DEFAULT_PAGE_SIZE: u64 = 100;

pub struct JiraConnector {
    base_url: String,
    api_token: String,
    email: String,
    http: reqwest::Client,
    url_validator: UrlValidator,
    last_checkpoint: Mutex<Option<serde_json::Value>>,
}

impl JiraConnector {
    pub fn new(config: &serde_json::Value) -> Result<Self> {
        let base_url = config
            .get("baseUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| IngestError::ConfigInvalid("jira connector requires 'baseUrl'".into()))?
            .to_string();
        let api_token = config
            .get("apiToken")
            .and_then(|v| v.as_str())
            .ok_or_else(|| IngestError::ConfigInvalid("jira connector requires 'apiToken'".into()))?
            .to_string();
        let email = config
            .get("email")
            .and_then(|v| v.as_str())
            .ok_or_else(|| IngestError::ConfigInvalid("jira connector requires 'email'".into()))?
            .to_string();

        let url_validator = UrlValidator::for_endpoint(&base_url)?;

        Ok(Self {
            base_url,
            api_token,
            email,
            http: reqwest::Client::new(),
            url_validator,
            last_checkpoint: Mutex::new(None),
        })
    }

    fn search_url(&self) -> String {
        format!("{}/rest/api/2/search", self.base_url.trim_end_matches('/'))
    }

    /// `checkpoint` is `{"updatedAfter": "<rfc3339>"}` or `None` for a full
    /// backfill. Jira's JQL timestamp literal drops sub-minute precision, so
    /// the checkpoint intentionally only guarantees minute-level resumption.
    fn jql(checkpoint: Option<&serde_json::Value>) -> String {
        match checkpoint.and_then(|c| c.get("updatedAfter")).and_then(|v| v.as_str()) {
            Some(ts) => format!("updated >= \"{}\" ORDER BY updated ASC", jql_timestamp(ts)),
            None => "ORDER BY updated ASC".to_string(),
        }
    }

    async fn fetch_page(&self, jql: &str, start_at: u64, max_results: u64) -> Result<Vec<Record>> {
        self.url_validator.validate(&self.search_url())?;

        let response = self
            .http
            .get(self.search_url())
            .basic_auth(&self.email, Some(&self.api_token))
            .query(&[
                ("jql", jql.to_string()),
                ("startAt", start_at.to_string()),
                ("maxResults", max_results.to_string()),
            ])
            .send()
            .await
            .map_err(|e| IngestError::TransportTransient(e.to_string()))?;

        if response.status().is_client_error() && response.status().as_u16() != 429 {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::TransportFatal(format!("jira search returned {status}: {body}")));
        }
        if !response.status().is_success() {
            return Err(IngestError::TransportTransient(format!("jira search returned {}", response.status())));
        }

        let body: serde_json::Value =
            response.json().await.map_err(|e| IngestError::TransportTransient(e.to_string()))?;
        let issues = body.get("issues").and_then(|v| v.as_array()).cloned().unwrap_or_default();

        let mut records = Vec::with_capacity(issues.len());
        for issue in issues {
            let record: Record = match issue {
                serde_json::Value::Object(map) => map.into_iter().collect(),
                other => {
                    tracing::warn!(?other, "jira search returned a non-object issue, skipping");
                    continue;
                }
            };
            if let Some(updated) = record.get("fields").and_then(|f| f.get("updated")).and_then(|v| v.as_str()) {
                let mut latest = self.last_checkpoint.lock().unwrap();
                let is_newer = latest
                    .as_ref()
                    .and_then(|c| c.get("updatedAfter"))
                    .and_then(|v| v.as_str())
                    .map(|prev| updated > prev)
                    .unwrap_or(true);
                if is_newer {
                    *latest = Some(serde_json::json!({ "updatedAfter": updated }));
                }
            }
            records.push(record);
        }
        Ok(records)
    }

    /// Jira's search endpoint reports `total` on every page, so a count-only
    /// probe just asks for a zero-row page rather than walking the result set.
    async fn jql_total_count(&self, jql: &str) -> Result<u64> {
        self.url_validator.validate(&self.search_url())?;

        let response = self
            .http
            .get(self.search_url())
            .basic_auth(&self.email, Some(&self.api_token))
            .query(&[("jql", jql.to_string()), ("startAt", "0".to_string()), ("maxResults", "0".to_string())])
            .send()
            .await
            .map_err(|e| IngestError::TransportTransient(e.to_string()))?;

        if !response.status().is_success() {
            return Err(IngestError::TransportTransient(format!("jira search returned {}", response.status())));
        }

        let body: serde_json::Value =
            response.json().await.map_err(|e| IngestError::TransportTransient(e.to_string()))?;
        Ok(body.get("total").and_then(|v| v.as_u64()).unwrap_or(0))
    }
}

/// Jira's `updated >= "..."` JQL literal wants `yyyy-MM-dd HH:mm`; an
/// rfc3339 checkpoint value is truncated to that precision.
fn jql_timestamp(rfc3339: &str) -> String {
    rfc3339.get(0..16).map(|s| s.replace('T', " ")).unwrap_or_else(|| rfc3339.to_string())
}

#[async_trait]
impl Connector for JiraConnector {
    fn template_id(&self) -> &str {
        "http.jira"
    }

    async fn validate_config(&self, config: &serde_json::Value) -> ValidateConfigResult {
        for field in ["baseUrl", "apiToken", "email"] {
            if config.get(field).and_then(|v| v.as_str()).is_none() {
                return ValidateConfigResult::invalid(format!("missing required field '{field}'"));
            }
        }
        ValidateConfigResult::ok()
    }

    fn as_source(&self) -> Option<&dyn SourceEndpoint> {
        Some(self)
    }

    fn as_slice_capable(&self) -> Option<&dyn SliceCapable> {
        Some(self)
    }

    fn as_adaptive(&self) -> Option<&dyn ingestlake_connector::AdaptiveIngestion> {
        Some(self)
    }

    fn as_metadata_capable(&self) -> Option<&dyn ingestlake_connector::MetadataCapable> {
        Some(self)
    }
}

#[async_trait]
impl SourceEndpoint for JiraConnector {
    async fn list_datasets(&self) -> Result<Vec<Dataset>> {
        Ok(vec![Dataset { id: DATASET_ID.into(), name: "Jira issues".into(), schema: None }])
    }

    async fn get_schema(&self, _dataset_id: &str) -> Result<serde_json::Value> {
        Ok(serde_json::json!({
            "type": "object",
            "properties": {
                "key": {"type": "string"},
                "fields": {"type": "object"}
            },
            "required": ["key"]
        }))
    }

    async fn read(
        &self,
        dataset_id: &str,
        slice: Option<&Slice>,
        limit: Option<u64>,
    ) -> Result<Box<dyn RecordIterator>> {
        if dataset_id != DATASET_ID {
            return Err(IngestError::NotFound);
        }
        let jql = slice.map(|s| Self::jql(s.params.get("checkpoint"))).unwrap_or_else(|| Self::jql(None));
        let max_results = limit.unwrap_or(DEFAULT_PAGE_SIZE);
        let records = self.fetch_page(&jql, 0, max_results).await?;
        Ok(Box::new(VecRecordIterator::new(records)))
    }
}

#[async_trait]
impl SliceCapable for JiraConnector {
    async fn get_checkpoint(&self, _dataset_id: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.last_checkpoint.lock().unwrap().clone())
    }

    async fn plan_slices(
        &self,
        dataset_id: &str,
        checkpoint: Option<&serde_json::Value>,
        target_size: u64,
    ) -> Result<Vec<Slice>> {
        if dataset_id != DATASET_ID {
            return Err(IngestError::NotFound);
        }
        let total = self.jql_total_count(&Self::jql(checkpoint)).await?;
        Ok(build_slices(checkpoint, target_size.max(1), total))
    }

    async fn read_slice(&self, dataset_id: &str, slice: &Slice) -> Result<Box<dyn RecordIterator>> {
        if dataset_id != DATASET_ID {
            return Err(IngestError::NotFound);
        }
        let jql = Self::jql(slice.params.get("checkpoint"));
        let start_at = slice.params.get("startAt").and_then(|v| v.as_u64()).unwrap_or(0);
        let max_results = slice.params.get("maxResults").and_then(|v| v.as_u64()).unwrap_or(DEFAULT_PAGE_SIZE);
        let records = self.fetch_page(&jql, start_at, max_results).await?;
        Ok(Box::new(VecRecordIterator::new(records)))
    }

    async fn count_between(&self, dataset_id: &str, lower: &serde_json::Value, upper: &serde_json::Value) -> Result<u64> {
        if dataset_id != DATASET_ID {
            return Err(IngestError::NotFound);
        }
        let lower_ts = lower.as_str().unwrap_or_default();
        let upper_ts = upper.as_str().unwrap_or_default();
        let jql = format!("updated >= \"{}\" AND updated < \"{}\"", jql_timestamp(lower_ts), jql_timestamp(upper_ts));
        self.jql_total_count(&jql).await
    }
}

/// Builds one slice per page of `page_size` issues, carrying the same
/// checkpoint forward into every slice's params so `read_slice` can
/// reconstruct the exact JQL independently of planning order.
fn build_slices(checkpoint: Option<&serde_json::Value>, page_size: u64, total: u64) -> Vec<Slice> {
    let slice_count = total.div_ceil(page_size).max(1);
    (0..slice_count)
        .map(|i| Slice {
            slice_id: format!("jira-issues-{i}"),
            sequence: i as u32,
            params: serde_json::json!({
                "startAt": i * page_size,
                "maxResults": page_size,
                "checkpoint": checkpoint,
            }),
            estimated_rows: Some(page_size),
        })
        .collect()
}

#[async_trait]
impl ingestlake_connector::AdaptiveIngestion for JiraConnector {
    async fn probe_ingestion(&self, dataset_id: &str, config: &serde_json::Value) -> Result<ingestlake_connector::ProbeResult> {
        if dataset_id != DATASET_ID {
            return Err(IngestError::NotFound);
        }
        let checkpoint = config.get("checkpoint");
        let total = self.jql_total_count(&Self::jql(checkpoint)).await?;
        Ok(ingestlake_connector::ProbeResult {
            estimated_count: Some(total),
            estimated_bytes: None,
            slice_keys: vec![],
            details: serde_json::json!({ "checkpoint": checkpoint }),
        })
    }

    /// Deterministic given the same probe and config: both only feed into
    /// `build_slices`, no fresh network call (spec §4.1 "deterministic given
    /// the same probe result and config").
    async fn plan_ingestion(
        &self,
        probe: &ingestlake_connector::ProbeResult,
        config: &serde_json::Value,
    ) -> Result<ingestlake_connector::IngestionPlan> {
        let checkpoint = config.get("checkpoint");
        let page_size = config.get("fetchSize").and_then(|v| v.as_u64()).unwrap_or(DEFAULT_PAGE_SIZE).max(1);
        let total = probe.estimated_count.unwrap_or(0);
        Ok(ingestlake_connector::IngestionPlan { slices: build_slices(checkpoint, page_size, total), strategy: "adaptive".into() })
    }
}

#[async_trait]
impl ingestlake_connector::MetadataCapable for JiraConnector {
    async fn probe_environment(&self, _config: &serde_json::Value) -> Result<ingestlake_connector::Environment> {
        let url = format!("{}/rest/api/2/serverInfo", self.base_url.trim_end_matches('/'));
        self.url_validator.validate(&url)?;
        let info = self
            .http
            .get(&url)
            .basic_auth(&self.email, Some(&self.api_token))
            .send()
            .await
            .map_err(|e| IngestError::TransportTransient(e.to_string()))?
            .json::<serde_json::Value>()
            .await
            .map_err(|e| IngestError::TransportTransient(e.to_string()))?;
        let version = info.get("version").and_then(|v| v.as_str()).map(str::to_string);
        Ok(ingestlake_connector::Environment { detected_version: version, details: info })
    }

    async fn collect_metadata(&self, _env: &ingestlake_connector::Environment) -> Result<ingestlake_connector::CatalogSnapshot> {
        Ok(ingestlake_connector::CatalogSnapshot { datasets: self.list_datasets().await? })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> serde_json::Value {
        serde_json::json!({"baseUrl": "https://acme.atlassian.net", "apiToken": "tok", "email": "bot@acme.com"})
    }

    #[tokio::test]
    async fn validate_config_rejects_missing_fields() {
        let connector = JiraConnector::new(&config()).unwrap();
        let result = connector.validate_config(&serde_json::json!({"baseUrl": "https://acme.atlassian.net"})).await;
        assert!(!result.valid);
    }

    #[tokio::test]
    async fn validate_config_accepts_complete_config() {
        let connector = JiraConnector::new(&config()).unwrap();
        let result = connector.validate_config(&config()).await;
        assert!(result.valid);
    }

    #[test]
    fn advertises_source_slice_adaptive_and_metadata_capabilities() {
        let connector = JiraConnector::new(&config()).unwrap();
        assert!(connector.as_source().is_some());
        assert!(connector.as_slice_capable().is_some());
        assert!(connector.as_adaptive().is_some());
        assert!(connector.as_metadata_capable().is_some());
        assert!(connector.as_sink().is_none());
        assert!(connector.as_action().is_none());
    }

    #[test]
    fn build_slices_pages_on_target_size_and_carries_checkpoint_forward() {
        let checkpoint = serde_json::json!({"updatedAfter": "2024-01-05T00:00:00Z"});
        let slices = build_slices(Some(&checkpoint), 100, 250);
        assert_eq!(slices.len(), 3);
        assert_eq!(slices[0].params["startAt"], 0);
        assert_eq!(slices[1].params["startAt"], 100);
        assert_eq!(slices[2].params["startAt"], 200);
        assert_eq!(slices[2].params["checkpoint"], checkpoint);
    }

    #[test]
    fn build_slices_with_zero_total_still_yields_one_slice() {
        let slices = build_slices(None, 100, 0);
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].params["startAt"], 0);
    }

    #[test]
    fn jql_with_no_checkpoint_has_no_lower_bound() {
        assert_eq!(JiraConnector::jql(None), "ORDER BY updated ASC");
    }

    #[test]
    fn jql_with_checkpoint_filters_on_updated() {
        let checkpoint = serde_json::json!({"updatedAfter": "2024-01-05T12:34:56Z"});
        assert_eq!(JiraConnector::jql(Some(&checkpoint)), "updated >= \"2024-01-05 12:34\" ORDER BY updated ASC");
    }

    #[test]
    fn jql_timestamp_truncates_to_minute_precision() {
        assert_eq!(jql_timestamp("2024-01-05T12:34:56.789Z"), "2024-01-05 12:34");
    }
}
