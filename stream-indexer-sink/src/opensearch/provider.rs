//! OpenSearch sink implementation.
//!
//! This module provides the concrete implementation of `BulkSinkProvider`
//! using the OpenSearch Rust crate.

use async_trait::async_trait;
use opensearch::{
    http::request::JsonBody,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    indices::{IndicesCreateParts, IndicesExistsParts},
    BulkParts, OpenSearch,
};
use serde_json::{json, Value};
use tracing::{debug, error, info};
use url::Url;

use crate::errors::SinkError;
use crate::interfaces::BulkSinkProvider;
use crate::opensearch::index_config::{get_index_settings, IndexConfig};
use crate::types::{BulkItemResult, BulkSummary, SinkDocument};

/// OpenSearch bulk sink.
///
/// Submits staged documents with the `_bulk` API, one `index` action per
/// document, and folds the per-item outcomes into a [`BulkSummary`].
pub struct OpenSearchSink {
    client: OpenSearch,
    index_config: IndexConfig,
}

impl OpenSearchSink {
    /// Create a new sink connected to the specified URL.
    ///
    /// # Arguments
    ///
    /// * `url` - The OpenSearch server URL (e.g., "http://localhost:9200")
    /// * `index_config` - The target index name and version
    pub fn new(url: &str, index_config: IndexConfig) -> Result<Self, SinkError> {
        let parsed_url = Url::parse(url).map_err(|e| SinkError::unreachable(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .build()
            .map_err(|e| SinkError::unreachable(e.to_string()))?;

        let client = OpenSearch::new(transport);

        info!(
            url = %url,
            index = %index_config.physical_name(),
            "Created OpenSearch sink"
        );

        Ok(Self {
            client,
            index_config,
        })
    }

    /// Build the newline-delimited bulk body: one action line plus one
    /// source line per document.
    fn bulk_body(documents: &[SinkDocument]) -> Vec<JsonBody<Value>> {
        let mut body: Vec<JsonBody<Value>> = Vec::with_capacity(documents.len() * 2);
        for doc in documents {
            let action = match &doc.id {
                Some(id) => json!({"index": {"_id": id}}),
                None => json!({"index": {}}),
            };
            body.push(action.into());
            body.push(doc.source.clone().into());
        }
        body
    }

    /// Fold a `_bulk` response body into a per-item summary.
    ///
    /// The response carries one entry per submitted document, in submission
    /// order, each keyed by its action kind. Items missing from a malformed
    /// response are counted as failed rather than silently accepted.
    fn summarize_response(body: &Value, documents: &[SinkDocument]) -> BulkSummary {
        let items = body["items"].as_array();
        let mut results = Vec::with_capacity(documents.len());
        let mut succeeded = 0;
        let mut failed = 0;

        for (position, doc) in documents.iter().enumerate() {
            let entry = items
                .and_then(|items| items.get(position))
                .and_then(|item| item.get("index"));

            match entry {
                Some(outcome) => {
                    let id = outcome["_id"].as_str().map(str::to_string).or_else(|| doc.id.clone());
                    let reason = outcome.get("error").map(|err| {
                        err["reason"]
                            .as_str()
                            .map(str::to_string)
                            .unwrap_or_else(|| err.to_string())
                    });
                    let status_ok = outcome["status"].as_u64().map(|s| s < 300).unwrap_or(false);

                    if reason.is_none() && status_ok {
                        succeeded += 1;
                        results.push(BulkItemResult {
                            id,
                            success: true,
                            error: None,
                        });
                    } else {
                        failed += 1;
                        results.push(BulkItemResult {
                            id,
                            success: false,
                            error: reason.or_else(|| Some("rejected with unknown status".to_string())),
                        });
                    }
                }
                None => {
                    failed += 1;
                    results.push(BulkItemResult {
                        id: doc.id.clone(),
                        success: false,
                        error: Some("missing from bulk response".to_string()),
                    });
                }
            }
        }

        BulkSummary {
            total: documents.len(),
            succeeded,
            failed,
            results,
        }
    }
}

#[async_trait]
impl BulkSinkProvider for OpenSearchSink {
    async fn check_ready(&self) -> Result<(), SinkError> {
        let response = self
            .client
            .ping()
            .send()
            .await
            .map_err(|e| SinkError::unreachable(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            return Err(SinkError::unreachable(format!(
                "Ping failed with status {}",
                status
            )));
        }
        Ok(())
    }

    async fn ensure_index_exists(&self) -> Result<(), SinkError> {
        let index = self.index_config.physical_name();

        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[index.as_str()]))
            .send()
            .await
            .map_err(|e| SinkError::unreachable(e.to_string()))?;

        if response.status_code().is_success() {
            debug!(index = %index, "Index already exists");
            return Ok(());
        }

        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(&index))
            .body(get_index_settings())
            .send()
            .await
            .map_err(|e| SinkError::unreachable(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(index = %index, status = %status, body = %error_body, "Index creation failed");
            return Err(SinkError::index_creation(format!(
                "Create index {} failed with status {}: {}",
                index, status, error_body
            )));
        }

        info!(index = %index, "Created index");
        Ok(())
    }

    async fn bulk_submit(&self, documents: &[SinkDocument]) -> Result<BulkSummary, SinkError> {
        if documents.is_empty() {
            return Ok(BulkSummary::all_succeeded(Vec::new()));
        }

        let index = self.index_config.physical_name();
        let body = Self::bulk_body(documents);

        let response = self
            .client
            .bulk(BulkParts::Index(&index))
            .body(body)
            .send()
            .await
            .map_err(|e| SinkError::unreachable(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(index = %index, status = %status, body = %error_body, "Bulk request failed");
            // 4xx means the request itself was malformed for this data;
            // anything else is the backend being unavailable.
            if status.is_client_error() {
                return Err(SinkError::rejected(format!(
                    "Bulk failed with status {}: {}",
                    status, error_body
                )));
            }
            return Err(SinkError::unreachable(format!(
                "Bulk failed with status {}: {}",
                status, error_body
            )));
        }

        let response_body: Value = response
            .json()
            .await
            .map_err(|e| SinkError::unreachable(e.to_string()))?;

        let summary = Self::summarize_response(&response_body, documents);
        debug!(
            index = %index,
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Bulk submission complete"
        );
        Ok(summary)
    }
}
