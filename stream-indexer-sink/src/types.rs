//! Request and response types for bulk sink operations.

/// A single document staged for bulk submission.
///
/// Documents are backend-agnostic: an optional explicit id plus an arbitrary
/// JSON body. When `id` is `None` the backend assigns one.
#[derive(Debug, Clone)]
pub struct SinkDocument {
    /// Explicit document id, when the producer has a natural key.
    pub id: Option<String>,
    /// The document body.
    pub source: serde_json::Value,
}

impl SinkDocument {
    /// Create a document with a backend-assigned id.
    pub fn new(source: serde_json::Value) -> Self {
        Self { id: None, source }
    }

    /// Create a document with an explicit id.
    pub fn with_id(id: impl Into<String>, source: serde_json::Value) -> Self {
        Self {
            id: Some(id.into()),
            source,
        }
    }
}

/// Result of a bulk submission for a single document.
#[derive(Debug, Clone)]
pub struct BulkItemResult {
    /// The document id the backend reported (or the one submitted).
    pub id: Option<String>,
    /// Whether this item was accepted.
    pub success: bool,
    /// Backend error reason if the item was rejected.
    pub error: Option<String>,
}

/// Summary of a bulk submission containing aggregate statistics and
/// individual results.
///
/// A submission can partially fail: the request succeeds at the transport
/// level but individual items are rejected. Callers inspect `failed` and
/// `results` to decide what to do with the rejected items.
#[derive(Debug, Clone)]
pub struct BulkSummary {
    /// Total number of documents in the submission.
    pub total: usize,
    /// Number of accepted documents.
    pub succeeded: usize,
    /// Number of rejected documents.
    pub failed: usize,
    /// Individual results, in submission order.
    pub results: Vec<BulkItemResult>,
}

impl BulkSummary {
    /// A summary where every item succeeded.
    pub fn all_succeeded(ids: Vec<Option<String>>) -> Self {
        let total = ids.len();
        Self {
            total,
            succeeded: total,
            failed: 0,
            results: ids
                .into_iter()
                .map(|id| BulkItemResult {
                    id,
                    success: true,
                    error: None,
                })
                .collect(),
        }
    }

    /// Join the reasons of all rejected items into one detailed message.
    ///
    /// Returns `None` when nothing failed.
    pub fn detailed_error(&self) -> Option<String> {
        if self.failed == 0 {
            return None;
        }
        let reasons: Vec<String> = self
            .results
            .iter()
            .filter(|r| !r.success)
            .map(|r| {
                format!(
                    "{}: {}",
                    r.id.as_deref().unwrap_or("<unassigned>"),
                    r.error.as_deref().unwrap_or("unknown reason")
                )
            })
            .collect();
        Some(format!(
            "{} of {} items rejected: {}",
            self.failed,
            self.total,
            reasons.join("; ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_all_succeeded_summary() {
        let summary = BulkSummary::all_succeeded(vec![Some("a".to_string()), None]);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 0);
        assert!(summary.detailed_error().is_none());
    }

    #[test]
    fn test_detailed_error_joins_reasons() {
        let summary = BulkSummary {
            total: 3,
            succeeded: 1,
            failed: 2,
            results: vec![
                BulkItemResult {
                    id: Some("ok".to_string()),
                    success: true,
                    error: None,
                },
                BulkItemResult {
                    id: Some("bad-1".to_string()),
                    success: false,
                    error: Some("mapper_parsing_exception".to_string()),
                },
                BulkItemResult {
                    id: None,
                    success: false,
                    error: Some("illegal_argument_exception".to_string()),
                },
            ],
        };

        let msg = summary.detailed_error().unwrap();
        assert!(msg.starts_with("2 of 3 items rejected"));
        assert!(msg.contains("bad-1: mapper_parsing_exception"));
        assert!(msg.contains("<unassigned>: illegal_argument_exception"));
    }

    #[test]
    fn test_document_constructors() {
        let doc = SinkDocument::new(json!({"message": "hello"}));
        assert!(doc.id.is_none());

        let doc = SinkDocument::with_id("k1", json!({"message": "hello"}));
        assert_eq!(doc.id.as_deref(), Some("k1"));
    }
}
