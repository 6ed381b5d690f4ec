use crate::error::AnalysisError;
use crate::models::AnalysisRequest;

/// Unvalidated reply from the inference service.
pub type RawResponse = serde_json::Value;

/// Trait for vision inference backends (OpenRouter, fakes in tests, etc.)
///
/// A single call with no retries. Network failures come back as
/// `AnalysisError::Transport`, service-reported failures as
/// `AnalysisError::Service`.
#[async_trait::async_trait]
pub trait InferenceClient: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<RawResponse, AnalysisError>;
}
