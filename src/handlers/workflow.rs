use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::session::{Session, SessionSnapshot};
use crate::error::{AnalysisError, ANALYSIS_FAILED_MESSAGE};
use crate::services::{interpreter, Clock, ImageSource, InferenceClient};

/// What happened to a `run_analysis` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AnalysisOutcome {
    /// Guard rejected the start (no image, or one already in flight).
    Skipped,
    Completed,
    Failed,
    /// The session was reset or got a new image while the call was pending.
    Superseded,
}

/// Partial metadata edit, as sent by the UI.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataUpdate {
    pub prep_time: Option<String>,
    pub is_refrigerated: Option<bool>,
    pub refrigeration_duration: Option<String>,
}

/// Drives a `Session` against real collaborators. The session lock is never
/// held across an await on a file read or an inference call.
#[derive(Clone)]
pub struct AnalysisWorkflow {
    session: Arc<Mutex<Session>>,
    client: Arc<dyn InferenceClient>,
    clock: Clock,
    max_image_bytes: usize,
}

impl AnalysisWorkflow {
    pub fn new(client: Arc<dyn InferenceClient>, clock: Clock, max_image_bytes: usize) -> Self {
        Self {
            session: Arc::new(Mutex::new(Session::new(&clock))),
            client,
            clock,
            max_image_bytes,
        }
    }

    pub(crate) fn session(&self) -> &Arc<Mutex<Session>> {
        &self.session
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.session.lock().await.snapshot()
    }

    /// Read one image from `source` and make it the session's image.
    /// Rejected input leaves the session untouched.
    pub async fn acquire(&self, source: &dyn ImageSource) -> Result<SessionSnapshot, AnalysisError> {
        let epoch = self.session.lock().await.epoch();
        log::debug!("📥 Acquiring image from {}", source.describe());

        let image = match source.acquire(self.max_image_bytes).await {
            Ok(image) => image,
            Err(e) => {
                log::warn!("⚠️ Image from {} rejected: {}", source.describe(), e);
                return Err(e);
            }
        };

        let mut session = self.session.lock().await;
        session.complete_acquisition(epoch, image);
        Ok(session.snapshot())
    }

    pub async fn clear_image(&self) -> SessionSnapshot {
        let mut session = self.session.lock().await;
        session.clear_image();
        session.snapshot()
    }

    pub async fn update_metadata(&self, update: MetadataUpdate) -> SessionSnapshot {
        let mut session = self.session.lock().await;
        if let Some(prep_time) = update.prep_time {
            session.set_prep_time(prep_time);
        }
        if let Some(refrigerated) = update.is_refrigerated {
            session.set_refrigerated(refrigerated);
        }
        if let Some(duration) = update.refrigeration_duration {
            session.set_refrigeration_duration(duration);
        }
        session.snapshot()
    }

    pub async fn toggle_refrigerated(&self) -> SessionSnapshot {
        let mut session = self.session.lock().await;
        session.toggle_refrigerated();
        session.snapshot()
    }

    pub async fn refresh_current_time(&self) {
        self.session.lock().await.refresh_current_time(&self.clock);
    }

    /// Start an analysis, wait for the inference reply and record the
    /// outcome. Inference errors end up in the `Failed` state, never as an
    /// `Err`.
    ///
    /// The call and the state update run in their own task, so the session
    /// leaves `Analyzing` even if the caller's future is dropped mid-call.
    pub async fn run_analysis(&self) -> AnalysisOutcome {
        let pending = self.session.lock().await.start_analysis(&self.clock);
        let Some(pending) = pending else {
            return AnalysisOutcome::Skipped;
        };
        let epoch = pending.epoch;

        let session = self.session.clone();
        let client = self.client.clone();
        let task = tokio::spawn(async move {
            let reply = client
                .analyze(&pending.request)
                .await
                .and_then(|raw| interpreter::parse(&raw));

            let mut session = session.lock().await;
            match reply {
                Ok(result) => {
                    if session.analysis_succeeded(pending.epoch, result) {
                        AnalysisOutcome::Completed
                    } else {
                        AnalysisOutcome::Superseded
                    }
                }
                Err(e) => {
                    log::error!("❌ Inference failed: {}", e);
                    if session.analysis_failed(pending.epoch, e.user_message()) {
                        AnalysisOutcome::Failed
                    } else {
                        AnalysisOutcome::Superseded
                    }
                }
            }
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("❌ Analysis task aborted: {}", e);
                if self.session.lock().await.analysis_failed(epoch, ANALYSIS_FAILED_MESSAGE) {
                    AnalysisOutcome::Failed
                } else {
                    AnalysisOutcome::Superseded
                }
            }
        }
    }

    pub async fn reset(&self) -> SessionSnapshot {
        let mut session = self.session.lock().await;
        session.reset(&self.clock);
        session.snapshot()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::handlers::session::Phase;
    use crate::models::{AnalysisRequest, FoodStatus};
    use crate::services::image::tests::{jpeg_bytes, png_bytes};
    use crate::services::image::DEFAULT_MAX_IMAGE_BYTES;
    use crate::services::{CameraFrame, CanonicalImage, RawResponse, UploadedBytes};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Scripted inference service. Optionally waits on `gate` before replying.
    pub(crate) struct FakeInference {
        replies: std::sync::Mutex<VecDeque<Result<RawResponse, AnalysisError>>>,
        pub(crate) requests: std::sync::Mutex<Vec<AnalysisRequest>>,
        pub(crate) calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
    }

    impl FakeInference {
        pub(crate) fn new(replies: Vec<Result<RawResponse, AnalysisError>>) -> Self {
            Self {
                replies: std::sync::Mutex::new(replies.into()),
                requests: std::sync::Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
                gate: None,
            }
        }

        fn gated(replies: Vec<Result<RawResponse, AnalysisError>>, gate: Arc<Notify>) -> Self {
            Self { gate: Some(gate), ..Self::new(replies) }
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl InferenceClient for FakeInference {
        async fn analyze(&self, request: &AnalysisRequest) -> Result<RawResponse, AnalysisError> {
            self.requests.lock().unwrap().push(request.clone());
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AnalysisError::Transport("no scripted reply".to_string())))
        }
    }

    struct PanickingInference;

    #[async_trait::async_trait]
    impl InferenceClient for PanickingInference {
        async fn analyze(&self, _request: &AnalysisRequest) -> Result<RawResponse, AnalysisError> {
            panic!("inference backend crashed");
        }
    }

    pub(crate) fn fresh_reply() -> RawResponse {
        json!({
            "status": "Fresh",
            "safetyScore": 92,
            "confidence": 88,
            "observations": ["no discoloration"],
            "recommendation": "Safe to eat",
            "spoilageSigns": []
        })
    }

    fn workflow(fake: Arc<FakeInference>) -> AnalysisWorkflow {
        AnalysisWorkflow::new(fake, Clock::default(), DEFAULT_MAX_IMAGE_BYTES)
    }

    async fn wait_for_calls(fake: &FakeInference, n: usize) {
        while fake.call_count() < n {
            tokio::task::yield_now().await;
        }
    }

    fn png_frame() -> CameraFrame {
        let image = CanonicalImage::from_bytes(png_bytes(), None, DEFAULT_MAX_IMAGE_BYTES).unwrap();
        CameraFrame::new(image.to_data_uri())
    }

    #[tokio::test]
    async fn test_scenario_fresh_result() {
        let fake = Arc::new(FakeInference::new(vec![Ok(fresh_reply())]));
        let workflow = workflow(fake.clone());

        workflow.acquire(&png_frame()).await.unwrap();
        workflow
            .update_metadata(MetadataUpdate {
                prep_time: Some(String::new()),
                is_refrigerated: Some(false),
                refrigeration_duration: None,
            })
            .await;

        assert_eq!(workflow.run_analysis().await, AnalysisOutcome::Completed);

        let snapshot = workflow.snapshot().await;
        assert_eq!(snapshot.state, Phase::Result);
        let result = snapshot.result.unwrap();
        assert_eq!(result.status, FoodStatus::Fresh);
        assert_eq!(result.safety_score, 92.0);
        assert_eq!(result.confidence, 88.0);
        assert_eq!(result.observations, vec!["no discoloration".to_string()]);
        assert_eq!(result.recommendation, "Safe to eat");
        assert!(result.spoilage_signs.is_empty());
    }

    #[tokio::test]
    async fn test_scenario_transport_failure() {
        let fake = Arc::new(FakeInference::new(vec![Err(AnalysisError::Transport(
            "connection reset".to_string(),
        ))]));
        let workflow = workflow(fake.clone());

        workflow.acquire(&png_frame()).await.unwrap();
        workflow
            .update_metadata(MetadataUpdate {
                prep_time: None,
                is_refrigerated: Some(true),
                refrigeration_duration: Some("2 days".to_string()),
            })
            .await;

        assert_eq!(workflow.run_analysis().await, AnalysisOutcome::Failed);

        let snapshot = workflow.snapshot().await;
        assert_eq!(snapshot.state, Phase::Failed);
        assert!(snapshot.image.is_some());
        assert!(!snapshot.error.unwrap().is_empty());

        let sent = fake.requests.lock().unwrap();
        assert_eq!(sent[0].refrigeration_duration.as_deref(), Some("2 days"));
    }

    #[tokio::test]
    async fn test_scenario_no_image_no_call() {
        let fake = Arc::new(FakeInference::new(vec![Ok(fresh_reply())]));
        let workflow = workflow(fake.clone());

        assert_eq!(workflow.run_analysis().await, AnalysisOutcome::Skipped);
        assert_eq!(fake.call_count(), 0);
        assert_eq!(workflow.snapshot().await.state, Phase::Idle);
    }

    #[tokio::test]
    async fn test_malformed_reply_becomes_failed() {
        let fake = Arc::new(FakeInference::new(vec![Ok(json!("just text"))]));
        let workflow = workflow(fake);

        workflow.acquire(&png_frame()).await.unwrap();
        assert_eq!(workflow.run_analysis().await, AnalysisOutcome::Failed);
        assert_eq!(workflow.snapshot().await.state, Phase::Failed);
    }

    #[tokio::test]
    async fn test_retry_after_failure() {
        let fake = Arc::new(FakeInference::new(vec![
            Err(AnalysisError::Service { status: Some(503), message: "busy".to_string() }),
            Ok(fresh_reply()),
        ]));
        let workflow = workflow(fake.clone());

        workflow.acquire(&png_frame()).await.unwrap();
        assert_eq!(workflow.run_analysis().await, AnalysisOutcome::Failed);
        assert_eq!(workflow.run_analysis().await, AnalysisOutcome::Completed);
        assert_eq!(fake.call_count(), 2);
    }

    #[tokio::test]
    async fn test_toggle_off_drops_duration_from_request() {
        let fake = Arc::new(FakeInference::new(vec![Ok(fresh_reply())]));
        let workflow = workflow(fake.clone());

        workflow.acquire(&png_frame()).await.unwrap();
        workflow.toggle_refrigerated().await;
        workflow
            .update_metadata(MetadataUpdate {
                refrigeration_duration: Some("5 days".to_string()),
                ..Default::default()
            })
            .await;
        workflow.toggle_refrigerated().await;
        workflow.run_analysis().await;

        let sent = fake.requests.lock().unwrap();
        assert!(!sent[0].is_refrigerated);
        assert_eq!(sent[0].refrigeration_duration, None);
    }

    #[tokio::test]
    async fn test_rejected_upload_keeps_previous_image() {
        let fake = Arc::new(FakeInference::new(Vec::new()));
        let workflow = workflow(fake);

        workflow.acquire(&png_frame()).await.unwrap();
        let before = workflow.snapshot().await.image.unwrap().fingerprint;

        let err = workflow
            .acquire(&UploadedBytes::new(b"not an image".to_vec(), Some("text/plain".to_string())))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::UnsupportedFormat(_)));

        let snapshot = workflow.snapshot().await;
        assert_eq!(snapshot.state, Phase::ImageReady);
        assert_eq!(snapshot.image.unwrap().fingerprint, before);
    }

    #[tokio::test]
    async fn test_second_start_while_in_flight_is_skipped() {
        let gate = Arc::new(Notify::new());
        let fake = Arc::new(FakeInference::gated(vec![Ok(fresh_reply())], gate.clone()));
        let workflow = workflow(fake.clone());
        workflow.acquire(&png_frame()).await.unwrap();

        let running = tokio::spawn({
            let workflow = workflow.clone();
            async move { workflow.run_analysis().await }
        });
        wait_for_calls(&fake, 1).await;

        assert!(workflow.snapshot().await.loading);
        assert_eq!(workflow.run_analysis().await, AnalysisOutcome::Skipped);
        assert_eq!(fake.call_count(), 1);

        gate.notify_one();
        assert_eq!(running.await.unwrap(), AnalysisOutcome::Completed);
    }

    #[tokio::test]
    async fn test_reset_during_analysis_discards_result() {
        let gate = Arc::new(Notify::new());
        let fake = Arc::new(FakeInference::gated(vec![Ok(fresh_reply())], gate.clone()));
        let workflow = workflow(fake.clone());
        workflow.acquire(&png_frame()).await.unwrap();

        let running = tokio::spawn({
            let workflow = workflow.clone();
            async move { workflow.run_analysis().await }
        });
        wait_for_calls(&fake, 1).await;

        workflow.reset().await;
        gate.notify_one();

        assert_eq!(running.await.unwrap(), AnalysisOutcome::Superseded);
        let snapshot = workflow.snapshot().await;
        assert_eq!(snapshot.state, Phase::Idle);
        assert!(snapshot.result.is_none());
    }

    #[tokio::test]
    async fn test_reacquire_during_analysis_discards_failure() {
        let gate = Arc::new(Notify::new());
        let fake = Arc::new(FakeInference::gated(
            vec![Err(AnalysisError::Transport("timeout".to_string()))],
            gate.clone(),
        ));
        let workflow = workflow(fake.clone());
        workflow.acquire(&png_frame()).await.unwrap();

        let running = tokio::spawn({
            let workflow = workflow.clone();
            async move { workflow.run_analysis().await }
        });
        wait_for_calls(&fake, 1).await;

        workflow
            .acquire(&UploadedBytes::new(jpeg_bytes(), Some("image/jpeg".to_string())))
            .await
            .unwrap();
        gate.notify_one();

        assert_eq!(running.await.unwrap(), AnalysisOutcome::Superseded);
        let snapshot = workflow.snapshot().await;
        assert_eq!(snapshot.state, Phase::ImageReady);
        assert_eq!(snapshot.image.unwrap().mime_type, "image/jpeg");
        assert!(snapshot.error.is_none());
    }

    async fn wait_until_settled(workflow: &AnalysisWorkflow) -> SessionSnapshot {
        for _ in 0..10_000 {
            let snapshot = workflow.snapshot().await;
            if !snapshot.loading {
                return snapshot;
            }
            tokio::task::yield_now().await;
        }
        panic!("session never left Analyzing");
    }

    #[tokio::test]
    async fn test_dropped_caller_still_applies_result() {
        let gate = Arc::new(Notify::new());
        let fake = Arc::new(FakeInference::gated(vec![Ok(fresh_reply())], gate.clone()));
        let workflow = workflow(fake.clone());
        workflow.acquire(&png_frame()).await.unwrap();

        let timed_out =
            tokio::time::timeout(std::time::Duration::from_millis(50), workflow.run_analysis()).await;
        assert!(timed_out.is_err());

        // the call is still in flight, so the session is still loading
        assert_eq!(fake.call_count(), 1);
        assert!(workflow.snapshot().await.loading);

        gate.notify_one();
        let snapshot = wait_until_settled(&workflow).await;
        assert_eq!(snapshot.state, Phase::Result);
        assert_eq!(snapshot.result.unwrap().status, FoodStatus::Fresh);
    }

    #[tokio::test]
    async fn test_dropped_caller_failure_allows_retry() {
        let gate = Arc::new(Notify::new());
        let fake = Arc::new(FakeInference::gated(
            vec![Err(AnalysisError::Transport("timeout".to_string())), Ok(fresh_reply())],
            gate.clone(),
        ));
        let workflow = workflow(fake.clone());
        workflow.acquire(&png_frame()).await.unwrap();

        let timed_out =
            tokio::time::timeout(std::time::Duration::from_millis(50), workflow.run_analysis()).await;
        assert!(timed_out.is_err());

        gate.notify_one();
        let snapshot = wait_until_settled(&workflow).await;
        assert_eq!(snapshot.state, Phase::Failed);

        gate.notify_one();
        assert_eq!(workflow.run_analysis().await, AnalysisOutcome::Completed);
        assert_eq!(fake.call_count(), 2);
    }

    #[tokio::test]
    async fn test_crashed_backend_becomes_failed() {
        let workflow =
            AnalysisWorkflow::new(Arc::new(PanickingInference), Clock::default(), DEFAULT_MAX_IMAGE_BYTES);
        workflow.acquire(&png_frame()).await.unwrap();

        assert_eq!(workflow.run_analysis().await, AnalysisOutcome::Failed);

        let snapshot = workflow.snapshot().await;
        assert_eq!(snapshot.state, Phase::Failed);
        assert_eq!(snapshot.error.as_deref(), Some(ANALYSIS_FAILED_MESSAGE));
        assert!(snapshot.image.is_some());
    }
}
