use serde::Serialize;

use crate::models::{AnalysisRequest, FoodAnalysisResult, FoodMetadata};
use crate::services::{build_request, CanonicalImage, Clock};

/// Where the session currently is. Each variant carries exactly the data
/// that is valid in it, so e.g. a result can never coexist with a pending
/// analysis.
#[derive(Debug, Clone)]
pub enum SessionState {
    Idle,
    ImageReady { image: CanonicalImage },
    Analyzing { image: CanonicalImage },
    Result { image: CanonicalImage, result: FoodAnalysisResult },
    Failed { image: CanonicalImage, error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Idle,
    ImageReady,
    Analyzing,
    Result,
    Failed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::ImageReady => "image-ready",
            Phase::Analyzing => "analyzing",
            Phase::Result => "result",
            Phase::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

impl SessionState {
    pub fn phase(&self) -> Phase {
        match self {
            SessionState::Idle => Phase::Idle,
            SessionState::ImageReady { .. } => Phase::ImageReady,
            SessionState::Analyzing { .. } => Phase::Analyzing,
            SessionState::Result { .. } => Phase::Result,
            SessionState::Failed { .. } => Phase::Failed,
        }
    }

    pub fn image(&self) -> Option<&CanonicalImage> {
        match self {
            SessionState::Idle => None,
            SessionState::ImageReady { image }
            | SessionState::Analyzing { image }
            | SessionState::Result { image, .. }
            | SessionState::Failed { image, .. } => Some(image),
        }
    }
}

/// Identifies the session state an asynchronous operation started from.
/// Completions carrying an outdated epoch are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Epoch(u64);

/// An analysis that has been started and awaits its inference reply.
#[derive(Debug, Clone)]
pub struct PendingAnalysis {
    pub epoch: Epoch,
    pub request: AnalysisRequest,
}

/// One user-facing analysis session: image, metadata, result and error,
/// mutated only through the transitions below.
#[derive(Debug, Clone)]
pub struct Session {
    state: SessionState,
    metadata: FoodMetadata,
    epoch: u64,
}

impl Session {
    pub fn new(clock: &Clock) -> Self {
        Self {
            state: SessionState::Idle,
            metadata: FoodMetadata::new(clock.now_string()),
            epoch: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn metadata(&self) -> &FoodMetadata {
        &self.metadata
    }

    pub fn image(&self) -> Option<&CanonicalImage> {
        self.state.image()
    }

    pub fn result(&self) -> Option<&FoodAnalysisResult> {
        match &self.state {
            SessionState::Result { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            SessionState::Failed { error, .. } => Some(error.as_str()),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, SessionState::Analyzing { .. })
    }

    pub fn epoch(&self) -> Epoch {
        Epoch(self.epoch)
    }

    fn advance_epoch(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
    }

    /// Replace whatever the session holds with a new image. Also supersedes
    /// an in-flight analysis.
    pub fn acquire_image(&mut self, image: CanonicalImage) {
        let previous = self.phase();
        log::info!(
            "📸 Image acquired ({}, {} bytes, {}) in state {}",
            image.mime_type(),
            image.byte_len(),
            &image.fingerprint()[..12],
            previous
        );
        self.advance_epoch();
        self.state = SessionState::ImageReady { image };
    }

    /// Apply an image whose acquisition began at `epoch`, unless the session
    /// moved on while it was being read.
    pub fn complete_acquisition(&mut self, epoch: Epoch, image: CanonicalImage) -> bool {
        if epoch != self.epoch() {
            log::warn!("⏭️ Discarding stale image acquisition");
            return false;
        }
        self.acquire_image(image);
        true
    }

    /// Drop the image before analysis. Allowed from `ImageReady` and `Failed`.
    pub fn clear_image(&mut self) -> bool {
        match self.state {
            SessionState::ImageReady { .. } | SessionState::Failed { .. } => {
                log::info!("🗑️ Image cleared");
                self.advance_epoch();
                self.state = SessionState::Idle;
                true
            }
            _ => {
                log::debug!("clear_image ignored in state {}", self.phase());
                false
            }
        }
    }

    pub fn set_prep_time(&mut self, prep_time: impl Into<String>) {
        self.metadata.set_prep_time(prep_time);
    }

    pub fn toggle_refrigerated(&mut self) {
        self.metadata.toggle_refrigerated();
    }

    pub fn set_refrigerated(&mut self, refrigerated: bool) {
        self.metadata.set_refrigerated(refrigerated);
    }

    pub fn set_refrigeration_duration(&mut self, duration: impl Into<String>) {
        self.metadata.set_refrigeration_duration(duration);
    }

    pub fn refresh_current_time(&mut self, clock: &Clock) {
        self.metadata.refresh_current_time(clock.now_string());
    }

    /// Move to `Analyzing` and hand back the request to send. Returns `None`
    /// (and changes nothing) when there is no image or an analysis is already
    /// running. A `Failed` session may be retried.
    pub fn start_analysis(&mut self, clock: &Clock) -> Option<PendingAnalysis> {
        let image = match &self.state {
            SessionState::ImageReady { image } | SessionState::Failed { image, .. } => image,
            other => {
                log::warn!("⚠️ start_analysis ignored in state {}", other.phase());
                return None;
            }
        };

        let request = match build_request(Some(image), &self.metadata, clock) {
            Ok(request) => request,
            Err(e) => {
                log::warn!("⚠️ Could not build analysis request: {}", e);
                return None;
            }
        };

        let image = match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::ImageReady { image } | SessionState::Failed { image, .. } => image,
            other => {
                self.state = other;
                return None;
            }
        };

        self.advance_epoch();
        self.metadata.refresh_current_time(request.current_time.clone());
        self.state = SessionState::Analyzing { image };
        log::info!("🔬 Analysis started (refrigerated: {})", request.is_refrigerated);

        Some(PendingAnalysis {
            epoch: self.epoch(),
            request,
        })
    }

    fn take_analyzing_image(&mut self, epoch: Epoch) -> Option<CanonicalImage> {
        if epoch != self.epoch() {
            return None;
        }
        match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Analyzing { image } => Some(image),
            other => {
                self.state = other;
                None
            }
        }
    }

    pub fn analysis_succeeded(&mut self, epoch: Epoch, result: FoodAnalysisResult) -> bool {
        match self.take_analyzing_image(epoch) {
            Some(image) => {
                log::info!(
                    "✅ Analysis complete: {} (safety {:.0}, confidence {:.0})",
                    result.status,
                    result.safety_score,
                    result.confidence
                );
                self.state = SessionState::Result { image, result };
                true
            }
            None => {
                log::warn!("⏭️ Discarding stale analysis result");
                false
            }
        }
    }

    pub fn analysis_failed(&mut self, epoch: Epoch, error: impl Into<String>) -> bool {
        match self.take_analyzing_image(epoch) {
            Some(image) => {
                let error = error.into();
                log::info!("❌ Analysis failed: {}", error);
                self.state = SessionState::Failed { image, error };
                true
            }
            None => {
                log::warn!("⏭️ Discarding stale analysis failure");
                false
            }
        }
    }

    /// Back to `Idle` with default metadata, from any state.
    pub fn reset(&mut self, clock: &Clock) {
        log::info!("🔄 Session reset from state {}", self.phase());
        self.advance_epoch();
        self.state = SessionState::Idle;
        self.metadata = FoodMetadata::new(clock.now_string());
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.phase(),
            loading: self.is_loading(),
            image: self.image().map(|image| ImageSummary {
                mime_type: image.mime_type().to_string(),
                bytes: image.byte_len(),
                fingerprint: image.fingerprint(),
                data_uri: image.to_data_uri(),
            }),
            metadata: self.metadata.clone(),
            result: self.result().cloned(),
            error: self.error().map(|e| e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSummary {
    pub mime_type: String,
    pub bytes: usize,
    pub fingerprint: String,
    pub data_uri: String,
}

/// Render-ready view of the session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: Phase,
    pub loading: bool,
    pub image: Option<ImageSummary>,
    pub metadata: FoodMetadata,
    pub result: Option<FoodAnalysisResult>,
    pub error: Option<String>,
}
