use thiserror::Error;

/// Shown to the user whenever the inference call or its reply fails.
pub const ANALYSIS_FAILED_MESSAGE: &str = "Failed to analyze image. Please try again.";

/// Errors surfaced by acquisition, request building and inference.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// No image has been acquired yet.
    #[error("no image has been provided")]
    MissingImage,

    /// Input is not a recognized image type.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// Selected file could not be read.
    #[error("failed to read image file: {0}")]
    ImageRead(#[from] std::io::Error),

    /// Network or connectivity failure talking to the inference service.
    #[error("inference transport error: {0}")]
    Transport(String),

    /// The inference service answered with a failure.
    #[error("inference service error ({}): {}", .status.map_or_else(|| "no status".to_string(), |s| s.to_string()), .message)]
    Service { status: Option<u16>, message: String },

    /// Reply could not be interpreted as a structured object at all.
    #[error("malformed inference response: {0}")]
    MalformedResponse(String),
}

impl AnalysisError {
    /// True for failures of the inference call itself (as opposed to
    /// acquisition or precondition errors).
    pub fn is_inference_failure(&self) -> bool {
        matches!(
            self,
            AnalysisError::Transport(_)
                | AnalysisError::Service { .. }
                | AnalysisError::MalformedResponse(_)
        )
    }

    /// Text suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            AnalysisError::MissingImage => "Please take or upload a photo first.".to_string(),
            AnalysisError::UnsupportedFormat(_) => {
                "That file is not a supported image. Please use JPEG, PNG, GIF or WebP.".to_string()
            }
            AnalysisError::ImageRead(_) => "Could not read the selected file.".to_string(),
            AnalysisError::Transport(_)
            | AnalysisError::Service { .. }
            | AnalysisError::MalformedResponse(_) => ANALYSIS_FAILED_MESSAGE.to_string(),
        }
    }
}
