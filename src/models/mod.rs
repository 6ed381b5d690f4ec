use serde::{Deserialize, Serialize};

/// Contextual inputs the user supplies alongside the photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodMetadata {
    pub prep_time: String,  // free-form, "" means unknown (e.g. "2026-10-14T12:30")
    pub current_time: String,  // refreshed by the clock, never user-editable
    pub is_refrigerated: bool,
    pub refrigeration_duration: String,  // only meaningful while is_refrigerated
}

impl FoodMetadata {
    /// Default metadata stamped with the given clock reading.
    pub fn new(current_time: String) -> Self {
        Self {
            prep_time: String::new(),
            current_time,
            is_refrigerated: false,
            refrigeration_duration: String::new(),
        }
    }

    pub fn set_prep_time(&mut self, prep_time: impl Into<String>) {
        self.prep_time = prep_time.into();
    }

    /// Flips the refrigeration flag. Turning it off clears the duration so a
    /// stale value can never be submitted later.
    pub fn toggle_refrigerated(&mut self) {
        self.set_refrigerated(!self.is_refrigerated);
    }

    pub fn set_refrigerated(&mut self, refrigerated: bool) {
        self.is_refrigerated = refrigerated;
        if !refrigerated {
            self.refrigeration_duration.clear();
        }
    }

    pub fn set_refrigeration_duration(&mut self, duration: impl Into<String>) {
        self.refrigeration_duration = duration.into();
    }

    pub fn refresh_current_time(&mut self, now: String) {
        self.current_time = now;
    }

    /// Duration that may be sent to the inference service, if any.
    pub fn effective_refrigeration_duration(&self) -> Option<&str> {
        if self.is_refrigerated {
            Some(self.refrigeration_duration.as_str())
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FoodStatus {
    Fresh,
    Caution,
    Expired,
    Unknown,
}

impl std::fmt::Display for FoodStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FoodStatus::Fresh => "Fresh",
            FoodStatus::Caution => "Caution",
            FoodStatus::Expired => "Expired",
            FoodStatus::Unknown => "Unknown",
        };
        write!(f, "{}", s)
    }
}

impl FoodStatus {
    /// Anything outside the closed set maps to `Unknown`.
    pub fn from_string(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "fresh" => FoodStatus::Fresh,
            "caution" => FoodStatus::Caution,
            "expired" => FoodStatus::Expired,
            _ => FoodStatus::Unknown,
        }
    }
}

/// Validated freshness verdict. Scores are always within 0..=100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodAnalysisResult {
    pub status: FoodStatus,
    pub safety_score: f64,
    pub confidence: f64,
    pub observations: Vec<String>,
    pub recommendation: String,
    pub spoilage_signs: Vec<String>,
}

/// Payload sent to the inference service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub image: String,  // data URI
    pub prep_time: String,
    pub current_time: String,
    pub is_refrigerated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refrigeration_duration: Option<String>,
}
