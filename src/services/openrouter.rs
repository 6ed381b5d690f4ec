use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ai_service::{InferenceClient, RawResponse};
use crate::error::AnalysisError;
use crate::models::AnalysisRequest;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ContentPart {
    Text {
        #[serde(rename = "type")]
        content_type: String,
        text: String
    },
    ImageUrl {
        #[serde(rename = "type")]
        content_type: String,
        image_url: ImageData
    },
}

#[derive(Debug, Serialize)]
struct ImageData {
    url: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
    code: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    content: Option<String>,
}

pub struct OpenRouterService {
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenRouterService {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(60),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_prompt(request: &AnalysisRequest) -> String {
        let prep_time = if request.prep_time.trim().is_empty() {
            "unknown"
        } else {
            request.prep_time.as_str()
        };

        let storage = match (&request.refrigeration_duration, request.is_refrigerated) {
            (Some(duration), true) if !duration.trim().is_empty() => {
                format!("refrigerated for {}", duration.trim())
            }
            (_, true) => "refrigerated (duration unknown)".to_string(),
            _ => "kept at room temperature".to_string(),
        };

        format!(
            "You are a food safety inspector. Examine the food in this photo for signs of \
             spoilage such as mold, discoloration, sliminess, bloating or unusual texture.\n\
             \n\
             Context:\n\
             - Prepared at: {}\n\
             - Current time: {}\n\
             - Storage: {}\n\
             \n\
             Reply with a single JSON object and nothing else, using exactly these keys:\n\
             {{\n\
               \"status\": one of \"Fresh\", \"Caution\", \"Expired\", \"Unknown\",\n\
               \"safetyScore\": number from 0 to 100 (100 = completely safe),\n\
               \"confidence\": number from 0 to 100,\n\
               \"observations\": array of short findings,\n\
               \"recommendation\": one actionable sentence,\n\
               \"spoilageSigns\": array of detected defects (empty if none)\n\
             }}",
            prep_time, request.current_time, storage
        )
    }

    /// Pull the JSON object out of the model's reply, tolerating markdown
    /// code fences and surrounding prose.
    fn extract_json(content: &str) -> Result<RawResponse, AnalysisError> {
        let trimmed = content.trim();
        if let Ok(value) = serde_json::from_str::<RawResponse>(trimmed) {
            return Ok(value);
        }

        let start = trimmed.find('{');
        let end = trimmed.rfind('}');
        match (start, end) {
            (Some(start), Some(end)) if start < end => {
                serde_json::from_str::<RawResponse>(&trimmed[start..=end]).map_err(|e| {
                    AnalysisError::MalformedResponse(format!("reply is not valid JSON: {}", e))
                })
            }
            _ => Err(AnalysisError::MalformedResponse(format!(
                "reply contains no JSON object: {}",
                trimmed.chars().take(200).collect::<String>()
            ))),
        }
    }

    fn parse_envelope(body: &str) -> Result<RawResponse, AnalysisError> {
        let chat_response: ChatResponse = serde_json::from_str(body)
            .map_err(|e| AnalysisError::MalformedResponse(format!("unexpected envelope: {}", e)))?;

        if let Some(error) = chat_response.error {
            let status = error
                .code
                .as_ref()
                .and_then(|c| c.as_u64())
                .and_then(|c| u16::try_from(c).ok());
            return Err(AnalysisError::Service { status, message: error.message });
        }

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AnalysisError::MalformedResponse("reply has no message content".to_string()))?;

        log::debug!("💬 OpenRouter response content: {}", content);
        Self::extract_json(&content)
    }
}

#[async_trait::async_trait]
impl InferenceClient for OpenRouterService {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<RawResponse, AnalysisError> {
        log::debug!("📸 Starting freshness analysis ({} byte data URI)", request.image.len());

        let messages = vec![ChatMessage {
            role: "user".to_string(),
            content: vec![
                ContentPart::Text {
                    content_type: "text".to_string(),
                    text: Self::build_prompt(request),
                },
                ContentPart::ImageUrl {
                    content_type: "image_url".to_string(),
                    image_url: ImageData {
                        url: request.image.clone(),
                    },
                },
            ],
        }];

        let chat_request = ChatRequest {
            model: self.model.clone(),
            messages,
            max_tokens: 800,
            response_format: ResponseFormat {
                format_type: "json_object".to_string(),
            },
        };

        log::info!("🤖 Sending request to OpenRouter with model: {}", self.model);

        let response = self
            .client
            .post(self.completions_url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("X-Title", "FoodFresh")
            .timeout(self.timeout)
            .json(&chat_request)
            .send()
            .await
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;

        let status = response.status();
        log::debug!("📥 OpenRouter response status: {}", status);

        let body = response
            .text()
            .await
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;

        if !status.is_success() {
            log::error!("❌ OpenRouter API error response: {}", body);
            return Err(AnalysisError::Service {
                status: Some(status.as_u16()),
                message: body,
            });
        }

        log::debug!("📄 Raw OpenRouter response size: {} bytes", body.len());
        Self::parse_envelope(&body)
    }
}
