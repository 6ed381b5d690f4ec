use anyhow::{Context, Result};
use chrono_tz::Tz;
use std::time::Duration;

use crate::services::image::DEFAULT_MAX_IMAGE_BYTES;
use crate::services::openrouter::DEFAULT_BASE_URL;

pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub openrouter_api_key: String,
    pub openrouter_model: String,
    pub openrouter_base_url: String,
    pub inference_timeout: Duration,
    pub clock_refresh: Duration,
    pub clock_timezone: Option<Tz>,
    pub bind_addr: String,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    /// Read configuration from the process environment (call `dotenv` first).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let openrouter_api_key = get("OPENROUTER_API_KEY")
            .context("OPENROUTER_API_KEY must be set in .env file")?;

        let clock_refresh_secs: u64 = match get("CLOCK_REFRESH_SECS") {
            Some(v) => v
                .parse()
                .with_context(|| format!("CLOCK_REFRESH_SECS is not a number: {}", v))?,
            None => 10,
        };
        if clock_refresh_secs == 0 {
            anyhow::bail!("CLOCK_REFRESH_SECS must be greater than zero");
        }

        let inference_timeout_secs: u64 = match get("INFERENCE_TIMEOUT_SECS") {
            Some(v) => v
                .parse()
                .with_context(|| format!("INFERENCE_TIMEOUT_SECS is not a number: {}", v))?,
            None => 60,
        };
        if inference_timeout_secs == 0 {
            anyhow::bail!("INFERENCE_TIMEOUT_SECS must be greater than zero");
        }

        let clock_timezone = match get("CLOCK_TIMEZONE") {
            Some(name) => Some(
                name.parse::<Tz>()
                    .map_err(|e| anyhow::anyhow!("invalid CLOCK_TIMEZONE '{}': {}", name, e))?,
            ),
            None => None,
        };

        let max_upload_bytes = match get("MAX_UPLOAD_BYTES") {
            Some(v) => v
                .parse()
                .with_context(|| format!("MAX_UPLOAD_BYTES is not a number: {}", v))?,
            None => DEFAULT_MAX_IMAGE_BYTES,
        };

        Ok(Self {
            openrouter_api_key,
            openrouter_model: get("OPENROUTER_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            openrouter_base_url: get("OPENROUTER_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            inference_timeout: Duration::from_secs(inference_timeout_secs),
            clock_refresh: Duration::from_secs(clock_refresh_secs),
            clock_timezone,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            max_upload_bytes,
        })
    }
}
