use base64::{engine::general_purpose, Engine};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

use crate::error::AnalysisError;

pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// The one in-memory image representation the workflow works with.
#[derive(Clone, PartialEq, Eq)]
pub struct CanonicalImage {
    mime_type: &'static str,
    bytes: Vec<u8>,
}

impl std::fmt::Debug for CanonicalImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanonicalImage")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Sniff the image type from magic bytes.
pub fn detect_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("image/png")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

impl CanonicalImage {
    /// Validate raw bytes. `declared` is the content type reported by the
    /// uploader; it is only a hint, but a non-image type is rejected outright.
    pub fn from_bytes(
        bytes: Vec<u8>,
        declared: Option<&str>,
        max_bytes: usize,
    ) -> Result<Self, AnalysisError> {
        if let Some(declared) = declared {
            let essence = declared.split(';').next().unwrap_or("").trim().to_lowercase();
            let is_hint_only = essence.is_empty() || essence == "application/octet-stream";
            if !is_hint_only && !essence.starts_with("image/") {
                return Err(AnalysisError::UnsupportedFormat(essence));
            }
        }

        if bytes.is_empty() {
            return Err(AnalysisError::UnsupportedFormat("empty payload".to_string()));
        }

        if bytes.len() > max_bytes {
            return Err(AnalysisError::UnsupportedFormat(format!(
                "image is {} bytes, limit is {} bytes",
                bytes.len(),
                max_bytes
            )));
        }

        let mime_type = detect_mime(&bytes).ok_or_else(|| {
            AnalysisError::UnsupportedFormat(
                declared.unwrap_or("unrecognized binary data").to_string(),
            )
        })?;

        if let Some(declared) = declared {
            if !declared.to_lowercase().starts_with(mime_type) {
                log::debug!("🔍 Declared type {} differs from detected {}, using detected", declared, mime_type);
            }
        }

        Ok(Self { mime_type, bytes })
    }

    /// Parse a `data:<mime>;base64,<payload>` URI, as produced by a camera
    /// snapshot or a browser file reader.
    pub fn from_data_uri(uri: &str, max_bytes: usize) -> Result<Self, AnalysisError> {
        let rest = uri
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| AnalysisError::UnsupportedFormat("not a data URI".to_string()))?;

        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| AnalysisError::UnsupportedFormat("data URI has no payload".to_string()))?;

        let mut params = header.split(';');
        let declared = params.next().unwrap_or("").trim().to_string();
        if !params.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
            return Err(AnalysisError::UnsupportedFormat(
                "data URI is not base64 encoded".to_string(),
            ));
        }

        let cleaned: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let bytes = general_purpose::STANDARD
            .decode(cleaned.as_bytes())
            .map_err(|e| AnalysisError::UnsupportedFormat(format!("invalid base64 payload: {}", e)))?;

        let declared = if declared.is_empty() { None } else { Some(declared.as_str()) };
        Self::from_bytes(bytes, declared, max_bytes)
    }

    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, general_purpose::STANDARD.encode(&self.bytes))
    }

    /// Hex SHA-256 of the image bytes, used to identify images in logs.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }
}

/// Something that can hand the workflow one image: a camera widget, a file
/// picker, an HTTP upload.
#[async_trait::async_trait]
pub trait ImageSource: Send + Sync {
    async fn acquire(&self, max_bytes: usize) -> Result<CanonicalImage, AnalysisError>;

    /// Short label for logs.
    fn describe(&self) -> String;
}

/// A file selected by the user, read fully into memory.
pub struct FileUpload {
    pub path: PathBuf,
}

impl FileUpload {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl ImageSource for FileUpload {
    async fn acquire(&self, max_bytes: usize) -> Result<CanonicalImage, AnalysisError> {
        log::debug!("📁 Reading image file: {}", self.path.display());
        let bytes = tokio::fs::read(&self.path).await?;

        let declared = match self.path.extension().and_then(|e| e.to_str()) {
            Some(ext) => match ext.to_lowercase().as_str() {
                "png" => Some("image/png"),
                "jpg" | "jpeg" => Some("image/jpeg"),
                "gif" => Some("image/gif"),
                "webp" => Some("image/webp"),
                _ => None,
            },
            None => None,
        };

        CanonicalImage::from_bytes(bytes, declared, max_bytes)
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

/// A frame snapshot handed over by the camera widget as a data URI.
pub struct CameraFrame {
    pub data_uri: String,
}

impl CameraFrame {
    pub fn new(data_uri: impl Into<String>) -> Self {
        Self { data_uri: data_uri.into() }
    }
}

#[async_trait::async_trait]
impl ImageSource for CameraFrame {
    async fn acquire(&self, max_bytes: usize) -> Result<CanonicalImage, AnalysisError> {
        CanonicalImage::from_data_uri(&self.data_uri, max_bytes)
    }

    fn describe(&self) -> String {
        "camera frame".to_string()
    }
}

/// Raw bytes already received, e.g. an HTTP request body.
pub struct UploadedBytes {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl UploadedBytes {
    pub fn new(bytes: Vec<u8>, content_type: Option<String>) -> Self {
        Self { bytes, content_type }
    }
}

#[async_trait::async_trait]
impl ImageSource for UploadedBytes {
    async fn acquire(&self, max_bytes: usize) -> Result<CanonicalImage, AnalysisError> {
        CanonicalImage::from_bytes(self.bytes.clone(), self.content_type.as_deref(), max_bytes)
    }

    fn describe(&self) -> String {
        format!("upload of {} bytes", self.bytes.len())
    }
}
