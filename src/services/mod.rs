pub mod ai_service; // Inference boundary
pub mod clock;
pub mod image;
pub mod interpreter;
pub mod openrouter; // OpenRouter vision service
pub mod request_builder;

pub use ai_service::{InferenceClient, RawResponse};
pub use clock::Clock;
pub use image::{CameraFrame, CanonicalImage, FileUpload, ImageSource, UploadedBytes};
pub use openrouter::OpenRouterService;
pub use request_builder::build_request;
