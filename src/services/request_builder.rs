use crate::error::AnalysisError;
use crate::models::{AnalysisRequest, FoodMetadata};
use crate::services::clock::Clock;
use crate::services::image::CanonicalImage;

/// Combine the image and metadata into an inference request.
///
/// `currentTime` is read from `clock` here rather than copied from the
/// metadata, and the refrigeration duration is dropped unless the food is
/// marked as refrigerated.
pub fn build_request(
    image: Option<&CanonicalImage>,
    metadata: &FoodMetadata,
    clock: &Clock,
) -> Result<AnalysisRequest, AnalysisError> {
    let image = image.ok_or(AnalysisError::MissingImage)?;

    Ok(AnalysisRequest {
        image: image.to_data_uri(),
        prep_time: metadata.prep_time.clone(),
        current_time: clock.now_string(),
        is_refrigerated: metadata.is_refrigerated,
        refrigeration_duration: metadata
            .effective_refrigeration_duration()
            .map(|d| d.to_string()),
    })
}
