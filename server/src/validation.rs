use crate::error::ApiError;

/// Maximum text length for speech requests
const MAX_TEXT_LENGTH: usize = 5000;
/// Speed factor bounds for speech requests
pub const MIN_SPEED: f32 = 0.25;
pub const MAX_SPEED: f32 = 4.0;

/// Validate a speech request before the pipeline starts.
///
/// Empty text is allowed and produces an empty audio stream; format and
/// language membership are already enforced by the request enums.
pub fn validate_speech_request(text: &str, speed: f32) -> Result<(), ApiError> {
    if text.len() > MAX_TEXT_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Text too long (max {} characters)",
            MAX_TEXT_LENGTH
        )));
    }
    if !(MIN_SPEED..=MAX_SPEED).contains(&speed) {
        return Err(ApiError::InvalidInput(format!(
            "Speed must be between {} and {}",
            MIN_SPEED, MAX_SPEED
        )));
    }
    Ok(())
}
