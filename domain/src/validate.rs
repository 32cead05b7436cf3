//! Lightweight input validation for the management surfaces.
//!
//! The redirect path never calls into this module.

use crate::CoreError;
use crate::ShortCode;

pub const MAX_URL_LEN: usize = 2048;

/// Validate a destination URL: http/https scheme and a sane length.
pub fn validate_long_url(s: &str) -> Result<(), CoreError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidUrl("empty".into()));
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(CoreError::InvalidUrl(
            "must start with http:// or https://".into(),
        ));
    }
    if trimmed.len() > MAX_URL_LEN {
        return Err(CoreError::InvalidUrl("too long".into()));
    }
    Ok(())
}

/// Validate a custom short code using the same rules as `ShortCode::new`.
pub fn validate_short_code(s: &str) -> Result<ShortCode, CoreError> {
    ShortCode::new(s.trim().to_string())
}
