use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{AppError, Result};

/// Map an octocrab README payload to its text.
///
/// The contents API returns base64 wrapped at 60 columns; line breaks are
/// stripped before decoding. `None` means the payload carried no content.
pub fn map_readme(content: &octocrab::models::repos::Content) -> Result<Option<String>> {
    let Some(encoded) = content.content.as_deref() else {
        return Ok(None);
    };
    match content.encoding.as_deref() {
        Some("base64") | None => decode_base64(encoded).map(Some),
        Some(other) => Err(AppError::GitHubApi(format!(
            "Unsupported README encoding '{other}'"
        ))),
    }
}

pub fn decode_base64(encoded: &str) -> Result<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| AppError::GitHubApi(format!("Invalid base64 README payload: {e}")))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
