//! API handlers and shared input validation.
//!
//! Handlers resolve the caller first, run the role gate and the relation
//! resolver, then either read through `storage` or hand a write plan to the
//! mutator. Validation helpers here are shared by registration, profile edits
//! and the admin endpoints.

pub mod accounts;
pub mod admin;
pub mod auth;
pub mod health;
pub mod me;
pub mod orgs;

use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use base64ct::{Base64, Encoding};
use regex::Regex;

use crate::{
    error::{Error, Result},
    mutation::patch::MAX_ASSET_BYTES,
};

const PASSWORD_MIN_LENGTH: usize = 8;

/// Lightweight email sanity check used before persisting data.
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

/// Display names are letters, digits and spaces, with at least one non-space.
pub fn valid_display_name(name: &str) -> bool {
    !name.trim().is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == ' ')
}

/// At least eight characters mixing letters and digits.
pub fn valid_password(password: &str) -> bool {
    password.chars().count() >= PASSWORD_MIN_LENGTH
        && password.chars().any(char::is_alphabetic)
        && password.chars().any(|c| c.is_ascii_digit())
}

/// Check a new password and its confirmation.
pub(crate) fn check_new_password(password: &str, confirmation: &str) -> Result<()> {
    if password != confirmation {
        return Err(Error::validation("Passwords do not match."));
    }
    if !valid_password(password) {
        return Err(Error::validation(
            "Password must be at least 8 characters and mix letters and digits.",
        ));
    }
    Ok(())
}

/// Trim `value` and require it to be non-empty.
pub(crate) fn required_text(value: &str, field: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::validation(format!("{field} is required.")));
    }
    Ok(value.to_string())
}

/// Optional free text: blank input clears the column.
pub(crate) fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Patch input for a nullable text column: absent leaves it alone, blank clears it.
pub(crate) fn clearable_text(value: Option<&str>) -> Option<Option<String>> {
    value.map(|value| optional_text(Some(value)))
}

/// Patch input for an image column: absent leaves it alone, blank clears it.
pub(crate) fn clearable_image(value: Option<&str>) -> Result<Option<Option<Vec<u8>>>> {
    match value.map(str::trim) {
        None => Ok(None),
        Some("") => Ok(Some(None)),
        Some(encoded) => Ok(Some(Some(decode_image(encoded)?))),
    }
}

/// Decode a base64 image payload and enforce the asset ceiling.
pub(crate) fn decode_image(encoded: &str) -> Result<Vec<u8>> {
    let bytes = Base64::decode_vec(encoded.trim())
        .map_err(|_| Error::validation("Image must be base64 encoded."))?;
    if bytes.is_empty() {
        return Err(Error::validation("Image is empty."));
    }
    if bytes.len() > MAX_ASSET_BYTES {
        return Err(Error::validation("Image exceeds the 16 MiB limit."));
    }
    Ok(bytes)
}

/// Serve a stored image blob as-is.
pub(crate) fn image_response(bytes: Vec<u8>) -> Response {
    let content_type = sniff_image_type(&bytes);
    (
        StatusCode::OK,
        [(CONTENT_TYPE, HeaderValue::from_static(content_type))],
        bytes,
    )
        .into_response()
}

fn sniff_image_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if bytes.starts_with(b"GIF8") {
        "image/gif"
    } else if bytes.len() > 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "application/octet-stream"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(valid_email("ann@example.com"));
        assert!(!valid_email("ann@example"));
        assert!(!valid_email("ann example.com"));
        assert!(!valid_email(""));
    }

    #[test]
    fn display_name_validation() {
        assert!(valid_display_name("Ann Lee 2"));
        assert!(!valid_display_name("   "));
        assert!(!valid_display_name("Ann <script>"));
        assert!(!valid_display_name("ann_lee"));
    }

    #[test]
    fn password_validation() {
        assert!(valid_password("rowing2024"));
        assert!(!valid_password("short1"));
        assert!(!valid_password("onlyletters"));
        assert!(!valid_password("12345678"));
        assert!(check_new_password("rowing2024", "rowing2025").is_err());
        assert!(check_new_password("rowing2024", "rowing2024").is_ok());
    }

    #[test]
    fn image_decoding() {
        assert_eq!(decode_image("iVBORw==").ok(), Some(vec![0x89, b'P', b'N', b'G']));
        assert!(matches!(
            decode_image("not base64!"),
            Err(Error::ValidationFailed(_))
        ));
        assert!(decode_image("").is_err());
        assert_eq!(sniff_image_type(&[0x89, b'P', b'N', b'G']), "image/png");
        assert_eq!(sniff_image_type(b"plain"), "application/octet-stream");
    }

    #[test]
    fn optional_text_blanks_are_none() {
        assert_eq!(optional_text(Some("  ")), None);
        assert_eq!(optional_text(Some(" hi ")), Some("hi".to_string()));
        assert_eq!(optional_text(None), None);
        assert_eq!(clearable_text(Some("")), Some(None));
        assert_eq!(clearable_text(None), None);
    }

    #[test]
    fn clearable_image_inputs() {
        assert!(matches!(clearable_image(None), Ok(None)));
        assert!(matches!(clearable_image(Some(" ")), Ok(Some(None))));
        assert!(matches!(clearable_image(Some("iVBORw==")), Ok(Some(Some(_)))));
        assert!(clearable_image(Some("%%%")).is_err());
    }
}
