//! String, URL and image URL checks.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use super::ValidationError;

/// Upper bound the API places on any image URL.
const IMAGE_URL_MAX_LENGTH: usize = 1000;

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "svg", "bmp", "webp", "tif", "tiff", "ico", "icns", "psd", "ai",
    "clip", "heic", "rw2",
];

fn http_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(https?://)[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}(/\S*)?$")
            .expect("static URL pattern compiles")
    })
}

fn image_extension_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.([a-zA-Z0-9]+)$").expect("static extension pattern compiles"))
}

/// Require a non-empty string, optionally bounded to `max_length` characters.
/// Returns the validated string.
pub fn validate_string_param<'a>(
    value: Option<&'a Value>,
    name: &str,
    max_length: Option<usize>,
) -> Result<&'a str, ValidationError> {
    let s = match value {
        Some(Value::String(s)) if !s.is_empty() => s.as_str(),
        _ => {
            return Err(ValidationError::new(format!(
                "parameter '{}' is required and must be a string",
                name
            )))
        }
    };
    if let Some(max) = max_length {
        if s.chars().count() > max {
            return Err(ValidationError::new(format!(
                "parameter '{}' must be at most {} characters",
                name, max
            )));
        }
    }
    Ok(s)
}

/// Require an http:// or https:// URL with a dotted host.
pub fn validate_url<'a>(
    value: Option<&'a Value>,
    name: &str,
    max_length: Option<usize>,
) -> Result<&'a str, ValidationError> {
    let url = validate_string_param(value, name, max_length)?;
    if !http_url_regex().is_match(url) {
        return Err(ValidationError::new(format!(
            "parameter '{}' must be a valid HTTP or HTTPS URL",
            name
        )));
    }
    Ok(url)
}

/// Require an HTTPS URL of at most 1000 characters whose path extension, if
/// any, is a known image format.
pub fn validate_image_url<'a>(
    value: Option<&'a Value>,
    name: &str,
) -> Result<&'a str, ValidationError> {
    let url = validate_url(value, name, Some(IMAGE_URL_MAX_LENGTH))?;
    let is_https = url
        .get(..8)
        .map(|scheme| scheme.eq_ignore_ascii_case("https://"))
        .unwrap_or(false);
    if !is_https {
        return Err(ValidationError::new(format!(
            "parameter '{}' must be an HTTPS URL",
            name
        )));
    }

    let parsed = reqwest::Url::parse(url).map_err(|_| {
        ValidationError::new(format!("parameter '{}' must be a valid HTTPS URL", name))
    })?;
    if let Some(caps) = image_extension_regex().captures(parsed.path()) {
        let ext = caps[1].to_ascii_lowercase();
        if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            return Err(ValidationError::new(format!(
                "parameter '{}' has disallowed file extension '{}'",
                name, ext
            )));
        }
    }
    Ok(url)
}

/// Require an id that fills exactly one URL path segment: no separators, no query or
/// fragment markers, no percent escapes and no dot segments.
pub fn validate_path_segment<'a>(value: &'a str, name: &str) -> Result<&'a str, ValidationError> {
    let invalid = value.is_empty()
        || value == "."
        || value == ".."
        || value
            .chars()
            .any(|c| matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_control());
    if invalid {
        return Err(ValidationError::new(format!(
            "parameter '{}' must be a single path segment",
            name
        )));
    }
    Ok(value)
}
