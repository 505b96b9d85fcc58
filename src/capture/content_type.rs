//! Decides from a `Content-Type` whether a body is worth capturing.
//!
//! Media, multipart payloads and front-end assets are left out; everything
//! else (JSON, plain text, XML, form data, unknown types) is captured.

use http::HeaderValue;

/// Top-level types that are never captured.
const EXCLUDED_TYPES: &[&str] = &["audio", "image", "multipart", "video"];

/// Sub-types of `text` that are never captured, in addition to `vnd.*`.
const EXCLUDED_TEXT_SUBTYPES: &[&str] = &["css", "html", "javascript"];

/// Sub-types of `application` that are never captured.
const EXCLUDED_APPLICATION_SUBTYPES: &[&str] = &["javascript"];

/// Error returned when a `Content-Type` value cannot be understood.
#[derive(Debug, thiserror::Error)]
pub enum ContentTypeError {
    #[error("invalid media type: {0}")]
    Invalid(#[from] mime::FromStrError),
    #[error("invalid media type: {0:?} is not a token")]
    NotToken(String),
    #[error("content type is not a visible ASCII string")]
    NotVisible(#[from] http::header::ToStrError),
}

/// Returns `true` when a body with the given content type must not be captured.
///
/// An empty content type is never skipped. Everything after the first `;` is
/// ignored, and a bare top-level type such as `text` is accepted. A malformed
/// value is reported as an error; callers gating capture should treat it as
/// "skip".
pub fn should_skip(content_type: &str) -> Result<bool, ContentTypeError> {
    let essence = match content_type.split_once(';') {
        Some((essence, _parameters)) => essence,
        None => content_type,
    };
    let essence = essence.trim().to_ascii_lowercase();
    if essence.is_empty() {
        return Ok(false);
    }

    match essence.split_once('/') {
        Some((main_type, sub_type)) if is_token(main_type) && is_token(sub_type) => {
            let media_type: mime::Mime = essence.parse()?;
            Ok(skip_media_type(
                media_type.type_().as_str(),
                media_type.subtype().as_str(),
            ))
        }
        None if is_token(&essence) => Ok(skip_media_type(&essence, "")),
        _ => Err(ContentTypeError::NotToken(essence.clone())),
    }
}

fn skip_media_type(main_type: &str, sub_type: &str) -> bool {
    if EXCLUDED_TYPES.contains(&main_type) {
        return true;
    }

    match main_type {
        "text" => EXCLUDED_TEXT_SUBTYPES.contains(&sub_type) || sub_type.starts_with("vnd"),
        "application" => EXCLUDED_APPLICATION_SUBTYPES.contains(&sub_type),
        _ => false,
    }
}

/// `token` as defined by RFC 9110, section 5.6.2.
fn is_token(value: &str) -> bool {
    !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}

/// Header-level capture gate: a missing header is capturable, anything that
/// fails to parse is not.
pub fn is_capturable(content_type: Option<&HeaderValue>) -> bool {
    let Some(content_type) = content_type else {
        return true;
    };

    let decision = content_type
        .to_str()
        .map_err(ContentTypeError::from)
        .and_then(should_skip);

    match decision {
        Ok(skip) => !skip,
        Err(err) => {
            tracing::debug!(error = %err, "unparsable content type, body capture skipped");
            false
        }
    }
}
