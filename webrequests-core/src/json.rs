//! JSON bridge: content-type detection and serde_json encode/decode.
//!
//! Decode failures are split into [`JsonError::Malformed`] (the text is not
//! JSON at all) and [`JsonError::Mismatch`] (valid JSON whose shape does not
//! fit the target type). Callers treat the two differently: a mismatch on a
//! non-success response is tolerated, malformed text never is.

use http::HeaderMap;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::error::Category;

/// Content type used for JSON request bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Errors from the JSON bridge.
#[derive(Debug, thiserror::Error)]
pub enum JsonError {
    /// The text is not valid JSON.
    #[error("Response is not valid JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    /// Valid JSON that cannot be deserialized to the target type.
    #[error("Response JSON could not be deserialized to {type_name}: {source}")]
    Mismatch {
        type_name: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be serialized.
    #[error("value could not be serialized to JSON: {0}")]
    Encode(#[source] serde_json::Error),
}

impl JsonError {
    /// True for shape mismatches, false for malformed text.
    pub fn is_mismatch(&self) -> bool {
        matches!(self, JsonError::Mismatch { .. })
    }
}

/// Whether a `Content-Type` value denotes JSON.
///
/// Matches `application/json` and `application/<anything>+json`, with
/// leading whitespace allowed and parameters ignored. Case-insensitive.
pub fn is_json_content_type(content_type: &str) -> bool {
    let lowered = content_type.trim_start().to_ascii_lowercase();
    let Some(subtype) = lowered.strip_prefix("application/") else {
        return false;
    };
    let end = subtype
        .find(|c: char| c == ';' || c.is_whitespace())
        .unwrap_or(subtype.len());
    let token = &subtype[..end];
    token.starts_with("json") || token.match_indices("+json").any(|(index, _)| index > 0)
}

/// Whether headers declare a non-empty JSON body.
///
/// A missing `Content-Length` (chunked responses) counts as non-empty.
pub fn has_json(headers: &HeaderMap) -> bool {
    let non_empty = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .is_none_or(|length| length > 0);
    let json = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(is_json_content_type);
    non_empty && json
}

/// Serialize a value to JSON bytes.
pub fn to_json_vec<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, JsonError> {
    serde_json::to_vec(value).map_err(JsonError::Encode)
}

/// Deserialize JSON bytes, classifying failures.
pub fn from_json_slice<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, JsonError> {
    serde_json::from_slice(bytes).map_err(|source| match source.classify() {
        Category::Data => JsonError::Mismatch {
            type_name: std::any::type_name::<T>(),
            source,
        },
        Category::Io | Category::Syntax | Category::Eof => JsonError::Malformed(source),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use serde::Deserialize;

    #[test]
    fn json_content_types() {
        let cases = [
            ("application/json", true),
            (" application/json", true),
            (" application/vnd.api+json", true),
            ("application/vnd.api+json", true),
            ("Application/JSON; charset=utf-8", true),
            ("text/html", false),
            ("text/html; charset=UTF-8", false),
            ("text/html; charset=application/json", false),
            ("application/html; charset=application/json", false),
            ("application/html; charset=application/vnd.api+json", false),
            ("application/+json", false),
        ];
        for (content_type, expected) in cases {
            assert_eq!(is_json_content_type(content_type), expected, "{content_type}");
        }
    }

    #[test]
    fn has_json_requires_type_and_content() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert!(has_json(&headers));

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
        assert!(!has_json(&headers));

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("12"));
        assert!(has_json(&headers));

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert!(!has_json(&headers));
    }

    #[derive(Debug, PartialEq, Deserialize)]
    struct Message {
        message: String,
    }

    #[test]
    fn decode_distinguishes_malformed_from_mismatch() {
        let malformed = from_json_slice::<Message>(b"{\"message\":").unwrap_err();
        assert!(matches!(malformed, JsonError::Malformed(_)));
        assert!(!malformed.is_mismatch());

        let mismatch = from_json_slice::<Message>(b"{\"message\":42}").unwrap_err();
        assert!(mismatch.is_mismatch());
        assert!(mismatch.to_string().contains("Message"));
    }

    #[test]
    fn decoding_twice_gives_equal_values() {
        let body = br#"{"message":"hello"}"#;
        let first: Message = from_json_slice(body).unwrap();
        let second: Message = from_json_slice(body).unwrap();
        assert_eq!(first, second);
    }
}
