//! The fault type surfaced for every request/response failure.
//!
//! [`WebServiceError`] is a snapshot: request method and URI, and when a
//! response arrived, its status, headers, content type, length, and a
//! bounded content preview. Kinds of failure are told apart by which of
//! these are populated rather than by distinct types. The preview is part
//! of the `Display` text, so logging a fault with `%err` keeps it.

use std::error::Error as StdError;
use std::fmt;

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, Method, StatusCode};
use url::Url;

/// Maximum number of characters captured in a content preview.
pub const CONTENT_PREVIEW_LENGTH: usize = 2000;

/// Maximum number of characters of raw content shown by [`WebServiceError::detailed`].
const DETAILED_CONTENT_LENGTH: usize = 1000;

type BoxError = Box<dyn StdError + Send + Sync>;

/// Where a fault was raised.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WebServiceErrorKind {
    /// Building or sending the request failed; no response exists.
    Request,
    /// A response arrived but could not be handled.
    Response,
}

/// The single error type for web service failures.
#[derive(Debug)]
pub struct WebServiceError {
    kind: WebServiceErrorKind,
    message: Option<String>,
    request_method: Option<Method>,
    request_uri: Option<Url>,
    status: Option<StatusCode>,
    headers: Option<HeaderMap>,
    content_type: Option<String>,
    content_length: Option<u64>,
    content_preview: Option<String>,
    response_content: Option<Bytes>,
    source: Option<BoxError>,
}

impl WebServiceError {
    /// Create a fault with a message and nothing else.
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            kind: WebServiceErrorKind::Request,
            message: Some(message.into()),
            request_method: None,
            request_uri: None,
            status: None,
            headers: None,
            content_type: None,
            content_length: None,
            content_preview: None,
            response_content: None,
            source: None,
        }
    }

    /// Fault raised before any response was received.
    pub fn request<S: Into<String>>(message: S, method: &Method, uri: &Url) -> Self {
        Self::new(message).with_request(method.clone(), uri.clone())
    }

    /// Fault raised while handling a response.
    ///
    /// Captures status, headers, content type and content length from the response.
    pub fn response<S: Into<String>>(
        message: S,
        method: &Method,
        uri: &Url,
        status: StatusCode,
        headers: &HeaderMap,
    ) -> Self {
        Self::new(message)
            .with_request(method.clone(), uri.clone())
            .with_response(status, headers.clone())
    }

    pub fn with_request(mut self, method: Method, uri: Url) -> Self {
        self.request_method = Some(method);
        self.request_uri = Some(uri);
        self
    }

    pub fn with_response(mut self, status: StatusCode, headers: HeaderMap) -> Self {
        self.kind = WebServiceErrorKind::Response;
        self.status = Some(status);
        self.content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        self.content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        self.headers = Some(headers);
        self
    }

    pub fn with_content_preview(mut self, preview: Option<String>) -> Self {
        self.content_preview = preview;
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        self.source = Some(source.into());
        self
    }

    /// Attach the full response content after construction.
    ///
    /// Used by [`detailed`](Self::detailed) when no preview was captured.
    /// Only the first association is kept.
    pub fn with_response_content(mut self, content: Bytes) -> Self {
        if self.response_content.is_none() {
            self.response_content = Some(content);
        }
        self
    }

    pub fn kind(&self) -> WebServiceErrorKind {
        self.kind
    }

    /// The message passed at construction, without request or response details.
    pub fn message(&self) -> &str {
        self.message
            .as_deref()
            .filter(|message| !message.is_empty())
            .unwrap_or("Web service error.")
    }

    pub fn request_method(&self) -> Option<&Method> {
        self.request_method.as_ref()
    }

    pub fn request_uri(&self) -> Option<&Url> {
        self.request_uri.as_ref()
    }

    /// Response status, absent for faults raised before a response arrived.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn headers(&self) -> Option<&HeaderMap> {
        self.headers.as_ref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn content_preview(&self) -> Option<&str> {
        self.content_preview.as_deref()
    }

    /// [`Display`](fmt::Display) text, falling back to the first 1000
    /// characters of attached response content when no preview was
    /// captured.
    pub fn detailed(&self) -> String {
        let mut result = self.to_string();
        if self.content_preview.is_some() {
            return result;
        }
        if let Some(content) = &self.response_content {
            result.push_str("\ncontent: ");
            let text = String::from_utf8_lossy(content);
            if text.chars().count() > DETAILED_CONTENT_LENGTH {
                result.extend(text.chars().take(DETAILED_CONTENT_LENGTH));
                result.push_str("...");
            } else {
                result.push_str(&text);
            }
        }
        result
    }
}

impl fmt::Display for WebServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())?;
        if let Some(uri) = &self.request_uri {
            let method = self.request_method.as_ref().unwrap_or(&Method::GET);
            write!(f, " Request: {} {}", method, uri)?;
        }
        if let Some(status) = self.status {
            write!(f, " (status {}", status.as_u16())?;
            if let Some(content_type) = &self.content_type {
                write!(f, ", content type '{}'", content_type)?;
            }
            if let Some(length) = self.content_length {
                write!(f, ", content length {}", length)?;
            }
            f.write_str(")")?;
        }
        if let Some(preview) = &self.content_preview {
            write!(f, "\ncontent: {}", preview)?;
        }
        Ok(())
    }
}

impl StdError for WebServiceError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn StdError + 'static))
    }
}

/// Truncate text to a content preview.
///
/// When the text fills the preview, the last character is replaced with `…`.
pub fn content_preview(text: &str) -> String {
    let mut preview: String = text.chars().take(CONTENT_PREVIEW_LENGTH).collect();
    if preview.chars().count() == CONTENT_PREVIEW_LENGTH {
        preview.pop();
        preview.push('…');
    }
    preview
}
