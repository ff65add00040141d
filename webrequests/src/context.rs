//! Per-call response state.
//!
//! A [`ResponseHandlingContext`] owns the raw response of one call. The
//! body can leave the context exactly once: by being read, or by being
//! detached to the caller. Whatever is still owned when the call ends is
//! dropped by the engine.

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, Method, Response, StatusCode};
use tokio_util::sync::CancellationToken;
use url::Url;
use webrequests_core::{WebServiceError, content_preview, has_json};

use crate::error::ClientError;
use crate::transport::{ResponseBody, ResponseUri};

/// The response being handled, plus single-read bookkeeping.
///
/// [`uri`](Self::uri) is the URI that produced the response. After a
/// followed redirect it differs from the URI that was requested.
#[derive(Debug)]
pub struct ResponseHandlingContext {
    method: Method,
    uri: Url,
    redirects_disabled: bool,
    status: StatusCode,
    headers: HeaderMap,
    body: Option<ResponseBody>,
    content_read: bool,
    detached: bool,
    cancellation: CancellationToken,
}

impl ResponseHandlingContext {
    pub fn new(
        method: Method,
        uri: Url,
        redirects_disabled: bool,
        response: Response<ResponseBody>,
        cancellation: CancellationToken,
    ) -> Self {
        let (mut parts, body) = response.into_parts();
        let uri = match parts.extensions.remove::<ResponseUri>() {
            Some(ResponseUri(final_uri)) => {
                if final_uri != uri {
                    tracing::debug!(requested = %uri, responded = %final_uri, "response came from a redirect");
                }
                final_uri
            }
            None => uri,
        };
        Self {
            method,
            uri,
            redirects_disabled,
            status: parts.status,
            headers: parts.headers,
            body: Some(body),
            content_read: false,
            detached: false,
            cancellation,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    /// Whether the request asked not to follow redirects.
    pub fn redirects_disabled(&self) -> bool {
        self.redirects_disabled
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Whether the response declares non-empty JSON content.
    pub fn has_json(&self) -> bool {
        has_json(&self.headers)
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Whether the body has been read (or its read was attempted).
    pub fn is_content_read(&self) -> bool {
        self.content_read
    }

    /// Whether the body was handed to the caller.
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// Take the body for reading. Marks the content as read.
    pub fn take_body(&mut self) -> Result<ResponseBody, ClientError> {
        if self.detached {
            return Err(self.create_error("Response content was detached.").into());
        }
        self.content_read = true;
        self.body
            .take()
            .ok_or_else(|| self.create_error("Response content has already been read.").into())
    }

    /// Hand the unread body to the caller, who becomes responsible for it.
    ///
    /// Returns `None` once the content has been read or detached.
    pub fn detach(&mut self) -> Option<ResponseBody> {
        let body = self.body.take()?;
        self.detached = true;
        tracing::debug!(uri = %self.uri, "detached response content");
        Some(body)
    }

    pub async fn read_bytes(&mut self) -> Result<Bytes, ClientError> {
        Ok(self.take_body()?.bytes().await?)
    }

    pub async fn read_text(&mut self) -> Result<String, ClientError> {
        Ok(self.take_body()?.text().await?)
    }

    /// Read a bounded text preview of the body, if it can still be read.
    ///
    /// Read failures are logged and yield `None`.
    pub async fn read_preview(&mut self) -> Option<String> {
        if self.content_read || self.detached {
            return None;
        }
        let body = self.take_body().ok()?;
        match body.text().await {
            Ok(text) => Some(content_preview(&text)),
            Err(e) => {
                tracing::warn!(uri = %self.uri, error = %e, "failed to read content preview");
                None
            }
        }
    }

    /// A fault describing this response, without reading the body.
    pub fn create_error(&self, message: &str) -> WebServiceError {
        WebServiceError::response(message, &self.method, &self.uri, self.status, &self.headers)
    }

    /// A fault describing this response with a content preview, when the
    /// body has not been read yet.
    pub async fn create_error_with_preview(&mut self, message: &str) -> WebServiceError {
        let preview = self.read_preview().await;
        self.create_error(message).with_content_preview(preview)
    }

    /// Drop the body unless it was detached.
    pub(crate) fn finish(&mut self) {
        if self.body.take().is_some() {
            tracing::debug!(uri = %self.uri, "disposed unread response content");
        }
    }
}
