//! Declarative description of one outgoing request.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use http::header::{
    ACCEPT, AUTHORIZATION, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, EXPECT, HOST, HeaderName,
    HeaderValue, IF_MATCH, IF_MODIFIED_SINCE, IF_NONE_MATCH, RANGE, REFERER, USER_AGENT,
};
use http::{HeaderMap, Method, Request, Uri};
use serde::Serialize;
use url::Url;
use webrequests_core::{ByteRange, JSON_CONTENT_TYPE, JsonError, format_http_date, gzip, to_json_vec};

use crate::error::ClientError;
use crate::settings::{RequestInfo, RequestSettings};
use crate::transport::{RequestBody, TransportError};

const OCTET_STREAM_CONTENT_TYPE: &str = "application/octet-stream";

/// Content type wrapping a compressed request body.
const COMPRESSED_CONTENT_TYPE: &str = "application/x-vnd.logos.compressed";

/// Bodies smaller than this are never compressed.
const MIN_COMPRESSION_LENGTH: usize = 1024;

/// Returned when a request URI is not `http` or `https`.
#[derive(Debug, thiserror::Error)]
#[error("Expected URI with http or https scheme; received {scheme}")]
pub struct InvalidSchemeError {
    pub scheme: String,
}

/// Request body together with its content type.
#[derive(Debug)]
pub struct RequestContent {
    content_type: Option<String>,
    body: RequestBody,
}

impl RequestContent {
    pub fn bytes<S: Into<String>>(content_type: S, data: impl Into<Bytes>) -> Self {
        Self {
            content_type: Some(content_type.into()),
            body: RequestBody::full(data),
        }
    }

    pub fn text<S: Into<String>>(text: S) -> Self {
        Self::bytes("text/plain; charset=utf-8", text.into())
    }

    /// Serialize `value` as a JSON body.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, JsonError> {
        Ok(Self::bytes(JSON_CONTENT_TYPE, to_json_vec(value)?))
    }

    /// A body produced by `stream`. Streamed bodies are never compressed and
    /// cannot be replayed on redirect.
    pub fn stream<S, St>(content_type: S, stream: St) -> Self
    where
        S: Into<String>,
        St: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            content_type: Some(content_type.into()),
            body: RequestBody::streaming(stream),
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    /// Gzip the body when that shrinks it to at most 90% of its size.
    fn compress(self) -> io::Result<Self> {
        let Some(data) = self.body.as_bytes() else {
            return Ok(self);
        };
        if data.len() < MIN_COMPRESSION_LENGTH {
            return Ok(self);
        }
        let compressed = gzip(data)?;
        if compressed.len() * 10 > data.len() * 9 {
            return Ok(self);
        }
        let inner = self.content_type.as_deref().unwrap_or(OCTET_STREAM_CONTENT_TYPE);
        tracing::debug!(
            original = data.len(),
            compressed = compressed.len(),
            "compressed request content"
        );
        Ok(Self {
            content_type: Some(format!("{COMPRESSED_CONTENT_TYPE}; type=\"{inner}\"")),
            body: RequestBody::full(compressed),
        })
    }
}

/// Everything needed to send one HTTP request.
///
/// Fields may be changed freely until the description is passed to the
/// engine, which takes ownership of it for the call.
#[derive(Debug)]
pub struct RequestDescription {
    uri: Url,
    /// Defaults to `GET`.
    pub method: Method,
    pub content: Option<RequestContent>,
    pub accept: Option<String>,
    /// Overrides the settings' user agent.
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub if_match: Option<String>,
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<DateTime<Utc>>,
    pub range: Option<ByteRange>,
    /// Added after the settings' default headers; same-named values are
    /// appended, not replaced.
    pub headers: HeaderMap,
    /// Overrides the settings' default timeout.
    pub timeout: Option<Duration>,
    pub allow_compression: bool,
    pub redirects_disabled: bool,
    pub settings: Option<Arc<RequestSettings>>,
}

impl RequestDescription {
    pub fn new(uri: Url) -> Result<Self, InvalidSchemeError> {
        if uri.scheme() != "http" && uri.scheme() != "https" {
            return Err(InvalidSchemeError {
                scheme: uri.scheme().to_owned(),
            });
        }
        Ok(Self {
            uri,
            method: Method::GET,
            content: None,
            accept: None,
            user_agent: None,
            referer: None,
            if_match: None,
            if_none_match: None,
            if_modified_since: None,
            range: None,
            headers: HeaderMap::new(),
            timeout: None,
            allow_compression: false,
            redirects_disabled: false,
            settings: None,
        })
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn with_settings(mut self, settings: Arc<RequestSettings>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_post_method(self) -> Self {
        self.with_method(Method::POST)
    }

    pub fn with_put_method(self) -> Self {
        self.with_method(Method::PUT)
    }

    pub fn with_patch_method(self) -> Self {
        self.with_method(Method::PATCH)
    }

    pub fn with_delete_method(self) -> Self {
        self.with_method(Method::DELETE)
    }

    pub fn with_head_method(self) -> Self {
        self.with_method(Method::HEAD)
    }

    pub fn with_accept<S: Into<String>>(mut self, accept: S) -> Self {
        self.accept = Some(accept.into());
        self
    }

    /// Append an additional header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_authorization_header(self, value: HeaderValue) -> Self {
        self.with_header(AUTHORIZATION, value)
    }

    pub fn with_content(mut self, content: RequestContent) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_json_content<T: Serialize + ?Sized>(self, value: &T) -> Result<Self, JsonError> {
        Ok(self.with_content(RequestContent::json(value)?))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_range(mut self, range: ByteRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_if_match<S: Into<String>>(mut self, etag: S) -> Self {
        self.if_match = Some(etag.into());
        self
    }

    pub fn with_if_none_match<S: Into<String>>(mut self, etag: S) -> Self {
        self.if_none_match = Some(etag.into());
        self
    }

    pub fn with_if_modified_since(mut self, value: DateTime<Utc>) -> Self {
        self.if_modified_since = Some(value);
        self
    }

    /// Return redirect responses instead of following them.
    pub fn with_redirects_disabled(mut self) -> Self {
        self.redirects_disabled = true;
        self
    }

    pub fn with_content_compression(mut self, enabled: bool) -> Self {
        self.allow_compression = enabled;
        self
    }

    /// Timeout in effect for this request under `settings`.
    pub fn effective_timeout(&self, settings: &RequestSettings) -> Option<Duration> {
        self.timeout.or(settings.default_timeout())
    }

    /// Assemble the outgoing request.
    ///
    /// Headers are applied in a fixed order: settings defaults, additional
    /// headers, then the dedicated fields.
    pub(crate) fn to_http_request(
        &mut self,
        settings: &RequestSettings,
    ) -> Result<Request<RequestBody>, ClientError> {
        let uri: Uri = self
            .uri
            .as_str()
            .parse()
            .map_err(|e: http::uri::InvalidUri| TransportError::InvalidRequest(e.into()))?;
        let mut headers = settings.default_headers().clone();
        for (name, value) in &self.headers {
            headers.append(name, value.clone());
        }

        if let Some(accept) = &self.accept {
            headers.append(ACCEPT, header_value(accept)?);
        }
        match &self.user_agent {
            Some(user_agent) => {
                headers.insert(USER_AGENT, header_value(user_agent)?);
            }
            None => {
                if let Some(user_agent) = settings.user_agent() {
                    headers.insert(USER_AGENT, user_agent.clone());
                }
            }
        }
        if let Some(referer) = &self.referer {
            headers.insert(REFERER, header_value(referer)?);
        }
        if settings.disable_100_continue() {
            headers.remove(EXPECT);
        }
        if settings.disable_keep_alive() {
            headers.insert(CONNECTION, HeaderValue::from_static("close"));
        }
        if let Some(host) = settings.host() {
            headers.insert(HOST, host.clone());
        }
        let info = RequestInfo {
            method: self.method.clone(),
            uri: self.uri.clone(),
        };
        if let Some(authorization) = settings.authorization_for(&info) {
            headers.insert(AUTHORIZATION, header_value(&authorization)?);
        }
        if let Some(etag) = &self.if_match {
            headers.append(IF_MATCH, header_value(etag)?);
        }
        if let Some(since) = self.if_modified_since {
            headers.insert(IF_MODIFIED_SINCE, header_value(&format_http_date(since))?);
        }
        if let Some(etag) = &self.if_none_match {
            headers.append(IF_NONE_MATCH, header_value(etag)?);
        }
        if let Some(range) = &self.range {
            headers.insert(RANGE, header_value(&range.to_header_value())?);
        }

        let mut content = self.content.take();
        if self.allow_compression {
            content = content.map(RequestContent::compress).transpose()?;
        }
        let body = match content {
            Some(content) => {
                if let Some(content_type) = &content.content_type {
                    headers.insert(CONTENT_TYPE, header_value(content_type)?);
                }
                content.body
            }
            // Some servers reject POST/PUT without an explicit (empty) body.
            None if self.method == Method::POST || self.method == Method::PUT => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(OCTET_STREAM_CONTENT_TYPE));
                headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
                RequestBody::empty()
            }
            None => RequestBody::empty(),
        };

        let mut builder = Request::builder().method(self.method.clone()).uri(uri);
        if let Some(map) = builder.headers_mut() {
            *map = headers;
        }
        Ok(builder.body(body).map_err(TransportError::from)?)
    }
}

fn header_value(value: &str) -> Result<HeaderValue, ClientError> {
    HeaderValue::from_str(value)
        .map_err(|e| ClientError::Transport(TransportError::InvalidRequest(e.into())))
}
