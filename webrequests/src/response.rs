//! Results produced by the status classifier.
//!
//! [`WebServiceResponse`] is the generic `{status, headers, content}` result;
//! it owns the unread body, so the caller decides when it is read or
//! dropped. [`JsonWebServiceResponse`] carries a decoded JSON value instead.

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, Method, StatusCode};
use url::Url;
use webrequests_core::WebServiceError;

use crate::transport::ResponseBody;

/// A classified response whose content has not been read.
#[derive(Debug)]
pub struct WebServiceResponse {
    request_method: Method,
    request_uri: Url,
    status: StatusCode,
    headers: HeaderMap,
    content: Option<ResponseBody>,
}

impl WebServiceResponse {
    pub fn new(
        request_method: Method,
        request_uri: Url,
        status: StatusCode,
        headers: HeaderMap,
        content: Option<ResponseBody>,
    ) -> Self {
        Self {
            request_method,
            request_uri,
            status,
            headers,
            content,
        }
    }

    pub fn request_method(&self) -> &Method {
        &self.request_method
    }

    pub fn request_uri(&self) -> &Url {
        &self.request_uri
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

    /// Declared content length, if any.
    pub fn content_length(&self) -> Option<u64> {
        content_length(&self.headers)
    }

    pub fn content(&self) -> Option<&ResponseBody> {
        self.content.as_ref()
    }

    /// Take the content, leaving `None` behind.
    pub fn take_content(&mut self) -> Option<ResponseBody> {
        self.content.take()
    }

    pub fn into_content(self) -> Option<ResponseBody> {
        self.content
    }

    /// A fault describing this response.
    pub fn create_error(&self, message: &str) -> WebServiceError {
        WebServiceError::response(
            message,
            &self.request_method,
            &self.request_uri,
            self.status,
            &self.headers,
        )
    }
}

/// A classified response with a decoded JSON value.
///
/// The value is always present for `200 OK`; for other statuses it is
/// absent when the content was missing, not JSON, or of a different shape.
/// Content that was read but not decoded is kept in
/// [`content`](Self::content).
#[derive(Debug, Clone)]
pub struct JsonWebServiceResponse<T> {
    request_method: Method,
    request_uri: Url,
    status: StatusCode,
    headers: HeaderMap,
    value: Option<T>,
    content: Option<Bytes>,
}

impl<T> JsonWebServiceResponse<T> {
    pub(crate) fn from_parts(response: &WebServiceResponse, value: Option<T>) -> Self {
        Self {
            request_method: response.request_method.clone(),
            request_uri: response.request_uri.clone(),
            status: response.status,
            headers: response.headers.clone(),
            value,
            content: None,
        }
    }

    pub(crate) fn with_content(mut self, content: Bytes) -> Self {
        self.content = Some(content);
        self
    }

    pub fn request_method(&self) -> &Method {
        &self.request_method
    }

    pub fn request_uri(&self) -> &Url {
        &self.request_uri
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn into_value(self) -> Option<T> {
        self.value
    }

    /// Raw content that did not yield a value: a non-JSON body or JSON of
    /// another shape on a non-success status.
    pub fn content(&self) -> Option<&Bytes> {
        self.content.as_ref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// A fault describing this response, carrying any undecoded content.
    pub fn create_error(&self, message: &str) -> WebServiceError {
        let error = WebServiceError::response(
            message,
            &self.request_method,
            &self.request_uri,
            self.status,
            &self.headers,
        );
        match &self.content {
            Some(content) => error.with_response_content(content.clone()),
            None => error,
        }
    }

    /// Transform the value, preserving status and headers.
    pub fn map<U, F>(self, f: F) -> JsonWebServiceResponse<U>
    where
        F: FnOnce(T) -> U,
    {
        JsonWebServiceResponse {
            request_method: self.request_method,
            request_uri: self.request_uri,
            status: self.status,
            headers: self.headers,
            value: self.value.map(f),
            content: self.content,
        }
    }
}

pub(crate) fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn response() -> WebServiceResponse {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("5"));
        WebServiceResponse::new(
            Method::GET,
            Url::parse("http://localhost/a").unwrap(),
            StatusCode::CREATED,
            headers,
            Some(ResponseBody::from_bytes("hello")),
        )
    }

    #[tokio::test]
    async fn content_is_owned_by_the_response() {
        let mut response = response();
        assert_eq!(response.content_type(), Some("text/plain"));
        assert_eq!(response.content_length(), Some(5));
        let body = response.take_content().unwrap();
        assert!(response.content().is_none());
        assert_eq!(body.text().await.unwrap(), "hello");
    }

    #[test]
    fn error_carries_response_details() {
        let err = response().create_error("Nope.");
        assert_eq!(err.status(), Some(StatusCode::CREATED));
        assert_eq!(err.content_length(), Some(5));
    }

    #[test]
    fn json_response_map_keeps_metadata() {
        let json = JsonWebServiceResponse::from_parts(&response(), Some(2)).map(|n| n * 21);
        assert_eq!(json.status(), StatusCode::CREATED);
        assert_eq!(json.value(), Some(&42));
        assert!(json.content().is_none());
    }

    #[test]
    fn json_response_error_carries_undecoded_content() {
        let json = JsonWebServiceResponse::<()>::from_parts(&response(), None)
            .with_content(Bytes::from_static(b"<h1>Unavailable</h1>"));
        assert_eq!(json.content().unwrap(), "<h1>Unavailable</h1>");
        let err = json.create_error("Service unavailable.");
        assert_eq!(err.status(), Some(StatusCode::CREATED));
        assert!(err.detailed().ends_with("\ncontent: <h1>Unavailable</h1>"));
    }
}
