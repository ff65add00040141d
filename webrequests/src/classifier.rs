//! Status-code classification.
//!
//! [`StatusClassifier`] accepts a set of status codes and fails the call
//! for anything else. An accepted response becomes a
//! [`WebServiceResponse`] that owns the unread body, optionally turned
//! into something richer by a [`ResponseFactory`].

use std::marker::PhantomData;

use futures::future::BoxFuture;
use http::StatusCode;
use serde::de::DeserializeOwned;
use webrequests_core::{content_preview, from_json_slice, is_json_content_type};

use crate::context::ResponseHandlingContext;
use crate::engine::ResponseHandler;
use crate::error::ClientError;
use crate::response::{JsonWebServiceResponse, WebServiceResponse};

const DEFAULT_ACCEPTED: [StatusCode; 2] = [StatusCode::OK, StatusCode::CREATED];

const DEFAULT_ACCEPTED_WITH_REDIRECTS: [StatusCode; 6] = [
    StatusCode::OK,
    StatusCode::CREATED,
    StatusCode::MOVED_PERMANENTLY,
    StatusCode::FOUND,
    StatusCode::SEE_OTHER,
    StatusCode::TEMPORARY_REDIRECT,
];

/// Which status codes count as success.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AcceptedStatusCodes {
    /// `200 OK` and `201 Created`; redirect codes too when the request does
    /// not follow redirects.
    #[default]
    Default,
    Custom(Vec<StatusCode>),
    /// Every status is accepted.
    Any,
}

impl AcceptedStatusCodes {
    pub fn accepts(&self, status: StatusCode, redirects_disabled: bool) -> bool {
        match self {
            AcceptedStatusCodes::Default if redirects_disabled => {
                DEFAULT_ACCEPTED_WITH_REDIRECTS.contains(&status)
            }
            AcceptedStatusCodes::Default => DEFAULT_ACCEPTED.contains(&status),
            AcceptedStatusCodes::Custom(codes) => codes.contains(&status),
            AcceptedStatusCodes::Any => true,
        }
    }
}

/// Turns an accepted [`WebServiceResponse`] into the call's result.
///
/// `()` returns the response unchanged.
pub trait ResponseFactory: Send + Sync {
    type Output: Send;

    fn create(&self, response: WebServiceResponse)
    -> BoxFuture<'_, Result<Self::Output, ClientError>>;
}

impl ResponseFactory for () {
    type Output = WebServiceResponse;

    fn create(
        &self,
        response: WebServiceResponse,
    ) -> BoxFuture<'_, Result<WebServiceResponse, ClientError>> {
        Box::pin(async move { Ok(response) })
    }
}

/// Accept-list response handler.
///
/// # Example
///
/// ```ignore
/// let response = execute(request, &StatusClassifier::new()).await?;
/// let body = response.into_content();
/// ```
#[derive(Clone, Debug, Default)]
pub struct StatusClassifier<F = ()> {
    accepted: AcceptedStatusCodes,
    factory: F,
}

impl StatusClassifier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<F> StatusClassifier<F> {
    /// Accept exactly `codes`.
    pub fn with_accepted_status_codes<I>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = StatusCode>,
    {
        self.accepted = AcceptedStatusCodes::Custom(codes.into_iter().collect());
        self
    }

    pub fn accept_any_status(mut self) -> Self {
        self.accepted = AcceptedStatusCodes::Any;
        self
    }

    /// Replace the response factory.
    pub fn with_factory<G: ResponseFactory>(self, factory: G) -> StatusClassifier<G> {
        StatusClassifier {
            accepted: self.accepted,
            factory,
        }
    }

    pub fn accepted(&self) -> &AcceptedStatusCodes {
        &self.accepted
    }
}

impl<F: ResponseFactory> ResponseHandler for StatusClassifier<F> {
    type Output = F::Output;

    fn handle<'a>(
        &'a self,
        ctx: &'a mut ResponseHandlingContext,
    ) -> BoxFuture<'a, Result<Option<F::Output>, ClientError>> {
        Box::pin(async move {
            if !self.accepted.accepts(ctx.status(), ctx.redirects_disabled()) {
                let error = ctx.create_error_with_preview("Unexpected status code.").await;
                return Err(error.into());
            }
            let content = ctx.detach();
            let response = WebServiceResponse::new(
                ctx.method().clone(),
                ctx.uri().clone(),
                ctx.status(),
                ctx.headers().clone(),
                content,
            );
            Ok(Some(self.factory.create(response).await?))
        })
    }
}

/// Decodes accepted responses as JSON.
///
/// A `200 OK` must carry JSON of the expected shape. Other statuses may
/// carry no content, non-JSON content, or JSON of another shape; the value
/// is then absent and any content read is kept on the result. Malformed
/// JSON always fails.
pub struct JsonResponseFactory<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonResponseFactory<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonResponseFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonResponseFactory<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for JsonResponseFactory<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonResponseFactory")
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> ResponseFactory for JsonResponseFactory<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Output = JsonWebServiceResponse<T>;

    fn create(
        &self,
        mut response: WebServiceResponse,
    ) -> BoxFuture<'_, Result<JsonWebServiceResponse<T>, ClientError>> {
        Box::pin(async move {
            let status = response.status();
            let is_ok = status == StatusCode::OK;
            let content = match response.take_content() {
                Some(content) if response.content_length() != Some(0) => content,
                _ => {
                    if is_ok {
                        return Err(response
                            .create_error("Web service response was OK but no content.")
                            .into());
                    }
                    return Ok(JsonWebServiceResponse::from_parts(&response, None));
                }
            };

            let content_type = response.content_type().unwrap_or_default().to_owned();
            if !is_json_content_type(&content_type) {
                if is_ok {
                    let message = format!("Response content type is not JSON: {content_type}");
                    let preview = content.text().await.ok().map(|text| content_preview(&text));
                    return Err(response
                        .create_error(&message)
                        .with_content_preview(preview)
                        .into());
                }
                let bytes = content.bytes().await?;
                return Ok(JsonWebServiceResponse::from_parts(&response, None).with_content(bytes));
            }

            let bytes = content.bytes().await?;
            if bytes.is_empty() {
                return Err(response.create_error("JSON response is empty.").into());
            }
            match from_json_slice::<T>(&bytes) {
                Ok(value) => Ok(JsonWebServiceResponse::from_parts(&response, Some(value))),
                Err(e) if e.is_mismatch() && !status.is_success() => {
                    tracing::debug!(status = status.as_u16(), error = %e, "ignoring JSON of unexpected shape");
                    Ok(JsonWebServiceResponse::from_parts(&response, None).with_content(bytes))
                }
                Err(e) => {
                    let preview = content_preview(&String::from_utf8_lossy(&bytes));
                    Err(response
                        .create_error(&e.to_string())
                        .with_content_preview(Some(preview))
                        .with_source(e)
                        .into())
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
    use http::{Method, Response};
    use serde::Deserialize;
    use tokio_util::sync::CancellationToken;
    use url::Url;

    use crate::transport::ResponseBody;

    fn context(
        status: StatusCode,
        content_type: Option<&str>,
        body: &'static str,
        redirects_disabled: bool,
    ) -> ResponseHandlingContext {
        let mut builder = Response::builder()
            .status(status)
            .header(CONTENT_LENGTH, body.len().to_string());
        if let Some(content_type) = content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        ResponseHandlingContext::new(
            Method::GET,
            Url::parse("http://localhost/widgets/1").unwrap(),
            redirects_disabled,
            builder.body(ResponseBody::from_bytes(body)).unwrap(),
            CancellationToken::new(),
        )
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Widget {
        name: String,
    }

    #[test]
    fn default_accepts_ok_and_created() {
        let accepted = AcceptedStatusCodes::Default;
        assert!(accepted.accepts(StatusCode::OK, false));
        assert!(accepted.accepts(StatusCode::CREATED, false));
        assert!(!accepted.accepts(StatusCode::NO_CONTENT, false));
        assert!(!accepted.accepts(StatusCode::FOUND, false));
    }

    #[test]
    fn default_widens_when_redirects_are_disabled() {
        let accepted = AcceptedStatusCodes::Default;
        for status in [
            StatusCode::MOVED_PERMANENTLY,
            StatusCode::FOUND,
            StatusCode::SEE_OTHER,
            StatusCode::TEMPORARY_REDIRECT,
        ] {
            assert!(accepted.accepts(status, true));
        }
        assert!(!accepted.accepts(StatusCode::PERMANENT_REDIRECT, true));
    }

    #[test]
    fn custom_list_is_not_widened() {
        let accepted = AcceptedStatusCodes::Custom(vec![StatusCode::OK]);
        assert!(!accepted.accepts(StatusCode::FOUND, true));
        assert!(AcceptedStatusCodes::Any.accepts(StatusCode::IM_A_TEAPOT, false));
    }

    #[tokio::test]
    async fn accepted_response_owns_the_body() {
        let mut ctx = context(StatusCode::OK, Some("text/plain"), "hello", false);
        let response = StatusClassifier::new().handle(&mut ctx).await.unwrap().unwrap();
        assert!(ctx.is_detached());
        assert!(!ctx.is_content_read());
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.into_content().unwrap().text().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn rejected_status_consumes_body_for_preview() {
        let mut ctx = context(StatusCode::NOT_FOUND, Some("text/plain"), "missing", false);
        let err = StatusClassifier::new().handle(&mut ctx).await.unwrap_err();
        let fault = err.as_service().unwrap();
        assert_eq!(fault.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(fault.content_preview(), Some("missing"));
        assert!(ctx.read_bytes().await.is_err());
    }

    #[tokio::test]
    async fn json_factory_decodes_ok() {
        let classifier = StatusClassifier::new().with_factory(JsonResponseFactory::<Widget>::new());
        let mut ctx = context(StatusCode::OK, Some("application/json"), r#"{"name":"gear"}"#, false);
        let response = classifier.handle(&mut ctx).await.unwrap().unwrap();
        assert_eq!(response.value(), Some(&Widget { name: "gear".into() }));
    }

    #[tokio::test]
    async fn json_factory_requires_content_for_ok() {
        let classifier = StatusClassifier::new().with_factory(JsonResponseFactory::<Widget>::new());
        let mut ctx = context(StatusCode::OK, None, "", false);
        let err = classifier.handle(&mut ctx).await.unwrap_err();
        assert_eq!(
            err.as_service().unwrap().message(),
            "Web service response was OK but no content."
        );
    }

    #[tokio::test]
    async fn json_factory_rejects_non_json_ok() {
        let classifier = StatusClassifier::new().with_factory(JsonResponseFactory::<Widget>::new());
        let mut ctx = context(StatusCode::OK, Some("text/html"), "<p>hi</p>", false);
        let err = classifier.handle(&mut ctx).await.unwrap_err();
        let fault = err.as_service().unwrap();
        assert_eq!(fault.message(), "Response content type is not JSON: text/html");
        assert_eq!(fault.content_preview(), Some("<p>hi</p>"));
    }

    #[tokio::test]
    async fn json_factory_rejects_empty_json() {
        let classifier = StatusClassifier::new()
            .accept_any_status()
            .with_factory(JsonResponseFactory::<Widget>::new());
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "application/json")
            .body(ResponseBody::empty())
            .unwrap();
        let mut ctx = ResponseHandlingContext::new(
            Method::GET,
            Url::parse("http://localhost/").unwrap(),
            false,
            response,
            CancellationToken::new(),
        );
        let err = classifier.handle(&mut ctx).await.unwrap_err();
        assert_eq!(err.as_service().unwrap().message(), "JSON response is empty.");
    }

    #[tokio::test]
    async fn json_factory_tolerates_shape_mismatch_on_error_status() {
        let classifier = StatusClassifier::new()
            .accept_any_status()
            .with_factory(JsonResponseFactory::<Widget>::new());
        let mut ctx = context(
            StatusCode::BAD_REQUEST,
            Some("application/problem+json"),
            r#"{"error":"bad"}"#,
            false,
        );
        let response = classifier.handle(&mut ctx).await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.value().is_none());
        assert_eq!(response.content().unwrap(), r#"{"error":"bad"}"#);
    }

    #[tokio::test]
    async fn json_factory_keeps_non_json_error_content() {
        let classifier = StatusClassifier::new()
            .accept_any_status()
            .with_factory(JsonResponseFactory::<Widget>::new());
        let mut ctx = context(
            StatusCode::SERVICE_UNAVAILABLE,
            Some("text/html"),
            "<h1>Down for maintenance</h1>",
            false,
        );
        let response = classifier.handle(&mut ctx).await.unwrap().unwrap();
        assert!(response.value().is_none());
        assert_eq!(response.content_type(), Some("text/html"));
        assert_eq!(response.content().unwrap(), "<h1>Down for maintenance</h1>");
    }

    #[tokio::test]
    async fn json_factory_fails_on_shape_mismatch_for_ok() {
        let classifier = StatusClassifier::new().with_factory(JsonResponseFactory::<Widget>::new());
        let mut ctx = context(StatusCode::OK, Some("application/json"), r#"{"error":"bad"}"#, false);
        let err = classifier.handle(&mut ctx).await.unwrap_err();
        let fault = err.as_service().unwrap();
        assert!(fault.message().starts_with("Response JSON could not be deserialized to"));
    }

    #[tokio::test]
    async fn json_factory_always_fails_on_malformed_json() {
        let classifier = StatusClassifier::new()
            .accept_any_status()
            .with_factory(JsonResponseFactory::<Widget>::new());
        let mut ctx = context(
            StatusCode::BAD_REQUEST,
            Some("application/json"),
            "{not json",
            false,
        );
        let err = classifier.handle(&mut ctx).await.unwrap_err();
        assert!(
            err.as_service()
                .unwrap()
                .message()
                .starts_with("Response is not valid JSON")
        );
    }
}
