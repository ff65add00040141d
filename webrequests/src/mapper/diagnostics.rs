//! Response details kept by mapped results for later faults.

use futures::future::BoxFuture;
use http::{HeaderMap, Method, StatusCode};
use url::Url;
use webrequests_core::WebServiceError;

use super::{AutoResponse, ResponseFields};
use crate::context::ResponseHandlingContext;
use crate::error::ClientError;

/// Snapshot of a handled response.
///
/// Embed it in a mapped result and fill it from
/// [`AutoResponse::on_handled`] to build faults after the call returned.
#[derive(Clone, Debug, Default)]
pub struct ResponseDiagnostics {
    request_method: Option<Method>,
    request_uri: Option<Url>,
    status: Option<StatusCode>,
    headers: Option<HeaderMap>,
    content_preview: Option<String>,
}

impl ResponseDiagnostics {
    /// Record the response. Reads a content preview when the body is
    /// still unread.
    pub async fn capture(&mut self, ctx: &mut ResponseHandlingContext) {
        self.request_method = Some(ctx.method().clone());
        self.request_uri = Some(ctx.uri().clone());
        self.status = Some(ctx.status());
        self.headers = Some(ctx.headers().clone());
        self.content_preview = ctx.read_preview().await;
    }

    pub fn request_method(&self) -> Option<&Method> {
        self.request_method.as_ref()
    }

    pub fn request_uri(&self) -> Option<&Url> {
        self.request_uri.as_ref()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn headers(&self) -> Option<&HeaderMap> {
        self.headers.as_ref()
    }

    pub fn content_preview(&self) -> Option<&str> {
        self.content_preview.as_deref()
    }

    /// A fault carrying the captured details.
    pub fn create_error(&self, message: &str) -> WebServiceError {
        let mut error = WebServiceError::new(message);
        if let (Some(method), Some(uri)) = (&self.request_method, &self.request_uri) {
            error = error.with_request(method.clone(), uri.clone());
        }
        if let Some(status) = self.status {
            error = error.with_response(status, self.headers.clone().unwrap_or_default());
        }
        error.with_content_preview(self.content_preview.clone())
    }
}

/// The value picked by `get`, or a fault when it is absent.
///
/// ```ignore
/// let widget = expected(&response, |r| r.ok.as_ref())?;
/// ```
pub fn expected<'a, R, V>(
    response: &'a R,
    get: impl FnOnce(&'a R) -> Option<V>,
) -> Result<V, WebServiceError>
where
    R: AutoResponse,
{
    get(response).ok_or_else(|| {
        const MESSAGE: &str = "Unexpected response encountered.";
        match response.diagnostics() {
            Some(diagnostics) => diagnostics.create_error(MESSAGE),
            None => WebServiceError::new(MESSAGE),
        }
    })
}

/// Mapped result that only records the status code and headers.
#[derive(Debug, Default)]
pub struct GenericStatusCodeResponse {
    pub status_code: StatusCode,
    pub headers: HeaderMap,
    pub diagnostics: ResponseDiagnostics,
}

impl AutoResponse for GenericStatusCodeResponse {
    fn fields() -> &'static ResponseFields<Self> {
        static FIELDS: std::sync::OnceLock<ResponseFields<GenericStatusCodeResponse>> =
            std::sync::OnceLock::new();
        FIELDS.get_or_init(|| {
            ResponseFields::new()
                .status_code(|r: &mut GenericStatusCodeResponse, status| r.status_code = status)
        })
    }

    fn on_handled<'a>(
        &'a mut self,
        ctx: &'a mut ResponseHandlingContext,
        _status_handled: bool,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        Box::pin(async move {
            self.headers = ctx.headers().clone();
            self.diagnostics.capture(ctx).await;
            Ok(())
        })
    }

    fn diagnostics(&self) -> Option<&ResponseDiagnostics> {
        Some(&self.diagnostics)
    }
}
