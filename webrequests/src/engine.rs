//! Request execution.
//!
//! [`execute`] turns a [`RequestDescription`] into an HTTP call, hands the
//! response to a [`ResponseHandler`], and normalizes failures:
//!
//! - transport failures while sending become `Error building request.`
//! - transport and I/O failures while handling become `Error handling response.`
//! - cookie store failures become `Failure setting cookie.`
//! - cancellation is reported as [`ClientError::Canceled`], never as a fault
//! - any other handler error propagates unchanged

use std::sync::Arc;

use futures::future::BoxFuture;
use http::HeaderMap;
use http::header::SET_COOKIE;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use url::Url;
use webrequests_core::{CookieStore, WebServiceError};

use crate::context::ResponseHandlingContext;
use crate::error::{BoxError, ClientError};
use crate::request::RequestDescription;
use crate::settings::{RequestInfo, RequestSettings};
use crate::transport::TransportOptions;

/// Turns a response into a typed result.
///
/// Returning `Ok(None)` means the response was not handled; the engine then
/// fails the call.
pub trait ResponseHandler: Send + Sync {
    type Output: Send;

    fn handle<'a>(
        &'a self,
        ctx: &'a mut ResponseHandlingContext,
    ) -> BoxFuture<'a, Result<Option<Self::Output>, ClientError>>;
}

impl<H: ResponseHandler + ?Sized> ResponseHandler for Arc<H> {
    type Output = H::Output;

    fn handle<'a>(
        &'a self,
        ctx: &'a mut ResponseHandlingContext,
    ) -> BoxFuture<'a, Result<Option<Self::Output>, ClientError>> {
        (**self).handle(ctx)
    }
}

/// Send `request` and handle the response with `handler`.
pub async fn execute<H>(request: RequestDescription, handler: &H) -> Result<H::Output, ClientError>
where
    H: ResponseHandler + ?Sized,
{
    execute_with_cancellation(request, handler, CancellationToken::new()).await
}

/// Like [`execute`], stopping early when `cancellation` fires.
pub async fn execute_with_cancellation<H>(
    request: RequestDescription,
    handler: &H,
    cancellation: CancellationToken,
) -> Result<H::Output, ClientError>
where
    H: ResponseHandler + ?Sized,
{
    let settings = request.settings.clone().unwrap_or_default();
    let span = tracing::info_span!(
        "webrequests.execute",
        method = %request.method,
        uri = %request.uri()
    );
    let result = run(request, &settings, handler, cancellation)
        .instrument(span)
        .await;
    if let Err(ClientError::Service(error)) = &result {
        settings.report_error(error);
    }
    result
}

async fn run<H>(
    mut request: RequestDescription,
    settings: &RequestSettings,
    handler: &H,
    cancellation: CancellationToken,
) -> Result<H::Output, ClientError>
where
    H: ResponseHandler + ?Sized,
{
    let method = request.method.clone();
    let uri = request.uri().clone();
    let build_error = |source: ClientError| -> ClientError {
        if source.should_wrap() {
            WebServiceError::request("Error building request.", &method, &uri)
                .with_source(source)
                .into()
        } else {
            source
        }
    };

    let options = TransportOptions {
        timeout: request.effective_timeout(settings),
        follow_redirects: !request.redirects_disabled,
        cookie_store: settings.cookie_store().cloned(),
        decompress: true,
    };
    let transport = settings
        .transport_factory()
        .and_then(|factory| factory.create_transport(&options))
        .map_err(|e| build_error(e.into()))?;
    let outgoing = request.to_http_request(settings).map_err(&build_error)?;

    let _trace = settings.start_trace(&RequestInfo {
        method: method.clone(),
        uri: uri.clone(),
    });

    let response = tokio::select! {
        biased;
        _ = cancellation.cancelled() => return Err(ClientError::Canceled),
        response = transport.send(outgoing) => response,
    };
    let response = response.map_err(|e| build_error(e.into()))?;
    tracing::debug!(status = response.status().as_u16(), "received response");

    let mut ctx = ResponseHandlingContext::new(
        method,
        uri,
        request.redirects_disabled,
        response,
        cancellation,
    );
    let result = match handle(handler, &mut ctx, settings).await {
        Err(e) if e.should_wrap() => Err(ctx
            .create_error_with_preview("Error handling response.")
            .await
            .with_source(e)
            .into()),
        other => other,
    };
    ctx.finish();
    result
}

async fn handle<H>(
    handler: &H,
    ctx: &mut ResponseHandlingContext,
    settings: &RequestSettings,
) -> Result<H::Output, ClientError>
where
    H: ResponseHandler + ?Sized,
{
    let handled = handler.handle(ctx).await?;
    let Some(output) = handled else {
        if ctx.cancellation_token().is_cancelled() {
            return Err(ClientError::Canceled);
        }
        return Err(
            WebServiceError::request("Web response not handled.", ctx.method(), ctx.uri()).into(),
        );
    };
    if ctx.cancellation_token().is_cancelled() {
        return Err(ClientError::Canceled);
    }

    if let Some(store) = settings.cookie_store() {
        if let Err(source) = store_cookies(store, ctx.uri(), ctx.headers()) {
            return Err(WebServiceError::request("Failure setting cookie.", ctx.method(), ctx.uri())
                .with_source(source)
                .into());
        }
    }
    Ok(output)
}

/// Store the response's `Set-Cookie` values against the URI that sent them.
fn store_cookies(store: &CookieStore, uri: &Url, headers: &HeaderMap) -> Result<(), BoxError> {
    let values = headers
        .get_all(SET_COOKIE)
        .iter()
        .map(|value| value.to_str())
        .collect::<Result<Vec<_>, _>>()?;
    if values.is_empty() {
        return Ok(());
    }
    let count = values.len();
    store.set_cookies(uri, values)?;
    tracing::debug!(uri = %uri, count, "stored cookies");
    Ok(())
}
