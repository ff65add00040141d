//! Hyper-based HTTP transport.
//!
//! [`HyperTransportFactory`] owns a pooled hyper client and hands out
//! [`HyperTransport`]s configured for a single call.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use http::header::{
    ACCEPT_ENCODING, AUTHORIZATION, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, COOKIE,
    HeaderValue, LOCATION, SET_COOKIE,
};
use http::{Method, Request, Response, StatusCode, Uri};
use hyper::body::Incoming;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::{TokioExecutor, TokioTimer};
use rustls::ClientConfig;
use url::Url;
use webrequests_core::{ACCEPT_ENCODING as SUPPORTED_ENCODINGS, ContentEncoding};

use super::body::{RequestBody, ResponseBody};
use super::connector::{build_https_connector, danger_accept_invalid_certs_config, default_tls_config};
use super::{ResponseUri, Transport, TransportError, TransportFactory, TransportOptions};

/// Type alias for the hyper client with HTTPS connector.
type HyperClient = Client<HttpsConnector<HttpConnector>, RequestBody>;

/// Default limit on followed redirects.
const DEFAULT_MAX_REDIRECTS: usize = 10;

/// HTTP transport for one call.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct HyperTransport {
    client: HyperClient,
    options: TransportOptions,
    max_redirects: usize,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport")
            .field("options", &self.options)
            .field("max_redirects", &self.max_redirects)
            .finish_non_exhaustive()
    }
}

impl HyperTransport {
    /// Send a request, following redirects when enabled.
    ///
    /// The timeout, if any, covers the whole redirect chain up to the
    /// final response headers. The body is returned unread.
    pub async fn request(
        &self,
        request: Request<RequestBody>,
    ) -> Result<Response<ResponseBody>, TransportError> {
        match self.options.timeout {
            Some(limit) => tokio::time::timeout(limit, self.follow(request))
                .await
                .map_err(|_| TransportError::Timeout)?,
            None => self.follow(request).await,
        }
    }

    async fn follow(
        &self,
        mut request: Request<RequestBody>,
    ) -> Result<Response<ResponseBody>, TransportError> {
        let mut redirects = 0;
        loop {
            let url = to_url(request.uri())?;
            self.prepare(&mut request, &url);

            // Keep what is needed to re-issue the request after a redirect.
            let replay = self.options.follow_redirects.then(|| {
                (
                    request.method().clone(),
                    request.headers().clone(),
                    request.body().try_clone(),
                )
            });

            tracing::debug!(method = %request.method(), uri = %url, "sending request");
            let response = self
                .client
                .request(request)
                .await
                .map_err(|e| TransportError::Request(Box::new(e)))?;

            let location = match replay {
                Some(_) if is_redirect(response.status()) => response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned),
                _ => None,
            };
            let (Some(location), Some((method, headers, body))) = (location, replay) else {
                return Ok(self.finish(response, url));
            };

            let status = response.status();
            let Some((method, body)) = redirect_method(status, method, body) else {
                // The body was streamed and cannot be sent again.
                return Ok(self.finish(response, url));
            };
            if redirects == self.max_redirects {
                return Err(TransportError::TooManyRedirects(self.max_redirects));
            }
            redirects += 1;

            self.store_cookies(&url, response.headers());
            let next = url
                .join(&location)
                .map_err(|_| TransportError::InvalidRedirect(location.clone()))?;
            if next.scheme() != "http" && next.scheme() != "https" {
                return Err(TransportError::InvalidRedirect(location));
            }
            tracing::debug!(status = status.as_u16(), from = %url, to = %next, "following redirect");

            let mut headers = headers;
            if next.host_str() != url.host_str() {
                headers.remove(AUTHORIZATION);
            }
            if matches!(body, RequestBody::Empty) {
                headers.remove(CONTENT_TYPE);
                headers.remove(CONTENT_LENGTH);
            }

            let mut builder = Request::builder().method(method).uri(to_uri(&next)?);
            if let Some(map) = builder.headers_mut() {
                *map = headers;
            }
            request = builder.body(body)?;
        }
    }

    fn prepare(&self, request: &mut Request<RequestBody>, url: &Url) {
        let headers = request.headers_mut();
        headers.remove(COOKIE);
        if let Some(store) = &self.options.cookie_store {
            if let Some(value) = store
                .cookie_header(url)
                .and_then(|cookie| HeaderValue::from_str(&cookie).ok())
            {
                headers.insert(COOKIE, value);
            }
        }
        if self.options.decompress && !headers.contains_key(ACCEPT_ENCODING) {
            headers.insert(ACCEPT_ENCODING, HeaderValue::from_static(SUPPORTED_ENCODINGS));
        }
    }

    fn store_cookies(&self, url: &Url, headers: &http::HeaderMap) {
        let Some(store) = &self.options.cookie_store else {
            return;
        };
        for value in headers.get_all(SET_COOKIE) {
            let Ok(value) = value.to_str() else {
                continue;
            };
            if let Err(e) = store.set_cookie(url, value) {
                tracing::warn!(uri = %url, error = %e, "ignoring cookie from redirect");
            }
        }
    }

    fn finish(&self, response: Response<Incoming>, url: Url) -> Response<ResponseBody> {
        let (mut parts, body) = response.into_parts();
        parts.extensions.insert(ResponseUri(url));
        let mut body = ResponseBody::new(body);
        if self.options.decompress {
            let encoding = parts
                .headers
                .get(CONTENT_ENCODING)
                .and_then(|v| v.to_str().ok());
            if let Some(decoder) = ContentEncoding::from_header(encoding).and_then(|e| e.decoder()) {
                parts.headers.remove(CONTENT_ENCODING);
                parts.headers.remove(CONTENT_LENGTH);
                body = body.with_decoder(decoder);
            }
        }
        Response::from_parts(parts, body)
    }
}

impl Transport for HyperTransport {
    fn send(
        &self,
        request: Request<RequestBody>,
    ) -> BoxFuture<'_, Result<Response<ResponseBody>, TransportError>> {
        Box::pin(self.request(request))
    }
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

/// Method and body for the follow-up request, or `None` when the original
/// body must be resent but cannot be.
fn redirect_method(
    status: StatusCode,
    method: Method,
    body: Option<RequestBody>,
) -> Option<(Method, RequestBody)> {
    let becomes_get = match status {
        StatusCode::SEE_OTHER => method != Method::HEAD,
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND => method == Method::POST,
        _ => false,
    };
    if becomes_get {
        return Some((Method::GET, RequestBody::Empty));
    }
    body.map(|body| (method, body))
}

fn to_url(uri: &Uri) -> Result<Url, TransportError> {
    Url::parse(&uri.to_string()).map_err(|e| TransportError::InvalidRedirect(e.to_string()))
}

fn to_uri(url: &Url) -> Result<Uri, TransportError> {
    url.as_str()
        .parse::<Uri>()
        .map_err(|e| TransportError::InvalidRequest(e.into()))
}

/// Produces [`HyperTransport`]s sharing one connection pool.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use std::time::Duration;
/// use webrequests::transport::HyperTransportFactory;
///
/// let factory = HyperTransportFactory::builder()
///     .pool_idle_timeout(Duration::from_secs(60))
///     .build()?;
/// let settings = RequestSettings::builder()
///     .transport_factory(Arc::new(factory))
///     .build()?;
/// ```
#[derive(Clone)]
pub struct HyperTransportFactory {
    client: HyperClient,
    max_redirects: usize,
}

impl std::fmt::Debug for HyperTransportFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransportFactory")
            .field("max_redirects", &self.max_redirects)
            .finish_non_exhaustive()
    }
}

impl HyperTransportFactory {
    pub fn builder() -> HyperTransportFactoryBuilder {
        HyperTransportFactoryBuilder::new()
    }

    /// A factory with default settings.
    pub fn new() -> Result<Self, TransportError> {
        Self::builder().build()
    }

    /// A transport configured for one call.
    pub fn transport(&self, options: &TransportOptions) -> HyperTransport {
        HyperTransport {
            client: self.client.clone(),
            options: options.clone(),
            max_redirects: self.max_redirects,
        }
    }
}

impl TransportFactory for HyperTransportFactory {
    fn create_transport(
        &self,
        options: &TransportOptions,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        Ok(Arc::new(self.transport(options)))
    }
}

/// Builder for [`HyperTransportFactory`].
pub struct HyperTransportFactoryBuilder {
    /// Custom TLS configuration.
    tls_config: Option<ClientConfig>,
    /// Connection pool idle timeout.
    pool_idle_timeout: Option<Duration>,
    /// Maximum idle connections per host.
    pool_max_idle_per_host: usize,
    /// Redirects followed before giving up.
    max_redirects: usize,
    /// Whether to accept invalid certificates (dangerous!).
    danger_accept_invalid_certs: bool,
}

impl Default for HyperTransportFactoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperTransportFactoryBuilder {
    pub fn new() -> Self {
        Self {
            tls_config: None,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            danger_accept_invalid_certs: false,
        }
    }

    /// Use a custom TLS configuration (custom roots, client certificates).
    pub fn tls_config(mut self, config: ClientConfig) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// Close pooled connections idle for longer than `timeout`.
    ///
    /// Default: 90 seconds.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = Some(timeout);
        self
    }

    /// Keep idle connections forever.
    pub fn pool_idle_timeout_none(mut self) -> Self {
        self.pool_idle_timeout = None;
        self
    }

    /// Default: 32.
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = max;
        self
    }

    /// Default: 10.
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }

    /// Accept invalid TLS certificates.
    ///
    /// # Warning
    ///
    /// For development and testing only.
    pub fn danger_accept_invalid_certs(mut self) -> Self {
        self.danger_accept_invalid_certs = true;
        self
    }

    pub fn build(self) -> Result<HyperTransportFactory, TransportError> {
        let tls_config = if self.danger_accept_invalid_certs {
            danger_accept_invalid_certs_config()?
        } else {
            match self.tls_config {
                Some(config) => config,
                None => default_tls_config()?,
            }
        };

        let mut builder = Client::builder(TokioExecutor::new());

        // Required for pool_idle_timeout to work
        builder.pool_timer(TokioTimer::new());
        if let Some(timeout) = self.pool_idle_timeout {
            builder.pool_idle_timeout(timeout);
        }
        builder.pool_max_idle_per_host(self.pool_max_idle_per_host);

        Ok(HyperTransportFactory {
            client: builder.build(build_https_connector(tls_config)),
            max_redirects: self.max_redirects,
        })
    }
}

impl std::fmt::Debug for HyperTransportFactoryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransportFactoryBuilder")
            .field("tls_config", &self.tls_config.is_some())
            .field("pool_idle_timeout", &self.pool_idle_timeout)
            .field("pool_max_idle_per_host", &self.pool_max_idle_per_host)
            .field("max_redirects", &self.max_redirects)
            .field("danger_accept_invalid_certs", &self.danger_accept_invalid_certs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let builder = HyperTransportFactoryBuilder::new();
        assert_eq!(builder.pool_max_idle_per_host, 32);
        assert_eq!(builder.pool_idle_timeout, Some(Duration::from_secs(90)));
        assert_eq!(builder.max_redirects, 10);
        assert!(!builder.danger_accept_invalid_certs);
    }

    #[test]
    fn builder_pool_settings() {
        let builder = HyperTransportFactoryBuilder::new()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(10)
            .max_redirects(3);
        assert_eq!(builder.pool_idle_timeout, Some(Duration::from_secs(60)));
        assert_eq!(builder.pool_max_idle_per_host, 10);
        assert_eq!(builder.max_redirects, 3);

        let builder = builder.pool_idle_timeout_none();
        assert!(builder.pool_idle_timeout.is_none());
    }

    #[test]
    fn redirect_statuses() {
        assert!(is_redirect(StatusCode::MOVED_PERMANENTLY));
        assert!(is_redirect(StatusCode::FOUND));
        assert!(is_redirect(StatusCode::SEE_OTHER));
        assert!(is_redirect(StatusCode::TEMPORARY_REDIRECT));
        assert!(is_redirect(StatusCode::PERMANENT_REDIRECT));
        assert!(!is_redirect(StatusCode::NOT_MODIFIED));
        assert!(!is_redirect(StatusCode::OK));
    }

    #[test]
    fn see_other_switches_to_get() {
        let (method, body) =
            redirect_method(StatusCode::SEE_OTHER, Method::PUT, Some(RequestBody::full("x")))
                .unwrap();
        assert_eq!(method, Method::GET);
        assert!(matches!(body, RequestBody::Empty));
    }

    #[test]
    fn found_after_post_switches_to_get() {
        let (method, _) =
            redirect_method(StatusCode::FOUND, Method::POST, Some(RequestBody::full("x"))).unwrap();
        assert_eq!(method, Method::GET);
    }

    #[test]
    fn temporary_redirect_keeps_method_and_body() {
        let (method, body) = redirect_method(
            StatusCode::TEMPORARY_REDIRECT,
            Method::POST,
            Some(RequestBody::full("payload")),
        )
        .unwrap();
        assert_eq!(method, Method::POST);
        assert_eq!(body.as_bytes().unwrap(), "payload");
    }

    #[test]
    fn streamed_body_cannot_be_redirected() {
        assert!(redirect_method(StatusCode::TEMPORARY_REDIRECT, Method::POST, None).is_none());
    }

    #[cfg(any(feature = "tls-ring", feature = "tls-aws-lc"))]
    #[tokio::test]
    async fn factory_creates_transports() {
        let factory = HyperTransportFactory::new().unwrap();
        let options = TransportOptions {
            timeout: Some(Duration::from_secs(5)),
            follow_redirects: true,
            ..TransportOptions::default()
        };
        let transport = factory.transport(&options);
        assert_eq!(transport.options.timeout, Some(Duration::from_secs(5)));
        assert_eq!(transport.max_redirects, 10);
        assert!(factory.create_transport(&options).is_ok());
    }
}
