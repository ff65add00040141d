//! Shared request configuration.
//!
//! [`RequestSettings`] is built once with [`RequestSettings::builder`] and
//! shared by many requests as `Arc<RequestSettings>`. The engine only reads
//! it.

use std::any::Any;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use url::Url;
use webrequests_core::{CookieStore, WebServiceError};

use crate::transport::{HyperTransportFactory, TransportError, TransportFactory};

/// Method and URI of an outgoing request, passed to settings callbacks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestInfo {
    pub method: Method,
    pub uri: Url,
}

/// Computes an `Authorization` header value for a request.
pub type AuthorizationProvider = Arc<dyn Fn(&RequestInfo) -> Option<String> + Send + Sync>;

/// Observes every fault before it is returned to the caller.
pub type ErrorReporter = Arc<dyn Fn(&WebServiceError) + Send + Sync>;

/// Value held for the duration of a call; dropped when the call ends.
pub type TraceGuard = Box<dyn Any + Send>;

/// Starts a trace around a call.
pub type StartTrace = Arc<dyn Fn(&RequestInfo) -> Option<TraceGuard> + Send + Sync>;

/// Errors raised by [`RequestSettingsBuilder::build`].
#[derive(Debug, thiserror::Error)]
pub enum SettingsBuildError {
    #[error("invalid header name: {0}")]
    InvalidHeaderName(String),

    #[error("invalid value for header {name}")]
    InvalidHeaderValue { name: String },
}

/// Configuration shared across requests.
#[derive(Clone, Default)]
pub struct RequestSettings {
    user_agent: Option<HeaderValue>,
    default_headers: HeaderMap,
    default_timeout: Option<Duration>,
    cookie_store: Option<Arc<CookieStore>>,
    authorization: Option<HeaderValue>,
    authorization_provider: Option<AuthorizationProvider>,
    disable_100_continue: bool,
    disable_keep_alive: bool,
    host: Option<HeaderValue>,
    error_reporter: Option<ErrorReporter>,
    start_trace: Option<StartTrace>,
    transport_factory: Option<Arc<dyn TransportFactory>>,
    default_factory: OnceLock<Arc<dyn TransportFactory>>,
}

impl std::fmt::Debug for RequestSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSettings")
            .field("user_agent", &self.user_agent)
            .field("default_headers", &self.default_headers)
            .field("default_timeout", &self.default_timeout)
            .field("cookie_store", &self.cookie_store.is_some())
            .field("authorization", &self.authorization.is_some())
            .field("authorization_provider", &self.authorization_provider.is_some())
            .field("disable_100_continue", &self.disable_100_continue)
            .field("disable_keep_alive", &self.disable_keep_alive)
            .field("host", &self.host)
            .field("error_reporter", &self.error_reporter.is_some())
            .field("start_trace", &self.start_trace.is_some())
            .field("transport_factory", &self.transport_factory.is_some())
            .finish()
    }
}

impl RequestSettings {
    pub fn builder() -> RequestSettingsBuilder {
        RequestSettingsBuilder::new()
    }

    pub fn user_agent(&self) -> Option<&HeaderValue> {
        self.user_agent.as_ref()
    }

    /// Headers added to every request before the request's own headers.
    pub fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }

    /// Timeout used when a request does not set its own.
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    pub fn cookie_store(&self) -> Option<&Arc<CookieStore>> {
        self.cookie_store.as_ref()
    }

    pub fn disable_100_continue(&self) -> bool {
        self.disable_100_continue
    }

    pub fn disable_keep_alive(&self) -> bool {
        self.disable_keep_alive
    }

    pub fn host(&self) -> Option<&HeaderValue> {
        self.host.as_ref()
    }

    /// The `Authorization` value for a request.
    ///
    /// An explicit header wins over the provider.
    pub fn authorization_for(&self, info: &RequestInfo) -> Option<String> {
        if let Some(value) = &self.authorization {
            return value.to_str().ok().map(str::to_owned);
        }
        self.authorization_provider
            .as_ref()
            .and_then(|provider| provider(info))
    }

    pub(crate) fn report_error(&self, error: &WebServiceError) {
        if let Some(reporter) = &self.error_reporter {
            reporter(error);
        }
    }

    pub(crate) fn start_trace(&self, info: &RequestInfo) -> Option<TraceGuard> {
        self.start_trace.as_ref().and_then(|start| start(info))
    }

    /// Whether a caller-supplied transport factory is configured.
    pub fn has_transport_factory(&self) -> bool {
        self.transport_factory.is_some()
    }

    /// The configured transport factory, or a hyper factory created on
    /// first use and reused for the lifetime of these settings.
    pub fn transport_factory(&self) -> Result<Arc<dyn TransportFactory>, TransportError> {
        if let Some(factory) = &self.transport_factory {
            return Ok(factory.clone());
        }
        if let Some(factory) = self.default_factory.get() {
            return Ok(factory.clone());
        }
        let factory: Arc<dyn TransportFactory> = Arc::new(HyperTransportFactory::new()?);
        Ok(self.default_factory.get_or_init(|| factory).clone())
    }
}

/// Builder for [`RequestSettings`].
///
/// # Example
///
/// ```ignore
/// let settings = RequestSettings::builder()
///     .user_agent("inventory-sync/1.0")
///     .default_header("x-tenant", "north")
///     .default_timeout(Duration::from_secs(30))
///     .cookie_store(Arc::new(CookieStore::new()))
///     .build()?;
/// ```
#[derive(Default)]
pub struct RequestSettingsBuilder {
    user_agent: Option<String>,
    default_headers: Vec<(String, String)>,
    default_timeout: Option<Duration>,
    cookie_store: Option<Arc<CookieStore>>,
    authorization: Option<String>,
    authorization_provider: Option<AuthorizationProvider>,
    disable_100_continue: bool,
    disable_keep_alive: bool,
    host: Option<String>,
    error_reporter: Option<ErrorReporter>,
    start_trace: Option<StartTrace>,
    transport_factory: Option<Arc<dyn TransportFactory>>,
}

impl std::fmt::Debug for RequestSettingsBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSettingsBuilder")
            .field("user_agent", &self.user_agent)
            .field("default_headers", &self.default_headers)
            .field("default_timeout", &self.default_timeout)
            .field("host", &self.host)
            .field("transport_factory", &self.transport_factory.is_some())
            .finish_non_exhaustive()
    }
}

impl RequestSettingsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default `User-Agent`. A request's own user agent takes precedence.
    pub fn user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Add a header sent with every request.
    ///
    /// Repeating a name appends another value.
    pub fn default_header<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    pub fn cookie_store(mut self, store: Arc<CookieStore>) -> Self {
        self.cookie_store = Some(store);
        self
    }

    /// Fixed `Authorization` header value.
    pub fn authorization<S: Into<String>>(mut self, value: S) -> Self {
        self.authorization = Some(value.into());
        self
    }

    /// Compute `Authorization` per request. Ignored when a fixed value is set.
    pub fn authorization_provider<F>(mut self, provider: F) -> Self
    where
        F: Fn(&RequestInfo) -> Option<String> + Send + Sync + 'static,
    {
        self.authorization_provider = Some(Arc::new(provider));
        self
    }

    /// Never send `Expect: 100-continue`.
    pub fn disable_100_continue(mut self) -> Self {
        self.disable_100_continue = true;
        self
    }

    /// Send `Connection: close`.
    pub fn disable_keep_alive(mut self) -> Self {
        self.disable_keep_alive = true;
        self
    }

    /// Override the `Host` header.
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn error_reporter<F>(mut self, reporter: F) -> Self
    where
        F: Fn(&WebServiceError) + Send + Sync + 'static,
    {
        self.error_reporter = Some(Arc::new(reporter));
        self
    }

    pub fn start_trace<F>(mut self, start: F) -> Self
    where
        F: Fn(&RequestInfo) -> Option<TraceGuard> + Send + Sync + 'static,
    {
        self.start_trace = Some(Arc::new(start));
        self
    }

    /// Obtain transports from `factory` instead of the default hyper client.
    ///
    /// Request timeouts and redirect settings are passed to the factory
    /// through [`TransportOptions`](crate::transport::TransportOptions).
    pub fn transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.transport_factory = Some(factory);
        self
    }

    pub fn build(self) -> Result<RequestSettings, SettingsBuildError> {
        let mut default_headers = HeaderMap::new();
        for (name, value) in &self.default_headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| SettingsBuildError::InvalidHeaderName(name.clone()))?;
            default_headers.append(header_name, header_value(name, value)?);
        }

        Ok(RequestSettings {
            user_agent: self
                .user_agent
                .map(|value| header_value("user-agent", &value))
                .transpose()?,
            default_headers,
            default_timeout: self.default_timeout,
            cookie_store: self.cookie_store,
            authorization: self
                .authorization
                .map(|value| header_value("authorization", &value))
                .transpose()?,
            authorization_provider: self.authorization_provider,
            disable_100_continue: self.disable_100_continue,
            disable_keep_alive: self.disable_keep_alive,
            host: self
                .host
                .map(|value| header_value("host", &value))
                .transpose()?,
            error_reporter: self.error_reporter,
            start_trace: self.start_trace,
            transport_factory: self.transport_factory,
            default_factory: OnceLock::new(),
        })
    }
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, SettingsBuildError> {
    HeaderValue::from_str(value).map_err(|_| SettingsBuildError::InvalidHeaderValue {
        name: name.to_owned(),
    })
}
