//! HTTP transport layer.
//!
//! The engine talks to the network through the [`Transport`] trait and
//! obtains one per call from a [`TransportFactory`]. The default
//! implementation, [`HyperTransport`], uses hyper_util's legacy client and
//! adds what a plain hyper client lacks:
//!
//! - following redirects (unless disabled for the call)
//! - sending and collecting cookies through a [`CookieStore`]
//! - transparent gzip/deflate decompression
//! - a timeout on the arrival of response headers
//!
//! # Feature Flags
//!
//! - `tls` (default) - Enables `tls-ring` + `tls-native-roots`
//! - `tls-ring` / `tls-aws-lc` - Crypto providers
//! - `tls-native-roots` / `tls-webpki-roots` - Root certificates

mod body;
mod connector;
mod hyper;

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use http::{Request, Response};
use url::Url;
use webrequests_core::CookieStore;

pub use body::{RequestBody, ResponseBody};
pub use connector::{
    DangerousAcceptAnyCertVerifier, build_https_connector, danger_accept_invalid_certs_config,
    default_tls_config,
};
pub use hyper::{HyperTransport, HyperTransportFactory, HyperTransportFactoryBuilder};

// Re-export rustls types that users might need for TLS configuration
pub use rustls::ClientConfig as TlsClientConfig;

use crate::error::BoxError;

/// Transport-level failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connecting, writing the request or reading the response head failed.
    #[error("request failed: {0}")]
    Request(#[source] BoxError),

    /// The outgoing request could not be assembled.
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] http::Error),

    /// No response headers arrived within the configured timeout.
    #[error("request timed out")]
    Timeout,

    #[error("too many redirects (limit {0})")]
    TooManyRedirects(usize),

    #[error("invalid redirect location: {0}")]
    InvalidRedirect(String),

    /// TLS could not be configured.
    #[error("TLS configuration error: {0}")]
    Tls(String),
}

/// Per-call configuration handed to a [`TransportFactory`].
#[derive(Clone, Debug, Default)]
pub struct TransportOptions {
    /// Limit on the wait for response headers. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Whether redirects are followed automatically.
    pub follow_redirects: bool,
    /// Store used to send and collect cookies.
    pub cookie_store: Option<Arc<CookieStore>>,
    /// Whether gzip/deflate responses are decompressed.
    pub decompress: bool,
}

/// Response extension holding the URI that produced the response.
///
/// Transports that follow redirects insert it so the final URI, not the
/// first one requested, is used for cookies, relative headers and faults.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseUri(pub Url);

/// Sends one request and returns the response with an unread body.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: Request<RequestBody>,
    ) -> BoxFuture<'_, Result<Response<ResponseBody>, TransportError>>;
}

/// Produces the transport used for a single call.
pub trait TransportFactory: Send + Sync {
    fn create_transport(
        &self,
        options: &TransportOptions,
    ) -> Result<Arc<dyn Transport>, TransportError>;
}

impl<F> TransportFactory for F
where
    F: Fn(&TransportOptions) -> Result<Arc<dyn Transport>, TransportError> + Send + Sync,
{
    fn create_transport(
        &self,
        options: &TransportOptions,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        self(options)
    }
}
