//! Client error type.
//!
//! [`ClientError`] is what every public entry point returns. Faults
//! ([`WebServiceError`]) are the normal failure; transport and I/O errors
//! only ever appear while a handler runs and are re-wrapped into faults by
//! the engine before they reach the caller.

use webrequests_core::{JsonError, WebServiceError};

use crate::transport::TransportError;

/// Boxed error used for caller-defined failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by request execution.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The cancellation token fired. Never wrapped as a fault.
    #[error("request canceled")]
    Canceled,

    /// A web service fault.
    #[error(transparent)]
    Service(#[from] WebServiceError),

    /// Transport failure (connection, TLS, protocol framing, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// I/O failure while reading a response body.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error raised by caller code; propagated unmodified.
    #[error(transparent)]
    Handler(BoxError),
}

impl ClientError {
    /// Wrap a caller-defined error.
    pub fn handler<E: Into<BoxError>>(error: E) -> Self {
        ClientError::Handler(error.into())
    }

    /// Whether the engine re-wraps this error as a fault.
    ///
    /// Network, I/O, invalid-data and protocol failures are wrapped.
    pub fn should_wrap(&self) -> bool {
        matches!(self, ClientError::Transport(_) | ClientError::Io(_))
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, ClientError::Canceled)
    }

    /// The fault, if this is one.
    pub fn as_service(&self) -> Option<&WebServiceError> {
        match self {
            ClientError::Service(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_service(self) -> Option<WebServiceError> {
        match self {
            ClientError::Service(e) => Some(e),
            _ => None,
        }
    }
}

impl From<JsonError> for ClientError {
    fn from(error: JsonError) -> Self {
        ClientError::Handler(Box::new(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, StatusCode};
    use url::Url;

    #[test]
    fn transport_and_io_are_wrapped() {
        assert!(ClientError::Transport(TransportError::Timeout).should_wrap());
        assert!(ClientError::Io(std::io::Error::other("reset")).should_wrap());
    }

    #[test]
    fn faults_cancellation_and_handler_errors_are_not_wrapped() {
        let fault = WebServiceError::new("nope");
        assert!(!ClientError::Service(fault).should_wrap());
        assert!(!ClientError::Canceled.should_wrap());
        assert!(!ClientError::handler("custom").should_wrap());
    }

    #[test]
    fn service_display_is_transparent() {
        let uri = Url::parse("http://localhost/x").unwrap();
        let fault = WebServiceError::response(
            "Unexpected status.",
            &Method::GET,
            &uri,
            StatusCode::NOT_FOUND,
            &http::HeaderMap::new(),
        );
        let err = ClientError::from(fault);
        assert_eq!(
            err.to_string(),
            "Unexpected status. Request: GET http://localhost/x (status 404)"
        );
        assert_eq!(err.as_service().unwrap().status(), Some(StatusCode::NOT_FOUND));
    }

    #[test]
    fn canceled_is_reported() {
        let err = ClientError::Canceled;
        assert!(err.is_canceled());
        assert!(err.into_service().is_none());
    }
}
