//! Declarative HTTP web service requests.
//!
//! A call is described by a [`RequestDescription`], sent by the engine
//! ([`execute`]), and its response is turned into a result by one
//! [`ResponseHandler`]:
//!
//! - [`StatusClassifier`] accepts a list of status codes and returns a
//!   [`WebServiceResponse`] owning the unread body
//! - [`HandlerChain`] runs handlers in order until one claims the response
//! - [`AutoMapper`] fills a typed result by status name and header name
//!
//! Every failure reaches the caller as a [`WebServiceError`] inside
//! [`ClientError::Service`], except cancellation and errors raised by
//! caller code.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::{Arc, OnceLock};
//! use webrequests::{AutoMapper, AutoResponse, RequestDescription, ResponseFields, execute};
//!
//! #[derive(Default)]
//! struct GetWidget {
//!     ok: Option<Widget>,
//!     not_found: bool,
//!     etag: Option<String>,
//! }
//!
//! impl AutoResponse for GetWidget {
//!     fn fields() -> &'static ResponseFields<Self> {
//!         static FIELDS: OnceLock<ResponseFields<GetWidget>> = OnceLock::new();
//!         FIELDS.get_or_init(|| {
//!             ResponseFields::new()
//!                 .json("OK", |r: &mut GetWidget, v| r.ok = Some(v))
//!                 .flag("NotFound", |r, v| r.not_found = v)
//!                 .header_text("ETag", |r, v| r.etag = Some(v))
//!         })
//!     }
//! }
//!
//! let request = RequestDescription::new(url)?.with_settings(settings);
//! let widget = execute(request, &AutoMapper::<GetWidget>::new()).await?;
//! ```

mod classifier;
mod client;
mod context;
mod engine;
mod error;
mod handlers;
mod mapper;
mod request;
mod response;
mod settings;
pub mod transport;

pub use classifier::{AcceptedStatusCodes, JsonResponseFactory, ResponseFactory, StatusClassifier};
pub use client::JsonServiceClient;
pub use context::ResponseHandlingContext;
pub use engine::{ResponseHandler, execute, execute_with_cancellation};
pub use error::{BoxError, ClientError};
pub use handlers::HandlerChain;
pub use mapper::{
    AutoMapper, AutoResponse, GenericStatusCodeResponse, ResponseDiagnostics, ResponseFields,
    ResponseStream, expected,
};
pub use request::{InvalidSchemeError, RequestContent, RequestDescription};
pub use response::{JsonWebServiceResponse, WebServiceResponse};
pub use settings::{
    AuthorizationProvider, ErrorReporter, RequestInfo, RequestSettings, RequestSettingsBuilder,
    SettingsBuildError, StartTrace, TraceGuard,
};
pub use transport::{
    HyperTransport, HyperTransportFactory, RequestBody, ResponseBody, ResponseUri, Transport,
    TransportError, TransportFactory, TransportOptions,
};

// Re-export core types
pub use webrequests_core::{
    ByteRange, ByteRangeError, CONTENT_PREVIEW_LENGTH, CookieError, CookieStore, JsonError,
    UriCookie, WebServiceError, WebServiceErrorKind,
};

// Re-export for convenience
pub use tokio_util::sync::CancellationToken;
