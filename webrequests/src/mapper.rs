//! Status- and header-driven result mapping.
//!
//! [`AutoMapper`] fills a result type from a response using the type's
//! [`ResponseFields`] table:
//!
//! 1. The field named after the status (`"OK"`, `"NotFound"`, ...) is
//!    filled from the body according to its kind.
//! 2. The status-code field, if registered, receives the status.
//! 3. If neither applied, the call fails.
//! 4. Each response header with a registered field (hyphens ignored) is
//!    parsed into it; other headers are ignored.
//! 5. [`AutoResponse::on_handled`] runs last.
//!
//! JSON that does not fit the field's type fails the call for 2xx statuses
//! and is ignored otherwise. Malformed JSON always fails.

mod diagnostics;
mod fields;
mod stream;

use std::marker::PhantomData;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::future::BoxFuture;
use webrequests_core::{WebServiceError, content_preview, parse_http_date, status_code_name};

pub use diagnostics::{GenericStatusCodeResponse, ResponseDiagnostics, expected};
pub use fields::ResponseFields;
pub use stream::ResponseStream;

use crate::context::ResponseHandlingContext;
use crate::engine::ResponseHandler;
use crate::error::ClientError;
use fields::{BodyField, HeaderField};

/// A result type filled by [`AutoMapper`].
pub trait AutoResponse: Default + Send + Sized + 'static {
    /// The mapping table, built once.
    fn fields() -> &'static ResponseFields<Self>;

    /// Called after fields are filled, with whether a field matched the
    /// status. Use it to capture extra response details.
    fn on_handled<'a>(
        &'a mut self,
        _ctx: &'a mut ResponseHandlingContext,
        _status_handled: bool,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        Box::pin(async { Ok(()) })
    }

    /// Captured response details, used by [`expected`].
    fn diagnostics(&self) -> Option<&ResponseDiagnostics> {
        None
    }
}

/// Response handler producing `T` from its field table.
pub struct AutoMapper<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> AutoMapper<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for AutoMapper<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for AutoMapper<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoMapper")
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: AutoResponse> ResponseHandler for AutoMapper<T> {
    type Output = T;

    fn handle<'a>(
        &'a self,
        ctx: &'a mut ResponseHandlingContext,
    ) -> BoxFuture<'a, Result<Option<T>, ClientError>> {
        Box::pin(async move { map_response::<T>(ctx).await.map(Some) })
    }
}

async fn map_response<T: AutoResponse>(ctx: &mut ResponseHandlingContext) -> Result<T, ClientError> {
    let fields = T::fields();
    let mut result = T::default();
    let status = ctx.status();
    let status_name = status_code_name(status);
    let mut status_handled = false;

    if let Some(field) = fields.body_field_for(&status_name) {
        read_body(field, &mut result, ctx).await?;
        status_handled = true;
    } else if let Some(field) = fields.header_field_for(&status_name) {
        let message = format!("Web response content cannot be read as {}.", field.type_name());
        return Err(fault(ctx, &message).await.into());
    }

    if let Some(set) = fields.status_code_setter() {
        set(&mut result, status);
        status_handled = true;
    }

    if !status_handled {
        return Err(fault(ctx, "Status code not handled.").await.into());
    }

    let headers: Vec<(String, String)> = ctx
        .headers()
        .keys()
        .map(|name| {
            let text = ctx
                .headers()
                .get_all(name)
                .iter()
                .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
                .collect::<Vec<_>>()
                .join("; ");
            (name.as_str().to_owned(), text)
        })
        .collect();
    for (name, text) in headers {
        let Some(field) = fields.header_field_for(&name) else {
            continue;
        };
        if !set_header(field, &mut result, ctx, &text) {
            let message = format!(
                "Web response header cannot be read as {}. {}: {}",
                field.type_name(),
                name,
                text
            );
            return Err(fault(ctx, &message).await.into());
        }
    }

    result.on_handled(ctx, status_handled).await?;
    Ok(result)
}

async fn read_body<T>(
    field: &BodyField<T>,
    result: &mut T,
    ctx: &mut ResponseHandlingContext,
) -> Result<(), ClientError> {
    match field {
        BodyField::Flag(set) => set(result, true),
        BodyField::Text(set) => set(result, ctx.read_text().await?),
        BodyField::Bytes(set) => set(result, ctx.read_bytes().await?),
        BodyField::Stream(set) => {
            let Some(body) = ctx.detach() else {
                return Err(ctx.create_error("Response content is no longer available.").into());
            };
            set(result, ResponseStream::new(body));
        }
        BodyField::Json { type_name, decode } => {
            if !ctx.has_json() && ctx.content_type().is_some() {
                let message = format!("Web response content cannot be read as {type_name}.");
                return Err(fault(ctx, &message).await.into());
            }
            let bytes = ctx.read_bytes().await?;
            if bytes.is_empty() {
                let message = format!("Web response content cannot be read as {type_name}.");
                return Err(ctx.create_error(&message).into());
            }
            match decode(result, &bytes) {
                Ok(()) => {}
                Err(e) if e.is_mismatch() && !ctx.status().is_success() => {
                    tracing::debug!(
                        status = ctx.status().as_u16(),
                        error = %e,
                        "ignoring JSON of unexpected shape"
                    );
                }
                Err(e) => {
                    let preview = content_preview(&String::from_utf8_lossy(&bytes));
                    return Err(ctx
                        .create_error(&e.to_string())
                        .with_content_preview(Some(preview))
                        .with_source(e)
                        .into());
                }
            }
        }
    }
    Ok(())
}

/// Parse `text` into the header field. Returns false when it does not parse.
fn set_header<T>(
    field: &HeaderField<T>,
    result: &mut T,
    ctx: &ResponseHandlingContext,
    text: &str,
) -> bool {
    match field {
        HeaderField::Text(set) => set(result, text.to_owned()),
        HeaderField::Int32(set) => match text.trim().parse() {
            Ok(value) => set(result, value),
            Err(_) => return false,
        },
        HeaderField::Int64(set) => match text.trim().parse() {
            Ok(value) => set(result, value),
            Err(_) => return false,
        },
        HeaderField::Uri(set) => match ctx.uri().join(text.trim()) {
            Ok(value) => set(result, value),
            Err(_) => return false,
        },
        HeaderField::Date(set) => match parse_http_date(text) {
            Some(value) => set(result, value),
            None => return false,
        },
        HeaderField::Base64(set) => match STANDARD.decode(text.trim()) {
            Ok(value) => set(result, value),
            Err(_) => return false,
        },
    }
    true
}

/// A fault with a content preview when the body is still unread.
async fn fault(ctx: &mut ResponseHandlingContext, message: &str) -> WebServiceError {
    ctx.create_error_with_preview(message).await
}
