//! Field registry for mapped results.
//!
//! A [`ResponseFields`] table lists, for one result type, which fields are
//! filled from the body when the status name matches, which are filled from
//! headers, and which receives the status code. Names are compared
//! ignoring ASCII case, `-` and `_`, so `"NotFound"`, `"not_found"` and
//! the status `404 Not Found` all match, as do `"etag"` and `ETag`.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::StatusCode;
use serde::de::DeserializeOwned;
use url::Url;
use webrequests_core::{JsonError, from_json_slice};

use super::stream::ResponseStream;

type Setter<T, V> = Box<dyn Fn(&mut T, V) + Send + Sync>;
type JsonSetter<T> = Box<dyn Fn(&mut T, &[u8]) -> Result<(), JsonError> + Send + Sync>;

/// How a status-matched field is filled from the body.
pub(crate) enum BodyField<T> {
    /// Set to `true`; the body is not read.
    Flag(Setter<T, bool>),
    Text(Setter<T, String>),
    Bytes(Setter<T, Bytes>),
    /// Receives the unread body; the caller owns it from then on.
    Stream(Setter<T, ResponseStream>),
    Json {
        type_name: &'static str,
        decode: JsonSetter<T>,
    },
}

/// How a header-matched field is parsed.
pub(crate) enum HeaderField<T> {
    Text(Setter<T, String>),
    Int32(Setter<T, i32>),
    Int64(Setter<T, i64>),
    /// Resolved against the request URI.
    Uri(Setter<T, Url>),
    /// RFC 1123 date.
    Date(Setter<T, DateTime<Utc>>),
    /// Base64-decoded bytes.
    Base64(Setter<T, Vec<u8>>),
}

impl<T> HeaderField<T> {
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            HeaderField::Text(_) => "String",
            HeaderField::Int32(_) => "i32",
            HeaderField::Int64(_) => "i64",
            HeaderField::Uri(_) => "Url",
            HeaderField::Date(_) => "DateTime<Utc>",
            HeaderField::Base64(_) => "Vec<u8>",
        }
    }
}

/// Mapping table for a result type `T`.
///
/// Build it once and return it from
/// [`AutoResponse::fields`](super::AutoResponse::fields).
///
/// # Example
///
/// ```ignore
/// #[derive(Default)]
/// struct GetWidget {
///     ok: Option<Widget>,
///     not_found: bool,
///     etag: Option<String>,
/// }
///
/// impl AutoResponse for GetWidget {
///     fn fields() -> &'static ResponseFields<Self> {
///         static FIELDS: OnceLock<ResponseFields<GetWidget>> = OnceLock::new();
///         FIELDS.get_or_init(|| {
///             ResponseFields::new()
///                 .json("OK", |r: &mut GetWidget, v| r.ok = Some(v))
///                 .flag("NotFound", |r, v| r.not_found = v)
///                 .header_text("ETag", |r, v| r.etag = Some(v))
///         })
///     }
/// }
/// ```
pub struct ResponseFields<T> {
    body: Vec<(String, BodyField<T>)>,
    headers: Vec<(String, HeaderField<T>)>,
    status_code: Option<Setter<T, StatusCode>>,
}

impl<T> Default for ResponseFields<T> {
    fn default() -> Self {
        Self {
            body: Vec::new(),
            headers: Vec::new(),
            status_code: None,
        }
    }
}

impl<T> std::fmt::Debug for ResponseFields<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseFields")
            .field("body", &self.body.iter().map(|(name, _)| name).collect::<Vec<_>>())
            .field(
                "headers",
                &self.headers.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .field("status_code", &self.status_code.is_some())
            .finish()
    }
}

impl<T> ResponseFields<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set to `true` when the status matches, without reading the body.
    pub fn flag<F>(self, status: &str, set: F) -> Self
    where
        F: Fn(&mut T, bool) + Send + Sync + 'static,
    {
        self.body_field(status, BodyField::Flag(Box::new(set)))
    }

    /// The body as text.
    pub fn text<F>(self, status: &str, set: F) -> Self
    where
        F: Fn(&mut T, String) + Send + Sync + 'static,
    {
        self.body_field(status, BodyField::Text(Box::new(set)))
    }

    /// The body as bytes.
    pub fn bytes<F>(self, status: &str, set: F) -> Self
    where
        F: Fn(&mut T, Bytes) + Send + Sync + 'static,
    {
        self.body_field(status, BodyField::Bytes(Box::new(set)))
    }

    /// The unread body as a stream owned by the result.
    pub fn stream<F>(self, status: &str, set: F) -> Self
    where
        F: Fn(&mut T, ResponseStream) + Send + Sync + 'static,
    {
        self.body_field(status, BodyField::Stream(Box::new(set)))
    }

    /// The body decoded as JSON into `V`.
    pub fn json<V, F>(self, status: &str, set: F) -> Self
    where
        V: DeserializeOwned,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        let decode = move |target: &mut T, bytes: &[u8]| -> Result<(), JsonError> {
            set(target, from_json_slice::<V>(bytes)?);
            Ok(())
        };
        self.body_field(
            status,
            BodyField::Json {
                type_name: std::any::type_name::<V>(),
                decode: Box::new(decode),
            },
        )
    }

    /// Receives the response status for every response.
    pub fn status_code<F>(mut self, set: F) -> Self
    where
        F: Fn(&mut T, StatusCode) + Send + Sync + 'static,
    {
        self.status_code = Some(Box::new(set));
        self
    }

    pub fn header_text<F>(self, header: &str, set: F) -> Self
    where
        F: Fn(&mut T, String) + Send + Sync + 'static,
    {
        self.header_field(header, HeaderField::Text(Box::new(set)))
    }

    pub fn header_i32<F>(self, header: &str, set: F) -> Self
    where
        F: Fn(&mut T, i32) + Send + Sync + 'static,
    {
        self.header_field(header, HeaderField::Int32(Box::new(set)))
    }

    pub fn header_i64<F>(self, header: &str, set: F) -> Self
    where
        F: Fn(&mut T, i64) + Send + Sync + 'static,
    {
        self.header_field(header, HeaderField::Int64(Box::new(set)))
    }

    pub fn header_uri<F>(self, header: &str, set: F) -> Self
    where
        F: Fn(&mut T, Url) + Send + Sync + 'static,
    {
        self.header_field(header, HeaderField::Uri(Box::new(set)))
    }

    pub fn header_date<F>(self, header: &str, set: F) -> Self
    where
        F: Fn(&mut T, DateTime<Utc>) + Send + Sync + 'static,
    {
        self.header_field(header, HeaderField::Date(Box::new(set)))
    }

    pub fn header_base64<F>(self, header: &str, set: F) -> Self
    where
        F: Fn(&mut T, Vec<u8>) + Send + Sync + 'static,
    {
        self.header_field(header, HeaderField::Base64(Box::new(set)))
    }

    fn body_field(mut self, name: &str, field: BodyField<T>) -> Self {
        self.body.push((normalize(name), field));
        self
    }

    fn header_field(mut self, name: &str, field: HeaderField<T>) -> Self {
        self.headers.push((normalize(name), field));
        self
    }

    /// The body field registered for a status name.
    pub(crate) fn body_field_for(&self, status_name: &str) -> Option<&BodyField<T>> {
        let key = normalize(status_name);
        self.body
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, field)| field)
    }

    /// The header field registered for a header (or status) name.
    pub(crate) fn header_field_for(&self, name: &str) -> Option<&HeaderField<T>> {
        let key = normalize(name);
        self.headers
            .iter()
            .find(|(field, _)| *field == key)
            .map(|(_, field)| field)
    }

    pub(crate) fn status_code_setter(&self) -> Option<&Setter<T, StatusCode>> {
        self.status_code.as_ref()
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '-' && *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
