//! Status-code names used to match mapped result fields.

use std::borrow::Cow;

use http::StatusCode;

/// PascalCase name of a status code, e.g. `NotFound` for 404.
///
/// Derived from the canonical reason phrase with spaces and punctuation
/// removed, except where the established enum name differs from the
/// current reason phrase (413, 414, 416, 505). Codes without a canonical
/// reason use their numeric text.
pub fn status_code_name(status: StatusCode) -> Cow<'static, str> {
    match status.as_u16() {
        306 => return Cow::Borrowed("Unused"),
        413 => return Cow::Borrowed("RequestEntityTooLarge"),
        414 => return Cow::Borrowed("RequestUriTooLong"),
        416 => return Cow::Borrowed("RequestedRangeNotSatisfiable"),
        505 => return Cow::Borrowed("HttpVersionNotSupported"),
        _ => {}
    }
    match status.canonical_reason() {
        Some(reason) => Cow::Owned(
            reason
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect(),
        ),
        None => Cow::Owned(status.as_u16().to_string()),
    }
}
