//! Value types shared by the webrequests client.
//!
//! ## Modules
//!
//! - [`range`]: byte ranges for the `Range` header
//! - [`error`]: the web service fault type and content previews
//! - [`json`]: JSON content-type detection and serde_json bridge
//! - [`cookie`]: thread-safe cookie store
//! - [`codec`]: gzip/deflate content codings
//! - [`status`]: status-code names
//! - [`date`]: RFC 1123 dates

mod codec;
mod cookie;
mod date;
mod error;
mod json;
mod range;
mod status;

pub use codec::*;
pub use cookie::*;
pub use date::*;
pub use error::*;
pub use json::*;
pub use range::*;
pub use status::*;
