//! Content codings: gzip request compression and incremental response
//! decompression.
//!
//! HTTP `deflate` is the zlib format (RFC 1950), not raw DEFLATE.

use std::io::{self, Write};

use bytes::Bytes;
use flate2::Compression;
use flate2::write::{GzDecoder, GzEncoder, ZlibDecoder};

/// Value sent in `Accept-Encoding` for codings the decoder understands.
pub const ACCEPT_ENCODING: &str = "gzip, deflate";

/// Response content codings understood by [`Decoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentEncoding {
    #[default]
    Identity,
    Gzip,
    Deflate,
}

impl ContentEncoding {
    /// Parse a `Content-Encoding` header value.
    /// Returns `None` for codings this crate cannot decode.
    pub fn from_header(value: Option<&str>) -> Option<Self> {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("identity") => Some(Self::Identity),
            Some("gzip") | Some("x-gzip") => Some(Self::Gzip),
            Some("deflate") => Some(Self::Deflate),
            _ => None,
        }
    }

    /// A fresh decoder, or `None` for identity.
    pub fn decoder(&self) -> Option<Decoder> {
        match self {
            Self::Identity => None,
            Self::Gzip => Some(Decoder::Gzip(GzDecoder::new(Vec::new()))),
            Self::Deflate => Some(Decoder::Deflate(ZlibDecoder::new(Vec::new()))),
        }
    }
}

/// Incremental decompressor fed one body chunk at a time.
pub enum Decoder {
    Gzip(GzDecoder<Vec<u8>>),
    Deflate(ZlibDecoder<Vec<u8>>),
}

impl Decoder {
    /// Feed compressed bytes, returning whatever decompressed output is ready.
    pub fn decode(&mut self, chunk: &[u8]) -> io::Result<Bytes> {
        match self {
            Decoder::Gzip(decoder) => {
                decoder.write_all(chunk)?;
                decoder.flush()?;
                Ok(Bytes::from(std::mem::take(decoder.get_mut())))
            }
            Decoder::Deflate(decoder) => {
                decoder.write_all(chunk)?;
                decoder.flush()?;
                Ok(Bytes::from(std::mem::take(decoder.get_mut())))
            }
        }
    }

    /// Signal end of input and return the remaining output.
    ///
    /// Fails when the compressed stream was truncated.
    pub fn finish(self) -> io::Result<Bytes> {
        let rest = match self {
            Decoder::Gzip(decoder) => decoder.finish()?,
            Decoder::Deflate(decoder) => decoder.finish()?,
        };
        Ok(Bytes::from(rest))
    }
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decoder::Gzip(_) => f.write_str("Decoder::Gzip"),
            Decoder::Deflate(_) => f.write_str("Decoder::Deflate"),
        }
    }
}

/// Gzip-compress a buffer at the default level.
pub fn gzip(data: &[u8]) -> io::Result<Bytes> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(Bytes::from(encoder.finish()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;

    #[test]
    fn parses_content_encoding() {
        assert_eq!(ContentEncoding::from_header(None), Some(ContentEncoding::Identity));
        assert_eq!(ContentEncoding::from_header(Some("GZIP")), Some(ContentEncoding::Gzip));
        assert_eq!(
            ContentEncoding::from_header(Some("deflate")),
            Some(ContentEncoding::Deflate)
        );
        assert_eq!(ContentEncoding::from_header(Some("br")), None);
        assert!(ContentEncoding::Identity.decoder().is_none());
    }

    #[test]
    fn gzip_decodes_across_chunks() {
        let original = "hello world ".repeat(200);
        let compressed = gzip(original.as_bytes()).unwrap();

        let mut decoder = ContentEncoding::Gzip.decoder().unwrap();
        let mut output = Vec::new();
        for chunk in compressed.chunks(7) {
            output.extend_from_slice(&decoder.decode(chunk).unwrap());
        }
        output.extend_from_slice(&decoder.finish().unwrap());
        assert_eq!(output, original.as_bytes());
    }

    #[test]
    fn deflate_uses_zlib_format() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"zlib payload").unwrap();
        let compressed = encoder.finish().unwrap();

        let mut decoder = ContentEncoding::Deflate.decoder().unwrap();
        let mut output = decoder.decode(&compressed).unwrap().to_vec();
        output.extend_from_slice(&decoder.finish().unwrap());
        assert_eq!(output, b"zlib payload");
    }
}
