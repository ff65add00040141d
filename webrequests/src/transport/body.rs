//! Request and response body types.
//!
//! [`RequestBody`] is what the transport sends. [`ResponseBody`] is the
//! lazily-read response stream; it owns the underlying connection body,
//! so dropping it releases the response.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use http_body::{Body, Frame, SizeHint};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use pin_project_lite::pin_project;
use webrequests_core::Decoder;

use crate::error::BoxError;

pin_project! {
    /// A request body.
    ///
    /// This type can represent:
    /// - Empty bodies (GET requests)
    /// - Full bodies (buffered content, replayable on redirect)
    /// - Streaming bodies (content produced by an async stream)
    #[project = RequestBodyProj]
    pub enum RequestBody {
        /// Empty request body.
        Empty,
        /// Full request body with all data available.
        Full {
            data: Option<Bytes>,
        },
        /// Streaming request body from an async stream.
        Streaming {
            #[pin]
            stream: Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>,
        },
    }
}

impl RequestBody {
    pub fn empty() -> Self {
        RequestBody::Empty
    }

    pub fn full(data: impl Into<Bytes>) -> Self {
        RequestBody::Full {
            data: Some(data.into()),
        }
    }

    pub fn streaming<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        RequestBody::Streaming {
            stream: Box::pin(stream),
        }
    }

    /// A copy for resending, or `None` for streaming bodies.
    pub fn try_clone(&self) -> Option<Self> {
        match self {
            RequestBody::Empty => Some(RequestBody::Empty),
            RequestBody::Full { data } => Some(RequestBody::Full { data: data.clone() }),
            RequestBody::Streaming { .. } => None,
        }
    }

    /// The buffered bytes, when the whole body is in memory.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            RequestBody::Full { data } => data.as_ref(),
            _ => None,
        }
    }
}

impl Body for RequestBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            RequestBodyProj::Empty => Poll::Ready(None),
            RequestBodyProj::Full { data } => Poll::Ready(data.take().map(|d| Ok(Frame::data(d)))),
            RequestBodyProj::Streaming { stream } => stream
                .poll_next(cx)
                .map(|item| item.map(|chunk| chunk.map(Frame::data))),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            RequestBody::Empty => true,
            RequestBody::Full { data } => data.is_none(),
            RequestBody::Streaming { .. } => false,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            RequestBody::Empty => SizeHint::with_exact(0),
            RequestBody::Full { data } => {
                SizeHint::with_exact(data.as_ref().map_or(0, |d| d.len() as u64))
            }
            RequestBody::Streaming { .. } => SizeHint::default(),
        }
    }
}

impl Default for RequestBody {
    fn default() -> Self {
        RequestBody::Empty
    }
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestBody::Empty => write!(f, "RequestBody::Empty"),
            RequestBody::Full { data } => f
                .debug_struct("RequestBody::Full")
                .field("data_len", &data.as_ref().map(|d| d.len()))
                .finish(),
            RequestBody::Streaming { .. } => write!(f, "RequestBody::Streaming"),
        }
    }
}

pin_project! {
    /// A response body, read lazily.
    ///
    /// When constructed with a [`Decoder`], data frames are decompressed as
    /// they arrive and the decoder is finished at end of stream.
    pub struct ResponseBody {
        #[pin]
        inner: BoxBody<Bytes, io::Error>,
        decoder: Option<Decoder>,
    }
}

impl ResponseBody {
    /// Wrap any body whose errors convert into a boxed error.
    pub fn new<B>(body: B) -> Self
    where
        B: Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        Self {
            inner: body.map_err(io::Error::other).boxed(),
            decoder: None,
        }
    }

    pub fn empty() -> Self {
        Self::new(Empty::<Bytes>::new())
    }

    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::new(Full::new(data.into()))
    }

    /// Decompress the body with `decoder` while reading.
    pub fn with_decoder(mut self, decoder: Decoder) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Read the whole body into memory.
    pub async fn bytes(self) -> io::Result<Bytes> {
        Ok(self.collect().await?.to_bytes())
    }

    /// Read the whole body as UTF-8 text (lossy).
    pub async fn text(self) -> io::Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// The body as a stream of data chunks.
    pub fn into_stream(self) -> impl Stream<Item = io::Result<Bytes>> + Send {
        self.into_data_stream()
    }
}

impl Body for ResponseBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();
        loop {
            let Some(decoder) = this.decoder.as_mut() else {
                return this.inner.as_mut().poll_frame(cx);
            };
            match this.inner.as_mut().poll_frame(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(Some(Ok(frame))) => match frame.into_data() {
                    Ok(data) => {
                        let decoded = decoder.decode(&data)?;
                        if !decoded.is_empty() {
                            return Poll::Ready(Some(Ok(Frame::data(decoded))));
                        }
                    }
                    Err(trailers) => return Poll::Ready(Some(Ok(trailers))),
                },
                Poll::Ready(None) => {
                    let rest = match this.decoder.take() {
                        Some(decoder) => decoder.finish()?,
                        None => Bytes::new(),
                    };
                    if rest.is_empty() {
                        return Poll::Ready(None);
                    }
                    return Poll::Ready(Some(Ok(Frame::data(rest))));
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.decoder.is_none() && self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        if self.decoder.is_some() {
            SizeHint::default()
        } else {
            self.inner.size_hint()
        }
    }
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseBody")
            .field("decoder", &self.decoder)
            .finish_non_exhaustive()
    }
}
