//! Response content handed to the caller as a stream.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

use crate::transport::ResponseBody;

type DataStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Unread response content owned by a mapped result.
///
/// Dropping or [closing](Self::close) the stream releases the underlying
/// response. Closing more than once does nothing.
pub struct ResponseStream {
    inner: Option<DataStream>,
}

impl ResponseStream {
    pub fn new(body: ResponseBody) -> Self {
        Self {
            inner: Some(Box::pin(body.into_stream())),
        }
    }

    /// Release the response now.
    pub fn close(&mut self) {
        if self.inner.take().is_some() {
            tracing::debug!("closed response stream");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Read the remaining content and release the response.
    pub async fn bytes(mut self) -> io::Result<Bytes> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = self.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }

    /// Adapt into an [`AsyncRead`].
    pub fn into_async_read(self) -> impl AsyncRead + Send + Unpin {
        StreamReader::new(self)
    }
}

impl Stream for ResponseStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let Some(inner) = self.inner.as_mut() else {
            return Poll::Ready(None);
        };
        match inner.poll_next_unpin(cx) {
            Poll::Ready(None) => {
                self.close();
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

impl std::fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseStream")
            .field("closed", &self.is_closed())
            .finish()
    }
}
