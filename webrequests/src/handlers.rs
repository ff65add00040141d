//! Ordered handler chain.

use futures::future::BoxFuture;

use crate::context::ResponseHandlingContext;
use crate::engine::ResponseHandler;
use crate::error::ClientError;

type BoxHandler<T> = Box<
    dyn for<'a> Fn(&'a mut ResponseHandlingContext) -> BoxFuture<'a, Result<Option<T>, ClientError>>
        + Send
        + Sync,
>;

/// Runs handlers in order until one claims the response.
///
/// A handler claims the response by returning `Ok(Some(value))`. When no
/// handler claims it, the call fails as unhandled.
///
/// # Example
///
/// ```ignore
/// let chain = HandlerChain::new()
///     .with_handler(|ctx| Box::pin(async move {
///         if ctx.status() != StatusCode::OK {
///             return Ok(None);
///         }
///         Ok(Some(ctx.read_text().await?))
///     }));
/// let text = execute(request, &chain).await?;
/// ```
pub struct HandlerChain<T> {
    handlers: Vec<BoxHandler<T>>,
}

impl<T> Default for HandlerChain<T> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }
}

impl<T> std::fmt::Debug for HandlerChain<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerChain")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl<T: Send> HandlerChain<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler.
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut ResponseHandlingContext) -> BoxFuture<'a, Result<Option<T>, ClientError>>
            + Send
            + Sync
            + 'static,
    {
        self.push(handler);
        self
    }

    pub fn push<F>(&mut self, handler: F)
    where
        F: for<'a> Fn(&'a mut ResponseHandlingContext) -> BoxFuture<'a, Result<Option<T>, ClientError>>
            + Send
            + Sync
            + 'static,
    {
        self.handlers.push(Box::new(handler));
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<T: Send> ResponseHandler for HandlerChain<T> {
    type Output = T;

    fn handle<'a>(
        &'a self,
        ctx: &'a mut ResponseHandlingContext,
    ) -> BoxFuture<'a, Result<Option<T>, ClientError>> {
        Box::pin(async move {
            for handler in &self.handlers {
                if let Some(value) = handler(ctx).await? {
                    return Ok(Some(value));
                }
            }
            Ok(None)
        })
    }
}
