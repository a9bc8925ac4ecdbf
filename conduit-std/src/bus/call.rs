//! Request handlers and the call context they receive.

use super::EventBus;
use conduit_core::{BoxError, BoxFuture, ConduitError, Context, Event, PublishReport, Request};
use std::future::Future;

/// What a request handler receives besides the request.
///
/// Carries the operation's [`Context`] and the bus, so handlers can issue
/// nested requests and publish events within the same trace.
#[derive(Clone)]
pub struct CallContext {
    context: Context,
    bus: EventBus,
}

impl CallContext {
    pub(crate) fn new(context: Context, bus: EventBus) -> Self {
        Self { context, bus }
    }

    /// The operation's context.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// The bus the request was sent on.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Whether the operation was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.context.is_cancelled()
    }

    /// Send a nested request in a child context. Guarded like any `send`.
    pub async fn send<R: Request>(&self, request: R) -> Result<R::Response, ConduitError> {
        self.bus.send_with(request, self.context.child()).await
    }

    /// Publish an event under this operation's context.
    pub async fn publish<E: Event>(&self, event: E) -> Result<PublishReport, ConduitError> {
        self.bus.publish_with(event, self.context.clone()).await
    }

    /// Deliver an event to its first handler only, under this operation's context.
    pub async fn emit_first<E: Event>(&self, event: E) -> Result<(), ConduitError> {
        self.bus.emit_first_with(event, self.context.clone()).await
    }
}

/// The single responder for a request type.
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot respond to `{R}`",
    label = "missing `RequestHandler<{R}>` implementation",
    note = "Closures must take `({R}, CallContext)` and return a future of `Result<{R}::Response, E>`."
)]
pub trait RequestHandler<R: Request>: Send + Sync + 'static {
    /// Produce the response.
    fn handle(&self, request: R, ctx: CallContext) -> impl Future<Output = Result<R::Response, BoxError>> + Send;
}

// Blanket impl for closures
impl<R, F, Fut, E> RequestHandler<R> for F
where
    R: Request,
    F: Fn(R, CallContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R::Response, E>> + Send,
    E: Into<BoxError>,
{
    fn handle(&self, request: R, ctx: CallContext) -> impl Future<Output = Result<R::Response, BoxError>> + Send {
        let fut = (self)(request, ctx);
        async move { fut.await.map_err(Into::into) }
    }
}

/// Dynamic object-safe version of [`RequestHandler`].
pub trait DynRequestHandler<R: Request>: Send + Sync + 'static {
    /// Produce the response (dynamic dispatch version).
    fn handle_dyn(&self, request: R, ctx: CallContext) -> BoxFuture<'_, Result<R::Response, BoxError>>;
}

impl<R: Request, T: RequestHandler<R>> DynRequestHandler<R> for T {
    fn handle_dyn(&self, request: R, ctx: CallContext) -> BoxFuture<'_, Result<R::Response, BoxError>> {
        Box::pin(self.handle(request, ctx))
    }
}
