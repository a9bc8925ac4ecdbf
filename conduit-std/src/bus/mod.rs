//! The event bus facade.
//!
//! [`EventBus`] unifies the subscription service, request slots, publisher and
//! dispatch guard behind one cheaply cloneable handle.
//!
//! # Example
//!
//! ```rust,ignore
//! let bus = EventBus::builder()
//!     .interceptor(LoggingInterceptor)
//!     .build();
//!
//! bus.subscribe(|order: Arc<OrderPlaced>| async move { ship(&order).await });
//! bus.register_handler(|q: GetOrder, _ctx: CallContext| async move { load(q.id).await });
//!
//! bus.publish(OrderPlaced { id: 7 }).await?;
//! let order = bus.send(GetOrder { id: 7 }).await?;
//! ```

mod call;
mod module;

pub use call::{CallContext, DynRequestHandler, RequestHandler};
pub use module::SignalModule;

use crate::config::{BusConfig, ConfigError};
use crate::guard::DispatchGuard;
use crate::publisher::Publisher;
use crate::registry::RequestSlotRegistry;
use crate::subscription::{ClaimedRound, SubscribeOptions, SubscriptionService, SubscriptionToken};
use conduit_core::{
    ConduitError, ConfigurationError, Context, DynEvent, DynInterceptor, ErasedHandler, Event, EventHandler, EventKey,
    HandlerExecutionError, HandlerFailure, Interceptor, PublishReport, Request,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{Instrument, debug, debug_span, info, warn};

struct BusInner {
    subscriptions: Arc<SubscriptionService>,
    requests: RequestSlotRegistry,
    publisher: Publisher,
    guard: DispatchGuard,
    modules: Mutex<BTreeMap<String, Arc<dyn SignalModule>>>,
    config: BusConfig,
}

/// In-process publish/subscribe and request/response bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// A bus with default configuration and no interceptors.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start configuring a bus.
    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::default()
    }

    /// The configuration the bus was built with.
    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Subscribe with priority 0 and no filter.
    pub fn subscribe<E, H>(&self, handler: H) -> SubscriptionToken
    where
        E: Event,
        H: EventHandler<E>,
    {
        self.inner.subscriptions.subscribe::<E, H>(handler)
    }

    /// Subscribe with a priority and optional filter.
    pub fn subscribe_with<E, H>(&self, handler: H, options: SubscribeOptions<E>) -> SubscriptionToken
    where
        E: Event,
        H: EventHandler<E>,
    {
        self.inner.subscriptions.subscribe_with::<E, H>(handler, options)
    }

    /// Subscribe for a single dispatch round.
    pub fn subscribe_once<E, H>(&self, handler: H) -> SubscriptionToken
    where
        E: Event,
        H: EventHandler<E>,
    {
        self.inner.subscriptions.subscribe_once::<E, H>(handler)
    }

    /// Subscribe for a single dispatch round, with a priority and optional filter.
    pub fn subscribe_once_with<E, H>(&self, handler: H, options: SubscribeOptions<E>) -> SubscriptionToken
    where
        E: Event,
        H: EventHandler<E>,
    {
        self.inner.subscriptions.subscribe_once_with::<E, H>(handler, options)
    }

    /// Subscribe an erased handler under a runtime type tag.
    pub fn subscribe_dyn(
        &self,
        key: EventKey,
        handler: ErasedHandler,
        priority: i32,
    ) -> SubscriptionToken {
        self.inner.subscriptions.subscribe_dyn(key, handler, priority)
    }

    /// Remove a subscription. Returns `false` if it is already gone.
    pub fn unsubscribe(&self, token: &SubscriptionToken) -> bool {
        self.inner.subscriptions.unsubscribe(token)
    }

    /// Number of handlers subscribed to `E`.
    pub fn handler_count<E: Event>(&self) -> usize {
        self.inner.subscriptions.handler_count(EventKey::of::<E>())
    }

    // ========================================================================
    // Publishing
    // ========================================================================

    /// Publish to every matching handler.
    ///
    /// Uses the event's own context if it carries one, otherwise a fresh one.
    pub async fn publish<E: Event>(&self, event: E) -> Result<PublishReport, ConduitError> {
        self.inner.publisher.publish(event).await
    }

    /// Publish under an existing context.
    pub async fn publish_with<E: Event>(&self, event: E, ctx: Context) -> Result<PublishReport, ConduitError> {
        self.inner.publisher.publish_with(event, ctx).await
    }

    /// Publish a type-erased event.
    pub async fn publish_dyn(&self, event: DynEvent, ctx: Context) -> Result<PublishReport, ConduitError> {
        self.inner.publisher.publish_dyn(event, ctx).await
    }

    /// Publish several events concurrently under one shared context.
    pub async fn publish_batch<I>(&self, events: I) -> Result<PublishReport, ConduitError>
    where
        I: IntoIterator<Item = DynEvent>,
    {
        self.inner.publisher.publish_batch(events).await
    }

    /// Publish several events concurrently under `ctx`.
    pub async fn publish_batch_with<I>(&self, events: I, ctx: Context) -> Result<PublishReport, ConduitError>
    where
        I: IntoIterator<Item = DynEvent>,
    {
        self.inner.publisher.publish_batch_with(events, ctx).await
    }

    /// Deliver an event to the first handler that accepts it, and no other.
    ///
    /// Bypasses interceptors. Fails with [`ConfigurationError::NoHandler`] if
    /// no handler accepts the event, or with [`ConduitError::Handler`] if the
    /// handler fails.
    pub async fn emit_first<E: Event>(&self, event: E) -> Result<(), ConduitError> {
        let ctx = event.context().cloned().unwrap_or_default();
        self.emit_first_with(event, ctx).await
    }

    /// [`emit_first`](Self::emit_first) under an existing context.
    pub async fn emit_first_with<E: Event>(&self, event: E, ctx: Context) -> Result<(), ConduitError> {
        if ctx.is_cancelled() {
            return Err(ConduitError::Cancelled);
        }
        let key = EventKey::of::<E>();
        let subscriptions = &self.inner.subscriptions;
        let entry = subscriptions
            .claim_first(&event)
            .ok_or(ConfigurationError::NoHandler { target: key.name() })?;

        let round = ClaimedRound::new(subscriptions, key, std::slice::from_ref(&entry));
        let result = entry.call(Arc::new(event)).await;
        round.finish(&entry);
        drop(round);

        result.map_err(|err| {
            HandlerExecutionError {
                event: key.name(),
                handler: entry.id(),
                cause: HandlerFailure::Error(err),
            }
            .into()
        })
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Install the responder for `R`, replacing any previous one.
    ///
    /// Returns `true` if a responder was replaced.
    pub fn register_handler<R, H>(&self, handler: H) -> bool
    where
        R: Request,
        H: RequestHandler<R>,
    {
        let replaced = self.inner.requests.set_handler::<R>(Arc::new(handler));
        debug!(request = std::any::type_name::<R>(), replaced, "request handler registered");
        replaced
    }

    /// Remove the responder for `R`. Returns `true` if one was installed.
    pub fn remove_handler<R: Request>(&self) -> bool {
        self.inner.requests.remove::<R>()
    }

    /// Whether `R` has a responder.
    pub fn has_handler<R: Request>(&self) -> bool {
        self.inner.requests.contains::<R>()
    }

    /// Send a request to its single responder under a fresh context.
    pub async fn send<R: Request>(&self, request: R) -> Result<R::Response, ConduitError> {
        self.send_with(request, Context::new()).await
    }

    /// Send a request under an existing context.
    ///
    /// Fails with [`ConfigurationError::NoHandler`] before anything runs if `R`
    /// has no responder, and with a [`RecursionError`] if `R` is already in
    /// flight on this call-flow or the nesting bound is reached.
    ///
    /// [`RecursionError`]: conduit_core::RecursionError
    pub async fn send_with<R: Request>(&self, request: R, ctx: Context) -> Result<R::Response, ConduitError> {
        let key = EventKey::of::<R>();
        let handler = self
            .inner
            .requests
            .get_handler::<R>()
            .ok_or(ConfigurationError::NoHandler { target: key.name() })?;

        if ctx.is_cancelled() {
            return Err(ConduitError::Cancelled);
        }

        let scope = self.inner.guard.enter(key).inspect_err(|err| {
            warn!(request = key.name(), error = %err, "request dispatch refused");
        })?;

        let span = debug_span!(
            "send",
            request = key.name(),
            depth = scope.depth(),
            trace_id = %ctx.trace_id()
        );
        let call = CallContext::new(ctx, self.clone());

        async move {
            debug!("dispatching request");
            scope
                .run(handler.handle_dyn(request, call))
                .await
                .map_err(ConduitError::from)
        }
        .instrument(span)
        .await
    }

    // ========================================================================
    // Modules
    // ========================================================================

    /// Load a module, calling its `register_signals` once.
    ///
    /// Fails with [`ConfigurationError::ModuleAlreadyLoaded`] if a module with
    /// the same name is loaded.
    pub fn load_module(&self, module: Arc<dyn SignalModule>) -> Result<(), ConduitError> {
        let name = module.name().to_owned();
        {
            let mut modules = self.inner.modules.lock();
            if modules.contains_key(&name) {
                warn!(module = %name, "module already loaded");
                return Err(ConfigurationError::ModuleAlreadyLoaded(name).into());
            }
            modules.insert(name.clone(), Arc::clone(&module));
        }

        // Outside the lock: registration may inspect loaded modules.
        module.register_signals(self);
        info!(module = %name, "module loaded");
        Ok(())
    }

    /// Unload a module, calling its `unregister_signals` once.
    ///
    /// Returns `false` if no module with that name is loaded.
    pub fn unload_module(&self, name: &str) -> bool {
        let Some(module) = self.inner.modules.lock().remove(name) else {
            warn!(module = %name, "unload requested for unknown module");
            return false;
        };
        module.unregister_signals(self);
        info!(module = %name, "module unloaded");
        true
    }

    /// Names of loaded modules, sorted.
    pub fn loaded_modules(&self) -> Vec<String> {
        self.inner.modules.lock().keys().cloned().collect()
    }
}

/// Builder for an [`EventBus`].
#[derive(Default)]
pub struct EventBusBuilder {
    config: BusConfig,
    interceptors: Vec<Arc<dyn DynInterceptor>>,
}

impl EventBusBuilder {
    /// A builder seeded from defaults and `CONDUIT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::default().config(BusConfig::from_env()?))
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: BusConfig) -> Self {
        self.config = config;
        self
    }

    /// Bound nested `send` calls.
    pub fn max_dispatch_depth(mut self, depth: usize) -> Self {
        self.config.max_dispatch_depth = depth;
        self
    }

    /// Whether fan-out isolates handler panics.
    pub fn catch_handler_panics(mut self, catch: bool) -> Self {
        self.config.catch_handler_panics = catch;
        self
    }

    /// Append an interceptor. Interceptors run in the order added.
    pub fn interceptor<I: Interceptor>(mut self, interceptor: I) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Build the bus.
    pub fn build(self) -> EventBus {
        let subscriptions = Arc::new(SubscriptionService::new());
        let publisher = Publisher::new(
            Arc::clone(&subscriptions),
            self.interceptors,
            self.config.catch_handler_panics,
        );

        EventBus {
            inner: Arc::new(BusInner {
                subscriptions,
                requests: RequestSlotRegistry::new(),
                publisher,
                guard: DispatchGuard::new(self.config.max_dispatch_depth),
                modules: Mutex::new(BTreeMap::new()),
                config: self.config,
            }),
        }
    }
}
