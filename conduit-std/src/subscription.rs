//! Subscription tokens and the service that issues them.

use crate::registry::{ErasedFilter, HandlerEntry, HandlerRegistry};
use conduit_core::{ErasedHandler, Event, EventHandler, EventKey, HandlerId, erase_handler};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Capability to remove one handler registration.
///
/// Holding a token confers no ownership; dropping it leaves the handler
/// registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken {
    key: EventKey,
    id: HandlerId,
}

impl SubscriptionToken {
    /// The event type the handler is registered for.
    pub fn key(&self) -> EventKey {
        self.key
    }

    /// The handler's id.
    pub fn id(&self) -> HandlerId {
        self.id
    }
}

/// Priority and filter for a subscription.
///
/// # Example
///
/// ```rust,ignore
/// let options = SubscribeOptions::new()
///     .priority(10)
///     .filter(|order: &OrderPlaced| order.total > 100);
/// bus.subscribe_with(handler, options);
/// ```
pub struct SubscribeOptions<E> {
    priority: i32,
    filter: Option<Arc<dyn Fn(&E) -> bool + Send + Sync>>,
}

impl<E> Default for SubscribeOptions<E> {
    fn default() -> Self {
        Self {
            priority: 0,
            filter: None,
        }
    }
}

impl<E: Event> SubscribeOptions<E> {
    /// Priority 0, no filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Higher priorities run first.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Only deliver events accepted by `filter`.
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    fn erased_filter(self) -> Option<ErasedFilter> {
        let filter = self.filter?;
        let erased: ErasedFilter = Arc::new(move |event: &dyn Event| {
            event.downcast_ref::<E>().is_some_and(|event| filter(event))
        });
        Some(erased)
    }
}

/// Issues and revokes subscriptions against a [`HandlerRegistry`].
#[derive(Default)]
pub struct SubscriptionService {
    registry: HandlerRegistry,
}

impl SubscriptionService {
    /// Create a service with an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe with priority 0 and no filter.
    pub fn subscribe<E, H>(&self, handler: H) -> SubscriptionToken
    where
        E: Event,
        H: EventHandler<E>,
    {
        self.subscribe_with::<E, H>(handler, SubscribeOptions::new())
    }

    /// Subscribe with explicit options.
    pub fn subscribe_with<E, H>(&self, handler: H, options: SubscribeOptions<E>) -> SubscriptionToken
    where
        E: Event,
        H: EventHandler<E>,
    {
        let priority = options.priority;
        self.register(
            EventKey::of::<E>(),
            erase_handler::<E, H>(handler),
            priority,
            options.erased_filter(),
            false,
        )
    }

    /// Subscribe for a single dispatch round.
    pub fn subscribe_once<E, H>(&self, handler: H) -> SubscriptionToken
    where
        E: Event,
        H: EventHandler<E>,
    {
        self.subscribe_once_with::<E, H>(handler, SubscribeOptions::new())
    }

    /// Subscribe for a single dispatch round, with explicit options.
    pub fn subscribe_once_with<E, H>(
        &self,
        handler: H,
        options: SubscribeOptions<E>,
    ) -> SubscriptionToken
    where
        E: Event,
        H: EventHandler<E>,
    {
        let priority = options.priority;
        self.register(
            EventKey::of::<E>(),
            erase_handler::<E, H>(handler),
            priority,
            options.erased_filter(),
            true,
        )
    }

    /// Subscribe an already-erased handler under a runtime type tag.
    pub fn subscribe_dyn(&self, key: EventKey, handler: ErasedHandler, priority: i32) -> SubscriptionToken {
        self.register(key, handler, priority, None, false)
    }

    fn register(
        &self,
        key: EventKey,
        handler: ErasedHandler,
        priority: i32,
        filter: Option<ErasedFilter>,
        once: bool,
    ) -> SubscriptionToken {
        let id = self.registry.next_id();
        self.registry
            .insert(key, HandlerEntry::new(id, handler, priority, filter, once));
        debug!(event = key.name(), handler = %id, priority, once, "handler subscribed");
        SubscriptionToken { key, id }
    }

    /// Remove the handler behind `token`.
    ///
    /// Returns `false` if it was already removed (including a once-handler that
    /// has run).
    pub fn unsubscribe(&self, token: &SubscriptionToken) -> bool {
        let removed = self.registry.remove(token.key, token.id);
        if removed {
            debug!(event = token.key.name(), handler = %token.id, "handler unsubscribed");
        }
        removed
    }

    /// Matching handlers for `event`, in dispatch order.
    ///
    /// Once-handlers in the result are claimed; hold a [`ClaimedRound`] over
    /// them for as long as the round runs.
    pub fn snapshot(&self, event: &dyn Event) -> Vec<Arc<HandlerEntry>> {
        self.registry.snapshot(event)
    }

    /// The handler that would run first for events of type `key`, ignoring filters.
    pub fn first_handler(&self, key: EventKey) -> Option<Arc<HandlerEntry>> {
        self.registry
            .bucket(key)?
            .entries()
            .into_iter()
            .find(|entry| !entry.is_claimed())
    }

    /// Claim the first handler accepting `event`.
    pub fn claim_first(&self, event: &dyn Event) -> Option<Arc<HandlerEntry>> {
        self.registry
            .bucket(event.key())?
            .entries()
            .into_iter()
            .find(|entry| !entry.is_claimed() && entry.accepts(event) && entry.claim())
    }

    /// Remove once-handlers that ran in a finished round.
    pub fn retire(&self, key: EventKey, ids: &[HandlerId]) {
        self.registry.remove_many(key, ids);
    }

    /// Return claimed once-handlers that did not run.
    pub fn release(&self, entries: &[Arc<HandlerEntry>]) {
        for entry in entries {
            entry.release();
        }
    }

    /// Number of handlers registered for `key`.
    pub fn handler_count(&self, key: EventKey) -> usize {
        self.registry.len(key)
    }
}

// ============================================================================
// Claimed rounds
// ============================================================================

/// The once-handlers one dispatch round has claimed.
///
/// Dropping the round settles every claim: handlers marked finished are
/// retired and the rest are released. A round cut short by a timeout, a
/// dropped future or an unwinding handler leaves no claim behind.
pub struct ClaimedRound<'a> {
    subscriptions: &'a SubscriptionService,
    key: EventKey,
    claimed: Vec<Arc<HandlerEntry>>,
    finished: Mutex<Vec<HandlerId>>,
}

impl<'a> ClaimedRound<'a> {
    /// Track the once-handlers among `entries`. Ordinary handlers are ignored.
    pub fn new(subscriptions: &'a SubscriptionService, key: EventKey, entries: &[Arc<HandlerEntry>]) -> Self {
        Self {
            subscriptions,
            key,
            claimed: entries.iter().filter(|entry| entry.is_once()).cloned().collect(),
            finished: Mutex::new(Vec::new()),
        }
    }

    /// Record that `entry` ran to completion, successfully or not.
    pub fn finish(&self, entry: &HandlerEntry) {
        if entry.is_once() {
            self.finished.lock().push(entry.id());
        }
    }
}

impl Drop for ClaimedRound<'_> {
    fn drop(&mut self) {
        if self.claimed.is_empty() {
            return;
        }
        let finished = std::mem::take(self.finished.get_mut());
        let unused: Vec<_> = self
            .claimed
            .iter()
            .filter(|entry| !finished.contains(&entry.id()))
            .cloned()
            .collect();

        self.subscriptions.retire(self.key, &finished);
        self.subscriptions.release(&unused);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ping(u32);
    impl Event for Ping {}

    #[test]
    fn unsubscribe_twice_returns_false() {
        let service = SubscriptionService::new();
        let token = service.subscribe::<Ping, _>(|_: Arc<Ping>| async {});

        assert!(service.unsubscribe(&token));
        assert!(!service.unsubscribe(&token));
        assert_eq!(service.handler_count(EventKey::of::<Ping>()), 0);
    }

    #[test]
    fn first_handler_follows_priority() {
        let service = SubscriptionService::new();
        service.subscribe::<Ping, _>(|_: Arc<Ping>| async {});
        let high = service.subscribe_with::<Ping, _>(
            |_: Arc<Ping>| async {},
            SubscribeOptions::new().priority(9),
        );

        let first = service.first_handler(EventKey::of::<Ping>()).unwrap();
        assert_eq!(first.id(), high.id());
    }

    #[test]
    fn typed_filters_see_the_payload() {
        let service = SubscriptionService::new();
        service.subscribe_with::<Ping, _>(
            |_: Arc<Ping>| async {},
            SubscribeOptions::new().filter(|ping: &Ping| ping.0 > 10),
        );

        assert!(service.snapshot(&Ping(3)).is_empty());
        assert_eq!(service.snapshot(&Ping(30)).len(), 1);
    }

    #[test]
    fn claim_first_takes_a_once_handler_once() {
        let service = SubscriptionService::new();
        service.subscribe_once::<Ping, _>(|_: Arc<Ping>| async {});

        assert!(service.claim_first(&Ping(1)).is_some());
        assert!(service.claim_first(&Ping(1)).is_none());
    }

    #[test]
    fn dropped_round_retires_finished_and_releases_the_rest() {
        let service = SubscriptionService::new();
        let key = EventKey::of::<Ping>();
        service.subscribe_once::<Ping, _>(|_: Arc<Ping>| async {});
        service.subscribe_once::<Ping, _>(|_: Arc<Ping>| async {});
        service.subscribe::<Ping, _>(|_: Arc<Ping>| async {});

        let snapshot = service.snapshot(&Ping(1));
        assert_eq!(snapshot.len(), 3);
        {
            let round = ClaimedRound::new(&service, key, &snapshot);
            round.finish(&snapshot[0]);
            assert!(service.snapshot(&Ping(1)).iter().all(|entry| !entry.is_once()));
        }

        // The unfinished once-handler is back; the finished one is gone.
        assert_eq!(service.handler_count(key), 2);
        let next = service.snapshot(&Ping(2));
        assert_eq!(next.len(), 2);
        assert_eq!(next[0].id(), snapshot[1].id());
    }
}
