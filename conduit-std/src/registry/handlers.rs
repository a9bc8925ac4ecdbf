//! Per-event-type handler buckets.

use conduit_core::{BoxError, BoxFuture, DynEvent, ErasedHandler, Event, EventKey, HandlerId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// A filter predicate with its event type erased.
pub type ErasedFilter = Arc<dyn Fn(&dyn Event) -> bool + Send + Sync>;

/// One registered handler.
///
/// Immutable once created apart from the claim flag, which lets exactly one
/// dispatch round take a once-handler.
pub struct HandlerEntry {
    id: HandlerId,
    handler: ErasedHandler,
    priority: i32,
    filter: Option<ErasedFilter>,
    once: bool,
    claimed: AtomicBool,
}

impl HandlerEntry {
    /// Create an entry.
    pub fn new(
        id: HandlerId,
        handler: ErasedHandler,
        priority: i32,
        filter: Option<ErasedFilter>,
        once: bool,
    ) -> Self {
        Self {
            id,
            handler,
            priority,
            filter,
            once,
            claimed: AtomicBool::new(false),
        }
    }

    /// Registry-unique id.
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Higher runs first.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Whether the entry is removed after its first round.
    pub fn is_once(&self) -> bool {
        self.once
    }

    /// Whether a round has already taken this once-handler.
    pub fn is_claimed(&self) -> bool {
        self.once && self.claimed.load(Ordering::Acquire)
    }

    /// Whether the filter, if any, accepts `event`.
    pub fn accepts(&self, event: &dyn Event) -> bool {
        self.filter.as_ref().is_none_or(|filter| filter(event))
    }

    /// Take the entry for one round. Always succeeds for ordinary handlers.
    pub fn claim(&self) -> bool {
        !self.once || !self.claimed.swap(true, Ordering::AcqRel)
    }

    /// Give a claimed once-handler back, e.g. when its round skipped it.
    pub fn release(&self) {
        self.claimed.store(false, Ordering::Release);
    }

    /// Invoke the handler.
    pub fn call(&self, event: DynEvent) -> BoxFuture<'static, Result<(), BoxError>> {
        (self.handler)(event)
    }
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("filtered", &self.filter.is_some())
            .field("once", &self.once)
            .finish()
    }
}

/// Handlers for one event type, ordered by descending priority then id.
#[derive(Default)]
pub struct HandlerBucket {
    entries: RwLock<Vec<Arc<HandlerEntry>>>,
}

impl HandlerBucket {
    /// Insert keeping the order. Equal priorities keep registration order.
    pub fn insert(&self, entry: Arc<HandlerEntry>) {
        let mut entries = self.entries.write();
        let at = entries.partition_point(|existing| {
            existing.priority > entry.priority
                || (existing.priority == entry.priority && existing.id < entry.id)
        });
        entries.insert(at, entry);
    }

    /// Remove one entry by id.
    pub fn remove(&self, id: HandlerId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        entries.len() != before
    }

    /// Remove every entry whose id is listed.
    pub fn remove_many(&self, ids: &[HandlerId]) {
        if ids.is_empty() {
            return;
        }
        self.entries.write().retain(|entry| !ids.contains(&entry.id));
    }

    /// Point-in-time copy of every entry.
    pub fn entries(&self) -> Vec<Arc<HandlerEntry>> {
        self.entries.read().clone()
    }

    /// Entries that accept `event`, claiming once-handlers for the caller's round.
    ///
    /// Filters run on a copy, outside the lock, so they may subscribe freely.
    pub fn snapshot(&self, event: &dyn Event) -> Vec<Arc<HandlerEntry>> {
        self.entries()
            .into_iter()
            .filter(|entry| !entry.is_claimed() && entry.accepts(event))
            .filter(|entry| entry.claim())
            .collect()
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the bucket is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Handler buckets keyed by event type.
pub struct HandlerRegistry {
    buckets: RwLock<HashMap<EventKey, Arc<HandlerBucket>>>,
    next_id: AtomicU64,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate a fresh handler id.
    pub fn next_id(&self) -> HandlerId {
        HandlerId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// The bucket for `key`, if one exists.
    pub fn bucket(&self, key: EventKey) -> Option<Arc<HandlerBucket>> {
        self.buckets.read().get(&key).cloned()
    }

    fn bucket_or_create(&self, key: EventKey) -> Arc<HandlerBucket> {
        if let Some(bucket) = self.bucket(key) {
            return bucket;
        }
        Arc::clone(self.buckets.write().entry(key).or_default())
    }

    /// Register an entry under `key`.
    pub fn insert(&self, key: EventKey, entry: HandlerEntry) {
        self.bucket_or_create(key).insert(Arc::new(entry));
    }

    /// Remove one entry.
    pub fn remove(&self, key: EventKey, id: HandlerId) -> bool {
        self.bucket(key).is_some_and(|bucket| bucket.remove(id))
    }

    /// Remove several entries of one type.
    pub fn remove_many(&self, key: EventKey, ids: &[HandlerId]) {
        if let Some(bucket) = self.bucket(key) {
            bucket.remove_many(ids);
        }
    }

    /// Matching entries for `event`, in dispatch order.
    pub fn snapshot(&self, event: &dyn Event) -> Vec<Arc<HandlerEntry>> {
        self.bucket(event.key())
            .map(|bucket| bucket.snapshot(event))
            .unwrap_or_default()
    }

    /// Number of handlers registered for `key`.
    pub fn len(&self, key: EventKey) -> usize {
        self.bucket(key).map_or(0, |bucket| bucket.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::erase_handler;

    struct Ping;
    impl Event for Ping {}

    fn entry(registry: &HandlerRegistry, priority: i32, once: bool) -> HandlerEntry {
        let handler = erase_handler::<Ping, _>(|_: Arc<Ping>| async {});
        HandlerEntry::new(registry.next_id(), handler, priority, None, once)
    }

    fn ids(entries: &[Arc<HandlerEntry>]) -> Vec<u64> {
        entries.iter().map(|entry| entry.id().get()).collect()
    }

    #[test]
    fn snapshot_orders_by_priority_then_registration() {
        let registry = HandlerRegistry::new();
        let key = EventKey::of::<Ping>();
        for priority in [1, 5, 1, 5, 3] {
            let entry = entry(&registry, priority, false);
            registry.insert(key, entry);
        }

        let snapshot = registry.snapshot(&Ping);
        assert_eq!(ids(&snapshot), vec![2, 4, 5, 1, 3]);
    }

    #[test]
    fn once_entries_are_claimed_by_one_snapshot() {
        let registry = HandlerRegistry::new();
        let key = EventKey::of::<Ping>();
        let once = entry(&registry, 0, true);
        registry.insert(key, once);

        assert_eq!(registry.snapshot(&Ping).len(), 1);
        assert!(registry.snapshot(&Ping).is_empty());
        assert_eq!(registry.len(key), 1);
    }

    #[test]
    fn filters_are_applied() {
        let registry = HandlerRegistry::new();
        let key = EventKey::of::<Ping>();
        let handler = erase_handler::<Ping, _>(|_: Arc<Ping>| async {});
        let reject: ErasedFilter = Arc::new(|_: &dyn Event| false);
        registry.insert(key, HandlerEntry::new(registry.next_id(), handler, 0, Some(reject), false));

        assert!(registry.snapshot(&Ping).is_empty());
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = HandlerRegistry::new();
        let key = EventKey::of::<Ping>();
        let entry = entry(&registry, 0, false);
        let id = entry.id();
        registry.insert(key, entry);

        assert!(registry.remove(key, id));
        assert!(!registry.remove(key, id));
    }
}
