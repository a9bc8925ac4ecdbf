use conduit::interceptors::{FilterInterceptor, LoggingInterceptor, TimeoutInterceptor};
use conduit::testing::{CallLog, CountingHandler, EventRecorder};
use conduit::{
    BoxError, CancellationToken, ConduitError, ConfigurationError, Context, DynEvent, Event, EventBus,
    EventHandler, EventKey, HandlerFailure, Interceptor, PublishNext, PublishReport, SubscribeOptions,
    erase_handler,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

mod common;
use common::{Greeted, Ping};

struct Panicking;

impl EventHandler<Ping> for Panicking {
    async fn handle(&self, _event: Arc<Ping>) -> Result<(), BoxError> {
        panic!("handler panicked")
    }
}

fn labelled(bus: &EventBus, log: &CallLog, label: &'static str, priority: i32) {
    let log = log.clone();
    bus.subscribe_with::<Ping, _>(
        move |_: Arc<Ping>| {
            log.push(label);
            async {}
        },
        SubscribeOptions::new().priority(priority),
    );
}

#[tokio::test]
async fn test_higher_priority_runs_first() {
    let bus = EventBus::new();
    let log = CallLog::new();

    labelled(&bus, &log, "A", 1);
    labelled(&bus, &log, "B", 5);

    let report = bus.publish(Ping { n: 1 }).await.unwrap();

    assert_eq!(log.entries(), vec!["B", "A"]);
    assert_eq!(report.matched, 2);
    assert!(report.is_clean());
}

#[tokio::test]
async fn test_equal_priority_keeps_insertion_order() {
    let bus = EventBus::new();
    let log = CallLog::new();

    labelled(&bus, &log, "first", 0);
    labelled(&bus, &log, "high", 3);
    labelled(&bus, &log, "second", 0);
    labelled(&bus, &log, "third", 0);

    bus.publish(Ping { n: 1 }).await.unwrap();

    assert_eq!(log.entries(), vec!["high", "first", "second", "third"]);
}

#[tokio::test]
async fn test_once_handler_runs_exactly_once() {
    let bus = EventBus::new();
    let counter = CountingHandler::new();
    bus.subscribe_once::<Ping, _>(counter.clone());

    bus.publish(Ping { n: 1 }).await.unwrap();
    bus.publish(Ping { n: 2 }).await.unwrap();

    assert_eq!(counter.count(), 1);
    assert_eq!(bus.handler_count::<Ping>(), 0);
}

#[tokio::test]
async fn test_once_handler_under_concurrent_publishes() {
    let bus = EventBus::new();
    let counter = CountingHandler::new();
    bus.subscribe_once::<Ping, _>(counter.clone());

    let (first, second) = tokio::join!(bus.publish(Ping { n: 1 }), bus.publish(Ping { n: 2 }));

    assert_eq!(first.unwrap().matched + second.unwrap().matched, 1);
    assert_eq!(counter.count(), 1);
}

#[tokio::test]
async fn test_failing_handlers_are_isolated() {
    let bus = EventBus::new();
    let recorder = EventRecorder::<Ping>::new();

    bus.subscribe_with::<Ping, _>(
        |_: Arc<Ping>| async { Err::<(), _>("handler failed") },
        SubscribeOptions::new().priority(10),
    );
    bus.subscribe_with::<Ping, _>(Panicking, SubscribeOptions::new().priority(5));
    bus.subscribe::<Ping, _>(recorder.clone());

    let report = bus.publish(Ping { n: 7 }).await.unwrap();

    assert_eq!(recorder.count(), 1);
    assert_eq!(recorder.events()[0].n, 7);
    assert_eq!(report.matched, 3);
    assert_eq!(report.completed, 1);
    assert_eq!(report.failures.len(), 2);
    assert!(matches!(report.failures[0].cause, HandlerFailure::Error(_)));
    assert!(
        matches!(report.failures[1].cause, HandlerFailure::Panic(ref message) if message == "handler panicked")
    );
}

#[tokio::test]
async fn test_filter_rejects_events() {
    let bus = EventBus::new();
    let recorder = EventRecorder::<Ping>::new();
    bus.subscribe_with::<Ping, _>(recorder.clone(), SubscribeOptions::new().filter(|ping: &Ping| ping.n > 5));

    let low = bus.publish(Ping { n: 1 }).await.unwrap();
    let high = bus.publish(Ping { n: 9 }).await.unwrap();

    assert_eq!(low.matched, 0);
    assert_eq!(high.matched, 1);
    assert_eq!(recorder.count(), 1);
    assert_eq!(recorder.events()[0].n, 9);
}

#[tokio::test]
async fn test_unsubscribe_is_idempotent() {
    let bus = EventBus::new();
    let counter = CountingHandler::new();
    let token = bus.subscribe::<Ping, _>(counter.clone());

    assert!(bus.unsubscribe(&token));
    assert!(!bus.unsubscribe(&token));

    bus.publish(Ping { n: 1 }).await.unwrap();
    assert_eq!(counter.count(), 0);
}

#[tokio::test]
async fn test_subscription_during_dispatch_waits_for_next_round() {
    let bus = EventBus::new();
    let late = CountingHandler::new();

    let inner_bus = bus.clone();
    let late_handler = late.clone();
    bus.subscribe::<Ping, _>(move |_: Arc<Ping>| {
        inner_bus.subscribe::<Ping, _>(late_handler.clone());
        async {}
    });

    let report = bus.publish(Ping { n: 1 }).await.unwrap();
    assert_eq!(report.matched, 1);
    assert_eq!(late.count(), 0);

    bus.publish(Ping { n: 2 }).await.unwrap();
    assert_eq!(late.count(), 1);
}

#[tokio::test]
async fn test_unsubscribe_during_dispatch_keeps_the_current_round() {
    let bus = EventBus::new();
    let victim = CountingHandler::new();
    let token = bus.subscribe::<Ping, _>(victim.clone());

    let inner_bus = bus.clone();
    bus.subscribe_with::<Ping, _>(
        move |_: Arc<Ping>| {
            inner_bus.unsubscribe(&token);
            async {}
        },
        SubscribeOptions::new().priority(5),
    );

    let report = bus.publish(Ping { n: 1 }).await.unwrap();
    assert_eq!(report.matched, 2);
    assert_eq!(report.completed, 2);
    assert_eq!(victim.count(), 1);

    let report = bus.publish(Ping { n: 2 }).await.unwrap();
    assert_eq!(report.matched, 1);
    assert_eq!(victim.count(), 1);
}

#[tokio::test]
async fn test_publish_batch_merges_reports() {
    let bus = EventBus::new();
    let pings = CountingHandler::new();
    let greetings = EventRecorder::<Greeted>::new();
    bus.subscribe::<Ping, _>(pings.clone());
    bus.subscribe::<Greeted, _>(greetings.clone());

    let events: Vec<DynEvent> = vec![
        Arc::new(Ping { n: 1 }),
        Arc::new(Greeted { name: "ada".into() }),
        Arc::new(Ping { n: 2 }),
    ];
    let report = bus.publish_batch(events).await.unwrap();

    assert_eq!(report.matched, 3);
    assert_eq!(report.completed, 3);
    assert_eq!(pings.count(), 2);
    assert_eq!(greetings.events()[0].name, "ada");
}

#[tokio::test]
async fn test_cancelled_context_fails_publish() {
    let bus = EventBus::new();
    let counter = CountingHandler::new();
    bus.subscribe::<Ping, _>(counter.clone());

    let token = CancellationToken::new();
    token.cancel();
    let err = bus
        .publish_with(Ping { n: 1 }, Context::new().with_cancellation(token))
        .await
        .unwrap_err();

    assert!(matches!(err, ConduitError::Cancelled));
    assert_eq!(counter.count(), 0);
}

#[tokio::test]
async fn test_cancellation_mid_round_skips_and_keeps_once_handlers() {
    let bus = EventBus::new();
    let token = CancellationToken::new();
    let once = CountingHandler::new();

    let cancel = token.clone();
    bus.subscribe_with::<Ping, _>(
        move |_: Arc<Ping>| {
            cancel.cancel();
            async {}
        },
        SubscribeOptions::new().priority(1),
    );
    bus.subscribe_once::<Ping, _>(once.clone());

    let report = bus
        .publish_with(Ping { n: 1 }, Context::new().with_cancellation(token))
        .await
        .unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(report.skipped, 1);
    assert!(!report.is_clean());
    assert_eq!(once.count(), 0);

    bus.publish(Ping { n: 2 }).await.unwrap();
    assert_eq!(once.count(), 1);
}

#[tokio::test]
async fn test_emit_first_reaches_only_the_first_handler() {
    let bus = EventBus::new();
    let log = CallLog::new();
    labelled(&bus, &log, "A", 1);
    labelled(&bus, &log, "B", 5);

    bus.emit_first(Ping { n: 1 }).await.unwrap();
    assert_eq!(log.entries(), vec!["B"]);

    let err = bus.emit_first(Greeted { name: "nobody".into() }).await.unwrap_err();
    assert!(matches!(
        err,
        ConduitError::Configuration(ConfigurationError::NoHandler { target }) if target.ends_with("Greeted")
    ));
}

#[tokio::test]
async fn test_emit_first_reports_handler_failure() {
    let bus = EventBus::new();
    bus.subscribe::<Ping, _>(|_: Arc<Ping>| async { Err::<(), _>("refused") });

    match bus.emit_first(Ping { n: 1 }).await {
        Err(ConduitError::Handler(err)) => {
            assert!(err.event.ends_with("Ping"));
            assert!(matches!(err.cause, HandlerFailure::Error(_)));
        }
        other => panic!("expected a handler error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_runtime_keyed_subscription() {
    let bus = EventBus::new();
    let recorder = EventRecorder::<Ping>::new();
    let handler = erase_handler::<Ping, _>(recorder.clone());

    let token = bus.subscribe_dyn(EventKey::of::<Ping>(), handler, 0);
    assert_eq!(token.key(), EventKey::of::<Ping>());

    let event: DynEvent = Arc::new(Ping { n: 3 });
    assert_eq!(event.key(), token.key());
    bus.publish_dyn(event, Context::new()).await.unwrap();

    assert_eq!(recorder.count(), 1);
}

#[tokio::test]
async fn test_event_context_is_reused() {
    struct Traced {
        ctx: Context,
    }

    impl Event for Traced {
        fn context(&self) -> Option<&Context> {
            Some(&self.ctx)
        }
    }

    let seen = Arc::new(Mutex::new(Vec::new()));
    let bus = EventBus::builder()
        .interceptor(TraceCapture {
            seen: Arc::clone(&seen),
        })
        .build();

    let ctx = Context::new();
    bus.publish(Traced { ctx: ctx.clone() }).await.unwrap();
    bus.publish(Ping { n: 1 }).await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], ctx.trace_id().to_string());
    assert_ne!(seen[1], seen[0]);
}

#[tokio::test]
async fn test_filter_interceptor_drops_events() {
    let counter = CountingHandler::new();
    let bus = EventBus::builder()
        .interceptor(LoggingInterceptor)
        .interceptor(FilterInterceptor::new(|_event: &dyn Event, ctx: &Context| {
            ctx.user_id().is_some()
        }))
        .build();
    bus.subscribe::<Ping, _>(counter.clone());

    let dropped = bus.publish(Ping { n: 1 }).await.unwrap();
    assert_eq!(dropped.matched, 0);

    let delivered = bus
        .publish_with(Ping { n: 2 }, Context::new().with_user("ada"))
        .await
        .unwrap();
    assert_eq!(delivered.completed, 1);
    assert_eq!(counter.count(), 1);
}

#[tokio::test]
async fn test_timeout_interceptor_bounds_fan_out() {
    let bus = EventBus::builder()
        .interceptor(TimeoutInterceptor::new(Duration::from_millis(20)))
        .build();
    bus.subscribe::<Ping, _>(|_: Arc<Ping>| async {
        tokio::time::sleep(Duration::from_millis(500)).await;
    });

    let err = bus.publish(Ping { n: 1 }).await.unwrap_err();
    assert!(matches!(err, ConduitError::TimedOut(limit) if limit == Duration::from_millis(20)));
}

#[tokio::test]
async fn test_timed_out_round_releases_its_once_handler() {
    let bus = EventBus::builder()
        .interceptor(TimeoutInterceptor::new(Duration::from_millis(20)))
        .build();
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&calls);
    bus.subscribe_once::<Ping, _>(move |_: Arc<Ping>| {
        let first = counter.fetch_add(1, Ordering::SeqCst) == 0;
        async move {
            if first {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    });

    // 1. The first round is abandoned mid-handler
    let err = bus.publish(Ping { n: 1 }).await.unwrap_err();
    assert!(matches!(err, ConduitError::TimedOut(_)));
    assert_eq!(bus.handler_count::<Ping>(), 1);

    // 2. The handler is available again and retires once it finishes
    let report = bus.publish(Ping { n: 2 }).await.unwrap();
    assert_eq!(report.matched, 1);
    assert_eq!(report.completed, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(bus.handler_count::<Ping>(), 0);
}

#[tokio::test]
async fn test_unwinding_round_releases_its_once_handler() {
    let bus = EventBus::builder().catch_handler_panics(false).build();
    let once = CountingHandler::new();
    let panicking = bus.subscribe::<Ping, _>(Panicking);
    bus.subscribe_once::<Ping, _>(once.clone());

    let publisher = bus.clone();
    let joined = tokio::spawn(async move { publisher.publish(Ping { n: 1 }).await }).await;
    assert!(joined.unwrap_err().is_panic());
    assert_eq!(once.count(), 0);
    assert_eq!(bus.handler_count::<Ping>(), 2);

    bus.unsubscribe(&panicking);
    bus.publish(Ping { n: 2 }).await.unwrap();
    assert_eq!(once.count(), 1);
    assert_eq!(bus.handler_count::<Ping>(), 0);
}

#[tokio::test]
async fn test_interceptors_run_in_registration_order() {
    let log = CallLog::new();
    let bus = EventBus::builder()
        .interceptor(Tagged {
            label: "outer",
            log: log.clone(),
        })
        .interceptor(Tagged {
            label: "inner",
            log: log.clone(),
        })
        .build();

    let handler_log = log.clone();
    bus.subscribe::<Ping, _>(move |_: Arc<Ping>| {
        handler_log.push("handler");
        async {}
    });

    bus.publish(Ping { n: 1 }).await.unwrap();
    assert_eq!(
        log.entries(),
        vec!["outer:before", "inner:before", "handler", "inner:after", "outer:after"]
    );
}

// Logs around the rest of the chain.
struct Tagged {
    label: &'static str,
    log: CallLog,
}

impl Interceptor for Tagged {
    async fn invoke(&self, event: DynEvent, ctx: Context, next: PublishNext) -> Result<PublishReport, ConduitError> {
        self.log.push(format!("{}:before", self.label));
        let report = next.run(event, ctx).await;
        self.log.push(format!("{}:after", self.label));
        report
    }
}

// Records the trace id each publish runs under.
struct TraceCapture {
    seen: Arc<Mutex<Vec<String>>>,
}

impl Interceptor for TraceCapture {
    async fn invoke(&self, event: DynEvent, ctx: Context, next: PublishNext) -> Result<PublishReport, ConduitError> {
        self.seen.lock().unwrap().push(ctx.trace_id().to_string());
        next.run(event, ctx).await
    }
}
