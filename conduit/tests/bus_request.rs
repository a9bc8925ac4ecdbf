use conduit::{
    BoxError, CallContext, CancellationToken, ConduitError, ConfigurationError, Context, EventBus, RecursionError,
    Request,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

mod common;
use common::{Echo, Inner, Middle, Outer, Recurse};

fn echo_bus() -> EventBus {
    let bus = EventBus::new();
    bus.register_handler::<Echo, _>(|request: Echo, _ctx: CallContext| async move {
        Ok::<_, BoxError>(request.0)
    });
    bus
}

#[tokio::test]
async fn test_send_returns_the_response() {
    let bus = echo_bus();
    assert_eq!(bus.send(Echo("hello".into())).await.unwrap(), "hello");
}

#[tokio::test]
async fn test_send_without_handler_fails_before_running() {
    let bus = EventBus::new();

    let err = bus.send(Echo("lost".into())).await.unwrap_err();

    assert!(matches!(
        err,
        ConduitError::Configuration(ConfigurationError::NoHandler { target }) if target.ends_with("Echo")
    ));
    assert!(err.to_string().contains("Echo"));
}

#[tokio::test]
async fn test_registration_overwrites_the_slot() {
    let bus = echo_bus();
    assert!(bus.has_handler::<Echo>());

    let replaced = bus.register_handler::<Echo, _>(|request: Echo, _ctx: CallContext| async move {
        Ok::<_, BoxError>(request.0.to_uppercase())
    });

    assert!(replaced);
    assert_eq!(bus.send(Echo("loud".into())).await.unwrap(), "LOUD");

    assert!(bus.remove_handler::<Echo>());
    assert!(!bus.remove_handler::<Echo>());
    assert!(!bus.has_handler::<Echo>());
}

#[tokio::test]
async fn test_nested_send_of_the_same_type_is_a_cycle() {
    let bus = EventBus::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&calls);
    bus.register_handler::<Recurse, _>(move |request: Recurse, ctx: CallContext| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move { ctx.send(request).await }
    });

    let err = bus.send(Recurse).await.unwrap_err();

    match err.as_recursion() {
        Some(RecursionError::Cycle { entering, chain }) => {
            assert!(entering.ends_with("Recurse"));
            assert_eq!(chain.len(), 1);
            assert!(chain[0].ends_with("Recurse"));
        }
        other => panic!("expected a cycle, got {other:?}"),
    }
    // The nested send never reached the handler.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_depth_bound_reports_the_chain() {
    let bus = EventBus::builder().max_dispatch_depth(2).build();
    bus.register_handler::<Outer, _>(|_: Outer, ctx: CallContext| async move { ctx.send(Middle).await });
    bus.register_handler::<Middle, _>(|_: Middle, ctx: CallContext| async move { ctx.send(Inner).await });
    bus.register_handler::<Inner, _>(|_: Inner, _ctx: CallContext| async move { Ok::<_, BoxError>(3) });

    let err = bus.send(Outer).await.unwrap_err();

    match &err {
        ConduitError::Recursion(RecursionError::DepthExceeded { max, entering, chain }) => {
            assert_eq!(*max, 2);
            assert!(entering.ends_with("Inner"));
            assert_eq!(chain.len(), 2);
            assert!(chain[0].ends_with("Outer"));
            assert!(chain[1].ends_with("Middle"));
            assert!(err.to_string().contains(" -> "));
        }
        other => panic!("expected depth exceeded, got {other:?}"),
    }

    // Within the bound the same graph succeeds.
    assert_eq!(bus.send(Middle).await.unwrap(), 3);
}

#[tokio::test]
async fn test_sibling_sends_do_not_trip_the_guard() {
    let bus = EventBus::new();
    bus.register_handler::<Inner, _>(|_: Inner, _ctx: CallContext| async move {
        tokio::task::yield_now().await;
        Ok::<_, BoxError>(1)
    });
    bus.register_handler::<Outer, _>(|_: Outer, ctx: CallContext| async move {
        let (left, right) = tokio::join!(ctx.send(Inner), ctx.send(Inner));
        Ok::<_, ConduitError>(left? + right?)
    });

    assert_eq!(bus.send(Outer).await.unwrap(), 2);

    // Sequential sends after completion are independent too.
    assert_eq!(bus.send(Inner).await.unwrap(), 1);
    assert_eq!(bus.send(Inner).await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_flows_are_isolated() {
    let bus = EventBus::new();
    bus.register_handler::<Middle, _>(|_: Middle, _ctx: CallContext| async move {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        Ok::<_, BoxError>(1)
    });
    bus.register_handler::<Outer, _>(|_: Outer, ctx: CallContext| async move { ctx.send(Middle).await });

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let bus = bus.clone();
            tokio::spawn(async move { bus.send(Outer).await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 1);
    }
}

#[tokio::test]
async fn test_nested_sends_continue_the_trace() {
    struct Probe;

    impl Request for Probe {
        type Response = Context;
    }

    struct Parent;

    impl Request for Parent {
        type Response = (Context, Context);
    }

    let bus = EventBus::new();
    bus.register_handler::<Probe, _>(|_: Probe, ctx: CallContext| async move {
        Ok::<_, BoxError>(ctx.context().clone())
    });
    bus.register_handler::<Parent, _>(|_: Parent, ctx: CallContext| async move {
        let child = ctx.send(Probe).await?;
        Ok::<_, ConduitError>((ctx.context().clone(), child))
    });

    let root = Context::new().with_user("ada");
    let (parent, child) = bus.send_with(Parent, root.clone()).await.unwrap();

    assert_eq!(parent.trace_id(), root.trace_id());
    assert_eq!(child.trace_id(), root.trace_id());
    assert_eq!(child.correlation_id(), root.correlation_id());
    assert_ne!(child.span_id(), parent.span_id());
    assert_ne!(child.request_id(), parent.request_id());
    assert_eq!(child.user_id(), Some("ada"));
}

#[tokio::test]
async fn test_cancelled_send_does_not_run() {
    let bus = echo_bus();
    let token = CancellationToken::new();
    token.cancel();

    let err = bus
        .send_with(Echo("late".into()), Context::new().with_cancellation(token))
        .await
        .unwrap_err();

    assert!(matches!(err, ConduitError::Cancelled));
}

#[tokio::test]
async fn test_handler_errors_surface_as_custom() {
    let bus = EventBus::new();
    bus.register_handler::<Echo, _>(|_: Echo, _ctx: CallContext| async move {
        Err::<String, _>("backend unavailable")
    });

    let err = bus.send(Echo("x".into())).await.unwrap_err();
    assert!(matches!(err, ConduitError::Custom(_)));
    assert_eq!(err.to_string(), "backend unavailable");
}
