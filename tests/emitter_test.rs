use priority_emitter::content_store::ContentStore;
use priority_emitter::identity::IdAllocator;
use priority_emitter::{
    EmitterConfig, EmitterError, EventEmitter, Listener, ListenerFn, ListenerOptions, Remover,
    Times, Value,
};
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, Duration};

fn counter() -> (Arc<Mutex<u32>>, Listener) {
    let count = Arc::new(Mutex::new(0));
    let c = count.clone();
    (count, Listener::new(move |_| *c.lock().unwrap() += 1))
}

#[tokio::test]
async fn test_async_listener_runs_after_sync_ones() {
    let emitter = EventEmitter::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    let o1 = order.clone();
    emitter.on(
        "x",
        Listener::new(move |_| o1.lock().unwrap().push("async")),
        ListenerOptions::new().priority(-10).asynchronous(),
    );
    let o2 = order.clone();
    emitter.on(
        "x",
        Listener::new(move |_| o2.lock().unwrap().push("sync")),
        ListenerOptions::new(),
    );

    emitter.emit("x", Value::Null);
    assert_eq!(*order.lock().unwrap(), vec!["sync"]);

    sleep(Duration::from_millis(10)).await;
    assert_eq!(*order.lock().unwrap(), vec!["sync", "async"]);
}

#[tokio::test]
async fn test_scheduled_async_call_survives_removal() {
    let emitter = EventEmitter::new();
    let (count, listener) = counter();
    let key = emitter
        .on("x", listener, ListenerOptions::new().asynchronous())
        .unwrap();

    emitter.emit("x", Value::Null);
    let removed = emitter.off([key.as_str()], None, None);
    assert_eq!(removed["x"].len(), 1);
    assert_eq!(*count.lock().unwrap(), 0);

    sleep(Duration::from_millis(10)).await;
    assert_eq!(*count.lock().unwrap(), 1);

    emitter.emit("x", Value::Null);
    sleep(Duration::from_millis(10)).await;
    assert_eq!(*count.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_async_once_listener_fires_once() {
    let emitter = EventEmitter::new();
    let (count, listener) = counter();
    emitter.once("x", listener, ListenerOptions::new().asynchronous());

    emitter.emit("x", Value::Null);
    emitter.emit("x", Value::Null);
    assert!(!emitter.has_listeners("x"));

    sleep(Duration::from_millis(10)).await;
    assert_eq!(*count.lock().unwrap(), 1);
}

#[test]
fn test_emission_carries_data_and_key() {
    let emitter = EventEmitter::new();
    let seen = Arc::new(Mutex::new(None));
    let s = seen.clone();
    let key = emitter
        .on(
            "save",
            Listener::new(move |e| {
                *s.lock().unwrap() = Some((e.event.clone(), e.data.clone(), e.listener_key.clone()))
            }),
            ListenerOptions::new(),
        )
        .unwrap();
    assert_eq!(key, "listener_1");

    emitter.emit("save", "report.txt");
    assert_eq!(
        seen.lock().unwrap().clone(),
        Some(("save".to_string(), Value::from("report.txt"), key))
    );
}

#[test]
fn test_default_priority_from_config() {
    let config = EmitterConfig::from_json(r#"{"default_priority": 5}"#).unwrap();
    let emitter = EventEmitter::with_config(config);
    let order = Arc::new(Mutex::new(Vec::new()));
    let o1 = order.clone();
    emitter.on(
        "x",
        Listener::new(move |_| o1.lock().unwrap().push("default")),
        ListenerOptions::new(),
    );
    let o2 = order.clone();
    emitter.on(
        "x",
        Listener::new(move |_| o2.lock().unwrap().push("explicit")),
        ListenerOptions::new().priority(1),
    );
    emitter.emit("x", Value::Null);
    assert_eq!(*order.lock().unwrap(), vec!["explicit", "default"]);

    let status = emitter.queue_status("x").unwrap();
    assert_eq!(status.priorities, 2);
    assert_eq!(status.contents, 2);
}

#[test]
fn test_deterministic_ids() {
    let ids = Arc::new(IdAllocator::new());
    let a = EventEmitter::builder().allocator(ids.clone()).build();
    let b = EventEmitter::builder()
        .allocator(ids.clone())
        .type_tag("ajax")
        .build();
    let c = EventEmitter::builder().allocator(ids).build();
    assert_eq!(a.id(), "emitter_1");
    assert_eq!(b.id(), "ajax_1");
    assert_eq!(c.id(), "emitter_2");

    let random = EventEmitter::new();
    assert!(random.id().starts_with("emitter_"));
    assert_ne!(random.id(), EventEmitter::new().id());
}

#[test]
fn test_remover_from_value() {
    assert!(matches!(
        Remover::try_from(Value::from("listener_1")),
        Ok(Remover::Key(key)) if key == "listener_1"
    ));
    assert!(matches!(
        Remover::try_from(Value::from(3)),
        Err(EmitterError::InvalidArgument(_))
    ));
}

#[test]
fn test_remove_shared_callable_by_priority() {
    let emitter = EventEmitter::new();
    let count = Arc::new(Mutex::new(0));
    let c = count.clone();
    let f: ListenerFn = Arc::new(move |_: &priority_emitter::Emission| *c.lock().unwrap() += 1);
    let low = emitter
        .on("x", f.clone(), ListenerOptions::new().priority(1).times(5))
        .unwrap();
    emitter.on("x", f.clone(), ListenerOptions::new().priority(9));

    emitter.remove_listener([&f], None, Some(9));
    emitter.emit("x", Value::Null);
    assert_eq!(*count.lock().unwrap(), 1);
    assert_eq!(emitter.remaining_calls("x", &low), vec![Times::Limited(4)]);
}

#[test]
fn test_store_default_after_remove() {
    let mut store: ContentStore<Value> = ContentStore::new();
    let key = store.add(Value::from("v"), None, None);
    assert_eq!(key.to_string(), "string#1");
    assert!(store.using(&key, true));

    assert_eq!(store.remove([&key]), vec![key.clone()]);
    assert!(!store.is_using(&key));
    assert_eq!(
        store.get_content(&key, Value::from("MISSING")),
        Value::from("MISSING")
    );
    assert!(store.remove([&key]).is_empty());

    let next = store.add(Value::from("v"), None, None);
    assert_eq!(next.to_string(), "string#2");
}
