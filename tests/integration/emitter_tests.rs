use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use oxide_bind::{EventEmitter, Listener, Value};
use serde_json::json;

fn counting(hits: &Arc<AtomicUsize>) -> Listener {
    let hits = hits.clone();
    Arc::new(move |_: &[Value]| {
        hits.fetch_add(1, Ordering::SeqCst);
    })
}

fn recording(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Listener {
    let log = log.clone();
    Arc::new(move |_: &[Value]| log.lock().unwrap().push(name))
}

#[test]
fn given_two_listeners_when_emitted_should_invoke_them_in_registration_order() {
    let emitter = EventEmitter::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    emitter
        .subscribe("change", recording(&log, "first"))
        .subscribe("change", recording(&log, "second"));
    emitter.emit("change", &[]);

    assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
}

#[test]
fn given_a_listener_when_emitted_with_arguments_should_forward_them() {
    let emitter = EventEmitter::new();
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();

    emitter.subscribe(
        "select",
        Arc::new(move |args: &[Value]| sink.lock().unwrap().extend_from_slice(args)),
    );
    emitter.emit("select", &[json!("row-1"), json!(3)]);

    assert_eq!(*received.lock().unwrap(), vec![json!("row-1"), json!(3)]);
}

#[test]
fn given_a_once_listener_when_emitted_twice_should_fire_once() {
    let emitter = EventEmitter::new();
    let hits = Arc::new(AtomicUsize::new(0));

    emitter.subscribe_once("ready", counting(&hits));
    emitter.emit("ready", &[]).emit("ready", &[]);

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(emitter.listener_count("ready"), 0);
    assert_eq!(emitter.event_count(), 0);
}

#[test]
fn given_a_once_listener_that_re_emits_when_emitted_should_fire_once() {
    let emitter = EventEmitter::new();
    let hits = Arc::new(AtomicUsize::new(0));

    let inner = emitter.clone();
    let counter = hits.clone();
    emitter.subscribe_once(
        "ready",
        Arc::new(move |_: &[Value]| {
            counter.fetch_add(1, Ordering::SeqCst);
            inner.emit("ready", &[]);
        }),
    );
    emitter.emit("ready", &[]);

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(emitter.listener_count("ready"), 0);
}

#[test]
fn given_a_once_listener_shared_by_two_emitters_when_both_emit_should_fire_once_on_each() {
    let first = EventEmitter::new();
    let second = EventEmitter::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let listener = counting(&hits);

    first.subscribe_once("ready", listener.clone());
    second.subscribe_once("ready", listener);

    first.emit("ready", &[]);
    assert_eq!(second.listener_count("ready"), 1);

    second.emit("ready", &[]);
    first.emit("ready", &[]);

    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_ne!(first.id(), second.id());
}

#[test]
fn given_a_listener_unsubscribing_a_later_one_when_emitted_should_finish_the_snapshot() {
    let emitter = EventEmitter::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let later = counting(&hits);

    let inner = emitter.clone();
    let target = later.clone();
    emitter.subscribe(
        "change",
        Arc::new(move |_: &[Value]| {
            inner.unsubscribe("change", &target);
        }),
    );
    emitter.subscribe("change", later);

    emitter.emit("change", &[]);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(emitter.listener_count("change"), 1);

    emitter.emit("change", &[]);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn given_the_same_listener_registered_twice_should_keep_one_registration() {
    let emitter = EventEmitter::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let listener = counting(&hits);

    emitter.subscribe("change", listener.clone());
    emitter.subscribe("change", listener.clone());
    emitter.subscribe_once("change", listener);
    emitter.emit("change", &[]).emit("change", &[]);

    assert_eq!(emitter.listener_count("change"), 1);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[test]
fn given_the_last_listener_unsubscribed_should_drop_the_event_type() {
    let emitter = EventEmitter::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let listener = counting(&hits);

    emitter.subscribe("change", listener.clone());
    emitter.unsubscribe("change", &listener);

    assert_eq!(emitter.event_count(), 0);
    assert!(emitter.listeners("change").is_empty());
}

#[test]
fn given_several_types_when_unsubscribe_all_without_type_should_release_everything() {
    let emitter = EventEmitter::new();
    let hits = Arc::new(AtomicUsize::new(0));

    emitter
        .subscribe("change", counting(&hits))
        .subscribe("select", counting(&hits))
        .subscribe("select", counting(&hits));

    emitter.unsubscribe_all(Some("select"));
    assert_eq!(emitter.event_count(), 1);

    emitter.unsubscribe_all(None);
    emitter.emit("change", &[]);

    assert_eq!(emitter.event_count(), 0);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn given_no_listeners_when_emitted_should_do_nothing() {
    let emitter = EventEmitter::new();

    emitter.emit("nobody", &[json!(1)]);

    assert_eq!(emitter.listener_count("nobody"), 0);
    assert_eq!(emitter.event_count(), 0);
}
