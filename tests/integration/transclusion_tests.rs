use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use mockall::mock;
use oxide_bind::host::{Dom, Linker, Unbind};
use oxide_bind::{NodeId, ScopeRef, TemplateCompiler, TranscludeBinding, Value};
use serde_json::json;

use super::build_integration_test;

mock! {
    pub Compiler {}

    impl TemplateCompiler for Compiler {
        fn compile(&self, node: NodeId) -> Linker;
    }
}

/// A compiler whose linkers record what the bound scope says `{{ owner }}` is.
fn observing_compiler(seen: &Arc<Mutex<Vec<Value>>>, unbinds: &Arc<AtomicUsize>) -> MockCompiler {
    let seen = seen.clone();
    let unbinds = unbinds.clone();
    let mut compiler = MockCompiler::new();
    compiler.expect_compile().times(2).returning(move |_node| {
        let seen = seen.clone();
        let unbinds = unbinds.clone();
        Box::new(move |scope: &ScopeRef, _node: NodeId| -> Unbind {
            seen.lock().unwrap().push(scope.evaluate("{{ owner }}"));
            Box::new(move || {
                unbinds.fetch_add(1, Ordering::SeqCst);
            })
        })
    });
    compiler
}

#[test]
fn given_consumer_content_should_relocate_it_and_bind_it_to_the_outer_scope() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let unbinds = Arc::new(AtomicUsize::new(0));
    let test = build_integration_test()
        .given_compiler(Arc::new(observing_compiler(&seen, &unbinds)))
        .build();
    test.scope.set("owner", json!("consumer"));

    let placeholder = test.dom.element("user-card");
    let title = test.dom.text("Title");
    let body = test.dom.element("p");
    test.dom.append_child(placeholder, title);
    test.dom.append_child(placeholder, body);
    let slot = test.host("slot", &[]);

    let binding = TranscludeBinding::init(&test.runtime, slot, &test.scope(), placeholder);

    assert_eq!(binding.nodes(), &[title, body]);
    assert_eq!(test.root_children(), vec![title, body]);
    assert!(test.dom.child_nodes(placeholder).is_empty());
    assert!(test.dom.parent(slot).is_none());
    assert_eq!(*seen.lock().unwrap(), vec![json!("consumer"), json!("consumer")]);
    assert_eq!(unbinds.load(Ordering::SeqCst), 0);
}

#[test]
fn given_relocated_content_when_released_should_unbind_and_remove_every_node() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let unbinds = Arc::new(AtomicUsize::new(0));
    let test = build_integration_test()
        .given_compiler(Arc::new(observing_compiler(&seen, &unbinds)))
        .build();

    let placeholder = test.dom.element("user-card");
    let first = test.dom.text("one");
    let second = test.dom.text("two");
    test.dom.append_child(placeholder, first);
    test.dom.append_child(placeholder, second);
    let slot = test.host("slot", &[]);

    let mut binding = TranscludeBinding::init(&test.runtime, slot, &test.scope(), placeholder);
    binding.release();
    binding.release();

    assert_eq!(unbinds.load(Ordering::SeqCst), 2);
    assert!(test.root_children().is_empty());
    assert!(binding.nodes().is_empty());
}

#[test]
fn given_an_empty_placeholder_should_only_remove_the_slot() {
    let test = build_integration_test().build();
    let placeholder = test.dom.element("user-card");
    let slot = test.host("slot", &[]);

    let mut binding = TranscludeBinding::init(&test.runtime, slot, &test.scope(), placeholder);
    binding.release();

    assert!(test.root_children().is_empty());
    assert!(test.compiler.compiled().is_empty());
    assert_eq!(test.compiler.unbind_count(), 0);
}

#[test]
fn given_the_default_compiler_should_link_each_relocated_node_once() {
    let test = build_integration_test().build();
    let placeholder = test.dom.element("user-card");
    let child = test.dom.text("content");
    test.dom.append_child(placeholder, child);
    let slot = test.host("slot", &[]);

    let mut binding = TranscludeBinding::init(&test.runtime, slot, &test.scope(), placeholder);
    assert_eq!(test.compiler.compiled(), vec![child]);
    assert_eq!(test.compiler.linked(), vec![child]);

    binding.release();
    assert_eq!(test.compiler.unbind_count(), 1);
}
