use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use oxide_bind::host::{Dom, Vendor};
use oxide_bind::{
    ActionBinding, ActionDefinition, ActionExecutor, ActionState, BindingError, Canceller, Done,
    NodeId, Phase, Spawner, MAX_DELAY,
};
use serde_json::json;
use tracing_test::traced_test;

use super::build_integration_test;

type Journal = Arc<Mutex<Vec<String>>>;

/// An executor that journals `<name>:<phase>` and completes at once.
fn immediate(journal: &Journal, name: &'static str, phase: &'static str) -> ActionExecutor {
    let journal = journal.clone();
    Arc::new(move |_node: NodeId, done: Done| -> Canceller {
        journal.lock().unwrap().push(format!("{name}:{phase}"));
        done();
        Box::new(|| {})
    })
}

fn immediate_action(journal: &Journal, name: &'static str) -> ActionDefinition {
    ActionDefinition::new(
        immediate(journal, name, "created"),
        immediate(journal, name, "removed"),
    )
}

/// An executor that parks its completion callback and counts cancellations.
fn parked(done_slot: &Arc<Mutex<Option<Done>>>, cancels: &Arc<AtomicUsize>) -> ActionExecutor {
    let done_slot = done_slot.clone();
    let cancels = cancels.clone();
    Arc::new(move |_node: NodeId, done: Done| -> Canceller {
        *done_slot.lock().unwrap() = Some(done);
        let cancels = cancels.clone();
        Box::new(move || {
            cancels.fetch_add(1, Ordering::SeqCst);
        })
    })
}

fn descriptors(list: &[&str]) -> Vec<String> {
    list.iter().map(|descriptor| descriptor.to_string()).collect()
}

#[test]
fn given_a_zero_delay_when_started_should_settle_on_a_later_tick_only() {
    let test = build_integration_test().build();
    let node = test.dom.element("div");

    let action = test.runtime.actions().start(node, &descriptors(&["0"]), Phase::Created);
    assert_eq!(action.state(), ActionState::Pending);

    test.settle();
    assert_eq!(action.state(), ActionState::Pending);

    test.dom.advance(Duration::ZERO);
    test.settle();
    assert_eq!(action.state(), ActionState::Settled);
    assert!(test.runtime.actions().current(node).is_none());
}

#[test]
fn given_a_running_action_when_a_new_phase_starts_should_cancel_the_first_without_completing_it() {
    let test = build_integration_test().build();
    let engine = test.runtime.actions();
    let node = test.dom.element("div");
    let completed = Arc::new(AtomicBool::new(false));
    let flag = completed.clone();

    let enter = engine.start(node, &descriptors(&["1"]), Phase::Created);
    enter.then(&test.scheduler, move || flag.store(true, Ordering::SeqCst));
    let exit = engine.start(node, &descriptors(&["0.5"]), Phase::Removed);

    assert_eq!(enter.state(), ActionState::Cancelled);
    assert_eq!(test.dom.pending_timers(), 1);
    assert!(engine.current(node).is_some_and(|current| current.same(&exit)));

    test.dom.advance(Duration::from_secs(2));
    test.settle();

    assert!(!completed.load(Ordering::SeqCst));
    assert_eq!(exit.state(), ActionState::Settled);
}

#[test]
fn given_a_settled_action_superseded_before_its_continuation_should_keep_the_newer_record() {
    let test = build_integration_test().build();
    let engine = test.runtime.actions();
    let node = test.dom.element("div");

    let first = engine.start(node, &descriptors(&["0"]), Phase::Created);
    test.dom.advance(Duration::ZERO);
    assert_eq!(first.state(), ActionState::Settled);

    let second = engine.start(node, &descriptors(&["1"]), Phase::Removed);
    test.settle();

    assert!(engine.current(node).is_some_and(|current| current.same(&second)));
}

#[test]
fn given_a_negative_delay_should_run_as_zero() {
    let test = build_integration_test().build();
    let node = test.dom.element("div");

    let action = test.runtime.actions().run(node, "-2", Phase::Created);
    test.dom.advance(Duration::ZERO);

    assert_eq!(action.state(), ActionState::Settled);
}

#[test]
fn given_a_delay_beyond_the_timer_range_should_arm_the_longest_timer_and_cancel_cleanly() {
    let test = build_integration_test().build();
    let engine = test.runtime.actions();
    let node = test.dom.element("div");

    let action = engine.start(node, &descriptors(&["1e20"]), Phase::Created);
    assert_eq!(test.dom.pending_timers(), 1);

    test.dom.advance(MAX_DELAY - Duration::from_millis(1));
    test.settle();
    assert_eq!(action.state(), ActionState::Pending);

    assert!(engine.cancel(node));
    assert_eq!(action.state(), ActionState::Cancelled);
    assert_eq!(test.dom.pending_timers(), 0);
}

#[test]
fn given_a_delay_beyond_the_timer_range_should_settle_once_the_longest_timer_fires() {
    let test = build_integration_test().build();
    let node = test.dom.element("div");

    let action = test.runtime.actions().run(node, "1e20", Phase::Removed);
    test.dom.advance(MAX_DELAY);

    assert_eq!(action.state(), ActionState::Settled);
}

#[test]
fn given_a_forgotten_action_should_keep_running_without_a_record() {
    let test = build_integration_test().build();
    let engine = test.runtime.actions();
    let node = test.dom.element("div");

    let action = engine.start(node, &descriptors(&["0.5"]), Phase::Created);
    engine.forget(node);

    assert!(engine.current(node).is_none());
    assert!(!engine.cancel(node));
    assert_eq!(action.state(), ActionState::Pending);

    test.dom.advance(Duration::from_millis(500));
    test.settle();
    assert_eq!(action.state(), ActionState::Settled);
    assert!(engine.current(node).is_none());
}

#[test]
fn given_two_delays_when_started_should_run_them_one_after_another() {
    let test = build_integration_test().build();
    let node = test.dom.element("div");

    let action = test
        .runtime
        .actions()
        .start(node, &descriptors(&["0.1", "0.2"]), Phase::Created);
    assert_eq!(test.dom.pending_timers(), 1);

    test.dom.advance(Duration::from_millis(100));
    test.settle();
    assert_eq!(action.state(), ActionState::Pending);
    assert_eq!(test.dom.pending_timers(), 1);

    test.dom.advance(Duration::from_millis(199));
    test.settle();
    assert_eq!(action.state(), ActionState::Pending);

    test.dom.advance(Duration::from_millis(1));
    test.settle();
    assert_eq!(action.state(), ActionState::Settled);
    assert!(test.runtime.actions().current(node).is_none());
}

#[test]
fn given_a_running_sequence_when_cancelled_should_cancel_the_step_and_drop_the_rest() {
    let test = build_integration_test().build();
    let engine = test.runtime.actions();
    let node = test.dom.element("div");

    let action = engine.start(node, &descriptors(&["0.1", "0.2"]), Phase::Created);
    test.settle();

    assert!(engine.cancel(node));
    test.settle();
    test.dom.advance(Duration::from_secs(1));
    test.settle();

    assert_eq!(action.state(), ActionState::Cancelled);
    assert_eq!(test.dom.pending_timers(), 0);
    assert!(engine.current(node).is_none());
}

#[test]
fn given_a_scripted_action_when_started_should_settle_once_done_is_called() {
    let test = build_integration_test().build();
    let engine = test.runtime.actions();
    let node = test.dom.element("div");
    let done_slot = Arc::new(Mutex::new(None));
    let cancels = Arc::new(AtomicUsize::new(0));

    engine
        .define(
            "slide",
            ActionDefinition::new(parked(&done_slot, &cancels), parked(&done_slot, &cancels)),
        )
        .unwrap();

    let action = engine.start(node, &descriptors(&["slide"]), Phase::Created);
    assert_eq!(action.state(), ActionState::Pending);

    let done = done_slot.lock().unwrap().take().unwrap();
    done();

    assert_eq!(action.state(), ActionState::Settled);
    assert_eq!(cancels.load(Ordering::SeqCst), 0);
}

#[test]
fn given_a_running_scripted_action_when_cancelled_should_invoke_its_canceller() {
    let test = build_integration_test().build();
    let engine = test.runtime.actions();
    let node = test.dom.element("div");
    let done_slot = Arc::new(Mutex::new(None));
    let cancels = Arc::new(AtomicUsize::new(0));

    engine
        .define(
            "slide",
            ActionDefinition::new(parked(&done_slot, &cancels), parked(&done_slot, &cancels)),
        )
        .unwrap();

    let action = engine.start(node, &descriptors(&["slide"]), Phase::Created);
    engine.cancel(node);
    engine.cancel(node);

    let late_done = done_slot.lock().unwrap().take().unwrap();
    late_done();

    assert_eq!(action.state(), ActionState::Cancelled);
    assert_eq!(cancels.load(Ordering::SeqCst), 1);
}

#[test]
fn given_invalid_action_names_when_defined_should_reject_them() {
    let test = build_integration_test().build();
    let journal = Journal::default();

    for name in ["", "fade in", "0.5", "12"] {
        let result = test.runtime.actions().define(name, immediate_action(&journal, "x"));
        assert!(
            matches!(result, Err(BindingError::InvalidName { kind: "action", .. })),
            "{name:?} should be rejected"
        );
    }
}

#[test]
#[traced_test]
fn given_an_action_defined_twice_should_warn_and_keep_the_last_definition() {
    let test = build_integration_test().build();
    let engine = test.runtime.actions();
    let node = test.dom.element("div");
    let journal = Journal::default();

    engine.define("pop", immediate_action(&journal, "old")).unwrap();
    engine.define("pop", immediate_action(&journal, "new")).unwrap();
    engine.run(node, "pop", Phase::Created);

    assert!(logs_contain("action definition overwritten"));
    assert_eq!(*journal.lock().unwrap(), vec!["new:created".to_string()]);
}

#[test]
fn given_no_duration_when_a_css_action_runs_should_settle_at_once_and_keep_other_classes() {
    let test = build_integration_test().build();
    let node = test.dom.element("div");
    test.dom.add_class(node, "card");

    let action = test.runtime.actions().start(node, &descriptors(&["fade"]), Phase::Created);

    assert_eq!(action.state(), ActionState::Settled);
    assert_eq!(test.dom.classes(node), vec!["card", "fade-created"]);
    assert_eq!(test.dom.listener_count(node), 0);
}

#[test]
fn given_a_transition_when_a_css_action_runs_should_settle_on_transition_end() {
    let test = build_integration_test().build();
    let node = test.dom.element("div");
    test.dom.style_class("animated", "transitionDuration", "0s, 0.3s");
    test.dom.add_class(node, "animated");

    let action = test.runtime.actions().start(node, &descriptors(&["fade"]), Phase::Created);

    assert_eq!(action.state(), ActionState::Pending);
    assert_eq!(test.dom.style(node, "animationFillMode").as_deref(), Some("both"));
    assert_eq!(test.dom.listener_count(node), 2);

    test.dom.dispatch(node, "transitionend");

    assert_eq!(action.state(), ActionState::Settled);
    assert_eq!(test.dom.listener_count(node), 0);
    assert!(test.dom.has_class(node, "fade-created"));
}

#[test]
fn given_an_animation_on_the_phase_class_should_settle_on_animation_end() {
    let test = build_integration_test().build();
    let node = test.dom.element("div");
    test.dom.style_class("bounce-created", "animationDuration", "250ms");

    let action = test.runtime.actions().start(node, &descriptors(&["bounce"]), Phase::Created);
    assert_eq!(action.state(), ActionState::Pending);

    test.dom.dispatch(node, "animationend");

    assert_eq!(action.state(), ActionState::Settled);
}

#[test]
fn given_an_exit_transition_when_it_ends_should_leave_the_node_at_rest() {
    let test = build_integration_test().build();
    let node = test.dom.element("div");
    test.dom.style_class("animated", "transitionDuration", "0.3s");
    test.dom.add_class(node, "animated");
    test.dom.add_class(node, "fade-created");

    let action = test.runtime.actions().start(node, &descriptors(&["fade"]), Phase::Removed);
    assert!(test.dom.has_class(node, "fade-removed"));

    test.dom.dispatch(node, "transitionend");

    assert_eq!(action.state(), ActionState::Settled);
    assert_eq!(test.dom.classes(node), vec!["animated"]);
}

#[test]
fn given_a_running_css_action_when_cancelled_should_strip_its_class_and_listeners() {
    let test = build_integration_test().build();
    let engine = test.runtime.actions();
    let node = test.dom.element("div");
    test.dom.style_class("animated", "transitionDuration", "1s");
    test.dom.add_class(node, "animated");

    let action = engine.start(node, &descriptors(&["fade"]), Phase::Created);
    engine.cancel(node);
    test.dom.dispatch(node, "transitionend");

    assert_eq!(action.state(), ActionState::Cancelled);
    assert!(!test.dom.has_class(node, "fade-created"));
    assert_eq!(test.dom.listener_count(node), 0);
}

#[test]
fn given_a_webkit_host_should_use_prefixed_styles_and_end_events() {
    let test = build_integration_test().build();
    test.dom.set_vendor(Vendor::Webkit);
    let node = test.dom.element("div");
    test.dom.style_class("animated", "webkitTransitionDuration", "200ms");
    test.dom.add_class(node, "animated");

    let action = test.runtime.actions().start(node, &descriptors(&["fade"]), Phase::Created);
    assert_eq!(test.dom.style(node, "webkitAnimationFillMode").as_deref(), Some("both"));

    assert_eq!(test.dom.dispatch(node, "transitionend"), 0);
    assert_eq!(action.state(), ActionState::Pending);

    test.dom.dispatch(node, "webkitTransitionEnd");
    assert_eq!(action.state(), ActionState::Settled);
}

#[test]
fn given_no_descriptor_should_toggle_the_default_phase_class() {
    let test = build_integration_test().build();
    let node = test.dom.element("div");

    test.runtime.actions().start(node, &[], Phase::Created);

    assert_eq!(test.dom.classes(node), vec!["ox-created"]);
}

#[test]
fn given_a_running_action_when_waiting_for_idle_should_resolve_after_it_finishes() {
    let test = build_integration_test().build();
    let engine = test.runtime.actions();
    let node = test.dom.element("div");
    let idle = Arc::new(AtomicBool::new(false));

    engine.start(node, &descriptors(&["1"]), Phase::Created);
    let waiting = engine.when_idle(node);
    let flag = idle.clone();
    test.scheduler.spawn(Box::pin(async move {
        waiting.await;
        flag.store(true, Ordering::SeqCst);
    }));

    test.settle();
    assert!(!idle.load(Ordering::SeqCst));

    test.dom.advance(Duration::from_secs(1));
    test.settle();
    assert!(idle.load(Ordering::SeqCst));
}

#[test]
fn given_an_action_binding_should_run_exit_descriptors_in_reverse_order() {
    let test = build_integration_test().build();
    let engine = test.runtime.actions();
    let node = test.dom.element("div");
    let journal = Journal::default();
    engine.define("grow", immediate_action(&journal, "grow")).unwrap();
    engine.define("glow", immediate_action(&journal, "glow")).unwrap();

    let mut binding = ActionBinding::init(&test.runtime, node, Some("grow glow"), test.scope());
    test.settle();
    let exit = binding.release().unwrap();
    test.settle();

    assert_eq!(exit.state(), ActionState::Settled);
    assert_eq!(
        *journal.lock().unwrap(),
        vec!["grow:created", "glow:created", "glow:removed", "grow:removed"]
    );
    assert!(binding.release().is_none());
}

#[test]
fn given_an_action_binding_on_an_interpolated_expression_should_read_descriptors_from_the_scope() {
    let test = build_integration_test().build();
    let node = test.dom.element("div");
    test.scope.set("effect", json!("fade"));

    let mut binding = ActionBinding::init(&test.runtime, node, Some("{{ effect }}"), test.scope());
    assert!(test.dom.has_class(node, "fade-created"));

    test.scope.set("effect", json!("zoom"));
    binding.release();

    assert!(test.dom.has_class(node, "zoom-removed"));
    assert_eq!(binding.element(), node);
}

#[test]
fn given_an_entering_action_binding_when_released_should_interrupt_the_enter() {
    let test = build_integration_test().build();
    let node = test.dom.element("div");

    let mut binding = ActionBinding::init(&test.runtime, node, Some("2"), test.scope());
    let enter = test.runtime.actions().current(node).unwrap();
    binding.release();

    assert_eq!(enter.state(), ActionState::Cancelled);
}
