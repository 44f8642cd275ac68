//! End-to-end tests for phase composition, named-phase wiring and sticky
//! postconditions.

use std::sync::Arc;

use parking_lot::Mutex;
use passage::{
    Action, ActionState, BeforeOrAfter, NamedPhase, Phase, PhaseConfig, PhaserState,
    custom_phase, take_from_context, transform, unit_sink,
};
use pretty_assertions::assert_eq;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Execution context that records observable side effects in order.
#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    fn record(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

/// A named phase that increments the value and records its run.
fn step(name: &'static str) -> NamedPhase<Recorder, i32> {
    custom_phase(
        name,
        format!("test step {name}"),
        move |ctx: &Recorder, value: &mut i32| {
            ctx.record(format!("run:{name}"));
            *value += 1;
        },
    )
}

fn string_step(name: &'static str) -> NamedPhase<Recorder, String> {
    custom_phase(
        name,
        format!("test step {name}"),
        move |ctx: &Recorder, _value: &mut String| {
            ctx.record(format!("run:{name}"));
        },
    )
}

fn run_with<P>(config: &PhaseConfig, pipeline: &P) -> (P::Output, PhaserState<Recorder>, Vec<String>)
where
    P: Phase<Recorder, Input = i32>,
{
    let mut state = PhaserState::new();
    let ctx = Recorder::default();
    let output = pipeline.invoke(config, &mut state, &ctx, 0).unwrap();
    (output, state, ctx.events())
}

fn run<P>(pipeline: &P) -> (P::Output, PhaserState<Recorder>, Vec<String>)
where
    P: Phase<Recorder, Input = i32>,
{
    run_with(&PhaseConfig::default(), pipeline)
}

fn done_names(state: &PhaserState<Recorder>) -> Vec<String> {
    state
        .already_done
        .iter()
        .map(|name| name.as_str().to_owned())
        .collect()
}

#[test]
fn composition_associates() {
    init_logs();
    let left = step("a").then(step("b")).then(step("c"));
    let right = step("a").then(step("b").then(step("c")));

    let (left_out, left_state, left_events) = run(&left);
    let (right_out, right_state, right_events) = run(&right);

    assert_eq!(left_out, 3);
    assert_eq!(left_out, right_out);
    assert_eq!(done_names(&left_state), vec!["a", "b", "c"]);
    assert_eq!(done_names(&left_state), done_names(&right_state));
    assert_eq!(left_events, right_events);
    assert_eq!(
        left_state.sticky_postconditions().len(),
        right_state.sticky_postconditions().len()
    );
}

#[test]
fn sticky_postcondition_checked_after_later_same_shape_phase() {
    let a = step("a").with_sticky_postcondition(|ctx: &Recorder, value: &i32| {
        ctx.record(format!("sticky:{value}"));
        Ok(())
    });
    let pipeline = a.then(step("b"));

    let (output, state, events) = run(&pipeline);
    assert_eq!(output, 2);
    // The sticky check runs once, after `b`; `a` itself establishes it.
    assert_eq!(events, vec!["run:a", "run:b", "sticky:2"]);
    assert_eq!(state.sticky_postconditions().len(), 1);
}

#[test]
fn sticky_postcondition_dropped_when_shape_changes() {
    let a = step("a").with_sticky_postcondition(|ctx: &Recorder, value: &i32| {
        ctx.record(format!("sticky:{value}"));
        Ok(())
    });
    let pipeline = a
        .then(transform(|value: i32| value.to_string()))
        .then(string_step("c"));

    let (output, state, events) = run(&pipeline);
    assert_eq!(output, "1");
    // No sticky check fires after the shape change.
    assert_eq!(events, vec!["run:a", "run:c"]);
    assert!(state.sticky_postconditions().is_empty());
}

#[test]
fn sticky_established_after_shape_change_survives_either_grouping() {
    init_logs();
    let sticky_step = || {
        string_step("s1").with_sticky_postcondition(|ctx: &Recorder, value: &String| {
            ctx.record(format!("sticky:{value}"));
            Ok(())
        })
    };
    let reshape = || transform(|value: i32| value.to_string());

    let left = step("x")
        .then(reshape())
        .then(sticky_step())
        .then(string_step("s2"))
        .then(string_step("s3"));
    let right = step("x")
        .then(reshape().then(sticky_step()).then(string_step("s2")))
        .then(string_step("s3"));

    let (left_out, left_state, left_events) = run(&left);
    let (right_out, right_state, right_events) = run(&right);

    assert_eq!(left_out, "1");
    assert_eq!(left_out, right_out);
    // The sticky postcondition registered after the shape change is checked
    // after every later phase and survives the run, however the pipeline is
    // grouped.
    assert_eq!(
        left_events,
        vec!["run:x", "run:s1", "run:s2", "sticky:1", "run:s3", "sticky:1"]
    );
    assert_eq!(left_events, right_events);
    assert_eq!(done_names(&left_state), vec!["x", "s1", "s2", "s3"]);
    assert_eq!(done_names(&left_state), done_names(&right_state));
    assert_eq!(left_state.sticky_postconditions().len(), 1);
    assert_eq!(right_state.sticky_postconditions().len(), 1);
}

#[test]
#[should_panic(expected = "prerequisite")]
fn unmet_prerequisite_aborts() {
    let pipeline = step("late").with_prerequisite("early");
    let _ = run(&pipeline);
}

#[test]
fn met_prerequisite_passes() {
    let pipeline = step("early").then(step("late").with_prerequisite("early"));
    let (output, state, _) = run(&pipeline);
    assert_eq!(output, 2);
    assert_eq!(done_names(&state), vec!["early", "late"]);
}

#[test]
#[should_panic(expected = "precondition failed")]
fn failing_precondition_aborts() {
    let pipeline = step("a").with_precondition(|_: &Recorder, value: &i32| {
        if *value < 0 {
            Ok(())
        } else {
            Err("value must be negative".to_owned())
        }
    });
    let _ = run(&pipeline);
}

#[test]
#[should_panic(expected = "postcondition failed")]
fn failing_postcondition_aborts() {
    let pipeline = step("a").with_postcondition(|_: &Recorder, _: &i32| {
        Err("output rejected".to_owned())
    });
    let _ = run(&pipeline);
}

#[test]
fn disabled_phase_is_skipped_and_not_recorded() {
    let mut config = PhaseConfig::default();
    config.disable("b");
    let pipeline = step("a").then(step("b")).then(step("c"));

    let (output, state, events) = run_with(&config, &pipeline);
    assert_eq!(output, 2);
    assert_eq!(done_names(&state), vec!["a", "c"]);
    assert_eq!(events, vec!["run:a", "run:c"]);
}

#[test]
fn actions_run_before_and_after_the_lowering() {
    let action: Action<Recorder, i32> =
        Arc::new(|st: &ActionState<'_>, ctx: &Recorder, _data: &i32| {
            let when = match st.when {
                BeforeOrAfter::Before => "before",
                BeforeOrAfter::After => "after",
            };
            ctx.record(format!("{when}:{}", st.name));
        });
    let pipeline = step("a").with_action(action);

    let (_, _, events) = run(&pipeline);
    assert_eq!(events, vec!["before:a", "run:a", "after:a"]);
}

#[test]
fn context_projection_feeds_the_sink() {
    let pipeline = take_from_context::<Recorder, _, i32, usize>(|ctx| {
        ctx.record("project");
        4
    })
    .then(transform(|workers: usize| workers * 2))
    .then(unit_sink::<Recorder, usize>());

    let ((), _, events) = run(&pipeline);
    assert_eq!(events, vec!["project"]);
}

#[test]
fn named_subphases_lists_nested_phases_with_depth() {
    let inner = step("a").then(step("b"));
    let outer = NamedPhase::new("outer", "outer pipeline", inner);

    let mut listing = Vec::new();
    outer.named_subphases(0, &mut listing);
    let entries: Vec<(usize, String)> = listing
        .into_iter()
        .map(|(depth, phase)| (depth, phase.name.to_string()))
        .collect();
    assert_eq!(
        entries,
        vec![
            (0, "outer".to_owned()),
            (1, "a".to_owned()),
            (1, "b".to_owned())
        ]
    );
}
