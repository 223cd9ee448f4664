//! Static dataflow scheduling and execution.

use moccasin::actor::{Actor, Context, PortSpec};
use moccasin::composite::CompositeActor;
use moccasin::director::{Director, SdfDirector};
use moccasin::error::{ActionError, ExecutionError, SchedulingError};
use moccasin::library::{Ramp, Recorder, SampleDelay};
use moccasin::manager::{Manager, RunConfig, RunOutcome};
use moccasin::token::{Token, TokenType};
use proptest::prelude::*;

use crate::support::{Counters, Echo, Increment, Probe};

/// Consumes `consumption` integers and produces `production` integers per
/// firing.
struct RateNode {
    consumption: usize,
    production: usize,
}

impl Actor for RateNode {
    fn ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::input("in", TokenType::Int).with_rate(self.consumption),
            PortSpec::output("out", TokenType::Int).with_rate(self.production),
        ]
    }

    fn fire(&mut self, ctx: &mut Context<'_>) -> Result<(), ActionError> {
        let tokens = ctx.get_n("in", 0, self.consumption)?;
        let sum: i64 = tokens.iter().filter_map(Token::as_int).sum();
        for _ in 0..self.production {
            ctx.send("out", sum)?;
        }

        Ok(())
    }
}

fn gcd(a: usize, b: usize) -> usize {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

#[test]
fn sdf_minimal_repetitions() {
    let mut top = CompositeActor::new("top", SdfDirector::new());
    let a = top.add_actor("a", Ramp::new(0).with_rate(2)).unwrap();
    let recorder = Recorder::new().with_rate(3);
    let log = recorder.handle();
    let b = top.add_actor("b", recorder).unwrap();
    let connection = top.connect(a.port("out"), b.port("in")).unwrap();

    let schedule = top.schedule().unwrap();
    assert_eq!(schedule.repetitions(a), 3);
    assert_eq!(schedule.repetitions(b), 2);
    assert_eq!(schedule.iter().collect::<Vec<_>>(), vec![a, a, a, b, b]);
    assert_eq!(schedule.buffer_size(connection), Some(6));

    let mut manager = Manager::new(top, RunConfig::new().with_iteration_limit(2));
    assert_eq!(manager.run(), Ok(RunOutcome::Completed));

    let expected: Vec<Token> = (0..12).map(Token::Int).collect();
    assert_eq!(log.tokens(), expected);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn sdf_schedule_is_balanced(
        p1 in 1usize..6,
        c1 in 1usize..6,
        p2 in 1usize..6,
        c2 in 1usize..6,
    ) {
        let mut top = CompositeActor::new("top", SdfDirector::new());
        let source = top.add_actor("source", Ramp::new(0).with_rate(p1)).unwrap();
        let middle = top
            .add_actor("middle", RateNode { consumption: c1, production: p2 })
            .unwrap();
        let recorder = Recorder::new().with_rate(c2);
        let log = recorder.handle();
        let sink = top.add_actor("sink", recorder).unwrap();
        top.connect(source.port("out"), middle.port("in")).unwrap();
        top.connect(middle.port("out"), sink.port("in")).unwrap();

        let schedule = top.schedule().unwrap();
        let (r, m, k) = (
            schedule.repetitions(source),
            schedule.repetitions(middle),
            schedule.repetitions(sink),
        );
        prop_assert_eq!(r * p1, m * c1);
        prop_assert_eq!(m * p2, k * c2);
        prop_assert_eq!(gcd(gcd(r, m), k), 1);
        for id in [source, middle, sink] {
            let fired: usize = schedule
                .firings()
                .iter()
                .filter(|f| f.actor() == id)
                .map(|f| f.count())
                .sum();
            prop_assert_eq!(fired, schedule.repetitions(id));
        }

        // Two periods run within the computed buffer sizes.
        let mut manager = Manager::new(top, RunConfig::new().with_iteration_limit(2));
        prop_assert_eq!(manager.run(), Ok(RunOutcome::Completed));
        prop_assert_eq!(log.len(), 2 * k * c2);
    }
}

#[test]
fn sdf_inconsistent_loop_fails_before_initialize() {
    let mut top = CompositeActor::new("top", SdfDirector::new());
    let (probe, counters) = Probe::new();
    let a = top
        .add_actor("a", RateNode { consumption: 1, production: 2 })
        .unwrap();
    let b = top.add_actor("b", Echo).unwrap();
    top.add_actor("probe", probe).unwrap();
    top.connect(a.port("out"), b.port("in")).unwrap();
    top.connect(b.port("out"), a.port("in")).unwrap();

    let result = Manager::new(top, RunConfig::new()).run();

    assert!(matches!(
        result,
        Err(ExecutionError::Scheduling(SchedulingError::InconsistentRates { .. }))
    ));
    assert_eq!(Counters::get(&counters.preinitialize), 0);
    assert_eq!(Counters::get(&counters.initialize), 0);
    assert_eq!(Counters::get(&counters.wrapup), 0);
}

#[test]
fn sdf_loop_without_initial_tokens_deadlocks() {
    let mut top = CompositeActor::new("top", SdfDirector::new());
    let a = top.add_actor("a", Echo).unwrap();
    let b = top.add_actor("b", Echo).unwrap();
    top.connect(a.port("out"), b.port("in")).unwrap();
    top.connect(b.port("out"), a.port("in")).unwrap();

    match top.schedule() {
        Err(ExecutionError::Scheduling(SchedulingError::Deadlock { actors })) => {
            assert_eq!(actors, vec!["a".to_owned(), "b".to_owned()]);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn sdf_loop_with_sample_delay() {
    let mut top = CompositeActor::new("top", SdfDirector::new());
    let delay = top
        .add_actor("delay", SampleDelay::new([Token::Int(0)]))
        .unwrap();
    let increment = top.add_actor("increment", Increment).unwrap();
    let recorder = Recorder::new();
    let log = recorder.handle();
    let sink = top.add_actor("sink", recorder).unwrap();
    top.connect(delay.port("out"), increment.port("in")).unwrap();
    top.connect(increment.port("out"), delay.port("in")).unwrap();
    top.connect(increment.port("out"), sink.port("in")).unwrap();

    let schedule = top.schedule().unwrap();
    assert_eq!(
        schedule.iter().collect::<Vec<_>>(),
        vec![increment, delay, sink]
    );

    let mut manager = Manager::new(top, RunConfig::new().with_iteration_limit(3));
    assert_eq!(manager.run(), Ok(RunOutcome::Completed));
    assert_eq!(
        log.tokens(),
        vec![Token::Int(1), Token::Int(2), Token::Int(3)]
    );
}

#[test]
fn sdf_schedule_follows_graph_version() {
    let mut top = CompositeActor::new("top", SdfDirector::new());
    let a = top.add_actor("a", Ramp::new(0)).unwrap();
    let b = top.add_actor("b", Recorder::new()).unwrap();
    top.connect(a.port("out"), b.port("in")).unwrap();

    top.validate().unwrap();
    let cached = match top.director() {
        Director::Sdf(sdf) => sdf.schedule().cloned().unwrap(),
        _ => unreachable!(),
    };
    assert_eq!(cached.version(), top.version());
    assert_eq!(cached.repetitions(a), 1);

    top.set_rate(&b.port("in"), 4).unwrap();
    assert!(top.version() > cached.version());

    top.validate().unwrap();
    let schedule = match top.director() {
        Director::Sdf(sdf) => sdf.schedule().cloned().unwrap(),
        _ => unreachable!(),
    };
    assert_eq!(schedule.version(), top.version());
    assert_eq!(schedule.repetitions(a), 4);
    assert_eq!(schedule.repetitions(b), 1);
}

#[test]
fn sdf_postfire_false_terminates() {
    let mut top = CompositeActor::new("top", SdfDirector::new());
    let a = top.add_actor("a", Ramp::new(0).with_limit(2)).unwrap();
    let recorder = Recorder::new();
    let log = recorder.handle();
    let b = top.add_actor("b", recorder).unwrap();
    top.connect(a.port("out"), b.port("in")).unwrap();

    let mut manager = Manager::new(top, RunConfig::new().with_iteration_limit(10));
    let handle = manager.handle();

    assert_eq!(manager.run(), Ok(RunOutcome::Terminated));
    assert_eq!(handle.iterations(), 2);
    assert_eq!(log.tokens(), vec![Token::Int(0), Token::Int(1)]);
}

fn embedded_recorder(declared_rate: usize) -> (CompositeActor, moccasin::library::RecorderHandle) {
    let mut inner = CompositeActor::new("inner", SdfDirector::new());
    inner
        .add_port(PortSpec::input("in", TokenType::Int).with_rate(declared_rate))
        .unwrap();
    let recorder = Recorder::new().with_rate(2);
    let log = recorder.handle();
    let sink = inner.add_actor("sink", recorder).unwrap();
    inner
        .connect(CompositeActor::boundary("in"), sink.port("in"))
        .unwrap();

    (inner, log)
}

#[test]
fn sdf_embedded_boundary_rates() {
    let (inner, log) = embedded_recorder(2);
    let mut top = CompositeActor::new("top", SdfDirector::new());
    let ramp = top.add_actor("ramp", Ramp::new(0)).unwrap();
    let inner = top.add_actor("inner", inner).unwrap();
    top.connect(ramp.port("out"), inner.port("in")).unwrap();

    let schedule = top.schedule().unwrap();
    assert_eq!(schedule.repetitions(ramp), 2);
    assert_eq!(schedule.repetitions(inner), 1);

    let mut manager = Manager::new(top, RunConfig::new().with_iteration_limit(2));
    assert_eq!(manager.run(), Ok(RunOutcome::Completed));
    let expected: Vec<Token> = (0..4).map(Token::Int).collect();
    assert_eq!(log.tokens(), expected);
}

#[test]
fn sdf_embedded_boundary_rate_mismatch() {
    let (inner, _) = embedded_recorder(3);
    let mut top = CompositeActor::new("top", SdfDirector::new());
    let ramp = top.add_actor("ramp", Ramp::new(0)).unwrap();
    let inner = top.add_actor("inner", inner).unwrap();
    top.connect(ramp.port("out"), inner.port("in")).unwrap();

    assert_eq!(
        top.validate(),
        Err(ExecutionError::Scheduling(
            SchedulingError::BoundaryRateMismatch {
                port: "inner.in".to_owned(),
                declared: 3,
                required: 2,
            }
        ))
    );
}
